use tchat_proto::GROUP_ID_BASE;
use tchat_server::Directory;

#[test]
fn contacts_are_mutual_and_symmetric() {
    let dir = Directory::new();
    let a = dir.create_user("alice");
    let b = dir.create_user("bob");

    assert!(!dir.are_contacts(a, b));
    dir.add_contact(a, b);
    assert!(dir.are_contacts(a, b));
    assert!(dir.are_contacts(b, a));
    dir.remove_contact(b, a);
    assert!(!dir.are_contacts(a, b));
}

#[test]
fn user_ids_are_distinct_and_low() {
    let dir = Directory::new();
    let a = dir.create_user("alice");
    let b = dir.create_user("bob");
    assert_ne!(a, b);
    assert!(a < GROUP_ID_BASE && b < GROUP_ID_BASE);
    assert!(dir.user_exists(a));
    assert!(!dir.user_exists(9999));
}

#[test]
fn group_ids_live_in_their_own_range() {
    let dir = Directory::new();
    let admin = dir.create_user("alice");
    let gid = dir.create_group(admin, "rust");
    assert!(gid >= GROUP_ID_BASE);
    assert!(dir.is_group(gid));
    assert!(!dir.is_group(admin));
    assert_eq!(dir.group_admin(gid), Some(admin));
    assert!(dir.is_member(gid, admin));
}

#[test]
fn only_the_admin_manages_membership() {
    let dir = Directory::new();
    let admin = dir.create_user("alice");
    let bob = dir.create_user("bob");
    let eve = dir.create_user("eve");
    let gid = dir.create_group(admin, "rust");

    assert!(!dir.add_member(gid, eve, eve), "non-admin cannot add");
    assert!(dir.add_member(gid, admin, bob));
    assert!(dir.is_member(gid, bob));

    assert!(!dir.remove_member(gid, bob, admin), "non-admin cannot remove");
    assert!(!dir.remove_member(gid, admin, admin), "admin cannot remove self");
    assert!(dir.remove_member(gid, admin, bob));
    assert!(!dir.is_member(gid, bob));
}

#[test]
fn leave_and_delete_semantics() {
    let dir = Directory::new();
    let admin = dir.create_user("alice");
    let bob = dir.create_user("bob");
    let gid = dir.create_group(admin, "rust");
    dir.add_member(gid, admin, bob);

    assert!(!dir.leave_group(gid, admin), "the admin deletes instead of leaving");
    assert!(dir.leave_group(gid, bob));

    assert!(!dir.delete_group(gid, bob), "only the admin deletes");
    assert!(dir.delete_group(gid, admin));
    assert!(dir.group_admin(gid).is_none());
}

#[test]
fn pseudo_updates() {
    let dir = Directory::new();
    let a = dir.create_user("alice");
    assert_eq!(dir.pseudo(a).as_deref(), Some("alice"));
    assert!(dir.update_pseudo(a, "alicia"));
    assert_eq!(dir.pseudo(a).as_deref(), Some("alicia"));
    assert!(!dir.update_pseudo(999, "ghost"));
}
