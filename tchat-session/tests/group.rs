use tchat_session::{new_group_key, ConversationId, GroupKeyring, ReplayMode, SessionKeyManager};

#[test]
fn distribution_installs_the_group_key() {
    let manager = SessionKeyManager::new(ReplayMode::Strict);
    let keyring = GroupKeyring::new();

    let dist = new_group_key(100, 1);
    assert!(keyring.install(&manager, &dist));
    assert!(manager.contains(&ConversationId::group(100)));
    assert_eq!(keyring.epoch(100), Some(1));
}

#[test]
fn stale_epoch_cannot_roll_back_a_rotation() {
    let manager = SessionKeyManager::new(ReplayMode::Strict);
    let keyring = GroupKeyring::new();

    let old = new_group_key(100, 1);
    let rotated = new_group_key(100, 2);

    assert!(keyring.install(&manager, &rotated));
    // Late (or replayed) delivery of the pre-rotation key is ignored.
    assert!(!keyring.install(&manager, &old));
    assert_eq!(keyring.epoch(100), Some(2));
    assert_eq!(
        manager.key(&ConversationId::group(100)).unwrap().as_bytes(),
        &rotated.group_key
    );
}

#[test]
fn same_epoch_is_not_reinstalled() {
    let manager = SessionKeyManager::new(ReplayMode::Strict);
    let keyring = GroupKeyring::new();
    let dist = new_group_key(100, 1);
    assert!(keyring.install(&manager, &dist));
    assert!(!keyring.install(&manager, &dist));
}

#[test]
fn rotation_mints_a_different_key() {
    let a = new_group_key(100, 1);
    let b = new_group_key(100, 2);
    assert_ne!(a.group_key, b.group_key);
}

#[test]
fn leaving_a_group_clears_its_state() {
    let manager = SessionKeyManager::new(ReplayMode::Strict);
    let keyring = GroupKeyring::new();
    keyring.install(&manager, &new_group_key(100, 1));

    keyring.remove(&manager, 100);
    assert!(!manager.contains(&ConversationId::group(100)));
    assert_eq!(keyring.epoch(100), None);

    // A fresh group history may start over at epoch 1.
    assert!(keyring.install(&manager, &new_group_key(100, 1)));
}
