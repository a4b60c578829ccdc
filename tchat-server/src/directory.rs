//! In-memory user / contact / group directory.
//!
//! The real bookkeeping repositories live outside the core; the relay
//! only needs this much to answer its three authorization questions:
//! who exists, who is whose mutual contact, and who belongs to which
//! group. Nothing here persists.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use tchat_proto::GROUP_ID_BASE;

struct GroupRecord {
    name: String,
    admin: u32,
    members: HashSet<u32>,
}

/// The server's view of accounts, contact pairs and groups.
pub struct Directory {
    users: Mutex<HashMap<u32, String>>,
    /// Mutual-contact pairs, stored normalized as `(min, max)`.
    contacts: Mutex<HashSet<(u32, u32)>>,
    groups: Mutex<HashMap<u32, GroupRecord>>,
    next_user_id: AtomicU32,
    next_group_id: AtomicU32,
}

impl Directory {
    pub fn new() -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
            contacts: Mutex::new(HashSet::new()),
            groups: Mutex::new(HashMap::new()),
            next_user_id: AtomicU32::new(1),
            next_group_id: AtomicU32::new(GROUP_ID_BASE),
        }
    }

    // ── users ──────────────────────────────────────────────────────────

    pub fn create_user(&self, pseudo: &str) -> u32 {
        let id = self.next_user_id.fetch_add(1, Ordering::Relaxed);
        self.users
            .lock()
            .expect("user map poisoned")
            .insert(id, pseudo.to_string());
        id
    }

    pub fn user_exists(&self, id: u32) -> bool {
        self.users.lock().expect("user map poisoned").contains_key(&id)
    }

    pub fn pseudo(&self, id: u32) -> Option<String> {
        self.users.lock().expect("user map poisoned").get(&id).cloned()
    }

    pub fn update_pseudo(&self, id: u32, pseudo: &str) -> bool {
        match self.users.lock().expect("user map poisoned").get_mut(&id) {
            Some(p) => {
                *p = pseudo.to_string();
                true
            }
            None => false,
        }
    }

    // ── contacts ───────────────────────────────────────────────────────

    pub fn add_contact(&self, a: u32, b: u32) {
        self.contacts
            .lock()
            .expect("contact set poisoned")
            .insert(pair(a, b));
    }

    pub fn remove_contact(&self, a: u32, b: u32) {
        self.contacts
            .lock()
            .expect("contact set poisoned")
            .remove(&pair(a, b));
    }

    pub fn are_contacts(&self, a: u32, b: u32) -> bool {
        self.contacts
            .lock()
            .expect("contact set poisoned")
            .contains(&pair(a, b))
    }

    // ── groups ─────────────────────────────────────────────────────────

    pub fn is_group(&self, id: u32) -> bool {
        id >= GROUP_ID_BASE
    }

    pub fn create_group(&self, admin: u32, name: &str) -> u32 {
        let id = self.next_group_id.fetch_add(1, Ordering::Relaxed);
        let mut members = HashSet::new();
        members.insert(admin);
        self.groups
            .lock()
            .expect("group map poisoned")
            .insert(id, GroupRecord { name: name.to_string(), admin, members });
        id
    }

    pub fn group_admin(&self, id: u32) -> Option<u32> {
        self.groups.lock().expect("group map poisoned").get(&id).map(|g| g.admin)
    }

    pub fn group_members(&self, id: u32) -> Vec<u32> {
        self.groups
            .lock()
            .expect("group map poisoned")
            .get(&id)
            .map(|g| g.members.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_member(&self, group_id: u32, user_id: u32) -> bool {
        self.groups
            .lock()
            .expect("group map poisoned")
            .get(&group_id)
            .is_some_and(|g| g.members.contains(&user_id))
    }

    /// Admin-only. Returns `false` when the caller is not the admin or
    /// the group does not exist.
    pub fn add_member(&self, group_id: u32, caller: u32, member: u32) -> bool {
        let mut groups = self.groups.lock().expect("group map poisoned");
        match groups.get_mut(&group_id) {
            Some(g) if g.admin == caller => g.members.insert(member) || true,
            _ => false,
        }
    }

    pub fn remove_member(&self, group_id: u32, caller: u32, member: u32) -> bool {
        let mut groups = self.groups.lock().expect("group map poisoned");
        match groups.get_mut(&group_id) {
            Some(g) if g.admin == caller && member != g.admin => g.members.remove(&member),
            _ => false,
        }
    }

    pub fn update_group_name(&self, group_id: u32, caller: u32, name: &str) -> bool {
        let mut groups = self.groups.lock().expect("group map poisoned");
        match groups.get_mut(&group_id) {
            Some(g) if g.admin == caller => {
                g.name = name.to_string();
                true
            }
            _ => false,
        }
    }

    pub fn delete_group(&self, group_id: u32, caller: u32) -> bool {
        let mut groups = self.groups.lock().expect("group map poisoned");
        match groups.get(&group_id) {
            Some(g) if g.admin == caller => {
                groups.remove(&group_id);
                true
            }
            _ => false,
        }
    }

    /// A member leaves of their own accord; the admin cannot leave
    /// (delete the group instead).
    pub fn leave_group(&self, group_id: u32, member: u32) -> bool {
        let mut groups = self.groups.lock().expect("group map poisoned");
        match groups.get_mut(&group_id) {
            Some(g) if g.admin != member => g.members.remove(&member),
            _ => false,
        }
    }

    pub fn group_name(&self, id: u32) -> Option<String> {
        self.groups
            .lock()
            .expect("group map poisoned")
            .get(&id)
            .map(|g| g.name.clone())
    }
}

impl Default for Directory {
    fn default() -> Self {
        Self::new()
    }
}

fn pair(a: u32, b: u32) -> (u32, u32) {
    if a <= b { (a, b) } else { (b, a) }
}
