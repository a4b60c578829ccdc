//! Group session keys.
//!
//! A group conversation uses a single symmetric key chosen by the admin
//! and delivered to each member through the member's pairwise session as
//! a `GROUP_KEY_DISTRIBUTION` message. Rotation on membership change is
//! mandatory: the admin picks a fresh key (next epoch) and redistributes.
//! No ratcheting beyond that.

use std::collections::HashMap;
use std::sync::Mutex;

use tchat_crypto::SessionKey;
use tchat_proto::messages::GroupKeyDistribution;

use crate::manager::SessionKeyManager;
use crate::state::ConversationId;

/// Admin side: mint the distribution body for a fresh group key.
///
/// The same body is sent to every member over their pairwise session;
/// the caller owns delivery.
pub fn new_group_key(group_id: u32, epoch: u64) -> GroupKeyDistribution {
    let mut key = [0u8; 32];
    getrandom::getrandom(&mut key).expect("getrandom");
    GroupKeyDistribution { group_id, epoch, group_key: key }
}

/// Member side: tracks the installed epoch per group so a stale or
/// replayed distribution can never roll a key back.
#[derive(Default)]
pub struct GroupKeyring {
    epochs: Mutex<HashMap<u32, u64>>,
}

impl GroupKeyring {
    pub fn new() -> Self {
        Self { epochs: Mutex::new(HashMap::new()) }
    }

    /// Install a distributed key. Returns `false` (and installs nothing)
    /// when `dist.epoch` is not newer than what is already installed.
    pub fn install(&self, manager: &SessionKeyManager, dist: &GroupKeyDistribution) -> bool {
        let mut epochs = self.epochs.lock().expect("group epoch map poisoned");
        let current = epochs.get(&dist.group_id).copied();
        if let Some(current) = current {
            if dist.epoch <= current {
                log::debug!(
                    "ignoring stale group key for group {} (epoch {} <= {})",
                    dist.group_id,
                    dist.epoch,
                    current
                );
                return false;
            }
        }
        epochs.insert(dist.group_id, dist.epoch);
        manager.install(
            ConversationId::group(dist.group_id),
            SessionKey::from_bytes(dist.group_key),
        );
        true
    }

    /// Epoch currently installed for a group, if any.
    pub fn epoch(&self, group_id: u32) -> Option<u64> {
        self.epochs
            .lock()
            .expect("group epoch map poisoned")
            .get(&group_id)
            .copied()
    }

    /// Forget a group entirely (left or deleted).
    pub fn remove(&self, manager: &SessionKeyManager, group_id: u32) {
        self.epochs
            .lock()
            .expect("group epoch map poisoned")
            .remove(&group_id);
        manager.remove(&ConversationId::group(group_id));
    }
}
