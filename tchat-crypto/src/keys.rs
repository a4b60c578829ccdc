//! Secret key wrappers.

use std::fmt;

use zeroize::Zeroize;

use crate::KEY_LEN;

/// A 32-byte symmetric session key (AES-256).
///
/// Zeroized on drop. The `Debug` impl is deliberately opaque so the key
/// can never leak through logging or error formatting.
#[derive(Clone, Eq, PartialEq)]
pub struct SessionKey([u8; KEY_LEN]);

impl SessionKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl From<[u8; KEY_LEN]> for SessionKey {
    fn from(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }
}

impl Drop for SessionKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionKey(..)")
    }
}
