//! The at-rest key store.
//!
//! One directory per local user (`<keystore_dir>/<user_id>/`) holding the
//! identity keypair and one file per session key, each sealed with the
//! user's master key:
//!
//! ```text
//! .salt                    PBKDF2 salt (password mode)
//! .check                   sealed marker blob, verifies the password
//! .masterkey               plaintext master key (opt-out mode only)
//! identity.keypair         sealed X25519 private key
//! session_<conv>.key       sealed 32-byte session key
//! ```
//!
//! Every write goes through `.tmp` + fsync + rename under a per-path
//! lock; deletes overwrite the file with three passes of random bytes
//! before unlink.

use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tchat_crypto::{
    generate_store_salt, MasterKey, SessionKey, StaticSecret, KEY_LEN, SALT_LEN,
};

use crate::state::ConversationId;

const SALT_FILE: &str = ".salt";
const CHECK_FILE: &str = ".check";
const MASTERKEY_FILE: &str = ".masterkey";
const IDENTITY_FILE: &str = "identity.keypair";
const SESSION_PREFIX: &str = "session_";
const SESSION_SUFFIX: &str = ".key";

/// Known plaintext sealed into `.check` at store creation.
const CHECK_MAGIC: &[u8] = b"tchatsapp-keystore-v1";

const SHRED_PASSES: usize = 3;

// ─── Error ───────────────────────────────────────────────────────────────────

/// Errors from the at-rest store.
#[derive(Debug)]
pub enum StoreError {
    Io(io::Error),
    /// A sealed blob would not open: wrong password or corrupted store.
    /// The UI must re-authenticate or reset.
    Corrupted,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "key store I/O error: {e}"),
            Self::Corrupted => write!(f, "key store corrupted or wrong password"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<io::Error> for StoreError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

// ─── KeyStore ────────────────────────────────────────────────────────────────

/// File-backed store for one local user's key material.
pub struct KeyStore {
    dir: PathBuf,
    master: MasterKey,
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl KeyStore {
    /// Open (or create) a password-protected store at
    /// `<root>/<user_id>/`.
    ///
    /// On first open the PBKDF2 salt and a sealed check blob are written;
    /// later opens verify the password against the check blob and fail
    /// with [`StoreError::Corrupted`] on mismatch.
    pub fn open_with_password(
        root: &Path,
        user_id: u32,
        password: &str,
    ) -> Result<Self, StoreError> {
        let dir = root.join(user_id.to_string());
        create_private_dir(&dir)?;

        let salt_path = dir.join(SALT_FILE);
        let salt: [u8; SALT_LEN] = if salt_path.exists() {
            read_exact_file(&salt_path)?.ok_or(StoreError::Corrupted)?
        } else {
            let salt = generate_store_salt();
            write_atomic(&dir, &salt_path, &salt)?;
            salt
        };

        let master = MasterKey::derive(password, &salt);
        let store = Self { dir, master, locks: Mutex::new(HashMap::new()) };

        let check_path = store.dir.join(CHECK_FILE);
        if check_path.exists() {
            let blob = fs::read(&check_path)?;
            let opened = store.master.open(&blob).map_err(|_| StoreError::Corrupted)?;
            if opened != CHECK_MAGIC {
                return Err(StoreError::Corrupted);
            }
        } else {
            let blob = store.master.seal(CHECK_MAGIC).map_err(|_| StoreError::Corrupted)?;
            store.write_locked(&check_path, &blob)?;
        }
        Ok(store)
    }

    /// Open (or create) a store whose master key lives in plaintext on
    /// disk — the documented opt-out. Logs a warning every time.
    pub fn open_without_password(root: &Path, user_id: u32) -> Result<Self, StoreError> {
        let dir = root.join(user_id.to_string());
        create_private_dir(&dir)?;

        let key_path = dir.join(MASTERKEY_FILE);
        let master = if key_path.exists() {
            let bytes: [u8; KEY_LEN] =
                read_exact_file(&key_path)?.ok_or(StoreError::Corrupted)?;
            MasterKey::from_bytes(bytes)
        } else {
            let master = MasterKey::random();
            write_atomic(&dir, &key_path, master.as_bytes())?;
            master
        };

        log::warn!(
            "key store {} is not password-protected; master key stored in plaintext",
            dir.display()
        );
        Ok(Self { dir, master, locks: Mutex::new(HashMap::new()) })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // ── identity ───────────────────────────────────────────────────────

    pub fn save_identity(&self, secret: &StaticSecret) -> Result<(), StoreError> {
        let blob = self
            .master
            .seal(&secret.to_bytes())
            .map_err(|_| StoreError::Corrupted)?;
        self.write_locked(&self.dir.join(IDENTITY_FILE), &blob)
    }

    pub fn load_identity(&self) -> Result<Option<StaticSecret>, StoreError> {
        let path = self.dir.join(IDENTITY_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let blob = fs::read(&path)?;
        let bytes = self.master.open(&blob).map_err(|_| StoreError::Corrupted)?;
        let arr: [u8; 32] = bytes.try_into().map_err(|_| StoreError::Corrupted)?;
        Ok(Some(StaticSecret::from(arr)))
    }

    // ── session keys ───────────────────────────────────────────────────

    /// Persist a session key together with its send-sequence floor (the
    /// counter value as of this save; restores must resume above it).
    pub fn save_session_key(
        &self,
        conversation: &ConversationId,
        key: &SessionKey,
        send_seq: u64,
    ) -> Result<(), StoreError> {
        let mut plain = [0u8; KEY_LEN + 8];
        plain[..KEY_LEN].copy_from_slice(key.as_bytes());
        plain[KEY_LEN..].copy_from_slice(&send_seq.to_be_bytes());
        let blob = self.master.seal(&plain).map_err(|_| StoreError::Corrupted)?;
        self.write_locked(&self.session_path(conversation), &blob)
    }

    pub fn load_session_key(
        &self,
        conversation: &ConversationId,
    ) -> Result<Option<(SessionKey, u64)>, StoreError> {
        let path = self.session_path(conversation);
        if !path.exists() {
            return Ok(None);
        }
        let blob = fs::read(&path)?;
        let bytes = self.master.open(&blob).map_err(|_| StoreError::Corrupted)?;
        if bytes.len() != KEY_LEN + 8 {
            return Err(StoreError::Corrupted);
        }
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&bytes[..KEY_LEN]);
        let send_seq = u64::from_be_bytes(bytes[KEY_LEN..].try_into().expect("fixed slice"));
        Ok(Some((SessionKey::from_bytes(key), send_seq)))
    }

    /// Every persisted session, for restoring a manager at login.
    pub fn load_all_session_keys(
        &self,
    ) -> Result<Vec<(ConversationId, SessionKey, u64)>, StoreError> {
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(conv) = name
                .strip_prefix(SESSION_PREFIX)
                .and_then(|s| s.strip_suffix(SESSION_SUFFIX))
            else {
                continue;
            };
            let conversation = ConversationId::from_raw(conv);
            if let Some((key, send_seq)) = self.load_session_key(&conversation)? {
                out.push((conversation, key, send_seq));
            }
        }
        Ok(out)
    }

    /// Shred and remove one session key (conversation deleted or key
    /// rotated away).
    pub fn delete_session_key(&self, conversation: &ConversationId) -> Result<(), StoreError> {
        let path = self.session_path(conversation);
        let lock = self.path_lock(&path);
        let _guard = lock.lock().expect("store path lock poisoned");
        shred(&path)?;
        Ok(())
    }

    fn session_path(&self, conversation: &ConversationId) -> PathBuf {
        self.dir
            .join(format!("{SESSION_PREFIX}{}{SESSION_SUFFIX}", conversation.as_str()))
    }

    // ── plumbing ───────────────────────────────────────────────────────

    fn path_lock(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().expect("store lock map poisoned");
        locks.entry(path.to_path_buf()).or_default().clone()
    }

    fn write_locked(&self, path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
        let lock = self.path_lock(path);
        let _guard = lock.lock().expect("store path lock poisoned");
        write_atomic(&self.dir, path, bytes)?;
        Ok(())
    }
}

/// Create the store directory with owner-only permissions.
fn create_private_dir(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;
    }
    Ok(())
}

/// Write-to-tmp, fsync, rename — in the same directory so the rename is
/// atomic on POSIX filesystems.
fn write_atomic(dir: &Path, path: &Path, bytes: &[u8]) -> io::Result<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("blob");
    let tmp = dir.join(format!("{file_name}.tmp"));

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut f = options.open(&tmp)?;
    f.write_all(bytes)?;
    f.sync_all()?;
    drop(f);

    fs::rename(&tmp, path)?;
    Ok(())
}

/// Overwrite with random bytes [`SHRED_PASSES`] times, then unlink.
/// Best-effort: filesystems may still keep old blocks around.
fn shred(path: &Path) -> io::Result<()> {
    let len = match fs::metadata(path) {
        Ok(m) => m.len() as usize,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    let mut f = OpenOptions::new().write(true).open(path)?;
    for _ in 0..SHRED_PASSES {
        let mut noise = vec![0u8; len];
        getrandom::getrandom(&mut noise).expect("getrandom");
        f.seek(SeekFrom::Start(0))?;
        f.write_all(&noise)?;
        f.sync_all()?;
    }
    drop(f);
    fs::remove_file(path)
}

/// Read a file that must hold exactly `N` bytes.
fn read_exact_file<const N: usize>(path: &Path) -> Result<Option<[u8; N]>, io::Error> {
    let mut f = File::open(path)?;
    let mut buf = [0u8; N];
    match f.read_exact(&mut buf) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    Ok(Some(buf))
}
