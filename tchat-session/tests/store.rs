use tchat_crypto::{generate_keypair, PublicKey, SessionKey};
use tchat_session::{ConversationId, KeyStore, StoreError};

#[test]
fn identity_roundtrips_through_password_store() {
    let dir = tempfile::tempdir().unwrap();
    let (secret, public) = generate_keypair();

    {
        let store = KeyStore::open_with_password(dir.path(), 5, "hunter2").unwrap();
        store.save_identity(&secret).unwrap();
    }

    let store = KeyStore::open_with_password(dir.path(), 5, "hunter2").unwrap();
    let loaded = store.load_identity().unwrap().expect("identity must persist");
    assert_eq!(PublicKey::from(&loaded).as_bytes(), public.as_bytes());
}

#[test]
fn wrong_password_is_corrupted_not_garbage() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = KeyStore::open_with_password(dir.path(), 5, "hunter2").unwrap();
        store.save_identity(&generate_keypair().0).unwrap();
    }
    assert!(matches!(
        KeyStore::open_with_password(dir.path(), 5, "letmein"),
        Err(StoreError::Corrupted)
    ));
}

#[test]
fn session_keys_roundtrip_and_enumerate() {
    let dir = tempfile::tempdir().unwrap();
    let store = KeyStore::open_with_password(dir.path(), 5, "pw").unwrap();

    let conv7 = ConversationId::private(7);
    let conv_g = ConversationId::group(100);
    store.save_session_key(&conv7, &SessionKey::from_bytes([1; 32]), 42).unwrap();
    store.save_session_key(&conv_g, &SessionKey::from_bytes([2; 32]), 7).unwrap();

    let (key, send_seq) = store.load_session_key(&conv7).unwrap().unwrap();
    assert_eq!(key, SessionKey::from_bytes([1; 32]));
    assert_eq!(send_seq, 42, "the send-sequence floor must persist");

    let mut all = store.load_all_session_keys().unwrap();
    all.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].0.as_str(), "group_100");
    assert_eq!(all[0].2, 7);
    assert_eq!(all[1].0.as_str(), "private_7");
}

#[test]
fn missing_key_reads_as_none() {
    let dir = tempfile::tempdir().unwrap();
    let store = KeyStore::open_with_password(dir.path(), 5, "pw").unwrap();
    assert!(store.load_session_key(&ConversationId::private(9)).unwrap().is_none());
    assert!(store.load_identity().unwrap().is_none());
}

#[test]
fn save_overwrites_atomically() {
    let dir = tempfile::tempdir().unwrap();
    let store = KeyStore::open_with_password(dir.path(), 5, "pw").unwrap();
    let conv = ConversationId::private(7);

    store.save_session_key(&conv, &SessionKey::from_bytes([1; 32]), 1).unwrap();
    store.save_session_key(&conv, &SessionKey::from_bytes([9; 32]), 5).unwrap();
    let (key, send_seq) = store.load_session_key(&conv).unwrap().unwrap();
    assert_eq!(key, SessionKey::from_bytes([9; 32]));
    assert_eq!(send_seq, 5);

    // No stray .tmp files left behind.
    let leftovers: Vec<_> = std::fs::read_dir(store.dir())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty(), "tmp files must not survive a write");
}

#[test]
fn delete_removes_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let store = KeyStore::open_with_password(dir.path(), 5, "pw").unwrap();
    let conv = ConversationId::private(7);

    store.save_session_key(&conv, &SessionKey::from_bytes([1; 32]), 1).unwrap();
    store.delete_session_key(&conv).unwrap();
    assert!(store.load_session_key(&conv).unwrap().is_none());
    assert!(store.load_all_session_keys().unwrap().is_empty());

    // Deleting twice is fine.
    store.delete_session_key(&conv).unwrap();
}

#[test]
fn corrupted_blob_is_detected() {
    let dir = tempfile::tempdir().unwrap();
    let store = KeyStore::open_with_password(dir.path(), 5, "pw").unwrap();
    let conv = ConversationId::private(7);
    store.save_session_key(&conv, &SessionKey::from_bytes([1; 32]), 1).unwrap();

    // Flip one byte on disk.
    let path = store.dir().join("session_private_7.key");
    let mut bytes = std::fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    std::fs::write(&path, bytes).unwrap();

    assert!(matches!(store.load_session_key(&conv), Err(StoreError::Corrupted)));
}

#[test]
fn passwordless_store_works_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = KeyStore::open_without_password(dir.path(), 5).unwrap();
        store
            .save_session_key(&ConversationId::private(7), &SessionKey::from_bytes([3; 32]), 9)
            .unwrap();
    }
    // Reopen without a password: same master key from disk.
    let store = KeyStore::open_without_password(dir.path(), 5).unwrap();
    let (key, send_seq) = store.load_session_key(&ConversationId::private(7)).unwrap().unwrap();
    assert_eq!(key, SessionKey::from_bytes([3; 32]));
    assert_eq!(send_seq, 9);
}

#[cfg(unix)]
#[test]
fn files_are_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let store = KeyStore::open_with_password(dir.path(), 5, "pw").unwrap();
    store
        .save_session_key(&ConversationId::private(7), &SessionKey::from_bytes([1; 32]), 1)
        .unwrap();

    let dir_mode = std::fs::metadata(store.dir()).unwrap().permissions().mode() & 0o777;
    assert_eq!(dir_mode, 0o700);

    let file_mode = std::fs::metadata(store.dir().join("session_private_7.key"))
        .unwrap()
        .permissions()
        .mode()
        & 0o777;
    assert_eq!(file_mode, 0o600);
}
