//! Integration tests for runnerhost-vault: keychain plus on-disk store.

use runnerhost_vault::{FileKeychain, SecureStore, keychain};

#[test]
fn secrets_survive_reopen_with_keychain_master_key() {
    let dir = tempfile::tempdir().unwrap();
    let keychain = FileKeychain::new(FileKeychain::default_path(dir.path()));
    let db_path = dir.path().join("secure.db");

    {
        let key = keychain::load_or_create_master_key(&keychain).unwrap();
        let store = SecureStore::open(&db_path, &key).unwrap();
        store.set("com.example", "password", "\"hunter2\"").unwrap();
    }

    let key = keychain::load_or_create_master_key(&keychain).unwrap();
    let store = SecureStore::open(&db_path, &key).unwrap();
    assert_eq!(
        store.get("com.example", "password").unwrap().as_deref(),
        Some("\"hunter2\"")
    );
}

#[test]
fn different_master_key_cannot_read() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("secure.db");

    let key_a = runnerhost_vault::crypto::generate_key().unwrap();
    SecureStore::open(&db_path, &key_a)
        .unwrap()
        .set("r", "k", "v")
        .unwrap();

    let key_b = runnerhost_vault::crypto::generate_key().unwrap();
    let store = SecureStore::open(&db_path, &key_b).unwrap();
    assert!(store.get("r", "k").is_err());
}
