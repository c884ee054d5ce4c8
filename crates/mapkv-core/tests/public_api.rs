//! End-to-end smoke test over the public surface only: initialization,
//! the default root, the registry and typed access.

use mapkv_core::{Store, StoreMode, SyncMode};
use tempfile::TempDir;

#[test]
fn test_initialize_and_open_default() {
    let dir = TempDir::new().expect("temp dir");
    Store::initialize(dir.path()).expect("initialize");

    let kv = Store::open_default("app-settings", StoreMode::SingleProcess, None)
        .expect("open default");
    assert!(kv.set_string("locale", "en-US"));
    assert!(kv.set_bool("onboarded", true));
    kv.sync(SyncMode::Sync);

    // the same id resolves to the same live handle
    let again = Store::open_default("app-settings", StoreMode::SingleProcess, None)
        .expect("open again");
    assert_eq!(again.get_string("locale").as_deref(), Some("en-US"));
    assert!(again.get_bool("onboarded", false));

    assert!(Store::is_file_valid(dir.path(), "app-settings"));
    kv.close();
}

#[test]
fn test_open_with_explicit_root() {
    let dir = TempDir::new().expect("temp dir");

    let kv = Store::open(dir.path(), "explicit", StoreMode::SingleProcess, None).expect("open");
    for i in 0..100u64 {
        assert!(kv.set_u64(&format!("key_{i}"), i << 32));
    }
    assert_eq!(kv.count(), 100);
    assert_eq!(kv.get_u64("key_42", 0), 42u64 << 32);

    kv.trim();
    assert_eq!(kv.count(), 100);
    kv.close();

    let reopened =
        Store::open(dir.path(), "explicit", StoreMode::SingleProcess, None).expect("reopen");
    assert_eq!(reopened.get_u64("key_99", 0), 99u64 << 32);
    reopened.close();
}

#[test]
fn test_encrypted_namespace_via_public_api() {
    let dir = TempDir::new().expect("temp dir");
    let key = b"sixteen byte key";

    let kv = Store::open(dir.path(), "vault", StoreMode::SingleProcess, Some(key)).expect("open");
    assert!(kv.set_string("token", "s3cr3t-value"));
    kv.sync(SyncMode::Sync);
    kv.close();

    let kv = Store::open(dir.path(), "vault", StoreMode::SingleProcess, Some(key)).expect("reopen");
    assert_eq!(kv.get_string("token").as_deref(), Some("s3cr3t-value"));
    kv.close();
}
