mod common;

use aerospectro_core::auth::{authenticate, hash_password, register_user};
use aerospectro_core::{EntityGraphStore, SqliteBackend, StoreError};
use common::{in_memory_store, table_count, FlakyBackend};

#[test]
fn registration_creates_user_and_linked_client_together() {
    let mut store = in_memory_store();

    let (user_id, client_id) = register_user(&mut store, "surveyor", "s3cret").unwrap();

    let client = store.client(client_id).unwrap();
    assert_eq!(client.user_id, Some(user_id));
    assert_eq!(client.name, "surveyor");

    let user = store.user_by_username("surveyor").unwrap();
    assert_eq!(user.id, user_id);
    assert_eq!(user.password_hash, hash_password("s3cret"));

    let conn = store.backend().connection();
    assert_eq!(table_count(conn, "users"), 1);
    assert_eq!(table_count(conn, "clients"), 1);
}

#[test]
fn duplicate_username_is_rejected_and_nothing_changes() {
    let mut store = in_memory_store();
    register_user(&mut store, "taken", "first").unwrap();

    let err = register_user(&mut store, "taken", "second").unwrap_err();
    assert!(matches!(err, StoreError::DuplicateUsername(name) if name == "taken"));

    assert_eq!(store.users().count(), 1);
    assert_eq!(store.clients().count(), 1);
    // The original credential still verifies.
    assert!(authenticate(&store, "taken", "first").is_some());
}

#[test]
fn username_comparison_is_case_sensitive() {
    let mut store = in_memory_store();
    register_user(&mut store, "Surveyor", "pw").unwrap();

    // Different case is a different username.
    register_user(&mut store, "surveyor", "pw").unwrap();
    assert_eq!(store.users().count(), 2);
}

#[test]
fn failed_registration_write_leaves_both_collections_unchanged() {
    let backend = SqliteBackend::open_in_memory().unwrap();
    let (flaky, fail_writes) = FlakyBackend::new(backend);
    let mut store = EntityGraphStore::load(flaky).unwrap();

    fail_writes.set(true);
    let err = register_user(&mut store, "ghost", "pw").unwrap_err();
    assert!(matches!(err, StoreError::Persistence(_)));

    assert_eq!(store.users().count(), 0);
    assert_eq!(store.clients().count(), 0);
    assert_eq!(table_count(store.backend().connection(), "users"), 0);

    // Registration works after recovery, and the username is still free.
    fail_writes.set(false);
    register_user(&mut store, "ghost", "pw").unwrap();
    assert!(authenticate(&store, "ghost", "pw").is_some());
}

#[test]
fn authenticate_rejects_wrong_secret_and_unknown_user() {
    let mut store = in_memory_store();
    let (user_id, _) = register_user(&mut store, "pilot", "correct").unwrap();

    assert_eq!(authenticate(&store, "pilot", "correct"), Some(user_id));
    assert_eq!(authenticate(&store, "pilot", "wrong"), None);
    assert_eq!(authenticate(&store, "nobody", "correct"), None);
}
