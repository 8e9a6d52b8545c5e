//! Credential registration and verification collaborator.
//!
//! # Responsibility
//! - Hash and verify login secrets (SHA-256 over UTF-8, Base64-encoded).
//! - Register a username together with its linked client record.
//!
//! # Invariants
//! - Usernames are compared case-sensitively and are globally unique.
//! - A failed registration leaves both the user and client collections
//!   unchanged.
//!
//! The core only consumes a verify capability; presentation of auth failures
//! is the caller's concern.

use crate::model::{ClientId, UserId};
use crate::repo::StorageBackend;
use crate::store::{EntityGraphStore, StoreResult};
use base64::{engine::general_purpose, Engine as _};
use sha2::{Digest, Sha256};

/// Contact value assigned to clients created through registration, until the
/// user fills in real details.
const REGISTRATION_CONTACT: &str = "default@example.com";

/// Hashes a login secret for storage.
pub fn hash_password(secret: &str) -> String {
    general_purpose::STANDARD.encode(Sha256::digest(secret.as_bytes()))
}

/// Checks a supplied secret against a stored hash.
pub fn verify_password(secret: &str, stored_hash: &str) -> bool {
    hash_password(secret) == stored_hash
}

/// Registers a new username and creates its linked client in one atomic
/// write.
///
/// # Errors
/// - `StoreError::DuplicateUsername` when the name is already taken.
/// - `StoreError::Persistence` when the durable write fails.
pub fn register_user<B: StorageBackend>(
    store: &mut EntityGraphStore<B>,
    username: &str,
    secret: &str,
) -> StoreResult<(UserId, ClientId)> {
    store.register_credential(username, &hash_password(secret), REGISTRATION_CONTACT)
}

/// Verifies a login attempt. Returns the credential id on success, `None` on
/// unknown username or wrong secret; the two cases are deliberately not
/// distinguished.
pub fn authenticate<B: StorageBackend>(
    store: &EntityGraphStore<B>,
    username: &str,
    secret: &str,
) -> Option<UserId> {
    let user = store.user_by_username(username)?;
    verify_password(secret, &user.password_hash).then_some(user.id)
}
