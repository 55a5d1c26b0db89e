//! Password hashing for local accounts.

use crate::StoreResult;

/// Default bcrypt cost for new password hashes.
pub const DEFAULT_BCRYPT_COST: u32 = bcrypt::DEFAULT_COST;

/// Hashes a plaintext password.
pub fn hash_password(password: &str, cost: u32) -> StoreResult<String> {
    Ok(bcrypt::hash(password, cost)?)
}

/// Checks a plaintext password against a stored hash.
pub fn verify_password(password: &str, hash: &str) -> StoreResult<bool> {
    Ok(bcrypt::verify(password, hash)?)
}
