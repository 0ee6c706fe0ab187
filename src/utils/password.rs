//! Password hashing with PBKDF2-HMAC-SHA256.
//!
//! Stored format: `pbkdf2_sha256$<iterations>$<salt hex>$<hash hex>`.

use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;

use crate::error::AppError;

const ALGORITHM: &str = "pbkdf2_sha256";
const ITERATIONS: u32 = 260_000;
const SALT_LENGTH: usize = 16;
const KEY_LENGTH: usize = 32;

/// Hash a password with a fresh random salt.
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LENGTH];
    rand::rng().fill_bytes(&mut salt);

    let mut key = [0u8; KEY_LENGTH];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, ITERATIONS, &mut key);

    format!(
        "{ALGORITHM}${ITERATIONS}${}${}",
        hex::encode(salt),
        hex::encode(key)
    )
}

/// Check a password against a stored hash.
///
/// A malformed stored hash is an internal error, not a failed login.
pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool, AppError> {
    let malformed = || AppError::Internal("Invalid password hash format".to_string());

    let mut parts = stored_hash.split('$');
    let (Some(algorithm), Some(iterations), Some(salt), Some(expected), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return Err(malformed());
    };

    if algorithm != ALGORITHM {
        return Err(malformed());
    }

    let iterations: u32 = iterations.parse().map_err(|_| malformed())?;
    let salt = hex::decode(salt).map_err(|_| malformed())?;
    let expected = hex::decode(expected).map_err(|_| malformed())?;

    let mut computed = vec![0u8; expected.len()];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, iterations, &mut computed);

    Ok(constant_time_eq(&computed, &expected))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
