//! # Credentials
//!
//! Password digests, opaque tokens and one-time codes.
//!
//! Passwords are hashed with BLAKE3 in derive-key mode over `salt || password`
//! and compared in constant time.

use rand::Rng;
use subtle::ConstantTimeEq;

/// Domain-separation context for password digests.
const PASSWORD_CONTEXT: &str = "connectup 2024-01-01 password digest v1";

/// Minimum accepted password length (in characters).
pub const MIN_PASSWORD_LEN: usize = 8;

/// Number of digits in a one-time code.
pub const OTP_DIGITS: usize = 6;

/// A stored password digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordDigest {
    pub salt: String,
    pub hash: String,
}

/// Hash a password with a fresh random salt.
#[must_use]
pub fn hash_password(password: &str) -> PasswordDigest {
    let salt = new_token();
    let hash = digest(&salt, password);
    PasswordDigest { salt, hash }
}

/// Check a password against a stored salt and hash.
#[must_use]
pub fn verify_password(password: &str, salt: &str, expected_hash: &str) -> bool {
    let actual = digest(salt, password);
    constant_time_eq(&actual, expected_hash)
}

fn digest(salt: &str, password: &str) -> String {
    let mut hasher = blake3::Hasher::new_derive_key(PASSWORD_CONTEXT);
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Constant-time string comparison.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// New opaque token (UUID v4, hyphenless).
#[must_use]
pub fn new_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// New numeric one-time code with [`OTP_DIGITS`] digits (leading zeros kept).
#[must_use]
pub fn new_otp_code() -> String {
    let mut rng = rand::thread_rng();
    (0..OTP_DIGITS)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

/// Validate a new password.
pub fn check_password_strength(password: &str) -> crate::CoreResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(crate::CoreError::invalid(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}
