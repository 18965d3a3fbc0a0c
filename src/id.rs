//! Random identifier and credential generation
//!
//! User identifiers carry a `usr_` prefix with 96 bits of entropy. Login
//! tokens and session tokens are raw URL-safe strings with 256 bits of
//! entropy, since they are bearer credentials rather than identifiers.

use base64::{Engine, prelude::BASE64_URL_SAFE_NO_PAD};
use rand::{TryRngCore, rngs::OsRng};

/// Number of random bytes in a bearer credential (login or session token).
pub const CREDENTIAL_BYTES: usize = 32;

/// Generate a prefixed ID of the form `{prefix}_{base64url}` with 96 bits
/// of entropy.
pub fn generate_prefixed_id(prefix: &str) -> String {
    let mut bytes = [0u8; 12];
    OsRng.try_fill_bytes(&mut bytes).unwrap();

    let encoded = BASE64_URL_SAFE_NO_PAD.encode(bytes);

    format!("{prefix}_{encoded}")
}

/// Generate an unprefixed, URL-safe credential string with 256 bits of
/// entropy. Collisions across the lifetime of a deployment are
/// cryptographically negligible, which is what makes the generated value
/// usable as a primary lookup key.
pub fn generate_credential() -> String {
    let mut bytes = [0u8; CREDENTIAL_BYTES];
    OsRng.try_fill_bytes(&mut bytes).unwrap();
    BASE64_URL_SAFE_NO_PAD.encode(bytes)
}

/// Validate that a prefixed ID has the expected prefix and enough entropy.
pub fn validate_prefixed_id(id: &str, expected_prefix: &str) -> bool {
    let Some(random_part) = id
        .strip_prefix(expected_prefix)
        .and_then(|rest| rest.strip_prefix('_'))
    else {
        return false;
    };

    match BASE64_URL_SAFE_NO_PAD.decode(random_part) {
        Ok(decoded) => decoded.len() >= 12,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_prefixed_id() {
        let id = generate_prefixed_id("usr");
        assert!(id.starts_with("usr_"));

        let id2 = generate_prefixed_id("usr");
        assert_ne!(id, id2);
    }

    #[test]
    fn test_validate_prefixed_id() {
        let id = generate_prefixed_id("usr");
        assert!(validate_prefixed_id(&id, "usr"));
        assert!(!validate_prefixed_id(&id, "sess"));

        assert!(!validate_prefixed_id("usr", "usr"));
        assert!(!validate_prefixed_id("usr_", "usr"));
        assert!(!validate_prefixed_id("usr_invalid!", "usr"));
    }

    #[test]
    fn test_credential_length_and_charset() {
        let token = generate_credential();
        // 32 bytes base64url without padding is 43 characters.
        assert!(token.len() > 32);
        assert!(
            token
                .chars()
                .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
        );
    }

    #[test]
    fn test_credential_uniqueness() {
        let a = generate_credential();
        let b = generate_credential();
        assert_ne!(a, b);
    }
}
