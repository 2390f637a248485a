use base64::{engine::general_purpose, Engine as _};
use constant_time_eq::constant_time_eq;
use pbkdf2::hmac::Hmac;
use pbkdf2::pbkdf2;
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::Sha256;
use tracing::warn;

const ALGORITHM: &str = "pbkdf2_sha256";
const SALT_LEN: usize = 22;

/// Work factor for new hashes. Existing hashes keep the count stored in them.
pub const DEFAULT_ITERATIONS: u32 = 600_000;

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("Key derivation failed: {0}")]
    Derivation(String),
}

/// Hash a password in `pbkdf2_sha256$<iterations>$<salt>$<base64>` format
pub fn hash_password(password: &str, iterations: u32) -> Result<String, PasswordError> {
    let salt: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SALT_LEN)
        .map(char::from)
        .collect();

    let digest = derive(password, &salt, iterations)?;
    Ok(format!("{ALGORITHM}${iterations}${salt}${digest}"))
}

/// Check a password against a stored hash in constant time.
/// Malformed hashes never verify.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.splitn(4, '$');
    let (Some(algorithm), Some(iterations), Some(salt), Some(expected)) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };

    if algorithm != ALGORITHM {
        warn!(algorithm, "Unsupported password hash algorithm");
        return false;
    }

    let Ok(iterations) = iterations.parse::<u32>() else {
        return false;
    };
    if iterations == 0 {
        return false;
    }

    match derive(password, salt, iterations) {
        Ok(computed) => constant_time_eq(computed.as_bytes(), expected.as_bytes()),
        Err(_) => false,
    }
}

fn derive(password: &str, salt: &str, iterations: u32) -> Result<String, PasswordError> {
    let mut output = [0u8; 32];
    pbkdf2::<Hmac<Sha256>>(password.as_bytes(), salt.as_bytes(), iterations, &mut output)
        .map_err(|e| PasswordError::Derivation(e.to_string()))?;
    Ok(general_purpose::STANDARD.encode(output))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Keep the tests fast; the format is identical regardless of the count
    const TEST_ITERATIONS: u32 = 1_000;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("secreto123", TEST_ITERATIONS).unwrap();
        assert!(hash.starts_with("pbkdf2_sha256$1000$"));
        assert_eq!(hash.split('$').count(), 4);

        assert!(verify_password("secreto123", &hash));
        assert!(!verify_password("secreto124", &hash));
    }

    #[test]
    fn test_salts_differ() {
        let a = hash_password("same", TEST_ITERATIONS).unwrap();
        let b = hash_password("same", TEST_ITERATIONS).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_known_vector() {
        // PBKDF2-HMAC-SHA256("password", "salt", 1), 32 byte output
        let stored = "pbkdf2_sha256$1$salt$Eg+2z/z4syxD5yJSVsT4N6hlSMkszDVICAWYfLcL4Xs=";
        assert!(verify_password("password", stored));
    }

    #[test]
    fn test_malformed_hashes_never_verify() {
        assert!(!verify_password("x", ""));
        assert!(!verify_password("x", "pbkdf2_sha256$abc$salt$hash"));
        assert!(!verify_password("x", "pbkdf2_sha256$0$salt$hash"));
        assert!(!verify_password("x", "bcrypt$10$salt$hash"));
        assert!(!verify_password("x", "sha256$deadbeef"));
    }
}
