use pbkdf2::{
    Algorithm, Params, Pbkdf2,
    password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
};
use rand_core::{OsRng, RngCore};
use thiserror::Error;

pub const MIN_ITERATIONS: u32 = 200_000;
pub const MIN_SALT_LEN: usize = 16;
/// PHC salt strings top out at 64 base64 characters.
pub const MAX_SALT_LEN: usize = 48;
const OUTPUT_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("iteration count {0} is below the minimum of {MIN_ITERATIONS}")]
    TooFewIterations(u32),

    #[error("salt length {0} must be between {MIN_SALT_LEN} and {MAX_SALT_LEN} bytes")]
    BadSaltLength(usize),

    #[error("password hashing failed: {0}")]
    Hash(pbkdf2::password_hash::Error),
}

/// Work factor and salt size used for new hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashParams {
    iterations: u32,
    salt_len: usize,
}

impl HashParams {
    pub fn new(iterations: u32, salt_len: usize) -> Result<Self, HashError> {
        if iterations < MIN_ITERATIONS {
            return Err(HashError::TooFewIterations(iterations));
        }
        if !(MIN_SALT_LEN..=MAX_SALT_LEN).contains(&salt_len) {
            return Err(HashError::BadSaltLength(salt_len));
        }
        Ok(Self { iterations, salt_len })
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn salt_len(&self) -> usize {
        self.salt_len
    }
}

impl Default for HashParams {
    fn default() -> Self {
        Self {
            iterations: MIN_ITERATIONS,
            salt_len: MIN_SALT_LEN,
        }
    }
}

/// Derives salted PBKDF2-HMAC-SHA256 hashes with a fixed work factor.
#[derive(Debug, Clone, Copy, Default)]
pub struct PasswordHasher {
    params: HashParams,
}

impl PasswordHasher {
    pub fn new(params: HashParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> HashParams {
        self.params
    }

    /// Hash a plaintext password with a fresh random salt.
    pub fn hash(&self, password: &str) -> Result<String, HashError> {
        let mut salt_bytes = vec![0u8; self.params.salt_len];
        OsRng.fill_bytes(&mut salt_bytes);
        let salt = SaltString::encode_b64(&salt_bytes).map_err(HashError::Hash)?;

        let params = Params {
            rounds: self.params.iterations,
            output_length: OUTPUT_LEN,
        };

        let hash = Pbkdf2
            .hash_password_customized(
                password.as_bytes(),
                Some(Algorithm::Pbkdf2Sha256.ident()),
                None,
                params,
                &salt,
            )
            .map_err(HashError::Hash)?;

        Ok(hash.to_string())
    }
}

/// Check `password` against a stored PHC hash.
///
/// Rounds and salt are read from `stored`. A malformed or foreign hash is
/// a plain `false`, indistinguishable from a wrong password. The final
/// digest comparison is constant-time.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored) else {
        return false;
    };
    Pbkdf2.verify_password(password.as_bytes(), &parsed).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_verify_roundtrip() {
        let hasher = PasswordHasher::default();
        let hash = hasher.hash("password123").unwrap();

        assert_ne!(hash, "password123");
        assert!(verify_password("password123", &hash));
        assert!(!verify_password("password124", &hash));
    }

    #[test]
    fn hash_is_self_describing_and_salted() {
        let hasher = PasswordHasher::new(HashParams::new(210_000, 24).unwrap());
        let a = hasher.hash("hunter22").unwrap();
        let b = hasher.hash("hunter22").unwrap();

        assert!(a.starts_with("$pbkdf2-sha256$i=210000,l=32$"));
        assert_ne!(a, b);

        let parsed = PasswordHash::new(&a).unwrap();
        // 24 bytes of salt encode to 32 unpadded base64 characters
        assert_eq!(parsed.salt.unwrap().as_str().len(), 32);
        assert!(verify_password("hunter22", &b));
    }

    #[test]
    fn verify_uses_embedded_parameters() {
        let strong = PasswordHasher::new(HashParams::new(250_000, 16).unwrap());
        let hash = strong.hash("correct horse").unwrap();

        // Verification needs no hasher, so a config change cannot break old hashes
        assert!(verify_password("correct horse", &hash));
    }

    #[test]
    fn malformed_hash_is_false() {
        assert!(!verify_password("anything", ""));
        assert!(!verify_password("anything", "not-a-hash"));
        assert!(!verify_password("anything", "$pbkdf2-sha256$i=1000$"));
        assert!(!verify_password("anything", "$argon2id$v=19$m=19456,t=2,p=1$c2FsdHNhbHQ$aGFzaA"));
    }

    #[test]
    fn weak_params_rejected() {
        assert!(matches!(
            HashParams::new(1_000, 16),
            Err(HashError::TooFewIterations(1_000))
        ));
        assert!(matches!(HashParams::new(200_000, 8), Err(HashError::BadSaltLength(8))));
        assert!(matches!(HashParams::new(200_000, 64), Err(HashError::BadSaltLength(64))));
        assert!(HashParams::new(200_000, 48).is_ok());
    }
}
