use argon2::{
    password_hash::{self, PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use tracing::error;

use crate::config::PasswordConfig;
use crate::error::{AppError, AppResult};

/// Argon2id hashing with a configurable work factor.
#[derive(Clone)]
pub struct PasswordHasher {
    params: Params,
    /// Hash of a random value under the configured params, verified against
    /// when no user matches so both login failures cost the same.
    dummy_hash: String,
}

impl PasswordHasher {
    pub fn new(cfg: &PasswordConfig) -> anyhow::Result<Self> {
        let params = Params::new(cfg.memory_kib, cfg.iterations, cfg.parallelism, None)
            .map_err(|e| anyhow::anyhow!("invalid argon2 params: {e}"))?;
        let mut hasher = Self {
            params,
            dummy_hash: String::new(),
        };
        let filler = SaltString::generate(&mut OsRng);
        hasher.dummy_hash = hasher
            .hash(filler.as_str())
            .map_err(|e| anyhow::anyhow!("precompute dummy hash: {e}"))?;
        Ok(hasher)
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash with a fresh random salt. The result is a PHC string.
    pub fn hash(&self, plain: &str) -> AppResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| {
                error!(error = %e, "argon2 hash_password error");
                AppError::Hashing(e.to_string())
            })?
            .to_string();
        Ok(hash)
    }

    /// `Ok(false)` on mismatch. Errors only when the stored hash is unusable.
    pub fn verify(&self, plain: &str, hash: &str) -> AppResult<bool> {
        let parsed = PasswordHash::new(hash).map_err(|e| {
            error!(error = %e, "argon2 parse hash error");
            AppError::Hashing(e.to_string())
        })?;
        // Parameters come from the PHC string, so older hashes keep verifying
        // after the work factor changes.
        match self.argon2().verify_password(plain.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(e) => {
                error!(error = %e, "argon2 verify_password error");
                Err(AppError::Hashing(e.to_string()))
            }
        }
    }

    /// Spend one full verification without a stored hash. Always `false`.
    pub fn verify_dummy(&self, plain: &str) -> bool {
        let _ = self.verify(plain, &self.dummy_hash);
        false
    }
}

#[cfg(test)]
pub(crate) fn test_hasher() -> PasswordHasher {
    PasswordHasher::new(&PasswordConfig {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    })
    .expect("valid test params")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let hasher = test_hasher();
        let password = "Secur3P@ssw0rd!";
        let hash = hasher.hash(password).expect("hashing should succeed");
        assert!(hasher.verify(password, &hash).expect("verify should succeed"));
        assert!(!hash.contains(password));
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let hasher = test_hasher();
        let hash = hasher
            .hash("correct-horse-battery-staple")
            .expect("hashing should succeed");
        assert!(!hasher
            .verify("wrong-password", &hash)
            .expect("verify should not error"));
    }

    #[test]
    fn salts_differ_per_call() {
        let hasher = test_hasher();
        let a = hasher.hash("same-password").unwrap();
        let b = hasher.hash("same-password").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn verify_errors_on_malformed_hash() {
        let err = test_hasher()
            .verify("anything", "not-a-valid-hash")
            .unwrap_err();
        assert!(matches!(err, AppError::Hashing(_)));
    }

    #[test]
    fn dummy_hash_uses_configured_work_factor() {
        let hasher = test_hasher();
        let parsed = PasswordHash::new(&hasher.dummy_hash).expect("dummy hash is a PHC string");
        assert_eq!(parsed.algorithm.as_str(), "argon2id");
        assert_eq!(parsed.params.get_decimal("m"), Some(1024));
        assert_eq!(parsed.params.get_decimal("t"), Some(1));
        assert!(hasher.verify("anything", &hasher.dummy_hash).is_ok());
        assert!(!hasher.verify_dummy("anything"));
    }

    #[test]
    fn rejects_invalid_work_factor() {
        let res = PasswordHasher::new(&PasswordConfig {
            memory_kib: 1,
            iterations: 0,
            parallelism: 1,
        });
        assert!(res.is_err());
    }
}
