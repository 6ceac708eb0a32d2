//! Password hashing with bcrypt

/// Cost factor for bcrypt hashing (12 is recommended for production)
const BCRYPT_COST: u32 = 12;

#[derive(Debug, thiserror::Error)]
#[error("Password hashing failed: {0}")]
pub struct CryptError(#[from] bcrypt::BcryptError);

/// Hashes and verifies secrets
#[derive(Debug, Clone, Copy)]
pub struct CryptService {
    cost: u32,
}

impl Default for CryptService {
    fn default() -> Self {
        Self { cost: BCRYPT_COST }
    }
}

impl CryptService {
    /// Service with a custom cost factor (tests use the minimum)
    pub fn with_cost(cost: u32) -> Self {
        Self { cost }
    }

    /// Hash a secret with a fresh salt
    pub fn hash(&self, secret: &str) -> Result<String, CryptError> {
        Ok(bcrypt::hash(secret, self.cost)?)
    }

    /// Check a secret against a stored hash
    ///
    /// A malformed hash counts as a mismatch.
    pub fn verify(&self, secret: &str, hash: &str) -> bool {
        bcrypt::verify(secret, hash).unwrap_or(false)
    }
}
