use bcrypt::BcryptError;
use tracing::{error, warn};

pub fn hash_password(plain: &str, cost: u32) -> Result<String, BcryptError> {
    bcrypt::hash(plain, cost).map_err(|e| {
        error!(error = %e, "bcrypt hash error");
        e
    })
}

/// Compares a plaintext password against a stored hash. The cost and the salt
/// are read back out of the hash itself; a hash we cannot parse is treated as
/// a mismatch.
pub fn verify_password(plain: &str, hash: &str) -> bool {
    match bcrypt::verify(plain, hash) {
        Ok(matches) => matches,
        Err(e) => {
            warn!(error = %e, "bcrypt verify error");
            false
        }
    }
}
