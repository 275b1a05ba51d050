//! One-way hashing for account passwords and certificate passphrases
//!
//! Hashes are Argon2id PHC strings (`$argon2id$v=19$...`) so the salt and
//! parameters travel with the hash.

use anyhow::{anyhow, Result};
use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

pub fn hash_secret(secret: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map_err(|e| anyhow!("Failed to hash secret: {}", e))?;
    Ok(hash.to_string())
}

/// `Ok(false)` on mismatch; `Err` only when the stored hash is unreadable.
pub fn verify_secret(secret: &str, stored_hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| anyhow!("Invalid stored hash format: {}", e))?;
    Ok(Argon2::default()
        .verify_password(secret.as_bytes(), &parsed)
        .is_ok())
}

/// Hash on the blocking pool; Argon2 is deliberately slow.
pub async fn hash_secret_blocking(secret: String) -> Result<String> {
    tokio::task::spawn_blocking(move || hash_secret(&secret)).await?
}

pub async fn verify_secret_blocking(secret: String, stored_hash: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || verify_secret(&secret, &stored_hash)).await?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_secret("password1").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_secret("password1", &hash).unwrap());
        assert!(!verify_secret("password2", &hash).unwrap());
    }

    #[test]
    fn test_same_secret_different_salt() {
        let first = hash_secret("same").unwrap();
        let second = hash_secret("same").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_garbage_hash_is_an_error() {
        assert!(verify_secret("x", "not-a-phc-string").is_err());
    }

    #[tokio::test]
    async fn test_blocking_wrappers() {
        let hash = hash_secret_blocking("password1".to_string()).await.unwrap();
        assert!(verify_secret_blocking("password1".to_string(), hash).await.unwrap());
    }
}
