//! Encrypted password support
//!
//! Passwords may be stored encrypted with an RSA private key (raw RSA over a
//! PKCS#1 v1.5 type 1 block, the format produced by Druid's `ConfigTools`).
//! The matching X.509 public key, Base64 encoded, decrypts them.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use minidruid_core::{MiniDruidError, Result};
use rsa::pkcs8::DecodePublicKey;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPublicKey};

use crate::config::PoolConfig;

/// Decrypts passwords with an RSA public key
#[derive(Clone)]
pub struct PasswordDecryptor {
    key: RsaPublicKey,
}

impl PasswordDecryptor {
    /// Build a decryptor from a Base64 encoded X.509 (SPKI) public key
    pub fn from_base64(public_key: &str) -> Result<Self> {
        let trimmed = public_key.trim();
        if trimmed.is_empty() {
            return Err(MiniDruidError::Security("public key is empty".into()));
        }
        let der = B64
            .decode(trimmed)
            .map_err(|e| MiniDruidError::Security(format!("invalid public key base64: {}", e)))?;
        let key = RsaPublicKey::from_public_key_der(&der)
            .map_err(|e| MiniDruidError::Security(format!("invalid public key: {}", e)))?;
        Ok(Self { key })
    }

    /// Decrypt a Base64 encoded cipher text
    pub fn decrypt_base64(&self, cipher_b64: &str) -> Result<String> {
        let cipher = B64.decode(cipher_b64.trim()).map_err(|e| {
            MiniDruidError::Security(format!("invalid password base64: {}", e))
        })?;

        let size = self.key.size();
        if cipher.len() != size {
            return Err(MiniDruidError::Security(format!(
                "cipher text is {} bytes, key size is {}",
                cipher.len(),
                size
            )));
        }

        let m = rsa::hazmat::rsa_encrypt(&self.key, &BigUint::from_bytes_be(&cipher))
            .map_err(|e| MiniDruidError::Security(format!("rsa operation failed: {}", e)))?;

        let mut block = m.to_bytes_be();
        if block.len() > size {
            return Err(MiniDruidError::Security("malformed cipher text".into()));
        }
        // restore the leading zero byte dropped by the big integer
        let mut padded = vec![0u8; size - block.len()];
        padded.append(&mut block);

        let plain = strip_type1_padding(&padded)?;
        String::from_utf8(plain.to_vec())
            .map_err(|_| MiniDruidError::Security("decrypted password is not UTF-8".into()))
    }
}

/// `00 01 FF .. FF 00 message`
fn strip_type1_padding(block: &[u8]) -> Result<&[u8]> {
    let malformed = || MiniDruidError::Security("password padding check failed".into());

    if block.len() < 11 || block[0] != 0x00 || block[1] != 0x01 {
        return Err(malformed());
    }
    let separator = block[2..]
        .iter()
        .position(|b| *b != 0xFF)
        .map(|offset| offset + 2)
        .ok_or_else(malformed)?;
    // at least 8 bytes of 0xFF filler
    if separator < 10 || block[separator] != 0x00 {
        return Err(malformed());
    }
    Ok(&block[separator + 1..])
}

/// Resolve the password a pool connects with
///
/// Without a public key the configured password is used as-is.
pub fn resolve_password(config: &PoolConfig) -> Result<String> {
    match config.password_public_key() {
        Some(key) => {
            let decryptor = PasswordDecryptor::from_base64(key)?;
            let password = decryptor.decrypt_base64(config.password())?;
            tracing::debug!(name = %config.name(), "password decrypted");
            Ok(password)
        }
        None => Ok(config.password().to_string()),
    }
}
