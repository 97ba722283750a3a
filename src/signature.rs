//! Database signatures
//!
//! A database is signed by computing the SHA-256 digest of everything
//! before the signature trailer and signing that digest with Ed25519. Keys
//! are exchanged as PEM (PKCS#8 private keys, SPKI public keys).

use crate::error::{LocError, Result};
use ed25519_dalek::pkcs8::{
    spki::der::pem::LineEnding, DecodePrivateKey, DecodePublicKey, EncodePrivateKey,
    EncodePublicKey,
};
use ed25519_dalek::{Signature, Signer, Verifier};
use rand::Rng;
use sha2::{Digest, Sha256};
use std::path::Path;

pub use ed25519_dalek::{SigningKey, VerifyingKey};

/// Length of an encoded signature
pub const SIGNATURE_LENGTH: usize = ed25519_dalek::SIGNATURE_LENGTH;

/// SHA-256 digest of the signed payload
pub fn digest(payload: &[u8]) -> [u8; 32] {
    Sha256::digest(payload).into()
}

/// Sign a payload
pub fn sign(key: &SigningKey, payload: &[u8]) -> [u8; SIGNATURE_LENGTH] {
    key.sign(&digest(payload)).to_bytes()
}

/// Check a signature over a payload
///
/// # Errors
/// - `Signature` if the signature is malformed or does not match
pub fn verify(key: &VerifyingKey, payload: &[u8], signature: &[u8]) -> Result<()> {
    if signature.len() != SIGNATURE_LENGTH {
        return Err(LocError::Signature(format!(
            "Ed25519 signature must be {} bytes, got {}",
            SIGNATURE_LENGTH,
            signature.len()
        )));
    }

    let sig =
        Signature::from_slice(signature).map_err(|e| LocError::Signature(e.to_string()))?;

    key.verify(&digest(payload), &sig)
        .map_err(|_| LocError::Signature("signature does not match payload".to_string()))
}

/// Generate a new random signing key
pub fn generate_signing_key() -> SigningKey {
    let mut secret = [0u8; 32];
    rand::rng().fill(&mut secret);
    SigningKey::from_bytes(&secret)
}

/// Parse a PKCS#8 PEM private key
pub fn signing_key_from_pem(pem: &str) -> Result<SigningKey> {
    SigningKey::from_pkcs8_pem(pem).map_err(|e| LocError::Key(e.to_string()))
}

/// Parse an SPKI PEM public key
pub fn verifying_key_from_pem(pem: &str) -> Result<VerifyingKey> {
    VerifyingKey::from_public_key_pem(pem).map_err(|e| LocError::Key(e.to_string()))
}

/// Read a PEM private key from a file
pub fn load_signing_key<P: AsRef<Path>>(path: P) -> Result<SigningKey> {
    signing_key_from_pem(&std::fs::read_to_string(path)?)
}

/// Read a PEM public key from a file
pub fn load_verifying_key<P: AsRef<Path>>(path: P) -> Result<VerifyingKey> {
    verifying_key_from_pem(&std::fs::read_to_string(path)?)
}

/// Encode a private key as PKCS#8 PEM
pub fn signing_key_to_pem(key: &SigningKey) -> Result<String> {
    key.to_pkcs8_pem(LineEnding::LF)
        .map(|pem| pem.as_str().to_owned())
        .map_err(|e| LocError::Key(e.to_string()))
}

/// Encode a public key as SPKI PEM
pub fn verifying_key_to_pem(key: &VerifyingKey) -> Result<String> {
    key.to_public_key_pem(LineEnding::LF)
        .map_err(|e| LocError::Key(e.to_string()))
}
