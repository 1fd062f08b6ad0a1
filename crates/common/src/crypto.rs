//! RSA key handling for HTTP Signatures.
//!
//! Actor keys are stored and carried through the delivery queue as PEM text.
//! They are only parsed at the moment a request is signed, so a malformed key
//! surfaces as [`AppError::Signing`] for the one delivery that needs it.
//!
//! # Examples
//!
//! ```
//! use courier_common::crypto::{generate_rsa_keypair, parse_private_key, parse_public_key};
//!
//! let keypair = generate_rsa_keypair().expect("Failed to generate keypair");
//!
//! let _private = parse_private_key(&keypair.private_key_pem).expect("Failed to parse");
//! let _public = parse_public_key(&keypair.public_key_pem).expect("Failed to parse");
//! ```

use rsa::{
    RsaPrivateKey, RsaPublicKey,
    pkcs1::DecodeRsaPrivateKey,
    pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding},
};

use crate::{AppError, AppResult};

/// RSA key pair in PEM format.
#[derive(Debug, Clone)]
pub struct RsaKeypair {
    /// Public key in PEM format (SPKI encoding).
    pub public_key_pem: String,
    /// Private key in PEM format (PKCS#8 encoding).
    pub private_key_pem: String,
}

/// Default RSA key size (2048 bits).
const RSA_KEY_SIZE: usize = 2048;

/// Generate a new 2048-bit RSA key pair.
///
/// Key provisioning belongs to the actor layer; this exists so that tools and
/// tests can produce keys in the same encoding the queue expects.
pub fn generate_rsa_keypair() -> AppResult<RsaKeypair> {
    let mut rng = rand::thread_rng();

    let private_key = RsaPrivateKey::new(&mut rng, RSA_KEY_SIZE)
        .map_err(|e| AppError::Internal(format!("Failed to generate RSA key: {e}")))?;

    let public_key = RsaPublicKey::from(&private_key);

    let private_key_pem = private_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| AppError::Internal(format!("Failed to encode private key: {e}")))?
        .to_string();

    let public_key_pem = public_key
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| AppError::Internal(format!("Failed to encode public key: {e}")))?;

    Ok(RsaKeypair {
        public_key_pem,
        private_key_pem,
    })
}

/// Parse an RSA private key from PEM format.
///
/// Accepts PKCS#8 (`BEGIN PRIVATE KEY`) and, for keys exported by older
/// tooling, PKCS#1 (`BEGIN RSA PRIVATE KEY`).
///
/// # Errors
///
/// Returns [`AppError::Signing`] if the text is empty or is not a valid RSA
/// private key in either encoding.
pub fn parse_private_key(pem: &str) -> AppResult<RsaPrivateKey> {
    let pem = pem.trim();
    if pem.is_empty() {
        return Err(AppError::Signing("Private key is empty".to_string()));
    }

    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|e| AppError::Signing(format!("Failed to parse private key: {e}")))
}

/// Parse an RSA public key from PEM format (SPKI encoding).
///
/// # Errors
///
/// Returns [`AppError::Signing`] if the PEM is not a valid SPKI RSA public key.
pub fn parse_public_key(pem: &str) -> AppResult<RsaPublicKey> {
    RsaPublicKey::from_public_key_pem(pem.trim())
        .map_err(|e| AppError::Signing(format!("Failed to parse public key: {e}")))
}
