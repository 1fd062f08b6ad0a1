//! HTTP Signature utilities for outbound deliveries.
//!
//! Implements the draft-cavage HTTP Signatures scheme used between federated
//! servers. A delivery is signed over `(request-target)`, `host`, `date` and
//! `digest`, so the receiver can check both the sender and the body.
//! See: <https://datatracker.ietf.org/doc/html/draft-cavage-http-signatures>

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Utc};
use rsa::{
    RsaPrivateKey,
    pkcs1v15::{Signature, SigningKey, VerifyingKey},
    sha2::Sha256,
    signature::{SignatureEncoding, Signer, Verifier},
};
use sha2::{Digest, Sha256 as Sha256Hasher};
use std::collections::HashMap;
use url::Url;

use crate::{AppError, AppResult, crypto};

/// Headers covered by every delivery signature, in signing order.
pub const DELIVERY_SIGNED_HEADERS: &[&str] = &["(request-target)", "host", "date", "digest"];

/// Parsed HTTP Signature header.
#[derive(Debug, Clone)]
pub struct HttpSignature {
    /// Key ID (typically the actor's public key URL)
    pub key_id: String,
    /// Algorithm used (typically "rsa-sha256")
    pub algorithm: String,
    /// Headers included in the signature
    pub headers: Vec<String>,
    /// The signature itself (base64 encoded)
    pub signature: String,
}

impl HttpSignature {
    /// Parse an HTTP Signature header value.
    ///
    /// Format: `keyId="...",algorithm="...",headers="...",signature="..."`
    pub fn parse(header: &str) -> AppResult<Self> {
        let mut key_id = None;
        let mut algorithm = None;
        let mut headers = None;
        let mut signature = None;

        for part in header.split(',') {
            let part = part.trim();
            if let Some((key, value)) = part.split_once('=') {
                let value = value.trim_matches('"');
                match key.trim() {
                    "keyId" => key_id = Some(value.to_string()),
                    "algorithm" => algorithm = Some(value.to_string()),
                    "headers" => headers = Some(value.to_string()),
                    "signature" => signature = Some(value.to_string()),
                    _ => {}
                }
            }
        }

        Ok(Self {
            key_id: key_id.ok_or_else(|| AppError::Signing("Missing keyId".to_string()))?,
            algorithm: algorithm.unwrap_or_else(|| "rsa-sha256".to_string()),
            headers: headers
                .unwrap_or_else(|| "date".to_string())
                .split(' ')
                .map(std::string::ToString::to_string)
                .collect(),
            signature: signature
                .ok_or_else(|| AppError::Signing("Missing signature".to_string()))?,
        })
    }
}

/// Headers to attach to a signed delivery request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    /// `Host` header value (includes a non-default port).
    pub host: String,
    /// `Date` header value in IMF-fixdate format.
    pub date: String,
    /// `Digest` header value (`SHA-256=...`).
    pub digest: String,
    /// `Signature` header value.
    pub signature: String,
}

/// Build the signature string from request components.
///
/// This creates the string that needs to be signed/verified.
pub fn build_signature_string(
    method: &str,
    path: &str,
    headers: &HashMap<String, String>,
    signed_headers: &[String],
) -> AppResult<String> {
    let mut parts = Vec::new();

    for header_name in signed_headers {
        let value = if header_name == "(request-target)" {
            format!("{} {}", method.to_lowercase(), path)
        } else {
            headers
                .get(&header_name.to_lowercase())
                .cloned()
                .ok_or_else(|| AppError::Signing(format!("Missing header: {header_name}")))?
        };

        parts.push(format!("{header_name}: {value}"));
    }

    Ok(parts.join("\n"))
}

/// Verify an HTTP Signature against a PEM encoded public key.
pub fn verify_signature(
    signature: &HttpSignature,
    public_key_pem: &str,
    method: &str,
    path: &str,
    headers: &HashMap<String, String>,
) -> AppResult<bool> {
    let sig_string = build_signature_string(method, path, headers, &signature.headers)?;

    let sig_bytes = BASE64
        .decode(&signature.signature)
        .map_err(|e| AppError::Signing(format!("Invalid signature encoding: {e}")))?;

    let public_key = crypto::parse_public_key(public_key_pem)?;

    let verifying_key = VerifyingKey::<Sha256>::new(public_key);
    let signature_obj = Signature::try_from(sig_bytes.as_slice())
        .map_err(|e| AppError::Signing(format!("Invalid signature format: {e}")))?;

    Ok(verifying_key
        .verify(sig_string.as_bytes(), &signature_obj)
        .is_ok())
}

/// Sign an HTTP request.
///
/// # Arguments
/// * `private_key` - The RSA private key
/// * `key_id` - The key ID (public key URL)
/// * `method` - HTTP method
/// * `path` - Request path
/// * `headers` - Headers to include in signature
pub fn sign_request(
    private_key: &RsaPrivateKey,
    key_id: &str,
    method: &str,
    path: &str,
    headers: &HashMap<String, String>,
    signed_header_names: &[&str],
) -> AppResult<String> {
    let header_names: Vec<String> = signed_header_names
        .iter()
        .map(|s| (*s).to_string())
        .collect();
    let sig_string = build_signature_string(method, path, headers, &header_names)?;

    let signing_key = SigningKey::<Sha256>::new(private_key.clone());
    let signature = signing_key.sign(sig_string.as_bytes());
    let sig_base64 = BASE64.encode(signature.to_bytes());

    Ok(format!(
        r#"keyId="{}",algorithm="rsa-sha256",headers="{}",signature="{}""#,
        key_id,
        signed_header_names.join(" "),
        sig_base64
    ))
}

/// Sign a `POST` of `body` to `target` with a PEM encoded private key.
///
/// Produces every header covered by [`DELIVERY_SIGNED_HEADERS`]. The key is
/// parsed here, so an unusable key is reported as [`AppError::Signing`].
pub fn sign_post(
    private_key_pem: &str,
    key_id: &str,
    target: &Url,
    body: &[u8],
    now: DateTime<Utc>,
) -> AppResult<SignedHeaders> {
    let host = target
        .host_str()
        .ok_or_else(|| AppError::Signing(format!("Inbox URL has no host: {target}")))?;
    let host = match target.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };

    let path = match target.query() {
        Some(query) => format!("{}?{query}", target.path()),
        None => target.path().to_string(),
    };

    let date = http_date(now);
    let digest = calculate_digest(body);

    let mut headers = HashMap::new();
    headers.insert("host".to_string(), host.clone());
    headers.insert("date".to_string(), date.clone());
    headers.insert("digest".to_string(), digest.clone());

    let private_key = crypto::parse_private_key(private_key_pem)?;
    let signature = sign_request(
        &private_key,
        key_id,
        "POST",
        &path,
        &headers,
        DELIVERY_SIGNED_HEADERS,
    )?;

    Ok(SignedHeaders {
        host,
        date,
        digest,
        signature,
    })
}

/// Format a timestamp as an HTTP `Date` header value.
#[must_use]
pub fn http_date(now: DateTime<Utc>) -> String {
    now.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Calculate SHA-256 digest of a body.
#[must_use]
pub fn calculate_digest(body: &[u8]) -> String {
    let mut hasher = Sha256Hasher::new();
    hasher.update(body);
    let hash = hasher.finalize();
    format!("SHA-256={}", BASE64.encode(hash))
}
