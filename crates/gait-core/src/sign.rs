// crates/gait-core/src/sign.rs
// ============================================================================
// Module: Manifest Signing
// Description: Ed25519 signing and verification of canonical manifest bytes.
// Purpose: Make archives tamper-evident with offline-verifiable signatures.
// Dependencies: base64, ed25519-dalek, rand, sha2
// ============================================================================

//! ## Overview
//! Manifests are signed over their canonical bytes; the signature record
//! carries the hex digest of those bytes so verifiers can detect a
//! digest/signature mismatch before checking the signature itself. Key
//! material is raw 32 bytes or base64 text, loaded from an explicit path or
//! environment variable. Dev mode may autogenerate an ephemeral keypair;
//! prod mode requires material. Key bytes never enter any canonical stream
//! and are never logged.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use ed25519_dalek::Signature;
use ed25519_dalek::Signer;
use ed25519_dalek::SigningKey;
use ed25519_dalek::Verifier;
use ed25519_dalek::VerifyingKey;
use rand::rngs::OsRng;
use thiserror::Error;

use crate::jcs::digest_bytes;
use crate::schema::runpack::ManifestSignature;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Signature algorithm label carried in signature records.
pub const SIGNATURE_ALG: &str = "ed25519";
/// Default environment variable holding a base64 private signing key.
pub const SIGNING_KEY_ENV: &str = "GAIT_SIGNING_KEY";
/// Default environment variable holding a base64 public verifying key.
pub const SIGNING_PUBLIC_KEY_ENV: &str = "GAIT_SIGNING_PUBLIC_KEY";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while loading keys or signing/verifying manifests.
#[derive(Debug, Error)]
pub enum SignError {
    /// Key material was missing where required.
    #[error("missing signing key: {0}")]
    MissingKey(String),
    /// Key material was malformed.
    #[error("invalid key material: {0}")]
    InvalidKey(String),
    /// Key file could not be read.
    #[error("read key {path}: {source}")]
    ReadKey {
        /// Path that failed to read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Signature algorithm is not supported.
    #[error("unsupported signature alg: {0}")]
    UnsupportedAlg(String),
    /// Signed digest does not match the recomputed canonical digest.
    #[error("signed digest mismatch")]
    DigestMismatch,
    /// Signature bytes were malformed or did not verify.
    #[error("signature verification failed: {0}")]
    Verification(String),
}

// ============================================================================
// SECTION: Key Pairs
// ============================================================================

/// Ed25519 keypair used for manifest signing.
#[derive(Clone)]
pub struct KeyPair {
    /// Private signing key.
    pub signing: SigningKey,
    /// Public verifying key.
    pub verifying: VerifyingKey,
}

impl std::fmt::Debug for KeyPair {
    // Private key material must never reach logs or debug output.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair").field("key_id", &self.key_id()).finish_non_exhaustive()
    }
}

impl KeyPair {
    /// Generates a fresh keypair from the OS RNG.
    #[must_use]
    pub fn generate() -> Self {
        let signing = SigningKey::generate(&mut OsRng);
        let verifying = signing.verifying_key();
        Self {
            signing,
            verifying,
        }
    }

    /// Returns the key identifier: base64 of the verifying key bytes.
    #[must_use]
    pub fn key_id(&self) -> String {
        BASE64.encode(self.verifying.to_bytes())
    }
}

// ============================================================================
// SECTION: Key Loading
// ============================================================================

/// Key resolution mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyMode {
    /// Autogenerate an ephemeral keypair when no material is supplied.
    #[default]
    Dev,
    /// Require explicit key material.
    Prod,
}

impl FromStr for KeyMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "dev" => Ok(Self::Dev),
            "prod" => Ok(Self::Prod),
            other => Err(format!("invalid key mode: {other}")),
        }
    }
}

/// Key source configuration for signing operations.
#[derive(Debug, Clone, Default)]
pub struct KeyConfig {
    /// Resolution mode.
    pub mode: KeyMode,
    /// Explicit path to private key material.
    pub private_key_path: Option<String>,
    /// Environment variable holding base64 private key material.
    pub private_key_env: Option<String>,
}

/// Loads a signing keypair per the configuration.
///
/// Path material wins over environment material. In dev mode an ephemeral
/// keypair is generated when neither is supplied, with a warning recorded.
///
/// # Errors
///
/// Returns [`SignError`] when material is missing in prod mode or malformed.
pub fn load_signing_key(config: &KeyConfig) -> Result<(KeyPair, Vec<String>), SignError> {
    if let Some(path) = config.private_key_path.as_deref().map(str::trim).filter(|p| !p.is_empty())
    {
        let bytes = fs::read(Path::new(path)).map_err(|source| SignError::ReadKey {
            path: path.to_string(),
            source,
        })?;
        let key = decode_key_material(&bytes)?;
        return Ok((keypair_from_private(key), Vec::new()));
    }
    if let Some(env) = config.private_key_env.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
        // An unset env var falls through to the mode default; dev mode
        // autogenerates, prod mode refuses.
        if let Ok(raw) = std::env::var(env) {
            if !raw.trim().is_empty() {
                let key = decode_key_material(raw.trim().as_bytes())?;
                return Ok((keypair_from_private(key), Vec::new()));
            }
        }
    }
    match config.mode {
        KeyMode::Dev => {
            tracing::debug!("no signing key material supplied; generating ephemeral dev keypair");
            Ok((
                KeyPair::generate(),
                vec!["using ephemeral dev signing key; pass --private-key or set GAIT_SIGNING_KEY for durable signatures".to_string()],
            ))
        }
        KeyMode::Prod => Err(SignError::MissingKey(
            "prod key mode requires --private-key or a key env var".to_string(),
        )),
    }
}

/// Loads a verifying key from an explicit path or environment variable.
///
/// Returns `None` when neither source is supplied.
///
/// # Errors
///
/// Returns [`SignError`] when supplied material is unreadable or malformed.
pub fn load_verifying_key(
    path: Option<&str>,
    env: Option<&str>,
) -> Result<Option<VerifyingKey>, SignError> {
    if let Some(path) = path.map(str::trim).filter(|p| !p.is_empty()) {
        let bytes = fs::read(Path::new(path)).map_err(|source| SignError::ReadKey {
            path: path.to_string(),
            source,
        })?;
        return Ok(Some(verifying_from_bytes(&decode_key_material(&bytes)?)?));
    }
    if let Some(env) = env.map(str::trim).filter(|e| !e.is_empty()) {
        let Ok(raw) = std::env::var(env) else {
            return Ok(None);
        };
        if raw.trim().is_empty() {
            return Ok(None);
        }
        return Ok(Some(verifying_from_bytes(&decode_key_material(raw.trim().as_bytes())?)?));
    }
    Ok(None)
}

/// Decodes raw-32 or base64-text key material into 32 bytes.
fn decode_key_material(bytes: &[u8]) -> Result<[u8; 32], SignError> {
    if bytes.len() == 32 {
        let mut out = [0u8; 32];
        out.copy_from_slice(bytes);
        return Ok(out);
    }
    let text = std::str::from_utf8(bytes)
        .map_err(|_| SignError::InvalidKey("expected raw 32 bytes or base64 text".to_string()))?;
    let decoded = BASE64
        .decode(text.trim().as_bytes())
        .map_err(|err| SignError::InvalidKey(format!("base64 decode: {err}")))?;
    if decoded.len() != 32 {
        return Err(SignError::InvalidKey(format!("expected 32-byte key, got {}", decoded.len())));
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&decoded);
    Ok(out)
}

fn keypair_from_private(bytes: [u8; 32]) -> KeyPair {
    let signing = SigningKey::from_bytes(&bytes);
    let verifying = signing.verifying_key();
    KeyPair {
        signing,
        verifying,
    }
}

fn verifying_from_bytes(bytes: &[u8; 32]) -> Result<VerifyingKey, SignError> {
    VerifyingKey::from_bytes(bytes).map_err(|err| SignError::InvalidKey(err.to_string()))
}

// ============================================================================
// SECTION: Signing and Verification
// ============================================================================

/// Signs canonical manifest bytes and returns the signature record.
#[must_use]
pub fn sign_manifest_bytes(keypair: &KeyPair, canonical_bytes: &[u8]) -> ManifestSignature {
    let signature = keypair.signing.sign(canonical_bytes);
    ManifestSignature {
        alg: SIGNATURE_ALG.to_string(),
        key_id: keypair.key_id(),
        sig: BASE64.encode(signature.to_bytes()),
        signed_digest: digest_bytes(canonical_bytes),
    }
}

/// Verifies a signature record against canonical manifest bytes.
///
/// The recorded `signed_digest` must match the recomputed digest before the
/// signature itself is checked.
///
/// # Errors
///
/// Returns [`SignError`] on algorithm, digest, or signature failure.
pub fn verify_manifest_signature(
    verifying: &VerifyingKey,
    canonical_bytes: &[u8],
    signature: &ManifestSignature,
) -> Result<(), SignError> {
    if signature.alg != SIGNATURE_ALG {
        return Err(SignError::UnsupportedAlg(signature.alg.clone()));
    }
    if signature.signed_digest != digest_bytes(canonical_bytes) {
        return Err(SignError::DigestMismatch);
    }
    let raw = BASE64
        .decode(signature.sig.as_bytes())
        .map_err(|err| SignError::Verification(format!("base64 decode: {err}")))?;
    let parsed = Signature::from_slice(&raw)
        .map_err(|err| SignError::Verification(format!("signature decode: {err}")))?;
    verifying
        .verify(canonical_bytes, &parsed)
        .map_err(|err| SignError::Verification(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_round_trip() {
        let keypair = KeyPair::generate();
        let bytes = br#"{"run_id":"run_demo"}"#;
        let signature = sign_manifest_bytes(&keypair, bytes);
        assert_eq!(signature.alg, SIGNATURE_ALG);
        verify_manifest_signature(&keypair.verifying, bytes, &signature).expect("verify");
    }

    #[test]
    fn verify_rejects_digest_mismatch() {
        let keypair = KeyPair::generate();
        let signature = sign_manifest_bytes(&keypair, b"original");
        let err = verify_manifest_signature(&keypair.verifying, b"tampered", &signature)
            .expect_err("tampered bytes must fail");
        assert!(matches!(err, SignError::DigestMismatch));
    }

    #[test]
    fn verify_rejects_wrong_key() {
        let signer = KeyPair::generate();
        let other = KeyPair::generate();
        let bytes = b"payload";
        let signature = sign_manifest_bytes(&signer, bytes);
        let err = verify_manifest_signature(&other.verifying, bytes, &signature)
            .expect_err("wrong key must fail");
        assert!(matches!(err, SignError::Verification(_)));
    }

    #[test]
    fn key_material_decodes_base64() {
        let keypair = KeyPair::generate();
        let encoded = BASE64.encode(keypair.signing.to_bytes());
        let decoded = decode_key_material(encoded.as_bytes()).expect("decode");
        assert_eq!(decoded, keypair.signing.to_bytes());
    }

    #[test]
    fn prod_mode_requires_material() {
        let err = load_signing_key(&KeyConfig {
            mode: KeyMode::Prod,
            ..KeyConfig::default()
        })
        .expect_err("prod mode without material must fail");
        assert!(matches!(err, SignError::MissingKey(_)));
    }
}
