// crates/gait-guard/src/crypto.rs
// ============================================================================
// Module: At-Rest Encryption
// Description: AES-256-GCM envelopes for evidence archives.
// Purpose: Protect packs at rest with operator-held 32-byte keys.
// Dependencies: aes-gcm, base64, gait-core
// ============================================================================

//! ## Overview
//! Envelopes store the algorithm, a random 12-byte nonce, the ciphertext,
//! and the plaintext digest and size, all as canonical JSON under the
//! `.gaitenc` suffix. Keys are base64-decoded 32-byte values from an
//! environment variable or, strictly opt-in, the stdout of an operator
//! command. Decryption verifies the recorded plaintext digest. Key bytes
//! are never logged.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::PathBuf;
use std::process::Command;

use aes_gcm::Aes256Gcm;
use aes_gcm::Key;
use aes_gcm::Nonce;
use aes_gcm::aead::Aead;
use aes_gcm::aead::AeadCore;
use aes_gcm::aead::KeyInit;
use aes_gcm::aead::OsRng;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use gait_core::jcs;
use gait_core::schema::guard::EncryptedArtifact;
use gait_core::schema::guard::EncryptedArtifactKey;
use time::OffsetDateTime;

use crate::ENCRYPTED_ARTIFACT_SCHEMA_ID;
use crate::ENCRYPTED_ARTIFACT_SCHEMA_VERSION;
use crate::ENCRYPTED_SUFFIX;
use crate::GuardError;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Inputs for encrypting an artifact.
#[derive(Debug, Clone, Default)]
pub struct EncryptOptions {
    /// Plaintext artifact path.
    pub input_path: PathBuf,
    /// Envelope output path; defaults to `<input>.gaitenc`.
    pub output_path: Option<PathBuf>,
    /// Environment variable holding the base64 key.
    pub key_env: Option<String>,
    /// Operator command whose stdout is the base64 key. Runs only when
    /// explicitly supplied.
    pub key_command: Option<String>,
    /// Arguments for the key command.
    pub key_command_args: Vec<String>,
    /// Producer version stamped into the envelope.
    pub producer_version: String,
    /// Envelope timestamp; the frozen epoch when absent.
    pub now: Option<OffsetDateTime>,
}

/// Output of a successful encryption.
#[derive(Debug, Clone)]
pub struct EncryptResult {
    /// Envelope path.
    pub path: PathBuf,
    /// The envelope as written.
    pub artifact: EncryptedArtifact,
}

/// Inputs for decrypting an envelope.
#[derive(Debug, Clone, Default)]
pub struct DecryptOptions {
    /// Envelope path.
    pub input_path: PathBuf,
    /// Plaintext output path; defaults to the input path without
    /// `.gaitenc` (or `<input>.plain` when the suffix is absent).
    pub output_path: Option<PathBuf>,
    /// Environment variable holding the base64 key.
    pub key_env: Option<String>,
    /// Operator command whose stdout is the base64 key.
    pub key_command: Option<String>,
    /// Arguments for the key command.
    pub key_command_args: Vec<String>,
}

/// Output of a successful decryption.
#[derive(Debug, Clone)]
pub struct DecryptResult {
    /// Plaintext output path.
    pub path: PathBuf,
    /// Digest of the decrypted payload.
    pub plain_sha256: String,
    /// Size of the decrypted payload in bytes.
    pub plain_size: u64,
}

// ============================================================================
// SECTION: Encryption
// ============================================================================

/// Encrypts an artifact into a canonical-JSON envelope.
///
/// # Errors
///
/// Returns [`GuardError`] on key resolution, cipher, or I/O failure.
pub fn encrypt_artifact(options: &EncryptOptions) -> Result<EncryptResult, GuardError> {
    if options.input_path.as_os_str().is_empty() {
        return Err(GuardError::MissingInput("input path"));
    }
    let plain = fs::read(&options.input_path)?;
    let (key, key_source) = resolve_encryption_key(
        options.key_env.as_deref(),
        options.key_command.as_deref(),
        &options.key_command_args,
    )?;

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plain.as_slice())
        .map_err(|err| GuardError::Cipher(err.to_string()))?;

    let artifact = EncryptedArtifact {
        schema_id: ENCRYPTED_ARTIFACT_SCHEMA_ID.to_string(),
        schema_version: ENCRYPTED_ARTIFACT_SCHEMA_VERSION.to_string(),
        created_at: options.now.unwrap_or_else(gait_core::frozen_epoch),
        producer_version: if options.producer_version.is_empty() {
            gait_core::DEFAULT_PRODUCER_VERSION.to_string()
        } else {
            options.producer_version.clone()
        },
        algorithm: "aes-256-gcm".to_string(),
        key_source,
        nonce: BASE64.encode(nonce),
        ciphertext: BASE64.encode(&ciphertext),
        plain_sha256: jcs::digest_bytes(&plain),
        plain_size: plain.len() as u64,
    };
    let encoded = jcs::canonical_json_bytes(&artifact)?;

    let output_path = options.output_path.clone().unwrap_or_else(|| {
        PathBuf::from(format!("{}{ENCRYPTED_SUFFIX}", options.input_path.display()))
    });
    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(&output_path, encoded)?;
    tracing::debug!(path = %output_path.display(), "encrypted artifact");

    Ok(EncryptResult {
        path: output_path,
        artifact,
    })
}

/// Decrypts an envelope and verifies the plaintext digest.
///
/// # Errors
///
/// Returns [`GuardError`] on key resolution, cipher, digest, or I/O
/// failure.
pub fn decrypt_artifact(options: &DecryptOptions) -> Result<DecryptResult, GuardError> {
    if options.input_path.as_os_str().is_empty() {
        return Err(GuardError::MissingInput("input path"));
    }
    let raw = fs::read(&options.input_path)?;
    let artifact: EncryptedArtifact =
        serde_json::from_slice(&raw).map_err(|err| GuardError::InvalidEnvelope(err.to_string()))?;
    let (key, _) = resolve_encryption_key(
        options.key_env.as_deref(),
        options.key_command.as_deref(),
        &options.key_command_args,
    )?;

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
    let nonce_bytes = BASE64
        .decode(artifact.nonce.as_bytes())
        .map_err(|err| GuardError::InvalidEnvelope(format!("decode nonce: {err}")))?;
    let ciphertext = BASE64
        .decode(artifact.ciphertext.as_bytes())
        .map_err(|err| GuardError::InvalidEnvelope(format!("decode ciphertext: {err}")))?;
    let plain = cipher
        .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_slice())
        .map_err(|err| GuardError::Cipher(err.to_string()))?;

    let plain_sha256 = jcs::digest_bytes(&plain);
    if !artifact.plain_sha256.is_empty()
        && !artifact.plain_sha256.eq_ignore_ascii_case(&plain_sha256)
    {
        return Err(GuardError::PlaintextDigestMismatch);
    }

    let output_path = options.output_path.clone().unwrap_or_else(|| {
        let input = options.input_path.display().to_string();
        input.strip_suffix(ENCRYPTED_SUFFIX).map_or_else(
            || PathBuf::from(format!("{input}.plain")),
            PathBuf::from,
        )
    });
    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(&output_path, &plain)?;

    Ok(DecryptResult {
        path: output_path,
        plain_sha256,
        plain_size: plain.len() as u64,
    })
}

// ============================================================================
// SECTION: Key Resolution
// ============================================================================

/// Resolves the 32-byte key from an env var or, opt-in, a command hook.
fn resolve_encryption_key(
    key_env: Option<&str>,
    key_command: Option<&str>,
    key_command_args: &[String],
) -> Result<([u8; 32], EncryptedArtifactKey), GuardError> {
    if let Some(env) = key_env.map(str::trim).filter(|e| !e.is_empty()) {
        let raw = std::env::var(env)
            .map_err(|_| GuardError::InvalidKey(format!("env var is empty: {env}")))?;
        if raw.trim().is_empty() {
            return Err(GuardError::InvalidKey(format!("env var is empty: {env}")));
        }
        let key = decode_encryption_key(raw.trim())?;
        return Ok((
            key,
            EncryptedArtifactKey {
                mode: "env".to_string(),
                ref_name: env.to_string(),
                command: String::new(),
            },
        ));
    }

    if let Some(command) = key_command.map(str::trim).filter(|c| !c.is_empty()) {
        let args: Vec<&str> = key_command_args
            .iter()
            .map(|arg| arg.trim())
            .filter(|arg| !arg.is_empty())
            .collect();
        tracing::debug!(command, "resolving encryption key via operator command");
        let output = Command::new(command)
            .args(&args)
            .output()
            .map_err(|err| GuardError::KeyCommand(err.to_string()))?;
        if !output.status.success() {
            return Err(GuardError::KeyCommand(format!("command exited with {}", output.status)));
        }
        let text = String::from_utf8(output.stdout)
            .map_err(|err| GuardError::KeyCommand(err.to_string()))?;
        let key = decode_encryption_key(text.trim())?;
        return Ok((
            key,
            EncryptedArtifactKey {
                mode: "command".to_string(),
                ref_name: String::new(),
                command: command.to_string(),
            },
        ));
    }

    Err(GuardError::MissingKeySource)
}

fn decode_encryption_key(encoded: &str) -> Result<[u8; 32], GuardError> {
    let decoded = BASE64
        .decode(encoded.trim().as_bytes())
        .map_err(|err| GuardError::InvalidKey(err.to_string()))?;
    if decoded.len() != 32 {
        return Err(GuardError::InvalidKey(format!("expected 32-byte key, got {}", decoded.len())));
    }
    let mut key = [0u8; 32];
    key.copy_from_slice(&decoded);
    Ok(key)
}
