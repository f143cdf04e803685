// crates/gait-runpack/src/verify.rs
// ============================================================================
// Module: Runpack Verifier
// Description: Offline integrity and signature verification for runpacks.
// Purpose: Detect missing files, tampered bytes, and broken signatures.
// Dependencies: gait-core
// ============================================================================

//! ## Overview
//! Verification fails closed: a missing manifest or run id is a hard error,
//! every manifest-listed file is hash-checked, and signature status is
//! reported even when no key is available. Tampering any archive file flips
//! either a hash mismatch or the signature status.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;

use ed25519_dalek::VerifyingKey;
use gait_core::jcs::digest_bytes;
use gait_core::sign::verify_manifest_signature;
use gait_core::zipx::read_zip_entries;
use serde::Deserialize;
use serde::Serialize;

use crate::RunpackError;
use crate::read::read_manifest;
use crate::write::signable_manifest_bytes;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Signature verification status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureStatus {
    /// A signature was present and verified against the manifest bytes.
    Verified,
    /// A signature was present but did not verify.
    Failed,
    /// No signatures were present.
    Missing,
    /// Signatures were present but no public key was provided.
    Skipped,
}

impl SignatureStatus {
    /// Returns the stable wire label for the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Verified => "verified",
            Self::Failed => "failed",
            Self::Missing => "missing",
            Self::Skipped => "skipped",
        }
    }
}

/// Options for verification.
#[derive(Debug, Clone, Default)]
pub struct VerifyOptions {
    /// Public key used to verify signatures, when available.
    pub public_key: Option<VerifyingKey>,
    /// Whether an absent or unverifiable signature is an error.
    pub require_signature: bool,
}

/// One hash disagreement between archive bytes and the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashMismatch {
    /// Archive path of the file.
    pub path: String,
    /// Hash listed in the manifest.
    pub expected: String,
    /// Hash of the archive bytes.
    pub actual: String,
}

/// Verification report for one archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyResult {
    /// Run identifier from the manifest.
    pub run_id: String,
    /// Recomputed manifest digest.
    pub manifest_digest: String,
    /// Manifest-listed files absent from the archive.
    pub missing_files: Vec<String>,
    /// Files whose bytes disagree with the manifest.
    pub hash_mismatches: Vec<HashMismatch>,
    /// Signature verification status.
    pub signature_status: SignatureStatus,
    /// Signature errors, when any.
    pub signature_errors: Vec<String>,
}

impl VerifyResult {
    /// Returns true when no integrity or signature problem was found.
    #[must_use]
    pub fn ok(&self) -> bool {
        self.missing_files.is_empty()
            && self.hash_mismatches.is_empty()
            && self.signature_status != SignatureStatus::Failed
            && self.signature_errors.is_empty()
    }
}

// ============================================================================
// SECTION: Verifier
// ============================================================================

/// Verifies a runpack archive's files, manifest digest, and signatures.
///
/// # Errors
///
/// Returns [`RunpackError`] when the archive or manifest cannot be read, or
/// when the manifest has no run id.
pub fn verify_zip(path: &Path, options: &VerifyOptions) -> Result<VerifyResult, RunpackError> {
    let entries = read_zip_entries(path)?;
    let manifest = read_manifest(&entries)?;
    if manifest.run_id.trim().is_empty() {
        return Err(RunpackError::InvalidManifest("manifest missing run_id".to_string()));
    }

    let mut missing_files = Vec::new();
    let mut hash_mismatches = Vec::new();
    for listed in &manifest.files {
        match entries.get(&listed.path) {
            None => missing_files.push(listed.path.clone()),
            Some(bytes) => {
                let actual = digest_bytes(bytes);
                if actual != listed.sha256 {
                    hash_mismatches.push(HashMismatch {
                        path: listed.path.clone(),
                        expected: listed.sha256.clone(),
                        actual,
                    });
                }
            }
        }
    }

    let signable = signable_manifest_bytes(&manifest)?;
    let manifest_digest = digest_bytes(&signable);

    let mut signature_errors = Vec::new();
    let signature_status = if manifest.signatures.is_empty() {
        if options.require_signature {
            signature_errors.push("signature required but none present".to_string());
        }
        SignatureStatus::Missing
    } else if let Some(public_key) = options.public_key.as_ref() {
        let mut status = SignatureStatus::Verified;
        for signature in &manifest.signatures {
            if let Err(err) = verify_manifest_signature(public_key, &signable, signature) {
                signature_errors.push(format!("key {}: {err}", signature.key_id));
                status = SignatureStatus::Failed;
            }
        }
        status
    } else {
        if options.require_signature {
            signature_errors.push("signature required but no public key provided".to_string());
        }
        SignatureStatus::Skipped
    };

    if !manifest.manifest_digest.is_empty() && manifest.manifest_digest != manifest_digest {
        signature_errors.push("recorded manifest_digest does not match manifest".to_string());
    }

    tracing::debug!(
        run_id = %manifest.run_id,
        status = signature_status.as_str(),
        missing = missing_files.len(),
        mismatched = hash_mismatches.len(),
        "verified runpack"
    );

    Ok(VerifyResult {
        run_id: manifest.run_id,
        manifest_digest,
        missing_files,
        hash_mismatches,
        signature_status,
        signature_errors,
    })
}
