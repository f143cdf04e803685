// crates/gait-core/src/gate/credential.rs
// ============================================================================
// Module: Credential Broker Seam
// Description: Broker trait and issue-time validation for scoped credentials.
// Purpose: Let rules demand brokered credentials without binding a vendor.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! A broker turns a normalized credential request into an opaque credential
//! reference. The engine never sees credential material; it records only
//! the reference and the issuing broker. Concrete brokers live outside the
//! core and implement [`Broker`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Credential request handed to a broker.
///
/// # Invariants
/// - After normalization, `tool_name` is lowercase and `scope` is a sorted
///   unique lowercase list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CredentialRequest {
    /// Tool the credential is issued for.
    pub tool_name: String,
    /// Requesting identity.
    pub identity: String,
    /// Workspace locator.
    pub workspace: String,
    /// Session identifier.
    pub session_id: String,
    /// Request identifier.
    pub request_id: String,
    /// Broker reference from the matched rule.
    pub reference: String,
    /// Requested scopes.
    pub scope: Vec<String>,
}

/// Credential response returned by a broker.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CredentialResponse {
    /// Broker that issued the credential.
    pub issued_by: String,
    /// Opaque credential reference; never the material itself.
    pub credential_ref: String,
}

/// Errors raised during credential issuance.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The request was missing a required field.
    #[error("{0} is required")]
    MissingField(&'static str),
    /// The broker returned an empty credential reference.
    #[error("broker returned empty credential reference")]
    EmptyReference,
    /// The broker could not issue a credential.
    #[error("credential unavailable: {0}")]
    Unavailable(String),
}

/// Credential broker seam.
pub trait Broker: Send + Sync {
    /// Returns the broker's stable name.
    fn name(&self) -> &str;

    /// Issues a credential for a normalized request.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError`] when issuance fails.
    fn issue(&self, request: &CredentialRequest) -> Result<CredentialResponse, CredentialError>;
}

// ============================================================================
// SECTION: Issuance
// ============================================================================

/// Normalizes a request, issues through the broker, and validates the
/// response.
///
/// # Errors
///
/// Returns [`CredentialError`] on validation or issuance failure.
pub fn issue(
    broker: &dyn Broker,
    request: &CredentialRequest,
) -> Result<CredentialResponse, CredentialError> {
    let normalized = normalize_request(request)?;
    let mut response = broker.issue(&normalized)?;
    response.issued_by = response.issued_by.trim().to_string();
    response.credential_ref = response.credential_ref.trim().to_string();
    if response.issued_by.is_empty() {
        response.issued_by = broker.name().to_string();
    }
    if response.credential_ref.is_empty() {
        return Err(CredentialError::EmptyReference);
    }
    Ok(response)
}

fn normalize_request(request: &CredentialRequest) -> Result<CredentialRequest, CredentialError> {
    let tool_name = request.tool_name.trim().to_lowercase();
    if tool_name.is_empty() {
        return Err(CredentialError::MissingField("tool_name"));
    }
    let identity = request.identity.trim().to_string();
    if identity.is_empty() {
        return Err(CredentialError::MissingField("identity"));
    }
    Ok(CredentialRequest {
        tool_name,
        identity,
        workspace: request.workspace.trim().to_string(),
        session_id: request.session_id.trim().to_string(),
        request_id: request.request_id.trim().to_string(),
        reference: request.reference.trim().to_string(),
        scope: normalize_scope(&request.scope),
    })
}

fn normalize_scope(scope: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(scope.len());
    for value in scope {
        let trimmed = value.trim().to_lowercase();
        if trimmed.is_empty() || out.contains(&trimmed) {
            continue;
        }
        out.push(trimmed);
    }
    out.sort();
    out
}
