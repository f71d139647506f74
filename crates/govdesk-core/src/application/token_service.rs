//! Approval tokens for the e-mail channel
//!
//! A token is 32 bytes from the OS random source, encoded as unpadded
//! URL-safe base64. Only its SHA-256 digest is ever bound to a request,
//! so a leaked store does not yield usable links.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fmt;
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::domain::request::{PendingApproval, RequestId, RequestState, ServiceRequest};

/// Random bytes per token (256 bits)
pub const TOKEN_BYTES: usize = 32;

/// Encoded token length
pub const TOKEN_LEN: usize = 43;

/// An approval token in the clear. Exists only between issuance and the
/// notification that carries it.
#[derive(Clone, PartialEq, Eq)]
pub struct ApprovalToken(String);

impl ApprovalToken {
    /// Borrow the encoded token
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApprovalToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApprovalToken(<redacted>)")
    }
}

/// Result of [`TokenService::issue`]
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// Token for the approval link
    pub token: ApprovalToken,
    /// Digest to bind to the request
    pub digest: String,
    /// Expiry to bind to the request
    pub expires_at: DateTime<Utc>,
}

/// Outcome of checking a presented token against a binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenCheck {
    /// Matches a live, unexpired binding
    Valid,
    /// No binding, or the token does not match it
    Invalid,
    /// Matches the binding but the expiry has passed
    Expired,
}

/// Issues and checks approval tokens
#[derive(Debug, Clone)]
pub struct TokenService {
    ttl: chrono::Duration,
}

impl TokenService {
    /// Create a token service issuing tokens that live for `ttl`
    pub fn new(ttl: chrono::Duration) -> Self {
        Self { ttl }
    }

    /// Mint a token for `request_id`. The caller binds the digest and
    /// expiry in the same atomic update that moves the request to review.
    pub fn issue(&self, request_id: &RequestId, now: DateTime<Utc>) -> IssuedToken {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let token = URL_SAFE_NO_PAD.encode(bytes);
        let digest = Self::digest(&token);
        let expires_at = now + self.ttl;

        debug!(request_id = %request_id, %expires_at, "Issued approval token");

        IssuedToken {
            token: ApprovalToken(token),
            digest,
            expires_at,
        }
    }

    /// SHA-256 digest of a presented token, URL-safe base64 encoded
    pub fn digest(token: &str) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(token.as_bytes()))
    }

    /// Whether `token` has the shape of an issued token
    pub fn is_well_formed(token: &str) -> bool {
        token.len() == TOKEN_LEN
            && token
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    }

    /// Check a presented token against a binding.
    ///
    /// The digest comparison is constant-time and always runs, also when
    /// there is no binding, so "no token" and "wrong token" take the same
    /// path. Expiry is only consulted after a match.
    pub fn check(
        &self,
        binding: Option<&PendingApproval>,
        token: &str,
        now: DateTime<Utc>,
    ) -> TokenCheck {
        let presented = Self::digest(token);
        let (stored, expires_at) = match binding {
            Some(PendingApproval::Email {
                token_digest,
                expires_at,
                ..
            }) => (token_digest.as_str(), Some(*expires_at)),
            _ => ("", None),
        };

        let matches: bool = presented.as_bytes().ct_eq(stored.as_bytes()).into();
        match (matches, expires_at) {
            (true, Some(expires_at)) if now < expires_at => TokenCheck::Valid,
            (true, Some(_)) => TokenCheck::Expired,
            _ => TokenCheck::Invalid,
        }
    }

    /// Whether `token` may currently decide `request`. Re-evaluated on
    /// every call.
    pub fn validate(&self, request: &ServiceRequest, token: &str, now: DateTime<Utc>) -> bool {
        request.state == RequestState::UnderReview
            && self.check(request.pending_approval.as_ref(), token, now) == TokenCheck::Valid
    }

    /// Drop the approval binding of `request`. The token digest moves to
    /// `spent_token_digest` and can never validate again. Runs inside the
    /// update that records the decision.
    pub fn invalidate(request: &mut ServiceRequest) {
        if let Some(PendingApproval::Email { token_digest, .. }) = request.pending_approval.take() {
            request.spent_token_digest = Some(token_digest);
        }
    }
}
