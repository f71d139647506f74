use serde::{Deserialize, Serialize};
use std::fmt;

/// Value object: authenticated account identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub String);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An authenticated portal account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account identifier
    pub id: AccountId,

    /// E-mail address proven by login, if any
    pub verified_email: Option<String>,
}

impl Account {
    /// Create an account with a verified e-mail
    pub fn new(id: impl Into<String>, verified_email: impl Into<String>) -> Self {
        Self {
            id: AccountId(id.into()),
            verified_email: Some(verified_email.into()),
        }
    }

    /// Whether the verified e-mail equals `email`, ignoring case
    pub fn owns_email(&self, email: &str) -> bool {
        self.verified_email
            .as_deref()
            .map(|verified| emails_match(verified, email))
            .unwrap_or(false)
    }
}

/// Case-insensitive e-mail comparison, ignoring surrounding whitespace
pub fn emails_match(a: &str, b: &str) -> bool {
    let (a, b) = (a.trim(), b.trim());
    !a.is_empty() && a.to_lowercase() == b.to_lowercase()
}

/// Who caused a change, as recorded in the audit trail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditActor {
    /// A logged-in account
    Account {
        /// Account identifier
        account_id: AccountId,
    },

    /// An unauthenticated guest, known by e-mail only
    Guest {
        /// Guest e-mail
        email: String,
    },

    /// Whoever held an e-mailed approval link
    ApprovalLink {
        /// Approver the link was sent to
        approver_email: Option<String>,
    },

    /// Scheduled or automatic behaviour
    System,
}

impl From<&Account> for AuditActor {
    fn from(account: &Account) -> Self {
        AuditActor::Account {
            account_id: account.id.clone(),
        }
    }
}
