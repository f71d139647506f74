//! Guest and account ownership, and the claim transition

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::actor::Account;
use crate::domain::request::{Ownership, ServiceRequest};
use crate::CoreError;

/// Relationship between an account and a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnershipResolution {
    /// The account owns the request
    Owner,
    /// Unclaimed guest request submitted under the account's verified e-mail
    Claimable,
    /// Neither
    Unrelated,
}

/// Resolves ownership and performs claims
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityResolver;

impl IdentityResolver {
    /// How `actor` relates to `request`
    pub fn resolve_ownership(request: &ServiceRequest, actor: &Account) -> OwnershipResolution {
        match &request.ownership {
            Ownership::Account { account_id } | Ownership::Claimed { account_id, .. }
                if *account_id == actor.id =>
            {
                OwnershipResolution::Owner
            }
            Ownership::Guest { email } if actor.owns_email(email) => {
                OwnershipResolution::Claimable
            }
            _ => OwnershipResolution::Unrelated,
        }
    }

    /// Bind a claimable guest request to `actor`. The submitted e-mail is
    /// kept for audit. Irreversible.
    pub fn claim(
        request: &mut ServiceRequest,
        actor: &Account,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        match Self::resolve_ownership(request, actor) {
            OwnershipResolution::Claimable => request.bind_owner(actor.id.clone(), now),
            OwnershipResolution::Owner => Err(CoreError::NotClaimable(format!(
                "{} is already owned by {}",
                request.reference, actor.id
            ))),
            OwnershipResolution::Unrelated => Err(CoreError::NotClaimable(format!(
                "{} was not submitted under a verified e-mail of {}",
                request.reference, actor.id
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::actor::AccountId;
    use crate::domain::reference::ReferenceNumber;
    use crate::domain::request::{NewRequest, RequestKind, RoutingAttributes, Submitter};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn guest_ticket(email: &str) -> ServiceRequest {
        let new = NewRequest {
            kind: RequestKind::HelpdeskTicket,
            submitter: Submitter::Guest {
                email: email.to_string(),
            },
            purpose: "Printer jammed".to_string(),
            routing: RoutingAttributes {
                value: Decimal::ZERO,
                grade: None,
                unit: "Finance".to_string(),
            },
            asset_id: None,
            loan_period: None,
        };
        let reference =
            ReferenceNumber::new("HD", NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(), 1);
        ServiceRequest::submit(new, reference, Utc::now()).unwrap()
    }

    #[test]
    fn test_resolution() {
        let request = guest_ticket("A@X.com");
        assert_eq!(
            IdentityResolver::resolve_ownership(&request, &Account::new("u-1", "a@x.com")),
            OwnershipResolution::Claimable
        );
        assert_eq!(
            IdentityResolver::resolve_ownership(&request, &Account::new("u-2", "b@x.com")),
            OwnershipResolution::Unrelated
        );
        let unverified = Account {
            id: AccountId("u-3".to_string()),
            verified_email: None,
        };
        assert_eq!(
            IdentityResolver::resolve_ownership(&request, &unverified),
            OwnershipResolution::Unrelated
        );
    }

    #[test]
    fn test_claim_is_one_way() {
        let mut request = guest_ticket("a@x.com");
        let account = Account::new("u-1", "a@x.com");
        let now = Utc::now();

        IdentityResolver::claim(&mut request, &account, now).unwrap();
        assert_eq!(request.ownership.owner_account_id(), Some(&account.id));
        assert_eq!(request.ownership.claimed_at(), Some(now));
        assert_eq!(request.ownership.guest_email(), None);
        assert_eq!(request.ownership.submitted_guest_email(), Some("a@x.com"));
        assert_eq!(
            IdentityResolver::resolve_ownership(&request, &account),
            OwnershipResolution::Owner
        );

        let again = IdentityResolver::claim(&mut request, &account, now);
        assert!(matches!(again, Err(CoreError::NotClaimable(_))));

        let other = Account::new("u-9", "a@x.com");
        assert!(matches!(
            IdentityResolver::claim(&mut request, &other, now),
            Err(CoreError::NotClaimable(_))
        ));
    }
}
