//! Approval matrix routing
//!
//! A pure function of the request's routing attributes and the configured
//! thresholds. No I/O, no clock.

use serde::{Deserialize, Serialize};

use crate::config::ApprovalMatrixConfig;
use crate::domain::request::RoutingAttributes;

/// Approval path chosen for a submitted request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "route", rename_all = "snake_case")]
pub enum RoutingDecision {
    /// Approve without review
    AutoApprove,
    /// E-mail a token link to a named approver
    RouteToApproverByEmail {
        /// Approver
        approver_email: String,
    },
    /// Leave for any portal approver of the unit
    RouteToPortalQueue {
        /// Unit queue
        unit: String,
    },
}

/// Maps routing attributes to an approval path
#[derive(Debug, Clone)]
pub struct ApprovalMatrixRouter {
    config: ApprovalMatrixConfig,
}

impl ApprovalMatrixRouter {
    /// Create a router over `config`
    pub fn new(config: ApprovalMatrixConfig) -> Self {
        Self { config }
    }

    /// Choose the approval path. Deterministic; an unknown grade is never
    /// auto-approved.
    pub fn route(&self, attributes: &RoutingAttributes) -> RoutingDecision {
        if self.qualifies_for_auto_approval(attributes) {
            return RoutingDecision::AutoApprove;
        }

        if let Some(min) = self.config.portal_review_min_value {
            if attributes.value >= min {
                return RoutingDecision::RouteToPortalQueue {
                    unit: attributes.unit.clone(),
                };
            }
        }

        match self.approver_for(&attributes.unit) {
            Some(approver_email) => RoutingDecision::RouteToApproverByEmail {
                approver_email: approver_email.to_string(),
            },
            None => RoutingDecision::RouteToPortalQueue {
                unit: attributes.unit.clone(),
            },
        }
    }

    fn qualifies_for_auto_approval(&self, attributes: &RoutingAttributes) -> bool {
        match (attributes.grade, self.config.auto_approve_grade_below) {
            (Some(grade), Some(below)) => {
                grade < below && attributes.value <= self.config.auto_approve_max_value
            }
            _ => false,
        }
    }

    fn approver_for(&self, unit: &str) -> Option<&str> {
        self.config
            .unit_approvers
            .get(unit)
            .or_else(|| {
                self.config
                    .unit_approvers
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(unit))
                    .map(|(_, email)| email)
            })
            .or(self.config.default_approver_email.as_ref())
            .map(String::as_str)
            .filter(|email| !email.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::collections::BTreeMap;

    fn router() -> ApprovalMatrixRouter {
        let mut unit_approvers = BTreeMap::new();
        unit_approvers.insert("ICT".to_string(), "ict.head@agency.gov.my".to_string());
        ApprovalMatrixRouter::new(ApprovalMatrixConfig {
            auto_approve_max_value: Decimal::from(1500),
            auto_approve_grade_below: Some(41),
            portal_review_min_value: Some(Decimal::from(25000)),
            unit_approvers,
            default_approver_email: Some("director@agency.gov.my".to_string()),
        })
    }

    fn attributes(value: i64, grade: Option<u8>, unit: &str) -> RoutingAttributes {
        RoutingAttributes {
            value: Decimal::from(value),
            grade,
            unit: unit.to_string(),
        }
    }

    #[test]
    fn test_routing_table() {
        let router = router();
        let cases = vec![
            (attributes(500, Some(29), "ICT"), RoutingDecision::AutoApprove),
            (attributes(1500, Some(40), "ICT"), RoutingDecision::AutoApprove),
            (
                attributes(1501, Some(29), "ICT"),
                RoutingDecision::RouteToApproverByEmail {
                    approver_email: "ict.head@agency.gov.my".to_string(),
                },
            ),
            (
                attributes(500, Some(41), "ict"),
                RoutingDecision::RouteToApproverByEmail {
                    approver_email: "ict.head@agency.gov.my".to_string(),
                },
            ),
            (
                attributes(500, Some(48), "Finance"),
                RoutingDecision::RouteToApproverByEmail {
                    approver_email: "director@agency.gov.my".to_string(),
                },
            ),
            (
                attributes(25000, Some(29), "ICT"),
                RoutingDecision::RouteToPortalQueue {
                    unit: "ICT".to_string(),
                },
            ),
        ];

        for (input, expected) in cases {
            assert_eq!(router.route(&input), expected, "{:?}", input);
        }
    }

    #[test]
    fn test_unknown_grade_is_never_auto_approved() {
        let decision = router().route(&attributes(1, None, "ICT"));
        assert_ne!(decision, RoutingDecision::AutoApprove);
    }

    #[test]
    fn test_no_thresholds_sends_everything_to_portal() {
        let router = ApprovalMatrixRouter::new(ApprovalMatrixConfig::default());
        assert_eq!(
            router.route(&attributes(0, Some(1), "HR")),
            RoutingDecision::RouteToPortalQueue {
                unit: "HR".to_string()
            }
        );
    }

    #[test]
    fn test_routing_is_deterministic() {
        let router = router();
        let input = attributes(3200, Some(44), "ICT");
        assert_eq!(router.route(&input), router.route(&input));
    }
}
