use serde::{Deserialize, Serialize};
use std::fmt;

/// Value object: asset (loanable resource) identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetId(pub String);

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Availability of an asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    /// Can be loaned
    Available,
    /// Currently out on loan
    OnLoan,
    /// Withdrawn until repaired
    UnderMaintenance,
    /// No longer in service
    Retired,
}

/// Condition recorded when an asset comes back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetCondition {
    /// As issued
    Excellent,
    /// Normal wear
    Good,
    /// Worn but working
    Fair,
    /// Working with defects
    Poor,
    /// Not fit for further loan
    Damaged,
}

/// Report filled in by the officer receiving a returned asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionReport {
    /// Overall condition
    pub condition: AssetCondition,

    /// Free-text description of any damage
    #[serde(default)]
    pub damage_description: Option<String>,

    /// Whether all accessories came back
    #[serde(default = "default_true")]
    pub accessories_complete: bool,

    /// Other remarks
    #[serde(default)]
    pub notes: Option<String>,
}

fn default_true() -> bool {
    true
}

impl ConditionReport {
    /// A report with no damage
    pub fn good() -> Self {
        Self {
            condition: AssetCondition::Good,
            damage_description: None,
            accessories_complete: true,
            notes: None,
        }
    }

    /// A damaged report with a description
    pub fn damaged(description: impl Into<String>) -> Self {
        Self {
            condition: AssetCondition::Damaged,
            damage_description: Some(description.into()),
            accessories_complete: true,
            notes: None,
        }
    }

    /// Whether the return needs the maintenance module involved
    pub fn indicates_damage(&self) -> bool {
        match self.condition {
            AssetCondition::Damaged => true,
            AssetCondition::Poor => self.description().is_some(),
            _ => false,
        }
    }

    fn description(&self) -> Option<&str> {
        self.damage_description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
    }

    /// Severity for the maintenance ticket raised from this report
    pub fn severity(&self) -> MaintenanceSeverity {
        MaintenanceSeverity::derive(self)
    }
}

/// Priority of a maintenance ticket
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaintenanceSeverity {
    /// Cosmetic
    Low,
    /// Functional defect
    Medium,
    /// Unusable
    High,
    /// Hazardous or data at risk
    Critical,
}

const CRITICAL_KEYWORDS: &[&str] = &[
    "fire", "burn", "smoke", "water", "liquid", "spill", "swollen", "battery leak", "spark",
];

const HIGH_KEYWORDS: &[&str] = &[
    "broken",
    "crack",
    "shatter",
    "not working",
    "does not power",
    "won't turn on",
    "no power",
    "dead",
    "missing part",
];

const LOW_KEYWORDS: &[&str] = &["scratch", "scuff", "dent", "sticker", "cosmetic", "dirty"];

impl MaintenanceSeverity {
    /// Derive severity from the condition and the damage description
    pub fn derive(report: &ConditionReport) -> Self {
        let description = report
            .description()
            .map(str::to_lowercase)
            .unwrap_or_default();
        let mentions = |keywords: &[&str]| keywords.iter().any(|k| description.contains(k));

        if mentions(CRITICAL_KEYWORDS) {
            MaintenanceSeverity::Critical
        } else if mentions(HIGH_KEYWORDS) {
            MaintenanceSeverity::High
        } else if report.condition == AssetCondition::Poor || mentions(LOW_KEYWORDS) {
            MaintenanceSeverity::Low
        } else {
            MaintenanceSeverity::Medium
        }
    }

    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            MaintenanceSeverity::Low => "low",
            MaintenanceSeverity::Medium => "medium",
            MaintenanceSeverity::High => "high",
            MaintenanceSeverity::Critical => "critical",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indicates_damage() {
        assert!(!ConditionReport::good().indicates_damage());
        assert!(ConditionReport::damaged("screen cracked").indicates_damage());

        let poor_no_detail = ConditionReport {
            condition: AssetCondition::Poor,
            damage_description: Some("   ".to_string()),
            accessories_complete: true,
            notes: None,
        };
        assert!(!poor_no_detail.indicates_damage());

        let poor_with_detail = ConditionReport {
            damage_description: Some("hinge loose".to_string()),
            ..poor_no_detail
        };
        assert!(poor_with_detail.indicates_damage());
    }

    #[test]
    fn test_severity_from_description() {
        assert_eq!(
            ConditionReport::damaged("Coffee spill on keyboard").severity(),
            MaintenanceSeverity::Critical
        );
        assert_eq!(
            ConditionReport::damaged("Screen CRACKED in corner").severity(),
            MaintenanceSeverity::High
        );
        assert_eq!(
            ConditionReport::damaged("deep scratch on lid").severity(),
            MaintenanceSeverity::Low
        );
        assert_eq!(
            ConditionReport::damaged("trackpad clicks intermittently").severity(),
            MaintenanceSeverity::Medium
        );
    }

    #[test]
    fn test_critical_outranks_high() {
        let report = ConditionReport::damaged("broken after water damage");
        assert_eq!(report.severity(), MaintenanceSeverity::Critical);
    }
}
