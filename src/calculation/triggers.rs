//! Backend-computed triggers and the calculation response model.
//!
//! A trigger is a condition the backend attaches to a calculation response
//! (decline, referral, endorsement). A response may carry several; the UI
//! displays exactly one, chosen by precedence.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Trigger kinds in precedence order: a decline always outranks a referral,
/// which outranks an endorsement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Decline,
    Referral,
    Endorsement,
}

impl TriggerKind {
    /// Lower value wins
    fn precedence(self) -> u8 {
        match self {
            Self::Decline => 0,
            Self::Referral => 1,
            Self::Endorsement => 2,
        }
    }
}

/// One backend-computed trigger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub kind: TriggerKind,
    pub name: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// A processed calculation response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalculationResponse {
    /// Raw response payload as returned by the backend
    pub payload: Value,
    #[serde(default)]
    pub triggers: Vec<Trigger>,
}

impl CalculationResponse {
    /// Build a response from a raw payload, lifting its `triggers` array
    /// when present and well-formed.
    pub fn from_payload(payload: Value) -> Self {
        let triggers = payload
            .get("triggers")
            .cloned()
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default();
        Self { payload, triggers }
    }

    /// The single trigger the UI should display: highest precedence wins,
    /// first-listed wins ties.
    pub fn active_trigger(&self) -> Option<&Trigger> {
        self.triggers
            .iter()
            .min_by_key(|trigger| trigger.kind.precedence())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decline_outranks_referral_and_endorsement() {
        let response = CalculationResponse::from_payload(json!({
            "premium": 840.0,
            "triggers": [
                {"kind": "endorsement", "name": "flood_excess"},
                {"kind": "decline", "name": "flood_zone"},
                {"kind": "referral", "name": "high_value"},
            ],
        }));
        assert_eq!(response.active_trigger().unwrap().name, "flood_zone");
    }

    #[test]
    fn test_first_listed_wins_ties() {
        let response = CalculationResponse::from_payload(json!({
            "triggers": [
                {"kind": "referral", "name": "first"},
                {"kind": "referral", "name": "second"},
            ],
        }));
        assert_eq!(response.active_trigger().unwrap().name, "first");
    }

    #[test]
    fn test_missing_or_malformed_triggers_mean_none() {
        let response = CalculationResponse::from_payload(json!({"premium": 100.0}));
        assert!(response.active_trigger().is_none());

        let response = CalculationResponse::from_payload(json!({"triggers": "nonsense"}));
        assert!(response.triggers.is_empty());
    }
}
