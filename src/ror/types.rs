//! Response bodies of the registry endpoints, reduced to what reconciliation reads.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationMatch {
    pub id: String,
    pub name: String,
}

/// One ranked result of an affiliation query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffiliationCandidate {
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub chosen: bool,
    pub organization: OrganizationMatch,
}

impl AffiliationCandidate {
    /// Maximal confidence and marked as the registry's chosen match
    pub fn is_confident(&self) -> bool {
        self.chosen && self.score >= 1.0
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ItemsResponse<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_affiliation_items() {
        let body = r#"{
            "number_of_results": 2,
            "items": [
                {"score": 1.0, "chosen": true, "matching_type": "EXACT",
                 "organization": {"id": "https://ror.org/04wxnsj81", "name": "DataCite", "types": ["Other"]}},
                {"score": 0.72, "chosen": false,
                 "organization": {"id": "https://ror.org/02mhbdp94", "name": "Universidad de los Andes"}}
            ]
        }"#;
        let parsed: ItemsResponse<AffiliationCandidate> = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.items.len(), 2);
        assert!(parsed.items[0].is_confident());
        assert!(!parsed.items[1].is_confident());
    }

    #[test]
    fn chosen_below_maximal_score_is_not_confident() {
        let candidate = AffiliationCandidate {
            score: 0.99,
            chosen: true,
            organization: OrganizationMatch {
                id: "https://ror.org/x".to_string(),
                name: "X".to_string(),
            },
        };
        assert!(!candidate.is_confident());
    }
}
