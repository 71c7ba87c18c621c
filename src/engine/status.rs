use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Consent status as reported by the status endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentStatus {
    #[serde(default)]
    pub consent_active: bool,
    #[serde(default)]
    pub consent_version: String,
    #[serde(default)]
    pub categories: BTreeMap<String, CategoryStatus>,
    #[serde(default)]
    pub site_domain: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryStatus {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: bool,
    #[serde(default)]
    pub accepted: bool,
}

impl ConsentStatus {
    /// Slugs of the categories currently accepted.
    pub fn accepted(&self) -> Vec<&str> {
        self.categories
            .iter()
            .filter(|(_, c)| c.accepted)
            .map(|(slug, _)| slug.as_str())
            .collect()
    }
}
