use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::alert::Severity;

/// What a matched policy rule asks the pipeline to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PolicyAction {
    Block,
    Allow,
    Monitor,
}

/// Runtime-editable detection policy.
///
/// `service` is matched as a case-insensitive substring over the
/// destination's `label|host|sni`; an empty `service` matches nothing.
/// `department` of "All" applies to every source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub id: String,
    pub name: String,
    pub action: PolicyAction,
    pub service: String,
    pub department: String,
    pub severity: Severity,
    pub enabled: bool,
    #[serde(default)]
    pub description: String,
}

/// Rule as submitted by clients (server assigns the id).
#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
pub struct PolicyRuleDraft {
    pub name: String,
    pub action: PolicyAction,
    pub service: String,
    #[serde(default = "default_department")]
    pub department: String,
    pub severity: Severity,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub description: String,
}

fn default_department() -> String {
    "All".to_string()
}

fn default_enabled() -> bool {
    true
}

impl PolicyRuleDraft {
    pub fn into_rule(self) -> PolicyRule {
        PolicyRule {
            id: Uuid::new_v4().to_string(),
            name: self.name,
            action: self.action,
            service: self.service,
            department: self.department,
            severity: self.severity,
            enabled: self.enabled,
            description: self.description,
        }
    }
}
