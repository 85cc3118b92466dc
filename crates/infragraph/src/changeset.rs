//! Changeset computation: desired payload versus discovered actual state

use crate::provider::ActualState;
use crate::task::{Lifecycle, Payload};
use serde::{Deserialize, Serialize};

/// Classification of what a task needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Actual state already matches
    NoChange,
    /// Resource is absent and may be created
    Create,
    /// Resource exists but differs
    Update,
    /// A change is needed that the lifecycle does not permit
    Forbidden,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeKind::NoChange => write!(f, "no-change"),
            ChangeKind::Create => write!(f, "create"),
            ChangeKind::Update => write!(f, "update"),
            ChangeKind::Forbidden => write!(f, "forbidden"),
        }
    }
}

/// One differing field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub actual: Option<serde_json::Value>,
    pub desired: serde_json::Value,
}

/// Planned change for one task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Changeset {
    pub kind: ChangeKind,

    /// Fields that differ (every desired field for a create)
    pub fields: Vec<FieldChange>,

    /// Why a change is forbidden
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Changeset {
    pub fn compute(desired: &Payload, actual: Option<&ActualState>, lifecycle: Lifecycle) -> Self {
        let Some(actual) = actual else {
            if !lifecycle.allows_create() {
                return Self::forbidden(
                    Vec::new(),
                    format!("resource does not exist and lifecycle is {lifecycle}"),
                );
            }
            let fields = desired
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| FieldChange {
                    field: k.clone(),
                    actual: None,
                    desired: v.clone(),
                })
                .collect();
            return Self {
                kind: ChangeKind::Create,
                fields,
                reason: None,
            };
        };

        let fields = diff_fields(desired, actual);
        if fields.is_empty() {
            return Self {
                kind: ChangeKind::NoChange,
                fields,
                reason: None,
            };
        }

        if !lifecycle.allows_update() {
            let names: Vec<&str> = fields.iter().map(|f| f.field.as_str()).collect();
            let reason = format!("existing resource differs in {}", names.join(", "));
            return Self::forbidden(fields, reason);
        }

        Self {
            kind: ChangeKind::Update,
            fields,
            reason: None,
        }
    }

    fn forbidden(fields: Vec<FieldChange>, reason: String) -> Self {
        Self {
            kind: ChangeKind::Forbidden,
            fields,
            reason: Some(reason),
        }
    }

    pub fn has_changes(&self) -> bool {
        self.kind != ChangeKind::NoChange
    }

    pub fn changed_fields(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.field.clone()).collect()
    }
}

/// Fields set in `desired` whose actual value differs. Unset (null) desired
/// fields match anything; fields only present in `actual` are ignored.
fn diff_fields(desired: &Payload, actual: &ActualState) -> Vec<FieldChange> {
    desired
        .iter()
        .filter(|(_, v)| !v.is_null())
        .filter_map(|(k, v)| {
            let current = actual.properties.get(k);
            if current == Some(v) {
                None
            } else {
                Some(FieldChange {
                    field: k.clone(),
                    actual: current.cloned(),
                    desired: v.clone(),
                })
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload() -> Payload {
        [
            ("cidr_block".to_string(), json!("10.0.0.0/16")),
            ("enable_dns".to_string(), json!(true)),
            ("ipv6".to_string(), serde_json::Value::Null),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn absent_resource_is_created() {
        let change = Changeset::compute(&payload(), None, Lifecycle::Sync);
        assert_eq!(change.kind, ChangeKind::Create);
        assert_eq!(change.changed_fields(), vec!["cidr_block", "enable_dns"]);
    }

    #[test]
    fn absent_resource_with_must_exist_is_forbidden() {
        let change = Changeset::compute(&payload(), None, Lifecycle::MustExist);
        assert_eq!(change.kind, ChangeKind::Forbidden);
        assert!(change.reason.unwrap().contains("does not exist"));
    }

    #[test]
    fn matching_resource_has_no_change() {
        let actual = ActualState::new()
            .with_property("cidr_block", json!("10.0.0.0/16"))
            .with_property("enable_dns", json!(true))
            .with_property("owner", json!("123456"));
        let change = Changeset::compute(&payload(), Some(&actual), Lifecycle::MustExistAndVerify);
        assert_eq!(change.kind, ChangeKind::NoChange);
        assert!(!change.has_changes());
    }

    #[test]
    fn drift_is_update_or_forbidden_by_lifecycle() {
        let actual = ActualState::new()
            .with_property("cidr_block", json!("10.1.0.0/16"))
            .with_property("enable_dns", json!(true));

        let change = Changeset::compute(&payload(), Some(&actual), Lifecycle::MustExist);
        assert_eq!(change.kind, ChangeKind::Update);
        assert_eq!(change.fields[0].actual, Some(json!("10.1.0.0/16")));

        let change = Changeset::compute(&payload(), Some(&actual), Lifecycle::MustExistAndVerify);
        assert_eq!(change.kind, ChangeKind::Forbidden);
        assert_eq!(
            change.reason.as_deref(),
            Some("existing resource differs in cidr_block")
        );
    }
}
