use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::de::{flexible_bool, flexible_string, string_list, string_set};

/// A control implemented by the service organization, as tested by the auditor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlRecord {
    #[serde(default, deserialize_with = "flexible_string")]
    pub control_id: String,
    /// TSC criterion identifiers. May be empty until criteria merge.
    #[serde(default, deserialize_with = "string_set")]
    pub criterion: BTreeSet<String>,
    #[serde(default, deserialize_with = "flexible_string")]
    pub control_title: String,
    #[serde(default, deserialize_with = "flexible_string")]
    pub control_description: String,
    #[serde(default, deserialize_with = "string_list")]
    pub tests_applied: Vec<String>,
    #[serde(default, deserialize_with = "flexible_string")]
    pub result: String,
}

/// One row of a complementary-control table (subservice or user entity).
///
/// Subservice rows name their organization in `organization_name`, user
/// entity rows their grouping in `category`; both land in `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplementaryControlRow {
    #[serde(
        default,
        alias = "organization_name",
        alias = "category",
        deserialize_with = "flexible_string"
    )]
    pub name: String,
    #[serde(default, deserialize_with = "flexible_string")]
    pub control_id: String,
    #[serde(default, deserialize_with = "flexible_string")]
    pub description: String,
    #[serde(default, deserialize_with = "string_set")]
    pub criteria_covered: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupedControl {
    pub control_id: String,
    pub description: String,
    pub criteria_covered: BTreeSet<String>,
}

/// Complementary controls grouped under an organization or category name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupedControlRecord {
    pub name: String,
    pub controls: Vec<GroupedControl>,
}

/// Group rows by name, keeping first-seen order for both groups and rows.
/// Rows without a name go under `fallback_name`.
pub fn group_rows(rows: Vec<ComplementaryControlRow>, fallback_name: &str) -> Vec<GroupedControlRecord> {
    let mut groups: Vec<GroupedControlRecord> = Vec::new();
    for row in rows {
        let name = if row.name.is_empty() {
            fallback_name.to_string()
        } else {
            row.name
        };
        let control = GroupedControl {
            control_id: row.control_id,
            description: row.description,
            criteria_covered: row.criteria_covered,
        };
        match groups.iter_mut().find(|g| g.name == name) {
            Some(group) => group.controls.push(control),
            None => groups.push(GroupedControlRecord {
                name,
                controls: vec![control],
            }),
        }
    }
    groups
}

/// A criterion and the controls a dedicated mapping table assigns to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriteriaMapping {
    #[serde(default, deserialize_with = "flexible_string")]
    pub criterion_id: String,
    #[serde(default, deserialize_with = "flexible_string")]
    pub criterion_description: String,
    #[serde(default, deserialize_with = "string_set")]
    pub mapped_controls: BTreeSet<String>,
}

/// A control test failure together with management's response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionRecord {
    #[serde(default, deserialize_with = "flexible_string")]
    pub control_objective: String,
    #[serde(default, deserialize_with = "flexible_string")]
    pub testing_description: String,
    #[serde(default, deserialize_with = "flexible_string")]
    pub exception_description: String,
    #[serde(default, deserialize_with = "flexible_string")]
    pub management_response: String,
}

/// The service auditor's opinion and report identification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditorOpinion {
    #[serde(default, deserialize_with = "flexible_string")]
    pub service_product: String,
    #[serde(default, deserialize_with = "flexible_string")]
    pub report_type: String,
    #[serde(default, deserialize_with = "flexible_string")]
    pub scope_date: String,
    #[serde(default, deserialize_with = "flexible_string")]
    pub auditors_opinion: String,
    #[serde(default, deserialize_with = "flexible_string")]
    pub auditors_name: String,
    #[serde(default, deserialize_with = "flexible_bool")]
    pub qualified_opinion: bool,
}
