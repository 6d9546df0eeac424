//! Response envelopes the model must return, one per phase.
//!
//! Envelope keys are required; missing or mistyped keys make the whole
//! response malformed. Fields inside records are lenient.

use serde::Deserialize;
use sha2::{Digest, Sha256};

use super::batch::BatchRecord;
use crate::models::control::{
    AuditorOpinion, ComplementaryControlRow, ControlRecord, CriteriaMapping, ExceptionRecord,
};
use crate::models::de::{flexible_bool, optional_string};
use crate::pipeline::merge::normalize_control_ref;

/// Characters of a description used as a cursor for id-less rows.
const DESCRIPTION_CURSOR_CHARS: usize = 100;

#[derive(Debug, Deserialize)]
pub struct OpinionEnvelope {
    pub auditor_opinion: AuditorOpinion,
}

#[derive(Debug, Deserialize)]
pub struct ExceptionsEnvelope {
    pub exceptions: Vec<ExceptionRecord>,
}

#[derive(Debug, Deserialize)]
pub struct CriteriaEnvelope {
    pub criteria_mappings: Vec<CriteriaMapping>,
}

/// `{extraction: {controls: [...]}, meta: {has_more, last_control_id}}`
#[derive(Debug, Deserialize)]
#[serde(bound = "T: serde::de::DeserializeOwned")]
pub struct BatchEnvelope<T> {
    pub extraction: BatchExtraction<T>,
    pub meta: BatchMeta,
}

#[derive(Debug, Deserialize)]
#[serde(bound = "T: serde::de::DeserializeOwned")]
pub struct BatchExtraction<T> {
    pub controls: Vec<T>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BatchMeta {
    #[serde(deserialize_with = "flexible_bool")]
    pub has_more: bool,
    #[serde(default, deserialize_with = "optional_string")]
    pub last_control_id: Option<String>,
}

// ═══════════════════════════════════════════════════════════
// Dedup keys
// ═══════════════════════════════════════════════════════════

impl BatchRecord for ControlRecord {
    /// Normalized control id, or a content hash when the id is missing.
    fn dedup_key(&self) -> String {
        if !self.control_id.trim().is_empty() {
            return normalize_control_ref(&self.control_id);
        }
        let title = self.control_title.trim().to_lowercase();
        let description = self.control_description.trim().to_lowercase();
        let digest = Sha256::digest(format!("{title}|||{description}").as_bytes());
        format!("content:{}", hex::encode(&digest[..12]))
    }

    fn cursor_value(&self) -> String {
        if self.control_id.trim().is_empty() {
            prefix_chars(&self.control_description, DESCRIPTION_CURSOR_CHARS)
        } else {
            self.control_id.trim().to_string()
        }
    }
}

impl BatchRecord for ComplementaryControlRow {
    /// `name|control_id`, or `name|description` when the row has no id.
    fn dedup_key(&self) -> String {
        let name = self.name.trim().to_lowercase();
        if self.control_id.trim().is_empty() {
            let description = self.description.split_whitespace().collect::<Vec<_>>().join(" ");
            format!("{name}|{}", description.to_lowercase())
        } else {
            format!("{name}|{}", normalize_control_ref(&self.control_id))
        }
    }

    fn cursor_value(&self) -> String {
        if self.control_id.trim().is_empty() {
            prefix_chars(&self.description, DESCRIPTION_CURSOR_CHARS)
        } else {
            format!("{}|{}", self.name.trim(), self.control_id.trim())
        }
    }
}

fn prefix_chars(text: &str, max: usize) -> String {
    text.trim().chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::pipeline::gateway::{parse_strict, GatewayError};

    fn row(name: &str, id: &str, description: &str) -> ComplementaryControlRow {
        ComplementaryControlRow {
            name: name.into(),
            control_id: id.into(),
            description: description.into(),
            criteria_covered: BTreeSet::new(),
        }
    }

    fn vendor(id: &str, title: &str, description: &str) -> ControlRecord {
        ControlRecord {
            control_id: id.into(),
            criterion: BTreeSet::new(),
            control_title: title.into(),
            control_description: description.into(),
            tests_applied: vec![],
            result: String::new(),
        }
    }

    #[test]
    fn batch_envelope_parses() {
        let raw = r#"{
            "extraction": {"controls": [{"control_id": "1.1", "criterion": ["CC6.1"]}]},
            "meta": {"has_more": true, "last_control_id": "1.1"}
        }"#;
        let env: BatchEnvelope<ControlRecord> = parse_strict(raw).unwrap();
        assert_eq!(env.extraction.controls.len(), 1);
        assert!(env.meta.has_more);
        assert_eq!(env.meta.last_control_id.as_deref(), Some("1.1"));
    }

    #[test]
    fn missing_has_more_is_malformed() {
        let raw = r#"{"extraction": {"controls": []}, "meta": {"last_control_id": "1.1"}}"#;
        let result = parse_strict::<BatchEnvelope<ControlRecord>>(raw);
        assert!(matches!(result, Err(GatewayError::Malformed { .. })));
    }

    #[test]
    fn missing_extraction_is_malformed() {
        let raw = r#"{"controls": [], "meta": {"has_more": false}}"#;
        let result = parse_strict::<BatchEnvelope<ControlRecord>>(raw);
        assert!(matches!(result, Err(GatewayError::Malformed { .. })));
    }

    #[test]
    fn null_cursor_is_none() {
        let raw = r#"{"extraction": {"controls": []}, "meta": {"has_more": false, "last_control_id": null}}"#;
        let env: BatchEnvelope<ComplementaryControlRow> = parse_strict(raw).unwrap();
        assert!(env.meta.last_control_id.is_none());
    }

    #[test]
    fn single_call_envelopes_parse() {
        let opinion: OpinionEnvelope = parse_strict(
            r#"{"auditor_opinion": {"auditors_name": "Deloitte", "qualified_opinion": false}}"#,
        )
        .unwrap();
        assert_eq!(opinion.auditor_opinion.auditors_name, "Deloitte");

        let exceptions: ExceptionsEnvelope = parse_strict(r#"{"exceptions": []}"#).unwrap();
        assert!(exceptions.exceptions.is_empty());

        let criteria: CriteriaEnvelope = parse_strict(
            r#"{"criteria_mappings": [{"criterion_id": "CC1.1", "mapped_controls": "1.1, 1.2"}]}"#,
        )
        .unwrap();
        assert_eq!(criteria.criteria_mappings[0].mapped_controls.len(), 2);
    }

    #[test]
    fn vendor_key_uses_normalized_id() {
        assert_eq!(vendor("1.01", "", "").dedup_key(), vendor("1.1", "x", "y").dedup_key());
    }

    #[test]
    fn idless_vendor_key_hashes_content() {
        let a = vendor("", "Access Review", "Quarterly review of access");
        let b = vendor(" ", " access review ", "QUARTERLY REVIEW OF ACCESS");
        let c = vendor("", "Access Review", "Annual review");
        assert_eq!(a.dedup_key(), b.dedup_key());
        assert_ne!(a.dedup_key(), c.dedup_key());
        assert!(a.dedup_key().starts_with("content:"));
    }

    #[test]
    fn grouped_key_combines_name_and_id() {
        assert_eq!(row("AWS", "1", "a").dedup_key(), "aws|1");
        assert_ne!(row("AWS", "1", "a").dedup_key(), row("Azure", "1", "a").dedup_key());
        assert_eq!(row("AWS", "", "Physical  access").dedup_key(), "aws|physical access");
    }

    #[test]
    fn cursor_values() {
        assert_eq!(vendor("2.3", "", "").cursor_value(), "2.3");
        assert_eq!(row("AWS", "4", "x").cursor_value(), "AWS|4");
        let long = "d".repeat(150);
        assert_eq!(row("Users", "", &long).cursor_value().len(), 100);
    }
}
