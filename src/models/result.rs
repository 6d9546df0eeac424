use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::control::{
    AuditorOpinion, ControlRecord, CriteriaMapping, ExceptionRecord, GroupedControlRecord,
};
use super::enums::{Phase, Termination};

/// Everything one extraction run produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub auditor_opinion: AuditorOpinion,
    pub vendor_controls: Vec<ControlRecord>,
    pub exceptions: Vec<ExceptionRecord>,
    pub subservice_controls: Vec<GroupedControlRecord>,
    pub user_entity_controls: Vec<GroupedControlRecord>,
    pub criteria_mappings: Vec<CriteriaMapping>,
    /// criterion_id → control ids carrying it after merge.
    pub criteria_coverage: BTreeMap<String, Vec<String>>,
    pub meta: ExtractionMeta,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionMeta {
    pub doc_id: String,
    pub vendor_control_count: usize,
    pub exception_count: usize,
    pub subservice_control_count: usize,
    pub user_entity_control_count: usize,
    pub criteria_mapping_count: usize,
    pub phases: Vec<PhaseSummary>,
    pub merge: MergeStats,
    /// True when any batched phase stopped at the pass bound.
    pub max_pass_exceeded: bool,
}

impl ExtractionMeta {
    pub fn phase(&self, phase: Phase) -> Option<&PhaseSummary> {
        self.phases.iter().find(|p| p.phase == phase)
    }
}

/// Bookkeeping for one completed phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseSummary {
    pub phase: Phase,
    /// Gateway calls made (1 for single-call phases).
    pub passes: u32,
    pub records: usize,
    pub duplicates_discarded: usize,
    /// Present for batched phases only.
    pub termination: Option<Termination>,
    /// Cursor value when the phase stopped. Diagnostic only; a new run
    /// always starts from the beginning.
    pub last_cursor: Option<String>,
}

impl PhaseSummary {
    pub fn single_call(phase: Phase, records: usize) -> Self {
        Self {
            phase,
            passes: 1,
            records,
            duplicates_discarded: 0,
            termination: None,
            last_cursor: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeStats {
    /// Controls that already carried at least one criterion before merge.
    pub controls_with_direct_criteria: usize,
    /// Controls that gained at least one criterion from the mapping table.
    pub controls_enriched: usize,
    /// Total (control, criterion) pairs added.
    pub criteria_added: usize,
    pub orphan_references: usize,
    pub orphans: Vec<OrphanReference>,
}

/// A mapping-table reference to a control id that no extracted control has.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrphanReference {
    pub criterion_id: String,
    pub control_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_looks_up_phase_summary() {
        let meta = ExtractionMeta {
            phases: vec![
                PhaseSummary::single_call(Phase::AuditorOpinion, 1),
                PhaseSummary {
                    phase: Phase::VendorControls,
                    passes: 3,
                    records: 40,
                    duplicates_discarded: 2,
                    termination: Some(Termination::Exhausted),
                    last_cursor: Some("3.4".into()),
                },
            ],
            ..Default::default()
        };
        assert_eq!(meta.phase(Phase::VendorControls).unwrap().passes, 3);
        assert!(meta.phase(Phase::Exceptions).is_none());
    }

    #[test]
    fn result_serializes_phase_names_in_snake_case() {
        let mut result = ExtractionResult::default();
        result
            .meta
            .phases
            .push(PhaseSummary::single_call(Phase::CriteriaMappings, 0));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["meta"]["phases"][0]["phase"], "criteria_mappings");
        assert_eq!(json["meta"]["max_pass_exceeded"], false);
    }
}
