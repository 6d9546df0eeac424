//! Reconciles criteria found in control tables with criteria from
//! dedicated mapping tables.

pub mod references;

pub use references::*;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::models::control::{ControlRecord, CriteriaMapping};
use crate::models::result::{MergeStats, OrphanReference};

/// Add every mapping's criterion to each control it references.
///
/// Criteria sets only grow, so merging the same mappings twice changes
/// nothing the second time. References to unknown controls are reported
/// as orphans and never dropped silently.
pub fn merge_criteria(
    mut controls: Vec<ControlRecord>,
    mappings: &[CriteriaMapping],
) -> (Vec<ControlRecord>, MergeStats) {
    for control in &mut controls {
        control.criterion = control
            .criterion
            .iter()
            .map(|c| normalize_criterion(c))
            .filter(|c| !c.is_empty())
            .collect();
    }

    let mut index: HashMap<String, usize> = HashMap::new();
    for (i, control) in controls.iter().enumerate() {
        index.entry(normalize_control_ref(&control.control_id)).or_insert(i);
    }

    let mut stats = MergeStats {
        controls_with_direct_criteria: controls.iter().filter(|c| !c.criterion.is_empty()).count(),
        ..MergeStats::default()
    };
    let mut enriched = vec![false; controls.len()];
    let mut seen_orphans: BTreeSet<(String, String)> = BTreeSet::new();

    for mapping in mappings {
        // A mapping without a criterion adds nothing, but its unknown
        // references are still orphans.
        let criterion = normalize_criterion(&mapping.criterion_id);
        if criterion.is_empty() {
            tracing::warn!(
                refs = mapping.mapped_controls.len(),
                "Criteria mapping without a criterion id"
            );
        }

        for cell in &mapping.mapped_controls {
            for reference in expand_references(cell) {
                let key = normalize_control_ref(&reference);
                match index.get(&key) {
                    Some(_) if criterion.is_empty() => {}
                    Some(&i) => {
                        if controls[i].criterion.insert(criterion.clone()) {
                            stats.criteria_added += 1;
                            enriched[i] = true;
                        }
                    }
                    None => {
                        if seen_orphans.insert((criterion.clone(), key)) {
                            tracing::warn!(
                                criterion_id = %criterion,
                                control_id = %reference,
                                "Orphan criteria reference"
                            );
                            stats.orphans.push(OrphanReference {
                                criterion_id: criterion.clone(),
                                control_id: reference,
                            });
                        }
                    }
                }
            }
        }
    }

    stats.controls_enriched = enriched.iter().filter(|&&e| e).count();
    stats.orphan_references = stats.orphans.len();

    tracing::info!(
        controls = controls.len(),
        mappings = mappings.len(),
        direct = stats.controls_with_direct_criteria,
        enriched = stats.controls_enriched,
        added = stats.criteria_added,
        orphans = stats.orphan_references,
        "Criteria merge complete"
    );

    (controls, stats)
}

/// Reverse index: criterion id → ids of the controls that carry it.
pub fn criteria_coverage(controls: &[ControlRecord]) -> BTreeMap<String, Vec<String>> {
    let mut coverage: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for control in controls {
        for criterion in &control.criterion {
            let ids = coverage.entry(criterion.clone()).or_default();
            if !ids.contains(&control.control_id) {
                ids.push(control.control_id.clone());
            }
        }
    }
    coverage
}
