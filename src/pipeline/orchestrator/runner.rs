use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::Instrument;

use super::batch::{BatchMachine, BatchOutcome, BatchRecord};
use super::prompts::{
    batched_instruction, CRITERIA_INSTRUCTION, EXCEPTIONS_INSTRUCTION, OPINION_INSTRUCTION,
};
use super::records::{BatchEnvelope, CriteriaEnvelope, ExceptionsEnvelope, OpinionEnvelope};
use super::OrchestrationError;
use crate::config::AppConfig;
use crate::models::control::{group_rows, ComplementaryControlRow, ControlRecord};
use crate::models::document::ParsedDocument;
use crate::models::enums::{BatchedPhaseKind, Phase, Termination};
use crate::models::result::{ExtractionResult, PhaseSummary};
use crate::pipeline::gateway::{DocumentContext, ModelGateway, PromptContext};
use crate::pipeline::merge::{criteria_coverage, merge_criteria};

const SUBSERVICE_FALLBACK_NAME: &str = "Unspecified Subservice Organization";
const USER_ENTITY_FALLBACK_NAME: &str = "User Entity Controls";

/// Batching parameters for a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSettings {
    pub batch_size: u32,
    pub max_passes: u32,
    /// Pause between passes of a batched phase.
    pub pass_delay: Duration,
}

impl RunSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            max_passes: config.max_passes,
            pass_delay: config.pass_delay,
        }
    }
}

/// Drives one document through every extraction phase in order:
/// opinion → vendor controls → exceptions → subservice controls →
/// user entity controls → criteria mappings → merge.
///
/// Every run starts from the first phase with fresh cursors. A gateway
/// failure ends the run with the failing phase attached.
pub struct ExtractionOrchestrator {
    gateway: Arc<ModelGateway>,
    settings: RunSettings,
}

impl ExtractionOrchestrator {
    pub fn new(gateway: Arc<ModelGateway>, settings: RunSettings) -> Self {
        Self { gateway, settings }
    }

    pub async fn run(&self, doc: &ParsedDocument) -> Result<ExtractionResult, OrchestrationError> {
        let span = tracing::info_span!("extraction_run", doc_id = %doc.doc_id);
        self.run_phases(doc).instrument(span).await
    }

    async fn run_phases(&self, doc: &ParsedDocument) -> Result<ExtractionResult, OrchestrationError> {
        let context = DocumentContext::build(doc);
        let mut result = ExtractionResult::default();
        result.meta.doc_id = doc.doc_id.clone();

        let mut vendor_rows: Vec<ControlRecord> = Vec::new();
        let mut phase = Phase::AuditorOpinion;

        while phase != Phase::Done {
            tracing::info!(phase = %phase, "Phase started");
            let summary = match phase {
                Phase::AuditorOpinion => {
                    let env: OpinionEnvelope =
                        self.call(phase, &context.narrative, OPINION_INSTRUCTION).await?;
                    result.auditor_opinion = env.auditor_opinion;
                    PhaseSummary::single_call(phase, 1)
                }
                Phase::VendorControls => {
                    let outcome = self
                        .run_batched::<ControlRecord>(phase, BatchedPhaseKind::Vendor, &context.tables)
                        .await?;
                    let summary = batched_summary(phase, &outcome);
                    vendor_rows = outcome.records;
                    assign_synthetic_ids(&mut vendor_rows);
                    summary
                }
                Phase::Exceptions => {
                    let env: ExceptionsEnvelope =
                        self.call(phase, &context.tables, EXCEPTIONS_INSTRUCTION).await?;
                    result.exceptions = env.exceptions;
                    PhaseSummary::single_call(phase, result.exceptions.len())
                }
                Phase::SubserviceControls => {
                    let outcome = self
                        .run_batched::<ComplementaryControlRow>(phase, BatchedPhaseKind::Subservice, &context.tables)
                        .await?;
                    let summary = batched_summary(phase, &outcome);
                    result.meta.subservice_control_count = outcome.records.len();
                    result.subservice_controls = group_rows(outcome.records, SUBSERVICE_FALLBACK_NAME);
                    summary
                }
                Phase::UserEntityControls => {
                    let outcome = self
                        .run_batched::<ComplementaryControlRow>(phase, BatchedPhaseKind::UserEntity, &context.tables)
                        .await?;
                    let summary = batched_summary(phase, &outcome);
                    result.meta.user_entity_control_count = outcome.records.len();
                    result.user_entity_controls = group_rows(outcome.records, USER_ENTITY_FALLBACK_NAME);
                    summary
                }
                Phase::CriteriaMappings => {
                    let env: CriteriaEnvelope =
                        self.call(phase, &context.tables, CRITERIA_INSTRUCTION).await?;
                    result.criteria_mappings = env.criteria_mappings;
                    PhaseSummary::single_call(phase, result.criteria_mappings.len())
                }
                Phase::Merge => {
                    let (merged, stats) =
                        merge_criteria(std::mem::take(&mut vendor_rows), &result.criteria_mappings);
                    result.criteria_coverage = criteria_coverage(&merged);
                    result.vendor_controls = merged;
                    result.meta.merge = stats;
                    PhaseSummary {
                        phase,
                        passes: 0,
                        records: result.vendor_controls.len(),
                        duplicates_discarded: 0,
                        termination: None,
                        last_cursor: None,
                    }
                }
                Phase::Done => break,
            };

            tracing::info!(
                phase = %phase,
                passes = summary.passes,
                records = summary.records,
                "Phase complete"
            );
            if summary.termination == Some(Termination::MaxPassExceeded) {
                result.meta.max_pass_exceeded = true;
            }
            result.meta.phases.push(summary);
            phase = phase.next();
        }

        result.meta.vendor_control_count = result.vendor_controls.len();
        result.meta.exception_count = result.exceptions.len();
        result.meta.criteria_mapping_count = result.criteria_mappings.len();

        tracing::info!(
            vendor_controls = result.meta.vendor_control_count,
            exceptions = result.meta.exception_count,
            subservice_controls = result.meta.subservice_control_count,
            user_entity_controls = result.meta.user_entity_control_count,
            criteria_mappings = result.meta.criteria_mapping_count,
            max_pass_exceeded = result.meta.max_pass_exceeded,
            "Extraction run complete"
        );
        Ok(result)
    }

    /// One gateway call, parsed as `T`, with failures tagged by phase.
    async fn call<T: DeserializeOwned>(
        &self,
        phase: Phase,
        context: &PromptContext,
        instruction: &str,
    ) -> Result<T, OrchestrationError> {
        self.gateway
            .invoke_json(context, instruction)
            .await
            .map_err(|source| {
                tracing::error!(phase = %phase, kind = %source.kind(), error = %source, "Extraction run aborted");
                OrchestrationError { phase, source }
            })
    }

    async fn run_batched<T: BatchRecord>(
        &self,
        phase: Phase,
        kind: BatchedPhaseKind,
        context: &PromptContext,
    ) -> Result<BatchOutcome<T>, OrchestrationError> {
        let mut machine: BatchMachine<T> = BatchMachine::new(kind, self.settings.max_passes);

        while let Some(request) = machine.next_request() {
            if request.pass > 1 && !self.settings.pass_delay.is_zero() {
                tokio::time::sleep(self.settings.pass_delay).await;
            }
            let instruction =
                batched_instruction(kind, self.settings.batch_size, request.cursor.as_deref());
            let envelope: BatchEnvelope<T> = self.call(phase, context, &instruction).await?;
            let outcome = machine.apply(envelope);

            tracing::info!(
                phase = %phase,
                pass = outcome.pass,
                received = outcome.received,
                added = outcome.added,
                duplicates = outcome.duplicates,
                has_more = outcome.has_more,
                cursor = machine.cursor().last_control_id.as_deref().unwrap_or(""),
                "Batch pass"
            );
        }

        if machine.termination() == Some(Termination::MaxPassExceeded) {
            tracing::warn!(
                phase = %phase,
                max_passes = self.settings.max_passes,
                cursor = machine.cursor().last_control_id.as_deref().unwrap_or(""),
                "Pass limit reached while the model still reported more records"
            );
        }
        Ok(machine.finish())
    }
}

fn batched_summary<T>(phase: Phase, outcome: &BatchOutcome<T>) -> PhaseSummary {
    PhaseSummary {
        phase,
        passes: outcome.passes,
        records: outcome.records.len(),
        duplicates_discarded: outcome.duplicates_discarded,
        termination: Some(outcome.termination),
        last_cursor: outcome.last_cursor.clone(),
    }
}

/// Give every id-less vendor control a `C-001`-style id that does not
/// collide with an extracted one.
fn assign_synthetic_ids(controls: &mut [ControlRecord]) {
    let taken: HashSet<String> = controls
        .iter()
        .map(|c| c.control_id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect();

    let mut next = 1;
    let mut assigned = 0;
    for control in controls.iter_mut().filter(|c| c.control_id.trim().is_empty()) {
        let id = loop {
            let candidate = format!("C-{next:03}");
            next += 1;
            if !taken.contains(&candidate) {
                break candidate;
            }
        };
        control.control_id = id;
        assigned += 1;
    }
    if assigned > 0 {
        tracing::info!(assigned, "Assigned synthetic ids to vendor controls without one");
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::document::Page;
    use crate::models::enums::PageClass;
    use crate::pipeline::gateway::mock::ScriptedClient;
    use crate::pipeline::gateway::{
        ContextScope, GatewayError, GatewayErrorKind, GenerationSettings, RetryPolicy,
    };

    fn doc() -> ParsedDocument {
        ParsedDocument {
            doc_id: "doc-1".into(),
            pages: vec![Page {
                index: 1,
                text: "1.1 No exceptions noted".into(),
                classification: PageClass::Table,
            }],
            full_text: "=== PAGE 1 ===\n1.1 No exceptions noted".into(),
            table_text: "=== PAGE 1 ===\n1.1 No exceptions noted".into(),
            narrative_text: String::new(),
            fingerprint: None,
            parsed_at: Utc::now(),
        }
    }

    fn orchestrator(client: Arc<ScriptedClient>, max_passes: u32) -> ExtractionOrchestrator {
        let gateway = ModelGateway::new(
            client,
            RetryPolicy::new(2, Duration::from_millis(10)),
            GenerationSettings::default(),
        );
        ExtractionOrchestrator::new(
            Arc::new(gateway),
            RunSettings {
                batch_size: 20,
                max_passes,
                pass_delay: Duration::from_millis(200),
            },
        )
    }

    fn opinion() -> String {
        r#"{"auditor_opinion": {"service_product": "Acme Cloud", "report_type": "SOC 2 Type 2",
            "scope_date": "01/01/2024 - 12/31/2024", "auditors_opinion": "In our opinion...",
            "auditors_name": "Example LLP", "qualified_opinion": false}}"#
            .into()
    }

    fn batch(controls: &str, has_more: bool, last: &str) -> String {
        format!(
            r#"{{"extraction": {{"controls": [{controls}]}}, "meta": {{"has_more": {has_more}, "last_control_id": "{last}"}}}}"#
        )
    }

    fn empty_batch() -> String {
        r#"{"extraction": {"controls": []}, "meta": {"has_more": false, "last_control_id": null}}"#.into()
    }

    fn ok(s: String) -> Result<String, GatewayError> {
        Ok(s)
    }

    #[tokio::test(start_paused = true)]
    async fn full_run_dedups_and_merges() {
        let client = Arc::new(ScriptedClient::new(vec![
            ok(opinion()),
            ok(batch(r#"{"control_id": "1.1", "criterion": ["CC6.1"], "result": "No exceptions noted"}"#, true, "1.1")),
            ok(batch(
                r#"{"control_id": "1.1", "criterion": []}, {"control_id": "1.2", "criterion": []}"#,
                false,
                "1.2",
            )),
            ok(r#"{"exceptions": [{"control_objective": "1.2", "exception_description": "1 of 25 samples"}]}"#.into()),
            ok(batch(r#"{"organization_name": "AWS", "control_id": "1", "description": "Physical security", "criteria_covered": ["CC6.4"]}"#, false, "AWS|1")),
            ok(batch(r#"{"category": "Access", "control_id": "", "description": "Customers review their users"}"#, false, "")),
            ok(r#"{"criteria_mappings": [{"criterion_id": "CC6.2", "mapped_controls": ["1.1-1.2", "9.9"]}]}"#.into()),
        ]));
        let result = orchestrator(Arc::clone(&client), 10).run(&doc()).await.unwrap();

        assert_eq!(client.calls(), 7);
        assert_eq!(result.auditor_opinion.auditors_name, "Example LLP");

        let ids: Vec<_> = result.vendor_controls.iter().map(|c| c.control_id.as_str()).collect();
        assert_eq!(ids, vec!["1.1", "1.2"]);
        assert_eq!(result.vendor_controls[0].result, "No exceptions noted");
        assert!(result.vendor_controls[0].criterion.contains("CC6.1"));
        assert!(result.vendor_controls[0].criterion.contains("CC6.2"));
        assert!(result.vendor_controls[1].criterion.contains("CC6.2"));

        assert_eq!(result.exceptions.len(), 1);
        assert_eq!(result.subservice_controls[0].name, "AWS");
        assert_eq!(result.user_entity_controls[0].name, "Access");
        assert_eq!(result.criteria_coverage["CC6.2"], vec!["1.1", "1.2"]);

        let meta = &result.meta;
        assert_eq!(meta.vendor_control_count, 2);
        assert_eq!(meta.merge.orphan_references, 1);
        assert!(!meta.max_pass_exceeded);
        let vendor = meta.phase(Phase::VendorControls).unwrap();
        assert_eq!(vendor.passes, 2);
        assert_eq!(vendor.duplicates_discarded, 1);
        assert_eq!(vendor.termination, Some(Termination::Exhausted));
        let order: Vec<_> = meta.phases.iter().map(|p| p.phase).collect();
        assert_eq!(order, Phase::ORDER[..7].to_vec());
    }

    #[tokio::test(start_paused = true)]
    async fn opinion_uses_narrative_context_and_batches_use_tables() {
        let client = Arc::new(ScriptedClient::new(vec![
            ok(opinion()),
            ok(empty_batch()),
            ok(r#"{"exceptions": []}"#.into()),
            ok(empty_batch()),
            ok(empty_batch()),
            ok(r#"{"criteria_mappings": []}"#.into()),
        ]));
        orchestrator(Arc::clone(&client), 10).run(&doc()).await.unwrap();

        let scopes: Vec<_> = client.requests().iter().map(|r| r.scope).collect();
        assert_eq!(scopes[0], ContextScope::Narrative);
        assert!(scopes[1..].iter().all(|s| *s == ContextScope::Tables));
    }

    #[tokio::test(start_paused = true)]
    async fn endless_has_more_is_flagged_not_fatal() {
        let endless = batch(r#"{"control_id": "1.1"}"#, true, "1.1");
        let mut script = vec![ok(opinion())];
        script.extend((0..3).map(|_| ok(endless.clone())));
        script.push(ok(r#"{"exceptions": []}"#.into()));
        script.push(ok(empty_batch()));
        script.push(ok(empty_batch()));
        script.push(ok(r#"{"criteria_mappings": []}"#.into()));

        let client = Arc::new(ScriptedClient::new(script));
        let result = orchestrator(Arc::clone(&client), 3).run(&doc()).await.unwrap();

        assert!(result.meta.max_pass_exceeded);
        let vendor = result.meta.phase(Phase::VendorControls).unwrap();
        assert_eq!(vendor.passes, 3);
        assert_eq!(vendor.termination, Some(Termination::MaxPassExceeded));
        assert_eq!(vendor.last_cursor.as_deref(), Some("1.1"));
        assert_eq!(result.vendor_controls.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cursor_is_threaded_into_next_instruction() {
        let client = Arc::new(ScriptedClient::new(vec![
            ok(opinion()),
            ok(batch(r#"{"control_id": "4.7"}"#, true, "4.7")),
            ok(empty_batch()),
        ]));
        let _ = orchestrator(Arc::clone(&client), 10).run(&doc()).await;

        let requests = client.requests();
        assert!(requests[1].instruction.contains("starting after cursor: \"\""));
        assert!(requests[2].instruction.contains("starting after cursor: \"4.7\""));
    }

    #[tokio::test(start_paused = true)]
    async fn gateway_failure_aborts_with_phase() {
        let client = Arc::new(ScriptedClient::new(vec![
            ok(opinion()),
            ok(empty_batch()),
            Err(GatewayError::Fatal("access denied".into())),
        ]));
        let err = orchestrator(Arc::clone(&client), 10).run(&doc()).await.unwrap_err();

        assert_eq!(err.phase, Phase::Exceptions);
        assert_eq!(err.source.kind(), GatewayErrorKind::Fatal);
        assert_eq!(client.calls(), 3);
        assert!(err.to_string().starts_with("exceptions phase failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_batch_aborts_with_phase() {
        let client = Arc::new(ScriptedClient::new(vec![
            ok(opinion()),
            ok("```json\n{}\n```".into()),
        ]));
        let err = orchestrator(Arc::clone(&client), 10).run(&doc()).await.unwrap_err();

        assert_eq!(err.phase, Phase::VendorControls);
        assert_eq!(err.source.kind(), GatewayErrorKind::Malformed);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_is_retried_inside_phase() {
        let client = Arc::new(ScriptedClient::new(vec![
            Err(GatewayError::Transient("reset".into())),
            ok(opinion()),
            ok(empty_batch()),
            ok(r#"{"exceptions": []}"#.into()),
            ok(empty_batch()),
            ok(empty_batch()),
            ok(r#"{"criteria_mappings": []}"#.into()),
        ]));
        let result = orchestrator(Arc::clone(&client), 10).run(&doc()).await.unwrap();
        assert_eq!(result.auditor_opinion.service_product, "Acme Cloud");
        assert_eq!(client.calls(), 7);
    }

    #[test]
    fn synthetic_ids_skip_taken_ones() {
        let record = |id: &str| ControlRecord {
            control_id: id.into(),
            criterion: Default::default(),
            control_title: String::new(),
            control_description: String::new(),
            tests_applied: vec![],
            result: String::new(),
        };
        let mut controls = vec![record("C-001"), record(""), record("1.1"), record(" ")];
        assign_synthetic_ids(&mut controls);
        let ids: Vec<_> = controls.iter().map(|c| c.control_id.as_str()).collect();
        assert_eq!(ids, vec!["C-001", "C-002", "1.1", "C-003"]);
    }
}
