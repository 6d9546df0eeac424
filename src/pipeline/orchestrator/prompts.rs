//! Per-phase instructions. Each one pins the response to the envelope the
//! phase parses in `records`.

use crate::models::enums::BatchedPhaseKind;

pub const OPINION_INSTRUCTION: &str = r#"TASK: Extract the AUDITOR'S OPINION and general report information.

Look for the Independent Service Auditor's Report (usually near the beginning), the report type (SOC 1 or SOC 2, Type 1 or Type 2), the period covered, whether the opinion is qualified, and the auditing firm.

Output STRICT JSON ONLY with EXACTLY this schema:

{
  "auditor_opinion": {
    "service_product": "string (company or service that was audited)",
    "report_type": "string (one of: 'SOC 1 Type 1', 'SOC 1 Type 2', 'SOC 2 Type 1', 'SOC 2 Type 2')",
    "scope_date": "string (mm/dd/yyyy, or mm/dd/yyyy - mm/dd/yyyy for a period)",
    "auditors_opinion": "string (full text of the opinion section)",
    "auditors_name": "string (auditing firm or auditor)",
    "qualified_opinion": true or false
  }
}

Rules:
- qualified_opinion is true only when the opinion is qualified; unqualified or unmodified opinions are false.
- Use empty strings for anything not present.
"#;

pub const EXCEPTIONS_INSTRUCTION: &str = r#"TASK: Extract EXCEPTIONS (control test failures or deviations) from this document.

Exception details and management's responses may be in different tables or sections, including at the very end of the document. Match each response to its exception by control ID, exception number, or context.

Output STRICT JSON ONLY with EXACTLY this schema:

{
  "exceptions": [
    {
      "control_objective": "string (control ID, objective, or criterion the exception relates to)",
      "testing_description": "string (testing that found the exception)",
      "exception_description": "string (the exception or deviation)",
      "management_response": "string (management's response or remediation plan)"
    }
  ]
}

Rules:
- Extract ALL exceptions. Controls with "No exceptions noted" are not exceptions.
- If there are no exceptions, return an empty list.
- Use empty strings for fields not present.
"#;

pub const CRITERIA_INSTRUCTION: &str = r#"TASK: Extract criteria-to-control mappings from dedicated MAPPING TABLES.

Criteria IDs start with letters such as CC, A, C, P or PI followed by numbers (CC1.1, A1.2). Mapping tables list, for each criterion, the controls that satisfy it.

Output STRICT JSON ONLY with EXACTLY this schema:

{
  "criteria_mappings": [
    {
      "criterion_id": "string",
      "criterion_description": "string (requirement text if available, else empty)",
      "mapped_controls": ["string", "..."]
    }
  ]
}

Rules:
- Expand control ranges: "1.1-1.5" becomes ["1.1", "1.2", "1.3", "1.4", "1.5"].
- Split comma lists: "1.3, 2.1" becomes ["1.3", "2.1"].
- If no mapping tables exist, return an empty list.
"#;

const VENDOR_TASK: &str = r#"TASK: Extract VENDOR / SERVICE ORGANIZATION CONTROLS from the test result tables.

These controls are performed by the audited organization. Each has a reference number (for example 1.1 or 6.15), a description, the tests the auditor applied, and a result. Do NOT include criteria mapping tables, complementary subservice organization controls, complementary user entity controls, narrative text, or exception tables.

If criteria (CC6.1, A1.1, ...) appear next to a control in its table, list them in "criterion"; otherwise use [].

Each record in "controls" has this shape:
{
  "control_id": "string",
  "criterion": ["string", "..."],
  "control_title": "string (short title or summary)",
  "control_description": "string",
  "tests_applied": ["string", "..."],
  "result": "string"
}"#;

const SUBSERVICE_TASK: &str = r#"TASK: Extract COMPLEMENTARY SUBSERVICE ORGANIZATION CONTROLS.

These are controls third-party providers (cloud hosts, data centers, ...) are expected to operate. Extract EVERY row of those tables.

Each record in "controls" has this shape:
{
  "organization_name": "string (the subservice organization)",
  "control_id": "string (row ID if present, else empty)",
  "description": "string",
  "criteria_covered": ["string", "..."]
}

Set "last_control_id" to "OrganizationName|ControlID" of the last record."#;

const USER_ENTITY_TASK: &str = r#"TASK: Extract COMPLEMENTARY USER ENTITY CONTROLS (CUECs).

These are controls customers of the service are expected to implement, often listed in Section III or in a criteria table with one criterion followed by several CUECs. Extract EVERY row and list its mapped criteria.

Each record in "controls" has this shape:
{
  "category": "string (category name, or 'User Entity Controls' if uncategorized)",
  "control_id": "string (row ID if present, else empty)",
  "description": "string",
  "criteria_covered": ["string", "..."]
}

When rows have no IDs, set "last_control_id" to the first 100 characters of the last record's description."#;

/// Instruction for one pass of a batched phase.
pub fn batched_instruction(kind: BatchedPhaseKind, batch_size: u32, cursor: Option<&str>) -> String {
    let task = match kind {
        BatchedPhaseKind::Vendor => VENDOR_TASK,
        BatchedPhaseKind::Subservice => SUBSERVICE_TASK,
        BatchedPhaseKind::UserEntity => USER_ENTITY_TASK,
    };
    let cursor = cursor.unwrap_or("");

    format!(
        r#"{task}

You will be called multiple times. Each call returns UP TO the requested number of records, starting AFTER the cursor.

Output STRICT JSON ONLY with EXACTLY this envelope:

{{
  "extraction": {{
    "controls": [ ... ]
  }},
  "meta": {{
    "last_control_id": "string (identifier of the LAST record in this batch)",
    "has_more": true or false
  }}
}}

Rules:
- Start from the record AFTER the cursor; if the cursor is empty, start at the beginning.
- Return at most {batch_size} records.
- Set "has_more" to false once no records remain after this batch.
- If nothing remains after the cursor, return an empty "controls" list with "has_more": false.
- Expand criteria ranges: "CC6.1-CC6.3" becomes ["CC6.1", "CC6.2", "CC6.3"].
- Use empty strings for missing scalar fields and [] for missing lists.

EXTRACTION REQUEST: Extract up to {batch_size} records, starting after cursor: "{cursor}".
"#
    )
}
