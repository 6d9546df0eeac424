//! Page classification: table pages carry tested controls, narrative pages
//! carry the opinion, assertion and system description.
//!
//! Each page is scored by a fixed set of weighted indicator rules. A page
//! is a table page when its net score exceeds [`TABLE_THRESHOLD`]; a score
//! equal to the threshold is ambiguous and resolves to narrative. An
//! explicit section heading overrides the score for its page.

use std::sync::LazyLock;

use regex::Regex;

use super::sections::{class_for_section, find_section_marker};
use crate::models::enums::PageClass;

/// Net score a page must exceed to be classified as a table page.
pub const TABLE_THRESHOLD: i32 = 2;

/// Characters in a prose block with no control or criteria reference
/// before it counts against the page.
pub const LONG_PROSE_CHARS: usize = 500;

/// Testing verb occurrences needed for the density rule.
pub const TESTING_VERB_MIN: usize = 3;

// ═══════════════════════════════════════════════════════════
// Patterns
// ═══════════════════════════════════════════════════════════

static CONTROL_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d+\.\d+\b").expect("Invalid control ref regex"));

static RESULT_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:no\s+)?exceptions?\s+noted\b|\bno\s+deviations?\b|\bdeviations?\s+noted\b")
        .expect("Invalid result phrase regex")
});

static TABLE_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\bcontrols?\s+specified\b|\btesting\s+performed\b|\bresults\s+of\s+(?:testing|tests)\b|\btests\s+of\s+(?:operating\s+)?(?:effectiveness|controls)\b",
    )
    .expect("Invalid table header regex")
});

static TSC_CRITERION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:CC|PI|A|C|P)\d{1,2}\.\d{1,2}\b").expect("Invalid criterion regex")
});

static TESTING_VERB: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:inspected|inquired|determined|observed|reviewed|verified|examined|reperformed)\b")
        .expect("Invalid testing verb regex")
});

static CONTINUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\(\s*continued\s*\)").expect("Invalid continuation regex"));

static NARRATIVE_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\boverview\s+of\s+operations\b|\bmanagement['’]s\s+assertion\b|\bindependent\s+service\s+auditor['’]s\s+report\b|\bdescription\s+of\s+the\s+system\b",
    )
    .expect("Invalid narrative header regex")
});

// ═══════════════════════════════════════════════════════════
// Indicator rules
// ═══════════════════════════════════════════════════════════

/// A named, weighted signal. Positive weights point to a table page,
/// negative weights to narrative.
pub struct IndicatorRule {
    pub name: &'static str,
    pub weight: i32,
    test: fn(&str) -> bool,
}

impl IndicatorRule {
    pub fn matches(&self, text: &str) -> bool {
        (self.test)(text)
    }
}

pub static INDICATOR_RULES: [IndicatorRule; 7] = [
    IndicatorRule {
        name: "control_ref_with_result",
        weight: 3,
        test: has_control_ref_with_result,
    },
    IndicatorRule {
        name: "table_header",
        weight: 3,
        test: has_table_header,
    },
    IndicatorRule {
        name: "tsc_criterion",
        weight: 2,
        test: has_tsc_criterion,
    },
    IndicatorRule {
        name: "testing_verb_density",
        weight: 2,
        test: has_testing_verb_density,
    },
    IndicatorRule {
        name: "continuation",
        weight: 1,
        test: has_continuation,
    },
    IndicatorRule {
        name: "long_prose",
        weight: -3,
        test: has_long_prose,
    },
    IndicatorRule {
        name: "narrative_header",
        weight: -3,
        test: has_narrative_header,
    },
];

fn has_control_ref_with_result(text: &str) -> bool {
    CONTROL_REF.is_match(text) && RESULT_PHRASE.is_match(text)
}

fn has_table_header(text: &str) -> bool {
    TABLE_HEADER.is_match(text)
}

fn has_tsc_criterion(text: &str) -> bool {
    TSC_CRITERION.is_match(text)
}

fn has_testing_verb_density(text: &str) -> bool {
    TESTING_VERB.find_iter(text).take(TESTING_VERB_MIN).count() >= TESTING_VERB_MIN
}

fn has_continuation(text: &str) -> bool {
    CONTINUATION.is_match(text)
}

fn has_narrative_header(text: &str) -> bool {
    NARRATIVE_HEADER.is_match(text)
}

/// A block of consecutive non-blank lines longer than [`LONG_PROSE_CHARS`]
/// that contains no control reference and no criterion.
fn has_long_prose(text: &str) -> bool {
    prose_blocks(text).any(|block| {
        block.chars().count() > LONG_PROSE_CHARS
            && !CONTROL_REF.is_match(&block)
            && !TSC_CRITERION.is_match(&block)
    })
}

fn prose_blocks(text: &str) -> impl Iterator<Item = String> + '_ {
    let mut lines = text.lines().peekable();
    std::iter::from_fn(move || {
        while lines.peek().is_some_and(|l| l.trim().is_empty()) {
            lines.next();
        }
        let mut block = Vec::new();
        while let Some(line) = lines.next_if(|l| !l.trim().is_empty()) {
            block.push(line.trim());
        }
        if block.is_empty() {
            None
        } else {
            Some(block.join(" "))
        }
    })
}

// ═══════════════════════════════════════════════════════════
// Scoring and classification
// ═══════════════════════════════════════════════════════════

/// Net score of a page and the rules that fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageScore {
    pub score: i32,
    pub fired: Vec<&'static str>,
}

pub fn score(text: &str) -> PageScore {
    let mut total = 0;
    let mut fired = Vec::new();
    for rule in &INDICATOR_RULES {
        if rule.matches(text) {
            total += rule.weight;
            fired.push(rule.name);
        }
    }
    PageScore { score: total, fired }
}

/// Classification of a single page before the boundary pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageVerdict {
    pub class: PageClass,
    pub score: PageScore,
    /// Section number from an explicit heading, when present.
    pub section: Option<u32>,
    /// Score landed exactly on the threshold.
    pub ambiguous: bool,
}

pub fn classify_page(text: &str) -> PageVerdict {
    let score = score(text);
    let section = find_section_marker(text);
    let ambiguous = score.score == TABLE_THRESHOLD;

    let class = match section {
        Some(n) => class_for_section(n),
        None if score.score > TABLE_THRESHOLD => PageClass::Table,
        None => PageClass::Narrative,
    };

    PageVerdict {
        class,
        score,
        section,
        ambiguous,
    }
}

/// Classify a page in isolation.
pub fn classify(text: &str) -> PageClass {
    classify_page(text).class
}

/// Classify every page, then pull the page before each table page into
/// the table class.
///
/// The boundary pass reads only the per-page classes, so it moves each
/// table region back by exactly one page. Pages classified by a section
/// heading keep their class.
pub fn classify_pages<S: AsRef<str>>(pages: &[S]) -> Vec<PageClass> {
    let verdicts: Vec<PageVerdict> = pages
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let verdict = classify_page(text.as_ref());
            if verdict.ambiguous && verdict.section.is_none() {
                tracing::debug!(
                    page = i + 1,
                    score = verdict.score.score,
                    rules = ?verdict.score.fired,
                    "Ambiguous page classification, resolved to narrative"
                );
            }
            verdict
        })
        .collect();

    apply_boundary_rule(&verdicts)
}

fn apply_boundary_rule(verdicts: &[PageVerdict]) -> Vec<PageClass> {
    let mut classes: Vec<PageClass> = verdicts.iter().map(|v| v.class).collect();
    for i in 0..verdicts.len().saturating_sub(1) {
        let next_is_table = verdicts[i + 1].class == PageClass::Table;
        if next_is_table && verdicts[i].section.is_none() {
            classes[i] = PageClass::Table;
        }
    }
    classes
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
