use std::sync::LazyLock;

use regex::Regex;

/// Longest range expanded into individual references.
const MAX_RANGE_SPAN: u32 = 200;

static NUMERIC_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(?:\.\d+)+$").expect("Invalid numeric ref regex"));

/// "1.1-1.5", "CC6.1 – CC6.3", "1.1 to 1.5"
static RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^([A-Z]*)\s*(\d+)\.(\d+)\s*(?:-|–|—|\bto\b|\bthrough\b)\s*([A-Z]*)\s*(\d+)\.(\d+)$")
        .expect("Invalid range regex")
});

/// Canonical form of a control reference.
///
/// Numeric references compare segment by segment, so `1.01` and `1.1` are
/// the same control while `1.10` is a different one. Other references are
/// trimmed and upper-cased.
pub fn normalize_control_ref(reference: &str) -> String {
    let trimmed = reference.trim().trim_end_matches('.');
    if NUMERIC_REF.is_match(trimmed) {
        return trimmed
            .split('.')
            .map(|segment| {
                let digits = segment.trim_start_matches('0');
                if digits.is_empty() {
                    "0"
                } else {
                    digits
                }
            })
            .collect::<Vec<_>>()
            .join(".");
    }
    trimmed
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_uppercase()
}

/// Canonical form of a criterion id: `cc 6.1` → `CC6.1`.
pub fn normalize_criterion(criterion: &str) -> String {
    criterion
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase()
}

/// Split a mapping cell into individual references, expanding ranges.
///
/// A range within one section (`1.1-1.5`) expands to every member. A range
/// across sections (`1.8-2.2`) cannot be enumerated and yields its two ends.
pub fn expand_references(cell: &str) -> Vec<String> {
    let mut out = Vec::new();
    for piece in cell.split([',', ';', '\n']) {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }
        match expand_range(piece) {
            Some(members) => out.extend(members),
            None => out.push(piece.to_string()),
        }
    }
    out
}

fn expand_range(piece: &str) -> Option<Vec<String>> {
    let caps = RANGE.captures(piece)?;
    let prefix = &caps[1];
    let end_prefix = &caps[4];
    if !end_prefix.is_empty() && !end_prefix.eq_ignore_ascii_case(prefix) {
        return None;
    }

    let major: u32 = caps[2].parse().ok()?;
    let lo: u32 = caps[3].parse().ok()?;
    let end_major: u32 = caps[5].parse().ok()?;
    let hi: u32 = caps[6].parse().ok()?;

    let start = format!("{prefix}{}.{}", &caps[2], &caps[3]);
    let end = format!("{prefix}{}.{}", &caps[5], &caps[6]);
    if major != end_major || hi < lo || hi - lo > MAX_RANGE_SPAN {
        return Some(vec![start, end]);
    }
    Some((lo..=hi).map(|minor| format!("{prefix}{major}.{minor}")).collect())
}
