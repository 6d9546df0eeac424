use std::sync::LazyLock;

use regex::Regex;

use crate::models::enums::PageClass;

/// Sections up to this number hold the opinion, assertion and system
/// description. Control testing starts at Section III.
const LAST_NARRATIVE_SECTION: u32 = 2;

/// Heading-style marker at the start of a line: "Section III", "SECTION 4",
/// "Section Three".
static SECTION_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)^[ \t]*section[ \t]+(zero|one|two|three|four|five|six|seven|eight|nine|ten|[ivx]+|\d{1,2})\b",
    )
    .expect("Invalid section marker regex")
});

/// Section number of the first heading-style marker on the page.
pub fn find_section_marker(text: &str) -> Option<u32> {
    SECTION_MARKER
        .captures_iter(text)
        .find_map(|caps| parse_section_number(&caps[1]))
}

/// Class implied by a section number.
pub fn class_for_section(section: u32) -> PageClass {
    if section <= LAST_NARRATIVE_SECTION {
        PageClass::Narrative
    } else {
        PageClass::Table
    }
}

fn parse_section_number(token: &str) -> Option<u32> {
    let token = token.to_ascii_lowercase();
    if let Ok(n) = token.parse::<u32>() {
        return Some(n);
    }
    let word = match token.as_str() {
        "zero" => Some(0),
        "one" => Some(1),
        "two" => Some(2),
        "three" => Some(3),
        "four" => Some(4),
        "five" => Some(5),
        "six" => Some(6),
        "seven" => Some(7),
        "eight" => Some(8),
        "nine" => Some(9),
        "ten" => Some(10),
        _ => None,
    };
    word.or_else(|| parse_roman(&token))
}

/// Roman numerals built from i, v and x (up to 39).
fn parse_roman(token: &str) -> Option<u32> {
    let values: Vec<u32> = token
        .chars()
        .map(|c| match c {
            'i' => Some(1),
            'v' => Some(5),
            'x' => Some(10),
            _ => None,
        })
        .collect::<Option<_>>()?;
    if values.is_empty() {
        return None;
    }

    let mut total = 0;
    for (i, &v) in values.iter().enumerate() {
        match values.get(i + 1) {
            Some(&next) if next > v => total -= v as i64,
            _ => total += v as i64,
        }
    }
    u32::try_from(total).ok().filter(|&n| n > 0)
}
