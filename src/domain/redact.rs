//! Redactor. Strips common personally-identifying substrings before text leaves the process.
//!
//! Rules run in declaration order and the order is part of the contract: emails go first so
//! their digits never look like phone numbers, and labeled names go last so a role label
//! still reads naturally next to an already-redacted address or number. Every placeholder is
//! shaped so no rule can match it again, which makes `redact` idempotent.

use super::entities::Entry;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

struct RedactionRule {
    name: &'static str,
    pattern: Regex,
    replacement: &'static str,
}

/// Role labels that introduce a person's name, as in `Sponsor: John Smith`.
const ROLES: &str = "sponsor|mentor|counselor|therapist|case manager|caseworker|doctor|dr|probation officer|parole officer|po|supervisor|manager|employer|boss|resident|staff|contact";

const RULE_SOURCES: &[(&str, &str, &str)] = &[
    (
        "email",
        r"(?i)\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}\b",
        "[EMAIL]",
    ),
    (
        "phone",
        r"(?:(?:\+|\b)1[-.\s]?(?:\(\d{3}\)\s?|\d{3}[-.\s]?)|\(\d{3}\)\s?|\b\d{3}[-.\s]?)\d{3}[-.\s]?\d{4}\b",
        "[PHONE]",
    ),
    (
        // The character after the suffix is captured and put back; a `:` there means the
        // word is a role label (`Dr: Smith`), not part of the address.
        "address",
        r"\b\d{1,5}\s+(?:[A-Z][a-z]+\s+){1,3}(?i:street|st|avenue|ave|road|rd|boulevard|blvd|lane|ln|drive|dr|court|ct|way|place|pl)\b\.?(?P<after>[^:\w]|$)",
        "[ADDRESS]${after}",
    ),
];

static RULES: Lazy<Vec<RedactionRule>> = Lazy::new(|| {
    RULE_SOURCES
        .iter()
        .map(|(name, source, replacement)| RedactionRule {
            name,
            pattern: Regex::new(source).expect("static redaction pattern"),
            replacement,
        })
        .collect()
});

static LABELED_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"\b(?P<role>(?i:{ROLES}))\s*:\s*[A-Z][a-z]+(?:\s+(?P<last>[A-Z][a-z]+))?"
    ))
    .expect("static labeled-name pattern")
});

static ROLE_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"^(?i:{ROLES})$")).expect("static role pattern"));

/// Replace sensitive substrings with fixed placeholder tokens. Never fails; unmatched text
/// passes through unchanged.
pub fn redact(text: &str) -> String {
    let mut out = text.to_string();
    for rule in RULES.iter() {
        if rule.pattern.is_match(&out) {
            tracing::trace!(rule = rule.name, "redaction rule fired");
            out = rule
                .pattern
                .replace_all(&out, rule.replacement)
                .into_owned();
        }
    }
    redact_labeled_names(out)
}

/// `Role: First Last` becomes `Role: [NAME]`. A second name word that is itself a role
/// (`Staff: Amy Sponsor: Bob`) is put back, and the pass repeats until nothing changes.
fn redact_labeled_names(mut out: String) -> String {
    while LABELED_NAME.is_match(&out) {
        tracing::trace!(rule = "labeled_name", "redaction rule fired");
        let next = LABELED_NAME
            .replace_all(&out, |caps: &Captures<'_>| match caps.name("last") {
                Some(last) if ROLE_WORD.is_match(last.as_str()) => {
                    format!("{}: [NAME] {}", &caps["role"], last.as_str())
                }
                _ => format!("{}: [NAME]", &caps["role"]),
            })
            .into_owned();
        if next == out {
            break;
        }
        out = next;
    }
    out
}

/// Copy of `entry` with its text redacted. The text is treated as immutable from here on.
pub fn redact_entry(entry: &Entry) -> Entry {
    Entry {
        text: redact(&entry.text),
        ..entry.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacts_email_and_phone() {
        let out = redact("Reach me at jane.doe@example.com or (555) 123-4567.");
        assert_eq!(out, "Reach me at [EMAIL] or [PHONE].");

        let out = redact("Cell +1 555.987.6543 after 5pm");
        assert_eq!(out, "Cell [PHONE] after 5pm");
    }

    #[test]
    fn test_redacts_address() {
        let out = redact("Moved to 1420 Maple Grove Ave. last week");
        assert_eq!(out, "Moved to [ADDRESS] last week");
    }

    #[test]
    fn test_redacts_labeled_name_keeps_role() {
        let out = redact("Sponsor: John Smith called twice");
        assert_eq!(out, "Sponsor: [NAME] called twice");

        let out = redact("Case Manager:Maria reviewed goals");
        assert_eq!(out, "Case Manager: [NAME] reviewed goals");
    }

    #[test]
    fn test_adjacent_labels_and_prefixed_numbers_do_not_leak() {
        assert_eq!(
            redact("Staff: Amy Sponsor: Bob Lee"),
            "Staff: [NAME] Sponsor: [NAME]"
        );
        assert_eq!(redact("12 Main Ave Dr: Smith"), "[ADDRESS] Dr: [NAME]");
        assert_eq!(
            redact("ids 555-123-4567 and 15551234567"),
            "ids [PHONE] and [PHONE]"
        );
        assert_eq!(redact("call 1-555-222-3333"), "call [PHONE]");
        assert_eq!(redact("Lives at 12 Oak Street, near"), "Lives at [ADDRESS], near");
    }

    #[test]
    fn test_unmatched_text_passes_through() {
        let text = "Attended AA meeting with sponsor tonight";
        assert_eq!(redact(text), text);
        assert_eq!(redact(""), "");
    }

    #[test]
    fn test_redaction_is_idempotent() {
        let samples = [
            "Reach me at jane.doe@example.com or (555) 123-4567.",
            "Sponsor: John Smith lives at 12 Oak Street, call 555-222-3333",
            "Boss: Karen Lee emailed karen@culvers.com about the shift",
            "Paid $450 rent on 3/4, room 12",
            "Counselor: [NAME] at [ADDRESS] [PHONE] [EMAIL]",
            "Staff: Amy Sponsor: Bob Lee",
            "12 Main Ave Dr: Smith",
            "ids 555-123-4567 and 15551234567",
            "Nothing sensitive here.",
        ];
        for sample in samples {
            let once = redact(sample);
            assert_eq!(redact(&once), once, "not idempotent for {sample:?}");
        }
    }
}
