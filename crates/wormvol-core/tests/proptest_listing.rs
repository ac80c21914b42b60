//! Property-based tests for listing parsing.
//!
//! Renders generated records the way `bconsole` prints them (padded keys,
//! mixed key casing, banner noise, blank-line separators) and checks that
//! parsing recovers exactly the generated attributes.

use proptest::prelude::*;

use wormvol_core::error::ParseError;
use wormvol_core::listing::{RawRecord, parse_listing};

// =============================================================================
// Strategies
// =============================================================================

const KEYS: [&str; 6] = [
    "VolumeName",
    "VolStatus",
    "LastWritten",
    "VolRetention",
    "VolBytes",
    "MediaType",
];

fn arb_value() -> impl Strategy<Value = String> {
    prop_oneof![
        "[A-Za-z0-9_-]{1,16}",
        "[0-9]{1,3}(,[0-9]{3}){0,3}",
        Just("0000-00-00 00:00:00".to_string()),
        Just("2024-01-01 12:34:56".to_string()),
    ]
}

/// One record as (media id, [(key, value)]).
fn arb_record() -> impl Strategy<Value = (u32, Vec<(String, String)>)> {
    (
        1u32..100_000,
        proptest::collection::vec(arb_value(), KEYS.len()),
        proptest::collection::vec(any::<bool>(), KEYS.len()),
    )
        .prop_map(|(id, values, lowercase)| {
            let attrs = KEYS
                .iter()
                .zip(values)
                .zip(lowercase)
                .map(|((key, value), lower)| {
                    let key = if lower {
                        key.to_ascii_lowercase()
                    } else {
                        (*key).to_string()
                    };
                    (key, value)
                })
                .collect();
            (id, attrs)
        })
}

fn render(records: &[(u32, Vec<(String, String)>)], crlf: bool) -> String {
    let nl = if crlf { "\r\n" } else { "\n" };
    let mut out = format!(
        "Connecting to Director backup01:9101{nl}1000 OK: backup01-dir{nl}Automatically selected Catalog: MyCatalog{nl}"
    );
    for (id, attrs) in records {
        out.push_str(&format!("{:>17}: {id}{nl}", "MediaId"));
        for (key, value) in attrs {
            out.push_str(&format!("{key:>17}: {value}{nl}"));
        }
        out.push_str(nl);
    }
    out
}

fn expected(records: &[(u32, Vec<(String, String)>)]) -> Vec<RawRecord> {
    records
        .iter()
        .map(|(id, attrs)| {
            let mut record = RawRecord::new();
            record.insert("mediaid".to_string(), id.to_string());
            for (key, value) in attrs {
                record.insert(key.to_ascii_lowercase(), value.clone());
            }
            record
        })
        .collect()
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn rendered_listing_parses_back(
        records in proptest::collection::vec(arb_record(), 0..8),
        crlf in any::<bool>(),
    ) {
        let parsed = parse_listing(&render(&records, crlf)).unwrap();
        prop_assert_eq!(parsed, expected(&records));
    }

    #[test]
    fn missing_blank_separators_still_split_on_media_id(
        records in proptest::collection::vec(arb_record(), 1..6),
    ) {
        let text = render(&records, false).replace("\n\n", "\n");
        let parsed = parse_listing(&text).unwrap();
        prop_assert_eq!(parsed, expected(&records));
    }

    #[test]
    fn error_marker_anywhere_rejects_everything(
        records in proptest::collection::vec(arb_record(), 0..5),
        at in any::<prop::sample::Index>(),
        reason in "[A-Za-z ]{1,30}",
    ) {
        let text = render(&records, false);
        let err_line = format!("Pool: ERR={reason}");
        let mut lines: Vec<&str> = text.lines().collect();
        let pos = at.index(lines.len() + 1);
        lines.insert(pos, err_line.as_str());

        let result = parse_listing(&lines.join("\n"));
        let is_command_error = matches!(result, Err(ParseError::CommandError { .. }));
        prop_assert!(is_command_error);
    }

    #[test]
    fn parsing_never_panics(text in "\\PC{0,200}") {
        let _ = parse_listing(&text);
    }
}

#[test]
fn line_without_separator_inside_record_is_malformed() {
    let text = "MediaId: 1\nVolumeName: Full-0001\ngarbage line\n";
    assert!(matches!(
        parse_listing(text),
        Err(ParseError::MalformedLine { .. })
    ));
}
