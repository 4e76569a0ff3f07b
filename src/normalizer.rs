use regex::Regex;
use std::sync::OnceLock;

/// Matches bracketed numeric references such as `[12]`.
fn citation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[[0-9]+\]").unwrap())
}

/// Clean a raw extracted string: strip citation markers, collapse
/// whitespace runs into single spaces, trim.
pub fn normalize(raw: &str) -> String {
    normalize_with(raw, false)
}

/// Same as [`normalize`], but with `preserve_whitespace` set the internal
/// whitespace is left untouched. Used for values such as URLs where joining
/// tokens would corrupt the text.
pub fn normalize_with(raw: &str, preserve_whitespace: bool) -> String {
    let stripped = strip_citations(raw);
    if preserve_whitespace {
        stripped.trim().to_string()
    } else {
        collapse_whitespace(&stripped)
    }
}

/// Removes citation markers until none remain, so `[[1]2]` leaves nothing behind.
pub fn strip_citations(raw: &str) -> String {
    let re = citation_re();
    let mut text = raw.to_string();
    while re.is_match(&text) {
        text = re.replace_all(&text, "").into_owned();
    }
    text
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLES: &[&str] = &[
        "",
        "   ",
        "plain",
        "  Robotics is ...[1]  ",
        "Engineering [2]  [5]",
        "nested [[1]2] marker",
        "[3]leading and trailing[4]",
        "line one\n\n\tline two",
        "not a citation [a] or [ 1 ] or []",
        "\u{a0}non-breaking\u{a0}space\u{a0}",
        "[1][2][3]",
    ];

    #[test]
    fn test_strips_citations_and_collapses() {
        assert_eq!(normalize("Robotics is ...[1]"), "Robotics is ...");
        assert_eq!(normalize("Engineering [2]  [5]"), "Engineering");
        assert_eq!(normalize("line one\n\n\tline two"), "line one line two");
        assert_eq!(normalize("[1][2][3]"), "");
    }

    #[test]
    fn test_non_numeric_brackets_are_kept() {
        assert_eq!(
            normalize("not a citation [a] or [ 1 ] or []"),
            "not a citation [a] or [ 1 ] or []"
        );
    }

    #[test]
    fn test_nested_marker_is_fully_removed() {
        assert_eq!(normalize("nested [[1]2] marker"), "nested marker");
    }

    #[test]
    fn test_preserve_whitespace() {
        assert_eq!(normalize_with("  http://x.com  [3]", true), "http://x.com");
        assert_eq!(
            normalize_with(" http://a.org  http://b.org [1] ", true),
            "http://a.org  http://b.org"
        );
    }

    #[test]
    fn test_output_is_trimmed_and_citation_free() {
        for sample in SAMPLES {
            for preserve in [false, true] {
                let out = normalize_with(sample, preserve);
                assert_eq!(out, out.trim(), "untrimmed output for {sample:?}");
                assert!(!citation_re().is_match(&out), "citation left in {out:?}");
            }
        }
    }

    #[test]
    fn test_idempotent() {
        for sample in SAMPLES {
            let once = normalize(sample);
            assert_eq!(normalize(&once), once);

            let once = normalize_with(sample, true);
            assert_eq!(normalize_with(&once, true), once);
        }
    }
}
