//! Tolerant extraction of tagged spans from LLM responses
//!
//! The extraction and summarize prompts ask for lightweight XML-ish markup.
//! Models drift, so parsing scans for tag pairs instead of expecting a
//! well-formed document; anything unmatched is simply ignored.

/// All trimmed spans between `<tag>` and `</tag>`, in order
pub(crate) fn extract_all<'a>(text: &'a str, tag: &str) -> Vec<&'a str> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);

    let mut spans = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find(&open) {
        let after = &rest[start + open.len()..];
        let Some(end) = after.find(&close) else {
            break;
        };
        spans.push(after[..end].trim());
        rest = &after[end + close.len()..];
    }
    spans
}

/// First span for `tag`, if any
pub(crate) fn extract<'a>(text: &'a str, tag: &str) -> Option<&'a str> {
    extract_all(text, tag).into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_all_in_order() {
        let text = "<keywords><keyword>a</keyword>\n<keyword> b </keyword></keywords>";
        assert_eq!(extract_all(text, "keyword"), vec!["a", "b"]);
    }

    #[test]
    fn test_extract_first() {
        let text = "<name>Snail Alley</name><name>Other</name>";
        assert_eq!(extract(text, "name"), Some("Snail Alley"));
    }

    #[test]
    fn test_unclosed_tag_ignored() {
        let text = "<keyword>a</keyword><keyword>dangling";
        assert_eq!(extract_all(text, "keyword"), vec!["a"]);
    }

    #[test]
    fn test_missing_tag() {
        assert!(extract("no markup here", "keyword").is_none());
    }
}
