//! Email body cleanup
//!
//! Turns raw message bodies into clean plain text: HTML stripping,
//! entity decoding, signature removal, whitespace collapsing, and
//! bounded truncation.

use recall_common::{MAX_DOCUMENT_CHARS, TRUNCATION_MARKER};

/// Clean a raw body (plain text or HTML) into document content.
///
/// Returns an empty string when nothing useful survives; callers drop
/// such records instead of persisting them.
pub fn clean_body(body: &str, is_html: bool) -> String {
    let text = if is_html { strip_html(body) } else { body.to_string() };
    let text = strip_signature(&text);
    let text = collapse_whitespace(&text);
    truncate_content(&text)
}

/// Strip HTML down to its text content.
///
/// Script and style subtrees are removed entirely, remaining tags are
/// dropped, and the common entities are decoded. Block-level tags become
/// line breaks so line-anchored cleanup (the signature cut) still sees
/// the original line structure; inline tags become word boundaries.
pub fn strip_html(html: &str) -> String {
    let without_blocks = remove_element_content(html, "script");
    let without_blocks = remove_element_content(&without_blocks, "style");

    let mut text = String::with_capacity(without_blocks.len());
    let mut tag = String::new();
    let mut in_tag = false;

    for c in without_blocks.chars() {
        match c {
            '<' => {
                in_tag = true;
                tag.clear();
            }
            '>' if in_tag => {
                in_tag = false;
                if is_block_tag(&tag) {
                    text.push('\n');
                } else {
                    text.push(' ');
                }
            }
            _ if in_tag => tag.push(c),
            _ => text.push(c),
        }
    }

    decode_entities(&text)
}

/// Tags that break line structure in rendered mail
fn is_block_tag(raw: &str) -> bool {
    let name: String = raw
        .trim_start_matches('/')
        .chars()
        .take_while(|c| !c.is_whitespace() && *c != '/')
        .collect::<String>()
        .to_lowercase();

    matches!(
        name.as_str(),
        "br" | "p"
            | "div"
            | "li"
            | "ul"
            | "ol"
            | "tr"
            | "table"
            | "blockquote"
            | "hr"
            | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
    )
}

/// Remove `<tag ...>...</tag>` blocks including their content,
/// case-insensitively
fn remove_element_content(html: &str, tag: &str) -> String {
    let lower = html.to_lowercase();
    let open = format!("<{}", tag);
    let close = format!("</{}>", tag);

    let mut result = String::with_capacity(html.len());
    let mut pos = 0;

    while let Some(start) = lower[pos..].find(&open) {
        let start = pos + start;
        result.push_str(&html[pos..start]);

        match lower[start..].find(&close) {
            Some(end) => pos = start + end + close.len(),
            None => {
                // Unclosed block swallows the rest
                return result;
            }
        }
    }

    result.push_str(&html[pos..]);
    result
}

/// Decode the entities that show up in practice in email HTML
fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Drop the sender signature block after the conventional `-- ` marker.
///
/// HTML-derived text can leave trailing spaces on the delimiter line, so
/// the match tolerates them; a delimiter inside a longer line never
/// matches.
pub fn strip_signature(text: &str) -> String {
    for (index, line) in text.lines().enumerate() {
        if line.trim_end() == "--" {
            return text
                .lines()
                .take(index)
                .collect::<Vec<_>>()
                .join("\n");
        }
    }
    text.to_string()
}

/// Collapse runs of whitespace into single spaces
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Bound content length, marking the cut
pub fn truncate_content(text: &str) -> String {
    if text.chars().count() <= MAX_DOCUMENT_CHARS {
        return text.to_string();
    }

    let keep = MAX_DOCUMENT_CHARS - TRUNCATION_MARKER.chars().count();
    let mut truncated: String = text.chars().take(keep).collect();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_html_drops_tags() {
        let html = "<p>Hello <b>world</b></p>";
        assert_eq!(collapse_whitespace(&strip_html(html)), "Hello world");
    }

    #[test]
    fn test_strip_html_removes_script_and_style() {
        let html = r#"<style>.x { color: red; }</style><p>Body</p><script>alert("hi")</script>"#;
        let text = collapse_whitespace(&strip_html(html));
        assert_eq!(text, "Body");
    }

    #[test]
    fn test_strip_html_decodes_entities() {
        let html = "Tom &amp; Jerry &lt;3 &quot;cartoons&quot;&nbsp;&#39;forever&#39;";
        let text = collapse_whitespace(&strip_html(html));
        assert_eq!(text, r#"Tom & Jerry <3 "cartoons" 'forever'"#);
    }

    #[test]
    fn test_strip_html_handles_unclosed_script() {
        let html = "<p>Keep this</p><script>var x = 1;";
        let text = collapse_whitespace(&strip_html(html));
        assert_eq!(text, "Keep this");
    }

    #[test]
    fn test_signature_block_removed() {
        let body = "Thanks for the update.\n\nSee you Monday.\n-- \nRavi Kumar\nEngineering";
        let cleaned = strip_signature(body);
        assert!(cleaned.contains("See you Monday."));
        assert!(!cleaned.contains("Ravi Kumar"));
    }

    #[test]
    fn test_no_signature_marker_keeps_everything() {
        let body = "Line one\nLine two";
        assert_eq!(strip_signature(body), body);
    }

    #[test]
    fn test_double_dash_inside_text_is_not_a_marker() {
        let body = "The range is 5 -- 10 units.\nMore text.";
        assert_eq!(strip_signature(body), body);
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("a\n\n  b\t\tc "), "a b c");
    }

    #[test]
    fn test_truncation_bounded_with_marker() {
        let long = "x".repeat(MAX_DOCUMENT_CHARS + 500);
        let truncated = truncate_content(&long);
        assert_eq!(truncated.chars().count(), MAX_DOCUMENT_CHARS);
        assert!(truncated.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn test_short_content_untouched() {
        assert_eq!(truncate_content("short"), "short");
    }

    #[test]
    fn test_clean_body_end_to_end() {
        let html = "<div>Quarterly <b>budget</b> attached.</div><br/>-- <br/>Best, A";
        let cleaned = clean_body(html, true);
        assert_eq!(cleaned, "Quarterly budget attached.");

        let plain = "Quarterly budget attached.\n-- \nBest, A";
        let cleaned = clean_body(plain, false);
        assert_eq!(cleaned, "Quarterly budget attached.");
    }

    #[test]
    fn test_empty_after_cleanup() {
        let html = "<style>p { }</style><script>x()</script>";
        assert!(clean_body(html, true).is_empty());
    }
}
