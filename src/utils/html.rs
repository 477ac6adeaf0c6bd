use html2text::from_read;

use once_cell::sync::Lazy;
use regex::Regex;

static BLANK_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Render comment markup (entities, `<p>`, `<i>`, links, `<pre><code>`) as plain
/// text wrapped to `width` columns.
pub fn decode_comment_text(html: &str, width: usize) -> String {
    let mut bytes = html.as_bytes();
    let text = from_read(&mut bytes, width.max(10)).unwrap_or_else(|_| html.to_string());
    BLANK_RUNS.replace_all(text.trim_end(), "\n\n").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_entities_and_strips_tags() {
        let out = decode_comment_text("I&#x27;d say <i>yes</i> &amp; no", 80);
        assert!(out.contains("I'd say"));
        assert!(out.contains("& no"));
        assert!(!out.contains("<i>"));
    }

    #[test]
    fn keeps_paragraph_breaks() {
        let out = decode_comment_text("first<p>second", 80);
        let first = out.find("first").unwrap();
        let second = out.find("second").unwrap();
        assert!(out[first..second].contains('\n'));
        assert!(!out.contains("\n\n\n"));
    }

    #[test]
    fn wraps_to_width() {
        let out = decode_comment_text(&"word ".repeat(40), 20);
        assert!(out.lines().all(|line| line.chars().count() <= 20));
    }
}
