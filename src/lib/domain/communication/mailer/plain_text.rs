//! Plain text derived from HTML bodies

use lazy_static::lazy_static;
use regex::{Captures, Regex};

lazy_static! {
    static ref HIDDEN_BLOCKS: Regex =
        Regex::new(r"(?is)<(script|style|head)\b[^>]*>.*?</(script|style|head)\s*>").unwrap();
    static ref COMMENTS: Regex = Regex::new(r"(?s)<!--.*?-->").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    static ref LINE_BREAKS: Regex = Regex::new(
        r"(?i)<br\s*/?>|</(p|div|h[1-6]|li|tr|table|ul|ol|dl|dt|dd|blockquote|pre|section|article|header|footer)\s*>"
    )
    .unwrap();
    static ref IMAGES: Regex =
        Regex::new(r#"(?i)<img\b[^>]*?\balt\s*=\s*(?:"([^"]*)"|'([^']*)')[^>]*>"#).unwrap();
    static ref TAGS: Regex = Regex::new(r"<[^>]*>").unwrap();
    static ref NUMERIC_ENTITIES: Regex = Regex::new(r"&#(x[0-9a-fA-F]+|[0-9]+);").unwrap();
    static ref SPACES: Regex = Regex::new(r"[ \t]+").unwrap();
}

/// Renders an HTML body as whitespace-normalized plain text.
///
/// Block ends and `<br>` become line breaks, images become their alt text, other tags are
/// dropped, common entities are decoded, runs of spaces collapse to one and at most one blank line separates blocks.
pub fn plain_text_from_html(html: &str) -> String {
    let text = HIDDEN_BLOCKS.replace_all(html, "");
    let text = COMMENTS.replace_all(&text, "");
    let text = WHITESPACE.replace_all(&text, " ");
    let text = IMAGES.replace_all(&text, |caps: &Captures<'_>| {
        let alt = caps.get(1).or_else(|| caps.get(2)).map_or("", |alt| alt.as_str());

        format!(" {alt} ")
    });
    let text = LINE_BREAKS.replace_all(&text, "\n");
    let text = TAGS.replace_all(&text, "");
    let text = decode_entities(&text);

    let mut lines: Vec<String> = Vec::new();

    for line in text.lines() {
        let line = SPACES.replace_all(line.trim(), " ").into_owned();

        if line.is_empty() && lines.last().map_or(true, String::is_empty) {
            continue;
        }

        lines.push(line);
    }

    while lines.last().is_some_and(String::is_empty) {
        lines.pop();
    }

    lines.join("\n")
}

fn decode_entities(text: &str) -> String {
    let text = NUMERIC_ENTITIES.replace_all(text, |caps: &Captures<'_>| {
        let raw = &caps[1];

        let code = match raw.strip_prefix('x') {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => raw.parse().ok(),
        };

        code.and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_else(|| caps[0].to_string())
    });

    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_elements_become_lines() {
        let html = "<div><h1>Welcome</h1><p>Thanks for\n   signing up.</p><p>Cheers</p></div>";

        assert_eq!(plain_text_from_html(html), "Welcome\nThanks for signing up.\nCheers");
    }

    #[test]
    fn test_line_breaks_and_blank_lines() {
        let html = "one<br>two<br/><br /><br>three";

        assert_eq!(plain_text_from_html(html), "one\ntwo\n\nthree");
    }

    #[test]
    fn test_hidden_blocks_and_comments_are_dropped() {
        let html = "<html><head><title>t</title><style>p { color: red; }</style></head>\
                    <body><!-- note --><script>alert(1)</script><p>Visible</p></body></html>";

        assert_eq!(plain_text_from_html(html), "Visible");
    }

    #[test]
    fn test_entities_are_decoded() {
        let html = "<p>Fish &amp; chips &lt;3&nbsp;&#8364;5 &#x41; &quot;ok&quot; &amp;lt;</p>";

        assert_eq!(plain_text_from_html(html), "Fish & chips <3 €5 A \"ok\" &lt;");
    }

    #[test]
    fn test_links_keep_their_text() {
        let html = r#"<p>Visit <a href="https://example.com/confirm">this link</a> to confirm.</p>"#;

        assert_eq!(plain_text_from_html(html), "Visit this link to confirm.");
    }

    #[test]
    fn test_images_render_as_alt_text() {
        let html = r#"<p><img src="cid:logo" alt="Acme logo"></p><p><IMG ALT='Banner' src="b.png"/></p>"#;

        assert_eq!(plain_text_from_html(html), "Acme logo\nBanner");
    }

    #[test]
    fn test_image_without_alt_renders_nothing() {
        assert_eq!(plain_text_from_html(r#"<img src="cid:logo">"#), "");
    }
}
