//! Message body normalization: markup → plain text → inference-ready text.
//!
//! `normalize` never fails. Malformed markup is logged once and yields an
//! empty body, so one broken message never aborts the batch.

use std::panic::{self, AssertUnwindSafe};

use html2text::render::TrivialDecorator;
use tracing::warn;

use crate::error::NormalizeError;

/// Render width handed to the HTML converter. Wide enough that ordinary
/// paragraphs are not re-wrapped.
const RENDER_WIDTH: usize = 10_000;

/// Elements whose content is raw text, not markup.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

/// Convert raw message content into lower-cased, trimmed plain text.
///
/// If `is_markup`, visible text is extracted from the HTML. On a parse fault
/// the failure is logged and an empty string is returned.
pub fn normalize(raw: &str, is_markup: bool) -> String {
    let text = if is_markup {
        match html_to_text(raw) {
            Ok(text) => text,
            Err(e) => {
                warn!(fault = "parse", error = %e, "Failed to convert HTML body to text");
                String::new()
            }
        }
    } else {
        raw.to_string()
    };
    prepare(&text)
}

/// Lower-case and strip surrounding whitespace.
pub fn prepare(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Whether a provider content type denotes markup.
pub fn is_markup_content_type(content_type: &str) -> bool {
    content_type.trim().eq_ignore_ascii_case("html")
}

/// Extract visible text from an HTML document.
///
/// Rendered with the trivial decorator: no emphasis markers, heading or
/// bullet prefixes, and no link footnotes.
pub fn html_to_text(html: &str) -> Result<String, NormalizeError> {
    check_markup(html)?;

    let rendered = panic::catch_unwind(AssertUnwindSafe(|| {
        html2text::config::with_decorator(TrivialDecorator::new())
            .string_from_read(html.as_bytes(), RENDER_WIDTH)
    }))
    .map_err(|_| NormalizeError::Panicked)?
    .map_err(|e| NormalizeError::Conversion(e.to_string()))?;

    Ok(rendered
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n"))
}

/// Structural check for markup the lenient HTML parser would silently
/// swallow: a tag opened inside another tag, or input ending inside a tag
/// or comment.
fn check_markup(html: &str) -> Result<(), NormalizeError> {
    let bytes = html.as_bytes();
    let lower = html.to_ascii_lowercase();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'<' || !starts_tag(bytes.get(i + 1).copied()) {
            i += 1;
            continue;
        }

        if lower[i..].starts_with("<!--") {
            match comment_len(&lower[i + 4..]) {
                Some(len) => {
                    i += 4 + len;
                    continue;
                }
                None => {
                    return Err(NormalizeError::Malformed {
                        offset: i,
                        reason: "unterminated comment".into(),
                    });
                }
            }
        }

        let start = i;
        let end = scan_tag(bytes, start)?;
        let name = tag_name(&lower[start + 1..end]);
        i = end + 1;

        if let Some(raw) = RAW_TEXT_ELEMENTS.iter().find(|el| **el == name) {
            let close = format!("</{raw}");
            match lower[i..].find(&close) {
                Some(offset) => i += offset,
                None => {
                    return Err(NormalizeError::Malformed {
                        offset: start,
                        reason: format!("unterminated <{raw}> element"),
                    });
                }
            }
        }
    }

    Ok(())
}

/// Bytes from just after `<!--` through the closing `-->`. `<!-->` and
/// `<!--->` are complete empty comments.
fn comment_len(rest: &str) -> Option<usize> {
    if rest.starts_with('>') {
        Some(1)
    } else if rest.starts_with("->") {
        Some(2)
    } else {
        rest.find("-->").map(|end| end + 3)
    }
}

/// Whether the byte after `<` opens a tag (as opposed to a literal `<`).
fn starts_tag(next: Option<u8>) -> bool {
    matches!(next, Some(b) if b.is_ascii_alphabetic() || b == b'/' || b == b'!' || b == b'?')
}

/// Find the `>` closing the tag opened at `start`, honouring quoted
/// attribute values.
fn scan_tag(bytes: &[u8], start: usize) -> Result<usize, NormalizeError> {
    let mut quote: Option<u8> = None;
    let mut j = start + 1;

    while j < bytes.len() {
        let b = bytes[j];
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'>' => return Ok(j),
                b'<' => {
                    return Err(NormalizeError::Malformed {
                        offset: j,
                        reason: "'<' inside an open tag".into(),
                    });
                }
                _ => {}
            },
        }
        j += 1;
    }

    Err(NormalizeError::Malformed {
        offset: start,
        reason: "input ends inside a tag".into(),
    })
}

fn tag_name(tag_body: &str) -> &str {
    let end = tag_body
        .find(|c: char| c.is_ascii_whitespace() || c == '/' || c == '>')
        .unwrap_or(tag_body.len());
    &tag_body[..end]
}
