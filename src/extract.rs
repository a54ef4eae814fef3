//! Plain-text extraction for the supported document formats.
//!
//! The loader hands raw file content plus a [`DocFormat`] to this module and
//! gets back normalized UTF-8 text. Normalization removes only the syntax
//! that would otherwise pollute tokenization (HTML tags, script and style
//! bodies, comments, markdown link targets, code fences) and collapses
//! whitespace. Paragraph breaks survive as single blank lines so excerpts
//! stay readable.

use std::path::Path;

use crate::models::DocFormat;

/// Tags that start a new line of text when stripped.
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "br", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6", "tr", "td", "th",
    "table", "section", "article", "header", "footer", "nav", "pre", "blockquote", "hr", "title",
];

/// Normalize raw file content into plain text for indexing and excerpts.
pub fn normalize(raw: &str, format: DocFormat) -> String {
    match format {
        DocFormat::Markdown => collapse_whitespace(&strip_markdown(raw)),
        DocFormat::Html => collapse_whitespace(&strip_html(raw)),
        DocFormat::Plain => collapse_whitespace(raw),
    }
}

/// Pick a display title: the first `# ` heading for markdown, `<title>`
/// for HTML, and the file name otherwise.
pub fn extract_title(raw: &str, format: DocFormat, path: &Path) -> String {
    let from_content = match format {
        DocFormat::Markdown => raw.lines().find_map(|line| {
            let heading = line.strip_prefix('#')?;
            if !heading.starts_with(char::is_whitespace) {
                return None;
            }
            let heading = heading.trim();
            (!heading.is_empty()).then(|| heading.to_string())
        }),
        DocFormat::Html => html_title(raw),
        DocFormat::Plain => None,
    };

    from_content.unwrap_or_else(|| {
        path.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    })
}

fn html_title(raw: &str) -> Option<String> {
    let lower = raw.to_ascii_lowercase();
    let open = lower.find("<title")?;
    let start = open + lower[open..].find('>')? + 1;
    let end = start + lower[start..].find("</title")?;
    let title = collapse_whitespace(&decode_entities(&raw[start..end]));
    (!title.is_empty()).then_some(title)
}

fn strip_markdown(raw: &str) -> String {
    let without_comments = strip_comments(raw);
    let mut out = String::with_capacity(without_comments.len());
    for line in without_comments.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            out.push('\n');
            continue;
        }
        out.push_str(&strip_link_targets(line));
        out.push('\n');
    }
    out
}

/// `[text](target)` and `![alt](target)` keep only the bracketed text.
fn strip_link_targets(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    while let Some(i) = rest.find("](") {
        out.push_str(&rest[..=i]);
        let after = &rest[i + 2..];
        match after.find(')') {
            Some(j) => rest = &after[j + 1..],
            None => {
                out.push('(');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn strip_comments(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find("<!--") {
        out.push_str(&rest[..start]);
        rest = match rest[start..].find("-->") {
            Some(end) => &rest[start + end + 3..],
            None => "",
        };
    }
    out.push_str(rest);
    out
}

fn strip_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(lt) = rest.find('<') {
        out.push_str(&decode_entities(&rest[..lt]));
        let after = &rest[lt..];

        if after.starts_with("<!--") {
            rest = match after.find("-->") {
                Some(end) => &after[end + 3..],
                None => "",
            };
            continue;
        }

        let Some(gt) = after.find('>') else {
            out.push_str(&decode_entities(after));
            rest = "";
            break;
        };

        let tag = &after[1..gt];
        let closing = tag.starts_with('/');
        let name = tag_name(tag);
        rest = &after[gt + 1..];

        if !closing && (name == "script" || name == "style") {
            let close = format!("</{}", name);
            rest = match rest.to_ascii_lowercase().find(&close) {
                Some(i) => match rest[i..].find('>') {
                    Some(g) => &rest[i + g + 1..],
                    None => "",
                },
                None => "",
            };
            continue;
        }

        if BLOCK_TAGS.contains(&name.as_str()) {
            out.push('\n');
        } else {
            out.push(' ');
        }
    }

    out.push_str(&decode_entities(rest));
    out
}

fn tag_name(tag: &str) -> String {
    tag.trim_start_matches(['/', '!'])
        .split(|c: char| c.is_whitespace() || c == '/')
        .next()
        .unwrap_or("")
        .to_ascii_lowercase()
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp..];
        let decoded = after
            .find(';')
            .filter(|&semi| semi <= 10)
            .and_then(|semi| decode_entity(&after[1..semi]).map(|c| (c, semi)));
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &after[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &after[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => {
            let num = name.strip_prefix('#')?;
            let code = match num.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

/// Collapse runs of spaces and tabs, trim lines, and keep at most one
/// blank line between paragraphs.
pub fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_blank = false;

    for line in text.lines() {
        let mut words = line.split_whitespace();
        let Some(first) = words.next() else {
            pending_blank = !out.is_empty();
            continue;
        };
        if !out.is_empty() {
            out.push('\n');
            if pending_blank {
                out.push('\n');
            }
        }
        pending_blank = false;
        out.push_str(first);
        for word in words {
            out.push(' ');
            out.push_str(word);
        }
    }

    out
}
