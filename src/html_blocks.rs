//! Minimal element scanner for message bodies.
//!
//! Keeps one stack of open elements and applies the HTML end-tag rules that
//! matter for signature blocks: a closing tag closes every element opened
//! after its match, closing tags never reach past a table cell or table
//! they are not part of, and a new cell or row ends the previous one. Void
//! elements never open. Comments are skipped.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref TOKEN_REGEX: Regex = Regex::new(
        r#"(?s)<!--.*?-->|<(/?)([A-Za-z][A-Za-z0-9]*)((?:[^>"']|"[^"]*"|'[^']*')*)>"#
    )
    .expect("valid token regex");
    static ref ATTRIBUTE_REGEX: Regex = Regex::new(
        r#"([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#
    )
    .expect("valid attribute regex");
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Lower-case tag name
    pub name: String,
    /// Raw attribute text of the opening tag
    pub attributes: String,
    /// Byte offset of the opening `<`
    pub start: usize,
    /// Byte offset just past the closing tag, at the tag that implied the
    /// end, or end of input when unclosed
    pub end: usize,
    /// False when the element runs to the end of input
    pub closed: bool,
}

impl Element {
    pub fn outer_html<'a>(&self, html: &'a str) -> &'a str {
        &html[self.start..self.end]
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        ATTRIBUTE_REGEX
            .captures_iter(&self.attributes)
            .find(|caps| {
                caps.get(1)
                    .is_some_and(|m| m.as_str().eq_ignore_ascii_case(name))
            })
            .map(|caps| {
                caps.get(2)
                    .or_else(|| caps.get(3))
                    .or_else(|| caps.get(4))
                    .map_or(String::new(), |m| m.as_str().to_string())
            })
    }

    /// True when `other` lies strictly inside this element.
    pub fn encloses(&self, other: &Element) -> bool {
        self != other && self.start <= other.start && other.end <= self.end
    }
}

struct OpenElement {
    name: String,
    attributes: String,
    start: usize,
}

/// Elements a closing tag for `name` may not reach past.
fn scope_boundaries(name: &str) -> &'static [&'static str] {
    match name {
        "td" | "th" | "tr" | "tbody" | "thead" | "tfoot" | "caption" => &["table", "html"],
        "table" => &["html"],
        _ => &["td", "th", "table", "caption", "html"],
    }
}

/// Tags whose opening implicitly ends an open element of one of the listed names.
fn implied_by_open(name: &str) -> &'static [&'static str] {
    match name {
        "td" | "th" => &["td", "th"],
        "tr" => &["tr"],
        _ => &[],
    }
}

/// Stack position of the open element a closing tag for one of `targets`
/// would end, honoring the scope boundaries of `name`.
fn find_in_scope(stack: &[OpenElement], name: &str, targets: &[&str]) -> Option<usize> {
    let boundaries = scope_boundaries(name);
    for (index, open) in stack.iter().enumerate().rev() {
        if targets.contains(&open.name.as_str()) {
            return Some(index);
        }
        if boundaries.contains(&open.name.as_str()) {
            return None;
        }
    }
    None
}

/// Close everything from `index` up, ending the element at `index` at `end`
/// and the ones opened after it at `implied_end`.
fn close_from(
    stack: &mut Vec<OpenElement>,
    index: usize,
    implied_end: usize,
    end: usize,
    closed: &mut Vec<Element>,
) {
    while stack.len() > index {
        let Some(open) = stack.pop() else {
            break;
        };
        let implied = stack.len() > index;
        if implied {
            log::debug!("Implied end of <{}> at offset {implied_end}", open.name);
        }
        closed.push(Element {
            name: open.name,
            attributes: open.attributes,
            start: open.start,
            end: if implied { implied_end } else { end },
            closed: true,
        });
    }
}

/// All elements with one of the given tag names, in document order
/// (outer elements before the elements they contain).
pub fn find_elements(html: &str, names: &[&str]) -> Vec<Element> {
    let mut stack: Vec<OpenElement> = Vec::new();
    let mut elements = Vec::new();

    for caps in TOKEN_REGEX.captures_iter(html) {
        // Comments have no tag name group
        let (Some(whole), Some(name_match)) = (caps.get(0), caps.get(2)) else {
            continue;
        };
        let name = name_match.as_str().to_ascii_lowercase();
        let closing = caps.get(1).is_some_and(|m| !m.as_str().is_empty());
        let attributes = caps.get(3).map_or("", |m| m.as_str());

        if closing {
            // Stray closing tags are ignored
            if let Some(index) = find_in_scope(&stack, &name, &[name.as_str()]) {
                close_from(&mut stack, index, whole.start(), whole.end(), &mut elements);
            }
            continue;
        }

        let implied = implied_by_open(&name);
        if !implied.is_empty() {
            if let Some(index) = find_in_scope(&stack, &name, implied) {
                close_from(&mut stack, index, whole.start(), whole.start(), &mut elements);
            }
        }

        let self_closing = attributes.trim_end().ends_with('/');
        if self_closing || VOID_ELEMENTS.contains(&name.as_str()) {
            elements.push(Element {
                name,
                attributes: attributes.trim_end().trim_end_matches('/').to_string(),
                start: whole.start(),
                end: whole.end(),
                closed: true,
            });
        } else {
            stack.push(OpenElement {
                name,
                attributes: attributes.to_string(),
                start: whole.start(),
            });
        }
    }

    for open in stack {
        log::debug!("Unclosed <{}> at offset {}", open.name, open.start);
        elements.push(Element {
            name: open.name,
            attributes: open.attributes,
            start: open.start,
            end: html.len(),
            closed: false,
        });
    }

    elements.retain(|e| names.iter().any(|n| n.eq_ignore_ascii_case(&e.name)));
    elements.sort_by_key(|e| (e.start, std::cmp::Reverse(e.end)));
    elements
}

/// Elements from `elements` that are not enclosed by another element of the same list.
pub fn top_level(elements: &[Element]) -> Vec<&Element> {
    elements
        .iter()
        .filter(|candidate| !elements.iter().any(|outer| outer.encloses(candidate)))
        .collect()
}
