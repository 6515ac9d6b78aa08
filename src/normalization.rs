//! Canonical text form for signature comparison.
//!
//! Two signatures are considered the same when their normalized text is
//! equal, so differences in markup, whitespace, or letter case are ignored.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref TAG_REGEX: Regex = Regex::new(r"<[^>]+>").expect("valid tag regex");
    static ref ENTITY_REGEX: Regex =
        Regex::new(r"&(?:#(\d+)|#[xX]([0-9A-Fa-f]+)|([a-zA-Z][a-zA-Z0-9]*));")
            .expect("valid entity regex");
    static ref NEWLINE_RUN_REGEX: Regex = Regex::new(r"(?:\r?\n|\r)+").expect("valid newline regex");
    static ref PUNCTUATION_SPACE_REGEX: Regex =
        Regex::new(r"\s*([.,:;])\s*").expect("valid punctuation regex");
    static ref WHITESPACE_REGEX: Regex = Regex::new(r"\s+").expect("valid whitespace regex");
    static ref SUBJECT_PREFIX_REGEX: Regex =
        Regex::new(r"(?i)^\s*(?:re|fw|fwd|aw|wg|sv|tr)\s*(?:\[\d+\])?\s*:\s*")
            .expect("valid subject prefix regex");
    static ref ANGLE_ADDRESS_REGEX: Regex = Regex::new(r"<([^<>]+)>").expect("valid address regex");
}

/// Entities replaced before tags are stripped.
const FIXED_ENTITIES: &[(&str, &str)] = &[("&nbsp;", " "), ("&#160;", " "), ("&#xa0;", " ")];

pub struct Normalizer;

impl Normalizer {
    pub fn new() -> Self {
        Self
    }

    /// Convert an HTML fragment (or plain text) into its canonical comparable form.
    ///
    /// Idempotent on its own output unless the input carries escaped markup
    /// (`&lt;b&gt;`), which decodes into tag text after tags were stripped.
    pub fn normalize(&self, raw: Option<&str>) -> String {
        let Some(raw) = raw else {
            return String::new();
        };

        let mut text = raw.to_string();
        for (entity, replacement) in FIXED_ENTITIES {
            text = replace_ignore_ascii_case(&text, entity, replacement);
        }

        text = TAG_REGEX.replace_all(&text, "").to_string();
        text = decode_entities(&text);
        text = NEWLINE_RUN_REGEX.replace_all(&text, " ").to_string();
        text = PUNCTUATION_SPACE_REGEX.replace_all(&text, "$1").to_string();
        text = WHITESPACE_REGEX.replace_all(&text, " ").to_string();

        text.trim().to_lowercase()
    }

    /// Normalize an HTML fragment that is known to be present.
    pub fn normalize_html(&self, html: &str) -> String {
        self.normalize(Some(html))
    }

    /// Subject form used for thread matching; reply/forward prefixes are dropped.
    pub fn normalize_subject(&self, subject: &str) -> String {
        let mut current = subject.to_string();
        loop {
            let stripped = SUBJECT_PREFIX_REGEX.replace(&current, "").to_string();
            if stripped == current {
                break;
            }
            current = stripped;
        }
        self.normalize(Some(&current))
    }

    /// Bare lower-case address, with any display name removed.
    /// e.g. `"Mona Kane <Mona@Contoso.com>"` -> `"mona@contoso.com"`
    pub fn normalize_address(&self, address: &str) -> String {
        let address = match ANGLE_ADDRESS_REGEX.captures(address) {
            Some(caps) => caps.get(1).map_or(address, |m| m.as_str()),
            None => address,
        };
        address
            .trim()
            .trim_start_matches("mailto:")
            .trim_matches(|c: char| c == '"' || c == '\'')
            .to_lowercase()
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

fn replace_ignore_ascii_case(text: &str, needle: &str, replacement: &str) -> String {
    let lower = text.to_ascii_lowercase();
    let mut result = String::with_capacity(text.len());
    let mut last = 0;
    for (start, _) in lower.match_indices(needle) {
        result.push_str(&text[last..start]);
        result.push_str(replacement);
        last = start + needle.len();
    }
    result.push_str(&text[last..]);
    result
}

fn decode_entities(text: &str) -> String {
    ENTITY_REGEX
        .replace_all(text, |caps: &regex::Captures| {
            let whole = caps.get(0).map_or("", |m| m.as_str());
            let decoded = if let Some(decimal) = caps.get(1) {
                decimal.as_str().parse::<u32>().ok().and_then(char::from_u32)
            } else if let Some(hex) = caps.get(2) {
                u32::from_str_radix(hex.as_str(), 16)
                    .ok()
                    .and_then(char::from_u32)
            } else {
                caps.get(3).and_then(|named| named_entity(named.as_str()))
            };
            decoded.map_or_else(|| whole.to_string(), |ch| ch.to_string())
        })
        .to_string()
}

fn named_entity(name: &str) -> Option<char> {
    let ch = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        "copy" => '©',
        "reg" => '®',
        "trade" => '™',
        "ndash" => '–',
        "mdash" => '—',
        "hellip" => '…',
        "bull" => '•',
        "middot" => '·',
        "lsquo" => '‘',
        "rsquo" => '’',
        "ldquo" => '“',
        "rdquo" => '”',
        "euro" => '€',
        "pound" => '£',
        "eacute" => 'é',
        "egrave" => 'è',
        "uuml" => 'ü',
        "ouml" => 'ö',
        "auml" => 'ä',
        "szlig" => 'ß',
        _ => return None,
    };
    Some(ch)
}
