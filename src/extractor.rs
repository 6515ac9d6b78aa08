//! Signature extraction from full message bodies.
//!
//! The marker comment written in front of every signature we insert is the
//! authoritative locator. When it is missing (native host signatures, mail
//! written before the marker existed, hosts that drop comments) the body is
//! scanned for a signature container element instead.

use crate::config::Config;
use crate::html_blocks::{find_elements, top_level, Element};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

lazy_static! {
    static ref BODY_CLOSE_REGEX: Regex = Regex::new(r"(?i)</body\s*>").expect("valid body regex");
}

/// Host-rendered body layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Signature lives in a `div`/`table` tagged with a signature id or class
    #[default]
    Classic,
    /// Signature is a table identified by the owner's e-mail address
    Modern,
}

impl FromStr for Variant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "classic" => Ok(Variant::Classic),
            "modern" => Ok(Variant::Modern),
            other => Err(format!("unknown layout variant: {other}")),
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Classic => f.write_str("classic"),
            Variant::Modern => f.write_str("modern"),
        }
    }
}

/// Location of a signature inside a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureSpan {
    /// Start of the replaceable region (the marker itself when present)
    pub start: usize,
    pub end: usize,
    /// Signature HTML, trimmed
    pub html: String,
}

pub struct SignatureExtractor {
    marker: String,
    marker_regex: Regex,
    owner_token: Option<String>,
}

impl SignatureExtractor {
    pub fn new(marker_label: &str, owner_token: Option<String>) -> Result<Self, regex::Error> {
        let label = marker_label.trim();
        let marker_regex = Regex::new(&format!(
            r"(?i)<!--\s*{}\s*-->",
            regex::escape(label)
        ))?;

        Ok(Self {
            marker: format!("<!-- {label} -->"),
            marker_regex,
            owner_token: owner_token
                .map(|token| token.trim().to_lowercase())
                .filter(|token| !token.is_empty()),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, regex::Error> {
        Self::new(&config.signature.marker, config.owner_email())
    }

    /// The marker comment written in front of inserted signatures.
    pub fn marker(&self) -> &str {
        &self.marker
    }

    pub fn extract(&self, body: &str, variant: Variant) -> Option<String> {
        self.locate(body, variant).map(|span| span.html)
    }

    pub fn locate(&self, body: &str, variant: Variant) -> Option<SignatureSpan> {
        if let Some(span) = self.locate_after_marker(body) {
            log::debug!("Signature located by marker at offset {}", span.start);
            return Some(span);
        }

        let span = self.locate_container(body, variant);
        match &span {
            Some(span) => log::debug!(
                "Signature located by {variant} container at offset {}",
                span.start
            ),
            None => log::debug!("No signature found in body ({variant} layout)"),
        }
        span
    }

    /// Marker followed by the signature HTML, as inserted into a message.
    pub fn wrap(&self, signature_html: &str) -> String {
        format!(
            "{}<div id=\"Signature\">{}</div>",
            self.marker,
            signature_html.trim()
        )
    }

    /// Overwrite the current signature with `replacement`, or add it when none is present.
    pub fn replace_signature(&self, body: &str, replacement: &str, variant: Variant) -> String {
        if let Some(span) = self.locate(body, variant) {
            return format!("{}{}{}", &body[..span.start], replacement, &body[span.end..]);
        }

        match BODY_CLOSE_REGEX.find(body) {
            Some(close) => format!(
                "{}{}{}",
                &body[..close.start()],
                replacement,
                &body[close.start()..]
            ),
            None => format!("{body}{replacement}"),
        }
    }

    fn locate_after_marker(&self, body: &str) -> Option<SignatureSpan> {
        let marker = self.marker_regex.find(body)?;
        let rest = &body[marker.end()..];
        let end = BODY_CLOSE_REGEX
            .find(rest)
            .map_or(body.len(), |close| marker.end() + close.start());

        let html = body[marker.end()..end].trim();
        if html.is_empty() {
            return None;
        }

        Some(SignatureSpan {
            start: marker.start(),
            end,
            html: html.to_string(),
        })
    }

    fn locate_container(&self, body: &str, variant: Variant) -> Option<SignatureSpan> {
        let elements = find_elements(body, &["div", "table"]);

        let chosen = match variant {
            Variant::Classic => elements.iter().find(|e| is_signature_container(e)),
            Variant::Modern => {
                let token = self.owner_token.as_deref()?;
                let contains_token =
                    |e: &Element| e.outer_html(body).to_lowercase().contains(token);

                elements
                    .iter()
                    .find(|e| is_signature_container(e) && contains_token(*e))
                    .or_else(|| {
                        let tables: Vec<Element> = elements
                            .iter()
                            .filter(|e| e.name == "table" && contains_token(*e))
                            .cloned()
                            .collect();
                        let last = top_level(&tables).last().map(|e| e.start);
                        last.and_then(|start| elements.iter().find(|e| e.start == start))
                    })
            }
        }?;

        Some(SignatureSpan {
            start: chosen.start,
            end: chosen.end,
            html: chosen.outer_html(body).trim().to_string(),
        })
    }
}

fn is_signature_container(element: &Element) -> bool {
    ["id", "class"].iter().any(|attr| {
        element
            .attribute(attr)
            .is_some_and(|value| value.to_lowercase().contains("signature"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalization::Normalizer;

    fn extractor() -> SignatureExtractor {
        SignatureExtractor::new("signature", Some("Mona@Contoso.com".to_string())).unwrap()
    }

    #[test]
    fn test_marker_extraction() {
        let body = "<p>Hi</p><!-- signature --><div>Regards,<br>Mona</div>";
        let signature = extractor().extract(body, Variant::Classic).unwrap();
        assert_eq!(signature, "<div>Regards,<br>Mona</div>");
        assert_eq!(Normalizer::new().normalize_html(&signature), "regards,mona");
    }

    #[test]
    fn test_marker_stops_at_body_close() {
        let body = "<html><body><p>Hi</p><!--SIGNATURE-->\n  <div>Mona</div>\n</BODY></html>";
        let span = extractor().locate(body, Variant::Classic).unwrap();
        assert_eq!(span.html, "<div>Mona</div>");
        assert_eq!(&body[span.end..], "</BODY></html>");
    }

    #[test]
    fn test_empty_marker_falls_back() {
        let body = "<div id=\"Signature\">Mona</div><!-- signature -->   ";
        let signature = extractor().extract(body, Variant::Classic).unwrap();
        assert_eq!(signature, "<div id=\"Signature\">Mona</div>");
    }

    #[test]
    fn test_classic_container_with_nested_divs() {
        let body = concat!(
            "<div>Hello team</div>",
            "<div class=\"x_signature\"><div>Mona Kane</div><div>Director</div></div>",
            "<div>quoted</div>"
        );
        let signature = extractor().extract(body, Variant::Classic).unwrap();
        assert_eq!(
            signature,
            "<div class=\"x_signature\"><div>Mona Kane</div><div>Director</div></div>"
        );
    }

    #[test]
    fn test_modern_requires_owner_token() {
        let body = concat!(
            "<table><tr><td>Agenda</td></tr></table>",
            "<table><tr><td>Mona Kane</td></tr><tr><td>mona@contoso.com</td></tr></table>"
        );
        let signature = extractor().extract(body, Variant::Modern).unwrap();
        assert!(signature.starts_with("<table><tr><td>Mona Kane"));
        assert!(!signature.contains("Agenda"));

        let anonymous = SignatureExtractor::new("signature", None).unwrap();
        assert_eq!(anonymous.extract(body, Variant::Modern), None);
        // Classic does not look at untagged tables
        assert_eq!(extractor().extract(body, Variant::Classic), None);
    }

    #[test]
    fn test_modern_keeps_nested_layout_tables() {
        let body = concat!(
            "<p>Hi</p><table><tr><td><table><tr><td>Mona</td></tr></table></td>",
            "<td>mona@contoso.com</td></tr></table>"
        );
        let signature = extractor().extract(body, Variant::Modern).unwrap();
        assert_eq!(signature, &body["<p>Hi</p>".len()..]);
    }

    #[test]
    fn test_no_signature() {
        let body = "<html><body><p>Just text</p></body></html>";
        assert_eq!(extractor().extract(body, Variant::Classic), None);
        assert_eq!(extractor().extract(body, Variant::Modern), None);
        assert_eq!(extractor().extract("", Variant::Classic), None);
    }

    #[test]
    fn test_replace_existing_marker_signature() {
        let extractor = extractor();
        let body = "<body><p>Hi</p><!-- signature --><div>Old</div></body>";
        let replaced = extractor.replace_signature(body, &extractor.wrap("New"), Variant::Classic);
        assert_eq!(
            replaced,
            "<body><p>Hi</p><!-- signature --><div id=\"Signature\">New</div></body>"
        );
    }

    #[test]
    fn test_replace_container_signature() {
        let extractor = extractor();
        let body = "<p>Hi</p><div id=\"Signature\">Old</div><p>PS</p>";
        let replaced = extractor.replace_signature(body, "<b>New</b>", Variant::Classic);
        assert_eq!(replaced, "<p>Hi</p><b>New</b><p>PS</p>");
    }

    #[test]
    fn test_unclosed_div_in_cell_keeps_quoted_history() {
        let extractor = extractor();
        let body = r#"<div id="Signature"><table><tr><td><div>Mona</td></tr></table></div><p>PS quoted history</p>"#;

        let signature = extractor.extract(body, Variant::Classic).unwrap();
        assert_eq!(
            signature,
            r#"<div id="Signature"><table><tr><td><div>Mona</td></tr></table></div>"#
        );

        let replaced = extractor.replace_signature(body, "<b>NEW</b>", Variant::Classic);
        assert_eq!(replaced, "<b>NEW</b><p>PS quoted history</p>");
    }

    #[test]
    fn test_insert_when_missing() {
        let extractor = extractor();
        assert_eq!(
            extractor.replace_signature("<body><p>Hi</p></body>", "SIG", Variant::Classic),
            "<body><p>Hi</p>SIG</body>"
        );
        assert_eq!(
            extractor.replace_signature("<p>Hi</p>", "SIG", Variant::Classic),
            "<p>Hi</p>SIG"
        );
    }

    #[test]
    fn test_round_trip_through_wrap() {
        let extractor = extractor();
        let normalizer = Normalizer::new();
        let template = "<table><tr><td><b>Mona Kane</b></td></tr><tr><td>mona@contoso.com</td></tr></table>";
        let body = extractor.replace_signature(
            "<html><body><p>Hello</p></body></html>",
            &extractor.wrap(template),
            Variant::Modern,
        );

        let extracted = extractor.extract(&body, Variant::Modern).unwrap();
        assert_eq!(
            normalizer.normalize_html(&extracted),
            normalizer.normalize_html(template)
        );
    }

    #[test]
    fn test_variant_parsing() {
        assert_eq!("Modern".parse::<Variant>().unwrap(), Variant::Modern);
        assert!("fancy".parse::<Variant>().is_err());
        assert_eq!(Variant::Classic.to_string(), "classic");
    }
}
