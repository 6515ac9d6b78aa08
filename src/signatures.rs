use crate::error::SignatureError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The fixed set of corporate signatures users can pick from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignatureKey {
    Corporate,
    CorporateShort,
    Executive,
    Marketing,
    Support,
}

impl SignatureKey {
    pub const ALL: [SignatureKey; 5] = [
        SignatureKey::Corporate,
        SignatureKey::CorporateShort,
        SignatureKey::Executive,
        SignatureKey::Marketing,
        SignatureKey::Support,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureKey::Corporate => "corporate",
            SignatureKey::CorporateShort => "corporate-short",
            SignatureKey::Executive => "executive",
            SignatureKey::Marketing => "marketing",
            SignatureKey::Support => "support",
        }
    }
}

impl fmt::Display for SignatureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignatureKey {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        SignatureKey::ALL
            .into_iter()
            .find(|key| key.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| SignatureError::UnknownSignature(s.to_string()))
    }
}

/// Signature decision recorded for a thread. Stored as the key string or `none`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum AppliedSignature {
    None,
    Key(SignatureKey),
}

impl AppliedSignature {
    pub fn key(&self) -> Option<SignatureKey> {
        match self {
            AppliedSignature::None => None,
            AppliedSignature::Key(key) => Some(*key),
        }
    }
}

impl From<AppliedSignature> for String {
    fn from(value: AppliedSignature) -> Self {
        match value {
            AppliedSignature::None => "none".to_string(),
            AppliedSignature::Key(key) => key.as_str().to_string(),
        }
    }
}

impl TryFrom<String> for AppliedSignature {
    type Error = SignatureError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.eq_ignore_ascii_case("none") {
            Ok(AppliedSignature::None)
        } else {
            value.parse().map(AppliedSignature::Key)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureTemplate {
    pub key: SignatureKey,
    pub html: String,
}

/// Sender details substituted into template placeholders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProfile {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub title: String,
}

impl SignatureTemplate {
    /// Replace `{First name}`, `{Last name}`, `{E-mail}` and `{Title}` with profile values.
    pub fn render(&self, profile: &UserProfile) -> String {
        self.html
            .replace("{First name}", &profile.first_name)
            .replace("{Last name}", &profile.last_name)
            .replace("{E-mail}", &profile.email)
            .replace("{Title}", &profile.title)
    }
}
