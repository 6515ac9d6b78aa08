use crate::extractor::Variant;
use crate::signatures::UserProfile;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Location of the persistent key/value store (defaults to the user data dir)
    pub store_path: Option<String>,
    pub template_service: TemplateServiceConfig,
    pub signature: SignatureConfig,
    pub compose: ComposeConfig,
    /// Used when the host does not provide a user profile
    pub profile: UserProfile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateServiceConfig {
    pub base_url: String,
    pub list_path: String,
    pub timeout_seconds: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignatureConfig {
    /// Text of the marker comment, `<!-- {marker} -->`
    pub marker: String,
    pub variant: Variant,
    /// Address that identifies our signature in modern layouts
    pub owner_email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposeConfig {
    pub poll_interval_ms: u64,
    pub max_attempts: u32,
}

impl Default for TemplateServiceConfig {
    fn default() -> Self {
        TemplateServiceConfig {
            base_url: "https://signatures.example.com".to_string(),
            list_path: "/api/signatures".to_string(),
            timeout_seconds: 10,
            user_agent: format!("signature-guard/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for SignatureConfig {
    fn default() -> Self {
        SignatureConfig {
            marker: "signature".to_string(),
            variant: Variant::Classic,
            owner_email: None,
        }
    }
}

impl Default for ComposeConfig {
    fn default() -> Self {
        ComposeConfig {
            poll_interval_ms: 250,
            max_attempts: 20,
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn store_path(&self) -> PathBuf {
        match &self.store_path {
            Some(path) => PathBuf::from(shellexpand_home(path)),
            None => dirs::data_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("signature-guard")
                .join("store.json"),
        }
    }

    /// Owner token for modern layouts, falling back to the profile address.
    pub fn owner_email(&self) -> Option<String> {
        self.signature
            .owner_email
            .clone()
            .or_else(|| Some(self.profile.email.clone()))
            .filter(|email| !email.trim().is_empty())
    }
}

fn shellexpand_home(path: &str) -> String {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest).to_string_lossy().to_string(),
        _ => path.to_string(),
    }
}
