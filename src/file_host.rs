//! Host adapter over a JSON message file, for running sessions from the
//! command line.
//!
//! ```json
//! {
//!   "body": "<html><body><p>Hi</p></body></html>",
//!   "recipients": ["alex@contoso.com"],
//!   "subject": "RE: Budget",
//!   "threadId": "AAQkADAw",
//!   "kind": "reply"
//! }
//! ```

use crate::config::Config;
use crate::error::{HostError, Result};
use crate::extractor::{SignatureExtractor, Variant};
use crate::host::{
    BodyFormat, ComposeKind, MessageBody, MessageDetails, NoticeLevel, Notifier, SignatureWriter,
};
use crate::normalization::Normalizer;
use crate::signatures::UserProfile;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageFile {
    pub body: String,
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub kind: ComposeKind,
}

pub struct FileHost {
    path: PathBuf,
    message: Mutex<MessageFile>,
    extractor: SignatureExtractor,
    variant: Variant,
    profile: Option<UserProfile>,
}

impl FileHost {
    pub fn open(path: impl AsRef<Path>, config: &Config) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&path)?;
        let message: MessageFile = serde_json::from_str(&content)?;

        let profile = Some(config.profile.clone()).filter(|p| !p.email.trim().is_empty());

        Ok(Self {
            path,
            message: Mutex::new(message),
            extractor: SignatureExtractor::from_config(config)?,
            variant: config.signature.variant,
            profile,
        })
    }

    pub fn message(&self) -> Result<MessageFile> {
        Ok(self.lock("read message")?.clone())
    }

    fn lock(&self, operation: &str) -> std::result::Result<std::sync::MutexGuard<'_, MessageFile>, HostError> {
        self.message
            .lock()
            .map_err(|_| HostError::new(operation, "message state poisoned"))
    }

    fn save(&self, message: &MessageFile) -> std::result::Result<(), HostError> {
        let json = serde_json::to_string_pretty(message)
            .map_err(|e| HostError::new("save message", e.to_string()))?;
        std::fs::write(&self.path, json)
            .map_err(|e| HostError::new("save message", e.to_string()))
    }
}

impl MessageBody for FileHost {
    async fn get_body(&self, format: BodyFormat) -> std::result::Result<String, HostError> {
        let body = self.lock("get body")?.body.clone();
        Ok(match format {
            BodyFormat::Html => body,
            BodyFormat::Text => Normalizer::new().normalize_html(&body),
        })
    }
}

impl SignatureWriter for FileHost {
    async fn set_signature(&self, html: &str, _format: BodyFormat) -> std::result::Result<(), HostError> {
        let mut message = self.lock("set signature")?;
        message.body = self
            .extractor
            .replace_signature(&message.body, html, self.variant);
        self.save(&message)?;
        log::debug!("Wrote signature to {}", self.path.display());
        Ok(())
    }
}

impl MessageDetails for FileHost {
    async fn recipients(&self) -> std::result::Result<Vec<String>, HostError> {
        Ok(self.lock("get recipients")?.recipients.clone())
    }

    async fn subject(&self) -> std::result::Result<String, HostError> {
        Ok(self.lock("get subject")?.subject.clone())
    }

    fn thread_id(&self) -> Option<String> {
        self.lock("get thread id").ok()?.thread_id.clone()
    }

    fn compose_kind(&self) -> ComposeKind {
        self.lock("get compose kind")
            .map(|message| message.kind)
            .unwrap_or_default()
    }

    async fn is_ready(&self) -> bool {
        self.path.exists()
    }

    fn user_profile(&self) -> Option<UserProfile> {
        self.profile.clone()
    }
}

impl Notifier for FileHost {
    fn notify(&self, level: NoticeLevel, message: &str) {
        match level {
            NoticeLevel::Informational => println!("ℹ️  {message}"),
            NoticeLevel::Error => eprintln!("❌ {message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_message(dir: &Path, message: &MessageFile) -> PathBuf {
        let path = dir.join("message.json");
        std::fs::write(&path, serde_json::to_string(message).unwrap()).unwrap();
        path
    }

    #[tokio::test]
    async fn test_reads_message_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("message.json");
        std::fs::write(
            &path,
            r#"{"body": "<p>Hi</p>", "recipients": ["a@b.com"], "subject": "RE: x", "threadId": "t1", "kind": "reply"}"#,
        )
        .unwrap();

        let host = FileHost::open(&path, &Config::default()).unwrap();
        assert_eq!(host.get_body(BodyFormat::Html).await.unwrap(), "<p>Hi</p>");
        assert_eq!(host.get_body(BodyFormat::Text).await.unwrap(), "hi");
        assert_eq!(host.recipients().await.unwrap(), vec!["a@b.com".to_string()]);
        assert_eq!(host.thread_id().as_deref(), Some("t1"));
        assert_eq!(host.compose_kind(), ComposeKind::Reply);
        assert!(host.is_ready().await);
        assert!(host.user_profile().is_none());
    }

    #[tokio::test]
    async fn test_set_signature_rewrites_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_message(
            dir.path(),
            &MessageFile {
                body: "<body><p>Hi</p></body>".to_string(),
                ..Default::default()
            },
        );

        let host = FileHost::open(&path, &Config::default()).unwrap();
        host.set_signature("<!-- signature --><p>Mona</p>", BodyFormat::Html)
            .await
            .unwrap();
        host.set_signature("<!-- signature --><p>Mona Kane</p>", BodyFormat::Html)
            .await
            .unwrap();

        let reread: MessageFile =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            reread.body,
            "<body><p>Hi</p><!-- signature --><p>Mona Kane</p></body>"
        );
        assert_eq!(reread.kind, ComposeKind::New);
    }
}
