//! Capabilities the host mail client provides to a compose session.
//!
//! Each concern is its own trait so adapters and test doubles only need to
//! provide what a caller actually uses. [`ComposeHost`] bundles them all.
#![allow(async_fn_in_trait)]

use crate::error::HostError;
use crate::signatures::UserProfile;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFormat {
    Html,
    Text,
}

/// How the message being composed came to exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComposeKind {
    #[default]
    New,
    Reply,
    Forward,
}

impl ComposeKind {
    pub fn is_reply_or_forward(&self) -> bool {
        matches!(self, ComposeKind::Reply | ComposeKind::Forward)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Informational,
    Error,
}

pub trait MessageBody {
    async fn get_body(&self, format: BodyFormat) -> Result<String, HostError>;
}

pub trait SignatureWriter {
    /// Replace the message's signature region with `html`, adding it when absent.
    async fn set_signature(&self, html: &str, format: BodyFormat) -> Result<(), HostError>;
}

pub trait MessageDetails {
    async fn recipients(&self) -> Result<Vec<String>, HostError>;
    async fn subject(&self) -> Result<String, HostError>;
    /// Conversation id, only present for replies and forwards
    fn thread_id(&self) -> Option<String>;
    fn compose_kind(&self) -> ComposeKind;
    /// Whether the compose window can take API calls yet.
    async fn is_ready(&self) -> bool;
    fn user_profile(&self) -> Option<UserProfile>;
}

pub trait Notifier {
    fn notify(&self, level: NoticeLevel, message: &str);
}

pub trait ComposeHost: MessageBody + SignatureWriter + MessageDetails + Notifier {}

impl<T: MessageBody + SignatureWriter + MessageDetails + Notifier> ComposeHost for T {}
