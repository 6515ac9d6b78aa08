//! Host and template-service doubles shared by the unit tests.

use crate::error::{HostError, Result, SignatureError};
use crate::extractor::{SignatureExtractor, Variant};
use crate::host::{BodyFormat, ComposeKind, MessageBody, MessageDetails, NoticeLevel, Notifier, SignatureWriter};
use crate::signatures::{SignatureKey, SignatureTemplate, UserProfile};
use crate::templates::TemplateSource;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

pub const OWNER: &str = "mona@contoso.com";

pub fn profile() -> UserProfile {
    UserProfile {
        first_name: "Mona".to_string(),
        last_name: "Kane".to_string(),
        email: OWNER.to_string(),
        title: "Director".to_string(),
    }
}

pub struct FakeHost {
    pub body: Mutex<String>,
    pub recipients: Mutex<Vec<String>>,
    pub subject: Mutex<String>,
    pub thread_id: Option<String>,
    pub kind: ComposeKind,
    pub fail_get_body: bool,
    pub fail_set_signature: bool,
    /// Number of `is_ready` polls answered with false before becoming ready
    pub not_ready_polls: AtomicU32,
    pub ready_polls: AtomicU32,
    pub notices: Mutex<Vec<(NoticeLevel, String)>>,
    pub set_calls: AtomicU32,
    extractor: SignatureExtractor,
}

impl FakeHost {
    pub fn new(body: &str) -> Self {
        Self {
            body: Mutex::new(body.to_string()),
            recipients: Mutex::new(vec!["alex@contoso.com".to_string()]),
            subject: Mutex::new("Budget".to_string()),
            thread_id: None,
            kind: ComposeKind::New,
            fail_get_body: false,
            fail_set_signature: false,
            not_ready_polls: AtomicU32::new(0),
            ready_polls: AtomicU32::new(0),
            notices: Mutex::new(Vec::new()),
            set_calls: AtomicU32::new(0),
            extractor: SignatureExtractor::new("signature", Some(OWNER.to_string())).unwrap(),
        }
    }

    pub fn reply(body: &str, thread_id: Option<&str>) -> Self {
        Self {
            kind: ComposeKind::Reply,
            thread_id: thread_id.map(str::to_string),
            ..Self::new(body)
        }
    }

    /// Change the To line and subject, as the user does while composing.
    pub fn address(&self, recipients: &[&str], subject: &str) {
        *self.recipients.lock().unwrap() = recipients.iter().map(|r| r.to_string()).collect();
        *self.subject.lock().unwrap() = subject.to_string();
    }

    pub fn body(&self) -> String {
        self.body.lock().unwrap().clone()
    }

    pub fn notices(&self) -> Vec<(NoticeLevel, String)> {
        self.notices.lock().unwrap().clone()
    }
}

impl MessageBody for FakeHost {
    async fn get_body(&self, _format: BodyFormat) -> std::result::Result<String, HostError> {
        if self.fail_get_body {
            return Err(HostError::new("getAsync", "item is not available"));
        }
        Ok(self.body())
    }
}

impl SignatureWriter for FakeHost {
    async fn set_signature(&self, html: &str, _format: BodyFormat) -> std::result::Result<(), HostError> {
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_set_signature {
            return Err(HostError::new("setSignatureAsync", "permission denied"));
        }
        let mut body = self.body.lock().unwrap();
        *body = self.extractor.replace_signature(&body, html, Variant::Classic);
        Ok(())
    }
}

impl MessageDetails for FakeHost {
    async fn recipients(&self) -> std::result::Result<Vec<String>, HostError> {
        Ok(self.recipients.lock().unwrap().clone())
    }

    async fn subject(&self) -> std::result::Result<String, HostError> {
        Ok(self.subject.lock().unwrap().clone())
    }

    fn thread_id(&self) -> Option<String> {
        self.thread_id.clone()
    }

    fn compose_kind(&self) -> ComposeKind {
        self.kind
    }

    async fn is_ready(&self) -> bool {
        self.ready_polls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.not_ready_polls.load(Ordering::SeqCst);
        if remaining > 0 {
            self.not_ready_polls.store(remaining - 1, Ordering::SeqCst);
            return false;
        }
        true
    }

    fn user_profile(&self) -> Option<UserProfile> {
        Some(profile())
    }
}

impl Notifier for FakeHost {
    fn notify(&self, level: NoticeLevel, message: &str) {
        self.notices.lock().unwrap().push((level, message.to_string()));
    }
}

#[derive(Default)]
pub struct StaticTemplates {
    pub templates: HashMap<SignatureKey, String>,
    pub unreachable: bool,
    pub fetches: AtomicU32,
}

impl StaticTemplates {
    pub fn with(key: SignatureKey, html: &str) -> Self {
        let mut templates = HashMap::new();
        templates.insert(key, html.to_string());
        Self {
            templates,
            ..Default::default()
        }
    }
}

impl TemplateSource for StaticTemplates {
    async fn fetch_template(&self, key: SignatureKey) -> Result<SignatureTemplate> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.unreachable {
            return Err(SignatureError::TemplateService("connection refused".to_string()));
        }
        self.templates
            .get(&key)
            .map(|html| SignatureTemplate {
                key,
                html: html.clone(),
            })
            .ok_or_else(|| SignatureError::TemplateService(format!("signature {key} is not offered")))
    }
}
