//! One compose session: start-up signature resolution, user-driven signature
//! selection, and send-intent handling.

use crate::config::ComposeConfig;
use crate::context::SignatureContext;
use crate::error::Result;
use crate::host::{BodyFormat, ComposeHost, NoticeLevel};
use crate::signatures::{AppliedSignature, SignatureKey, SignatureTemplate, UserProfile};
use crate::store::{KeyValueStore, ThreadSignatureRecord};
use crate::templates::TemplateSource;
use crate::validation::{SendCompletion, SendValidator};
use chrono::Utc;
use std::collections::BTreeSet;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComposeOutcome {
    /// The compose window never became ready within the poll budget
    HostUnavailable,
    /// A signature was inserted: the thread's earlier choice, or the last
    /// applied signature when `key` is `None`
    Inserted { key: Option<SignatureKey> },
    /// Nothing to insert; waiting for the user to pick a signature
    AwaitingSelection,
}

pub struct ComposeSession<H, T, S> {
    host: H,
    templates: T,
    context: SignatureContext<S>,
    poll_interval: Duration,
    max_attempts: u32,
    record_id: Option<String>,
    /// True when `record_id` was written by this session
    owns_record: bool,
}

impl<H: ComposeHost, T: TemplateSource, S: KeyValueStore> ComposeSession<H, T, S> {
    pub fn new(host: H, templates: T, context: SignatureContext<S>, compose: &ComposeConfig) -> Self {
        Self {
            host,
            templates,
            context,
            poll_interval: Duration::from_millis(compose.poll_interval_ms),
            max_attempts: compose.max_attempts.max(1),
            record_id: None,
            owns_record: false,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn context(&self) -> &SignatureContext<S> {
        &self.context
    }

    /// Id of the thread record this session reads and updates.
    pub fn record_id(&self) -> Option<&str> {
        self.record_id.as_deref()
    }

    pub async fn on_compose_started(&mut self) -> Result<ComposeOutcome> {
        if !self.wait_until_ready().await {
            log::error!(
                "Compose window not ready after {} attempts",
                self.max_attempts
            );
            self.host.notify(
                NoticeLevel::Error,
                "The message is not ready for a signature yet. Please select one manually.",
            );
            return Ok(ComposeOutcome::HostUnavailable);
        }

        match self.resolve_signature().await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                log::error!("Compose start-up failed: {e}");
                self.host.notify(
                    NoticeLevel::Error,
                    "A signature could not be added automatically. Please select one.",
                );
                Err(e)
            }
        }
    }

    /// Insert the thread's earlier signature, or record that none is known yet.
    async fn resolve_signature(&mut self) -> Result<ComposeOutcome> {
        let (recipients, subject) = self.thread_snapshot().await?;
        let thread_id = self.host.thread_id();

        if self.host.compose_kind().is_reply_or_forward() {
            let recipient_list: Vec<String> = recipients.iter().cloned().collect();
            if let Some(key) =
                self.context
                    .match_thread(thread_id.as_deref(), &recipient_list, &subject)
            {
                match self.template_for(key).await {
                    Ok(template) => {
                        let inserted = self.insert(&template).await?;
                        self.context.store.set_last_applied(&inserted)?;
                        self.remember(recipients, subject, AppliedSignature::Key(key))?;
                        log::info!("Inserted thread signature {key}");
                        return Ok(ComposeOutcome::Inserted { key: Some(key) });
                    }
                    Err(e) => log::warn!("Thread signature {key} unavailable: {e}"),
                }
            }

            if let Some(baseline) = self.context.store.last_applied() {
                self.host.set_signature(&baseline, BodyFormat::Html).await?;
                self.remember(recipients, subject, AppliedSignature::None)?;
                log::info!("Inserted last applied signature into reply");
                return Ok(ComposeOutcome::Inserted { key: None });
            }
        }

        self.remember(recipients, subject, AppliedSignature::None)?;
        Ok(ComposeOutcome::AwaitingSelection)
    }

    /// The user picked `key` from the selection UI.
    pub async fn apply_signature(&mut self, key: SignatureKey) -> Result<()> {
        let template = match self.templates.fetch_template(key).await {
            Ok(template) => template,
            Err(e) => {
                log::error!("Template {key} could not be loaded: {e}");
                self.host.notify(
                    NoticeLevel::Error,
                    &format!("Could not load the {key} signature. Please try again later."),
                );
                return Err(e);
            }
        };

        let inserted = match self.insert(&template).await {
            Ok(inserted) => inserted,
            Err(e) => {
                self.host
                    .notify(NoticeLevel::Error, "The signature could not be added.");
                return Err(e);
            }
        };

        self.context.store.save_template(&template)?;
        self.context.store.set_last_applied(&inserted)?;

        // Recipients and subject are usually filled in after compose start
        let (recipients, subject) = self.thread_snapshot().await?;
        let previous = self.record_id.clone().filter(|_| self.owns_record);
        self.remember(recipients, subject, AppliedSignature::Key(key))?;

        if let Some(previous) = previous {
            if self.record_id.as_deref() != Some(previous.as_str()) {
                log::debug!("Thread record moved from {previous}");
                self.context.store.remove_record(&previous)?;
            }
        }

        log::info!("Applied signature {key}");
        Ok(())
    }

    /// Answer a send intent. The completion is always answered exactly once.
    pub async fn on_send(&mut self, completion: SendCompletion) {
        let decision = SendValidator::new(&self.host, &mut self.context)
            .run()
            .await;
        completion.complete(decision);
    }

    async fn wait_until_ready(&self) -> bool {
        for attempt in 1..=self.max_attempts {
            if self.host.is_ready().await {
                log::debug!("Compose window ready after {attempt} attempt(s)");
                return true;
            }
            if attempt < self.max_attempts {
                tokio::time::sleep(self.poll_interval).await;
            }
        }
        false
    }

    /// Normalized recipients and subject of the current message.
    async fn thread_snapshot(&self) -> Result<(BTreeSet<String>, String)> {
        let recipients = self
            .host
            .recipients()
            .await?
            .iter()
            .map(|address| self.context.normalizer.normalize_address(address))
            .filter(|address| !address.is_empty())
            .collect();
        let subject = self
            .context
            .normalizer
            .normalize_subject(&self.host.subject().await?);
        Ok((recipients, subject))
    }

    fn profile(&self) -> UserProfile {
        self.host
            .user_profile()
            .unwrap_or_else(|| self.context.fallback_profile.clone())
    }

    /// Cached template, fetched and cached when missing.
    async fn template_for(&mut self, key: SignatureKey) -> Result<SignatureTemplate> {
        if let Some(template) = self.context.store.template(key) {
            return Ok(template);
        }
        let template = self.templates.fetch_template(key).await?;
        self.context.store.save_template(&template)?;
        Ok(template)
    }

    async fn insert(&self, template: &SignatureTemplate) -> Result<String> {
        let inserted = self.context.render_for_insert(template, &self.profile());
        self.host.set_signature(&inserted, BodyFormat::Html).await?;
        Ok(inserted)
    }

    /// Write the session's thread record, keeping an existing keyed record
    /// rather than resetting it to `none`.
    fn remember(
        &mut self,
        recipients: BTreeSet<String>,
        subject: String,
        applied: AppliedSignature,
    ) -> Result<()> {
        let record = ThreadSignatureRecord {
            recipients,
            thread_id: self.host.thread_id().filter(|id| !id.is_empty()),
            subject,
            applied_signature: applied,
            timestamp: Utc::now(),
        };
        let record_id = record.record_id();

        let keep_existing = applied == AppliedSignature::None
            && self
                .context
                .store
                .record(&record_id)
                .is_some_and(|existing| existing.applied_signature != AppliedSignature::None);

        if keep_existing {
            log::debug!("Keeping existing thread record {record_id}");
        } else {
            self.context.store.save_record(&record)?;
        }
        self.owns_record = !keep_existing;
        self.record_id = Some(record_id);
        Ok(())
    }
}
