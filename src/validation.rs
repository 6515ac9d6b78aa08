//! Send-time signature validation.
//!
//! A send intent walks `Idle → Extracting → Comparing` and ends in exactly
//! one terminal decision: allowed, blocked, or blocked after restoring the
//! baseline signature. Replies and forwards with no signature are healed by
//! inserting the baseline instead of being rejected.

use crate::context::SignatureContext;
use crate::host::{BodyFormat, ComposeHost, NoticeLevel};
use crate::store::KeyValueStore;
use tokio::sync::oneshot;

const HEALED_NOTICE: &str = "A signature was added to your message automatically.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    /// New message without a signature, or no baseline to compare with
    MissingSignature,
    /// Reply/forward without a signature and nothing to insert
    SelectSignature,
    /// Signature text differs from the baseline; baseline was put back
    SignatureModified,
    RestoreFailed,
    BodyUnavailable,
    Internal,
}

impl BlockReason {
    pub fn message(&self) -> &'static str {
        match self {
            BlockReason::MissingSignature => {
                "Missing required signature. Please add a signature before sending."
            }
            BlockReason::SelectSignature => "Please select a signature before sending.",
            BlockReason::SignatureModified => {
                "Signature modified; restoring original. Please review the message and send again."
            }
            BlockReason::RestoreFailed => {
                "Failed to restore the original signature. Please select a signature and try again."
            }
            BlockReason::BodyUnavailable => {
                "Could not read the message body to verify the signature."
            }
            BlockReason::Internal => "The signature could not be verified. Please try again.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow { healed: bool },
    Block { reason: BlockReason, message: String },
}

impl Decision {
    pub fn block(reason: BlockReason) -> Self {
        Decision::Block {
            reason,
            message: reason.message().to_string(),
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow { .. })
    }

    pub fn reason(&self) -> Option<BlockReason> {
        match self {
            Decision::Allow { .. } => None,
            Decision::Block { reason, .. } => Some(*reason),
        }
    }
}

/// The host's pending send event. Consuming `complete` answers it once;
/// dropping it unanswered answers with an internal-error block so the host
/// never waits forever.
pub struct SendCompletion {
    sender: Option<oneshot::Sender<Decision>>,
}

impl SendCompletion {
    pub fn channel() -> (Self, oneshot::Receiver<Decision>) {
        let (sender, receiver) = oneshot::channel();
        (
            Self {
                sender: Some(sender),
            },
            receiver,
        )
    }

    pub fn complete(mut self, decision: Decision) {
        if let Some(sender) = self.sender.take() {
            if sender.send(decision).is_err() {
                log::warn!("Send event was abandoned before the decision arrived");
            }
        }
    }
}

impl Drop for SendCompletion {
    fn drop(&mut self) {
        if let Some(sender) = self.sender.take() {
            log::error!("Send event dropped without a decision; blocking");
            let _ = sender.send(Decision::block(BlockReason::Internal));
        }
    }
}

#[derive(Debug)]
enum ValidationState {
    Idle,
    Extracting { body: String },
    Comparing { current: String, snapshot: String, baseline: String },
    Restoring { baseline: String },
    Healing { signature: String },
    Done(Decision),
}

impl ValidationState {
    fn name(&self) -> &'static str {
        match self {
            ValidationState::Idle => "Idle",
            ValidationState::Extracting { .. } => "Extracting",
            ValidationState::Comparing { .. } => "Comparing",
            ValidationState::Restoring { .. } => "Restoring",
            ValidationState::Healing { .. } => "Healing",
            ValidationState::Done(_) => "Done",
        }
    }
}

pub struct SendValidator<'a, H, S> {
    host: &'a H,
    context: &'a mut SignatureContext<S>,
}

impl<'a, H: ComposeHost, S: KeyValueStore> SendValidator<'a, H, S> {
    pub fn new(host: &'a H, context: &'a mut SignatureContext<S>) -> Self {
        Self { host, context }
    }

    /// Run one send intent to its decision and tell the user about it.
    pub async fn run(&mut self) -> Decision {
        let mut state = ValidationState::Idle;
        let decision = loop {
            state = match state {
                ValidationState::Done(decision) => break decision,
                other => {
                    let from = other.name();
                    let next = self.step(other).await;
                    log::debug!("Validation {from} -> {}", next.name());
                    next
                }
            };
        };

        match &decision {
            Decision::Allow { healed: false } => log::info!("Send allowed: signature intact"),
            Decision::Allow { healed: true } => {
                log::info!("Send allowed after inserting baseline signature");
                self.host.notify(NoticeLevel::Informational, HEALED_NOTICE);
            }
            Decision::Block { reason, message } => {
                log::info!("Send blocked ({reason:?})");
                self.host.notify(NoticeLevel::Error, message);
            }
        }
        decision
    }

    async fn step(&mut self, state: ValidationState) -> ValidationState {
        match state {
            ValidationState::Idle => match self.host.get_body(BodyFormat::Html).await {
                Ok(body) => ValidationState::Extracting { body },
                Err(e) => {
                    log::error!("Failed to read message body: {e}");
                    ValidationState::Done(Decision::block(BlockReason::BodyUnavailable))
                }
            },

            ValidationState::Extracting { body } => {
                let current = self.context.extract(&body);
                let baseline = self.context.store.last_applied();
                let snapshot = baseline.as_deref().and_then(|raw| self.context.extract(raw));

                match (current, snapshot, baseline) {
                    (Some(current), Some(snapshot), Some(baseline)) => ValidationState::Comparing {
                        current,
                        snapshot,
                        baseline,
                    },
                    (current, snapshot, _) => {
                        log::debug!(
                            "Signature missing (in body: {}, in baseline: {})",
                            current.is_some(),
                            snapshot.is_some()
                        );
                        if self.host.compose_kind().is_reply_or_forward() {
                            match self.reply_fallback().await {
                                Some(signature) => ValidationState::Healing { signature },
                                None => ValidationState::Done(Decision::block(
                                    BlockReason::SelectSignature,
                                )),
                            }
                        } else {
                            ValidationState::Done(Decision::block(BlockReason::MissingSignature))
                        }
                    }
                }
            }

            ValidationState::Comparing {
                current,
                snapshot,
                baseline,
            } => {
                if self.context.signatures_match(&current, &snapshot) {
                    ValidationState::Done(Decision::Allow { healed: false })
                } else {
                    log::warn!("Signature differs from the applied baseline");
                    ValidationState::Restoring { baseline }
                }
            }

            ValidationState::Restoring { baseline } => {
                match self.host.set_signature(&baseline, BodyFormat::Html).await {
                    Ok(()) => ValidationState::Done(Decision::block(BlockReason::SignatureModified)),
                    Err(e) => {
                        log::error!("Failed to restore baseline signature: {e}");
                        ValidationState::Done(Decision::block(BlockReason::RestoreFailed))
                    }
                }
            }

            ValidationState::Healing { signature } => {
                match self.host.set_signature(&signature, BodyFormat::Html).await {
                    Ok(()) => {
                        if let Err(e) = self.context.store.set_last_applied(&signature) {
                            log::warn!("Healed signature not saved as last applied: {e}");
                        }
                        ValidationState::Done(Decision::Allow { healed: true })
                    }
                    Err(e) => {
                        log::error!("Failed to insert signature into reply: {e}");
                        ValidationState::Done(Decision::block(BlockReason::RestoreFailed))
                    }
                }
            }

            done @ ValidationState::Done(_) => done,
        }
    }

    /// Signature to insert into a reply/forward: the thread's earlier choice
    /// when its template is cached, otherwise the last applied signature.
    async fn reply_fallback(&self) -> Option<String> {
        let recipients = self.host.recipients().await.unwrap_or_else(|e| {
            log::warn!("Recipients unavailable for thread matching: {e}");
            Vec::new()
        });
        let subject = self.host.subject().await.unwrap_or_else(|e| {
            log::warn!("Subject unavailable for thread matching: {e}");
            String::new()
        });
        let thread_id = self.host.thread_id();

        let matched = self
            .context
            .match_thread(thread_id.as_deref(), &recipients, &subject)
            .and_then(|key| self.context.store.template(key));

        if let Some(template) = matched {
            log::debug!("Healing reply with thread signature {}", template.key);
            let profile = self
                .host
                .user_profile()
                .unwrap_or_else(|| self.context.fallback_profile.clone());
            return Some(self.context.render_for_insert(&template, &profile));
        }

        self.context.store.last_applied()
    }
}
