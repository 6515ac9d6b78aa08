use crate::config::Config;
use crate::extractor::{SignatureExtractor, Variant};
use crate::matcher::ThreadSignatureMatcher;
use crate::normalization::Normalizer;
use crate::signatures::{SignatureKey, SignatureTemplate, UserProfile};
use crate::store::{KeyValueStore, SignatureStore};

/// Everything a compose session needs besides the host: persistent store,
/// extraction settings, and comparison helpers.
pub struct SignatureContext<S> {
    pub store: SignatureStore<S>,
    pub extractor: SignatureExtractor,
    pub normalizer: Normalizer,
    pub matcher: ThreadSignatureMatcher,
    pub variant: Variant,
    /// Used when the host has no user profile to offer
    pub fallback_profile: UserProfile,
}

impl<S: KeyValueStore> SignatureContext<S> {
    pub fn new(backend: S, config: &Config) -> Result<Self, regex::Error> {
        Ok(Self {
            store: SignatureStore::new(backend),
            extractor: SignatureExtractor::from_config(config)?,
            normalizer: Normalizer::new(),
            matcher: ThreadSignatureMatcher::new(),
            variant: config.signature.variant,
            fallback_profile: config.profile.clone(),
        })
    }

    pub fn extract(&self, body: &str) -> Option<String> {
        self.extractor.extract(body, self.variant)
    }

    pub fn signatures_match(&self, current: &str, baseline: &str) -> bool {
        self.normalizer.normalize_html(current) == self.normalizer.normalize_html(baseline)
    }

    /// Template rendered for `profile` and wrapped with the marker, ready to insert.
    pub fn render_for_insert(&self, template: &SignatureTemplate, profile: &UserProfile) -> String {
        self.extractor.wrap(&template.render(profile))
    }

    pub fn match_thread(
        &self,
        thread_id: Option<&str>,
        recipients: &[String],
        subject: &str,
    ) -> Option<SignatureKey> {
        let records = self.store.records();
        self.matcher
            .match_signature(thread_id, recipients, subject, &records)
    }
}
