//! Correlates a reply/forward with the signature chosen earlier in its thread.
//!
//! The thread id is the strong signal. Hosts that expose no thread id fall
//! back to "shares a recipient and has the same subject", which can match
//! unrelated conversations that happen to share both.

use crate::normalization::Normalizer;
use crate::signatures::SignatureKey;
use crate::store::ThreadSignatureRecord;
use std::cmp::Reverse;
use std::collections::HashSet;

pub struct ThreadSignatureMatcher {
    normalizer: Normalizer,
}

impl ThreadSignatureMatcher {
    pub fn new() -> Self {
        Self {
            normalizer: Normalizer::new(),
        }
    }

    pub fn match_signature(
        &self,
        thread_id: Option<&str>,
        recipients: &[String],
        subject: &str,
        records: &[ThreadSignatureRecord],
    ) -> Option<SignatureKey> {
        let mut sorted: Vec<&ThreadSignatureRecord> = records.iter().collect();
        // Most recent decision wins
        sorted.sort_by_key(|record| Reverse(record.timestamp));

        if let Some(thread_id) = thread_id.filter(|id| !id.trim().is_empty()) {
            let by_thread = sorted.iter().find_map(|record| {
                (record.thread_id.as_deref() == Some(thread_id))
                    .then(|| record.applied_signature.key())
                    .flatten()
            });
            if let Some(key) = by_thread {
                log::debug!("Thread {thread_id} matched signature {key}");
                return Some(key);
            }
        }

        let current_recipients: HashSet<String> = recipients
            .iter()
            .map(|address| self.normalizer.normalize_address(address))
            .filter(|address| !address.is_empty())
            .collect();
        if current_recipients.is_empty() {
            return None;
        }
        let current_subject = self.normalizer.normalize_subject(subject);

        let by_conversation = sorted.iter().find_map(|record| {
            let shares_recipient = record
                .recipients
                .iter()
                .any(|address| current_recipients.contains(&self.normalizer.normalize_address(address)));
            let same_subject = self.normalizer.normalize_subject(&record.subject) == current_subject;

            (shares_recipient && same_subject)
                .then(|| record.applied_signature.key())
                .flatten()
        });

        if let Some(key) = by_conversation {
            log::debug!("Recipients/subject matched signature {key}");
        }
        by_conversation
    }
}

impl Default for ThreadSignatureMatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signatures::AppliedSignature;
    use chrono::{Duration, Utc};

    fn record(
        thread_id: Option<&str>,
        recipients: &[&str],
        subject: &str,
        applied: AppliedSignature,
        minutes_ago: i64,
    ) -> ThreadSignatureRecord {
        ThreadSignatureRecord {
            recipients: recipients.iter().map(|r| r.to_string()).collect(),
            thread_id: thread_id.map(str::to_string),
            subject: subject.to_string(),
            applied_signature: applied,
            timestamp: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    fn recipients(list: &[&str]) -> Vec<String> {
        list.iter().map(|r| r.to_string()).collect()
    }

    #[test]
    fn test_thread_id_wins_over_recipient_subject() {
        let records = vec![
            record(
                None,
                &["alex@contoso.com"],
                "budget",
                AppliedSignature::Key(SignatureKey::Marketing),
                1,
            ),
            record(
                Some("thread-1"),
                &["someone@else.com"],
                "other",
                AppliedSignature::Key(SignatureKey::Executive),
                60,
            ),
        ];

        let matcher = ThreadSignatureMatcher::new();
        let matched = matcher.match_signature(
            Some("thread-1"),
            &recipients(&["alex@contoso.com"]),
            "RE: Budget",
            &records,
        );
        assert_eq!(matched, Some(SignatureKey::Executive));
    }

    #[test]
    fn test_none_is_never_returned() {
        let records = vec![
            record(Some("t"), &["alex@contoso.com"], "budget", AppliedSignature::None, 0),
            record(None, &["alex@contoso.com"], "budget", AppliedSignature::None, 0),
        ];
        let matcher = ThreadSignatureMatcher::new();
        assert_eq!(
            matcher.match_signature(Some("t"), &recipients(&["alex@contoso.com"]), "budget", &records),
            None
        );
    }

    #[test]
    fn test_thread_none_falls_through_to_conversation() {
        let records = vec![
            record(Some("t"), &["alex@contoso.com"], "budget", AppliedSignature::None, 0),
            record(
                None,
                &["ALEX@contoso.com"],
                "Budget",
                AppliedSignature::Key(SignatureKey::Support),
                5,
            ),
        ];
        let matcher = ThreadSignatureMatcher::new();
        let matched = matcher.match_signature(
            Some("t"),
            &recipients(&["Alex <alex@contoso.com>", "pat@contoso.com"]),
            "Re: budget",
            &records,
        );
        assert_eq!(matched, Some(SignatureKey::Support));
    }

    #[test]
    fn test_most_recent_record_wins() {
        let records = vec![
            record(
                None,
                &["alex@contoso.com"],
                "budget",
                AppliedSignature::Key(SignatureKey::Corporate),
                30,
            ),
            record(
                None,
                &["alex@contoso.com"],
                "budget",
                AppliedSignature::Key(SignatureKey::CorporateShort),
                2,
            ),
        ];
        let matcher = ThreadSignatureMatcher::new();
        assert_eq!(
            matcher.match_signature(None, &recipients(&["alex@contoso.com"]), "budget", &records),
            Some(SignatureKey::CorporateShort)
        );
    }

    #[test]
    fn test_requires_shared_recipient_and_subject() {
        let records = vec![record(
            None,
            &["alex@contoso.com"],
            "budget",
            AppliedSignature::Key(SignatureKey::Corporate),
            0,
        )];
        let matcher = ThreadSignatureMatcher::new();
        assert_eq!(
            matcher.match_signature(None, &recipients(&["pat@contoso.com"]), "budget", &records),
            None
        );
        assert_eq!(
            matcher.match_signature(None, &recipients(&["alex@contoso.com"]), "launch", &records),
            None
        );
        assert_eq!(matcher.match_signature(None, &[], "budget", &records), None);
    }
}
