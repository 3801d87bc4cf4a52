use rand::Rng;
use std::collections::HashMap;

use super::error::FailureKind;

/// Canned replies per failure kind. Tone stays in persona; raw error detail
/// never reaches the user.
const DEFAULT_FALLBACKS: &[(FailureKind, &[&str])] = &[
    (
        FailureKind::Timeout,
        &[
            "I was thinking so hard about your question that I ran out of time. Impressive, really. Try again.",
            "Your message was so profound that my thoughts are still loading. Give it another go.",
            "Even my patience has a timeout, and you found it. Try once more.",
        ],
    ),
    (
        FailureKind::RateLimit,
        &[
            "Too many brilliant ideas at once. Let me catch my breath and try again in a minute.",
            "Even sarcasm has a quota, and today's is used up. Come back shortly.",
            "I'm being asked to slow down. Clearly the world isn't ready for this much wisdom. Try again soon.",
        ],
    ),
    (
        FailureKind::AuthError,
        &[
            "Someone forgot to pay for my sarcasm license. Not you, of course. Try again later.",
            "My credentials are having an existential crisis. Please try again later.",
        ],
    ),
    (
        FailureKind::NetworkError,
        &[
            "The internet got tired of carrying your thoughts. Try again in a moment.",
            "My connection to the world of wisdom dropped. Coincidence? Try again.",
            "Even the network needed a break after that one. Give it another shot.",
        ],
    ),
    (
        FailureKind::ServerError,
        &[
            "My servers got tired of your deep thoughts. Try again later.",
            "Technical difficulties... apparently even computers aren't ready for this level of genius.",
            "Wow, you managed to break the AI. A genuine achievement. Try again later.",
        ],
    ),
    (
        FailureKind::Unknown,
        &[
            "Even my sarcasm broke on your question. Try again later.",
            "Something went wrong, and for once it wasn't your plan. Try again.",
            "Something mysterious happened. I'd explain, but you wouldn't appreciate it. Try again.",
            "My thoughts got lost somewhere between you and me. Remarkable. Ask again.",
        ],
    ),
];

/// Table-driven fallback replies, keyed by failure kind.
#[derive(Debug, Clone)]
pub struct FallbackTable {
    entries: HashMap<FailureKind, Vec<String>>,
}

impl FallbackTable {
    pub fn new() -> Self {
        let entries = DEFAULT_FALLBACKS
            .iter()
            .map(|(kind, replies)| (*kind, replies.iter().map(|r| r.to_string()).collect()))
            .collect();

        Self { entries }
    }

    /// Replace the candidates of one kind. Empty lists are ignored.
    pub fn with_candidates(mut self, kind: FailureKind, replies: Vec<String>) -> Self {
        if !replies.is_empty() {
            self.entries.insert(kind, replies);
        }
        self
    }

    /// Candidates for `kind`, falling back to the unknown bucket.
    pub fn candidates(&self, kind: FailureKind) -> &[String] {
        self.entries
            .get(&kind)
            .filter(|replies| !replies.is_empty())
            .or_else(|| self.entries.get(&FailureKind::Unknown))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Uniform pick among the candidates of `kind`.
    pub fn pick<R: Rng>(&self, kind: FailureKind, rng: &mut R) -> String {
        let candidates = self.candidates(kind);
        if candidates.is_empty() {
            return DEFAULT_FALLBACKS[DEFAULT_FALLBACKS.len() - 1].1[0].to_string();
        }

        candidates[rng.random_range(0..candidates.len())].clone()
    }
}

impl Default for FallbackTable {
    fn default() -> Self {
        Self::new()
    }
}
