// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! `Transcript` (spec.md §3): the ordered pair `(logs, error)` accumulated
//! across all code segments of a single turn, normalized per spec.md §4.5
//! ("After each turn, `logs` and `error` are each trimmed; empty strings map
//! to absent fields").

/// One turn's accumulated captured output and terminal error, both still
/// `Option` so "non-empty" (spec.md §4.5) is a cheap `is_some()` check on
/// either field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    pub logs: Option<String>,
    pub error: Option<String>,
}

impl Transcript {
    /// Merge in one code segment's run outcome (spec.md §4.5: "its
    /// end-of-run transcript is merged into the turn transcript"). Once an
    /// error has been recorded it is never overwritten — the interaction
    /// loop stops starting new code runs after the first error within a
    /// turn, so only the first error should ever reach here in practice.
    pub fn merge(&mut self, logs: &str, error: Option<&str>) {
        if !logs.is_empty() {
            self.logs.get_or_insert_with(String::new).push_str(logs);
        }
        if self.error.is_none() {
            if let Some(e) = error {
                self.error = Some(e.to_string());
            }
        }
    }

    /// spec.md §4.5: trim both fields, empty strings become absent. Applied
    /// once per turn, after all of the turn's code segments have resolved.
    pub fn normalize(mut self) -> Self {
        self.logs = self.logs.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        self.error = self.error.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        self
    }

    /// spec.md §4.5: "A turn's transcript is non-empty iff either field is
    /// present" — this drives the loop-continuation decision.
    pub fn is_non_empty(&self) -> bool {
        self.logs.is_some() || self.error.is_some()
    }

    /// Build the text fed back to the model as the next turn's input
    /// (spec.md §4.5/§4.3: "captured console output" plus any error,
    /// concatenated for the model to see as transcript-driven input).
    pub fn as_model_input(&self) -> String {
        match (&self.logs, &self.error) {
            (Some(logs), Some(err)) => format!("{logs}\nError: {err}\n"),
            (Some(logs), None) => logs.clone(),
            (None, Some(err)) => format!("Error: {err}\n"),
            (None, None) => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_transcript_normalizes_to_absent_fields() {
        let t = Transcript::default().normalize();
        assert!(!t.is_non_empty());
    }

    #[test]
    fn whitespace_only_logs_normalize_to_absent() {
        let mut t = Transcript::default();
        t.merge("   \n  ", None);
        let t = t.normalize();
        assert_eq!(t.logs, None);
        assert!(!t.is_non_empty());
    }

    #[test]
    fn merge_accumulates_logs_in_order() {
        let mut t = Transcript::default();
        t.merge("a\n", None);
        t.merge("b\n", None);
        assert_eq!(t.logs.as_deref(), Some("a\nb\n"));
    }

    #[test]
    fn first_error_is_sticky() {
        let mut t = Transcript::default();
        t.merge("", Some("boom"));
        t.merge("", Some("second"));
        assert_eq!(t.error.as_deref(), Some("boom"));
    }

    #[test]
    fn model_input_combines_logs_and_error() {
        let mut t = Transcript::default();
        t.merge("2\n", None);
        let t = t.normalize();
        assert_eq!(t.as_model_input(), "2\n");
    }
}
