//! Follow-up filter suggestions.

use std::sync::Arc;

use brain_core::{Brain, ChatMessage, CompletionRequest};
use database::QueryResult;
use tracing::{debug, warn};

/// Reply meaning "no further filter would help".
pub const NO_FURTHER_FILTER: &str = "NO_FURTHER_FILTER";

const SUGGESTER_PROMPT: &str = "You help a user narrow down a car search. \
Given the filters so far and a sample of the matching cars, propose ONE short \
additional filter the user could type next, for example \"only automatic\" or \
\"under 100000 km\". Reply with the filter phrase only. If no further filter \
would help, reply exactly NO_FURTHER_FILTER.";

/// Proposes one more filter. Advisory only: the caller decides whether the
/// user sees it, and the query context is never touched here.
pub struct FollowUpSuggester {
    brain: Arc<dyn Brain>,
    sample_rows: usize,
}

impl FollowUpSuggester {
    pub fn new(brain: Arc<dyn Brain>, sample_rows: usize) -> Self {
        Self {
            brain,
            sample_rows: sample_rows.max(1),
        }
    }

    pub fn build_request(&self, phrases: &[String], result: &QueryResult) -> CompletionRequest {
        let filters = phrases
            .iter()
            .map(|p| format!("- {}", p))
            .collect::<Vec<_>>()
            .join("\n");

        let sample = result
            .sample(self.sample_rows)
            .into_iter()
            .map(|row| serde_json::Value::Object(row).to_string())
            .collect::<Vec<_>>()
            .join("\n");

        let content = format!(
            "Filters so far:\n{}\n\nSample of {} matching cars:\n{}",
            filters,
            result.len(),
            sample
        );

        CompletionRequest::with_system(SUGGESTER_PROMPT)
            .message(ChatMessage::user(content))
            .temperature(0.3)
    }

    /// One suggested phrase, or `None` when there is nothing useful to add.
    ///
    /// Skips the call for results of at most one row. Model failures are
    /// logged and treated as "no suggestion".
    pub async fn suggest(&self, phrases: &[String], result: &QueryResult) -> Option<String> {
        if result.len() <= 1 {
            return None;
        }

        let reply = match self.brain.complete(self.build_request(phrases, result)).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "Follow-up suggestion failed");
                return None;
            }
        };
        debug!(reply = %reply, "Suggester reply");

        parse_suggestion(&reply)
    }
}

/// First non-empty line of the reply, unquoted; `None` for the sentinel.
fn parse_suggestion(reply: &str) -> Option<String> {
    if reply.contains(NO_FURTHER_FILTER) {
        return None;
    }

    let line = reply.lines().map(str::trim).find(|l| !l.is_empty())?;
    let line = line
        .trim_start_matches(|c: char| c == '-' || c == '*')
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`')
        .trim();

    (!line.is_empty()).then(|| line.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mock_brain::ScriptedBrain;
    use serde_json::json;

    fn result(rows: usize) -> QueryResult {
        QueryResult {
            columns: vec!["brand".into(), "model".into()],
            rows: (0..rows).map(|i| vec![json!("BMW"), json!(format!("m{}", i))]).collect(),
        }
    }

    #[test]
    fn test_parse_suggestion() {
        assert_eq!(parse_suggestion("\"only automatic\"\n").as_deref(), Some("only automatic"));
        assert_eq!(parse_suggestion("- under 50000 km").as_deref(), Some("under 50000 km"));
        assert_eq!(parse_suggestion("NO_FURTHER_FILTER"), None);
        assert_eq!(parse_suggestion("   "), None);
    }

    #[tokio::test]
    async fn test_suggest_uses_sample() {
        let brain = Arc::new(ScriptedBrain::new(["only diesel"]));
        let suggester = FollowUpSuggester::new(brain.clone(), 2);

        let suggestion = suggester.suggest(&["bmw".to_string()], &result(4)).await;
        assert_eq!(suggestion.as_deref(), Some("only diesel"));

        let requests = brain.requests().await;
        let content = requests[0].last_user_text().unwrap();
        assert!(content.contains("- bmw"));
        assert!(content.contains("Sample of 4 matching cars"));
        assert!(content.contains("m1"));
        assert!(!content.contains("m2"));
    }

    #[tokio::test]
    async fn test_small_results_skip_model() {
        let brain = Arc::new(ScriptedBrain::new(["only diesel"]));
        let suggester = FollowUpSuggester::new(brain.clone(), 5);

        assert_eq!(suggester.suggest(&[], &result(1)).await, None);
        assert_eq!(brain.call_count().await, 0);
    }

    #[tokio::test]
    async fn test_failure_is_not_an_error() {
        let brain = Arc::new(ScriptedBrain::new(Vec::<String>::new()));
        let suggester = FollowUpSuggester::new(brain, 5);
        assert_eq!(suggester.suggest(&["audi".to_string()], &result(3)).await, None);
    }
}
