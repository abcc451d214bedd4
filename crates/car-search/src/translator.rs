//! Natural-language to SQL translation.

use std::sync::Arc;

use brain_core::{short_fingerprint, Brain, ChatMessage, CompletionRequest};
use tracing::{debug, info};

use crate::error::Result;
use crate::sanitizer::extract_select;
use crate::schema::ListingSchema;

/// Asks the model for one `SELECT` over the listings table.
pub struct SqlTranslator {
    brain: Arc<dyn Brain>,
    schema: ListingSchema,
    system_prompt: String,
}

impl SqlTranslator {
    pub fn new(brain: Arc<dyn Brain>, schema: ListingSchema, default_limit: u32) -> Self {
        let system_prompt = system_prompt(&schema, default_limit);
        info!(
            brain = brain.name(),
            prompt = %short_fingerprint(&system_prompt),
            "SQL translator ready"
        );
        Self {
            brain,
            schema,
            system_prompt,
        }
    }

    pub fn schema(&self) -> &ListingSchema {
        &self.schema
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Build the completion request.
    ///
    /// Prior text turns go first, then one user turn holding every phrase
    /// in order. Image turns are left out of history.
    pub fn build_request(
        &self,
        phrases: &[String],
        history: &[ChatMessage],
        persona: Option<&str>,
    ) -> CompletionRequest {
        let system = match persona {
            Some(persona) if !persona.trim().is_empty() => {
                format!("{}\n\n{}", self.system_prompt, persona.trim())
            }
            _ => self.system_prompt.clone(),
        };

        CompletionRequest::with_system(system)
            .messages(
                history
                    .iter()
                    .filter(|m| !m.content.has_image())
                    .cloned(),
            )
            .message(ChatMessage::user(phrases.join("\n")))
            .temperature(0.0)
    }

    /// Translate the phrases and extract the proposed statement.
    ///
    /// Fails with [`SanitizeError::NoSelectStatement`] when the reply holds
    /// no `SELECT`; nothing is executed in that case.
    ///
    /// [`SanitizeError::NoSelectStatement`]: crate::SanitizeError::NoSelectStatement
    pub async fn translate(
        &self,
        phrases: &[String],
        history: &[ChatMessage],
        persona: Option<&str>,
    ) -> Result<String> {
        let request = self.build_request(phrases, history, persona);
        let reply = self.brain.complete(request).await?;
        debug!(reply = %reply, "Translator reply");

        Ok(extract_select(&reply)?)
    }
}

fn system_prompt(schema: &ListingSchema, default_limit: u32) -> String {
    format!(
        "You translate car searches into SQL.\n\
         \n\
         {schema}\n\
         Rules:\n\
         - Reply with exactly one SELECT statement ending in a semicolon. No other statement types.\n\
         - Query only the `{table}` table.\n\
         - Only filter on what the user asked for; leave other columns unfiltered.\n\
         - Compare text columns ({text}) with ILIKE '%value%'.\n\
         - Treat \"under\", \"below\" and \"less than\" as <=, \"after\", \"from\" and \"since\" as >=.\n\
         - Map the vocabulary words above to their column values.\n\
         - If the user gives no row count, add LIMIT {limit}.\n\
         - Later messages refine earlier ones; combine all of them.",
        schema = schema.describe(),
        table = schema.table,
        text = schema.text_columns().join(", "),
        limit = default_limit,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SanitizeError;
    use crate::SearchError;
    use mock_brain::ScriptedBrain;

    fn translator(brain: Arc<ScriptedBrain>) -> SqlTranslator {
        SqlTranslator::new(brain, ListingSchema::cars("cars"), 100)
    }

    #[test]
    fn test_system_prompt_mentions_schema_and_rules() {
        let translator = translator(Arc::new(ScriptedBrain::new(Vec::<String>::new())));
        let prompt = translator.system_prompt();
        assert!(prompt.contains("Table `cars` columns:"));
        assert!(prompt.contains("ILIKE '%value%'"));
        assert!(prompt.contains("LIMIT 100"));
        assert!(prompt.contains("brand, model, transmission, fueltype"));
    }

    #[test]
    fn test_build_request_layout() {
        let translator = translator(Arc::new(ScriptedBrain::new(Vec::<String>::new())));
        let history = vec![
            ChatMessage::user("bmw"),
            ChatMessage::assistant("Found 5 cars"),
            ChatMessage::user_with_image("Please analyze this image.", "data:image/png;base64,AA=="),
        ];
        let phrases = vec!["bmw".to_string(), "under 500000".to_string()];

        let request = translator.build_request(&phrases, &history, Some("Returning user."));

        assert!(request.system.as_deref().unwrap().ends_with("\n\nReturning user."));
        assert_eq!(request.messages.len(), 3);
        assert!(!request.has_images());
        assert_eq!(request.last_user_text().as_deref(), Some("bmw\nunder 500000"));
        assert_eq!(request.temperature, Some(0.0));
    }

    #[tokio::test]
    async fn test_translate_extracts_statement() {
        let brain = Arc::new(ScriptedBrain::new([
            "Here you go:\n```sql\nSELECT * FROM cars\nWHERE brand ILIKE '%bmw%';\n```",
        ]));
        let translator = translator(brain.clone());

        let sql = translator
            .translate(&["bmw".to_string()], &[], None)
            .await
            .unwrap();

        assert_eq!(sql, "SELECT * FROM cars WHERE brand ILIKE '%bmw%';");
        assert_eq!(brain.call_count().await, 1);
    }

    #[tokio::test]
    async fn test_translate_without_select_fails() {
        let brain = Arc::new(ScriptedBrain::new(["I can only help with cars."]));
        let err = translator(brain)
            .translate(&["hello".to_string()], &[], None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SearchError::Sanitize(SanitizeError::NoSelectStatement { .. })
        ));
    }

    #[tokio::test]
    async fn test_translate_propagates_model_failure() {
        let brain = Arc::new(ScriptedBrain::new(Vec::<String>::new()));
        brain.push_failure("quota exceeded").await;

        let err = translator(brain)
            .translate(&["bmw".to_string()], &[], None)
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::Brain(_)));
    }
}
