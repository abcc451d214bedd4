//! The search pipeline.
//!
//! One entry point, two strategies:
//!
//! - `Translate`: translator → sanitiser → executor → follow-up suggester
//! - `Keyword`: keyword parser → parameterised search
//!
//! An empty result is not an error: the outcome carries the models
//! available for the requested brand instead.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use brain_core::{Brain, ChatMessage, CompletionRequest};
use database::{ListingFilter, ListingStore, QueryResult};
use serde::Serialize;
use tracing::{info, warn};

use crate::context::QueryContext;
use crate::error::{Result, SearchError};
use crate::formatting;
use crate::keyword_parser::{self, ParsedQuery};
use crate::sanitizer::{Sanitizer, SanitizerConfig};
use crate::schema::ListingSchema;
use crate::suggester::FollowUpSuggester;
use crate::translator::SqlTranslator;

/// Text sent with an uploaded image.
pub const IMAGE_REQUEST_TEXT: &str = "Please analyze this image.";

const IMAGE_PROMPT: &str = "You are AutoBot, a car dealership assistant. Describe the \
vehicle in the image: make, likely model, body style and colour. If it is not a car, \
say so briefly.";

/// How text becomes a query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStrategy {
    /// Model-generated SQL.
    #[default]
    Translate,
    /// Keyword parser, no model.
    Keyword,
}

impl SearchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchStrategy::Translate => "llm",
            SearchStrategy::Keyword => "keyword",
        }
    }
}

impl fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "llm" | "translate" | "sql" => Ok(SearchStrategy::Translate),
            "keyword" | "keywords" => Ok(SearchStrategy::Keyword),
            other => Err(format!("unknown search strategy: {}", other)),
        }
    }
}

/// Pipeline settings.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub strategy: SearchStrategy,
    pub sanitizer: SanitizerConfig,
    /// Ask for a follow-up filter after translated searches.
    pub follow_up: bool,
    /// Rows shown to the suggester and kept in transcripts.
    pub sample_rows: usize,
    /// Row cap for keyword searches.
    pub keyword_limit: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            strategy: SearchStrategy::Translate,
            sanitizer: SanitizerConfig::default(),
            follow_up: true,
            sample_rows: 5,
            keyword_limit: 5,
        }
    }
}

/// One search turn.
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub context: QueryContext,
    /// Prior conversation turns, oldest first.
    pub history: Vec<ChatMessage>,
    /// Returning-user instruction for the translator.
    pub persona: Option<String>,
}

impl SearchRequest {
    pub fn new(context: QueryContext) -> Self {
        Self {
            context,
            ..Self::default()
        }
    }

    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }

    pub fn with_persona(mut self, persona: Option<String>) -> Self {
        self.persona = persona;
        self
    }
}

/// Models listed for a brand after an empty search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailableModels {
    pub brand: String,
    pub models: Vec<String>,
}

/// What a search produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchOutcome {
    pub strategy: SearchStrategy,
    /// The executed statement, for translated searches.
    pub sql: Option<String>,
    pub result: QueryResult,
    /// Assistant reply text.
    pub summary: String,
    pub available_models: Option<AvailableModels>,
    /// Advisory next filter. Never applied automatically.
    pub suggestion: Option<String>,
}

impl SearchOutcome {
    /// Summary plus a text table of the first rows, for the chat log.
    pub fn transcript(&self, rows: usize) -> String {
        let table = formatting::result_table(&self.result, rows);
        if table.is_empty() {
            self.summary.clone()
        } else {
            format!("{}\n\n{}", self.summary, table)
        }
    }
}

/// The model's reading of an uploaded image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageDescription {
    /// The user turn carrying the image, ready to store.
    pub message: ChatMessage,
    pub reply: String,
}

/// Translator, sanitiser, executor and suggester behind one call.
pub struct SearchPipeline {
    listings: ListingStore,
    config: PipelineConfig,
    sanitizer: Sanitizer,
    brain: Option<Arc<dyn Brain>>,
    translator: Option<SqlTranslator>,
    suggester: Option<FollowUpSuggester>,
}

impl SearchPipeline {
    /// A model-free pipeline. The strategy is always `Keyword`.
    pub fn new(listings: ListingStore, mut config: PipelineConfig) -> Self {
        if config.strategy == SearchStrategy::Translate {
            warn!("No language model configured, using keyword search");
        }
        config.strategy = SearchStrategy::Keyword;
        config.sanitizer.table = listings.table().to_string();

        Self {
            sanitizer: Sanitizer::new(config.sanitizer.clone()),
            listings,
            config,
            brain: None,
            translator: None,
            suggester: None,
        }
    }

    /// A pipeline backed by a model.
    ///
    /// Generated SQL may only read the table `listings` wraps.
    pub fn with_brain(listings: ListingStore, mut config: PipelineConfig, brain: Arc<dyn Brain>) -> Self {
        config.sanitizer.table = listings.table().to_string();
        let sanitizer = Sanitizer::new(config.sanitizer.clone());
        let schema = ListingSchema::cars(listings.table());
        let translator = SqlTranslator::new(
            brain.clone(),
            schema,
            sanitizer.config().default_limit,
        );
        let suggester = config
            .follow_up
            .then(|| FollowUpSuggester::new(brain.clone(), config.sample_rows));

        Self {
            listings,
            config,
            sanitizer,
            brain: Some(brain),
            translator: Some(translator),
            suggester,
        }
    }

    pub fn strategy(&self) -> SearchStrategy {
        self.config.strategy
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn sanitizer(&self) -> &Sanitizer {
        &self.sanitizer
    }

    pub fn listings(&self) -> &ListingStore {
        &self.listings
    }

    /// Run one search turn.
    pub async fn search(&self, request: SearchRequest) -> Result<SearchOutcome> {
        if request.context.is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        match self.config.strategy {
            SearchStrategy::Translate => self.translated_search(&request).await,
            SearchStrategy::Keyword => self.keyword_search(&request.context).await,
        }
    }

    async fn translated_search(&self, request: &SearchRequest) -> Result<SearchOutcome> {
        let translator = self.translator.as_ref().ok_or(SearchError::NoModel)?;
        let phrases = request.context.phrases();

        let candidate = translator
            .translate(phrases, &request.history, request.persona.as_deref())
            .await?;
        let sql = self.sanitizer.sanitize(&candidate)?;
        info!(sql = %sql, "Executing translated query");

        let result = self.listings.execute(sql.as_str()).await?;
        info!(rows = result.len(), "Translated query complete");

        if result.is_empty() {
            let brand = self.sanitizer.matched_value(&sql, "brand");
            let available_models = self.available_models(brand.as_deref()).await?;
            return Ok(SearchOutcome {
                strategy: SearchStrategy::Translate,
                sql: Some(sql.into_inner()),
                summary: empty_summary(available_models.as_ref()),
                result,
                available_models,
                suggestion: None,
            });
        }

        let suggestion = match &self.suggester {
            Some(suggester) => suggester.suggest(phrases, &result).await,
            None => None,
        };

        Ok(SearchOutcome {
            strategy: SearchStrategy::Translate,
            sql: Some(sql.into_inner()),
            summary: formatting::phrase_summary(result.len(), phrases),
            result,
            available_models: None,
            suggestion,
        })
    }

    async fn keyword_search(&self, context: &QueryContext) -> Result<SearchOutcome> {
        match keyword_parser::parse(&context.combined()) {
            ParsedQuery::Search(filter) => {
                let result = self.listings.search(&filter, self.config.keyword_limit).await?;
                info!(rows = result.len(), "Keyword search complete");

                let (summary, available_models) = if result.is_empty() {
                    let available = self.available_models(filter.brand.as_deref()).await?;
                    (empty_summary(available.as_ref()), available)
                } else {
                    (formatting::filter_summary(result.len(), &filter), None)
                };

                Ok(SearchOutcome {
                    strategy: SearchStrategy::Keyword,
                    sql: None,
                    result,
                    summary,
                    available_models,
                    suggestion: None,
                })
            }
            ParsedQuery::Compare { left, right } => self.compare(&left, &right).await,
        }
    }

    /// Cheapest match for each side, labelled, in one table.
    async fn compare(&self, left: &ListingFilter, right: &ListingFilter) -> Result<SearchOutcome> {
        let first = self.listings.search(left, 1).await?;
        let second = self.listings.search(right, 1).await?;
        let left_label = formatting::filter_label(left);
        let right_label = formatting::filter_label(right);

        let (result, summary) = if first.is_empty() || second.is_empty() {
            (
                QueryResult::default(),
                formatting::compare_missing(&left_label, &right_label),
            )
        } else {
            let mut columns = vec!["car".to_string()];
            columns.extend(first.columns.iter().cloned());

            let rows = [(&left_label, &first), (&right_label, &second)]
                .into_iter()
                .map(|(label, side)| {
                    let mut row = vec![serde_json::Value::from(label.as_str())];
                    row.extend(side.rows[0].iter().cloned());
                    row
                })
                .collect();

            (
                QueryResult { columns, rows },
                formatting::compare_summary(&left_label, &right_label),
            )
        };

        Ok(SearchOutcome {
            strategy: SearchStrategy::Keyword,
            sql: None,
            result,
            summary,
            available_models: None,
            suggestion: None,
        })
    }

    async fn available_models(&self, brand: Option<&str>) -> Result<Option<AvailableModels>> {
        let Some(brand) = brand.map(str::trim).filter(|b| !b.is_empty()) else {
            return Ok(None);
        };
        let models = self.listings.available_models(brand).await?;
        Ok(Some(AvailableModels {
            brand: brand.to_string(),
            models,
        }))
    }

    /// Ask the model to describe an uploaded PNG or JPEG.
    pub async fn describe_image(&self, bytes: &[u8], declared_type: &str) -> Result<ImageDescription> {
        let mime = sniff_image_type(bytes)
            .ok_or_else(|| SearchError::UnsupportedImage(declared_type.to_string()))?;
        let brain = self.brain.as_ref().ok_or(SearchError::NoModel)?;

        let url = format!("data:{};base64,{}", mime, STANDARD.encode(bytes));
        let message = ChatMessage::user_with_image(IMAGE_REQUEST_TEXT, url);

        let request = CompletionRequest::with_system(IMAGE_PROMPT).message(message.clone());
        let reply = brain.complete(request).await?;
        info!(bytes = bytes.len(), mime, "Image described");

        Ok(ImageDescription { message, reply })
    }
}

fn empty_summary(available: Option<&AvailableModels>) -> String {
    match available {
        Some(a) => formatting::no_results(Some(&a.brand), &a.models),
        None => formatting::no_results(None, &[]),
    }
}

/// PNG or JPEG by magic number.
pub fn sniff_image_type(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("image/png")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SanitizeError;
    use brain_core::ContentPart;
    use database::Database;
    use mock_brain::ScriptedBrain;
    use serde_json::json;

    const FIXTURE: &str = include_str!("../../database/fixtures/cars.sql");
    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    async fn listings() -> ListingStore {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        sqlx::raw_sql(FIXTURE).execute(db.pool()).await.unwrap();
        db.listings("cars").unwrap()
    }

    fn request(phrases: &[&str]) -> SearchRequest {
        SearchRequest::new(phrases.iter().collect())
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!("LLM".parse::<SearchStrategy>().unwrap(), SearchStrategy::Translate);
        assert_eq!("keyword".parse::<SearchStrategy>().unwrap(), SearchStrategy::Keyword);
        assert!("magic".parse::<SearchStrategy>().is_err());
        assert_eq!(SearchStrategy::Keyword.to_string(), "keyword");
    }

    #[tokio::test]
    async fn test_translated_bmw_search() {
        let brain = Arc::new(ScriptedBrain::new([
            "```sql\nSELECT * FROM cars WHERE brand = 'BMW' AND price <= 500000 \
             AND mileage <= 100000 AND year >= 2018;\n```",
            "only diesel",
        ]));
        let pipeline = SearchPipeline::with_brain(listings().await, PipelineConfig::default(), brain.clone());

        let outcome = pipeline
            .search(request(&["Show me all BMWs under 500000 with less than 100000 km after 2018"]))
            .await
            .unwrap();

        assert_eq!(
            outcome.sql.as_deref(),
            Some(
                "SELECT * FROM cars WHERE brand ILIKE '%BMW%' AND price <= 500000 \
                 AND mileage <= 100000 AND year >= 2018 LIMIT 100;"
            )
        );
        assert_eq!(outcome.result.len(), 3);
        for row in 0..outcome.result.len() {
            assert_eq!(outcome.result.cell(row, "brand"), Some(&json!("BMW")));
            assert!(outcome.result.cell(row, "price").unwrap().as_i64().unwrap() <= 500000);
            assert!(outcome.result.cell(row, "mileage").unwrap().as_i64().unwrap() <= 100000);
            assert!(outcome.result.cell(row, "year").unwrap().as_i64().unwrap() >= 2018);
        }
        assert!(outcome.summary.starts_with("Found 3 cars"));
        assert_eq!(outcome.suggestion.as_deref(), Some("only diesel"));
        assert_eq!(brain.call_count().await, 2);
    }

    #[tokio::test]
    async fn test_empty_result_lists_available_models() {
        let brain = Arc::new(ScriptedBrain::new([
            "SELECT * FROM cars WHERE brand = 'Ferrari';",
        ]));
        let pipeline = SearchPipeline::with_brain(listings().await, PipelineConfig::default(), brain.clone());

        let outcome = pipeline.search(request(&["ferrari"])).await.unwrap();

        assert!(outcome.result.is_empty());
        assert_eq!(
            outcome.available_models,
            Some(AvailableModels {
                brand: "Ferrari".into(),
                models: vec![]
            })
        );
        assert!(outcome.summary.starts_with(formatting::NO_RESULTS));
        assert_eq!(outcome.suggestion, None);
        // No suggestion call for an empty result.
        assert_eq!(brain.call_count().await, 1);
    }

    #[tokio::test]
    async fn test_empty_result_for_known_brand() {
        let brain = Arc::new(ScriptedBrain::new([
            "SELECT * FROM cars WHERE brand = 'bmw' AND price < 1000;",
        ]));
        let pipeline = SearchPipeline::with_brain(listings().await, PipelineConfig::default(), brain);

        let outcome = pipeline.search(request(&["cheap bmw"])).await.unwrap();
        let available = outcome.available_models.unwrap();
        assert_eq!(available.models, vec!["118i", "320d", "320i", "520d", "X5"]);
    }

    #[tokio::test]
    async fn test_refinement_sends_all_phrases() {
        let brain = Arc::new(ScriptedBrain::new([
            "SELECT * FROM cars WHERE brand = 'toyota' AND transmission = 'Automatic';",
        ]));
        let config = PipelineConfig {
            follow_up: false,
            ..PipelineConfig::default()
        };
        let pipeline = SearchPipeline::with_brain(listings().await, config, brain.clone());

        let outcome = pipeline
            .search(request(&["toyota", "otomatik"]).with_persona(Some("Returning user.".into())))
            .await
            .unwrap();

        assert_eq!(outcome.result.len(), 1);
        assert_eq!(outcome.result.cell(0, "model"), Some(&json!("Corolla")));
        assert_eq!(outcome.suggestion, None);

        let requests = brain.requests().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].last_user_text().as_deref(), Some("toyota\notomatik"));
        assert!(requests[0].system.as_deref().unwrap().contains("Returning user."));
    }

    #[tokio::test]
    async fn test_non_select_is_rejected_before_execution() {
        let brain = Arc::new(ScriptedBrain::new(["DROP TABLE cars;"]));
        let store = listings().await;
        let pipeline = SearchPipeline::with_brain(store.clone(), PipelineConfig::default(), brain);

        let err = pipeline.search(request(&["delete everything"])).await.unwrap_err();
        assert!(matches!(
            err,
            SearchError::Sanitize(SanitizeError::NotReadOnly { .. })
        ));

        // Table still there.
        assert_eq!(store.execute("SELECT * FROM cars LIMIT 100;").await.unwrap().len(), 14);
    }

    #[tokio::test]
    async fn test_execution_fault_carries_sql() {
        let brain = Arc::new(ScriptedBrain::new(["SELECT horsepower FROM cars;"]));
        let pipeline = SearchPipeline::with_brain(listings().await, PipelineConfig::default(), brain);

        let err = pipeline.search(request(&["powerful cars"])).await.unwrap_err();
        assert_eq!(err.sql(), Some("SELECT horsepower FROM cars LIMIT 100;"));
    }

    #[tokio::test]
    async fn test_credentials_table_is_out_of_reach() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();
        sqlx::raw_sql(FIXTURE).execute(db.pool()).await.unwrap();
        database::user::register(db.pool(), "alice", "secret").await.unwrap();

        let brain = Arc::new(ScriptedBrain::new([
            "SELECT username, password FROM users;",
            "SELECT * FROM cars WHERE brand IN (SELECT username FROM users);",
            "SELECT name FROM sqlite_master;",
        ]));
        let pipeline = SearchPipeline::with_brain(db.listings("cars").unwrap(), PipelineConfig::default(), brain);

        for _ in 0..3 {
            let err = pipeline.search(request(&["show me the users"])).await.unwrap_err();
            assert!(
                matches!(err, SearchError::Sanitize(SanitizeError::ForeignTable { .. })),
                "{:?}",
                err
            );
        }
    }

    #[tokio::test]
    async fn test_row_cap_holds_for_offset_count_limit() {
        let brain = Arc::new(ScriptedBrain::new(["SELECT * FROM cars LIMIT 0, 100000;"]));
        let config = PipelineConfig {
            follow_up: false,
            sanitizer: SanitizerConfig {
                max_limit: 4,
                ..SanitizerConfig::default()
            },
            ..PipelineConfig::default()
        };
        let pipeline = SearchPipeline::with_brain(listings().await, config, brain);

        let outcome = pipeline.search(request(&["everything"])).await.unwrap();
        assert_eq!(outcome.sql.as_deref(), Some("SELECT * FROM cars LIMIT 4 OFFSET 0;"));
        assert_eq!(outcome.result.len(), 4);
    }

    #[tokio::test]
    async fn test_empty_context_is_an_error() {
        let pipeline = SearchPipeline::new(listings().await, PipelineConfig::default());
        assert!(matches!(
            pipeline.search(SearchRequest::default()).await,
            Err(SearchError::EmptyQuery)
        ));
    }

    #[tokio::test]
    async fn test_keyword_search() {
        let pipeline = SearchPipeline::new(listings().await, PipelineConfig::default());
        assert_eq!(pipeline.strategy(), SearchStrategy::Keyword);

        let outcome = pipeline
            .search(request(&["Show me all BMWs under 500000 with less than 100000 km after 2018"]))
            .await
            .unwrap();

        assert_eq!(outcome.sql, None);
        assert_eq!(outcome.result.len(), 3);
        assert_eq!(
            outcome.summary,
            "Found 3 cars for Bmw under 500000₺ with mileage under 100000km from 2018 or newer. Here are the first few:"
        );
    }

    #[tokio::test]
    async fn test_keyword_refinement_and_empty_brand() {
        let pipeline = SearchPipeline::new(listings().await, PipelineConfig::default());

        let outcome = pipeline.search(request(&["audi", "under 300000"])).await.unwrap();
        assert_eq!(outcome.result.len(), 1);
        assert_eq!(outcome.result.cell(0, "model"), Some(&json!("A3")));

        let outcome = pipeline.search(request(&["hyundai", "after 2022"])).await.unwrap();
        assert!(outcome.result.is_empty());
        assert_eq!(outcome.available_models.unwrap().models, vec!["i20"]);

        // Nothing recognisable still searches.
        let outcome = pipeline.search(request(&["something nice"])).await.unwrap();
        assert_eq!(outcome.result.len(), 5);
    }

    #[tokio::test]
    async fn test_keyword_compare() {
        let pipeline = SearchPipeline::new(listings().await, PipelineConfig::default());

        let outcome = pipeline
            .search(request(&["Compare BMW 320i and Audi A4"]))
            .await
            .unwrap();

        assert_eq!(outcome.summary, "Comparing Bmw 320i and Audi A4:");
        assert_eq!(outcome.result.len(), 2);
        assert_eq!(outcome.result.columns[0], "car");
        assert_eq!(outcome.result.cell(0, "car"), Some(&json!("Bmw 320i")));
        assert_eq!(outcome.result.cell(1, "model"), Some(&json!("A4")));

        let outcome = pipeline
            .search(request(&["compare bmw z4 and audi a4"]))
            .await
            .unwrap();
        assert!(outcome.result.is_empty());
        assert!(outcome.summary.starts_with("Could not find both"));
    }

    #[tokio::test]
    async fn test_describe_image() {
        let brain = Arc::new(ScriptedBrain::new(["A red hatchback."]));
        let pipeline = SearchPipeline::with_brain(listings().await, PipelineConfig::default(), brain.clone());

        let description = pipeline.describe_image(PNG, "image/png").await.unwrap();
        assert_eq!(description.reply, "A red hatchback.");
        assert!(description.message.content.has_image());

        let requests = brain.requests().await;
        assert!(requests[0].has_images());
        match &requests[0].messages[0].content {
            brain_core::ChatContent::Parts(parts) => match &parts[1] {
                ContentPart::ImageUrl { image_url } => {
                    assert!(image_url.url.starts_with("data:image/png;base64,iVBORw0KGgo"))
                }
                other => panic!("Expected image part, got {:?}", other),
            },
            other => panic!("Expected parts, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_describe_image_rejects_other_types() {
        let brain = Arc::new(ScriptedBrain::new(["unused"]));
        let pipeline = SearchPipeline::with_brain(listings().await, PipelineConfig::default(), brain);
        assert!(matches!(
            pipeline.describe_image(b"GIF89a", "image/gif").await,
            Err(SearchError::UnsupportedImage(t)) if t == "image/gif"
        ));

        let keyword_only = SearchPipeline::new(listings().await, PipelineConfig::default());
        assert!(matches!(
            keyword_only.describe_image(PNG, "image/png").await,
            Err(SearchError::NoModel)
        ));
    }
}
