//! Natural-language car search.
//!
//! Turns what a user types into a bounded, read-only query over the
//! listings table:
//!
//! - [`SqlTranslator`] - asks the model for one `SELECT`
//! - [`Sanitizer`] - makes that statement read-only, bounded and
//!   case-insensitive
//! - [`FollowUpSuggester`] - proposes one more filter
//! - [`keyword_parser`] - the model-free fallback
//! - [`SearchPipeline`] - wires them together behind one call
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use car_search::{PipelineConfig, QueryContext, SearchPipeline, SearchRequest};
//! use database::Database;
//! use mock_brain::ScriptedBrain;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::connect("sqlite:cars.db").await?;
//! let brain = Arc::new(ScriptedBrain::new(["SELECT * FROM cars WHERE brand = 'bmw';"]));
//! let pipeline = SearchPipeline::with_brain(db.listings("cars")?, PipelineConfig::default(), brain);
//!
//! let mut context = QueryContext::new();
//! context.begin("any BMW");
//! let outcome = pipeline.search(SearchRequest::new(context)).await?;
//! println!("{}", outcome.summary);
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod error;
pub mod formatting;
pub mod keyword_parser;
pub mod persona;
pub mod pipeline;
pub mod sanitizer;
pub mod schema;
pub mod suggester;
pub mod translator;

pub use context::QueryContext;
pub use error::{Result, SearchError};
pub use keyword_parser::ParsedQuery;
pub use persona::persona_prompt;
pub use pipeline::{
    AvailableModels, ImageDescription, PipelineConfig, SearchOutcome, SearchPipeline,
    SearchRequest, SearchStrategy,
};
pub use sanitizer::{SanitizeError, SanitizedSql, Sanitizer, SanitizerConfig};
pub use schema::ListingSchema;
pub use suggester::{FollowUpSuggester, NO_FURTHER_FILTER};
pub use translator::SqlTranslator;
