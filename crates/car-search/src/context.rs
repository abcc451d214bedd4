//! Query context: the filter phrases of one guided search.

use serde::{Deserialize, Serialize};

/// Ordered filter phrases accumulated across a guided search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryContext {
    phrases: Vec<String>,
}

impl QueryContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new search: drop earlier phrases and keep only `phrase`.
    pub fn begin(&mut self, phrase: &str) {
        self.phrases.clear();
        self.refine(phrase);
    }

    /// Append a refinement. Blank phrases are ignored.
    pub fn refine(&mut self, phrase: &str) {
        let phrase = phrase.trim();
        if !phrase.is_empty() {
            self.phrases.push(phrase.to_string());
        }
    }

    pub fn reset(&mut self) {
        self.phrases.clear();
    }

    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }

    /// All phrases joined by spaces, oldest first.
    pub fn combined(&self) -> String {
        self.phrases.join(" ")
    }
}

impl<S: AsRef<str>> FromIterator<S> for QueryContext {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut context = Self::new();
        for phrase in iter {
            context.refine(phrase.as_ref());
        }
        context
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refine_and_begin() {
        let mut context = QueryContext::new();
        context.refine("bmw");
        context.refine("  ");
        context.refine("under 500000");
        assert_eq!(context.phrases(), ["bmw", "under 500000"]);
        assert_eq!(context.combined(), "bmw under 500000");

        context.begin("toyota");
        assert_eq!(context.phrases(), ["toyota"]);

        context.reset();
        assert!(context.is_empty());
    }

    #[test]
    fn test_from_iter() {
        let context: QueryContext = ["audi", "", "automatic"].into_iter().collect();
        assert_eq!(context.phrases().len(), 2);
    }
}
