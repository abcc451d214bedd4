//! Assistant reply text for search outcomes.

use database::{ListingFilter, QueryResult};
use serde_json::Value;

/// Reply when a search matches nothing.
pub const NO_RESULTS: &str = "No cars found matching your query.";

/// "Found 3 cars for Bmw under 500000₺ with mileage under 100000km from 2018
/// or newer. Here are the first few:"
pub fn filter_summary(count: usize, filter: &ListingFilter) -> String {
    let mut summary = format!("Found {}", cars(count));
    if let Some(brand) = &filter.brand {
        summary.push_str(&format!(" for {}", title_case(brand)));
    }
    if let Some(model) = &filter.model {
        summary.push_str(&format!(" {}", title_case(model)));
    }
    if let Some(price) = filter.max_price {
        summary.push_str(&format!(" under {}₺", price));
    }
    if let Some(mileage) = filter.max_mileage {
        summary.push_str(&format!(" with mileage under {}km", mileage));
    }
    if let Some(year) = filter.min_year {
        summary.push_str(&format!(" from {} or newer", year));
    }
    summary.push_str(". Here are the first few:");
    summary
}

/// Summary for a translated search: the count plus the phrases applied.
pub fn phrase_summary(count: usize, phrases: &[String]) -> String {
    if phrases.is_empty() {
        return format!("Found {}.", cars(count));
    }
    format!("Found {} for \"{}\".", cars(count), phrases.join("; "))
}

/// Empty-result reply, listing what the brand does have.
pub fn no_results(brand: Option<&str>, models: &[String]) -> String {
    match brand {
        None => NO_RESULTS.to_string(),
        Some(brand) if models.is_empty() => format!(
            "{} There are no listings for brands matching \"{}\".",
            NO_RESULTS, brand
        ),
        Some(brand) => format!(
            "{} Available {} models: {}.",
            NO_RESULTS,
            title_case(brand),
            models.join(", ")
        ),
    }
}

/// "Bmw 320i", used to label one side of a comparison.
pub fn filter_label(filter: &ListingFilter) -> String {
    [filter.brand.as_deref(), filter.model.as_deref()]
        .into_iter()
        .flatten()
        .map(title_case)
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn compare_summary(left: &str, right: &str) -> String {
    format!("Comparing {} and {}:", left, right)
}

pub fn compare_missing(left: &str, right: &str) -> String {
    format!("Could not find both {} and {} to compare.", left, right)
}

/// Plain-text table of the first `limit` rows, for the stored transcript.
pub fn result_table(result: &QueryResult, limit: usize) -> String {
    if result.is_empty() {
        return String::new();
    }

    let mut lines = vec![result.columns.join(" | ")];
    for row in result.rows.iter().take(limit) {
        lines.push(
            row.iter()
                .map(cell_text)
                .collect::<Vec<_>>()
                .join(" | "),
        );
    }
    lines.join("\n")
}

/// A cell as display text: strings unquoted, null blank.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn cars(count: usize) -> String {
    if count == 1 {
        "1 car".to_string()
    } else {
        format!("{} cars", count)
    }
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
