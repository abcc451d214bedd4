//! Keyword parser: the model-free search strategy.
//!
//! Pulls a brand from a fixed list, the word after it as a model guess,
//! and price, mileage and year thresholds anchored on keywords or units.
//! Anything it cannot read is dropped, so parsing never fails.

use std::ops::Range;
use std::sync::OnceLock;

use database::ListingFilter;
use regex::Regex;

/// Brands the parser recognises.
pub const KNOWN_BRANDS: &[&str] = &[
    "ford", "audi", "bmw", "mercedes", "toyota", "skoda", "hyundai",
];

/// Words that follow a brand but are not a model name.
const NOT_A_MODEL: &[&str] = &[
    "under", "below", "less", "than", "over", "with", "without", "after", "from", "since",
    "and", "or", "for", "in", "km", "tl", "try", "lira", "car", "cars", "the", "a", "an",
    "up", "to", "max", "maximum", "cheaper", "newer", "older", "models", "model", "vs",
    "versus", "please", "only",
];

/// What a keyword query asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedQuery {
    /// A filtered search.
    Search(ListingFilter),
    /// "compare X and Y": one cheapest match per side.
    Compare {
        left: ListingFilter,
        right: ListingFilter,
    },
}

/// Parse a message into a search or comparison.
pub fn parse(message: &str) -> ParsedQuery {
    let lowered = message.trim().to_lowercase();

    if let Some(caps) = compare_pattern().captures(&lowered) {
        let left = parse_filter(&caps[1]);
        let right = parse_filter(&caps[2]);
        if left.brand.is_some() && right.brand.is_some() {
            return ParsedQuery::Compare { left, right };
        }
    }

    ParsedQuery::Search(parse_filter(&lowered))
}

/// Parse the filter fields out of a message.
pub fn parse_filter(message: &str) -> ListingFilter {
    let text = strip_thousands_separators(&message.to_lowercase());
    let mut consumed: Vec<Range<usize>> = Vec::new();

    let (brand, model) = parse_brand_and_model(&text);
    let max_mileage = parse_mileage(&text, &mut consumed);
    let max_price = parse_price(&text, &mut consumed);
    let min_year = parse_year(&text, &mut consumed);

    ListingFilter {
        brand,
        model,
        max_price,
        max_mileage,
        min_year,
    }
}

fn parse_brand_and_model(text: &str) -> (Option<String>, Option<String>) {
    let tokens: Vec<&str> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();

    for (i, token) in tokens.iter().enumerate() {
        let Some(brand) = brand_of(token) else {
            continue;
        };
        let model = tokens
            .get(i + 1)
            .filter(|next| is_model_guess(next))
            .map(|next| next.to_string());
        return (Some(brand.to_string()), model);
    }

    (None, None)
}

/// A token naming a known brand, singular or plural ("bmw", "bmws").
fn brand_of(token: &str) -> Option<&'static str> {
    KNOWN_BRANDS.iter().copied().find(|brand| {
        token == *brand || token.strip_suffix('s').is_some_and(|stem| stem == *brand)
    })
}

fn is_model_guess(token: &str) -> bool {
    !NOT_A_MODEL.contains(&token)
        && !token.chars().all(|c| c.is_ascii_digit())
        && brand_of(token).is_none()
}

/// `100000 km`, or `mileage under 100000`.
fn parse_mileage(text: &str, consumed: &mut Vec<Range<usize>>) -> Option<i64> {
    let caps = mileage_pattern().captures(text)?;
    let number = caps.get(1).or_else(|| caps.get(2))?;
    let value = number.as_str().parse().ok()?;
    consumed.push(number.range());
    Some(value)
}

/// Currency-anchored first (`500000₺`, `500000 tl`), then keyword-anchored
/// (`under 500000`). Numbers followed by `km` are mileage, not price.
fn parse_price(text: &str, consumed: &mut Vec<Range<usize>>) -> Option<i64> {
    let currency = currency_pattern()
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .find(|m| !overlaps(consumed, m.range()));

    let number = currency.or_else(|| {
        price_keyword_pattern()
            .captures_iter(text)
            .filter(|caps| caps.get(2).is_none())
            .filter_map(|caps| caps.get(1))
            .find(|m| !overlaps(consumed, m.range()))
    })?;

    let value = number.as_str().parse().ok()?;
    consumed.push(number.range());
    Some(value)
}

/// `after 2018` / `from 2018` / `since 2018`, else a bare year no other
/// field has claimed.
fn parse_year(text: &str, consumed: &mut Vec<Range<usize>>) -> Option<i64> {
    let number = year_keyword_pattern()
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .find(|m| !overlaps(consumed, m.range()))
        .or_else(|| {
            bare_year_pattern()
                .find_iter(text)
                .find(|m| !overlaps(consumed, m.range()))
        })?;

    let value = number.as_str().parse().ok()?;
    consumed.push(number.range());
    Some(value)
}

fn overlaps(consumed: &[Range<usize>], range: Range<usize>) -> bool {
    consumed
        .iter()
        .any(|c| c.start < range.end && range.start < c.end)
}

/// `1,250,000` and `1.250.000` both become `1250000`.
fn strip_thousands_separators(text: &str) -> String {
    let mut out = text.to_string();
    while thousands_pattern().is_match(&out) {
        out = thousands_pattern().replace_all(&out, "$1$2").into_owned();
    }
    out
}

fn compare_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^compare\s+(.+?)\s+(?:and|vs\.?|versus|with)\s+(.+)$").expect("static regex")
    })
}

fn thousands_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d)[.,](\d{3})\b").expect("static regex"))
}

fn mileage_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(\d{1,9})\s*km\b|\bmileage\s+(?:under|below|less than|of)?\s*(\d{1,9})\b")
            .expect("static regex")
    })
}

fn currency_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(\d{2,9})\s*(?:₺|tl\b|try\b|lira\b)|₺\s*(\d{2,9})\b").expect("static regex")
    })
}

fn price_keyword_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(?:under|below|less than|cheaper than|up to|max(?:imum)?)\s+(\d{2,9})\b(\s*km\b)?")
            .expect("static regex")
    })
}

fn year_keyword_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(?:after|from|since|newer than)\s+((?:19|20)\d{2})\b").expect("static regex")
    })
}

fn bare_year_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(?:19|20)\d{2}\b").expect("static regex"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(message: &str) -> ListingFilter {
        match parse(message) {
            ParsedQuery::Search(filter) => filter,
            other => panic!("Expected search, got {:?}", other),
        }
    }

    #[test]
    fn test_full_sentence() {
        let parsed = filter("Show me all BMWs under 500000 with less than 100000 km after 2018");
        assert_eq!(
            parsed,
            ListingFilter {
                brand: Some("bmw".into()),
                model: None,
                max_price: Some(500000),
                max_mileage: Some(100000),
                min_year: Some(2018),
            }
        );
    }

    #[test]
    fn test_brand_and_model() {
        let parsed = filter("toyota corolla below 400.000₺");
        assert_eq!(parsed.brand.as_deref(), Some("toyota"));
        assert_eq!(parsed.model.as_deref(), Some("corolla"));
        assert_eq!(parsed.max_price, Some(400000));
    }

    #[test]
    fn test_currency_anchor_wins() {
        let parsed = filter("audi a4 2019 for 520,000 TL");
        assert_eq!(parsed.max_price, Some(520000));
        assert_eq!(parsed.min_year, Some(2019));
        assert_eq!(parsed.model.as_deref(), Some("a4"));
    }

    #[test]
    fn test_km_number_is_not_price() {
        let parsed = filter("ford under 90000 km");
        assert_eq!(parsed.max_mileage, Some(90000));
        assert_eq!(parsed.max_price, None);
    }

    #[test]
    fn test_mileage_keyword() {
        let parsed = filter("skoda with mileage under 50000 under 450000");
        assert_eq!(parsed.max_mileage, Some(50000));
        assert_eq!(parsed.max_price, Some(450000));
    }

    #[test]
    fn test_numeric_token_is_not_model() {
        let parsed = filter("bmw 2019");
        assert_eq!(parsed.model, None);
        assert_eq!(parsed.min_year, Some(2019));
    }

    #[test]
    fn test_unparsed_fields_dropped() {
        assert_eq!(filter("something red and shiny"), ListingFilter::default());
        assert_eq!(filter(""), ListingFilter::default());
    }

    #[test]
    fn test_compare() {
        match parse("Compare BMW 320i and Audi A4") {
            ParsedQuery::Compare { left, right } => {
                assert_eq!(left.brand.as_deref(), Some("bmw"));
                assert_eq!(left.model.as_deref(), Some("320i"));
                assert_eq!(right.brand.as_deref(), Some("audi"));
                assert_eq!(right.model.as_deref(), Some("a4"));
            }
            other => panic!("Expected compare, got {:?}", other),
        }
    }

    #[test]
    fn test_compare_without_brands_is_search() {
        assert!(matches!(
            parse("compare prices and mileage"),
            ParsedQuery::Search(_)
        ));
    }
}
