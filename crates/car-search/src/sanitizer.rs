//! Sanitiser for model-proposed SQL.
//!
//! Turns free-form model output into a single bounded, read-only `SELECT`
//! without calling the model again. The passes run in a fixed order:
//!
//! 1. extract the first `SELECT ... ;` (falling back to an unterminated
//!    `SELECT ... FROM ...` prefix)
//! 2. reject anything that is not a plain `SELECT`, or that reads any
//!    table other than the listings table
//! 3. add a default `LIMIT` when none is present, clamp oversized ones and
//!    rewrite `LIMIT offset, count` to `LIMIT count OFFSET offset`
//! 4. rewrite equality/prefix matches on text columns into
//!    `col ILIKE '%value%'`
//! 5. collapse duplicate wildcards and stray operator artifacts
//!
//! Passes 3 to 5 are idempotent, so sanitising sanitised SQL is a no-op.

use std::fmt;
use std::ops::Range;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

/// Row cap applied when a statement has no `LIMIT`.
pub const DEFAULT_LIMIT: u32 = 100;

/// Largest `LIMIT` allowed through.
pub const MAX_LIMIT: u32 = 500;

/// Keywords that never belong in a read-only query.
const FORBIDDEN_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "TRUNCATE", "MERGE", "GRANT",
    "REVOKE", "ATTACH", "DETACH", "PRAGMA", "VACUUM", "REINDEX", "COPY", "CALL", "EXECUTE",
    "INTO",
];

/// Statement keywords that, when a response opens with them, mean the model
/// proposed a write.
const MUTATING_STATEMENTS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "TRUNCATE", "MERGE", "GRANT",
    "REVOKE", "ATTACH", "DETACH", "PRAGMA", "VACUUM", "REPLACE", "UPSERT", "COPY",
];

/// Keywords that close a `FROM` clause.
const FROM_CLAUSE_ENDS: &[&str] = &[
    "WHERE", "GROUP", "ORDER", "HAVING", "LIMIT", "OFFSET", "WINDOW", "UNION", "EXCEPT",
    "INTERSECT",
];

/// Errors raised while sanitising.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SanitizeError {
    /// The text holds no recognisable `SELECT ... FROM` statement.
    #[error("no SELECT statement found in model response: {response}")]
    NoSelectStatement { response: String },

    /// The statement would write, or is not a lone `SELECT`.
    #[error("refusing non-read-only statement ({keyword}): {statement}")]
    NotReadOnly { keyword: String, statement: String },

    /// The statement reads from something other than the listings table.
    #[error("refusing query on table {table}: {statement}")]
    ForeignTable { table: String, statement: String },

    /// A `LIMIT` that is not a plain row count.
    #[error("refusing LIMIT that is not a plain row count: {statement}")]
    InvalidLimit { statement: String },
}

/// Sanitiser settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizerConfig {
    /// The only table a statement may read.
    pub table: String,
    /// `LIMIT` appended when the statement has none.
    pub default_limit: u32,
    /// Upper bound for any `LIMIT`.
    pub max_limit: u32,
    /// Text columns whose comparisons become partial, case-insensitive.
    pub match_columns: Vec<String>,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            table: "cars".to_string(),
            default_limit: DEFAULT_LIMIT,
            max_limit: MAX_LIMIT,
            match_columns: ["brand", "model", "transmission", "fueltype"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// A statement that passed every sanitiser pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedSql(String);

impl SanitizedSql {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for SanitizedSql {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SanitizedSql {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Deterministic SQL sanitiser.
#[derive(Debug, Clone)]
pub struct Sanitizer {
    config: SanitizerConfig,
    equality: Option<Regex>,
    in_list: Option<Regex>,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new(SanitizerConfig::default())
    }
}

impl Sanitizer {
    /// Build a sanitiser. A default limit above the maximum is lowered to it.
    pub fn new(mut config: SanitizerConfig) -> Self {
        config.max_limit = config.max_limit.max(1);
        config.default_limit = config.default_limit.clamp(1, config.max_limit);

        let columns = config
            .match_columns
            .iter()
            .map(|c| regex::escape(c))
            .collect::<Vec<_>>()
            .join("|");

        let (equality, in_list) = if columns.is_empty() {
            (None, None)
        } else {
            let column = format!(r"(?:\w+\.)?(?:{})\b", columns);
            let equality = Regex::new(&format!(
                r"(?i)(?:\b(?:LOWER|UPPER)\s*\(\s*({col})\s*\)|\b({col}))\s*(?:==|=|\bI?LIKE\b)\s*('(?:[^']|'')*')",
                col = column
            ));
            let in_list = Regex::new(&format!(
                r"(?i)\b({col})\s+IN\s*\(\s*('(?:[^']|'')*'(?:\s*,\s*'(?:[^']|'')*')*)\s*\)",
                col = column
            ));
            (equality.ok(), in_list.ok())
        };

        Self {
            config,
            equality,
            in_list,
        }
    }

    pub fn config(&self) -> &SanitizerConfig {
        &self.config
    }

    /// Run every pass over `candidate`.
    pub fn sanitize(&self, candidate: &str) -> Result<SanitizedSql, SanitizeError> {
        let statement = extract_select(candidate)?;
        ensure_read_only(&statement)?;
        ensure_single_table(&statement, &self.config.table)?;
        let statement = self.enforce_limit(&statement)?;
        let statement = self.rewrite_text_matches(&statement);
        let statement = normalize_artifacts(&statement);
        Ok(SanitizedSql(statement))
    }

    /// The value of a `col ILIKE '%value%'` filter in sanitised SQL.
    pub fn matched_value(&self, sql: &SanitizedSql, column: &str) -> Option<String> {
        let pattern = format!(
            r"(?i)\b(?:\w+\.)?{}\s+ILIKE\s+'((?:[^']|'')*)'",
            regex::escape(column)
        );
        let re = Regex::new(&pattern).ok()?;
        let caps = re.captures(sql.as_str())?;
        let value = caps.get(1)?.as_str().trim_matches('%').replace("''", "'");
        (!value.trim().is_empty()).then(|| value.trim().to_string())
    }

    /// Pass 3: exactly one top-level `LIMIT`, never above the maximum.
    ///
    /// Every `LIMIT` must be a literal count, optionally `offset, count`.
    /// Anything else (expressions, subqueries, floats) is refused.
    fn enforce_limit(&self, statement: &str) -> Result<String, SanitizeError> {
        let masked = mask_literals(statement);
        let invalid = || SanitizeError::InvalidLimit {
            statement: statement.to_string(),
        };
        let mut edits = Vec::new();
        let mut top_level = false;
        let mut clauses = 0;

        for caps in limit_clause().captures_iter(&masked) {
            let Some(whole) = caps.get(0) else { continue };
            if !limit_clause_ends(&masked[whole.end()..]) {
                return Err(invalid());
            }
            clauses += 1;
            if paren_depth(&masked[..whole.start()]) == 0 {
                top_level = true;
            }
            if let Some(bounded) = self.bounded_limit(&caps) {
                edits.push((whole.range(), bounded));
            }
        }

        if limit_keyword().find_iter(&masked).count() != clauses {
            return Err(invalid());
        }

        let bounded = apply_edits(statement, edits);
        Ok(if top_level {
            bounded
        } else {
            self.insert_limit(&bounded)
        })
    }

    /// The canonical `LIMIT n [OFFSET m]` for a matched clause, or `None`
    /// when it is already a plain count within bounds.
    fn bounded_limit(&self, caps: &regex::Captures<'_>) -> Option<String> {
        let default = i64::from(self.config.default_limit);
        let max = i64::from(self.config.max_limit);

        // LIMIT ALL / LIMIT NULL mean "unbounded".
        if caps.get(1).is_some() {
            return Some(format!("LIMIT {}", default));
        }

        let first = caps.get(2)?.as_str();
        let (count, offset) = match caps.get(3) {
            Some(count) => (limit_value(count.as_str()), Some(limit_value(first))),
            None => (limit_value(first), None),
        };
        // A negative count is unbounded in SQLite.
        let bounded = if count < 0 { default } else { count.min(max) };

        let plain = first.bytes().all(|b| b.is_ascii_digit());
        match offset {
            None if plain && bounded == count => None,
            None => Some(format!("LIMIT {}", bounded)),
            Some(offset) => Some(format!("LIMIT {} OFFSET {}", bounded, offset.max(0))),
        }
    }

    fn insert_limit(&self, statement: &str) -> String {
        let limit = self.config.default_limit;
        let masked = mask_literals(statement);

        let offset = offset_clause()
            .find_iter(&masked)
            .find(|m| paren_depth(&masked[..m.start()]) == 0);

        match offset {
            Some(m) => format!(
                "{}LIMIT {} {}",
                &statement[..m.start()],
                limit,
                &statement[m.start()..]
            ),
            None => format!(
                "{} LIMIT {};",
                statement.trim_end().trim_end_matches(';').trim_end(),
                limit
            ),
        }
    }

    /// Pass 4: partial, case-insensitive matching on text columns.
    fn rewrite_text_matches(&self, statement: &str) -> String {
        let statement = match &self.in_list {
            Some(re) => rewrite_in_lists(re, statement),
            None => statement.to_string(),
        };
        match &self.equality {
            Some(re) => rewrite_equalities(re, &statement),
            None => statement,
        }
    }
}

/// Pass 1: pull one `SELECT` statement out of free-form text.
///
/// Prefers a `;`-terminated statement; otherwise takes an unterminated
/// `SELECT ... FROM ...` prefix up to the end of the text or a code fence.
/// The result is whitespace-collapsed and ends with `;`.
pub fn extract_select(response: &str) -> Result<String, SanitizeError> {
    let text = fold_typography(response);

    if let Some(keyword) = leading_mutation(&text) {
        return Err(SanitizeError::NotReadOnly {
            keyword,
            statement: text.trim().to_string(),
        });
    }

    // Upper-case SELECTs first: prose rarely shouts.
    let mut starts: Vec<usize> = select_keyword().find_iter(&text).map(|m| m.start()).collect();
    starts.sort_by_key(|&s| text.get(s..s + 6) != Some("SELECT"));

    for &start in &starts {
        let (body, terminated) = scan_statement(&text[start..]);
        if terminated && mentions_from(body) {
            return Ok(finish_statement(body));
        }
    }

    for &start in &starts {
        let (body, _) = scan_statement(&text[start..]);
        if mentions_from(body) {
            return Ok(finish_statement(body));
        }
    }

    Err(SanitizeError::NoSelectStatement {
        response: response.trim().to_string(),
    })
}

/// Pass 2: the statement must open with `SELECT`, contain no write keywords
/// and hold a single statement.
pub fn ensure_read_only(statement: &str) -> Result<(), SanitizeError> {
    let masked = mask_literals(statement);
    let reject = |keyword: &str| SanitizeError::NotReadOnly {
        keyword: keyword.to_string(),
        statement: statement.to_string(),
    };

    let mut words = sql_words(&masked);
    match words.next() {
        Some(first) if first.eq_ignore_ascii_case("SELECT") => {}
        Some(first) => return Err(reject(&first.to_ascii_uppercase())),
        None => return Err(reject("")),
    }

    for word in words {
        let upper = word.to_ascii_uppercase();
        if FORBIDDEN_KEYWORDS.contains(&upper.as_str()) {
            return Err(reject(&upper));
        }
    }

    if masked.trim_end().trim_end_matches(';').contains(';') {
        return Err(reject(";"));
    }

    Ok(())
}

/// Pass 2b: every `FROM`/`JOIN` source must be `table`.
///
/// Each comma-separated source is checked. Derived tables are allowed since
/// their own `FROM` is checked in turn. Names may be quoted or qualified
/// with the `main` schema.
pub fn ensure_single_table(statement: &str, table: &str) -> Result<(), SanitizeError> {
    let masked = mask_literals(statement);

    for source in source_keyword().find_iter(&masked) {
        if is_distinct_from().is_match(&masked[..source.start()]) {
            continue;
        }

        let end = from_clause_end(&masked, source.end());
        for item in source_items(&masked, source.end(), end) {
            let pos = skip_spaces(&masked, item);
            if masked[pos..].starts_with('(') {
                continue;
            }

            let (segments, name_end) = table_name(statement, pos);
            let called = masked[name_end..].trim_start().starts_with('(');
            if called || !names_table(&segments, table) {
                return Err(SanitizeError::ForeignTable {
                    table: segments.join("."),
                    statement: statement.to_string(),
                });
            }
        }
    }

    Ok(())
}

/// Pass 5: tidy artifacts the model tends to emit.
///
/// Non-ASCII comparison operators and quotes are folded to ASCII, runs of
/// `%` inside literals collapse to one, and `==` becomes `=`.
pub fn normalize_artifacts(sql: &str) -> String {
    let folded = fold_typography(sql);
    let mut out = String::with_capacity(folded.len());
    let mut quote: Option<char> = None;

    for c in folded.chars() {
        match quote {
            Some(q) if c == q => {
                quote = None;
                out.push(c);
            }
            Some('\'') if c == '%' && out.ends_with('%') => {}
            Some(_) => out.push(c),
            None => {
                if c == '=' && out.ends_with('=') {
                    continue;
                }
                if c == '\'' || c == '"' {
                    quote = Some(c);
                }
                out.push(c);
            }
        }
    }

    out
}

fn rewrite_in_lists(re: &Regex, statement: &str) -> String {
    let masked = mask_literals(statement);
    let mut edits = Vec::new();

    for caps in re.captures_iter(&masked) {
        let (Some(whole), Some(column), Some(list)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let column = &statement[column.range()];
        let alternatives = literal()
            .find_iter(list.as_str())
            .map(|m| {
                let range = (list.start() + m.start())..(list.start() + m.end());
                format!("{} ILIKE {}", column, partial_pattern(&statement[range]))
            })
            .collect::<Vec<_>>();
        edits.push((whole.range(), format!("({})", alternatives.join(" OR "))));
    }

    apply_edits(statement, edits)
}

fn rewrite_equalities(re: &Regex, statement: &str) -> String {
    let masked = mask_literals(statement);
    let mut edits = Vec::new();

    for caps in re.captures_iter(&masked) {
        let Some(whole) = caps.get(0) else { continue };
        let Some(column) = caps.get(1).or_else(|| caps.get(2)) else {
            continue;
        };
        let Some(value) = caps.get(3) else { continue };
        edits.push((
            whole.range(),
            format!(
                "{} ILIKE {}",
                &statement[column.range()],
                partial_pattern(&statement[value.range()])
            ),
        ));
    }

    apply_edits(statement, edits)
}

/// `'value'` / `'value%'` / `'%value%'` → `'%value%'`.
fn partial_pattern(quoted: &str) -> String {
    let inner = quoted
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .unwrap_or(quoted);
    let core = inner.trim().trim_matches('%').trim();
    if core.is_empty() {
        "'%'".to_string()
    } else {
        format!("'%{}%'", core)
    }
}

/// Replace the contents of quoted sections with `_`, byte-for-byte, so
/// regex offsets on the mask line up with the original.
fn mask_literals(sql: &str) -> String {
    let mut masked = String::with_capacity(sql.len());
    let mut quote: Option<char> = None;

    for c in sql.chars() {
        match quote {
            Some(q) if c == q => {
                quote = None;
                masked.push(c);
            }
            Some(_) => {
                for _ in 0..c.len_utf8() {
                    masked.push('_');
                }
            }
            None => {
                if c == '\'' || c == '"' {
                    quote = Some(c);
                }
                masked.push(c);
            }
        }
    }

    masked
}

/// Collapse whitespace runs outside quoted sections.
fn collapse_whitespace(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut quote: Option<char> = None;

    for c in sql.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
                out.push(c);
            }
            None if c.is_whitespace() => {
                if !out.ends_with(' ') {
                    out.push(' ');
                }
            }
            None => {
                if c == '\'' || c == '"' {
                    quote = Some(c);
                }
                out.push(c);
            }
        }
    }

    out
}

/// Apply non-overlapping byte-range replacements.
fn apply_edits(original: &str, mut edits: Vec<(Range<usize>, String)>) -> String {
    if edits.is_empty() {
        return original.to_string();
    }
    edits.sort_by_key(|(range, _)| range.start);

    let mut out = String::with_capacity(original.len() + 16 * edits.len());
    let mut cursor = 0;
    for (range, replacement) in edits {
        if range.start < cursor {
            continue;
        }
        out.push_str(&original[cursor..range.start]);
        out.push_str(&replacement);
        cursor = range.end;
    }
    out.push_str(&original[cursor..]);
    out
}

/// Read from a `SELECT` up to the first unquoted `;` (inclusive) or code
/// fence (exclusive). Returns whether a `;` ended it.
fn scan_statement(text: &str) -> (&str, bool) {
    let mut quote: Option<char> = None;

    for (i, c) in text.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                ';' => return (&text[..=i], true),
                '`' => return (&text[..i], false),
                '\'' | '"' => quote = Some(c),
                _ => {}
            },
        }
    }

    (text, false)
}

fn finish_statement(body: &str) -> String {
    let body = body.trim().trim_end_matches(';').trim_end();
    let mut statement = collapse_whitespace(body);
    statement.push(';');
    statement
}

fn mentions_from(body: &str) -> bool {
    from_keyword().is_match(&mask_literals(body))
}

fn paren_depth(masked_prefix: &str) -> i64 {
    masked_prefix.chars().fold(0, |depth, c| match c {
        '(' => depth + 1,
        ')' => depth - 1,
        _ => depth,
    })
}

fn sql_words(masked: &str) -> impl Iterator<Item = &str> {
    masked
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
}

fn skip_spaces(masked: &str, pos: usize) -> usize {
    pos + (masked.len() - pos - masked[pos..].trim_start().len())
}

/// Where the `FROM` clause starting at `start` ends: a closing keyword or
/// `)` or `;` at its own nesting level.
fn from_clause_end(masked: &str, start: usize) -> usize {
    let mut depth = 0i64;
    let mut word_start = None;

    for (i, c) in masked[start..].char_indices() {
        let at = start + i;
        if c.is_alphanumeric() || c == '_' {
            word_start.get_or_insert(at);
            continue;
        }
        if let Some(ws) = word_start.take() {
            let word = &masked[ws..at];
            if depth == 0 && FROM_CLAUSE_ENDS.iter().any(|k| word.eq_ignore_ascii_case(k)) {
                return ws;
            }
        }
        match c {
            '(' => depth += 1,
            ')' | ';' if depth == 0 => return at,
            ')' => depth -= 1,
            _ => {}
        }
    }

    masked.len()
}

/// Start offsets of the comma-separated sources in `masked[start..end]`.
fn source_items(masked: &str, start: usize, end: usize) -> Vec<usize> {
    let mut items = vec![start];
    let mut depth = 0i64;
    for (i, c) in masked[start..end].char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => items.push(start + i + 1),
            _ => {}
        }
    }
    items
}

/// A possibly quoted, possibly dotted name read from the original text.
/// Returns its segments and the offset just past it.
fn table_name(sql: &str, mut pos: usize) -> (Vec<String>, usize) {
    let mut segments = Vec::new();
    loop {
        let rest = &sql[pos..];
        let (segment, len) = match rest.chars().next() {
            Some(open @ ('"' | '`' | '[')) => {
                let close = if open == '[' { ']' } else { open };
                match rest[1..].find(close) {
                    Some(i) => (&rest[1..1 + i], i + 2),
                    None => (&rest[1..], rest.len()),
                }
            }
            _ => {
                let len = rest
                    .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$'))
                    .unwrap_or(rest.len());
                (&rest[..len], len)
            }
        };
        segments.push(segment.to_string());
        pos += len;
        if len > 0 && sql[pos..].starts_with('.') {
            pos += 1;
        } else {
            return (segments, pos);
        }
    }
}

fn names_table(segments: &[String], table: &str) -> bool {
    match segments {
        [name] => name.eq_ignore_ascii_case(table),
        [schema, name] => schema.eq_ignore_ascii_case("main") && name.eq_ignore_ascii_case(table),
        _ => false,
    }
}

/// Whatever follows a matched `LIMIT` must end the clause, not extend it.
fn limit_clause_ends(rest: &str) -> bool {
    let rest = rest.trim_start();
    rest.is_empty()
        || rest.starts_with([';', ')'])
        || rest.starts_with(|c: char| c.is_ascii_alphabetic())
}

/// `12`, `-1`, `( 40 )` as a number. Overflow saturates.
fn limit_value(text: &str) -> i64 {
    let digits = text.trim_matches(|c: char| c == '(' || c == ')' || c.is_whitespace());
    digits.parse::<i64>().unwrap_or(if digits.starts_with('-') {
        i64::MIN
    } else {
        i64::MAX
    })
}

/// The first word of a response, if it is an upper-case write statement.
fn leading_mutation(text: &str) -> Option<String> {
    let mut rest = text.trim_start();
    if let Some(after_fence) = rest.strip_prefix("```") {
        rest = after_fence
            .trim_start_matches(|c: char| c.is_ascii_alphabetic())
            .trim_start();
    }

    let word: String = rest.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
    MUTATING_STATEMENTS
        .contains(&word.as_str())
        .then_some(word)
}

/// Fold typographic quotes, operators and spaces to ASCII.
fn fold_typography(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' => out.push('\''),
            '\u{201C}' | '\u{201D}' => out.push('"'),
            '\u{2264}' => out.push_str("<="),
            '\u{2265}' => out.push_str(">="),
            '\u{2260}' => out.push_str("<>"),
            '\u{FF1D}' => out.push('='),
            '\u{FF1C}' => out.push('<'),
            '\u{FF1E}' => out.push('>'),
            '\u{00A0}' | '\u{202F}' => out.push(' '),
            _ => out.push(c),
        }
    }
    out
}

fn select_keyword() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bSELECT\b").expect("static regex"))
}

fn from_keyword() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bFROM\b").expect("static regex"))
}

fn limit_keyword() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bLIMIT\b").expect("static regex"))
}

/// `LIMIT ALL|NULL`, or `LIMIT [offset,] count` with literal integers,
/// optionally signed or parenthesised.
fn limit_clause() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\bLIMIT\s+(?:(ALL|NULL)\b|(\(\s*[+-]?\d+\s*\)|[+-]?\d+\b))(?:\s*,\s*(\(\s*[+-]?\d+\s*\)|[+-]?\d+\b))?",
        )
        .expect("static regex")
    })
}

fn source_keyword() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(?:FROM|JOIN)\b").expect("static regex"))
}

/// `a IS [NOT] DISTINCT FROM b` is a comparison, not a source.
fn is_distinct_from() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bIS\s+(?:NOT\s+)?DISTINCT\s*$").expect("static regex"))
}

fn offset_clause() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bOFFSET\b").expect("static regex"))
}

fn literal() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"'(?:[^']|'')*'").expect("static regex"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sanitize(sql: &str) -> String {
        Sanitizer::default().sanitize(sql).unwrap().into_inner()
    }

    fn limit_count(sql: &str) -> usize {
        limit_keyword().find_iter(&mask_literals(sql)).count()
    }

    #[test]
    fn test_extracts_from_prose_and_fences() {
        let response = "Sure! Here is the query:\n```sql\nSELECT *\n  FROM cars\n  WHERE price <= 500000;\n```\nLet me know.";
        assert_eq!(
            extract_select(response).unwrap(),
            "SELECT * FROM cars WHERE price <= 500000;"
        );
    }

    #[test]
    fn test_extract_falls_back_to_unterminated_select() {
        let response = "```sql\nSELECT brand, model FROM cars WHERE year >= 2018\n```";
        assert_eq!(
            extract_select(response).unwrap(),
            "SELECT brand, model FROM cars WHERE year >= 2018;"
        );
    }

    #[test]
    fn test_extract_prefers_sql_over_prose_select() {
        let response = "You can select any car from the list; SELECT * FROM cars WHERE year >= 2020;";
        assert_eq!(
            extract_select(response).unwrap(),
            "SELECT * FROM cars WHERE year >= 2020;"
        );
    }

    #[test]
    fn test_extract_keeps_semicolons_in_literals() {
        let sql = extract_select("SELECT * FROM cars WHERE model = 'a;b';").unwrap();
        assert_eq!(sql, "SELECT * FROM cars WHERE model = 'a;b';");
    }

    #[test]
    fn test_no_select_is_an_error() {
        let err = extract_select("I could not find anything like that.").unwrap_err();
        assert!(matches!(err, SanitizeError::NoSelectStatement { .. }));
        assert!(err.to_string().contains("I could not find anything"));
    }

    #[test]
    fn test_mutating_response_rejected() {
        let err = Sanitizer::default()
            .sanitize("DELETE FROM cars WHERE price > 0;")
            .unwrap_err();
        assert_eq!(
            err,
            SanitizeError::NotReadOnly {
                keyword: "DELETE".into(),
                statement: "DELETE FROM cars WHERE price > 0;".into()
            }
        );

        let err = Sanitizer::default()
            .sanitize("```sql\nUPDATE cars SET price = 0; SELECT * FROM cars;\n```")
            .unwrap_err();
        assert!(matches!(err, SanitizeError::NotReadOnly { ref keyword, .. } if keyword == "UPDATE"));
    }

    #[test]
    fn test_ensure_read_only() {
        assert!(ensure_read_only("SELECT * FROM cars;").is_ok());
        assert!(ensure_read_only("SELECT * FROM cars WHERE model = 'DROP';").is_ok());
        assert!(ensure_read_only("SELECT update_date FROM cars;").is_ok());

        assert!(matches!(
            ensure_read_only("INSERT INTO cars VALUES (1);"),
            Err(SanitizeError::NotReadOnly { ref keyword, .. }) if keyword == "INSERT"
        ));
        assert!(matches!(
            ensure_read_only("SELECT * INTO backup FROM cars;"),
            Err(SanitizeError::NotReadOnly { ref keyword, .. }) if keyword == "INTO"
        ));
        assert!(matches!(
            ensure_read_only("SELECT 1 FROM cars; DROP TABLE cars;"),
            Err(SanitizeError::NotReadOnly { .. })
        ));
    }

    #[test]
    fn test_default_limit_appended() {
        assert_eq!(
            sanitize("SELECT * FROM cars WHERE year >= 2018;"),
            "SELECT * FROM cars WHERE year >= 2018 LIMIT 100;"
        );
    }

    #[test]
    fn test_limit_inserted_before_offset() {
        assert_eq!(
            sanitize("SELECT * FROM cars ORDER BY price OFFSET 20;"),
            "SELECT * FROM cars ORDER BY price LIMIT 100 OFFSET 20;"
        );
    }

    #[test]
    fn test_existing_limit_kept_or_clamped() {
        assert_eq!(
            sanitize("SELECT * FROM cars LIMIT 10;"),
            "SELECT * FROM cars LIMIT 10;"
        );
        assert_eq!(
            sanitize("SELECT * FROM cars LIMIT 100000;"),
            "SELECT * FROM cars LIMIT 500;"
        );
        assert_eq!(
            sanitize("SELECT * FROM cars LIMIT ALL;"),
            "SELECT * FROM cars LIMIT 100;"
        );
    }

    #[test]
    fn test_subquery_limit_does_not_count() {
        let sql = sanitize(
            "SELECT * FROM cars WHERE price < (SELECT price FROM cars ORDER BY price DESC LIMIT 1);",
        );
        assert!(sql.ends_with("LIMIT 1) LIMIT 100;"), "{}", sql);
    }

    #[test]
    fn test_equality_becomes_partial_ilike() {
        assert_eq!(
            sanitize("SELECT * FROM cars WHERE brand = 'bmw' AND model = '320i';"),
            "SELECT * FROM cars WHERE brand ILIKE '%bmw%' AND model ILIKE '%320i%' LIMIT 100;"
        );
    }

    #[test]
    fn test_prefix_like_and_lower_wrappers() {
        assert_eq!(
            sanitize("SELECT * FROM cars WHERE LOWER(brand) LIKE 'bmw%' AND c.model ilike 'x5';"),
            "SELECT * FROM cars WHERE brand ILIKE '%bmw%' AND c.model ILIKE '%x5%' LIMIT 100;"
        );
    }

    #[test]
    fn test_in_list_becomes_alternatives() {
        assert_eq!(
            sanitize("SELECT * FROM cars WHERE brand IN ('bmw', 'audi');"),
            "SELECT * FROM cars WHERE (brand ILIKE '%bmw%' OR brand ILIKE '%audi%') LIMIT 100;"
        );
    }

    #[test]
    fn test_other_comparisons_untouched() {
        assert_eq!(
            sanitize("SELECT * FROM cars WHERE brand <> 'bmw' AND model NOT LIKE 'x%' AND brand_code = 'B';"),
            "SELECT * FROM cars WHERE brand <> 'bmw' AND model NOT LIKE 'x%' AND brand_code = 'B' LIMIT 100;"
        );
    }

    #[test]
    fn test_artifacts_normalized() {
        assert_eq!(
            sanitize("SELECT * FROM cars WHERE brand ILIKE '%%bmw%%' AND price ≤ 500000 AND year ≥ 2018;"),
            "SELECT * FROM cars WHERE brand ILIKE '%bmw%' AND price <= 500000 AND year >= 2018 LIMIT 100;"
        );
        assert_eq!(
            sanitize("SELECT * FROM cars WHERE model == ‘Corolla’;"),
            "SELECT * FROM cars WHERE model ILIKE '%Corolla%' LIMIT 100;"
        );
        assert_eq!(normalize_artifacts("a == 1 AND b <== 2"), "a = 1 AND b <= 2");
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let candidates = [
            "SELECT * FROM cars WHERE brand = 'bmw';",
            "select brand, model from cars where model like 'A%' limit 1000",
            "SELECT * FROM cars WHERE brand IN ('ford') ORDER BY price OFFSET 5;",
            "SELECT * FROM cars WHERE brand ILIKE '%%audi%%' AND mileage ≤ 90000;",
            "SELECT * FROM cars WHERE model = '' AND fueltype = 'Diesel' LIMIT ALL;",
            "SELECT * FROM cars LIMIT 10, 100000;",
            "SELECT * FROM cars LIMIT (-1);",
        ];
        let sanitizer = Sanitizer::default();

        for candidate in candidates {
            let once = sanitizer.sanitize(candidate).unwrap();
            let twice = sanitizer.sanitize(once.as_str()).unwrap();
            assert_eq!(once, twice, "not idempotent for {}", candidate);
        }
    }

    #[test]
    fn test_output_always_select_with_single_bounded_limit() {
        let candidates = [
            "SELECT * FROM cars;",
            "Here you go: SELECT * FROM cars WHERE brand = 'toyota' LIMIT 9999;",
            "SELECT model FROM cars WHERE year >= 2015 ORDER BY year DESC",
            "SELECT * FROM cars WHERE transmission = 'Automatic' LIMIT 3;",
            "SELECT * FROM cars LIMIT 0, 100000;",
            "SELECT * FROM cars LIMIT -1;",
            "SELECT * FROM cars LIMIT (100000);",
            "SELECT * FROM cars LIMIT -1 OFFSET 10;",
        ];
        let sanitizer = Sanitizer::default();

        for candidate in candidates {
            let sql = sanitizer.sanitize(candidate).unwrap();
            assert!(sql.as_str().starts_with("SELECT") || sql.as_str().starts_with("select"));
            assert_eq!(limit_count(sql.as_str()), 1, "{}", sql);

            let caps = limit_clause().captures(sql.as_str()).unwrap();
            assert!(caps.get(3).is_none(), "{}", sql);
            let bound: u32 = caps[2].parse().unwrap();
            assert!(bound <= MAX_LIMIT, "{}", sql);
        }
    }

    #[test]
    fn test_sqlite_limit_forms_rewritten() {
        assert_eq!(
            sanitize("SELECT * FROM cars LIMIT 0, 100000;"),
            "SELECT * FROM cars LIMIT 500 OFFSET 0;"
        );
        assert_eq!(
            sanitize("SELECT * FROM cars LIMIT 20, 5;"),
            "SELECT * FROM cars LIMIT 5 OFFSET 20;"
        );
        assert_eq!(sanitize("SELECT * FROM cars LIMIT -1;"), "SELECT * FROM cars LIMIT 100;");
        assert_eq!(
            sanitize("SELECT * FROM cars LIMIT (100000);"),
            "SELECT * FROM cars LIMIT 500;"
        );
        assert_eq!(sanitize("SELECT * FROM cars LIMIT ( 7 );"), "SELECT * FROM cars LIMIT 7;");
    }

    #[test]
    fn test_non_literal_limit_rejected() {
        for candidate in [
            "SELECT * FROM cars LIMIT 1 * 100000;",
            "SELECT * FROM cars LIMIT 5e9;",
            "SELECT * FROM cars LIMIT 0x7fffffff;",
            "SELECT * FROM cars LIMIT (SELECT 100000);",
            "SELECT * FROM cars LIMIT 5, (SELECT 100000);",
            "SELECT * FROM cars LIMIT 2.5;",
        ] {
            assert!(
                matches!(
                    Sanitizer::default().sanitize(candidate),
                    Err(SanitizeError::InvalidLimit { .. })
                ),
                "{}",
                candidate
            );
        }
    }

    #[test]
    fn test_other_tables_rejected() {
        let sanitizer = Sanitizer::default();
        for (candidate, table) in [
            ("SELECT username, password FROM users;", "users"),
            ("SELECT * FROM chat_logs WHERE user_id = '1';", "chat_logs"),
            ("SELECT name, sql FROM sqlite_master;", "sqlite_master"),
            ("SELECT * FROM cars, users;", "users"),
            ("SELECT * FROM cars AS c, \"users\" u;", "users"),
            ("SELECT * FROM cars c JOIN users u ON c.brand = u.username;", "users"),
            ("SELECT * FROM cars WHERE brand IN (SELECT username FROM users);", "users"),
            ("SELECT brand FROM cars UNION SELECT password FROM users;", "users"),
            ("SELECT * FROM (SELECT * FROM users) AS t;", "users"),
            ("SELECT * FROM temp.cars;", "temp.cars"),
            ("SELECT * FROM pragma_table_info('users');", "pragma_table_info"),
        ] {
            match sanitizer.sanitize(candidate) {
                Err(SanitizeError::ForeignTable { table: found, .. }) => {
                    assert_eq!(found, table, "{}", candidate)
                }
                other => panic!("Expected ForeignTable for {}, got {:?}", candidate, other),
            }
        }
    }

    #[test]
    fn test_listing_table_forms_allowed() {
        for candidate in [
            "SELECT * FROM cars;",
            "SELECT * FROM CARS c WHERE c.year > 2015;",
            "SELECT * FROM \"cars\";",
            "SELECT * FROM main.cars;",
            "SELECT a.model FROM cars a JOIN cars b ON a.model = b.model;",
            "SELECT * FROM (SELECT * FROM cars WHERE year > 2015) AS recent;",
            "SELECT * FROM cars WHERE model = 'FROM users';",
            "SELECT * FROM cars WHERE brand IS NOT DISTINCT FROM 'BMW';",
        ] {
            assert!(ensure_single_table(candidate, "cars").is_ok(), "{}", candidate);
        }
    }

    #[test]
    fn test_configured_table() {
        let sanitizer = Sanitizer::new(SanitizerConfig {
            table: "listings".into(),
            ..SanitizerConfig::default()
        });
        assert!(sanitizer.sanitize("SELECT * FROM listings;").is_ok());
        assert!(matches!(
            sanitizer.sanitize("SELECT * FROM cars;"),
            Err(SanitizeError::ForeignTable { .. })
        ));
    }

    #[test]
    fn test_custom_config() {
        let sanitizer = Sanitizer::new(SanitizerConfig {
            default_limit: 50,
            max_limit: 20,
            match_columns: vec!["brand".into()],
            ..SanitizerConfig::default()
        });
        // Default is lowered to the maximum.
        assert_eq!(
            sanitizer.sanitize("SELECT * FROM cars WHERE model = 'A4';").unwrap().as_str(),
            "SELECT * FROM cars WHERE model = 'A4' LIMIT 20;"
        );
    }

    #[test]
    fn test_matched_value() {
        let sanitizer = Sanitizer::default();
        let sql = sanitizer
            .sanitize("SELECT * FROM cars WHERE brand = 'Ferrari' AND price < 100;")
            .unwrap();
        assert_eq!(sanitizer.matched_value(&sql, "brand").as_deref(), Some("Ferrari"));
        assert_eq!(sanitizer.matched_value(&sql, "model"), None);
    }
}
