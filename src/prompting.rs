//! Generation context and prompt construction
//!
//! A [`GenerationContext`] is built fresh for every attempt. Remote generators
//! render it with [`build_sql_prompt`]; rule-based ones read the fields directly.

use serde::{Deserialize, Serialize};

/// A question paired with the SQL that answers it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamplePair {
    pub question: String,
    pub sql: String,
}

impl ExamplePair {
    pub fn new(question: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            sql: sql.into(),
        }
    }
}

const STATIC_FEW_SHOTS: &[(&str, &str)] = &[
    ("How many tracks?", "SELECT COUNT(*) FROM tracks;"),
    (
        "Show artists with more than 1 album",
        "SELECT artists.name, COUNT(albums.id) FROM artists LEFT JOIN albums ON albums.artist_id = artists.id GROUP BY artists.id HAVING COUNT(albums.id) > 1;",
    ),
    (
        "List top 5 albums by track count",
        "SELECT albums.title, artists.name, COUNT(tracks.id) AS track_count FROM albums JOIN artists ON albums.artist_id = artists.id LEFT JOIN tracks ON tracks.album_id = albums.id GROUP BY albums.id ORDER BY track_count DESC LIMIT 5;",
    ),
    ("List all rock tracks", "SELECT name FROM tracks WHERE genre = 'Rock';"),
    (
        "Average track duration by genre",
        "SELECT genre, AVG(duration) FROM tracks GROUP BY genre;",
    ),
    (
        "List albums released after 2015",
        "SELECT title, year FROM albums WHERE year > 2015;",
    ),
];

const INSTRUCTIONS: &str = "Write one valid SQLite SELECT statement using only the provided schema. \
Output raw SQL only: no markdown, no prose, no backticks. Start with SELECT. \
Use GROUP BY / HAVING when counting per entity. If unclear, add LIMIT 5. \
Do NOT use table aliases; reference full table names in qualified columns (e.g., artists.name).";

/// Appended to vague questions before every attempt.
pub const CLARIFY_INSTRUCTION: &str = "(The question is vague: pick the single most relevant table, \
return a few representative columns and add LIMIT 5.)";

const VAGUE_VERBS: &[&str] = &["query", "search", "find", "show", "list", "get"];
const VAGUE_NOUNS: &[&str] = &["something", "anything", "data", "info", "information", "details"];

/// Heuristic for questions too unspecific to generate reliably: fewer than
/// four tokens, a bare verb, or any vague noun.
pub fn is_vague(question: &str) -> bool {
    let tokens: Vec<String> = question
        .split_whitespace()
        .map(|t| {
            t.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .collect();

    if tokens.len() < 4 {
        return true;
    }
    let trimmed = question
        .trim()
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase();
    if VAGUE_VERBS.contains(&trimmed.as_str()) {
        return true;
    }
    tokens.iter().any(|t| VAGUE_NOUNS.contains(&t.as_str()))
}

/// The question text an attempt starts from: clarified when vague.
pub fn clarify(question: &str) -> String {
    if is_vague(question) {
        format!("{}\n{}", question.trim(), CLARIFY_INSTRUCTION)
    } else {
        question.trim().to_string()
    }
}

/// Retry amendment carrying the prior attempt's error.
pub fn repair_amendment(question: &str, last_error: &str) -> String {
    format!(
        "{}\nPrevious SQL was invalid: {}. Please fix the SQL.",
        question, last_error
    )
}

/// Immutable input of one generation attempt.
#[derive(Debug, Clone)]
pub struct GenerationContext {
    schema: String,
    question: String,
    previous_sql: Option<String>,
    previous_error: Option<String>,
    examples: Vec<ExamplePair>,
}

impl GenerationContext {
    pub fn new(schema: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            question: question.into(),
            previous_sql: None,
            previous_error: None,
            examples: Vec::new(),
        }
    }

    pub fn with_previous(mut self, sql: impl Into<String>, error: impl Into<String>) -> Self {
        self.previous_sql = Some(sql.into());
        self.previous_error = Some(error.into());
        self
    }

    pub fn with_examples(mut self, examples: Vec<ExamplePair>) -> Self {
        self.examples = examples;
        self
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn previous_sql(&self) -> Option<&str> {
        self.previous_sql.as_deref()
    }

    pub fn previous_error(&self) -> Option<&str> {
        self.previous_error.as_deref()
    }

    pub fn examples(&self) -> &[ExamplePair] {
        &self.examples
    }
}

/// Full prompt: schema, instructions, static and injected examples, question,
/// and the prior attempt when there is one.
pub fn build_sql_prompt(ctx: &GenerationContext) -> String {
    let mut lines = vec![
        "Schema:".to_string(),
        ctx.schema().trim_end().to_string(),
        String::new(),
        "Instructions:".to_string(),
        INSTRUCTIONS.to_string(),
        String::new(),
        "Examples:".to_string(),
    ];

    let statics = STATIC_FEW_SHOTS.iter().map(|(q, s)| (*q, *s));
    let injected = ctx.examples().iter().map(|e| (e.question.as_str(), e.sql.as_str()));
    for (question, sql) in statics.chain(injected) {
        lines.push(format!("Q: {}", question));
        lines.push(format!("SQL: {}", sql));
    }

    lines.push(String::new());
    lines.push(format!("Question: {}", ctx.question()));
    match (ctx.previous_sql(), ctx.previous_error()) {
        (Some(sql), Some(error)) => {
            lines.push(format!("Previous SQL: {}", sql));
            lines.push(format!("Error: {}", error));
            lines.push("Provide a corrected SQL.".to_string());
        }
        _ => lines.push("SQL:".to_string()),
    }
    lines.join("\n")
}
