//! Rule-based generator
//!
//! Keyword patterns over the music schema. Table and column names are looked
//! up in the rendered schema text so renamed tables (e.g. `track` vs `tracks`)
//! still resolve; the plural defaults apply when nothing matches.

use super::SqlGenerator;
use crate::db::{value_text, Rows};
use crate::error::ProviderError;
use crate::prompting::GenerationContext;
use itertools::Itertools;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

lazy_static! {
    static ref TRACKS_BY_ARTIST: Regex = Regex::new(r"tracks by (artist|band) (.+)").unwrap();
}

/// Table name to column names, in schema order.
struct SchemaIndex {
    tables: Vec<(String, Vec<String>)>,
}

impl SchemaIndex {
    fn parse(schema_text: &str) -> Self {
        let mut tables: Vec<(String, Vec<String>)> = Vec::new();

        for line in schema_text.lines() {
            let trimmed = line.trim();
            if let Some(rest) = line.strip_prefix("TABLE ") {
                if let Some(name) = rest.split_whitespace().next() {
                    tables.push((name.to_string(), Vec::new()));
                }
                continue;
            }
            if trimmed.is_empty() || trimmed.starts_with("--") || trimmed.starts_with("FOREIGN KEY") {
                continue;
            }
            if line.starts_with("  ") {
                if let (Some((_, columns)), Some(column)) =
                    (tables.last_mut(), trimmed.split_whitespace().next())
                {
                    columns.push(column.to_string());
                }
            }
        }

        Self { tables }
    }

    fn table(&self, fragment: &str, fallback: &str) -> String {
        self.tables
            .iter()
            .map(|(name, _)| name)
            .find(|name| name.contains(fragment))
            .cloned()
            .unwrap_or_else(|| fallback.to_string())
    }

    fn column(&self, table: &str, fragment: &str, fallback: &str) -> String {
        self.tables
            .iter()
            .find(|(name, _)| name == table)
            .and_then(|(_, columns)| columns.iter().find(|c| c.contains(fragment)))
            .cloned()
            .unwrap_or_else(|| fallback.to_string())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NaiveGenerator;

impl NaiveGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl SqlGenerator for NaiveGenerator {
    fn name(&self) -> &str {
        "naive"
    }

    fn generate_sql(&self, ctx: &GenerationContext) -> Result<String, ProviderError> {
        let q = ctx.question().to_lowercase();
        let schema = SchemaIndex::parse(ctx.schema());
        debug!("Naive generator indexed {} tables", schema.tables.len());

        if q.contains("how many") && (q.contains("tracks") || q.contains("songs")) {
            return Ok(format!("SELECT COUNT(*) FROM {};", schema.table("track", "tracks")));
        }
        if q.contains("how many") && q.contains("albums") {
            return Ok(format!("SELECT COUNT(*) FROM {};", schema.table("album", "albums")));
        }

        let tracks = schema.table("track", "tracks");
        let albums = schema.table("album", "albums");
        let artists = schema.table("artist", "artists");

        if let Some(caps) = TRACKS_BY_ARTIST.captures(&q) {
            let artist = caps
                .get(2)
                .map(|m| m.as_str())
                .unwrap_or_default()
                .trim_matches(|c: char| c.is_whitespace() || c == '"' || c == '\'' || c == '?')
                .replace('\'', "''");
            return Ok(format!(
                "SELECT {t}.{track_name}, {a}.{title} FROM {t} \
                 JOIN {a} ON {t}.{album_id} = {a}.id \
                 JOIN {r} ON {a}.{artist_id} = {r}.id \
                 WHERE {r}.{artist_name} LIKE '%{artist}%';",
                t = tracks,
                a = albums,
                r = artists,
                track_name = schema.column(&tracks, "name", "name"),
                title = schema.column(&albums, "title", "title"),
                album_id = schema.column(&tracks, "album_id", "album_id"),
                artist_id = schema.column(&albums, "artist_id", "artist_id"),
                artist_name = schema.column(&artists, "name", "name"),
                artist = artist,
            ));
        }

        if q.contains("top") && q.contains("albums") && (q.contains("track") || q.contains("songs")) {
            return Ok(format!(
                "SELECT {a}.{title}, {r}.{artist_name}, COUNT({t}.{track_id}) AS track_count \
                 FROM {a} JOIN {r} ON {a}.{artist_id} = {r}.id \
                 LEFT JOIN {t} ON {t}.{album_id} = {a}.id \
                 GROUP BY {a}.id ORDER BY track_count DESC LIMIT 5;",
                t = tracks,
                a = albums,
                r = artists,
                title = schema.column(&albums, "title", "title"),
                artist_name = schema.column(&artists, "name", "name"),
                track_id = schema.column(&tracks, "id", "id"),
                artist_id = schema.column(&albums, "artist_id", "artist_id"),
                album_id = schema.column(&tracks, "album_id", "album_id"),
            ));
        }

        Ok(format!(
            "SELECT {} FROM {} LIMIT 5;",
            schema.column(&artists, "name", "name"),
            artists
        ))
    }

    fn summarize(&self, question: &str, rows: &Rows) -> String {
        let q = question.to_lowercase();
        if q.contains("count") || q.contains("how many") {
            if let Some(first) = rows.first().and_then(|row| row.first()) {
                return format!("Found {} items", value_text(first));
            }
        }
        if q.contains("top") {
            let items = rows
                .iter()
                .filter_map(|row| row.first())
                .map(value_text)
                .join(", ");
            return format!("Top items: {}", items);
        }
        format!("Found {} results", rows.len())
    }
}
