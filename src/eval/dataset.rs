use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

/// One question with its gold SQL. Extra Spider fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkItem {
    pub question: String,
    /// Gold SQL
    pub query: String,
    #[serde(default)]
    pub db_id: Option<String>,
}

impl BenchmarkItem {
    pub fn new(question: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            query: query.into(),
            db_id: None,
        }
    }

    pub fn with_db_id(mut self, db_id: impl Into<String>) -> Self {
        self.db_id = Some(db_id.into());
        self
    }
}

/// Load a JSON array of benchmark items, preserving order.
pub fn load_dataset(path: &Path) -> Result<Vec<BenchmarkItem>> {
    let content = fs::read_to_string(path)?;
    let items: Vec<BenchmarkItem> = serde_json::from_str(&content)?;
    info!("Loaded {} benchmark items from {}", items.len(), path.display());
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_spider_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dev.json");
        fs::write(
            &path,
            r#"[
                {"question": "How many tracks?", "query": "SELECT COUNT(*) FROM tracks;", "db_id": "music", "query_toks": ["SELECT"]},
                {"question": "List artists", "query": "SELECT name FROM artists"}
            ]"#,
        )
        .unwrap();

        let items = load_dataset(&path).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].db_id.as_deref(), Some("music"));
        assert_eq!(items[1], BenchmarkItem::new("List artists", "SELECT name FROM artists"));
    }

    #[test]
    fn test_load_rejects_non_array() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, r#"{"question": "x"}"#).unwrap();
        assert!(load_dataset(&path).is_err());
    }
}
