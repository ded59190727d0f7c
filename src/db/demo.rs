//! Demo music database (artists, albums, tracks) used by the CLI and tests.

use crate::error::DbError;
use rusqlite::Connection;
use std::fs;
use std::path::Path;
use tracing::info;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS artists (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS albums (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  artist_id INTEGER NOT NULL,
  title TEXT NOT NULL,
  year INTEGER,
  FOREIGN KEY (artist_id) REFERENCES artists(id)
);

CREATE TABLE IF NOT EXISTS tracks (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  album_id INTEGER NOT NULL,
  name TEXT NOT NULL,
  duration INTEGER,
  genre TEXT,
  FOREIGN KEY (album_id) REFERENCES albums(id)
);
"#;

const DATA_SQL: &str = r#"
INSERT INTO artists(name) VALUES
  ('The Example Band'),
  ('Demo Artist'),
  ('Sample Singer');

INSERT INTO albums(artist_id, title, year) VALUES
  (1, 'First Album', 2010),
  (1, 'Second Album', 2012),
  (2, 'Anthology', 2018),
  (3, 'Solo Debut', 2020);

INSERT INTO tracks(album_id, name, duration, genre) VALUES
  (1, 'Intro', 120, 'Rock'),
  (1, 'Fire', 210, 'Rock'),
  (1, 'Water', 200, 'Rock'),
  (2, 'Sky', 240, 'Pop'),
  (2, 'Earth', 220, 'Pop'),
  (3, 'Memory Lane', 300, 'Indie'),
  (3, 'Sunrise', 260, 'Indie'),
  (4, 'Alone', 190, 'Acoustic');
"#;

/// (Re)create the demo database at `path`, replacing any existing file.
pub fn init_demo_db(path: &Path) -> Result<(), DbError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| DbError::Unavailable(e.to_string()))?;
    }
    if path.exists() {
        fs::remove_file(path).map_err(|e| DbError::Unavailable(e.to_string()))?;
    }

    let conn = Connection::open(path).map_err(|e| DbError::Unavailable(e.to_string()))?;
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute_batch(DATA_SQL)?;

    info!("Initialized demo DB at {}", path.display());
    Ok(())
}
