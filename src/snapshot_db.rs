use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, warn};

use crate::persist::SnapshotStore;
use crate::rating_store::{CompetitorRating, RatingSnapshot, SNAPSHOT_VERSION};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// SQLite-backed snapshot store. Each save replaces the previous snapshot in
/// a single transaction.
pub struct SqliteSnapshotStore {
    conn: Connection,
}

impl SqliteSnapshotStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn =
            Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    fn meta(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row("SELECT value FROM meta WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()
            .with_context(|| format!("query meta {key}"))
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS ratings (
            competitor_id TEXT PRIMARY KEY,
            ratings_json TEXT NOT NULL,
            uncertainties_json TEXT NOT NULL,
            last_updated TEXT NULL
        );
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

impl SnapshotStore for SqliteSnapshotStore {
    fn load(&self) -> Result<Option<RatingSnapshot>> {
        let Some(version) = self.meta("version")? else {
            return Ok(None);
        };
        let version: u32 = version.parse().context("parse snapshot version")?;
        if version != SNAPSHOT_VERSION {
            warn!(found = version, expected = SNAPSHOT_VERSION, "ignoring snapshot with other version");
            return Ok(None);
        }
        let components: Vec<String> = match self.meta("components")? {
            Some(raw) => serde_json::from_str(&raw).context("parse components")?,
            None => Vec::new(),
        };
        let taken_at = match self.meta("taken_at")? {
            Some(raw) => DateTime::parse_from_rfc3339(&raw)
                .context("parse taken_at")?
                .with_timezone(&Utc),
            None => Utc::now(),
        };

        let mut stmt = self
            .conn
            .prepare(
                "SELECT competitor_id, ratings_json, uncertainties_json, last_updated
                 FROM ratings ORDER BY competitor_id ASC",
            )
            .context("prepare load ratings query")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })
            .context("query ratings")?;

        let mut ratings = BTreeMap::new();
        for row in rows {
            let (id, ratings_json, uncertainties_json, last_updated) =
                row.context("decode rating row")?;
            let last_updated = last_updated
                .map(|d| NaiveDate::parse_from_str(&d, DATE_FORMAT))
                .transpose()
                .with_context(|| format!("parse last_updated for {id}"))?;
            let rating = CompetitorRating {
                competitor_id: id.clone(),
                ratings: serde_json::from_str(&ratings_json)
                    .with_context(|| format!("parse ratings for {id}"))?,
                uncertainties: serde_json::from_str(&uncertainties_json)
                    .with_context(|| format!("parse uncertainties for {id}"))?,
                last_updated,
            };
            ratings.insert(id, rating);
        }

        Ok(Some(RatingSnapshot {
            version,
            components,
            taken_at,
            ratings,
        }))
    }

    fn save(&self, snapshot: &RatingSnapshot) -> Result<()> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("begin snapshot transaction")?;
        tx.execute("DELETE FROM ratings", [])
            .context("clear ratings")?;
        {
            let mut insert = tx
                .prepare(
                    "INSERT INTO ratings (competitor_id, ratings_json, uncertainties_json, last_updated)
                     VALUES (?1, ?2, ?3, ?4)",
                )
                .context("prepare rating insert")?;
            for (id, rating) in &snapshot.ratings {
                insert
                    .execute(params![
                        id,
                        serde_json::to_string(&rating.ratings)?,
                        serde_json::to_string(&rating.uncertainties)?,
                        rating.last_updated.map(|d| d.format(DATE_FORMAT).to_string()),
                    ])
                    .with_context(|| format!("insert rating {id}"))?;
            }
        }
        for (key, value) in [
            ("version", snapshot.version.to_string()),
            ("components", serde_json::to_string(&snapshot.components)?),
            ("taken_at", snapshot.taken_at.to_rfc3339()),
        ] {
            tx.execute(
                "INSERT INTO meta (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )
            .with_context(|| format!("upsert meta {key}"))?;
        }
        tx.commit().context("commit snapshot transaction")?;
        debug!(competitors = snapshot.ratings.len(), "snapshot saved to sqlite");
        Ok(())
    }
}
