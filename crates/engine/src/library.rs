use crate::adapter;
use crate::config::{MAX_LAYOUTS, MAX_LAYOUT_NAME_CHARS};
use crate::error::LayoutError;
use crate::layout::sanitize_garden;
use crate::model::{GardenState, SavedLayout};
use crate::normalize::Normalizer;
use anyhow::Context;
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use time::OffsetDateTime;

pub const LAYOUTS_KEY: &str = "garden-layout-creator:layouts";
pub const LEGACY_LAYOUTS_KEY: &str = "gardenLayouts";

static ID_COUNTER: AtomicU64 = AtomicU64::new(1);

pub(crate) fn now_ms() -> i64 {
    let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    i64::try_from(nanos).unwrap_or(i64::MAX)
}

fn new_id(prefix: &str) -> String {
    let c = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{}-{c}", now_ms())
}

/// Saved layouts, most recent first, in a small SQLite file.
#[derive(Debug, Clone)]
pub struct LayoutLibrary {
    db_path: PathBuf,
    norm: Normalizer,
}

impl LayoutLibrary {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            norm: Normalizer::new(),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn open(&self) -> anyhow::Result<Connection> {
        let path = self.db_path.clone();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create db dir: {}", dir.display()))?;
        }

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("open sqlite db: {}", path.display()))?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        migrate(&conn)?;
        Ok(conn)
    }

    pub fn list(&self) -> anyhow::Result<Vec<SavedLayout>> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        let layouts = self.load_tx(&tx)?;
        tx.commit()?;
        Ok(layouts)
    }

    pub fn get(&self, id: &str) -> anyhow::Result<Option<SavedLayout>> {
        Ok(self.list()?.into_iter().find(|l| l.id == id))
    }

    /// Stores a sanitized copy of `garden` at the front of the list. The
    /// oldest entries beyond the cap are dropped.
    pub fn save(&self, name: &str, garden: &GardenState) -> anyhow::Result<SavedLayout> {
        let name = validate_name(name)?;
        let layout = SavedLayout {
            id: new_id("layout"),
            name,
            created_at: now_ms(),
            garden: sanitize_garden(garden, &self.norm),
        };
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        let mut layouts = self.load_tx(&tx)?;
        layouts.insert(0, layout.clone());
        layouts.truncate(MAX_LAYOUTS);
        store_tx(&tx, &layouts)?;
        append_event_tx(
            &tx,
            "layout.saved",
            Some(&layout.id),
            serde_json::json!({ "id": layout.id, "name": layout.name }),
        )?;
        tx.commit()?;
        tracing::info!(target: "garden_layout::library", id = %layout.id, "layout saved");
        Ok(layout)
    }

    pub fn rename(&self, id: &str, name: &str) -> anyhow::Result<SavedLayout> {
        let name = validate_name(name)?;
        self.modify(id, "layout.renamed", false, |layout| layout.name = name)
    }

    /// Replaces the garden of a saved layout and moves it to the front.
    pub fn update(&self, id: &str, garden: &GardenState) -> anyhow::Result<SavedLayout> {
        let garden = sanitize_garden(garden, &self.norm);
        self.modify(id, "layout.updated", true, |layout| layout.garden = garden)
    }

    fn modify(
        &self,
        id: &str,
        kind: &str,
        to_front: bool,
        change: impl FnOnce(&mut SavedLayout),
    ) -> anyhow::Result<SavedLayout> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        let mut layouts = self.load_tx(&tx)?;
        let pos = layouts
            .iter()
            .position(|l| l.id == id)
            .ok_or_else(|| LayoutError::NotFound(id.to_string()))?;
        let mut layout = layouts.remove(pos);
        change(&mut layout);
        if to_front {
            layouts.insert(0, layout.clone());
        } else {
            layouts.insert(pos, layout.clone());
        }
        store_tx(&tx, &layouts)?;
        append_event_tx(
            &tx,
            kind,
            Some(id),
            serde_json::json!({ "id": id, "name": layout.name }),
        )?;
        tx.commit()?;
        Ok(layout)
    }

    pub fn delete(&self, id: &str) -> anyhow::Result<bool> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        let mut layouts = self.load_tx(&tx)?;
        let before = layouts.len();
        layouts.retain(|l| l.id != id);
        let removed = layouts.len() < before;
        if removed {
            store_tx(&tx, &layouts)?;
            append_event_tx(&tx, "layout.deleted", Some(id), serde_json::json!({ "id": id }))?;
        }
        tx.commit()?;
        Ok(removed)
    }

    /// Pretty JSON array of saved layouts, optionally only the given ids.
    pub fn export(&self, ids: Option<&[String]>) -> anyhow::Result<String> {
        let mut layouts = self.list()?;
        if let Some(ids) = ids {
            layouts.retain(|l| ids.contains(&l.id));
        }
        serde_json::to_string_pretty(&layouts).context("serialize layouts")
    }

    /// Adds layouts from an export file in front of the existing ones.
    /// Entries whose id is already taken get a fresh one.
    pub fn import(&self, text: &str) -> anyhow::Result<Vec<SavedLayout>> {
        let text = text.trim();
        if text.is_empty() {
            return Err(LayoutError::EmptyImport.into());
        }
        let value: Value =
            serde_json::from_str(text).map_err(|e| LayoutError::InvalidJson(e.to_string()))?;
        let mut incoming = layouts_from_value(&value, &self.norm);
        if incoming.is_empty() {
            return Err(LayoutError::NoLayouts.into());
        }

        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        let existing = self.load_tx(&tx)?;
        let mut taken: HashSet<String> = existing.iter().map(|l| l.id.clone()).collect();
        for layout in &mut incoming {
            if !taken.insert(layout.id.clone()) {
                layout.id = new_id("layout");
                taken.insert(layout.id.clone());
            }
        }
        let mut layouts = incoming.clone();
        layouts.extend(existing);
        layouts.truncate(MAX_LAYOUTS);
        store_tx(&tx, &layouts)?;
        append_event_tx(
            &tx,
            "layout.imported",
            None,
            serde_json::json!({ "count": incoming.len() }),
        )?;
        tx.commit()?;
        Ok(incoming)
    }

    pub fn rev(&self) -> anyhow::Result<i64> {
        let conn = self.open()?;
        let rev: Option<i64> =
            conn.query_row("SELECT MAX(seq) FROM event_log", [], |row| row.get(0))?;
        Ok(rev.unwrap_or(0))
    }

    fn load_tx(&self, tx: &rusqlite::Transaction<'_>) -> anyhow::Result<Vec<SavedLayout>> {
        if let Some(raw) = read_kv(tx, LAYOUTS_KEY)? {
            return Ok(layouts_from_json(&raw, &self.norm));
        }
        let Some(raw) = read_kv(tx, LEGACY_LAYOUTS_KEY)? else {
            return Ok(Vec::new());
        };
        let mut layouts = layouts_from_json(&raw, &self.norm);
        layouts.truncate(MAX_LAYOUTS);
        store_tx(tx, &layouts)?;
        tx.execute("DELETE FROM kv WHERE key = ?1", [LEGACY_LAYOUTS_KEY])?;
        tracing::info!(
            target: "garden_layout::library",
            count = layouts.len(),
            "migrated legacy layouts"
        );
        Ok(layouts)
    }
}

fn validate_name(name: &str) -> Result<String, LayoutError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(LayoutError::EmptyName);
    }
    if name.chars().count() > MAX_LAYOUT_NAME_CHARS {
        return Err(LayoutError::NameTooLong {
            max: MAX_LAYOUT_NAME_CHARS,
        });
    }
    Ok(name.to_string())
}

fn layouts_from_json(raw: &str, norm: &Normalizer) -> Vec<SavedLayout> {
    match serde_json::from_str::<Value>(raw) {
        Ok(v) => layouts_from_value(&v, norm),
        Err(e) => {
            tracing::warn!(target: "garden_layout::library", error = %e, "stored layouts unreadable");
            Vec::new()
        }
    }
}

/// Lenient reader for stored lists and import files: a bare array, a
/// `{layouts: [...]}` wrapper or a single layout object. Entries without a
/// garden are skipped; a missing id or `createdAt` is filled in.
pub fn layouts_from_value(v: &Value, norm: &Normalizer) -> Vec<SavedLayout> {
    let entries: Vec<&Value> = match v {
        Value::Array(items) => items.iter().collect(),
        Value::Object(obj) => match obj.get("layouts") {
            Some(Value::Array(items)) => items.iter().collect(),
            _ => vec![v],
        },
        _ => Vec::new(),
    };
    entries
        .into_iter()
        .filter_map(|entry| {
            let garden = adapter::garden_from_value(entry)?;
            let id = entry
                .get("id")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map_or_else(|| new_id("layout"), str::to_string);
            let name = entry
                .get("name")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| s.chars().take(MAX_LAYOUT_NAME_CHARS).collect())
                .unwrap_or_else(|| "Imported layout".to_string());
            let created_at = entry
                .get("createdAt")
                .and_then(Value::as_i64)
                .unwrap_or_else(now_ms);
            Some(SavedLayout {
                id,
                name,
                created_at,
                garden: sanitize_garden(&garden, norm),
            })
        })
        .collect()
}

fn read_kv(tx: &rusqlite::Transaction<'_>, key: &str) -> anyhow::Result<Option<String>> {
    tx.query_row("SELECT value_json FROM kv WHERE key = ?1", [key], |row| {
        row.get(0)
    })
    .optional()
    .with_context(|| format!("read kv {key}"))
}

fn store_tx(tx: &rusqlite::Transaction<'_>, layouts: &[SavedLayout]) -> anyhow::Result<()> {
    let json = serde_json::to_string(layouts).context("serialize layouts")?;
    tx.execute(
        "INSERT INTO kv (key, value_json, updated_at_ms) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json, updated_at_ms = excluded.updated_at_ms",
        (LAYOUTS_KEY, json, now_ms()),
    )?;
    Ok(())
}

fn migrate(conn: &Connection) -> anyhow::Result<()> {
    let v: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if v < 1 {
        conn.execute_batch(
            r#"
CREATE TABLE IF NOT EXISTS kv (
  key TEXT PRIMARY KEY,
  value_json TEXT NOT NULL,
  updated_at_ms INTEGER NOT NULL
);

-- Monotonic revision source for UI sync.
CREATE TABLE IF NOT EXISTS event_log (
  seq INTEGER PRIMARY KEY AUTOINCREMENT,
  ts_ms INTEGER NOT NULL,
  kind TEXT NOT NULL,
  layout_id TEXT,
  payload_json TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS idx_event_log_kind ON event_log(kind);
"#,
        )?;

        conn.pragma_update(None, "user_version", 1_i64)?;
    }

    Ok(())
}

fn append_event_tx(
    tx: &rusqlite::Transaction<'_>,
    kind: &str,
    layout_id: Option<&str>,
    payload: Value,
) -> anyhow::Result<i64> {
    let payload_json = payload.to_string();
    tx.execute(
        "INSERT INTO event_log (ts_ms, kind, layout_id, payload_json) VALUES (?1, ?2, ?3, ?4)",
        (now_ms(), kind, layout_id, payload_json),
    )?;
    Ok(tx.last_insert_rowid())
}

/// Seeds the legacy flat key, as an older install would have left it.
#[cfg(test)]
pub(crate) fn write_legacy(library: &LayoutLibrary, raw: &str) -> anyhow::Result<()> {
    let conn = library.open()?;
    conn.execute(
        "INSERT OR REPLACE INTO kv (key, value_json, updated_at_ms) VALUES (?1, ?2, ?3)",
        (LEGACY_LAYOUTS_KEY, raw, now_ms()),
    )?;
    Ok(())
}
