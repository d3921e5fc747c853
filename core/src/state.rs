//! Moderation state store: durable per-group feature flags. A flag is the string "true" when
//! enabled; any other value, or no row at all, means disabled.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::{Connection, OptionalExtension};

use crate::db;
use crate::error::StateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    VideoCheck,
    ImageCheck,
}

impl Feature {
    /// Key stored in the `feature` column.
    pub fn key(&self) -> &'static str {
        match self {
            Feature::VideoCheck => "videocheck",
            Feature::ImageCheck => "piccheck",
        }
    }
}

/// Which configured notice a toggle should announce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleNotice {
    Enabled,
    Disabled,
}

const ENABLED: &str = "true";
const DISABLED: &str = "false";

/// Constructed once at startup and shared by `Arc`. Every read-modify-write runs under the
/// connection mutex.
pub struct ModerationState {
    conn: Mutex<Connection>,
}

impl ModerationState {
    pub fn open(path: &Path) -> Result<Self, StateError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StateError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        Ok(Self {
            conn: Mutex::new(db::open_db(path)?),
        })
    }

    pub fn in_memory() -> Result<Self, StateError> {
        Ok(Self {
            conn: Mutex::new(db::open_in_memory()?),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stored flag, or "" when the group has no row for `feature`.
    pub fn read(&self, group_id: &str, feature: Feature) -> Result<String, StateError> {
        let conn = self.lock();
        read_value(&conn, group_id, feature)
    }

    /// True only when the stored flag is "true". Read errors count as disabled.
    pub fn is_enabled(&self, group_id: &str, feature: Feature) -> bool {
        match self.read(group_id, feature) {
            Ok(value) => value == ENABLED,
            Err(e) => {
                tracing::warn!(group_id, feature = feature.key(), error = %e, "state read failed, treating as disabled");
                false
            }
        }
    }

    pub fn write(&self, group_id: &str, feature: Feature, value: &str) -> Result<(), StateError> {
        let conn = self.lock();
        write_value(&conn, group_id, feature, value)
    }

    /// Flip "true" <-> anything else, persist, and report which notice to send.
    pub fn toggle(&self, group_id: &str, feature: Feature) -> Result<ToggleNotice, StateError> {
        let conn = self.lock();
        let current = read_value(&conn, group_id, feature)?;
        let (next, notice) = if current == ENABLED {
            (DISABLED, ToggleNotice::Disabled)
        } else {
            (ENABLED, ToggleNotice::Enabled)
        };
        write_value(&conn, group_id, feature, next)?;
        tracing::info!(group_id, feature = feature.key(), value = next, "feature toggled");
        Ok(notice)
    }
}

fn read_value(conn: &Connection, group_id: &str, feature: Feature) -> Result<String, StateError> {
    let value = conn
        .query_row(
            "SELECT value FROM group_features WHERE group_id = ?1 AND feature = ?2",
            rusqlite::params![group_id, feature.key()],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    Ok(value.unwrap_or_default())
}

fn write_value(conn: &Connection, group_id: &str, feature: Feature, value: &str) -> Result<(), StateError> {
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO group_features (group_id, feature, value, updated_at) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (group_id, feature) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        rusqlite::params![group_id, feature.key(), value, now],
    )?;
    Ok(())
}
