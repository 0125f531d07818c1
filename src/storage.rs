use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Preferences;
use crate::error::Result;
use crate::lessons::{CustomLesson, LessonGraph};
use crate::stats::StatisticsState;

/// Fixed identifier the whole blob is stored under.
pub const STORAGE_KEY: &str = "typingflow-storage";

/// Everything that survives a restart, written as one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    pub lessons: LessonGraph,
    #[serde(default)]
    pub custom_lessons: Vec<CustomLesson>,
    #[serde(default)]
    pub statistics: StatisticsState,
    #[serde(default)]
    pub preferences: Preferences,
}

impl PersistedState {
    pub fn initial(lessons: LessonGraph) -> Self {
        Self {
            lessons,
            custom_lessons: Vec::new(),
            statistics: StatisticsState::default(),
            preferences: Preferences::default(),
        }
    }
}

/// Whole-blob persistence. `load` yields `None` when nothing was saved yet.
pub trait Storage {
    fn load(&self) -> Result<Option<PersistedState>>;
    fn save(&self, state: &PersistedState) -> Result<()>;
}

impl<S: Storage + ?Sized> Storage for std::rc::Rc<S> {
    fn load(&self) -> Result<Option<PersistedState>> {
        (**self).load()
    }

    fn save(&self, state: &PersistedState) -> Result<()> {
        (**self).save(state)
    }
}

/// JSON document on disk, replaced atomically on every save.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Storage for JsonFileStorage {
    fn load(&self) -> Result<Option<PersistedState>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&self.path)?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    fn save(&self, state: &PersistedState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Key/value table in SQLite holding the blob under [`STORAGE_KEY`].
#[derive(Debug)]
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            [],
        )?;
        Ok(Self { conn })
    }
}

impl Storage for SqliteStorage {
    fn load(&self) -> Result<Option<PersistedState>> {
        let blob: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                [STORAGE_KEY],
                |row| row.get(0),
            )
            .optional()?;

        match blob {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    fn save(&self, state: &PersistedState) -> Result<()> {
        let text = serde_json::to_string(state)?;
        self.conn.execute(
            r#"
            INSERT INTO kv_store (key, value, updated_at)
            VALUES (?1, ?2, CURRENT_TIMESTAMP)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
            params![STORAGE_KEY, text],
        )?;
        Ok(())
    }
}

/// Process-local storage for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    blob: RefCell<Option<String>>,
    fail_writes: bool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage whose every save fails, to exercise degraded mode.
    pub fn failing() -> Self {
        Self {
            blob: RefCell::new(None),
            fail_writes: true,
        }
    }

    pub fn with_blob(blob: &str) -> Self {
        Self {
            blob: RefCell::new(Some(blob.to_string())),
            fail_writes: false,
        }
    }

    pub fn blob(&self) -> Option<String> {
        self.blob.borrow().clone()
    }
}

impl Storage for MemoryStorage {
    fn load(&self) -> Result<Option<PersistedState>> {
        match self.blob.borrow().as_deref() {
            Some(text) => Ok(Some(serde_json::from_str(text)?)),
            None => Ok(None),
        }
    }

    fn save(&self, state: &PersistedState) -> Result<()> {
        if self.fail_writes {
            return Err(std::io::Error::other("storage quota exceeded").into());
        }
        *self.blob.borrow_mut() = Some(serde_json::to_string(state)?);
        Ok(())
    }
}
