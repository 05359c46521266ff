//! Witness persistence
//!
//! The registry keeps its authoritative copy in a [`WitnessStore`]. Every
//! mutation is a single conditional statement inside one transaction, and the
//! affected-row count decides the outcome: a replacement that changed nothing
//! is reported as `NotFound`, never as success.

use crate::{RegistryError, Result};
use dagchain_domain::Address;
use rusqlite::{params, Connection, OpenFlags};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

/// Storage contract for the witness set
pub trait WitnessStore: Send + Sync {
    /// Load the persisted witnesses in registry order
    fn load(&self) -> Result<Vec<Address>>;

    /// Persist the bootstrap list. Fails if any witness is already stored.
    fn insert_initial(&self, witnesses: &[Address]) -> Result<()>;

    /// Substitute `new` for `old` in place.
    ///
    /// Fails with `DuplicateEntry` if `new` is present and `NotFound` if `old`
    /// is absent. Succeeds only if exactly one entry changed.
    fn replace(&self, old: &Address, new: &Address) -> Result<()>;
}

impl<S: WitnessStore + ?Sized> WitnessStore for std::sync::Arc<S> {
    fn load(&self) -> Result<Vec<Address>> {
        (**self).load()
    }

    fn insert_initial(&self, witnesses: &[Address]) -> Result<()> {
        (**self).insert_initial(witnesses)
    }

    fn replace(&self, old: &Address, new: &Address) -> Result<()> {
        (**self).replace(old, new)
    }
}

/// SQLite-backed witness store
pub struct SqliteWitnessStore {
    conn: Mutex<Connection>,
}

impl SqliteWitnessStore {
    /// Create or open a witness store at the specified path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Opening witness store");

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        Self::from_connection(conn)
    }

    /// In-memory SQLite database, mostly for tests
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS my_witnesses (
                position INTEGER PRIMARY KEY,
                address TEXT NOT NULL UNIQUE
            );
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RegistryError::Lock(e.to_string()))
    }
}

impl WitnessStore for SqliteWitnessStore {
    fn load(&self) -> Result<Vec<Address>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT address FROM my_witnesses ORDER BY position ASC")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|text| {
                Address::parse(&text).map_err(|e| {
                    RegistryError::Inconsistent(format!(
                        "persisted witness {:?} is not canonical: {}",
                        text, e
                    ))
                })
            })
            .collect()
    }

    fn insert_initial(&self, witnesses: &[Address]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let existing: i64 = tx.query_row("SELECT COUNT(*) FROM my_witnesses", [], |row| row.get(0))?;
        if existing != 0 {
            return Err(RegistryError::Inconsistent(format!(
                "witness store already holds {} entries",
                existing
            )));
        }

        for (position, address) in witnesses.iter().enumerate() {
            let inserted = tx
                .execute(
                    "INSERT INTO my_witnesses (position, address) VALUES (?1, ?2)",
                    params![position as i64, address.as_str()],
                )
                .map_err(|e| map_unique_violation(e, address))?;
            if inserted != 1 {
                return Err(RegistryError::Inconsistent(format!(
                    "insert of witness {} affected {} rows",
                    address, inserted
                )));
            }
        }

        tx.commit()?;
        debug!(count = witnesses.len(), "Initial witnesses persisted");
        Ok(())
    }

    fn replace(&self, old: &Address, new: &Address) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let changed = tx
            .execute(
                "UPDATE my_witnesses SET address = ?1 WHERE address = ?2",
                params![new.as_str(), old.as_str()],
            )
            .map_err(|e| map_unique_violation(e, new))?;

        match changed {
            0 => Err(RegistryError::NotFound {
                address: old.to_string(),
            }),
            1 => {
                tx.commit()?;
                Ok(())
            }
            n => Err(RegistryError::Inconsistent(format!(
                "replacing {} affected {} rows",
                old, n
            ))),
        }
    }
}

fn map_unique_violation(err: rusqlite::Error, address: &Address) -> RegistryError {
    match err {
        rusqlite::Error::SqliteFailure(ref code, _)
            if code.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            RegistryError::DuplicateEntry {
                address: address.to_string(),
            }
        }
        e => RegistryError::DatabaseError(e),
    }
}

/// Volatile witness store with the same contract as the SQLite one
#[derive(Default)]
pub struct MemoryWitnessStore {
    witnesses: Mutex<Vec<Address>>,
}

impl MemoryWitnessStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WitnessStore for MemoryWitnessStore {
    fn load(&self) -> Result<Vec<Address>> {
        let witnesses = self
            .witnesses
            .lock()
            .map_err(|e| RegistryError::Lock(e.to_string()))?;
        Ok(witnesses.clone())
    }

    fn insert_initial(&self, initial: &[Address]) -> Result<()> {
        let mut witnesses = self
            .witnesses
            .lock()
            .map_err(|e| RegistryError::Lock(e.to_string()))?;
        if !witnesses.is_empty() {
            return Err(RegistryError::Inconsistent(format!(
                "witness store already holds {} entries",
                witnesses.len()
            )));
        }
        witnesses.extend_from_slice(initial);
        Ok(())
    }

    fn replace(&self, old: &Address, new: &Address) -> Result<()> {
        let mut witnesses = self
            .witnesses
            .lock()
            .map_err(|e| RegistryError::Lock(e.to_string()))?;

        if witnesses.contains(new) {
            return Err(RegistryError::DuplicateEntry {
                address: new.to_string(),
            });
        }
        let slot = witnesses
            .iter_mut()
            .find(|w| *w == old)
            .ok_or_else(|| RegistryError::NotFound {
                address: old.to_string(),
            })?;
        *slot = new.clone();
        Ok(())
    }
}
