//! SQLite Unit Store
//!
//! Durable, append-only storage for units:
//! - WAL journal mode for durability
//! - Units are inserted once with their derived properties and never updated,
//!   except for the one-way stable flag
//! - Parent edges are kept in a separate table for child lookups
//!
//! # Schema
//!
//! `units` holds one row per unit: insertion sequence, level, witnessed level,
//! best parent, effective witness list and the serialized unit body.
//! `main_chain_index` and `is_on_main_chain` are written only when the unit
//! becomes stable; non-stable assignments are recomputed in memory.

use crate::store::{StableAssignment, UnitStore};
use crate::{ConsensusError, Result};
use dagchain_domain::{Address, Unit, UnitHash, UnitProps};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Unit store with SQLite backend
pub struct SqliteUnitStore {
    conn: Mutex<Connection>,
}

impl SqliteUnitStore {
    /// Create or open a unit store at the specified path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        info!(path = %path.display(), "Opening unit store");

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

        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS units (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                unit TEXT NOT NULL UNIQUE,
                level INTEGER NOT NULL,
                witnessed_level INTEGER NOT NULL,
                best_parent TEXT,
                witnesses TEXT NOT NULL,
                body TEXT NOT NULL,
                main_chain_index INTEGER,
                is_on_main_chain INTEGER NOT NULL DEFAULT 0,
                is_stable INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS parenthoods (
                child_unit TEXT NOT NULL,
                parent_unit TEXT NOT NULL,
                PRIMARY KEY (child_unit, parent_unit)
            );

            CREATE INDEX IF NOT EXISTS idx_parent_unit ON parenthoods(parent_unit);
            CREATE INDEX IF NOT EXISTS idx_mci ON units(main_chain_index);
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| ConsensusError::Lock(e.to_string()))
    }

    fn read_row(conn: &Connection, unit: &str) -> Result<(Unit, UnitProps)> {
        let row = conn
            .query_row(
                r#"
                SELECT body, level, witnessed_level, best_parent, witnesses
                FROM units
                WHERE unit = ?1
                "#,
                [unit],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)? as u64,
                        row.get::<_, i64>(2)? as u64,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?
            .ok_or_else(|| ConsensusError::NotFound {
                unit: unit.to_string(),
            })?;

        Self::decode_row(row)
    }

    fn decode_row(
        (body, level, witnessed_level, best_parent, witnesses): (
            String,
            u64,
            u64,
            Option<String>,
            String,
        ),
    ) -> Result<(Unit, UnitProps)> {
        let unit: Unit = serde_json::from_str(&body)?;
        let witnesses: Vec<Address> = serde_json::from_str(&witnesses)?;
        let props = UnitProps {
            unit: unit.unit.clone(),
            level,
            witnessed_level,
            best_parent,
            witnesses,
            authors: unit.authors.clone(),
        };
        Ok((unit, props))
    }
}

impl UnitStore for SqliteUnitStore {
    fn get_unit(&self, unit: &str) -> Result<Unit> {
        let conn = self.conn()?;
        Ok(Self::read_row(&conn, unit)?.0)
    }

    fn get_parents(&self, unit: &str) -> Result<Vec<UnitHash>> {
        let conn = self.conn()?;
        // distinguish "no parents" (genesis) from "unknown unit"
        Self::read_row(&conn, unit)?;

        let mut stmt = conn.prepare(
            "SELECT parent_unit FROM parenthoods WHERE child_unit = ?1 ORDER BY parent_unit ASC",
        )?;
        let parents = stmt
            .query_map([unit], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(parents)
    }

    fn get_declared_witnesses(&self, unit: &str) -> Result<Vec<Address>> {
        Ok(self.get_unit(unit)?.witnesses.unwrap_or_default())
    }

    fn get_props(&self, unit: &str) -> Result<UnitProps> {
        let conn = self.conn()?;
        Ok(Self::read_row(&conn, unit)?.1)
    }

    fn contains(&self, unit: &str) -> Result<bool> {
        let conn = self.conn()?;
        let found = conn
            .query_row("SELECT 1 FROM units WHERE unit = ?1", [unit], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    fn insert(&self, unit: &Unit, props: &UnitProps) -> Result<()> {
        let body = serde_json::to_string(unit)?;
        let witnesses = serde_json::to_string(&props.witnesses)?;

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let inserted = tx
            .execute(
                r#"
                INSERT INTO units (unit, level, witnessed_level, best_parent, witnesses, body)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    unit.unit,
                    props.level as i64,
                    props.witnessed_level as i64,
                    props.best_parent,
                    witnesses,
                    body,
                ],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(ref f, _)
                    if f.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    ConsensusError::Inconsistent(format!("unit {} already stored", unit.unit))
                }
                e => ConsensusError::DatabaseError(e),
            })?;
        if inserted != 1 {
            return Err(ConsensusError::Inconsistent(format!(
                "insert of unit {} affected {} rows",
                unit.unit, inserted
            )));
        }

        for parent in &unit.parent_units {
            tx.execute(
                "INSERT INTO parenthoods (child_unit, parent_unit) VALUES (?1, ?2)",
                params![unit.unit, parent],
            )?;
        }

        tx.commit()?;

        debug!(unit = %unit.unit, level = props.level, "Unit stored");
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<(Unit, UnitProps)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT body, level, witnessed_level, best_parent, witnesses
            FROM units
            ORDER BY seq ASC
            "#,
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)? as u64,
                    row.get::<_, i64>(2)? as u64,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter().map(Self::decode_row).collect()
    }

    fn mark_stable(&self, mci: u64, main_chain_unit: &str, units: &[UnitHash]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        for unit in units {
            let changed = tx.execute(
                r#"
                UPDATE units
                SET is_stable = 1, main_chain_index = ?1, is_on_main_chain = ?2
                WHERE unit = ?3 AND is_stable = 0
                "#,
                params![mci as i64, (unit == main_chain_unit) as i64, unit],
            )?;
            if changed != 1 {
                return Err(ConsensusError::Inconsistent(format!(
                    "cannot mark unit {} stable at mci {}",
                    unit, mci
                )));
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn stable_assignments(&self) -> Result<Vec<StableAssignment>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT unit, main_chain_index, is_on_main_chain
            FROM units
            WHERE is_stable = 1
            ORDER BY main_chain_index ASC, unit ASC
            "#,
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok(StableAssignment {
                    unit: row.get(0)?,
                    main_chain_index: row.get::<_, i64>(1)? as u64,
                    is_on_main_chain: row.get::<_, i64>(2)? != 0,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
