// src/db/mod.rs

//! Persistent store for the build model
//!
//! All durable state lives in one SQLite database. `Database` owns the
//! connection and supplies the primitives the managers build on:
//! savepoint-scoped atomic operations, the fast/safe durability toggle,
//! save-as, and purge-on-close of trashed entities.

pub mod builtins;
pub mod schema;

pub use builtins::Builtins;

use crate::error::{Error, Result};
use rusqlite::{Connection, OptionalExtension, params};
use std::cell::Cell;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Handle on an open build store database
#[derive(Debug)]
pub struct Database {
    conn: Connection,
    path: Option<PathBuf>,
    fast: Cell<bool>,
}

impl Database {
    /// Open (or create) a store at `path`
    ///
    /// A brand-new file is initialised at the current schema version. An
    /// existing file must already be at exactly the current version; older
    /// stores need `upgrade` first.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init_connection(&conn)?;
        info!("Opened build store at {}", path.display());
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
            fast: Cell::new(false),
        })
    }

    /// Open a transient store that lives only in memory
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(&conn)?;
        Ok(Self {
            conn,
            path: None,
            fast: Cell::new(false),
        })
    }

    fn init_connection(conn: &Connection) -> Result<()> {
        let version = schema::get_schema_version(conn)?;
        if version == 0 {
            schema::migrate(conn)?;
        } else if version != schema::SCHEMA_VERSION {
            return Err(Error::SchemaVersion {
                found: version,
                expected: schema::SCHEMA_VERSION,
            });
        }
        Ok(())
    }

    /// Bring an older store up to the current schema version
    ///
    /// Returns the version the store was at before the upgrade.
    pub fn upgrade(path: &Path) -> Result<i32> {
        let conn = Connection::open(path)?;
        let version = schema::get_schema_version(&conn)?;
        schema::migrate(&conn)?;
        info!(
            "Upgraded {} from schema version {} to {}",
            path.display(),
            version,
            schema::SCHEMA_VERSION
        );
        Ok(version)
    }

    /// The underlying connection, for read-only queries
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Location of the store on disk (`None` for in-memory stores)
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run `f` so that either all of its changes apply or none do
    ///
    /// Implemented with a savepoint, so it nests inside the long transaction
    /// of fast access mode as well as inside another `atomic` call.
    pub fn atomic<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        self.conn.execute_batch("SAVEPOINT buildstore_op")?;
        match f(&self.conn) {
            Ok(value) => {
                self.conn.execute_batch("RELEASE buildstore_op")?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = self
                    .conn
                    .execute_batch("ROLLBACK TO buildstore_op; RELEASE buildstore_op")
                {
                    warn!("Failed to roll back rejected operation: {}", rollback);
                }
                Err(e)
            }
        }
    }

    /// Switch between fast (deferred durability) and safe (commit per
    /// mutation) modes
    ///
    /// Fast mode holds one transaction open with fsync disabled until it is
    /// switched off again. Use it only for work the caller can replay.
    pub fn set_fast_access_mode(&self, fast: bool) -> Result<()> {
        if fast == self.fast.get() {
            return Ok(());
        }
        if fast {
            self.conn.execute_batch("PRAGMA synchronous = OFF; BEGIN")?;
        } else {
            self.conn.execute_batch("COMMIT; PRAGMA synchronous = FULL")?;
        }
        self.fast.set(fast);
        info!("Fast access mode {}", if fast { "enabled" } else { "disabled" });
        Ok(())
    }

    pub fn is_fast_access_mode(&self) -> bool {
        self.fast.get()
    }

    /// Write a complete copy of the store to `dest`
    ///
    /// Any pending fast-mode work is committed first. An existing file at
    /// `dest` is replaced.
    pub fn save_as(&self, dest: &Path) -> Result<()> {
        let was_fast = self.is_fast_access_mode();
        self.set_fast_access_mode(false)?;

        if dest.exists() {
            std::fs::remove_file(dest)?;
        }
        let dest_str = dest.to_string_lossy().replace('\'', "''");
        self.conn
            .execute_batch(&format!("VACUUM INTO '{}'", dest_str))?;
        info!("Saved build store to {}", dest.display());

        self.set_fast_access_mode(was_fast)
    }

    /// Permanently delete every trashed path, action and sub-package
    ///
    /// Returns the number of entities removed.
    pub fn purge_trash(&self) -> Result<usize> {
        self.atomic(|conn| {
            // Access records of trashed actions go with them
            conn.execute(
                "DELETE FROM action_files WHERE action_id IN
                    (SELECT id FROM build_actions WHERE trashed = 1)",
                [],
            )?;
            conn.execute(
                "DELETE FROM slot_values WHERE owner_type = 1 AND owner_id IN
                    (SELECT id FROM build_actions WHERE trashed = 1)",
                [],
            )?;
            conn.execute(
                "DELETE FROM package_members WHERE member_type = 3 AND member_id IN
                    (SELECT id FROM build_actions WHERE trashed = 1)",
                [],
            )?;
            let actions = conn.execute("DELETE FROM build_actions WHERE trashed = 1", [])?;

            conn.execute(
                "DELETE FROM slot_values WHERE owner_type = 2 AND owner_id IN
                    (SELECT id FROM sub_packages WHERE trashed = 1)",
                [],
            )?;
            conn.execute(
                "DELETE FROM package_members WHERE member_type = 4 AND member_id IN
                    (SELECT id FROM sub_packages WHERE trashed = 1)",
                [],
            )?;
            let sub_packages = conn.execute("DELETE FROM sub_packages WHERE trashed = 1", [])?;

            conn.execute(
                "DELETE FROM package_members WHERE member_type = 1 AND member_id IN
                    (SELECT id FROM files WHERE trashed = 1)",
                [],
            )?;
            let paths = conn.execute("DELETE FROM files WHERE trashed = 1", [])?;

            debug!(
                "Purged {} paths, {} actions, {} sub-packages",
                paths, actions, sub_packages
            );
            Ok(paths + actions + sub_packages)
        })
    }

    /// Read a store-wide setting
    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Write (or clear, with `None`) a store-wide setting
    pub fn set_setting(&self, key: &str, value: Option<&str>) -> Result<()> {
        match value {
            Some(value) => self.conn.execute(
                "INSERT INTO settings (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )?,
            None => self
                .conn
                .execute("DELETE FROM settings WHERE key = ?1", [key])?,
        };
        Ok(())
    }

    /// Purge the trash, commit outstanding work and close the database
    pub fn close(self) -> Result<()> {
        self.set_fast_access_mode(false)?;
        let purged = self.purge_trash()?;
        info!("Closing build store ({} trashed entities purged)", purged);
        self.conn.close().map_err(|(_, e)| Error::Database(e))
    }
}
