// src/files/includes.rs

//! Include relationships between files
//!
//! Each (includer, included) pair carries a usage count that grows every
//! time the relationship is observed.

use crate::db::Database;
use crate::error::{Error, Result};
use rusqlite::{OptionalExtension, params};
use std::rc::Rc;
use tracing::debug;

pub struct FileIncludeMgr {
    db: Rc<Database>,
}

impl FileIncludeMgr {
    pub fn new(db: Rc<Database>) -> Self {
        Self { db }
    }

    /// Record that `includer` includes `included`
    pub fn add_file_includes(&self, includer: i32, included: i32) -> Result<()> {
        self.db.atomic(|conn| {
            for id in [includer, included] {
                let live: Option<bool> = conn
                    .query_row(
                        "SELECT trashed = 0 FROM files WHERE id = ?1",
                        [id],
                        |row| row.get(0),
                    )
                    .optional()?;
                if live != Some(true) {
                    return Err(Error::NotFound(format!("path {}", id)));
                }
            }
            conn.execute(
                "INSERT INTO file_includes (file_id1, file_id2, usage_count) VALUES (?1, ?2, 1)
                 ON CONFLICT(file_id1, file_id2) DO UPDATE SET usage_count = usage_count + 1",
                params![includer, included],
            )?;
            Ok(())
        })?;
        debug!("Path {} includes path {}", includer, included);
        Ok(())
    }

    /// Number of times `includer` was seen including `included` (0 if never)
    pub fn get_file_includes_count(&self, includer: i32, included: i32) -> Result<i32> {
        let count = self
            .db
            .conn()
            .query_row(
                "SELECT usage_count FROM file_includes WHERE file_id1 = ?1 AND file_id2 = ?2",
                params![includer, included],
                |row| row.get(0),
            )
            .optional()?;
        Ok(count.unwrap_or(0))
    }

    /// Files that include `included`
    pub fn get_files_that_include(&self, included: i32) -> Result<Vec<i32>> {
        let mut stmt = self.db.conn().prepare(
            "SELECT file_id1 FROM file_includes WHERE file_id2 = ?1 ORDER BY file_id1",
        )?;
        let ids = stmt
            .query_map([included], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i32>>>()?;
        Ok(ids)
    }

    /// Files included by `includer`
    pub fn get_files_included_by(&self, includer: i32) -> Result<Vec<i32>> {
        let mut stmt = self.db.conn().prepare(
            "SELECT file_id2 FROM file_includes WHERE file_id1 = ?1 ORDER BY file_id2",
        )?;
        let ids = stmt
            .query_map([includer], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i32>>>()?;
        Ok(ids)
    }

    /// Forget everything `includer` includes
    pub fn delete_files_included_by(&self, includer: i32) -> Result<usize> {
        let removed = self.db.atomic(|conn| {
            Ok(conn.execute("DELETE FROM file_includes WHERE file_id1 = ?1", [includer])?)
        })?;
        debug!("Removed {} include relationships of path {}", removed, includer);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Rc<Database>, FileIncludeMgr) {
        let db = Rc::new(Database::open_in_memory().unwrap());
        db.conn()
            .execute_batch(
                "INSERT INTO files (id, parent_id, path_type, name) VALUES (1, 0, 2, 'a.c');
                 INSERT INTO files (id, parent_id, path_type, name) VALUES (2, 0, 2, 'a.h');
                 INSERT INTO files (id, parent_id, path_type, name) VALUES (3, 0, 2, 'b.c');",
            )
            .unwrap();
        let mgr = FileIncludeMgr::new(db.clone());
        (db, mgr)
    }

    #[test]
    fn test_usage_count_accumulates() {
        let (_db, mgr) = setup();
        mgr.add_file_includes(1, 2).unwrap();
        mgr.add_file_includes(1, 2).unwrap();
        mgr.add_file_includes(3, 2).unwrap();

        assert_eq!(mgr.get_file_includes_count(1, 2).unwrap(), 2);
        assert_eq!(mgr.get_file_includes_count(2, 1).unwrap(), 0);
        assert_eq!(mgr.get_files_that_include(2).unwrap(), vec![1, 3]);
        assert_eq!(mgr.get_files_included_by(1).unwrap(), vec![2]);
    }

    #[test]
    fn test_delete_includes() {
        let (_db, mgr) = setup();
        mgr.add_file_includes(1, 2).unwrap();
        mgr.add_file_includes(1, 3).unwrap();

        assert_eq!(mgr.delete_files_included_by(1).unwrap(), 2);
        assert!(mgr.get_files_included_by(1).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_path_rejected() {
        let (_db, mgr) = setup();
        assert!(matches!(mgr.add_file_includes(1, 99), Err(Error::NotFound(_))));
    }
}
