// src/reports/mod.rs

//! Report engine
//!
//! Read-only queries across paths, actions and packages. Trashed paths and
//! actions never appear in report results.

mod sets;

pub use sets::{ActionSet, Actions, FileSet, Files, IdSet, PackageSet};

use crate::actions::{ActionMgr, OperationType};
use crate::db::{Builtins, Database};
use crate::error::{Error, Result};
use crate::files::PathType;
use crate::packages::PackageMemberMgr;
use glob::Pattern;
use rusqlite::params;
use std::rc::Rc;
use tracing::debug;

/// Operations that count as reading a path
const READ_OPS: [OperationType; 2] = [OperationType::Read, OperationType::Modified];

/// Operations that count as producing a path
const WRITE_OPS: [OperationType; 2] = [OperationType::Write, OperationType::Modified];

/// A path with the number of times it was seen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountedPath {
    pub path: i32,
    pub count: i32,
}

pub struct ReportMgr {
    db: Rc<Database>,
    builtins: Builtins,
    actions: Rc<ActionMgr>,
    members: Rc<PackageMemberMgr>,
}

impl ReportMgr {
    pub fn new(
        db: Rc<Database>,
        builtins: Builtins,
        actions: Rc<ActionMgr>,
        members: Rc<PackageMemberMgr>,
    ) -> Self {
        Self {
            db,
            builtins,
            actions,
            members,
        }
    }

    /// Files accessed by the most actions, busiest first
    pub fn report_most_common_accesses(&self, limit: usize) -> Result<Vec<CountedPath>> {
        let mut stmt = self.db.conn().prepare(
            "SELECT a.file_id, COUNT(*) AS uses FROM action_files a
                JOIN files f ON f.id = a.file_id
                JOIN build_actions b ON b.id = a.action_id
             WHERE f.trashed = 0 AND b.trashed = 0
             GROUP BY a.file_id
             ORDER BY uses DESC, a.file_id
             LIMIT ?1",
        )?;
        let rows = stmt
            .query_map([limit as i64], |row| {
                Ok(CountedPath {
                    path: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Files that include `file`, most frequent includer first
    pub fn report_most_common_includers_of_file(&self, file: i32) -> Result<Vec<CountedPath>> {
        let mut stmt = self.db.conn().prepare(
            "SELECT i.file_id1, i.usage_count FROM file_includes i
                JOIN files f ON f.id = i.file_id1
             WHERE i.file_id2 = ?1 AND f.trashed = 0
             ORDER BY i.usage_count DESC, i.file_id1",
        )?;
        let rows = stmt
            .query_map([file], |row| {
                Ok(CountedPath {
                    path: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Non-directory paths no action ever touched
    pub fn report_files_never_accessed(&self) -> Result<FileSet> {
        self.collect_files(
            "SELECT f.id FROM files f
             WHERE f.trashed = 0 AND f.path_type != ?1
               AND NOT EXISTS (SELECT 1 FROM action_files a WHERE a.file_id = f.id)",
            params![PathType::Directory.as_i32()],
        )
    }

    /// Non-directory paths whose base name matches a glob pattern
    pub fn report_files_that_match(&self, pattern: &str) -> Result<FileSet> {
        let pattern = compile(pattern)?;
        let mut stmt = self
            .db
            .conn()
            .prepare("SELECT id, name FROM files WHERE trashed = 0 AND path_type != ?1")?;
        let rows = stmt
            .query_map([PathType::Directory.as_i32()], |row| {
                Ok((row.get::<_, i32>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows
            .into_iter()
            .filter(|(_, name)| pattern.matches(name))
            .map(|(id, _)| id)
            .collect())
    }

    /// Actions whose command text matches a glob pattern
    pub fn report_actions_that_match(&self, pattern: &str) -> Result<ActionSet> {
        let pattern = compile(pattern)?;
        let mut stmt = self.db.conn().prepare(
            "SELECT b.id, v.value FROM build_actions b
                JOIN slot_values v ON v.owner_type = 1 AND v.owner_id = b.id AND v.slot_id = ?1
             WHERE b.trashed = 0",
        )?;
        let rows = stmt
            .query_map([self.builtins.command_slot], |row| {
                Ok((row.get::<_, i32>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows
            .into_iter()
            .filter(|(_, command)| pattern.matches(command))
            .map(|(id, _)| id)
            .collect())
    }

    /// Files some action wrote that no action reads
    pub fn report_write_only_files(&self) -> Result<FileSet> {
        self.collect_files(
            "SELECT DISTINCT a.file_id FROM action_files a
                JOIN files f ON f.id = a.file_id
                JOIN build_actions b ON b.id = a.action_id
             WHERE f.trashed = 0 AND b.trashed = 0 AND a.operation = ?1
               AND NOT EXISTS (
                   SELECT 1 FROM action_files r JOIN build_actions rb ON rb.id = r.action_id
                   WHERE r.file_id = a.file_id AND rb.trashed = 0 AND r.operation IN (?2, ?3))",
            params![
                OperationType::Write.as_i32(),
                READ_OPS[0].as_i32(),
                READ_OPS[1].as_i32()
            ],
        )
    }

    /// Files produced from `files`
    ///
    /// One step finds the live actions that read the current frontier and
    /// the live files those actions write. With `indirect` the step repeats
    /// on each new frontier until nothing new turns up.
    ///
    /// Files in `files` are never reported, even when one of them is
    /// produced from another: starting from `{a.c, a.o}` where `a.c`
    /// compiles to `a.o` and `a.o` links to `prog` yields only `{prog}`.
    pub fn report_derived_files(&self, files: &FileSet, indirect: bool) -> Result<FileSet> {
        self.closure(files, &READ_OPS, &WRITE_OPS, indirect)
    }

    /// Files `files` were produced from; the mirror of `report_derived_files`
    ///
    /// Files in `files` are never reported, even when one of them was an
    /// input of another.
    pub fn report_input_files(&self, files: &FileSet, indirect: bool) -> Result<FileSet> {
        self.closure(files, &WRITE_OPS, &READ_OPS, indirect)
    }

    fn closure(
        &self,
        start: &FileSet,
        via: &[OperationType; 2],
        produce: &[OperationType; 2],
        indirect: bool,
    ) -> Result<FileSet> {
        let mut result = FileSet::new();
        let mut frontier: Vec<i32> = start.to_vec();
        let mut iterations = 0;

        while !frontier.is_empty() {
            iterations += 1;
            let mut next = Vec::new();
            for produced in self.closure_step(&frontier, via, produce)? {
                if !start.contains(produced) && result.add(produced) {
                    next.push(produced);
                }
            }
            if !indirect {
                break;
            }
            frontier = next;
        }

        debug!(
            "Closure over {} paths reached {} paths in {} iterations",
            start.len(),
            result.len(),
            iterations
        );
        Ok(result)
    }

    /// Live files touched with `produce` by live actions that touched any of
    /// `frontier` with `via`, in a single query
    fn closure_step(
        &self,
        frontier: &[i32],
        via: &[OperationType; 2],
        produce: &[OperationType; 2],
    ) -> Result<Vec<i32>> {
        let ids = serde_json::to_string(frontier)
            .map_err(|e| Error::BadValue(format!("frontier ids: {}", e)))?;
        let mut stmt = self.db.conn().prepare_cached(
            "SELECT DISTINCT o.file_id FROM action_files i
                JOIN build_actions b ON b.id = i.action_id
                JOIN action_files o ON o.action_id = i.action_id
                JOIN files f ON f.id = o.file_id
             WHERE i.file_id IN (SELECT value FROM json_each(?1))
               AND i.operation IN (?2, ?3) AND b.trashed = 0
               AND o.operation IN (?4, ?5) AND f.trashed = 0
             ORDER BY o.file_id",
        )?;
        let files = stmt
            .query_map(
                params![
                    ids,
                    via[0].as_i32(),
                    via[1].as_i32(),
                    produce[0].as_i32(),
                    produce[1].as_i32()
                ],
                |row| row.get::<_, i32>(0),
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(files)
    }

    /// Live actions that accessed any of `files`
    pub fn report_actions_that_access_files(
        &self,
        files: &FileSet,
        op: Option<OperationType>,
    ) -> Result<ActionSet> {
        let mut result = ActionSet::new();
        for path in files.iter() {
            result.extend(self.actions.get_actions_that_access(path, op)?);
        }
        Ok(result)
    }

    /// Live files accessed by any of `actions`
    pub fn report_files_accessed_by_actions(
        &self,
        actions: &ActionSet,
        op: Option<OperationType>,
    ) -> Result<FileSet> {
        let mut result = FileSet::new();
        for action in actions.iter() {
            result.extend(self.actions.get_files_accessed(action, op)?);
        }
        Ok(result)
    }

    /// Files that belong to a package (and scope) in the set
    pub fn report_files_in_package_set(&self, packages: &PackageSet) -> Result<FileSet> {
        let mut result = FileSet::new();
        for &(pkg, scope) in packages.entries() {
            result.extend(self.members.get_files_in_package(pkg, scope)?);
        }
        Ok(result)
    }

    /// Non-directory files that do not belong to the package set
    pub fn report_files_outside_package_set(&self, packages: &PackageSet) -> Result<FileSet> {
        let inside = self.report_files_in_package_set(packages)?;
        let all = self.collect_files(
            "SELECT id FROM files WHERE trashed = 0 AND path_type != ?1",
            params![PathType::Directory.as_i32()],
        )?;
        Ok(all.iter().filter(|id| !inside.contains(*id)).collect())
    }

    /// Actions that belong to a package in the set
    ///
    /// Actions carry no scope, so scope restrictions in the set only match
    /// entries without one.
    pub fn report_actions_in_package_set(&self, packages: &PackageSet) -> Result<ActionSet> {
        let mut result = ActionSet::new();
        for &(pkg, scope) in packages.entries() {
            if scope.is_none() {
                result.extend(self.members.get_actions_in_package(pkg)?);
            }
        }
        Ok(result)
    }

    /// Live actions (other than the root) outside the package set
    pub fn report_actions_outside_package_set(&self, packages: &PackageSet) -> Result<ActionSet> {
        let inside = self.report_actions_in_package_set(packages)?;
        let mut stmt = self
            .db
            .conn()
            .prepare("SELECT id FROM build_actions WHERE trashed = 0 AND id != parent_id")?;
        let all = stmt
            .query_map([], |row| row.get::<_, i32>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(all.into_iter().filter(|id| !inside.contains(*id)).collect())
    }

    fn collect_files(&self, sql: &str, params: impl rusqlite::Params) -> Result<FileSet> {
        let mut stmt = self.db.conn().prepare(sql)?;
        let ids = stmt
            .query_map(params, |row| row.get::<_, i32>(0))?
            .collect::<rusqlite::Result<FileSet>>()?;
        Ok(ids)
    }
}

fn compile(pattern: &str) -> Result<Pattern> {
    Pattern::new(pattern)
        .map_err(|e| Error::BadValue(format!("invalid pattern '{}': {}", pattern, e)))
}
