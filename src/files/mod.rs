// src/files/mod.rs

//! Path namespace
//!
//! Every file, directory and symlink touched by a build lives in one global
//! tree rooted at path 0 ("/"). Named roots anchor sub-trees so paths can be
//! written as `@root/relative/path`. Paths are created on first reference,
//! soft-deleted into the trash when nothing refers to them any more, and
//! purged for good when the store is closed.

mod cache;
pub mod groups;
pub mod includes;
pub mod name;

pub use groups::{FileGroupMgr, FileGroupType, GroupChange};
pub use includes::FileIncludeMgr;

use crate::db::builtins::{ROOT_ROOT_NAME, WORKSPACE_ROOT_NAME};
use crate::db::{Builtins, Database};
use crate::error::{Error, Result};
use crate::notify::{ChangeListener, ListenerSet};
use crate::slots::SlotType;
use cache::PathCache;
use name::{is_valid_root_name, parse_path, validate_component};
use rusqlite::{Connection, OptionalExtension, params};
use std::cell::RefCell;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::rc::Rc;
use std::str::FromStr;
use tracing::debug;

/// Hard upper bound on the number of paths in a store
pub const MAX_PATHS: i32 = 1 << 24;

/// Kind of a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathType {
    Directory,
    File,
    Symlink,
}

impl PathType {
    pub fn as_i32(self) -> i32 {
        match self {
            PathType::Directory => 1,
            PathType::File => 2,
            PathType::Symlink => 3,
        }
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(PathType::Directory),
            2 => Some(PathType::File),
            3 => Some(PathType::Symlink),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PathType::Directory => "directory",
            PathType::File => "file",
            PathType::Symlink => "symlink",
        }
    }
}

impl FromStr for PathType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "directory" => Ok(PathType::Directory),
            "file" => Ok(PathType::File),
            "symlink" => Ok(PathType::Symlink),
            _ => Err(Error::BadValue(format!("invalid path type: {}", s))),
        }
    }
}

/// Path-related change notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathChange {
    Trashed,
    Revived,
    RootAdded,
    RootMoved,
    RootRemoved,
}

/// A stored path row
#[derive(Debug, Clone, PartialEq, Eq)]
struct PathRow {
    parent: i32,
    name: String,
    path_type: PathType,
    trashed: bool,
}

/// Manager of the path namespace and its roots
pub struct FileMgr {
    db: Rc<Database>,
    builtins: Builtins,
    cache: RefCell<PathCache>,
    listeners: ListenerSet<PathChange>,
}

impl FileMgr {
    pub fn new(db: Rc<Database>, builtins: Builtins, cache_capacity: NonZeroUsize) -> Self {
        Self {
            db,
            builtins,
            cache: RefCell::new(PathCache::new(cache_capacity)),
            listeners: ListenerSet::new(),
        }
    }

    /// ID of "/"
    pub fn root_path(&self) -> i32 {
        self.builtins.root_path
    }

    /// Add (or find) the path named by `full_path`
    ///
    /// Missing intermediate components are created as directories; the final
    /// component is created with `path_type`. Adding an existing path of the
    /// same type returns its ID. A trashed path is revived rather than
    /// duplicated.
    pub fn add_path(&self, path_type: PathType, full_path: &str) -> Result<i32> {
        let parsed = parse_path(full_path)?;
        let mut discovered = Vec::new();
        let mut revived = Vec::new();

        let id = self.db.atomic(|conn| {
            let mut current = self.resolve_root(conn, parsed.root.as_deref())?;
            let count = parsed.components.len();
            if count == 0 {
                if path_type != PathType::Directory {
                    return Err(Error::BadPath(format!(
                        "'{}' names a directory, not a {}",
                        full_path,
                        path_type.as_str()
                    )));
                }
                return Ok(current);
            }
            for (idx, component) in parsed.components.iter().enumerate() {
                let want = if idx + 1 == count {
                    path_type
                } else {
                    PathType::Directory
                };
                current = self.get_or_create_child(
                    conn,
                    current,
                    component,
                    want,
                    &mut discovered,
                    &mut revived,
                )?;
            }
            Ok(current)
        })?;

        self.remember(discovered);
        for path in revived {
            self.listeners.notify(path, PathChange::Revived, None);
        }
        Ok(id)
    }

    /// Look up an existing path without creating anything
    pub fn get_path(&self, full_path: &str) -> Result<i32> {
        let parsed = parse_path(full_path)?;
        let conn = self.db.conn();
        let mut current = self.resolve_root(conn, parsed.root.as_deref())?;
        for component in &parsed.components {
            match self.lookup_child(conn, current, component)? {
                Some((child, _)) => current = child,
                None => return Err(Error::NotFound(format!("path '{}'", full_path))),
            }
        }
        Ok(current)
    }

    /// Add (or find) a child named `name` directly under `parent`
    pub fn add_child_of_path(&self, parent: i32, path_type: PathType, name: &str) -> Result<i32> {
        validate_component(name)?;
        self.require_directory(parent)?;

        let mut discovered = Vec::new();
        let mut revived = Vec::new();
        let id = self.db.atomic(|conn| {
            self.get_or_create_child(conn, parent, name, path_type, &mut discovered, &mut revived)
        })?;

        self.remember(discovered);
        for path in revived {
            self.listeners.notify(path, PathChange::Revived, None);
        }
        Ok(id)
    }

    /// Find a live child of `parent` by name
    pub fn get_child_of_path(&self, parent: i32, name: &str) -> Result<Option<i32>> {
        Ok(self
            .lookup_child(self.db.conn(), parent, name)?
            .map(|(child, _)| child))
    }

    /// Reconstruct the absolute name of a path
    ///
    /// With `show_roots`, the name starts at the nearest enclosing root,
    /// e.g. `@workspace/libz/inflate.c`.
    pub fn get_path_name(&self, id: i32, show_roots: bool) -> Result<String> {
        let conn = self.db.conn();
        let roots = if show_roots {
            self.root_map(conn)?
        } else {
            HashMap::new()
        };

        let mut names = Vec::new();
        let mut prefix = None;
        let mut current = id;
        loop {
            if let Some(root) = roots.get(&current) {
                prefix = Some(format!("@{}", root));
                break;
            }
            let row = self.row(conn, current)?;
            if row.parent == current {
                break;
            }
            names.push(row.name);
            if names.len() as i32 > MAX_PATHS {
                return Err(Error::Corrupt(format!("path {} has a cyclic parent chain", id)));
            }
            current = row.parent;
        }

        names.reverse();
        let body = names.join("/");
        Ok(match prefix {
            Some(prefix) if body.is_empty() => prefix,
            Some(prefix) => format!("{}/{}", prefix, body),
            None => format!("/{}", body),
        })
    }

    pub fn get_parent(&self, id: i32) -> Result<i32> {
        Ok(self.row(self.db.conn(), id)?.parent)
    }

    pub fn get_base_name(&self, id: i32) -> Result<String> {
        Ok(self.row(self.db.conn(), id)?.name)
    }

    pub fn get_path_type(&self, id: i32) -> Result<PathType> {
        Ok(self.row(self.db.conn(), id)?.path_type)
    }

    pub fn is_trashed(&self, id: i32) -> Result<bool> {
        Ok(self.row(self.db.conn(), id)?.trashed)
    }

    /// Whether `id` names a live (existing, non-trashed) path
    pub fn is_valid_path(&self, id: i32) -> Result<bool> {
        match self.row(self.db.conn(), id) {
            Ok(row) => Ok(!row.trashed),
            Err(Error::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Type of a live path, `NotFound` for unknown or trashed paths
    pub fn validate_path(&self, id: i32) -> Result<PathType> {
        let row = self.row(self.db.conn(), id)?;
        if row.trashed {
            return Err(Error::NotFound(format!("path {} is trashed", id)));
        }
        Ok(row.path_type)
    }

    /// Live children of a path, ordered by name
    pub fn get_children(&self, id: i32) -> Result<Vec<i32>> {
        let conn = self.db.conn();
        self.row(conn, id)?;
        let mut stmt = conn.prepare(
            "SELECT id FROM files
             WHERE parent_id = ?1 AND trashed = 0 AND id != parent_id
             ORDER BY name",
        )?;
        let children = stmt
            .query_map([id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i32>>>()?;
        Ok(children)
    }

    /// Whether `ancestor` is `path` or one of its ancestors
    pub fn is_ancestor_of(&self, ancestor: i32, path: i32) -> Result<bool> {
        let conn = self.db.conn();
        let mut current = path;
        for _ in 0..MAX_PATHS {
            if current == ancestor {
                return Ok(true);
            }
            let parent = self.row(conn, current)?.parent;
            if parent == current {
                return Ok(false);
            }
            current = parent;
        }
        Err(Error::Corrupt(format!("path {} has a cyclic parent chain", path)))
    }

    /// Soft-delete a path
    ///
    /// Only possible when the path has no live children, is not accessed by
    /// any action, is not referenced by a path-valued slot, carries no root
    /// (or package root), has no include relationships and is not listed in
    /// a source file group.
    pub fn move_to_trash(&self, id: i32) -> Result<()> {
        if id == self.builtins.root_path {
            return Err(Error::CantRemove("the root path cannot be trashed".to_string()));
        }

        let row = self.db.atomic(|conn| {
            let row = self.row(conn, id)?;
            if row.trashed {
                return Ok(None);
            }
            self.check_removable(conn, id)?;
            conn.execute("UPDATE files SET trashed = 1 WHERE id = ?1", [id])?;
            Ok(Some(row))
        })?;

        if let Some(row) = row {
            self.cache.borrow_mut().invalidate(row.parent, &row.name);
            debug!("Trashed path {} ({})", id, row.name);
            self.listeners.notify(id, PathChange::Trashed, None);
        }
        Ok(())
    }

    /// Bring a trashed path back
    pub fn revive_from_trash(&self, id: i32) -> Result<()> {
        let row = self.db.atomic(|conn| {
            let row = self.row(conn, id)?;
            if !row.trashed {
                return Ok(None);
            }
            let parent = self.row(conn, row.parent)?;
            if parent.trashed {
                return Err(Error::CantRevive(format!(
                    "parent of path {} is trashed",
                    id
                )));
            }
            if parent.path_type != PathType::Directory {
                return Err(Error::CantRevive(format!(
                    "parent of path {} is not a directory",
                    id
                )));
            }
            conn.execute("UPDATE files SET trashed = 0 WHERE id = ?1", [id])?;
            Ok(Some(row))
        })?;

        if let Some(row) = row {
            self.cache.borrow_mut().invalidate(row.parent, &row.name);
            debug!("Revived path {} ({})", id, row.name);
            self.listeners.notify(id, PathChange::Revived, None);
        }
        Ok(())
    }

    /// Bind a new root name to a directory
    pub fn add_root(&self, name: &str, path_id: i32) -> Result<()> {
        if !is_valid_root_name(name) {
            return Err(Error::InvalidName(format!("root name '{}'", name)));
        }
        self.db.atomic(|conn| {
            if self.root_exists(conn, name)? {
                return Err(Error::AlreadyUsed(format!("root '{}'", name)));
            }
            self.check_root_target(conn, name, path_id)?;
            conn.execute(
                "INSERT INTO file_roots (name, file_id) VALUES (?1, ?2)",
                params![name, path_id],
            )?;
            Ok(())
        })?;

        debug!("Added root @{} at path {}", name, path_id);
        self.listeners.notify(path_id, PathChange::RootAdded, None);
        Ok(())
    }

    /// Rebind a user-defined root to another directory
    ///
    /// `@root` never moves; `@workspace` moves only through
    /// `PackageRootMgr::set_workspace_root`, which guards package roots.
    pub fn move_root(&self, name: &str, path_id: i32) -> Result<()> {
        if name == ROOT_ROOT_NAME {
            return Err(Error::InvalidOp("the top root cannot be moved".to_string()));
        }
        if name == WORKSPACE_ROOT_NAME {
            return Err(Error::InvalidOp(
                "the workspace root is moved through the package roots".to_string(),
            ));
        }
        self.db.atomic(|conn| self.rebind_root(conn, name, path_id))?;

        debug!("Moved root @{} to path {}", name, path_id);
        self.listeners.notify(path_id, PathChange::RootMoved, None);
        Ok(())
    }

    /// Rebind `@workspace` once `check` accepts the new location
    ///
    /// `check` runs inside the same savepoint as the update.
    pub(crate) fn move_workspace_root<F>(&self, path_id: i32, check: F) -> Result<()>
    where
        F: FnOnce(&Connection) -> Result<()>,
    {
        self.db.atomic(|conn| {
            check(conn)?;
            self.rebind_root(conn, WORKSPACE_ROOT_NAME, path_id)
        })?;

        debug!("Moved root @{} to path {}", WORKSPACE_ROOT_NAME, path_id);
        self.listeners.notify(path_id, PathChange::RootMoved, None);
        Ok(())
    }

    fn rebind_root(&self, conn: &Connection, name: &str, path_id: i32) -> Result<()> {
        if !self.root_exists(conn, name)? {
            return Err(Error::NotFound(format!("root '{}'", name)));
        }
        self.check_root_target(conn, name, path_id)?;
        conn.execute(
            "UPDATE file_roots SET file_id = ?2 WHERE name = ?1",
            params![name, path_id],
        )?;
        Ok(())
    }

    /// Remove a user-defined root
    pub fn delete_root(&self, name: &str) -> Result<()> {
        if name == ROOT_ROOT_NAME || name == WORKSPACE_ROOT_NAME {
            return Err(Error::CantRemove(format!("built-in root '{}'", name)));
        }
        let path_id = self.get_root_path(name)?;
        self.db.atomic(|conn| {
            conn.execute("DELETE FROM file_roots WHERE name = ?1", [name])?;
            Ok(())
        })?;

        debug!("Deleted root @{}", name);
        self.listeners.notify(path_id, PathChange::RootRemoved, None);
        Ok(())
    }

    /// Path a root is bound to
    pub fn get_root_path(&self, name: &str) -> Result<i32> {
        self.db
            .conn()
            .query_row(
                "SELECT file_id FROM file_roots WHERE name = ?1",
                [name],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("root '{}'", name)))
    }

    /// Name of the root attached to exactly this path, if any
    ///
    /// When the top root shares "/" with another root, the other one wins.
    pub fn get_root_at_path(&self, path_id: i32) -> Result<Option<String>> {
        self.row(self.db.conn(), path_id)?;
        Ok(self.root_map(self.db.conn())?.remove(&path_id))
    }

    /// Name of the nearest root at or above a path
    pub fn get_enclosing_root(&self, path_id: i32) -> Result<String> {
        let conn = self.db.conn();
        let mut roots = self.root_map(conn)?;
        let mut current = path_id;
        for _ in 0..MAX_PATHS {
            if let Some(name) = roots.remove(&current) {
                return Ok(name);
            }
            let parent = self.row(conn, current)?.parent;
            if parent == current {
                return Ok(ROOT_ROOT_NAME.to_string());
            }
            current = parent;
        }
        Err(Error::Corrupt(format!("path {} has a cyclic parent chain", path_id)))
    }

    /// All root names, sorted
    pub fn get_roots(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .db
            .conn()
            .prepare("SELECT name FROM file_roots ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    pub fn add_listener(&self, listener: Rc<dyn ChangeListener<PathChange>>) {
        self.listeners.add(listener);
    }

    pub fn remove_listener(&self, listener: &Rc<dyn ChangeListener<PathChange>>) {
        self.listeners.remove(listener);
    }

    fn row(&self, conn: &Connection, id: i32) -> Result<PathRow> {
        let row = conn
            .query_row(
                "SELECT parent_id, name, path_type, trashed FROM files WHERE id = ?1",
                [id],
                |row| {
                    Ok((
                        row.get::<_, i32>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i32>(2)?,
                        row.get::<_, bool>(3)?,
                    ))
                },
            )
            .optional()?;
        let (parent, name, path_type, trashed) =
            row.ok_or_else(|| Error::NotFound(format!("path {}", id)))?;
        let path_type = PathType::from_i32(path_type).ok_or_else(|| {
            Error::Corrupt(format!("path {} has unknown type {}", id, path_type))
        })?;
        Ok(PathRow {
            parent,
            name,
            path_type,
            trashed,
        })
    }

    fn require_directory(&self, id: i32) -> Result<()> {
        match self.validate_path(id)? {
            PathType::Directory => Ok(()),
            _ => Err(Error::NotADirectory(format!("path {}", id))),
        }
    }

    fn resolve_root(&self, conn: &Connection, root: Option<&str>) -> Result<i32> {
        match root {
            None => Ok(self.builtins.root_path),
            Some(name) => conn
                .query_row(
                    "SELECT file_id FROM file_roots WHERE name = ?1",
                    [name],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or_else(|| Error::BadPath(format!("unknown root '@{}'", name))),
        }
    }

    fn lookup_child(
        &self,
        conn: &Connection,
        parent: i32,
        name: &str,
    ) -> Result<Option<(i32, PathType)>> {
        if let Some(hit) = self.cache.borrow_mut().get(parent, name) {
            return Ok(Some(hit));
        }
        let found: Option<(i32, i32)> = conn
            .query_row(
                "SELECT id, path_type FROM files
                 WHERE parent_id = ?1 AND name = ?2 AND trashed = 0 AND id != parent_id",
                params![parent, name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        match found {
            Some((child, path_type)) => {
                let path_type = PathType::from_i32(path_type).ok_or_else(|| {
                    Error::Corrupt(format!("path {} has unknown type {}", child, path_type))
                })?;
                self.cache.borrow_mut().put(parent, name, child, path_type);
                Ok(Some((child, path_type)))
            }
            None => Ok(None),
        }
    }

    /// Insert-or-fetch of a single child, atomic with respect to the store
    fn get_or_create_child(
        &self,
        conn: &Connection,
        parent: i32,
        name: &str,
        want: PathType,
        discovered: &mut Vec<(i32, String, i32, PathType)>,
        revived: &mut Vec<i32>,
    ) -> Result<i32> {
        let cached = self.cache.borrow_mut().get(parent, name);
        let (child, found_type) = match cached {
            Some(hit) => hit,
            None => {
                let inserted = conn.execute(
                    "INSERT INTO files (parent_id, path_type, name) VALUES (?1, ?2, ?3)
                     ON CONFLICT(parent_id, name) DO NOTHING",
                    params![parent, want.as_i32(), name],
                )?;
                let (child, found_type, trashed): (i32, i32, bool) = conn.query_row(
                    "SELECT id, path_type, trashed FROM files WHERE parent_id = ?1 AND name = ?2",
                    params![parent, name],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )?;
                if inserted == 1 && child >= MAX_PATHS {
                    return Err(Error::LimitExceeded(format!(
                        "the store cannot hold more than {} paths",
                        MAX_PATHS
                    )));
                }
                let found_type = PathType::from_i32(found_type).ok_or_else(|| {
                    Error::Corrupt(format!("path {} has unknown type {}", child, found_type))
                })?;
                if trashed && found_type == want {
                    conn.execute("UPDATE files SET trashed = 0 WHERE id = ?1", [child])?;
                    revived.push(child);
                }
                (child, found_type)
            }
        };

        if found_type != want {
            return Err(if want == PathType::Directory {
                Error::NotADirectory(format!("'{}' is a {}", name, found_type.as_str()))
            } else {
                Error::OnlyOneAllowed(format!(
                    "'{}' already exists as a {}",
                    name,
                    found_type.as_str()
                ))
            });
        }

        discovered.push((parent, name.to_string(), child, found_type));
        Ok(child)
    }

    fn remember(&self, discovered: Vec<(i32, String, i32, PathType)>) {
        let mut cache = self.cache.borrow_mut();
        for (parent, name, child, path_type) in discovered {
            cache.put(parent, &name, child, path_type);
        }
    }

    fn check_removable(&self, conn: &Connection, id: i32) -> Result<()> {
        let exists = |sql: &str| -> Result<bool> {
            Ok(conn.query_row(sql, [id], |row| row.get::<_, bool>(0))?)
        };

        if exists(
            "SELECT EXISTS(SELECT 1 FROM files
             WHERE parent_id = ?1 AND trashed = 0 AND id != parent_id)",
        )? {
            return Err(Error::CantRemove(format!("path {} has children", id)));
        }
        if exists("SELECT EXISTS(SELECT 1 FROM action_files WHERE file_id = ?1)")? {
            return Err(Error::CantRemove(format!("path {} is accessed by an action", id)));
        }
        let path_slot_used: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM slot_values v
                JOIN slot_types t ON v.slot_id = t.slot_id
             WHERE t.slot_type IN (?2, ?3) AND v.value = CAST(?1 AS TEXT)
               AND NOT (v.owner_type = 1 AND v.owner_id IN
                        (SELECT id FROM build_actions WHERE trashed = 1)))",
            params![
                id,
                SlotType::Directory.as_i32(),
                SlotType::File.as_i32()
            ],
            |row| row.get(0),
        )?;
        if path_slot_used {
            return Err(Error::CantRemove(format!(
                "path {} is referenced by an action or sub-package slot",
                id
            )));
        }
        if exists("SELECT EXISTS(SELECT 1 FROM file_roots WHERE file_id = ?1)")? {
            return Err(Error::CantRemove(format!("path {} carries a root", id)));
        }
        if exists("SELECT EXISTS(SELECT 1 FROM package_roots WHERE file_id = ?1)")? {
            return Err(Error::CantRemove(format!("path {} is a package root", id)));
        }
        if exists(
            "SELECT EXISTS(SELECT 1 FROM file_includes WHERE file_id1 = ?1 OR file_id2 = ?1)",
        )? {
            return Err(Error::CantRemove(format!(
                "path {} has include relationships",
                id
            )));
        }
        if exists(
            "SELECT EXISTS(SELECT 1 FROM file_group_entries e
                JOIN file_groups g ON e.group_id = g.id
             WHERE g.group_type = 1 AND e.entry_id = ?1)",
        )? {
            return Err(Error::CantRemove(format!("path {} is in a file group", id)));
        }
        Ok(())
    }

    fn root_exists(&self, conn: &Connection, name: &str) -> Result<bool> {
        Ok(conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM file_roots WHERE name = ?1)",
            [name],
            |row| row.get(0),
        )?)
    }

    /// A root may only sit on a live directory that carries no other root
    /// (the top root on "/" does not count).
    fn check_root_target(&self, conn: &Connection, name: &str, path_id: i32) -> Result<()> {
        let row = self.row(conn, path_id)?;
        if row.trashed {
            return Err(Error::NotFound(format!("path {} is trashed", path_id)));
        }
        if row.path_type != PathType::Directory {
            return Err(Error::NotADirectory(format!("path {}", path_id)));
        }
        let occupied: Option<String> = conn
            .query_row(
                "SELECT name FROM file_roots WHERE file_id = ?1 AND name != ?2 AND name != ?3",
                params![path_id, name, ROOT_ROOT_NAME],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(other) = occupied {
            return Err(Error::OnlyOneAllowed(format!(
                "path {} already carries root '{}'",
                path_id, other
            )));
        }
        Ok(())
    }

    /// Map from path ID to the root attached there
    fn root_map(&self, conn: &Connection) -> Result<HashMap<i32, String>> {
        let mut stmt = conn.prepare("SELECT name, file_id FROM file_roots")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i32>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut roots: HashMap<i32, String> = HashMap::new();
        for (name, path) in rows {
            match roots.get(&path) {
                Some(existing) if existing != ROOT_ROOT_NAME => {}
                _ => {
                    roots.insert(path, name);
                }
            }
        }
        Ok(roots)
    }
}
