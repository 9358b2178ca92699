// src/packages/mod.rs

//! Package hierarchy
//!
//! Packages and folders form a tree under the built-in "Root" folder.
//! Alongside the tree live:
//!
//! - `roots`: the source/generated root of each package in the path tree
//! - `members`: which package (and scope) owns each file, group, action
//!   and sub-package
//! - `subpackages`: package instances nested inside other packages

pub mod members;
pub mod roots;
pub mod subpackages;

pub use members::{Member, MemberChange, MemberType, PackageMemberMgr, ScopeId};
pub use roots::{PackageRootMgr, PackageRootType};
pub use subpackages::{SubPackageChange, SubPackageMgr};

use crate::db::{Builtins, Database};
use crate::error::{Error, Result};
use crate::notify::{ChangeListener, ListenerSet};
use crate::slots::SlotOwner;
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::HashSet;
use std::rc::Rc;
use tracing::debug;

/// Minimum length of a package or folder name
pub const MIN_NAME_LEN: usize = 3;

/// Package change notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageChange {
    Added,
    Renamed,
    Moved,
    Removed,
    RootsChanged,
}

/// Package and folder names: a letter, then letters, digits, `_` or `-`,
/// at least three characters in all
pub fn is_valid_package_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {}
        _ => return false,
    }
    name.len() >= MIN_NAME_LEN && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

pub struct PackageMgr {
    db: Rc<Database>,
    builtins: Builtins,
    listeners: ListenerSet<PackageChange>,
}

impl PackageMgr {
    pub fn new(db: Rc<Database>, builtins: Builtins) -> Self {
        Self {
            db,
            builtins,
            listeners: ListenerSet::new(),
        }
    }

    pub fn get_import_package(&self) -> i32 {
        self.builtins.import_package
    }

    pub fn get_main_package(&self) -> i32 {
        self.builtins.main_package
    }

    pub fn get_root_folder(&self) -> i32 {
        self.builtins.root_folder
    }

    /// Create a package at the top of the tree
    pub fn add_package(&self, name: &str) -> Result<i32> {
        self.add(name, false)
    }

    /// Create a folder at the top of the tree
    pub fn add_folder(&self, name: &str) -> Result<i32> {
        self.add(name, true)
    }

    fn add(&self, name: &str, is_folder: bool) -> Result<i32> {
        if !is_valid_package_name(name) {
            return Err(Error::InvalidName(format!("package name '{}'", name)));
        }
        let id = self.db.atomic(|conn| {
            if name_taken(conn, name)? {
                return Err(Error::AlreadyUsed(format!("package name '{}'", name)));
            }
            conn.execute(
                "INSERT INTO packages (name, is_folder, parent_id) VALUES (?1, ?2, ?3)",
                params![name, is_folder, self.builtins.root_folder],
            )?;
            Ok(conn.last_insert_rowid() as i32)
        })?;

        debug!(
            "Added {} '{}' ({})",
            if is_folder { "folder" } else { "package" },
            name,
            id
        );
        self.listeners.notify(id, PackageChange::Added, None);
        Ok(id)
    }

    pub fn get_name(&self, id: i32) -> Result<String> {
        Ok(self.row(self.db.conn(), id)?.name)
    }

    pub fn get_id(&self, name: &str) -> Result<i32> {
        self.db
            .conn()
            .query_row("SELECT id FROM packages WHERE name = ?1", [name], |row| {
                row.get(0)
            })
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("package '{}'", name)))
    }

    pub fn set_name(&self, id: i32, name: &str) -> Result<()> {
        if self.is_builtin(id) {
            return Err(Error::InvalidOp(format!("package {} cannot be renamed", id)));
        }
        if !is_valid_package_name(name) {
            return Err(Error::InvalidName(format!("package name '{}'", name)));
        }
        let changed = self.db.atomic(|conn| {
            let current = self.row(conn, id)?;
            if current.name == name {
                return Ok(false);
            }
            if name_taken(conn, name)? {
                return Err(Error::AlreadyUsed(format!("package name '{}'", name)));
            }
            conn.execute(
                "UPDATE packages SET name = ?2 WHERE id = ?1",
                params![id, name],
            )?;
            Ok(true)
        })?;

        if changed {
            debug!("Renamed package {} to '{}'", id, name);
            self.listeners.notify(id, PackageChange::Renamed, None);
        }
        Ok(())
    }

    pub fn is_folder(&self, id: i32) -> Result<bool> {
        Ok(self.row(self.db.conn(), id)?.is_folder)
    }

    /// Whether `id` names a package (not a folder)
    pub fn is_valid_package(&self, id: i32) -> Result<bool> {
        match self.row(self.db.conn(), id) {
            Ok(row) => Ok(!row.is_folder),
            Err(Error::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn get_parent(&self, id: i32) -> Result<i32> {
        Ok(self.row(self.db.conn(), id)?.parent)
    }

    /// Move a package or folder into another folder
    pub fn set_parent(&self, id: i32, parent: i32) -> Result<()> {
        if id == self.builtins.import_package || id == self.builtins.root_folder {
            return Err(Error::InvalidOp(format!("package {} cannot be moved", id)));
        }
        self.db.atomic(|conn| {
            self.row(conn, id)?;
            if !self.row(conn, parent)?.is_folder {
                return Err(Error::InvalidOp(format!("package {} is not a folder", parent)));
            }
            if self.ancestor_walk(conn, id, parent)? {
                return Err(Error::LoopDetected(format!(
                    "package {} is an ancestor of {}",
                    id, parent
                )));
            }
            conn.execute(
                "UPDATE packages SET parent_id = ?2 WHERE id = ?1",
                params![id, parent],
            )?;
            Ok(())
        })?;

        debug!("Moved package {} into folder {}", id, parent);
        self.listeners.notify(id, PackageChange::Moved, None);
        Ok(())
    }

    /// Packages and folders directly inside a folder, by name
    pub fn get_folder_children(&self, folder: i32) -> Result<Vec<i32>> {
        let conn = self.db.conn();
        if !self.row(conn, folder)?.is_folder {
            return Err(Error::InvalidOp(format!("package {} is not a folder", folder)));
        }
        let mut stmt = conn.prepare(
            "SELECT id FROM packages WHERE parent_id = ?1 AND id != parent_id ORDER BY name",
        )?;
        let ids = stmt
            .query_map([folder], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i32>>>()?;
        Ok(ids)
    }

    /// Every package (folders excluded), by name
    pub fn get_packages(&self) -> Result<Vec<i32>> {
        let mut stmt = self
            .db
            .conn()
            .prepare("SELECT id FROM packages WHERE is_folder = 0 ORDER BY name")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i32>>>()?;
        Ok(ids)
    }

    /// Delete an empty package or folder
    ///
    /// Refused while the package has children or members, while any
    /// sub-package (trashed or not) instantiates it, and for the built-ins.
    pub fn remove(&self, id: i32) -> Result<()> {
        if self.is_builtin(id) {
            return Err(Error::CantRemove(format!("package {} is built in", id)));
        }
        self.db.atomic(|conn| {
            self.row(conn, id)?;
            let exists = |sql: &str| -> Result<bool> {
                Ok(conn.query_row(sql, [id], |row| row.get::<_, bool>(0))?)
            };
            if exists("SELECT EXISTS(SELECT 1 FROM packages WHERE parent_id = ?1 AND id != parent_id)")? {
                return Err(Error::CantRemove(format!("package {} has children", id)));
            }
            if exists("SELECT EXISTS(SELECT 1 FROM package_members WHERE pkg_id = ?1)")? {
                return Err(Error::CantRemove(format!("package {} has members", id)));
            }
            if exists("SELECT EXISTS(SELECT 1 FROM sub_packages WHERE pkg_type_id = ?1)")? {
                return Err(Error::CantRemove(format!(
                    "package {} is instantiated as a sub-package",
                    id
                )));
            }
            conn.execute("DELETE FROM package_roots WHERE pkg_id = ?1", [id])?;
            conn.execute(
                "DELETE FROM slot_types WHERE owner_type = ?1 AND owner_id = ?2",
                params![SlotOwner::Package.as_i32(), id],
            )?;
            conn.execute("DELETE FROM packages WHERE id = ?1", [id])?;
            Ok(())
        })?;

        debug!("Removed package {}", id);
        self.listeners.notify(id, PackageChange::Removed, None);
        Ok(())
    }

    pub fn add_listener(&self, listener: Rc<dyn ChangeListener<PackageChange>>) {
        self.listeners.add(listener);
    }

    pub fn remove_listener(&self, listener: &Rc<dyn ChangeListener<PackageChange>>) {
        self.listeners.remove(listener);
    }

    pub(crate) fn notify(&self, id: i32, change: PackageChange) {
        self.listeners.notify(id, change, None);
    }

    fn is_builtin(&self, id: i32) -> bool {
        id == self.builtins.import_package
            || id == self.builtins.main_package
            || id == self.builtins.root_folder
    }

    /// Whether `ancestor` is `id` or a folder above it
    fn ancestor_walk(&self, conn: &Connection, ancestor: i32, id: i32) -> Result<bool> {
        let mut seen = HashSet::new();
        let mut current = id;
        loop {
            if current == ancestor {
                return Ok(true);
            }
            if !seen.insert(current) {
                return Err(Error::Corrupt(format!("package {} has a cyclic parent chain", id)));
            }
            let parent = self.row(conn, current)?.parent;
            if parent == current {
                return Ok(false);
            }
            current = parent;
        }
    }

    fn row(&self, conn: &Connection, id: i32) -> Result<PackageRow> {
        conn.query_row(
            "SELECT name, is_folder, parent_id FROM packages WHERE id = ?1",
            [id],
            |row| {
                Ok(PackageRow {
                    name: row.get(0)?,
                    is_folder: row.get(1)?,
                    parent: row.get(2)?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| Error::NotFound(format!("package {}", id)))
    }
}

struct PackageRow {
    name: String,
    is_folder: bool,
    parent: i32,
}

fn name_taken(conn: &Connection, name: &str) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM packages WHERE name = ?1)",
        [name],
        |row| row.get(0),
    )?)
}

/// Check that `pkg` exists and is a package rather than a folder
pub(crate) fn require_package(conn: &Connection, pkg: i32) -> Result<()> {
    let is_folder: Option<bool> = conn
        .query_row(
            "SELECT is_folder FROM packages WHERE id = ?1",
            [pkg],
            |row| row.get(0),
        )
        .optional()?;
    match is_folder {
        None => Err(Error::NotFound(format!("package {}", pkg))),
        Some(true) => Err(Error::InvalidOp(format!("package {} is a folder", pkg))),
        Some(false) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_mgr() -> PackageMgr {
        let db = Rc::new(Database::open_in_memory().unwrap());
        let builtins = Builtins::load(db.conn()).unwrap();
        PackageMgr::new(db, builtins)
    }

    #[test]
    fn test_package_names() {
        assert!(is_valid_package_name("libz"));
        assert!(is_valid_package_name("gtk-3_0"));
        assert!(!is_valid_package_name("ab"));
        assert!(!is_valid_package_name("3rdparty"));
        assert!(!is_valid_package_name("has space"));
        assert!(!is_valid_package_name("<import>"));
    }

    #[test]
    fn test_add_and_rename() {
        let mgr = create_test_mgr();
        let pkg = mgr.add_package("libz").unwrap();
        assert_eq!(mgr.get_id("libz").unwrap(), pkg);
        assert_eq!(mgr.get_parent(pkg).unwrap(), mgr.get_root_folder());
        assert!(!mgr.is_folder(pkg).unwrap());

        assert!(matches!(mgr.add_package("libz"), Err(Error::AlreadyUsed(_))));
        assert!(matches!(mgr.add_folder("Main"), Err(Error::AlreadyUsed(_))));
        assert!(matches!(mgr.add_package("z"), Err(Error::InvalidName(_))));

        mgr.set_name(pkg, "zlib").unwrap();
        assert_eq!(mgr.get_name(pkg).unwrap(), "zlib");
        assert!(matches!(
            mgr.set_name(mgr.get_main_package(), "Other"),
            Err(Error::InvalidOp(_))
        ));
    }

    #[test]
    fn test_folder_tree() {
        let mgr = create_test_mgr();
        let libs = mgr.add_folder("libs").unwrap();
        let compression = mgr.add_folder("compression").unwrap();
        let pkg = mgr.add_package("libz").unwrap();

        mgr.set_parent(compression, libs).unwrap();
        mgr.set_parent(pkg, compression).unwrap();
        assert_eq!(mgr.get_folder_children(libs).unwrap(), vec![compression]);
        assert_eq!(mgr.get_folder_children(compression).unwrap(), vec![pkg]);

        assert!(matches!(mgr.set_parent(libs, compression), Err(Error::LoopDetected(_))));
        assert!(matches!(mgr.set_parent(libs, libs), Err(Error::LoopDetected(_))));
        assert!(matches!(mgr.set_parent(libs, pkg), Err(Error::InvalidOp(_))));
        assert!(matches!(
            mgr.set_parent(mgr.get_import_package(), libs),
            Err(Error::InvalidOp(_))
        ));
        mgr.set_parent(mgr.get_main_package(), libs).unwrap();
    }

    #[test]
    fn test_remove() {
        let mgr = create_test_mgr();
        let folder = mgr.add_folder("tools").unwrap();
        let pkg = mgr.add_package("make").unwrap();
        mgr.set_parent(pkg, folder).unwrap();

        assert!(matches!(mgr.remove(folder), Err(Error::CantRemove(_))));
        mgr.remove(pkg).unwrap();
        mgr.remove(folder).unwrap();
        assert!(matches!(mgr.get_id("tools"), Err(Error::NotFound(_))));

        assert!(matches!(mgr.remove(mgr.get_import_package()), Err(Error::CantRemove(_))));
        assert!(matches!(mgr.remove(mgr.get_root_folder()), Err(Error::CantRemove(_))));
    }

    #[test]
    fn test_remove_blocked_by_members() {
        let mgr = create_test_mgr();
        let pkg = mgr.add_package("libz").unwrap();
        mgr.db
            .conn()
            .execute(
                "INSERT INTO package_members (member_type, member_id, pkg_id) VALUES (3, 9, ?1)",
                [pkg],
            )
            .unwrap();
        assert!(matches!(mgr.remove(pkg), Err(Error::CantRemove(_))));
    }
}
