// src/packages/roots.rs

//! Package roots
//!
//! Every package has a source root and a generated root in the path tree.
//! Without an explicit setting both default to the workspace root. A root
//! must be a directory inside the workspace root and must contain every
//! file currently assigned to the package.

use super::{PackageChange, PackageMgr, require_package};
use crate::db::builtins::WORKSPACE_ROOT_NAME;
use crate::db::{Builtins, Database};
use crate::error::{Error, Result};
use crate::files::{FileMgr, PathType};
use crate::packages::MemberType;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::debug;

/// Settings key holding the native location of the workspace root
const WORKSPACE_NATIVE_KEY: &str = "workspace_native";

/// Which of a package's two roots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageRootType {
    Source,
    Generated,
}

impl PackageRootType {
    pub fn as_i32(self) -> i32 {
        match self {
            PackageRootType::Source => 1,
            PackageRootType::Generated => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PackageRootType::Source => "src",
            PackageRootType::Generated => "gen",
        }
    }

    pub fn all() -> [PackageRootType; 2] {
        [PackageRootType::Source, PackageRootType::Generated]
    }
}

pub struct PackageRootMgr {
    db: Rc<Database>,
    builtins: Builtins,
    files: Rc<FileMgr>,
    packages: Rc<PackageMgr>,
}

impl PackageRootMgr {
    pub fn new(
        db: Rc<Database>,
        builtins: Builtins,
        files: Rc<FileMgr>,
        packages: Rc<PackageMgr>,
    ) -> Self {
        Self {
            db,
            builtins,
            files,
            packages,
        }
    }

    pub fn get_workspace_root(&self) -> Result<i32> {
        self.files.get_root_path(WORKSPACE_ROOT_NAME)
    }

    /// Root of a package, defaulting to the workspace root
    pub fn get_package_root(&self, pkg: i32, root_type: PackageRootType) -> Result<i32> {
        require_package(self.db.conn(), pkg)?;
        match self.explicit_root(self.db.conn(), pkg, root_type)? {
            Some(path) => Ok(path),
            None => self.get_workspace_root(),
        }
    }

    /// Point a package root at a directory
    ///
    /// The directory must lie inside the workspace root and contain every
    /// file that is already a member of the package, else `OutOfRange`.
    pub fn set_package_root(&self, pkg: i32, root_type: PackageRootType, path: i32) -> Result<()> {
        self.check_settable(pkg)?;
        if self.files.validate_path(path)? != PathType::Directory {
            return Err(Error::NotADirectory(format!("path {}", path)));
        }
        let workspace = self.get_workspace_root()?;
        if !self.files.is_ancestor_of(workspace, path)? {
            return Err(Error::OutOfRange(format!(
                "path {} is outside the workspace root",
                path
            )));
        }

        self.db.atomic(|conn| {
            self.check_contains_members(conn, pkg, path)?;
            conn.execute(
                "INSERT INTO package_roots (pkg_id, root_type, file_id) VALUES (?1, ?2, ?3)
                 ON CONFLICT(pkg_id, root_type) DO UPDATE SET file_id = excluded.file_id",
                params![pkg, root_type.as_i32(), path],
            )?;
            Ok(())
        })?;

        debug!("Set {} root of package {} to path {}", root_type.as_str(), pkg, path);
        self.packages.notify(pkg, PackageChange::RootsChanged);
        Ok(())
    }

    /// Drop an explicit root so it reverts to the workspace root
    pub fn remove_package_root(&self, pkg: i32, root_type: PackageRootType) -> Result<()> {
        self.check_settable(pkg)?;
        let workspace = self.get_workspace_root()?;
        let removed = self.db.atomic(|conn| {
            self.check_contains_members(conn, pkg, workspace)?;
            Ok(conn.execute(
                "DELETE FROM package_roots WHERE pkg_id = ?1 AND root_type = ?2",
                params![pkg, root_type.as_i32()],
            )?)
        })?;

        if removed > 0 {
            debug!("Reset {} root of package {}", root_type.as_str(), pkg);
            self.packages.notify(pkg, PackageChange::RootsChanged);
        }
        Ok(())
    }

    /// Whether `path` lies under both roots of `pkg`
    pub fn is_within_package_roots(&self, pkg: i32, path: i32) -> Result<bool> {
        for root_type in PackageRootType::all() {
            let root = self.get_package_root(pkg, root_type)?;
            if !self.files.is_ancestor_of(root, path)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Move the workspace root
    ///
    /// The new location must contain every explicit package root and every
    /// file assigned to a package other than `<import>`.
    pub fn set_workspace_root(&self, path: i32) -> Result<()> {
        if self.files.validate_path(path)? != PathType::Directory {
            return Err(Error::NotADirectory(format!("path {}", path)));
        }
        self.files
            .move_workspace_root(path, |conn| self.check_workspace_contains(conn, path))
    }

    fn check_workspace_contains(&self, conn: &Connection, path: i32) -> Result<()> {
        let mut stmt = conn.prepare("SELECT DISTINCT file_id FROM package_roots")?;
        let roots = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i32>>>()?;
        for root in roots {
            if !self.files.is_ancestor_of(path, root)? {
                return Err(Error::OutOfRange(format!(
                    "package root {} would be outside the workspace",
                    root
                )));
            }
        }

        let mut stmt = conn.prepare(
            "SELECT member_id FROM package_members WHERE member_type = ?1 AND pkg_id != ?2",
        )?;
        let files = stmt
            .query_map(
                params![MemberType::File.as_i32(), self.builtins.import_package],
                |row| row.get(0),
            )?
            .collect::<rusqlite::Result<Vec<i32>>>()?;
        for file in files {
            if !self.files.is_ancestor_of(path, file)? {
                return Err(Error::OutOfRange(format!(
                    "package file {} would be outside the workspace",
                    file
                )));
            }
        }
        Ok(())
    }

    /// Record where the workspace root lives on the native filesystem
    pub fn set_workspace_native(&self, native: &Path) -> Result<()> {
        if !native.is_absolute() {
            return Err(Error::BadValue(format!(
                "native workspace path must be absolute: {}",
                native.display()
            )));
        }
        let text = native.to_str().ok_or_else(|| {
            Error::BadValue(format!("native path is not UTF-8: {}", native.display()))
        })?;
        self.db.set_setting(WORKSPACE_NATIVE_KEY, Some(text))?;
        debug!("Workspace native path is {}", text);
        Ok(())
    }

    pub fn get_workspace_native(&self) -> Result<Option<PathBuf>> {
        Ok(self.db.get_setting(WORKSPACE_NATIVE_KEY)?.map(PathBuf::from))
    }

    /// Native location of a package root
    pub fn get_root_native(&self, pkg: i32, root_type: PackageRootType) -> Result<PathBuf> {
        let native = self
            .get_workspace_native()?
            .ok_or_else(|| Error::NotFound("native workspace path is not set".to_string()))?;
        let workspace = self.get_workspace_root()?;
        let root = self.get_package_root(pkg, root_type)?;

        let mut components = Vec::new();
        let mut current = root;
        while current != workspace {
            components.push(self.files.get_base_name(current)?);
            let parent = self.files.get_parent(current)?;
            if parent == current {
                return Err(Error::OutOfRange(format!(
                    "package root {} is outside the workspace",
                    root
                )));
            }
            current = parent;
        }

        let mut result = native;
        for component in components.iter().rev() {
            result.push(component);
        }
        Ok(result)
    }

    fn check_settable(&self, pkg: i32) -> Result<()> {
        require_package(self.db.conn(), pkg)?;
        if pkg == self.builtins.import_package || pkg == self.builtins.main_package {
            return Err(Error::InvalidOp(format!(
                "roots of package {} are fixed at the workspace root",
                pkg
            )));
        }
        Ok(())
    }

    fn explicit_root(
        &self,
        conn: &Connection,
        pkg: i32,
        root_type: PackageRootType,
    ) -> Result<Option<i32>> {
        Ok(conn
            .query_row(
                "SELECT file_id FROM package_roots WHERE pkg_id = ?1 AND root_type = ?2",
                params![pkg, root_type.as_i32()],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn check_contains_members(&self, conn: &Connection, pkg: i32, root: i32) -> Result<()> {
        let mut stmt = conn.prepare(
            "SELECT member_id FROM package_members WHERE member_type = ?1 AND pkg_id = ?2",
        )?;
        let files = stmt
            .query_map(params![MemberType::File.as_i32(), pkg], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i32>>>()?;
        for file in files {
            if !self.files.is_ancestor_of(root, file)? {
                return Err(Error::OutOfRange(format!(
                    "member file {} of package {} is outside path {}",
                    file, pkg, root
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroUsize;

    struct Fixture {
        db: Rc<Database>,
        files: Rc<FileMgr>,
        packages: Rc<PackageMgr>,
        roots: PackageRootMgr,
    }

    fn setup() -> Fixture {
        let db = Rc::new(Database::open_in_memory().unwrap());
        let builtins = Builtins::load(db.conn()).unwrap();
        let files = Rc::new(FileMgr::new(db.clone(), builtins, NonZeroUsize::new(64).unwrap()));
        let packages = Rc::new(PackageMgr::new(db.clone(), builtins));
        let roots = PackageRootMgr::new(db.clone(), builtins, files.clone(), packages.clone());
        Fixture {
            db,
            files,
            packages,
            roots,
        }
    }

    #[test]
    fn test_default_root_is_workspace() {
        let f = setup();
        let ws = f.files.add_path(PathType::Directory, "/home/ws").unwrap();
        f.roots.set_workspace_root(ws).unwrap();

        let pkg = f.packages.add_package("libz").unwrap();
        assert_eq!(f.roots.get_package_root(pkg, PackageRootType::Source).unwrap(), ws);
        assert_eq!(f.roots.get_package_root(pkg, PackageRootType::Generated).unwrap(), ws);
    }

    #[test]
    fn test_root_must_be_inside_workspace() {
        let f = setup();
        let ws = f.files.add_path(PathType::Directory, "/home/ws").unwrap();
        f.roots.set_workspace_root(ws).unwrap();
        let pkg = f.packages.add_package("libz").unwrap();

        let inside = f.files.add_path(PathType::Directory, "@workspace/libz").unwrap();
        let outside = f.files.add_path(PathType::Directory, "/opt/libz").unwrap();
        let file = f.files.add_path(PathType::File, "@workspace/libz/zlib.h").unwrap();

        f.roots.set_package_root(pkg, PackageRootType::Source, inside).unwrap();
        assert_eq!(f.roots.get_package_root(pkg, PackageRootType::Source).unwrap(), inside);
        assert!(matches!(
            f.roots.set_package_root(pkg, PackageRootType::Source, outside),
            Err(Error::OutOfRange(_))
        ));
        assert!(matches!(
            f.roots.set_package_root(pkg, PackageRootType::Source, file),
            Err(Error::NotADirectory(_))
        ));
    }

    #[test]
    fn test_root_must_contain_members() {
        let f = setup();
        let pkg = f.packages.add_package("libz").unwrap();
        let a = f.files.add_path(PathType::Directory, "/ws/a").unwrap();
        let b = f.files.add_path(PathType::Directory, "/ws/b").unwrap();
        let file = f.files.add_path(PathType::File, "/ws/a/x.c").unwrap();
        f.db.conn()
            .execute(
                "INSERT INTO package_members (member_type, member_id, pkg_id) VALUES (1, ?1, ?2)",
                params![file, pkg],
            )
            .unwrap();

        f.roots.set_package_root(pkg, PackageRootType::Generated, a).unwrap();
        assert!(matches!(
            f.roots.set_package_root(pkg, PackageRootType::Generated, b),
            Err(Error::OutOfRange(_))
        ));
        assert!(f.roots.is_within_package_roots(pkg, file).unwrap());

        f.roots.remove_package_root(pkg, PackageRootType::Generated).unwrap();
        assert_eq!(f.roots.get_package_root(pkg, PackageRootType::Generated).unwrap(), 0);
    }

    #[test]
    fn test_builtin_roots_fixed() {
        let f = setup();
        let dir = f.files.add_path(PathType::Directory, "/src").unwrap();
        assert!(matches!(
            f.roots.set_package_root(f.packages.get_main_package(), PackageRootType::Source, dir),
            Err(Error::InvalidOp(_))
        ));
        assert!(matches!(
            f.roots.set_package_root(f.packages.get_root_folder(), PackageRootType::Source, dir),
            Err(Error::InvalidOp(_))
        ));
    }

    #[test]
    fn test_workspace_must_contain_package_roots() {
        let f = setup();
        let pkg = f.packages.add_package("libz").unwrap();
        let root = f.files.add_path(PathType::Directory, "/ws/libz").unwrap();
        let other = f.files.add_path(PathType::Directory, "/elsewhere").unwrap();
        f.roots.set_package_root(pkg, PackageRootType::Source, root).unwrap();

        assert!(matches!(f.roots.set_workspace_root(other), Err(Error::OutOfRange(_))));
        assert!(matches!(
            f.files.move_root(WORKSPACE_ROOT_NAME, other),
            Err(Error::InvalidOp(_))
        ));
        assert_eq!(f.roots.get_workspace_root().unwrap(), f.files.root_path());
        assert!(f.files.is_ancestor_of(f.roots.get_workspace_root().unwrap(), root).unwrap());

        f.roots.set_workspace_root(f.files.get_path("/ws").unwrap()).unwrap();
        assert!(matches!(f.files.move_to_trash(root), Err(Error::CantRemove(_))));
    }

    #[test]
    fn test_native_paths() {
        let f = setup();
        let pkg = f.packages.add_package("libz").unwrap();
        let ws = f.files.add_path(PathType::Directory, "/build/ws").unwrap();
        f.roots.set_workspace_root(ws).unwrap();
        let src = f.files.add_path(PathType::Directory, "@workspace/ext/libz").unwrap();
        f.roots.set_package_root(pkg, PackageRootType::Source, src).unwrap();

        assert!(matches!(
            f.roots.get_root_native(pkg, PackageRootType::Source),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            f.roots.set_workspace_native(Path::new("relative")),
            Err(Error::BadValue(_))
        ));

        f.roots.set_workspace_native(Path::new("/home/me/src")).unwrap();
        assert_eq!(
            f.roots.get_root_native(pkg, PackageRootType::Source).unwrap(),
            PathBuf::from("/home/me/src/ext/libz")
        );
        assert_eq!(
            f.roots.get_root_native(pkg, PackageRootType::Generated).unwrap(),
            PathBuf::from("/home/me/src")
        );
    }
}
