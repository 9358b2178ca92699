// src/store.rs

//! The build store facade
//!
//! `BuildStore` opens the database, resolves the built-in entities and wires
//! the managers together. Managers are shared (`Rc`) so that each one can
//! hold on to the others it consults.

use crate::actions::{ActionMgr, ActionTypeMgr};
use crate::config::StoreConfig;
use crate::db::{Builtins, Database};
use crate::error::{Error, Result};
use crate::files::{FileGroupMgr, FileIncludeMgr, FileMgr};
use crate::packages::{PackageMemberMgr, PackageMgr, PackageRootMgr, SubPackageMgr};
use crate::reports::ReportMgr;
use crate::slots::SlotMgr;
use std::num::NonZeroUsize;
use std::path::Path;
use std::rc::Rc;
use tracing::{info, warn};

/// An open build store and its managers
pub struct BuildStore {
    db: Rc<Database>,
    builtins: Builtins,
    files: Rc<FileMgr>,
    includes: Rc<FileIncludeMgr>,
    groups: Rc<FileGroupMgr>,
    slots: Rc<SlotMgr>,
    action_types: Rc<ActionTypeMgr>,
    actions: Rc<ActionMgr>,
    packages: Rc<PackageMgr>,
    roots: Rc<PackageRootMgr>,
    members: Rc<PackageMemberMgr>,
    sub_packages: Rc<SubPackageMgr>,
    reports: Rc<ReportMgr>,
}

impl BuildStore {
    /// Open (or create) the store at `path`
    pub fn open(path: &Path, config: &StoreConfig) -> Result<Self> {
        let db = Database::open(path)?;
        Self::assemble(db, config)
    }

    /// Open a store that lives only in memory
    pub fn open_in_memory(config: &StoreConfig) -> Result<Self> {
        let db = Database::open_in_memory()?;
        Self::assemble(db, config)
    }

    /// Migrate an older store file to the current schema
    ///
    /// Returns the schema version the file had before.
    pub fn upgrade(path: &Path) -> Result<i32> {
        Database::upgrade(path)
    }

    fn assemble(db: Database, config: &StoreConfig) -> Result<Self> {
        let capacity = NonZeroUsize::new(config.path_cache_capacity)
            .ok_or_else(|| Error::Config("path_cache_capacity must be non-zero".to_string()))?;

        let builtins = Builtins::load(db.conn())?;
        let db = Rc::new(db);

        let files = Rc::new(FileMgr::new(db.clone(), builtins, capacity));
        let includes = Rc::new(FileIncludeMgr::new(db.clone()));
        let groups = Rc::new(FileGroupMgr::new(db.clone()));
        let slots = Rc::new(SlotMgr::new(db.clone(), builtins));
        let action_types = Rc::new(ActionTypeMgr::new(db.clone(), builtins, slots.clone()));
        let actions = Rc::new(ActionMgr::new(
            db.clone(),
            builtins,
            files.clone(),
            slots.clone(),
        ));
        let packages = Rc::new(PackageMgr::new(db.clone(), builtins));
        let roots = Rc::new(PackageRootMgr::new(
            db.clone(),
            builtins,
            files.clone(),
            packages.clone(),
        ));
        let members = Rc::new(PackageMemberMgr::new(
            db.clone(),
            builtins,
            files.clone(),
            packages.clone(),
            roots.clone(),
        ));
        let sub_packages = Rc::new(SubPackageMgr::new(db.clone(), builtins, slots.clone()));
        let reports = Rc::new(ReportMgr::new(
            db.clone(),
            builtins,
            actions.clone(),
            members.clone(),
        ));

        let store = Self {
            db,
            builtins,
            files,
            includes,
            groups,
            slots,
            action_types,
            actions,
            packages,
            roots,
            members,
            sub_packages,
            reports,
        };

        if let Some(native) = &config.workspace_native {
            store.roots.set_workspace_native(native)?;
        }
        if config.fast_access {
            store.set_fast_access_mode(true)?;
        }
        Ok(store)
    }

    pub fn builtins(&self) -> &Builtins {
        &self.builtins
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn files(&self) -> &Rc<FileMgr> {
        &self.files
    }

    pub fn file_includes(&self) -> &Rc<FileIncludeMgr> {
        &self.includes
    }

    pub fn file_groups(&self) -> &Rc<FileGroupMgr> {
        &self.groups
    }

    pub fn slots(&self) -> &Rc<SlotMgr> {
        &self.slots
    }

    pub fn action_types(&self) -> &Rc<ActionTypeMgr> {
        &self.action_types
    }

    pub fn actions(&self) -> &Rc<ActionMgr> {
        &self.actions
    }

    pub fn packages(&self) -> &Rc<PackageMgr> {
        &self.packages
    }

    pub fn package_roots(&self) -> &Rc<PackageRootMgr> {
        &self.roots
    }

    pub fn package_members(&self) -> &Rc<PackageMemberMgr> {
        &self.members
    }

    pub fn sub_packages(&self) -> &Rc<SubPackageMgr> {
        &self.sub_packages
    }

    pub fn reports(&self) -> &Rc<ReportMgr> {
        &self.reports
    }

    /// Switch between fast (bulk import) and safe durability
    pub fn set_fast_access_mode(&self, fast: bool) -> Result<()> {
        self.db.set_fast_access_mode(fast)
    }

    pub fn is_fast_access_mode(&self) -> bool {
        self.db.is_fast_access_mode()
    }

    /// Write a full copy of the store to `dest`
    pub fn save_as(&self, dest: &Path) -> Result<()> {
        self.db.save_as(dest)
    }

    /// Purge the trash, commit and close
    ///
    /// Manager handles cloned out of the store keep the database alive; in
    /// that case the trash is still purged and committed, and the connection
    /// closes when the last handle is dropped.
    pub fn close(self) -> Result<()> {
        let Self {
            db,
            files,
            includes,
            groups,
            slots,
            action_types,
            actions,
            packages,
            roots,
            members,
            sub_packages,
            reports,
            ..
        } = self;
        drop((
            reports,
            sub_packages,
            members,
            roots,
            packages,
            actions,
            action_types,
            slots,
            groups,
            includes,
            files,
        ));

        match Rc::try_unwrap(db) {
            Ok(db) => db.close(),
            Err(db) => {
                warn!("Build store handles still in use at close");
                db.set_fast_access_mode(false)?;
                let purged = db.purge_trash()?;
                info!("Purged {} trashed entities", purged);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::PathType;

    #[test]
    fn test_open_in_memory_wires_builtins() {
        let store = BuildStore::open_in_memory(&StoreConfig::default()).unwrap();
        assert_eq!(store.files().root_path(), store.builtins().root_path);
        assert_eq!(
            store.actions().get_root_action(),
            store.builtins().root_action
        );
        assert!(!store.is_fast_access_mode());
    }

    #[test]
    fn test_zero_cache_capacity_rejected() {
        let config = StoreConfig {
            path_cache_capacity: 0,
            ..StoreConfig::default()
        };
        assert!(matches!(
            BuildStore::open_in_memory(&config),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_config_applied_on_open() {
        let config = StoreConfig {
            fast_access: true,
            workspace_native: Some("/home/me/src".into()),
            ..StoreConfig::default()
        };
        let store = BuildStore::open_in_memory(&config).unwrap();
        assert!(store.is_fast_access_mode());
        assert_eq!(
            store.package_roots().get_workspace_native().unwrap(),
            Some("/home/me/src".into())
        );
    }

    #[test]
    fn test_close_with_outstanding_handle() {
        let store = BuildStore::open_in_memory(&StoreConfig::default()).unwrap();
        let files = store.files().clone();
        let id = files.add_path(PathType::File, "/tmp/x").unwrap();
        files.move_to_trash(id).unwrap();
        store.close().unwrap();
        assert!(!files.is_valid_path(id).unwrap());
    }
}
