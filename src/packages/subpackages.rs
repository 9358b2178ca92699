// src/packages/subpackages.rs

//! Sub-packages
//!
//! A sub-package is an instance of one package placed inside another. The
//! "contains an instance of" relation between package types must stay
//! acyclic: no package may, directly or through other sub-packages,
//! contain an instance of itself.

use super::MemberType;
use crate::db::{Builtins, Database};
use crate::error::{Error, Result};
use crate::notify::{ChangeListener, ListenerSet};
use crate::slots::{SlotInstance, SlotMgr, SlotValue};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::{HashSet, VecDeque};
use std::rc::Rc;
use tracing::debug;

/// Sub-package change notifications
///
/// `SlotChanged` carries the slot ID as the event's sub-field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubPackageChange {
    Added,
    Trashed,
    Revived,
    SlotChanged,
}

/// Whether package `pkg` contains, at any depth, a live instance of `target`
///
/// Breadth-first over the package types reachable through live
/// sub-packages. Each package is expanded at most once, so the walk is
/// bounded by the number of packages even if the stored graph is damaged.
pub(crate) fn type_contains(conn: &Connection, pkg: i32, target: i32) -> Result<bool> {
    let mut stmt = conn.prepare_cached(
        "SELECT DISTINCT s.pkg_type_id FROM sub_packages s
            JOIN package_members m ON m.member_type = ?2 AND m.member_id = s.id
         WHERE m.pkg_id = ?1 AND s.trashed = 0",
    )?;

    let mut visited = HashSet::new();
    let mut queue = VecDeque::from([pkg]);
    visited.insert(pkg);

    while let Some(current) = queue.pop_front() {
        let contained = stmt
            .query_map(params![current, MemberType::SubPackage.as_i32()], |row| {
                row.get::<_, i32>(0)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for child in contained {
            if child == target {
                return Ok(true);
            }
            if visited.insert(child) {
                queue.push_back(child);
            }
        }
    }
    Ok(false)
}

pub struct SubPackageMgr {
    db: Rc<Database>,
    builtins: Builtins,
    slots: Rc<SlotMgr>,
    listeners: ListenerSet<SubPackageChange>,
}

impl SubPackageMgr {
    pub fn new(db: Rc<Database>, builtins: Builtins, slots: Rc<SlotMgr>) -> Self {
        Self {
            db,
            builtins,
            slots,
            listeners: ListenerSet::new(),
        }
    }

    /// Place a new instance of `pkg_type` inside package `parent`
    pub fn new_sub_package(&self, parent: i32, pkg_type: i32) -> Result<i32> {
        let id = self.db.atomic(|conn| {
            self.check_container(conn, parent)?;
            self.check_type(conn, pkg_type)?;
            if pkg_type == parent || type_contains(conn, pkg_type, parent)? {
                return Err(Error::LoopDetected(format!(
                    "package {} would contain an instance of itself",
                    parent
                )));
            }
            conn.execute(
                "INSERT INTO sub_packages (pkg_type_id) VALUES (?1)",
                [pkg_type],
            )?;
            let id = conn.last_insert_rowid() as i32;
            conn.execute(
                "INSERT INTO package_members (member_type, member_id, pkg_id) VALUES (?1, ?2, ?3)",
                params![MemberType::SubPackage.as_i32(), id, parent],
            )?;
            Ok(id)
        })?;

        debug!(
            "Created sub-package {} of type {} in package {}",
            id, pkg_type, parent
        );
        self.listeners.notify(id, SubPackageChange::Added, None);
        Ok(id)
    }

    /// Package this sub-package is an instance of
    pub fn get_package_type(&self, sub: i32) -> Result<i32> {
        Ok(self.row(self.db.conn(), sub)?.0)
    }

    /// Package that contains this sub-package
    pub fn get_parent_package(&self, sub: i32) -> Result<i32> {
        let conn = self.db.conn();
        self.row(conn, sub)?;
        conn.query_row(
            "SELECT pkg_id FROM package_members WHERE member_type = ?1 AND member_id = ?2",
            params![MemberType::SubPackage.as_i32(), sub],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| Error::Corrupt(format!("sub-package {} has no parent package", sub)))
    }

    pub fn is_trashed(&self, sub: i32) -> Result<bool> {
        Ok(self.row(self.db.conn(), sub)?.1)
    }

    pub fn is_valid_sub_package(&self, sub: i32) -> Result<bool> {
        match self.row(self.db.conn(), sub) {
            Ok((_, trashed)) => Ok(!trashed),
            Err(Error::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Live instances of a package type
    pub fn get_sub_packages_of_type(&self, pkg_type: i32) -> Result<Vec<i32>> {
        let mut stmt = self.db.conn().prepare(
            "SELECT id FROM sub_packages WHERE pkg_type_id = ?1 AND trashed = 0 ORDER BY id",
        )?;
        let ids = stmt
            .query_map([pkg_type], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i32>>>()?;
        Ok(ids)
    }

    /// Whether package `pkg` contains, at any depth, an instance of `target`
    pub fn is_ancestor_of(&self, pkg: i32, target: i32) -> Result<bool> {
        type_contains(self.db.conn(), pkg, target)
    }

    /// Soft-delete a sub-package; nothing depends on an instance
    pub fn move_to_trash(&self, sub: i32) -> Result<()> {
        let changed = self.db.atomic(|conn| {
            if self.row(conn, sub)?.1 {
                return Ok(false);
            }
            conn.execute("UPDATE sub_packages SET trashed = 1 WHERE id = ?1", [sub])?;
            Ok(true)
        })?;
        if changed {
            debug!("Trashed sub-package {}", sub);
            self.listeners.notify(sub, SubPackageChange::Trashed, None);
        }
        Ok(())
    }

    /// Bring a sub-package back, provided it would not close a loop
    pub fn revive_from_trash(&self, sub: i32) -> Result<()> {
        let parent = self.get_parent_package(sub)?;
        let changed = self.db.atomic(|conn| {
            let (pkg_type, trashed) = self.row(conn, sub)?;
            if !trashed {
                return Ok(false);
            }
            match self.check_type(conn, pkg_type) {
                Ok(()) => {}
                Err(e) if !e.is_fatal() => {
                    return Err(Error::CantRevive(format!(
                        "type of sub-package {} is no longer usable: {}",
                        sub, e
                    )));
                }
                Err(e) => return Err(e),
            }
            if pkg_type == parent || type_contains(conn, pkg_type, parent)? {
                return Err(Error::CantRevive(format!(
                    "sub-package {} would make package {} contain itself",
                    sub, parent
                )));
            }
            conn.execute("UPDATE sub_packages SET trashed = 0 WHERE id = ?1", [sub])?;
            Ok(true)
        })?;
        if changed {
            debug!("Revived sub-package {}", sub);
            self.listeners.notify(sub, SubPackageChange::Revived, None);
        }
        Ok(())
    }

    pub fn get_slot_value(&self, sub: i32, slot: i32) -> Result<Option<SlotValue>> {
        self.slots.get_slot_value(SlotInstance::SubPackage, sub, slot)
    }

    pub fn set_slot_value(&self, sub: i32, slot: i32, value: &SlotValue) -> Result<()> {
        self.slots
            .set_slot_value(SlotInstance::SubPackage, sub, slot, value)?;
        self.listeners
            .notify(sub, SubPackageChange::SlotChanged, Some(slot));
        Ok(())
    }

    pub fn clear_slot_value(&self, sub: i32, slot: i32) -> Result<()> {
        if self
            .slots
            .clear_slot_value(SlotInstance::SubPackage, sub, slot)?
        {
            self.listeners
                .notify(sub, SubPackageChange::SlotChanged, Some(slot));
        }
        Ok(())
    }

    pub fn is_slot_set(&self, sub: i32, slot: i32) -> Result<bool> {
        self.slots.is_slot_set(SlotInstance::SubPackage, sub, slot)
    }

    pub fn add_listener(&self, listener: Rc<dyn ChangeListener<SubPackageChange>>) {
        self.listeners.add(listener);
    }

    pub fn remove_listener(&self, listener: &Rc<dyn ChangeListener<SubPackageChange>>) {
        self.listeners.remove(listener);
    }

    /// Package type and trashed flag
    fn row(&self, conn: &Connection, sub: i32) -> Result<(i32, bool)> {
        conn.query_row(
            "SELECT pkg_type_id, trashed FROM sub_packages WHERE id = ?1",
            [sub],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?
        .ok_or_else(|| Error::NotFound(format!("sub-package {}", sub)))
    }

    fn is_folder(&self, conn: &Connection, pkg: i32) -> Result<bool> {
        conn.query_row(
            "SELECT is_folder FROM packages WHERE id = ?1",
            [pkg],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| Error::NotFound(format!("package {}", pkg)))
    }

    fn check_container(&self, conn: &Connection, parent: i32) -> Result<()> {
        if self.is_folder(conn, parent)? {
            return Err(Error::BadValue(format!(
                "folder {} cannot hold sub-packages",
                parent
            )));
        }
        if parent == self.builtins.import_package {
            return Err(Error::BadValue(
                "the import package cannot hold sub-packages".to_string(),
            ));
        }
        Ok(())
    }

    fn check_type(&self, conn: &Connection, pkg_type: i32) -> Result<()> {
        if self.is_folder(conn, pkg_type)? {
            return Err(Error::BadValue(format!(
                "folder {} cannot be instantiated",
                pkg_type
            )));
        }
        if pkg_type == self.builtins.import_package || pkg_type == self.builtins.main_package {
            return Err(Error::BadValue(format!(
                "built-in package {} cannot be instantiated",
                pkg_type
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slots::{NewSlot, SlotOwner, SlotPos, SlotType};

    struct Fixture {
        slots: Rc<SlotMgr>,
        subs: SubPackageMgr,
    }

    fn setup() -> Fixture {
        let db = Rc::new(Database::open_in_memory().unwrap());
        let builtins = Builtins::load(db.conn()).unwrap();
        db.conn()
            .execute_batch(
                "INSERT INTO packages (id, name, is_folder, parent_id) VALUES (10, 'app', 0, 1);
                 INSERT INTO packages (id, name, is_folder, parent_id) VALUES (11, 'libfoo', 0, 1);
                 INSERT INTO packages (id, name, is_folder, parent_id) VALUES (12, 'libbar', 0, 1);
                 INSERT INTO packages (id, name, is_folder, parent_id) VALUES (13, 'tools', 1, 1);",
            )
            .unwrap();
        let slots = Rc::new(SlotMgr::new(db.clone(), builtins));
        let subs = SubPackageMgr::new(db, builtins, slots.clone());
        Fixture { slots, subs }
    }

    #[test]
    fn test_nested_instances() {
        let f = setup();
        let foo_in_app = f.subs.new_sub_package(10, 11).unwrap();
        let bar_in_foo = f.subs.new_sub_package(11, 12).unwrap();

        assert_eq!(f.subs.get_package_type(foo_in_app).unwrap(), 11);
        assert_eq!(f.subs.get_parent_package(bar_in_foo).unwrap(), 11);
        assert!(f.subs.is_ancestor_of(10, 12).unwrap());
        assert!(!f.subs.is_ancestor_of(12, 10).unwrap());
        assert_eq!(f.subs.get_sub_packages_of_type(11).unwrap(), vec![foo_in_app]);
    }

    #[test]
    fn test_loops_rejected() {
        let f = setup();
        f.subs.new_sub_package(10, 11).unwrap();
        f.subs.new_sub_package(11, 12).unwrap();

        // libbar is (transitively) an instance inside app
        assert!(matches!(f.subs.new_sub_package(12, 10), Err(Error::LoopDetected(_))));
        assert!(matches!(f.subs.new_sub_package(12, 11), Err(Error::LoopDetected(_))));
        assert!(matches!(f.subs.new_sub_package(11, 11), Err(Error::LoopDetected(_))));
    }

    #[test]
    fn test_invalid_types() {
        let f = setup();
        assert!(matches!(f.subs.new_sub_package(10, 13), Err(Error::BadValue(_))));
        assert!(matches!(f.subs.new_sub_package(10, 0), Err(Error::BadValue(_))));
        assert!(matches!(f.subs.new_sub_package(10, 2), Err(Error::BadValue(_))));
        assert!(matches!(f.subs.new_sub_package(13, 11), Err(Error::BadValue(_))));
        assert!(matches!(f.subs.new_sub_package(0, 11), Err(Error::BadValue(_))));
        assert!(matches!(f.subs.new_sub_package(10, 99), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_trash_breaks_loop_until_revived() {
        let f = setup();
        let foo_in_app = f.subs.new_sub_package(10, 11).unwrap();
        f.subs.move_to_trash(foo_in_app).unwrap();
        assert!(f.subs.is_trashed(foo_in_app).unwrap());

        // With the instance trashed, app may be placed inside libfoo
        f.subs.new_sub_package(11, 10).unwrap();
        assert!(matches!(
            f.subs.revive_from_trash(foo_in_app),
            Err(Error::CantRevive(_))
        ));
    }

    #[test]
    fn test_sub_package_slots() {
        let f = setup();
        let slot = f
            .slots
            .new_slot(
                SlotOwner::Package,
                11,
                &NewSlot::new("Shared", SlotType::Boolean, SlotPos::Parameter)
                    .default_value(SlotValue::Boolean(false)),
            )
            .unwrap();
        let sub = f.subs.new_sub_package(10, 11).unwrap();

        assert_eq!(f.subs.get_slot_value(sub, slot).unwrap(), Some(SlotValue::Boolean(false)));
        f.subs.set_slot_value(sub, slot, &SlotValue::Boolean(true)).unwrap();
        assert!(f.subs.is_slot_set(sub, slot).unwrap());
        f.subs.clear_slot_value(sub, slot).unwrap();
        assert!(!f.subs.is_slot_set(sub, slot).unwrap());
    }
}
