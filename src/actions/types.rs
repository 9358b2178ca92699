// src/actions/types.rs

//! Action types
//!
//! Types are arranged in a folder tree under a built-in root folder. The
//! only type defined out of the box is "Shell Command".

use crate::db::{Builtins, Database};
use crate::error::{Error, Result};
use crate::slots::{SlotDetails, SlotMgr, SlotOwner, SlotPos};
use rusqlite::OptionalExtension;
use std::rc::Rc;

pub struct ActionTypeMgr {
    db: Rc<Database>,
    builtins: Builtins,
    slots: Rc<SlotMgr>,
}

impl ActionTypeMgr {
    pub fn new(db: Rc<Database>, builtins: Builtins, slots: Rc<SlotMgr>) -> Self {
        Self { db, builtins, slots }
    }

    pub fn get_root_folder(&self) -> i32 {
        self.builtins.action_type_folder
    }

    pub fn get_shell_command_type(&self) -> i32 {
        self.builtins.shell_command_type
    }

    pub fn get_name(&self, type_id: i32) -> Result<String> {
        self.column(type_id, "SELECT name FROM action_types WHERE id = ?1")
    }

    pub fn get_description(&self, type_id: i32) -> Result<String> {
        self.column(type_id, "SELECT description FROM action_types WHERE id = ?1")
    }

    pub fn is_folder(&self, type_id: i32) -> Result<bool> {
        self.column(type_id, "SELECT is_folder FROM action_types WHERE id = ?1")
    }

    pub fn get_parent(&self, type_id: i32) -> Result<i32> {
        self.column(type_id, "SELECT parent_id FROM action_types WHERE id = ?1")
    }

    pub fn get_id_by_name(&self, name: &str) -> Result<i32> {
        self.db
            .conn()
            .query_row(
                "SELECT id FROM action_types WHERE name = ?1",
                [name],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("action type '{}'", name)))
    }

    /// Types and folders directly inside a folder, by name
    pub fn get_folder_children(&self, folder: i32) -> Result<Vec<i32>> {
        if !self.is_folder(folder)? {
            return Err(Error::InvalidOp(format!("action type {} is not a folder", folder)));
        }
        let mut stmt = self.db.conn().prepare(
            "SELECT id FROM action_types WHERE parent_id = ?1 AND id != parent_id ORDER BY name",
        )?;
        let ids = stmt
            .query_map([folder], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i32>>>()?;
        Ok(ids)
    }

    /// Slots of an action type, optionally at one position only
    pub fn get_slots(&self, type_id: i32, pos: Option<SlotPos>) -> Result<Vec<SlotDetails>> {
        if self.is_folder(type_id)? {
            return Err(Error::InvalidOp(format!(
                "action type folder {} has no slots",
                type_id
            )));
        }
        self.slots.get_slots(SlotOwner::ActionType, type_id, pos)
    }

    pub fn get_slot_by_name(&self, type_id: i32, name: &str) -> Result<i32> {
        self.slots.get_slot_by_name(SlotOwner::ActionType, type_id, name)
    }

    fn column<T: rusqlite::types::FromSql>(&self, type_id: i32, sql: &str) -> Result<T> {
        self.db
            .conn()
            .query_row(sql, [type_id], |row| row.get(0))
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("action type {}", type_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_mgr() -> ActionTypeMgr {
        let db = Rc::new(Database::open_in_memory().unwrap());
        let builtins = Builtins::load(db.conn()).unwrap();
        let slots = Rc::new(SlotMgr::new(db.clone(), builtins));
        ActionTypeMgr::new(db, builtins, slots)
    }

    #[test]
    fn test_builtin_types() {
        let mgr = create_test_mgr();
        let shell = mgr.get_id_by_name("Shell Command").unwrap();
        assert_eq!(shell, mgr.get_shell_command_type());
        assert!(!mgr.is_folder(shell).unwrap());
        assert!(mgr.is_folder(mgr.get_root_folder()).unwrap());
        assert_eq!(mgr.get_parent(shell).unwrap(), mgr.get_root_folder());
        assert_eq!(
            mgr.get_folder_children(mgr.get_root_folder()).unwrap(),
            vec![shell]
        );
        assert!(!mgr.get_description(shell).unwrap().is_empty());
    }

    #[test]
    fn test_shell_command_slots() {
        let mgr = create_test_mgr();
        let shell = mgr.get_shell_command_type();
        let inputs = mgr.get_slots(shell, Some(SlotPos::Input)).unwrap();
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].name, "Input");
        assert_eq!(mgr.get_slots(shell, None).unwrap().len(), 4);
        assert!(matches!(
            mgr.get_slots(mgr.get_root_folder(), None),
            Err(Error::InvalidOp(_))
        ));
    }

    #[test]
    fn test_unknown_type() {
        let mgr = create_test_mgr();
        assert!(matches!(mgr.get_name(42), Err(Error::NotFound(_))));
        assert!(matches!(mgr.get_id_by_name("Make"), Err(Error::NotFound(_))));
    }
}
