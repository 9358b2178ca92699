// src/slots/mod.rs

//! Slot system
//!
//! Slots are typed, named, positioned attributes defined on an owner (an
//! action type or a package). Instances of the owner (actions and
//! sub-packages respectively) store values against those slots. Unset
//! slots read back as the slot's default.

mod types;

pub use types::{
    NewSlot, SlotCard, SlotDetails, SlotInstance, SlotOwner, SlotPos, SlotType, SlotValue,
    is_valid_slot_name,
};

use crate::db::{Builtins, Database};
use crate::error::{Error, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::rc::Rc;
use tracing::debug;

pub struct SlotMgr {
    db: Rc<Database>,
    builtins: Builtins,
}

impl SlotMgr {
    pub fn new(db: Rc<Database>, builtins: Builtins) -> Self {
        Self { db, builtins }
    }

    /// Define a new slot on an action type or package
    pub fn new_slot(&self, owner: SlotOwner, owner_id: i32, slot: &NewSlot) -> Result<i32> {
        if !is_valid_slot_name(&slot.name) {
            return Err(Error::InvalidName(format!("slot name '{}'", slot.name)));
        }
        if slot.slot_type == SlotType::Enumeration && slot.enum_values.is_empty() {
            return Err(Error::BadValue(format!(
                "enumeration slot '{}' needs at least one value",
                slot.name
            )));
        }
        if slot.slot_type != SlotType::Enumeration && !slot.enum_values.is_empty() {
            return Err(Error::BadValue(format!(
                "slot '{}' is not an enumeration",
                slot.name
            )));
        }
        if let Some(default) = &slot.default_value {
            check_value_shape(slot.slot_type, &slot.enum_values, default)?;
        }

        let enum_json = if slot.enum_values.is_empty() {
            None
        } else {
            Some(
                serde_json::to_string(&slot.enum_values)
                    .map_err(|e| Error::BadValue(format!("enum values: {}", e)))?,
            )
        };

        let id = self.db.atomic(|conn| {
            check_owner(conn, owner, owner_id)?;
            let taken: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM slot_types
                 WHERE owner_type = ?1 AND owner_id = ?2 AND slot_name = ?3)",
                params![owner.as_i32(), owner_id, slot.name],
                |row| row.get(0),
            )?;
            if taken {
                return Err(Error::AlreadyUsed(format!("slot name '{}'", slot.name)));
            }
            conn.execute(
                "INSERT INTO slot_types (owner_type, owner_id, slot_name, slot_descr, slot_type,
                                         slot_pos, slot_card, default_value, enum_values)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    owner.as_i32(),
                    owner_id,
                    slot.name,
                    slot.description,
                    slot.slot_type.as_i32(),
                    slot.pos.as_i32(),
                    slot.card.as_i32(),
                    slot.default_value.as_ref().map(SlotValue::to_stored),
                    enum_json,
                ],
            )?;
            Ok(conn.last_insert_rowid() as i32)
        })?;

        debug!("Defined slot {} '{}' on {:?} {}", id, slot.name, owner, owner_id);
        Ok(id)
    }

    pub fn get_slot_details(&self, slot_id: i32) -> Result<SlotDetails> {
        self.db
            .conn()
            .query_row(
                "SELECT slot_id, owner_type, owner_id, slot_name, slot_descr, slot_type,
                        slot_pos, slot_card, default_value, enum_values
                 FROM slot_types WHERE slot_id = ?1",
                [slot_id],
                |row| Ok(details_from_row(row)),
            )
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("slot {}", slot_id)))?
    }

    /// Look up a slot of an owner by name
    pub fn get_slot_by_name(&self, owner: SlotOwner, owner_id: i32, name: &str) -> Result<i32> {
        self.db
            .conn()
            .query_row(
                "SELECT slot_id FROM slot_types
                 WHERE owner_type = ?1 AND owner_id = ?2 AND slot_name = ?3",
                params![owner.as_i32(), owner_id, name],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("slot '{}' of {:?} {}", name, owner, owner_id)))
    }

    /// Slots of an owner, optionally restricted to one position
    pub fn get_slots(
        &self,
        owner: SlotOwner,
        owner_id: i32,
        pos: Option<SlotPos>,
    ) -> Result<Vec<SlotDetails>> {
        let mut stmt = self.db.conn().prepare(
            "SELECT slot_id, owner_type, owner_id, slot_name, slot_descr, slot_type,
                    slot_pos, slot_card, default_value, enum_values
             FROM slot_types
             WHERE owner_type = ?1 AND owner_id = ?2 AND (?3 IS NULL OR slot_pos = ?3)
             ORDER BY slot_id",
        )?;
        let rows = stmt
            .query_map(
                params![owner.as_i32(), owner_id, pos.map(SlotPos::as_i32)],
                |row| Ok(details_from_row(row)),
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().collect()
    }

    /// Delete a slot definition that no instance holds a value for
    pub fn remove_slot(&self, slot_id: i32) -> Result<()> {
        let details = self.get_slot_details(slot_id)?;
        if details.owner == SlotOwner::ActionType
            && details.owner_id == self.builtins.shell_command_type
        {
            return Err(Error::CantRemove(format!(
                "slot '{}' is built in",
                details.name
            )));
        }
        self.db.atomic(|conn| {
            let in_use: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM slot_values WHERE slot_id = ?1)",
                [slot_id],
                |row| row.get(0),
            )?;
            if in_use {
                return Err(Error::CantRemove(format!(
                    "slot '{}' still has values",
                    details.name
                )));
            }
            conn.execute("DELETE FROM slot_types WHERE slot_id = ?1", [slot_id])?;
            Ok(())
        })?;
        debug!("Removed slot {} '{}'", slot_id, details.name);
        Ok(())
    }

    /// Store a value for a slot of an action or sub-package
    pub fn set_slot_value(
        &self,
        instance: SlotInstance,
        instance_id: i32,
        slot_id: i32,
        value: &SlotValue,
    ) -> Result<()> {
        let details = self.get_slot_details(slot_id)?;
        self.db.atomic(|conn| {
            let (type_id, trashed) = instance_type(conn, instance, instance_id)?;
            if trashed {
                return Err(Error::NotFound(format!(
                    "{:?} {} is trashed",
                    instance, instance_id
                )));
            }
            check_slot_belongs(&details, instance, type_id)?;
            check_value_shape(details.slot_type, &details.enum_values, value)?;
            check_value_target(conn, value)?;
            conn.execute(
                "INSERT INTO slot_values (owner_type, owner_id, slot_id, value)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(owner_type, owner_id, slot_id) DO UPDATE SET value = excluded.value",
                params![instance.as_i32(), instance_id, slot_id, value.to_stored()],
            )?;
            Ok(())
        })?;
        debug!(
            "Set slot {} of {:?} {} to {:?}",
            slot_id, instance, instance_id, value
        );
        Ok(())
    }

    /// Value of a slot, falling back to its default when unset
    pub fn get_slot_value(
        &self,
        instance: SlotInstance,
        instance_id: i32,
        slot_id: i32,
    ) -> Result<Option<SlotValue>> {
        let details = self.get_slot_details(slot_id)?;
        let conn = self.db.conn();
        let (type_id, _) = instance_type(conn, instance, instance_id)?;
        check_slot_belongs(&details, instance, type_id)?;

        let stored: Option<String> = conn
            .query_row(
                "SELECT value FROM slot_values
                 WHERE owner_type = ?1 AND owner_id = ?2 AND slot_id = ?3",
                params![instance.as_i32(), instance_id, slot_id],
                |row| row.get(0),
            )
            .optional()?;
        match stored {
            Some(stored) => Ok(Some(SlotValue::from_stored(details.slot_type, &stored)?)),
            None => Ok(details.default_value),
        }
    }

    /// Whether an explicit value is stored
    pub fn is_slot_set(&self, instance: SlotInstance, instance_id: i32, slot_id: i32) -> Result<bool> {
        Ok(self.db.conn().query_row(
            "SELECT EXISTS(SELECT 1 FROM slot_values
             WHERE owner_type = ?1 AND owner_id = ?2 AND slot_id = ?3)",
            params![instance.as_i32(), instance_id, slot_id],
            |row| row.get(0),
        )?)
    }

    /// Drop an explicit value; returns whether one was stored
    pub fn clear_slot_value(
        &self,
        instance: SlotInstance,
        instance_id: i32,
        slot_id: i32,
    ) -> Result<bool> {
        let removed = self.db.atomic(|conn| {
            Ok(conn.execute(
                "DELETE FROM slot_values WHERE owner_type = ?1 AND owner_id = ?2 AND slot_id = ?3",
                params![instance.as_i32(), instance_id, slot_id],
            )?)
        })?;
        Ok(removed > 0)
    }
}

fn details_from_row(row: &Row) -> Result<SlotDetails> {
    let id: i32 = row.get(0)?;
    let owner: i32 = row.get(1)?;
    let slot_type: i32 = row.get(5)?;
    let pos: i32 = row.get(6)?;
    let card: i32 = row.get(7)?;
    let default_value: Option<String> = row.get(8)?;
    let enum_values: Option<String> = row.get(9)?;

    let corrupt = |what: &str, value: i32| Error::Corrupt(format!("slot {} has {} {}", id, what, value));
    let slot_type = SlotType::from_i32(slot_type).ok_or_else(|| corrupt("type", slot_type))?;
    let enum_values: Vec<String> = match enum_values {
        Some(json) => serde_json::from_str(&json)
            .map_err(|e| Error::Corrupt(format!("slot {} enum values: {}", id, e)))?,
        None => Vec::new(),
    };

    Ok(SlotDetails {
        id,
        owner: SlotOwner::from_i32(owner).ok_or_else(|| corrupt("owner type", owner))?,
        owner_id: row.get(2)?,
        name: row.get(3)?,
        description: row.get(4)?,
        slot_type,
        pos: SlotPos::from_i32(pos).ok_or_else(|| corrupt("position", pos))?,
        card: SlotCard::from_i32(card).ok_or_else(|| corrupt("cardinality", card))?,
        default_value: default_value
            .map(|stored| SlotValue::from_stored(slot_type, &stored))
            .transpose()?,
        enum_values,
    })
}

fn check_owner(conn: &Connection, owner: SlotOwner, owner_id: i32) -> Result<()> {
    let sql = match owner {
        SlotOwner::ActionType => "SELECT is_folder FROM action_types WHERE id = ?1",
        SlotOwner::Package => "SELECT is_folder FROM packages WHERE id = ?1",
    };
    let is_folder: Option<bool> = conn.query_row(sql, [owner_id], |row| row.get(0)).optional()?;
    match is_folder {
        None => Err(Error::NotFound(format!("{:?} {}", owner, owner_id))),
        Some(true) => Err(Error::InvalidOp(format!(
            "{:?} {} is a folder and cannot own slots",
            owner, owner_id
        ))),
        Some(false) => Ok(()),
    }
}

/// Type ID and trashed flag of an action or sub-package
fn instance_type(conn: &Connection, instance: SlotInstance, id: i32) -> Result<(i32, bool)> {
    let sql = match instance {
        SlotInstance::Action => "SELECT action_type, trashed FROM build_actions WHERE id = ?1",
        SlotInstance::SubPackage => "SELECT pkg_type_id, trashed FROM sub_packages WHERE id = ?1",
    };
    conn.query_row(sql, [id], |row| Ok((row.get(0)?, row.get(1)?)))
        .optional()?
        .ok_or_else(|| Error::NotFound(format!("{:?} {}", instance, id)))
}

fn check_slot_belongs(details: &SlotDetails, instance: SlotInstance, type_id: i32) -> Result<()> {
    if details.owner != instance.owner() || details.owner_id != type_id {
        return Err(Error::InvalidOp(format!(
            "slot '{}' does not belong to the type of this {:?}",
            details.name, instance
        )));
    }
    Ok(())
}

fn check_value_shape(slot_type: SlotType, enum_values: &[String], value: &SlotValue) -> Result<()> {
    if value.slot_type() != slot_type {
        return Err(Error::BadValue(format!(
            "expected a {} value, got {:?}",
            slot_type, value
        )));
    }
    if let SlotValue::Enumeration(choice) = value {
        if !enum_values.iter().any(|v| v == choice) {
            return Err(Error::BadValue(format!(
                "'{}' is not one of {:?}",
                choice, enum_values
            )));
        }
    }
    Ok(())
}

/// Path and group values must refer to live entities of the right kind
fn check_value_target(conn: &Connection, value: &SlotValue) -> Result<()> {
    match value {
        SlotValue::Directory(path) | SlotValue::File(path) => {
            let row: Option<(i32, bool)> = conn
                .query_row(
                    "SELECT path_type, trashed FROM files WHERE id = ?1",
                    [*path],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            let path_type = match row {
                Some((path_type, false)) => path_type,
                _ => return Err(Error::NotFound(format!("path {}", path))),
            };
            let is_dir = path_type == crate::files::PathType::Directory.as_i32();
            if matches!(value, SlotValue::Directory(_)) != is_dir {
                return Err(Error::BadValue(format!(
                    "path {} is the wrong kind for this slot",
                    path
                )));
            }
            Ok(())
        }
        SlotValue::FileGroup(group) => {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM file_groups WHERE id = ?1)",
                [*group],
                |row| row.get(0),
            )?;
            if !exists {
                return Err(Error::NotFound(format!("file group {}", group)));
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Rc<Database>, SlotMgr) {
        let db = Rc::new(Database::open_in_memory().unwrap());
        let builtins = Builtins::load(db.conn()).unwrap();
        db.conn()
            .execute_batch(
                "INSERT INTO build_actions (id, parent_id, action_type) VALUES (1, 0, 1);
                 INSERT INTO files (id, parent_id, path_type, name) VALUES (1, 0, 1, 'src');
                 INSERT INTO files (id, parent_id, path_type, name) VALUES (2, 1, 2, 'a.c');
                 INSERT INTO packages (id, name, is_folder, parent_id) VALUES (3, 'libz', 0, 1);
                 INSERT INTO sub_packages (id, pkg_type_id) VALUES (1, 3);",
            )
            .unwrap();
        let mgr = SlotMgr::new(db.clone(), builtins);
        (db, mgr)
    }

    #[test]
    fn test_builtin_shell_command_slots() {
        let (_db, mgr) = setup();
        let params = mgr
            .get_slots(SlotOwner::ActionType, 1, Some(SlotPos::Parameter))
            .unwrap();
        let names: Vec<_> = params.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Command", "Directory"]);

        let command = mgr.get_slot_by_name(SlotOwner::ActionType, 1, "Command").unwrap();
        let details = mgr.get_slot_details(command).unwrap();
        assert_eq!(details.slot_type, SlotType::Text);
        assert_eq!(details.card, SlotCard::Required);
    }

    #[test]
    fn test_action_slot_values() {
        let (_db, mgr) = setup();
        let command = mgr.get_slot_by_name(SlotOwner::ActionType, 1, "Command").unwrap();
        let directory = mgr.get_slot_by_name(SlotOwner::ActionType, 1, "Directory").unwrap();

        assert_eq!(
            mgr.get_slot_value(SlotInstance::Action, 1, command).unwrap(),
            Some(SlotValue::Text(String::new()))
        );
        assert!(!mgr.is_slot_set(SlotInstance::Action, 1, command).unwrap());

        mgr.set_slot_value(SlotInstance::Action, 1, command, &SlotValue::Text("cc -c a.c".into()))
            .unwrap();
        mgr.set_slot_value(SlotInstance::Action, 1, directory, &SlotValue::Directory(1))
            .unwrap();
        assert_eq!(
            mgr.get_slot_value(SlotInstance::Action, 1, directory).unwrap(),
            Some(SlotValue::Directory(1))
        );

        assert!(matches!(
            mgr.set_slot_value(SlotInstance::Action, 1, directory, &SlotValue::Directory(2)),
            Err(Error::BadValue(_))
        ));
        assert!(matches!(
            mgr.set_slot_value(SlotInstance::Action, 1, command, &SlotValue::Integer(4)),
            Err(Error::BadValue(_))
        ));

        assert!(mgr.clear_slot_value(SlotInstance::Action, 1, directory).unwrap());
        assert_eq!(mgr.get_slot_value(SlotInstance::Action, 1, directory).unwrap(), None);
    }

    #[test]
    fn test_package_enum_slot() {
        let (_db, mgr) = setup();
        let slot = NewSlot::new("Optimise", SlotType::Enumeration, SlotPos::Parameter)
            .enum_values(["none", "size", "speed"])
            .default_value(SlotValue::Enumeration("none".into()));
        let id = mgr.new_slot(SlotOwner::Package, 3, &slot).unwrap();

        assert_eq!(
            mgr.get_slot_value(SlotInstance::SubPackage, 1, id).unwrap(),
            Some(SlotValue::Enumeration("none".into()))
        );
        mgr.set_slot_value(SlotInstance::SubPackage, 1, id, &SlotValue::Enumeration("speed".into()))
            .unwrap();
        assert!(matches!(
            mgr.set_slot_value(SlotInstance::SubPackage, 1, id, &SlotValue::Enumeration("fast".into())),
            Err(Error::BadValue(_))
        ));

        assert!(matches!(mgr.remove_slot(id), Err(Error::CantRemove(_))));
        mgr.clear_slot_value(SlotInstance::SubPackage, 1, id).unwrap();
        mgr.remove_slot(id).unwrap();
    }

    #[test]
    fn test_slot_definition_errors() {
        let (_db, mgr) = setup();
        let flag = NewSlot::new("Debug", SlotType::Boolean, SlotPos::Parameter);
        mgr.new_slot(SlotOwner::Package, 3, &flag).unwrap();

        assert!(matches!(
            mgr.new_slot(SlotOwner::Package, 3, &flag),
            Err(Error::AlreadyUsed(_))
        ));
        assert!(matches!(
            mgr.new_slot(SlotOwner::Package, 1, &flag),
            Err(Error::InvalidOp(_))
        ));
        assert!(matches!(
            mgr.new_slot(SlotOwner::Package, 3, &NewSlot::new("9x", SlotType::Text, SlotPos::Local)),
            Err(Error::InvalidName(_))
        ));
        assert!(matches!(
            mgr.new_slot(
                SlotOwner::Package,
                3,
                &NewSlot::new("Mode", SlotType::Enumeration, SlotPos::Local)
            ),
            Err(Error::BadValue(_))
        ));
    }

    #[test]
    fn test_slot_of_other_owner_rejected() {
        let (_db, mgr) = setup();
        let command = mgr.get_slot_by_name(SlotOwner::ActionType, 1, "Command").unwrap();
        assert!(matches!(
            mgr.set_slot_value(SlotInstance::SubPackage, 1, command, &SlotValue::Text("x".into())),
            Err(Error::InvalidOp(_))
        ));
        assert!(matches!(mgr.remove_slot(command), Err(Error::CantRemove(_))));
    }
}
