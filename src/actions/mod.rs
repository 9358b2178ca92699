// src/actions/mod.rs

//! Action graph
//!
//! Actions form a tree under the root action (which is its own parent).
//! Each action has a type, slot values (for shell commands: the command
//! text and working directory) and a set of merged file accesses.

mod access;
pub mod types;

pub use access::{FileAccess, MergeOutcome, OperationType, merge};
pub use types::ActionTypeMgr;

use crate::db::{Builtins, Database};
use crate::error::{Error, Result};
use crate::files::{FileMgr, PathType};
use crate::notify::{ChangeListener, ListenerSet};
use crate::slots::{SlotInstance, SlotMgr, SlotValue};
use rusqlite::{Connection, OptionalExtension, params};
use std::rc::Rc;
use tracing::{debug, warn};

/// Hard upper bound on the number of actions in a store
pub const MAX_ACTIONS: i32 = 1 << 24;

/// Action change notifications
///
/// `SlotChanged` carries the slot ID as the event's sub-field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionChange {
    Added,
    Trashed,
    Revived,
    ParentChanged,
    SlotChanged,
    AccessesChanged,
}

pub struct ActionMgr {
    db: Rc<Database>,
    builtins: Builtins,
    files: Rc<FileMgr>,
    slots: Rc<SlotMgr>,
    listeners: ListenerSet<ActionChange>,
}

impl ActionMgr {
    pub fn new(
        db: Rc<Database>,
        builtins: Builtins,
        files: Rc<FileMgr>,
        slots: Rc<SlotMgr>,
    ) -> Self {
        Self {
            db,
            builtins,
            files,
            slots,
            listeners: ListenerSet::new(),
        }
    }

    pub fn get_root_action(&self) -> i32 {
        self.builtins.root_action
    }

    /// Create an action of the given type under the root action
    pub fn add_action(&self, action_type: i32) -> Result<i32> {
        let id = self.db.atomic(|conn| self.insert_action(conn, action_type, self.builtins.root_action))?;
        debug!("Added action {} of type {}", id, action_type);
        self.listeners.notify(id, ActionChange::Added, None);
        Ok(id)
    }

    /// Create a shell command action under `parent`, run in `directory`
    pub fn add_shell_command_action(&self, parent: i32, directory: i32, command: &str) -> Result<i32> {
        let id = self.db.atomic(|conn| {
            self.require_live(conn, parent)?;
            let id = self.insert_action(conn, self.builtins.shell_command_type, parent)?;
            self.slots.set_slot_value(
                SlotInstance::Action,
                id,
                self.builtins.directory_slot,
                &SlotValue::Directory(directory),
            )?;
            self.slots.set_slot_value(
                SlotInstance::Action,
                id,
                self.builtins.command_slot,
                &SlotValue::Text(command.to_string()),
            )?;
            Ok(id)
        })?;

        debug!("Added shell command action {}: {}", id, command);
        self.listeners.notify(id, ActionChange::Added, None);
        Ok(id)
    }

    fn insert_action(&self, conn: &Connection, action_type: i32, parent: i32) -> Result<i32> {
        let is_folder: Option<bool> = conn
            .query_row(
                "SELECT is_folder FROM action_types WHERE id = ?1",
                [action_type],
                |row| row.get(0),
            )
            .optional()?;
        match is_folder {
            None => return Err(Error::NotFound(format!("action type {}", action_type))),
            Some(true) => {
                return Err(Error::InvalidOp(format!(
                    "action type {} is a folder",
                    action_type
                )));
            }
            Some(false) => {}
        }
        conn.execute(
            "INSERT INTO build_actions (parent_id, action_type) VALUES (?1, ?2)",
            params![parent, action_type],
        )?;
        let id = conn.last_insert_rowid();
        if id >= MAX_ACTIONS as i64 {
            return Err(Error::LimitExceeded(format!(
                "the store cannot hold more than {} actions",
                MAX_ACTIONS
            )));
        }
        Ok(id as i32)
    }

    pub fn get_action_type(&self, action: i32) -> Result<i32> {
        Ok(self.row(self.db.conn(), action)?.action_type)
    }

    pub fn get_parent(&self, action: i32) -> Result<i32> {
        Ok(self.row(self.db.conn(), action)?.parent)
    }

    pub fn is_trashed(&self, action: i32) -> Result<bool> {
        Ok(self.row(self.db.conn(), action)?.trashed)
    }

    /// Whether `action` exists and is not trashed
    pub fn is_valid_action(&self, action: i32) -> Result<bool> {
        match self.row(self.db.conn(), action) {
            Ok(row) => Ok(!row.trashed),
            Err(Error::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Live children of an action, in creation order
    pub fn get_children(&self, action: i32) -> Result<Vec<i32>> {
        let conn = self.db.conn();
        self.row(conn, action)?;
        let mut stmt = conn.prepare(
            "SELECT id FROM build_actions
             WHERE parent_id = ?1 AND trashed = 0 AND id != parent_id
             ORDER BY id",
        )?;
        let ids = stmt
            .query_map([action], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i32>>>()?;
        Ok(ids)
    }

    /// Re-parent an action, refusing to create a cycle
    pub fn set_parent(&self, action: i32, parent: i32) -> Result<()> {
        if action == self.builtins.root_action {
            return Err(Error::InvalidOp("the root action cannot be moved".to_string()));
        }
        self.db.atomic(|conn| {
            self.require_live(conn, action)?;
            self.require_live(conn, parent)?;
            if self.ancestor_walk(conn, action, parent)? {
                return Err(Error::LoopDetected(format!(
                    "action {} is an ancestor of action {}",
                    action, parent
                )));
            }
            conn.execute(
                "UPDATE build_actions SET parent_id = ?2 WHERE id = ?1",
                params![action, parent],
            )?;
            Ok(())
        })?;

        debug!("Moved action {} under action {}", action, parent);
        self.listeners.notify(action, ActionChange::ParentChanged, None);
        Ok(())
    }

    /// Whether `ancestor` is `action` or one of its ancestors
    pub fn is_ancestor_of(&self, ancestor: i32, action: i32) -> Result<bool> {
        self.ancestor_walk(self.db.conn(), ancestor, action)
    }

    fn ancestor_walk(&self, conn: &Connection, ancestor: i32, action: i32) -> Result<bool> {
        let mut current = action;
        for _ in 0..MAX_ACTIONS {
            if current == ancestor {
                return Ok(true);
            }
            let parent = self.row(conn, current)?.parent;
            if parent == current {
                return Ok(false);
            }
            current = parent;
        }
        Err(Error::Corrupt(format!("action {} has a cyclic parent chain", action)))
    }

    /// Record one observed access, merging it into the existing record
    pub fn add_file_access(&self, action: i32, path: i32, operation: OperationType) -> Result<()> {
        let outcome = self.db.atomic(|conn| {
            self.require_live(conn, action)?;
            self.files.validate_path(path)?;

            let existing: Option<(i32, i32)> = conn
                .query_row(
                    "SELECT seqno, operation FROM action_files WHERE action_id = ?1 AND file_id = ?2",
                    params![action, path],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            match existing {
                None => {
                    conn.execute(
                        "INSERT INTO action_files (action_id, file_id, operation) VALUES (?1, ?2, ?3)",
                        params![action, path, operation.as_i32()],
                    )?;
                    Ok(MergeOutcome::Keep(operation))
                }
                Some((seqno, current)) => {
                    let current = op_from_i32(current)?;
                    let outcome = merge(current, operation);
                    match outcome {
                        MergeOutcome::Keep(merged) if merged != current => {
                            conn.execute(
                                "UPDATE action_files SET operation = ?2 WHERE seqno = ?1",
                                params![seqno, merged.as_i32()],
                            )?;
                        }
                        MergeOutcome::Keep(_) => {}
                        MergeOutcome::Remove => {
                            conn.execute("DELETE FROM action_files WHERE seqno = ?1", [seqno])?;
                        }
                    }
                    Ok(outcome)
                }
            }
        })?;

        if outcome == MergeOutcome::Remove {
            debug!("Action {} created and deleted path {}", action, path);
            // The record is gone either way; the path only goes if unused
            match self.files.move_to_trash(path) {
                Ok(()) => {}
                Err(e) if !e.is_fatal() => {
                    warn!("Temporary path {} kept: {}", path, e);
                }
                Err(e) => return Err(e),
            }
        }
        self.listeners.notify(action, ActionChange::AccessesChanged, None);
        Ok(())
    }

    /// Re-insert an access record with a known sequence number
    ///
    /// Used to undo `remove_file_access`. Fails with `OnlyOneAllowed` when
    /// the action already has a record for the path.
    pub fn add_sequenced_file_access(
        &self,
        seqno: i32,
        action: i32,
        path: i32,
        operation: OperationType,
    ) -> Result<()> {
        self.db.atomic(|conn| {
            self.require_live(conn, action)?;
            self.files.validate_path(path)?;
            let pair_exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM action_files WHERE action_id = ?1 AND file_id = ?2)",
                params![action, path],
                |row| row.get(0),
            )?;
            if pair_exists {
                return Err(Error::OnlyOneAllowed(format!(
                    "action {} already accesses path {}",
                    action, path
                )));
            }
            let seq_exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM action_files WHERE seqno = ?1)",
                [seqno],
                |row| row.get(0),
            )?;
            if seq_exists {
                return Err(Error::AlreadyUsed(format!("sequence number {}", seqno)));
            }
            conn.execute(
                "INSERT INTO action_files (seqno, action_id, file_id, operation)
                 VALUES (?1, ?2, ?3, ?4)",
                params![seqno, action, path, operation.as_i32()],
            )?;
            Ok(())
        })?;

        self.listeners.notify(action, ActionChange::AccessesChanged, None);
        Ok(())
    }

    /// Drop the access record of `action` for `path`, returning its seqno
    pub fn remove_file_access(&self, action: i32, path: i32) -> Result<i32> {
        let seqno = self.db.atomic(|conn| {
            let seqno: Option<i32> = conn
                .query_row(
                    "SELECT seqno FROM action_files WHERE action_id = ?1 AND file_id = ?2",
                    params![action, path],
                    |row| row.get(0),
                )
                .optional()?;
            let seqno = seqno.ok_or_else(|| {
                Error::NotFound(format!("access of action {} to path {}", action, path))
            })?;
            conn.execute("DELETE FROM action_files WHERE seqno = ?1", [seqno])?;
            Ok(seqno)
        })?;

        self.listeners.notify(action, ActionChange::AccessesChanged, None);
        Ok(seqno)
    }

    /// Merged operation of `action` on `path`, if it accessed it at all
    pub fn get_file_access(&self, action: i32, path: i32) -> Result<Option<OperationType>> {
        let op: Option<i32> = self
            .db
            .conn()
            .query_row(
                "SELECT operation FROM action_files WHERE action_id = ?1 AND file_id = ?2",
                params![action, path],
                |row| row.get(0),
            )
            .optional()?;
        op.map(op_from_i32).transpose()
    }

    /// Every access record of an action, in sequence order
    pub fn get_file_accesses(&self, action: i32) -> Result<Vec<FileAccess>> {
        let mut stmt = self.db.conn().prepare(
            "SELECT seqno, file_id, operation FROM action_files
             WHERE action_id = ?1 ORDER BY seqno",
        )?;
        let rows = stmt
            .query_map([action], |row| {
                Ok((row.get::<_, i32>(0)?, row.get::<_, i32>(1)?, row.get::<_, i32>(2)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter()
            .map(|(seqno, path, op)| {
                Ok(FileAccess {
                    seqno,
                    path,
                    operation: op_from_i32(op)?,
                })
            })
            .collect()
    }

    /// Live paths accessed by an action, optionally with one operation only
    pub fn get_files_accessed(&self, action: i32, operation: Option<OperationType>) -> Result<Vec<i32>> {
        let mut stmt = self.db.conn().prepare(
            "SELECT a.file_id FROM action_files a JOIN files f ON a.file_id = f.id
             WHERE a.action_id = ?1 AND f.trashed = 0 AND (?2 IS NULL OR a.operation = ?2)
             ORDER BY a.seqno",
        )?;
        let ids = stmt
            .query_map(params![action, operation.map(OperationType::as_i32)], |row| {
                row.get(0)
            })?
            .collect::<rusqlite::Result<Vec<i32>>>()?;
        Ok(ids)
    }

    /// Live actions that accessed a path, optionally with one operation only
    pub fn get_actions_that_access(&self, path: i32, operation: Option<OperationType>) -> Result<Vec<i32>> {
        let mut stmt = self.db.conn().prepare(
            "SELECT a.action_id FROM action_files a JOIN build_actions b ON a.action_id = b.id
             WHERE a.file_id = ?1 AND b.trashed = 0 AND (?2 IS NULL OR a.operation = ?2)
             ORDER BY a.seqno",
        )?;
        let ids = stmt
            .query_map(params![path, operation.map(OperationType::as_i32)], |row| {
                row.get(0)
            })?
            .collect::<rusqlite::Result<Vec<i32>>>()?;
        Ok(ids)
    }

    /// Soft-delete an action with no children and no file accesses
    pub fn move_to_trash(&self, action: i32) -> Result<()> {
        if action == self.builtins.root_action {
            return Err(Error::CantRemove("the root action cannot be trashed".to_string()));
        }
        let changed = self.db.atomic(|conn| {
            if self.row(conn, action)?.trashed {
                return Ok(false);
            }
            let has_children: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM build_actions
                 WHERE parent_id = ?1 AND trashed = 0 AND id != parent_id)",
                [action],
                |row| row.get(0),
            )?;
            if has_children {
                return Err(Error::CantRemove(format!("action {} has children", action)));
            }
            let has_accesses: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM action_files WHERE action_id = ?1)",
                [action],
                |row| row.get(0),
            )?;
            if has_accesses {
                return Err(Error::CantRemove(format!(
                    "action {} still has file accesses",
                    action
                )));
            }
            conn.execute("UPDATE build_actions SET trashed = 1 WHERE id = ?1", [action])?;
            Ok(true)
        })?;

        if changed {
            debug!("Trashed action {}", action);
            self.listeners.notify(action, ActionChange::Trashed, None);
        }
        Ok(())
    }

    pub fn revive_from_trash(&self, action: i32) -> Result<()> {
        let changed = self.db.atomic(|conn| {
            let row = self.row(conn, action)?;
            if !row.trashed {
                return Ok(false);
            }
            if self.row(conn, row.parent)?.trashed {
                return Err(Error::CantRevive(format!(
                    "parent of action {} is trashed",
                    action
                )));
            }
            conn.execute("UPDATE build_actions SET trashed = 0 WHERE id = ?1", [action])?;
            Ok(true)
        })?;

        if changed {
            debug!("Revived action {}", action);
            self.listeners.notify(action, ActionChange::Revived, None);
        }
        Ok(())
    }

    pub fn get_slot_value(&self, action: i32, slot: i32) -> Result<Option<SlotValue>> {
        self.slots.get_slot_value(SlotInstance::Action, action, slot)
    }

    pub fn set_slot_value(&self, action: i32, slot: i32, value: &SlotValue) -> Result<()> {
        self.slots.set_slot_value(SlotInstance::Action, action, slot, value)?;
        self.listeners.notify(action, ActionChange::SlotChanged, Some(slot));
        Ok(())
    }

    pub fn clear_slot_value(&self, action: i32, slot: i32) -> Result<()> {
        if self.slots.clear_slot_value(SlotInstance::Action, action, slot)? {
            self.listeners.notify(action, ActionChange::SlotChanged, Some(slot));
        }
        Ok(())
    }

    pub fn is_slot_set(&self, action: i32, slot: i32) -> Result<bool> {
        self.slots.is_slot_set(SlotInstance::Action, action, slot)
    }

    /// Command text of a shell command action
    pub fn get_command(&self, action: i32) -> Result<String> {
        let value = self.get_slot_value(action, self.builtins.command_slot)?;
        Ok(value
            .and_then(|v| v.as_text().map(str::to_string))
            .unwrap_or_default())
    }

    pub fn set_command(&self, action: i32, command: &str) -> Result<()> {
        self.set_slot_value(
            action,
            self.builtins.command_slot,
            &SlotValue::Text(command.to_string()),
        )
    }

    /// Working directory of a shell command action
    pub fn get_directory(&self, action: i32) -> Result<Option<i32>> {
        Ok(self
            .get_slot_value(action, self.builtins.directory_slot)?
            .and_then(|v| v.as_id()))
    }

    pub fn set_directory(&self, action: i32, directory: i32) -> Result<()> {
        if self.files.validate_path(directory)? != PathType::Directory {
            return Err(Error::NotADirectory(format!("path {}", directory)));
        }
        self.set_slot_value(
            action,
            self.builtins.directory_slot,
            &SlotValue::Directory(directory),
        )
    }

    pub fn add_listener(&self, listener: Rc<dyn ChangeListener<ActionChange>>) {
        self.listeners.add(listener);
    }

    pub fn remove_listener(&self, listener: &Rc<dyn ChangeListener<ActionChange>>) {
        self.listeners.remove(listener);
    }

    fn row(&self, conn: &Connection, action: i32) -> Result<ActionRow> {
        conn.query_row(
            "SELECT parent_id, action_type, trashed FROM build_actions WHERE id = ?1",
            [action],
            |row| {
                Ok(ActionRow {
                    parent: row.get(0)?,
                    action_type: row.get(1)?,
                    trashed: row.get(2)?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| Error::NotFound(format!("action {}", action)))
    }

    fn require_live(&self, conn: &Connection, action: i32) -> Result<()> {
        if self.row(conn, action)?.trashed {
            return Err(Error::NotFound(format!("action {} is trashed", action)));
        }
        Ok(())
    }
}

struct ActionRow {
    parent: i32,
    action_type: i32,
    trashed: bool,
}

fn op_from_i32(value: i32) -> Result<OperationType> {
    OperationType::from_i32(value)
        .ok_or_else(|| Error::Corrupt(format!("unknown operation type {}", value)))
}
