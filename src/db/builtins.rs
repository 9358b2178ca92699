// src/db/builtins.rs

//! Built-in entities created by the initial migrations
//!
//! The IDs are resolved once when a store is opened and then shared
//! read-only by every manager.

use crate::error::{Error, Result};
use rusqlite::{Connection, OptionalExtension};

/// Name of the root anchored at "/"
pub const ROOT_ROOT_NAME: &str = "root";

/// Name of the root every package root must lie under
pub const WORKSPACE_ROOT_NAME: &str = "workspace";

/// Name of the universal package holding unassigned members
pub const IMPORT_PACKAGE_NAME: &str = "<import>";

/// Name of the top-level package
pub const MAIN_PACKAGE_NAME: &str = "Main";

/// Name of the root package folder
pub const ROOT_FOLDER_NAME: &str = "Root";

/// Name of the built-in action type
pub const SHELL_COMMAND_TYPE_NAME: &str = "Shell Command";

/// IDs of the built-in rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Builtins {
    pub root_path: i32,
    pub root_action: i32,
    pub action_type_folder: i32,
    pub shell_command_type: i32,
    pub input_slot: i32,
    pub output_slot: i32,
    pub command_slot: i32,
    pub directory_slot: i32,
    pub import_package: i32,
    pub main_package: i32,
    pub root_folder: i32,
}

impl Builtins {
    /// Resolve the built-in IDs from an initialised store
    pub fn load(conn: &Connection) -> Result<Self> {
        let root_path = lookup(
            conn,
            "SELECT id FROM files WHERE id = parent_id AND name = '/'",
            "/",
        )?;
        let root_action = lookup(
            conn,
            "SELECT id FROM build_actions WHERE id = parent_id",
            "root action",
        )?;
        let action_type_folder = lookup(
            conn,
            "SELECT id FROM action_types WHERE id = parent_id AND is_folder = 1",
            "action type folder",
        )?;
        let shell_command_type = lookup_named(
            conn,
            "SELECT id FROM action_types WHERE name = ?1",
            SHELL_COMMAND_TYPE_NAME,
        )?;
        let import_package = lookup_named(
            conn,
            "SELECT id FROM packages WHERE name = ?1",
            IMPORT_PACKAGE_NAME,
        )?;
        let main_package = lookup_named(
            conn,
            "SELECT id FROM packages WHERE name = ?1",
            MAIN_PACKAGE_NAME,
        )?;
        let root_folder = lookup_named(
            conn,
            "SELECT id FROM packages WHERE name = ?1 AND is_folder = 1",
            ROOT_FOLDER_NAME,
        )?;

        let slot = |name: &str| -> Result<i32> {
            conn.query_row(
                "SELECT slot_id FROM slot_types
                 WHERE owner_type = 1 AND owner_id = ?1 AND slot_name = ?2",
                rusqlite::params![shell_command_type, name],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| Error::Corrupt(format!("built-in slot '{}' is missing", name)))
        };

        Ok(Self {
            root_path,
            root_action,
            action_type_folder,
            shell_command_type,
            input_slot: slot("Input")?,
            output_slot: slot("Output")?,
            command_slot: slot("Command")?,
            directory_slot: slot("Directory")?,
            import_package,
            main_package,
            root_folder,
        })
    }
}

fn lookup(conn: &Connection, sql: &str, what: &str) -> Result<i32> {
    conn.query_row(sql, [], |row| row.get(0))
        .optional()?
        .ok_or_else(|| Error::Corrupt(format!("built-in {} is missing", what)))
}

fn lookup_named(conn: &Connection, sql: &str, name: &str) -> Result<i32> {
    conn.query_row(sql, [name], |row| row.get(0))
        .optional()?
        .ok_or_else(|| Error::Corrupt(format!("built-in '{}' is missing", name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[test]
    fn test_load_builtins() {
        let db = Database::open_in_memory().unwrap();
        let builtins = Builtins::load(db.conn()).unwrap();

        assert_eq!(builtins.root_path, 0);
        assert_eq!(builtins.root_action, 0);
        assert_eq!(builtins.import_package, 0);
        assert_eq!(builtins.root_folder, 1);
        assert_eq!(builtins.main_package, 2);
        assert_eq!(builtins.shell_command_type, 1);
        assert_eq!(builtins.command_slot, 3);
        assert_eq!(builtins.directory_slot, 4);
    }

    #[test]
    fn test_missing_builtin_is_corruption() {
        let db = Database::open_in_memory().unwrap();
        db.conn()
            .execute("DELETE FROM packages WHERE name = 'Main'", [])
            .unwrap();

        let result = Builtins::load(db.conn());
        assert!(matches!(result, Err(Error::Corrupt(_))));
    }
}
