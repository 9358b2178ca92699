// src/db/schema.rs

//! Database schema definitions and migrations for the build store
//!
//! The schema is fixed and versioned. Migrations are applied strictly in
//! sequence (old version -> current); there is no downgrade path.

use crate::error::{Error, Result};
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version
pub const SCHEMA_VERSION: i32 = 3;

/// Initialize the schema version tracking table
fn init_schema_version(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}

/// Get the current schema version from the database (0 for a new store)
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    init_schema_version(conn)?;

    let version: Option<i32> = conn.query_row(
        "SELECT MAX(version) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    Ok(version.unwrap_or(0))
}

/// Set the schema version
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// Apply all pending migrations up to `SCHEMA_VERSION`
pub fn migrate(conn: &Connection) -> Result<()> {
    migrate_to(conn, SCHEMA_VERSION)
}

/// Apply pending migrations up to (and including) `target`
///
/// Each version is applied in its own transaction together with its
/// version stamp.
pub fn migrate_to(conn: &Connection, target: i32) -> Result<()> {
    let current_version = get_schema_version(conn)?;
    debug!("Current schema version: {}", current_version);

    if current_version > SCHEMA_VERSION {
        return Err(Error::SchemaVersion {
            found: current_version,
            expected: SCHEMA_VERSION,
        });
    }

    if current_version >= target {
        debug!("Schema is up to date");
        return Ok(());
    }

    for version in (current_version + 1)..=target {
        info!("Applying migration to version {}", version);
        let tx = conn.unchecked_transaction()?;
        apply_migration(&tx, version)?;
        set_schema_version(&tx, version)?;
        tx.commit()?;
    }

    info!("Schema migration complete. Now at version {}", target);
    Ok(())
}

/// Apply a specific migration version
fn apply_migration(conn: &Connection, version: i32) -> Result<()> {
    match version {
        1 => migrate_v1(conn),
        2 => migrate_v2(conn),
        3 => migrate_v3(conn),
        _ => Err(Error::SchemaVersion {
            found: version,
            expected: SCHEMA_VERSION,
        }),
    }
}

/// Version 1: path namespace, roots, actions and file accesses
///
/// Actions carried their shell command and working directory as plain
/// columns in this version.
fn migrate_v1(conn: &Connection) -> Result<()> {
    debug!("Creating schema version 1");

    conn.execute_batch(
        "
        -- Paths: one global tree rooted at id 0 (\"/\")
        CREATE TABLE files (
            id INTEGER PRIMARY KEY,
            parent_id INTEGER NOT NULL,
            trashed INTEGER NOT NULL DEFAULT 0,
            path_type INTEGER NOT NULL,
            name TEXT NOT NULL,
            UNIQUE(parent_id, name)
        );

        CREATE INDEX idx_files_trashed ON files(trashed);

        INSERT INTO files (id, parent_id, trashed, path_type, name) VALUES (0, 0, 0, 1, '/');

        -- Named roots anchoring sub-trees
        CREATE TABLE file_roots (
            name TEXT PRIMARY KEY,
            file_id INTEGER NOT NULL
        );

        CREATE INDEX idx_file_roots_file_id ON file_roots(file_id);

        INSERT INTO file_roots (name, file_id) VALUES ('root', 0);
        INSERT INTO file_roots (name, file_id) VALUES ('workspace', 0);

        -- Include relationships between files
        CREATE TABLE file_includes (
            file_id1 INTEGER NOT NULL,
            file_id2 INTEGER NOT NULL,
            usage_count INTEGER NOT NULL,
            PRIMARY KEY (file_id1, file_id2)
        );

        CREATE INDEX idx_file_includes_file_id2 ON file_includes(file_id2);

        -- Actions: a tree rooted at id 0, which is its own parent
        CREATE TABLE build_actions (
            id INTEGER PRIMARY KEY,
            parent_id INTEGER NOT NULL,
            trashed INTEGER NOT NULL DEFAULT 0,
            action_type INTEGER NOT NULL,
            command TEXT,
            directory_id INTEGER
        );

        CREATE INDEX idx_build_actions_parent_id ON build_actions(parent_id);

        INSERT INTO build_actions (id, parent_id, trashed, action_type, command)
            VALUES (0, 0, 0, 1, '<root>');

        -- File accesses: at most one merged record per (action, path)
        CREATE TABLE action_files (
            seqno INTEGER PRIMARY KEY AUTOINCREMENT,
            action_id INTEGER NOT NULL,
            file_id INTEGER NOT NULL,
            operation INTEGER NOT NULL,
            UNIQUE(action_id, file_id)
        );

        CREATE INDEX idx_action_files_file_id ON action_files(file_id);

        -- Store-wide key/value settings
        CREATE TABLE settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        ",
    )?;

    info!("Schema version 1 created successfully");
    Ok(())
}

/// Version 2: package hierarchy, package roots and membership
fn migrate_v2(conn: &Connection) -> Result<()> {
    debug!("Migrating to schema version 2");

    conn.execute_batch(
        "
        CREATE TABLE packages (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            is_folder INTEGER NOT NULL DEFAULT 0,
            parent_id INTEGER NOT NULL
        );

        CREATE INDEX idx_packages_parent_id ON packages(parent_id);

        INSERT INTO packages (id, name, is_folder, parent_id) VALUES (0, '<import>', 0, 1);
        INSERT INTO packages (id, name, is_folder, parent_id) VALUES (1, 'Root', 1, 1);
        INSERT INTO packages (id, name, is_folder, parent_id) VALUES (2, 'Main', 0, 1);

        -- Explicit source/generated roots; a missing row means the workspace root
        CREATE TABLE package_roots (
            pkg_id INTEGER NOT NULL,
            root_type INTEGER NOT NULL,
            file_id INTEGER NOT NULL,
            PRIMARY KEY (pkg_id, root_type)
        );

        CREATE INDEX idx_package_roots_file_id ON package_roots(file_id);

        -- Membership; absent files and actions belong to <import>
        CREATE TABLE package_members (
            member_type INTEGER NOT NULL,
            member_id INTEGER NOT NULL,
            pkg_id INTEGER NOT NULL,
            scope_id INTEGER NOT NULL DEFAULT 0,
            x INTEGER NOT NULL DEFAULT -1,
            y INTEGER NOT NULL DEFAULT -1,
            PRIMARY KEY (member_type, member_id)
        );

        CREATE INDEX idx_package_members_pkg_id ON package_members(pkg_id);
        ",
    )?;

    info!("Schema version 2 created successfully");
    Ok(())
}

/// Version 3: slots, action types, sub-packages and file groups
///
/// Moves the command and directory columns of `build_actions` into slot
/// values of the built-in Shell Command type.
fn migrate_v3(conn: &Connection) -> Result<()> {
    debug!("Migrating to schema version 3");

    conn.execute_batch(
        "
        CREATE TABLE action_types (
            id INTEGER PRIMARY KEY,
            parent_id INTEGER NOT NULL,
            is_folder INTEGER NOT NULL DEFAULT 0,
            name TEXT NOT NULL UNIQUE,
            description TEXT NOT NULL DEFAULT ''
        );

        INSERT INTO action_types (id, parent_id, is_folder, name, description)
            VALUES (0, 0, 1, 'All Action Types', 'Root folder of all action types');
        INSERT INTO action_types (id, parent_id, is_folder, name, description)
            VALUES (1, 0, 0, 'Shell Command', 'Executes a single shell command');

        CREATE TABLE slot_types (
            slot_id INTEGER PRIMARY KEY,
            owner_type INTEGER NOT NULL,
            owner_id INTEGER NOT NULL,
            slot_name TEXT NOT NULL,
            slot_descr TEXT NOT NULL DEFAULT '',
            slot_type INTEGER NOT NULL,
            slot_pos INTEGER NOT NULL,
            slot_card INTEGER NOT NULL,
            default_value TEXT,
            enum_values TEXT,
            UNIQUE(owner_type, owner_id, slot_name)
        );

        -- Built-in Shell Command slots (owner_type 1 = action type)
        INSERT INTO slot_types (slot_id, owner_type, owner_id, slot_name, slot_descr, slot_type, slot_pos, slot_card, default_value)
            VALUES (1, 1, 1, 'Input', 'Files read by the command', 1, 1, 1, NULL);
        INSERT INTO slot_types (slot_id, owner_type, owner_id, slot_name, slot_descr, slot_type, slot_pos, slot_card, default_value)
            VALUES (2, 1, 1, 'Output', 'Files written by the command', 1, 2, 1, NULL);
        INSERT INTO slot_types (slot_id, owner_type, owner_id, slot_name, slot_descr, slot_type, slot_pos, slot_card, default_value)
            VALUES (3, 1, 1, 'Command', 'Shell command text', 4, 3, 2, '');
        INSERT INTO slot_types (slot_id, owner_type, owner_id, slot_name, slot_descr, slot_type, slot_pos, slot_card, default_value)
            VALUES (4, 1, 1, 'Directory', 'Working directory', 6, 3, 1, NULL);

        -- Explicit slot values (owner_type 1 = action, 2 = sub-package)
        CREATE TABLE slot_values (
            owner_type INTEGER NOT NULL,
            owner_id INTEGER NOT NULL,
            slot_id INTEGER NOT NULL,
            value TEXT NOT NULL,
            PRIMARY KEY (owner_type, owner_id, slot_id)
        );

        CREATE INDEX idx_slot_values_slot_id ON slot_values(slot_id);

        INSERT INTO slot_values (owner_type, owner_id, slot_id, value)
            SELECT 1, id, 3, command FROM build_actions WHERE command IS NOT NULL;
        INSERT INTO slot_values (owner_type, owner_id, slot_id, value)
            SELECT 1, id, 4, CAST(directory_id AS TEXT) FROM build_actions
            WHERE directory_id IS NOT NULL;

        ALTER TABLE build_actions DROP COLUMN command;
        ALTER TABLE build_actions DROP COLUMN directory_id;

        CREATE TABLE sub_packages (
            id INTEGER PRIMARY KEY,
            pkg_type_id INTEGER NOT NULL,
            trashed INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX idx_sub_packages_pkg_type_id ON sub_packages(pkg_type_id);

        CREATE TABLE file_groups (
            id INTEGER PRIMARY KEY,
            group_type INTEGER NOT NULL
        );

        -- Ordered group content: path IDs (source) or group IDs (merge)
        CREATE TABLE file_group_entries (
            group_id INTEGER NOT NULL,
            position INTEGER NOT NULL,
            entry_id INTEGER NOT NULL
        );

        CREATE INDEX idx_file_group_entries_group_id ON file_group_entries(group_id);
        CREATE INDEX idx_file_group_entries_entry_id ON file_group_entries(entry_id);
        ",
    )?;

    info!("Schema version 3 created successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn create_test_db() -> (NamedTempFile, Connection) {
        let temp_file = NamedTempFile::new().unwrap();
        let conn = Connection::open(temp_file.path()).unwrap();
        (temp_file, conn)
    }

    fn table_names(conn: &Connection) -> Vec<String> {
        conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn test_schema_version_tracking() {
        let (_temp, conn) = create_test_db();

        assert_eq!(get_schema_version(&conn).unwrap(), 0);

        set_schema_version(&conn, 1).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), 1);
    }

    #[test]
    fn test_migrate_creates_all_tables() {
        let (_temp, conn) = create_test_db();
        migrate(&conn).unwrap();

        let tables = table_names(&conn);
        for expected in [
            "files",
            "file_roots",
            "file_includes",
            "build_actions",
            "action_files",
            "settings",
            "packages",
            "package_roots",
            "package_members",
            "action_types",
            "slot_types",
            "slot_values",
            "sub_packages",
            "file_groups",
            "file_group_entries",
            "schema_version",
        ] {
            assert!(tables.contains(&expected.to_string()), "missing {}", expected);
        }
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let (_temp, conn) = create_test_db();

        migrate(&conn).unwrap();
        migrate(&conn).unwrap();

        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_v3_moves_commands_into_slots() {
        let (_temp, conn) = create_test_db();
        migrate_to(&conn, 1).unwrap();

        conn.execute(
            "INSERT INTO build_actions (id, parent_id, action_type, command, directory_id)
             VALUES (5, 0, 1, 'gcc -c a.c', 0)",
            [],
        )
        .unwrap();

        migrate(&conn).unwrap();

        let command: String = conn
            .query_row(
                "SELECT value FROM slot_values WHERE owner_type = 1 AND owner_id = 5 AND slot_id = 3",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(command, "gcc -c a.c");

        let dir: String = conn
            .query_row(
                "SELECT value FROM slot_values WHERE owner_type = 1 AND owner_id = 5 AND slot_id = 4",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(dir, "0");
    }

    #[test]
    fn test_newer_schema_rejected() {
        let (_temp, conn) = create_test_db();
        migrate(&conn).unwrap();
        set_schema_version(&conn, SCHEMA_VERSION + 1).unwrap();

        let result = migrate(&conn);
        assert!(matches!(result, Err(Error::SchemaVersion { .. })));
    }

    #[test]
    fn test_path_names_unique_per_parent() {
        let (_temp, conn) = create_test_db();
        migrate(&conn).unwrap();

        conn.execute(
            "INSERT INTO files (parent_id, path_type, name) VALUES (0, 2, 'a.c')",
            [],
        )
        .unwrap();
        let result = conn.execute(
            "INSERT INTO files (parent_id, path_type, name) VALUES (0, 2, 'a.c')",
            [],
        );
        assert!(result.is_err());
    }
}
