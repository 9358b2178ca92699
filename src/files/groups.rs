// src/files/groups.rs

//! File groups
//!
//! A source group is an ordered list of paths. A merge group is an ordered
//! list of other groups, expanded recursively when its files are requested.
//! Groups are package members and serve as the values of file-group slots
//! (an action's Input and Output, for example).

use crate::db::Database;
use crate::error::{Error, Result};
use crate::notify::{ChangeListener, ListenerSet};
use crate::packages::MemberType;
use crate::slots::SlotType;
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::HashSet;
use std::rc::Rc;
use tracing::debug;

/// Kind of a file group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileGroupType {
    Source,
    Merge,
}

impl FileGroupType {
    pub fn as_i32(self) -> i32 {
        match self {
            FileGroupType::Source => 1,
            FileGroupType::Merge => 2,
        }
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(FileGroupType::Source),
            2 => Some(FileGroupType::Merge),
            _ => None,
        }
    }
}

/// Group change notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupChange {
    Added,
    Changed,
    Removed,
}

pub struct FileGroupMgr {
    db: Rc<Database>,
    listeners: ListenerSet<GroupChange>,
}

impl FileGroupMgr {
    pub fn new(db: Rc<Database>) -> Self {
        Self {
            db,
            listeners: ListenerSet::new(),
        }
    }

    /// Create an empty source group owned by `pkg`
    pub fn new_source_group(&self, pkg: i32) -> Result<i32> {
        self.new_group(pkg, FileGroupType::Source)
    }

    /// Create an empty merge group owned by `pkg`
    pub fn new_merge_group(&self, pkg: i32) -> Result<i32> {
        self.new_group(pkg, FileGroupType::Merge)
    }

    fn new_group(&self, pkg: i32, group_type: FileGroupType) -> Result<i32> {
        let id = self.db.atomic(|conn| {
            let is_folder: Option<bool> = conn
                .query_row(
                    "SELECT is_folder FROM packages WHERE id = ?1",
                    [pkg],
                    |row| row.get(0),
                )
                .optional()?;
            match is_folder {
                None => return Err(Error::NotFound(format!("package {}", pkg))),
                Some(true) => {
                    return Err(Error::InvalidOp(format!("package {} is a folder", pkg)));
                }
                Some(false) => {}
            }
            conn.execute(
                "INSERT INTO file_groups (group_type) VALUES (?1)",
                [group_type.as_i32()],
            )?;
            let id = conn.last_insert_rowid() as i32;
            conn.execute(
                "INSERT INTO package_members (member_type, member_id, pkg_id) VALUES (?1, ?2, ?3)",
                params![MemberType::FileGroup.as_i32(), id, pkg],
            )?;
            Ok(id)
        })?;

        debug!("Created {:?} file group {} in package {}", group_type, id, pkg);
        self.listeners.notify(id, GroupChange::Added, None);
        Ok(id)
    }

    pub fn get_group_type(&self, group: i32) -> Result<FileGroupType> {
        group_type(self.db.conn(), group)
    }

    /// Whether a group with this ID exists
    pub fn is_valid_group(&self, group: i32) -> Result<bool> {
        match group_type(self.db.conn(), group) {
            Ok(_) => Ok(true),
            Err(Error::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Insert a path into a source group
    ///
    /// `position` of `None` appends. Returns the index the path landed at.
    pub fn add_path_id(&self, group: i32, path: i32, position: Option<usize>) -> Result<usize> {
        let index = self.db.atomic(|conn| {
            self.expect_type(conn, group, FileGroupType::Source)?;
            let path_type: Option<(i32, bool)> = conn
                .query_row(
                    "SELECT path_type, trashed FROM files WHERE id = ?1",
                    [path],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            match path_type {
                None | Some((_, true)) => {
                    return Err(Error::NotFound(format!("path {}", path)));
                }
                Some((1, _)) => {
                    return Err(Error::BadValue(format!(
                        "path {} is a directory and cannot be grouped",
                        path
                    )));
                }
                Some(_) => {}
            }
            insert_entry(conn, group, path, position)
        })?;

        self.listeners.notify(group, GroupChange::Changed, None);
        Ok(index)
    }

    /// Insert a group into a merge group
    pub fn add_sub_group(&self, group: i32, sub: i32, position: Option<usize>) -> Result<usize> {
        let index = self.db.atomic(|conn| {
            self.expect_type(conn, group, FileGroupType::Merge)?;
            group_type(conn, sub)?;
            if sub == group || self.contains_group(conn, sub, group)? {
                return Err(Error::LoopDetected(format!(
                    "group {} would contain itself",
                    group
                )));
            }
            insert_entry(conn, group, sub, position)
        })?;

        self.listeners.notify(group, GroupChange::Changed, None);
        Ok(index)
    }

    /// Paths of a source group, in order
    pub fn get_path_ids(&self, group: i32) -> Result<Vec<i32>> {
        let conn = self.db.conn();
        self.expect_type(conn, group, FileGroupType::Source)?;
        entries(conn, group)
    }

    /// Groups of a merge group, in order
    pub fn get_sub_groups(&self, group: i32) -> Result<Vec<i32>> {
        let conn = self.db.conn();
        self.expect_type(conn, group, FileGroupType::Merge)?;
        entries(conn, group)
    }

    pub fn get_group_size(&self, group: i32) -> Result<usize> {
        let conn = self.db.conn();
        group_type(conn, group)?;
        Ok(entries(conn, group)?.len())
    }

    /// Remove the entry at `index`
    pub fn remove_entry(&self, group: i32, index: usize) -> Result<()> {
        self.db.atomic(|conn| {
            group_type(conn, group)?;
            let mut list = entries(conn, group)?;
            if index >= list.len() {
                return Err(Error::OutOfRange(format!(
                    "index {} in group {} of size {}",
                    index,
                    group,
                    list.len()
                )));
            }
            list.remove(index);
            write_entries(conn, group, &list)
        })?;

        self.listeners.notify(group, GroupChange::Changed, None);
        Ok(())
    }

    /// Move the entry at `from` so it ends up at index `to`
    pub fn move_entry(&self, group: i32, from: usize, to: usize) -> Result<()> {
        self.db.atomic(|conn| {
            group_type(conn, group)?;
            let mut list = entries(conn, group)?;
            if from >= list.len() || to >= list.len() {
                return Err(Error::OutOfRange(format!(
                    "move {} -> {} in group {} of size {}",
                    from,
                    to,
                    group,
                    list.len()
                )));
            }
            let entry = list.remove(from);
            list.insert(to, entry);
            write_entries(conn, group, &list)
        })?;

        self.listeners.notify(group, GroupChange::Changed, None);
        Ok(())
    }

    /// All paths of a group, with merge groups flattened in order
    pub fn get_expanded_group_files(&self, group: i32) -> Result<Vec<i32>> {
        let conn = self.db.conn();
        let mut files = Vec::new();
        let mut stack = vec![group];
        self.expand(conn, group, &mut files, &mut stack)?;
        Ok(files)
    }

    fn expand(
        &self,
        conn: &Connection,
        group: i32,
        files: &mut Vec<i32>,
        stack: &mut Vec<i32>,
    ) -> Result<()> {
        match group_type(conn, group)? {
            FileGroupType::Source => files.extend(entries(conn, group)?),
            FileGroupType::Merge => {
                for sub in entries(conn, group)? {
                    if stack.contains(&sub) {
                        return Err(Error::Corrupt(format!(
                            "merge group {} contains itself",
                            sub
                        )));
                    }
                    stack.push(sub);
                    self.expand(conn, sub, files, stack)?;
                    stack.pop();
                }
            }
        }
        Ok(())
    }

    /// Delete a group that nothing refers to
    pub fn remove_group(&self, group: i32) -> Result<()> {
        self.db.atomic(|conn| {
            group_type(conn, group)?;
            let in_slot: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM slot_values v
                    JOIN slot_types t ON v.slot_id = t.slot_id
                 WHERE t.slot_type = ?2 AND v.value = CAST(?1 AS TEXT))",
                params![group, SlotType::FileGroup.as_i32()],
                |row| row.get(0),
            )?;
            if in_slot {
                return Err(Error::CantRemove(format!(
                    "group {} is the value of a slot",
                    group
                )));
            }
            let in_merge: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM file_group_entries e
                    JOIN file_groups g ON e.group_id = g.id
                 WHERE g.group_type = ?2 AND e.entry_id = ?1)",
                params![group, FileGroupType::Merge.as_i32()],
                |row| row.get(0),
            )?;
            if in_merge {
                return Err(Error::CantRemove(format!(
                    "group {} is part of a merge group",
                    group
                )));
            }
            conn.execute("DELETE FROM file_group_entries WHERE group_id = ?1", [group])?;
            conn.execute(
                "DELETE FROM package_members WHERE member_type = ?1 AND member_id = ?2",
                params![MemberType::FileGroup.as_i32(), group],
            )?;
            conn.execute("DELETE FROM file_groups WHERE id = ?1", [group])?;
            Ok(())
        })?;

        debug!("Removed file group {}", group);
        self.listeners.notify(group, GroupChange::Removed, None);
        Ok(())
    }

    pub fn add_listener(&self, listener: Rc<dyn ChangeListener<GroupChange>>) {
        self.listeners.add(listener);
    }

    pub fn remove_listener(&self, listener: &Rc<dyn ChangeListener<GroupChange>>) {
        self.listeners.remove(listener);
    }

    fn expect_type(&self, conn: &Connection, group: i32, want: FileGroupType) -> Result<()> {
        let found = group_type(conn, group)?;
        if found != want {
            return Err(Error::BadValue(format!(
                "group {} is a {:?} group, not {:?}",
                group, found, want
            )));
        }
        Ok(())
    }

    /// Whether merge group `outer` (transitively) contains `inner`
    fn contains_group(&self, conn: &Connection, outer: i32, inner: i32) -> Result<bool> {
        let mut seen = HashSet::new();
        let mut pending = vec![outer];
        while let Some(group) = pending.pop() {
            if !seen.insert(group) {
                continue;
            }
            if group_type(conn, group)? != FileGroupType::Merge {
                continue;
            }
            for sub in entries(conn, group)? {
                if sub == inner {
                    return Ok(true);
                }
                pending.push(sub);
            }
        }
        Ok(false)
    }
}

fn group_type(conn: &Connection, group: i32) -> Result<FileGroupType> {
    let value: Option<i32> = conn
        .query_row(
            "SELECT group_type FROM file_groups WHERE id = ?1",
            [group],
            |row| row.get(0),
        )
        .optional()?;
    let value = value.ok_or_else(|| Error::NotFound(format!("file group {}", group)))?;
    FileGroupType::from_i32(value)
        .ok_or_else(|| Error::Corrupt(format!("group {} has unknown type {}", group, value)))
}

fn entries(conn: &Connection, group: i32) -> Result<Vec<i32>> {
    let mut stmt = conn.prepare(
        "SELECT entry_id FROM file_group_entries WHERE group_id = ?1 ORDER BY position",
    )?;
    let ids = stmt
        .query_map([group], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<i32>>>()?;
    Ok(ids)
}

fn write_entries(conn: &Connection, group: i32, list: &[i32]) -> Result<()> {
    conn.execute("DELETE FROM file_group_entries WHERE group_id = ?1", [group])?;
    let mut stmt = conn.prepare(
        "INSERT INTO file_group_entries (group_id, position, entry_id) VALUES (?1, ?2, ?3)",
    )?;
    for (position, entry) in list.iter().enumerate() {
        stmt.execute(params![group, position as i64, entry])?;
    }
    Ok(())
}

fn insert_entry(
    conn: &Connection,
    group: i32,
    entry: i32,
    position: Option<usize>,
) -> Result<usize> {
    let mut list = entries(conn, group)?;
    let index = match position {
        None => list.len(),
        Some(index) if index <= list.len() => index,
        Some(index) => {
            return Err(Error::OutOfRange(format!(
                "index {} in group {} of size {}",
                index,
                group,
                list.len()
            )));
        }
    };
    list.insert(index, entry);
    write_entries(conn, group, &list)?;
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> FileGroupMgr {
        let db = Rc::new(Database::open_in_memory().unwrap());
        db.conn()
            .execute_batch(
                "INSERT INTO files (id, parent_id, path_type, name) VALUES (1, 0, 2, 'a.c');
                 INSERT INTO files (id, parent_id, path_type, name) VALUES (2, 0, 2, 'b.c');
                 INSERT INTO files (id, parent_id, path_type, name) VALUES (3, 0, 1, 'dir');",
            )
            .unwrap();
        FileGroupMgr::new(db)
    }

    #[test]
    fn test_source_group_order() {
        let mgr = setup();
        let group = mgr.new_source_group(2).unwrap();
        assert_eq!(mgr.get_group_type(group).unwrap(), FileGroupType::Source);

        mgr.add_path_id(group, 1, None).unwrap();
        assert_eq!(mgr.add_path_id(group, 2, Some(0)).unwrap(), 0);
        assert_eq!(mgr.get_path_ids(group).unwrap(), vec![2, 1]);

        mgr.move_entry(group, 0, 1).unwrap();
        assert_eq!(mgr.get_path_ids(group).unwrap(), vec![1, 2]);

        mgr.remove_entry(group, 0).unwrap();
        assert_eq!(mgr.get_path_ids(group).unwrap(), vec![2]);
        assert!(matches!(mgr.remove_entry(group, 5), Err(Error::OutOfRange(_))));
    }

    #[test]
    fn test_source_group_rejects_directories() {
        let mgr = setup();
        let group = mgr.new_source_group(2).unwrap();
        assert!(matches!(mgr.add_path_id(group, 3, None), Err(Error::BadValue(_))));
        assert!(matches!(mgr.add_path_id(group, 42, None), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_merge_groups_expand_in_order() {
        let mgr = setup();
        let first = mgr.new_source_group(2).unwrap();
        let second = mgr.new_source_group(2).unwrap();
        mgr.add_path_id(first, 2, None).unwrap();
        mgr.add_path_id(second, 1, None).unwrap();
        mgr.add_path_id(second, 2, None).unwrap();

        let merge = mgr.new_merge_group(2).unwrap();
        mgr.add_sub_group(merge, first, None).unwrap();
        mgr.add_sub_group(merge, second, None).unwrap();

        assert_eq!(mgr.get_sub_groups(merge).unwrap(), vec![first, second]);
        assert_eq!(mgr.get_expanded_group_files(merge).unwrap(), vec![2, 1, 2]);
        assert!(matches!(mgr.add_path_id(merge, 1, None), Err(Error::BadValue(_))));
    }

    #[test]
    fn test_merge_loop_rejected() {
        let mgr = setup();
        let outer = mgr.new_merge_group(2).unwrap();
        let inner = mgr.new_merge_group(2).unwrap();
        mgr.add_sub_group(outer, inner, None).unwrap();

        assert!(matches!(
            mgr.add_sub_group(inner, outer, None),
            Err(Error::LoopDetected(_))
        ));
        assert!(matches!(
            mgr.add_sub_group(outer, outer, None),
            Err(Error::LoopDetected(_))
        ));
    }

    #[test]
    fn test_remove_group() {
        let mgr = setup();
        let source = mgr.new_source_group(2).unwrap();
        let merge = mgr.new_merge_group(2).unwrap();
        mgr.add_sub_group(merge, source, None).unwrap();

        assert!(matches!(mgr.remove_group(source), Err(Error::CantRemove(_))));
        mgr.remove_group(merge).unwrap();
        mgr.remove_group(source).unwrap();
        assert!(!mgr.is_valid_group(source).unwrap());
    }

    #[test]
    fn test_group_needs_real_package() {
        let mgr = setup();
        assert!(matches!(mgr.new_source_group(1), Err(Error::InvalidOp(_))));
        assert!(matches!(mgr.new_source_group(77), Err(Error::NotFound(_))));
    }
}
