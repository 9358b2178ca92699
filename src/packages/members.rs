// src/packages/members.rs

//! Package membership
//!
//! Every file, file group, action and sub-package belongs to exactly one
//! package. Files and actions that were never assigned belong to the
//! universal `<import>` package. Files additionally carry a scope.

use super::roots::PackageRootMgr;
use super::subpackages::type_contains;
use super::{PackageMgr, require_package};
use crate::db::{Builtins, Database};
use crate::error::{Error, Result};
use crate::files::{FileMgr, PathType};
use crate::notify::{ChangeListener, ListenerSet};
use rusqlite::{Connection, OptionalExtension, params};
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;
use tracing::debug;

/// Kind of package member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MemberType {
    File,
    FileGroup,
    Action,
    SubPackage,
}

impl MemberType {
    pub fn as_i32(self) -> i32 {
        match self {
            MemberType::File => 1,
            MemberType::FileGroup => 2,
            MemberType::Action => 3,
            MemberType::SubPackage => 4,
        }
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(MemberType::File),
            2 => Some(MemberType::FileGroup),
            3 => Some(MemberType::Action),
            4 => Some(MemberType::SubPackage),
            _ => None,
        }
    }
}

/// Visibility of a file within its package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeId {
    None,
    Private,
    Public,
}

impl ScopeId {
    pub fn as_i32(self) -> i32 {
        match self {
            ScopeId::None => 0,
            ScopeId::Private => 1,
            ScopeId::Public => 2,
        }
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(ScopeId::None),
            1 => Some(ScopeId::Private),
            2 => Some(ScopeId::Public),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScopeId::None => "None",
            ScopeId::Private => "Private",
            ScopeId::Public => "Public",
        }
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScopeId {
    type Err = Error;

    /// Scope names are matched case-insensitively
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(ScopeId::None),
            "private" => Ok(ScopeId::Private),
            "public" => Ok(ScopeId::Public),
            _ => Err(Error::BadValue(format!("invalid scope: {}", s))),
        }
    }
}

/// One member of a package
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Member {
    pub member_type: MemberType,
    pub id: i32,
    pub scope: ScopeId,
}

/// Membership change notifications
///
/// The event ID is the member ID; the sub-field is the member type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberChange {
    Membership,
    Location,
}

pub struct PackageMemberMgr {
    db: Rc<Database>,
    builtins: Builtins,
    files: Rc<FileMgr>,
    packages: Rc<PackageMgr>,
    roots: Rc<PackageRootMgr>,
    listeners: ListenerSet<MemberChange>,
}

impl PackageMemberMgr {
    pub fn new(
        db: Rc<Database>,
        builtins: Builtins,
        files: Rc<FileMgr>,
        packages: Rc<PackageMgr>,
        roots: Rc<PackageRootMgr>,
    ) -> Self {
        Self {
            db,
            builtins,
            files,
            packages,
            roots,
            listeners: ListenerSet::new(),
        }
    }

    /// Assign a member to a package (and, for files, a scope)
    pub fn set_package_of_member(
        &self,
        member_type: MemberType,
        member_id: i32,
        pkg: i32,
        scope: ScopeId,
    ) -> Result<()> {
        let import = self.builtins.import_package;
        self.db.atomic(|conn| {
            require_package(conn, pkg)?;
            if scope != ScopeId::None && (member_type != MemberType::File || pkg == import) {
                return Err(Error::BadValue(format!(
                    "scope {} only applies to files outside {}",
                    scope,
                    crate::db::builtins::IMPORT_PACKAGE_NAME
                )));
            }

            match member_type {
                MemberType::File => {
                    if self.files.validate_path(member_id)? == PathType::Directory {
                        return Err(Error::BadValue(format!(
                            "directory {} cannot be a package member",
                            member_id
                        )));
                    }
                    if pkg != import && !self.roots.is_within_package_roots(pkg, member_id)? {
                        return Err(Error::OutOfRange(format!(
                            "path {} is outside the roots of package {}",
                            member_id, pkg
                        )));
                    }
                }
                MemberType::FileGroup => {
                    let exists: bool = conn.query_row(
                        "SELECT EXISTS(SELECT 1 FROM file_groups WHERE id = ?1)",
                        [member_id],
                        |row| row.get(0),
                    )?;
                    if !exists {
                        return Err(Error::NotFound(format!("file group {}", member_id)));
                    }
                }
                MemberType::Action => {
                    if member_id == self.builtins.root_action {
                        return Err(Error::InvalidOp(
                            "the root action cannot be assigned to a package".to_string(),
                        ));
                    }
                    require_live(conn, "build_actions", "action", member_id)?;
                }
                MemberType::SubPackage => {
                    require_live(conn, "sub_packages", "sub-package", member_id)?;
                    if pkg == import {
                        return Err(Error::BadValue(format!(
                            "sub-package {} cannot live in {}",
                            member_id,
                            crate::db::builtins::IMPORT_PACKAGE_NAME
                        )));
                    }
                    let pkg_type: i32 = conn.query_row(
                        "SELECT pkg_type_id FROM sub_packages WHERE id = ?1",
                        [member_id],
                        |row| row.get(0),
                    )?;
                    if pkg_type == pkg || type_contains(conn, pkg_type, pkg)? {
                        return Err(Error::LoopDetected(format!(
                            "package {} would contain an instance of itself",
                            pkg
                        )));
                    }
                }
            }

            conn.execute(
                "INSERT INTO package_members (member_type, member_id, pkg_id, scope_id)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(member_type, member_id)
                 DO UPDATE SET pkg_id = excluded.pkg_id, scope_id = excluded.scope_id",
                params![member_type.as_i32(), member_id, pkg, scope.as_i32()],
            )?;
            Ok(())
        })?;

        debug!(
            "{:?} {} is now in package {} ({})",
            member_type, member_id, pkg, scope
        );
        self.listeners
            .notify(member_id, MemberChange::Membership, Some(member_type.as_i32()));
        Ok(())
    }

    /// Package and scope of a member
    ///
    /// Files and actions that were never assigned report `<import>`.
    pub fn get_package_of_member(&self, member_type: MemberType, member_id: i32) -> Result<(i32, ScopeId)> {
        let row: Option<(i32, i32)> = self
            .db
            .conn()
            .query_row(
                "SELECT pkg_id, scope_id FROM package_members
                 WHERE member_type = ?1 AND member_id = ?2",
                params![member_type.as_i32(), member_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        match row {
            Some((pkg, scope)) => Ok((pkg, scope_from_i32(scope)?)),
            None => match member_type {
                MemberType::File | MemberType::Action => {
                    Ok((self.builtins.import_package, ScopeId::None))
                }
                _ => Err(Error::NotFound(format!(
                    "{:?} {} is not in any package",
                    member_type, member_id
                ))),
            },
        }
    }

    /// Live members of a package
    ///
    /// `scope` filters file members by scope (other members have scope
    /// `None`); `member_type` restricts to one kind.
    pub fn get_members_in_package(
        &self,
        pkg: i32,
        scope: Option<ScopeId>,
        member_type: Option<MemberType>,
    ) -> Result<Vec<Member>> {
        let conn = self.db.conn();
        require_package(conn, pkg)?;

        let mut sql = String::from(
            "SELECT m.member_type, m.member_id, m.scope_id FROM package_members m
             LEFT JOIN files f ON m.member_type = 1 AND f.id = m.member_id
             LEFT JOIN build_actions a ON m.member_type = 3 AND a.id = m.member_id
             LEFT JOIN sub_packages s ON m.member_type = 4 AND s.id = m.member_id
             WHERE m.pkg_id = ?1
               AND COALESCE(f.trashed, a.trashed, s.trashed, 0) = 0",
        );
        if pkg == self.builtins.import_package {
            sql.push_str(
                "
             UNION ALL
             SELECT 1, f.id, 0 FROM files f
             WHERE f.trashed = 0 AND f.path_type != 1
               AND NOT EXISTS (SELECT 1 FROM package_members m
                               WHERE m.member_type = 1 AND m.member_id = f.id)
             UNION ALL
             SELECT 3, a.id, 0 FROM build_actions a
             WHERE a.trashed = 0 AND a.id != a.parent_id
               AND NOT EXISTS (SELECT 1 FROM package_members m
                               WHERE m.member_type = 3 AND m.member_id = a.id)",
            );
        }
        sql.push_str(" ORDER BY 1, 2");

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([pkg], |row| {
                Ok((row.get::<_, i32>(0)?, row.get::<_, i32>(1)?, row.get::<_, i32>(2)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut members = Vec::with_capacity(rows.len());
        for (kind, id, member_scope) in rows {
            let kind = MemberType::from_i32(kind)
                .ok_or_else(|| Error::Corrupt(format!("unknown member type {}", kind)))?;
            let member_scope = scope_from_i32(member_scope)?;
            if member_type.is_some_and(|t| t != kind) {
                continue;
            }
            if scope.is_some_and(|s| s != member_scope) {
                continue;
            }
            members.push(Member {
                member_type: kind,
                id,
                scope: member_scope,
            });
        }
        Ok(members)
    }

    /// Live files of a package, optionally in one scope
    pub fn get_files_in_package(&self, pkg: i32, scope: Option<ScopeId>) -> Result<Vec<i32>> {
        Ok(self
            .get_members_in_package(pkg, scope, Some(MemberType::File))?
            .into_iter()
            .map(|m| m.id)
            .collect())
    }

    /// Live actions of a package
    pub fn get_actions_in_package(&self, pkg: i32) -> Result<Vec<i32>> {
        Ok(self
            .get_members_in_package(pkg, None, Some(MemberType::Action))?
            .into_iter()
            .map(|m| m.id)
            .collect())
    }

    /// Store the diagram position of a member
    pub fn set_member_location(&self, member_type: MemberType, member_id: i32, x: i32, y: i32) -> Result<()> {
        let (pkg, scope) = self.get_package_of_member(member_type, member_id)?;
        self.db.atomic(|conn| {
            conn.execute(
                "INSERT INTO package_members (member_type, member_id, pkg_id, scope_id, x, y)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(member_type, member_id) DO UPDATE SET x = excluded.x, y = excluded.y",
                params![member_type.as_i32(), member_id, pkg, scope.as_i32(), x, y],
            )?;
            Ok(())
        })?;
        self.listeners
            .notify(member_id, MemberChange::Location, Some(member_type.as_i32()));
        Ok(())
    }

    /// Diagram position of a member; `(-1, -1)` when never placed
    pub fn get_member_location(&self, member_type: MemberType, member_id: i32) -> Result<(i32, i32)> {
        let location = self
            .db
            .conn()
            .query_row(
                "SELECT x, y FROM package_members WHERE member_type = ?1 AND member_id = ?2",
                params![member_type.as_i32(), member_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        match location {
            Some(location) => Ok(location),
            None => {
                self.get_package_of_member(member_type, member_id)?;
                Ok((-1, -1))
            }
        }
    }

    /// Parse `package` or `package/scope`
    ///
    /// A missing scope means "all scopes" and yields `None`.
    pub fn parse_package_spec(&self, spec: &str) -> Result<(i32, Option<ScopeId>)> {
        let (name, scope) = match spec.split_once('/') {
            Some((name, scope)) => (name, Some(scope.parse::<ScopeId>()?)),
            None => (spec, None),
        };
        let pkg = self.packages.get_id(name)?;
        require_package(self.db.conn(), pkg)?;
        Ok((pkg, scope))
    }

    pub fn get_scope_name(&self, scope: ScopeId) -> &'static str {
        scope.as_str()
    }

    pub fn parse_scope(&self, name: &str) -> Result<ScopeId> {
        name.parse()
    }

    pub fn add_listener(&self, listener: Rc<dyn ChangeListener<MemberChange>>) {
        self.listeners.add(listener);
    }

    pub fn remove_listener(&self, listener: &Rc<dyn ChangeListener<MemberChange>>) {
        self.listeners.remove(listener);
    }
}

fn scope_from_i32(value: i32) -> Result<ScopeId> {
    ScopeId::from_i32(value).ok_or_else(|| Error::Corrupt(format!("unknown scope {}", value)))
}

fn require_live(conn: &Connection, table: &str, what: &str, id: i32) -> Result<()> {
    let trashed: Option<bool> = conn
        .query_row(
            &format!("SELECT trashed FROM {} WHERE id = ?1", table),
            [id],
            |row| row.get(0),
        )
        .optional()?;
    match trashed {
        Some(false) => Ok(()),
        _ => Err(Error::NotFound(format!("{} {}", what, id))),
    }
}
