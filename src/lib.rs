// src/lib.rs

//! Buildstore
//!
//! Persistent metadata store for captured software builds: which paths
//! exist, which build actions ran, which paths each action read or wrote,
//! and how paths and actions are grouped into packages.
//!
//! # Architecture
//!
//! - Database-first: all state in SQLite, versioned schema with migrations
//! - Paths: one global tree with named roots (`@root`, `@workspace`)
//! - Actions: a tree of build steps with merged per-path access records
//! - Slots: typed, named parameters on action types and package types
//! - Packages: folder hierarchy, source/generated roots, scoped membership
//! - Reports: read-only queries over paths, actions and packages

pub mod actions;
pub mod config;
pub mod db;
mod error;
pub mod files;
pub mod notify;
pub mod packages;
pub mod reports;
pub mod slots;
mod store;

pub use actions::{ActionChange, ActionMgr, ActionTypeMgr, OperationType};
pub use config::StoreConfig;
pub use error::{Error, ErrorCode, Result};
pub use files::{FileGroupMgr, FileIncludeMgr, FileMgr, PathChange, PathType};
pub use notify::{ChangeEvent, ChangeListener};
pub use packages::{
    MemberType, PackageMemberMgr, PackageMgr, PackageRootMgr, PackageRootType, ScopeId,
    SubPackageMgr,
};
pub use reports::{ActionSet, FileSet, PackageSet, ReportMgr};
pub use slots::{SlotMgr, SlotValue};
pub use store::BuildStore;
