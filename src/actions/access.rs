// src/actions/access.rs

//! File access operations and the merge automaton
//!
//! An action's accesses to a single path collapse into one record. Each new
//! observation is folded into the existing state with `merge`.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// How an action touched a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationType {
    Unspecified,
    Read,
    Write,
    Modified,
    Delete,
}

impl OperationType {
    pub fn as_i32(self) -> i32 {
        match self {
            OperationType::Unspecified => 0,
            OperationType::Read => 1,
            OperationType::Write => 2,
            OperationType::Modified => 3,
            OperationType::Delete => 4,
        }
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(OperationType::Unspecified),
            1 => Some(OperationType::Read),
            2 => Some(OperationType::Write),
            3 => Some(OperationType::Modified),
            4 => Some(OperationType::Delete),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OperationType::Unspecified => "unspecified",
            OperationType::Read => "read",
            OperationType::Write => "write",
            OperationType::Modified => "modified",
            OperationType::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "unspecified" => Ok(OperationType::Unspecified),
            "read" => Ok(OperationType::Read),
            "write" => Ok(OperationType::Write),
            "modified" => Ok(OperationType::Modified),
            "delete" => Ok(OperationType::Delete),
            _ => Err(Error::BadValue(format!("invalid operation: {}", s))),
        }
    }
}

/// Result of folding a new observation into an existing access record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The record now holds this operation
    Keep(OperationType),
    /// The path was created and deleted by the same action; drop the record
    Remove,
}

/// Combine an existing access state with a newly observed one
pub fn merge(existing: OperationType, new: OperationType) -> MergeOutcome {
    use OperationType::*;

    let merged = match (existing, new) {
        (Unspecified, op) | (op, Unspecified) => op,

        (Read, Read) => Read,
        (Read, Write) => Modified,
        (Read, Modified) => Modified,
        (Read, Delete) => Delete,

        // A file the action created stays "written" whatever else it did,
        // unless it was deleted again: then it was a temporary.
        (Write, Delete) => return MergeOutcome::Remove,
        (Write, _) => Write,

        (Modified, Delete) => Delete,
        (Modified, _) => Modified,

        (Delete, Read) => Delete,
        (Delete, Write) => Modified,
        (Delete, Modified) => Modified,
        (Delete, Delete) => Delete,
    };
    MergeOutcome::Keep(merged)
}

/// A merged access record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileAccess {
    pub seqno: i32,
    pub path: i32,
    pub operation: OperationType,
}
