// src/reports/sets.rs

//! ID sets consumed and produced by reports

use crate::error::Result;
use crate::packages::{PackageMemberMgr, ScopeId};
use std::collections::BTreeSet;
use std::marker::PhantomData;

/// Marker for sets of path IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Files {}

/// Marker for sets of action IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actions {}

/// An ordered set of entity IDs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdSet<T> {
    ids: BTreeSet<i32>,
    _kind: PhantomData<T>,
}

pub type FileSet = IdSet<Files>;
pub type ActionSet = IdSet<Actions>;

impl<T> Default for IdSet<T> {
    fn default() -> Self {
        Self {
            ids: BTreeSet::new(),
            _kind: PhantomData,
        }
    }
}

impl<T> IdSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether the ID was newly added
    pub fn add(&mut self, id: i32) -> bool {
        self.ids.insert(id)
    }

    pub fn remove(&mut self, id: i32) -> bool {
        self.ids.remove(&id)
    }

    pub fn contains(&self, id: i32) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// IDs in ascending order
    pub fn iter(&self) -> impl Iterator<Item = i32> + '_ {
        self.ids.iter().copied()
    }

    pub fn to_vec(&self) -> Vec<i32> {
        self.iter().collect()
    }

    pub fn is_subset(&self, other: &Self) -> bool {
        self.ids.is_subset(&other.ids)
    }

    /// Add every ID of `other`
    pub fn merge(&mut self, other: &Self) {
        self.ids.extend(other.ids.iter().copied());
    }
}

impl<T> FromIterator<i32> for IdSet<T> {
    fn from_iter<I: IntoIterator<Item = i32>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
            _kind: PhantomData,
        }
    }
}

impl<T> Extend<i32> for IdSet<T> {
    fn extend<I: IntoIterator<Item = i32>>(&mut self, iter: I) {
        self.ids.extend(iter);
    }
}

/// A set of packages, each optionally restricted to one scope
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageSet {
    entries: Vec<(i32, Option<ScopeId>)>,
}

impl PackageSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `package` / `package/scope` specs
    pub fn from_specs<S: AsRef<str>>(members: &PackageMemberMgr, specs: &[S]) -> Result<Self> {
        let mut set = Self::new();
        for spec in specs {
            let (pkg, scope) = members.parse_package_spec(spec.as_ref())?;
            set.add(pkg, scope);
        }
        Ok(set)
    }

    /// Add a package; `None` means every scope
    pub fn add(&mut self, pkg: i32, scope: Option<ScopeId>) {
        if !self.entries.contains(&(pkg, scope)) {
            self.entries.push((pkg, scope));
        }
    }

    /// Whether a member of `pkg` with `scope` falls in this set
    pub fn contains(&self, pkg: i32, scope: ScopeId) -> bool {
        self.entries
            .iter()
            .any(|&(p, s)| p == pkg && s.is_none_or(|s| s == scope))
    }

    pub fn entries(&self) -> &[(i32, Option<ScopeId>)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
