//! Relation/fork identification and namespace resolution.
//!
//! Each (relation, fork) pair maps to exactly one backend store. The
//! resolver flattens the relation's canonical path into a single token
//! (path separators become underscores) and prefixes the storage root,
//! so every namespace is a flat name under one directory.

use crate::error::{StorageError, StorageResult};
use std::path::{Path, PathBuf};

/// Upper bound on a resolved namespace name, root included.
pub const MAX_NAMESPACE_LEN: usize = 100;

/// Identifies one relation's storage independent of its catalog name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RelFileLocator {
    pub db_oid: u32,
    pub rel_number: u32,
}

impl RelFileLocator {
    pub fn new(db_oid: u32, rel_number: u32) -> Self {
        Self { db_oid, rel_number }
    }
}

/// A named sub-stream of a relation, addressed independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForkNumber {
    Main,
    FreeSpaceMap,
    VisibilityMap,
    Init,
}

impl ForkNumber {
    /// Suffix appended to the relation's file name for this fork.
    pub fn suffix(self) -> &'static str {
        match self {
            ForkNumber::Main => "",
            ForkNumber::FreeSpaceMap => "_fsm",
            ForkNumber::VisibilityMap => "_vm",
            ForkNumber::Init => "_init",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ForkNumber::Main => "main",
            ForkNumber::FreeSpaceMap => "fsm",
            ForkNumber::VisibilityMap => "vm",
            ForkNumber::Init => "init",
        }
    }
}

/// Canonical path of a relation fork, as the host engine spells it.
pub fn relation_path(locator: RelFileLocator, fork: ForkNumber) -> String {
    format!(
        "base/{}/{}{}",
        locator.db_oid,
        locator.rel_number,
        fork.suffix()
    )
}

/// Resolve a relation fork to its backend namespace under `root`.
///
/// The canonical path is flattened (`/` becomes `_`) so the namespace is
/// a single file name. Fails with `NameTooLong` when the resolved name
/// would not fit the fixed path buffer bound.
pub fn resolve(root: &Path, locator: RelFileLocator, fork: ForkNumber) -> StorageResult<PathBuf> {
    let flat = relation_path(locator, fork).replace('/', "_");
    let resolved = root.join(flat);
    let len = resolved.as_os_str().len();
    if len > MAX_NAMESPACE_LEN {
        return Err(StorageError::NameTooLong {
            len,
            max: MAX_NAMESPACE_LEN,
        });
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relation_path() {
        let rel = RelFileLocator::new(16384, 16385);
        assert_eq!(relation_path(rel, ForkNumber::Main), "base/16384/16385");
        assert_eq!(
            relation_path(rel, ForkNumber::FreeSpaceMap),
            "base/16384/16385_fsm"
        );
        assert_eq!(
            relation_path(rel, ForkNumber::VisibilityMap),
            "base/16384/16385_vm"
        );
        assert_eq!(relation_path(rel, ForkNumber::Init), "base/16384/16385_init");
    }

    #[test]
    fn test_resolve_flattens_separators() {
        let rel = RelFileLocator::new(1, 42);
        let resolved = resolve(Path::new("/tmp/relkv"), rel, ForkNumber::Main).unwrap();
        assert_eq!(resolved, PathBuf::from("/tmp/relkv/base_1_42"));
    }

    #[test]
    fn test_forks_resolve_to_distinct_namespaces() {
        let rel = RelFileLocator::new(5, 10);
        let root = Path::new("/tmp/relkv");
        let main = resolve(root, rel, ForkNumber::Main).unwrap();
        let fsm = resolve(root, rel, ForkNumber::FreeSpaceMap).unwrap();
        assert_ne!(main, fsm);
    }

    #[test]
    fn test_name_too_long() {
        let rel = RelFileLocator::new(u32::MAX, u32::MAX);
        let root = "/tmp/".to_string() + &"x".repeat(90);
        let result = resolve(Path::new(&root), rel, ForkNumber::Init);
        assert!(matches!(result, Err(StorageError::NameTooLong { .. })));
    }
}
