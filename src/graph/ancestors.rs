//! Upward containment search
//!
//! Walks the single "parent" relation from an object until one matching a
//! requested type is found. Reaching the top of the chain without a match is
//! a normal outcome (Absent), not an error: a VM simply may not sit inside
//! any resource pool of the requested kind.

use tracing::trace;

use crate::error::{QuarryError, Result};
use crate::graph::{resolve_type_alias, ObjectRef};

/// Depth bound for ancestor traversal. The containment relation is a tree in
/// the source domain, but malformed or cyclic data must not loop forever.
pub const MAX_ANCESTOR_DEPTH: usize = 64;

/// Find the nearest ancestor of `start` matching `type_name` (alias-aware).
///
/// Returns `Ok(None)` when the chain ends without a match, and
/// `Err(QuarryError::Traversal)` when the depth bound is exceeded.
pub fn search_ancestor(start: &ObjectRef, type_name: &str) -> Result<Option<ObjectRef>> {
    let wanted = resolve_type_alias(type_name);
    let mut current = start.parent();
    let mut depth = 0usize;

    while let Some(obj) = current {
        depth += 1;
        if depth > MAX_ANCESTOR_DEPTH {
            return Err(QuarryError::Traversal(format!(
                "ancestor search for '{}' exceeded {} levels starting from {}",
                wanted,
                MAX_ANCESTOR_DEPTH,
                start.type_name()
            )));
        }

        if obj.is_type(wanted) {
            trace!(depth, ancestor = obj.type_name(), "ancestor matched");
            return Ok(Some(obj));
        }
        current = obj.parent();
    }

    Ok(None)
}
