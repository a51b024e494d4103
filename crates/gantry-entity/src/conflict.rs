//! Conflict resolution after a creation collision
//!
//! A uniqueness or data-constraint error on create means either a previous
//! pass already created our entity (and crashed before recording its id) or
//! an unrelated entity holds one of our unique fields. The uniqueness tag
//! tells the two apart.

use gantry_remote::{EntityKind, RemoteApi, RemoteError, RemoteScope, TagStyle};
use tracing::{debug, warn};

/// What the tag lookup found
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConflictResolution {
    /// Exactly one entity carries the tag; it is ours
    Found(String),
    /// No entity carries the tag; the collision is on another field
    Unrelated,
    /// More than one entity carries the tag; none is picked
    Ambiguous(Vec<String>),
    /// The kind cannot be looked up by tag
    Unsupported,
}

/// Look up the entity carrying `tag` after `create` reported a conflict
pub async fn resolve_conflict(
    client: &dyn RemoteApi,
    kind: EntityKind,
    scope: &RemoteScope,
    tag: &str,
) -> Result<ConflictResolution, RemoteError> {
    if kind.tag_style() == TagStyle::Unsupported {
        return Ok(ConflictResolution::Unsupported);
    }
    let mut ids = client.list_by_tag(kind, scope, tag).await?;
    match ids.len() {
        0 => {
            debug!(%kind, tag, "no remote entity carries the uniqueness tag");
            Ok(ConflictResolution::Unrelated)
        }
        1 => Ok(ConflictResolution::Found(ids.remove(0))),
        n => {
            warn!(%kind, tag, matches = n, "uniqueness tag matches several remote entities");
            ids.sort();
            Ok(ConflictResolution::Ambiguous(ids))
        }
    }
}
