//! Ownership tags
//!
//! A managed record carries `<prefix><namespace>/<name>` in its comment field.
//! The tag is the only thing that decides who may mutate or delete a record;
//! provider metadata such as creation time is never consulted.
//!
//! Tags are opaque strings. Nothing outside this module builds or compares
//! them, so a backend with structured metadata can change the encoding here
//! without touching reconciliation.

/// Marker every managed record's comment starts with
pub const OWNERSHIP_PREFIX: &str = "[greydns - Do not manually edit]";

/// Build the ownership tag for a resource
pub fn tag_for(namespace: &str, name: &str) -> String {
    format!("{}{}/{}", OWNERSHIP_PREFIX, namespace, name)
}

/// Whether `tag` names the given resource as owner
pub fn owner_matches(tag: &str, namespace: &str, name: &str) -> bool {
    tag.strip_prefix(OWNERSHIP_PREFIX)
        .and_then(|rest| rest.strip_prefix(namespace))
        .and_then(|rest| rest.strip_prefix('/'))
        .is_some_and(|rest| rest == name)
}

/// Whether a comment carries a greydns tag at all
///
/// Used to filter provider listings; records failing this are never cached.
pub fn is_managed(comment: &str) -> bool {
    comment.starts_with(OWNERSHIP_PREFIX)
}
