//! Change detection between two server collections

use crate::types::{ChangeSet, ServerMap};

/// Compare `old` against `new` by name and canonical content.
///
/// Entries present in both are "modified" when their canonical serializations
/// differ. Map key order never matters; `args` order does. Names come back
/// sorted.
pub fn detect_changes(old: &ServerMap, new: &ServerMap) -> ChangeSet {
    let added = new
        .keys()
        .filter(|name| !old.contains_key(*name))
        .cloned()
        .collect();

    let removed = old
        .keys()
        .filter(|name| !new.contains_key(*name))
        .cloned()
        .collect();

    let modified = old
        .iter()
        .filter_map(|(name, before)| {
            let after = new.get(name)?;
            (before.canonical_json() != after.canonical_json()).then(|| name.clone())
        })
        .collect();

    ChangeSet {
        added,
        modified,
        removed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ServerEntry, Transport};
    use pretty_assertions::assert_eq;

    fn map(entries: &[(&str, ServerEntry)]) -> ServerMap {
        entries
            .iter()
            .map(|(n, e)| (n.to_string(), e.clone()))
            .collect()
    }

    #[test]
    fn test_identical_maps_have_no_changes() {
        let m = map(&[
            ("a", ServerEntry::stdio("npx").with_args(["-y", "a"])),
            ("b", ServerEntry::stdio("uvx")),
        ]);
        assert!(detect_changes(&m, &m).is_empty());
    }

    #[test]
    fn test_added_removed_modified() {
        let old = map(&[
            ("keep", ServerEntry::stdio("x")),
            ("gone", ServerEntry::stdio("y")),
            ("edit", ServerEntry::stdio("z")),
        ]);
        let new = map(&[
            ("keep", ServerEntry::stdio("x")),
            ("edit", ServerEntry::stdio("z").with_env("TOKEN", "1")),
            ("fresh", ServerEntry::stdio("w")),
        ]);
        let changes = detect_changes(&old, &new);
        assert_eq!(changes.added, vec!["fresh"]);
        assert_eq!(changes.removed, vec!["gone"]);
        assert_eq!(changes.modified, vec!["edit"]);
        assert_eq!(changes.total(), 3);
    }

    #[test]
    fn test_env_order_is_ignored() {
        let old = map(&[(
            "a",
            ServerEntry::stdio("x").with_env("A", "1").with_env("B", "2"),
        )]);
        let new = map(&[(
            "a",
            ServerEntry::stdio("x").with_env("B", "2").with_env("A", "1"),
        )]);
        assert!(detect_changes(&old, &new).is_empty());
    }

    #[test]
    fn test_args_order_matters() {
        let old = map(&[("a", ServerEntry::stdio("x").with_args(["1", "2"]))]);
        let new = map(&[("a", ServerEntry::stdio("x").with_args(["2", "1"]))]);
        assert_eq!(detect_changes(&old, &new).modified, vec!["a"]);
    }

    #[test]
    fn test_any_serialized_difference_is_modification() {
        let mut described = ServerEntry::stdio("x");
        described.metadata = Some(crate::types::ServerMetadata {
            description: Some("notes".into()),
            tags: Vec::new(),
        });
        let old = map(&[("a", ServerEntry::stdio("x"))]);
        let new = map(&[("a", described.clone())]);
        assert_eq!(detect_changes(&old, &new).modified, vec!["a"]);

        let same = map(&[("a", described)]);
        assert!(detect_changes(&new, &same).is_empty());
    }

    #[test]
    fn test_transport_change_is_modification() {
        let old = map(&[("a", ServerEntry::stdio("x"))]);
        let mut remote = ServerEntry::stdio("x");
        remote.transport = Some(Transport::Sse);
        remote.url = Some("http://localhost:3000/sse".into());
        let new = map(&[("a", remote)]);
        assert_eq!(detect_changes(&old, &new).modified, vec!["a"]);
    }
}
