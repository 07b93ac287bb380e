//! Engine-level node types and id validation.

pub use core_store::models::{Node, NodeKind};
use provider_google_drive::RemoteObject;

/// Ids the remote accepts that do not look like opaque object ids.
const ID_WHITELIST: &[&str] = &["root", "appDataFolder", "photos"];

/// Sanity-checks a remote object id before any API call is issued.
pub fn validate_fid(fid: &str) -> bool {
    if ID_WHITELIST.contains(&fid) {
        return true;
    }
    if fid.len() < 10 || fid.len() > 100 {
        return false;
    }
    fid.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Converts a listed remote object into a [`Node`], stamping the folder
/// whose listing produced it as the parent.
///
/// When the object's own parent list disagrees (multi-parent objects), the
/// requested listing folder wins; the flat node list must form a tree.
pub fn node_from_remote(object: RemoteObject, parent_id: &str) -> Node {
    Node {
        id: object.id,
        name: object.name,
        kind: if object.is_folder {
            NodeKind::Folder
        } else {
            NodeKind::File
        },
        size: object.size,
        content_hash: object.content_hash,
        modified_at: object.modified_at,
        parent_id: parent_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitelisted_aliases_pass() {
        assert!(validate_fid("root"));
        assert!(validate_fid("appDataFolder"));
        assert!(validate_fid("photos"));
    }

    #[test]
    fn opaque_ids_are_length_and_charset_checked() {
        assert!(validate_fid("1ctMwpIaBg8S1lrZDxdynLXJpMsm5guAl"));
        assert!(validate_fid("abc_DEF-123456"));
        assert!(!validate_fid(""));
        assert!(!validate_fid("short"));
        assert!(!validate_fid("has spaces in the identifier"));
        assert!(!validate_fid(&"x".repeat(101)));
    }

    #[test]
    fn listing_context_wins_over_reported_parents() {
        let object = RemoteObject {
            id: "f1".to_string(),
            name: "a.bin".to_string(),
            is_folder: false,
            size: 7,
            content_hash: Some("h".to_string()),
            modified_at: None,
            parents: vec!["other-parent".to_string()],
        };
        let node = node_from_remote(object, "listed-folder");
        assert_eq!(node.parent_id, "listed-folder");
        assert_eq!(node.kind, NodeKind::File);
        assert_eq!(node.size, 7);
    }
}
