use serde::{Deserialize, Serialize};

/// Kind of an entry on an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeKind {
    Collection,
    Leaf,
    #[default]
    #[serde(other)]
    Unknown,
}

/// One child returned by `POST /tree`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TreeEntry {
    pub path: String,
    #[serde(rename = "Type", default)]
    pub kind: NodeKind,
}

impl TreeEntry {
    pub fn collection(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: NodeKind::Collection,
        }
    }

    pub fn leaf(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: NodeKind::Leaf,
        }
    }

    pub fn is_collection(&self) -> bool {
        self.kind == NodeKind::Collection
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_kinds_from_wire() {
        let entries: Vec<TreeEntry> = serde_json::from_str(
            r#"[{"Path":"docs","Type":"COLLECTION"},{"Path":"a.txt","Type":"LEAF"},{"Path":"x","Type":"SYMLINK"},{"Path":"y"}]"#,
        )
        .unwrap();
        let kinds: Vec<NodeKind> = entries.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![NodeKind::Collection, NodeKind::Leaf, NodeKind::Unknown, NodeKind::Unknown]
        );
        assert!(entries[0].is_collection());
    }
}
