//! Sync history: patch trees served by the agent.

pub mod tree;
pub mod types;

pub use tree::{Patch, PatchTreeNode};
pub use types::{
    Conflict, ConflictType, Node, Operation, OperationDir, OperationType, PatchStats, RawPatch,
};

use serde_json::{Map, Value};
use tracing::warn;

use crate::status::TaskConfig;

/// Turns one `{timestamp -> raw patch}` page into patches, in response key
/// order. Entries without a root, or that do not decode, are skipped.
pub fn patches_from_page(config: &TaskConfig, page: Map<String, Value>) -> Vec<Patch> {
    page.into_iter()
        .filter_map(|(timestamp, value)| match serde_json::from_value::<RawPatch>(value) {
            Ok(raw) => Patch::new(raw, config, timestamp),
            Err(e) => {
                warn!("skipping undecodable patch {timestamp}: {e}");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_keeps_key_order_and_drops_rootless() {
        let config = TaskConfig {
            right_uri: "router://b".to_string(),
            ..Default::default()
        };
        let page: Map<String, Value> = serde_json::from_str(
            r#"{
                "1700000300": {"Root": {"Stamp": "2023-11-14T22:25:00Z"}, "Stats": {"Source": "fs:///a"}},
                "1700000100": {"Stats": {"Source": "fs:///a"}, "Error": "no root"},
                "1700000200": {"Root": {"Stamp": "2023-11-14T22:21:40Z"}, "Stats": {"Source": "router://b"}},
                "1700000000": "garbage"
            }"#,
        )
        .unwrap();

        let patches = patches_from_page(&config, page);
        let keys: Vec<&str> = patches.iter().map(|p| p.timestamp.as_str()).collect();
        assert_eq!(keys, vec!["1700000300", "1700000200"]);
    }
}
