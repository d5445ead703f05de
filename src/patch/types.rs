use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::NodeKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum OperationType {
    TransferFile,
    UpdateFile,
    CreateFolder,
    MoveFolder,
    MoveFile,
    Delete,
    Unknown(u8),
}

impl From<u8> for OperationType {
    fn from(code: u8) -> Self {
        match code {
            0 => Self::TransferFile,
            1 => Self::UpdateFile,
            2 => Self::CreateFolder,
            3 => Self::MoveFolder,
            4 => Self::MoveFile,
            5 => Self::Delete,
            other => Self::Unknown(other),
        }
    }
}

impl From<OperationType> for u8 {
    fn from(op: OperationType) -> Self {
        match op {
            OperationType::TransferFile => 0,
            OperationType::UpdateFile => 1,
            OperationType::CreateFolder => 2,
            OperationType::MoveFolder => 3,
            OperationType::MoveFile => 4,
            OperationType::Delete => 5,
            OperationType::Unknown(code) => code,
        }
    }
}

impl OperationType {
    pub fn label(&self) -> &'static str {
        match self {
            Self::TransferFile => "transfer",
            Self::UpdateFile => "update",
            Self::CreateFolder => "create folder",
            Self::MoveFolder => "move folder",
            Self::MoveFile => "move file",
            Self::Delete => "delete",
            Self::Unknown(_) => "unknown",
        }
    }
}

/// Which way a single change flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum OperationDir {
    #[default]
    LeftToRight,
    RightToLeft,
}

impl TryFrom<u8> for OperationDir {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::LeftToRight),
            1 => Ok(Self::RightToLeft),
            other => Err(format!("invalid operation direction {other}")),
        }
    }
}

impl From<OperationDir> for u8 {
    fn from(dir: OperationDir) -> Self {
        match dir {
            OperationDir::LeftToRight => 0,
            OperationDir::RightToLeft => 1,
        }
    }
}

impl OperationDir {
    pub fn reversed(self) -> Self {
        match self {
            Self::LeftToRight => Self::RightToLeft,
            Self::RightToLeft => Self::LeftToRight,
        }
    }

    pub fn arrow(&self) -> &'static str {
        match self {
            Self::LeftToRight => "->",
            Self::RightToLeft => "<-",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Operation {
    pub op_type: OperationType,
    #[serde(default)]
    pub dir: OperationDir,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_string: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum ConflictType {
    NodeType,
    FileContent,
    FolderUuid,
    MoveSameSource,
    MoveSameTarget,
    Unknown(u8),
}

impl From<u8> for ConflictType {
    fn from(code: u8) -> Self {
        match code {
            0 => Self::NodeType,
            1 => Self::FileContent,
            2 => Self::FolderUuid,
            3 => Self::MoveSameSource,
            4 => Self::MoveSameTarget,
            other => Self::Unknown(other),
        }
    }
}

impl From<ConflictType> for u8 {
    fn from(kind: ConflictType) -> Self {
        match kind {
            ConflictType::NodeType => 0,
            ConflictType::FileContent => 1,
            ConflictType::FolderUuid => 2,
            ConflictType::MoveSameSource => 3,
            ConflictType::MoveSameTarget => 4,
            ConflictType::Unknown(code) => code,
        }
    }
}

impl ConflictType {
    pub fn label(&self) -> &'static str {
        match self {
            Self::NodeType => "node type differs",
            Self::FileContent => "content differs",
            Self::FolderUuid => "folder identifiers differ",
            Self::MoveSameSource => "moved from the same source",
            Self::MoveSameTarget => "moved to the same target",
            Self::Unknown(_) => "unknown conflict",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Conflict {
    pub conflict_type: ConflictType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_op: Option<Operation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right_op: Option<Operation>,
}

/// Snapshot metadata of the node a patch entry applies to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Node {
    pub path: String,
    #[serde(rename = "Type")]
    pub kind: NodeKind,
    pub size: i64,
    pub etag: String,
    #[serde(rename = "MTime")]
    pub mtime: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PatchStats {
    /// Endpoint URI the agent computed the patch from.
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub target: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One history entry as served by `GET /patches/...`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawPatch {
    #[serde(default)]
    pub root: Option<super::PatchTreeNode>,
    #[serde(default)]
    pub stats: PatchStats,
    #[serde(default)]
    pub error: Option<String>,
}

pub type Stamp = DateTime<Utc>;
