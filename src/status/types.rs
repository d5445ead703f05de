use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Task lifecycle as reported by the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum TaskStatus {
    Idle,
    Paused,
    Processing,
    Error,
    Restarting,
    Stopping,
    Removed,
    Unknown(u8),
}

impl From<u8> for TaskStatus {
    fn from(code: u8) -> Self {
        match code {
            0 => Self::Idle,
            1 => Self::Paused,
            3 => Self::Processing,
            4 => Self::Error,
            5 => Self::Restarting,
            6 => Self::Stopping,
            7 => Self::Removed,
            other => Self::Unknown(other),
        }
    }
}

impl From<TaskStatus> for u8 {
    fn from(status: TaskStatus) -> Self {
        match status {
            TaskStatus::Idle => 0,
            TaskStatus::Paused => 1,
            TaskStatus::Processing => 3,
            TaskStatus::Error => 4,
            TaskStatus::Restarting => 5,
            TaskStatus::Stopping => 6,
            TaskStatus::Removed => 7,
            TaskStatus::Unknown(code) => code,
        }
    }
}

impl TaskStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Paused => "paused",
            Self::Processing => "processing",
            Self::Error => "error",
            Self::Restarting => "restarting",
            Self::Stopping => "stopping",
            Self::Removed => "removed",
            Self::Unknown(_) => "unknown",
        }
    }

    /// Whether the agent is currently doing work for the task.
    pub fn is_busy(&self) -> bool {
        match self {
            Self::Processing | Self::Restarting | Self::Stopping => true,
            Self::Idle | Self::Paused | Self::Error | Self::Removed | Self::Unknown(_) => false,
        }
    }
}

/// Which endpoint is authoritative for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SyncDirection {
    #[default]
    Bi,
    Left,
    Right,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TaskConfig {
    pub uuid: String,
    pub label: String,
    #[serde(rename = "LeftURI")]
    pub left_uri: String,
    #[serde(rename = "RightURI")]
    pub right_uri: String,
    pub direction: SyncDirection,
    pub realtime: bool,
    /// ISO-8601 repeating interval, empty for manual.
    pub loop_interval: String,
    pub hard_interval: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selective_roots: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct EndpointInfo {
    pub connected: bool,
    pub watcher_active: bool,
    pub last_connection: Option<DateTime<Utc>>,
    pub stats: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ProcessStatus {
    pub status_string: String,
    pub is_error: bool,
    pub is_progress: bool,
    pub progress: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TaskState {
    #[serde(rename = "UUID")]
    pub uuid: String,
    #[serde(default)]
    pub config: TaskConfig,
    pub status: TaskStatus,
    #[serde(default)]
    pub last_sync_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_process_status: Option<ProcessStatus>,
    #[serde(default)]
    pub left_info: EndpointInfo,
    #[serde(default)]
    pub right_info: EndpointInfo,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_round_trip_through_wire() {
        let state: TaskState = serde_json::from_str(
            r#"{"UUID":"a","Status":7,"Config":{"Uuid":"a","Label":"Docs","LeftURI":"fs:///a","RightURI":"router://b","Direction":"Right"}}"#,
        )
        .unwrap();
        assert_eq!(state.status, TaskStatus::Removed);
        assert_eq!(state.config.direction, SyncDirection::Right);
        assert_eq!(state.config.right_uri, "router://b");
        assert!(!state.left_info.connected);

        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["Status"], 7);
        assert_eq!(value["Config"]["LeftURI"], "fs:///a");
    }

    #[test]
    fn test_unknown_status_is_preserved() {
        let status: TaskStatus = serde_json::from_str("2").unwrap();
        assert_eq!(status, TaskStatus::Unknown(2));
        assert_eq!(status.label(), "unknown");
        assert_eq!(serde_json::to_string(&status).unwrap(), "2");
    }

    #[test]
    fn test_busy_states() {
        assert!(TaskStatus::Processing.is_busy());
        assert!(!TaskStatus::Paused.is_busy());
    }
}
