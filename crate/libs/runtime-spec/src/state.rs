//! 运行时 `state` 命令输出的容器状态

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// 容器生命周期状态
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Creating,
    #[default]
    Created,
    Running,
    Stopped,
    Paused,
}

impl std::fmt::Display for ContainerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ContainerState::Creating => "creating",
            ContainerState::Created => "created",
            ContainerState::Running => "running",
            ContainerState::Stopped => "stopped",
            ContainerState::Paused => "paused",
        };
        f.write_str(s)
    }
}

/// OCI 容器状态文档
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct State {
    #[serde(default, deserialize_with = "crate::null_default", rename = "ociVersion")]
    pub version: String,
    #[serde(default, deserialize_with = "crate::null_default")]
    pub id: String,
    #[serde(default, deserialize_with = "crate::null_default")]
    pub status: ContainerState,
    /// 容器 init 进程在主机上的 PID，容器停止后可能为 0
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<i32>,
    #[serde(default, deserialize_with = "crate::null_default")]
    pub bundle: String,
    #[serde(
        default,
        deserialize_with = "crate::null_default",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub annotations: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_runtime_state() {
        let data = r#"{
            "ociVersion": "1.0.2",
            "id": "test",
            "status": "running",
            "pid": 4422,
            "bundle": "/containers/test",
            "rootfs": "/containers/test/rootfs"
        }"#;
        let state: State = serde_json::from_str(data).unwrap();
        assert_eq!(state.status, ContainerState::Running);
        assert_eq!(state.pid, Some(4422));
        assert_eq!(state.status.to_string(), "running");
    }
}
