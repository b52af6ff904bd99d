//! Linux 平台相关配置子树

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

fn is_zero_u64(v: &u64) -> bool {
    *v == 0
}

/// Linux 平台配置
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct Linux {
    /// UID 映射，内核限制最多 5 条
    #[serde(
        default,
        deserialize_with = "crate::null_default",
        rename = "uidMappings",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub uid_mappings: Vec<LinuxIdMapping>,
    /// GID 映射，内核限制最多 5 条
    #[serde(
        default,
        deserialize_with = "crate::null_default",
        rename = "gidMappings",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub gid_mappings: Vec<LinuxIdMapping>,
    #[serde(
        default,
        deserialize_with = "crate::null_default",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub sysctl: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<LinuxResources>,
    #[serde(default, rename = "cgroupsPath", skip_serializing_if = "Option::is_none")]
    pub cgroups_path: Option<String>,
    /// 每种 namespace 类型至多出现一次
    #[serde(
        default,
        deserialize_with = "crate::null_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub namespaces: Vec<LinuxNamespace>,
    #[serde(
        default,
        deserialize_with = "crate::null_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub devices: Vec<LinuxDevice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seccomp: Option<LinuxSeccomp>,
    #[serde(
        default,
        deserialize_with = "crate::null_default",
        rename = "rootfsPropagation",
        skip_serializing_if = "String::is_empty"
    )]
    pub rootfs_propagation: String,
    #[serde(
        default,
        deserialize_with = "crate::null_default",
        rename = "maskedPaths",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub masked_paths: Vec<String>,
    #[serde(
        default,
        deserialize_with = "crate::null_default",
        rename = "readonlyPaths",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub readonly_paths: Vec<String>,
    #[serde(
        default,
        deserialize_with = "crate::null_default",
        rename = "mountLabel",
        skip_serializing_if = "String::is_empty"
    )]
    pub mount_label: String,
}

/// user namespace 的 ID 映射
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LinuxIdMapping {
    #[serde(default, deserialize_with = "crate::null_default", rename = "hostID")]
    pub host_id: u32,
    #[serde(default, deserialize_with = "crate::null_default", rename = "containerID")]
    pub container_id: u32,
    #[serde(default, deserialize_with = "crate::null_default")]
    pub size: u32,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct LinuxNamespace {
    #[serde(rename = "type", default, deserialize_with = "crate::null_default")]
    pub typ: String,
    /// 为空表示新建 namespace，否则加入该路径指向的 namespace
    #[serde(
        default,
        deserialize_with = "crate::null_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub path: String,
}

/// 容器内需要创建的设备节点
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct LinuxDevice {
    #[serde(default, deserialize_with = "crate::null_default")]
    pub path: String,
    /// `b`、`c`、`u` 或 `p`
    #[serde(rename = "type", default, deserialize_with = "crate::null_default")]
    pub typ: String,
    #[serde(default, deserialize_with = "crate::null_default")]
    pub major: i64,
    #[serde(default, deserialize_with = "crate::null_default")]
    pub minor: i64,
    #[serde(default, rename = "fileMode", skip_serializing_if = "Option::is_none")]
    pub file_mode: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gid: Option<u32>,
}

// ============================================================================
// Cgroup 资源限制
// ============================================================================

/// Cgroup 资源限制
///
/// 所有数值字段都是可选的，`None` 表示不设置。
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct LinuxResources {
    /// 设备 cgroup 白名单规则
    #[serde(
        default,
        deserialize_with = "crate::null_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub devices: Vec<LinuxDeviceCgroup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<LinuxMemory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<LinuxCpu>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pids: Option<LinuxPids>,
    #[serde(default, rename = "blockIO", skip_serializing_if = "Option::is_none")]
    pub block_io: Option<LinuxBlockIo>,
    #[serde(
        default,
        deserialize_with = "crate::null_default",
        rename = "hugepageLimits",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub hugepage_limits: Vec<LinuxHugepageLimit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<LinuxNetwork>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct LinuxDeviceCgroup {
    #[serde(default, deserialize_with = "crate::null_default")]
    pub allow: bool,
    /// `a`（全部）、`b` 或 `c`
    #[serde(
        rename = "type",
        default,
        deserialize_with = "crate::null_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub typ: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub major: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minor: Option<i64>,
    /// `r`、`w`、`m` 的组合
    #[serde(
        default,
        deserialize_with = "crate::null_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub access: String,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct LinuxMemory {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reservation: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swap: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel: Option<i64>,
    #[serde(default, rename = "kernelTCP", skip_serializing_if = "Option::is_none")]
    pub kernel_tcp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swappiness: Option<u64>,
    #[serde(default, rename = "disableOOMKiller", skip_serializing_if = "Option::is_none")]
    pub disable_oom_killer: Option<bool>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct LinuxCpu {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shares: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<u64>,
    #[serde(default, rename = "realtimeRuntime", skip_serializing_if = "Option::is_none")]
    pub realtime_runtime: Option<i64>,
    #[serde(default, rename = "realtimePeriod", skip_serializing_if = "Option::is_none")]
    pub realtime_period: Option<u64>,
    #[serde(
        default,
        deserialize_with = "crate::null_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub cpus: String,
    #[serde(
        default,
        deserialize_with = "crate::null_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub mems: String,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LinuxPids {
    #[serde(default, deserialize_with = "crate::null_default")]
    pub limit: i64,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct LinuxBlockIo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u16>,
    #[serde(default, rename = "leafWeight", skip_serializing_if = "Option::is_none")]
    pub leaf_weight: Option<u16>,
    #[serde(
        default,
        deserialize_with = "crate::null_default",
        rename = "weightDevice",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub weight_device: Vec<LinuxWeightDevice>,
    #[serde(
        default,
        deserialize_with = "crate::null_default",
        rename = "throttleReadBpsDevice",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub throttle_read_bps_device: Vec<LinuxThrottleDevice>,
    #[serde(
        default,
        deserialize_with = "crate::null_default",
        rename = "throttleWriteBpsDevice",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub throttle_write_bps_device: Vec<LinuxThrottleDevice>,
    #[serde(
        default,
        deserialize_with = "crate::null_default",
        rename = "throttleReadIOPSDevice",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub throttle_read_iops_device: Vec<LinuxThrottleDevice>,
    #[serde(
        default,
        deserialize_with = "crate::null_default",
        rename = "throttleWriteIOPSDevice",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub throttle_write_iops_device: Vec<LinuxThrottleDevice>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LinuxWeightDevice {
    #[serde(default, deserialize_with = "crate::null_default")]
    pub major: i64,
    #[serde(default, deserialize_with = "crate::null_default")]
    pub minor: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u16>,
    #[serde(default, rename = "leafWeight", skip_serializing_if = "Option::is_none")]
    pub leaf_weight: Option<u16>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LinuxThrottleDevice {
    #[serde(default, deserialize_with = "crate::null_default")]
    pub major: i64,
    #[serde(default, deserialize_with = "crate::null_default")]
    pub minor: i64,
    #[serde(default, deserialize_with = "crate::null_default")]
    pub rate: u64,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct LinuxHugepageLimit {
    /// 页大小，例如 `2MB`
    #[serde(default, deserialize_with = "crate::null_default", rename = "pageSize")]
    pub page_size: String,
    #[serde(default, deserialize_with = "crate::null_default")]
    pub limit: u64,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct LinuxNetwork {
    #[serde(default, rename = "classID", skip_serializing_if = "Option::is_none")]
    pub class_id: Option<u32>,
    #[serde(
        default,
        deserialize_with = "crate::null_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub priorities: Vec<LinuxInterfacePriority>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct LinuxInterfacePriority {
    #[serde(default, deserialize_with = "crate::null_default")]
    pub name: String,
    #[serde(default, deserialize_with = "crate::null_default")]
    pub priority: u32,
}

// ============================================================================
// Seccomp
// ============================================================================

/// Seccomp 过滤配置
///
/// `architectures` 语义上是集合；`syscalls` 是有序规则列表，
/// 由生成器的合并算法维护。
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct LinuxSeccomp {
    #[serde(default, deserialize_with = "crate::null_default", rename = "defaultAction")]
    pub default_action: String,
    #[serde(
        default,
        deserialize_with = "crate::null_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub architectures: Vec<String>,
    #[serde(
        default,
        deserialize_with = "crate::null_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub syscalls: Vec<LinuxSyscall>,
}

/// 一条系统调用规则
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct LinuxSyscall {
    #[serde(default, deserialize_with = "crate::null_default")]
    pub names: Vec<String>,
    #[serde(default, deserialize_with = "crate::null_default")]
    pub action: String,
    #[serde(
        default,
        deserialize_with = "crate::null_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub args: Vec<LinuxSeccompArg>,
}

impl LinuxSyscall {
    /// 规则是否覆盖指定系统调用
    pub fn matches(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }
}

/// 系统调用参数比较条件
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct LinuxSeccompArg {
    #[serde(default, deserialize_with = "crate::null_default")]
    pub index: u32,
    #[serde(default, deserialize_with = "crate::null_default")]
    pub value: u64,
    #[serde(
        default,
        deserialize_with = "crate::null_default",
        rename = "valueTwo",
        skip_serializing_if = "is_zero_u64"
    )]
    pub value_two: u64,
    #[serde(default, deserialize_with = "crate::null_default")]
    pub op: String,
}

impl Linux {
    /// 查找指定类型的 namespace
    pub fn namespace(&self, typ: &str) -> Option<&LinuxNamespace> {
        self.namespaces.iter().find(|ns| ns.typ == typ)
    }
}
