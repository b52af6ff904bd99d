//! # OCI Runtime Spec 数据模型
//!
//! 本 crate 定义 bundle 配置文件 `config.json` 的内存表示。
//!
//! ## 主要内容
//! - **配置树**: `Spec` 及其子结构，字段与 JSON 字段一一对应
//! - **枚举词汇表**: namespace 类型、seccomp 动作/架构/操作符等取值集合
//! - **Schema 遍历**: 每个节点声明字段的必选/可选属性，供校验器遍历
//! - **容器状态**: 运行时 `state` 命令输出的 `State` 结构
//!
//! ## 序列化约定
//! - 必选字段总是输出
//! - 可选的字符串、序列、映射为空时省略
//! - 可选的数值字段使用 `Option`，区分“未设置”和“设置为 0”
//! - 未知字段在反序列化时被忽略（向前兼容）

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

mod linux;
pub mod schema;
mod state;
pub mod vocab;

pub use linux::*;
pub use state::{ContainerState, State};
pub use vocab::{
    Arch, DeviceType, NamespaceType, PlatformOs, RLIMIT_TYPES, RootfsPropagation, SeccompAction,
    SeccompOperator, UnknownValue,
};

/// 本模型对应的 OCI runtime-spec 版本
pub const VERSION: &str = "1.0.0";

pub(crate) fn is_false(b: &bool) -> bool {
    !*b
}

/// 显式的 `null` 按零值处理，与字段缺失等价
pub(crate) fn null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Bundle 配置根节点
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct Spec {
    /// 配置遵循的 OCI 规范版本（SemVer）
    #[serde(rename = "ociVersion", default, deserialize_with = "crate::null_default")]
    pub version: String,
    /// 目标平台
    #[serde(default, deserialize_with = "crate::null_default")]
    pub platform: Platform,
    /// 容器进程
    #[serde(default, deserialize_with = "crate::null_default")]
    pub process: Process,
    /// 根文件系统
    #[serde(default, deserialize_with = "crate::null_default")]
    pub root: Root,
    #[serde(
        default,
        deserialize_with = "crate::null_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub hostname: String,
    /// 挂载列表，顺序即挂载顺序
    #[serde(
        default,
        deserialize_with = "crate::null_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub mounts: Vec<Mount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hooks: Option<Hooks>,
    #[serde(
        default,
        deserialize_with = "crate::null_default",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub annotations: BTreeMap<String, String>,
    /// Linux 平台相关配置
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linux: Option<Linux>,
}

/// 目标平台：操作系统和 CPU 架构
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct Platform {
    #[serde(default, deserialize_with = "crate::null_default")]
    pub os: String,
    #[serde(default, deserialize_with = "crate::null_default")]
    pub arch: String,
}

/// 容器进程配置
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct Process {
    /// 是否分配伪终端
    #[serde(default, deserialize_with = "crate::null_default", skip_serializing_if = "is_false")]
    pub terminal: bool,
    #[serde(default, rename = "consoleSize", skip_serializing_if = "Option::is_none")]
    pub console_size: Option<ConsoleSize>,
    #[serde(default, deserialize_with = "crate::null_default")]
    pub user: User,
    /// 进程参数，语义与 execvp 的 argv 相同
    #[serde(default, deserialize_with = "crate::null_default")]
    pub args: Vec<String>,
    /// 环境变量，`KEY=VALUE` 形式，每个 KEY 至多出现一次
    #[serde(
        default,
        deserialize_with = "crate::null_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub env: Vec<String>,
    /// 工作目录，必须为绝对路径
    #[serde(default, deserialize_with = "crate::null_default")]
    pub cwd: String,
    /// 能力列表，存储形式为大写且带 `CAP_` 前缀
    #[serde(
        default,
        deserialize_with = "crate::null_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub capabilities: Vec<String>,
    #[serde(
        default,
        deserialize_with = "crate::null_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub rlimits: Vec<PosixRlimit>,
    #[serde(
        default,
        deserialize_with = "crate::null_default",
        rename = "noNewPrivileges",
        skip_serializing_if = "is_false"
    )]
    pub no_new_privileges: bool,
    #[serde(
        default,
        deserialize_with = "crate::null_default",
        rename = "apparmorProfile",
        skip_serializing_if = "String::is_empty"
    )]
    pub apparmor_profile: String,
    #[serde(default, rename = "oomScoreAdj", skip_serializing_if = "Option::is_none")]
    pub oom_score_adj: Option<i32>,
    #[serde(
        default,
        deserialize_with = "crate::null_default",
        rename = "selinuxLabel",
        skip_serializing_if = "String::is_empty"
    )]
    pub selinux_label: String,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConsoleSize {
    #[serde(default, deserialize_with = "crate::null_default")]
    pub height: u32,
    #[serde(default, deserialize_with = "crate::null_default")]
    pub width: u32,
}

/// 进程运行身份
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct User {
    #[serde(default, deserialize_with = "crate::null_default")]
    pub uid: u32,
    #[serde(default, deserialize_with = "crate::null_default")]
    pub gid: u32,
    /// 附加组，语义上是保持插入顺序的集合
    #[serde(
        default,
        deserialize_with = "crate::null_default",
        rename = "additionalGids",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub additional_gids: Vec<u32>,
    #[serde(
        default,
        deserialize_with = "crate::null_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub username: String,
}

/// POSIX 资源限制（setrlimit）
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct PosixRlimit {
    #[serde(rename = "type", default, deserialize_with = "crate::null_default")]
    pub typ: String,
    #[serde(default, deserialize_with = "crate::null_default")]
    pub hard: u64,
    #[serde(default, deserialize_with = "crate::null_default")]
    pub soft: u64,
}

/// 根文件系统，`path` 相对于 bundle 目录或为绝对路径
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct Root {
    #[serde(default, deserialize_with = "crate::null_default")]
    pub path: String,
    #[serde(default, deserialize_with = "crate::null_default", skip_serializing_if = "is_false")]
    pub readonly: bool,
}

/// 挂载项
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct Mount {
    /// 容器内的挂载点
    #[serde(default, deserialize_with = "crate::null_default")]
    pub destination: String,
    #[serde(
        rename = "type",
        default,
        deserialize_with = "crate::null_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub typ: String,
    #[serde(
        default,
        deserialize_with = "crate::null_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub source: String,
    #[serde(
        default,
        deserialize_with = "crate::null_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub options: Vec<String>,
}

/// 生命周期钩子
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct Hook {
    #[serde(default, deserialize_with = "crate::null_default")]
    pub path: String,
    #[serde(
        default,
        deserialize_with = "crate::null_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub args: Vec<String>,
    #[serde(
        default,
        deserialize_with = "crate::null_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub env: Vec<String>,
    /// 超时时间（秒）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<i32>,
}

/// 三个阶段的钩子列表，每个列表按顺序执行
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct Hooks {
    #[serde(
        default,
        deserialize_with = "crate::null_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub prestart: Vec<Hook>,
    #[serde(
        default,
        deserialize_with = "crate::null_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub poststart: Vec<Hook>,
    #[serde(
        default,
        deserialize_with = "crate::null_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub poststop: Vec<Hook>,
}

impl Spec {
    /// 解析 JSON 文本，缺失字段取零值，未知字段忽略
    pub fn from_json(data: &str) -> serde_json::Result<Spec> {
        serde_json::from_str(data)
    }

    /// 根文件系统在主机上的路径
    ///
    /// `root.path` 为相对路径时以 bundle 目录为基准。
    pub fn rootfs_path(&self, bundle: &std::path::Path) -> std::path::PathBuf {
        let root = std::path::Path::new(&self.root.path);
        if root.is_absolute() {
            root.to_path_buf()
        } else {
            bundle.join(root)
        }
    }
}
