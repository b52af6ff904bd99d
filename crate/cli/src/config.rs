//! 工具配置文件
//!
//! 查找顺序：`--config` 参数 > `RUNCELL_TOOL_CONFIG` 环境变量 > `/etc/runcell/tool.toml`。
//! 前两者指定的文件必须存在；默认路径不存在时使用内置默认值。

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Deserialize;

/// 配置文件环境变量
pub const CONFIG_ENV: &str = "RUNCELL_TOOL_CONFIG";

/// 默认配置文件路径
pub const DEFAULT_CONFIG_PATH: &str = "/etc/runcell/tool.toml";

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolConfig {
    /// 日志级别，优先级低于 `-v` 和 `RUNCELL_LOG`
    pub log_level: Option<String>,
    /// generate/validate 默认是否启用主机相关模式
    pub host_specific: bool,
    /// validate 默认合规级别
    pub compliance_level: Option<String>,
    /// runtime-test 默认使用的运行时
    pub runtime: Option<String>,
    pub runtime_timeout_secs: Option<u64>,
}

impl ToolConfig {
    /// 按查找顺序加载配置
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Self::from_file(&PathBuf::from(path));
        }

        let default = Path::new(DEFAULT_CONFIG_PATH);
        if default.exists() {
            Self::from_file(default)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&data)
            .with_context(|| format!("invalid config file {}", path.display()))
    }
}
