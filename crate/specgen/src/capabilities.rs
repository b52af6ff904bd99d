//! # Linux 能力表
//!
//! 已知能力的全集来自 `caps` crate，按内核编号排序；
//! 主机支持的能力通过 `caps::runtime` 探测。
//!
//! 配置中能力的存储形式为大写且带 `CAP_` 前缀，例如 `CAP_NET_ADMIN`。

use caps::Capability;

use crate::error::{Error, ParseError, Result};

/// 默认模板使用的能力集合
///
/// 非特权容器的安全默认值；特权模式使用 [`all`] 返回的全集。
pub const DEFAULT_CAPABILITIES: [&str; 14] = [
    "CAP_CHOWN",
    "CAP_DAC_OVERRIDE",
    "CAP_FSETID",
    "CAP_FOWNER",
    "CAP_MKNOD",
    "CAP_NET_RAW",
    "CAP_SETGID",
    "CAP_SETUID",
    "CAP_SETFCAP",
    "CAP_SETPCAP",
    "CAP_NET_BIND_SERVICE",
    "CAP_SYS_CHROOT",
    "CAP_KILL",
    "CAP_AUDIT_WRITE",
];

lazy_static! {
    static ref ALL_CAPABILITIES: Vec<String> = {
        let mut all: Vec<Capability> = caps::all().into_iter().collect();
        all.sort_by_key(|c| c.index());
        all.iter().map(|c| c.to_string()).collect()
    };
}

/// 全部已知能力，按内核编号排序
pub fn all() -> &'static [String] {
    &ALL_CAPABILITIES
}

/// 当前主机内核支持的能力，按内核编号排序
pub fn host_supported() -> Vec<String> {
    let supported: Vec<String> = caps::runtime::thread_all_supported()
        .iter()
        .map(|c| c.to_string())
        .collect();

    ALL_CAPABILITIES
        .iter()
        .filter(|name| supported.contains(name))
        .cloned()
        .collect()
}

/// 转换为存储形式：大写并补全 `CAP_` 前缀
pub fn normalize(name: &str) -> String {
    let upper = name.trim().to_uppercase();
    if upper.starts_with("CAP_") {
        upper
    } else {
        format!("CAP_{}", upper)
    }
}

pub fn is_known(name: &str) -> bool {
    ALL_CAPABILITIES.iter().any(|c| c == name)
}

/// 校验存储形式的能力名称
///
/// `host_specific` 为 true 时还要求当前主机支持该能力。
pub fn validate(name: &str, host_specific: bool) -> Result<()> {
    if !name.starts_with("CAP_") {
        return Err(ParseError::malformed("capability", name, "must start with CAP_").into());
    }

    if !is_known(name) {
        return Err(ParseError::unrecognized("capability", name).into());
    }

    if host_specific && !host_supported().iter().any(|c| c == name) {
        return Err(Error::invalid_state(format!(
            "{} is not supported on the current host",
            name
        )));
    }

    Ok(())
}
