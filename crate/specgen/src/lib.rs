//! # Bundle 配置生成器
//!
//! 在内存中维护一份 OCI bundle 配置，提供结构化的修改操作并负责序列化。
//!
//! ## 主要内容
//! - **Generator**: 对外门面，持有一份 `Spec`，所有修改都经过它并在写入前校验
//! - **capabilities**: Linux 能力表，校验能力名称
//! - **seccomp**: 命令行 token 解析与 seccomp 规则合并算法
//! - **sanitize**: 移除不可移植或提升权限的字段
//!
//! ## 失败关闭
//! 任何非法输入（未知枚举值、格式错误的参数、非法能力名）都不会修改配置，
//! 只返回错误。

#[macro_use]
extern crate slog;
#[macro_use]
extern crate lazy_static;

pub mod capabilities;
pub mod error;
pub mod generator;
pub mod sanitize;
pub mod seccomp;

pub use error::{Error, ParseError, Result};
pub use generator::{ExportOptions, Generator};
pub use sanitize::sanitize;
