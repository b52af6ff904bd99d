//! # Bundle 配置校验
//!
//! 读取 bundle 目录中的 `config.json`，按 OCI runtime-spec 的要求逐项检查，
//! 每个失败生成一条带错误码、RFC 2119 级别和文档链接的违例。
//!
//! ## 主要内容
//! - **Validator**: 校验入口，检查分组见 `validator` 模块
//! - **specerror**: 错误码、级别与违例集合
//! - **mandatory**: 基于 schema 遍历的必选字段检查
//! - **error**: 中止校验的错误（配置缺失、IO、解码失败）
//!
//! ## 主机相关模式
//! 开启后额外比对当前主机：平台、能力支持情况、设备节点。

#[macro_use]
extern crate slog;
#[macro_use]
extern crate lazy_static;

pub mod error;
pub mod mandatory;
pub mod specerror;
mod validator;

pub use error::{Error, Result};
pub use specerror::{Code, Level, SpecViolation, Violations};
pub use validator::Validator;
