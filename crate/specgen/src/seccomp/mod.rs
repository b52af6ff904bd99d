//! # Seccomp 规则
//!
//! ## 主要内容
//! - **parse**: 动作、架构、操作符 token 与 `ACTION:NAME[:ARGS]` 规则解析
//! - **merge**: 新规则与已有规则列表的合并判定

mod merge;
mod parse;

pub use merge::{Decision, apply, decide, merge};
pub use parse::{parse_action, parse_arch, parse_arg, parse_operator, parse_rules};

use runtime_spec::{LinuxSeccompArg, LinuxSyscall, SeccompAction};

/// 针对单个系统调用的规则
///
/// 配置中的一条 `syscalls` 元素可以覆盖多个系统调用名，
/// 合并算法按单个系统调用名处理。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyscallRule {
    pub name: String,
    pub action: SeccompAction,
    pub args: Vec<LinuxSeccompArg>,
}

impl SyscallRule {
    pub fn new(name: &str, action: SeccompAction, args: Vec<LinuxSeccompArg>) -> Self {
        SyscallRule {
            name: name.to_string(),
            action,
            args,
        }
    }

    pub fn has_args(&self) -> bool {
        !self.args.is_empty()
    }

    /// 转换为配置中的 `syscalls` 元素
    pub fn to_syscall(&self) -> LinuxSyscall {
        LinuxSyscall {
            names: vec![self.name.clone()],
            action: self.action.as_str().to_string(),
            args: self.args.clone(),
        }
    }

    /// 与配置中的规则完全相同
    pub fn same_as(&self, syscall: &LinuxSyscall) -> bool {
        syscall.names.len() == 1
            && syscall.names[0] == self.name
            && syscall.action == self.action.as_str()
            && syscall.args == self.args
    }
}
