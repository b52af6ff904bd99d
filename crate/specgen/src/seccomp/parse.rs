//! # Seccomp token 解析
//!
//! 把命令行中便于书写的 token 转换为规范取值：
//!
//! | 类别 | 输入 | 输出 |
//! |------|------|------|
//! | 动作 | `allow` | `SCMP_ACT_ALLOW` |
//! | 架构 | `amd64` | `SCMP_ARCH_X86_64` |
//! | 操作符 | `NE` | `SCMP_CMP_NE` |

use std::collections::HashMap;

use runtime_spec::{Arch, LinuxSeccompArg, SeccompAction, SeccompOperator};

use super::SyscallRule;
use crate::error::ParseError;

lazy_static! {
    static ref ACTIONS: HashMap<&'static str, SeccompAction> = {
        let mut m = HashMap::new();
        m.insert("allow", SeccompAction::Allow);
        m.insert("errno", SeccompAction::Errno);
        m.insert("kill", SeccompAction::Kill);
        m.insert("trace", SeccompAction::Trace);
        m.insert("trap", SeccompAction::Trap);
        m
    };

    static ref ARCHES: HashMap<&'static str, Arch> = {
        let mut m = HashMap::new();
        m.insert("x86", Arch::X86);
        m.insert("amd64", Arch::Amd64);
        m.insert("x32", Arch::X32);
        m.insert("arm", Arch::Arm);
        m.insert("arm64", Arch::Aarch64);
        m.insert("mips", Arch::Mips);
        m.insert("mips64", Arch::Mips64);
        m.insert("mips64n32", Arch::Mips64N32);
        m.insert("mipsel", Arch::Mipsel);
        m.insert("mipsel64", Arch::Mipsel64);
        m.insert("mipsel64n32", Arch::Mipsel64N32);
        m.insert("ppc", Arch::Ppc);
        m.insert("ppc64", Arch::Ppc64);
        m.insert("ppc64le", Arch::Ppc64Le);
        m.insert("s390", Arch::S390);
        m.insert("s390x", Arch::S390X);
        m
    };

    static ref OPERATORS: HashMap<&'static str, SeccompOperator> = {
        let mut m = HashMap::new();
        m.insert("NE", SeccompOperator::NotEqual);
        m.insert("LT", SeccompOperator::LessThan);
        m.insert("LE", SeccompOperator::LessEqual);
        m.insert("EQ", SeccompOperator::EqualTo);
        m.insert("GE", SeccompOperator::GreaterEqual);
        m.insert("GT", SeccompOperator::GreaterThan);
        m.insert("ME", SeccompOperator::MaskedEqual);
        m
    };
}

pub fn parse_action(token: &str) -> Result<SeccompAction, ParseError> {
    ACTIONS
        .get(token)
        .copied()
        .ok_or_else(|| ParseError::unrecognized("action", token))
}

pub fn parse_arch(token: &str) -> Result<Arch, ParseError> {
    ARCHES
        .get(token)
        .copied()
        .ok_or_else(|| ParseError::unrecognized("architecture", token))
}

pub fn parse_operator(token: &str) -> Result<SeccompOperator, ParseError> {
    OPERATORS
        .get(token)
        .copied()
        .ok_or_else(|| ParseError::unrecognized("operator", token))
}

/// 解析一个参数条件 `INDEX:VALUE:VALUETWO:OP`
pub fn parse_arg(input: &str) -> Result<LinuxSeccompArg, ParseError> {
    let parts: Vec<&str> = input.split(':').collect();
    parse_arg_fields(input, &parts)
}

fn parse_arg_fields(input: &str, parts: &[&str]) -> Result<LinuxSeccompArg, ParseError> {
    if parts.len() != 4 {
        return Err(ParseError::malformed(
            "seccomp argument",
            input,
            format!("expected 4 fields, got {}", parts.len()),
        ));
    }

    let number = |field: &str, name: &str| -> Result<u64, ParseError> {
        field.parse::<u64>().map_err(|_| {
            ParseError::malformed("seccomp argument", input, format!("{} is not a number", name))
        })
    };

    let index = u32::try_from(number(parts[0], "index")?)
        .map_err(|_| ParseError::malformed("seccomp argument", input, "index out of range"))?;

    Ok(LinuxSeccompArg {
        index,
        value: number(parts[1], "value")?,
        value_two: number(parts[2], "valueTwo")?,
        op: parse_operator(parts[3])?.as_str().to_string(),
    })
}

/// 解析 `ACTION:NAME[,NAME...][:INDEX:VALUE:VALUETWO:OP]...`
///
/// 多个系统调用名会展开为多条规则，每条规则共享同一组参数条件。
pub fn parse_rules(input: &str) -> Result<Vec<SyscallRule>, ParseError> {
    let parts: Vec<&str> = input.split(':').collect();
    if parts.len() < 2 || (parts.len() - 2) % 4 != 0 {
        return Err(ParseError::malformed(
            "seccomp syscall",
            input,
            format!("wrong number of fields: {}", parts.len()),
        ));
    }

    let action = parse_action(parts[0])?;

    let args = parts[2..]
        .chunks(4)
        .map(|tuple| parse_arg_fields(input, tuple))
        .collect::<Result<Vec<_>, _>>()?;

    let names: Vec<&str> = parts[1].split(',').filter(|s| !s.is_empty()).collect();
    if names.is_empty() {
        return Err(ParseError::malformed(
            "seccomp syscall",
            input,
            "no syscall name",
        ));
    }

    Ok(names
        .into_iter()
        .map(|name| SyscallRule::new(name, action, args.clone()))
        .collect())
}
