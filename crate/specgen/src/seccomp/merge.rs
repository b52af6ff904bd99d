//! # Seccomp 规则合并
//!
//! 向已有 `syscalls` 列表加入一条规则 N 时，对每条覆盖 N.name 的已有规则 E
//! 计算一个候选结果：
//!
//! | 情形 | 动作 | 参数 | 结果 |
//! |------|------|------|------|
//! | a | 与 N 完全相同 | - | Nothing |
//! | b | 相同 | 双方都有参数 | Append |
//! | c | 相同 | 仅 N 有参数 | Overwrite(i) |
//! | d | 相同 | 仅 E 有参数 | Nothing |
//! | e | 不同 | 双方都有参数且相同 | Overwrite(i) |
//! | f | 不同 | 双方都有参数但不同 | Append |
//! | g | 不同 | 仅一方有参数 | Append |
//! | h | 不同 | 双方都没有参数 | Overwrite(i) |
//!
//! 没有任何规则覆盖 N.name 时结果为 Append。
//! 候选结果按 `Nothing > Overwrite > Append` 归约，多个 Overwrite 取下标最小者。
//!
//! 覆盖多个系统调用名的规则不会被整体替换，其 Overwrite 候选退化为 Append，
//! 以免丢失其他系统调用名。

use runtime_spec::LinuxSyscall;

use super::SyscallRule;

macro_rules! sl {
    () => {
        slog_scope::logger().new(o!("subsystem" => "seccomp"))
    };
}

/// 合并判定结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// 已有规则已经蕴含新规则
    Nothing,
    /// 新规则取代下标处的已有规则
    Overwrite(usize),
    /// 追加为新规则
    Append,
}

impl Decision {
    fn rank(&self) -> u8 {
        match self {
            Decision::Nothing => 2,
            Decision::Overwrite(_) => 1,
            Decision::Append => 0,
        }
    }

    /// 取两者中优先级更高的一个，Overwrite 之间保留先出现的下标
    fn max(self, other: Decision) -> Decision {
        if other.rank() > self.rank() {
            other
        } else {
            self
        }
    }
}

fn candidate(rule: &SyscallRule, index: usize, existing: &LinuxSyscall) -> Decision {
    let same_action = existing.action == rule.action.as_str();
    let n_args = rule.has_args();
    let e_args = !existing.args.is_empty();

    if same_action && existing.args == rule.args {
        return Decision::Nothing;
    }

    let local = if same_action {
        match (n_args, e_args) {
            (true, true) => Decision::Append,
            (true, false) => Decision::Overwrite(index),
            // 参数相同已在上面处理
            (false, _) => Decision::Nothing,
        }
    } else {
        match (n_args, e_args) {
            (true, true) if existing.args == rule.args => Decision::Overwrite(index),
            (true, true) => Decision::Append,
            (true, false) | (false, true) => Decision::Append,
            (false, false) => Decision::Overwrite(index),
        }
    };

    match local {
        Decision::Overwrite(_) if existing.names.len() > 1 => Decision::Append,
        d => d,
    }
}

/// 计算规则加入列表时的判定
pub fn decide(rule: &SyscallRule, syscalls: &[LinuxSyscall]) -> Decision {
    syscalls
        .iter()
        .enumerate()
        .filter(|(_, e)| e.matches(&rule.name))
        .map(|(i, e)| candidate(rule, i, e))
        .fold(Decision::Append, Decision::max)
}

/// 按判定结果修改列表
pub fn apply(decision: Decision, rule: &SyscallRule, syscalls: &mut Vec<LinuxSyscall>) {
    match decision {
        Decision::Nothing => {}
        Decision::Overwrite(i) if i < syscalls.len() => syscalls[i] = rule.to_syscall(),
        Decision::Overwrite(_) | Decision::Append => syscalls.push(rule.to_syscall()),
    }
}

/// 判定并应用，返回所做的判定
pub fn merge(rule: &SyscallRule, syscalls: &mut Vec<LinuxSyscall>) -> Decision {
    let decision = decide(rule, syscalls);
    debug!(sl!(), "merge seccomp rule";
        "syscall" => &rule.name,
        "action" => rule.action.as_str(),
        "decision" => format!("{:?}", decision));
    apply(decision, rule, syscalls);
    decision
}
