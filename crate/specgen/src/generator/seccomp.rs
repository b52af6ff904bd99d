//! Seccomp 子树修改
//!
//! 规则的增加委托给 [`crate::seccomp::merge`]；规则删除按系统调用名处理，
//! 覆盖多个名字的规则只移除对应的名字，名字全部移除后整条规则删除。

use runtime_spec::LinuxSeccomp;

use super::Generator;
use crate::{
    error::Result,
    seccomp::{self, Decision, SyscallRule},
};

macro_rules! sl {
    () => {
        slog_scope::logger().new(o!("subsystem" => "seccomp"))
    };
}

impl Generator {
    fn seccomp_opt(&mut self) -> Option<&mut LinuxSeccomp> {
        self.spec.linux.as_mut()?.seccomp.as_mut()
    }

    /// 设置默认动作
    pub fn set_seccomp_default(&mut self, action: &str) -> Result<()> {
        let action = seccomp::parse_action(action).map_err(|e| self.reject(e))?;
        self.seccomp_mut().default_action = action.as_str().to_string();
        Ok(())
    }

    /// 设置默认动作，并移除已使用该动作的规则
    pub fn set_seccomp_default_force(&mut self, action: &str) -> Result<()> {
        let action = seccomp::parse_action(action).map_err(|e| self.reject(e))?;
        let seccomp = self.seccomp_mut();
        seccomp.default_action = action.as_str().to_string();

        let before = seccomp.syscalls.len();
        seccomp.syscalls.retain(|s| s.action != action.as_str());
        let removed = before - seccomp.syscalls.len();
        debug!(sl!(), "force default action";
            "action" => action.as_str(),
            "removed" => removed);
        Ok(())
    }

    /// 添加架构，已存在时忽略
    ///
    /// 与规则相同，新建的 `linux.seccomp` 不带默认动作。
    pub fn add_seccomp_arch(&mut self, arch: &str) -> Result<()> {
        let arch = seccomp::parse_arch(arch).map_err(|e| self.reject(e))?;
        let arches = &mut self.seccomp_mut().architectures;
        if !arches.iter().any(|a| a == arch.as_str()) {
            arches.push(arch.as_str().to_string());
        }
        Ok(())
    }

    pub fn remove_seccomp_arch(&mut self, arch: &str) -> Result<()> {
        let arch = seccomp::parse_arch(arch).map_err(|e| self.reject(e))?;
        if let Some(seccomp) = self.seccomp_opt() {
            seccomp.architectures.retain(|a| a != arch.as_str());
        }
        Ok(())
    }

    pub fn clear_seccomp_arches(&mut self) {
        if let Some(seccomp) = self.seccomp_opt() {
            seccomp.architectures.clear();
        }
    }

    /// 合并一条规则
    ///
    /// 不带参数且动作与默认动作相同的规则是多余的，直接返回 `Nothing`。
    ///
    /// `linux.seccomp` 不存在时会新建，此时 `defaultAction` 为空，
    /// 输出前需要用 [`Generator::set_seccomp_default`] 设置，否则配置不合法。
    pub fn add_seccomp_rule(&mut self, rule: &SyscallRule) -> Decision {
        let seccomp = self.seccomp_mut();
        if !rule.has_args() && seccomp.default_action == rule.action.as_str() {
            debug!(sl!(), "rule matches default action"; "syscall" => &rule.name);
            return Decision::Nothing;
        }
        seccomp::merge(rule, &mut seccomp.syscalls)
    }

    /// 解析 `ACTION:NAME[,NAME...][:ARGS...]` 并逐条合并
    ///
    /// 解析失败时不做任何修改。
    pub fn add_seccomp_syscalls(&mut self, input: &str) -> Result<Vec<Decision>> {
        let rules = seccomp::parse_rules(input).map_err(|e| self.reject(e))?;
        Ok(rules.iter().map(|r| self.add_seccomp_rule(r)).collect())
    }

    /// 移除与给定规则动作和参数都相同的规则中的该系统调用
    pub fn remove_seccomp_rule(&mut self, rule: &SyscallRule) {
        if let Some(seccomp) = self.seccomp_opt() {
            for syscall in seccomp.syscalls.iter_mut() {
                if syscall.action == rule.action.as_str() && syscall.args == rule.args {
                    syscall.names.retain(|n| n != &rule.name);
                }
            }
            seccomp.syscalls.retain(|s| !s.names.is_empty());
        }
    }

    /// 解析规则描述并逐条移除
    pub fn remove_seccomp_syscalls(&mut self, input: &str) -> Result<()> {
        let rules = seccomp::parse_rules(input).map_err(|e| self.reject(e))?;
        for rule in &rules {
            self.remove_seccomp_rule(rule);
        }
        Ok(())
    }

    /// 从所有规则中移除系统调用名
    pub fn remove_seccomp_syscall_by_name(&mut self, name: &str) {
        if let Some(seccomp) = self.seccomp_opt() {
            for syscall in seccomp.syscalls.iter_mut() {
                syscall.names.retain(|n| n != name);
            }
            seccomp.syscalls.retain(|s| !s.names.is_empty());
        }
    }

    pub fn remove_seccomp_syscalls_by_action(&mut self, action: &str) -> Result<()> {
        let action = seccomp::parse_action(action).map_err(|e| self.reject(e))?;
        if let Some(seccomp) = self.seccomp_opt() {
            seccomp.syscalls.retain(|s| s.action != action.as_str());
        }
        Ok(())
    }

    pub fn remove_all_seccomp_rules(&mut self) {
        if let Some(seccomp) = self.seccomp_opt() {
            seccomp.syscalls.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runtime_spec::{LinuxSyscall, SeccompAction};

    fn syscalls(g: &Generator) -> Vec<LinuxSyscall> {
        g.spec()
            .linux
            .as_ref()
            .and_then(|l| l.seccomp.as_ref())
            .map(|s| s.syscalls.clone())
            .unwrap_or_default()
    }

    #[test]
    fn test_default_action() {
        let mut g = Generator::empty();
        assert!(g.set_seccomp_default("deny").unwrap_err().is_parse());
        assert!(g.spec().linux.is_none());

        g.set_seccomp_default("errno").unwrap();
        g.add_seccomp_syscalls("allow:read,write").unwrap();
        g.add_seccomp_syscalls("kill:ptrace").unwrap();
        assert_eq!(syscalls(&g).len(), 3);

        g.set_seccomp_default("allow").unwrap();
        assert_eq!(syscalls(&g).len(), 3);

        g.set_seccomp_default_force("allow").unwrap();
        let rules = syscalls(&g);
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].names, vec!["ptrace"]);
        assert_eq!(
            g.spec().linux.as_ref().unwrap().seccomp.as_ref().unwrap().default_action,
            "SCMP_ACT_ALLOW"
        );
    }

    #[test]
    fn test_arches() {
        let mut g = Generator::empty();
        g.add_seccomp_arch("amd64").unwrap();
        g.add_seccomp_arch("x86").unwrap();
        g.add_seccomp_arch("amd64").unwrap();
        assert!(g.add_seccomp_arch("riscv").unwrap_err().is_parse());

        let arches = |g: &Generator| {
            g.spec()
                .linux
                .as_ref()
                .unwrap()
                .seccomp
                .as_ref()
                .unwrap()
                .architectures
                .clone()
        };
        assert_eq!(arches(&g), vec!["SCMP_ARCH_X86_64", "SCMP_ARCH_X86"]);

        g.remove_seccomp_arch("x86").unwrap();
        assert_eq!(arches(&g), vec!["SCMP_ARCH_X86_64"]);
        g.clear_seccomp_arches();
        assert!(arches(&g).is_empty());
    }

    #[test]
    fn test_rule_without_default_leaves_action_empty() {
        let mut g = Generator::new();
        assert!(g.spec().linux.as_ref().unwrap().seccomp.is_none());

        let decisions = g.add_seccomp_syscalls("errno:chmod").unwrap();
        assert_eq!(decisions, vec![Decision::Append]);
        let seccomp = g.spec().linux.as_ref().unwrap().seccomp.as_ref().unwrap();
        assert!(seccomp.default_action.is_empty());
        assert_eq!(seccomp.syscalls[0].names, vec!["chmod"]);

        g.set_seccomp_default("allow").unwrap();
        assert_eq!(
            g.spec().linux.as_ref().unwrap().seccomp.as_ref().unwrap().default_action,
            "SCMP_ACT_ALLOW"
        );
    }

    #[test]
    fn test_rule_matching_default_is_skipped() {
        let mut g = Generator::empty();
        g.set_seccomp_default("allow").unwrap();

        let decisions = g.add_seccomp_syscalls("allow:read").unwrap();
        assert_eq!(decisions, vec![Decision::Nothing]);
        assert!(syscalls(&g).is_empty());

        let decisions = g.add_seccomp_syscalls("allow:read:0:0:0:EQ").unwrap();
        assert_eq!(decisions, vec![Decision::Append]);
        assert_eq!(syscalls(&g).len(), 1);
    }

    #[test]
    fn test_merge_through_generator() {
        let mut g = Generator::empty();
        g.set_seccomp_default("errno").unwrap();
        assert_eq!(
            g.add_seccomp_syscalls("allow:read").unwrap(),
            vec![Decision::Append]
        );
        assert_eq!(
            g.add_seccomp_syscalls("allow:read:0:0:0:EQ").unwrap(),
            vec![Decision::Overwrite(0)]
        );
        assert_eq!(syscalls(&g).len(), 1);
        assert_eq!(syscalls(&g)[0].args.len(), 1);

        let before = syscalls(&g);
        assert!(g.add_seccomp_syscalls("allow:read:0:0:0:XX").is_err());
        assert_eq!(syscalls(&g), before);
    }

    #[test]
    fn test_remove_rules() {
        let mut g = Generator::empty();
        g.set_seccomp_default("errno").unwrap();
        g.spec.linux.as_mut().unwrap().seccomp.as_mut().unwrap().syscalls = vec![
            LinuxSyscall {
                names: vec!["read".into(), "write".into()],
                action: "SCMP_ACT_ALLOW".into(),
                args: vec![],
            },
            LinuxSyscall {
                names: vec!["ptrace".into()],
                action: "SCMP_ACT_KILL".into(),
                args: vec![],
            },
        ];

        g.remove_seccomp_rule(&SyscallRule::new("read", SeccompAction::Kill, vec![]));
        assert_eq!(syscalls(&g)[0].names.len(), 2);

        g.remove_seccomp_syscalls("allow:read").unwrap();
        assert_eq!(syscalls(&g)[0].names, vec!["write"]);

        g.remove_seccomp_syscall_by_name("write");
        assert_eq!(syscalls(&g).len(), 1);
        assert_eq!(syscalls(&g)[0].names, vec!["ptrace"]);

        g.remove_seccomp_syscalls_by_action("kill").unwrap();
        assert!(syscalls(&g).is_empty());
        assert!(g.remove_seccomp_syscalls_by_action("nope").is_err());

        g.add_seccomp_syscalls("trap:mount,umount2").unwrap();
        g.remove_all_seccomp_rules();
        assert!(syscalls(&g).is_empty());
    }
}
