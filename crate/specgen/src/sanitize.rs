//! # 配置净化
//!
//! 移除与主机绑定或会提升权限的字段，得到一份可移植的配置。
//! 变换是幂等的：对结果再次净化不会产生变化。

use runtime_spec::{Root, Spec};

macro_rules! sl {
    () => {
        slog_scope::logger().new(o!("subsystem" => "sanitize"))
    };
}

pub fn sanitize(spec: &mut Spec) {
    debug!(sl!(), "sanitize spec");

    let process = &mut spec.process;
    process.terminal = false;
    process.user.additional_gids.clear();
    process.capabilities.clear();
    process.rlimits.clear();
    process.no_new_privileges = false;
    process.apparmor_profile.clear();
    process.selinux_label.clear();
    process.oom_score_adj = None;

    spec.root = Root {
        path: "rootfs".to_string(),
        readonly: false,
    };
    spec.hostname.clear();

    for mount in spec.mounts.iter_mut() {
        mount.source.clear();
    }

    if let Some(linux) = spec.linux.as_mut() {
        linux.uid_mappings.clear();
        linux.gid_mappings.clear();
        linux.sysctl.clear();
        linux.cgroups_path = None;
        linux.namespaces.clear();
        linux.devices.clear();
        linux.seccomp = None;
        linux.rootfs_propagation.clear();
        linux.masked_paths.clear();
        linux.readonly_paths.clear();

        if let Some(res) = linux.resources.as_mut() {
            if let Some(memory) = res.memory.as_mut() {
                memory.disable_oom_killer = None;
                memory.kernel = None;
                memory.kernel_tcp = None;
                memory.swappiness = None;
            }
            if let Some(cpu) = res.cpu.as_mut() {
                cpu.realtime_runtime = None;
                cpu.realtime_period = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Generator;
    use proptest::prelude::*;

    fn privileged_spec() -> Spec {
        let mut g = Generator::new();
        g.add_process_additional_gid(10);
        g.set_process_terminal(true);
        g.set_process_oom_score_adj(-100).unwrap();
        g.set_process_apparmor_profile("unconfined");
        g.add_linux_uid_mapping("0:1000:1").unwrap();
        g.add_linux_sysctl("net.core.somaxconn", "1024").unwrap();
        g.set_linux_cgroups_path("/box");
        g.set_linux_rootfs_propagation("rshared").unwrap();
        g.set_linux_resources_memory_kernel(1 << 20);
        g.set_linux_resources_memory_swappiness(10).unwrap();
        g.set_linux_resources_memory_limit(1 << 30);
        g.set_linux_resources_cpu_realtime_runtime(1000);
        g.set_linux_resources_cpu_shares(512);
        g.set_seccomp_default("errno").unwrap();
        g.add_bind_mount("/host:/data").unwrap();
        g.into_spec()
    }

    #[test]
    fn test_sanitize() {
        let mut spec = privileged_spec();
        sanitize(&mut spec);

        assert!(!spec.process.terminal);
        assert!(spec.process.capabilities.is_empty());
        assert!(spec.process.rlimits.is_empty());
        assert!(spec.process.oom_score_adj.is_none());
        assert_eq!(spec.root.path, "rootfs");
        assert!(!spec.root.readonly);
        assert!(spec.hostname.is_empty());
        assert!(spec.mounts.iter().all(|m| m.source.is_empty()));
        // 进程参数与挂载点保留
        assert_eq!(spec.process.args, vec!["sh"]);
        assert!(spec.mounts.iter().any(|m| m.destination == "/data"));

        let linux = spec.linux.as_ref().unwrap();
        assert!(linux.namespaces.is_empty());
        assert!(linux.seccomp.is_none());
        assert!(linux.cgroups_path.is_none());
        assert!(linux.rootfs_propagation.is_empty());

        let res = linux.resources.as_ref().unwrap();
        let mem = res.memory.as_ref().unwrap();
        assert_eq!(mem.limit, Some(1 << 30));
        assert!(mem.kernel.is_none());
        assert!(mem.swappiness.is_none());
        let cpu = res.cpu.as_ref().unwrap();
        assert_eq!(cpu.shares, Some(512));
        assert!(cpu.realtime_runtime.is_none());
    }

    #[test]
    fn test_generator_sanitize() {
        let mut g = Generator::from_spec(privileged_spec());
        g.sanitize();
        let mut expected = privileged_spec();
        sanitize(&mut expected);
        assert_eq!(g.spec(), &expected);
    }

    proptest! {
        #[test]
        fn prop_sanitize_idempotent(
            hostname in "[a-z]{0,8}",
            gids in prop::collection::vec(0u32..100, 0..4),
            terminal in any::<bool>(),
            swappiness in prop::option::of(0u64..=100),
            with_seccomp in any::<bool>(),
        ) {
            let mut g = Generator::new();
            g.set_hostname(&hostname);
            for gid in gids {
                g.add_process_additional_gid(gid);
            }
            g.set_process_terminal(terminal);
            if let Some(s) = swappiness {
                g.set_linux_resources_memory_swappiness(s).unwrap();
            }
            if with_seccomp {
                g.add_seccomp_syscalls("kill:ptrace").unwrap();
            }

            let mut once = g.into_spec();
            sanitize(&mut once);
            let mut twice = once.clone();
            sanitize(&mut twice);
            prop_assert_eq!(once, twice);
        }
    }
}
