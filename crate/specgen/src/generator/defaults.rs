//! 默认配置模板

use std::collections::BTreeMap;

use runtime_spec::{
    Linux, LinuxDeviceCgroup, LinuxNamespace, LinuxResources, Mount, Platform, PosixRlimit,
    Process, Root, Spec, User, VERSION,
};

use crate::capabilities::DEFAULT_CAPABILITIES;

pub const DEFAULT_HOSTNAME: &str = "runcell";

pub const DEFAULT_ENV: [&str; 2] = [
    "PATH=/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin",
    "TERM=xterm",
];

pub const DEFAULT_MASKED_PATHS: [&str; 9] = [
    "/proc/acpi",
    "/proc/asound",
    "/proc/kcore",
    "/proc/keys",
    "/proc/latency_stats",
    "/proc/timer_list",
    "/proc/timer_stats",
    "/proc/sched_debug",
    "/sys/firmware",
];

pub const DEFAULT_READONLY_PATHS: [&str; 6] = [
    "/proc/bus",
    "/proc/fs",
    "/proc/irq",
    "/proc/sys",
    "/proc/sysrq-trigger",
    "/proc/scsi",
];

pub const DEFAULT_NAMESPACES: [&str; 5] = ["pid", "network", "ipc", "uts", "mount"];

/// 当前主机的操作系统（Go 命名）
pub fn host_os() -> &'static str {
    cfg_if::cfg_if! {
        if #[cfg(target_os = "linux")] {
            "linux"
        } else if #[cfg(target_os = "windows")] {
            "windows"
        } else if #[cfg(target_os = "solaris")] {
            "solaris"
        } else {
            std::env::consts::OS
        }
    }
}

/// 当前主机的 CPU 架构（Go 命名）
pub fn host_arch() -> &'static str {
    cfg_if::cfg_if! {
        if #[cfg(target_arch = "x86_64")] {
            "amd64"
        } else if #[cfg(target_arch = "x86")] {
            "386"
        } else if #[cfg(target_arch = "aarch64")] {
            "arm64"
        } else if #[cfg(all(target_arch = "powerpc64", target_endian = "little"))] {
            "ppc64le"
        } else if #[cfg(target_arch = "powerpc64")] {
            "ppc64"
        } else if #[cfg(target_arch = "s390x")] {
            "s390x"
        } else if #[cfg(all(target_arch = "mips64", target_endian = "little"))] {
            "mips64le"
        } else if #[cfg(target_arch = "mips64")] {
            "mips64"
        } else {
            std::env::consts::ARCH
        }
    }
}

fn mount(destination: &str, typ: &str, source: &str, options: &[&str]) -> Mount {
    Mount {
        destination: destination.to_string(),
        typ: typ.to_string(),
        source: source.to_string(),
        options: options.iter().map(|o| o.to_string()).collect(),
    }
}

fn default_mounts() -> Vec<Mount> {
    vec![
        mount("/proc", "proc", "proc", &[]),
        mount(
            "/dev",
            "tmpfs",
            "tmpfs",
            &["nosuid", "strictatime", "mode=755", "size=65536k"],
        ),
        mount(
            "/dev/pts",
            "devpts",
            "devpts",
            &["nosuid", "noexec", "newinstance", "ptmxmode=0666", "mode=0620", "gid=5"],
        ),
        mount(
            "/dev/shm",
            "tmpfs",
            "shm",
            &["nosuid", "noexec", "nodev", "mode=1777", "size=65536k"],
        ),
        mount("/dev/mqueue", "mqueue", "mqueue", &["nosuid", "noexec", "nodev"]),
        mount("/sys", "sysfs", "sysfs", &["nosuid", "noexec", "nodev", "ro"]),
    ]
}

/// 构造默认配置
pub fn default_spec() -> Spec {
    Spec {
        version: VERSION.to_string(),
        platform: Platform {
            os: host_os().to_string(),
            arch: host_arch().to_string(),
        },
        process: Process {
            terminal: false,
            user: User::default(),
            args: vec!["sh".to_string()],
            env: DEFAULT_ENV.iter().map(|e| e.to_string()).collect(),
            cwd: "/".to_string(),
            capabilities: DEFAULT_CAPABILITIES.iter().map(|c| c.to_string()).collect(),
            rlimits: vec![PosixRlimit {
                typ: "RLIMIT_NOFILE".to_string(),
                hard: 1024,
                soft: 1024,
            }],
            no_new_privileges: true,
            ..Default::default()
        },
        root: Root {
            path: "rootfs".to_string(),
            readonly: true,
        },
        hostname: DEFAULT_HOSTNAME.to_string(),
        mounts: default_mounts(),
        hooks: None,
        annotations: BTreeMap::new(),
        linux: Some(Linux {
            resources: Some(LinuxResources {
                devices: vec![LinuxDeviceCgroup {
                    allow: false,
                    typ: "a".to_string(),
                    major: None,
                    minor: None,
                    access: "rwm".to_string(),
                }],
                ..Default::default()
            }),
            namespaces: DEFAULT_NAMESPACES
                .iter()
                .map(|typ| LinuxNamespace {
                    typ: typ.to_string(),
                    path: String::new(),
                })
                .collect(),
            masked_paths: DEFAULT_MASKED_PATHS.iter().map(|p| p.to_string()).collect(),
            readonly_paths: DEFAULT_READONLY_PATHS.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        }),
    }
}
