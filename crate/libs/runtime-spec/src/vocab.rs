//! # 枚举词汇表
//!
//! 配置中以字符串存储的枚举字段的合法取值集合。模型中保留字符串形式，
//! 这样加载的文档即使包含非法取值也能被完整读入，再由校验器报告；
//! 生成器在写入前通过这里的 `FromStr` 检查取值。

use std::{fmt, str::FromStr};

use thiserror::Error;

/// 无法识别的枚举取值
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized {kind}: {value:?}")]
pub struct UnknownValue {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownValue {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $name:ident ($kind:literal) {
            $( $(#[$vmeta:meta])* $variant:ident => $value:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// 全部取值，顺序与规范一致
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// 规范中的字符串形式
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $value),+
                }
            }
        }

        impl FromStr for $name {
            type Err = UnknownValue;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($value => Ok($name::$variant),)+
                    _ => Err(UnknownValue::new($kind, s)),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum! {
    /// Linux namespace 类型
    NamespaceType("namespace") {
        Pid => "pid",
        Network => "network",
        Mount => "mount",
        Ipc => "ipc",
        Uts => "uts",
        User => "user",
        Cgroup => "cgroup",
    }
}

impl NamespaceType {
    /// 解析命令行中的 namespace 名称
    ///
    /// 除规范名称外还接受 `/proc/<pid>/ns/` 下的短名称 `net` 和 `mnt`。
    pub fn parse_name(name: &str) -> Result<Self, UnknownValue> {
        match name {
            "net" => Ok(NamespaceType::Network),
            "mnt" => Ok(NamespaceType::Mount),
            other => other.parse(),
        }
    }

    /// `/proc/<pid>/ns/` 下对应的文件名
    pub fn proc_name(&self) -> &'static str {
        match self {
            NamespaceType::Network => "net",
            NamespaceType::Mount => "mnt",
            other => other.as_str(),
        }
    }
}

string_enum! {
    /// Seccomp 规则动作
    SeccompAction("seccomp action") {
        Allow => "SCMP_ACT_ALLOW",
        Errno => "SCMP_ACT_ERRNO",
        Kill => "SCMP_ACT_KILL",
        Trace => "SCMP_ACT_TRACE",
        Trap => "SCMP_ACT_TRAP",
    }
}

string_enum! {
    /// Seccomp 架构
    Arch("seccomp architecture") {
        X86 => "SCMP_ARCH_X86",
        Amd64 => "SCMP_ARCH_X86_64",
        X32 => "SCMP_ARCH_X32",
        Arm => "SCMP_ARCH_ARM",
        Aarch64 => "SCMP_ARCH_AARCH64",
        Mips => "SCMP_ARCH_MIPS",
        Mips64 => "SCMP_ARCH_MIPS64",
        Mips64N32 => "SCMP_ARCH_MIPS64N32",
        Mipsel => "SCMP_ARCH_MIPSEL",
        Mipsel64 => "SCMP_ARCH_MIPSEL64",
        Mipsel64N32 => "SCMP_ARCH_MIPSEL64N32",
        Ppc => "SCMP_ARCH_PPC",
        Ppc64 => "SCMP_ARCH_PPC64",
        Ppc64Le => "SCMP_ARCH_PPC64LE",
        S390 => "SCMP_ARCH_S390",
        S390X => "SCMP_ARCH_S390X",
    }
}

string_enum! {
    /// Seccomp 参数比较操作符
    SeccompOperator("seccomp operator") {
        NotEqual => "SCMP_CMP_NE",
        LessThan => "SCMP_CMP_LT",
        LessEqual => "SCMP_CMP_LE",
        EqualTo => "SCMP_CMP_EQ",
        GreaterEqual => "SCMP_CMP_GE",
        GreaterThan => "SCMP_CMP_GT",
        MaskedEqual => "SCMP_CMP_MASKED_EQ",
    }
}

string_enum! {
    /// 设备节点类型
    DeviceType("device type") {
        /// 块设备
        Block => "b",
        /// 字符设备
        Char => "c",
        /// 无缓冲字符设备
        Unbuffered => "u",
        /// FIFO
        Fifo => "p",
    }
}

impl DeviceType {
    /// 该类型是否需要主/次设备号
    ///
    /// `b`/`c`/`u` 需要 major 和 minor 均大于 0，`p` 要求两者都为 0。
    pub fn requires_numbers(&self) -> bool {
        !matches!(self, DeviceType::Fifo)
    }

    /// 检查主/次设备号是否符合类型约束
    pub fn numbers_valid(&self, major: i64, minor: i64) -> bool {
        if self.requires_numbers() {
            major > 0 && minor > 0
        } else {
            major == 0 && minor == 0
        }
    }
}

string_enum! {
    /// 根文件系统挂载传播模式
    RootfsPropagation("rootfs propagation") {
        Unset => "",
        Private => "private",
        Rprivate => "rprivate",
        Slave => "slave",
        Rslave => "rslave",
        Shared => "shared",
        Rshared => "rshared",
        Unbindable => "unbindable",
    }
}

string_enum! {
    /// 支持的目标操作系统
    PlatformOs("platform os") {
        Linux => "linux",
        Windows => "windows",
        Solaris => "solaris",
    }
}

impl PlatformOs {
    /// 该操作系统下合法的架构名称（Go 架构命名）
    pub fn arches(&self) -> &'static [&'static str] {
        match self {
            PlatformOs::Linux => &[
                "386", "amd64", "arm", "arm64", "ppc64", "ppc64le", "mips", "mipsle", "mips64",
                "mips64le", "s390x",
            ],
            PlatformOs::Windows => &["386", "amd64"],
            PlatformOs::Solaris => &["amd64"],
        }
    }
}

/// 已知的 POSIX rlimit 类型
pub const RLIMIT_TYPES: [&str; 16] = [
    "RLIMIT_AS",
    "RLIMIT_CORE",
    "RLIMIT_CPU",
    "RLIMIT_DATA",
    "RLIMIT_FSIZE",
    "RLIMIT_LOCKS",
    "RLIMIT_MEMLOCK",
    "RLIMIT_MSGQUEUE",
    "RLIMIT_NICE",
    "RLIMIT_NOFILE",
    "RLIMIT_NPROC",
    "RLIMIT_RSS",
    "RLIMIT_RTPRIO",
    "RLIMIT_RTTIME",
    "RLIMIT_SIGPENDING",
    "RLIMIT_STACK",
];
