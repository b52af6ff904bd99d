//! # 规范违例
//!
//! 每个校验失败生成一个 [`SpecViolation`]，包含：
//! - 稳定的错误码 [`Code`]
//! - RFC 2119 级别 [`Level`]
//! - 指向 runtime-spec 文档对应章节的链接
//! - 可读的说明和违例字段路径
//!
//! 违例只累积不中断校验，最终由 [`Violations`] 按级别过滤。

use std::{fmt, str::FromStr};

use serde::Serialize;
use thiserror::Error;

/// 文档链接
pub fn reference(version: &str, fragment: &str) -> String {
    format!(
        "https://github.com/opencontainers/runtime-spec/blob/v{}/{}",
        version, fragment
    )
}

// ============================================================================
// 级别
// ============================================================================

/// RFC 2119 要求级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Level {
    May,
    Optional,
    Should,
    ShouldNot,
    Recommended,
    NotRecommended,
    Must,
    MustNot,
    Shall,
    ShallNot,
    Required,
}

impl Level {
    /// 合规过滤使用的严重程度：MAY 类 0，SHOULD 类 1，MUST 类 2
    pub fn severity(&self) -> u8 {
        match self {
            Level::May | Level::Optional => 0,
            Level::Should | Level::ShouldNot | Level::Recommended | Level::NotRecommended => 1,
            Level::Must | Level::MustNot | Level::Shall | Level::ShallNot | Level::Required => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::May => "MAY",
            Level::Optional => "OPTIONAL",
            Level::Should => "SHOULD",
            Level::ShouldNot => "SHOULD NOT",
            Level::Recommended => "RECOMMENDED",
            Level::NotRecommended => "NOT RECOMMENDED",
            Level::Must => "MUST",
            Level::MustNot => "MUST NOT",
            Level::Shall => "SHALL",
            Level::ShallNot => "SHALL NOT",
            Level::Required => "REQUIRED",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 无法识别的级别名称
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized compliance level: {0:?}")]
pub struct UnknownLevel(pub String);

impl FromStr for Level {
    type Err = UnknownLevel;

    /// 大小写不敏感，空格、`-`、`_` 可省略，例如 `should-not`、`MUST NOT`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .flat_map(char::to_lowercase)
            .collect();
        let level = match key.as_str() {
            "may" => Level::May,
            "optional" => Level::Optional,
            "should" => Level::Should,
            "shouldnot" => Level::ShouldNot,
            "recommended" => Level::Recommended,
            "notrecommended" => Level::NotRecommended,
            "must" => Level::Must,
            "mustnot" => Level::MustNot,
            "shall" => Level::Shall,
            "shallnot" => Level::ShallNot,
            "required" => Level::Required,
            _ => return Err(UnknownLevel(s.to_string())),
        };
        Ok(level)
    }
}

// ============================================================================
// 错误码
// ============================================================================

macro_rules! codes {
    ( $( $code:ident => ($level:ident, $fragment:literal) ),+ $(,)? ) => {
        /// 违例错误码
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Code {
            $( $code ),+
        }

        impl Code {
            /// 稳定的机器可读标识
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( Code::$code => stringify!($code) ),+
                }
            }

            /// 规范对该要求的级别
            pub fn level(&self) -> Level {
                match self {
                    $( Code::$code => Level::$level ),+
                }
            }

            /// 文档中的章节
            pub fn fragment(&self) -> &'static str {
                match self {
                    $( Code::$code => $fragment ),+
                }
            }
        }
    };
}

codes! {
    MandatoryFieldMissing => (Must, "config.md"),
    SpecVersionInSemVer => (Must, "config.md#specification-version"),

    PlatformOsInvalid => (Must, "config.md#platform"),
    PlatformArchInvalid => (Must, "config.md#platform"),
    PlatformHostMismatch => (Must, "config.md#platform"),

    RootPathNotExist => (Must, "config.md#root"),
    RootPathNotDirectory => (Must, "config.md#root"),

    ProcCwdAbs => (Must, "config.md#process"),
    ProcEnvInvalid => (Must, "config.md#process"),
    ProcCapInvalid => (Must, "config.md#linux-process"),
    ProcCapDuplicate => (Should, "config.md#linux-process"),
    ProcCapNotSupported => (Must, "config.md#linux-process"),
    ProcRlimitTypeInvalid => (Must, "config.md#posix-process"),
    ProcRlimitDuplicate => (Must, "config.md#posix-process"),
    ProcRlimitSoftExceedsHard => (Must, "config.md#posix-process"),
    ProcApparmorProfileNotExist => (Must, "config.md#linux-process"),

    HookPathAbs => (Must, "config.md#posix-platform-hooks"),
    HookEnvInvalid => (Must, "config.md#posix-platform-hooks"),
    HookTimeoutInvalid => (Must, "config.md#posix-platform-hooks"),

    MountDestinationAbs => (Must, "config.md#mounts"),
    MountDestinationNotExist => (Must, "config.md#mounts"),

    NsTypeInvalid => (Must, "config-linux.md#namespaces"),
    NsTypeDuplicate => (Must, "config-linux.md#namespaces"),
    NsPathAbs => (Must, "config-linux.md#namespaces"),
    IdMappingsTooMany => (Must, "config-linux.md#user-namespace-mappings"),
    IdMappingsWithoutUserNs => (Should, "config-linux.md#user-namespace-mappings"),
    HostnameWithoutUtsNs => (Should, "config.md#hostname"),
    SysctlWithoutNs => (Should, "config-linux.md#sysctl"),
    RootfsPropagationInvalid => (Must, "config-linux.md#rootfs-mount-propagation"),

    DeviceTypeInvalid => (Must, "config-linux.md#devices"),
    DeviceNumbersInvalid => (Must, "config-linux.md#devices"),
    DevicePathAbs => (Must, "config-linux.md#devices"),
    DevicePathDuplicate => (Must, "config-linux.md#devices"),
    DevicesFileNotMatch => (Must, "config-linux.md#devices"),
    DeviceCgroupTypeInvalid => (Must, "config-linux.md#allowed-device-list"),
    DeviceCgroupAccessInvalid => (Must, "config-linux.md#allowed-device-list"),

    MaskedPathAbs => (Must, "config-linux.md#masked-paths"),
    ReadonlyPathAbs => (Must, "config-linux.md#readonly-paths"),

    SeccompDefaultActionInvalid => (Must, "config-linux.md#seccomp"),
    SeccompArchInvalid => (Must, "config-linux.md#seccomp"),
    SeccompArchDuplicate => (Should, "config-linux.md#seccomp"),
    SeccompActionInvalid => (Must, "config-linux.md#seccomp"),
    SeccompOperatorInvalid => (Must, "config-linux.md#seccomp"),

    AnnotationKeyEmpty => (Must, "config.md#annotations"),
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Code {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// ============================================================================
// 违例
// ============================================================================

/// 一次校验失败
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("[{level}] {code}: {message} ({subject})\nRefer to: {reference}")]
pub struct SpecViolation {
    pub code: Code,
    pub level: Level,
    pub reference: String,
    pub message: String,
    /// 违例字段的 JSON 路径，例如 `process.args`
    pub subject: String,
}

impl SpecViolation {
    pub fn new(
        code: Code,
        version: &str,
        subject: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        SpecViolation {
            code,
            level: code.level(),
            reference: reference(version, code.fragment()),
            message: message.into(),
            subject: subject.into(),
        }
    }
}

/// 违例集合，保持发现顺序
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Violations(Vec<SpecViolation>);

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, violation: SpecViolation) {
        self.0.push(violation);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SpecViolation> {
        self.0.iter()
    }

    /// 严重程度不低于 `level` 的违例
    pub fn at_least(&self, level: Level) -> Vec<&SpecViolation> {
        self.0
            .iter()
            .filter(|v| v.level.severity() >= level.severity())
            .collect()
    }

    pub fn has_code(&self, code: Code) -> bool {
        self.0.iter().any(|v| v.code == code)
    }

    pub fn into_inner(self) -> Vec<SpecViolation> {
        self.0
    }
}

impl IntoIterator for Violations {
    type Item = SpecViolation;
    type IntoIter = std::vec::IntoIter<SpecViolation>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Violations {
    type Item = &'a SpecViolation;
    type IntoIter = std::slice::Iter<'a, SpecViolation>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
