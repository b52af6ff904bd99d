//! # 配置生成器
//!
//! `Generator` 独占持有一份 `Spec`，对外提供按功能分组的修改操作：
//!
//! ## 主要内容
//! - **mod.rs**: 构造、序列化、元数据与根文件系统
//! - **process**: 进程身份、参数、环境变量、能力、rlimit、特权模式
//! - **linux**: namespace、ID 映射、sysctl、设备、挂载传播、屏蔽路径
//! - **resources**: cgroup 资源限制
//! - **mounts**: 挂载项（tmpfs、bind、cgroup）
//! - **hooks**: 生命周期钩子
//! - **seccomp**: 默认动作、架构、规则增删
//!
//! ## 约定
//! 所有修改先校验输入，校验失败时配置保持不变；
//! 嵌套子树（如 `linux.resources.cpu`）在第一次写入时才创建。

use std::{
    fs::File,
    io::{BufReader, Read, Write},
    path::Path,
};

use runtime_spec::{Hooks, Linux, LinuxResources, LinuxSeccomp, PlatformOs, Spec};
use serde::Serialize;

use crate::error::{Error, ParseError, Result};

pub mod defaults;
mod hooks;
mod linux;
mod mounts;
mod process;
mod resources;
mod seccomp;

pub use hooks::{HookStage, parse_hook};
pub use linux::{IdMappingKind, MAX_ID_MAPPINGS, parse_device, parse_id_mapping};
pub use mounts::{DEFAULT_TMPFS_OPTIONS, parse_bind, parse_tmpfs};
pub use resources::{BLKIO_WEIGHT_RANGE, Throttle, parse_device_value};

macro_rules! sl {
    () => {
        slog_scope::logger().new(o!("subsystem" => "generator"))
    };
}

lazy_static! {
    static ref SEMVER: regex::Regex = regex::Regex::new(r"^\d+\.\d+\.\d+$").unwrap();
}

/// 序列化选项
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExportOptions {
    /// 只输出 `linux.seccomp` 子树
    pub seccomp: bool,
}

/// 配置生成器
#[derive(Debug, Clone)]
pub struct Generator {
    spec: Spec,
    host_specific: bool,
}

impl Default for Generator {
    fn default() -> Self {
        Self::new()
    }
}

impl Generator {
    /// 以默认模板创建
    pub fn new() -> Self {
        Self::from_spec(defaults::default_spec())
    }

    /// 以全零配置创建
    pub fn empty() -> Self {
        Self::from_spec(Spec::default())
    }

    pub fn from_spec(spec: Spec) -> Self {
        Generator {
            spec,
            host_specific: false,
        }
    }

    /// 从 JSON 模板加载，缺失字段取零值，未知字段忽略
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let spec: Spec = serde_json::from_reader(reader)?;
        Ok(Self::from_spec(spec))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(sl!(), "load template"; "path" => path.display().to_string());
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    /// 主机相关模式：能力必须被当前主机支持，特权模式只授予主机支持的能力
    pub fn set_host_specific(&mut self, host_specific: bool) {
        self.host_specific = host_specific;
    }

    pub fn host_specific(&self) -> bool {
        self.host_specific
    }

    pub fn spec(&self) -> &Spec {
        &self.spec
    }

    pub fn into_spec(self) -> Spec {
        self.spec
    }

    /// 移除不可移植和提升权限的字段
    pub fn sanitize(&mut self) {
        crate::sanitize(&mut self.spec);
    }

    // ========================================================================
    // 序列化
    // ========================================================================

    /// 序列化为以 tab 缩进的 JSON
    pub fn to_json(&self, opts: ExportOptions) -> Result<String> {
        let mut buf = Vec::new();
        self.save(&mut buf, opts)?;
        // serde_json 只输出合法 UTF-8
        String::from_utf8(buf).map_err(|e| Error::invalid_state(e.to_string()))
    }

    pub fn save<W: Write>(&self, writer: W, opts: ExportOptions) -> Result<()> {
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
        let mut ser = serde_json::Serializer::with_formatter(writer, formatter);

        if opts.seccomp {
            match self.spec.linux.as_ref().and_then(|l| l.seccomp.as_ref()) {
                Some(seccomp) => seccomp.serialize(&mut ser)?,
                None => serde_json::Map::new().serialize(&mut ser)?,
            }
        } else {
            self.spec.serialize(&mut ser)?;
        }

        let mut writer = ser.into_inner();
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    /// 截断并写入文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P, opts: ExportOptions) -> Result<()> {
        let file = File::create(path.as_ref())?;
        self.save(file, opts)
    }

    // ========================================================================
    // 元数据
    // ========================================================================

    pub fn set_oci_version(&mut self, version: &str) -> Result<()> {
        if !SEMVER.is_match(version) {
            return Err(self.reject(ParseError::malformed(
                "version",
                version,
                "expected N.N.N",
            )));
        }
        self.spec.version = version.to_string();
        Ok(())
    }

    pub fn set_hostname(&mut self, hostname: &str) {
        self.spec.hostname = hostname.to_string();
    }

    pub fn set_platform_os(&mut self, os: &str) -> Result<()> {
        let os: PlatformOs = os.parse().map_err(|e| self.reject(e))?;
        self.spec.platform.os = os.as_str().to_string();
        Ok(())
    }

    /// 设置架构，操作系统已知时要求架构属于该操作系统
    pub fn set_platform_arch(&mut self, arch: &str) -> Result<()> {
        if let Ok(os) = self.spec.platform.os.parse::<PlatformOs>() {
            if !os.arches().contains(&arch) {
                return Err(self.reject(ParseError::unrecognized("architecture", arch)));
            }
        }
        self.spec.platform.arch = arch.to_string();
        Ok(())
    }

    pub fn add_annotation(&mut self, key: &str, value: &str) -> Result<()> {
        if key.is_empty() {
            return Err(self.reject(ParseError::malformed(
                "annotation",
                value,
                "empty key",
            )));
        }
        self.spec
            .annotations
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    pub fn remove_annotation(&mut self, key: &str) {
        self.spec.annotations.remove(key);
    }

    pub fn clear_annotations(&mut self) {
        self.spec.annotations.clear();
    }

    // ========================================================================
    // 根文件系统
    // ========================================================================

    pub fn set_root_path(&mut self, path: &str) {
        self.spec.root.path = path.to_string();
    }

    pub fn set_root_readonly(&mut self, readonly: bool) {
        self.spec.root.readonly = readonly;
    }

    // ========================================================================
    // 内部辅助
    // ========================================================================

    /// 记录被拒绝的修改并转换为错误
    fn reject(&self, err: impl Into<Error>) -> Error {
        let err = err.into();
        warn!(sl!(), "mutation rejected"; "error" => err.to_string());
        err
    }

    fn linux_mut(&mut self) -> &mut Linux {
        self.spec.linux.get_or_insert_with(Default::default)
    }

    fn resources_mut(&mut self) -> &mut LinuxResources {
        self.linux_mut()
            .resources
            .get_or_insert_with(Default::default)
    }

    fn seccomp_mut(&mut self) -> &mut LinuxSeccomp {
        self.linux_mut().seccomp.get_or_insert_with(Default::default)
    }

    fn hooks_mut(&mut self) -> &mut Hooks {
        self.spec.hooks.get_or_insert_with(Default::default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use runtime_spec::{LinuxSeccompArg, LinuxSyscall, PosixRlimit};

    #[test]
    fn test_tab_indented_output() {
        let g = Generator::new();
        let json = g.to_json(ExportOptions::default()).unwrap();
        assert!(json.starts_with("{\n\t\"ociVersion\""));
        assert!(json.ends_with("}\n"));
    }

    #[test]
    fn test_export_seccomp_only() {
        let mut g = Generator::new();
        assert_eq!(
            g.to_json(ExportOptions { seccomp: true }).unwrap(),
            "{}\n"
        );

        g.set_seccomp_default("errno").unwrap();
        let json = g.to_json(ExportOptions { seccomp: true }).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["defaultAction"], "SCMP_ACT_ERRNO");
        assert!(value.get("ociVersion").is_none());
    }

    #[test]
    fn test_load_ignores_unknown_fields() {
        let data = r#"{"ociVersion": "1.0.2", "process": {"args": ["ls"], "cwd": "/"}, "vendor": 1}"#;
        let g = Generator::from_reader(data.as_bytes()).unwrap();
        assert_eq!(g.spec().version, "1.0.2");
        assert_eq!(g.spec().process.args, vec!["ls"]);
        assert!(g.spec().linux.is_none());

        assert!(matches!(
            Generator::from_reader("[1, 2]".as_bytes()),
            Err(Error::Schema(_))
        ));
    }

    #[test]
    fn test_save_to_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut g = Generator::new();
        g.set_hostname("box");
        g.save_to_file(&path, ExportOptions::default()).unwrap();

        let loaded = Generator::from_file(&path).unwrap();
        assert_eq!(loaded.spec(), g.spec());

        assert!(matches!(
            Generator::from_file(dir.path().join("missing.json")),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_metadata() {
        let mut g = Generator::empty();
        g.set_oci_version("1.0.2").unwrap();
        assert!(g.set_oci_version("1.0").unwrap_err().is_parse());
        assert!(g.set_oci_version("v1.0.0").is_err());
        assert_eq!(g.spec().version, "1.0.2");

        g.set_platform_os("linux").unwrap();
        g.set_platform_arch("arm64").unwrap();
        assert!(g.set_platform_os("plan9").is_err());
        assert!(g.set_platform_arch("sparc").is_err());
        assert_eq!(g.spec().platform.os, "linux");
        assert_eq!(g.spec().platform.arch, "arm64");

        g.add_annotation("org.example.key", "a").unwrap();
        g.add_annotation("org.example.key", "b").unwrap();
        g.add_annotation("other", "c").unwrap();
        assert!(g.add_annotation("", "x").is_err());
        assert_eq!(g.spec().annotations.len(), 2);
        assert_eq!(g.spec().annotations["org.example.key"], "b");
        g.remove_annotation("other");
        assert_eq!(g.spec().annotations.len(), 1);
        g.clear_annotations();
        assert!(g.spec().annotations.is_empty());

        g.set_root_path("/var/lib/box/rootfs");
        g.set_root_readonly(true);
        assert_eq!(g.spec().root.path, "/var/lib/box/rootfs");
        assert!(g.spec().root.readonly);
    }

    fn spec_strategy() -> impl Strategy<Value = Spec> {
        (
            "[a-z]{1,8}",
            prop::collection::vec("[a-z]{1,6}", 1..4),
            prop::collection::btree_map("[a-z.]{1,8}", "[a-z0-9]{0,8}", 0..4),
            prop::option::of(0i32..1000),
            prop::option::of((0i64..3, prop::collection::vec("[a-z]{1,6}", 1..3))),
        )
            .prop_map(|(hostname, args, annotations, oom, seccomp)| {
                let mut spec = defaults::default_spec();
                spec.hostname = hostname;
                spec.process.args = args;
                spec.process.oom_score_adj = oom;
                spec.process.rlimits.push(PosixRlimit {
                    typ: "RLIMIT_CORE".to_string(),
                    hard: 0,
                    soft: 0,
                });
                spec.annotations = annotations;
                if let Some((value, names)) = seccomp {
                    let linux = spec.linux.get_or_insert_with(Default::default);
                    linux.seccomp = Some(LinuxSeccomp {
                        default_action: "SCMP_ACT_ERRNO".to_string(),
                        architectures: vec!["SCMP_ARCH_X86_64".to_string()],
                        syscalls: vec![LinuxSyscall {
                            names,
                            action: "SCMP_ACT_ALLOW".to_string(),
                            args: vec![LinuxSeccompArg {
                                index: 0,
                                value: value as u64,
                                value_two: 0,
                                op: "SCMP_CMP_EQ".to_string(),
                            }],
                        }],
                    });
                }
                spec
            })
    }

    proptest! {
        #[test]
        fn prop_serialize_roundtrip(spec in spec_strategy()) {
            let g = Generator::from_spec(spec.clone());
            let json = g.to_json(ExportOptions::default()).unwrap();
            let loaded = Generator::from_reader(json.as_bytes()).unwrap();
            prop_assert_eq!(loaded.into_spec(), spec);
        }
    }
}
