//! # Bundle 校验器
//!
//! 加载 `<bundle>/config.json` 后依次执行各组检查，违例累积到 [`Violations`]。
//!
//! ## 检查分组
//! - **mod.rs**: 必选字段、版本号、平台、根文件系统、注解
//! - **process**: 工作目录、环境变量、能力、rlimit、AppArmor 配置
//! - **mounts**: 挂载点与钩子
//! - **linux**: namespace、ID 映射、sysctl、设备、seccomp 等
//! - **host**: 主机相关模式下与主机设备节点、平台的比对
//!
//! 只有访问文件系统失败（不存在除外）会中止校验。

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use runtime_spec::{PlatformOs, Spec};

use crate::{
    error::{Error, Result},
    mandatory,
    specerror::{Code, SpecViolation, Violations},
};

macro_rules! sl {
    () => {
        slog_scope::logger().new(o!("subsystem" => "validator"))
    };
}

mod host;
mod linux;
mod mounts;
mod process;

lazy_static! {
    static ref SEMVER: regex::Regex = regex::Regex::new(r"^\d+\.\d+\.\d+$").unwrap();
}

pub struct Validator {
    spec: Spec,
    bundle: PathBuf,
    host_specific: bool,
    spec_version: String,
}

impl Validator {
    pub fn new(spec: Spec, bundle: impl Into<PathBuf>, host_specific: bool) -> Self {
        Validator {
            spec,
            bundle: bundle.into(),
            host_specific,
            spec_version: runtime_spec::VERSION.to_string(),
        }
    }

    /// 读取 bundle 中的 config.json
    pub fn from_bundle(bundle: impl AsRef<Path>, host_specific: bool) -> Result<Self> {
        let bundle = bundle.as_ref();
        let config = bundle.join("config.json");
        info!(sl!(), "load bundle config"; "path" => config.display().to_string());

        let data = fs::read_to_string(&config).map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::ConfigNotFound(bundle.to_path_buf()),
            _ => Error::io(&config, e),
        })?;
        let spec = Spec::from_json(&data)?;
        Ok(Self::new(spec, bundle, host_specific))
    }

    /// 生成文档链接时使用的规范版本
    pub fn with_spec_version(mut self, version: &str) -> Self {
        self.spec_version = version.to_string();
        self
    }

    pub fn spec(&self) -> &Spec {
        &self.spec
    }

    pub fn bundle(&self) -> &Path {
        &self.bundle
    }

    pub fn host_specific(&self) -> bool {
        self.host_specific
    }

    /// 执行全部检查
    pub fn validate(&self) -> Result<Violations> {
        let mut out = Violations::new();

        self.check_mandatory(&mut out);
        self.check_semver(&mut out);
        self.check_platform(&mut out);
        self.check_root(&mut out)?;
        self.check_process(&mut out);
        self.check_hooks(&mut out);
        self.check_mounts(&mut out);
        self.check_annotations(&mut out);
        self.check_linux(&mut out);
        if self.host_specific {
            self.check_host_devices(&mut out)?;
        }

        info!(sl!(), "validation finished"; "violations" => out.len());
        Ok(out)
    }

    fn report(
        &self,
        out: &mut Violations,
        code: Code,
        subject: impl Into<String>,
        message: impl Into<String>,
    ) {
        let violation = SpecViolation::new(code, &self.spec_version, subject, message);
        debug!(sl!(), "violation";
            "code" => code.as_str(),
            "subject" => &violation.subject,
            "message" => &violation.message);
        out.push(violation);
    }

    fn rootfs(&self) -> PathBuf {
        self.spec.rootfs_path(&self.bundle)
    }

    /// 容器内路径在 rootfs 中的位置
    fn in_rootfs(&self, path: &str) -> PathBuf {
        self.rootfs().join(path.trim_start_matches('/'))
    }

    fn check_mandatory(&self, out: &mut Violations) {
        debug!(sl!(), "check mandatory fields");
        for path in mandatory::missing_fields(&self.spec) {
            let message = format!("{} is required", path);
            self.report(out, Code::MandatoryFieldMissing, path, message);
        }
    }

    fn check_semver(&self, out: &mut Violations) {
        let version = &self.spec.version;
        if !version.is_empty() && !SEMVER.is_match(version) {
            self.report(
                out,
                Code::SpecVersionInSemVer,
                "ociVersion",
                format!("{:?} is not a valid SemVer N.N.N", version),
            );
        }
    }

    fn check_platform(&self, out: &mut Violations) {
        debug!(sl!(), "check platform");
        let platform = &self.spec.platform;
        if platform.os.is_empty() {
            return;
        }

        let os: PlatformOs = match platform.os.parse() {
            Ok(os) => os,
            Err(_) => {
                self.report(
                    out,
                    Code::PlatformOsInvalid,
                    "platform.os",
                    format!("operation system {:?} is not supported", platform.os),
                );
                return;
            }
        };

        if !platform.arch.is_empty() && !os.arches().contains(&platform.arch.as_str()) {
            self.report(
                out,
                Code::PlatformArchInvalid,
                "platform.arch",
                format!("architecture {:?} is not supported on {}", platform.arch, os),
            );
        }

        if self.host_specific {
            self.check_host_platform(out, os);
        }
    }

    fn check_root(&self, out: &mut Violations) -> Result<()> {
        debug!(sl!(), "check root");
        if self.spec.root.path.is_empty() {
            return Ok(());
        }

        let rootfs = self.rootfs();
        match fs::metadata(&rootfs) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => self.report(
                out,
                Code::RootPathNotDirectory,
                "root.path",
                format!("root path {} is not a directory", rootfs.display()),
            ),
            Err(e) if e.kind() == ErrorKind::NotFound => self.report(
                out,
                Code::RootPathNotExist,
                "root.path",
                format!("root path {} does not exist", rootfs.display()),
            ),
            Err(e) => return Err(Error::io(rootfs, e)),
        }
        Ok(())
    }

    fn check_annotations(&self, out: &mut Violations) {
        if self.spec.annotations.contains_key("") {
            self.report(
                out,
                Code::AnnotationKeyEmpty,
                "annotations",
                "annotation keys must not be empty",
            );
        }
    }
}

/// `KEY=VALUE` 形式，KEY 非空
fn is_env_pair(entry: &str) -> bool {
    matches!(entry.split_once('='), Some((key, _)) if !key.is_empty())
}
