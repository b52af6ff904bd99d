//! 主机相关检查
//!
//! 只在主机相关模式下执行：配置中的平台必须与当前主机一致，
//! 声明的设备若在主机上存在，其类型、设备号、权限和属主必须与主机节点一致。

use std::{io, str::FromStr};

use nix::{
    errno::Errno,
    sys::stat::{FileStat, SFlag, major, minor, stat},
};
use runtime_spec::{DeviceType, LinuxDevice, PlatformOs};
use specgen::generator::defaults;

use super::Validator;
use crate::{
    error::{Error, Result},
    specerror::{Code, Violations},
};

fn device_sflag(typ: DeviceType) -> SFlag {
    match typ {
        DeviceType::Block => SFlag::S_IFBLK,
        DeviceType::Char | DeviceType::Unbuffered => SFlag::S_IFCHR,
        DeviceType::Fifo => SFlag::S_IFIFO,
    }
}

impl Validator {
    pub(super) fn check_host_platform(&self, out: &mut Violations, os: PlatformOs) {
        let host_os = defaults::host_os();
        let host_arch = defaults::host_arch();

        if os.as_str() != host_os {
            self.report(
                out,
                Code::PlatformHostMismatch,
                "platform.os",
                format!("platform os {} does not match host os {}", os, host_os),
            );
        }

        let arch = &self.spec.platform.arch;
        if !arch.is_empty() && arch != host_arch {
            self.report(
                out,
                Code::PlatformHostMismatch,
                "platform.arch",
                format!("platform arch {} does not match host arch {}", arch, host_arch),
            );
        }
    }

    pub(super) fn check_host_devices(&self, out: &mut Violations) -> Result<()> {
        let Some(linux) = self.spec.linux.as_ref() else {
            return Ok(());
        };
        debug!(sl!(), "check host devices");

        for (i, device) in linux.devices.iter().enumerate() {
            // 非法类型已由 linux 检查报告
            let Ok(typ) = DeviceType::from_str(&device.typ) else {
                continue;
            };
            if !device.path.starts_with('/') {
                continue;
            }

            let st = match stat(device.path.as_str()) {
                Ok(st) => st,
                Err(Errno::ENOENT) => {
                    debug!(sl!(), "device absent on host"; "path" => &device.path);
                    continue;
                }
                Err(e) => return Err(Error::io(&device.path, io::Error::from(e))),
            };

            let subject = format!("linux.devices[{}]", i);
            for message in mismatches(device, typ, &st) {
                self.report(out, Code::DevicesFileNotMatch, subject.clone(), message);
            }
        }
        Ok(())
    }
}

/// 配置中的设备与主机节点的差异
fn mismatches(device: &LinuxDevice, typ: DeviceType, st: &FileStat) -> Vec<String> {
    let mut diffs = Vec::new();

    let kind = SFlag::from_bits_truncate(st.st_mode) & SFlag::S_IFMT;
    if kind != device_sflag(typ) {
        diffs.push(format!("{} is not a {} device on the host", device.path, typ));
        return diffs;
    }

    if typ.requires_numbers() {
        let (host_major, host_minor) = (major(st.st_rdev), minor(st.st_rdev));
        if device.major as u64 != host_major || device.minor as u64 != host_minor {
            diffs.push(format!(
                "{} is {}:{} on the host, not {}:{}",
                device.path, host_major, host_minor, device.major, device.minor
            ));
        }
    }

    if let Some(mode) = device.file_mode {
        let host_mode = st.st_mode & 0o7777;
        if mode != host_mode {
            diffs.push(format!(
                "{} has mode {:o} on the host, not {:o}",
                device.path, host_mode, mode
            ));
        }
    }

    if let Some(uid) = device.uid {
        if uid != st.st_uid {
            diffs.push(format!(
                "{} is owned by uid {} on the host, not {}",
                device.path, st.st_uid, uid
            ));
        }
    }

    if let Some(gid) = device.gid {
        if gid != st.st_gid {
            diffs.push(format!(
                "{} is owned by gid {} on the host, not {}",
                device.path, st.st_gid, gid
            ));
        }
    }

    diffs
}

#[cfg(test)]
mod tests {
    use std::fs;

    use specgen::Generator;

    use super::super::tests::bundle_with;
    use super::*;

    fn host_codes(spec: &runtime_spec::Spec) -> Vec<Code> {
        let dir = bundle_with(spec);
        Validator::from_bundle(dir.path(), true)
            .unwrap()
            .validate()
            .unwrap()
            .iter()
            .filter(|v| v.code == Code::DevicesFileNotMatch)
            .map(|v| v.code)
            .collect()
    }

    fn with_device(device: LinuxDevice) -> runtime_spec::Spec {
        let mut g = Generator::new();
        g.add_linux_device(device).unwrap();
        g.into_spec()
    }

    #[test]
    fn test_dev_null_matches() {
        let spec = with_device(LinuxDevice {
            path: "/dev/null".to_string(),
            typ: "c".to_string(),
            major: 1,
            minor: 3,
            ..Default::default()
        });
        assert!(host_codes(&spec).is_empty());
    }

    #[test]
    fn test_device_number_mismatch() {
        let spec = with_device(LinuxDevice {
            path: "/dev/null".to_string(),
            typ: "c".to_string(),
            major: 1,
            minor: 5,
            ..Default::default()
        });
        assert_eq!(host_codes(&spec), vec![Code::DevicesFileNotMatch]);
    }

    #[test]
    fn test_regular_file_is_not_device() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("fake-null");
        fs::write(&file, "").unwrap();

        let spec = with_device(LinuxDevice {
            path: file.display().to_string(),
            typ: "c".to_string(),
            major: 1,
            minor: 3,
            ..Default::default()
        });
        assert_eq!(host_codes(&spec), vec![Code::DevicesFileNotMatch]);
    }

    #[test]
    fn test_absent_device_skipped() {
        let spec = with_device(LinuxDevice {
            path: "/dev/definitely-not-here".to_string(),
            typ: "b".to_string(),
            major: 8,
            minor: 1,
            ..Default::default()
        });
        assert!(host_codes(&spec).is_empty());
    }

    #[test]
    fn test_host_platform() {
        let mut spec = Generator::new().into_spec();
        let other = if defaults::host_os() == "linux" {
            "windows"
        } else {
            "linux"
        };
        spec.platform.os = other.to_string();
        spec.platform.arch = "amd64".to_string();

        let dir = bundle_with(&spec);
        let vs = Validator::from_bundle(dir.path(), true)
            .unwrap()
            .validate()
            .unwrap();
        assert!(
            vs.iter()
                .any(|v| v.code == Code::PlatformHostMismatch && v.subject == "platform.os")
        );
    }
}
