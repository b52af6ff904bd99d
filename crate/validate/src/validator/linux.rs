//! Linux 子树检查

use std::str::FromStr;

use runtime_spec::{
    Arch, DeviceType, Linux, LinuxSeccomp, NamespaceType, RootfsPropagation, SeccompAction,
    SeccompOperator,
};

use super::Validator;
use crate::specerror::{Code, Violations};

const MAX_ID_MAPPINGS: usize = specgen::generator::MAX_ID_MAPPINGS;

/// 需要 ipc namespace 的 sysctl
fn is_ipc_sysctl(key: &str) -> bool {
    key.starts_with("kernel.msg")
        || key == "kernel.sem"
        || key.starts_with("kernel.shm")
        || key.starts_with("fs.mqueue.")
}

impl Validator {
    pub(super) fn check_linux(&self, out: &mut Violations) {
        let Some(linux) = self.spec.linux.as_ref() else {
            return;
        };
        debug!(sl!(), "check linux");

        self.check_namespaces(out, linux);
        self.check_id_mappings(out, linux);
        self.check_sysctl(out, linux);

        if RootfsPropagation::from_str(&linux.rootfs_propagation).is_err() {
            self.report(
                out,
                Code::RootfsPropagationInvalid,
                "linux.rootfsPropagation",
                format!("rootfsPropagation {:?} is invalid", linux.rootfs_propagation),
            );
        }

        self.check_devices(out, linux);
        self.check_device_cgroup(out, linux);

        for (field, code, paths) in [
            ("maskedPaths", Code::MaskedPathAbs, &linux.masked_paths),
            ("readonlyPaths", Code::ReadonlyPathAbs, &linux.readonly_paths),
        ] {
            for (i, path) in paths.iter().enumerate() {
                if !path.starts_with('/') {
                    self.report(
                        out,
                        code,
                        format!("linux.{}[{}]", field, i),
                        format!("{:?} is not an absolute path", path),
                    );
                }
            }
        }

        if let Some(seccomp) = linux.seccomp.as_ref() {
            self.check_seccomp(out, seccomp);
        }
    }

    fn check_namespaces(&self, out: &mut Violations, linux: &Linux) {
        for (i, ns) in linux.namespaces.iter().enumerate() {
            if ns.typ.is_empty() {
                continue;
            }
            let subject = format!("linux.namespaces[{}]", i);

            if NamespaceType::from_str(&ns.typ).is_err() {
                self.report(
                    out,
                    Code::NsTypeInvalid,
                    subject.clone(),
                    format!("namespace type {:?} is invalid", ns.typ),
                );
            } else if linux.namespaces[..i].iter().any(|n| n.typ == ns.typ) {
                self.report(
                    out,
                    Code::NsTypeDuplicate,
                    subject.clone(),
                    format!("namespace {} is duplicated", ns.typ),
                );
            }

            if !ns.path.is_empty() && !ns.path.starts_with('/') {
                self.report(
                    out,
                    Code::NsPathAbs,
                    subject,
                    format!("namespace path {:?} is not absolute", ns.path),
                );
            }
        }

        let has_uts = linux.namespace(NamespaceType::Uts.as_str()).is_some();
        if !self.spec.hostname.is_empty() && !has_uts {
            self.report(
                out,
                Code::HostnameWithoutUtsNs,
                "hostname",
                "hostname is set but no uts namespace is configured",
            );
        }
    }

    fn check_id_mappings(&self, out: &mut Violations, linux: &Linux) {
        for (field, mappings) in [
            ("uidMappings", &linux.uid_mappings),
            ("gidMappings", &linux.gid_mappings),
        ] {
            if mappings.len() > MAX_ID_MAPPINGS {
                self.report(
                    out,
                    Code::IdMappingsTooMany,
                    format!("linux.{}", field),
                    format!(
                        "{} has {} entries, at most {} are allowed",
                        field,
                        mappings.len(),
                        MAX_ID_MAPPINGS
                    ),
                );
            }
        }

        let has_mappings = !linux.uid_mappings.is_empty() || !linux.gid_mappings.is_empty();
        if has_mappings && linux.namespace(NamespaceType::User.as_str()).is_none() {
            self.report(
                out,
                Code::IdMappingsWithoutUserNs,
                "linux.uidMappings",
                "id mappings are set but no user namespace is configured",
            );
        }
    }

    fn check_sysctl(&self, out: &mut Violations, linux: &Linux) {
        let has_net = linux.namespace(NamespaceType::Network.as_str()).is_some();
        let has_ipc = linux.namespace(NamespaceType::Ipc.as_str()).is_some();

        for key in linux.sysctl.keys() {
            let missing = if key.starts_with("net.") && !has_net {
                Some(NamespaceType::Network)
            } else if is_ipc_sysctl(key) && !has_ipc {
                Some(NamespaceType::Ipc)
            } else {
                None
            };

            if let Some(ns) = missing {
                self.report(
                    out,
                    Code::SysctlWithoutNs,
                    format!("linux.sysctl.{}", key),
                    format!("sysctl {} requires a {} namespace", key, ns),
                );
            }
        }
    }

    fn check_devices(&self, out: &mut Violations, linux: &Linux) {
        for (i, device) in linux.devices.iter().enumerate() {
            let subject = format!("linux.devices[{}]", i);

            if !device.typ.is_empty() {
                match DeviceType::from_str(&device.typ) {
                    Ok(typ) if !typ.numbers_valid(device.major, device.minor) => self.report(
                        out,
                        Code::DeviceNumbersInvalid,
                        subject.clone(),
                        format!(
                            "device {} of type {} has invalid major/minor {}:{}",
                            device.path, typ, device.major, device.minor
                        ),
                    ),
                    Ok(_) => {}
                    Err(_) => self.report(
                        out,
                        Code::DeviceTypeInvalid,
                        subject.clone(),
                        format!("device type {:?} is invalid", device.typ),
                    ),
                }
            }

            if device.path.is_empty() {
                continue;
            }
            if !device.path.starts_with('/') {
                self.report(
                    out,
                    Code::DevicePathAbs,
                    subject,
                    format!("device path {:?} is not absolute", device.path),
                );
            } else if linux.devices[..i].iter().any(|d| d.path == device.path) {
                self.report(
                    out,
                    Code::DevicePathDuplicate,
                    subject,
                    format!("device {} is duplicated", device.path),
                );
            }
        }
    }

    fn check_device_cgroup(&self, out: &mut Violations, linux: &Linux) {
        let Some(resources) = linux.resources.as_ref() else {
            return;
        };

        for (i, rule) in resources.devices.iter().enumerate() {
            let subject = format!("linux.resources.devices[{}]", i);

            if !rule.typ.is_empty() && !matches!(rule.typ.as_str(), "a" | "b" | "c") {
                self.report(
                    out,
                    Code::DeviceCgroupTypeInvalid,
                    subject.clone(),
                    format!("device cgroup type {:?} is invalid", rule.typ),
                );
            }

            if !rule.access.chars().all(|c| matches!(c, 'r' | 'w' | 'm')) {
                self.report(
                    out,
                    Code::DeviceCgroupAccessInvalid,
                    subject,
                    format!("device cgroup access {:?} is not a subset of rwm", rule.access),
                );
            }
        }
    }

    fn check_seccomp(&self, out: &mut Violations, seccomp: &LinuxSeccomp) {
        debug!(sl!(), "check seccomp");

        if !seccomp.default_action.is_empty()
            && SeccompAction::from_str(&seccomp.default_action).is_err()
        {
            self.report(
                out,
                Code::SeccompDefaultActionInvalid,
                "linux.seccomp.defaultAction",
                format!("seccomp default action {:?} is invalid", seccomp.default_action),
            );
        }

        for (i, arch) in seccomp.architectures.iter().enumerate() {
            let subject = format!("linux.seccomp.architectures[{}]", i);
            if Arch::from_str(arch).is_err() {
                self.report(
                    out,
                    Code::SeccompArchInvalid,
                    subject,
                    format!("seccomp architecture {:?} is invalid", arch),
                );
            } else if seccomp.architectures[..i].contains(arch) {
                self.report(
                    out,
                    Code::SeccompArchDuplicate,
                    subject,
                    format!("seccomp architecture {} is duplicated", arch),
                );
            }
        }

        for (i, syscall) in seccomp.syscalls.iter().enumerate() {
            let subject = format!("linux.seccomp.syscalls[{}]", i);

            if !syscall.action.is_empty() && SeccompAction::from_str(&syscall.action).is_err() {
                self.report(
                    out,
                    Code::SeccompActionInvalid,
                    format!("{}.action", subject),
                    format!("seccomp action {:?} is invalid", syscall.action),
                );
            }

            for (j, arg) in syscall.args.iter().enumerate() {
                if !arg.op.is_empty() && SeccompOperator::from_str(&arg.op).is_err() {
                    self.report(
                        out,
                        Code::SeccompOperatorInvalid,
                        format!("{}.args[{}].op", subject, j),
                        format!("seccomp operator {:?} is invalid", arg.op),
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use runtime_spec::{
        LinuxDevice, LinuxDeviceCgroup, LinuxIdMapping, LinuxNamespace, LinuxSeccompArg,
        LinuxSyscall,
    };
    use specgen::Generator;

    use super::super::tests::codes;
    use super::*;

    fn linux_mut(spec: &mut runtime_spec::Spec) -> &mut Linux {
        spec.linux.get_or_insert_with(Default::default)
    }

    #[test]
    fn test_namespaces() {
        let mut spec = Generator::new().into_spec();
        let linux = linux_mut(&mut spec);
        linux.namespaces.push(LinuxNamespace {
            typ: "pid".to_string(),
            path: "proc/1/ns/pid".to_string(),
        });
        linux.namespaces.push(LinuxNamespace {
            typ: "net".to_string(),
            path: String::new(),
        });
        linux.namespaces.retain(|n| n.typ != "uts");

        assert_eq!(
            codes(&spec),
            vec![
                Code::NsTypeDuplicate,
                Code::NsPathAbs,
                Code::NsTypeInvalid,
                Code::HostnameWithoutUtsNs,
            ]
        );
    }

    #[test]
    fn test_id_mappings() {
        let mut spec = Generator::new().into_spec();
        let mapping = LinuxIdMapping {
            host_id: 1000,
            container_id: 0,
            size: 1,
        };
        linux_mut(&mut spec).uid_mappings = vec![mapping; 6];
        assert_eq!(
            codes(&spec),
            vec![Code::IdMappingsTooMany, Code::IdMappingsWithoutUserNs]
        );

        let linux = linux_mut(&mut spec);
        linux.uid_mappings.truncate(1);
        linux.namespaces.push(LinuxNamespace {
            typ: "user".to_string(),
            path: String::new(),
        });
        assert!(codes(&spec).is_empty());
    }

    #[test]
    fn test_sysctl_namespaces() {
        let mut spec = Generator::new().into_spec();
        let linux = linux_mut(&mut spec);
        linux
            .sysctl
            .insert("net.ipv4.ip_forward".to_string(), "1".to_string());
        linux.sysctl.insert("kernel.shmmax".to_string(), "1".to_string());
        linux
            .sysctl
            .insert("vm.overcommit_memory".to_string(), "1".to_string());
        assert!(codes(&spec).is_empty());

        linux_mut(&mut spec)
            .namespaces
            .retain(|n| n.typ != "network" && n.typ != "ipc");
        assert_eq!(
            codes(&spec),
            vec![Code::SysctlWithoutNs, Code::SysctlWithoutNs]
        );
    }

    #[test]
    fn test_devices_and_paths() {
        let mut spec = Generator::new().into_spec();
        let linux = linux_mut(&mut spec);
        linux.rootfs_propagation = "everywhere".to_string();
        linux.devices = vec![
            LinuxDevice {
                path: "/dev/null".to_string(),
                typ: "c".to_string(),
                major: 1,
                minor: 3,
                ..Default::default()
            },
            LinuxDevice {
                path: "/dev/null".to_string(),
                typ: "p".to_string(),
                major: 1,
                minor: 0,
                ..Default::default()
            },
            LinuxDevice {
                path: "dev/x".to_string(),
                typ: "z".to_string(),
                ..Default::default()
            },
        ];
        linux.masked_paths.push("proc/kcore".to_string());
        linux
            .resources
            .get_or_insert_with(Default::default)
            .devices
            .push(LinuxDeviceCgroup {
                allow: true,
                typ: "u".to_string(),
                access: "rwx".to_string(),
                ..Default::default()
            });

        assert_eq!(
            codes(&spec),
            vec![
                Code::RootfsPropagationInvalid,
                Code::DeviceNumbersInvalid,
                Code::DevicePathDuplicate,
                Code::DeviceTypeInvalid,
                Code::DevicePathAbs,
                Code::DeviceCgroupTypeInvalid,
                Code::DeviceCgroupAccessInvalid,
                Code::MaskedPathAbs,
            ]
        );
    }

    #[test]
    fn test_seccomp() {
        let mut g = Generator::new();
        g.set_seccomp_default("errno").unwrap();
        g.add_seccomp_arch("amd64").unwrap();
        g.add_seccomp_syscalls("allow:read:0:1:0:EQ").unwrap();
        let mut spec = g.into_spec();
        assert!(codes(&spec).is_empty());

        let seccomp = linux_mut(&mut spec).seccomp.as_mut().unwrap();
        seccomp.default_action = "SCMP_ACT_NOPE".to_string();
        seccomp.architectures.push("SCMP_ARCH_X86_64".to_string());
        seccomp.architectures.push("SCMP_ARCH_VAX".to_string());
        seccomp.syscalls.push(LinuxSyscall {
            names: vec!["write".to_string()],
            action: "SCMP_ACT_MAYBE".to_string(),
            args: vec![LinuxSeccompArg {
                index: 0,
                value: 1,
                value_two: 0,
                op: "SCMP_CMP_ALMOST".to_string(),
            }],
        });

        assert_eq!(
            codes(&spec),
            vec![
                Code::SeccompDefaultActionInvalid,
                Code::SeccompArchDuplicate,
                Code::SeccompArchInvalid,
                Code::SeccompActionInvalid,
                Code::SeccompOperatorInvalid,
            ]
        );
    }
}
