//! 进程检查

use runtime_spec::RLIMIT_TYPES;
use specgen::capabilities;

use super::{Validator, is_env_pair};
use crate::specerror::{Code, Violations};

impl Validator {
    pub(super) fn check_process(&self, out: &mut Violations) {
        debug!(sl!(), "check process");
        let process = &self.spec.process;

        if !process.cwd.is_empty() && !process.cwd.starts_with('/') {
            self.report(
                out,
                Code::ProcCwdAbs,
                "process.cwd",
                format!("cwd {:?} is not an absolute path", process.cwd),
            );
        }

        for (i, env) in process.env.iter().enumerate() {
            if !is_env_pair(env) {
                self.report(
                    out,
                    Code::ProcEnvInvalid,
                    format!("process.env[{}]", i),
                    format!("env {:?} is not in KEY=VALUE form", env),
                );
            }
        }

        self.check_capabilities(out);
        self.check_rlimits(out);

        let profile = &process.apparmor_profile;
        if !profile.is_empty() {
            let path = self.in_rootfs("/etc/apparmor.d").join(profile);
            if !path.exists() {
                self.report(
                    out,
                    Code::ProcApparmorProfileNotExist,
                    "process.apparmorProfile",
                    format!("apparmor profile {} does not exist", path.display()),
                );
            }
        }
    }

    fn check_capabilities(&self, out: &mut Violations) {
        let caps = &self.spec.process.capabilities;
        let host = if self.host_specific {
            capabilities::host_supported()
        } else {
            Vec::new()
        };

        for (i, cap) in caps.iter().enumerate() {
            let subject = format!("process.capabilities[{}]", i);

            if let Err(e) = capabilities::validate(cap, false) {
                self.report(out, Code::ProcCapInvalid, subject, e.to_string());
                continue;
            }

            if caps[..i].contains(cap) {
                self.report(
                    out,
                    Code::ProcCapDuplicate,
                    subject,
                    format!("capability {} is duplicated", cap),
                );
                continue;
            }

            if self.host_specific && !host.contains(cap) {
                self.report(
                    out,
                    Code::ProcCapNotSupported,
                    subject,
                    format!("capability {} is not supported on the current host", cap),
                );
            }
        }
    }

    fn check_rlimits(&self, out: &mut Violations) {
        let rlimits = &self.spec.process.rlimits;

        for (i, rlimit) in rlimits.iter().enumerate() {
            // 缺失的类型由必选字段检查报告
            if rlimit.typ.is_empty() {
                continue;
            }
            let subject = format!("process.rlimits[{}]", i);

            if !RLIMIT_TYPES.contains(&rlimit.typ.as_str()) {
                self.report(
                    out,
                    Code::ProcRlimitTypeInvalid,
                    subject.clone(),
                    format!("rlimit type {:?} is invalid", rlimit.typ),
                );
            } else if rlimits[..i].iter().any(|r| r.typ == rlimit.typ) {
                self.report(
                    out,
                    Code::ProcRlimitDuplicate,
                    subject.clone(),
                    format!("rlimit {} is duplicated", rlimit.typ),
                );
            }

            if rlimit.soft > rlimit.hard {
                self.report(
                    out,
                    Code::ProcRlimitSoftExceedsHard,
                    subject,
                    format!(
                        "{} soft limit {} exceeds hard limit {}",
                        rlimit.typ, rlimit.soft, rlimit.hard
                    ),
                );
            }
        }
    }
}
