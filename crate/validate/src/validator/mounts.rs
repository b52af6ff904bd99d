//! 挂载点与钩子检查

use runtime_spec::Hook;

use super::{Validator, is_env_pair};
use crate::specerror::{Code, Violations};

impl Validator {
    pub(super) fn check_mounts(&self, out: &mut Violations) {
        debug!(sl!(), "check mounts");

        for (i, mount) in self.spec.mounts.iter().enumerate() {
            let dest = &mount.destination;
            if dest.is_empty() {
                continue;
            }
            let subject = format!("mounts[{}].destination", i);

            if !dest.starts_with('/') {
                self.report(
                    out,
                    Code::MountDestinationAbs,
                    subject,
                    format!("mount destination {:?} is not absolute", dest),
                );
                continue;
            }

            let path = self.in_rootfs(dest);
            if !path.is_dir() {
                self.report(
                    out,
                    Code::MountDestinationNotExist,
                    subject,
                    format!("mount destination {} is not an existing directory", path.display()),
                );
            }
        }
    }

    pub(super) fn check_hooks(&self, out: &mut Violations) {
        let Some(hooks) = self.spec.hooks.as_ref() else {
            return;
        };
        debug!(sl!(), "check hooks");

        for (stage, list) in [
            ("prestart", &hooks.prestart),
            ("poststart", &hooks.poststart),
            ("poststop", &hooks.poststop),
        ] {
            for (i, hook) in list.iter().enumerate() {
                self.check_hook(out, &format!("hooks.{}[{}]", stage, i), hook);
            }
        }
    }

    fn check_hook(&self, out: &mut Violations, subject: &str, hook: &Hook) {
        if !hook.path.is_empty() && !hook.path.starts_with('/') {
            self.report(
                out,
                Code::HookPathAbs,
                format!("{}.path", subject),
                format!("hook path {:?} is not absolute", hook.path),
            );
        }

        for env in hook.env.iter().filter(|e| !is_env_pair(e)) {
            self.report(
                out,
                Code::HookEnvInvalid,
                format!("{}.env", subject),
                format!("hook env {:?} is not in KEY=VALUE form", env),
            );
        }

        if let Some(timeout) = hook.timeout {
            if timeout <= 0 {
                self.report(
                    out,
                    Code::HookTimeoutInvalid,
                    format!("{}.timeout", subject),
                    format!("hook timeout {} must be positive", timeout),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use runtime_spec::{Hooks, Mount};
    use specgen::Generator;

    use super::super::tests::{bundle_with, codes};
    use super::*;

    #[test]
    fn test_mount_destinations() {
        let mut spec = Generator::new().into_spec();
        spec.mounts.push(Mount {
            destination: "data".to_string(),
            ..Default::default()
        });
        assert_eq!(codes(&spec), vec![Code::MountDestinationAbs]);

        let spec = Generator::new().into_spec();
        let dir = bundle_with(&spec);
        fs::remove_dir_all(dir.path().join("rootfs/dev/mqueue")).unwrap();
        let vs = Validator::from_bundle(dir.path(), false)
            .unwrap()
            .validate()
            .unwrap();
        assert_eq!(vs.len(), 1);
        let v = vs.iter().next().unwrap();
        assert_eq!(v.code, Code::MountDestinationNotExist);
        assert_eq!(v.subject, "mounts[4].destination");
    }

    #[test]
    fn test_hooks() {
        let mut spec = Generator::new().into_spec();
        spec.hooks = Some(Hooks {
            prestart: vec![Hook {
                path: "bin/setup".to_string(),
                env: vec!["=x".to_string()],
                ..Default::default()
            }],
            poststop: vec![Hook {
                path: "/bin/cleanup".to_string(),
                timeout: Some(0),
                ..Default::default()
            }],
            ..Default::default()
        });
        assert_eq!(
            codes(&spec),
            vec![Code::HookPathAbs, Code::HookEnvInvalid, Code::HookTimeoutInvalid]
        );
    }
}
