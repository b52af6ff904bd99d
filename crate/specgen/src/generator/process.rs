//! 进程相关修改

use runtime_spec::{ConsoleSize, PosixRlimit, RLIMIT_TYPES};

use super::Generator;
use crate::{
    capabilities,
    error::{Error, ParseError, Result},
};

macro_rules! sl {
    () => {
        slog_scope::logger().new(o!("subsystem" => "generator"))
    };
}

impl Generator {
    pub fn set_process_uid(&mut self, uid: u32) {
        self.spec.process.user.uid = uid;
    }

    pub fn set_process_gid(&mut self, gid: u32) {
        self.spec.process.user.gid = gid;
    }

    pub fn set_process_username(&mut self, username: &str) {
        self.spec.process.user.username = username.to_string();
    }

    /// 添加附加组，已存在时忽略
    pub fn add_process_additional_gid(&mut self, gid: u32) {
        let gids = &mut self.spec.process.user.additional_gids;
        if !gids.contains(&gid) {
            gids.push(gid);
        }
    }

    pub fn clear_process_additional_gids(&mut self) {
        self.spec.process.user.additional_gids.clear();
    }

    pub fn set_process_cwd(&mut self, cwd: &str) -> Result<()> {
        if !cwd.starts_with('/') {
            return Err(self.reject(Error::invalid_state(format!(
                "cwd {:?} is not an absolute path",
                cwd
            ))));
        }
        self.spec.process.cwd = cwd.to_string();
        Ok(())
    }

    /// 整体替换进程参数
    pub fn set_process_args(&mut self, args: Vec<String>) {
        self.spec.process.args = args;
    }

    pub fn set_process_terminal(&mut self, terminal: bool) {
        self.spec.process.terminal = terminal;
    }

    pub fn set_process_console_size(&mut self, height: u32, width: u32) {
        self.spec.process.console_size = Some(ConsoleSize { height, width });
    }

    pub fn set_process_no_new_privileges(&mut self, no_new_privileges: bool) {
        self.spec.process.no_new_privileges = no_new_privileges;
    }

    pub fn set_process_selinux_label(&mut self, label: &str) {
        self.spec.process.selinux_label = label.to_string();
    }

    pub fn set_process_apparmor_profile(&mut self, profile: &str) {
        self.spec.process.apparmor_profile = profile.to_string();
    }

    pub fn set_process_oom_score_adj(&mut self, adj: i32) -> Result<()> {
        if !(-1000..=1000).contains(&adj) {
            return Err(self.reject(Error::invalid_state(format!(
                "oomScoreAdj {} out of range [-1000, 1000]",
                adj
            ))));
        }
        self.spec.process.oom_score_adj = Some(adj);
        Ok(())
    }

    // ========================================================================
    // 环境变量
    // ========================================================================

    /// 设置环境变量
    ///
    /// 已存在同名变量时原位替换，保持首次出现的顺序；否则追加。
    pub fn add_process_env(&mut self, key: &str, value: &str) -> Result<()> {
        if key.is_empty() || key.contains('=') {
            return Err(self.reject(ParseError::malformed(
                "env",
                key,
                "key must be non-empty and must not contain '='",
            )));
        }

        let entry = format!("{}={}", key, value);
        let prefix = format!("{}=", key);
        let env = &mut self.spec.process.env;
        match env.iter_mut().find(|e| e.starts_with(&prefix)) {
            Some(existing) => *existing = entry,
            None => env.push(entry),
        }
        Ok(())
    }

    /// 解析 `KEY=VALUE` 并设置
    pub fn add_process_env_pair(&mut self, pair: &str) -> Result<()> {
        match pair.split_once('=') {
            Some((key, value)) => self.add_process_env(key, value),
            None => Err(self.reject(ParseError::malformed(
                "env",
                pair,
                "expected KEY=VALUE",
            ))),
        }
    }

    pub fn remove_process_env(&mut self, key: &str) {
        let prefix = format!("{}=", key);
        self.spec.process.env.retain(|e| !e.starts_with(&prefix));
    }

    pub fn clear_process_env(&mut self) {
        self.spec.process.env.clear();
    }

    // ========================================================================
    // 能力
    // ========================================================================

    /// 添加能力，名称大小写不敏感，可省略 `CAP_` 前缀
    pub fn add_process_capability(&mut self, name: &str) -> Result<()> {
        let cap = capabilities::normalize(name);
        capabilities::validate(&cap, self.host_specific).map_err(|e| self.reject(e))?;

        let caps = &mut self.spec.process.capabilities;
        if !caps.contains(&cap) {
            caps.push(cap);
        }
        Ok(())
    }

    pub fn drop_process_capability(&mut self, name: &str) -> Result<()> {
        let cap = capabilities::normalize(name);
        capabilities::validate(&cap, false).map_err(|e| self.reject(e))?;

        self.spec.process.capabilities.retain(|c| c != &cap);
        Ok(())
    }

    pub fn clear_process_capabilities(&mut self) {
        self.spec.process.capabilities.clear();
    }

    // ========================================================================
    // rlimit
    // ========================================================================

    /// 添加 rlimit，同类型已存在时替换
    pub fn add_process_rlimit(&mut self, typ: &str, hard: u64, soft: u64) -> Result<()> {
        if !RLIMIT_TYPES.contains(&typ) {
            return Err(self.reject(ParseError::unrecognized("rlimit", typ)));
        }
        if soft > hard {
            return Err(self.reject(Error::invalid_state(format!(
                "{} soft limit {} exceeds hard limit {}",
                typ, soft, hard
            ))));
        }

        let rlimit = PosixRlimit {
            typ: typ.to_string(),
            hard,
            soft,
        };
        let rlimits = &mut self.spec.process.rlimits;
        match rlimits.iter_mut().find(|r| r.typ == typ) {
            Some(existing) => *existing = rlimit,
            None => rlimits.push(rlimit),
        }
        Ok(())
    }

    pub fn remove_process_rlimit(&mut self, typ: &str) {
        self.spec.process.rlimits.retain(|r| r.typ != typ);
    }

    pub fn clear_process_rlimits(&mut self) {
        self.spec.process.rlimits.clear();
    }

    // ========================================================================
    // 特权模式
    // ========================================================================

    /// 授予全部能力，清除 selinux/apparmor 标签并移除 seccomp
    pub fn set_privileged(&mut self) {
        let caps = if self.host_specific {
            capabilities::host_supported()
        } else {
            capabilities::all().to_vec()
        };
        info!(sl!(), "set privileged"; "capabilities" => caps.len());

        self.spec.process.capabilities = caps;
        self.spec.process.selinux_label.clear();
        self.spec.process.apparmor_profile.clear();
        if let Some(linux) = self.spec.linux.as_mut() {
            linux.seccomp = None;
        }
    }
}
