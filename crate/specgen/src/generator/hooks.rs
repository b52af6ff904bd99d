//! 生命周期钩子

use std::str::FromStr;

use runtime_spec::{Hook, Hooks};

use super::Generator;
use crate::error::{Error, ParseError, Result};

/// 钩子执行阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStage {
    Prestart,
    Poststart,
    Poststop,
}

impl FromStr for HookStage {
    type Err = ParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "prestart" => Ok(HookStage::Prestart),
            "poststart" => Ok(HookStage::Poststart),
            "poststop" => Ok(HookStage::Poststop),
            _ => Err(ParseError::unrecognized("hook stage", s)),
        }
    }
}

fn stage_list(hooks: &mut Hooks, stage: HookStage) -> &mut Vec<Hook> {
    match stage {
        HookStage::Prestart => &mut hooks.prestart,
        HookStage::Poststart => &mut hooks.poststart,
        HookStage::Poststop => &mut hooks.poststop,
    }
}

/// 解析 `PATH[:ARG1:ARG2...]`
pub fn parse_hook(input: &str) -> std::result::Result<Hook, ParseError> {
    let mut parts = input.split(':');
    let path = parts.next().unwrap_or_default();
    if path.is_empty() {
        return Err(ParseError::malformed("hook", input, "empty path"));
    }

    Ok(Hook {
        path: path.to_string(),
        args: parts.map(|a| a.to_string()).collect(),
        ..Default::default()
    })
}

impl Generator {
    pub fn add_hook(&mut self, stage: HookStage, hook: Hook) -> Result<()> {
        self.check_absolute("hook path", &hook.path)?;
        stage_list(self.hooks_mut(), stage).push(hook);
        Ok(())
    }

    /// 解析 `PATH[:ARGS...]` 并追加钩子
    pub fn add_hook_from_str(&mut self, stage: HookStage, input: &str) -> Result<()> {
        let hook = parse_hook(input).map_err(|e| self.reject(e))?;
        self.add_hook(stage, hook)
    }

    /// 为路径匹配的钩子添加环境变量，没有匹配时新建钩子
    pub fn add_hook_env(&mut self, stage: HookStage, path: &str, env: &str) -> Result<()> {
        self.check_absolute("hook path", path)?;
        let key = match env.split_once('=') {
            Some((key, _)) if !key.is_empty() => key,
            _ => {
                return Err(self.reject(ParseError::malformed(
                    "hook env",
                    env,
                    "expected KEY=VALUE",
                )));
            }
        };
        let prefix = format!("{}=", key);

        let list = stage_list(self.hooks_mut(), stage);
        match list.iter_mut().find(|h| h.path == path) {
            Some(hook) => match hook.env.iter_mut().find(|e| e.starts_with(&prefix)) {
                Some(existing) => *existing = env.to_string(),
                None => hook.env.push(env.to_string()),
            },
            None => list.push(Hook {
                path: path.to_string(),
                env: vec![env.to_string()],
                ..Default::default()
            }),
        }
        Ok(())
    }

    /// 为路径匹配的钩子设置超时，没有匹配时新建钩子
    pub fn add_hook_timeout(&mut self, stage: HookStage, path: &str, timeout: i32) -> Result<()> {
        self.check_absolute("hook path", path)?;
        if timeout <= 0 {
            return Err(self.reject(Error::invalid_state(format!(
                "hook timeout must be positive, got {}",
                timeout
            ))));
        }

        let list = stage_list(self.hooks_mut(), stage);
        match list.iter_mut().find(|h| h.path == path) {
            Some(hook) => hook.timeout = Some(timeout),
            None => list.push(Hook {
                path: path.to_string(),
                timeout: Some(timeout),
                ..Default::default()
            }),
        }
        Ok(())
    }

    pub fn clear_hooks(&mut self, stage: HookStage) {
        if let Some(hooks) = self.spec.hooks.as_mut() {
            stage_list(hooks, stage).clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hook() {
        let hook = parse_hook("/usr/bin/setup:--net:eth0").unwrap();
        assert_eq!(hook.path, "/usr/bin/setup");
        assert_eq!(hook.args, vec!["--net", "eth0"]);

        assert!(parse_hook("").is_err());
        assert!(parse_hook(":x").is_err());
        assert_eq!("poststop".parse::<HookStage>().unwrap(), HookStage::Poststop);
        assert!("prestop".parse::<HookStage>().is_err());
    }

    #[test]
    fn test_hooks() {
        let mut g = Generator::empty();
        g.add_hook_from_str(HookStage::Prestart, "/bin/a:x").unwrap();
        g.add_hook_from_str(HookStage::Prestart, "/bin/b").unwrap();
        assert!(g.add_hook_from_str(HookStage::Prestart, "bin/c").is_err());

        g.add_hook_env(HookStage::Prestart, "/bin/a", "K=1").unwrap();
        g.add_hook_env(HookStage::Prestart, "/bin/a", "K=2").unwrap();
        g.add_hook_env(HookStage::Poststart, "/bin/z", "K=1").unwrap();
        assert!(g.add_hook_env(HookStage::Prestart, "/bin/a", "=1").is_err());

        g.add_hook_timeout(HookStage::Prestart, "/bin/b", 5).unwrap();
        g.add_hook_timeout(HookStage::Poststop, "/bin/y", 3).unwrap();
        assert!(g
            .add_hook_timeout(HookStage::Prestart, "/bin/b", 0)
            .unwrap_err()
            .is_invalid_state());

        let hooks = g.spec().hooks.as_ref().unwrap();
        assert_eq!(hooks.prestart.len(), 2);
        assert_eq!(hooks.prestart[0].env, vec!["K=2"]);
        assert_eq!(hooks.prestart[1].timeout, Some(5));
        assert_eq!(hooks.poststart[0].path, "/bin/z");
        assert_eq!(hooks.poststop[0].timeout, Some(3));

        g.clear_hooks(HookStage::Prestart);
        let hooks = g.spec().hooks.as_ref().unwrap();
        assert!(hooks.prestart.is_empty());
        assert_eq!(hooks.poststart.len(), 1);
    }
}
