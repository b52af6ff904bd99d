//! 挂载项

use runtime_spec::Mount;

use super::Generator;
use crate::error::{ParseError, Result};

pub const DEFAULT_TMPFS_OPTIONS: [&str; 5] = ["rw", "noexec", "nosuid", "nodev", "size=65536k"];

fn split_options(options: &str) -> Vec<String> {
    options
        .split(',')
        .filter(|o| !o.is_empty())
        .map(|o| o.to_string())
        .collect()
}

/// 解析 `DEST[:OPTIONS]`，未给出选项时使用默认 tmpfs 选项
pub fn parse_tmpfs(input: &str) -> std::result::Result<Mount, ParseError> {
    let (dest, options) = match input.split_once(':') {
        Some((dest, options)) => (dest, split_options(options)),
        None => (
            input,
            DEFAULT_TMPFS_OPTIONS.iter().map(|o| o.to_string()).collect(),
        ),
    };
    if dest.is_empty() {
        return Err(ParseError::malformed("tmpfs mount", input, "empty destination"));
    }

    Ok(Mount {
        destination: dest.to_string(),
        typ: "tmpfs".to_string(),
        source: "tmpfs".to_string(),
        options,
    })
}

/// 解析 `SOURCE:DEST[:OPTIONS]`，默认只读，总是带 `bind` 选项
pub fn parse_bind(input: &str) -> std::result::Result<Mount, ParseError> {
    let parts: Vec<&str> = input.splitn(3, ':').collect();
    if parts.len() < 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(ParseError::malformed(
            "bind mount",
            input,
            "expected SOURCE:DEST[:OPTIONS]",
        ));
    }

    let mut options = match parts.get(2) {
        Some(opts) => split_options(opts),
        None => vec!["ro".to_string()],
    };
    if !options.iter().any(|o| o == "bind" || o == "rbind") {
        options.push("bind".to_string());
    }

    Ok(Mount {
        destination: parts[1].to_string(),
        typ: "bind".to_string(),
        source: parts[0].to_string(),
        options,
    })
}

impl Generator {
    /// 追加挂载项，目标必须是绝对路径
    pub fn add_mount(&mut self, mount: Mount) -> Result<()> {
        self.check_absolute("mount destination", &mount.destination)?;
        self.spec.mounts.push(mount);
        Ok(())
    }

    pub fn add_tmpfs_mount(&mut self, input: &str) -> Result<()> {
        let mount = parse_tmpfs(input).map_err(|e| self.reject(e))?;
        self.add_mount(mount)
    }

    pub fn add_bind_mount(&mut self, input: &str) -> Result<()> {
        let mount = parse_bind(input).map_err(|e| self.reject(e))?;
        self.add_mount(mount)
    }

    /// 按策略挂载 cgroup 文件系统
    ///
    /// `ro`/`rw` 追加 `/sys/fs/cgroup` 挂载，`no` 不做任何修改。
    pub fn add_cgroup_mount(&mut self, policy: &str) -> Result<()> {
        match policy {
            "no" => Ok(()),
            "ro" | "rw" => self.add_mount(Mount {
                destination: "/sys/fs/cgroup".to_string(),
                typ: "cgroup".to_string(),
                source: "cgroup".to_string(),
                options: ["nosuid", "noexec", "nodev", "relatime", policy]
                    .iter()
                    .map(|o| o.to_string())
                    .collect(),
            }),
            _ => Err(self.reject(ParseError::unrecognized("cgroup mount policy", policy))),
        }
    }

    pub fn remove_mount(&mut self, destination: &str) {
        self.spec.mounts.retain(|m| m.destination != destination);
    }

    pub fn clear_mounts(&mut self) {
        self.spec.mounts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tmpfs() {
        let m = parse_tmpfs("/run").unwrap();
        assert_eq!(m.destination, "/run");
        assert_eq!(m.options, DEFAULT_TMPFS_OPTIONS.to_vec());

        let m = parse_tmpfs("/run:rw,size=1m").unwrap();
        assert_eq!(m.options, vec!["rw", "size=1m"]);
        assert!(parse_tmpfs(":rw").is_err());
    }

    #[test]
    fn test_parse_bind() {
        let m = parse_bind("/host/data:/data").unwrap();
        assert_eq!(m.source, "/host/data");
        assert_eq!(m.destination, "/data");
        assert_eq!(m.options, vec!["ro", "bind"]);

        let m = parse_bind("/host/data:/data:rw,rbind").unwrap();
        assert_eq!(m.options, vec!["rw", "rbind"]);

        let m = parse_bind("/host/data:/data:rw").unwrap();
        assert_eq!(m.options, vec!["rw", "bind"]);

        assert!(parse_bind("/host/data").is_err());
        assert!(parse_bind(":/data").is_err());
    }

    #[test]
    fn test_mount_order_and_policy() {
        let mut g = Generator::empty();
        g.add_tmpfs_mount("/run").unwrap();
        g.add_bind_mount("/src:/dst").unwrap();
        g.add_cgroup_mount("no").unwrap();
        g.add_cgroup_mount("ro").unwrap();
        assert!(g.add_cgroup_mount("maybe").unwrap_err().is_parse());
        assert!(g.add_tmpfs_mount("relative").is_err());

        let dests: Vec<&str> = g
            .spec()
            .mounts
            .iter()
            .map(|m| m.destination.as_str())
            .collect();
        assert_eq!(dests, vec!["/run", "/dst", "/sys/fs/cgroup"]);
        assert_eq!(g.spec().mounts[2].options.last().unwrap(), "ro");

        g.remove_mount("/dst");
        assert_eq!(g.spec().mounts.len(), 2);
        g.clear_mounts();
        assert!(g.spec().mounts.is_empty());
    }
}
