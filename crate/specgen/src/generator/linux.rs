//! Linux 子树修改：namespace、ID 映射、sysctl、设备、挂载传播、屏蔽路径

use runtime_spec::{
    DeviceType, LinuxDevice, LinuxIdMapping, LinuxNamespace, NamespaceType, RootfsPropagation,
};

use super::Generator;
use crate::error::{Error, ParseError, Result};

/// 内核对 uid/gid 映射行数的限制
pub const MAX_ID_MAPPINGS: usize = 5;

/// 解析 `HOST:CONTAINER:SIZE` 形式的 ID 映射
pub fn parse_id_mapping(input: &str) -> std::result::Result<LinuxIdMapping, ParseError> {
    let parts: Vec<&str> = input.split(':').collect();
    if parts.len() != 3 {
        return Err(ParseError::malformed(
            "id mapping",
            input,
            "expected HOST:CONTAINER:SIZE",
        ));
    }

    let mut numbers = [0u32; 3];
    for (n, part) in numbers.iter_mut().zip(&parts) {
        *n = part.parse().map_err(|_| {
            ParseError::malformed("id mapping", input, format!("{:?} is not a number", part))
        })?;
    }

    Ok(LinuxIdMapping {
        host_id: numbers[0],
        container_id: numbers[1],
        size: numbers[2],
    })
}

/// 解析设备描述 `TYPE:MAJOR:MINOR:PATH[:fileMode=MODE][:uid=UID][:gid=GID]`
///
/// `fileMode` 为八进制。
pub fn parse_device(input: &str) -> std::result::Result<LinuxDevice, ParseError> {
    let parts: Vec<&str> = input.split(':').collect();
    if parts.len() < 4 {
        return Err(ParseError::malformed(
            "device",
            input,
            "expected TYPE:MAJOR:MINOR:PATH",
        ));
    }

    let number = |s: &str| -> std::result::Result<i64, ParseError> {
        s.parse()
            .map_err(|_| ParseError::malformed("device", input, format!("{:?} is not a number", s)))
    };

    let mut device = LinuxDevice {
        typ: parts[0].to_string(),
        major: number(parts[1])?,
        minor: number(parts[2])?,
        path: parts[3].to_string(),
        ..Default::default()
    };

    for opt in &parts[4..] {
        let (key, value) = opt.split_once('=').ok_or_else(|| {
            ParseError::malformed("device", input, format!("option {:?} is not KEY=VALUE", opt))
        })?;
        let bad = |_| ParseError::malformed("device", input, format!("bad {} {:?}", key, value));
        match key {
            "fileMode" => device.file_mode = Some(u32::from_str_radix(value, 8).map_err(bad)?),
            "uid" => device.uid = Some(value.parse().map_err(bad)?),
            "gid" => device.gid = Some(value.parse().map_err(bad)?),
            _ => return Err(ParseError::unrecognized("device option", key)),
        }
    }

    Ok(device)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdMappingKind {
    Uid,
    Gid,
}

impl Generator {
    // ========================================================================
    // namespace
    // ========================================================================

    /// 添加 namespace，同类型已存在时替换其路径
    ///
    /// 类型名称接受 `net`、`mnt` 简写，`path` 为空表示创建新的 namespace。
    pub fn add_or_replace_linux_namespace(&mut self, typ: &str, path: &str) -> Result<()> {
        let typ = NamespaceType::parse_name(typ).map_err(|e| self.reject(e))?;
        let ns = LinuxNamespace {
            typ: typ.as_str().to_string(),
            path: path.to_string(),
        };

        let namespaces = &mut self.linux_mut().namespaces;
        match namespaces.iter_mut().find(|n| n.typ == ns.typ) {
            Some(existing) => *existing = ns,
            None => namespaces.push(ns),
        }
        Ok(())
    }

    pub fn remove_linux_namespace(&mut self, typ: &str) -> Result<()> {
        let typ = NamespaceType::parse_name(typ).map_err(|e| self.reject(e))?;
        if let Some(linux) = self.spec.linux.as_mut() {
            linux.namespaces.retain(|n| n.typ != typ.as_str());
        }
        Ok(())
    }

    pub fn clear_linux_namespaces(&mut self) {
        if let Some(linux) = self.spec.linux.as_mut() {
            linux.namespaces.clear();
        }
    }

    // ========================================================================
    // ID 映射
    // ========================================================================

    pub fn add_linux_id_mapping(
        &mut self,
        kind: IdMappingKind,
        mapping: LinuxIdMapping,
    ) -> Result<()> {
        let current = self.spec.linux.as_ref().map_or(0, |l| match kind {
            IdMappingKind::Uid => l.uid_mappings.len(),
            IdMappingKind::Gid => l.gid_mappings.len(),
        });
        if current >= MAX_ID_MAPPINGS {
            return Err(self.reject(Error::invalid_state(format!(
                "{:?} mappings are limited to {}",
                kind, MAX_ID_MAPPINGS
            ))));
        }

        let linux = self.linux_mut();
        match kind {
            IdMappingKind::Uid => linux.uid_mappings.push(mapping),
            IdMappingKind::Gid => linux.gid_mappings.push(mapping),
        }
        Ok(())
    }

    /// 解析 `HOST:CONTAINER:SIZE` 并追加 uid 映射
    pub fn add_linux_uid_mapping(&mut self, input: &str) -> Result<()> {
        let mapping = parse_id_mapping(input).map_err(|e| self.reject(e))?;
        self.add_linux_id_mapping(IdMappingKind::Uid, mapping)
    }

    pub fn add_linux_gid_mapping(&mut self, input: &str) -> Result<()> {
        let mapping = parse_id_mapping(input).map_err(|e| self.reject(e))?;
        self.add_linux_id_mapping(IdMappingKind::Gid, mapping)
    }

    pub fn clear_linux_uid_mappings(&mut self) {
        if let Some(linux) = self.spec.linux.as_mut() {
            linux.uid_mappings.clear();
        }
    }

    pub fn clear_linux_gid_mappings(&mut self) {
        if let Some(linux) = self.spec.linux.as_mut() {
            linux.gid_mappings.clear();
        }
    }

    // ========================================================================
    // sysctl
    // ========================================================================

    pub fn add_linux_sysctl(&mut self, key: &str, value: &str) -> Result<()> {
        if key.is_empty() {
            return Err(self.reject(ParseError::malformed("sysctl", value, "empty key")));
        }
        self.linux_mut()
            .sysctl
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    pub fn remove_linux_sysctl(&mut self, key: &str) {
        if let Some(linux) = self.spec.linux.as_mut() {
            linux.sysctl.remove(key);
        }
    }

    pub fn clear_linux_sysctl(&mut self) {
        if let Some(linux) = self.spec.linux.as_mut() {
            linux.sysctl.clear();
        }
    }

    // ========================================================================
    // 设备
    // ========================================================================

    /// 添加设备，同路径已存在时替换
    pub fn add_linux_device(&mut self, device: LinuxDevice) -> Result<()> {
        let typ: DeviceType = device.typ.parse().map_err(|e| self.reject(e))?;
        if !typ.numbers_valid(device.major, device.minor) {
            return Err(self.reject(Error::invalid_state(format!(
                "device {} of type {} has invalid numbers {}:{}",
                device.path, typ, device.major, device.minor
            ))));
        }
        if !device.path.starts_with('/') {
            return Err(self.reject(Error::invalid_state(format!(
                "device path {:?} is not absolute",
                device.path
            ))));
        }

        let devices = &mut self.linux_mut().devices;
        match devices.iter_mut().find(|d| d.path == device.path) {
            Some(existing) => *existing = device,
            None => devices.push(device),
        }
        Ok(())
    }

    pub fn remove_linux_device(&mut self, path: &str) {
        if let Some(linux) = self.spec.linux.as_mut() {
            linux.devices.retain(|d| d.path != path);
        }
    }

    pub fn clear_linux_devices(&mut self) {
        if let Some(linux) = self.spec.linux.as_mut() {
            linux.devices.clear();
        }
    }

    // ========================================================================
    // 其他
    // ========================================================================

    pub fn set_linux_rootfs_propagation(&mut self, propagation: &str) -> Result<()> {
        let propagation: RootfsPropagation = propagation
            .parse()
            .map_err(|e: runtime_spec::UnknownValue| {
                self.reject(Error::invalid_state(e.to_string()))
            })?;
        self.linux_mut().rootfs_propagation = propagation.as_str().to_string();
        Ok(())
    }

    pub fn set_linux_cgroups_path(&mut self, path: &str) {
        self.linux_mut().cgroups_path = Some(path.to_string());
    }

    pub fn set_linux_mount_label(&mut self, label: &str) {
        self.linux_mut().mount_label = label.to_string();
    }

    pub fn add_linux_masked_path(&mut self, path: &str) -> Result<()> {
        self.check_absolute("masked path", path)?;
        let paths = &mut self.linux_mut().masked_paths;
        if !paths.iter().any(|p| p == path) {
            paths.push(path.to_string());
        }
        Ok(())
    }

    pub fn clear_linux_masked_paths(&mut self) {
        if let Some(linux) = self.spec.linux.as_mut() {
            linux.masked_paths.clear();
        }
    }

    pub fn add_linux_readonly_path(&mut self, path: &str) -> Result<()> {
        self.check_absolute("readonly path", path)?;
        let paths = &mut self.linux_mut().readonly_paths;
        if !paths.iter().any(|p| p == path) {
            paths.push(path.to_string());
        }
        Ok(())
    }

    pub fn clear_linux_readonly_paths(&mut self) {
        if let Some(linux) = self.spec.linux.as_mut() {
            linux.readonly_paths.clear();
        }
    }

    pub(super) fn check_absolute(&self, kind: &'static str, path: &str) -> Result<()> {
        if path.starts_with('/') {
            Ok(())
        } else {
            Err(self.reject(ParseError::malformed(kind, path, "must be an absolute path")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use runtime_spec::Linux;

    fn namespaces(g: &Generator) -> Vec<(String, String)> {
        g.spec()
            .linux
            .as_ref()
            .map(|l| {
                l.namespaces
                    .iter()
                    .map(|n| (n.typ.clone(), n.path.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    #[test]
    fn test_namespace_add_or_replace() {
        let mut spec = runtime_spec::Spec::default();
        spec.linux = Some(Linux {
            namespaces: vec![
                LinuxNamespace {
                    typ: "pid".into(),
                    path: String::new(),
                },
                LinuxNamespace {
                    typ: "network".into(),
                    path: String::new(),
                },
            ],
            ..Default::default()
        });
        let mut g = Generator::from_spec(spec);

        g.add_or_replace_linux_namespace("network", "/proc/1234/ns/net")
            .unwrap();
        assert_eq!(
            namespaces(&g),
            vec![
                ("pid".to_string(), String::new()),
                ("network".to_string(), "/proc/1234/ns/net".to_string()),
            ]
        );

        let json = g.to_json(Default::default()).unwrap();
        assert!(json.contains("\"path\": \"/proc/1234/ns/net\""));
    }

    #[test]
    fn test_namespace_aliases_and_remove() {
        let mut g = Generator::empty();
        g.add_or_replace_linux_namespace("net", "").unwrap();
        g.add_or_replace_linux_namespace("mnt", "").unwrap();
        g.add_or_replace_linux_namespace("network", "/proc/1/ns/net").unwrap();
        assert_eq!(namespaces(&g).len(), 2);
        assert_eq!(namespaces(&g)[0].0, "network");
        assert_eq!(namespaces(&g)[1].0, "mount");

        let err = g.add_or_replace_linux_namespace("time", "").unwrap_err();
        assert!(err.is_parse());

        g.remove_linux_namespace("net").unwrap();
        g.remove_linux_namespace("net").unwrap();
        assert_eq!(namespaces(&g), vec![("mount".to_string(), String::new())]);
        g.clear_linux_namespaces();
        assert!(namespaces(&g).is_empty());
    }

    #[test]
    fn test_id_mappings() {
        assert_eq!(
            parse_id_mapping("0:1000:65536").unwrap(),
            LinuxIdMapping {
                host_id: 0,
                container_id: 1000,
                size: 65536
            }
        );
        assert!(parse_id_mapping("0:1000").is_err());
        assert!(parse_id_mapping("0:x:1").is_err());

        let mut g = Generator::empty();
        for i in 0..MAX_ID_MAPPINGS {
            g.add_linux_uid_mapping(&format!("{}:{}:1", i, i)).unwrap();
        }
        let err = g.add_linux_uid_mapping("9:9:1").unwrap_err();
        assert!(err.is_invalid_state());
        assert_eq!(g.spec().linux.as_ref().unwrap().uid_mappings.len(), 5);

        g.add_linux_gid_mapping("0:0:1").unwrap();
        assert!(g.add_linux_gid_mapping("bad").unwrap_err().is_parse());
        assert_eq!(g.spec().linux.as_ref().unwrap().gid_mappings.len(), 1);

        g.clear_linux_uid_mappings();
        g.clear_linux_gid_mappings();
        assert!(g.spec().linux.as_ref().unwrap().uid_mappings.is_empty());
    }

    #[test]
    fn test_devices() {
        let dev = parse_device("c:1:3:/dev/null:fileMode=666:uid=0:gid=0").unwrap();
        assert_eq!(dev.typ, "c");
        assert_eq!(dev.file_mode, Some(0o666));
        assert_eq!(dev.uid, Some(0));
        assert!(parse_device("c:1:3").is_err());
        assert!(parse_device("c:1:3:/dev/x:color=red").is_err());
        assert!(parse_device("c:a:3:/dev/x").is_err());

        let mut g = Generator::empty();
        g.add_linux_device(dev.clone()).unwrap();
        g.add_linux_device(parse_device("p:0:0:/dev/fifo").unwrap()).unwrap();
        g.add_linux_device(parse_device("c:1:5:/dev/null").unwrap()).unwrap();

        let devices = &g.spec().linux.as_ref().unwrap().devices;
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].minor, 5);

        assert!(g.add_linux_device(parse_device("x:1:1:/dev/x").unwrap()).unwrap_err().is_parse());
        assert!(g.add_linux_device(parse_device("b:0:0:/dev/sda").unwrap()).is_err());
        assert!(g.add_linux_device(parse_device("p:1:0:/dev/p").unwrap()).is_err());
        assert!(g.add_linux_device(parse_device("c:1:1:dev/x").unwrap()).is_err());

        g.remove_linux_device("/dev/fifo");
        assert_eq!(g.spec().linux.as_ref().unwrap().devices.len(), 1);
        g.clear_linux_devices();
        assert!(g.spec().linux.as_ref().unwrap().devices.is_empty());
    }

    #[test]
    fn test_propagation_and_paths() {
        let mut g = Generator::empty();
        assert!(g.set_linux_rootfs_propagation("bogus").unwrap_err().is_invalid_state());
        assert!(g.spec().linux.is_none());

        g.set_linux_rootfs_propagation("rslave").unwrap();
        assert_eq!(g.spec().linux.as_ref().unwrap().rootfs_propagation, "rslave");

        g.add_linux_masked_path("/proc/kcore").unwrap();
        g.add_linux_masked_path("/proc/kcore").unwrap();
        assert!(g.add_linux_readonly_path("proc/sys").is_err());
        g.add_linux_readonly_path("/proc/sys").unwrap();
        g.set_linux_cgroups_path("/runcell/box");
        g.set_linux_mount_label("system_u:object_r:svirt_sandbox_file_t:s0");
        g.add_linux_sysctl("net.ipv4.ip_forward", "1").unwrap();
        assert!(g.add_linux_sysctl("", "1").is_err());

        let linux = g.spec().linux.as_ref().unwrap();
        assert_eq!(linux.masked_paths, vec!["/proc/kcore"]);
        assert_eq!(linux.readonly_paths, vec!["/proc/sys"]);
        assert_eq!(linux.cgroups_path.as_deref(), Some("/runcell/box"));
        assert_eq!(linux.sysctl["net.ipv4.ip_forward"], "1");

        g.remove_linux_sysctl("net.ipv4.ip_forward");
        g.clear_linux_masked_paths();
        g.clear_linux_readonly_paths();
        g.clear_linux_sysctl();
        let linux = g.spec().linux.as_ref().unwrap();
        assert!(linux.sysctl.is_empty());
        assert!(linux.masked_paths.is_empty());
    }

    proptest! {
        #[test]
        fn prop_namespace_types_unique(
            ops in prop::collection::vec(
                (prop::sample::select(vec!["pid", "network", "net", "mount", "mnt", "ipc", "uts", "user", "cgroup"]),
                 "(/proc/[0-9]{1,4}/ns/x)?",
                 any::<bool>()),
                0..30,
            )
        ) {
            let mut g = Generator::new();
            for (typ, path, remove) in ops {
                if remove {
                    g.remove_linux_namespace(typ).unwrap();
                } else {
                    g.add_or_replace_linux_namespace(typ, &path).unwrap();
                }
            }

            let types: Vec<String> = namespaces(&g).into_iter().map(|(t, _)| t).collect();
            for (i, t) in types.iter().enumerate() {
                prop_assert!(!types[i + 1..].contains(t));
            }
        }
    }
}
