//! # Schema 遍历
//!
//! 每个配置节点通过 [`Schema::fields`] 声明自己的字段：字段名（JSON 名称）、
//! 必选/可选属性以及字段值的形状。[`walk`] 按深度优先顺序遍历整棵树，
//! 对每个字段调用 [`Visitor::visit`]。
//!
//! 必选/可选是 schema 的属性，与运行时取值无关。
//!
//! ```text
//! Spec ─┬─ ociVersion      (Str, required)
//!       ├─ process         (Struct, required) ─┬─ args (Seq, required)
//!       │                                      └─ env  (Seq, optional)
//!       └─ linux           (Ptr, optional) ─ ...
//! ```

use crate::*;

/// 字段的必选属性
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Required,
    Optional,
}

/// 字段值的形状
pub enum Node<'a> {
    /// 数值和布尔值，不参与非空检查
    Scalar,
    Str(&'a str),
    /// 序列；`items` 为需要递归检查的元素
    Seq {
        len: usize,
        items: Vec<&'a dyn Schema>,
    },
    Map(usize),
    /// 可选拥有的子树（`Option<T>`）
    Ptr(Option<&'a dyn Schema>),
    /// 内嵌的子树
    Struct(&'a dyn Schema),
}

impl<'a> Node<'a> {
    /// 由字符串等非聚合元素组成的序列
    pub fn values<T>(v: &'a [T]) -> Self {
        Node::Seq {
            len: v.len(),
            items: Vec::new(),
        }
    }

    /// 由聚合元素组成的序列
    pub fn nodes<T: Schema>(v: &'a [T]) -> Self {
        Node::Seq {
            len: v.len(),
            items: v.iter().map(|item| item as &dyn Schema).collect(),
        }
    }

    pub fn ptr<T: Schema>(v: &'a Option<T>) -> Self {
        Node::Ptr(v.as_ref().map(|item| item as &dyn Schema))
    }

    /// 值是否为“零值”：空字符串、空序列、空映射或缺失的子树
    pub fn is_empty(&self) -> bool {
        match self {
            Node::Scalar | Node::Struct(_) => false,
            Node::Str(s) => s.is_empty(),
            Node::Seq { len, .. } => *len == 0,
            Node::Map(len) => *len == 0,
            Node::Ptr(p) => p.is_none(),
        }
    }
}

/// 字段描述
pub struct Field<'a> {
    pub name: &'static str,
    pub presence: Presence,
    pub node: Node<'a>,
}

impl<'a> Field<'a> {
    pub fn required(name: &'static str, node: Node<'a>) -> Self {
        Field {
            name,
            presence: Presence::Required,
            node,
        }
    }

    pub fn optional(name: &'static str, node: Node<'a>) -> Self {
        Field {
            name,
            presence: Presence::Optional,
            node,
        }
    }
}

/// 可被遍历的配置节点
pub trait Schema {
    fn fields(&self) -> Vec<Field<'_>>;
}

/// 遍历回调
pub trait Visitor {
    /// `path` 为字段的 JSON 路径，例如 `process.args`、`mounts[2].destination`
    fn visit(&mut self, path: &str, field: &Field<'_>);
}

/// 深度优先遍历 `root` 下的全部字段
pub fn walk(root: &dyn Schema, path: &str, visitor: &mut dyn Visitor) {
    for field in root.fields() {
        let field_path = if path.is_empty() {
            field.name.to_string()
        } else {
            format!("{}.{}", path, field.name)
        };
        visitor.visit(&field_path, &field);

        match &field.node {
            Node::Struct(child) | Node::Ptr(Some(child)) => walk(*child, &field_path, visitor),
            Node::Seq { items, .. } => {
                for (i, item) in items.iter().enumerate() {
                    walk(*item, &format!("{}[{}]", field_path, i), visitor);
                }
            }
            _ => {}
        }
    }
}

// ============================================================================
// 各节点的字段声明
// ============================================================================

use Node::{Map, Scalar, Str, Struct};

impl Schema for Spec {
    fn fields(&self) -> Vec<Field<'_>> {
        vec![
            Field::required("ociVersion", Str(&self.version)),
            Field::required("platform", Struct(&self.platform)),
            Field::required("process", Struct(&self.process)),
            Field::required("root", Struct(&self.root)),
            Field::optional("hostname", Str(&self.hostname)),
            Field::optional("mounts", Node::nodes(&self.mounts)),
            Field::optional("hooks", Node::ptr(&self.hooks)),
            Field::optional("annotations", Map(self.annotations.len())),
            Field::optional("linux", Node::ptr(&self.linux)),
        ]
    }
}

impl Schema for Platform {
    fn fields(&self) -> Vec<Field<'_>> {
        vec![
            Field::required("os", Str(&self.os)),
            Field::required("arch", Str(&self.arch)),
        ]
    }
}

impl Schema for Process {
    fn fields(&self) -> Vec<Field<'_>> {
        vec![
            Field::optional("terminal", Scalar),
            Field::optional("consoleSize", Node::ptr(&self.console_size)),
            Field::required("user", Struct(&self.user)),
            Field::required("args", Node::values(&self.args)),
            Field::optional("env", Node::values(&self.env)),
            Field::required("cwd", Str(&self.cwd)),
            Field::optional("capabilities", Node::values(&self.capabilities)),
            Field::optional("rlimits", Node::nodes(&self.rlimits)),
            Field::optional("noNewPrivileges", Scalar),
            Field::optional("apparmorProfile", Str(&self.apparmor_profile)),
            Field::optional("oomScoreAdj", Scalar),
            Field::optional("selinuxLabel", Str(&self.selinux_label)),
        ]
    }
}

impl Schema for ConsoleSize {
    fn fields(&self) -> Vec<Field<'_>> {
        vec![
            Field::required("height", Scalar),
            Field::required("width", Scalar),
        ]
    }
}

impl Schema for User {
    fn fields(&self) -> Vec<Field<'_>> {
        vec![
            Field::required("uid", Scalar),
            Field::required("gid", Scalar),
            Field::optional("additionalGids", Node::values(&self.additional_gids)),
            Field::optional("username", Str(&self.username)),
        ]
    }
}

impl Schema for PosixRlimit {
    fn fields(&self) -> Vec<Field<'_>> {
        vec![
            Field::required("type", Str(&self.typ)),
            Field::required("hard", Scalar),
            Field::required("soft", Scalar),
        ]
    }
}

impl Schema for Root {
    fn fields(&self) -> Vec<Field<'_>> {
        vec![
            Field::required("path", Str(&self.path)),
            Field::optional("readonly", Scalar),
        ]
    }
}

impl Schema for Mount {
    fn fields(&self) -> Vec<Field<'_>> {
        vec![
            Field::required("destination", Str(&self.destination)),
            Field::optional("type", Str(&self.typ)),
            Field::optional("source", Str(&self.source)),
            Field::optional("options", Node::values(&self.options)),
        ]
    }
}

impl Schema for Hooks {
    fn fields(&self) -> Vec<Field<'_>> {
        vec![
            Field::optional("prestart", Node::nodes(&self.prestart)),
            Field::optional("poststart", Node::nodes(&self.poststart)),
            Field::optional("poststop", Node::nodes(&self.poststop)),
        ]
    }
}

impl Schema for Hook {
    fn fields(&self) -> Vec<Field<'_>> {
        vec![
            Field::required("path", Str(&self.path)),
            Field::optional("args", Node::values(&self.args)),
            Field::optional("env", Node::values(&self.env)),
            Field::optional("timeout", Scalar),
        ]
    }
}

impl Schema for Linux {
    fn fields(&self) -> Vec<Field<'_>> {
        vec![
            Field::optional("uidMappings", Node::nodes(&self.uid_mappings)),
            Field::optional("gidMappings", Node::nodes(&self.gid_mappings)),
            Field::optional("sysctl", Map(self.sysctl.len())),
            Field::optional("resources", Node::ptr(&self.resources)),
            Field::optional("cgroupsPath", Scalar),
            Field::optional("namespaces", Node::nodes(&self.namespaces)),
            Field::optional("devices", Node::nodes(&self.devices)),
            Field::optional("seccomp", Node::ptr(&self.seccomp)),
            Field::optional("rootfsPropagation", Str(&self.rootfs_propagation)),
            Field::optional("maskedPaths", Node::values(&self.masked_paths)),
            Field::optional("readonlyPaths", Node::values(&self.readonly_paths)),
            Field::optional("mountLabel", Str(&self.mount_label)),
        ]
    }
}

impl Schema for LinuxIdMapping {
    fn fields(&self) -> Vec<Field<'_>> {
        vec![
            Field::required("hostID", Scalar),
            Field::required("containerID", Scalar),
            Field::required("size", Scalar),
        ]
    }
}

impl Schema for LinuxNamespace {
    fn fields(&self) -> Vec<Field<'_>> {
        vec![
            Field::required("type", Str(&self.typ)),
            Field::optional("path", Str(&self.path)),
        ]
    }
}

impl Schema for LinuxDevice {
    fn fields(&self) -> Vec<Field<'_>> {
        vec![
            Field::required("path", Str(&self.path)),
            Field::required("type", Str(&self.typ)),
            Field::required("major", Scalar),
            Field::required("minor", Scalar),
            Field::optional("fileMode", Scalar),
            Field::optional("uid", Scalar),
            Field::optional("gid", Scalar),
        ]
    }
}

impl Schema for LinuxResources {
    fn fields(&self) -> Vec<Field<'_>> {
        vec![
            Field::optional("devices", Node::nodes(&self.devices)),
            Field::optional("memory", Node::ptr(&self.memory)),
            Field::optional("cpu", Node::ptr(&self.cpu)),
            Field::optional("pids", Node::ptr(&self.pids)),
            Field::optional("blockIO", Node::ptr(&self.block_io)),
            Field::optional("hugepageLimits", Node::nodes(&self.hugepage_limits)),
            Field::optional("network", Node::ptr(&self.network)),
        ]
    }
}

impl Schema for LinuxDeviceCgroup {
    fn fields(&self) -> Vec<Field<'_>> {
        vec![
            Field::required("allow", Scalar),
            Field::optional("type", Str(&self.typ)),
            Field::optional("major", Scalar),
            Field::optional("minor", Scalar),
            Field::optional("access", Str(&self.access)),
        ]
    }
}

impl Schema for LinuxMemory {
    fn fields(&self) -> Vec<Field<'_>> {
        [
            "limit",
            "reservation",
            "swap",
            "kernel",
            "kernelTCP",
            "swappiness",
            "disableOOMKiller",
        ]
        .into_iter()
        .map(|name| Field::optional(name, Scalar))
        .collect()
    }
}

impl Schema for LinuxCpu {
    fn fields(&self) -> Vec<Field<'_>> {
        vec![
            Field::optional("shares", Scalar),
            Field::optional("quota", Scalar),
            Field::optional("period", Scalar),
            Field::optional("realtimeRuntime", Scalar),
            Field::optional("realtimePeriod", Scalar),
            Field::optional("cpus", Str(&self.cpus)),
            Field::optional("mems", Str(&self.mems)),
        ]
    }
}

impl Schema for LinuxPids {
    fn fields(&self) -> Vec<Field<'_>> {
        vec![Field::required("limit", Scalar)]
    }
}

impl Schema for LinuxBlockIo {
    fn fields(&self) -> Vec<Field<'_>> {
        vec![
            Field::optional("weight", Scalar),
            Field::optional("leafWeight", Scalar),
            Field::optional("weightDevice", Node::values(&self.weight_device)),
            Field::optional(
                "throttleReadBpsDevice",
                Node::values(&self.throttle_read_bps_device),
            ),
            Field::optional(
                "throttleWriteBpsDevice",
                Node::values(&self.throttle_write_bps_device),
            ),
            Field::optional(
                "throttleReadIOPSDevice",
                Node::values(&self.throttle_read_iops_device),
            ),
            Field::optional(
                "throttleWriteIOPSDevice",
                Node::values(&self.throttle_write_iops_device),
            ),
        ]
    }
}

impl Schema for LinuxHugepageLimit {
    fn fields(&self) -> Vec<Field<'_>> {
        vec![
            Field::required("pageSize", Str(&self.page_size)),
            Field::required("limit", Scalar),
        ]
    }
}

impl Schema for LinuxNetwork {
    fn fields(&self) -> Vec<Field<'_>> {
        vec![
            Field::optional("classID", Scalar),
            Field::optional("priorities", Node::nodes(&self.priorities)),
        ]
    }
}

impl Schema for LinuxInterfacePriority {
    fn fields(&self) -> Vec<Field<'_>> {
        vec![
            Field::required("name", Str(&self.name)),
            Field::required("priority", Scalar),
        ]
    }
}

impl Schema for LinuxSeccomp {
    fn fields(&self) -> Vec<Field<'_>> {
        vec![
            Field::required("defaultAction", Str(&self.default_action)),
            Field::optional("architectures", Node::values(&self.architectures)),
            Field::optional("syscalls", Node::nodes(&self.syscalls)),
        ]
    }
}

impl Schema for LinuxSyscall {
    fn fields(&self) -> Vec<Field<'_>> {
        vec![
            Field::required("names", Node::values(&self.names)),
            Field::required("action", Str(&self.action)),
            Field::optional("args", Node::nodes(&self.args)),
        ]
    }
}

impl Schema for LinuxSeccompArg {
    fn fields(&self) -> Vec<Field<'_>> {
        vec![
            Field::required("index", Scalar),
            Field::required("value", Scalar),
            Field::optional("valueTwo", Scalar),
            Field::required("op", Str(&self.op)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Collect(Vec<String>);

    impl Visitor for Collect {
        fn visit(&mut self, path: &str, field: &Field<'_>) {
            if field.presence == Presence::Required && field.node.is_empty() {
                self.0.push(path.to_string());
            }
        }
    }

    fn empty_required(spec: &Spec) -> Vec<String> {
        let mut collect = Collect(Vec::new());
        walk(spec, "", &mut collect);
        collect.0
    }

    #[test]
    fn test_walk_default_spec() {
        let missing = empty_required(&Spec::default());
        assert_eq!(
            missing,
            vec![
                "ociVersion",
                "platform.os",
                "platform.arch",
                "process.args",
                "process.cwd",
                "root.path",
            ]
        );
    }

    #[test]
    fn test_walk_nested_sequences() {
        let mut spec = Spec::default();
        spec.mounts.push(Mount::default());
        spec.linux = Some(Linux {
            seccomp: Some(LinuxSeccomp {
                default_action: "SCMP_ACT_ALLOW".to_string(),
                syscalls: vec![LinuxSyscall {
                    names: vec!["read".to_string()],
                    action: "SCMP_ACT_ERRNO".to_string(),
                    args: vec![LinuxSeccompArg::default()],
                }],
                ..Default::default()
            }),
            ..Default::default()
        });

        let missing = empty_required(&spec);
        assert!(missing.contains(&"mounts[0].destination".to_string()));
        assert!(missing.contains(&"linux.seccomp.syscalls[0].args[0].op".to_string()));
        assert!(!missing.iter().any(|p| p.starts_with("hooks")));
    }
}
