//! generate 命令实现
//!
//! 参数按固定顺序作用到生成器上：
//! 模板 → 清理 → 元数据 → 根文件系统 → 进程 → namespace → ID 映射 →
//! 挂载 → 钩子 → linux → 资源 → seccomp。
//! 任一参数非法时直接报错退出，不输出配置。

use std::{io, path::PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use clap::Args;
use slog::Logger;
use specgen::{
    ExportOptions, Generator,
    generator::{HookStage, Throttle, parse_device, parse_device_value},
};

/// 生成 bundle 配置
#[derive(Args, Debug, Default)]
pub struct GenerateArgs {
    /// 以已有的 config.json 作为模板
    #[arg(long, value_name = "FILE")]
    pub template: Option<PathBuf>,

    /// 输出文件，默认写到标准输出
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// 移除不可移植和提升权限的字段
    #[arg(long)]
    pub sanitize: bool,

    /// 只输出 linux.seccomp 子树
    #[arg(long)]
    pub seccomp_only: bool,

    /// 按当前主机校验能力名称
    #[arg(long)]
    pub host_specific: bool,

    #[command(flatten)]
    pub meta: MetaFlags,

    #[command(flatten)]
    pub process: ProcessFlags,

    #[command(flatten)]
    pub namespaces: NamespaceFlags,

    #[command(flatten)]
    pub mounts: MountFlags,

    #[command(flatten)]
    pub hooks: HookFlags,

    #[command(flatten)]
    pub linux: LinuxFlags,

    #[command(flatten)]
    pub resources: ResourceFlags,

    #[command(flatten)]
    pub seccomp: SeccompFlags,
}

#[derive(Args, Debug, Default)]
#[command(next_help_heading = "Metadata")]
pub struct MetaFlags {
    #[arg(long, value_name = "VERSION")]
    pub oci_version: Option<String>,

    #[arg(long)]
    pub hostname: Option<String>,

    /// 目标操作系统（linux、windows、solaris）
    #[arg(long)]
    pub os: Option<String>,

    /// 目标架构（Go 命名，如 amd64、arm64）
    #[arg(long)]
    pub arch: Option<String>,

    /// 添加注解，KEY=VALUE
    #[arg(long = "annotation", value_name = "KEY=VALUE")]
    pub annotations: Vec<String>,

    #[arg(long = "annotation-remove", value_name = "KEY")]
    pub annotations_remove: Vec<String>,

    #[arg(long, value_name = "PATH")]
    pub rootfs_path: Option<String>,

    #[arg(long, value_name = "BOOL")]
    pub rootfs_readonly: Option<bool>,
}

#[derive(Args, Debug, Default)]
#[command(next_help_heading = "Process")]
pub struct ProcessFlags {
    /// 进程参数，可重复
    #[arg(long = "args", value_name = "ARG", allow_hyphen_values = true)]
    pub args: Vec<String>,

    #[arg(long)]
    pub cwd: Option<String>,

    #[arg(long)]
    pub uid: Option<u32>,

    #[arg(long)]
    pub gid: Option<u32>,

    #[arg(long)]
    pub username: Option<String>,

    #[arg(long = "additional-gid", value_name = "GID")]
    pub additional_gids: Vec<u32>,

    #[arg(long, value_name = "BOOL")]
    pub tty: Option<bool>,

    /// 终端大小，HEIGHTxWIDTH
    #[arg(long, value_name = "HxW")]
    pub console_size: Option<String>,

    #[arg(long, value_name = "BOOL")]
    pub no_new_privileges: Option<bool>,

    #[arg(long, value_name = "LABEL")]
    pub selinux_label: Option<String>,

    #[arg(long, value_name = "PROFILE")]
    pub apparmor: Option<String>,

    #[arg(long, allow_negative_numbers = true)]
    pub oom_score_adj: Option<i32>,

    /// 设置环境变量，KEY=VALUE
    #[arg(long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,

    #[arg(long = "env-remove", value_name = "KEY")]
    pub env_remove: Vec<String>,

    #[arg(long = "cap-add", value_name = "CAP")]
    pub cap_add: Vec<String>,

    #[arg(long = "cap-drop", value_name = "CAP")]
    pub cap_drop: Vec<String>,

    /// 添加或替换 rlimit，TYPE:HARD:SOFT
    #[arg(long = "rlimit-add", value_name = "TYPE:HARD:SOFT")]
    pub rlimit_add: Vec<String>,

    #[arg(long = "rlimit-remove", value_name = "TYPE")]
    pub rlimit_remove: Vec<String>,

    /// 授予全部能力并关闭 seccomp 和安全标签
    #[arg(long)]
    pub privileged: bool,
}

/// namespace 参数：空值表示新建，`host` 表示使用主机的 namespace
#[derive(Args, Debug, Default)]
#[command(next_help_heading = "Namespaces")]
pub struct NamespaceFlags {
    #[arg(long, value_name = "PATH", num_args = 0..=1, default_missing_value = "")]
    pub network: Option<String>,

    #[arg(long, value_name = "PATH", num_args = 0..=1, default_missing_value = "")]
    pub pid: Option<String>,

    #[arg(long, value_name = "PATH", num_args = 0..=1, default_missing_value = "")]
    pub mount: Option<String>,

    #[arg(long, value_name = "PATH", num_args = 0..=1, default_missing_value = "")]
    pub ipc: Option<String>,

    #[arg(long, value_name = "PATH", num_args = 0..=1, default_missing_value = "")]
    pub uts: Option<String>,

    #[arg(long, value_name = "PATH", num_args = 0..=1, default_missing_value = "")]
    pub user: Option<String>,

    #[arg(long, value_name = "PATH", num_args = 0..=1, default_missing_value = "")]
    pub cgroup: Option<String>,

    /// uid 映射，HOST:CONTAINER:SIZE
    #[arg(long = "uidmappings", value_name = "H:C:S")]
    pub uid_mappings: Vec<String>,

    /// gid 映射，HOST:CONTAINER:SIZE
    #[arg(long = "gidmappings", value_name = "H:C:S")]
    pub gid_mappings: Vec<String>,
}

impl NamespaceFlags {
    fn entries(&self) -> [(&'static str, Option<&String>); 7] {
        [
            ("network", self.network.as_ref()),
            ("pid", self.pid.as_ref()),
            ("mount", self.mount.as_ref()),
            ("ipc", self.ipc.as_ref()),
            ("uts", self.uts.as_ref()),
            ("user", self.user.as_ref()),
            ("cgroup", self.cgroup.as_ref()),
        ]
    }
}

#[derive(Args, Debug, Default)]
#[command(next_help_heading = "Mounts")]
pub struct MountFlags {
    /// tmpfs 挂载，DEST[:OPTIONS]
    #[arg(long, value_name = "DEST[:OPTIONS]")]
    pub tmpfs: Vec<String>,

    /// bind 挂载，SOURCE:DEST[:OPTIONS]
    #[arg(long, value_name = "SRC:DEST[:OPTIONS]")]
    pub bind: Vec<String>,

    /// cgroup 挂载策略：no、ro、rw
    #[arg(long, value_name = "POLICY")]
    pub mount_cgroups: Option<String>,

    #[arg(long = "mount-remove", value_name = "DEST")]
    pub mount_remove: Vec<String>,
}

#[derive(Args, Debug, Default)]
#[command(next_help_heading = "Hooks")]
pub struct HookFlags {
    #[arg(long = "hooks-prestart", value_name = "PATH[:ARGS]")]
    pub prestart: Vec<String>,

    #[arg(long = "hooks-poststart", value_name = "PATH[:ARGS]")]
    pub poststart: Vec<String>,

    #[arg(long = "hooks-poststop", value_name = "PATH[:ARGS]")]
    pub poststop: Vec<String>,

    /// 为钩子设置环境变量，STAGE:PATH:KEY=VALUE
    #[arg(long = "hook-env", value_name = "STAGE:PATH:KEY=VALUE")]
    pub hook_env: Vec<String>,

    /// 为钩子设置超时秒数，STAGE:PATH:SECS
    #[arg(long = "hook-timeout", value_name = "STAGE:PATH:SECS")]
    pub hook_timeout: Vec<String>,
}

#[derive(Args, Debug, Default)]
#[command(next_help_heading = "Linux")]
pub struct LinuxFlags {
    /// KEY=VALUE
    #[arg(long = "sysctl", value_name = "KEY=VALUE")]
    pub sysctl: Vec<String>,

    #[arg(long = "sysctl-remove", value_name = "KEY")]
    pub sysctl_remove: Vec<String>,

    /// TYPE:MAJOR:MINOR:PATH[:fileMode=MODE][:uid=UID][:gid=GID]
    #[arg(long = "device-add", value_name = "DEVICE")]
    pub device_add: Vec<String>,

    #[arg(long = "device-remove", value_name = "PATH")]
    pub device_remove: Vec<String>,

    #[arg(long, value_name = "MODE")]
    pub rootfs_propagation: Option<String>,

    #[arg(long, value_name = "PATH")]
    pub cgroups_path: Option<String>,

    #[arg(long, value_name = "LABEL")]
    pub mount_label: Option<String>,

    #[arg(long = "masked-path", value_name = "PATH")]
    pub masked_paths: Vec<String>,

    #[arg(long = "readonly-path", value_name = "PATH")]
    pub readonly_paths: Vec<String>,
}

#[derive(Args, Debug, Default)]
#[command(next_help_heading = "Resources")]
pub struct ResourceFlags {
    #[arg(long)]
    pub cpu_shares: Option<u64>,

    #[arg(long, allow_negative_numbers = true)]
    pub cpu_quota: Option<i64>,

    #[arg(long)]
    pub cpu_period: Option<u64>,

    #[arg(long, allow_negative_numbers = true)]
    pub cpu_rt_runtime: Option<i64>,

    #[arg(long)]
    pub cpu_rt_period: Option<u64>,

    #[arg(long, value_name = "CPUS")]
    pub cpus: Option<String>,

    #[arg(long, value_name = "MEMS")]
    pub mems: Option<String>,

    #[arg(long, allow_negative_numbers = true)]
    pub memory_limit: Option<i64>,

    #[arg(long, allow_negative_numbers = true)]
    pub memory_reservation: Option<i64>,

    #[arg(long, allow_negative_numbers = true)]
    pub memory_swap: Option<i64>,

    #[arg(long, allow_negative_numbers = true)]
    pub memory_kernel: Option<i64>,

    #[arg(long, allow_negative_numbers = true)]
    pub memory_kernel_tcp: Option<i64>,

    #[arg(long)]
    pub memory_swappiness: Option<u64>,

    #[arg(long, value_name = "BOOL")]
    pub disable_oom_kill: Option<bool>,

    #[arg(long, allow_negative_numbers = true)]
    pub pids_limit: Option<i64>,

    #[arg(long)]
    pub blkio_weight: Option<u16>,

    #[arg(long)]
    pub blkio_leaf_weight: Option<u16>,

    /// MAJOR:MINOR:WEIGHT
    #[arg(long = "blkio-weight-device", value_name = "MAJ:MIN:WEIGHT")]
    pub blkio_weight_device: Vec<String>,

    #[arg(long = "blkio-read-bps-device", value_name = "MAJ:MIN:RATE")]
    pub blkio_read_bps_device: Vec<String>,

    #[arg(long = "blkio-write-bps-device", value_name = "MAJ:MIN:RATE")]
    pub blkio_write_bps_device: Vec<String>,

    #[arg(long = "blkio-read-iops-device", value_name = "MAJ:MIN:RATE")]
    pub blkio_read_iops_device: Vec<String>,

    #[arg(long = "blkio-write-iops-device", value_name = "MAJ:MIN:RATE")]
    pub blkio_write_iops_device: Vec<String>,

    /// PAGESIZE:LIMIT
    #[arg(long = "hugepage-limit", value_name = "SIZE:LIMIT")]
    pub hugepage_limits: Vec<String>,

    #[arg(long)]
    pub network_classid: Option<u32>,

    /// NAME:PRIORITY
    #[arg(long = "network-priority", value_name = "NAME:PRIO")]
    pub network_priorities: Vec<String>,

    /// allow|deny:TYPE[:MAJOR:MINOR]:ACCESS，设备号可用 `*`
    #[arg(long = "device-cgroup", value_name = "RULE")]
    pub device_cgroup: Vec<String>,
}

#[derive(Args, Debug, Default)]
#[command(next_help_heading = "Seccomp")]
pub struct SeccompFlags {
    /// 默认动作
    #[arg(long, value_name = "ACTION", conflicts_with = "seccomp_default_force")]
    pub seccomp_default: Option<String>,

    /// 设置默认动作并移除动作相同的规则
    #[arg(long, value_name = "ACTION")]
    pub seccomp_default_force: Option<String>,

    #[arg(long = "seccomp-arch", value_name = "ARCH")]
    pub seccomp_arch: Vec<String>,

    #[arg(long = "seccomp-arch-remove", value_name = "ARCH")]
    pub seccomp_arch_remove: Vec<String>,

    /// ACTION:NAME[,NAME...][:INDEX:VALUE:VALUETWO:OP]...
    #[arg(long = "seccomp-syscalls", value_name = "RULE")]
    pub seccomp_syscalls: Vec<String>,

    #[arg(long = "seccomp-remove", value_name = "RULE")]
    pub seccomp_remove: Vec<String>,

    #[arg(long)]
    pub seccomp_remove_all: bool,
}

/// 处理 generate 命令
pub fn handle_generate(args: &GenerateArgs, host_specific: bool, logger: &Logger) -> Result<()> {
    let generator = build_generator(args, host_specific || args.host_specific)?;
    let opts = ExportOptions {
        seccomp: args.seccomp_only,
    };

    match &args.output {
        Some(path) => {
            generator
                .save_to_file(path, opts)
                .with_context(|| format!("failed to write {}", path.display()))?;
            slog::info!(logger, "config written"; "path" => path.display().to_string());
        }
        None => generator
            .save(io::stdout().lock(), opts)
            .context("failed to write config to stdout")?,
    }
    Ok(())
}

/// 按固定顺序构造生成器
pub fn build_generator(args: &GenerateArgs, host_specific: bool) -> Result<Generator> {
    let mut g = match &args.template {
        Some(path) => Generator::from_file(path)
            .with_context(|| format!("failed to load template {}", path.display()))?,
        None => Generator::new(),
    };
    g.set_host_specific(host_specific);

    if args.sanitize {
        g.sanitize();
    }

    apply_meta(&mut g, &args.meta)?;
    apply_process(&mut g, &args.process)?;
    apply_namespaces(&mut g, &args.namespaces)?;
    apply_mounts(&mut g, &args.mounts)?;
    apply_hooks(&mut g, &args.hooks)?;
    apply_linux(&mut g, &args.linux)?;
    apply_resources(&mut g, &args.resources)?;
    apply_seccomp(&mut g, &args.seccomp)?;

    Ok(g)
}

fn apply_meta(g: &mut Generator, m: &MetaFlags) -> Result<()> {
    if let Some(v) = &m.oci_version {
        g.set_oci_version(v).context("--oci-version")?;
    }
    if let Some(h) = &m.hostname {
        g.set_hostname(h);
    }
    if let Some(os) = &m.os {
        g.set_platform_os(os).context("--os")?;
    }
    if let Some(arch) = &m.arch {
        g.set_platform_arch(arch).context("--arch")?;
    }
    for a in &m.annotations {
        let (k, v) = split_pair("--annotation", a)?;
        g.add_annotation(k, v).with_context(|| format!("--annotation {}", a))?;
    }
    for k in &m.annotations_remove {
        g.remove_annotation(k);
    }

    if let Some(path) = &m.rootfs_path {
        g.set_root_path(path);
    }
    if let Some(ro) = m.rootfs_readonly {
        g.set_root_readonly(ro);
    }
    Ok(())
}

fn apply_process(g: &mut Generator, p: &ProcessFlags) -> Result<()> {
    if p.privileged {
        g.set_privileged();
    }
    if !p.args.is_empty() {
        g.set_process_args(p.args.clone());
    }
    if let Some(cwd) = &p.cwd {
        g.set_process_cwd(cwd).context("--cwd")?;
    }
    if let Some(uid) = p.uid {
        g.set_process_uid(uid);
    }
    if let Some(gid) = p.gid {
        g.set_process_gid(gid);
    }
    if let Some(name) = &p.username {
        g.set_process_username(name);
    }
    for gid in &p.additional_gids {
        g.add_process_additional_gid(*gid);
    }
    if let Some(tty) = p.tty {
        g.set_process_terminal(tty);
    }
    if let Some(size) = &p.console_size {
        let (height, width) = parse_console_size(size)?;
        g.set_process_console_size(height, width);
    }
    if let Some(nnp) = p.no_new_privileges {
        g.set_process_no_new_privileges(nnp);
    }
    if let Some(label) = &p.selinux_label {
        g.set_process_selinux_label(label);
    }
    if let Some(profile) = &p.apparmor {
        g.set_process_apparmor_profile(profile);
    }
    if let Some(adj) = p.oom_score_adj {
        g.set_process_oom_score_adj(adj).context("--oom-score-adj")?;
    }

    for e in &p.env {
        g.add_process_env_pair(e)
            .with_context(|| format!("--env {}", e))?;
    }
    for k in &p.env_remove {
        g.remove_process_env(k);
    }

    for cap in &p.cap_add {
        g.add_process_capability(cap)
            .with_context(|| format!("--cap-add {}", cap))?;
    }
    for cap in &p.cap_drop {
        g.drop_process_capability(cap)
            .with_context(|| format!("--cap-drop {}", cap))?;
    }

    for r in &p.rlimit_add {
        let (typ, hard, soft) = parse_rlimit(r)?;
        g.add_process_rlimit(typ, hard, soft)
            .with_context(|| format!("--rlimit-add {}", r))?;
    }
    for typ in &p.rlimit_remove {
        g.remove_process_rlimit(typ);
    }
    Ok(())
}

fn apply_namespaces(g: &mut Generator, n: &NamespaceFlags) -> Result<()> {
    for (typ, value) in n.entries() {
        match value.map(String::as_str) {
            None => {}
            Some("host") => g
                .remove_linux_namespace(typ)
                .with_context(|| format!("--{}", typ))?,
            Some(path) => g
                .add_or_replace_linux_namespace(typ, path)
                .with_context(|| format!("--{}", typ))?,
        }
    }

    for m in &n.uid_mappings {
        g.add_linux_uid_mapping(m)
            .with_context(|| format!("--uidmappings {}", m))?;
    }
    for m in &n.gid_mappings {
        g.add_linux_gid_mapping(m)
            .with_context(|| format!("--gidmappings {}", m))?;
    }
    Ok(())
}

fn apply_mounts(g: &mut Generator, m: &MountFlags) -> Result<()> {
    for t in &m.tmpfs {
        g.add_tmpfs_mount(t).with_context(|| format!("--tmpfs {}", t))?;
    }
    for b in &m.bind {
        g.add_bind_mount(b).with_context(|| format!("--bind {}", b))?;
    }
    if let Some(policy) = &m.mount_cgroups {
        g.add_cgroup_mount(policy).context("--mount-cgroups")?;
    }
    for dest in &m.mount_remove {
        g.remove_mount(dest);
    }
    Ok(())
}

fn apply_hooks(g: &mut Generator, h: &HookFlags) -> Result<()> {
    for (stage, list, flag) in [
        (HookStage::Prestart, &h.prestart, "--hooks-prestart"),
        (HookStage::Poststart, &h.poststart, "--hooks-poststart"),
        (HookStage::Poststop, &h.poststop, "--hooks-poststop"),
    ] {
        for hook in list {
            g.add_hook_from_str(stage, hook)
                .with_context(|| format!("{} {}", flag, hook))?;
        }
    }

    for e in &h.hook_env {
        let (stage, path, env) = split_hook_target("--hook-env", e)?;
        g.add_hook_env(stage, path, env)
            .with_context(|| format!("--hook-env {}", e))?;
    }
    for t in &h.hook_timeout {
        let (stage, path, secs) = split_hook_target("--hook-timeout", t)?;
        let secs: i32 = secs
            .parse()
            .with_context(|| format!("--hook-timeout {}: invalid seconds", t))?;
        g.add_hook_timeout(stage, path, secs)
            .with_context(|| format!("--hook-timeout {}", t))?;
    }
    Ok(())
}

fn apply_linux(g: &mut Generator, l: &LinuxFlags) -> Result<()> {
    for s in &l.sysctl {
        let (k, v) = split_pair("--sysctl", s)?;
        g.add_linux_sysctl(k, v).with_context(|| format!("--sysctl {}", s))?;
    }
    for k in &l.sysctl_remove {
        g.remove_linux_sysctl(k);
    }

    for d in &l.device_add {
        let device = parse_device(d).with_context(|| format!("--device-add {}", d))?;
        g.add_linux_device(device)
            .with_context(|| format!("--device-add {}", d))?;
    }
    for path in &l.device_remove {
        g.remove_linux_device(path);
    }

    if let Some(p) = &l.rootfs_propagation {
        g.set_linux_rootfs_propagation(p)
            .context("--rootfs-propagation")?;
    }
    if let Some(p) = &l.cgroups_path {
        g.set_linux_cgroups_path(p);
    }
    if let Some(label) = &l.mount_label {
        g.set_linux_mount_label(label);
    }
    for p in &l.masked_paths {
        g.add_linux_masked_path(p)
            .with_context(|| format!("--masked-path {}", p))?;
    }
    for p in &l.readonly_paths {
        g.add_linux_readonly_path(p)
            .with_context(|| format!("--readonly-path {}", p))?;
    }
    Ok(())
}

fn apply_resources(g: &mut Generator, r: &ResourceFlags) -> Result<()> {
    if let Some(v) = r.cpu_shares {
        g.set_linux_resources_cpu_shares(v);
    }
    if let Some(v) = r.cpu_quota {
        g.set_linux_resources_cpu_quota(v);
    }
    if let Some(v) = r.cpu_period {
        g.set_linux_resources_cpu_period(v);
    }
    if let Some(v) = r.cpu_rt_runtime {
        g.set_linux_resources_cpu_realtime_runtime(v);
    }
    if let Some(v) = r.cpu_rt_period {
        g.set_linux_resources_cpu_realtime_period(v);
    }
    if let Some(v) = &r.cpus {
        g.set_linux_resources_cpu_cpus(v);
    }
    if let Some(v) = &r.mems {
        g.set_linux_resources_cpu_mems(v);
    }

    if let Some(v) = r.memory_limit {
        g.set_linux_resources_memory_limit(v);
    }
    if let Some(v) = r.memory_reservation {
        g.set_linux_resources_memory_reservation(v);
    }
    if let Some(v) = r.memory_swap {
        g.set_linux_resources_memory_swap(v);
    }
    if let Some(v) = r.memory_kernel {
        g.set_linux_resources_memory_kernel(v);
    }
    if let Some(v) = r.memory_kernel_tcp {
        g.set_linux_resources_memory_kernel_tcp(v);
    }
    if let Some(v) = r.memory_swappiness {
        g.set_linux_resources_memory_swappiness(v)
            .context("--memory-swappiness")?;
    }
    if let Some(v) = r.disable_oom_kill {
        g.set_linux_resources_memory_disable_oom_killer(v);
    }

    if let Some(v) = r.pids_limit {
        g.set_linux_resources_pids_limit(v);
    }

    if let Some(v) = r.blkio_weight {
        g.set_linux_resources_blockio_weight(v)
            .context("--blkio-weight")?;
    }
    if let Some(v) = r.blkio_leaf_weight {
        g.set_linux_resources_blockio_leaf_weight(v)
            .context("--blkio-leaf-weight")?;
    }
    for d in &r.blkio_weight_device {
        let (major, minor, weight) = parse_device_value("blkio weight device", d)?;
        let weight = u16::try_from(weight)
            .map_err(|_| anyhow!("--blkio-weight-device {}: weight out of range", d))?;
        g.add_linux_resources_blockio_weight_device(major, minor, Some(weight), None)
            .with_context(|| format!("--blkio-weight-device {}", d))?;
    }
    for (throttle, list, kind) in [
        (Throttle::ReadBps, &r.blkio_read_bps_device, "blkio read bps device"),
        (Throttle::WriteBps, &r.blkio_write_bps_device, "blkio write bps device"),
        (Throttle::ReadIops, &r.blkio_read_iops_device, "blkio read iops device"),
        (Throttle::WriteIops, &r.blkio_write_iops_device, "blkio write iops device"),
    ] {
        for d in list {
            let (major, minor, rate) = parse_device_value(kind, d)?;
            g.add_linux_resources_blockio_throttle_device(throttle, major, minor, rate);
        }
    }

    for h in &r.hugepage_limits {
        let (size, limit) = split_number("--hugepage-limit", h)?;
        g.add_linux_resources_hugepage_limit(size, limit)
            .with_context(|| format!("--hugepage-limit {}", h))?;
    }

    if let Some(id) = r.network_classid {
        g.set_linux_resources_network_class_id(id);
    }
    for p in &r.network_priorities {
        let (name, prio) = split_number("--network-priority", p)?;
        let prio = u32::try_from(prio)
            .map_err(|_| anyhow!("--network-priority {}: priority out of range", p))?;
        g.add_linux_resources_network_priority(name, prio)
            .with_context(|| format!("--network-priority {}", p))?;
    }

    for rule in &r.device_cgroup {
        let DeviceCgroupRule {
            allow,
            typ,
            major,
            minor,
            access,
        } = parse_device_cgroup(rule)?;
        g.add_linux_resources_device(allow, typ, major, minor, access)
            .with_context(|| format!("--device-cgroup {}", rule))?;
    }
    Ok(())
}

fn apply_seccomp(g: &mut Generator, s: &SeccompFlags) -> Result<()> {
    if let Some(action) = &s.seccomp_default {
        g.set_seccomp_default(action).context("--seccomp-default")?;
    }
    if let Some(action) = &s.seccomp_default_force {
        g.set_seccomp_default_force(action)
            .context("--seccomp-default-force")?;
    }

    let adds_rules = !s.seccomp_arch.is_empty() || !s.seccomp_syscalls.is_empty();
    if adds_rules && seccomp_default_action(g).is_empty() {
        bail!(
            "--seccomp-arch/--seccomp-syscalls need a default action: \
             pass --seccomp-default or use a template that sets one"
        );
    }

    for arch in &s.seccomp_arch {
        g.add_seccomp_arch(arch)
            .with_context(|| format!("--seccomp-arch {}", arch))?;
    }
    for arch in &s.seccomp_arch_remove {
        g.remove_seccomp_arch(arch)
            .with_context(|| format!("--seccomp-arch-remove {}", arch))?;
    }

    if s.seccomp_remove_all {
        g.remove_all_seccomp_rules();
    }
    for rule in &s.seccomp_syscalls {
        g.add_seccomp_syscalls(rule)
            .with_context(|| format!("--seccomp-syscalls {}", rule))?;
    }
    for rule in &s.seccomp_remove {
        g.remove_seccomp_syscalls(rule)
            .with_context(|| format!("--seccomp-remove {}", rule))?;
    }
    Ok(())
}

fn seccomp_default_action(g: &Generator) -> &str {
    g.spec()
        .linux
        .as_ref()
        .and_then(|l| l.seccomp.as_ref())
        .map_or("", |s| s.default_action.as_str())
}

// ============================================================================
// 参数解析
// ============================================================================

/// `KEY=VALUE`，KEY 非空
fn split_pair<'a>(flag: &str, input: &'a str) -> Result<(&'a str, &'a str)> {
    match input.split_once('=') {
        Some((k, v)) if !k.is_empty() => Ok((k, v)),
        _ => bail!("{} {}: expected KEY=VALUE", flag, input),
    }
}

/// `NAME:NUMBER`
fn split_number<'a>(flag: &str, input: &'a str) -> Result<(&'a str, u64)> {
    let (name, value) = input
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("{} {}: expected NAME:NUMBER", flag, input))?;
    let value = value
        .parse()
        .with_context(|| format!("{} {}: {:?} is not a number", flag, input, value))?;
    Ok((name, value))
}

fn parse_console_size(input: &str) -> Result<(u32, u32)> {
    let (h, w) = input
        .split_once('x')
        .ok_or_else(|| anyhow!("--console-size {}: expected HEIGHTxWIDTH", input))?;
    let parse = |s: &str| {
        s.parse::<u32>()
            .with_context(|| format!("--console-size {}: {:?} is not a number", input, s))
    };
    Ok((parse(h)?, parse(w)?))
}

fn parse_rlimit(input: &str) -> Result<(&str, u64, u64)> {
    let parts: Vec<&str> = input.split(':').collect();
    if parts.len() != 3 {
        bail!("--rlimit-add {}: expected TYPE:HARD:SOFT", input);
    }
    let parse = |s: &str| {
        s.parse::<u64>()
            .with_context(|| format!("--rlimit-add {}: {:?} is not a number", input, s))
    };
    Ok((parts[0], parse(parts[1])?, parse(parts[2])?))
}

/// `STAGE:PATH:REST`
fn split_hook_target<'a>(flag: &str, input: &'a str) -> Result<(HookStage, &'a str, &'a str)> {
    let mut parts = input.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(stage), Some(path), Some(rest)) if !path.is_empty() => {
            let stage = stage
                .parse()
                .with_context(|| format!("{} {}", flag, input))?;
            Ok((stage, path, rest))
        }
        _ => bail!("{} {}: expected STAGE:PATH:VALUE", flag, input),
    }
}

#[derive(Debug, PartialEq, Eq)]
struct DeviceCgroupRule<'a> {
    allow: bool,
    typ: &'a str,
    major: Option<i64>,
    minor: Option<i64>,
    access: &'a str,
}

/// `allow|deny:TYPE:ACCESS` 或 `allow|deny:TYPE:MAJOR:MINOR:ACCESS`
fn parse_device_cgroup(input: &str) -> Result<DeviceCgroupRule<'_>> {
    let parts: Vec<&str> = input.split(':').collect();
    let (policy, typ, numbers, access) = match parts.as_slice() {
        [p, t, a] => (*p, *t, None, *a),
        [p, t, maj, min, a] => (*p, *t, Some((*maj, *min)), *a),
        _ => bail!(
            "--device-cgroup {}: expected allow|deny:TYPE[:MAJOR:MINOR]:ACCESS",
            input
        ),
    };

    let allow = match policy {
        "allow" => true,
        "deny" => false,
        other => bail!("--device-cgroup {}: unknown policy {:?}", input, other),
    };
    let number = |s: &str| -> Result<Option<i64>> {
        if s == "*" {
            return Ok(None);
        }
        s.parse()
            .map(Some)
            .with_context(|| format!("--device-cgroup {}: {:?} is not a number", input, s))
    };
    let (major, minor) = match numbers {
        Some((maj, min)) => (number(maj)?, number(min)?),
        None => (None, None),
    };

    Ok(DeviceCgroupRule {
        allow,
        typ,
        major,
        minor,
        access,
    })
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: GenerateArgs,
    }

    fn parse(argv: &[&str]) -> GenerateArgs {
        let mut full = vec!["generate"];
        full.extend_from_slice(argv);
        TestCli::try_parse_from(full).unwrap().args
    }

    #[test]
    fn test_default_generate() {
        let g = build_generator(&GenerateArgs::default(), false).unwrap();
        assert_eq!(g.spec(), Generator::new().spec());
    }

    #[test]
    fn test_process_and_metadata_flags() {
        let args = parse(&[
            "--hostname",
            "box",
            "--annotation",
            "org.example=1",
            "--args",
            "sleep",
            "--args",
            "-1",
            "--cwd",
            "/work",
            "--env",
            "LANG=C",
            "--cap-add",
            "net_admin",
            "--cap-drop",
            "CAP_KILL",
            "--rlimit-add",
            "RLIMIT_NPROC:64:32",
            "--oom-score-adj",
            "-500",
            "--console-size",
            "24x80",
        ]);
        let g = build_generator(&args, false).unwrap();
        let spec = g.spec();

        assert_eq!(spec.hostname, "box");
        assert_eq!(spec.annotations["org.example"], "1");
        assert_eq!(spec.process.args, vec!["sleep", "-1"]);
        assert_eq!(spec.process.cwd, "/work");
        assert!(spec.process.env.contains(&"LANG=C".to_string()));
        assert!(spec.process.capabilities.contains(&"CAP_NET_ADMIN".to_string()));
        assert!(!spec.process.capabilities.contains(&"CAP_KILL".to_string()));
        assert!(spec.process.rlimits.iter().any(|r| r.typ == "RLIMIT_NPROC"
            && r.hard == 64
            && r.soft == 32));
        assert_eq!(spec.process.oom_score_adj, Some(-500));
        assert_eq!(
            spec.process.console_size.map(|c| (c.height, c.width)),
            Some((24, 80))
        );
    }

    #[test]
    fn test_namespace_flags() {
        let args = parse(&["--network", "host", "--user", "--pid", "/proc/1/ns/pid"]);
        let g = build_generator(&args, false).unwrap();
        let linux = g.spec().linux.as_ref().unwrap();

        assert!(linux.namespace("network").is_none());
        assert_eq!(linux.namespace("user").unwrap().path, "");
        assert_eq!(linux.namespace("pid").unwrap().path, "/proc/1/ns/pid");
    }

    #[test]
    fn test_seccomp_flags() {
        let args = parse(&[
            "--seccomp-default",
            "errno",
            "--seccomp-arch",
            "amd64",
            "--seccomp-syscalls",
            "allow:read,write",
            "--seccomp-syscalls",
            "errno:read",
        ]);
        let g = build_generator(&args, false).unwrap();
        let seccomp = g.spec().linux.as_ref().unwrap().seccomp.as_ref().unwrap();

        assert_eq!(seccomp.default_action, "SCMP_ACT_ERRNO");
        assert_eq!(seccomp.architectures, vec!["SCMP_ARCH_X86_64"]);
        // errno:read 与默认动作相同且无参数，跳过
        assert_eq!(seccomp.syscalls.len(), 2);
        assert!(seccomp.syscalls.iter().all(|s| s.action == "SCMP_ACT_ALLOW"));
    }

    #[test]
    fn test_seccomp_default_flags_conflict() {
        let argv = [
            "generate",
            "--seccomp-default",
            "allow",
            "--seccomp-default-force",
            "errno",
        ];
        assert!(TestCli::try_parse_from(argv).is_err());
    }

    #[test]
    fn test_invalid_flag_fails_closed() {
        let args = parse(&["--cap-add", "CAP_FLY"]);
        let err = build_generator(&args, false).unwrap_err();
        assert!(format!("{:#}", err).contains("--cap-add CAP_FLY"));

        let args = parse(&[
            "--seccomp-default",
            "errno",
            "--seccomp-syscalls",
            "allow:read:0:1:0:XX",
        ]);
        assert!(build_generator(&args, false).is_err());
    }

    #[test]
    fn test_seccomp_rules_need_default_action() {
        let args = parse(&["--seccomp-syscalls", "errno:chmod"]);
        let err = build_generator(&args, false).unwrap_err();
        assert!(format!("{:#}", err).contains("--seccomp-default"));

        let args = parse(&["--seccomp-arch", "amd64"]);
        assert!(build_generator(&args, false).is_err());

        // 模板已设置默认动作时不需要再指定
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("template.json");
        let mut base = Generator::new();
        base.set_seccomp_default("allow").unwrap();
        base.save_to_file(&template, ExportOptions::default()).unwrap();

        let args = parse(&[
            "--template",
            template.to_str().unwrap(),
            "--seccomp-syscalls",
            "errno:chmod",
        ]);
        let g = build_generator(&args, false).unwrap();
        let seccomp = g.spec().linux.as_ref().unwrap().seccomp.as_ref().unwrap();
        assert_eq!(seccomp.default_action, "SCMP_ACT_ALLOW");
        assert_eq!(seccomp.syscalls[0].names, vec!["chmod"]);
    }

    #[test]
    fn test_resource_flags() {
        let args = parse(&[
            "--cpu-shares",
            "512",
            "--memory-limit",
            "1048576",
            "--pids-limit",
            "-1",
            "--blkio-weight-device",
            "8:0:500",
            "--blkio-read-bps-device",
            "8:0:1024",
            "--hugepage-limit",
            "2MB:10",
            "--network-priority",
            "eth0:3",
            "--device-cgroup",
            "allow:c:1:*:rw",
        ]);
        let g = build_generator(&args, false).unwrap();
        let res = g
            .spec()
            .linux
            .as_ref()
            .unwrap()
            .resources
            .as_ref()
            .unwrap();

        assert_eq!(res.cpu.as_ref().unwrap().shares, Some(512));
        assert_eq!(res.memory.as_ref().unwrap().limit, Some(1048576));
        assert_eq!(res.pids.as_ref().unwrap().limit, -1);
        let bio = res.block_io.as_ref().unwrap();
        assert_eq!(bio.weight_device[0].weight, Some(500));
        assert_eq!(bio.throttle_read_bps_device[0].rate, 1024);
        assert_eq!(res.hugepage_limits[0].page_size, "2MB");
        assert_eq!(res.network.as_ref().unwrap().priorities[0].name, "eth0");
        let rule = res.devices.last().unwrap();
        assert!(rule.allow);
        assert_eq!((rule.major, rule.minor), (Some(1), None));
    }

    #[test]
    fn test_hook_flags() {
        let args = parse(&[
            "--hooks-prestart",
            "/bin/setup:--fast",
            "--hook-env",
            "prestart:/bin/setup:MODE=1",
            "--hook-timeout",
            "prestart:/bin/setup:5",
        ]);
        let g = build_generator(&args, false).unwrap();
        let hooks = g.spec().hooks.as_ref().unwrap();
        assert_eq!(hooks.prestart.len(), 1);
        assert_eq!(hooks.prestart[0].args, vec!["--fast"]);
        assert_eq!(hooks.prestart[0].env, vec!["MODE=1"]);
        assert_eq!(hooks.prestart[0].timeout, Some(5));
    }

    #[test]
    fn test_sanitize_then_apply() {
        let args = parse(&["--sanitize", "--args", "true"]);
        let g = build_generator(&args, false).unwrap();
        assert_eq!(g.spec().process.args, vec!["true"]);
        assert!(g.spec().process.capabilities.is_empty());
    }

    #[test]
    fn test_helper_parsers() {
        assert_eq!(parse_console_size("10x20").unwrap(), (10, 20));
        assert!(parse_console_size("10,20").is_err());
        assert_eq!(parse_rlimit("RLIMIT_CORE:1:0").unwrap(), ("RLIMIT_CORE", 1, 0));
        assert!(parse_rlimit("RLIMIT_CORE:1").is_err());
        assert!(split_pair("--env", "=x").is_err());
        assert_eq!(split_number("--x", "2MB:10").unwrap(), ("2MB", 10));

        let (stage, path, rest) =
            split_hook_target("--hook-env", "poststop:/bin/x:A=b:c").unwrap();
        assert_eq!(stage, HookStage::Poststop);
        assert_eq!((path, rest), ("/bin/x", "A=b:c"));
        assert!(split_hook_target("--hook-env", "later:/bin/x:A=b").is_err());

        assert_eq!(
            parse_device_cgroup("deny:a:rwm").unwrap(),
            DeviceCgroupRule {
                allow: false,
                typ: "a",
                major: None,
                minor: None,
                access: "rwm",
            }
        );
        assert!(parse_device_cgroup("maybe:a:rwm").is_err());
        assert!(parse_device_cgroup("allow:c:1:rwm").is_err());
    }
}
