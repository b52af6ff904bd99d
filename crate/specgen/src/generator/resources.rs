//! Cgroup 资源限制
//!
//! 每个数值字段都以 `Option` 保存，设置 0 与未设置是不同的状态。
//! 第一次写入某个控制器时才创建 `linux.resources` 及对应子树。

use runtime_spec::{
    LinuxBlockIo, LinuxCpu, LinuxDeviceCgroup, LinuxHugepageLimit, LinuxInterfacePriority,
    LinuxMemory, LinuxNetwork, LinuxThrottleDevice, LinuxWeightDevice,
};

use super::Generator;
use crate::error::{Error, ParseError, Result};

/// blkio 权重合法区间
pub const BLKIO_WEIGHT_RANGE: std::ops::RangeInclusive<u16> = 10..=1000;

/// 限速设备所在的列表
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Throttle {
    ReadBps,
    WriteBps,
    ReadIops,
    WriteIops,
}

/// 解析 `MAJOR:MINOR:VALUE`
pub fn parse_device_value(
    kind: &'static str,
    input: &str,
) -> std::result::Result<(i64, i64, u64), ParseError> {
    let parts: Vec<&str> = input.split(':').collect();
    if parts.len() != 3 {
        return Err(ParseError::malformed(kind, input, "expected MAJOR:MINOR:VALUE"));
    }
    let bad = |p: &str| ParseError::malformed(kind, input, format!("{:?} is not a number", p));
    Ok((
        parts[0].parse().map_err(|_| bad(parts[0]))?,
        parts[1].parse().map_err(|_| bad(parts[1]))?,
        parts[2].parse().map_err(|_| bad(parts[2]))?,
    ))
}

impl Generator {
    fn cpu_mut(&mut self) -> &mut LinuxCpu {
        self.resources_mut().cpu.get_or_insert_with(Default::default)
    }

    fn memory_mut(&mut self) -> &mut LinuxMemory {
        self.resources_mut()
            .memory
            .get_or_insert_with(Default::default)
    }

    fn block_io_mut(&mut self) -> &mut LinuxBlockIo {
        self.resources_mut()
            .block_io
            .get_or_insert_with(Default::default)
    }

    fn network_mut(&mut self) -> &mut LinuxNetwork {
        self.resources_mut()
            .network
            .get_or_insert_with(Default::default)
    }

    // ========================================================================
    // CPU
    // ========================================================================

    pub fn set_linux_resources_cpu_shares(&mut self, shares: u64) {
        self.cpu_mut().shares = Some(shares);
    }

    pub fn set_linux_resources_cpu_quota(&mut self, quota: i64) {
        self.cpu_mut().quota = Some(quota);
    }

    pub fn set_linux_resources_cpu_period(&mut self, period: u64) {
        self.cpu_mut().period = Some(period);
    }

    pub fn set_linux_resources_cpu_realtime_runtime(&mut self, runtime: i64) {
        self.cpu_mut().realtime_runtime = Some(runtime);
    }

    pub fn set_linux_resources_cpu_realtime_period(&mut self, period: u64) {
        self.cpu_mut().realtime_period = Some(period);
    }

    pub fn set_linux_resources_cpu_cpus(&mut self, cpus: &str) {
        self.cpu_mut().cpus = cpus.to_string();
    }

    pub fn set_linux_resources_cpu_mems(&mut self, mems: &str) {
        self.cpu_mut().mems = mems.to_string();
    }

    // ========================================================================
    // 内存
    // ========================================================================

    pub fn set_linux_resources_memory_limit(&mut self, limit: i64) {
        self.memory_mut().limit = Some(limit);
    }

    pub fn set_linux_resources_memory_reservation(&mut self, reservation: i64) {
        self.memory_mut().reservation = Some(reservation);
    }

    pub fn set_linux_resources_memory_swap(&mut self, swap: i64) {
        self.memory_mut().swap = Some(swap);
    }

    pub fn set_linux_resources_memory_kernel(&mut self, kernel: i64) {
        self.memory_mut().kernel = Some(kernel);
    }

    pub fn set_linux_resources_memory_kernel_tcp(&mut self, kernel_tcp: i64) {
        self.memory_mut().kernel_tcp = Some(kernel_tcp);
    }

    pub fn set_linux_resources_memory_swappiness(&mut self, swappiness: u64) -> Result<()> {
        if swappiness > 100 {
            return Err(self.reject(Error::invalid_state(format!(
                "swappiness {} out of range [0, 100]",
                swappiness
            ))));
        }
        self.memory_mut().swappiness = Some(swappiness);
        Ok(())
    }

    pub fn set_linux_resources_memory_disable_oom_killer(&mut self, disable: bool) {
        self.memory_mut().disable_oom_killer = Some(disable);
    }

    // ========================================================================
    // pids
    // ========================================================================

    pub fn set_linux_resources_pids_limit(&mut self, limit: i64) {
        self.resources_mut().pids = Some(runtime_spec::LinuxPids { limit });
    }

    // ========================================================================
    // blkio
    // ========================================================================

    fn check_blkio_weight(&self, what: &str, weight: Option<u16>) -> Result<()> {
        match weight {
            Some(w) if !BLKIO_WEIGHT_RANGE.contains(&w) => Err(self.reject(Error::invalid_state(
                format!("{} {} out of range [10, 1000]", what, w),
            ))),
            _ => Ok(()),
        }
    }

    pub fn set_linux_resources_blockio_weight(&mut self, weight: u16) -> Result<()> {
        self.check_blkio_weight("blkio weight", Some(weight))?;
        self.block_io_mut().weight = Some(weight);
        Ok(())
    }

    pub fn set_linux_resources_blockio_leaf_weight(&mut self, weight: u16) -> Result<()> {
        self.check_blkio_weight("blkio leaf weight", Some(weight))?;
        self.block_io_mut().leaf_weight = Some(weight);
        Ok(())
    }

    /// 设置设备权重，同一 `major:minor` 已存在时替换
    pub fn add_linux_resources_blockio_weight_device(
        &mut self,
        major: i64,
        minor: i64,
        weight: Option<u16>,
        leaf_weight: Option<u16>,
    ) -> Result<()> {
        self.check_blkio_weight("blkio weight", weight)?;
        self.check_blkio_weight("blkio leaf weight", leaf_weight)?;

        let device = LinuxWeightDevice {
            major,
            minor,
            weight,
            leaf_weight,
        };
        let devices = &mut self.block_io_mut().weight_device;
        match devices
            .iter_mut()
            .find(|d| d.major == major && d.minor == minor)
        {
            Some(existing) => *existing = device,
            None => devices.push(device),
        }
        Ok(())
    }

    pub fn drop_linux_resources_blockio_weight_device(&mut self, major: i64, minor: i64) {
        if let Some(bio) = self.block_io_opt() {
            bio.weight_device
                .retain(|d| !(d.major == major && d.minor == minor));
        }
    }

    /// 设置设备限速，同一 `major:minor` 已存在时替换
    pub fn add_linux_resources_blockio_throttle_device(
        &mut self,
        throttle: Throttle,
        major: i64,
        minor: i64,
        rate: u64,
    ) {
        let device = LinuxThrottleDevice { major, minor, rate };
        let devices = throttle_list(self.block_io_mut(), throttle);
        match devices
            .iter_mut()
            .find(|d| d.major == major && d.minor == minor)
        {
            Some(existing) => *existing = device,
            None => devices.push(device),
        }
    }

    pub fn drop_linux_resources_blockio_throttle_device(
        &mut self,
        throttle: Throttle,
        major: i64,
        minor: i64,
    ) {
        if let Some(bio) = self.block_io_opt() {
            throttle_list(bio, throttle).retain(|d| !(d.major == major && d.minor == minor));
        }
    }

    fn block_io_opt(&mut self) -> Option<&mut LinuxBlockIo> {
        self.spec
            .linux
            .as_mut()?
            .resources
            .as_mut()?
            .block_io
            .as_mut()
    }

    // ========================================================================
    // hugetlb
    // ========================================================================

    /// 设置大页限制，同一页大小已存在时替换
    pub fn add_linux_resources_hugepage_limit(
        &mut self,
        page_size: &str,
        limit: u64,
    ) -> Result<()> {
        if page_size.is_empty() {
            return Err(self.reject(ParseError::malformed(
                "hugepage limit",
                page_size,
                "empty page size",
            )));
        }

        let entry = LinuxHugepageLimit {
            page_size: page_size.to_string(),
            limit,
        };
        let limits = &mut self.resources_mut().hugepage_limits;
        match limits.iter_mut().find(|l| l.page_size == page_size) {
            Some(existing) => *existing = entry,
            None => limits.push(entry),
        }
        Ok(())
    }

    pub fn drop_linux_resources_hugepage_limit(&mut self, page_size: &str) {
        if let Some(res) = self.spec.linux.as_mut().and_then(|l| l.resources.as_mut()) {
            res.hugepage_limits.retain(|l| l.page_size != page_size);
        }
    }

    // ========================================================================
    // 网络
    // ========================================================================

    pub fn set_linux_resources_network_class_id(&mut self, class_id: u32) {
        self.network_mut().class_id = Some(class_id);
    }

    /// 设置网卡优先级，同名已存在时替换
    pub fn add_linux_resources_network_priority(
        &mut self,
        name: &str,
        priority: u32,
    ) -> Result<()> {
        if name.is_empty() {
            return Err(self.reject(ParseError::malformed(
                "network priority",
                name,
                "empty interface name",
            )));
        }

        let entry = LinuxInterfacePriority {
            name: name.to_string(),
            priority,
        };
        let priorities = &mut self.network_mut().priorities;
        match priorities.iter_mut().find(|p| p.name == name) {
            Some(existing) => *existing = entry,
            None => priorities.push(entry),
        }
        Ok(())
    }

    pub fn drop_linux_resources_network_priority(&mut self, name: &str) {
        if let Some(net) = self
            .spec
            .linux
            .as_mut()
            .and_then(|l| l.resources.as_mut())
            .and_then(|r| r.network.as_mut())
        {
            net.priorities.retain(|p| p.name != name);
        }
    }

    // ========================================================================
    // 设备 cgroup
    // ========================================================================

    /// 追加设备 cgroup 规则
    ///
    /// `typ` 为 `a`、`b`、`c` 之一，`access` 为 `rwm` 的子集。
    pub fn add_linux_resources_device(
        &mut self,
        allow: bool,
        typ: &str,
        major: Option<i64>,
        minor: Option<i64>,
        access: &str,
    ) -> Result<()> {
        if !matches!(typ, "a" | "b" | "c") {
            return Err(self.reject(ParseError::unrecognized("device cgroup type", typ)));
        }
        if access.is_empty() || !access.chars().all(|c| matches!(c, 'r' | 'w' | 'm')) {
            return Err(self.reject(ParseError::malformed(
                "device cgroup access",
                access,
                "expected a subset of rwm",
            )));
        }

        self.resources_mut().devices.push(LinuxDeviceCgroup {
            allow,
            typ: typ.to_string(),
            major,
            minor,
            access: access.to_string(),
        });
        Ok(())
    }

    pub fn clear_linux_resources_devices(&mut self) {
        if let Some(res) = self.spec.linux.as_mut().and_then(|l| l.resources.as_mut()) {
            res.devices.clear();
        }
    }
}

fn throttle_list(bio: &mut LinuxBlockIo, throttle: Throttle) -> &mut Vec<LinuxThrottleDevice> {
    match throttle {
        Throttle::ReadBps => &mut bio.throttle_read_bps_device,
        Throttle::WriteBps => &mut bio.throttle_write_bps_device,
        Throttle::ReadIops => &mut bio.throttle_read_iops_device,
        Throttle::WriteIops => &mut bio.throttle_write_iops_device,
    }
}
