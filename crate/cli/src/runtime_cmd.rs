//! runtime-test 命令实现
//!
//! 先校验 bundle，再驱动外部 OCI 运行时走完一次生命周期：
//! create → state → start → state → kill → delete。
//! 每一步之后检查 `state` 输出的状态；无论中间哪一步失败，都会尝试 delete。

use std::{path::PathBuf, process::Stdio, time::Duration};

use anyhow::{Context, Result, anyhow, bail};
use clap::Args;
use runtime_spec::{ContainerState, State};
use slog::Logger;
use tokio::process::Command;
use validate::{Level, Validator};

/// 默认运行时
const DEFAULT_RUNTIME: &str = "runc";

/// 单条运行时命令的默认超时
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// 等待容器停止时的轮询间隔
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// 用外部运行时测试 bundle
#[derive(Args, Debug)]
pub struct RuntimeTestArgs {
    /// 运行时可执行文件
    #[arg(long)]
    pub runtime: Option<String>,

    /// bundle 目录
    #[arg(long)]
    pub bundle: PathBuf,

    /// 容器 ID
    #[arg(long)]
    pub id: Option<String>,

    /// 单条运行时命令的超时秒数
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

/// 外部运行时的命令行封装
struct RuntimeClient {
    bin: String,
    timeout: Duration,
    logger: Logger,
}

impl RuntimeClient {
    async fn run(&self, args: &[&str]) -> Result<String> {
        let line = args.join(" ");
        slog::debug!(self.logger, "runtime command"; "args" => &line);

        let mut cmd = Command::new(&self.bin);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| anyhow!("{} {} timed out after {:?}", self.bin, line, self.timeout))?
            .with_context(|| format!("failed to execute {}", self.bin))?;

        if !output.status.success() {
            bail!(
                "{} {} failed ({}): {}",
                self.bin,
                line,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn state(&self, id: &str) -> Result<State> {
        let out = self.run(&["state", id]).await?;
        serde_json::from_str(&out).with_context(|| format!("invalid state output: {}", out.trim()))
    }

    /// 查询状态并检查其属于 `expected`
    async fn expect_state(&self, id: &str, expected: &[ContainerState]) -> Result<State> {
        let state = self.state(id).await?;
        if state.id != id {
            bail!("state reports container {:?}, expected {:?}", state.id, id);
        }
        if !expected.contains(&state.status) {
            bail!(
                "container {} is {}, expected one of {:?}",
                id,
                state.status,
                expected
            );
        }
        slog::info!(self.logger, "container state";
            "id" => id,
            "status" => state.status.to_string());
        Ok(state)
    }

    /// 轮询直到容器停止
    async fn wait_stopped(&self, id: &str) -> Result<()> {
        let deadline = tokio::time::Instant::now() + self.timeout;
        loop {
            if self.state(id).await?.status == ContainerState::Stopped {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                bail!("container {} did not stop within {:?}", id, self.timeout);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn lifecycle(&self, bundle: &str, id: &str) -> Result<()> {
        self.run(&["create", "--bundle", bundle, id]).await?;
        slog::info!(self.logger, "container created"; "id" => id);
        self.expect_state(id, &[ContainerState::Created]).await?;

        self.run(&["start", id]).await?;
        slog::info!(self.logger, "container started"; "id" => id);
        let state = self
            .expect_state(id, &[ContainerState::Running, ContainerState::Stopped])
            .await?;

        if state.status == ContainerState::Running {
            self.run(&["kill", id, "KILL"]).await?;
            slog::info!(self.logger, "container killed"; "id" => id);
        }
        self.wait_stopped(id).await
    }
}

/// 处理 runtime-test 命令
pub async fn handle_runtime_test(
    args: &RuntimeTestArgs,
    default_runtime: Option<&str>,
    default_timeout: Option<u64>,
    logger: &Logger,
) -> Result<()> {
    let violations = Validator::from_bundle(&args.bundle, false)
        .and_then(|v| v.validate())
        .with_context(|| format!("failed to validate bundle {}", args.bundle.display()))?;
    let errors = violations.at_least(Level::Must);
    if !errors.is_empty() {
        for v in &errors {
            eprintln!("error: {}", v);
        }
        bail!("bundle {} is not valid", args.bundle.display());
    }

    let bundle = tokio::fs::canonicalize(&args.bundle)
        .await
        .with_context(|| format!("failed to resolve bundle {}", args.bundle.display()))?;
    let bundle = bundle.display().to_string();
    let id = args
        .id
        .clone()
        .unwrap_or_else(|| format!("runcell-tool-{}", std::process::id()));

    let client = RuntimeClient {
        bin: args
            .runtime
            .clone()
            .or_else(|| default_runtime.map(str::to_string))
            .unwrap_or_else(|| DEFAULT_RUNTIME.to_string()),
        timeout: Duration::from_secs(
            args.timeout
                .or(default_timeout)
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        ),
        logger: logger.new(slog::o!("runtime-test" => id.clone())),
    };

    slog::info!(logger, "runtime test starting";
        "runtime" => &client.bin,
        "bundle" => &bundle,
        "id" => &id);

    let result = client.lifecycle(&bundle, &id).await;
    if result.is_err() {
        // 失败时容器可能仍在运行
        let _ = client.run(&["kill", &id, "KILL"]).await;
    }
    let cleanup = client.run(&["delete", &id]).await;

    result?;
    cleanup.context("failed to delete container")?;
    println!("Runtime test of {} succeeded.", id);
    Ok(())
}
