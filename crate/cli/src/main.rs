//! # Runcell Tool CLI
//!
//! OCI bundle 配置工具：生成、校验，以及用外部运行时做生命周期测试

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use slog::{Drain, Logger, o};

mod config;
mod generate_cmd;
mod runtime_cmd;
mod validate_cmd;

use config::ToolConfig;
use generate_cmd::GenerateArgs;
use runtime_cmd::RuntimeTestArgs;
use validate_cmd::ValidateArgs;

/// Runcell Tool - OCI bundle 配置工具
#[derive(Parser)]
#[command(name = "runcell-tool")]
#[command(about = "OCI bundle 配置生成与校验工具", long_about = None)]
struct Cli {
    /// 启用详细日志
    #[arg(short, long, global = true)]
    verbose: bool,

    /// 配置文件路径
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 生成 bundle 配置
    #[command(visible_alias = "gen")]
    Generate(Box<GenerateArgs>),

    /// 校验 bundle
    Validate(ValidateArgs),

    /// 用外部运行时测试 bundle 的生命周期
    RuntimeTest(RuntimeTestArgs),
}

/// 解析日志级别名称
fn parse_level(name: &str) -> Option<slog::Level> {
    match name {
        "trace" => Some(slog::Level::Trace),
        "debug" => Some(slog::Level::Debug),
        "info" => Some(slog::Level::Info),
        "warn" | "warning" => Some(slog::Level::Warning),
        "error" => Some(slog::Level::Error),
        "critical" => Some(slog::Level::Critical),
        _ => None,
    }
}

/// 优先级：-v/--verbose 标志 > RUNCELL_LOG 环境变量 > 配置文件 > 默认 warn
fn log_level(verbose: bool, env: Option<&str>, config: Option<&str>) -> slog::Level {
    if verbose {
        return slog::Level::Debug;
    }
    env.and_then(parse_level)
        .or_else(|| config.and_then(parse_level))
        .unwrap_or(slog::Level::Warning)
}

fn setup_logger(level: slog::Level) -> Logger {
    let decorator = slog_term::TermDecorator::new().stderr().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    Logger::root(
        drain.filter_level(level).fuse(),
        o!("version" => env!("CARGO_PKG_VERSION")),
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ToolConfig::load(cli.config.as_deref())?;

    let env_level = std::env::var("RUNCELL_LOG").ok();
    let level = log_level(
        cli.verbose,
        env_level.as_deref(),
        config.log_level.as_deref(),
    );
    let logger = setup_logger(level);
    let _guard = slog_scope::set_global_logger(logger.clone());

    slog::info!(logger, "Runcell tool starting"; "command" => format!("{:?}", cli.command));

    match &cli.command {
        Commands::Generate(args) => {
            generate_cmd::handle_generate(args, config.host_specific, &logger)?;
        }
        Commands::Validate(args) => {
            validate_cmd::handle_validate(
                args,
                config.host_specific,
                config.compliance_level.as_deref(),
                &logger,
            )?;
        }
        Commands::RuntimeTest(args) => {
            runtime_cmd::handle_runtime_test(
                args,
                config.runtime.as_deref(),
                config.runtime_timeout_secs,
                &logger,
            )
            .await?;
        }
    }

    slog::info!(logger, "Command completed successfully");

    Ok(())
}
