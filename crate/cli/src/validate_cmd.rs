//! validate 命令实现

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Args;
use slog::Logger;
use validate::{Level, Validator, Violations};

/// 校验 bundle
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// bundle 目录
    #[arg(long, default_value = ".")]
    pub path: PathBuf,

    /// 额外比对当前主机（平台、能力、设备节点）
    #[arg(long)]
    pub host_specific: bool,

    /// 达到该级别的违例视为错误，低于该级别的只提示
    #[arg(long, value_name = "LEVEL")]
    pub compliance_level: Option<String>,
}

/// 处理 validate 命令
pub fn handle_validate(
    args: &ValidateArgs,
    host_specific: bool,
    default_level: Option<&str>,
    logger: &Logger,
) -> Result<()> {
    let level = compliance_level(args.compliance_level.as_deref().or(default_level))?;
    let host_specific = host_specific || args.host_specific;

    slog::info!(logger, "validate bundle";
        "path" => args.path.display().to_string(),
        "host_specific" => host_specific,
        "compliance_level" => level.as_str());

    let violations = Validator::from_bundle(&args.path, host_specific)
        .and_then(|v| v.validate())
        .with_context(|| format!("failed to validate bundle {}", args.path.display()))?;

    let errors = report(&violations, level);
    if errors > 0 {
        bail!(
            "{} violation(s) at or above {} found in {}",
            errors,
            level,
            args.path.display()
        );
    }

    println!("Bundle validation succeeded.");
    Ok(())
}

fn compliance_level(input: Option<&str>) -> Result<Level> {
    match input {
        Some(s) => s
            .parse()
            .with_context(|| format!("invalid compliance level {:?}", s)),
        None => Ok(Level::Must),
    }
}

/// 输出全部违例，返回达到合规级别的数量
fn report(violations: &Violations, level: Level) -> usize {
    let mut errors = 0;
    for v in violations {
        if v.level.severity() >= level.severity() {
            errors += 1;
            eprintln!("error: {}", v);
        } else {
            eprintln!("warning: {}", v);
        }
    }
    errors
}
