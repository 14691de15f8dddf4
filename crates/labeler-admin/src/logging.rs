//! 日志初始化
//!
//! 基于 tracing-subscriber 的 EnvFilter，支持 text 和 json 两种输出格式。
//! 日志写到 stderr，stdout 留给交互界面。

use crate::config::LoggingConfig;
use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

/// 构建日志过滤器，`RUST_LOG` 优先于配置中的级别
pub fn build_filter(level: &str) -> Result<EnvFilter> {
    let directives = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(from_env) if !from_env.trim().is_empty() => from_env,
        _ => level.to_string(),
    };

    EnvFilter::try_new(&directives).with_context(|| format!("Invalid log filter: {}", directives))
}

/// 安装全局日志订阅器
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = build_filter(&config.level)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let installed = match config.format.as_str() {
        "json" => builder.json().try_init(),
        _ => builder.try_init(),
    };

    installed.map_err(|e| anyhow::anyhow!("Failed to install log subscriber: {}", e))?;
    tracing::debug!("Logging initialized with format {}", config.format);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filter_accepts_directives() {
        assert!(build_filter("debug").is_ok());
        assert!(build_filter("info,labeler_workflow=trace").is_ok());
    }

    #[test]
    fn test_second_init_fails() {
        let config = LoggingConfig::default();
        let _ = init_logging(&config);

        // 全局订阅器只能安装一次
        assert!(init_logging(&config).is_err());
    }
}
