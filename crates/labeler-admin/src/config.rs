//! 配置管理
//!
//! 内置默认值、可选配置文件和 `LABELER` 前缀环境变量三层叠加，
//! 例如 `LABELER_GATEWAY__BASE_URL` 覆盖 `gateway.base_url`。

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info};

/// 标注系统完整配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelerConfig {
    /// 远程网关配置
    pub gateway: GatewayConfig,
    /// 工作流配置
    pub workflow: WorkflowConfig,
    /// 日志配置
    pub logging: LoggingConfig,
}

/// 远程网关配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// 后端地址
    pub base_url: String,
    /// 请求超时时间 (秒)
    pub request_timeout_secs: u64,
    /// 默认用户名
    pub user: Option<String>,
}

/// 工作流配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// 标注后的确认延迟 (毫秒)
    pub settle_delay_ms: u64,
    /// 状态提示显示时长 (毫秒)
    pub status_display_ms: u64,
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别或 EnvFilter 指令
    pub level: String,
    /// 日志格式: text 或 json
    pub format: String,
}

impl GatewayConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl WorkflowConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn status_display(&self) -> Duration {
        Duration::from_millis(self.status_display_ms)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            request_timeout_secs: 30,
            user: None,
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 400,
            status_display_ms: 3000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

/// 配置管理器
#[derive(Debug)]
pub struct ConfigManager {
    /// 配置数据
    config: Arc<RwLock<LabelerConfig>>,
    /// 配置验证器
    validator: ConfigValidator,
}

impl ConfigManager {
    /// 加载并验证配置
    pub fn new(config_path: Option<&Path>) -> Result<Self> {
        let config = Self::load_config(config_path)?;
        let validator = ConfigValidator::new();
        validator.validate(&config)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            validator,
        })
    }

    /// 从默认值、文件和环境变量加载配置
    fn load_config(config_path: Option<&Path>) -> Result<LabelerConfig> {
        let defaults = Config::try_from(&LabelerConfig::default())
            .context("Failed to build default configuration")?;

        let mut builder = Config::builder().add_source(defaults);
        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path));
        }

        let settings = builder
            .add_source(
                Environment::with_prefix("LABELER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration sources")?;

        let config: LabelerConfig = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        match config_path {
            Some(path) => info!("Configuration loaded from: {}", path.display()),
            None => info!("Configuration loaded from defaults and environment"),
        }
        Ok(config)
    }

    /// 获取配置
    pub async fn get_config(&self) -> LabelerConfig {
        self.config.read().await.clone()
    }

    /// 验证并替换配置
    pub async fn update_config(&self, new_config: LabelerConfig) -> Result<()> {
        self.validator.validate(&new_config)?;
        *self.config.write().await = new_config;
        info!("Configuration updated successfully");
        Ok(())
    }

    /// 把当前配置写入文件
    pub async fn save_config(&self, path: &Path) -> Result<()> {
        let config = self.config.read().await;
        let config_str =
            toml::to_string_pretty(&*config).context("Failed to serialize configuration")?;

        tokio::fs::write(path, config_str)
            .await
            .context("Failed to write configuration file")?;

        info!("Configuration saved to: {}", path.display());
        Ok(())
    }
}

/// 配置验证器
#[derive(Debug)]
pub struct ConfigValidator {
    /// 验证规则
    validation_rules: Vec<ValidationRule>,
}

/// 验证规则
#[derive(Debug)]
struct ValidationRule {
    /// 字段路径
    field_path: &'static str,
    /// 验证函数
    validator: fn(&LabelerConfig) -> Result<()>,
    /// 错误消息
    error_message: &'static str,
}

impl ConfigValidator {
    /// 创建新的配置验证器
    pub fn new() -> Self {
        let validation_rules = vec![
            ValidationRule {
                field_path: "gateway.base_url",
                validator: |config| {
                    let url = config.gateway.base_url.trim();
                    if url.is_empty() {
                        Err(anyhow::anyhow!("Base URL cannot be empty"))
                    } else if !(url.starts_with("http://") || url.starts_with("https://")) {
                        Err(anyhow::anyhow!("Base URL must use http or https: {}", url))
                    } else {
                        Ok(())
                    }
                },
                error_message: "Invalid gateway base URL",
            },
            ValidationRule {
                field_path: "gateway.request_timeout_secs",
                validator: |config| {
                    if config.gateway.request_timeout_secs == 0 {
                        Err(anyhow::anyhow!("Request timeout cannot be 0"))
                    } else {
                        Ok(())
                    }
                },
                error_message: "Invalid gateway request timeout",
            },
            ValidationRule {
                field_path: "workflow.settle_delay_ms",
                validator: |config| {
                    if config.workflow.settle_delay_ms == 0 {
                        Err(anyhow::anyhow!("Settle delay must be positive"))
                    } else {
                        Ok(())
                    }
                },
                error_message: "Invalid settle delay",
            },
            ValidationRule {
                field_path: "logging.format",
                validator: |config| match config.logging.format.as_str() {
                    "text" | "json" => Ok(()),
                    other => Err(anyhow::anyhow!("Unknown log format: {}", other)),
                },
                error_message: "Invalid logging format",
            },
        ];

        Self { validation_rules }
    }

    /// 验证配置
    pub fn validate(&self, config: &LabelerConfig) -> Result<()> {
        for rule in &self.validation_rules {
            if let Err(e) = (rule.validator)(config) {
                error!("Configuration validation failed for {}: {}", rule.field_path, e);
                return Err(anyhow::anyhow!("{}: {}", rule.error_message, e));
            }
        }

        Ok(())
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = LabelerConfig::default();
        assert!(ConfigValidator::new().validate(&config).is_ok());
        assert_eq!(config.workflow.settle_delay(), Duration::from_millis(400));
        assert_eq!(config.workflow.status_display(), Duration::from_secs(3));
    }

    #[test]
    fn test_validation_rules() {
        let validator = ConfigValidator::new();

        let mut config = LabelerConfig::default();
        config.gateway.base_url = "  ".to_string();
        assert!(validator.validate(&config).is_err());

        let mut config = LabelerConfig::default();
        config.workflow.settle_delay_ms = 0;
        assert!(validator.validate(&config).is_err());

        let mut config = LabelerConfig::default();
        config.logging.format = "xml".to_string();
        assert!(validator.validate(&config).is_err());
    }

    #[tokio::test]
    async fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[gateway]\nbase_url = \"http://labeler.example:9000\"\nuser = \"alice\"").unwrap();

        let manager = ConfigManager::new(Some(file.path())).unwrap();
        let config = manager.get_config().await;

        assert_eq!(config.gateway.base_url, "http://labeler.example:9000");
        assert_eq!(config.gateway.user.as_deref(), Some("alice"));
        assert_eq!(config.workflow.settle_delay_ms, 400);
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[workflow]\nsettle_delay_ms = 0").unwrap();

        assert!(ConfigManager::new(Some(file.path())).is_err());
    }

    #[tokio::test]
    async fn test_saved_file_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labeler.toml");

        let manager = ConfigManager::new(None).unwrap();
        let mut config = manager.get_config().await;
        config.workflow.status_display_ms = 5000;
        config.gateway.user = Some("bob".to_string());
        manager.update_config(config.clone()).await.unwrap();
        manager.save_config(&path).await.unwrap();

        let loaded = ConfigManager::new(Some(&path)).unwrap();
        assert_eq!(loaded.get_config().await, config);
    }

    #[tokio::test]
    async fn test_update_rejects_invalid_config() {
        let manager = ConfigManager::new(None).unwrap();
        let mut config = manager.get_config().await;
        config.gateway.base_url = "ftp://labeler".to_string();

        assert!(manager.update_config(config).await.is_err());
        assert_eq!(manager.get_config().await, LabelerConfig::default());
    }
}
