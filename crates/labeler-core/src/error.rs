//! 错误定义模块

use thiserror::Error;

/// 标注系统统一错误类型
#[derive(Error, Debug)]
pub enum LabelerError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("远程网关错误: {0}")]
    Gateway(String),

    #[error("远程网关返回状态 {status}: {detail}")]
    GatewayStatus { status: u16, detail: String },

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("无效标签: {0}")]
    InvalidLabel(u8),

    #[error("验证错误: {0}")]
    Validation(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("无效状态转换: 从 {from} 到 {event}")]
    InvalidStateTransition { from: String, event: String },
}

impl LabelerError {
    /// 是否为远程调用产生的错误
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Gateway(_) | Self::GatewayStatus { .. })
    }
}

/// 标注系统统一结果类型
pub type Result<T> = std::result::Result<T, LabelerError>;
