//! # 标注集成模块
//!
//! 提供远程网关的实现：
//! - HTTP网关，对接标注后端的 REST 接口
//! - 内存网关，用于离线演示和测试，支持故障注入

pub mod http;
pub mod memory;

pub use http::{HttpGateway, HttpGatewayConfig};
pub use memory::{CommitRecord, InMemoryGateway};
