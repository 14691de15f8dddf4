//! # Labeler Core
//!
//! 标注系统的核心模块，提供基础数据结构、错误定义、远程网关接口和通用工具。

pub mod error;
pub mod gateway;
pub mod models;
pub mod utils;

pub use error::{LabelerError, Result};
pub use gateway::{
    Frame, PatientRecord, PatientStudyData, RemoteGateway, SessionSnapshot, StudyFrames,
    StudyRecord,
};
pub use models::*;
