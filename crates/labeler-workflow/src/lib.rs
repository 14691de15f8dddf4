//! # 标注工作流模块
//!
//! 提供 DICOM 检查标注的完整工作流，包括：
//! - 数据存储：会话内患者和检查的内存索引
//! - 工作队列：未标注检查的优先级顺序
//! - 控制器状态机：确认延迟与撤销期间的输入串行化
//! - 标注控制器：标注、撤销、导航和重置的协调引擎
//! - 完成检测与标签导出

pub mod completion;
pub mod controller;
pub mod export;
pub mod state_machine;
pub mod store;
pub mod worklist;

// 重新导出主要类型
pub use completion::{CompletionNotice, CompletionTracker};
pub use controller::{
    ApplyOutcome, ControllerSettings, DiscardReport, LabelingController, Navigation,
    PatientProgress, ProgressSummary, Selection, StatusKind, StatusMessage, UndoOutcome,
};
pub use export::{export_labels, export_labels_to_path};
pub use state_machine::{ControllerEvent, ControllerState, LabelingStateMachine};
pub use store::DataStore;
pub use worklist::WorkQueue;
