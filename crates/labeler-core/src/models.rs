//! 核心数据模型定义

use crate::error::{LabelerError, Result};
use crate::gateway::Frame;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 检查标签
///
/// 0 表示未标注，1-5 为标注类别。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Label(u8);

impl Label {
    /// 未标注
    pub const UNLABELED: Label = Label(0);
    /// 最大标注类别
    pub const MAX: u8 = 5;

    /// 创建标签，超出 0..=5 范围时返回错误
    pub fn new(value: u8) -> Result<Self> {
        if value <= Self::MAX {
            Ok(Self(value))
        } else {
            Err(LabelerError::InvalidLabel(value))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// 是否已标注 (label != 0)
    pub fn is_labeled(self) -> bool {
        self.0 != 0
    }
}

impl TryFrom<u8> for Label {
    type Error = LabelerError;

    fn try_from(value: u8) -> Result<Self> {
        Label::new(value)
    }
}

impl From<Label> for u8 {
    fn from(label: Label) -> u8 {
        label.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 检查 (一个待标注的 DICOM)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Study {
    pub patient_id: String,
    pub study_id: String,
    pub label: Label,
    pub frame_count: u32,
    /// 影像帧，按需加载
    pub frames: Option<Vec<Frame>>,
}

impl Study {
    pub fn new(patient_id: impl Into<String>, study_id: impl Into<String>, label: Label) -> Self {
        Self {
            patient_id: patient_id.into(),
            study_id: study_id.into(),
            label,
            frame_count: 0,
            frames: None,
        }
    }

    pub fn is_labeled(&self) -> bool {
        self.label.is_labeled()
    }

    pub fn key(&self) -> QueueItem {
        QueueItem::new(self.patient_id.clone(), self.study_id.clone())
    }
}

/// 患者，按扫描顺序持有其检查
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub patient_id: String,
    pub studies: Vec<Study>,
}

impl Patient {
    pub fn new(patient_id: impl Into<String>) -> Self {
        Self {
            patient_id: patient_id.into(),
            studies: Vec::new(),
        }
    }

    pub fn study(&self, study_id: &str) -> Option<&Study> {
        self.studies.iter().find(|s| s.study_id == study_id)
    }

    pub fn study_mut(&mut self, study_id: &str) -> Option<&mut Study> {
        self.studies.iter_mut().find(|s| s.study_id == study_id)
    }

    pub fn study_position(&self, study_id: &str) -> Option<usize> {
        self.studies.iter().position(|s| s.study_id == study_id)
    }

    /// 所有检查均已标注。没有检查的患者不算完成。
    pub fn is_fully_labeled(&self) -> bool {
        !self.studies.is_empty() && self.studies.iter().all(Study::is_labeled)
    }

    pub fn labeled_count(&self) -> usize {
        self.studies.iter().filter(|s| s.is_labeled()).count()
    }
}

/// 工作队列项: 指向一个检查的 (patient_id, study_id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueItem {
    pub patient_id: String,
    pub study_id: String,
}

impl QueueItem {
    pub fn new(patient_id: impl Into<String>, study_id: impl Into<String>) -> Self {
        Self {
            patient_id: patient_id.into(),
            study_id: study_id.into(),
        }
    }

    pub fn matches(&self, patient_id: &str, study_id: &str) -> bool {
        self.patient_id == patient_id && self.study_id == study_id
    }
}

impl fmt::Display for QueueItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.patient_id, self.study_id)
    }
}

/// 优先级调整的结果
///
/// `Queued` 是真实的队列成员 (未标注)；`Suggested` 只是可供显示的检查，
/// 不属于队列，调用方不能把它当作队列成员处理。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextStudy {
    Queued(QueueItem),
    Suggested(QueueItem),
}

impl NextStudy {
    pub fn item(&self) -> &QueueItem {
        match self {
            NextStudy::Queued(item) | NextStudy::Suggested(item) => item,
        }
    }

    pub fn into_item(self) -> QueueItem {
        match self {
            NextStudy::Queued(item) | NextStudy::Suggested(item) => item,
        }
    }

    pub fn is_queued(&self) -> bool {
        matches!(self, NextStudy::Queued(_))
    }
}

/// 标注操作记录 (撤销栈元素)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelAction {
    pub patient_id: String,
    pub study_id: String,
    pub previous_label: Label,
    pub new_label: Label,
    pub applied_at: DateTime<Utc>,
}

impl LabelAction {
    pub fn new(study: &Study, new_label: Label) -> Self {
        Self {
            patient_id: study.patient_id.clone(),
            study_id: study.study_id.clone(),
            previous_label: study.label,
            new_label,
            applied_at: Utc::now(),
        }
    }

    pub fn key(&self) -> QueueItem {
        QueueItem::new(self.patient_id.clone(), self.study_id.clone())
    }
}
