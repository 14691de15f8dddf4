//! 远程网关接口
//!
//! 标注记录保存在远程存储中，本地模型只是乐观副本。网关负责读取会话快照、
//! 按患者拉取影像帧、提交标签和删除全部数据。

use crate::error::Result;
use crate::models::Label;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// 会话快照: 所有患者及其检查，不含像素数据
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    #[serde(default)]
    pub patients: Vec<PatientRecord>,
}

/// 快照中的患者
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientRecord {
    pub patient_name: String,
    #[serde(default)]
    pub dicoms: Vec<StudyRecord>,
}

/// 快照中的检查
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyRecord {
    pub dicom_name: String,
    #[serde(default)]
    pub label: Label,
    #[serde(default)]
    pub frame_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filepath: Option<String>,
}

impl StudyRecord {
    pub fn new(dicom_name: impl Into<String>, label: Label) -> Self {
        Self {
            dicom_name: dicom_name.into(),
            label,
            frame_count: 0,
            filepath: None,
        }
    }
}

/// 单帧影像引用
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub id: String,
    pub src: String,
}

/// 某患者全部检查的影像数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientStudyData {
    pub patient_name: String,
    #[serde(default)]
    pub dicoms: Vec<StudyFrames>,
}

/// 单个检查的影像帧
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyFrames {
    pub dicom_name: String,
    #[serde(default)]
    pub label: Label,
    #[serde(default)]
    pub images: Vec<Frame>,
    /// 服务端解码失败时的错误描述
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 远程网关
///
/// 所有方法都是无状态的请求/响应调用。`commit_label` 必须是幂等的：
/// 同一个 (patient, study, label) 可能被重复写入。
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// 获取会话快照
    async fn fetch_session_snapshot(&self, user: &str) -> Result<SessionSnapshot>;

    /// 获取某患者所有检查的影像帧
    async fn fetch_study_data(&self, patient_id: &str, user: &str) -> Result<PatientStudyData>;

    /// 提交一个检查的标签
    async fn commit_label(
        &self,
        patient_id: &str,
        study_id: &str,
        label: Label,
        user: &str,
    ) -> Result<()>;

    /// 删除该用户的全部远程数据
    async fn delete_all_data(&self, user: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_wire_format() {
        let json = r#"{
            "patients": [
                {"patientName": "patient_1", "dicoms": [
                    {"dicomName": "a.dcm", "label": 0, "filepath": "/data/a.dcm", "frameCount": 42},
                    {"dicomName": "b.dcm", "label": 3}
                ]}
            ]
        }"#;

        let snapshot: SessionSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.patients.len(), 1);
        let dicoms = &snapshot.patients[0].dicoms;
        assert_eq!(dicoms[0].frame_count, 42);
        assert!(!dicoms[0].label.is_labeled());
        assert_eq!(dicoms[1].label.value(), 3);
        assert_eq!(dicoms[1].frame_count, 0);
    }

    #[test]
    fn test_study_data_with_error() {
        let json = r#"{"patientName": "p", "dicoms": [
            {"dicomName": "x.dcm", "label": 0, "images": [], "error": "bad pixel data"}
        ]}"#;

        let data: PatientStudyData = serde_json::from_str(json).unwrap();
        assert_eq!(data.dicoms[0].error.as_deref(), Some("bad pixel data"));
    }
}
