//! 内存远程网关
//!
//! 在进程内保存会话数据，行为与 HTTP 后端一致。支持人为延迟和故障注入，
//! 用于离线演示和控制器测试。

use async_trait::async_trait;
use labeler_core::{
    Frame, Label, LabelerError, PatientRecord, PatientStudyData, RemoteGateway, Result,
    SessionSnapshot, StudyFrames, StudyRecord,
};
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

/// 一次成功的标签提交
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub patient_id: String,
    pub study_id: String,
    pub label: Label,
    pub user: String,
}

#[derive(Debug, Default)]
struct MemoryState {
    patients: Vec<PatientRecord>,
    commits: Vec<CommitRecord>,
    fetches: Vec<String>,
    deletions: usize,
    fail_snapshot: bool,
    fail_commits: bool,
    fail_delete: bool,
    failing_patients: HashSet<String>,
}

/// 内存网关
#[derive(Debug, Default)]
pub struct InMemoryGateway {
    state: Mutex<MemoryState>,
    latency: Option<Duration>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: SessionSnapshot) -> Self {
        let gateway = Self::new();
        gateway.state().patients = snapshot.patients;
        gateway
    }

    /// 添加患者及其检查 `(名称, 标签)`，超出范围的标签按 0 处理
    pub fn with_patient(self, patient_name: &str, studies: &[(&str, u8)]) -> Self {
        let dicoms = studies
            .iter()
            .map(|(name, value)| {
                let label = Label::new(*value).unwrap_or_else(|e| {
                    warn!("{}, treating {}/{} as unlabeled", e, patient_name, name);
                    Label::UNLABELED
                });
                let mut record = StudyRecord::new(*name, label);
                record.frame_count = 2;
                record
            })
            .collect();

        self.state().patients.push(PatientRecord {
            patient_name: patient_name.to_string(),
            dicoms,
        });
        self
    }

    /// 每次调用前的人为延迟
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn set_fail_snapshot(&self, fail: bool) {
        self.state().fail_snapshot = fail;
    }

    pub fn set_fail_commits(&self, fail: bool) {
        self.state().fail_commits = fail;
    }

    pub fn set_fail_delete(&self, fail: bool) {
        self.state().fail_delete = fail;
    }

    /// 让某患者的影像获取失败
    pub fn fail_fetch_for(&self, patient_name: &str) {
        self.state().failing_patients.insert(patient_name.to_string());
    }

    pub fn clear_failures(&self) {
        let mut state = self.state();
        state.fail_snapshot = false;
        state.fail_commits = false;
        state.fail_delete = false;
        state.failing_patients.clear();
    }

    /// 按到达顺序列出成功的提交
    pub fn commits(&self) -> Vec<CommitRecord> {
        self.state().commits.clone()
    }

    /// 按请求顺序列出影像获取的患者
    pub fn fetches(&self) -> Vec<String> {
        self.state().fetches.clone()
    }

    pub fn deletions(&self) -> usize {
        self.state().deletions
    }

    /// 远程保存的标签
    pub fn label_of(&self, patient_name: &str, dicom_name: &str) -> Option<Label> {
        self.state()
            .patients
            .iter()
            .filter(|p| p.patient_name == patient_name)
            .flat_map(|p| p.dicoms.iter())
            .find(|d| d.dicom_name == dicom_name)
            .map(|d| d.label)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            patients: self.state().patients.clone(),
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

fn frames_for(patient_name: &str, record: &StudyRecord) -> Vec<Frame> {
    (1..=record.frame_count.max(1))
        .map(|i| Frame {
            id: format!("{}-{}", record.dicom_name, i),
            src: format!("memory://{}/{}/{}", patient_name, record.dicom_name, i),
        })
        .collect()
}

#[async_trait]
impl RemoteGateway for InMemoryGateway {
    async fn fetch_session_snapshot(&self, user: &str) -> Result<SessionSnapshot> {
        self.delay().await;
        let state = self.state();
        if state.fail_snapshot {
            return Err(LabelerError::GatewayStatus {
                status: 503,
                detail: "Service unavailable".to_string(),
            });
        }

        debug!("Serving snapshot of {} patients to {}", state.patients.len(), user);
        Ok(SessionSnapshot {
            patients: state.patients.clone(),
        })
    }

    async fn fetch_study_data(&self, patient_id: &str, _user: &str) -> Result<PatientStudyData> {
        self.delay().await;
        let mut state = self.state();
        state.fetches.push(patient_id.to_string());

        if state.failing_patients.contains(patient_id) {
            return Err(LabelerError::GatewayStatus {
                status: 500,
                detail: format!("Failed to read DICOMs for patient: {}", patient_id),
            });
        }

        let dicoms: Vec<StudyFrames> = state
            .patients
            .iter()
            .filter(|p| p.patient_name == patient_id)
            .flat_map(|p| p.dicoms.iter())
            .map(|record| StudyFrames {
                dicom_name: record.dicom_name.clone(),
                label: record.label,
                images: frames_for(patient_id, record),
                error: None,
            })
            .collect();

        if dicoms.is_empty() {
            return Err(LabelerError::GatewayStatus {
                status: 404,
                detail: format!("No DICOMs found for patient: {}", patient_id),
            });
        }

        Ok(PatientStudyData {
            patient_name: patient_id.to_string(),
            dicoms,
        })
    }

    async fn commit_label(
        &self,
        patient_id: &str,
        study_id: &str,
        label: Label,
        user: &str,
    ) -> Result<()> {
        self.delay().await;
        let mut state = self.state();
        if state.fail_commits {
            return Err(LabelerError::Gateway("connection refused".to_string()));
        }

        let record = state
            .patients
            .iter_mut()
            .filter(|p| p.patient_name == patient_id)
            .flat_map(|p| p.dicoms.iter_mut())
            .find(|d| d.dicom_name == study_id)
            .ok_or_else(|| {
                LabelerError::Gateway(format!("Unknown study {}/{}", patient_id, study_id))
            })?;
        record.label = label;

        state.commits.push(CommitRecord {
            patient_id: patient_id.to_string(),
            study_id: study_id.to_string(),
            label,
            user: user.to_string(),
        });
        Ok(())
    }

    async fn delete_all_data(&self, user: &str) -> Result<()> {
        self.delay().await;
        let mut state = self.state();
        if state.fail_delete {
            return Err(LabelerError::GatewayStatus {
                status: 500,
                detail: "Failed to delete data".to_string(),
            });
        }

        debug!("Deleting all data for {}", user);
        state.patients.clear();
        state.deletions += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_commit_updates_stored_label() {
        let gateway = InMemoryGateway::new().with_patient("P1", &[("S1", 0)]);

        gateway
            .commit_label("P1", "S1", Label::new(4).unwrap(), "alice")
            .await
            .unwrap();

        assert_eq!(gateway.label_of("P1", "S1"), Some(Label::new(4).unwrap()));
        assert_eq!(gateway.commits()[0].user, "alice");
        assert!(gateway
            .commit_label("P1", "ghost", Label::new(1).unwrap(), "alice")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_fetch_study_data_frames() {
        let gateway = InMemoryGateway::new().with_patient("P1", &[("S1", 2), ("S2", 0)]);

        let data = gateway.fetch_study_data("P1", "alice").await.unwrap();
        assert_eq!(data.dicoms.len(), 2);
        assert_eq!(data.dicoms[0].images[0].id, "S1-1");
        assert_eq!(data.dicoms[0].images.len(), 2);

        let missing = gateway.fetch_study_data("P9", "alice").await;
        assert!(matches!(missing, Err(LabelerError::GatewayStatus { status: 404, .. })));
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let gateway = InMemoryGateway::new().with_patient("P1", &[("S1", 0)]);
        gateway.set_fail_commits(true);
        gateway.fail_fetch_for("P1");

        assert!(gateway
            .commit_label("P1", "S1", Label::new(1).unwrap(), "alice")
            .await
            .is_err());
        assert!(gateway.fetch_study_data("P1", "alice").await.is_err());
        assert!(gateway.commits().is_empty());

        gateway.clear_failures();
        assert!(gateway.fetch_study_data("P1", "alice").await.is_ok());
        assert_eq!(gateway.fetches().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_all_data() {
        let gateway = InMemoryGateway::new().with_patient("P1", &[("S1", 3)]);
        gateway.delete_all_data("alice").await.unwrap();

        assert!(gateway.snapshot().patients.is_empty());
        assert_eq!(gateway.deletions(), 1);
    }
}
