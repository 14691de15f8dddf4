//! 数据存储
//!
//! 会话内所有患者和检查的内存索引。只能经由工作队列修改，
//! 而工作队列只归标注控制器所有。

use labeler_core::{
    Label, LabelerError, Patient, PatientStudyData, Result, SessionSnapshot, Study,
};
use std::collections::HashMap;
use tracing::{debug, warn};

/// 患者与检查的内存索引
#[derive(Debug, Clone, Default)]
pub struct DataStore {
    /// 按扫描顺序排列的患者
    patients: Vec<Patient>,
    /// patient_id -> 在 patients 中的位置
    index: HashMap<String, usize>,
}

impl DataStore {
    /// 创建空存储
    pub fn new() -> Self {
        Self::default()
    }

    /// 从会话快照构建
    ///
    /// 同名患者合并，同一患者内重复的检查名只保留第一次出现。
    pub fn from_snapshot(snapshot: &SessionSnapshot) -> Self {
        let mut store = Self::new();

        for record in &snapshot.patients {
            let position = match store.index.get(&record.patient_name) {
                Some(&position) => position,
                None => {
                    store.patients.push(Patient::new(record.patient_name.clone()));
                    let position = store.patients.len() - 1;
                    store.index.insert(record.patient_name.clone(), position);
                    position
                }
            };

            let patient = &mut store.patients[position];
            for dicom in &record.dicoms {
                if patient.study(&dicom.dicom_name).is_some() {
                    warn!(
                        "Duplicate study {}/{} in snapshot, keeping first occurrence",
                        record.patient_name, dicom.dicom_name
                    );
                    continue;
                }

                let mut study = Study::new(&record.patient_name, &dicom.dicom_name, dicom.label);
                study.frame_count = dicom.frame_count;
                patient.studies.push(study);
            }
        }

        debug!(
            "Data store built with {} patients and {} studies",
            store.patients.len(),
            store.total_studies()
        );
        store
    }

    pub fn is_empty(&self) -> bool {
        self.patients.is_empty()
    }

    pub fn patient_count(&self) -> usize {
        self.patients.len()
    }

    /// 检查总数
    pub fn total_studies(&self) -> usize {
        self.patients.iter().map(|p| p.studies.len()).sum()
    }

    /// 已标注检查数
    pub fn labeled_count(&self) -> usize {
        self.patients.iter().map(Patient::labeled_count).sum()
    }

    pub fn patients(&self) -> &[Patient] {
        &self.patients
    }

    pub fn patient(&self, patient_id: &str) -> Option<&Patient> {
        self.index.get(patient_id).map(|&i| &self.patients[i])
    }

    pub fn patient_at(&self, position: usize) -> Option<&Patient> {
        self.patients.get(position)
    }

    pub fn patient_position(&self, patient_id: &str) -> Option<usize> {
        self.index.get(patient_id).copied()
    }

    /// 按扫描顺序列出所有患者ID
    pub fn patient_ids(&self) -> Vec<String> {
        self.patients.iter().map(|p| p.patient_id.clone()).collect()
    }

    pub fn study(&self, patient_id: &str, study_id: &str) -> Option<&Study> {
        self.patient(patient_id).and_then(|p| p.study(study_id))
    }

    /// 更新检查标签，返回原标签
    pub(crate) fn set_label(&mut self, patient_id: &str, study_id: &str, label: Label) -> Result<Label> {
        let study = self
            .index
            .get(patient_id)
            .and_then(|&i| self.patients[i].study_mut(study_id))
            .ok_or_else(|| LabelerError::NotFound(format!("Study {}/{}", patient_id, study_id)))?;

        let previous = study.label;
        study.label = label;
        Ok(previous)
    }

    /// 把所有检查的标签重置为 0
    pub(crate) fn reset_labels(&mut self) {
        for study in self.patients.iter_mut().flat_map(|p| p.studies.iter_mut()) {
            study.label = Label::UNLABELED;
        }
    }

    /// 安装某患者的影像帧
    ///
    /// 先校验并组装全部帧，再一次性写入，失败时存储保持不变。
    /// 返回写入了帧的检查数。
    pub(crate) fn install_frames(&mut self, patient_id: &str, data: PatientStudyData) -> Result<usize> {
        if data.patient_name != patient_id {
            return Err(LabelerError::Gateway(format!(
                "Requested frames for patient {} but received {}",
                patient_id, data.patient_name
            )));
        }

        let position = self
            .patient_position(patient_id)
            .ok_or_else(|| LabelerError::NotFound(format!("Patient {}", patient_id)))?;
        let patient = &self.patients[position];

        let mut staged = Vec::with_capacity(data.dicoms.len());
        for dicom in data.dicoms {
            if let Some(error) = &dicom.error {
                warn!("Study {}/{} could not be decoded: {}", patient_id, dicom.dicom_name, error);
            }
            match patient.study_position(&dicom.dicom_name) {
                Some(study_position) => staged.push((study_position, dicom.images)),
                None => debug!("Ignoring frames for unknown study {}/{}", patient_id, dicom.dicom_name),
            }
        }

        let installed = staged.len();
        let patient = &mut self.patients[position];
        for (study_position, frames) in staged {
            patient.studies[study_position].frames = Some(frames);
        }

        Ok(installed)
    }
}
