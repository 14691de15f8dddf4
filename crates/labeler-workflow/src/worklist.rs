//! 工作队列管理
//!
//! 维护所有未标注检查的优先级顺序。队列成员与 `label == 0` 一一对应，
//! 默认顺序为扫描顺序，只有 "提到最前" 的操作会改变它，且不会打乱未涉及项的相对顺序。

use crate::store::DataStore;
use labeler_core::{Label, LabelerError, NextStudy, QueueItem, Result, SessionSnapshot, Study};
use std::collections::VecDeque;

/// 未标注检查的工作队列
#[derive(Debug, Clone, Default)]
pub struct WorkQueue {
    store: DataStore,
    items: VecDeque<QueueItem>,
    /// 为已标注检查临时提供的队首，不是队列成员，下一次导航或提交时失效
    pinned: Option<QueueItem>,
}

impl WorkQueue {
    /// 创建空队列
    pub fn new() -> Self {
        Self::default()
    }

    /// 从会话快照构建数据存储和工作队列
    pub fn initialize(snapshot: &SessionSnapshot) -> Self {
        Self::from_store(DataStore::from_snapshot(snapshot))
    }

    /// 按 患者-检查 的扫描顺序收集所有未标注检查
    pub fn from_store(store: DataStore) -> Self {
        let items = store
            .patients()
            .iter()
            .flat_map(|p| p.studies.iter())
            .filter(|s| !s.is_labeled())
            .map(Study::key)
            .collect();

        let queue = Self {
            store,
            items,
            pinned: None,
        };
        tracing::info!(
            "Work queue initialized with {} unlabeled of {} studies",
            queue.items.len(),
            queue.store.total_studies()
        );
        queue
    }

    pub fn store(&self) -> &DataStore {
        &self.store
    }

    pub(crate) fn store_mut(&mut self) -> &mut DataStore {
        &mut self.store
    }

    /// 把某患者的所有队列项移到队首，保持它们的相对顺序
    ///
    /// 患者没有未标注检查时队列不变，返回该患者第一个检查作为建议 (`Suggested`)。
    /// 未知患者返回 `None`。
    pub fn prioritize_patient(&mut self, patient_id: &str) -> Option<NextStudy> {
        let patient = self.store.patient(patient_id)?;
        self.pinned = None;

        let (front, rest): (VecDeque<QueueItem>, VecDeque<QueueItem>) = self
            .items
            .drain(..)
            .partition(|item| item.patient_id == patient_id);

        if front.is_empty() {
            self.items = rest;
            tracing::debug!("Patient {} has no unlabeled studies", patient_id);
            return patient.studies.first().map(|s| NextStudy::Suggested(s.key()));
        }

        self.items = front;
        self.items.extend(rest);
        tracing::debug!("Prioritized patient {}", patient_id);
        self.items.front().cloned().map(NextStudy::Queued)
    }

    /// 把指定检查移到队首
    ///
    /// 已在队首时不变。检查未标注但不在队列中 (撤销后) 时作为真实成员插入队首。
    /// 检查已标注时只提供临时队首 (`Suggested`)，不改变队列成员。
    pub fn prioritize_specific_dicom(&mut self, patient_id: &str, study_id: &str) -> Option<NextStudy> {
        let study = self.store.study(patient_id, study_id)?;
        let item = study.key();
        let labeled = study.is_labeled();
        self.pinned = None;

        if let Some(position) = self.position(patient_id, study_id) {
            if position > 0 {
                if let Some(moved) = self.items.remove(position) {
                    self.items.push_front(moved);
                }
            }
            return Some(NextStudy::Queued(item));
        }

        if labeled {
            self.pinned = Some(item.clone());
            Some(NextStudy::Suggested(item))
        } else {
            self.items.push_front(item.clone());
            Some(NextStudy::Queued(item))
        }
    }

    /// 队首的未标注检查
    pub fn peek(&self) -> Option<&QueueItem> {
        self.items.front()
    }

    /// 取出队首的未标注检查
    pub fn dequeue(&mut self) -> Option<QueueItem> {
        self.pinned = None;
        self.items.pop_front()
    }

    /// 当前应展示的队首: 临时队首优先，否则为真实队首
    pub fn front(&self) -> Option<NextStudy> {
        match &self.pinned {
            Some(item) => Some(NextStudy::Suggested(item.clone())),
            None => self.peek().cloned().map(NextStudy::Queued),
        }
    }

    pub fn pinned(&self) -> Option<&QueueItem> {
        self.pinned.as_ref()
    }

    /// 更新检查标签，返回原标签
    ///
    /// 非零标签会移除队列成员；标签回到 0 时不会重新入队，由调用方通过
    /// `prioritize_specific_dicom` 重新插入。
    pub fn set_label(&mut self, patient_id: &str, study_id: &str, label: Label) -> Result<Label> {
        let previous = self.store.set_label(patient_id, study_id, label)?;

        if self.pinned.as_ref().is_some_and(|p| p.matches(patient_id, study_id)) {
            self.pinned = None;
        }

        if label.is_labeled() {
            self.remove(patient_id, study_id);
        }

        tracing::debug!(
            "Label of {}/{} changed from {} to {}",
            patient_id,
            study_id,
            previous,
            label
        );
        Ok(previous)
    }

    /// 提交后的队列整理，返回新的队首
    ///
    /// `was_already_labeled` 为真时该检查从未是队列成员，直接返回队首；
    /// 否则移除可能残留的队列项 (正常情况下 `set_label` 已移除)。
    pub fn advance_past(&mut self, patient_id: &str, study_id: &str, was_already_labeled: bool) -> Option<QueueItem> {
        self.pinned = None;

        if !was_already_labeled {
            let still_labeled = self
                .store
                .study(patient_id, study_id)
                .is_some_and(Study::is_labeled);
            if still_labeled && self.remove(patient_id, study_id) {
                tracing::debug!("Removed lingering queue item {}/{}", patient_id, study_id);
            }
        }

        self.peek().cloned()
    }

    /// 把所有标签重置为 0 并按扫描顺序重建队列
    pub(crate) fn reset_labels(&mut self) {
        self.store.reset_labels();
        let store = std::mem::take(&mut self.store);
        *self = Self::from_store(store);
    }

    pub fn contains(&self, patient_id: &str, study_id: &str) -> bool {
        self.position(patient_id, study_id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueueItem> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// 某患者在队列中的未标注检查数
    pub fn unlabeled_count_for_patient(&self, patient_id: &str) -> usize {
        self.items.iter().filter(|i| i.patient_id == patient_id).count()
    }

    /// 某患者在队列中最靠前的检查
    pub fn first_for_patient(&self, patient_id: &str) -> Option<&QueueItem> {
        self.items.iter().find(|i| i.patient_id == patient_id)
    }

    /// 某患者的全部检查 (扫描顺序，含已标注)
    pub fn all_studies_for(&self, patient_id: &str) -> &[Study] {
        self.store
            .patient(patient_id)
            .map(|p| p.studies.as_slice())
            .unwrap_or(&[])
    }

    pub fn all_patient_ids(&self) -> Vec<String> {
        self.store.patient_ids()
    }

    pub fn total_unlabeled_count(&self) -> usize {
        self.items.len()
    }

    /// 校验成员不变式: 检查在队列中当且仅当未标注，且只出现一次
    pub fn verify_membership(&self) -> Result<()> {
        for study in self.store.patients().iter().flat_map(|p| p.studies.iter()) {
            let occurrences = self
                .items
                .iter()
                .filter(|i| i.matches(&study.patient_id, &study.study_id))
                .count();
            let expected = usize::from(!study.is_labeled());
            if occurrences != expected {
                return Err(LabelerError::Validation(format!(
                    "{}/{} with label {} appears {} times in the queue",
                    study.patient_id, study.study_id, study.label, occurrences
                )));
            }
        }

        if self.items.len() != self.store.total_studies() - self.store.labeled_count() {
            return Err(LabelerError::Validation(
                "Queue references studies missing from the data store".to_string(),
            ));
        }

        Ok(())
    }

    fn position(&self, patient_id: &str, study_id: &str) -> Option<usize> {
        self.items.iter().position(|i| i.matches(patient_id, study_id))
    }

    fn remove(&mut self, patient_id: &str, study_id: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|i| !i.matches(patient_id, study_id));
        self.items.len() != before
    }
}
