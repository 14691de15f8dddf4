//! 标注控制器
//!
//! 协调工作队列、数据存储和远程网关的核心引擎。所有本地修改同步完成，
//! 远程写入异步发出且不阻塞状态转换；本地模型始终以最近一次本地意图为准。

use crate::completion::{CompletionNotice, CompletionTracker};
use crate::export;
use crate::state_machine::{ControllerEvent, ControllerState, LabelingStateMachine};
use crate::store::DataStore;
use crate::worklist::WorkQueue;
use labeler_core::utils::natural_order;
use labeler_core::{
    Label, LabelAction, LabelerError, Patient, QueueItem, RemoteGateway, Result, SessionSnapshot,
    Study,
};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// 控制器参数
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// 应用标签后确认浮层的持续时间
    pub settle_delay: Duration,
    /// 成功提示的显示时长
    pub status_ttl: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(400),
            status_ttl: Duration::from_millis(3000),
        }
    }
}

/// 确认延迟计时器
#[derive(Debug, Clone)]
struct SettleTimer {
    deadline: Instant,
    was_already_labeled: bool,
}

/// 状态机上下文: 计时器、最近一次操作和撤销栈
#[derive(Debug, Default)]
struct LabelingContext {
    pending_timer: Option<SettleTimer>,
    pending_action: Option<LabelAction>,
    undo_stack: Vec<LabelAction>,
}

impl LabelingContext {
    fn clear(&mut self) {
        self.pending_timer = None;
        self.pending_action = None;
        self.undo_stack.clear();
    }
}

/// 当前显示的检查
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Selection {
    pub patient_id: String,
    pub study_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StatusKind {
    Success,
    Warning,
    Error,
}

/// 可关闭的状态提示
#[derive(Debug, Clone, Serialize)]
pub struct StatusMessage {
    pub kind: StatusKind,
    pub text: String,
    #[serde(skip)]
    expires_at: Instant,
}

/// 导航结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    /// 显示未变化
    Stayed,
    /// 在当前患者内切换检查
    Study(QueueItem),
    /// 加载了另一个患者
    Patient(QueueItem),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// 输入被忽略 (忙碌、无显示检查或标签相同)
    Ignored,
    Applied(LabelAction),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoOutcome {
    Nothing,
    Reverted { action: LabelAction, fast: bool },
}

/// 删除全部数据的结果
#[derive(Debug, Clone, Default)]
pub struct DiscardReport {
    /// 远程删除失败时的错误描述，本地模型仍已清空
    pub remote_error: Option<String>,
}

/// 单个患者的进度
#[derive(Debug, Clone, Serialize)]
pub struct PatientProgress {
    pub patient_id: String,
    pub labeled: usize,
    pub total: usize,
    pub fully_labeled: bool,
}

/// 会话进度概览
#[derive(Debug, Clone, Serialize)]
pub struct ProgressSummary {
    pub labeled: usize,
    pub total: usize,
    pub queued: usize,
    pub complete: bool,
    pub patients: Vec<PatientProgress>,
}

/// 远程写入结果
#[derive(Debug)]
struct WriteOutcome {
    seq: u64,
    key: QueueItem,
    label: Label,
    result: Result<()>,
}

/// 标注控制器
pub struct LabelingController {
    gateway: Arc<dyn RemoteGateway>,
    user: String,
    session_id: Uuid,
    settings: ControllerSettings,
    state_machine: LabelingStateMachine,
    state: ControllerState,
    queue: WorkQueue,
    context: LabelingContext,
    selection: Option<Selection>,
    labeled_count: usize,
    completion: CompletionTracker,
    status: Option<StatusMessage>,
    write_seq: u64,
    /// 每个检查最近一次写入的序号，更早的响应视为过期
    latest_writes: HashMap<QueueItem, u64>,
    in_flight: usize,
    outcome_tx: mpsc::UnboundedSender<WriteOutcome>,
    outcome_rx: mpsc::UnboundedReceiver<WriteOutcome>,
}

impl LabelingController {
    /// 创建新的标注控制器
    pub fn new(gateway: Arc<dyn RemoteGateway>, user: impl Into<String>, settings: ControllerSettings) -> Self {
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let session_id = Uuid::new_v4();
        let user = user.into();
        info!("Labeling session {} created for user {}", session_id, user);

        Self {
            gateway,
            user,
            session_id,
            settings,
            state_machine: LabelingStateMachine::new(),
            state: ControllerState::Idle,
            queue: WorkQueue::new(),
            context: LabelingContext::default(),
            selection: None,
            labeled_count: 0,
            completion: CompletionTracker::new(),
            status: None,
            write_seq: 0,
            latest_writes: HashMap::new(),
            in_flight: 0,
            outcome_tx,
            outcome_rx,
        }
    }

    /// 拉取会话快照、初始化模型并显示第一个检查
    ///
    /// 快照获取失败时模型保持不变。快照安装后首个患者加载失败只影响显示。
    pub async fn load_session(&mut self) -> Result<Navigation> {
        let snapshot = match self.gateway.fetch_session_snapshot(&self.user).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!("Failed to fetch session snapshot for {}: {}", self.user, e);
                self.set_status(StatusKind::Error, "Failed to load labeling data from the server");
                return Err(e);
            }
        };

        self.install_snapshot(&snapshot);
        self.display_initial().await
    }

    /// 用快照替换整个本地模型
    pub fn install_snapshot(&mut self, snapshot: &SessionSnapshot) {
        self.context.clear();
        self.queue = WorkQueue::initialize(snapshot);
        self.selection = None;
        self.state = ControllerState::Idle;
        self.latest_writes.clear();
        self.labeled_count = self.queue.store().labeled_count();
        self.completion.reset();
        self.refresh_completion();

        info!(
            "Session {} loaded: {} patients, {}/{} studies labeled",
            self.session_id,
            self.queue.store().patient_count(),
            self.labeled_count,
            self.queue.store().total_studies()
        );
    }

    /// 显示队首检查；队列为空时显示第一个患者
    pub async fn display_initial(&mut self) -> Result<Navigation> {
        if let Some(head) = self.queue.peek().cloned() {
            return self.load_patient(&head.patient_id, Some(&head.study_id)).await;
        }

        match self.queue.store().patient_at(0).map(|p| p.patient_id.clone()) {
            Some(patient_id) => self.load_patient(&patient_id, None).await,
            None => Ok(Navigation::Stayed),
        }
    }

    /// 为当前显示的检查应用标签 (Idle → Settling)
    ///
    /// 标签相同时不做任何事。远程提交在后台进行，失败只产生提示，不回滚本地修改。
    /// 需要在 tokio 运行时中调用。
    pub fn apply_label(&mut self, label: Label) -> Result<ApplyOutcome> {
        if !label.is_labeled() {
            return Err(LabelerError::InvalidLabel(label.value()));
        }

        self.drain_write_outcomes();

        if !self.state_machine.can_transition(self.state, ControllerEvent::LabelApplied) {
            debug!("Ignoring label {} while {:?}", label, self.state);
            return Ok(ApplyOutcome::Ignored);
        }

        let Some(study) = self.displayed_study() else {
            return Ok(ApplyOutcome::Ignored);
        };
        if study.label == label {
            return Ok(ApplyOutcome::Ignored);
        }

        let action = LabelAction::new(study, label);
        let was_already_labeled = study.is_labeled();

        self.queue.set_label(&action.patient_id, &action.study_id, label)?;
        self.state = self.state_machine.transition(self.state, ControllerEvent::LabelApplied)?;

        self.context.undo_stack.push(action.clone());
        self.context.pending_action = Some(action.clone());
        self.context.pending_timer = Some(SettleTimer {
            deadline: Instant::now() + self.settings.settle_delay,
            was_already_labeled,
        });

        self.spawn_commit(action.key(), label);

        if !was_already_labeled {
            self.labeled_count += 1;
            self.refresh_completion();
        }

        info!(
            "Labeled {}/{} as {} (was {})",
            action.patient_id, action.study_id, action.new_label, action.previous_label
        );
        Ok(ApplyOutcome::Applied(action))
    }

    /// 确认延迟的截止时间
    pub fn settle_deadline(&self) -> Option<Instant> {
        self.context.pending_timer.as_ref().map(|t| t.deadline)
    }

    /// 等待确认延迟结束并前进到下一个检查
    pub async fn wait_for_settle(&mut self) -> Result<Navigation> {
        match self.settle_deadline() {
            Some(deadline) => {
                tokio::time::sleep_until(deadline).await;
                self.on_settle_elapsed().await
            }
            None => Ok(Navigation::Stayed),
        }
    }

    /// 确认延迟结束 (Settling → Idle): 整理队列并执行前进算法
    pub async fn on_settle_elapsed(&mut self) -> Result<Navigation> {
        self.drain_write_outcomes();

        let Some(timer) = self.context.pending_timer.take() else {
            return Ok(Navigation::Stayed);
        };
        let action = self.context.pending_action.take();
        self.state = self.state_machine.transition(self.state, ControllerEvent::SettleElapsed)?;

        let Some(action) = action else {
            return Ok(Navigation::Stayed);
        };

        let head = self
            .queue
            .advance_past(&action.patient_id, &action.study_id, timer.was_already_labeled);
        self.advance(head).await
    }

    /// 前进算法
    ///
    /// 1. 队首属于当前患者: 切换到该检查。
    /// 2. 队首属于其他患者: 当前患者仍有未标注检查时重新提升当前患者并留下；
    ///    否则加载队首所属患者。
    /// 3. 队列为空: 不导航。
    async fn advance(&mut self, head: Option<QueueItem>) -> Result<Navigation> {
        let Some(head) = head else {
            debug!("Queue is empty, staying on current study");
            return Ok(Navigation::Stayed);
        };

        let current = self.selection.as_ref().map(|s| s.patient_id.clone());
        match current {
            Some(patient_id) if patient_id == head.patient_id => Ok(self.select_in_view(&head.study_id)),
            Some(patient_id) if self.queue.unlabeled_count_for_patient(&patient_id) > 0 => {
                debug!(
                    "Staying with patient {} although queue head is {}",
                    patient_id, head
                );
                match self.queue.prioritize_patient(&patient_id) {
                    Some(next) if next.is_queued() => Ok(self.select_in_view(&next.item().study_id)),
                    _ => Ok(Navigation::Stayed),
                }
            }
            _ => {
                info!("Moving on to patient {}", head.patient_id);
                self.load_patient(&head.patient_id, Some(&head.study_id)).await
            }
        }
    }

    /// 撤销
    ///
    /// 确认延迟中为快速路径: 取消计时器并同步还原，显示不变。
    /// 否则弹出撤销栈，还原后切换显示到该检查 (必要时先加载其患者)。
    pub async fn undo(&mut self) -> Result<UndoOutcome> {
        self.drain_write_outcomes();

        if self.context.pending_timer.is_some() {
            return self.fast_undo();
        }

        if !self.state_machine.can_transition(self.state, ControllerEvent::UndoStarted) {
            return Ok(UndoOutcome::Nothing);
        }

        let Some(action) = self.context.undo_stack.pop() else {
            return Ok(UndoOutcome::Nothing);
        };

        self.state = self.state_machine.transition(self.state, ControllerEvent::UndoStarted)?;
        let result = self.stack_undo(&action).await;
        self.state = self.state_machine.transition(self.state, ControllerEvent::UndoFinished)?;

        result.map(|_| UndoOutcome::Reverted { action, fast: false })
    }

    fn fast_undo(&mut self) -> Result<UndoOutcome> {
        self.context.pending_timer = None;
        self.state = self.state_machine.transition(self.state, ControllerEvent::FastUndo)?;

        let Some(action) = self.context.pending_action.take() else {
            return Ok(UndoOutcome::Nothing);
        };

        self.revert_locally(&action)?;
        if self.context.undo_stack.last() == Some(&action) {
            self.context.undo_stack.pop();
        }
        self.spawn_commit(action.key(), action.previous_label);

        info!("Fast undo of {}/{}", action.patient_id, action.study_id);
        Ok(UndoOutcome::Reverted { action, fast: true })
    }

    async fn stack_undo(&mut self, action: &LabelAction) -> Result<Navigation> {
        self.revert_locally(action)?;

        let committed = self.commit_now(action.key(), action.previous_label).await;

        let displayed = self.selection.as_ref().map(|s| s.patient_id.clone());
        let navigation = if displayed.as_deref() == Some(action.patient_id.as_str()) {
            self.select_in_view(&action.study_id)
        } else {
            info!("Loading patient {} to undo {}", action.patient_id, action.study_id);
            self.load_patient(&action.patient_id, Some(&action.study_id)).await?
        };

        if committed.is_ok() {
            self.set_status(StatusKind::Success, format!("Undid labeling for {}", action.study_id));
        }
        Ok(navigation)
    }

    /// 把检查还原为操作前的标签，并恢复队列成员与计数
    fn revert_locally(&mut self, action: &LabelAction) -> Result<()> {
        let was_labeled = self
            .queue
            .store()
            .study(&action.patient_id, &action.study_id)
            .map(Study::is_labeled)
            .ok_or_else(|| LabelerError::NotFound(action.key().to_string()))?;

        self.queue
            .set_label(&action.patient_id, &action.study_id, action.previous_label)?;
        if !action.previous_label.is_labeled() {
            self.queue
                .prioritize_specific_dicom(&action.patient_id, &action.study_id);
        }

        match (was_labeled, action.previous_label.is_labeled()) {
            (true, false) => self.labeled_count = self.labeled_count.saturating_sub(1),
            (false, true) => self.labeled_count += 1,
            _ => {}
        }
        self.refresh_completion();
        Ok(())
    }

    /// 手动选择患者 (仅 Idle)。未知患者直接忽略。
    pub async fn select_patient(&mut self, patient_id: &str) -> Result<Navigation> {
        self.drain_write_outcomes();
        if !self.state.accepts_input() || self.queue.store().patient(patient_id).is_none() {
            debug!("Ignoring selection of patient {}", patient_id);
            return Ok(Navigation::Stayed);
        }

        self.queue.prioritize_patient(patient_id);
        self.load_patient(patient_id, None).await
    }

    /// 按位置选择患者，越界时忽略
    pub async fn select_patient_at(&mut self, position: usize) -> Result<Navigation> {
        match self.queue.store().patient_at(position).map(|p| p.patient_id.clone()) {
            Some(patient_id) => self.select_patient(&patient_id).await,
            None => Ok(Navigation::Stayed),
        }
    }

    /// 手动选择检查 (仅 Idle)。未知检查直接忽略。
    pub async fn select_study(&mut self, patient_id: &str, study_id: &str) -> Result<Navigation> {
        self.drain_write_outcomes();
        if !self.state.accepts_input() || self.queue.store().study(patient_id, study_id).is_none() {
            debug!("Ignoring selection of study {}/{}", patient_id, study_id);
            return Ok(Navigation::Stayed);
        }

        self.queue.prioritize_specific_dicom(patient_id, study_id);

        let displayed = self.selection.as_ref().map(|s| s.patient_id.as_str());
        if displayed == Some(patient_id) {
            Ok(self.select_in_view(study_id))
        } else {
            self.load_patient(patient_id, Some(study_id)).await
        }
    }

    /// 在当前患者内按位置选择检查，越界时忽略
    pub async fn select_study_at(&mut self, position: usize) -> Result<Navigation> {
        let target = self
            .displayed_patient()
            .and_then(|p| p.studies.get(position))
            .map(Study::key);

        match target {
            Some(item) => self.select_study(&item.patient_id, &item.study_id).await,
            None => Ok(Navigation::Stayed),
        }
    }

    /// 加载患者影像并设为显示
    ///
    /// 未指定检查时显示该患者在队列中最靠前的检查，否则显示第一个检查。
    /// 获取失败时放弃本次导航，原显示保持不变。
    async fn load_patient(&mut self, patient_id: &str, study_id: Option<&str>) -> Result<Navigation> {
        if self.queue.store().patient(patient_id).is_none() {
            return Err(LabelerError::NotFound(format!("Patient {}", patient_id)));
        }

        let installed = match self.gateway.fetch_study_data(patient_id, &self.user).await {
            Ok(data) => self.queue.store_mut().install_frames(patient_id, data),
            Err(e) => Err(e),
        };
        if let Err(e) = installed {
            error!("Error loading studies for patient {}: {}", patient_id, e);
            self.set_status(
                StatusKind::Error,
                format!("Error loading data for patient {}. Please try again.", patient_id),
            );
            return Err(e);
        }

        let Some(patient) = self.queue.store().patient(patient_id) else {
            return Err(LabelerError::NotFound(format!("Patient {}", patient_id)));
        };
        let study_index = study_id
            .and_then(|s| patient.study_position(s))
            .or_else(|| {
                self.queue
                    .first_for_patient(patient_id)
                    .and_then(|item| patient.study_position(&item.study_id))
            })
            .unwrap_or(0);
        let shown = patient.studies.get(study_index).map(Study::key);

        self.selection = Some(Selection {
            patient_id: patient_id.to_string(),
            study_index,
        });
        info!("Displaying patient {} study #{}", patient_id, study_index);

        Ok(shown.map_or(Navigation::Stayed, Navigation::Patient))
    }

    /// 在当前患者内切换显示的检查
    fn select_in_view(&mut self, study_id: &str) -> Navigation {
        let Some(selection) = self.selection.as_mut() else {
            return Navigation::Stayed;
        };
        let Some(patient) = self.queue.store().patient(&selection.patient_id) else {
            return Navigation::Stayed;
        };

        match patient.study_position(study_id) {
            Some(index) => {
                selection.study_index = index;
                Navigation::Study(QueueItem::new(selection.patient_id.clone(), study_id))
            }
            None => Navigation::Stayed,
        }
    }

    /// 把所有标签重置为 0
    ///
    /// 每个检查发出一次远程提交，全部成功后才修改本地模型，然后显示自然顺序中的第一个患者。
    pub async fn reset_all_labels(&mut self) -> Result<Navigation> {
        self.drain_write_outcomes();
        if !self.state.accepts_input() {
            return Ok(Navigation::Stayed);
        }

        let keys: Vec<QueueItem> = self
            .queue
            .store()
            .patients()
            .iter()
            .flat_map(|p| p.studies.iter().map(Study::key))
            .collect();
        info!("Resetting {} labels for {}", keys.len(), self.user);

        let mut commits = JoinSet::new();
        for key in keys {
            let gateway = Arc::clone(&self.gateway);
            let user = self.user.clone();
            commits.spawn(async move {
                gateway
                    .commit_label(&key.patient_id, &key.study_id, Label::UNLABELED, &user)
                    .await
                    .map_err(|e| (key, e))
            });
        }

        let mut first_error = None;
        while let Some(joined) = commits.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err((key, e))) => {
                    warn!("Failed to reset {}: {}", key, e);
                    first_error.get_or_insert(e);
                }
                Err(join_error) => {
                    first_error.get_or_insert(LabelerError::Gateway(join_error.to_string()));
                }
            }
        }

        if let Some(e) = first_error {
            self.set_status(StatusKind::Error, "Failed to reset labels. Please try again.");
            return Err(e);
        }

        self.context.clear();
        self.queue.reset_labels();
        self.latest_writes.clear();
        self.labeled_count = 0;
        self.completion.reset();
        self.refresh_completion();
        self.set_status(StatusKind::Success, "All labels have been reset successfully");

        let first = natural_order(self.queue.store().patients().iter().map(|p| p.patient_id.as_str()))
            .first()
            .map(|p| p.to_string());
        match first {
            Some(patient_id) => self.select_patient(&patient_id).await,
            None => Ok(Navigation::Stayed),
        }
    }

    /// 删除全部远程数据并清空本地模型
    ///
    /// 无论远程调用结果如何，本地模型都会被清空；远程失败只产生一次警告。
    pub async fn start_over(&mut self) -> DiscardReport {
        let remote = self.gateway.delete_all_data(&self.user).await;
        self.discard_model();

        match remote {
            Ok(()) => {
                info!("All data deleted for {}", self.user);
                DiscardReport::default()
            }
            Err(e) => {
                warn!("Remote delete failed for {}: {}", self.user, e);
                self.set_status(
                    StatusKind::Warning,
                    "Failed to reset server data. The app has been reset locally.",
                );
                DiscardReport {
                    remote_error: Some(e.to_string()),
                }
            }
        }
    }

    /// 登出: 只清空本地模型
    pub fn logout(&mut self) {
        self.discard_model();
        self.status = None;
        info!("Session {} closed for {}", self.session_id, self.user);
    }

    fn discard_model(&mut self) {
        self.context.clear();
        self.queue = WorkQueue::new();
        self.selection = None;
        self.labeled_count = 0;
        self.completion.reset();
        self.latest_writes.clear();
        self.state = ControllerState::Idle;
    }

    /// 导出标签 CSV
    pub fn export_csv(&self, path: impl AsRef<Path>) -> Result<usize> {
        export::export_labels_to_path(self.queue.store(), path)
    }

    /// 在后台提交标签
    fn spawn_commit(&mut self, key: QueueItem, label: Label) {
        let seq = self.next_write_seq(&key);
        let gateway = Arc::clone(&self.gateway);
        let user = self.user.clone();
        let tx = self.outcome_tx.clone();
        self.in_flight += 1;

        tokio::spawn(async move {
            let result = gateway
                .commit_label(&key.patient_id, &key.study_id, label, &user)
                .await;
            // 接收端已关闭说明控制器已释放，结果无人关心
            let _ = tx.send(WriteOutcome { seq, key, label, result });
        });
    }

    /// 提交标签并等待结果
    async fn commit_now(&mut self, key: QueueItem, label: Label) -> Result<()> {
        let seq = self.next_write_seq(&key);
        let result = self
            .gateway
            .commit_label(&key.patient_id, &key.study_id, label, &self.user)
            .await;

        match result {
            Ok(()) => {
                self.handle_write_outcome(WriteOutcome { seq, key, label, result: Ok(()) });
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                self.handle_write_outcome(WriteOutcome {
                    seq,
                    key,
                    label,
                    result: Err(e),
                });
                Err(LabelerError::Gateway(message))
            }
        }
    }

    fn next_write_seq(&mut self, key: &QueueItem) -> u64 {
        self.write_seq += 1;
        self.latest_writes.insert(key.clone(), self.write_seq);
        self.write_seq
    }

    /// 处理一次写入结果，报告了失败时返回 true
    fn handle_write_outcome(&mut self, outcome: WriteOutcome) -> bool {
        if self.latest_writes.get(&outcome.key) != Some(&outcome.seq) {
            debug!("Discarding stale write result for {} (label {})", outcome.key, outcome.label);
            return false;
        }
        self.latest_writes.remove(&outcome.key);

        match outcome.result {
            Ok(()) => false,
            Err(e) => {
                warn!("Failed to save label {} for {}: {}", outcome.label, outcome.key, e);
                self.set_status(
                    StatusKind::Error,
                    "Failed to update server. Your labels are kept locally.",
                );
                true
            }
        }
    }

    /// 处理已完成的后台写入，返回处理数量
    pub fn drain_write_outcomes(&mut self) -> usize {
        let mut drained = 0;
        while let Ok(outcome) = self.outcome_rx.try_recv() {
            self.in_flight = self.in_flight.saturating_sub(1);
            self.handle_write_outcome(outcome);
            drained += 1;
        }
        drained
    }

    /// 等待下一个后台写入完成并处理，报告了失败时返回 true
    ///
    /// 没有进行中的写入时永不完成，可以放进 `tokio::select!`。
    pub async fn next_write_outcome(&mut self) -> bool {
        if self.in_flight == 0 {
            return std::future::pending().await;
        }
        match self.outcome_rx.recv().await {
            Some(outcome) => {
                self.in_flight -= 1;
                self.handle_write_outcome(outcome)
            }
            None => std::future::pending().await,
        }
    }

    /// 等待所有后台写入完成，返回报告的失败数量
    pub async fn flush_writes(&mut self) -> usize {
        let mut failed = 0;
        while self.in_flight > 0 {
            match self.outcome_rx.recv().await {
                Some(outcome) => {
                    self.in_flight -= 1;
                    if self.handle_write_outcome(outcome) {
                        failed += 1;
                    }
                }
                None => break,
            }
        }
        failed
    }

    pub fn pending_writes(&self) -> usize {
        self.in_flight
    }

    fn refresh_completion(&mut self) {
        let total = self.queue.store().total_studies();
        if let Some(notice) = self.completion.observe(self.labeled_count, total) {
            debug!("Completion notice raised for {} studies", notice.total);
        }
    }

    fn set_status(&mut self, kind: StatusKind, text: impl Into<String>) {
        self.status = Some(StatusMessage {
            kind,
            text: text.into(),
            expires_at: Instant::now() + self.settings.status_ttl,
        });
    }

    /// 当前状态提示，过期后不再返回
    pub fn status(&self) -> Option<&StatusMessage> {
        self.status
            .as_ref()
            .filter(|s| Instant::now() < s.expires_at)
    }

    pub fn dismiss_status(&mut self) {
        self.status = None;
    }

    pub fn completion_notice(&self) -> Option<CompletionNotice> {
        self.completion.visible_notice()
    }

    pub fn dismiss_completion(&mut self) {
        self.completion.dismiss();
    }

    pub fn is_complete(&self) -> bool {
        self.completion.is_complete()
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn queue(&self) -> &WorkQueue {
        &self.queue
    }

    pub fn store(&self) -> &DataStore {
        self.queue.store()
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    pub fn displayed_patient(&self) -> Option<&Patient> {
        self.selection
            .as_ref()
            .and_then(|s| self.queue.store().patient(&s.patient_id))
    }

    pub fn displayed_study(&self) -> Option<&Study> {
        let selection = self.selection.as_ref()?;
        self.displayed_patient()
            .and_then(|p| p.studies.get(selection.study_index))
    }

    /// 会话内已标注检查数
    pub fn labeled_count(&self) -> usize {
        self.labeled_count
    }

    pub fn total_count(&self) -> usize {
        self.queue.store().total_studies()
    }

    pub fn undo_depth(&self) -> usize {
        self.context.undo_stack.len()
    }

    /// 进度概览
    pub fn progress(&self) -> ProgressSummary {
        let patients = self
            .queue
            .store()
            .patients()
            .iter()
            .map(|p| PatientProgress {
                patient_id: p.patient_id.clone(),
                labeled: p.labeled_count(),
                total: p.studies.len(),
                fully_labeled: p.is_fully_labeled(),
            })
            .collect();

        ProgressSummary {
            labeled: self.labeled_count,
            total: self.total_count(),
            queued: self.queue.total_unlabeled_count(),
            complete: self.is_complete(),
            patients,
        }
    }
}
