//! 标注控制器状态机
//!
//! 管理标注、确认延迟和撤销期间的输入状态转换

use labeler_core::{LabelerError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 控制器状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ControllerState {
    Idle,     // 空闲，接受输入
    Settling, // 刚应用标签，确认浮层显示中，输入禁用
    UndoBusy, // 撤销的远程往返中，输入禁用
}

impl ControllerState {
    /// 是否接受标注和导航输入
    pub fn accepts_input(&self) -> bool {
        matches!(self, ControllerState::Idle)
    }
}

/// 状态转换事件
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ControllerEvent {
    LabelApplied,
    SettleElapsed,
    FastUndo,
    UndoStarted,
    UndoFinished,
}

/// 控制器状态机
#[derive(Debug)]
pub struct LabelingStateMachine {
    transitions: HashMap<(ControllerState, ControllerEvent), ControllerState>,
}

impl LabelingStateMachine {
    /// 创建新的状态机实例
    pub fn new() -> Self {
        let mut transitions = HashMap::new();

        transitions.insert((ControllerState::Idle, ControllerEvent::LabelApplied), ControllerState::Settling);
        transitions.insert((ControllerState::Settling, ControllerEvent::SettleElapsed), ControllerState::Idle);
        transitions.insert((ControllerState::Settling, ControllerEvent::FastUndo), ControllerState::Idle);
        transitions.insert((ControllerState::Idle, ControllerEvent::UndoStarted), ControllerState::UndoBusy);
        transitions.insert((ControllerState::UndoBusy, ControllerEvent::UndoFinished), ControllerState::Idle);

        Self { transitions }
    }

    /// 检查状态转换是否有效
    pub fn can_transition(&self, from: ControllerState, event: ControllerEvent) -> bool {
        self.transitions.contains_key(&(from, event))
    }

    /// 执行状态转换
    pub fn transition(&self, from: ControllerState, event: ControllerEvent) -> Result<ControllerState> {
        match self.transitions.get(&(from, event)) {
            Some(to) => Ok(*to),
            None => Err(LabelerError::InvalidStateTransition {
                from: format!("{:?}", from),
                event: format!("{:?}", event),
            }),
        }
    }
}

impl Default for LabelingStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        let sm = LabelingStateMachine::new();

        assert!(sm.can_transition(ControllerState::Idle, ControllerEvent::LabelApplied));
        assert!(sm.can_transition(ControllerState::Settling, ControllerEvent::FastUndo));
        assert!(sm.can_transition(ControllerState::UndoBusy, ControllerEvent::UndoFinished));
    }

    #[test]
    fn test_input_is_serialized() {
        let sm = LabelingStateMachine::new();

        // 确认期间不能再次标注，撤销期间不能开始新的撤销
        assert!(!sm.can_transition(ControllerState::Settling, ControllerEvent::LabelApplied));
        assert!(!sm.can_transition(ControllerState::UndoBusy, ControllerEvent::UndoStarted));
        assert!(!sm.can_transition(ControllerState::Idle, ControllerEvent::FastUndo));
    }

    #[test]
    fn test_state_execution() {
        let sm = LabelingStateMachine::new();

        let result = sm.transition(ControllerState::Idle, ControllerEvent::LabelApplied);
        assert_eq!(result.unwrap(), ControllerState::Settling);

        let result = sm.transition(ControllerState::Idle, ControllerEvent::SettleElapsed);
        assert!(result.is_err());
    }
}
