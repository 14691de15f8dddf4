//! 完成检测
//!
//! `complete = total > 0 && labeled == total`。完成通知在每次 未完成→完成 时只触发一次，
//! 重新变为未完成后复位，手动关闭通知不影响完成状态。

use serde::Serialize;

/// 完成通知
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CompletionNotice {
    pub labeled: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Default)]
pub struct CompletionTracker {
    complete: bool,
    notified: bool,
    visible: Option<CompletionNotice>,
}

impl CompletionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 根据最新计数重新计算，刚刚变为完成时返回通知
    pub fn observe(&mut self, labeled: usize, total: usize) -> Option<CompletionNotice> {
        self.complete = total > 0 && labeled == total;

        if !self.complete {
            self.notified = false;
            return None;
        }

        if self.notified {
            return None;
        }

        self.notified = true;
        let notice = CompletionNotice { labeled, total };
        self.visible = Some(notice);
        tracing::info!("All {} studies labeled", total);
        Some(notice)
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// 当前显示中的通知
    pub fn visible_notice(&self) -> Option<CompletionNotice> {
        self.visible
    }

    /// 关闭通知，不改变完成状态
    pub fn dismiss(&mut self) {
        self.visible = None;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_once_per_transition() {
        let mut tracker = CompletionTracker::new();
        assert!(tracker.observe(1, 2).is_none());
        assert!(tracker.observe(2, 2).is_some());
        assert!(tracker.observe(2, 2).is_none());
        assert!(tracker.is_complete());
    }

    #[test]
    fn test_rearms_after_becoming_incomplete() {
        let mut tracker = CompletionTracker::new();
        tracker.observe(2, 2);
        tracker.dismiss();
        assert!(tracker.is_complete());
        assert!(tracker.visible_notice().is_none());

        assert!(tracker.observe(1, 2).is_none());
        assert!(!tracker.is_complete());
        assert_eq!(tracker.observe(2, 2), Some(CompletionNotice { labeled: 2, total: 2 }));
    }

    #[test]
    fn test_empty_dataset_is_never_complete() {
        let mut tracker = CompletionTracker::new();
        assert!(tracker.observe(0, 0).is_none());
        assert!(!tracker.is_complete());
    }
}
