use std::time::Duration;

use crate::domain::article::Article;

/// Delivery lifecycle of a queued article. Transitions only move forward,
/// except `Sending -> Queued` when a retryable send failure re-enters the
/// item at the front of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    Queued,
    Rendering,
    Sending,
    Delivered,
    Dropped,
}

#[derive(Debug, Clone)]
pub struct QueueItem {
    pub article: Article,
    pub attempts: u32,
    pub state: DeliveryState,
}

impl QueueItem {
    pub fn new(article: Article) -> Self {
        Self {
            article,
            attempts: 0,
            state: DeliveryState::Queued,
        }
    }

    /// Re-enters the queued state after a retryable send failure.
    pub fn retry(&mut self) {
        self.attempts += 1;
        self.state = DeliveryState::Queued;
    }
}

/// Read-only view of the pipeline for the status command.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatsSnapshot {
    pub queue_depth: usize,
    pub total_sent: u64,
    pub total_failed: u64,
    pub uptime: Duration,
}
