use crossbeam_channel::Sender;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub current: u32,
    pub total: u32,
    pub message: String,
}

impl Progress {
    pub fn percent(&self) -> u32 {
        if self.total == 0 {
            0
        } else {
            self.current.saturating_mul(100) / self.total
        }
    }
}

/// Receives `(current, total, message)` updates from a running merge.
pub trait ProgressSink: Send + Sync {
    fn report(&self, current: u32, total: u32, message: &str);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _current: u32, _total: u32, _message: &str) {}
}

/// Forwards updates over a channel; a dropped receiver is ignored.
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    tx: Sender<Progress>,
}

impl ChannelProgress {
    pub fn new(tx: Sender<Progress>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelProgress {
    fn report(&self, current: u32, total: u32, message: &str) {
        let _ = self.tx.send(Progress {
            current,
            total,
            message: message.to_string(),
        });
    }
}
