// src/types.rs
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

// 控制器发出的三态信号 (0: stop, 1: run, 2: wait)
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum SessionState {
    Stop = 0,
    Run = 1,
    Wait = 2,
}

impl SessionState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => SessionState::Run,
            2 => SessionState::Wait,
            // anything unknown is treated as a stop request
            _ => SessionState::Stop,
        }
    }
}

/// Shared handle on the controller's tri-state signal.
///
/// The controller owns writes; the session loop only ever calls [`get`](Self::get).
#[derive(Clone, Debug)]
pub struct SessionSignal {
    state: Arc<AtomicU8>,
}

impl SessionSignal {
    pub fn new(initial: SessionState) -> Self {
        Self {
            state: Arc::new(AtomicU8::new(initial as u8)),
        }
    }

    pub fn get(&self) -> SessionState {
        SessionState::from_raw(self.state.load(Ordering::SeqCst))
    }

    pub fn set(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }
}

impl Default for SessionSignal {
    fn default() -> Self {
        Self::new(SessionState::Wait)
    }
}

// 每个周期的反馈结果
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CycleReport {
    pub elapsed: Duration,
    pub last_timestamp: f64,
    pub feature: f64,
    pub ratio: f64,
    pub smoothed: f64,
    pub volumes: (f32, f32),
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum SessionOutcome {
    /// Controller said STOP before the loop started.
    Aborted,
    /// Controller left RUN while the loop was active.
    Stopped,
    /// Global time budget used up.
    Completed,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SessionSummary {
    pub applied_cycles: u64,
    pub stale_cycles: u64,
    pub skipped_cycles: u64,
    pub elapsed: Duration,
}

// 会话发给外部 (状态显示/日志转发) 的消息
#[derive(Clone, Debug)]
pub enum SessionMessage {
    Log(String),
    State(SessionState),
    Stale { last_seen: Option<f64> },
    Feedback(CycleReport),
    Finished(SessionOutcome, SessionSummary),
}
