//! Cooperative control flag shared between the manager and a worker.

use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    Run,
    Pause,
    Cancel,
}

/// One flag per live workflow. Workers poll it at step boundaries.
#[derive(Debug, Default)]
pub struct WorkflowControl {
    flag: AtomicU8,
}

const RUN: u8 = 0;
const PAUSE: u8 = 1;
const CANCEL: u8 = 2;

impl WorkflowControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ControlState {
        match self.flag.load(Ordering::SeqCst) {
            PAUSE => ControlState::Pause,
            CANCEL => ControlState::Cancel,
            _ => ControlState::Run,
        }
    }

    pub fn request_pause(&self) {
        // Cancellation wins over a late pause request.
        let _ = self
            .flag
            .compare_exchange(RUN, PAUSE, Ordering::SeqCst, Ordering::SeqCst);
    }

    pub fn request_resume(&self) {
        let _ = self
            .flag
            .compare_exchange(PAUSE, RUN, Ordering::SeqCst, Ordering::SeqCst);
    }

    pub fn request_cancel(&self) {
        self.flag.store(CANCEL, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions() {
        let control = WorkflowControl::new();
        assert_eq!(control.state(), ControlState::Run);

        control.request_pause();
        assert_eq!(control.state(), ControlState::Pause);

        control.request_resume();
        assert_eq!(control.state(), ControlState::Run);

        control.request_cancel();
        assert_eq!(control.state(), ControlState::Cancel);

        // Cancel is sticky.
        control.request_pause();
        control.request_resume();
        assert_eq!(control.state(), ControlState::Cancel);
    }
}
