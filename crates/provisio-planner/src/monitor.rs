//! Cooperative cancellation.
//!
//! Planning checks the monitor at slice-expansion and solver-iteration
//! boundaries; a cancelled call returns promptly with a CANCEL status and
//! never leaves persisted state touched (planning never persists).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub trait Monitor {
    fn is_cancelled(&self) -> bool;
}

/// A monitor that never cancels.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullMonitor;

impl Monitor for NullMonitor {
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// A shareable cancellation flag; clone it into whatever is able to cancel
/// the planning call.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

impl Monitor for CancelFlag {
    fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
