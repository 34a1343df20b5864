//! Single-flight guard, operation status and progress reporting.

use crate::core::{Result, SaveLoadError};
use log::warn;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Progress callback receiving a fraction in `0.0..=1.0`.
pub type ProgressSink<'a> = dyn Fn(f32) + Send + Sync + 'a;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Save,
    Load,
}

/// What the orchestrator is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OperationStatus {
    #[default]
    Idle,
    Saving,
    Loading,
    /// A fatal error occurred; the status returns to `Idle` once the guard is released.
    Failed,
}

/// Lifecycle notifications of a load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadEvent {
    /// Live saveable entities were discarded and rebuilding is about to start.
    Started,
    /// The load ended, successfully or not.
    Finished,
}

/// Outcome of a completed save or load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationReport {
    pub kind: OperationKind,
    pub save_name: String,
    /// Entities written (save) or rebuilt (load).
    pub entities: usize,
    /// Entities dropped because a component or hook failed (load only).
    pub entities_rejected: usize,
    /// Components skipped or failed.
    pub components_failed: usize,
    pub elapsed: Duration,
}

impl OperationReport {
    pub(crate) fn new(kind: OperationKind, save_name: &str) -> Self {
        Self {
            kind,
            save_name: save_name.to_string(),
            entities: 0,
            entities_rejected: 0,
            components_failed: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// `true` if any recoverable error was logged during the operation.
    pub fn had_errors(&self) -> bool {
        self.entities_rejected > 0 || self.components_failed > 0
    }
}

/// Allows at most one save or load at a time. A second request is rejected, not queued.
#[derive(Debug, Default)]
pub struct OperationGuard {
    in_flight: AtomicBool,
    status: Mutex<OperationStatus>,
}

impl OperationGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self, kind: OperationKind) -> Result<OperationTicket<'_>> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Another save/load operation is already in progress. Rejecting {:?}.", kind);
            return Err(SaveLoadError::OperationInProgress);
        }

        self.set_status(match kind {
            OperationKind::Save => OperationStatus::Saving,
            OperationKind::Load => OperationStatus::Loading,
        });
        Ok(OperationTicket { guard: self })
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn status(&self) -> OperationStatus {
        match self.status.lock() {
            Ok(status) => *status,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn set_status(&self, next: OperationStatus) {
        match self.status.lock() {
            Ok(mut status) => *status = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }
}

/// Held for the duration of one operation; dropping it resets the status and releases the guard.
#[derive(Debug)]
pub struct OperationTicket<'a> {
    guard: &'a OperationGuard,
}

impl OperationTicket<'_> {
    pub fn fail(&self) {
        self.guard.set_status(OperationStatus::Failed);
    }
}

impl Drop for OperationTicket<'_> {
    fn drop(&mut self) {
        self.guard.set_status(OperationStatus::Idle);
        self.guard.in_flight.store(false, Ordering::Release);
    }
}

pub(crate) fn report_progress(sink: Option<&ProgressSink<'_>>, progress: f32) {
    if let Some(sink) = sink {
        sink(progress.clamp(0.0, 1.0));
    }
}

pub(crate) fn lerp(start: f32, end: f32, t: f32) -> f32 {
    start + (end - start) * t.clamp(0.0, 1.0)
}
