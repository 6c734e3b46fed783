use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Per-frame processing phase.
///
/// `Idle → Detecting → (NoFace | FaceFound) → Idle`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum PipelinePhase {
    Idle = 0,
    Detecting = 1,
    NoFace = 2,
    FaceFound = 3,
}

impl PipelinePhase {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => PipelinePhase::Detecting,
            2 => PipelinePhase::NoFace,
            3 => PipelinePhase::FaceFound,
            _ => PipelinePhase::Idle,
        }
    }
}

/// Atomic phase cell doubling as the in-flight guard: any phase other than
/// `Idle` means a frame is being processed.
#[derive(Debug)]
pub struct InFlightGuard {
    phase: AtomicU8,
    releases: AtomicU64,
}

impl InFlightGuard {
    pub fn new() -> Self {
        Self {
            phase: AtomicU8::new(PipelinePhase::Idle as u8),
            releases: AtomicU64::new(0),
        }
    }

    pub fn phase(&self) -> PipelinePhase {
        PipelinePhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn is_busy(&self) -> bool {
        self.phase() != PipelinePhase::Idle
    }

    /// Number of permits released so far.
    pub fn releases(&self) -> u64 {
        self.releases.load(Ordering::Acquire)
    }

    /// Claim the pipeline for one frame. `None` while another frame holds it.
    pub fn try_acquire(self: &Arc<Self>) -> Option<FramePermit> {
        self.phase
            .compare_exchange(
                PipelinePhase::Idle as u8,
                PipelinePhase::Detecting as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .ok()
            .map(|_| FramePermit {
                guard: Arc::clone(self),
            })
    }
}

impl Default for InFlightGuard {
    fn default() -> Self {
        Self::new()
    }
}

/// Ownership of the pipeline for one frame. Dropping it returns the guard to
/// `Idle`, also on error paths and panics.
#[derive(Debug)]
pub struct FramePermit {
    guard: Arc<InFlightGuard>,
}

impl FramePermit {
    /// Record the detection outcome for this frame.
    pub fn resolve(&self, face_found: bool) {
        let phase = if face_found {
            PipelinePhase::FaceFound
        } else {
            PipelinePhase::NoFace
        };
        self.guard.phase.store(phase as u8, Ordering::Release);
    }
}

impl Drop for FramePermit {
    fn drop(&mut self) {
        self.guard.phase.store(PipelinePhase::Idle as u8, Ordering::Release);
        self.guard.releases.fetch_add(1, Ordering::AcqRel);
    }
}

/// Running totals for the frame pipeline.
#[derive(Debug, Default)]
pub struct PipelineCounters {
    pub accepted: AtomicU64,
    pub dropped: AtomicU64,
    pub completed: AtomicU64,
    pub stale_discarded: AtomicU64,
    pub captures_delivered: AtomicU64,
    pub captures_failed: AtomicU64,
}

impl PipelineCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, guard: &InFlightGuard) -> PipelineStats {
        PipelineStats {
            accepted: self.accepted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            stale_discarded: self.stale_discarded.load(Ordering::Relaxed),
            captures_delivered: self.captures_delivered.load(Ordering::Relaxed),
            captures_failed: self.captures_failed.load(Ordering::Relaxed),
            guard_releases: guard.releases(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub accepted: u64,
    pub dropped: u64,
    pub completed: u64,
    pub stale_discarded: u64,
    pub captures_delivered: u64,
    pub captures_failed: u64,
    pub guard_releases: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_one_permit_at_a_time() {
        let guard = Arc::new(InFlightGuard::new());
        let permit = guard.try_acquire().unwrap();
        assert_eq!(guard.phase(), PipelinePhase::Detecting);
        assert!(guard.try_acquire().is_none());
        drop(permit);
        assert_eq!(guard.phase(), PipelinePhase::Idle);
        assert!(guard.try_acquire().is_some());
        assert_eq!(guard.releases(), 2);
    }

    #[test]
    fn resolved_phase_still_blocks_until_drop() {
        let guard = Arc::new(InFlightGuard::new());
        let permit = guard.try_acquire().unwrap();
        permit.resolve(true);
        assert_eq!(guard.phase(), PipelinePhase::FaceFound);
        assert!(guard.try_acquire().is_none());
        permit.resolve(false);
        assert_eq!(guard.phase(), PipelinePhase::NoFace);
        drop(permit);
        assert!(!guard.is_busy());
    }

    #[test]
    fn permit_released_on_panic() {
        let guard = Arc::new(InFlightGuard::new());
        let g = Arc::clone(&guard);
        let result = std::thread::spawn(move || {
            let _permit = g.try_acquire().unwrap();
            panic!("detector blew up");
        })
        .join();
        assert!(result.is_err());
        assert_eq!(guard.phase(), PipelinePhase::Idle);
        assert_eq!(guard.releases(), 1);
    }
}
