//! Frame and bridge statistics.

use std::fmt;

/// Why a render-stage call did no work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The host called a stage the hook is not bound to.
    OtherStage,
    /// At least one of the two modules is absent.
    Inactive,
    /// Structure enumeration failed; the frame was abandoned.
    HostQueryFailed,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::OtherStage => "other-stage",
            Self::Inactive => "inactive",
            Self::HostQueryFailed => "host-query-failed",
        })
    }
}

/// Statistics from one render-stage pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Set when the pass did no work.
    pub skipped: Option<SkipReason>,
    /// Structures enumerated.
    pub structures: u32,
    /// Cells inspected, of any kind.
    pub cells_visited: u32,
    /// Cells classified as micro-voxel.
    pub foreign_cells: u32,
    /// Foreign cells answered from the cache.
    pub cache_hits: u32,
    /// Placeholders recorded this pass.
    pub placeholders_created: u32,
    /// Artifacts computed this pass.
    pub computed: u32,
    /// Computations that failed this pass.
    pub failed: u32,
    /// Foreign cells left as placeholders (in flight elsewhere or failed).
    pub pending: u32,
    /// Artifacts submitted to the host buffers.
    pub submitted: u32,
    /// Submissions the host rejected or panicked on.
    pub submit_failures: u32,
    /// True when `max_cells_per_frame` cut the pass short.
    pub truncated: bool,
    /// Wall time of the pass (microseconds).
    pub frame_time_us: u32,
}

impl FrameStats {
    /// A pass that did nothing.
    #[must_use]
    pub fn skipped(reason: SkipReason) -> Self {
        Self {
            skipped: Some(reason),
            ..Self::default()
        }
    }

    /// True if the pass did any work.
    #[must_use]
    pub fn ran(&self) -> bool {
        self.skipped.is_none()
    }
}

/// Statistics from one tick scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// True when structure enumeration failed.
    pub abandoned: bool,
    /// Structures enumerated.
    pub structures: u32,
    /// Cells classified as micro-voxel.
    pub foreign_cells: u32,
    /// Placeholders recorded.
    pub placeholders_created: u32,
    /// Artifacts computed (only with `compute_on_scan`).
    pub computed: u32,
    /// Computations that failed.
    pub failed: u32,
}

/// Totals across the bridge's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Render-stage calls that did work.
    pub frames: u64,
    /// Render-stage calls skipped (stage mismatch or inactive).
    pub frames_skipped: u64,
    /// Frames abandoned on host query failure.
    pub frames_abandoned: u64,
    /// Tick scans run.
    pub scans: u64,
    /// Artifacts computed.
    pub artifacts_computed: u64,
    /// Failed computations.
    pub computations_failed: u64,
    /// Artifacts submitted.
    pub submissions: u64,
    /// Submission failures.
    pub submit_failures: u64,
    /// Structure teardowns handled.
    pub teardowns: u64,
    /// Diagnostics that passed the throttle.
    pub diagnostics_emitted: u64,
    /// Frame time of the most recent frame that did work (microseconds).
    pub last_frame_time_us: u32,
}

impl BridgeStats {
    /// Folds one frame into the totals.
    pub fn record_frame(&mut self, frame: &FrameStats) {
        match frame.skipped {
            Some(SkipReason::HostQueryFailed) => self.frames_abandoned += 1,
            Some(_) => self.frames_skipped += 1,
            None => {
                self.frames += 1;
                self.last_frame_time_us = frame.frame_time_us;
            }
        }
        self.artifacts_computed += u64::from(frame.computed);
        self.computations_failed += u64::from(frame.failed);
        self.submissions += u64::from(frame.submitted);
        self.submit_failures += u64::from(frame.submit_failures);
    }

    /// Folds one scan into the totals.
    pub fn record_scan(&mut self, scan: &ScanStats) {
        self.scans += 1;
        self.artifacts_computed += u64::from(scan.computed);
        self.computations_failed += u64::from(scan.failed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_frame_buckets_skips() {
        let mut totals = BridgeStats::default();
        totals.record_frame(&FrameStats::skipped(SkipReason::OtherStage));
        totals.record_frame(&FrameStats::skipped(SkipReason::HostQueryFailed));
        totals.record_frame(&FrameStats {
            computed: 2,
            submitted: 3,
            frame_time_us: 40,
            ..FrameStats::default()
        });
        assert_eq!(totals.frames, 1);
        assert_eq!(totals.frames_skipped, 1);
        assert_eq!(totals.frames_abandoned, 1);
        assert_eq!(totals.artifacts_computed, 2);
        assert_eq!(totals.submissions, 3);
        assert_eq!(totals.last_frame_time_us, 40);
    }

    #[test]
    fn test_skip_reason_display() {
        assert_eq!(SkipReason::Inactive.to_string(), "inactive");
        assert!(!FrameStats::skipped(SkipReason::Inactive).ran());
        assert!(FrameStats::default().ran());
    }
}
