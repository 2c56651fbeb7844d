//! Regrid Worker
//!
//! Runs regrid computations off the interactive path.
//! Every request takes a new generation from a shared counter; a request
//! whose generation is no longer the latest aborts at its next checkpoint
//! and resolves to `ConcurrencyConflict`. The last request always wins.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;

use super::{regrid, RegridOutcome, RegridRequest};
use crate::core::{CoreError, CoreResult};

// =============================================================================
// Regrid Handle
// =============================================================================

/// Handle to a spawned regrid for awaiting or checking supersession
#[derive(Debug)]
pub struct RegridHandle {
    /// Generation this request was issued with
    pub generation: u64,
    latest: Arc<AtomicU64>,
    join: JoinHandle<CoreResult<RegridOutcome>>,
}

impl RegridHandle {
    /// Whether a newer request (or a cancel) has superseded this one
    pub fn is_superseded(&self) -> bool {
        self.latest.load(Ordering::Acquire) != self.generation
    }

    /// Whether the background computation has returned
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Waits for the computation.
    ///
    /// Resolves to `ConcurrencyConflict` if the request was superseded at any
    /// point before it completed, so a stale outcome is never handed out.
    pub async fn wait(self) -> CoreResult<RegridOutcome> {
        let outcome = self
            .join
            .await
            .map_err(|e| CoreError::Internal(format!("Regrid task failed: {e}")))??;

        if self.latest.load(Ordering::Acquire) != self.generation {
            return Err(CoreError::ConcurrencyConflict {
                generation: self.generation,
            });
        }
        Ok(outcome)
    }
}

// =============================================================================
// Regridder
// =============================================================================

/// Issues regrid requests and tracks which one is current
#[derive(Clone, Debug, Default)]
pub struct Regridder {
    generation: Arc<AtomicU64>,
}

impl Regridder {
    /// Creates a regridder with no request issued yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest issued generation
    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Supersedes every request in flight without issuing a new one
    pub fn cancel(&self) {
        let superseded = self.generation.fetch_add(1, Ordering::AcqRel);
        tracing::debug!(generation = superseded, "regrid cancelled");
    }

    /// Spawns `request` on the blocking pool, superseding earlier requests.
    ///
    /// Requires a Tokio runtime; outside one this fails with `Internal`.
    pub fn spawn(&self, request: RegridRequest) -> CoreResult<RegridHandle> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| CoreError::Internal(format!("No async runtime for regrid: {e}")))?;

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let latest = Arc::clone(&self.generation);

        tracing::info!(
            generation,
            old_interval_ms = request.old_interval.ms(),
            new_interval_ms = request.new_interval.ms(),
            "regrid requested"
        );

        let task_latest = Arc::clone(&latest);
        let join = runtime.spawn_blocking(move || {
            let checkpoint = || {
                if task_latest.load(Ordering::Acquire) == generation {
                    Ok(())
                } else {
                    Err(CoreError::ConcurrencyConflict { generation })
                }
            };
            let result = regrid(request, &checkpoint);
            if let Err(CoreError::ConcurrencyConflict { generation }) = &result {
                tracing::warn!(generation, "regrid superseded by a newer request");
            }
            result
        });

        Ok(RegridHandle {
            generation,
            latest,
            join,
        })
    }

    /// Runs `request` on the current thread under the same supersession rules
    pub fn run_blocking(&self, request: RegridRequest) -> CoreResult<RegridOutcome> {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let latest = Arc::clone(&self.generation);
        let checkpoint = || {
            if latest.load(Ordering::Acquire) == generation {
                Ok(())
            } else {
                Err(CoreError::ConcurrencyConflict { generation })
            }
        };
        regrid(request, &checkpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        tracks::{AutoPreset, AutoSegment, TrackSet},
        GlobalInterval, AUTO_TRACK,
    };

    fn iv(ms: u64) -> GlobalInterval {
        GlobalInterval::new(ms).unwrap()
    }

    fn request(new_interval: u64) -> RegridRequest {
        let preset = AutoPreset {
            text: "voice".to_string(),
            merge_as_single_span: false,
        };
        let segments: Vec<AutoSegment> = (0..200)
            .map(|i| AutoSegment::new(i * 1_000, i * 1_000 + 800).unwrap())
            .collect();
        let mut tracks = TrackSet::new();
        tracks.apply_auto_segments(&segments, &preset, iv(100)).unwrap();

        RegridRequest {
            tracks,
            old_interval: iv(100),
            new_interval: iv(new_interval),
            duration_ms: 200_000,
            auto_segments: segments,
            preset,
        }
    }

    #[tokio::test]
    async fn test_spawned_regrid_completes() {
        let regridder = Regridder::new();
        let handle = regridder.spawn(request(400)).unwrap();
        assert_eq!(handle.generation, 1);

        let outcome = handle.wait().await.unwrap();
        assert_eq!(outcome.interval, iv(400));
        assert_eq!(outcome.tracks.track(AUTO_TRACK).unwrap().len(), 400);
    }

    #[tokio::test]
    async fn test_last_request_wins() {
        let regridder = Regridder::new();
        let first = regridder.spawn(request(400)).unwrap();
        let second = regridder.spawn(request(500)).unwrap();

        assert!(first.is_superseded());
        assert!(!second.is_superseded());

        let stale = first.wait().await;
        assert!(matches!(
            stale,
            Err(CoreError::ConcurrencyConflict { generation: 1 })
        ));
        let outcome = second.wait().await.unwrap();
        assert_eq!(outcome.interval, iv(500));
    }

    #[tokio::test]
    async fn test_cancel_discards_outcome() {
        let regridder = Regridder::new();
        let handle = regridder.spawn(request(400)).unwrap();
        regridder.cancel();

        let result = handle.wait().await;
        assert!(result.unwrap_err().is_superseded());
        assert_eq!(regridder.current_generation(), 2);
    }

    #[test]
    fn test_spawn_without_runtime_fails() {
        let regridder = Regridder::new();
        assert!(matches!(
            regridder.spawn(request(400)),
            Err(CoreError::Internal(_))
        ));
        assert_eq!(regridder.current_generation(), 0);
    }

    #[test]
    fn test_run_blocking() {
        let regridder = Regridder::new();
        let outcome = regridder.run_blocking(request(1_000)).unwrap();
        assert_eq!(outcome.layout.interval_ms, 1_000);
        assert_eq!(regridder.current_generation(), 1);
    }
}
