//! Shared status flags.
//!
//! `connected` follows the link. The worker slot holds at most one
//! [`Activity`]; it is claimed with a single compare-exchange and released by
//! an [`ActivityGuard`], so it clears on every exit path of a worker,
//! including panics and early returns.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::error::{PlotterError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Drawing,
    Calibrating,
}

const IDLE: u8 = 0;

impl Activity {
    const fn slot(self) -> u8 {
        match self {
            Activity::Drawing => 1,
            Activity::Calibrating => 2,
        }
    }

    const fn from_slot(v: u8) -> Option<Self> {
        match v {
            1 => Some(Activity::Drawing),
            2 => Some(Activity::Calibrating),
            _ => None,
        }
    }

    fn busy_reason(self) -> &'static str {
        match self {
            Activity::Drawing => "a drawing is being sent",
            Activity::Calibrating => "calibration is running",
        }
    }
}

#[derive(Debug, Default)]
pub struct StatusFlags {
    connected: AtomicBool,
    /// `IDLE` or the `Activity::slot` of the running worker.
    worker: AtomicU8,
}

/// Point-in-time copy of [`StatusFlags`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusSnapshot {
    pub connected: bool,
    pub drawing: bool,
    pub calibrating: bool,
}

impl StatusFlags {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_connected(&self, v: bool) {
        self.connected.store(v, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// The running worker, if any.
    pub fn activity(&self) -> Option<Activity> {
        Activity::from_slot(self.worker.load(Ordering::SeqCst))
    }

    pub fn is_drawing(&self) -> bool {
        self.activity() == Some(Activity::Drawing)
    }

    pub fn is_calibrating(&self) -> bool {
        self.activity() == Some(Activity::Calibrating)
    }

    /// Any worker running.
    pub fn is_busy(&self) -> bool {
        self.activity().is_some()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let activity = self.activity();
        StatusSnapshot {
            connected: self.is_connected(),
            drawing: activity == Some(Activity::Drawing),
            calibrating: activity == Some(Activity::Calibrating),
        }
    }

    /// Claim the single worker slot for `activity`, or fail with `Busy`
    /// naming the worker that holds it.
    pub fn try_claim(self: &Arc<Self>, activity: Activity) -> Result<ActivityGuard> {
        match self.worker.compare_exchange(
            IDLE,
            activity.slot(),
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) => Ok(ActivityGuard {
                flags: Arc::clone(self),
                activity,
            }),
            Err(held) => {
                let holder = Activity::from_slot(held).unwrap_or(activity);
                Err(PlotterError::Busy(holder.busy_reason()))
            }
        }
    }
}

/// Clears its activity flag when dropped.
#[derive(Debug)]
pub struct ActivityGuard {
    flags: Arc<StatusFlags>,
    activity: Activity,
}

impl ActivityGuard {
    pub fn activity(&self) -> Activity {
        self.activity
    }
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        let _ = self.flags.worker.compare_exchange(
            self.activity.slot(),
            IDLE,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        tracing::trace!(activity = ?self.activity, "activity released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_worker_at_a_time() {
        let flags = StatusFlags::new();
        let g = flags.try_claim(Activity::Drawing).unwrap();
        assert!(flags.is_drawing());
        assert!(matches!(
            flags.try_claim(Activity::Calibrating),
            Err(PlotterError::Busy(_))
        ));
        assert!(matches!(
            flags.try_claim(Activity::Drawing),
            Err(PlotterError::Busy(_))
        ));
        drop(g);
        assert!(!flags.is_busy());
        let g = flags.try_claim(Activity::Calibrating).unwrap();
        assert_eq!(g.activity(), Activity::Calibrating);
        assert!(flags.snapshot().calibrating);
    }

    #[test]
    fn busy_names_the_running_worker() {
        let flags = StatusFlags::new();
        let _g = flags.try_claim(Activity::Calibrating).unwrap();
        assert_eq!(
            flags.try_claim(Activity::Drawing).unwrap_err(),
            PlotterError::Busy("calibration is running")
        );
        assert_eq!(flags.activity(), Some(Activity::Calibrating));
    }

    #[test]
    fn concurrent_claims_admit_exactly_one() {
        for _ in 0..50 {
            let flags = StatusFlags::new();
            let barrier = Arc::new(std::sync::Barrier::new(8));
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let flags = Arc::clone(&flags);
                    let barrier = Arc::clone(&barrier);
                    let activity = if i % 2 == 0 {
                        Activity::Drawing
                    } else {
                        Activity::Calibrating
                    };
                    std::thread::spawn(move || {
                        barrier.wait();
                        flags.try_claim(activity).ok()
                    })
                })
                .collect();
            let guards: Vec<_> = handles
                .into_iter()
                .filter_map(|h| h.join().unwrap())
                .collect();
            assert_eq!(guards.len(), 1);
            let snap = flags.snapshot();
            assert!(snap.drawing != snap.calibrating);
            drop(guards);
            assert!(!flags.is_busy());
        }
    }

    #[test]
    fn guard_clears_on_panic() {
        let flags = StatusFlags::new();
        let f2 = Arc::clone(&flags);
        let r = std::thread::spawn(move || {
            let _g = f2.try_claim(Activity::Drawing).unwrap();
            panic!("worker blew up");
        })
        .join();
        assert!(r.is_err());
        assert!(!flags.is_drawing());
    }
}
