use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sim_spawn_proto::FrameInfo;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::client::{ConnectionError, SimWorld};

/// Cooperative cancellation flag shared between the signal handler and the
/// tick loop.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` only for the call that flipped the flag.
    pub fn cancel(&self) -> bool {
        !self.cancelled.swap(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Error)]
pub enum TickError {
    #[error("tick wait cancelled")]
    Cancelled,
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

#[derive(Debug)]
pub enum StopReason {
    Cancelled,
    TickLimit,
    ConnectionLost(ConnectionError),
}

#[derive(Debug)]
pub struct TickReport {
    pub ticks: u64,
    pub last_frame: Option<FrameInfo>,
    pub stop: StopReason,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TickSynchronizer {
    max_ticks: Option<u64>,
}

impl TickSynchronizer {
    pub fn new(max_ticks: Option<u64>) -> Self {
        Self { max_ticks }
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn run<W: SimWorld + ?Sized>(&self, world: &mut W, cancel: &CancelToken) -> TickReport {
        self.run_with(world, cancel, |_| {})
    }

    /// Blocks on `wait_for_tick` until cancelled, the tick budget is spent or
    /// the connection fails. `on_tick` sees every received frame.
    pub fn run_with<W, F>(&self, world: &mut W, cancel: &CancelToken, mut on_tick: F) -> TickReport
    where
        W: SimWorld + ?Sized,
        F: FnMut(&FrameInfo),
    {
        let mut ticks = 0u64;
        let mut last_frame: Option<FrameInfo> = None;

        let stop = loop {
            if cancel.is_cancelled() {
                break StopReason::Cancelled;
            }
            if self.max_ticks.is_some_and(|max| ticks >= max) {
                break StopReason::TickLimit;
            }
            match world.wait_for_tick(cancel) {
                Ok(frame) => {
                    if let Some(previous) = last_frame {
                        if frame.frame <= previous.frame {
                            warn!(
                                previous = previous.frame,
                                current = frame.frame,
                                "frame counter did not advance"
                            );
                        }
                    }
                    ticks += 1;
                    debug!(
                        frame = frame.frame,
                        elapsed = frame.elapsed_seconds,
                        delta = frame.delta_seconds,
                        "tick"
                    );
                    on_tick(&frame);
                    last_frame = Some(frame);
                }
                Err(TickError::Cancelled) => break StopReason::Cancelled,
                Err(TickError::Connection(err)) => break StopReason::ConnectionLost(err),
            }
        };

        match &stop {
            StopReason::Cancelled => info!(ticks, "tick loop cancelled"),
            StopReason::TickLimit => info!(ticks, "tick limit reached"),
            StopReason::ConnectionLost(err) => warn!(ticks, error = %err, "connection lost"),
        }
        TickReport {
            ticks,
            last_frame,
            stop,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedWorld;

    #[test]
    fn cancel_reports_first_caller_only() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        assert!(token.cancel());
        assert!(!clone.cancel());
        assert!(clone.is_cancelled());
    }

    #[test]
    fn stops_at_tick_limit() {
        let mut world = ScriptedWorld::with_catalog(&[]);
        let report = TickSynchronizer::new(Some(4)).run(&mut world, &CancelToken::new());
        assert_eq!(report.ticks, 4);
        assert!(matches!(report.stop, StopReason::TickLimit));
        assert_eq!(report.last_frame.map(|frame| frame.frame), Some(4));
        assert_eq!(world.tick_calls, 4);
    }

    #[test]
    fn stops_on_cancel_raised_between_ticks() {
        let mut world = ScriptedWorld::with_catalog(&[]);
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let report = TickSynchronizer::unbounded().run_with(&mut world, &cancel, |frame| {
            if frame.frame == 3 {
                trigger.cancel();
            }
        });
        assert_eq!(report.ticks, 3);
        assert!(matches!(report.stop, StopReason::Cancelled));
    }

    #[test]
    fn stops_when_wait_itself_is_cancelled() {
        let mut world = ScriptedWorld::with_catalog(&[]);
        world.cancel_wait_after = Some(2);
        let report = TickSynchronizer::unbounded().run(&mut world, &CancelToken::new());
        assert_eq!(report.ticks, 2);
        assert!(matches!(report.stop, StopReason::Cancelled));
    }

    #[test]
    fn pre_cancelled_token_never_waits() {
        let mut world = ScriptedWorld::with_catalog(&[]);
        let cancel = CancelToken::new();
        cancel.cancel();
        let report = TickSynchronizer::unbounded().run(&mut world, &cancel);
        assert_eq!(report.ticks, 0);
        assert_eq!(world.tick_calls, 0);
    }

    #[test]
    fn connection_error_ends_the_loop() {
        let mut world = ScriptedWorld::with_catalog(&[]);
        world.drop_after_ticks = Some(5);
        let report = TickSynchronizer::unbounded().run(&mut world, &CancelToken::new());
        assert_eq!(report.ticks, 5);
        assert!(matches!(
            report.stop,
            StopReason::ConnectionLost(ConnectionError::Closed)
        ));
    }
}
