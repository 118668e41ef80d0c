//! Cancellable, timeout-bound wait primitive.
//!
//! Replaces the monitor/condition-variable "wait until initialised" pattern
//! with a single gate returning a tri-state outcome.  Every wait takes an
//! explicit timeout: an unbounded wait against a bus with no delivery
//! acknowledgment is a correctness bug, not a feature.

use std::time::Duration;

use tokio::sync::watch;

/// Result of a bounded wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The condition was met before the timeout.
    Ready,
    /// The timeout elapsed first.
    TimedOut,
    /// The wait was cancelled (explicitly, or because the producing side
    /// went away).
    Cancelled,
}

impl WaitOutcome {
    /// `true` only for [`WaitOutcome::Ready`].
    pub fn is_ready(&self) -> bool {
        matches!(self, WaitOutcome::Ready)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateState {
    Pending,
    Open,
    Cancelled,
}

/// Producer side of a [`WaitGate`].
pub struct GateHandle {
    tx: watch::Sender<GateState>,
}

impl GateHandle {
    /// Mark the gate ready.  Idempotent; a cancelled gate stays cancelled.
    pub fn open(&self) {
        self.tx.send_if_modified(|state| {
            if *state == GateState::Pending {
                *state = GateState::Open;
                true
            } else {
                false
            }
        });
    }

    /// Cancel the gate.  Idempotent; an open gate stays open.
    pub fn cancel(&self) {
        self.tx.send_if_modified(|state| {
            if *state == GateState::Pending {
                *state = GateState::Cancelled;
                true
            } else {
                false
            }
        });
    }
}

/// Consumer side: a cloneable gate that waiters block on.
#[derive(Clone)]
pub struct WaitGate {
    rx: watch::Receiver<GateState>,
}

impl WaitGate {
    /// Wait until the gate opens, is cancelled, or `timeout` elapses.
    ///
    /// Dropping the [`GateHandle`] while the gate is still pending counts as
    /// cancellation.
    pub async fn wait(&mut self, timeout: Duration) -> WaitOutcome {
        let waited = tokio::time::timeout(
            timeout,
            self.rx.wait_for(|state| *state != GateState::Pending),
        )
        .await;
        match waited {
            Err(_) => WaitOutcome::TimedOut,
            Ok(Err(_)) => WaitOutcome::Cancelled,
            Ok(Ok(state)) => match *state {
                GateState::Open => WaitOutcome::Ready,
                GateState::Cancelled => WaitOutcome::Cancelled,
                GateState::Pending => unreachable!("wait_for filters Pending"),
            },
        }
    }

    /// `true` once the gate has been opened.
    pub fn is_open(&self) -> bool {
        *self.rx.borrow() == GateState::Open
    }
}

/// Create a connected gate pair.
pub fn wait_gate() -> (GateHandle, WaitGate) {
    let (tx, rx) = watch::channel(GateState::Pending);
    (GateHandle { tx }, WaitGate { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn opened_gate_reports_ready() {
        let (handle, mut gate) = wait_gate();
        handle.open();
        assert_eq!(gate.wait(Duration::from_secs(1)).await, WaitOutcome::Ready);
        assert!(gate.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn pending_gate_times_out() {
        let (_handle, mut gate) = wait_gate();
        assert_eq!(
            gate.wait(Duration::from_millis(500)).await,
            WaitOutcome::TimedOut
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_gate_reports_cancelled() {
        let (handle, mut gate) = wait_gate();
        handle.cancel();
        assert_eq!(
            gate.wait(Duration::from_secs(1)).await,
            WaitOutcome::Cancelled
        );
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_cancels_waiters() {
        let (handle, mut gate) = wait_gate();
        drop(handle);
        assert_eq!(
            gate.wait(Duration::from_secs(1)).await,
            WaitOutcome::Cancelled
        );
    }

    #[tokio::test(start_paused = true)]
    async fn open_wins_over_late_cancel() {
        let (handle, mut gate) = wait_gate();
        handle.open();
        handle.cancel();
        assert_eq!(gate.wait(Duration::from_secs(1)).await, WaitOutcome::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn waiter_unblocks_when_opened_mid_wait() {
        let (handle, mut gate) = wait_gate();
        let waiter = tokio::spawn(async move { gate.wait(Duration::from_secs(10)).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.open();
        assert_eq!(waiter.await.unwrap(), WaitOutcome::Ready);
    }
}
