//! One-shot, cancellable delivery of a request's outcome.
//!
//! # Design
//! A request's outcome moves from the transfer task to the caller over a
//! `tokio::sync::oneshot` channel. Whether it is actually handed over is
//! decided by [`Delivery`], a three-state atomic (pending, completed,
//! cancelled) that only ever leaves `pending` once. Delivery and cancellation
//! race through the same compare-and-swap, so a request yields at most one
//! outcome and a successful cancel guarantees it yields none.
//!
//! Two ways to consume a request:
//! - await the [`PendingRequest`] future; `cancel` or dropping it aborts the
//!   transfer;
//! - [`PendingRequest::on_complete`] registers a callback and returns a
//!   [`RequestHandle`] whose `cancel` can be called from anywhere.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;

use crate::error::{ApiError, TransportError};

const PENDING: u8 = 0;
const COMPLETED: u8 = 1;
const CANCELLED: u8 = 2;

#[derive(Debug, Default)]
pub(crate) struct Delivery {
    state: AtomicU8,
}

impl Delivery {
    fn settle(&self, to: u8) -> bool {
        self.state
            .compare_exchange(PENDING, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Claims the right to hand over the outcome. Fails if cancelled or already delivered.
    pub(crate) fn try_complete(&self) -> bool {
        self.settle(COMPLETED)
    }

    /// Fails if the outcome was already delivered.
    pub(crate) fn try_cancel(&self) -> bool {
        self.settle(CANCELLED)
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::Acquire) == CANCELLED
    }

    pub(crate) fn is_completed(&self) -> bool {
        self.state.load(Ordering::Acquire) == COMPLETED
    }
}

type Outcome<V> = Result<V, ApiError>;

enum State<V> {
    /// Failed before a transfer was started.
    Ready(Outcome<V>),
    InFlight {
        rx: oneshot::Receiver<Outcome<V>>,
        task: AbortHandle,
        /// Runtime the transfer was spawned on; callback watchers go there too.
        runtime: Handle,
    },
    Done,
}

/// An issued request. Resolves to the request's single outcome.
///
/// Dropping it before it resolves cancels the request.
#[must_use = "requests are cancelled when dropped"]
pub struct PendingRequest<V> {
    state: State<V>,
    delivery: Arc<Delivery>,
}

// No field is ever pinned.
impl<V> Unpin for PendingRequest<V> {}

impl<V> PendingRequest<V> {
    pub(crate) fn ready(outcome: Outcome<V>) -> Self {
        Self {
            state: State::Ready(outcome),
            delivery: Arc::new(Delivery::default()),
        }
    }

    pub(crate) fn in_flight(
        rx: oneshot::Receiver<Outcome<V>>,
        task: AbortHandle,
        runtime: Handle,
        delivery: Arc<Delivery>,
    ) -> Self {
        Self {
            state: State::InFlight { rx, task, runtime },
            delivery,
        }
    }

    /// Cancels the request. Returns `false` if the outcome had already been delivered.
    pub fn cancel(mut self) -> bool {
        self.cancel_in_place()
    }

    fn cancel_in_place(&mut self) -> bool {
        let cancelled = self.delivery.try_cancel();
        if cancelled {
            if let State::InFlight { task, .. } = &self.state {
                task.abort();
            }
        }
        self.state = State::Done;
        cancelled
    }

    /// Delivers the outcome to `callback` instead of through `.await`.
    ///
    /// `callback` runs at most once, on a Tokio worker. A request that failed
    /// before its transfer started invokes it immediately on this thread.
    /// Dropping the returned handle does not cancel the request.
    pub fn on_complete<F>(mut self, callback: F) -> RequestHandle
    where
        F: FnOnce(Outcome<V>) + Send + 'static,
        V: Send + 'static,
    {
        let delivery = Arc::clone(&self.delivery);
        let tasks = match std::mem::replace(&mut self.state, State::Done) {
            State::Ready(outcome) => {
                if delivery.try_complete() {
                    callback(outcome);
                }
                Vec::new()
            }
            State::InFlight { rx, task, runtime } => {
                let watcher_delivery = Arc::clone(&delivery);
                let watcher = runtime.spawn(async move {
                    let outcome = rx
                        .await
                        .unwrap_or_else(|_| Err(TransportError::Cancelled.into()));
                    if watcher_delivery.try_complete() {
                        callback(outcome);
                    }
                });
                vec![task, watcher.abort_handle()]
            }
            State::Done => Vec::new(),
        };
        RequestHandle { delivery, tasks }
    }
}

impl<V> Future for PendingRequest<V> {
    type Output = Outcome<V>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let State::InFlight { rx, .. } = &mut this.state {
            // A closed channel means the transfer task ended without sending, e.g. it panicked.
            let outcome = ready!(Pin::new(rx).poll(cx))
                .unwrap_or_else(|_| Err(TransportError::Cancelled.into()));
            this.state = State::Done;
            this.delivery.try_complete();
            return Poll::Ready(outcome);
        }
        let outcome = match std::mem::replace(&mut this.state, State::Done) {
            State::Ready(outcome) => outcome,
            // Polled again after completion.
            _ => Err(TransportError::Cancelled.into()),
        };
        this.delivery.try_complete();
        Poll::Ready(outcome)
    }
}

impl<V> Drop for PendingRequest<V> {
    fn drop(&mut self) {
        if matches!(self.state, State::InFlight { .. }) {
            self.cancel_in_place();
        }
    }
}

impl<V> fmt::Debug for PendingRequest<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            State::Ready(_) => "ready",
            State::InFlight { .. } => "in_flight",
            State::Done => "done",
        };
        f.debug_struct("PendingRequest").field("state", &state).finish()
    }
}

/// Control over a request whose outcome goes to a callback.
#[derive(Debug)]
pub struct RequestHandle {
    delivery: Arc<Delivery>,
    tasks: Vec<AbortHandle>,
}

impl RequestHandle {
    /// Suppresses the callback and aborts the transfer. Returns `false`, and
    /// does nothing, if the callback has already been invoked.
    pub fn cancel(&self) -> bool {
        if !self.delivery.try_cancel() {
            return false;
        }
        for task in &self.tasks {
            task.abort();
        }
        true
    }

    pub fn is_completed(&self) -> bool {
        self.delivery.is_completed()
    }

    pub fn is_cancelled(&self) -> bool {
        self.delivery.is_cancelled()
    }
}
