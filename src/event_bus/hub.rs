use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::broadcast::{self, Receiver, Sender, error::RecvError, error::TryRecvError};
use tokio::time::timeout;

use super::emitter::{EmitterError, EventEmitter};
use super::event::{Event, STREAM_END_SCOPE, StageEvent};

/// Snapshot of hub health for monitoring and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventHubMetrics {
    /// Maximum number of events buffered per subscriber before lag occurs.
    pub capacity: usize,
    /// Total count of events dropped because a subscriber fell behind.
    pub dropped: usize,
    /// Live subscriber count (sink workers plus direct streams).
    pub subscribers: usize,
}

/// Fan-out core between one job's emitters and its followers.
///
/// Publishes never block: a slow follower lags and loses the oldest
/// buffered events, which the hub counts rather than surfaces — a progress
/// follower that missed a usage snapshot has no use for an error about it.
/// Closing the hub ends every stream, which is how a finished job tells
/// its followers to go away.
#[derive(Debug)]
pub struct EventHub {
    sender: RwLock<Option<Sender<Event>>>,
    dropped: AtomicUsize,
    capacity: usize,
}

impl EventHub {
    /// `capacity` is clamped to at least 1 to satisfy the broadcast API.
    pub fn new(capacity: usize) -> Arc<Self> {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Arc::new(Self {
            sender: RwLock::new(Some(sender)),
            dropped: AtomicUsize::new(0),
            capacity,
        })
    }

    /// Publish to all current subscribers.
    ///
    /// Returns [`EmitterError::Closed`] once the hub has been shut down;
    /// an event with no subscribers is simply gone, not an error.
    pub fn publish(&self, event: Event) -> Result<(), EmitterError> {
        let sender = self.sender.read().clone();
        match sender {
            Some(sender) => {
                let _ = sender.send(event);
                Ok(())
            }
            None => Err(EmitterError::Closed),
        }
    }

    /// Open a fresh stream over everything published from now on.
    ///
    /// Subscribing to an already-closed hub yields a stream that reports
    /// end-of-job immediately.
    pub fn subscribe(self: &Arc<Self>) -> EventStream {
        let receiver = self.sender.read().as_ref().map(Sender::subscribe);
        EventStream {
            receiver,
            hub: Arc::clone(self),
        }
    }

    pub fn emitter(self: &Arc<Self>) -> HubEmitter {
        HubEmitter {
            hub: Arc::clone(self),
        }
    }

    /// Close the hub; every stream observes end-of-job.
    pub fn close(&self) {
        let _ = self.sender.write().take();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn metrics(&self) -> EventHubMetrics {
        EventHubMetrics {
            capacity: self.capacity,
            dropped: self.dropped(),
            subscribers: self
                .sender
                .read()
                .as_ref()
                .map_or(0, Sender::receiver_count),
        }
    }

    fn note_lagged(&self, missed: u64) {
        let increment = usize::try_from(missed).unwrap_or(usize::MAX);
        let total = self
            .dropped
            .fetch_add(increment, Ordering::Relaxed)
            .saturating_add(increment);
        tracing::warn!(
            target: "pipewright::event_bus",
            missed,
            total_dropped = total,
            "event follower lagged; oldest events dropped"
        );
    }
}

#[derive(Clone, Debug)]
pub struct HubEmitter {
    hub: Arc<EventHub>,
}

impl EventEmitter for HubEmitter {
    fn emit(&self, event: Event) -> Result<(), EmitterError> {
        self.hub.publish(event)
    }
}

/// Follower handle over a job's event stream.
///
/// Lag is recorded on the hub and skipped over; `None` from any receive
/// method means the hub was closed and no further events will arrive.
#[derive(Debug)]
pub struct EventStream {
    receiver: Option<Receiver<Event>>,
    hub: Arc<EventHub>,
}

impl EventStream {
    /// Next event, or `None` once the hub closes.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            let outcome = match self.receiver.as_mut() {
                Some(receiver) => receiver.recv().await,
                None => return None,
            };
            match outcome {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(missed)) => self.hub.note_lagged(missed),
                Err(RecvError::Closed) => {
                    self.receiver = None;
                    return None;
                }
            }
        }
    }

    /// Already-buffered event, without waiting.
    pub fn try_next(&mut self) -> Option<Event> {
        loop {
            let outcome = match self.receiver.as_mut() {
                Some(receiver) => receiver.try_recv(),
                None => return None,
            };
            match outcome {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(missed)) => self.hub.note_lagged(missed),
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Closed) => {
                    self.receiver = None;
                    return None;
                }
            }
        }
    }

    /// Wait up to `duration` for the next event.
    pub async fn next_timeout(&mut self, duration: Duration) -> Option<Event> {
        timeout(duration, self.recv()).await.ok().flatten()
    }

    /// Next stage lifecycle event, skipping everything else (usage
    /// snapshots, file changes, diagnostics).
    pub async fn next_stage_event(&mut self) -> Option<StageEvent> {
        while let Some(event) = self.recv().await {
            if let Event::Stage(stage) = event {
                return Some(stage);
            }
        }
        None
    }

    /// Drain the stream until the job's end-of-stream marker (or hub
    /// close), returning everything published before it. The marker itself
    /// is not included.
    pub async fn collect_job_events(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Some(event) = self.recv().await {
            if matches!(&event, Event::Diagnostic(d) if d.scope() == STREAM_END_SCOPE) {
                break;
            }
            events.push(event);
        }
        events
    }
}
