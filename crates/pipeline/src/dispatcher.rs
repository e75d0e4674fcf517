//! Dispatcher - per-partition ordered processing
//!
//! Every event carries one or more partition keys (see
//! [`IngressEvent::partition_keys`]). Each key remembers the completion
//! signal of the last event admitted for it. A new event is spawned on its
//! own task that first waits for the previous event of each of its keys,
//! then runs the processor, then releases its own signal.
//!
//! Events sharing a key run strictly in admission order; events with
//! disjoint keys never wait on each other. A key's entry is dropped once
//! its last event finishes. A semaphore bounds the events admitted but not
//! yet finished.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{oneshot, watch, OwnedSemaphorePermit, Semaphore};

use riskwatch_core::IngressEvent;

use crate::error::{EngineError, EngineResult};
use crate::processor::{EventProcessor, ProcessOutcome};

/// Completion signal of the last event admitted for a key
struct Tail {
    seq: u64,
    done: watch::Receiver<()>,
}

type Tails = Arc<Mutex<HashMap<String, Tail>>>;

fn lock(tails: &Tails) -> MutexGuard<'_, HashMap<String, Tail>> {
    tails.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Held by a running event; dropping it (also on panic) wakes the events
/// queued behind it and forgets keys nobody else has claimed since
struct Release {
    tails: Tails,
    keys: Vec<String>,
    seq: u64,
    _done: watch::Sender<()>,
    _permit: OwnedSemaphorePermit,
}

impl Drop for Release {
    fn drop(&mut self) {
        let mut tails = lock(&self.tails);
        for key in &self.keys {
            if tails.get(key).map_or(false, |tail| tail.seq == self.seq) {
                tails.remove(key);
            }
        }
    }
}

pub struct Dispatcher {
    processor: Arc<EventProcessor>,
    tails: Tails,
    next_seq: AtomicU64,
    permits: Arc<Semaphore>,
    capacity: u32,
}

impl Dispatcher {
    /// Dispatcher admitting at most `queue_capacity` unfinished events
    pub fn new(processor: Arc<EventProcessor>, queue_capacity: usize) -> Self {
        let max = Semaphore::MAX_PERMITS.min(u32::MAX as usize);
        let capacity = queue_capacity.clamp(1, max) as u32;
        Self {
            processor,
            tails: Arc::new(Mutex::new(HashMap::new())),
            next_seq: AtomicU64::new(0),
            permits: Arc::new(Semaphore::new(capacity as usize)),
            capacity,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Keys with an admitted event that has not finished yet
    pub fn active_partitions(&self) -> usize {
        lock(&self.tails).len()
    }

    /// Queue an event behind earlier events of its partitions and wait for
    /// its outcome
    pub async fn submit(&self, event: IngressEvent) -> EngineResult<ProcessOutcome> {
        let reply = self.enqueue(event).await?;
        reply
            .await
            .map_err(|_| EngineError::WorkerUnavailable("reply dropped".to_string()))?
    }

    /// Queue an event without waiting for it to be processed.
    ///
    /// Order is fixed once this returns, so calling `enqueue` for several
    /// events and awaiting the receivers later keeps per-partition order.
    pub async fn enqueue(
        &self,
        event: IngressEvent,
    ) -> EngineResult<oneshot::Receiver<EngineResult<ProcessOutcome>>> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| EngineError::WorkerUnavailable("dispatcher closed".to_string()))?;

        let keys = event.partition_keys();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let (done, tail) = watch::channel(());

        let predecessors: Vec<watch::Receiver<()>> = {
            let mut tails = lock(&self.tails);
            keys.iter()
                .filter_map(|key| {
                    tails
                        .insert(
                            key.clone(),
                            Tail {
                                seq,
                                done: tail.clone(),
                            },
                        )
                        .map(|previous| previous.done)
                })
                .collect()
        };

        let release = Release {
            tails: self.tails.clone(),
            keys,
            seq,
            _done: done,
            _permit: permit,
        };
        let (reply, rx) = oneshot::channel();
        tokio::spawn(run(
            self.processor.clone(),
            event,
            predecessors,
            release,
            reply,
        ));
        Ok(rx)
    }

    /// Stop admitting and wait for every admitted event to finish
    pub async fn shutdown(self) {
        match self.permits.acquire_many(self.capacity).await {
            Ok(_all) => tracing::debug!("Dispatcher drained"),
            Err(e) => tracing::warn!(error = %e, "Dispatcher closed before draining"),
        }
        self.permits.close();
    }
}

async fn run(
    processor: Arc<EventProcessor>,
    event: IngressEvent,
    predecessors: Vec<watch::Receiver<()>>,
    release: Release,
    reply: oneshot::Sender<EngineResult<ProcessOutcome>>,
) {
    // The sender is never used to publish; `changed` returns once it is dropped
    for mut previous in predecessors {
        let _ = previous.changed().await;
    }

    let result = processor.process(event).await;
    if let Err(e) = &result {
        if !e.is_validation() {
            tracing::error!(
                partitions = %release.keys.join(","),
                error = %e,
                "Event processing failed"
            );
        }
    }
    drop(release);
    // caller may have stopped waiting
    let _ = reply.send(result);
}
