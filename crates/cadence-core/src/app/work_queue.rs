//! Work queue of reconcile requests.
//!
//! Design:
//! - A request is `(job_id, action)`; the job itself lives in the `JobStore`.
//! - A job is never leased twice at the same time. Requests for a job that is
//!   in flight wait in the ready queue until `done` is called for it.
//! - Failed requests go to a scheduled heap and come back after a backoff.

use std::collections::{BinaryHeap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, Notify};

use super::retry::RetryPolicy;
use crate::domain::{Action, JobId};

/// One reconcile request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    pub job_id: JobId,
    pub action: Action,

    /// Failed attempts so far.
    pub attempts: u32,
}

impl Request {
    pub fn new(job_id: JobId, action: Action) -> Self {
        Self {
            job_id,
            action,
            attempts: 0,
        }
    }
}

/// What `WorkQueue::retry` did with a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// Back in the queue after this delay.
    Scheduled(Duration),

    /// The request has used up its retries and was dropped.
    Exhausted,

    /// The queue is shutting down; nothing is scheduled any more.
    ShuttingDown,
}

/// Scheduled entry for the retry heap.
///
/// Reverse ordering so BinaryHeap acts as a min-heap (earliest first);
/// `seq` keeps equal deadlines in insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ScheduledRequest {
    next_run_at: Instant,
    seq: u64,
    request: Request,
}

impl PartialOrd for ScheduledRequest {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledRequest {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .next_run_at
            .cmp(&self.next_run_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct WorkQueueState {
    ready: VecDeque<Request>,
    scheduled: BinaryHeap<ScheduledRequest>,

    /// Jobs currently leased by a worker.
    in_flight: HashSet<JobId>,

    next_seq: u64,
    shutdown: bool,
}

impl WorkQueueState {
    /// Move requests from scheduled to ready if their time has come.
    fn promote_scheduled(&mut self) {
        let now = Instant::now();
        while let Some(entry) = self.scheduled.peek() {
            if entry.next_run_at > now {
                break;
            }
            if let Some(entry) = self.scheduled.pop() {
                self.ready.push_back(entry.request);
            }
        }
    }

    /// First ready request whose job is not in flight.
    fn take_leasable(&mut self) -> Option<Request> {
        let index = self
            .ready
            .iter()
            .position(|r| !self.in_flight.contains(&r.job_id))?;
        let request = self.ready.remove(index)?;
        self.in_flight.insert(request.job_id);
        Some(request)
    }
}

pub struct WorkQueue {
    state: Mutex<WorkQueueState>,
    notify: Notify,
    retry_policy: RetryPolicy,
    max_retries: u32,
}

impl WorkQueue {
    pub fn new(retry_policy: RetryPolicy, max_retries: u32) -> Self {
        Self {
            state: Mutex::new(WorkQueueState {
                ready: VecDeque::new(),
                scheduled: BinaryHeap::new(),
                in_flight: HashSet::new(),
                next_seq: 0,
                shutdown: false,
            }),
            notify: Notify::new(),
            retry_policy,
            max_retries,
        }
    }

    /// Queue `action` for `job_id`. An identical fresh request already waiting is reused.
    pub async fn add(&self, job_id: JobId, action: Action) {
        let request = Request::new(job_id, action);
        {
            let mut state = self.state.lock().await;
            if state.shutdown || state.ready.contains(&request) {
                return;
            }
            state.ready.push_back(request);
        }
        self.notify.notify_one();
    }

    /// Wait for a request whose job is not in flight. `None` after shutdown.
    pub async fn lease(&self) -> Option<Request> {
        loop {
            let next_wake = {
                let mut state = self.state.lock().await;
                if state.shutdown {
                    return None;
                }
                state.promote_scheduled();

                if let Some(request) = state.take_leasable() {
                    return Some(request);
                }

                state.scheduled.peek().map(|entry| entry.next_run_at)
            };

            if let Some(wake_time) = next_wake {
                tokio::select! {
                    _ = self.notify.notified() => {},
                    _ = tokio::time::sleep_until(wake_time.into()) => {},
                }
            } else {
                self.notify.notified().await;
            }
        }
    }

    /// Release the job leased with a request. Must be called once per lease.
    pub async fn done(&self, job_id: JobId) {
        {
            let mut state = self.state.lock().await;
            state.in_flight.remove(&job_id);
        }
        // Another worker may be waiting on a request for this job.
        self.notify.notify_one();
    }

    /// Schedule a failed request again after backoff.
    pub async fn retry(&self, request: Request) -> RetryOutcome {
        let attempts = request.attempts.saturating_add(1);
        let delay = self.retry_policy.next_delay(attempts);
        {
            let mut state = self.state.lock().await;
            if state.shutdown {
                return RetryOutcome::ShuttingDown;
            }
            if attempts > self.max_retries {
                return RetryOutcome::Exhausted;
            }
            let now = Instant::now();
            let seq = state.next_seq;
            state.next_seq += 1;
            state.scheduled.push(ScheduledRequest {
                next_run_at: now.checked_add(delay).unwrap_or(now),
                seq,
                request: Request { attempts, ..request },
            });
        }
        self.notify.notify_one();
        RetryOutcome::Scheduled(delay)
    }

    /// Stop handing out leases. Waiting `lease` calls return `None`.
    pub async fn shutdown(&self) {
        {
            let mut state = self.state.lock().await;
            state.shutdown = true;
        }
        self.notify.notify_waiters();
    }

    /// Requests waiting (ready or scheduled), excluding leased ones.
    pub async fn len(&self) -> usize {
        let state = self.state.lock().await;
        state.ready.len() + state.scheduled.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
