//! Priority job queue
//!
//! In-process, at-least-once delivery queue feeding the worker pool.
//! Three priority levels with FIFO order inside each level; a delivery
//! that is not acknowledged before its lease deadline becomes visible to
//! another worker. Failed deliveries are retried with capped exponential
//! backoff until a fixed attempt budget is consumed, after which the job
//! is reported exhausted and never retried automatically.
//!
//! Retry is the queue's whole-job mechanism; stages never retry on their
//! own.

use scribe_core::domain::job::JobData;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use uuid::Uuid;

/// Queue tuning parameters
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Attempts per job before it is failed out
    pub max_attempts: u32,
    /// First retry delay; doubles with every further attempt
    pub base_delay: Duration,
    /// Upper bound on the retry delay
    pub max_delay: Duration,
    /// How long a delivery stays invisible before redelivery
    pub lease: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            lease: Duration::from_secs(60),
        }
    }
}

impl QueueConfig {
    /// Backoff before the given attempt (1-based) runs
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(2).min(31);
        let delay = self.base_delay.saturating_mul(1 << doublings);
        delay.min(self.max_delay)
    }
}

/// One delivery handed to a worker
#[derive(Debug, Clone)]
pub struct Delivery {
    pub job: JobData,
    /// 1-based attempt counter for this job
    pub attempt: u32,
}

/// What [`JobQueue::nack`] decided about a failed delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Redelivered after the given backoff
    Requeued { attempt: u32, delay: Duration },
    /// Budget consumed; the job will not be retried
    Exhausted { attempts: u32 },
}

struct ReadyEntry {
    job: JobData,
    attempt: u32,
    seq: u64,
}

// BinaryHeap is a max-heap; invert the comparison so the lowest
// (priority rank, sequence) pops first.
impl Ord for ReadyEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .job
            .priority
            .rank()
            .cmp(&self.job.priority.rank())
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for ReadyEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ReadyEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ReadyEntry {}

struct DelayedEntry {
    job: JobData,
    attempt: u32,
    not_before: Instant,
}

struct Lease {
    job: JobData,
    attempt: u32,
    deadline: Instant,
}

struct QueueState {
    ready: BinaryHeap<ReadyEntry>,
    delayed: Vec<DelayedEntry>,
    leased: HashMap<Uuid, Lease>,
    seq: u64,
    closed: bool,
}

/// Shared in-process job queue
pub struct JobQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    config: QueueConfig,
}

/// Idle dequeuers re-check timers at least this often
const POLL_CAP: Duration = Duration::from_millis(500);

impl JobQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            state: Mutex::new(QueueState {
                ready: BinaryHeap::new(),
                delayed: Vec::new(),
                leased: HashMap::new(),
                seq: 0,
                closed: false,
            }),
            notify: Notify::new(),
            config,
        }
    }

    /// Makes a job available for delivery and returns its id.
    ///
    /// The submitter has already created the job's `queued` execution
    /// record before calling this.
    pub fn enqueue(&self, job: JobData) -> Uuid {
        let job_id = job.job_id;
        {
            let mut state = self.state.lock().unwrap();
            let seq = state.seq;
            state.seq += 1;
            state.ready.push(ReadyEntry {
                job,
                attempt: 1,
                seq,
            });
        }
        self.notify.notify_one();
        job_id
    }

    /// Suspends until a job is available, then leases it to the caller.
    ///
    /// Returns `None` once the queue is closed and drained of ready work.
    pub async fn dequeue(&self) -> Option<Delivery> {
        loop {
            let wait = {
                let mut state = self.state.lock().unwrap();
                let now = Instant::now();
                self.promote_due(&mut state, now);

                if let Some(entry) = state.ready.pop() {
                    let lease = Lease {
                        job: entry.job.clone(),
                        attempt: entry.attempt,
                        deadline: now + self.config.lease,
                    };
                    state.leased.insert(entry.job.job_id, lease);
                    return Some(Delivery {
                        job: entry.job,
                        attempt: entry.attempt,
                    });
                }

                if state.closed {
                    return None;
                }

                self.next_wakeup(&state, now)
            };

            let _ = tokio::time::timeout(wait, self.notify.notified()).await;
        }
    }

    /// Acknowledges a successful delivery, discharging its lease.
    pub fn ack(&self, job_id: Uuid) -> bool {
        self.state.lock().unwrap().leased.remove(&job_id).is_some()
    }

    /// Reports a failed delivery.
    ///
    /// Returns `None` when the caller no longer holds the lease (it
    /// expired and the job was redelivered elsewhere).
    pub fn nack(&self, job_id: Uuid) -> Option<RetryDecision> {
        let decision = {
            let mut state = self.state.lock().unwrap();
            let lease = state.leased.remove(&job_id)?;

            if lease.attempt >= self.config.max_attempts {
                RetryDecision::Exhausted {
                    attempts: lease.attempt,
                }
            } else {
                let attempt = lease.attempt + 1;
                let delay = self.config.delay_for_attempt(attempt);
                state.delayed.push(DelayedEntry {
                    job: lease.job,
                    attempt,
                    not_before: Instant::now() + delay,
                });
                RetryDecision::Requeued { attempt, delay }
            }
        };
        self.notify.notify_one();
        Some(decision)
    }

    /// Removes a not-yet-leased job from the queue.
    ///
    /// The unit of cancellation is a whole job that has not started; a
    /// leased delivery cannot be cancelled mid-flight.
    pub fn cancel(&self, job_id: Uuid) -> bool {
        let mut state = self.state.lock().unwrap();

        let before = state.ready.len();
        let entries: Vec<ReadyEntry> = state.ready.drain().collect();
        state.ready.extend(entries.into_iter().filter(|e| e.job.job_id != job_id));
        if state.ready.len() < before {
            return true;
        }

        let before = state.delayed.len();
        state.delayed.retain(|e| e.job.job_id != job_id);
        state.delayed.len() < before
    }

    /// Stops delivery; blocked dequeuers return `None` once drained.
    pub fn close(&self) {
        self.state.lock().unwrap().closed = true;
        self.notify.notify_waiters();
    }

    /// Jobs waiting for delivery (ready plus backed-off)
    pub fn pending(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.ready.len() + state.delayed.len()
    }

    /// Moves due retries and expired leases back into the ready heap
    fn promote_due(&self, state: &mut QueueState, now: Instant) {
        let mut due = Vec::new();
        state.delayed.retain(|entry| {
            if entry.not_before <= now {
                due.push((entry.job.clone(), entry.attempt));
                false
            } else {
                true
            }
        });

        let expired: Vec<Uuid> = state
            .leased
            .iter()
            .filter(|(_, lease)| lease.deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        for job_id in expired {
            if let Some(lease) = state.leased.remove(&job_id) {
                // A crashed worker is not a handled failure; the attempt
                // counter does not advance on lease expiry.
                due.push((lease.job, lease.attempt));
            }
        }

        for (job, attempt) in due {
            let seq = state.seq;
            state.seq += 1;
            state.ready.push(ReadyEntry { job, attempt, seq });
        }
    }

    /// How long an idle dequeuer may sleep before a timer could fire
    fn next_wakeup(&self, state: &QueueState, now: Instant) -> Duration {
        let delayed = state
            .delayed
            .iter()
            .map(|e| e.not_before.saturating_duration_since(now))
            .min();
        let leases = state
            .leased
            .values()
            .map(|l| l.deadline.saturating_duration_since(now))
            .min();

        [delayed, leases]
            .into_iter()
            .flatten()
            .min()
            .unwrap_or(POLL_CAP)
            .min(POLL_CAP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribe_core::domain::job::Priority;
    use std::collections::HashMap;

    fn fast_config() -> QueueConfig {
        QueueConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(40),
            lease: Duration::from_millis(60),
        }
    }

    fn job(priority: Priority) -> JobData {
        JobData::new("demo", HashMap::new(), "md").with_priority(priority)
    }

    #[tokio::test]
    async fn test_priority_then_fifo_ordering() {
        let queue = JobQueue::new(fast_config());

        let low = queue.enqueue(job(Priority::Low));
        let normal_a = queue.enqueue(job(Priority::Normal));
        let high = queue.enqueue(job(Priority::High));
        let normal_b = queue.enqueue(job(Priority::Normal));

        let order: Vec<Uuid> = [
            queue.dequeue().await.unwrap(),
            queue.dequeue().await.unwrap(),
            queue.dequeue().await.unwrap(),
            queue.dequeue().await.unwrap(),
        ]
        .iter()
        .map(|d| d.job.job_id)
        .collect();

        assert_eq!(order, vec![high, normal_a, normal_b, low]);
    }

    #[tokio::test]
    async fn test_acked_job_is_not_redelivered() {
        let queue = JobQueue::new(fast_config());
        let job_id = queue.enqueue(job(Priority::Normal));

        let delivery = queue.dequeue().await.unwrap();
        assert_eq!(delivery.job.job_id, job_id);
        assert!(queue.ack(job_id));

        tokio::time::sleep(Duration::from_millis(80)).await;
        let redelivered = tokio::time::timeout(Duration::from_millis(50), queue.dequeue()).await;
        assert!(redelivered.is_err(), "acked job must stay gone");
    }

    #[tokio::test]
    async fn test_expired_lease_is_redelivered() {
        let queue = JobQueue::new(fast_config());
        let job_id = queue.enqueue(job(Priority::Normal));

        let first = queue.dequeue().await.unwrap();
        assert_eq!(first.job.job_id, job_id);
        // No ack; lease (60ms) runs out.
        let second = tokio::time::timeout(Duration::from_millis(500), queue.dequeue())
            .await
            .expect("redelivery within lease window")
            .unwrap();
        assert_eq!(second.job.job_id, job_id);
        assert_eq!(second.attempt, first.attempt);
    }

    #[tokio::test]
    async fn test_nack_requeues_with_incremented_attempt() {
        let queue = JobQueue::new(fast_config());
        let job_id = queue.enqueue(job(Priority::Normal));

        let first = queue.dequeue().await.unwrap();
        assert_eq!(first.attempt, 1);

        let decision = queue.nack(job_id).unwrap();
        assert!(matches!(decision, RetryDecision::Requeued { attempt: 2, .. }));

        let second = tokio::time::timeout(Duration::from_millis(500), queue.dequeue())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.attempt, 2);
    }

    #[tokio::test]
    async fn test_attempt_budget_exhaustion() {
        let queue = JobQueue::new(fast_config());
        let job_id = queue.enqueue(job(Priority::Normal));

        for expected_attempt in 1..=2 {
            let delivery = tokio::time::timeout(Duration::from_millis(500), queue.dequeue())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(delivery.attempt, expected_attempt);
            assert!(matches!(
                queue.nack(job_id),
                Some(RetryDecision::Requeued { .. })
            ));
        }

        let last = tokio::time::timeout(Duration::from_millis(500), queue.dequeue())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(last.attempt, 3);
        assert_eq!(
            queue.nack(job_id),
            Some(RetryDecision::Exhausted { attempts: 3 })
        );
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test]
    async fn test_cancel_removes_pending_job() {
        let queue = JobQueue::new(fast_config());
        let job_id = queue.enqueue(job(Priority::Normal));

        assert!(queue.cancel(job_id));
        assert!(!queue.cancel(job_id));
        assert_eq!(queue.pending(), 0);

        let nothing = tokio::time::timeout(Duration::from_millis(50), queue.dequeue()).await;
        assert!(nothing.is_err());
    }

    #[tokio::test]
    async fn test_close_unblocks_dequeuers() {
        let queue = std::sync::Arc::new(JobQueue::new(fast_config()));

        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.dequeue().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close();

        let delivered = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(delivered.is_none());
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = QueueConfig {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            lease: Duration::from_secs(1),
        };

        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(4), Duration::from_millis(350));
        assert_eq!(config.delay_for_attempt(5), Duration::from_millis(350));
    }
}
