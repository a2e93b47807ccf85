/*!
 * Priority dispatch of plan transfers
 *
 * Every part is scheduled on exactly one of three queues, selected by the
 * priority in its plan header. Receivers always drain High before Medium
 * before Low; within one queue items come out in the order they were sent.
 */

use crossbeam_channel::{bounded, unbounded, Receiver, Select, Sender, TryRecvError};
use jobplan_core_plan::{ChannelId, JobId, JobPartPlan, JobStatus, StatusCode, TransferStatus};
use rayon::prelude::*;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::{JobPlanError, Result};

pub use crossbeam_channel::RecvTimeoutError;

/// Unit of work handed to transfer workers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TransferWork {
    pub job_id: JobId,
    pub part_num: u32,
    pub transfer_index: u32,
}

/// Sending half of the three priority queues
pub struct PrioritySender<T> {
    senders: [Sender<T>; 3],
}

impl<T> Clone for PrioritySender<T> {
    fn clone(&self) -> Self {
        Self {
            senders: self.senders.clone(),
        }
    }
}

/// Receiving half of the three priority queues
pub struct PriorityReceiver<T> {
    receivers: [Receiver<T>; 3],
}

impl<T> Clone for PriorityReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            receivers: self.receivers.clone(),
        }
    }
}

/// Create the three queues; `capacity` bounds each one, 0 means unbounded
pub fn priority_channels<T>(capacity: usize) -> (PrioritySender<T>, PriorityReceiver<T>) {
    let make = || {
        if capacity == 0 {
            unbounded()
        } else {
            bounded(capacity)
        }
    };
    let (high_tx, high_rx) = make();
    let (medium_tx, medium_rx) = make();
    let (low_tx, low_rx) = make();
    (
        PrioritySender {
            senders: [high_tx, medium_tx, low_tx],
        },
        PriorityReceiver {
            receivers: [high_rx, medium_rx, low_rx],
        },
    )
}

impl<T> PrioritySender<T> {
    /// Enqueue on `channel`, blocking while a bounded queue is full
    pub fn send(&self, channel: ChannelId, item: T) -> Result<()> {
        self.senders[channel.index()].send(item).map_err(|_| {
            JobPlanError::Dispatch(format!("{} queue has no receivers", channel))
        })
    }
}

enum Poll<T> {
    Item(ChannelId, T),
    /// No item; the mask lists queues that still have senders
    Empty([bool; 3]),
    Closed,
}

impl<T> PriorityReceiver<T> {
    fn poll(&self) -> Poll<T> {
        let mut open = [false; 3];
        for channel in ChannelId::ALL {
            match self.receivers[channel.index()].try_recv() {
                Ok(item) => return Poll::Item(channel, item),
                Err(TryRecvError::Empty) => open[channel.index()] = true,
                Err(TryRecvError::Disconnected) => {}
            }
        }
        if open.iter().any(|o| *o) {
            Poll::Empty(open)
        } else {
            Poll::Closed
        }
    }

    fn select(&self, open: &[bool; 3]) -> Select<'_> {
        let mut sel = Select::new();
        for channel in ChannelId::ALL {
            if open[channel.index()] {
                sel.recv(&self.receivers[channel.index()]);
            }
        }
        sel
    }

    /// Highest-priority item available right now
    pub fn try_recv(&self) -> Option<(ChannelId, T)> {
        match self.poll() {
            Poll::Item(channel, item) => Some((channel, item)),
            _ => None,
        }
    }

    /// Block for the highest-priority item; `None` once all senders are gone
    /// and every queue is drained
    pub fn recv(&self) -> Option<(ChannelId, T)> {
        loop {
            match self.poll() {
                Poll::Item(channel, item) => return Some((channel, item)),
                Poll::Closed => return None,
                Poll::Empty(open) => {
                    // Wake on any queue, then re-poll in priority order
                    self.select(&open).ready();
                }
            }
        }
    }

    /// Like [`recv`](Self::recv) with an upper bound on the wait
    pub fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> std::result::Result<(ChannelId, T), RecvTimeoutError> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.poll() {
                Poll::Item(channel, item) => return Ok((channel, item)),
                Poll::Closed => return Err(RecvTimeoutError::Disconnected),
                Poll::Empty(open) => {
                    if self.select(&open).ready_deadline(deadline).is_err() {
                        return Err(RecvTimeoutError::Timeout);
                    }
                }
            }
        }
    }

    /// Queued items on `channel`
    pub fn len(&self, channel: ChannelId) -> usize {
        self.receivers[channel.index()].len()
    }

    /// True when all three queues are empty
    pub fn is_empty(&self) -> bool {
        self.receivers.iter().all(|r| r.is_empty())
    }

    /// Iterator that yields items in priority order until the queues close
    pub fn iter(&self) -> impl Iterator<Item = (ChannelId, T)> + '_ {
        std::iter::from_fn(move || self.recv())
    }
}

/// Enqueue every unfinished transfer of `plan` on the part's channel
///
/// Nothing is enqueued unless the job status is InProgress, so a paused or
/// cancelled part stops feeding workers. Returns the number of items sent.
pub fn dispatch_part(plan: &JobPartPlan, sender: &PrioritySender<TransferWork>) -> Result<usize> {
    let status = plan.job_status();
    if status.code() != JobStatus::InProgress.code() {
        debug!(
            job_id = %plan.job_id(),
            part_num = plan.part_num(),
            status = status.describe(),
            "Part not dispatched"
        );
        return Ok(0);
    }

    let channel = plan.channel();
    let mut sent = 0;
    for view in plan.transfers() {
        if view.status().code() != TransferStatus::InProgress.code() {
            continue;
        }
        sender.send(
            channel,
            TransferWork {
                job_id: plan.job_id(),
                part_num: plan.part_num(),
                transfer_index: view.index(),
            },
        )?;
        sent += 1;
    }

    info!(
        job_id = %plan.job_id(),
        part_num = plan.part_num(),
        channel = %channel,
        transfers = sent,
        "Dispatched part"
    );
    Ok(sent)
}

/// Outcome counts of a worker run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub processed: u64,
    pub failed: u64,
}

/// Drain `receiver` on a pool of `threads` workers until every sender is gone
///
/// Items are pulled in priority order. Handler errors are counted and logged,
/// never propagated.
pub fn run_workers<T, F>(receiver: &PriorityReceiver<T>, threads: usize, handler: F) -> Result<WorkerStats>
where
    T: Send,
    F: Fn(ChannelId, T) -> Result<()> + Sync,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .build()
        .map_err(|e| JobPlanError::Dispatch(e.to_string()))?;

    let processed = AtomicU64::new(0);
    let failed = AtomicU64::new(0);

    pool.install(|| {
        receiver.iter().par_bridge().for_each(|(channel, item)| {
            processed.fetch_add(1, Ordering::Relaxed);
            if let Err(e) = handler(channel, item) {
                warn!(channel = %channel, error = %e, "Transfer worker failed");
                failed.fetch_add(1, Ordering::Relaxed);
            }
        });
    });

    Ok(WorkerStats {
        processed: processed.into_inner(),
        failed: failed.into_inner(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_drains_high_first() {
        let (tx, rx) = priority_channels(0);
        tx.send(ChannelId::Low, "low-1").unwrap();
        tx.send(ChannelId::Medium, "medium-1").unwrap();
        tx.send(ChannelId::Low, "low-2").unwrap();
        tx.send(ChannelId::High, "high-1").unwrap();
        drop(tx);

        let order: Vec<_> = rx.iter().map(|(_, item)| item).collect();
        assert_eq!(order, vec!["high-1", "medium-1", "low-1", "low-2"]);
    }

    #[test]
    fn test_try_recv_empty() {
        let (tx, rx) = priority_channels::<u32>(4);
        assert!(rx.try_recv().is_none());
        tx.send(ChannelId::Medium, 7).unwrap();
        assert_eq!(rx.len(ChannelId::Medium), 1);
        assert_eq!(rx.try_recv(), Some((ChannelId::Medium, 7)));
        assert!(rx.is_empty());
    }

    #[test]
    fn test_recv_none_after_senders_drop() {
        let (tx, rx) = priority_channels::<u32>(4);
        tx.send(ChannelId::Low, 1).unwrap();
        drop(tx);
        assert_eq!(rx.recv(), Some((ChannelId::Low, 1)));
        assert_eq!(rx.recv(), None);
    }

    #[test]
    fn test_recv_timeout() {
        let (tx, rx) = priority_channels::<u32>(4);
        assert_eq!(
            rx.recv_timeout(Duration::from_millis(20)),
            Err(RecvTimeoutError::Timeout)
        );
        tx.send(ChannelId::High, 3).unwrap();
        assert_eq!(
            rx.recv_timeout(Duration::from_millis(20)),
            Ok((ChannelId::High, 3))
        );
        drop(tx);
        assert_eq!(
            rx.recv_timeout(Duration::from_millis(20)),
            Err(RecvTimeoutError::Disconnected)
        );
    }

    #[test]
    fn test_recv_blocks_until_send() {
        let (tx, rx) = priority_channels::<u32>(0);
        let handle = thread::spawn(move || rx.recv());
        thread::sleep(Duration::from_millis(20));
        tx.send(ChannelId::Low, 42).unwrap();
        assert_eq!(handle.join().unwrap(), Some((ChannelId::Low, 42)));
    }

    #[test]
    fn test_send_without_receivers() {
        let (tx, rx) = priority_channels::<u32>(1);
        drop(rx);
        assert!(matches!(
            tx.send(ChannelId::High, 1),
            Err(JobPlanError::Dispatch(_))
        ));
    }

    #[test]
    fn test_run_workers_counts_failures() {
        let (tx, rx) = priority_channels(0);
        for i in 0..10u32 {
            tx.send(ChannelId::ALL[(i % 3) as usize], i).unwrap();
        }
        drop(tx);

        let stats = run_workers(&rx, 4, |_, i| {
            if i % 5 == 0 {
                Err(JobPlanError::Other(format!("item {}", i)))
            } else {
                Ok(())
            }
        })
        .unwrap();
        assert_eq!(stats.processed, 10);
        assert_eq!(stats.failed, 2);
    }
}
