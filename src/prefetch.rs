//! Prefetching iterator: overlap upstream production with downstream use.
//!
//! A background thread pulls from the wrapped stream and keeps at most `depth`
//! items ahead of the consumer: `depth - 1` waiting in a bounded FIFO channel
//! plus the one it holds while blocked on a full channel. The consumer sees exactly the
//! sequence it would see without prefetching. Errors travel through the buffer
//! like values, so an error is observed at its own slot.
//!
//! Dropping the iterator stops the producer: it raises a stop flag and drops the
//! receiving end, which unblocks a producer waiting on a full buffer. The thread
//! is joined if it exits within [`SHUTDOWN_GRACE`]. A producer stuck inside the
//! upstream (a blocking source, or a filter that never matches again) is
//! detached instead, so dropping never blocks the consumer indefinitely; it
//! exits as soon as the upstream yields. A depth of zero performs no background
//! work at all.

use crate::element::Element;
use crate::error::{Error, Result};
use crate::source::ElementStream;
use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, bounded};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

/// How long dropping a [`PrefetchIter`] waits for its producer to exit before
/// detaching it.
pub const SHUTDOWN_GRACE: Duration = Duration::from_millis(100);

/// Iterator over a stream that is being produced ahead on another thread.
pub struct PrefetchIter {
    inner: Inner,
}

enum Inner {
    Direct(ElementStream),
    Background {
        rx: Option<Receiver<Result<Element>>>,
        stop: Arc<AtomicBool>,
        // Disconnects when the producer thread exits.
        exited: Receiver<()>,
        handle: Option<JoinHandle<()>>,
    },
}

impl PrefetchIter {
    /// Start prefetching `stream` with a buffer of `depth` items.
    ///
    /// # Errors
    /// [`Error::Io`] if the producer thread cannot be spawned.
    pub fn spawn(stream: ElementStream, depth: usize) -> Result<Self> {
        if depth == 0 {
            return Ok(Self {
                inner: Inner::Direct(stream),
            });
        }

        // The producer holds one item while blocked on `send`, so the channel
        // keeps one slot fewer than `depth` (a rendezvous channel at depth 1).
        let (tx, rx) = bounded::<Result<Element>>(depth - 1);
        let (exit_tx, exited) = bounded::<()>(0);
        let stop = Arc::new(AtomicBool::new(false));
        let producer_stop = Arc::clone(&stop);
        let handle = std::thread::Builder::new()
            .name("ironpipe-prefetch".to_string())
            .spawn(move || {
                let _exit: Sender<()> = exit_tx;
                tracing::debug!(depth, "prefetch producer started");
                let mut stream = stream;
                while !producer_stop.load(Ordering::Relaxed) {
                    let item = match catch_unwind(AssertUnwindSafe(|| stream.next())) {
                        Ok(Some(item)) => item,
                        Ok(None) => break,
                        Err(_) => Err(Error::WorkerFailure {
                            step: "prefetch".to_string(),
                            reason: "producer panicked".to_string(),
                        }),
                    };
                    let failed = item.is_err();
                    if tx.send(item).is_err() || failed {
                        break;
                    }
                }
                tracing::debug!("prefetch producer stopped");
            })
            .map_err(Error::Io)?;

        Ok(Self {
            inner: Inner::Background {
                rx: Some(rx),
                stop,
                exited,
                handle: Some(handle),
            },
        })
    }
}

impl Iterator for PrefetchIter {
    type Item = Result<Element>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            Inner::Direct(stream) => stream.next(),
            Inner::Background { rx, .. } => rx.as_ref()?.recv().ok(),
        }
    }
}

impl Drop for PrefetchIter {
    fn drop(&mut self) {
        if let Inner::Background {
            rx,
            stop,
            exited,
            handle,
        } = &mut self.inner
        {
            stop.store(true, Ordering::Relaxed);
            drop(rx.take());
            let Some(handle) = handle.take() else { return };
            match exited.recv_timeout(SHUTDOWN_GRACE) {
                Err(RecvTimeoutError::Timeout) => {
                    tracing::debug!("prefetch producer still busy upstream, detaching");
                }
                _ => {
                    let _ = handle.join();
                }
            }
        }
    }
}
