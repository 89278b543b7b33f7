//! Bounded worker pool for pixel decompression
//!
//! Tasks queue FIFO; each worker executes one task at a time and posts the
//! result back over a channel, tagged with its frame index since completion
//! order across workers is unspecified. Abort clears the queue immediately;
//! a worker already decoding finishes but its result is discarded.

use super::DecodeError;
use super::codec::{self, Algorithm, PixelMeta};
use log::debug;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

/// One decompression unit of work: a single frame.
#[derive(Debug)]
pub struct DecodeTask {
    pub frame_index: usize,
    pub bytes: Vec<u8>,
    pub meta: PixelMeta,
    pub algorithm: Algorithm,
}

/// A completed frame, tagged for reassembly.
#[derive(Debug)]
pub struct DecodeItem {
    pub frame_index: usize,
    pub bytes: Vec<u8>,
}

/// Message posted back to the consuming side.
#[derive(Debug)]
pub enum PoolMessage {
    Item(DecodeItem),
    Error {
        frame_index: usize,
        error: DecodeError,
    },
    Aborted,
}

struct Shared {
    queue: Mutex<VecDeque<DecodeTask>>,
    available: Condvar,
    aborted: AtomicBool,
    shutdown: AtomicBool,
}

/// Cloneable handle requesting cooperative cancellation.
#[derive(Clone)]
pub struct AbortHandle {
    shared: Arc<Shared>,
    sender: Sender<PoolMessage>,
}

impl AbortHandle {
    /// Drop all queued tasks (guaranteed) and request in-flight tasks to
    /// discard their results (best-effort).
    pub fn abort(&self) {
        let dropped = {
            let mut queue = self.shared.queue.lock().unwrap();
            let dropped = queue.len();
            queue.clear();
            dropped
        };
        self.shared.aborted.store(true, Ordering::SeqCst);
        self.shared.available.notify_all();
        debug!("decode pool aborted, {dropped} queued task(s) dropped");
        // wake a receiver blocked on the message channel
        let _ = self.sender.send(PoolMessage::Aborted);
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.shared.aborted.load(Ordering::SeqCst)
    }
}

/// Fixed-size pool of decode workers.
pub struct DecodePool {
    shared: Arc<Shared>,
    sender: Sender<PoolMessage>,
    receiver: Receiver<PoolMessage>,
    workers: Vec<JoinHandle<()>>,
}

impl DecodePool {
    pub const DEFAULT_SIZE: usize = 8;
    pub const MAX_SIZE: usize = 15;

    #[must_use]
    pub fn new(size: usize) -> Self {
        let size = size.clamp(1, Self::MAX_SIZE);
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            aborted: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
        });
        let (sender, receiver) = channel();
        let workers = (0..size)
            .map(|_| {
                let shared = Arc::clone(&shared);
                let sender = sender.clone();
                std::thread::spawn(move || worker_loop(&shared, &sender))
            })
            .collect();
        Self {
            shared,
            sender,
            receiver,
            workers,
        }
    }

    /// Queue a task. Tasks submitted after an abort are dropped.
    pub fn submit(&self, task: DecodeTask) {
        if self.shared.aborted.load(Ordering::SeqCst) {
            return;
        }
        self.shared.queue.lock().unwrap().push_back(task);
        self.shared.available.notify_one();
    }

    /// Receiving end for completion, error and abort messages.
    #[must_use]
    pub fn messages(&self) -> &Receiver<PoolMessage> {
        &self.receiver
    }

    #[must_use]
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            shared: Arc::clone(&self.shared),
            sender: self.sender.clone(),
        }
    }
}

impl Drop for DecodePool {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.available.notify_all();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn worker_loop(shared: &Shared, sender: &Sender<PoolMessage>) {
    loop {
        let task = {
            let mut queue = shared.queue.lock().unwrap();
            loop {
                if shared.shutdown.load(Ordering::SeqCst) {
                    return;
                }
                if let Some(task) = queue.pop_front() {
                    break task;
                }
                queue = shared.available.wait(queue).unwrap();
            }
        };

        let frame_index = task.frame_index;
        let result = codec::decode_frame(task.algorithm, &task.bytes, &task.meta);

        // a result finished after an abort is discarded, not delivered
        if shared.aborted.load(Ordering::SeqCst) {
            continue;
        }
        let message = match result {
            Ok(bytes) => PoolMessage::Item(DecodeItem { frame_index, bytes }),
            Err(error) => PoolMessage::Error { frame_index, error },
        };
        if sender.send(message).is_err() {
            return;
        }
    }
}

/// Pool facade for one conversion: one decode task per frame, all using
/// the same algorithm.
pub struct PixelBufferDecoder {
    pool: DecodePool,
    algorithm: Algorithm,
    total_frames: usize,
}

impl PixelBufferDecoder {
    pub fn new(
        algorithm_name: &str,
        total_frames: usize,
        pool_size: usize,
    ) -> Result<Self, DecodeError> {
        Ok(Self {
            pool: DecodePool::new(pool_size),
            algorithm: Algorithm::from_name(algorithm_name)?,
            total_frames,
        })
    }

    pub fn decode(&self, bytes: Vec<u8>, meta: PixelMeta, frame_index: usize) {
        self.pool.submit(DecodeTask {
            frame_index,
            bytes,
            meta,
            algorithm: self.algorithm,
        });
    }

    #[must_use]
    pub fn messages(&self) -> &Receiver<PoolMessage> {
        self.pool.messages()
    }

    #[must_use]
    pub fn abort_handle(&self) -> AbortHandle {
        self.pool.abort_handle()
    }

    #[must_use]
    pub fn total_frames(&self) -> usize {
        self.total_frames
    }
}
