use std::{
    sync::{Arc, Condvar, Mutex},
    thread,
    time::Duration,
};

use rand::Rng;
use tracing::{debug, info};

use crate::{
    config::{Pacing, QueueConfig},
    error::ConfigError,
};

// リングバッファ本体。キューのロックで保護される
struct Ring<T> {
    items: Vec<Option<T>>,
    front: usize, // 次に取り出す位置
    back: usize,  // 次に入れる位置
    size: usize,
}

impl<T> Ring<T> {
    fn is_empty(&self) -> bool {
        self.size == 0
    }

    fn is_full(&self) -> bool {
        self.size == self.items.len()
    }
}

// スレッドセーフな有限 FIFO
//
// enqueue は満杯の間ロックを離してスリープし、取り直す (ポーリング)
// dequeue は空の間 not_empty で待つ (条件変数)
// この非対称は意図したもの。満杯側はスケジューリング次第でライブロックしうる
pub struct SynchronizedQueue<T> {
    ring: Mutex<Ring<T>>,
    not_empty: Condvar,
    poll_interval: Duration,
}

impl<T> SynchronizedQueue<T> {
    pub fn new(capacity: usize, poll_interval: Duration) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::ZeroCapacity("queue"));
        }
        Ok(SynchronizedQueue {
            ring: Mutex::new(Ring {
                items: (0..capacity).map(|_| None).collect(),
                front: 0,
                back: 0,
                size: 0,
            }),
            not_empty: Condvar::new(),
            poll_interval,
        })
    }

    pub fn with_config(config: &QueueConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        SynchronizedQueue::new(config.capacity, config.poll_interval)
    }

    pub fn enqueue(&self, item: T) {
        let mut ring = self.ring.lock().unwrap();

        // 満杯ならロックを離して少し待つ
        while ring.is_full() {
            debug!("queue full, producer polling");
            drop(ring);
            thread::sleep(self.poll_interval);
            ring = self.ring.lock().unwrap();
        }

        let back = ring.back;
        ring.items[back] = Some(item);
        ring.back = (back + 1) % ring.items.len();
        ring.size += 1;
        debug!(size = ring.size, "enqueued");

        self.not_empty.notify_one();
    }

    pub fn dequeue(&self) -> T {
        let mut ring = self.ring.lock().unwrap();

        // 空の間は待機。wait 中はロックが解放される
        while ring.is_empty() {
            debug!("queue empty, consumer waiting");
            ring = self.not_empty.wait(ring).unwrap();
        }

        let front = ring.front;
        let item = ring.items[front]
            .take()
            .expect("occupied slot at front while size > 0");
        ring.front = (front + 1) % ring.items.len();
        ring.size -= 1;
        debug!(size = ring.size, "dequeued");
        item
    }

    pub fn len(&self) -> usize {
        self.ring.lock().unwrap().size
    }

    pub fn is_empty(&self) -> bool {
        self.ring.lock().unwrap().is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.ring.lock().unwrap().is_full()
    }

    pub fn capacity(&self) -> usize {
        self.ring.lock().unwrap().items.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueReport {
    pub enqueued: usize,
    pub dequeued: usize,
    pub final_len: usize,
}

fn producer(queue: &SynchronizedQueue<u32>, id: usize, items: usize, pacing: Pacing) -> usize {
    for _ in 0..items {
        let n = rand::thread_rng().gen_range(0..100);
        queue.enqueue(n);
        info!(producer = id, item = n, "enqueued item");
        pacing.idle();
    }
    info!(producer = id, "producer finished");
    items
}

fn consumer(queue: &SynchronizedQueue<u32>, id: usize, items: usize, pacing: Pacing) -> usize {
    for _ in 0..items {
        let n = queue.dequeue();
        info!(consumer = id, item = n, "processed item");
        pacing.busy();
    }
    info!(consumer = id, "consumer finished");
    items
}

pub fn run_queue_demo(config: QueueConfig, pacing: Pacing) -> Result<QueueReport, ConfigError> {
    let queue = Arc::new(SynchronizedQueue::with_config(&config)?);
    info!(
        capacity = config.capacity,
        producers = config.producers,
        consumers = config.consumers,
        "starting synchronized queue"
    );

    let mut producers = Vec::new();
    for i in 0..config.producers {
        let q = queue.clone();
        let items = config.items_per_producer;
        producers.push(thread::spawn(move || producer(&q, i + 1, items, pacing)));
    }

    let mut consumers = Vec::new();
    for i in 0..config.consumers {
        let q = queue.clone();
        let items = config.items_per_consumer;
        consumers.push(thread::spawn(move || consumer(&q, i + 1, items, pacing)));
    }

    let enqueued = producers.into_iter().map(|t| t.join().unwrap()).sum();
    let dequeued = consumers.into_iter().map(|t| t.join().unwrap()).sum();
    let final_len = queue.len();
    info!(final_len, "all queue threads finished");

    Ok(QueueReport {
        enqueued,
        dequeued,
        final_len,
    })
}
