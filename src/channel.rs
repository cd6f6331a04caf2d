use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread,
};

use rand::Rng;
use tracing::{debug, info};

use crate::{
    config::{ChannelConfig, Pacing},
    error::ConfigError,
    semaphore::Semaphore,
};

// スロットロックで保護される
struct Slots<T> {
    buf: Vec<Option<T>>,
    write: usize, // 次に書き込む位置
    read: usize,  // 次に読み出す位置
}

// カウンタロックで保護される
#[derive(Debug, Default)]
struct Totals {
    produced: usize,
    consumed: usize,
}

// 有限バッファ
// 空きスロット数と埋まっているスロット数を 2 つのセマフォで数える
pub struct BoundedChannel<T> {
    free: Semaphore,   // 空きスロット
    filled: Semaphore, // 埋まっているスロット
    slots: Mutex<Slots<T>>,
    totals: Mutex<Totals>,
    closed: AtomicBool,
    total_expected: usize,
    consumers: usize,
}

// バッファ状態の観測結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSnapshot<T> {
    pub free: usize,
    pub filled: usize,
    pub produced: usize,
    pub consumed: usize,
    pub write: usize,
    pub read: usize,
    pub slots: Vec<Option<T>>,
}

impl<T> ChannelSnapshot<T> {
    // 未読のアイテム数
    pub fn pending(&self) -> usize {
        self.produced - self.consumed
    }
}

impl<T: fmt::Display> fmt::Display for ChannelSnapshot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "free: {}, filled: {}", self.free, self.filled)?;
        writeln!(
            f,
            "produced: {}, consumed: {}",
            self.produced, self.consumed
        )?;
        write!(f, "slots: [")?;
        for (i, slot) in self.slots.iter().enumerate() {
            if i == self.write {
                write!(f, "ENT->")?;
            }
            if i == self.read {
                write!(f, "SAL->")?;
            }
            match slot {
                Some(v) => write!(f, "{}", v)?,
                None => write!(f, "_")?,
            }
            if i + 1 < self.slots.len() {
                write!(f, ", ")?;
            }
        }
        write!(f, "]")
    }
}

impl<T> BoundedChannel<T> {
    pub fn new(config: &ChannelConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let capacity = config.capacity;
        Ok(BoundedChannel {
            free: Semaphore::new(capacity),
            filled: Semaphore::new(0),
            slots: Mutex::new(Slots {
                buf: (0..capacity).map(|_| None).collect(),
                write: 0,
                read: 0,
            }),
            totals: Mutex::new(Totals::default()),
            closed: AtomicBool::new(false),
            total_expected: config.total_expected(),
            consumers: config.consumers,
        })
    }

    pub fn capacity(&self) -> usize {
        self.slots.lock().unwrap().buf.len()
    }

    pub fn produce(&self, producer: usize, item: T) {
        // 空きができるまで待つ
        self.free.wait();

        let mut slots = self.slots.lock().unwrap();
        let pos = slots.write;
        slots.buf[pos] = Some(item);
        slots.write = (pos + 1) % slots.buf.len();
        debug!(producer, slot = pos, "produced");

        let mut totals = self.totals.lock().unwrap();
        totals.produced += 1;
        drop(totals);
        drop(slots);

        self.filled.post();
    }

    // None は終了の合図。アイテムは取り出していない
    pub fn consume(&self, consumer: usize) -> Option<T> {
        // 何か入るか、close されるまで待つ
        self.filled.wait();

        let mut slots = self.slots.lock().unwrap();
        let mut totals = self.totals.lock().unwrap();
        // 起こされた後にまず終了条件を確認する
        // close による起床と本物のアイテムは、ここでしか区別しない
        let drained = self.closed.load(Ordering::Acquire) && totals.consumed == totals.produced;
        if totals.consumed >= self.total_expected || drained {
            debug!(consumer, "woken for shutdown");
            return None;
        }

        let pos = slots.read;
        let item = slots.buf[pos].take();
        slots.read = (pos + 1) % slots.buf.len();
        totals.consumed += 1;
        debug!(consumer, slot = pos, "consumed");
        drop(totals);
        drop(slots);

        self.free.post();
        // filled が post されている以上、スロットは埋まっている
        debug_assert!(item.is_some());
        item
    }

    // 生産者が全員終わった後に呼ぶ
    // 待機中の消費者を起こすため、消費者の数だけ filled を post する
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        for _ in 0..self.consumers {
            self.filled.post();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> ChannelSnapshot<T>
    where
        T: Clone,
    {
        let slots = self.slots.lock().unwrap();
        let totals = self.totals.lock().unwrap();
        ChannelSnapshot {
            free: self.free.value(),
            filled: self.filled.value(),
            produced: totals.produced,
            consumed: totals.consumed,
            write: slots.write,
            read: slots.read,
            slots: slots.buf.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelReport {
    pub produced: usize,
    pub consumed: usize,
    pub per_consumer: Vec<usize>, // 消費者ごとの消費数
    pub last: ChannelSnapshot<u32>,
}

fn producer(ch: &BoundedChannel<u32>, id: usize, items: usize, pacing: Pacing) {
    for _ in 0..items {
        let item = rand::thread_rng().gen_range(0..1000);
        ch.produce(id, item);
        info!(producer = id, item, "produced item");
        pacing.idle();
    }
    info!(producer = id, "producer finished");
}

fn consumer(ch: &BoundedChannel<u32>, id: usize, pacing: Pacing) -> usize {
    let mut cnt = 0;
    while let Some(item) = ch.consume(id) {
        cnt += 1;
        // ロックの外で処理する
        info!(consumer = id, item, "consumed item");
        pacing.busy();
    }
    info!(consumer = id, consumed = cnt, "consumer finished");
    cnt
}

// 生産者を全員待ってから close し、消費者を待つ
pub fn run_producer_consumer(
    config: ChannelConfig,
    pacing: Pacing,
) -> Result<ChannelReport, ConfigError> {
    let ch = Arc::new(BoundedChannel::new(&config)?);
    info!(
        capacity = config.capacity,
        producers = config.producers,
        consumers = config.consumers,
        total = config.total_expected(),
        "starting producer-consumer"
    );

    let mut producers = Vec::new();
    for i in 0..config.producers {
        let ch0 = ch.clone();
        let items = config.items_per_producer;
        let t = thread::spawn(move || producer(&ch0, i + 1, items, pacing));
        producers.push(t);
    }

    let mut consumers = Vec::new();
    for i in 0..config.consumers {
        let ch0 = ch.clone();
        let t = thread::spawn(move || consumer(&ch0, i + 1, pacing));
        consumers.push(t);
    }

    for t in producers {
        t.join().unwrap();
    }
    info!("all producers finished, waking consumers");
    ch.close();

    let per_consumer: Vec<usize> = consumers.into_iter().map(|t| t.join().unwrap()).collect();
    let last = ch.snapshot();
    info!("buffer state\n{}", last);

    Ok(ChannelReport {
        produced: last.produced,
        consumed: last.consumed,
        per_consumer,
        last,
    })
}
