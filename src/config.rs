use std::time::Duration;

use rand::Rng;

use crate::error::ConfigError;

// 哲学者の構成
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingConfig {
    pub actors: usize,           // 哲学者 (= 箸) の数
    pub cycles_per_actor: usize, // 1 人あたりの食事回数
}

impl Default for RingConfig {
    fn default() -> Self {
        RingConfig {
            actors: 5,
            cycles_per_actor: 3,
        }
    }
}

impl RingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        // 1 人だと左右の箸が同じになる
        if self.actors < 2 {
            return Err(ConfigError::TooFewActors(self.actors));
        }
        Ok(())
    }
}

// 生産者・消費者の構成
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    pub capacity: usize,
    pub producers: usize,
    pub consumers: usize,
    pub items_per_producer: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        ChannelConfig {
            capacity: 10,
            producers: 2,
            consumers: 3,
            items_per_producer: 8,
        }
    }
}

impl ChannelConfig {
    pub fn total_expected(&self) -> usize {
        self.producers * self.items_per_producer
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity("channel"));
        }
        if self.producers == 0 {
            return Err(ConfigError::NoThreads("producers"));
        }
        if self.consumers == 0 {
            return Err(ConfigError::NoThreads("consumers"));
        }
        Ok(())
    }
}

// スレッドセーフなキューのデモ構成
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    pub capacity: usize,
    pub producers: usize,
    pub consumers: usize,
    pub items_per_producer: usize,
    pub items_per_consumer: usize,
    pub poll_interval: Duration, // 満杯時のポーリング間隔
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig {
            capacity: 10,
            producers: 2,
            consumers: 4,
            items_per_producer: 10,
            items_per_consumer: 5,
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl QueueConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity("queue"));
        }
        if self.producers == 0 {
            return Err(ConfigError::NoThreads("producers"));
        }
        if self.consumers == 0 {
            return Err(ConfigError::NoThreads("consumers"));
        }
        // 投入数と取り出し数が合わないと、誰かが永遠に待つ
        let enqueued = self.producers * self.items_per_producer;
        let dequeued = self.consumers * self.items_per_consumer;
        if enqueued != dequeued {
            return Err(ConfigError::Unbalanced { enqueued, dequeued });
        }
        Ok(())
    }
}

// 待ち時間のランダム化
// 正しさには関係なく、インターリーブを散らすためだけに使う
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub idle_max: Duration, // 考える / 生産する時間の上限
    pub busy_max: Duration, // 食べる / 処理する時間の上限
}

impl Pacing {
    pub fn new(idle_max: Duration, busy_max: Duration) -> Self {
        Pacing { idle_max, busy_max }
    }

    // スリープしない (テスト用)
    pub fn none() -> Self {
        Pacing::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn dining() -> Self {
        Pacing::new(Duration::from_millis(2000), Duration::from_millis(1000))
    }

    pub fn producer_consumer() -> Self {
        Pacing::new(Duration::from_millis(300), Duration::from_millis(500))
    }

    pub fn queue() -> Self {
        Pacing::new(Duration::from_millis(500), Duration::from_millis(1000))
    }

    pub fn idle(&self) {
        sleep_up_to(self.idle_max);
    }

    pub fn busy(&self) {
        sleep_up_to(self.busy_max);
    }
}

fn random_up_to(max: Duration) -> Duration {
    if max.is_zero() {
        return Duration::ZERO;
    }
    rand::thread_rng().gen_range(Duration::ZERO..max)
}

fn sleep_up_to(max: Duration) {
    let d = random_up_to(max);
    if !d.is_zero() {
        std::thread::sleep(d);
    }
}
