// 3 つの同期パターン
// - 食事する哲学者 (非対称順序 / 入場制限)
// - セマフォによる生産者・消費者
// - 条件変数で守られた有限キュー

pub mod channel;
pub mod config;
pub mod error;
pub mod philosophers;
pub mod queue;
pub mod semaphore;

pub use channel::{run_producer_consumer, BoundedChannel, ChannelReport, ChannelSnapshot};
pub use config::{ChannelConfig, Pacing, QueueConfig, RingConfig};
pub use error::ConfigError;
pub use philosophers::{ActorState, DiningReport, Protocol, ResourceRing, RingSnapshot};
pub use queue::{run_queue_demo, QueueReport, SynchronizedQueue};
pub use semaphore::Semaphore;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// RUST_LOG が無ければ info
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(true),
        )
        .init();
}
