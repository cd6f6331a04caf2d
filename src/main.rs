use std::{error::Error, sync::Arc, thread, time::Duration};

use tracing::info;

use sync_patterns::{
    init_tracing, run_producer_consumer, run_queue_demo, ChannelConfig, Pacing, Protocol,
    QueueConfig, ResourceRing, RingConfig,
};

fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();

    // 食事する哲学者
    let ring_config = RingConfig::default();
    info!(
        actors = ring_config.actors,
        cycles = ring_config.cycles_per_actor,
        "dining philosophers"
    );

    for protocol in [Protocol::Asymmetric, Protocol::Bounded] {
        // 実行ごとに全員 Thinking から始める
        let ring = Arc::new(ResourceRing::new(ring_config)?);
        info!(?protocol, "starting dinner");
        let report = ring.dine(protocol, Pacing::dining());
        println!(
            "{:?}: meals = {:?}, peak eating = {} (final {})",
            report.protocol,
            report.meals,
            report.peak_eating,
            ring.snapshot()
        );
        thread::sleep(Duration::from_secs(2));
    }

    // 生産者・消費者
    let channel_config = ChannelConfig::default();
    let report = run_producer_consumer(channel_config, Pacing::producer_consumer())?;
    println!(
        "producer-consumer: produced = {}, consumed = {} (expected = {}), per consumer = {:?}",
        report.produced,
        report.consumed,
        channel_config.total_expected(),
        report.per_consumer
    );
    println!("{}", report.last);

    // スレッドセーフなキュー
    let report = run_queue_demo(QueueConfig::default(), Pacing::queue())?;
    println!(
        "queue: enqueued = {}, dequeued = {}, final size = {}",
        report.enqueued, report.dequeued, report.final_len
    );

    Ok(())
}
