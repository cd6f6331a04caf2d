use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use sync_patterns::{
    ActorState, BoundedChannel, ChannelConfig, Pacing, Protocol, ResourceRing, RingConfig,
    SynchronizedQueue,
};

#[test]
fn test_queue_capacity_three_in_order() {
    let queue = Arc::new(SynchronizedQueue::new(3, Duration::from_millis(10)).unwrap());

    let q0 = queue.clone();
    thread::spawn(move || {
        for n in 1..=3 {
            q0.enqueue(n);
        }
    })
    .join()
    .unwrap();

    let q1 = queue.clone();
    let got = thread::spawn(move || (0..3).map(|_| q1.dequeue()).collect::<Vec<i32>>())
        .join()
        .unwrap();

    assert_eq!(got, vec![1, 2, 3]);
    assert!(queue.is_empty());
}

#[test]
fn test_channel_capacity_two_single_pair() {
    let config = ChannelConfig {
        capacity: 2,
        producers: 1,
        consumers: 1,
        items_per_producer: 4,
    };
    let ch = Arc::new(BoundedChannel::new(&config).unwrap());

    let ch0 = ch.clone();
    let producer = thread::spawn(move || {
        for item in [10u32, 20, 30, 40] {
            ch0.produce(1, item);
        }
    });

    let ch1 = ch.clone();
    let consumer = thread::spawn(move || {
        let mut seen = Vec::new();
        while let Some(item) = ch1.consume(1) {
            seen.push(item);
        }
        seen
    });

    producer.join().unwrap();
    ch.close();
    let seen = consumer.join().unwrap();

    assert_eq!(seen, vec![10, 20, 30, 40]);
    let s = ch.snapshot();
    assert_eq!((s.produced, s.consumed), (4, 4));
}

#[test]
fn test_bounded_ring_of_five_never_all_eating() {
    let ring = Arc::new(
        ResourceRing::new(RingConfig {
            actors: 5,
            cycles_per_actor: 500,
        })
        .unwrap(),
    );
    let done = Arc::new(AtomicBool::new(false));

    let ring0 = ring.clone();
    let done0 = done.clone();
    let observer = thread::spawn(move || {
        while !done0.load(Ordering::Relaxed) {
            let s = ring0.snapshot();
            assert!(s.count(ActorState::Eating) < 5, "{}", s);
            assert!(s.eating <= 4, "{}", s);
        }
    });

    let report = ring.dine(Protocol::Bounded, Pacing::none());
    done.store(true, Ordering::Relaxed);
    observer.join().unwrap();

    assert_eq!(report.meals, vec![500; 5]);
    assert!(report.peak_eating <= 4);
}

#[test]
fn test_asymmetric_ring_with_short_sleeps() {
    let ring = Arc::new(
        ResourceRing::new(RingConfig {
            actors: 5,
            cycles_per_actor: 5,
        })
        .unwrap(),
    );
    let pacing = Pacing::new(Duration::from_millis(2), Duration::from_millis(2));
    let report = ring.dine(Protocol::Asymmetric, pacing);

    assert_eq!(report.meals, vec![5; 5]);
    assert!(report.peak_eating <= 2);
    let s = ring.snapshot();
    assert_eq!(s.states, vec![ActorState::Thinking; 5]);
    assert_eq!(s.eating, 0);
}
