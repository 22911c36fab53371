use std::sync::Arc;
use std::thread;

use argus::pipeline::LatestFrameSlot;
use argus::{FeedId, FrameSample};
use image::RgbImage;

fn sample(seq: u64) -> FrameSample {
    FrameSample::new(FeedId(0), RgbImage::new(1, 1), seq)
}

#[test]
fn take_on_empty_slot_returns_nothing() {
    let slot = LatestFrameSlot::new();
    assert!(slot.is_empty());
    assert!(slot.take().is_none());
}

#[test]
fn most_recent_publish_wins() {
    let slot = LatestFrameSlot::new();
    for seq in 1..=5 {
        slot.publish(sample(seq));
    }

    let taken = slot.take().unwrap();
    assert_eq!(taken.sequence, 5);
    assert!(slot.take().is_none());

    let stats = slot.stats();
    assert_eq!(stats.written, 5);
    assert_eq!(stats.dropped, 4);
    assert_eq!(stats.read, 1);
}

#[test]
fn each_sample_is_handed_out_once() {
    let slot = LatestFrameSlot::new();
    slot.publish(sample(1));
    assert_eq!(slot.take().map(|s| s.sequence), Some(1));
    assert!(slot.take().is_none());

    slot.publish(sample(2));
    assert_eq!(slot.take().map(|s| s.sequence), Some(2));
}

#[test]
fn concurrent_consumer_sees_increasing_sequences() {
    const FRAMES: u64 = 20_000;
    let slot = Arc::new(LatestFrameSlot::new());

    let producer = {
        let slot = Arc::clone(&slot);
        thread::spawn(move || {
            for seq in 1..=FRAMES {
                slot.publish(sample(seq));
            }
        })
    };

    let mut seen = Vec::new();
    loop {
        if let Some(s) = slot.take() {
            seen.push(s.sequence);
            if s.sequence == FRAMES {
                break;
            }
        } else if producer.is_finished() && slot.is_empty() {
            break;
        }
    }
    producer.join().unwrap();
    if let Some(s) = slot.take() {
        seen.push(s.sequence);
    }

    assert!(!seen.is_empty());
    assert!(seen.windows(2).all(|w| w[0] < w[1]), "sequences must strictly increase");
    assert_eq!(*seen.last().unwrap(), FRAMES);

    let stats = slot.stats();
    assert_eq!(stats.written, FRAMES);
    assert_eq!(stats.read, seen.len() as u64);
    assert_eq!(stats.read + stats.dropped, FRAMES);
}
