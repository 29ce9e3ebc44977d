//! Global log ring tests
//!
//! The logger is process-wide, so everything lives in one test.

mod common;

use common::ThreadedMp;
use crows_core::hwinit::ProcessorRegistry;
use crows_core::logger::{self, Stage};
use log::{debug, error, trace, warn, Level, LevelFilter};

#[test]
fn test_records_reach_ring_with_stage_tags() {
    logger::init(LevelFilter::Debug).unwrap();
    assert!(logger::init(LevelFilter::Trace).is_err());
    logger::clear();
    assert_eq!(logger::available(), 0);

    warn!(target: "crows_core::payload::discovery", "no payloads");
    debug!(target: "crows_hwinit::thread", "thread {} started", 2);
    trace!(target: "crows_hwinit::processor", "filtered out");
    error!(target: "crows_core::session", "halted");
    // A real record from the registry.
    let _ = ProcessorRegistry::<ThreadedMp>::initialize(None);

    assert_eq!(logger::available(), 4);

    let entry = logger::pop().unwrap();
    assert_eq!((entry.stage, entry.level), (Stage::Discovery, Level::Warn));
    assert_eq!(entry.to_string(), "[WRN DISC] no payloads");

    let entry = logger::pop().unwrap();
    assert_eq!((entry.stage, entry.level), (Stage::Thread, Level::Debug));
    assert_eq!(entry.to_string(), "[THRD] thread 2 started");

    let entry = logger::pop().unwrap();
    assert_eq!((entry.stage, entry.level), (Stage::Boot, Level::Error));
    assert!(entry.is_error());

    let entry = logger::pop().unwrap();
    assert_eq!((entry.stage, entry.level), (Stage::Mp, Level::Warn));
    assert!(entry.message().contains("single-threaded"));

    assert!(logger::pop().is_none());

    warn!("untagged");
    assert_eq!(logger::available(), 1);
    logger::clear();
    assert!(logger::pop().is_none());
}
