//! Integration tests for the logger worker.
//!
//! These tests use the system clock and check ordering guarantees across
//! threads: a read issued after a log call sees that record, and records
//! come back in submission order.

use std::sync::Arc;
use std::thread;

use chrono::{TimeDelta, Utc};
use rotalog::config::StoreConfig;
use rotalog::logger::Logger;
use rotalog::record::{EventKind, Params};
use tempfile::tempdir;

#[test]
fn test_read_after_write_from_another_thread() {
    let temp_dir = tempdir().unwrap();
    let logger = Arc::new(Logger::new(StoreConfig::new(temp_dir.path())).unwrap());
    let start = Utc::now() - TimeDelta::seconds(1);

    let writer = Arc::clone(&logger);
    thread::Builder::new()
        .name("writer".to_string())
        .spawn(move || writer.info("written elsewhere"))
        .unwrap()
        .join()
        .unwrap();

    let text = logger.logs(start, Utc::now() + TimeDelta::seconds(1));
    assert!(text.ends_with("I [writer] written elsewhere"), "got {text:?}");
}

#[test]
fn test_records_keep_submission_order() {
    let temp_dir = tempdir().unwrap();
    let logger = Logger::new(StoreConfig::new(temp_dir.path())).unwrap();
    let start = Utc::now() - TimeDelta::seconds(1);

    for i in 0..200 {
        logger.info(format!("message {i:03}"));
    }

    let text = logger.logs(start, Utc::now() + TimeDelta::seconds(1));
    let messages: Vec<&str> = text
        .lines()
        .map(|line| line.rsplit(' ').next().unwrap())
        .collect();
    let expected: Vec<String> = (0..200).map(|i| format!("{i:03}")).collect();
    assert_eq!(messages, expected);
}

#[test]
fn test_tagged_record_with_params() {
    let temp_dir = tempdir().unwrap();
    let logger = Logger::new(StoreConfig::new(temp_dir.path())).unwrap();
    let start = Utc::now() - TimeDelta::seconds(1);

    let mut params = Params::new();
    params.insert("latency".to_string(), 0.25.into());
    params.insert("nan".to_string(), f64::NAN.into());
    params.insert("retries".to_string(), 3.into());
    logger.log(EventKind::User("AUDIT".to_string()), "login", Some(params), Some("AUTH"));

    let text = logger.logs(start, Utc::now() + TimeDelta::seconds(1));
    assert!(
        text.ends_with(r#", AUTH] login #PR{"latency":0.25,"nan":"NaN","retries":3}"#),
        "got {text:?}"
    );
    assert!(text.contains(" U[AUDIT] ["));
}

#[test]
fn test_disabled_limits_never_write() {
    let temp_dir = tempdir().unwrap();
    let logs_dir = temp_dir.path().join("logs");
    let logger = Logger::new(StoreConfig::new(&logs_dir).with_limits(0, 0)).unwrap();

    logger.info("nowhere");
    logger.flush();

    assert!(logger.log_files().is_empty());
    assert!(!logs_dir.exists());
    assert_eq!(logger.logs(Utc::now() - TimeDelta::days(1), Utc::now()), "");
}
