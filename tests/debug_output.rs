//! Diagnostics emitted through the `log` facade.

mod common;

use logdot::{ClientConfig, LogDotLogger};
use logtest::Logger;

use common::{drain, spawn_server};

#[test]
fn debug_mode_traces_payloads_and_warns_on_exhaustion() {
    let mut captured = Logger::start();
    log::set_max_level(log::LevelFilter::Trace);
    let (addr, rx) = spawn_server(vec![(200, "{}"), (500, "boom"), (500, "boom")]);
    let config = ClientConfig::builder("it-key")
        .with_hostname("it-host")
        .with_debug(true)
        .with_retry_attempts(1)
        .with_retry_delay_ms(1)
        .with_logs_url(format!("http://{addr}/api/v1"))
        .build()
        .expect("config");
    let logger = LogDotLogger::new(config).expect("logger");

    assert!(logger.info("traced", None));
    assert!(!logger.info("doomed", None));
    drain(&rx, 3);

    let mut ours = Vec::new();
    while let Some(record) = captured.pop() {
        if record.target() == "logdot" {
            ours.push((record.level(), record.args().to_string()));
        }
    }

    assert!(ours.iter().any(|(level, msg)| {
        *level == log::Level::Debug && msg.contains("/api/v1/logs") && msg.contains("\"traced\"")
    }));
    assert!(ours.iter().any(|(level, msg)| {
        *level == log::Level::Debug && msg.contains("response 500: boom")
    }));
    assert!(ours.iter().any(|(level, msg)| {
        *level == log::Level::Warn && msg.contains("failed after 2 attempt(s)")
    }));
    assert!(ours.iter().all(|(_, msg)| !msg.contains("it-key")));
}
