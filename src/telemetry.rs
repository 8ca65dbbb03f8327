//! Probe Telemetry
//!
//! JSONL event logging plus the human-readable probe summary. Each logger
//! instance tags its events with a component name and appends one JSON object
//! per line, with a microsecond epoch timestamp.

use serde::Serialize;
use serde_json::json;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Clone)]
pub struct TelemetryLogger {
    component: String,
    writer: Arc<Mutex<std::fs::File>>,
}

impl TelemetryLogger {
    pub fn new(component: &str) -> std::io::Result<Self> {
        Self::with_path(component, "telemetry/peerlat.jsonl")
    }

    pub fn with_path(component: &str, path: &str) -> std::io::Result<Self> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            component: component.to_string(),
            writer: Arc::new(Mutex::new(file)),
        })
    }

    pub fn log<T: Serialize>(&self, event: T) {
        if let Ok(mut writer) = self.writer.lock() {
            let entry = json!({
                "timestamp_us": SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_micros() as u64)
                    .unwrap_or_default(),
                "component": self.component,
                "event": event,
            });
            if let Err(err) = writeln!(writer, "{}", entry) {
                eprintln!("Telemetry write failed: {}", err);
            }
        }
    }
}

/// One probe round as it appears in telemetry.
#[derive(Debug, Clone, Serialize)]
pub struct RoundEvent {
    pub round: usize,
    pub src_agent: usize,
    pub dst_agent: usize,
    pub size_bytes: u64,
    /// Device-reported duration; -1 when profiling was unavailable.
    pub duration_ns: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logger_appends_jsonl() {
        let dir = std::env::temp_dir().join("peerlat_telemetry_test");
        let path = dir.join("events.jsonl");
        let _ = std::fs::remove_file(&path);

        let logger = TelemetryLogger::with_path("test", path.to_str().unwrap())
            .expect("logger creation failed");

        logger.log(RoundEvent {
            round: 0,
            src_agent: 0,
            dst_agent: 1,
            size_bytes: 1024,
            duration_ns: 1524,
        });
        logger.log(json!({"kind": "done"}));

        let contents = std::fs::read_to_string(&path).expect("read failed");
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["component"], "test");
        assert_eq!(first["event"]["duration_ns"], 1524);
    }
}
