pub mod batch;
pub mod config;
pub mod devices;
pub mod import;
pub mod monitor;
pub mod replay;
pub mod rm;
pub mod status;

use devsim_core::{MetricsSnapshot, TelemetrySample};

/// One line per sample: time, metrics, then the log line if any.
pub fn format_sample(sample: &TelemetrySample) -> String {
    let mut line = sample.timestamp.format("%Y-%m-%d %H:%M:%S%.3f").to_string();
    for (param, value) in &sample.metrics {
        line.push_str(&format!("  {}={}", param, value));
    }
    if !sample.log_message.is_empty() {
        line.push_str(&format!("  [{}] {}", sample.severity, sample.log_message));
    }
    line
}

pub fn print_metrics(snapshot: &MetricsSnapshot) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(snapshot)?);
    Ok(())
}
