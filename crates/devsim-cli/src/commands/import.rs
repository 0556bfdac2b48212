use std::path::Path;
use std::sync::Arc;

use devsim_core::{create_metrics, BatchRunner, Device, DeviceDirectory};

use super::print_metrics;

/// Accepts a single device object or an array of them.
fn parse_devices(content: &str) -> Result<Vec<Device>, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(content)?;
    if value.is_array() {
        serde_json::from_value(value)
    } else {
        Ok(vec![serde_json::from_value(value)?])
    }
}

pub async fn run(directory: Arc<dyn DeviceDirectory>, file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(file)?;
    let devices = Arc::new(parse_devices(&content)?);
    let ids: Vec<String> = devices.iter().map(|d| d.id.clone()).collect();

    let metrics = create_metrics();
    let (result, listed) = BatchRunner::new()
        .with_metrics(metrics.clone())
        .run_then_refresh(
            ids,
            |id| {
                let directory = Arc::clone(&directory);
                let devices = Arc::clone(&devices);
                async move {
                    match devices.iter().find(|d| d.id == id) {
                        Some(device) => directory.create_device(device).await,
                        None => Err(devsim_core::ApiError::NotFound(id)),
                    }
                }
            },
            directory.as_ref(),
        )
        .await;

    println!("Imported from {}: {}", file.display(), result.summary());
    println!("{} devices total", listed?.len());
    print_metrics(&metrics.snapshot())?;
    Ok(())
}
