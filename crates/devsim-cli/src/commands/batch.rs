use std::sync::Arc;

use devsim_core::{create_metrics, BatchRunner, DeviceDirectory, DeviceStatus};

use super::print_metrics;

pub async fn status(
    directory: Arc<dyn DeviceDirectory>,
    status: DeviceStatus,
    ids: Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let metrics = create_metrics();
    let runner = BatchRunner::new().with_metrics(metrics.clone());

    let (result, devices) = runner
        .run_then_refresh(
            ids.clone(),
            |id| {
                let directory = Arc::clone(&directory);
                async move { directory.set_status(&id, status).await }
            },
            directory.as_ref(),
        )
        .await;

    println!("Set {}: {}", status, result.summary());
    for device in devices?.iter().filter(|d| ids.contains(&d.id)) {
        println!("  {:<24} {}", device.id, device.status);
    }
    print_metrics(&metrics.snapshot())?;
    Ok(())
}
