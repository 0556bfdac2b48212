use std::sync::Arc;

use devsim_core::{create_metrics, BatchRunner, DeviceDirectory};

use super::print_metrics;

pub async fn run(directory: Arc<dyn DeviceDirectory>, ids: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
    let metrics = create_metrics();
    let (result, devices) = BatchRunner::new()
        .with_metrics(metrics.clone())
        .run_then_refresh(
            ids,
            |id| {
                let directory = Arc::clone(&directory);
                async move { directory.delete_device(&id).await }
            },
            directory.as_ref(),
        )
        .await;

    println!("Deleted: {}", result.summary());
    println!("{} devices remain", devices?.len());
    print_metrics(&metrics.snapshot())?;
    Ok(())
}
