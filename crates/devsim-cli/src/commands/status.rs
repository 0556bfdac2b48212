use std::sync::Arc;

use devsim_core::{DeviceDirectory, DeviceStatus, DeviceStatusMutator};

pub async fn set(
    directory: Arc<dyn DeviceDirectory>,
    id: &str,
    status: DeviceStatus,
) -> Result<(), Box<dyn std::error::Error>> {
    let mutator = DeviceStatusMutator::load(directory).await?;
    let result = mutator.set_status(id, status).await;
    report(&mutator, id, result.map(|device| device.status))
}

pub async fn toggle(directory: Arc<dyn DeviceDirectory>, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mutator = DeviceStatusMutator::load(directory).await?;
    let result = mutator.toggle(id).await;
    report(&mutator, id, result)
}

fn report(
    mutator: &DeviceStatusMutator,
    id: &str,
    result: Result<DeviceStatus, devsim_core::MutationError>,
) -> Result<(), Box<dyn std::error::Error>> {
    match result {
        Ok(status) => {
            println!("{}: {}", id, status);
            Ok(())
        }
        Err(e) => {
            if let Some(status) = mutator.status_of(id) {
                println!("{}: {}", id, status);
            }
            Err(e.into())
        }
    }
}
