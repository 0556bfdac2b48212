use devsim_core::DeviceDirectory;

pub async fn run(directory: &dyn DeviceDirectory) -> Result<(), Box<dyn std::error::Error>> {
    let devices = directory.list_devices().await?;

    if devices.is_empty() {
        println!("No devices");
        return Ok(());
    }

    println!("{:<24} {:<24} {:<16} {:<8} {:>8}", "ID", "NAME", "TYPE", "STATUS", "RATE_MS");
    for device in &devices {
        println!(
            "{:<24} {:<24} {:<16} {:<8} {:>8}",
            device.id, device.name, device.device_type, device.status.as_str(), device.sampling_rate
        );
    }
    println!();
    println!("{} devices, {} running", devices.len(), devsim_core::running_ids(&devices).len());

    Ok(())
}
