use std::sync::Arc;

use chrono::Local;
use devsim_config::DevsimConfig;
use devsim_core::{create_metrics, DeviceDirectory, PollingRegistry, TelemetrySource, TokioTicker};

use super::{format_sample, print_metrics};

pub async fn run<A>(api: Arc<A>, config: &DevsimConfig, ticks: Option<u64>) -> Result<(), Box<dyn std::error::Error>>
where
    A: TelemetrySource + DeviceDirectory,
{
    let period = config.polling.interval.as_duration();
    let metrics = create_metrics();
    let registry = PollingRegistry::new(api.clone(), Arc::new(TokioTicker::current()), period)
        .with_metrics(metrics.clone());

    println!("Monitoring running devices every {} (Ctrl+C to stop)", config.polling.interval);
    println!();

    let mut interval = tokio::time::interval(period);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut periods = 0u64;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = registry.refresh_from(api.as_ref()).await {
                    eprintln!("Device list unavailable: {}", e);
                }
                print_cache(&registry);
                periods += 1;
                if ticks.is_some_and(|n| periods >= n) {
                    break;
                }
            }
            _ = &mut ctrl_c => break,
        }
    }

    registry.shutdown();
    println!();
    print_metrics(&metrics.snapshot())?;
    Ok(())
}

fn print_cache(registry: &PollingRegistry) {
    let now = Local::now().format("%H:%M:%S");
    let running = registry.running_ids();
    if running.is_empty() {
        println!("[{}] no running devices", now);
        return;
    }

    let cache = registry.snapshot();
    for id in &running {
        match cache.get(id) {
            Some(sample) => println!("[{}] {:<24} {}", now, id, format_sample(sample)),
            None => println!("[{}] {:<24} (waiting for data)", now, id),
        }
    }
}
