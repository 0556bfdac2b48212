use std::sync::Arc;

use chrono::{DateTime, Utc};
use devsim_config::{DevsimConfig, SpeedMultiplier};
use devsim_core::{create_metrics, PlaybackConfig, PlaybackSession, TelemetrySource, TimeRange, TokioTicker};

use super::format_sample;

pub struct ReplayArgs {
    pub id: String,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub speed: Option<SpeedMultiplier>,
    pub limit: Option<usize>,
}

pub async fn run(
    source: Arc<dyn TelemetrySource>,
    config: &DevsimConfig,
    args: ReplayArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let end = args.to.unwrap_or_else(Utc::now);
    let range = match args.from {
        Some(start) => TimeRange::new(start, end),
        None => TimeRange::ending_at(end, config.playback.default_window.as_duration()),
    };

    let mut playback = PlaybackConfig::from(&config.playback);
    if let Some(limit) = args.limit {
        playback.range_limit = limit;
    }
    let frame = config.playback.frame_interval.as_duration();

    let metrics = create_metrics();
    let session = PlaybackSession::new(source, Arc::new(TokioTicker::current()), playback)
        .with_metrics(metrics.clone());
    if let Some(speed) = args.speed {
        session.set_speed(speed);
    }

    let count = session.load(&args.id, range).await?;
    if count == 0 {
        println!("No samples for {} between {} and {}", args.id, range.start, range.end);
        return Ok(());
    }

    let snapshot = session.snapshot();
    println!(
        "Replaying {} samples of {} at {} (Ctrl+C to stop)",
        count, args.id, snapshot.speed
    );
    println!();

    let mut shown = 0;
    if let Some(first) = snapshot.current_sample() {
        println!("[{:>5}/{}] {}", 1, count, format_sample(first));
        shown = 1;
    }

    session.play();

    let mut interval = tokio::time::interval(frame);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let snapshot = session.snapshot();
                let revealed = snapshot.chart();
                for (i, sample) in revealed.revealed().iter().enumerate().skip(shown) {
                    println!("[{:>5}/{}] {}", i + 1, count, format_sample(sample));
                }
                shown = shown.max(revealed.revealed().len());
                if !snapshot.playing {
                    break;
                }
            }
            _ = &mut ctrl_c => {
                session.pause();
                println!();
                println!("Paused at {:.0}%", session.snapshot().progress() * 100.0);
                break;
            }
        }
    }

    session.close();
    println!();
    println!("{} of {} samples shown", shown, count);
    Ok(())
}
