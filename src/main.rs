// src/main.rs

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lane_pilot::avoidance::OpenRoad;
use lane_pilot::frame_source::ImageSequenceSource;
use lane_pilot::interface::{CommandLog, NoDriver};
use lane_pilot::pipeline::{ControlEvent, ControlLoop};
use lane_pilot::sim::{SimHandle, TrackWorld};
use lane_pilot::Config;

const DEFAULT_CONFIG: &str = "config.yaml";

#[tokio::main]
async fn main() -> Result<()> {
    let config_path =
        std::env::var("LANE_PILOT_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG.to_string());
    let found = Path::new(&config_path).exists();
    let config = if found {
        Config::load(&config_path)?
    } else {
        Config::default()
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🚗 Lane pilot starting");
    if found {
        info!("✓ Configuration loaded from {}", config_path);
    } else {
        warn!("{} not found, using built-in defaults", config_path);
    }
    info!(
        "PID kp={} ki={} kd={} | {:.0} Hz | max steer {:.0}°",
        config.pid.kp,
        config.pid.ki,
        config.pid.kd,
        config.run.tick_hz,
        config.steering.max_steering_angle_deg
    );

    let builder = ControlLoop::builder()
        .config(config.clone())
        .manual_input(NoDriver);
    let (mut control, sim) = match &config.run.frames_dir {
        Some(dir) => {
            let source = ImageSequenceSource::open(dir)?;
            if source.is_empty() {
                warn!("No frames found in {}", dir);
                return Ok(());
            }
            let control = builder
                .frame_source(source)
                .obstacle_monitor(OpenRoad)
                .actuation_sink(CommandLog::default())
                .build()?;
            (control, None)
        }
        None => {
            let handle = SimHandle::new(
                TrackWorld::new(config.sim.clone(), &config.obstacle),
                config.tick_seconds(),
            );
            let control = builder
                .frame_source(handle.clone())
                .obstacle_monitor(handle.clone())
                .actuation_sink(handle.clone())
                .build()?;
            (control, Some(handle))
        }
    };

    let max_ticks = config.run.max_ticks;
    let report_every = (config.run.tick_hz.round() as u64).max(1);
    let mut ticker = config
        .run
        .realtime
        .then(|| tokio::time::interval(Duration::from_secs_f32(control.dt())));
    let mut event_counts: BTreeMap<&'static str, u64> = BTreeMap::new();

    for _ in 0..max_ticks {
        if let Some(ticker) = ticker.as_mut() {
            ticker.tick().await;
        }
        let ctx = control.step();

        for event in control.drain_events() {
            *event_counts.entry(event_name(&event)).or_default() += 1;
        }

        if ctx.tick % report_every == 0 {
            let offset = sim
                .as_ref()
                .map(|h| format!(" offset={:+.2}m", h.lateral_offset()))
                .unwrap_or_default();
            info!(
                "t={:>5} [{}|{}] error={} angle={:+.1}° prop={:.2}{}",
                ctx.tick,
                ctx.mode.as_str(),
                ctx.phase.as_str(),
                ctx.estimate
                    .error
                    .map(|e| format!("{:+.3}", e))
                    .unwrap_or_else(|| "  -   ".to_string()),
                ctx.command.steering_angle,
                ctx.command.propulsion,
                offset
            );
        }
    }

    info!("\n========================================");
    info!("✓ Run complete: {} ticks", control.ticks());
    if let Some(handle) = &sim {
        let pose = handle.pose();
        info!(
            "  Distance: {:.1}m, final offset {:+.2}m, closest obstacle {:.2}m",
            pose.s,
            handle.lateral_offset(),
            handle.min_clearance()
        );
    }
    for (name, count) in &event_counts {
        info!("  {}: {}", name, count);
    }
    info!("========================================\n");

    println!("{}", serde_json::to_string_pretty(&control.metrics().summary())?);

    Ok(())
}

fn event_name(event: &ControlEvent) -> &'static str {
    match event {
        ControlEvent::ModeChanged { .. } => "mode changes",
        ControlEvent::Avoidance { .. } => "avoidance transitions",
        ControlEvent::LineLost { .. } => "line lost",
        ControlEvent::LineReacquired { .. } => "line reacquired",
        ControlEvent::SensorConflict { .. } => "sensor conflicts",
    }
}
