use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, FixedOffset, Offset, Utc};
use chrono_tz::Tz;
use tracing::{info, warn};

use hvac_common::{clock::MS_PER_MINUTE, ControlAction, ControlLoop, Instant, RuntimeConfig};

use crate::{
    sim::SimulatedRoom,
    store::{AppStore, PowerSnapshot, PowerSnapshotTracker, SNAPSHOT_INTERVAL_MS},
};

const TICK_INTERVAL: Duration = Duration::from_millis(100);
const STATUS_INTERVAL: Duration = Duration::from_secs(10);

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = AppStore::from_env();
    let mut runtime = store.load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config from store: {err:#}");
        RuntimeConfig::default()
    });
    runtime.sanitize();

    if now_in_timezone(&runtime.timezone).is_none() {
        warn!("unknown timezone {:?}, schedule suspended", runtime.timezone);
    }

    let snapshot = match store.load_power_snapshot().await {
        Ok(snapshot) => snapshot,
        Err(err) => {
            warn!("failed to load power history from store: {err:#}");
            None
        }
    };
    let clock = BootClock::resuming_after(snapshot.as_ref());
    let boot = clock.now();
    let mut control = ControlLoop::from_runtime(&runtime, boot);

    if let Some(snapshot) = snapshot {
        control
            .power_log_mut()
            .restore_entries(&snapshot.entries, snapshot.total_energy_wh);
        info!(
            "restored {} power entries, {:.1} Wh total",
            control.power_log().len(),
            control.power_log().total_energy_wh()
        );
    }
    let mut tracker = PowerSnapshotTracker::new(SNAPSHOT_INTERVAL_MS, boot);
    tracker.mark_saved(control.power_log(), boot);

    let mut room = SimulatedRoom::new(
        env_f32("HVAC_SIM_AMBIENT_C").unwrap_or(26.0),
        env_f32("HVAC_SIM_OUTDOOR_C").unwrap_or(30.0),
    );
    execute_control_actions(control.begin(boot), &mut room);

    let mut tick = tokio::time::interval(TICK_INTERVAL);
    let mut status_tick = tokio::time::interval(STATUS_INTERVAL);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!("controller running, ctrl-c to stop");
    let mut last_step = boot;

    loop {
        tokio::select! {
            _ = tick.tick() => {
                let now = clock.now();
                room.set_mode(control.system_mode());
                room.advance(now.elapsed_since(last_step));
                last_step = now;

                let wall_clock = now_in_timezone(&runtime.timezone);
                let actions = control.update(now, wall_clock, &mut room);
                execute_control_actions(actions, &mut room);

                if tracker.should_save(control.power_log(), now, false) {
                    save_power_history(&store, &control, &mut tracker, now).await;
                }
            }
            _ = status_tick.tick() => {
                match serde_json::to_string(&control.status(clock.now())) {
                    Ok(body) => info!("status {body}"),
                    Err(err) => warn!("status serialization failed: {err}"),
                }
            }
            result = &mut shutdown => {
                result.context("failed to listen for ctrl-c")?;
                break;
            }
        }
    }

    let now = clock.now();
    if tracker.should_save(control.power_log(), now, true) {
        save_power_history(&store, &control, &mut tracker, now).await;
    }

    runtime.settings = control.settings();
    runtime.schedule = control.schedule().to_config();
    store
        .save_runtime_config(&runtime)
        .await
        .context("failed to persist runtime config")?;

    info!("controller stopped");
    Ok(())
}

fn execute_control_actions(actions: Vec<ControlAction>, room: &mut SimulatedRoom) {
    for action in actions {
        // Relay and fan outputs hook in here on hardware.
        info!("control action: {action:?}");
        room.apply(&action);
    }
}

async fn save_power_history(
    store: &AppStore,
    control: &ControlLoop,
    tracker: &mut PowerSnapshotTracker,
    now: Instant,
) {
    let snapshot = PowerSnapshot::capture(control.power_log());
    match store.save_power_snapshot(&snapshot).await {
        Ok(()) => tracker.mark_saved(control.power_log(), now),
        Err(err) => warn!("failed to save power history: {err:#}"),
    }
}

fn env_f32(name: &str) -> Option<f32> {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse::<f32>().ok())
        .filter(|value| value.is_finite())
}

fn now_in_timezone(timezone: &str) -> Option<DateTime<FixedOffset>> {
    let tz: Tz = timezone.parse().ok()?;
    let local = Utc::now().with_timezone(&tz);
    Some(local.with_timezone(&local.offset().fix()))
}

/// 32-bit millisecond counter that wraps like the device's.
///
/// Restored power buckets carry timestamps from the previous run, so the
/// counter starts at the minute after the newest one and new buckets keep
/// the history in timestamp order.
#[derive(Debug, Clone, Copy)]
struct BootClock {
    start: std::time::Instant,
    base_ms: u32,
}

impl BootClock {
    fn resuming_after(snapshot: Option<&PowerSnapshot>) -> Self {
        let base_ms = snapshot
            .and_then(|snapshot| snapshot.entries.last())
            .map(|entry| entry.timestamp.minute_start().as_millis().wrapping_add(MS_PER_MINUTE))
            .unwrap_or(0);
        Self {
            start: std::time::Instant::now(),
            base_ms,
        }
    }

    fn now(&self) -> Instant {
        let elapsed = self.start.elapsed().as_millis() as u32;
        Instant::from_millis(self.base_ms.wrapping_add(elapsed))
    }
}
