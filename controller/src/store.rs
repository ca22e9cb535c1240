use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use hvac_common::{Instant, PowerEntry, PowerHistory, RuntimeConfig};

pub const POWER_SNAPSHOT_VERSION: u32 = 1;
pub const SNAPSHOT_INTERVAL_MS: u32 = 6 * 60 * 60 * 1_000;
const ENERGY_EPSILON_WH: f64 = 0.05;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerSnapshot {
    pub version: u32,
    pub total_energy_wh: f64,
    pub entries: Vec<PowerEntry>,
}

impl PowerSnapshot {
    pub fn capture(history: &PowerHistory) -> Self {
        Self {
            version: POWER_SNAPSHOT_VERSION,
            total_energy_wh: history.total_energy_wh(),
            entries: history.copy_entries(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppStore {
    runtime_path: PathBuf,
    power_path: PathBuf,
}

impl AppStore {
    pub fn from_env() -> Self {
        let data_dir = std::env::var("HVAC_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.hvac"));
        Self::new(data_dir)
    }

    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            runtime_path: data_dir.join("runtime.json"),
            power_path: data_dir.join("power_history.json"),
        }
    }

    pub async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        match tokio::fs::read(&self.runtime_path).await {
            Ok(raw) => serde_json::from_slice::<RuntimeConfig>(&raw)
                .with_context(|| format!("invalid {}", self.runtime_path.display())),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn save_runtime_config(&self, runtime: &RuntimeConfig) -> anyhow::Result<()> {
        write_json(&self.runtime_path, runtime).await
    }

    pub async fn load_power_snapshot(&self) -> anyhow::Result<Option<PowerSnapshot>> {
        let raw = match tokio::fs::read(&self.power_path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let snapshot: PowerSnapshot = serde_json::from_slice(&raw)
            .with_context(|| format!("invalid {}", self.power_path.display()))?;
        if snapshot.version != POWER_SNAPSHOT_VERSION {
            bail!("unsupported power snapshot version {}", snapshot.version);
        }
        Ok(Some(snapshot))
    }

    pub async fn save_power_snapshot(&self, snapshot: &PowerSnapshot) -> anyhow::Result<()> {
        write_json(&self.power_path, snapshot).await
    }
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let payload = serde_json::to_vec_pretty(value)?;
    tokio::fs::write(path, payload)
        .await
        .with_context(|| format!("failed to write {}", path.display()))
}

/// Decides when the power history is worth writing out again.
///
/// The history counts as changed when its length, newest bucket or running
/// total moved away from what was last saved. A changed history is saved at
/// most once per interval unless the caller forces it.
#[derive(Debug, Clone)]
pub struct PowerSnapshotTracker {
    interval_ms: u32,
    last_save: Instant,
    saved_len: usize,
    saved_latest: Option<Instant>,
    saved_total_wh: f64,
}

impl PowerSnapshotTracker {
    pub fn new(interval_ms: u32, now: Instant) -> Self {
        Self {
            interval_ms,
            last_save: now,
            saved_len: 0,
            saved_latest: None,
            saved_total_wh: 0.0,
        }
    }

    pub fn is_dirty(&self, history: &PowerHistory) -> bool {
        history.len() != self.saved_len
            || history.latest_entry().map(|entry| entry.timestamp) != self.saved_latest
            || (history.total_energy_wh() - self.saved_total_wh).abs() > ENERGY_EPSILON_WH
    }

    pub fn should_save(&self, history: &PowerHistory, now: Instant, force: bool) -> bool {
        if !self.is_dirty(history) {
            return false;
        }
        force || now.elapsed_since(self.last_save) >= self.interval_ms
    }

    pub fn mark_saved(&mut self, history: &PowerHistory, now: Instant) {
        self.last_save = now;
        self.saved_len = history.len();
        self.saved_latest = history.latest_entry().map(|entry| entry.timestamp);
        self.saved_total_wh = history.total_energy_wh();
    }
}

#[cfg(test)]
mod tests {
    use hvac_common::FanSpeed;
    use pretty_assertions::assert_eq;

    use super::*;

    fn at(ms: u32) -> Instant {
        Instant::from_millis(ms)
    }

    #[test]
    fn tracker_waits_for_interval_while_dirty() {
        let mut history = PowerHistory::new();
        let mut tracker = PowerSnapshotTracker::new(SNAPSHOT_INTERVAL_MS, at(0));
        assert!(!tracker.should_save(&history, at(SNAPSHOT_INTERVAL_MS), false));

        history.log_state(at(0), FanSpeed::Low, false);
        assert!(tracker.is_dirty(&history));
        assert!(!tracker.should_save(&history, at(1_000), false));
        assert!(tracker.should_save(&history, at(1_000), true));
        assert!(tracker.should_save(&history, at(SNAPSHOT_INTERVAL_MS), false));

        tracker.mark_saved(&history, at(SNAPSHOT_INTERVAL_MS));
        assert!(!tracker.is_dirty(&history));
    }

    #[test]
    fn small_energy_drift_is_not_dirty() {
        let mut history = PowerHistory::new();
        let mut tracker = PowerSnapshotTracker::new(SNAPSHOT_INTERVAL_MS, at(0));
        history.log_state(at(0), FanSpeed::Low, false);
        tracker.mark_saved(&history, at(0));

        // 50 W for 3 s is about 0.04 Wh, inside the same minute.
        history.log_state(at(3_000), FanSpeed::Low, false);
        assert!(!tracker.is_dirty(&history));

        history.log_state(at(6_000), FanSpeed::Low, false);
        assert!(tracker.is_dirty(&history));
    }

    #[tokio::test]
    async fn snapshot_round_trips_through_data_dir() {
        let dir = std::env::temp_dir().join(format!("hvac-store-{}", std::process::id()));
        let store = AppStore::new(dir.clone());
        assert_eq!(store.load_power_snapshot().await.unwrap(), None);

        let mut history = PowerHistory::new();
        history.log_state(at(0), FanSpeed::High, true);
        history.log_state(at(90_000), FanSpeed::Medium, false);
        let snapshot = PowerSnapshot::capture(&history);

        store.save_power_snapshot(&snapshot).await.unwrap();
        assert_eq!(store.load_power_snapshot().await.unwrap(), Some(snapshot));

        let runtime = store.load_runtime_config().await.unwrap();
        assert_eq!(runtime, RuntimeConfig::default());

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
