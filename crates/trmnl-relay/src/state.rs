//! Limiter windows persisted between invocations.
//!
//! Every CLI run is a fresh process, so the admitted timestamps of each
//! device are written to `limiter-state.json` next to the config file and
//! replayed into the dispatcher's limiter on the next run. A [`Session`]
//! holds an exclusive lock on `limiter-state.lock` from restore to persist,
//! so overlapping runs take their slots one after another.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

use fs4::fs_std::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use trmnl_relay_core::ServiceDispatcher;

use crate::cli::GlobalOpts;
use crate::config;

const STATE_FILE: &str = "limiter-state.json";
const LOCK_FILE: &str = "limiter-state.lock";

/// Unix milliseconds of admitted requests, keyed by device id.
#[derive(Debug, Default, Serialize, Deserialize)]
struct LimiterState {
    #[serde(default)]
    devices: BTreeMap<String, Vec<i64>>,
}

fn read(path: &Path) -> LimiterState {
    match std::fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "ignoring unreadable limiter state");
            LimiterState::default()
        }),
        Err(_) => LimiterState::default(),
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn millis(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

/// Replay the saved windows of every configured device.
fn restore_from(path: &Path, dispatcher: &ServiceDispatcher) {
    let state = read(path);
    let now = now_millis();
    for id in dispatcher.device_ids() {
        let Some(stamps) = state.devices.get(id.as_str()) else {
            continue;
        };
        let ages: Vec<Duration> = stamps
            .iter()
            .map(|&t| Duration::from_millis(u64::try_from(now.saturating_sub(t)).unwrap_or(0)))
            .collect();
        debug!(device = %id, restored = ages.len(), "restoring limiter window");
        dispatcher.limiter().restore(&id, &ages);
    }
}

/// Add this run's admissions to what is on disk.
///
/// Stored stamps are kept; only the newest `recorded` entries of each
/// in-memory window are new, so nothing is counted twice. Future stamps
/// are clamped to now and expired ones dropped. Devices this run did not
/// load are left alone.
fn persist_to(path: &Path, dispatcher: &ServiceDispatcher) {
    let mut state = read(path);
    let now = now_millis();
    for id in dispatcher.device_ids() {
        let limiter = dispatcher.limiter();
        let history = limiter.history(&id);
        let fresh = usize::try_from(limiter.recorded(&id))
            .unwrap_or(usize::MAX)
            .min(history.len());
        let cutoff = now.saturating_sub(millis(limiter.status(&id).window));

        let mut stamps = state.devices.remove(id.as_str()).unwrap_or_default();
        stamps.extend(
            history[history.len() - fresh..]
                .iter()
                .map(|&age| now.saturating_sub(millis(age))),
        );
        for t in &mut stamps {
            *t = (*t).min(now);
        }
        stamps.retain(|&t| t > cutoff);
        stamps.sort_unstable();

        if !stamps.is_empty() {
            state.devices.insert(id.to_string(), stamps);
        }
    }

    let written = serde_json::to_string_pretty(&state)
        .map_err(std::io::Error::other)
        .and_then(|json| std::fs::write(path, json));
    if let Err(e) = written {
        warn!(path = %path.display(), error = %e, "failed to save limiter state");
    }
}

fn lock(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)?;
    file.lock_exclusive()?;
    Ok(file)
}

/// Persisted limiter state held for the length of one command.
pub struct Session {
    state: PathBuf,
    // Released on drop.
    _lock: Option<File>,
}

impl Session {
    /// Lock the state and replay it into `dispatcher`.
    ///
    /// A lock that cannot be taken is logged and the run goes on unlocked;
    /// the merge in [`Session::persist`] still keeps other runs' stamps.
    pub fn open(global: &GlobalOpts, dispatcher: &ServiceDispatcher) -> Self {
        let state = config::config_path(global).with_file_name(STATE_FILE);
        let lock_path = state.with_file_name(LOCK_FILE);
        let lock = lock(&lock_path)
            .inspect_err(|e| {
                warn!(path = %lock_path.display(), error = %e, "limiter state not locked");
            })
            .ok();
        restore_from(&state, dispatcher);
        Self { state, _lock: lock }
    }

    /// Merge this run's admissions into the state file and unlock.
    pub fn persist(self, dispatcher: &ServiceDispatcher) {
        persist_to(&self.state, dispatcher);
    }
}
