/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use blacknode_video::config::FeedConfig;
use blacknode_video::stats::StatsSnapshot;
use tracing::info;

pub mod frames;
pub mod send;
pub mod stream;

/// Decides when a mode should wind down: Ctrl-C or the optional deadline.
pub struct RunControl {
    running: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl RunControl {
    pub fn new(running: Arc<AtomicBool>, duration_secs: Option<u64>) -> Self {
        Self {
            running,
            deadline: duration_secs.map(|s| Instant::now() + Duration::from_secs(s)),
        }
    }

    pub fn keep_going(&self) -> bool {
        self.running.load(Ordering::SeqCst) && self.deadline.map_or(true, |d| Instant::now() < d)
    }
}

/// Logs a stats snapshot every `interval`.
pub struct StatsReporter {
    interval: Duration,
    last: Instant,
}

impl StatsReporter {
    pub fn new(interval_secs: u64) -> Self {
        Self {
            interval: Duration::from_secs(interval_secs.max(1)),
            last: Instant::now(),
        }
    }

    pub fn maybe_report(&mut self, snapshot: impl FnOnce() -> StatsSnapshot) -> anyhow::Result<()> {
        if self.last.elapsed() >= self.interval {
            self.last = Instant::now();
            report(&snapshot())?;
        }
        Ok(())
    }
}

pub fn report(snapshot: &StatsSnapshot) -> anyhow::Result<()> {
    info!("stats {}", serde_json::to_string(snapshot)?);
    Ok(())
}

/// The `--config` file, or defaults. Returns whether a file was loaded.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<(FeedConfig, bool)> {
    match path {
        Some(path) => {
            let config = FeedConfig::from_json_file(path)?;
            info!("Loaded configuration from {}", path.display());
            Ok((config, true))
        }
        None => Ok((FeedConfig::default(), false)),
    }
}
