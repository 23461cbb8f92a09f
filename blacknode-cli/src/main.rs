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

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::anyhow;
use blacknode_cli::cli_args::{Mode, Opt};
use clap::Parser;
use tracing::{debug, info};
use tracing::level_filters::LevelFilter;

mod modes;

use modes::frames::frames;
use modes::send::send;
use modes::stream::stream;
use modes::RunControl;

fn main() -> anyhow::Result<()> {
    // `try_init` also routes the library's `log` records into tracing.
    tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .try_init()
        .map_err(|e| anyhow!("failed to install logger: {e}"))?;

    let opt = Opt::parse();

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;
    debug!("Installed Ctrl-C handler");

    let control = RunControl::new(running, opt.duration_secs);
    let config_path = opt.config.as_deref();

    match opt.mode {
        Mode::Frames(args) => frames(args, config_path, &control, opt.stats_interval_secs)?,
        Mode::Stream(args) => stream(args, config_path, &control, opt.stats_interval_secs)?,
        Mode::Send(args) => send(args, &control)?,
    }

    info!("Done");
    Ok(())
}
