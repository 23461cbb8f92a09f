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
use std::thread;
use std::time::Duration;

use blacknode_cli::cli_args::Frames;
use blacknode_cli::consumers::SnapshotWriter;
use blacknode_video::image_decode::decode_jpeg;
use blacknode_video::FeedContext;
use tracing::{debug, info, warn};

use super::{load_config, report, RunControl, StatsReporter};

/// Polls the frame mailbox at the render interval, like a display loop
/// would, until told to stop.
pub fn frames(
    args: Frames,
    config_path: Option<&Path>,
    control: &RunControl,
    stats_interval_secs: u64,
) -> anyhow::Result<()> {
    let (mut config, _) = load_config(config_path)?;
    if let Some(bind) = args.bind {
        config.socket.bind_addr = bind;
    }
    if let Some(layout) = args.layout {
        config.reassembly.layout = layout.header_layout(args.rtp_outer);
    } else if args.rtp_outer {
        config.reassembly.layout = config
            .reassembly
            .layout
            .with_outer_header(blacknode_video::header::RTP_HEADER_LEN);
    }

    let mut feed = FeedContext::new(config)?;
    let addr = feed.start_frames()?;
    info!("Waiting for frames on {addr}");

    let snapshot = args.snapshot.map(SnapshotWriter::new);
    let frames = feed.frames();
    let mut reporter = StatsReporter::new(stats_interval_secs);
    let render_interval = Duration::from_millis(args.render_interval_ms.max(1));
    let mut shown = 0u64;

    while control.keep_going() {
        if let Some(frame) = frames.take() {
            shown += 1;
            debug!(
                "Frame {} ({} bytes, assembled in {:?})",
                frame.frame_id,
                frame.len(),
                frame.assembly_time()
            );

            let picture = if args.decode {
                match decode_jpeg(&frame.data) {
                    Ok(picture) => {
                        debug!("Decoded {}x{}", picture.width, picture.height);
                        Some(picture)
                    }
                    Err(e) => {
                        warn!("Frame {} is not a decodable JPEG: {e}", frame.frame_id);
                        None
                    }
                }
            } else {
                None
            };

            if let Some(writer) = &snapshot {
                let written = match &picture {
                    Some(picture) if writer.wants_png() => writer.write_picture(picture),
                    _ => writer.write_bytes(&frame.data),
                };
                if let Err(e) = written {
                    warn!("Could not write {}: {e}", writer.path().display());
                }
            }
        }
        reporter.maybe_report(|| feed.stats())?;
        thread::sleep(render_interval);
    }

    feed.stop();
    report(&feed.stats())?;
    info!("Displayed {shown} frames");
    Ok(())
}
