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

use blacknode_cli::cli_args::{default_stream_bind, Source, Stream};
use blacknode_cli::consumers::AnnexBWriter;
use blacknode_video::decoder::CodecKind;
use blacknode_video::header::RTP_HEADER_LEN;
use blacknode_video::pipeline::StreamSource;
use blacknode_video::FeedContext;
use tracing::info;

use super::{load_config, report, RunControl, StatsReporter};

pub fn stream(
    args: Stream,
    config_path: Option<&Path>,
    control: &RunControl,
    stats_interval_secs: u64,
) -> anyhow::Result<()> {
    let (mut config, from_file) = load_config(config_path)?;
    match args.bind {
        Some(bind) => config.socket.bind_addr = bind,
        None if !from_file => config.socket.bind_addr = default_stream_bind(),
        None => {}
    }
    if let Some(fps) = args.fps {
        config.stream.nominal_fps = fps;
    }
    if let Some(layout) = args.layout {
        config.reassembly.layout = layout.header_layout(args.rtp_outer);
    } else if args.rtp_outer {
        config.reassembly.layout = config.reassembly.layout.with_outer_header(RTP_HEADER_LEN);
    }

    let source = match args.source {
        Source::Rtp => StreamSource::Rtp {
            header_len: config.stream.rtp_header_len,
        },
        Source::Fragmented => StreamSource::Fragmented(config.reassembly.clone()),
    };

    let mut feed = FeedContext::new(config)?;
    let addr = feed.start_stream(AnnexBWriter::new(&args.output), CodecKind::H264, source)?;
    info!("Recording {:?} stream from {addr}", args.source);

    let mut reporter = StatsReporter::new(stats_interval_secs);
    while control.keep_going() {
        reporter.maybe_report(|| feed.stats())?;
        thread::sleep(Duration::from_millis(100));
    }

    // Stopping flushes the last unit into the recording.
    feed.stop();
    report(&feed.stats())?;
    Ok(())
}
