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

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use blacknode_video::config::{RTP_VIDEO_PORT, VIDEO_PORT};
use blacknode_video::header::{HeaderLayout, RTP_HEADER_LEN};
use clap::{Args, Parser, Subcommand, ValueEnum};
use thiserror::Error;

/// Blacknode video feed tool
///
/// Receives fragmented MJPEG frames or RTP H.264 streams over UDP, and sends
/// test feeds with simulated loss and reordering.
#[derive(Parser, Debug)]
#[clap(name = "blacknode")]
pub struct Opt {
    /// JSON file with a base feed configuration. Flags override its values.
    #[clap(long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Stop after this many seconds instead of waiting for Ctrl-C.
    #[clap(long = "duration-secs", global = true)]
    pub duration_secs: Option<u64>,

    /// How often receiver statistics are logged.
    #[clap(long = "stats-interval-secs", global = true, default_value = "5")]
    pub stats_interval_secs: u64,

    #[clap(subcommand)]
    pub mode: Mode,
}

#[derive(Subcommand, Debug)]
pub enum Mode {
    /// Receive fragmented frames and poll the newest one like a render loop.
    Frames(Frames),

    /// Receive a coded stream and record every extracted unit.
    Stream(Stream),

    /// Send frames as fragment datagrams.
    Send(SendTest),
}

/// Header layout of the fragment protocol.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layout {
    /// 16-bit counters, 18 byte header.
    Compact,
    /// 32-bit counters, 24 byte header.
    Wide,
}

impl Layout {
    pub fn header_layout(self, rtp_outer: bool) -> HeaderLayout {
        let layout = match self {
            Layout::Compact => HeaderLayout::compact(),
            Layout::Wide => HeaderLayout::wide(),
        };
        if rtp_outer {
            layout.with_outer_header(RTP_HEADER_LEN)
        } else {
            layout
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Source {
    /// Raw RTP datagrams carrying the elementary stream.
    Rtp,
    /// Fragment-protocol datagrams carrying slices of the elementary stream.
    Fragmented,
}

#[derive(Args, Debug, Clone)]
pub struct Frames {
    /// Address to listen on [default: 0.0.0.0:50000]
    #[clap(long = "bind")]
    pub bind: Option<SocketAddr>,

    #[clap(long = "layout", value_enum)]
    pub layout: Option<Layout>,

    /// Datagrams carry a 12 byte RTP header in front of the fragment header.
    #[clap(long = "rtp-outer")]
    pub rtp_outer: bool,

    /// Decode each frame as JPEG.
    #[clap(long = "decode")]
    pub decode: bool,

    /// Keep the newest frame in this file. With `--decode` and a `.png`
    /// extension the decoded picture is written instead of the JPEG bytes.
    #[clap(long = "snapshot")]
    pub snapshot: Option<PathBuf>,

    /// Mailbox poll period of the simulated render loop.
    #[clap(long = "render-interval-ms", default_value = "8")]
    pub render_interval_ms: u64,
}

#[derive(Args, Debug, Clone)]
pub struct Stream {
    /// Address to listen on [default: 0.0.0.0:1001]
    #[clap(long = "bind")]
    pub bind: Option<SocketAddr>,

    #[clap(long = "source", value_enum, default_value = "rtp")]
    pub source: Source,

    /// Fragment header layout when `--source fragmented`.
    #[clap(long = "layout", value_enum)]
    pub layout: Option<Layout>,

    /// Fragment datagrams carry a 12 byte RTP header in front of the
    /// fragment header. Only meaningful with `--source fragmented`.
    #[clap(long = "rtp-outer")]
    pub rtp_outer: bool,

    /// Annex B file the coded units are appended to.
    #[clap(long = "output", short = 'o')]
    pub output: PathBuf,

    /// Frame rate used to synthesize presentation times.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=240))]
    pub fps: Option<u32>,
}

#[derive(Args, Debug, Clone)]
pub struct SendTest {
    /// Where to send the datagrams.
    #[clap(long = "target", default_value_t = SocketAddr::from(([127, 0, 0, 1], VIDEO_PORT)))]
    pub target: SocketAddr,

    /// A file, or a directory whose files are sent in name order. Without
    /// it a synthetic JPEG test card is sent.
    #[clap(long = "input", short = 'i')]
    pub input: Option<PathBuf>,

    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u32).range(1..=240))]
    pub fps: u32,

    /// Number of frames to send; runs until stopped when omitted.
    #[clap(long = "count")]
    pub count: Option<u32>,

    /// Probability that any single datagram is dropped.
    #[clap(long = "loss", default_value = "0")]
    pub loss: Probability,

    /// Send each frame's fragments in random order.
    #[clap(long = "shuffle")]
    pub shuffle: bool,

    #[clap(long = "layout", value_enum, default_value = "compact")]
    pub layout: Layout,

    #[clap(long = "rtp-outer")]
    pub rtp_outer: bool,

    #[clap(long = "payload-cap", default_value = "1400")]
    pub payload_cap: usize,

    /// Test card width.
    #[clap(long = "width", default_value = "320")]
    pub width: u32,

    /// Test card height.
    #[clap(long = "height", default_value = "240")]
    pub height: u32,
}

/// Default listen address of the RTP stream mode.
pub fn default_stream_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], RTP_VIDEO_PORT))
}

/// A value in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Probability(pub f64);

#[derive(Error, Debug)]
pub enum ParseProbabilityError {
    #[error("not a number: {0}")]
    NotANumber(String),
    #[error("probability {0} is outside 0..=1")]
    OutOfRange(f64),
}

impl FromStr for Probability {
    type Err = ParseProbabilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: f64 = s
            .parse()
            .map_err(|_| ParseProbabilityError::NotANumber(s.to_string()))?;
        if !(0.0..=1.0).contains(&value) {
            return Err(ParseProbabilityError::OutOfRange(value));
        }
        Ok(Probability(value))
    }
}
