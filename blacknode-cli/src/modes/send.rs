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

use std::fs;
use std::net::{SocketAddr, UdpSocket};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use blacknode_cli::cli_args::SendTest;
use blacknode_video::fragment::FrameFragmenter;
use blacknode_video::image_decode::{encode_jpeg, test_pattern};
use rand::seq::SliceRandom;
use rand::{thread_rng, Rng};
use tracing::{debug, info};

use super::RunControl;

enum FrameSource {
    Files(Vec<Vec<u8>>),
    TestCard { width: u32, height: u32 },
}

impl FrameSource {
    fn open(args: &SendTest) -> anyhow::Result<Self> {
        let Some(input) = &args.input else {
            return Ok(FrameSource::TestCard {
                width: args.width,
                height: args.height,
            });
        };
        let frames = read_frames(input)?;
        if frames.is_empty() {
            bail!("no frames found in {}", input.display());
        }
        info!("Loaded {} frames from {}", frames.len(), input.display());
        Ok(FrameSource::Files(frames))
    }

    fn frame(&self, index: u32) -> anyhow::Result<Vec<u8>> {
        match self {
            FrameSource::Files(frames) => Ok(frames[index as usize % frames.len()].clone()),
            FrameSource::TestCard { width, height } => Ok(encode_jpeg(
                &test_pattern(*width, *height, index),
                *width,
                *height,
                80,
            )?),
        }
    }
}

fn read_frames(input: &Path) -> anyhow::Result<Vec<Vec<u8>>> {
    if input.is_file() {
        let data = fs::read(input).with_context(|| format!("reading {}", input.display()))?;
        return Ok(vec![data]);
    }
    let mut paths: Vec<_> = fs::read_dir(input)
        .with_context(|| format!("listing {}", input.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .collect();
    paths.sort();
    paths
        .iter()
        .map(|path| fs::read(path).with_context(|| format!("reading {}", path.display())))
        .filter(|data| !matches!(data, Ok(d) if d.is_empty()))
        .collect()
}

fn unspecified_for(target: SocketAddr) -> SocketAddr {
    if target.is_ipv4() {
        SocketAddr::from(([0, 0, 0, 0], 0))
    } else {
        SocketAddr::from(([0u16; 8], 0))
    }
}

/// Sends frames at a fixed rate, dropping and reordering datagrams on
/// request to exercise a receiver.
pub fn send(args: SendTest, control: &RunControl) -> anyhow::Result<()> {
    let source = FrameSource::open(&args)?;
    let socket = UdpSocket::bind(unspecified_for(args.target))?;
    let mut fragmenter =
        FrameFragmenter::new(args.layout.header_layout(args.rtp_outer), args.payload_cap);
    let mut rng = thread_rng();
    let frame_interval = Duration::from_secs_f64(1.0 / args.fps as f64);
    info!(
        "Sending to {} at {} fps (loss {}, shuffle {})",
        args.target, args.fps, args.loss.0, args.shuffle
    );

    let mut next_frame = Instant::now();
    let mut frame_id = 0u32;
    let (mut sent, mut dropped) = (0u64, 0u64);
    while control.keep_going() && args.count.map_or(true, |count| frame_id < count) {
        let frame = source.frame(frame_id)?;
        let mut datagrams = fragmenter.fragment(frame_id, &frame)?;
        if args.shuffle {
            datagrams.shuffle(&mut rng);
        }
        for datagram in &datagrams {
            if args.loss.0 > 0.0 && rng.gen_bool(args.loss.0) {
                dropped += 1;
                continue;
            }
            socket.send_to(datagram, args.target)?;
            sent += 1;
        }
        debug!("Frame {frame_id}: {} bytes in {} datagrams", frame.len(), datagrams.len());

        frame_id = frame_id.wrapping_add(1);
        next_frame += frame_interval;
        if let Some(wait) = next_frame.checked_duration_since(Instant::now()) {
            thread::sleep(wait);
        }
    }

    info!("Sent {frame_id} frames: {sent} datagrams sent, {dropped} dropped");
    Ok(())
}
