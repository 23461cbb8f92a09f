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

//! Real-time receive path for lossy UDP video feeds: fragment reassembly,
//! elementary-stream extraction and decoder sessions.

pub mod config;
pub mod context;
pub mod decoder;
pub mod error;
pub mod extractor;
pub mod fragment;
pub mod frame;
pub mod header;
pub mod image_decode;
pub mod integrity;
pub mod mailbox;
pub mod pipeline;
pub mod reassembly;
pub mod receiver;
pub mod stats;

pub use config::FeedConfig;
pub use context::FeedContext;
pub use frame::{CompletedFrame, DecodedPicture, OutputFormat};
