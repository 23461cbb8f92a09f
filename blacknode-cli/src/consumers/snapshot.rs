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
use std::path::{Path, PathBuf};

use blacknode_video::DecodedPicture;
use image::{ExtendedColorType, ImageFormat};

/// Keeps the newest frame on disk. Each write goes to a sibling temporary
/// file first and is renamed over the target, so readers never see a torn
/// image.
pub struct SnapshotWriter {
    path: PathBuf,
    staging: PathBuf,
}

impl SnapshotWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut staging = path.clone().into_os_string();
        staging.push(".tmp");
        Self {
            path,
            staging: staging.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the target asks for a decoded PNG rather than raw frame bytes.
    pub fn wants_png(&self) -> bool {
        self.path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("png"))
    }

    pub fn write_bytes(&self, bytes: &[u8]) -> anyhow::Result<()> {
        fs::write(&self.staging, bytes)?;
        fs::rename(&self.staging, &self.path)?;
        Ok(())
    }

    pub fn write_picture(&self, picture: &DecodedPicture) -> anyhow::Result<()> {
        image::save_buffer_with_format(
            &self.staging,
            &picture.pixels,
            picture.width,
            picture.height,
            ExtendedColorType::Rgba8,
            ImageFormat::Png,
        )?;
        fs::rename(&self.staging, &self.path)?;
        Ok(())
    }
}
