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

use std::sync::Arc;

use log::trace;

use super::OutputSink;
use crate::error::{DecoderError, DecoderResult};
use crate::frame::{DecodedPicture, OutputFormat};
use crate::mailbox::Mailbox;

/// Presents pictures by publishing them to a shared [`Mailbox`], where the
/// rendering thread picks up the newest one.
pub struct MailboxSink {
    mailbox: Arc<Mailbox<DecodedPicture>>,
    geometry: Option<OutputFormat>,
    bound: bool,
}

impl MailboxSink {
    pub fn new(mailbox: Arc<Mailbox<DecodedPicture>>) -> Self {
        Self {
            mailbox,
            geometry: None,
            bound: false,
        }
    }

    pub fn geometry(&self) -> Option<OutputFormat> {
        self.geometry
    }
}

impl OutputSink for MailboxSink {
    fn bind(&mut self) -> DecoderResult<()> {
        self.bound = true;
        Ok(())
    }

    fn set_geometry(&mut self, width: u32, height: u32) -> DecoderResult<()> {
        if width == 0 || height == 0 {
            return Err(DecoderError::Sink(format!(
                "refusing empty geometry {width}x{height}"
            )));
        }
        self.geometry = Some(OutputFormat { width, height });
        Ok(())
    }

    fn present(&mut self, picture: DecodedPicture) -> DecoderResult<()> {
        if !self.bound {
            return Err(DecoderError::Sink("present on an unbound sink".into()));
        }
        if self.geometry != Some(picture.format()) {
            trace!(
                "Picture {}x{} does not match sink geometry {:?}",
                picture.width,
                picture.height,
                self.geometry
            );
        }
        self.mailbox.put(picture);
        Ok(())
    }

    fn unbind(&mut self) {
        self.bound = false;
        self.geometry = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn picture() -> DecodedPicture {
        DecodedPicture {
            width: 2,
            height: 1,
            presentation_time: Duration::from_millis(5),
            pixels: vec![255; 8],
        }
    }

    #[test]
    fn presents_into_the_mailbox_once_bound() {
        let mailbox = Arc::new(Mailbox::new());
        let mut sink = MailboxSink::new(mailbox.clone());

        assert!(sink.present(picture()).is_err());
        sink.bind().unwrap();
        sink.set_geometry(2, 1).unwrap();
        sink.present(picture()).unwrap();

        assert_eq!(mailbox.take(), Some(picture()));
        sink.unbind();
        assert!(sink.geometry().is_none());
    }

    #[test]
    fn zero_geometry_is_rejected() {
        let mut sink = MailboxSink::new(Arc::new(Mailbox::new()));
        assert!(matches!(sink.set_geometry(0, 10), Err(DecoderError::Sink(_))));
    }
}
