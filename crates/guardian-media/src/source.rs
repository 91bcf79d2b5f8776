//! Frame source abstraction.

use async_trait::async_trait;

use crate::error::MediaResult;
use crate::frame::Frame;
use crate::probe::SourceInfo;

/// An open video source yielding frames in order.
#[async_trait]
pub trait FrameSource: Send {
    /// Next frame, or `None` at end of stream.
    async fn read_frame(&mut self) -> MediaResult<Option<Frame>>;

    /// Metadata discovered when the source was opened.
    fn info(&self) -> &SourceInfo;

    /// Release the underlying capture handle.
    ///
    /// Callers release each source exactly once; implementations must also
    /// tolerate being dropped without a release.
    async fn release(&mut self);
}

/// Opens sources by URI or path.
#[async_trait]
pub trait SourceOpener: Send + Sync {
    async fn open(&self, uri: &str) -> MediaResult<Box<dyn FrameSource>>;
}
