//! Frame chaining for sequential batches
//!
//! In sequential mode each finished video can hand its last frame to the next
//! item as a visual reference, which keeps consecutive clips continuous. The
//! batch runner calls a [`ReferenceDeriver`] after every successful item; the
//! crate provides [`FfmpegFrameExtractor`], which shells out to `ffmpeg`.

mod ffmpeg;
mod traits;

pub use ffmpeg::FfmpegFrameExtractor;
pub use traits::ReferenceDeriver;
