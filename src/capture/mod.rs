//! Audio capture and frame pacing

pub mod audio;
pub mod pacing;

pub use audio::{AudioPipeline, SampleBuffer, SampleView};
pub use pacing::FramePacer;
