//! Mock DSP toolkit for testing.

use std::sync::Mutex;

use crate::decoder::{ChainSpec, DecodeError, Dsp, FrameStream, WavSource};

/// Mock implementation of the [`Dsp`] trait.
///
/// Yields a fixed list of frames for every chain and renders a fixed image.
/// Records the chains it was asked to build.
///
/// # Example
///
/// ```rust,ignore
/// let dsp = MockDsp::new()
///     .with_frames(vec![vec![0; 256]; 3])
///     .with_image(b"jpeg".to_vec());
/// ```
#[derive(Debug, Default)]
pub struct MockDsp {
    frames: Vec<Vec<u8>>,
    image: Option<Vec<u8>>,
    failure: Option<String>,
    chains: Mutex<Vec<ChainSpec>>,
    render_calls: Mutex<usize>,
}

impl MockDsp {
    /// A toolkit that synchronizes nothing.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_frames(mut self, frames: Vec<Vec<u8>>) -> Self {
        self.frames = frames;
        self
    }

    pub fn with_image(mut self, image: Vec<u8>) -> Self {
        self.image = Some(image);
        self
    }

    /// Every chain fails with `reason`.
    pub fn failing(mut self, reason: impl Into<String>) -> Self {
        self.failure = Some(reason.into());
        self
    }

    /// Chains built so far.
    pub fn chains(&self) -> Vec<ChainSpec> {
        self.chains.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn render_calls(&self) -> usize {
        self.render_calls.lock().map(|n| *n).unwrap_or(0)
    }
}

impl Dsp for MockDsp {
    fn frames(&self, _source: &WavSource, chain: &ChainSpec) -> Result<FrameStream, DecodeError> {
        if let Ok(mut chains) = self.chains.lock() {
            chains.push(chain.clone());
        }
        if let Some(reason) = &self.failure {
            return Err(DecodeError::Dsp(reason.clone()));
        }
        Ok(Box::new(self.frames.clone().into_iter().map(Ok)))
    }

    fn render_image(&self, _frames: &[Vec<u8>]) -> Result<Option<Vec<u8>>, DecodeError> {
        if let Ok(mut calls) = self.render_calls.lock() {
            *calls += 1;
        }
        Ok(self.image.clone())
    }
}
