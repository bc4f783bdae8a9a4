//! Output sinks, which consume the plugin's rendered audio.

#[cfg(feature = "wav-output")]
pub mod wav;

use crate::{
    plugin::{AudioFormat, AudioOutput, PluginAudioBuffer},
    utils::buffer::i16_to_f32,
    Error,
};

// -------------------------------------------------------------------------------------------------

/// Receives audio rendered by an [`AudioWorker`](crate::AudioWorker).
pub trait OutputSink: Send + 'static {
    /// Interleaved channel count of submitted buffers: 1 or 2.
    fn channel_count(&self) -> usize;
    /// Sample rate the sink consumes.
    fn sample_rate(&self) -> u32;
    /// Sample format of submitted buffers.
    fn format(&self) -> AudioFormat;

    /// Number of frames the sink wants to receive now, or 0 when nothing is due.
    fn frames_requested(&mut self) -> usize;
    /// Consume a rendered buffer.
    fn submit(&mut self, buffer: &PluginAudioBuffer) -> Result<(), Error>;

    /// True when the sink no longer accepts any audio.
    fn is_finished(&self) -> bool;
}

// -------------------------------------------------------------------------------------------------

/// Collects rendered audio as interleaved f32 samples in memory, up to a fixed number of frames.
///
/// S16 buffers get converted back to f32.
#[derive(Debug, Clone)]
pub struct MemorySink {
    channel_count: usize,
    sample_rate: u32,
    format: AudioFormat,
    frame_count: usize,
    samples: Vec<f32>,
}

impl MemorySink {
    /// Create a new sink, which accepts `frame_count` frames.
    pub fn new(channel_count: usize, sample_rate: u32, frame_count: usize) -> Self {
        assert!(
            channel_count == 1 || channel_count == 2,
            "Unsupported channel count: {channel_count}"
        );
        Self {
            channel_count,
            sample_rate,
            format: AudioFormat::F32,
            frame_count,
            samples: Vec::with_capacity(frame_count * channel_count),
        }
    }

    /// Request buffers in the given format.
    pub fn with_format(mut self, format: AudioFormat) -> Self {
        self.format = format;
        self
    }

    /// All samples received so far.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Number of frames received so far.
    pub fn frames_written(&self) -> usize {
        self.samples.len() / self.channel_count
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }
}

impl OutputSink for MemorySink {
    fn channel_count(&self) -> usize {
        self.channel_count
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn format(&self) -> AudioFormat {
        self.format
    }

    fn frames_requested(&mut self) -> usize {
        self.frame_count - self.frames_written()
    }

    fn submit(&mut self, buffer: &PluginAudioBuffer) -> Result<(), Error> {
        if buffer.channels != self.channel_count {
            return Err(Error::ParameterError(format!(
                "Expected {} channels, got {}",
                self.channel_count, buffer.channels
            )));
        }
        let frames = buffer.frames.min(self.frames_requested());
        let len = frames * self.channel_count;
        match &buffer.output {
            AudioOutput::F32(samples) => self.samples.extend_from_slice(&samples[..len]),
            AudioOutput::S16(samples) => self
                .samples
                .extend(samples[..len].iter().copied().map(i16_to_f32)),
        }
        Ok(())
    }

    fn is_finished(&self) -> bool {
        self.frames_written() >= self.frame_count
    }
}

// -------------------------------------------------------------------------------------------------
