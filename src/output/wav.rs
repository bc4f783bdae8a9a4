use std::{fs::File, io::BufWriter, path::Path, time::Duration};

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::{
    output::OutputSink,
    plugin::{AudioFormat, AudioOutput, PluginAudioBuffer, INTERNAL_SAMPLE_RATE},
    utils::buffer::i16_to_f32,
    Error,
};

// -------------------------------------------------------------------------------------------------

const DEFAULT_CHANNEL_COUNT: usize = 2;

// -------------------------------------------------------------------------------------------------

/// Output sink, which renders a fixed duration of audio into a wav file as fast as possible.
///
/// Wav file contents are always saved as 32bit floats. The file gets finalized when the
/// duration got written or when the sink is dropped.
pub struct WavSink {
    writer: Option<WavWriter<BufWriter<File>>>,
    channel_count: usize,
    sample_rate: u32,
    frames_written: u64,
    frame_count: u64,
}

impl WavSink {
    /// Open a stereo wav sink at the internal sample rate.
    pub fn open<P: AsRef<Path>>(file_path: P, duration: Duration) -> Result<Self, Error> {
        Self::open_with_specs(
            file_path,
            INTERNAL_SAMPLE_RATE,
            DEFAULT_CHANNEL_COUNT,
            duration,
        )
    }

    /// Create a new wav sink with the given parameters.
    ///
    /// * `file_path`: Target file path. Should end with ".wav" extension.
    /// * `sample_rate`: Wav file's sample rate.
    /// * `channel_count`: Wav file's channel layout: 1 or 2.
    /// * `duration`: Length of the rendered content.
    pub fn open_with_specs<P: AsRef<Path>>(
        file_path: P,
        sample_rate: u32,
        channel_count: usize,
        duration: Duration,
    ) -> Result<Self, Error> {
        if channel_count != 1 && channel_count != 2 {
            return Err(Error::ParameterError(format!(
                "Unsupported wav sink channel count: {channel_count}"
            )));
        }
        let spec = WavSpec {
            channels: channel_count as u16,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let writer = WavWriter::create(file_path, spec)
            .map_err(|e| Error::OutputDeviceError(Box::new(e)))?;

        let frame_count = (duration.as_secs_f64() * sample_rate as f64).round() as u64;
        Ok(Self {
            writer: Some(writer),
            channel_count,
            sample_rate,
            frames_written: 0,
            frame_count,
        })
    }

    /// Number of frames written so far.
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Flush and close the file.
    pub fn finalize(&mut self) -> Result<(), Error> {
        if let Some(writer) = self.writer.take() {
            writer
                .finalize()
                .map_err(|e| Error::OutputDeviceError(Box::new(e)))?;
        }
        Ok(())
    }
}

impl OutputSink for WavSink {
    fn channel_count(&self) -> usize {
        self.channel_count
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn format(&self) -> AudioFormat {
        AudioFormat::F32
    }

    fn frames_requested(&mut self) -> usize {
        if self.writer.is_none() {
            return 0;
        }
        (self.frame_count - self.frames_written) as usize
    }

    fn submit(&mut self, buffer: &PluginAudioBuffer) -> Result<(), Error> {
        debug_assert_eq!(buffer.channels, self.channel_count);
        let frames = buffer.frames.min(self.frames_requested());
        let len = frames * self.channel_count;
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };
        let result = match &buffer.output {
            AudioOutput::F32(samples) => samples[..len]
                .iter()
                .try_for_each(|sample| writer.write_sample(*sample)),
            AudioOutput::S16(samples) => samples[..len]
                .iter()
                .try_for_each(|sample| writer.write_sample(i16_to_f32(*sample))),
        };
        result.map_err(|e| Error::OutputDeviceError(Box::new(e)))?;

        self.frames_written += frames as u64;
        if self.frames_written >= self.frame_count {
            self.finalize()?;
        }
        Ok(())
    }

    fn is_finished(&self) -> bool {
        self.writer.is_none()
    }
}

impl Drop for WavSink {
    fn drop(&mut self) {
        if let Err(err) = self.finalize() {
            log::error!("Failed to finalize WAV file: {err}");
        }
    }
}

// -------------------------------------------------------------------------------------------------
