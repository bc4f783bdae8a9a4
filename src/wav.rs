//! PCM WAV file loading and sample rate conversion of loaded sounds.

use std::{io, path::Path};

use byteorder::{ByteOrder, LittleEndian};
use riff::{Chunk, ChunkId};

use crate::{
    arena::Arena,
    utils::{
        complex::Complex32,
        fft::{czt, iczt},
        file::read_entire_file,
    },
    Error,
};

// -------------------------------------------------------------------------------------------------

/// A decoded sound with planar stereo f32 samples in range `-1.0..=1.0`.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedSound {
    /// Sample rate of the sound in Hz.
    pub sample_rate: u32,
    /// Number of channels in the source file. Mono sources are duplicated into both channels.
    pub source_channel_count: usize,
    /// Left and right channel samples, with equal lengths.
    pub samples: [Vec<f32>; 2],
}

impl LoadedSound {
    /// Create a new sound from the given planar stereo samples.
    pub fn new(sample_rate: u32, left: Vec<f32>, right: Vec<f32>) -> Self {
        assert_eq!(left.len(), right.len(), "Channel lengths must match");
        Self {
            sample_rate,
            source_channel_count: 2,
            samples: [left, right],
        }
    }

    /// Number of sample frames.
    pub fn frame_count(&self) -> usize {
        self.samples[0].len()
    }
}

// -------------------------------------------------------------------------------------------------

const RIFF_ID: ChunkId = ChunkId { value: *b"RIFF" };
const WAVE_ID: ChunkId = ChunkId { value: *b"WAVE" };
const FMT_ID: ChunkId = ChunkId { value: *b"fmt " };
const DATA_ID: ChunkId = ChunkId { value: *b"data" };

const WAVE_FORMAT_PCM: u16 = 1;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xfffe;

/// Decode the given RIFF/WAVE file content.
///
/// Only uncompressed PCM files (plain or extensible format) with 1 or 2 channels and 8, 16 or
/// 32 bits per sample are supported. Samples are converted to f32 in range `-1.0..=1.0`.
pub fn load_wav(buffer: Vec<u8>) -> Result<LoadedSound, Error> {
    let mut cursor = io::Cursor::new(buffer);
    let decoding_error = |err: io::Error| Error::AudioDecodingError(Box::new(err));

    let chunk = Chunk::read(&mut cursor, 0).map_err(decoding_error)?;
    if chunk.id() != RIFF_ID || chunk.read_type(&mut cursor).map_err(decoding_error)? != WAVE_ID
    {
        return Err(Error::UnsupportedAudioFormat(
            "not a RIFF/WAVE file".to_string(),
        ));
    }

    let mut format = None;
    let mut data = None;
    let children = chunk.iter(&mut cursor).flatten().collect::<Vec<_>>();
    for child in children {
        if child.id() == FMT_ID {
            let content = child.read_contents(&mut cursor).map_err(decoding_error)?;
            format = Some(WavFormat::parse(&content)?);
        } else if child.id() == DATA_ID {
            data = Some(child.read_contents(&mut cursor).map_err(decoding_error)?);
        }
    }
    let format = format
        .ok_or_else(|| Error::UnsupportedAudioFormat("missing 'fmt ' chunk".to_string()))?;
    let data =
        data.ok_or_else(|| Error::UnsupportedAudioFormat("missing 'data' chunk".to_string()))?;

    Ok(format.decode(&data))
}

/// Read and decode the given WAV file.
pub fn load_wav_file<P: AsRef<Path>>(path: P) -> Result<LoadedSound, Error> {
    load_wav(read_entire_file(path)?)
}

// -------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct WavFormat {
    channel_count: usize,
    sample_rate: u32,
    bits_per_sample: u16,
}

impl WavFormat {
    fn parse(content: &[u8]) -> Result<Self, Error> {
        if content.len() < 16 {
            return Err(Error::UnsupportedAudioFormat(format!(
                "'fmt ' chunk is too short: {} bytes",
                content.len()
            )));
        }
        let mut format_tag = LittleEndian::read_u16(&content[0..2]);
        if format_tag == WAVE_FORMAT_EXTENSIBLE && content.len() >= 40 {
            // the sub format GUID starts with the actual format tag
            format_tag = LittleEndian::read_u16(&content[24..26]);
        }
        let channel_count = LittleEndian::read_u16(&content[2..4]) as usize;
        let sample_rate = LittleEndian::read_u32(&content[4..8]);
        let block_align = LittleEndian::read_u16(&content[12..14]) as usize;
        let bits_per_sample = LittleEndian::read_u16(&content[14..16]);

        if format_tag != WAVE_FORMAT_PCM {
            return Err(Error::UnsupportedAudioFormat(format!(
                "only PCM files are supported, got format tag {format_tag}"
            )));
        }
        if !(1..=2).contains(&channel_count) {
            return Err(Error::UnsupportedAudioFormat(format!(
                "only mono and stereo files are supported, got {channel_count} channels"
            )));
        }
        if !matches!(bits_per_sample, 8 | 16 | 32) {
            return Err(Error::UnsupportedAudioFormat(format!(
                "unsupported bit depth: {bits_per_sample}"
            )));
        }
        if sample_rate == 0 {
            return Err(Error::UnsupportedAudioFormat(
                "invalid sample rate: 0".to_string(),
            ));
        }
        if block_align != channel_count * bits_per_sample as usize / 8 {
            return Err(Error::UnsupportedAudioFormat(format!(
                "unexpected block alignment: {block_align}"
            )));
        }
        Ok(Self {
            channel_count,
            sample_rate,
            bits_per_sample,
        })
    }

    fn decode(&self, data: &[u8]) -> LoadedSound {
        let sample_size = self.bits_per_sample as usize / 8;
        let frame_size = sample_size * self.channel_count;
        let frame_count = data.len() / frame_size;

        let decode_sample = |bytes: &[u8]| -> f32 {
            match self.bits_per_sample {
                8 => (bytes[0] as f32 - 128.0) / 128.0,
                16 => LittleEndian::read_i16(bytes) as f32 / 32768.0,
                32 => LittleEndian::read_i32(bytes) as f32 / 2147483648.0,
                _ => unreachable!("Unexpected bit depth"),
            }
        };

        let mut left = Vec::with_capacity(frame_count);
        let mut right = Vec::with_capacity(frame_count);
        for frame in data.chunks_exact(frame_size) {
            let l = decode_sample(&frame[..sample_size]);
            let r = if self.channel_count == 2 {
                decode_sample(&frame[sample_size..])
            } else {
                l
            };
            left.push(l);
            right.push(r);
        }
        LoadedSound {
            sample_rate: self.sample_rate,
            source_channel_count: self.channel_count,
            samples: [left, right],
        }
    }
}

// -------------------------------------------------------------------------------------------------

fn resampled_frame_count(frame_count: usize, source_rate: u32, target_rate: u32) -> usize {
    let source_rate = source_rate as u64;
    ((frame_count as u64 * target_rate as u64 + source_rate / 2) / source_rate) as usize
}

/// Convert the given sound to a new sample rate via linear interpolation.
pub fn resample_linear(sound: &LoadedSound, target_rate: u32) -> LoadedSound {
    assert!(target_rate > 0, "Invalid target sample rate");
    if sound.sample_rate == target_rate || sound.frame_count() == 0 {
        return LoadedSound {
            sample_rate: target_rate,
            ..sound.clone()
        };
    }
    let frame_count = sound.frame_count();
    let target_frame_count = resampled_frame_count(frame_count, sound.sample_rate, target_rate);
    let step = sound.sample_rate as f64 / target_rate as f64;

    let samples = sound.samples.each_ref().map(|channel| {
        (0..target_frame_count)
            .map(|index| {
                let position = index as f64 * step;
                let index = (position as usize).min(frame_count - 1);
                let next_index = (index + 1).min(frame_count - 1);
                let fraction = (position - index as f64).clamp(0.0, 1.0) as f32;
                channel[index] + (channel[next_index] - channel[index]) * fraction
            })
            .collect::<Vec<_>>()
    });
    LoadedSound {
        sample_rate: target_rate,
        source_channel_count: sound.source_channel_count,
        samples,
    }
}

/// Convert the given sound to a new sample rate by zero padding or truncating its spectrum.
///
/// The whole sound is transformed at once via the chirp z-transform, so this treats the sound
/// as one period of a periodic signal. Experimental: needs a lot of scratch memory for long
/// sounds.
pub fn resample_czt(
    sound: &LoadedSound,
    target_rate: u32,
    scratch: &mut Arena<'_>,
) -> LoadedSound {
    assert!(target_rate > 0, "Invalid target sample rate");
    let frame_count = sound.frame_count();
    if sound.sample_rate == target_rate || frame_count == 0 {
        return LoadedSound {
            sample_rate: target_rate,
            ..sound.clone()
        };
    }
    let target_frame_count = resampled_frame_count(frame_count, sound.sample_rate, target_rate);
    let scaling = target_frame_count as f32 / frame_count as f32;

    let kept_bins = frame_count.min(target_frame_count);
    let positive_bins = kept_bins.div_ceil(2);
    let negative_bins = kept_bins - positive_bins;

    let mut spectrum = vec![Complex32::default(); frame_count];
    let mut target_spectrum = vec![Complex32::default(); target_frame_count];
    let mut output_im = vec![0.0; target_frame_count];

    let samples = sound.samples.each_ref().map(|channel| {
        czt(&mut spectrum, channel, scratch);

        target_spectrum.fill(Complex32::default());
        target_spectrum[..positive_bins].copy_from_slice(&spectrum[..positive_bins]);
        for k in 1..=negative_bins {
            target_spectrum[target_frame_count - k] = spectrum[frame_count - k];
        }

        let mut output = vec![0.0; target_frame_count];
        iczt(&mut output, &mut output_im, &target_spectrum, scratch);
        for sample in output.iter_mut() {
            *sample *= scaling;
        }
        output
    });
    LoadedSound {
        sample_rate: target_rate,
        source_channel_count: sound.source_channel_count,
        samples,
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use std::{f32::consts::TAU, path::PathBuf};

    /// Write a temporary 16 bit WAV test file with the given interleaved samples.
    pub(crate) fn write_test_wav(
        name: &str,
        sample_rate: u32,
        channel_count: u16,
        bits_per_sample: u16,
        samples: &[f32],
    ) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "granade_{}_{}.wav",
            name,
            crate::utils::unique_usize_id()
        ));
        let spec = hound::WavSpec {
            channels: channel_count,
            sample_rate,
            bits_per_sample,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for sample in samples {
            match bits_per_sample {
                8 => writer.write_sample((sample * 127.0) as i8).unwrap(),
                16 => writer.write_sample((sample * 32767.0) as i16).unwrap(),
                32 => writer.write_sample((sample * 2147483647.0) as i32).unwrap(),
                _ => panic!("unsupported bit depth"),
            }
        }
        writer.finalize().unwrap();
        path
    }

    #[test]
    fn load_formats() {
        let samples = [0.0, 0.5, -0.5, 0.25];
        for bits_per_sample in [8, 16, 32] {
            let path = write_test_wav("formats", 44100, 2, bits_per_sample, &samples);
            let sound = load_wav_file(&path).unwrap();
            std::fs::remove_file(&path).unwrap();

            assert_eq!(sound.sample_rate, 44100);
            assert_eq!(sound.source_channel_count, 2);
            assert_eq!(sound.frame_count(), 2);
            let epsilon = if bits_per_sample == 8 { 1e-2 } else { 1e-4 };
            for (actual, expected) in sound.samples[0].iter().zip([0.0, -0.5]) {
                assert!((actual - expected).abs() < epsilon, "{actual} != {expected}");
            }
            for (actual, expected) in sound.samples[1].iter().zip([0.5, 0.25]) {
                assert!((actual - expected).abs() < epsilon, "{actual} != {expected}");
            }
        }
    }

    #[test]
    fn mono_is_duplicated() {
        let path = write_test_wav("mono", 48000, 1, 16, &[0.5, -0.5, 0.0]);
        let sound = load_wav_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(sound.source_channel_count, 1);
        assert_eq!(sound.samples[0], sound.samples[1]);
        assert_eq!(sound.frame_count(), 3);
    }

    #[test]
    fn invalid_files() {
        assert!(matches!(
            load_wav(b"RIFF\x04\x00\x00\x00AVI ".to_vec()),
            Err(Error::UnsupportedAudioFormat(_))
        ));
        assert!(load_wav(vec![1, 2, 3]).is_err());
        assert!(matches!(
            load_wav_file("/this/file/does/not/exist.wav"),
            Err(Error::AudioFileNotFound)
        ));

        // IEEE float files are rejected
        let path = std::env::temp_dir().join(format!(
            "granade_float_{}.wav",
            crate::utils::unique_usize_id()
        ));
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 48000,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        writer.write_sample(0.5f32).unwrap();
        writer.finalize().unwrap();
        let result = load_wav_file(&path);
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(result, Err(Error::UnsupportedAudioFormat(_))));
    }

    #[test]
    fn linear_resampling() {
        let ramp = (0..441).map(|i| i as f32 / 441.0).collect::<Vec<_>>();
        let sound = LoadedSound::new(44100, ramp.clone(), ramp);
        let resampled = resample_linear(&sound, 48000);
        assert_eq!(resampled.sample_rate, 48000);
        assert_eq!(resampled.frame_count(), 480);
        for (index, sample) in resampled.samples[0].iter().enumerate().take(470) {
            let expected = index as f32 * 44100.0 / 48000.0 / 441.0;
            assert!((sample - expected).abs() < 1e-4);
        }

        let same = resample_linear(&resampled, 48000);
        assert_eq!(same, resampled);
    }

    #[test]
    fn czt_resampling() {
        // 3 full periods, so the signal is periodic within the sound
        let source = (0..441)
            .map(|i| (TAU * 3.0 * i as f32 / 441.0).sin())
            .collect::<Vec<_>>();
        let sound = LoadedSound::new(44100, source.clone(), source);

        let mut scratch = Arena::with_capacity(1024 * 1024);
        let resampled = resample_czt(&sound, 48000, &mut scratch);
        assert_eq!(scratch.pos(), 0);
        assert_eq!(resampled.frame_count(), 480);
        for (index, sample) in resampled.samples[1].iter().enumerate() {
            let expected = (TAU * 3.0 * index as f32 / 480.0).sin();
            assert!((sample - expected).abs() < 1e-2, "{sample} != {expected}");
        }
    }
}
