//! Grain packfiles: sounds sliced into fixed length stereo grains plus a tag vector per grain,
//! stored in a flat little-endian binary file.
//!
//! File layout (all integers are u64, all samples and tag values f32):
//! - header: `file_size`, `grain_count`, `grain_length`, `tag_offset`, `grain_offset`
//! - at `tag_offset`: `grain_count` tags of `start_sample_index` + [`TAG_LENGTH`] values
//! - at `grain_offset`: `grain_count` grains of `grain_length` left, then `grain_length`
//!   right channel samples
//!
//! Offsets are byte offsets from the start of the header.

use std::{io::Write, mem, path::Path};

use byteorder::{ByteOrder, LittleEndian};

use crate::{
    utils::file::{read_entire_file, write_entire_file},
    wav::LoadedSound,
    Error,
};

// -------------------------------------------------------------------------------------------------

/// Number of sample frames per grain in packfiles created by [`GrainPackfileBuilder`].
pub const FILE_GRAIN_LENGTH: usize = 2400;
/// Number of channels per grain.
pub const FILE_GRAIN_CHANNELS: usize = 2;
/// Number of values in a grain's tag vector.
pub const TAG_LENGTH: usize = 200;

/// Size of the packfile header in bytes.
pub const PACKFILE_HEADER_SIZE: usize = 5 * mem::size_of::<u64>();

const TAG_SIZE: usize = mem::size_of::<u64>() + TAG_LENGTH * mem::size_of::<f32>();

// -------------------------------------------------------------------------------------------------

/// Computes a tag vector, which describes the content of a single grain.
pub trait TagModel {
    /// Tag the given mono grain samples.
    fn run_model(&mut self, samples: &[f32]) -> [f32; TAG_LENGTH];
}

/// A [`TagModel`] which tags all grains with zeros.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTagModel;

impl TagModel for NullTagModel {
    fn run_model(&mut self, _samples: &[f32]) -> [f32; TAG_LENGTH] {
        [0.0; TAG_LENGTH]
    }
}

// -------------------------------------------------------------------------------------------------

/// Tag of a single packfile grain.
#[derive(Debug, Clone, PartialEq)]
pub struct GrainTag {
    /// Index of the grain the tag belongs to.
    pub start_sample_index: u64,
    pub vector: Box<[f32; TAG_LENGTH]>,
}

// -------------------------------------------------------------------------------------------------

/// A loaded or freshly built grain packfile.
#[derive(Debug, Clone, PartialEq)]
pub struct GrainPackfile {
    grain_length: usize,
    tags: Vec<GrainTag>,
    samples: Box<[f32]>,
}

impl GrainPackfile {
    /// Number of grains in the packfile.
    pub fn grain_count(&self) -> usize {
        self.tags.len()
    }

    /// Number of sample frames per grain.
    pub fn grain_length(&self) -> usize {
        self.grain_length
    }

    /// All grain tags.
    pub fn tags(&self) -> &[GrainTag] {
        &self.tags
    }

    /// Tag of the grain at the given index.
    pub fn tag(&self, grain_index: usize) -> &GrainTag {
        &self.tags[grain_index]
    }

    /// Left and right channel samples of the grain at the given index.
    pub fn grain_samples(&self, grain_index: usize) -> (&[f32], &[f32]) {
        let grain_size = FILE_GRAIN_CHANNELS * self.grain_length;
        let grain = &self.samples[grain_index * grain_size..(grain_index + 1) * grain_size];
        grain.split_at(self.grain_length)
    }

    /// Size of the serialized packfile in bytes.
    pub fn file_size(&self) -> usize {
        PACKFILE_HEADER_SIZE + self.grain_count() * TAG_SIZE + self.samples.len() * 4
    }

    /// Parse and validate a serialized packfile.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, Error> {
        let format_error = |message: String| Err(Error::PackfileFormatError(message));

        if bytes.len() < PACKFILE_HEADER_SIZE {
            return format_error(format!("file is too short: {} bytes", bytes.len()));
        }
        let header = |index: usize| LittleEndian::read_u64(&bytes[index * 8..(index + 1) * 8]);
        let (file_size, grain_count, grain_length, tag_offset, grain_offset) =
            (header(0), header(1), header(2), header(3), header(4));

        if file_size != bytes.len() as u64 {
            return format_error(format!(
                "file size {file_size} does not match the actual size {}",
                bytes.len()
            ));
        }
        if grain_length == 0 {
            return format_error("grain length must not be zero".to_string());
        }
        let (Ok(grain_count), Ok(grain_length), Ok(tag_offset), Ok(grain_offset)) = (
            usize::try_from(grain_count),
            usize::try_from(grain_length),
            usize::try_from(tag_offset),
            usize::try_from(grain_offset),
        ) else {
            return format_error("header values exceed the address space".to_string());
        };

        let section_end = |offset: usize, element_size: Option<usize>| {
            element_size
                .and_then(|size| size.checked_mul(grain_count))
                .and_then(|size| size.checked_add(offset))
        };
        let grain_size = grain_length
            .checked_mul(FILE_GRAIN_CHANNELS * mem::size_of::<f32>());
        let tags_end = section_end(tag_offset, Some(TAG_SIZE));
        let grains_end = section_end(grain_offset, grain_size);

        if tag_offset < PACKFILE_HEADER_SIZE || tag_offset % 4 != 0 {
            return format_error(format!("invalid tag offset {tag_offset}"));
        }
        if grain_offset < PACKFILE_HEADER_SIZE || grain_offset % 4 != 0 {
            return format_error(format!("invalid grain offset {grain_offset}"));
        }
        let (Some(tags_end), Some(grains_end)) = (tags_end, grains_end) else {
            return format_error("grain count exceeds the address space".to_string());
        };
        if tags_end > bytes.len() || grains_end > bytes.len() {
            return format_error(format!(
                "{grain_count} grains don't fit into a file of {} bytes",
                bytes.len()
            ));
        }
        if tag_offset < grains_end && grain_offset < tags_end && grain_count > 0 {
            return format_error("tag and grain sections overlap".to_string());
        }

        let tags = bytes[tag_offset..tags_end]
            .chunks_exact(TAG_SIZE)
            .map(|tag| {
                let mut vector = Box::new([0.0; TAG_LENGTH]);
                LittleEndian::read_f32_into(&tag[8..], vector.as_mut_slice());
                GrainTag {
                    start_sample_index: LittleEndian::read_u64(&tag[..8]),
                    vector,
                }
            })
            .collect();

        let mut samples = vec![0.0; (grains_end - grain_offset) / 4].into_boxed_slice();
        LittleEndian::read_f32_into(&bytes[grain_offset..grains_end], &mut samples);

        Ok(Self {
            grain_length,
            tags,
            samples,
        })
    }

    /// Serialize the packfile into the given writer.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<(), Error> {
        writer.write_all(&self.to_bytes())?;
        Ok(())
    }

    /// Serialize the packfile into a new byte buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; self.file_size()];
        let tag_offset = PACKFILE_HEADER_SIZE;
        let grain_offset = tag_offset + self.grain_count() * TAG_SIZE;

        let header = [
            self.file_size(),
            self.grain_count(),
            self.grain_length,
            tag_offset,
            grain_offset,
        ]
        .map(|value| value as u64);
        LittleEndian::write_u64_into(&header, &mut bytes[..PACKFILE_HEADER_SIZE]);

        for (tag, dest) in self
            .tags
            .iter()
            .zip(bytes[tag_offset..grain_offset].chunks_exact_mut(TAG_SIZE))
        {
            LittleEndian::write_u64(&mut dest[..8], tag.start_sample_index);
            LittleEndian::write_f32_into(tag.vector.as_slice(), &mut dest[8..]);
        }
        LittleEndian::write_f32_into(&self.samples, &mut bytes[grain_offset..]);
        bytes
    }
}

/// Load and validate a packfile from disk.
pub fn load_grain_packfile<P: AsRef<Path>>(path: P) -> Result<GrainPackfile, Error> {
    GrainPackfile::from_bytes(read_entire_file(path)?)
}

/// Write a packfile to disk.
pub fn write_packfile_to_disk<P: AsRef<Path>>(
    packfile: &GrainPackfile,
    path: P,
) -> Result<(), Error> {
    write_entire_file(path, &packfile.to_bytes())
}

// -------------------------------------------------------------------------------------------------

/// Slices sounds into grains and collects them into a new [`GrainPackfile`].
#[derive(Debug, Clone)]
pub struct GrainPackfileBuilder {
    grain_length: usize,
    tags: Vec<GrainTag>,
    samples: Vec<f32>,
}

impl Default for GrainPackfileBuilder {
    fn default() -> Self {
        Self::new(FILE_GRAIN_LENGTH)
    }
}

impl GrainPackfileBuilder {
    /// Create a new, empty builder for grains with the given length.
    pub fn new(grain_length: usize) -> Self {
        assert!(grain_length > 0, "Grain length must not be zero");
        Self {
            grain_length,
            tags: Vec::new(),
            samples: Vec::new(),
        }
    }

    /// Number of grains which got added so far.
    pub fn grain_count(&self) -> usize {
        self.tags.len()
    }

    /// Slice the given sound into grains and tag each of them with the given model. The last
    /// grain gets zero padded.
    pub fn add_sound(&mut self, sound: &LoadedSound, model: &mut dyn TagModel) -> &mut Self {
        let frame_count = sound.frame_count();
        let grain_count = frame_count.div_ceil(self.grain_length);
        self.samples
            .reserve(grain_count * FILE_GRAIN_CHANNELS * self.grain_length);

        for index in 0..grain_count {
            let start = index * self.grain_length;
            let end = (start + self.grain_length).min(frame_count);
            let padding = self.grain_length - (end - start);
            for channel in &sound.samples {
                self.samples.extend_from_slice(&channel[start..end]);
                self.samples.extend(std::iter::repeat_n(0.0, padding));
            }
            let grain_start = self.samples.len() - FILE_GRAIN_CHANNELS * self.grain_length;
            let left = &self.samples[grain_start..grain_start + self.grain_length];
            let vector = Box::new(model.run_model(left));
            self.tags.push(GrainTag {
                start_sample_index: self.tags.len() as u64,
                vector,
            });
        }
        self
    }

    /// Finish building.
    pub fn build(self) -> GrainPackfile {
        GrainPackfile {
            grain_length: self.grain_length,
            tags: self.tags,
            samples: self.samples.into_boxed_slice(),
        }
    }
}

// -------------------------------------------------------------------------------------------------
