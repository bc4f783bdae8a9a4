//! The plugin's audio state, processing entry point and control thread handle.

use std::sync::Arc;

use crossbeam_queue::ArrayQueue;
use strum::EnumCount;

use crate::{
    arena::ArenaPool,
    granulator::{FileGranulator, GrainBufferView, GrainControlBlock, GrainManager},
    midi::{apply_midi_message, MidiEvent, MidiMessage},
    packfile::GrainPackfile,
    parameter::{
        PluginBooleanParameterId, PluginParameterId, PluginParameters,
        DEFAULT_PARAMETER_CHANGE_TIME_MS,
    },
    utils::{
        buffer::{
            clip_buffer, f32_to_i16, interleaved_to_stereo, push_float_buffer,
            stereo_to_interleaved,
        },
        lerp, pan_factors,
        ring_buffer::AudioRingBuffer,
    },
    vocoder::{PhaseVocoder, PV_WINDOW_SAMPLE_COUNT},
    Error,
};

// -------------------------------------------------------------------------------------------------

/// Sample rate all grains, buffers and parameter ramps are processed at.
pub const INTERNAL_SAMPLE_RATE: u32 = 48000;

// -------------------------------------------------------------------------------------------------

/// Sizes and capacities of all preallocated plugin state.
#[derive(Debug, Clone)]
pub struct PluginConfig {
    /// Size in bytes of each scratch arena.
    pub scratch_arena_size: usize,
    /// Max number of frames processed at once. Larger host buffers get split.
    pub max_block_frames: usize,
    /// Capacity of the live capture ring buffer in frames.
    pub capture_buffer_frames: usize,
    /// Preallocated file grain slots.
    pub file_grain_capacity: usize,
    /// Preallocated live grain slots.
    pub live_grain_capacity: usize,
    /// Capacity of the phase vocoder's input and output buffers in frames.
    pub vocoder_buffer_frames: usize,
    /// Time it takes float parameters to reach new values.
    pub parameter_change_time_ms: f32,
    /// Capacity of the control to audio thread command queue.
    pub command_queue_capacity: usize,
    /// Seed of the live granulator's stereo spread generator.
    pub rng_seed: u64,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            scratch_arena_size: 256 * 1024,
            max_block_frames: 512,
            capture_buffer_frames: 2 * INTERNAL_SAMPLE_RATE as usize,
            file_grain_capacity: 1024,
            live_grain_capacity: 64,
            vocoder_buffer_frames: 8192,
            parameter_change_time_ms: DEFAULT_PARAMETER_CHANGE_TIME_MS,
            command_queue_capacity: 64,
            rng_seed: 0x6772_616e_6164_6521,
        }
    }
}

impl PluginConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scratch_arena_size(mut self, size: usize) -> Self {
        self.scratch_arena_size = size;
        self
    }

    pub fn with_max_block_frames(mut self, frames: usize) -> Self {
        self.max_block_frames = frames;
        self
    }

    pub fn with_capture_buffer_frames(mut self, frames: usize) -> Self {
        self.capture_buffer_frames = frames;
        self
    }

    pub fn with_file_grain_capacity(mut self, capacity: usize) -> Self {
        self.file_grain_capacity = capacity;
        self
    }

    pub fn with_live_grain_capacity(mut self, capacity: usize) -> Self {
        self.live_grain_capacity = capacity;
        self
    }

    pub fn with_vocoder_buffer_frames(mut self, frames: usize) -> Self {
        self.vocoder_buffer_frames = frames;
        self
    }

    pub fn with_parameter_change_time_ms(mut self, change_time_ms: f32) -> Self {
        self.parameter_change_time_ms = change_time_ms;
        self
    }

    pub fn with_command_queue_capacity(mut self, capacity: usize) -> Self {
        self.command_queue_capacity = capacity;
        self
    }

    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = seed;
        self
    }

    /// Scratch memory a single block of `max_block_frames` needs.
    fn block_scratch_size(&self) -> usize {
        // per sample parameter values, dry, file, wet and gain buffers, plus alignment
        let buffer_count = PluginParameterId::COUNT + 7;
        buffer_count * (self.max_block_frames * std::mem::size_of::<f32>() + 16)
    }

    /// Scratch memory a single phase vocoder frame needs.
    fn vocoder_scratch_size() -> usize {
        5 * (PV_WINDOW_SAMPLE_COUNT * std::mem::size_of::<f32>() + 16)
    }

    /// Validate all sizes.
    pub fn validate(&self) -> Result<(), Error> {
        if self.max_block_frames == 0 {
            return Err(Error::ParameterError(
                "Max block frames must not be zero".to_string(),
            ));
        }
        if self.scratch_arena_size < self.block_scratch_size()
            || self.scratch_arena_size < Self::vocoder_scratch_size()
        {
            return Err(Error::ParameterError(format!(
                "Scratch arena size must be at least {} bytes",
                self.block_scratch_size().max(Self::vocoder_scratch_size())
            )));
        }
        let max_offset = *PluginParameterId::Offset.description().range().end() as usize;
        if self.capture_buffer_frames <= max_offset + self.max_block_frames {
            return Err(Error::ParameterError(format!(
                "Capture buffer must hold more than {} frames",
                max_offset + self.max_block_frames
            )));
        }
        if self.vocoder_buffer_frames < 2 * PV_WINDOW_SAMPLE_COUNT
            || self.vocoder_buffer_frames < self.max_block_frames + PV_WINDOW_SAMPLE_COUNT
        {
            return Err(Error::ParameterError(format!(
                "Vocoder buffers must hold at least {} frames",
                (2 * PV_WINDOW_SAMPLE_COUNT).max(self.max_block_frames + PV_WINDOW_SAMPLE_COUNT)
            )));
        }
        if self.command_queue_capacity == 0 {
            return Err(Error::ParameterError(
                "Command queue capacity must not be zero".to_string(),
            ));
        }
        if !(self.parameter_change_time_ms >= 0.0) {
            return Err(Error::ParameterError(
                "Parameter change time must be a positive number".to_string(),
            ));
        }
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------

/// Sample format of a host buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum AudioFormat {
    S16,
    F32,
}

/// Interleaved host output samples.
#[derive(Debug)]
pub enum AudioOutput<'a> {
    S16(&'a mut [i16]),
    F32(&'a mut [f32]),
}

impl AudioOutput<'_> {
    pub fn format(&self) -> AudioFormat {
        match self {
            Self::S16(_) => AudioFormat::S16,
            Self::F32(_) => AudioFormat::F32,
        }
    }

    /// Number of samples, not frames.
    pub fn len(&self) -> usize {
        match self {
            Self::S16(samples) => samples.len(),
            Self::F32(samples) => samples.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A host buffer, processed by [`PluginState::audio_process`].
#[derive(Debug)]
pub struct PluginAudioBuffer<'a> {
    /// Host sample rate. Should match [`INTERNAL_SAMPLE_RATE`].
    pub sample_rate: u32,
    /// Number of interleaved input and output channels: 1 or 2.
    pub channels: usize,
    /// Number of frames to process.
    pub frames: usize,
    /// Interleaved output samples.
    pub output: AudioOutput<'a>,
    /// Optional interleaved input samples, captured by the live granulator.
    pub input: Option<&'a [f32]>,
    /// MIDI events, sorted by their sample offset.
    pub midi: &'a [MidiEvent],
}

impl<'a> PluginAudioBuffer<'a> {
    /// Create a new buffer without input and MIDI events, which processes as many frames as
    /// fit into the output.
    pub fn new(sample_rate: u32, channels: usize, output: AudioOutput<'a>) -> Self {
        assert!(
            channels == 1 || channels == 2,
            "Unsupported channel count: {channels}"
        );
        let frames = output.len() / channels;
        Self {
            sample_rate,
            channels,
            frames,
            output,
            input: None,
            midi: &[],
        }
    }

    pub fn with_input(mut self, input: &'a [f32]) -> Self {
        self.input = Some(input);
        self
    }

    pub fn with_midi(mut self, midi: &'a [MidiEvent]) -> Self {
        self.midi = midi;
        self
    }

    pub fn format(&self) -> AudioFormat {
        self.output.format()
    }
}

// -------------------------------------------------------------------------------------------------

/// Messages from the control to the audio thread.
#[derive(Debug)]
pub enum PluginCommand {
    /// Queue all grains of the given packfile for playback.
    QueuePackfile(Arc<GrainPackfile>),
    /// Stop all file and live grains.
    ClearGrains,
    /// Apply a MIDI message right away.
    Midi(MidiEvent),
}

struct PluginQueues {
    commands: ArrayQueue<PluginCommand>,
    views: ArrayQueue<GrainBufferView>,
    retired: ArrayQueue<Arc<GrainPackfile>>,
}

// -------------------------------------------------------------------------------------------------

/// Control thread access to a [`PluginState`].
pub struct PluginHandle {
    parameters: Arc<PluginParameters>,
    queues: Arc<PluginQueues>,
    file_grain_capacity: usize,
}

impl PluginHandle {
    /// The plugin's shared parameters.
    pub fn parameters(&self) -> &Arc<PluginParameters> {
        &self.parameters
    }

    /// Queue all grains of the given packfile for playback. Grains which still are waiting
    /// from a previous packfile get dropped.
    ///
    /// Packfiles with more grains than the configured file grain capacity are rejected.
    pub fn queue_packfile(&self, packfile: Arc<GrainPackfile>) -> Result<(), Error> {
        self.release_retired_packfiles();
        if packfile.grain_count() > self.file_grain_capacity {
            return Err(Error::ParameterError(format!(
                "Packfile has {} grains, but the file grain capacity is {}",
                packfile.grain_count(),
                self.file_grain_capacity
            )));
        }
        self.send(PluginCommand::QueuePackfile(packfile))
    }

    /// Parse and send a raw MIDI message to the audio thread.
    pub fn send_midi(&self, bytes: &[u8]) -> Result<(), Error> {
        if MidiMessage::parse(bytes).is_none() {
            return Err(Error::ParameterError(format!(
                "Invalid MIDI message: {bytes:02X?}"
            )));
        }
        self.send(PluginCommand::Midi(MidiEvent::new(0, bytes)))
    }

    /// Stop all playing and queued grains.
    pub fn clear_grains(&self) -> Result<(), Error> {
        self.send(PluginCommand::ClearGrains)
    }

    /// Fetch the oldest published live grain snapshot.
    pub fn pop_grain_view(&self) -> Option<GrainBufferView> {
        self.queues.views.pop()
    }

    fn send(&self, command: PluginCommand) -> Result<(), Error> {
        self.queues.commands.push(command).map_err(|command| {
            Error::SendError(format!("Plugin command queue is full: dropped {command:?}"))
        })
    }

    fn release_retired_packfiles(&self) {
        while let Some(packfile) = self.queues.retired.pop() {
            log::debug!(
                "Releasing retired packfile with {} grains",
                packfile.grain_count()
            );
        }
    }
}

impl Drop for PluginHandle {
    fn drop(&mut self) {
        self.release_retired_packfiles();
    }
}

// -------------------------------------------------------------------------------------------------

/// All audio thread state of the granulator.
///
/// Everything gets allocated in [`new`](Self::new): [`audio_process`](Self::audio_process)
/// only uses preallocated memory and the scratch arenas.
pub struct PluginState {
    parameters: Arc<PluginParameters>,
    queues: Arc<PluginQueues>,
    scratch_pool: ArenaPool,
    capture: AudioRingBuffer,
    vocoder: PhaseVocoder,
    vocoder_active: bool,
    file_granulator: FileGranulator,
    live_granulator: GrainManager,
    max_block_frames: usize,
    warned_sample_rate: bool,
}

impl PluginState {
    /// Create a new plugin state and its control handle.
    pub fn new(config: PluginConfig) -> Result<(Self, PluginHandle), Error> {
        config.validate()?;

        let parameters = Arc::new(PluginParameters::new(config.parameter_change_time_ms));
        let queues = Arc::new(PluginQueues {
            commands: ArrayQueue::new(config.command_queue_capacity),
            views: ArrayQueue::new(config.command_queue_capacity),
            retired: ArrayQueue::new(config.command_queue_capacity),
        });

        let mut capture = AudioRingBuffer::new(config.capture_buffer_frames);
        capture.advance_write(parameters.read(PluginParameterId::Offset) as usize);

        let state = Self {
            parameters: Arc::clone(&parameters),
            queues: Arc::clone(&queues),
            scratch_pool: ArenaPool::new(config.scratch_arena_size),
            capture,
            vocoder: PhaseVocoder::new(config.vocoder_buffer_frames),
            vocoder_active: false,
            file_granulator: FileGranulator::new(config.file_grain_capacity),
            live_granulator: GrainManager::new(config.live_grain_capacity, config.rng_seed),
            max_block_frames: config.max_block_frames,
            warned_sample_rate: false,
        };
        log::debug!("Created plugin state with {config:?}");
        let handle = PluginHandle {
            parameters,
            queues,
            file_grain_capacity: config.file_grain_capacity,
        };
        Ok((state, handle))
    }

    /// The plugin's shared parameters.
    pub fn parameters(&self) -> &Arc<PluginParameters> {
        &self.parameters
    }

    pub fn file_granulator(&self) -> &FileGranulator {
        &self.file_granulator
    }

    pub fn live_granulator(&self) -> &GrainManager {
        &self.live_granulator
    }

    /// Max number of frames which get processed at once.
    pub fn max_block_frames(&self) -> usize {
        self.max_block_frames
    }

    /// Render the given host buffer.
    pub fn audio_process(&mut self, buffer: &mut PluginAudioBuffer) {
        if buffer.sample_rate != INTERNAL_SAMPLE_RATE && !self.warned_sample_rate {
            log::warn!(
                "Host sample rate {} differs from the internal rate {}: output is pitched",
                buffer.sample_rate,
                INTERNAL_SAMPLE_RATE
            );
            self.warned_sample_rate = true;
        }
        debug_assert!(buffer.output.len() >= buffer.frames * buffer.channels);
        debug_assert!(buffer
            .input
            .is_none_or(|input| input.len() >= buffer.frames * buffer.channels));

        self.process_commands();

        let mut midi_index = 0;
        let mut frame = 0;
        while frame < buffer.frames {
            let block_frames = (buffer.frames - frame).min(self.max_block_frames);
            self.process_block(buffer, frame, block_frames, &mut midi_index);
            frame += block_frames;
        }
        // events past the buffer's end
        for event in &buffer.midi[midi_index..] {
            if let Some(message) = event.message() {
                apply_midi_message(&self.parameters, &message);
            }
        }

        let view = self.live_granulator.snapshot_view(&self.capture);
        let _ = self.queues.views.force_push(view);
    }

    fn process_commands(&mut self) {
        while let Some(command) = self.queues.commands.pop() {
            match command {
                PluginCommand::QueuePackfile(packfile) => {
                    if self.file_granulator.queued_count() > 0 {
                        log::warn!(
                            "Dropping {} queued grains of the previous packfile",
                            self.file_granulator.queued_count()
                        );
                        self.file_granulator.clear();
                    }
                    if let Some(retired) =
                        self.file_granulator.queue_all_grains_from_file(&packfile)
                    {
                        if let Err(retired) = self.queues.retired.push(retired) {
                            log::warn!("Retired packfile queue is full: releasing it in place");
                            drop(retired);
                        }
                    }
                }
                PluginCommand::ClearGrains => {
                    self.file_granulator.clear();
                    self.live_granulator.clear();
                }
                PluginCommand::Midi(event) => {
                    if let Some(message) = event.message() {
                        apply_midi_message(&self.parameters, &message);
                    }
                }
            }
        }
    }

    fn process_block(
        &mut self,
        buffer: &mut PluginAudioBuffer,
        offset: usize,
        frames: usize,
        midi_index: &mut usize,
    ) {
        let scratch = self.scratch_pool.scratch(&[]);

        // per sample parameter values
        let mut values: [&mut [f32]; PluginParameterId::COUNT] =
            std::array::from_fn(|_| push_float_buffer(&scratch, frames));
        for sample_index in 0..frames {
            while let Some(event) = buffer.midi.get(*midi_index) {
                if event.sample_offset > offset + sample_index {
                    break;
                }
                if let Some(message) = event.message() {
                    apply_midi_message(&self.parameters, &message);
                }
                *midi_index += 1;
            }
            for (param, values) in self.parameters.floats().iter().zip(values.iter_mut()) {
                values[sample_index] = param.update();
            }
        }
        let [volume, density, pan, size, offset_samples, window, pitch, stretch, spread, mix] =
            values;

        // capture
        let dry_l = push_float_buffer(&scratch, frames);
        let dry_r = push_float_buffer(&scratch, frames);
        if let Some(input) = buffer.input {
            let channels = buffer.channels;
            let input = &input[offset * channels..(offset + frames) * channels];
            interleaved_to_stereo(input, channels, dry_l, dry_r);
        }
        self.capture.write(dry_l, dry_r);

        // file grains
        let out_l = push_float_buffer(&scratch, frames);
        let out_r = push_float_buffer(&scratch, frames);
        if self
            .parameters
            .is_enabled(PluginBooleanParameterId::SoundIsPlaying)
        {
            self.file_granulator.mix_playing_grains(out_l, out_r, 1.0);
        }

        // live grains
        let wet_l = push_float_buffer(&scratch, frames);
        let wet_r = push_float_buffer(&scratch, frames);
        let live_gain = push_float_buffer(&scratch, frames);
        for (gain, density) in live_gain.iter_mut().zip(density.iter()) {
            *gain = 1.0 / density.max(1.0);
        }
        let control = GrainControlBlock {
            density,
            size,
            window,
            spread,
            pitch,
            volume: live_gain,
        };
        let target_offset = offset_samples[frames - 1] as usize;
        self.live_granulator
            .synthesize(wet_l, wet_r, &mut self.capture, &control, target_offset);

        // mix, volume and pan
        for i in 0..frames {
            let (pan_l, pan_r) = pan_factors(pan[i]);
            out_l[i] = (out_l[i] + lerp(dry_l[i], wet_l[i], mix[i])) * volume[i] * pan_l;
            out_r[i] = (out_r[i] + lerp(dry_r[i], wet_r[i], mix[i])) * volume[i] * pan_r;
        }

        // time stretch
        if self
            .parameters
            .is_enabled(PluginBooleanParameterId::VocoderEnabled)
        {
            if !self.vocoder_active {
                self.vocoder.reset();
                self.vocoder_active = true;
            }
            self.vocoder.write_input(out_l, out_r);
            self.vocoder
                .process(out_l, out_r, stretch[frames - 1], &self.scratch_pool);
        } else {
            self.vocoder_active = false;
        }

        clip_buffer(out_l);
        clip_buffer(out_r);

        let channels = buffer.channels;
        let range = offset * channels..(offset + frames) * channels;
        match &mut buffer.output {
            AudioOutput::F32(output) => {
                stereo_to_interleaved(out_l, out_r, &mut output[range], channels);
            }
            AudioOutput::S16(output) => {
                let output = &mut output[range];
                if channels == 1 {
                    for ((o, l), r) in output.iter_mut().zip(out_l.iter()).zip(out_r.iter()) {
                        *o = f32_to_i16(0.5 * (l + r));
                    }
                } else {
                    let frames = output.chunks_exact_mut(2);
                    for ((frame, l), r) in frames.zip(out_l.iter()).zip(out_r.iter()) {
                        frame[0] = f32_to_i16(*l);
                        frame[1] = f32_to_i16(*r);
                    }
                }
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------
