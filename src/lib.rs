#![doc = include_str!("../README.md")]

// private mods (will be partly re-exported)
mod error;
mod granulator;
mod midi;
mod output;
mod packfile;
mod parameter;
mod plugin;
mod vocoder;
mod wav;
mod worker;

// public, flat re-exports
pub use error::Error;

pub use granulator::{
    FileGranulator, GrainBufferView, GrainControlBlock, GrainManager, GrainViewEntry,
    WindowShape, MAX_VIEW_GRAINS, WINDOW_LENGTH,
};

pub use midi::{apply_midi_message, cc_parameter, MidiEvent, MidiMessage};

#[cfg(feature = "wav-output")]
pub use output::wav::WavSink;
pub use output::{MemorySink, OutputSink};

pub use packfile::{
    load_grain_packfile, write_packfile_to_disk, GrainPackfile, GrainPackfileBuilder, GrainTag,
    NullTagModel, TagModel, FILE_GRAIN_LENGTH, TAG_LENGTH,
};

pub use parameter::{
    semitones_to_rate, BooleanParameter, FloatParameter, ParameterTransform,
    PluginBooleanParameter, PluginBooleanParameterId, PluginFloatParameter, PluginParameterId,
    PluginParameterRef, PluginParameters, DEFAULT_PARAMETER_CHANGE_TIME_MS,
};

pub use plugin::{
    AudioFormat, AudioOutput, PluginAudioBuffer, PluginCommand, PluginConfig, PluginHandle,
    PluginState, INTERNAL_SAMPLE_RATE,
};

pub use vocoder::{PhaseVocoder, PV_ANALYSIS_HOP, PV_WINDOW_SAMPLE_COUNT};

pub use wav::{load_wav, load_wav_file, resample_czt, resample_linear, LoadedSound};

pub use worker::{AudioWorker, AudioWorkerConfig, AudioWorkerEvent};

// public mods
pub mod arena;
pub mod utils;
