//! Plugin parameter descriptors and the atomic parameter bank, which is shared between the
//! control and audio threads.

use four_cc::FourCC;
use strum::EnumCount;

use crate::Error;

// -------------------------------------------------------------------------------------------------

mod float;
pub use float::{FloatParameter, ParameterTransform, PluginFloatParameter};

mod boolean;
pub use boolean::{BooleanParameter, PluginBooleanParameter};

// -------------------------------------------------------------------------------------------------

/// Default time in milliseconds it takes a float parameter to reach a new target value.
pub const DEFAULT_PARAMETER_CHANGE_TIME_MS: f32 = 10.0;

// -------------------------------------------------------------------------------------------------

/// Converts a pitch in semitones to a playback rate.
pub fn semitones_to_rate(semitones: f32) -> f32 {
    2.0f32.powf(semitones / 12.0)
}

// -------------------------------------------------------------------------------------------------

/// All continuous parameters of the granulator.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    strum::EnumString,
    strum::Display,
    strum::IntoStaticStr,
    strum::EnumCount,
    strum::EnumIter,
    strum::VariantArray,
)]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum PluginParameterId {
    /// Output volume.
    Volume,
    /// Number of overlapping grains per grain length.
    Density,
    /// Stereo balance of the output.
    Pan,
    /// Live grain length in samples.
    Size,
    /// Distance in samples between the capture write head and new grain starts.
    Offset,
    /// Continuous grain window shape position.
    Window,
    /// Live grain pitch in semitones.
    Pitch,
    /// Time stretch factor of the phase vocoder.
    Stretch,
    /// Random stereo spread of live grains.
    Spread,
    /// Dry/wet mix of the live granulator.
    Mix,
}

impl PluginParameterId {
    /// The parameter's static descriptor.
    pub const fn description(self) -> FloatParameter {
        match self {
            Self::Volume => FloatParameter::new(FourCC(*b"GVOL"), "Volume", 0.0..=1.0, 0.8),
            Self::Density => FloatParameter::new(FourCC(*b"GDNS"), "Density", 0.1..=20.0, 1.0),
            Self::Pan => FloatParameter::new(FourCC(*b"GPAN"), "Pan", 0.0..=1.0, 0.5),
            Self::Size => FloatParameter::new(FourCC(*b"GSIZ"), "Size", 0.0..=16000.0, 2600.0)
                .with_unit("smp"),
            Self::Offset => {
                FloatParameter::new(FourCC(*b"GOFS"), "Offset", 0.0..=48000.0, 0.0)
                    .with_unit("smp")
            }
            Self::Window => FloatParameter::new(FourCC(*b"GWIN"), "Window", 0.0..=3.0, 0.0),
            Self::Pitch => FloatParameter::new(FourCC(*b"GPIT"), "Pitch", -24.0..=24.0, 0.0)
                .with_unit("st")
                .with_transform(semitones_to_rate),
            Self::Stretch => FloatParameter::new(FourCC(*b"GSTR"), "Stretch", 0.25..=4.0, 1.0),
            Self::Spread => FloatParameter::new(FourCC(*b"GSPR"), "Spread", 0.0..=1.0, 0.5),
            Self::Mix => FloatParameter::new(FourCC(*b"GMIX"), "Mix", 0.0..=1.0, 0.5),
        }
    }
}

/// All boolean parameters of the granulator.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    strum::EnumString,
    strum::Display,
    strum::IntoStaticStr,
    strum::EnumCount,
    strum::EnumIter,
    strum::VariantArray,
)]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum PluginBooleanParameterId {
    /// Plays back the queued packfile grains.
    SoundIsPlaying,
    /// Time stretches the output through the phase vocoder.
    VocoderEnabled,
}

impl PluginBooleanParameterId {
    /// The parameter's static descriptor.
    pub const fn description(self) -> BooleanParameter {
        match self {
            Self::SoundIsPlaying => BooleanParameter::new(FourCC(*b"PLAY"), "Playing", false),
            Self::VocoderEnabled => BooleanParameter::new(FourCC(*b"VOCO"), "Vocoder", false),
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Reference to a parameter of a [`PluginParameters`] bank, as found by its FourCC id.
#[derive(Debug, Clone, Copy)]
pub enum PluginParameterRef<'a> {
    Float(&'a PluginFloatParameter),
    Boolean(&'a PluginBooleanParameter),
}

// -------------------------------------------------------------------------------------------------

/// The complete set of plugin parameters.
///
/// All values are atomics, so the bank can be shared via an `Arc` and modified from any
/// thread. Float parameters get advanced by the audio thread only.
#[derive(Debug)]
pub struct PluginParameters {
    floats: [PluginFloatParameter; PluginParameterId::COUNT],
    booleans: [PluginBooleanParameter; PluginBooleanParameterId::COUNT],
    change_time_ms: f32,
}

impl Default for PluginParameters {
    fn default() -> Self {
        Self::new(DEFAULT_PARAMETER_CHANGE_TIME_MS)
    }
}

impl PluginParameters {
    /// Create a new parameter bank with default values and the given change time for smoothed
    /// float parameter changes.
    pub fn new(change_time_ms: f32) -> Self {
        use strum::VariantArray;
        let floats = std::array::from_fn(|index| {
            PluginFloatParameter::new(PluginParameterId::VARIANTS[index].description())
        });
        let booleans = std::array::from_fn(|index| {
            PluginBooleanParameter::new(PluginBooleanParameterId::VARIANTS[index].description())
        });
        Self {
            floats,
            booleans,
            change_time_ms: change_time_ms.max(0.0),
        }
    }

    /// Time it takes a float parameter to reach a new value.
    pub fn change_time_ms(&self) -> f32 {
        self.change_time_ms
    }

    /// Access a float parameter.
    #[inline]
    pub fn float(&self, id: PluginParameterId) -> &PluginFloatParameter {
        &self.floats[id as usize]
    }

    /// Access a boolean parameter.
    #[inline]
    pub fn boolean(&self, id: PluginBooleanParameterId) -> &PluginBooleanParameter {
        &self.booleans[id as usize]
    }

    /// All float parameters in [`PluginParameterId`] order.
    pub fn floats(&self) -> &[PluginFloatParameter] {
        &self.floats
    }

    /// All boolean parameters in [`PluginBooleanParameterId`] order.
    pub fn booleans(&self) -> &[PluginBooleanParameter] {
        &self.booleans
    }

    /// Current raw value of a float parameter.
    pub fn read(&self, id: PluginParameterId) -> f32 {
        self.float(id).read()
    }

    /// Current value of a boolean parameter.
    pub fn is_enabled(&self, id: PluginBooleanParameterId) -> bool {
        self.boolean(id).read()
    }

    /// Set a float parameter's target value, using the bank's change time.
    pub fn set(&self, id: PluginParameterId, value: f32) {
        self.float(id).set(value, self.change_time_ms);
    }

    /// Move a float parameter's target value relative to its current value.
    pub fn offset(&self, id: PluginParameterId, increment: f32) {
        self.float(id).offset(increment, self.change_time_ms);
    }

    /// Set a boolean parameter.
    pub fn set_enabled(&self, id: PluginBooleanParameterId, value: bool) {
        self.boolean(id).set(value);
    }

    /// Look up a parameter by its FourCC id.
    pub fn find(&self, id: FourCC) -> Option<PluginParameterRef<'_>> {
        if let Some(float) = self.floats.iter().find(|p| p.description().id() == id) {
            Some(PluginParameterRef::Float(float))
        } else {
            self.booleans
                .iter()
                .find(|p| p.description().id() == id)
                .map(PluginParameterRef::Boolean)
        }
    }

    /// Apply a normalized 0.0-1.0 host value to the parameter with the given FourCC id.
    pub fn set_normalized(&self, id: FourCC, normalized: f32) -> Result<(), Error> {
        match self.find(id) {
            Some(PluginParameterRef::Float(param)) => {
                param.set_normalized(normalized, self.change_time_ms);
                Ok(())
            }
            Some(PluginParameterRef::Boolean(param)) => {
                param.set_normalized(normalized);
                Ok(())
            }
            None => Err(Error::ParameterError(format!("Unknown parameter id: '{id}'"))),
        }
    }
}

// -------------------------------------------------------------------------------------------------
