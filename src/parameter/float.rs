use std::{
    fmt::{Debug, Display},
    ops::RangeInclusive,
    sync::atomic::{AtomicU32, Ordering},
};

use four_cc::FourCC;

use crate::plugin::INTERNAL_SAMPLE_RATE;

// -------------------------------------------------------------------------------------------------

/// Maps a parameter's raw value to the value the audio engine processes.
pub type ParameterTransform = fn(f32) -> f32;

fn identity_transform(value: f32) -> f32 {
    value
}

// -------------------------------------------------------------------------------------------------

/// A continuous (float) parameter descriptor.
#[derive(Debug, Clone)]
pub struct FloatParameter {
    id: FourCC,
    name: &'static str,
    range: RangeInclusive<f32>,
    default: f32,
    unit: &'static str,
    transform: ParameterTransform,
}

impl FloatParameter {
    /// Create a new float parameter descriptor.
    pub const fn new(
        id: FourCC,
        name: &'static str,
        range: RangeInclusive<f32>,
        default: f32,
    ) -> Self {
        assert!(
            *range.end() > *range.start(),
            "Invalid parameter range: must not be empty"
        );
        assert!(
            default >= *range.start() && default <= *range.end(),
            "Invalid parameter default value"
        );
        Self {
            id,
            name,
            range,
            default,
            unit: "",
            transform: identity_transform,
        }
    }

    /// Optional unit for string displays.
    pub const fn with_unit(mut self, unit: &'static str) -> Self {
        self.unit = unit;
        self
    }

    /// Optional processing transform, applied to values when the audio engine reads them.
    pub const fn with_transform(mut self, transform: ParameterTransform) -> Self {
        self.transform = transform;
        self
    }

    /// The parameter's identifier.
    pub const fn id(&self) -> FourCC {
        self.id
    }

    /// The parameter's name.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// The parameter's value range.
    pub fn range(&self) -> &RangeInclusive<f32> {
        &self.range
    }

    /// Length of the parameter's value range.
    pub fn range_length(&self) -> f32 {
        *self.range.end() - *self.range.start()
    }

    /// The parameter's default value.
    pub fn default_value(&self) -> f32 {
        self.default
    }

    /// Clamp the given plain value to the parameter's range.
    pub fn clamp_value(&self, value: f32) -> f32 {
        value.clamp(*self.range.start(), *self.range.end())
    }

    /// Normalize the given plain value to a 0.0-1.0 range.
    pub fn normalize_value(&self, value: f32) -> f32 {
        (value - *self.range.start()) / self.range_length()
    }

    /// Denormalize a 0.0-1.0 ranged value to the corresponding plain value.
    pub fn denormalize_value(&self, normalized: f32) -> f32 {
        *self.range.start() + normalized.clamp(0.0, 1.0) * self.range_length()
    }

    /// Apply the parameter's processing transform to the given plain value.
    #[inline]
    pub fn process_value(&self, value: f32) -> f32 {
        (self.transform)(value)
    }

    /// Convert the given plain value to a string.
    pub fn value_to_string(&self, value: f32, include_unit: bool) -> String {
        if include_unit && !self.unit.is_empty() {
            format!("{:.2} {}", value, self.unit)
        } else {
            format!("{:.2}", value)
        }
    }

    /// Convert the given string to a clamped plain value.
    pub fn string_to_value(&self, string: &str) -> Option<f32> {
        let value = string
            .trim()
            .trim_end_matches(self.unit)
            .trim()
            .parse::<f32>()
            .ok()?;
        Some(self.clamp_value(value))
    }
}

// -------------------------------------------------------------------------------------------------

/// A float parameter value which can be set from any thread and which moves towards its target
/// value in linear steps on the audio thread.
///
/// Current, target and step values are stored as f32 bit patterns in atomics. Only the audio
/// thread advances the current value, via [`update`](Self::update), once per sample.
pub struct PluginFloatParameter {
    description: FloatParameter,
    current: AtomicU32,
    target: AtomicU32,
    delta: AtomicU32,
}

impl Debug for PluginFloatParameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginFloatParameter")
            .field("id", &self.description.id())
            .field("current", &self.read())
            .field("target", &self.target())
            .finish()
    }
}

impl PluginFloatParameter {
    /// Relative distance to the target, below which a value is treated as settled.
    pub const SETTLED_EPSILON: f32 = 0.001;

    /// Create a new parameter value, initialized to the descriptor's default value.
    pub fn new(description: FloatParameter) -> Self {
        let default = description.default_value().to_bits();
        Self {
            description,
            current: AtomicU32::new(default),
            target: AtomicU32::new(default),
            delta: AtomicU32::new(0.0f32.to_bits()),
        }
    }

    /// Access the parameter value's description.
    pub fn description(&self) -> &FloatParameter {
        &self.description
    }

    /// The current, raw value.
    #[inline]
    pub fn read(&self) -> f32 {
        f32::from_bits(self.current.load(Ordering::Acquire))
    }

    /// The current value with the parameter's processing transform applied.
    #[inline]
    pub fn read_processing(&self) -> f32 {
        self.description.process_value(self.read())
    }

    /// The value the parameter currently is moving to.
    pub fn target(&self) -> f32 {
        f32::from_bits(self.target.load(Ordering::Acquire))
    }

    /// Set a new target value, reached within `change_time_ms`. A change time of 0 applies the
    /// value immediately.
    pub fn set(&self, value: f32, change_time_ms: f32) {
        self.set_target(self.description.clamp_value(value), change_time_ms);
    }

    /// Set a new target value from a normalized 0.0-1.0 value.
    pub fn set_normalized(&self, normalized: f32, change_time_ms: f32) {
        self.set_target(self.description.denormalize_value(normalized), change_time_ms);
    }

    /// Set a new target value relative to the current value.
    pub fn offset(&self, increment: f32, change_time_ms: f32) {
        let target = self.description.clamp_value(self.read() + increment);
        self.set_target(target, change_time_ms);
    }

    fn set_target(&self, target: f32, change_time_ms: f32) {
        self.target.store(target.to_bits(), Ordering::Release);
        let change_time_samples = 0.001 * change_time_ms * INTERNAL_SAMPLE_RATE as f32;
        if change_time_samples < 1.0 {
            self.delta.store(0.0f32.to_bits(), Ordering::Release);
            self.current.store(target.to_bits(), Ordering::Release);
        } else {
            let delta = (target - self.read()) / change_time_samples;
            self.delta.store(delta.to_bits(), Ordering::Release);
        }
    }

    /// Move the current value one step towards the target and return the processed value.
    /// Must be called once per sample from the audio thread only.
    pub fn update(&self) -> f32 {
        let current_bits = self.current.load(Ordering::Acquire);
        let current = f32::from_bits(current_bits);
        let target = self.target();

        let mut value = current;
        if current != target {
            let distance = (target - current).abs() / self.description.range_length();
            if distance > Self::SETTLED_EPSILON {
                let delta = f32::from_bits(self.delta.load(Ordering::Acquire));
                let next = current + delta;
                let moves_towards_target = delta != 0.0 && (delta > 0.0) == (target > current);
                value = if !moves_towards_target
                    || (delta > 0.0 && next > target)
                    || (delta < 0.0 && next < target)
                {
                    target
                } else {
                    next
                };
            } else {
                value = target;
            }
            if self
                .current
                .compare_exchange(
                    current_bits,
                    value.to_bits(),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_err()
            {
                log::warn!(
                    "Atomic CAS failed to modify parameter '{}'",
                    self.description.id()
                );
            }
        }
        self.description.process_value(value)
    }
}

impl Display for PluginFloatParameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let include_unit = true;
        f.write_str(&self.description.value_to_string(self.read(), include_unit))
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn parameter() -> PluginFloatParameter {
        PluginFloatParameter::new(
            FloatParameter::new(FourCC(*b"TEST"), "Test", 0.0..=1.0, 0.0).with_unit("dB"),
        )
    }

    #[test]
    fn converges_without_overshoot() {
        let param = parameter();
        param.set(1.0, 10.0);
        // 10 ms at 48 kHz
        let steps = 480;
        let mut last = param.read();
        for _ in 0..steps + 2 {
            let value = param.update();
            assert!(value >= last && value <= 1.0);
            last = value;
        }
        assert_eq!(param.read(), 1.0);
        assert_eq!(param.update(), 1.0);
    }

    #[test]
    fn immediate_changes() {
        let param = parameter();
        param.set(0.25, 0.0);
        assert_eq!(param.read(), 0.25);
        assert_eq!(param.update(), 0.25);

        // values are clamped
        param.set(4.0, 0.0);
        assert_eq!(param.read(), 1.0);
        param.set_normalized(0.5, 0.0);
        assert_eq!(param.read(), 0.5);

        param.offset(-0.25, 0.0);
        assert_eq!(param.read(), 0.25);
        param.offset(-1.0, 0.0);
        assert_eq!(param.read(), 0.0);
    }

    #[test]
    fn transforms() {
        let param = PluginFloatParameter::new(
            FloatParameter::new(FourCC(*b"TEST"), "Test", -1.0..=1.0, 0.5)
                .with_transform(|value| value * 2.0),
        );
        assert_eq!(param.read(), 0.5);
        assert_eq!(param.read_processing(), 1.0);
        assert_eq!(param.update(), 1.0);
    }

    #[test]
    fn strings() {
        let param = parameter();
        let description = param.description();
        assert_eq!(description.value_to_string(0.5, true), "0.50 dB");
        assert_eq!(description.value_to_string(0.5, false), "0.50");
        assert_eq!(description.string_to_value(" 0.25 dB"), Some(0.25));
        assert_eq!(description.string_to_value("2"), Some(1.0));
        assert_eq!(description.string_to_value("abc"), None);
        assert_eq!(param.to_string(), "0.00 dB");
    }
}
