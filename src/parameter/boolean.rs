use std::{
    fmt::{Debug, Display},
    sync::atomic::{AtomicBool, Ordering},
};

use four_cc::FourCC;

// -------------------------------------------------------------------------------------------------

/// A boolean parameter descriptor.
#[derive(Debug, Clone)]
pub struct BooleanParameter {
    id: FourCC,
    name: &'static str,
    default: bool,
}

impl BooleanParameter {
    /// Create a new boolean parameter descriptor.
    pub const fn new(id: FourCC, name: &'static str, default: bool) -> Self {
        Self { id, name, default }
    }

    /// The parameter's identifier.
    pub const fn id(&self) -> FourCC {
        self.id
    }

    /// The parameter's name.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// The parameter's default value.
    pub const fn default_value(&self) -> bool {
        self.default
    }

    /// Normalize the given plain value to a 0.0-1.0 range.
    pub const fn normalize_value(&self, value: bool) -> f32 {
        if value {
            1.0
        } else {
            0.0
        }
    }

    /// Denormalize a 0.0-1.0 ranged value to the corresponding plain value.
    pub fn denormalize_value(&self, normalized: f32) -> bool {
        normalized.clamp(0.0, 1.0) >= 0.5
    }

    /// Convert the given plain value to a string.
    pub fn value_to_string(&self, value: bool) -> String {
        if value {
            "ON".to_string()
        } else {
            "OFF".to_string()
        }
    }

    /// Convert the given string to a plain value.
    pub fn string_to_value(&self, string: &str) -> Option<bool> {
        let string = string.trim();
        if string.eq_ignore_ascii_case("ON") {
            Some(true)
        } else if string.eq_ignore_ascii_case("OFF") {
            Some(false)
        } else {
            string.parse::<bool>().ok()
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// A boolean parameter value which can be set and read from any thread.
pub struct PluginBooleanParameter {
    description: BooleanParameter,
    value: AtomicBool,
}

impl Debug for PluginBooleanParameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginBooleanParameter")
            .field("id", &self.description.id())
            .field("value", &self.read())
            .finish()
    }
}

impl PluginBooleanParameter {
    /// Create a new parameter value, initialized to the descriptor's default value.
    pub fn new(description: BooleanParameter) -> Self {
        let value = AtomicBool::new(description.default_value());
        Self { description, value }
    }

    /// Access the parameter value's description.
    pub fn description(&self) -> &BooleanParameter {
        &self.description
    }

    #[inline]
    pub fn read(&self) -> bool {
        self.value.load(Ordering::Acquire)
    }

    pub fn set(&self, value: bool) {
        self.value.store(value, Ordering::Release);
    }

    /// Set a new value from a normalized 0.0-1.0 value.
    pub fn set_normalized(&self, normalized: f32) {
        self.set(self.description.denormalize_value(normalized));
    }
}

impl Display for PluginBooleanParameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.description.value_to_string(self.read()))
    }
}

// -------------------------------------------------------------------------------------------------
