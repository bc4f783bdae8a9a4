//! Shared DSP, buffer and file helpers.

pub mod buffer;
pub mod complex;
pub mod fft;
pub mod file;
pub mod ring_buffer;

use std::sync::atomic::{AtomicUsize, Ordering};

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
macro_rules! assert_eq_with_epsilon {
    ($x:expr, $y:expr, $d:expr) => {
        let (x, y, d) = ($x, $y, $d);
        if (x - y).abs() > d {
            panic!("{} != {} (epsilon {})", x, y, d);
        }
    };
}

#[cfg(test)]
pub(crate) use assert_eq_with_epsilon;

// -------------------------------------------------------------------------------------------------

/// Generates a unique usize number, by simply counting atomically upwards from 1.
pub fn unique_usize_id() -> usize {
    static ID_COUNTER: AtomicUsize = AtomicUsize::new(1);
    ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

// -------------------------------------------------------------------------------------------------

/// Linear interpolation between `a` and `b`.
#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

// -------------------------------------------------------------------------------------------------

/// Left and right gain factors for a balance style pan value in range `0.0..=1.0`.
///
/// The center position (0.5) keeps both channels at unity gain.
#[inline]
pub fn pan_factors(pan: f32) -> (f32, f32) {
    let pan = pan.clamp(0.0, 1.0);
    ((2.0 - 2.0 * pan).min(1.0), (2.0 * pan).min(1.0))
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_ids() {
        let a = unique_usize_id();
        let b = unique_usize_id();
        assert_ne!(a, b);
    }

    #[test]
    fn panning() {
        assert_eq!(pan_factors(0.5), (1.0, 1.0));
        assert_eq!(pan_factors(0.0), (1.0, 0.0));
        assert_eq!(pan_factors(1.0), (0.0, 1.0));
        assert_eq!(pan_factors(2.0), (0.0, 1.0));
        let (l, r) = pan_factors(0.25);
        assert_eq_with_epsilon!(l, 1.0, 1e-6);
        assert_eq_with_epsilon!(r, 0.5, 1e-6);
    }

    #[test]
    fn interpolation() {
        assert_eq!(lerp(1.0, 3.0, 0.0), 1.0);
        assert_eq!(lerp(1.0, 3.0, 0.5), 2.0);
        assert_eq!(lerp(1.0, 3.0, 1.0), 3.0);
    }
}
