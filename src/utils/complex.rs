//! Complex sample algebra and 4 lane wide float vectors for the transform kernels.

use std::ops::{Add, Mul, Sub};

pub use num_complex::Complex32;

// -------------------------------------------------------------------------------------------------

/// Number of lanes in a [`F32x4`].
pub const LANES: usize = 4;

// -------------------------------------------------------------------------------------------------

/// Four f32 lanes, processed in lockstep. Written so that the compiler can map it to a single
/// SIMD register.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[repr(align(16))]
pub struct F32x4(pub [f32; LANES]);

impl F32x4 {
    #[inline(always)]
    pub const fn splat(value: f32) -> Self {
        Self([value; LANES])
    }

    /// Load the first 4 values of the given slice.
    #[inline(always)]
    pub fn load(src: &[f32]) -> Self {
        let mut lanes = [0.0; LANES];
        lanes.copy_from_slice(&src[..LANES]);
        Self(lanes)
    }

    /// Store all lanes into the first 4 values of the given slice.
    #[inline(always)]
    pub fn store(self, dest: &mut [f32]) {
        dest[..LANES].copy_from_slice(&self.0);
    }
}

impl Add for F32x4 {
    type Output = Self;
    #[inline(always)]
    fn add(self, rhs: Self) -> Self {
        Self(std::array::from_fn(|lane| self.0[lane] + rhs.0[lane]))
    }
}

impl Sub for F32x4 {
    type Output = Self;
    #[inline(always)]
    fn sub(self, rhs: Self) -> Self {
        Self(std::array::from_fn(|lane| self.0[lane] - rhs.0[lane]))
    }
}

impl Mul for F32x4 {
    type Output = Self;
    #[inline(always)]
    fn mul(self, rhs: Self) -> Self {
        Self(std::array::from_fn(|lane| self.0[lane] * rhs.0[lane]))
    }
}

// -------------------------------------------------------------------------------------------------

/// Four complex values in split real/imaginary lanes.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Complex32x4 {
    pub re: F32x4,
    pub im: F32x4,
}

impl Complex32x4 {
    #[inline(always)]
    pub fn from_lanes(values: [Complex32; LANES]) -> Self {
        Self {
            re: F32x4(values.map(|c| c.re)),
            im: F32x4(values.map(|c| c.im)),
        }
    }

    #[inline(always)]
    pub const fn splat(value: Complex32) -> Self {
        Self {
            re: F32x4::splat(value.re),
            im: F32x4::splat(value.im),
        }
    }

    #[inline(always)]
    pub fn load(re: &[f32], im: &[f32]) -> Self {
        Self {
            re: F32x4::load(re),
            im: F32x4::load(im),
        }
    }

    #[inline(always)]
    pub fn store(self, re: &mut [f32], im: &mut [f32]) {
        self.re.store(re);
        self.im.store(im);
    }
}

impl Add for Complex32x4 {
    type Output = Self;
    #[inline(always)]
    fn add(self, rhs: Self) -> Self {
        Self {
            re: self.re + rhs.re,
            im: self.im + rhs.im,
        }
    }
}

impl Sub for Complex32x4 {
    type Output = Self;
    #[inline(always)]
    fn sub(self, rhs: Self) -> Self {
        Self {
            re: self.re - rhs.re,
            im: self.im - rhs.im,
        }
    }
}

impl Mul for Complex32x4 {
    type Output = Self;
    #[inline(always)]
    fn mul(self, rhs: Self) -> Self {
        Self {
            re: self.re * rhs.re - self.im * rhs.im,
            im: self.re * rhs.im + self.im * rhs.re,
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wide_ops() {
        let a = F32x4([1.0, 2.0, 3.0, 4.0]);
        let b = F32x4::splat(2.0);
        assert_eq!((a + b).0, [3.0, 4.0, 5.0, 6.0]);
        assert_eq!((a - b).0, [-1.0, 0.0, 1.0, 2.0]);
        assert_eq!((a * b).0, [2.0, 4.0, 6.0, 8.0]);

        let mut dest = [0.0; 6];
        a.store(&mut dest[2..]);
        assert_eq!(dest, [0.0, 0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(F32x4::load(&dest[2..]), a);
    }

    #[test]
    fn wide_complex_multiply() {
        let values = [
            Complex32::new(1.0, 2.0),
            Complex32::new(-0.5, 0.25),
            Complex32::new(0.0, -1.0),
            Complex32::new(3.0, 0.0),
        ];
        let factor = Complex32::from_polar(1.0, 0.3);
        let product = Complex32x4::from_lanes(values) * Complex32x4::splat(factor);
        for (lane, value) in values.iter().enumerate() {
            let expected = value * factor;
            assert!((product.re.0[lane] - expected.re).abs() < 1e-6);
            assert!((product.im.0[lane] - expected.im).abs() < 1e-6);
        }
    }
}
