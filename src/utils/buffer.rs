use crate::arena::{Arena, ArenaPushFlags};

// -------------------------------------------------------------------------------------------------

/// Alignment of arena allocated sample buffers: one [`F32x4`](super::complex::F32x4) register.
pub const BUFFER_ALIGNMENT: usize = 16;

// -------------------------------------------------------------------------------------------------

/// Push a zeroed, SIMD aligned float buffer from the given arena.
#[allow(clippy::mut_from_ref)]
pub fn push_float_buffer<'a>(arena: &'a Arena<'_>, count: usize) -> &'a mut [f32] {
    arena.push_array::<f32>(count, ArenaPushFlags::zero_align(BUFFER_ALIGNMENT))
}

// -------------------------------------------------------------------------------------------------

/// A complex valued buffer with split real and imaginary parts, viewing arena memory.
#[derive(Debug)]
pub struct ComplexBuffer<'a> {
    pub re: &'a mut [f32],
    pub im: &'a mut [f32],
}

impl<'a> ComplexBuffer<'a> {
    /// Push a new zeroed complex buffer with `count` values from the given arena.
    pub fn new_in(arena: &'a Arena<'_>, count: usize) -> Self {
        let re = push_float_buffer(arena, count);
        let im = push_float_buffer(arena, count);
        Self { re, im }
    }

    pub fn len(&self) -> usize {
        self.re.len()
    }

    pub fn is_empty(&self) -> bool {
        self.re.is_empty()
    }

    /// Magnitude of the value at the given index.
    pub fn magnitude(&self, index: usize) -> f32 {
        self.re[index].hypot(self.im[index])
    }
}

// -------------------------------------------------------------------------------------------------

/// Add `src` into `dest`.
pub fn add_buffers(dest: &mut [f32], src: &[f32]) {
    debug_assert_eq!(dest.len(), src.len());
    for (d, s) in dest.iter_mut().zip(src) {
        *d += *s;
    }
}

/// Multiply all values in the given buffer with `factor`.
pub fn scale_buffer(buffer: &mut [f32], factor: f32) {
    for s in buffer.iter_mut() {
        *s *= factor;
    }
}

/// Hard clip all values in the given buffer to `-1.0..=1.0`.
pub fn clip_buffer(buffer: &mut [f32]) {
    for s in buffer.iter_mut() {
        *s = s.clamp(-1.0, 1.0);
    }
}

// -------------------------------------------------------------------------------------------------

/// Convert a f32 sample in range `-1.0..=1.0` to a signed 16 bit sample.
#[inline]
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// Convert a signed 16 bit sample to f32. Inverse of [`f32_to_i16`].
#[inline]
pub fn i16_to_f32(sample: i16) -> f32 {
    (sample as f32 / i16::MAX as f32).max(-1.0)
}

// -------------------------------------------------------------------------------------------------

/// Copy a planar stereo signal into an interleaved buffer with 1 or 2 channels.
/// Mono outputs receive the average of both channels.
pub fn stereo_to_interleaved(
    left: &[f32],
    right: &[f32],
    interleaved: &mut [f32],
    channel_count: usize,
) {
    debug_assert_eq!(left.len(), right.len());
    match channel_count {
        1 => {
            for ((i, l), r) in interleaved.iter_mut().zip(left).zip(right) {
                *i = 0.5 * (*l + *r);
            }
        }
        2 => {
            for ((frame, l), r) in interleaved.chunks_exact_mut(2).zip(left).zip(right) {
                frame[0] = *l;
                frame[1] = *r;
            }
        }
        _ => panic!("Unsupported output channel count: {channel_count}"),
    }
}

/// Copy an interleaved buffer with 1 or 2 channels into a planar stereo signal.
/// Mono inputs are copied to both channels.
pub fn interleaved_to_stereo(
    interleaved: &[f32],
    channel_count: usize,
    left: &mut [f32],
    right: &mut [f32],
) {
    debug_assert_eq!(left.len(), right.len());
    match channel_count {
        1 => {
            for ((i, l), r) in interleaved.iter().zip(left.iter_mut()).zip(right.iter_mut()) {
                *l = *i;
                *r = *i;
            }
        }
        2 => {
            let frames = interleaved.chunks_exact(2);
            for ((frame, l), r) in frames.zip(left.iter_mut()).zip(right.iter_mut()) {
                *l = frame[0];
                *r = frame[1];
            }
        }
        _ => panic!("Unsupported input channel count: {channel_count}"),
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stereo_interleaved() {
        let left = [1.0, 2.0, 3.0, 4.0];
        let right = [4.0, 3.0, 2.0, 1.0];

        let mut interleaved = [0.0; 8];
        stereo_to_interleaved(&left, &right, &mut interleaved, 2);
        assert_eq!(interleaved, [1.0, 4.0, 2.0, 3.0, 3.0, 2.0, 4.0, 1.0]);

        let (mut left_copy, mut right_copy) = ([0.0; 4], [0.0; 4]);
        interleaved_to_stereo(&interleaved, 2, &mut left_copy, &mut right_copy);
        assert_eq!(left, left_copy);
        assert_eq!(right, right_copy);

        let mut mono = [0.0; 4];
        stereo_to_interleaved(&left, &right, &mut mono, 1);
        assert_eq!(mono, [2.5; 4]);

        interleaved_to_stereo(&mono, 1, &mut left_copy, &mut right_copy);
        assert_eq!(left_copy, [2.5; 4]);
        assert_eq!(right_copy, [2.5; 4]);
    }

    #[test]
    fn sample_conversion() {
        assert_eq!(f32_to_i16(0.0), 0);
        assert_eq!(f32_to_i16(1.0), i16::MAX);
        assert_eq!(f32_to_i16(-1.0), -i16::MAX);
        assert_eq!(f32_to_i16(2.0), i16::MAX);
        assert_eq!(i16_to_f32(i16::MAX), 1.0);
        assert_eq!(i16_to_f32(i16::MIN), -1.0);
    }

    #[test]
    fn arena_buffers() {
        let arena = Arena::with_capacity(4096);
        let floats = push_float_buffer(&arena, 10);
        assert_eq!(floats.as_ptr() as usize % BUFFER_ALIGNMENT, 0);
        assert!(floats.iter().all(|v| *v == 0.0));

        let complex = ComplexBuffer::new_in(&arena, 8);
        complex.re[1] = 3.0;
        complex.im[1] = 4.0;
        assert_eq!(complex.len(), 8);
        assert_eq!(complex.magnitude(1), 5.0);
    }

    #[test]
    fn buffer_math() {
        let mut dest = [1.0, 2.0, 3.0];
        add_buffers(&mut dest, &[1.0, 1.0, 1.0]);
        scale_buffer(&mut dest, 0.5);
        assert_eq!(dest, [1.0, 1.5, 2.0]);
        clip_buffer(&mut dest);
        assert_eq!(dest, [1.0, 1.0, 1.0]);
    }
}
