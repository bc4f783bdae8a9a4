//! Radix-2 FFT kernels, fast convolution and the chirp z-transform.
//!
//! The real input kernels process their butterfly stages 4 values wide, using split real and
//! imaginary buffers. Two variants exist:
//! - *permute*: bit-reverse the input up front, then run decimation-in-time stages. Input and
//!   output are in natural order.
//! - *no permute*: the forward transform uses decimation-in-frequency stages and produces a
//!   bit-reversed spectrum. The inverse transform consumes a bit-reversed spectrum. Useful when
//!   the spectrum only is processed pointwise, as in [`convolve`].
//!
//! All power-of-two kernels assert their lengths. The chirp z-transform ([`czt`], [`iczt`])
//! handles arbitrary lengths.

use std::f32::consts::{PI, TAU};

use super::complex::{Complex32, Complex32x4, LANES};
use crate::arena::{Arena, ArenaPushFlags};

// -------------------------------------------------------------------------------------------------

/// Returns `index` with its lowest `log_length` bits reversed.
#[inline]
pub fn reverse_bits(index: usize, log_length: u32) -> usize {
    if log_length == 0 {
        0
    } else {
        index.reverse_bits() >> (usize::BITS - log_length)
    }
}

/// Wrap the given angle into the principal range `(-PI, PI]`.
#[inline]
pub fn principal_angle(angle: f32) -> f32 {
    angle - TAU * ((angle - PI) / TAU).ceil()
}

fn assert_power_of_two(length: usize) -> u32 {
    assert!(
        length.is_power_of_two(),
        "FFT length must be a power of two, got {length}"
    );
    length.trailing_zeros()
}

// -------------------------------------------------------------------------------------------------

/// Forward FFT of a real signal. Input and output are in natural order.
pub fn fft_real(dest_re: &mut [f32], dest_im: &mut [f32], src: &[f32]) {
    fft_real_permute(dest_re, dest_im, src)
}

/// Inverse FFT of a spectrum into a real signal, scaled by `1/N`. `dest_im_temp` receives the
/// imaginary residue of the signal, which is zero for conjugate symmetric spectra.
pub fn ifft_real(dest: &mut [f32], dest_im_temp: &mut [f32], src_re: &[f32], src_im: &[f32]) {
    ifft_real_permute(dest, dest_im_temp, src_re, src_im)
}

/// Forward FFT with an up-front bit-reversal copy and decimation-in-time stages.
pub fn fft_real_permute(dest_re: &mut [f32], dest_im: &mut [f32], src: &[f32]) {
    let length = src.len();
    let log_length = assert_power_of_two(length);
    assert!(dest_re.len() == length && dest_im.len() == length);

    for (index, re) in dest_re.iter_mut().enumerate() {
        *re = src[reverse_bits(index, log_length)];
    }
    dest_im.fill(0.0);

    dit_stages(dest_re, dest_im, -1.0);
}

/// Inverse FFT with an up-front bit-reversal copy and decimation-in-time stages.
pub fn ifft_real_permute(
    dest: &mut [f32],
    dest_im_temp: &mut [f32],
    src_re: &[f32],
    src_im: &[f32],
) {
    let length = src_re.len();
    let log_length = assert_power_of_two(length);
    assert!(src_im.len() == length && dest.len() == length && dest_im_temp.len() == length);

    let length_inv = 1.0 / length as f32;
    for (index, (re, im)) in dest.iter_mut().zip(dest_im_temp.iter_mut()).enumerate() {
        let reversed_index = reverse_bits(index, log_length);
        *re = src_re[reversed_index] * length_inv;
        *im = src_im[reversed_index] * length_inv;
    }

    dit_stages(dest, dest_im_temp, 1.0);
}

/// Forward FFT with decimation-in-frequency stages: natural order input, bit-reversed output.
pub fn fft_real_no_permute(dest_re: &mut [f32], dest_im: &mut [f32], src: &[f32]) {
    let length = src.len();
    assert_power_of_two(length);
    assert!(dest_re.len() == length && dest_im.len() == length);

    dest_re.copy_from_slice(src);
    dest_im.fill(0.0);

    dif_stages(dest_re, dest_im, -1.0);
}

/// Inverse FFT with decimation-in-time stages: bit-reversed input, natural order output.
pub fn ifft_real_no_permute(
    dest: &mut [f32],
    dest_im_temp: &mut [f32],
    src_re: &[f32],
    src_im: &[f32],
) {
    let length = src_re.len();
    assert_power_of_two(length);
    assert!(src_im.len() == length && dest.len() == length && dest_im_temp.len() == length);

    let length_inv = 1.0 / length as f32;
    for (d, s) in dest.iter_mut().zip(src_re) {
        *d = *s * length_inv;
    }
    for (d, s) in dest_im_temp.iter_mut().zip(src_im) {
        *d = *s * length_inv;
    }

    dit_stages(dest, dest_im_temp, 1.0);
}

// -------------------------------------------------------------------------------------------------

/// Iterative radix-2 decimation-in-time butterflies. `sign` is -1 for forward, 1 for inverse
/// transforms.
fn dit_stages(re: &mut [f32], im: &mut [f32], sign: f32) {
    let length = re.len();
    let mut span = 2;
    while span <= length {
        let half = span / 2;
        let wm = Complex32::from_polar(1.0, sign * TAU / span as f32);
        if half < LANES {
            // scalar stages
            for k in (0..length).step_by(span) {
                let mut w = Complex32::new(1.0, 0.0);
                for j in k..k + half {
                    let a = Complex32::new(re[j], im[j]);
                    let b = w * Complex32::new(re[j + half], im[j + half]);
                    (re[j], im[j]) = ((a + b).re, (a + b).im);
                    (re[j + half], im[j + half]) = ((a - b).re, (a - b).im);
                    w *= wm;
                }
            }
        } else {
            let wm2 = wm * wm;
            let wm3 = wm2 * wm;
            let w_step = Complex32x4::splat(wm3 * wm);
            for k in (0..length).step_by(span) {
                let (lo_re, hi_re) = re[k..k + span].split_at_mut(half);
                let (lo_im, hi_im) = im[k..k + span].split_at_mut(half);
                let mut w = Complex32x4::from_lanes([Complex32::new(1.0, 0.0), wm, wm2, wm3]);
                for j in (0..half).step_by(LANES) {
                    let a = Complex32x4::load(&lo_re[j..], &lo_im[j..]);
                    let b = w * Complex32x4::load(&hi_re[j..], &hi_im[j..]);
                    (a + b).store(&mut lo_re[j..], &mut lo_im[j..]);
                    (a - b).store(&mut hi_re[j..], &mut hi_im[j..]);
                    w = w * w_step;
                }
            }
        }
        span <<= 1;
    }
}

/// Iterative radix-2 decimation-in-frequency butterflies. `sign` is -1 for forward, 1 for
/// inverse transforms.
fn dif_stages(re: &mut [f32], im: &mut [f32], sign: f32) {
    let length = re.len();
    let mut span = length;
    while span >= 2 {
        let half = span / 2;
        let wm = Complex32::from_polar(1.0, sign * TAU / span as f32);
        if half < LANES {
            // scalar stages
            for k in (0..length).step_by(span) {
                let mut w = Complex32::new(1.0, 0.0);
                for j in k..k + half {
                    let a = Complex32::new(re[j], im[j]);
                    let b = Complex32::new(re[j + half], im[j + half]);
                    let diff = (a - b) * w;
                    (re[j], im[j]) = ((a + b).re, (a + b).im);
                    (re[j + half], im[j + half]) = (diff.re, diff.im);
                    w *= wm;
                }
            }
        } else {
            let wm2 = wm * wm;
            let wm3 = wm2 * wm;
            let w_step = Complex32x4::splat(wm3 * wm);
            for k in (0..length).step_by(span) {
                let (lo_re, hi_re) = re[k..k + span].split_at_mut(half);
                let (lo_im, hi_im) = im[k..k + span].split_at_mut(half);
                let mut w = Complex32x4::from_lanes([Complex32::new(1.0, 0.0), wm, wm2, wm3]);
                for j in (0..half).step_by(LANES) {
                    let a = Complex32x4::load(&lo_re[j..], &lo_im[j..]);
                    let b = Complex32x4::load(&hi_re[j..], &hi_im[j..]);
                    (a + b).store(&mut lo_re[j..], &mut lo_im[j..]);
                    ((a - b) * w).store(&mut hi_re[j..], &mut hi_im[j..]);
                    w = w * w_step;
                }
            }
        }
        span >>= 1;
    }
}

// -------------------------------------------------------------------------------------------------

/// Forward FFT of a complex signal. Input and output are in natural order.
pub fn fft_complex(output: &mut [Complex32], input: &[Complex32]) {
    complex_transform(output, input, -1.0, 1.0);
}

/// Inverse FFT of a complex spectrum, scaled by `1/N`.
pub fn ifft_complex(output: &mut [Complex32], input: &[Complex32]) {
    let scaling = 1.0 / input.len() as f32;
    complex_transform(output, input, 1.0, scaling);
}

fn complex_transform(output: &mut [Complex32], input: &[Complex32], sign: f32, scaling: f32) {
    let length = input.len();
    let log_length = assert_power_of_two(length);
    assert_eq!(output.len(), length);

    for (index, value) in output.iter_mut().enumerate() {
        *value = input[reverse_bits(index, log_length)] * scaling;
    }

    let mut span = 2;
    while span <= length {
        let half = span / 2;
        let wm = Complex32::from_polar(1.0, sign * TAU / span as f32);
        for block in output.chunks_exact_mut(span) {
            let (lo, hi) = block.split_at_mut(half);
            let mut w = Complex32::new(1.0, 0.0);
            for (a, b) in lo.iter_mut().zip(hi.iter_mut()) {
                let product = w * *b;
                *b = *a - product;
                *a += product;
                w *= wm;
            }
        }
        span <<= 1;
    }
}

// -------------------------------------------------------------------------------------------------

/// Fast circular convolution of two real signals of the same power-of-two length.
///
/// Needs `5 * length` floats of scratch memory, which gets released before returning.
pub fn convolve(dest: &mut [f32], src0: &[f32], src1: &[f32], scratch: &mut Arena<'_>) {
    let length = dest.len();
    assert_power_of_two(length);
    assert!(src0.len() == length && src1.len() == length);

    let temp = scratch.begin_temporary_memory();
    let flags = ArenaPushFlags::no_zero_align(16);
    let re0 = temp.push_array::<f32>(length, flags);
    let im0 = temp.push_array::<f32>(length, flags);
    let re1 = temp.push_array::<f32>(length, flags);
    let im1 = temp.push_array::<f32>(length, flags);
    let im_temp = temp.push_array::<f32>(length, flags);

    // bit-reversed spectra: the pointwise product doesn't care about the order
    fft_real_no_permute(re0, im0, src0);
    fft_real_no_permute(re1, im1, src1);

    for index in 0..length {
        let product =
            Complex32::new(re0[index], im0[index]) * Complex32::new(re1[index], im1[index]);
        re0[index] = product.re;
        im0[index] = product.im;
    }

    ifft_real_no_permute(dest, im_temp, re0, im0);
}

// -------------------------------------------------------------------------------------------------

/// Chirp z-transform: the DFT of a real signal with arbitrary length.
///
/// The transform is evaluated as a convolution with the chirp `e^(-i*PI*k^2/N)` on a zero
/// padded, power-of-two FFT length of at least `2N - 1`.
///
/// Chirp values are derived recursively from their predecessors, so rounding errors accumulate
/// with `k`: for very long inputs the accuracy of high indices is lower than a direct
/// trigonometric evaluation would give.
pub fn czt(output: &mut [Complex32], input: &[f32], scratch: &mut Arena<'_>) {
    assert_eq!(output.len(), input.len());
    let temp = scratch.begin_temporary_memory();
    chirp_z_transform(output, |index| Complex32::new(input[index], 0.0), -1.0, &temp);
}

/// Inverse chirp z-transform of a spectrum with arbitrary length, scaled by `1/N`.
pub fn iczt(
    output_re: &mut [f32],
    output_im: &mut [f32],
    input: &[Complex32],
    scratch: &mut Arena<'_>,
) {
    let length = input.len();
    assert!(output_re.len() == length && output_im.len() == length);

    let temp = scratch.begin_temporary_memory();
    let result = temp.push_array::<Complex32>(length, ArenaPushFlags::default());
    chirp_z_transform(result, |index| input[index], 1.0, &temp);

    let length_inv = 1.0 / length as f32;
    for ((re, im), value) in output_re.iter_mut().zip(output_im.iter_mut()).zip(result.iter()) {
        *re = value.re * length_inv;
        *im = value.im * length_inv;
    }
}

fn chirp_z_transform<F: Fn(usize) -> Complex32>(
    output: &mut [Complex32],
    input: F,
    sign: f32,
    temp: &Arena<'_>,
) {
    let length = output.len();
    assert!(length > 0, "Chirp z-transform needs a non empty signal");
    let fft_length = (2 * length - 1).next_power_of_two();

    let chirp = temp.push_array::<Complex32>(length, ArenaPushFlags::default());
    let scaled_input = temp.push_array::<Complex32>(fft_length, ArenaPushFlags::ZERO);
    let reciprocal_chirp = temp.push_array::<Complex32>(fft_length, ArenaPushFlags::ZERO);
    let input_spectrum = temp.push_array::<Complex32>(fft_length, ArenaPushFlags::default());
    let chirp_spectrum = temp.push_array::<Complex32>(fft_length, ArenaPushFlags::default());

    // chirp[k] = w^(k^2): chirp[k] = chirp[k-1] * w^(2k-2) * w
    let w_base = Complex32::from_polar(1.0, sign * PI / length as f32);
    let w_base_squared = w_base * w_base;
    let mut w_temp = Complex32::new(1.0, 0.0);
    chirp[0] = Complex32::new(1.0, 0.0);
    for k in 1..length {
        chirp[k] = chirp[k - 1] * w_temp * w_base;
        w_temp *= w_base_squared;
    }

    for k in 0..length {
        scaled_input[k] = input(k) * chirp[k];
    }
    // circular layout of conj(chirp) for indices -(N-1)..=(N-1)
    reciprocal_chirp[0] = chirp[0].conj();
    for k in 1..length {
        reciprocal_chirp[k] = chirp[k].conj();
        reciprocal_chirp[fft_length - k] = chirp[k].conj();
    }

    fft_complex(input_spectrum, scaled_input);
    fft_complex(chirp_spectrum, reciprocal_chirp);
    for (a, b) in input_spectrum.iter_mut().zip(chirp_spectrum.iter()) {
        *a *= *b;
    }
    // scaled input no longer is needed: reuse it for the convolution result
    ifft_complex(scaled_input, input_spectrum);

    for (k, value) in output.iter_mut().enumerate() {
        *value = scaled_input[k] * chirp[k];
    }
}

// -------------------------------------------------------------------------------------------------
