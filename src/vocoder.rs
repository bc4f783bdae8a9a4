//! Phase vocoder time stretching.
//!
//! Input is analysed in Hann windowed frames of [`PV_WINDOW_SAMPLE_COUNT`] samples, which
//! advance by a fixed analysis hop. Each frame's bins get their phase re-accumulated for a
//! synthesis hop of `stretch * analysis_hop` samples, and the resynthesized frames are overlap
//! added into the output. Stretch factors > 1 therefore slow down the input without changing
//! its pitch.

use std::f32::consts::TAU;

use crate::{
    arena::ArenaPool,
    utils::{
        buffer::push_float_buffer,
        fft::{fft_real, ifft_real, principal_angle},
        ring_buffer::AudioRingBuffer,
    },
};

// -------------------------------------------------------------------------------------------------

/// Analysis and synthesis frame length.
pub const PV_WINDOW_SAMPLE_COUNT: usize = 512;
/// Analysis hop = frame length / divisor.
pub const PV_ANALYSIS_HOP_DIVISOR: usize = 4;
/// Number of input samples frames advance by.
pub const PV_ANALYSIS_HOP: usize = PV_WINDOW_SAMPLE_COUNT / PV_ANALYSIS_HOP_DIVISOR;

const BIN_COUNT: usize = PV_WINDOW_SAMPLE_COUNT / 2 + 1;

// -------------------------------------------------------------------------------------------------

/// Stereo phase vocoder with owned input, output and overlap-add buffers.
pub struct PhaseVocoder {
    bin_frequencies: Box<[f32]>,
    window: Box<[f32]>,
    // [history][channel][bin], `current` selects the history slot of the next frame
    phase_in: [[Box<[f32]>; 2]; 2],
    phase_adjusted: [[Box<[f32]>; 2]; 2],
    current: usize,
    has_history: bool,
    input: AudioRingBuffer,
    input_count: usize,
    input_overflowing: bool,
    output: AudioRingBuffer,
    output_count: usize,
    accumulator: [Box<[f32]>; 2],
}

impl PhaseVocoder {
    /// Create a new vocoder which can buffer up to `buffer_frames` input and output samples.
    ///
    /// `buffer_frames` must be large enough to hold at least one processing block plus a frame.
    pub fn new(buffer_frames: usize) -> Self {
        assert!(
            buffer_frames >= 2 * PV_WINDOW_SAMPLE_COUNT,
            "Phase vocoder buffers must hold at least two frames"
        );
        let bin_frequencies = (0..BIN_COUNT)
            .map(|k| TAU * k as f32 / PV_WINDOW_SAMPLE_COUNT as f32)
            .collect();
        // sums up to unity when overlapping with PV_ANALYSIS_HOP
        let window = (0..PV_WINDOW_SAMPLE_COUNT)
            .map(|n| 0.25 * (1.0 - (TAU * n as f32 / PV_WINDOW_SAMPLE_COUNT as f32).cos()))
            .collect();
        let bins = || vec![0.0; BIN_COUNT].into_boxed_slice();
        Self {
            bin_frequencies,
            window,
            phase_in: [[bins(), bins()], [bins(), bins()]],
            phase_adjusted: [[bins(), bins()], [bins(), bins()]],
            current: 0,
            has_history: false,
            input: AudioRingBuffer::new(buffer_frames),
            input_count: 0,
            input_overflowing: false,
            output: AudioRingBuffer::new(buffer_frames),
            output_count: 0,
            accumulator: [
                vec![0.0; PV_WINDOW_SAMPLE_COUNT].into_boxed_slice(),
                vec![0.0; PV_WINDOW_SAMPLE_COUNT].into_boxed_slice(),
            ],
        }
    }

    /// Delay in samples until the first fully overlapped output sample.
    pub const fn latency(&self) -> usize {
        PV_WINDOW_SAMPLE_COUNT - PV_ANALYSIS_HOP
    }

    /// Number of buffered, not yet analysed input samples.
    pub fn input_count(&self) -> usize {
        self.input_count
    }

    /// Number of synthesized, not yet read output samples.
    pub fn output_count(&self) -> usize {
        self.output_count
    }

    /// Maximum number of samples which can be processed in one [`process`](Self::process) call.
    pub fn max_block_frames(&self) -> usize {
        self.output.capacity() - PV_WINDOW_SAMPLE_COUNT
    }

    /// True while the input buffer drops samples, because input arrives faster than it gets
    /// consumed.
    pub fn is_input_overflowing(&self) -> bool {
        self.input_overflowing
    }

    /// Feed new input samples. When the input buffer overflows, the oldest samples are dropped.
    pub fn write_input(&mut self, input_l: &[f32], input_r: &[f32]) {
        debug_assert_eq!(input_l.len(), input_r.len());
        let capacity = self.input.capacity();
        let (input_l, input_r) = if input_l.len() > capacity {
            let skip = input_l.len() - capacity;
            (&input_l[skip..], &input_r[skip..])
        } else {
            (input_l, input_r)
        };
        let overflow = (self.input_count + input_l.len()).saturating_sub(capacity);
        if overflow > 0 {
            if !self.input_overflowing {
                log::warn!("Phase vocoder input overflow: dropping the oldest input samples");
                self.input_overflowing = true;
            }
            self.input.advance_read(overflow);
            self.input_count -= overflow;
        } else {
            self.input_overflowing = false;
        }
        self.input.write(input_l, input_r);
        self.input_count += input_l.len();
    }

    /// Produce exactly `output_l.len()` time stretched samples. When not enough input is
    /// buffered, missing samples are filled with silence.
    pub fn process(
        &mut self,
        output_l: &mut [f32],
        output_r: &mut [f32],
        stretch: f32,
        pool: &ArenaPool,
    ) {
        debug_assert_eq!(output_l.len(), output_r.len());
        let block_frames = output_l.len();
        assert!(
            block_frames <= self.max_block_frames(),
            "Phase vocoder block size exceeds its buffer size"
        );

        let synthesis_hop = ((stretch * PV_ANALYSIS_HOP as f32) as usize)
            .clamp(1, PV_WINDOW_SAMPLE_COUNT);
        while self.output_count < block_frames && self.input_count >= PV_WINDOW_SAMPLE_COUNT {
            self.process_frame(synthesis_hop, pool);
        }

        let available = self.output_count.min(block_frames);
        self.output
            .read(&mut output_l[..available], &mut output_r[..available]);
        self.output_count -= available;
        if available < block_frames {
            log::debug!(
                "Phase vocoder input underrun: {} samples missing",
                block_frames - available
            );
            output_l[available..].fill(0.0);
            output_r[available..].fill(0.0);
        }
    }

    /// Clear all buffered samples and the phase history.
    pub fn reset(&mut self) {
        self.input.reset();
        self.output.reset();
        self.input_count = 0;
        self.input_overflowing = false;
        self.output_count = 0;
        for channel in &mut self.accumulator {
            channel.fill(0.0);
        }
        self.current = 0;
        self.has_history = false;
    }

    fn process_frame(&mut self, synthesis_hop: usize, pool: &ArenaPool) {
        const N: usize = PV_WINDOW_SAMPLE_COUNT;

        let scratch = pool.scratch(&[]);
        let frame_l = push_float_buffer(&scratch, N);
        let frame_r = push_float_buffer(&scratch, N);
        let re = push_float_buffer(&scratch, N);
        let im = push_float_buffer(&scratch, N);
        let im_temp = push_float_buffer(&scratch, N);

        self.input.peek(frame_l, frame_r);
        self.input.advance_read(PV_ANALYSIS_HOP);
        self.input_count -= PV_ANALYSIS_HOP;

        let current = self.current;
        let previous = current ^ 1;
        let analysis_hop = PV_ANALYSIS_HOP as f32;
        let gain = synthesis_hop as f32 / analysis_hop;

        for (channel, frame) in [frame_l, frame_r].into_iter().enumerate() {
            for (sample, window) in frame.iter_mut().zip(self.window.iter()) {
                *sample *= window;
            }
            fft_real(re, im, frame);

            for k in 0..BIN_COUNT {
                let magnitude = re[k].hypot(im[k]);
                let phase = im[k].atan2(re[k]);
                let adjusted = if self.has_history {
                    let bin_frequency = self.bin_frequencies[k];
                    let phase_delta = phase - self.phase_in[previous][channel][k];
                    let frequency = bin_frequency
                        + principal_angle(phase_delta - bin_frequency * analysis_hop)
                            / analysis_hop;
                    principal_angle(
                        self.phase_adjusted[previous][channel][k]
                            + frequency * synthesis_hop as f32,
                    )
                } else {
                    phase
                };
                self.phase_in[current][channel][k] = phase;
                self.phase_adjusted[current][channel][k] = adjusted;
                re[k] = magnitude * adjusted.cos();
                im[k] = magnitude * adjusted.sin();
            }
            restore_conjugate_symmetry(re, im);

            ifft_real(frame, im_temp, re, im);
            for (acc, sample) in self.accumulator[channel].iter_mut().zip(frame.iter()) {
                *acc += *sample * gain;
            }
        }

        let [acc_l, acc_r] = &mut self.accumulator;
        self.output
            .write(&acc_l[..synthesis_hop], &acc_r[..synthesis_hop]);
        self.output_count += synthesis_hop;
        for acc in [acc_l, acc_r] {
            acc.copy_within(synthesis_hop.., 0);
            acc[N - synthesis_hop..].fill(0.0);
        }

        self.current = previous;
        self.has_history = true;
    }
}

// -------------------------------------------------------------------------------------------------

/// Mirror bins `0..=N/2` into the upper half of the spectrum, so the inverse transform of the
/// spectrum is real.
fn restore_conjugate_symmetry(re: &mut [f32], im: &mut [f32]) {
    let length = re.len();
    debug_assert_eq!(length, im.len());
    // DC and nyquist bins of a real signal have no imaginary part
    im[0] = 0.0;
    im[length / 2] = 0.0;
    for k in length / 2 + 1..length {
        re[k] = re[length - k];
        im[k] = -im[length - k];
    }
}

// -------------------------------------------------------------------------------------------------
