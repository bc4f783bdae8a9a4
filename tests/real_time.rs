//! Renders packfile, live and vocoder output with an allocator which flags every allocation
//! within the audio processing path.
#![cfg(feature = "assert-allocs")]

use std::sync::Arc;

use assert_no_alloc::{assert_no_alloc, AllocDisabler};

use granade::{
    AudioFormat, AudioOutput, AudioWorker, AudioWorkerConfig, GrainPackfile,
    GrainPackfileBuilder, LoadedSound, MemorySink, NullTagModel, PluginAudioBuffer,
    PluginBooleanParameterId, PluginConfig, PluginHandle, PluginParameterId, PluginState,
    INTERNAL_SAMPLE_RATE,
};

#[global_allocator]
static A: AllocDisabler = AllocDisabler;

// -------------------------------------------------------------------------------------------------

const GRAIN_CAPACITY: usize = 8;

fn sine_packfile(grain_count: usize, period: f32) -> Arc<GrainPackfile> {
    let frame_count = grain_count * 256;
    let samples = (0..frame_count)
        .map(|i| 0.5 * (std::f32::consts::TAU * i as f32 / period).sin())
        .collect::<Vec<_>>();
    let sound = LoadedSound::new(INTERNAL_SAMPLE_RATE, samples.clone(), samples);
    let mut builder = GrainPackfileBuilder::new(256);
    builder.add_sound(&sound, &mut NullTagModel);
    Arc::new(builder.build())
}

fn busy_plugin() -> (PluginState, PluginHandle) {
    let config = PluginConfig::default()
        .with_file_grain_capacity(GRAIN_CAPACITY)
        .with_live_grain_capacity(4)
        .with_parameter_change_time_ms(0.0);
    let (state, handle) = PluginState::new(config).unwrap();
    let parameters = handle.parameters();
    parameters.set(PluginParameterId::Volume, 1.0);
    // more live grains than preallocated slots
    parameters.set(PluginParameterId::Density, 20.0);
    parameters.set(PluginParameterId::Size, 2000.0);
    parameters.set(PluginParameterId::Stretch, 2.0);
    parameters.set_enabled(PluginBooleanParameterId::SoundIsPlaying, true);
    parameters.set_enabled(PluginBooleanParameterId::VocoderEnabled, true);

    // the second packfile replaces and retires the first one
    handle.queue_packfile(sine_packfile(GRAIN_CAPACITY, 64.0)).unwrap();
    handle.queue_packfile(sine_packfile(GRAIN_CAPACITY, 100.0)).unwrap();
    (state, handle)
}

#[test]
fn audio_process() {
    let (mut state, handle) = busy_plugin();

    let frames = 512;
    let input = (0..2 * frames)
        .map(|i| 0.25 * (i as f32 * 0.01).sin())
        .collect::<Vec<_>>();
    let mut output = vec![0.0; 2 * frames];
    let midi = [granade::MidiEvent::new(100, &[0xB0, 7, 64])];

    for block in 0..100 {
        let mut buffer =
            PluginAudioBuffer::new(INTERNAL_SAMPLE_RATE, 2, AudioOutput::F32(&mut output))
                .with_input(&input);
        if block == 10 {
            buffer = buffer.with_midi(&midi);
        }
        if block == 50 {
            handle.clear_grains().unwrap();
            handle.queue_packfile(sine_packfile(4, 32.0)).unwrap();
        }
        assert_no_alloc(|| state.audio_process(&mut buffer));
        assert!(output.iter().all(|s| s.is_finite() && s.abs() <= 1.0));
    }
    assert!(state.live_granulator().total_count() <= 4);
    assert!(state.file_granulator().total_count() <= GRAIN_CAPACITY);

    #[cfg(debug_assertions)]
    assert_eq!(assert_no_alloc::violation_count(), 0);
}

#[test]
fn worker_render() {
    let (state, _handle) = busy_plugin();

    let sink = MemorySink::new(2, INTERNAL_SAMPLE_RATE, 48000).with_format(AudioFormat::S16);
    let config = AudioWorkerConfig::default()
        .with_block_frames(256)
        .with_promote_to_real_time(false);
    let worker = AudioWorker::spawn(state, sink, config, None).unwrap();
    let (state, sink) = worker.wait().unwrap();

    assert_eq!(sink.frames_written(), 48000);
    assert!(sink.samples().iter().any(|s| *s != 0.0));
    assert!(state.live_granulator().total_count() <= 4);
}
