//! A dedicated audio thread, which pulls rendered blocks from a [`PluginState`] into an
//! [`OutputSink`].

use std::{
    panic::AssertUnwindSafe,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::Sender;

use crate::{
    output::OutputSink,
    plugin::{AudioFormat, AudioOutput, PluginAudioBuffer, PluginState},
    Error,
};

// -------------------------------------------------------------------------------------------------

/// Options of an [`AudioWorker`].
#[derive(Debug, Clone)]
pub struct AudioWorkerConfig {
    /// Max number of frames rendered per `audio_process` call.
    pub block_frames: usize,
    /// Initial sleep time when the sink requests no frames.
    pub min_backoff: Duration,
    /// The sleep time doubles with each idle round up to this duration.
    pub max_backoff: Duration,
    /// Try to promote the worker thread to real-time priority.
    pub promote_to_real_time: bool,
    pub thread_name: String,
}

impl Default for AudioWorkerConfig {
    fn default() -> Self {
        Self {
            block_frames: 512,
            min_backoff: Duration::from_micros(250),
            max_backoff: Duration::from_millis(10),
            promote_to_real_time: true,
            thread_name: "granade-audio-worker".to_string(),
        }
    }
}

impl AudioWorkerConfig {
    pub fn with_block_frames(mut self, block_frames: usize) -> Self {
        self.block_frames = block_frames;
        self
    }

    pub fn with_backoff(mut self, min_backoff: Duration, max_backoff: Duration) -> Self {
        self.min_backoff = min_backoff;
        self.max_backoff = max_backoff;
        self
    }

    pub fn with_promote_to_real_time(mut self, promote: bool) -> Self {
        self.promote_to_real_time = promote;
        self
    }

    pub fn with_thread_name<S: Into<String>>(mut self, name: S) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Validate all options.
    pub fn validate(&self) -> Result<(), Error> {
        if self.block_frames == 0 {
            return Err(Error::ParameterError(
                "Worker block frames must not be zero".to_string(),
            ));
        }
        if self.min_backoff.is_zero() || self.min_backoff > self.max_backoff {
            return Err(Error::ParameterError(format!(
                "Invalid worker backoff range: {:?} - {:?}",
                self.min_backoff, self.max_backoff
            )));
        }
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------

/// Status events of an [`AudioWorker`].
#[derive(Debug, Clone, PartialEq)]
pub enum AudioWorkerEvent {
    /// The worker thread is running.
    Started,
    /// The sink rejected a buffer. The worker stops right after this event.
    SinkFailed { message: String },
    /// The worker thread finished regularly.
    Stopped { frames_processed: u64 },
    /// The worker thread panicked.
    Panicked { message: String },
}

// -------------------------------------------------------------------------------------------------

/// Owns a [`PluginState`] and an [`OutputSink`] on a dedicated thread and renders audio
/// whenever the sink requests frames.
///
/// The worker stops on its own when its sink is finished. Dropping the worker cancels and
/// joins the thread.
pub struct AudioWorker<S: OutputSink> {
    cancel: Arc<AtomicBool>,
    thread: Option<JoinHandle<Option<(PluginState, S)>>>,
}

impl<S: OutputSink> AudioWorker<S> {
    /// Spawn a new worker thread. `event_sender` optionally receives [`AudioWorkerEvent`]s.
    pub fn spawn(
        state: PluginState,
        sink: S,
        config: AudioWorkerConfig,
        event_sender: Option<Sender<AudioWorkerEvent>>,
    ) -> Result<Self, Error> {
        config.validate()?;
        if config.block_frames > state.max_block_frames() {
            log::debug!(
                "Worker blocks of {} frames get split into plugin blocks of {} frames",
                config.block_frames,
                state.max_block_frames()
            );
        }

        let cancel = Arc::new(AtomicBool::new(false));
        let thread = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn({
                let cancel = Arc::clone(&cancel);
                move || {
                    let panic_sender = event_sender.clone();
                    match std::panic::catch_unwind(AssertUnwindSafe(move || {
                        Self::run(state, sink, config, cancel, event_sender)
                    })) {
                        Ok(result) => Some(result),
                        Err(payload) => {
                            let message = panic_message::panic_message(&payload).to_string();
                            log::error!("Ouch. Audio worker thread panicked: {message}");
                            send_event(
                                panic_sender.as_ref(),
                                AudioWorkerEvent::Panicked { message },
                            );
                            None
                        }
                    }
                }
            })
            .map_err(|err| {
                Error::WorkerError(format!("Failed to spawn audio worker thread: {err}"))
            })?;

        Ok(Self {
            cancel,
            thread: Some(thread),
        })
    }

    /// True while the worker thread is rendering.
    pub fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .is_some_and(|thread| !thread.is_finished())
    }

    /// Cancel rendering and return the plugin state and sink.
    pub fn stop(mut self) -> Result<(PluginState, S), Error> {
        self.cancel.store(true, Ordering::Release);
        self.join()
    }

    /// Wait until the sink is finished and return the plugin state and sink.
    pub fn wait(mut self) -> Result<(PluginState, S), Error> {
        self.join()
    }

    fn join(&mut self) -> Result<(PluginState, S), Error> {
        let thread = self
            .thread
            .take()
            .ok_or_else(|| Error::WorkerError("Worker thread already joined".to_string()))?;
        match thread.join() {
            Ok(Some(result)) => Ok(result),
            Ok(None) => Err(Error::WorkerError(
                "Audio worker thread panicked".to_string(),
            )),
            Err(payload) => Err(Error::WorkerError(
                panic_message::panic_message(&payload).to_string(),
            )),
        }
    }

    fn run(
        mut state: PluginState,
        mut sink: S,
        config: AudioWorkerConfig,
        cancel: Arc<AtomicBool>,
        event_sender: Option<Sender<AudioWorkerEvent>>,
    ) -> (PluginState, S) {
        let sample_rate = sink.sample_rate();
        let channel_count = sink.channel_count();

        if config.promote_to_real_time {
            if let Err(err) = audio_thread_priority::promote_current_thread_to_real_time(
                config.block_frames as u32,
                sample_rate,
            ) {
                log::warn!("Failed to promote audio worker to real-time priority: {err}");
            }
        }
        send_event(event_sender.as_ref(), AudioWorkerEvent::Started);

        let mut output = BlockOutput::new(sink.format(), config.block_frames * channel_count);
        let mut frames_processed = 0;
        let mut backoff = config.min_backoff;
        loop {
            if cancel
                .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                log::debug!("Audio worker got cancelled");
                break;
            }
            if sink.is_finished() {
                break;
            }

            let frames = sink.frames_requested().min(config.block_frames);
            if frames == 0 {
                thread::sleep(backoff);
                backoff = (backoff * 2).min(config.max_backoff);
                continue;
            }
            backoff = config.min_backoff;

            let samples = output.slice(frames * channel_count);
            let mut buffer = PluginAudioBuffer::new(sample_rate, channel_count, samples);
            assert_no_alloc(|| state.audio_process(&mut buffer));
            if let Err(err) = sink.submit(&buffer) {
                log::error!("Audio worker failed to submit output: {err}");
                send_event(
                    event_sender.as_ref(),
                    AudioWorkerEvent::SinkFailed {
                        message: err.to_string(),
                    },
                );
                break;
            }
            frames_processed += frames as u64;
        }

        send_event(
            event_sender.as_ref(),
            AudioWorkerEvent::Stopped { frames_processed },
        );
        (state, sink)
    }
}

impl<S: OutputSink> Drop for AudioWorker<S> {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.cancel.store(true, Ordering::Release);
            if let Err(err) = self.join() {
                log::error!("Failed to join audio worker thread: {err}");
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Preallocated interleaved output of a worker.
enum BlockOutput {
    S16(Vec<i16>),
    F32(Vec<f32>),
}

impl BlockOutput {
    fn new(format: AudioFormat, len: usize) -> Self {
        match format {
            AudioFormat::S16 => Self::S16(vec![0; len]),
            AudioFormat::F32 => Self::F32(vec![0.0; len]),
        }
    }

    fn slice(&mut self, len: usize) -> AudioOutput<'_> {
        match self {
            Self::S16(samples) => AudioOutput::S16(&mut samples[..len]),
            Self::F32(samples) => AudioOutput::F32(&mut samples[..len]),
        }
    }
}

fn send_event(sender: Option<&Sender<AudioWorkerEvent>>, event: AudioWorkerEvent) {
    if let Some(sender) = sender {
        if let Err(err) = sender.try_send(event) {
            log::warn!("Failed to send audio worker event: {err}");
        }
    }
}

fn assert_no_alloc<T, F: FnOnce() -> T>(func: F) -> T {
    #[cfg(feature = "assert-allocs")]
    return assert_no_alloc::assert_no_alloc::<T, F>(func);

    #[cfg(not(feature = "assert-allocs"))]
    return func();
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{
        output::MemorySink,
        packfile::{GrainPackfileBuilder, NullTagModel},
        parameter::{PluginBooleanParameterId, PluginParameterId},
        plugin::{PluginConfig, INTERNAL_SAMPLE_RATE},
        wav::LoadedSound,
    };

    fn test_config() -> AudioWorkerConfig {
        AudioWorkerConfig::default()
            .with_block_frames(256)
            .with_promote_to_real_time(false)
    }

    #[test]
    fn config_validation() {
        assert!(test_config().validate().is_ok());
        assert!(test_config().with_block_frames(0).validate().is_err());
        assert!(test_config()
            .with_backoff(Duration::from_millis(2), Duration::from_millis(1))
            .validate()
            .is_err());
    }

    #[test]
    fn offline_render() {
        let _ = simple_logger::init_with_level(log::Level::Warn);

        let config = PluginConfig::default().with_parameter_change_time_ms(0.0);
        let (state, handle) = PluginState::new(config).unwrap();
        let parameters = handle.parameters();
        parameters.set(PluginParameterId::Volume, 1.0);
        parameters.set(PluginParameterId::Pan, 0.5);
        parameters.set_enabled(PluginBooleanParameterId::SoundIsPlaying, true);

        let samples = (0..1000).map(|i| i as f32 / 2000.0).collect::<Vec<_>>();
        let sound = LoadedSound::new(INTERNAL_SAMPLE_RATE, samples.clone(), samples.clone());
        let mut builder = GrainPackfileBuilder::new(100);
        builder.add_sound(&sound, &mut NullTagModel);
        handle.queue_packfile(Arc::new(builder.build())).unwrap();

        let (event_sender, event_receiver) = crossbeam_channel::unbounded();
        let sink = MemorySink::new(2, INTERNAL_SAMPLE_RATE, 1000).with_format(AudioFormat::F32);
        let worker = AudioWorker::spawn(state, sink, test_config(), Some(event_sender)).unwrap();
        let (state, sink) = worker.wait().unwrap();

        assert_eq!(sink.frames_written(), 1000);
        for (frame, expected) in sink.samples().chunks_exact(2).zip(&samples) {
            assert_eq!(frame, [*expected, *expected]);
        }
        assert_eq!(state.file_granulator().queued_count(), 0);

        let events = event_receiver.try_iter().collect::<Vec<_>>();
        assert_eq!(
            events,
            [
                AudioWorkerEvent::Started,
                AudioWorkerEvent::Stopped {
                    frames_processed: 1000
                }
            ]
        );
    }

    struct EndlessSink;

    impl OutputSink for EndlessSink {
        fn channel_count(&self) -> usize {
            1
        }
        fn sample_rate(&self) -> u32 {
            INTERNAL_SAMPLE_RATE
        }
        fn format(&self) -> AudioFormat {
            AudioFormat::S16
        }
        fn frames_requested(&mut self) -> usize {
            thread::sleep(Duration::from_millis(1));
            64
        }
        fn submit(&mut self, buffer: &PluginAudioBuffer) -> Result<(), Error> {
            assert_eq!(buffer.format(), AudioFormat::S16);
            Ok(())
        }
        fn is_finished(&self) -> bool {
            false
        }
    }

    #[test]
    fn cancel() {
        let (state, _handle) = PluginState::new(PluginConfig::default()).unwrap();
        let worker = AudioWorker::spawn(state, EndlessSink, test_config(), None).unwrap();
        thread::sleep(Duration::from_millis(10));
        assert!(worker.is_running());
        assert!(worker.stop().is_ok());
    }

    struct PanickingSink;

    impl OutputSink for PanickingSink {
        fn channel_count(&self) -> usize {
            2
        }
        fn sample_rate(&self) -> u32 {
            INTERNAL_SAMPLE_RATE
        }
        fn format(&self) -> AudioFormat {
            AudioFormat::F32
        }
        fn frames_requested(&mut self) -> usize {
            128
        }
        fn submit(&mut self, _buffer: &PluginAudioBuffer) -> Result<(), Error> {
            panic!("Sink exploded");
        }
        fn is_finished(&self) -> bool {
            false
        }
    }

    #[test]
    fn panics() {
        let (state, _handle) = PluginState::new(PluginConfig::default()).unwrap();
        let (event_sender, event_receiver) = crossbeam_channel::unbounded();
        let worker =
            AudioWorker::spawn(state, PanickingSink, test_config(), Some(event_sender)).unwrap();
        assert!(matches!(worker.wait(), Err(Error::WorkerError(_))));

        let events = event_receiver.try_iter().collect::<Vec<_>>();
        assert_eq!(events.first(), Some(&AudioWorkerEvent::Started));
        assert!(matches!(
            events.last(),
            Some(AudioWorkerEvent::Panicked { message }) if message.contains("Sink exploded")
        ));
    }
}
