//! Sequential playback of grains from a [`GrainPackfile`].

use std::sync::Arc;

use crate::packfile::GrainPackfile;

// -------------------------------------------------------------------------------------------------

/// Slot index of the playlist ring's sentinel.
const SENTINEL: usize = 0;

// -------------------------------------------------------------------------------------------------

/// List membership of a grain slot. A slot is in exactly one of the three lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileGrainState {
    Queued { next: Option<usize> },
    Playing { prev: usize, next: usize },
    Free { next: Option<usize> },
}

#[derive(Debug, Clone)]
struct PlayingGrain {
    state: FileGrainState,
    /// Sample time, relative to the last queue operation, at which the grain starts.
    start_sample_index: u64,
    samples_remaining: usize,
    /// Index of the grain's sample block in the packfile.
    grain_index: usize,
}

impl PlayingGrain {
    const fn sentinel() -> Self {
        Self {
            state: FileGrainState::Playing {
                prev: SENTINEL,
                next: SENTINEL,
            },
            start_sample_index: 0,
            samples_remaining: 0,
            grain_index: 0,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Plays back all grains of a packfile, one after another.
///
/// Grains live in an index addressed slot pool and move from the queue to the playlist once
/// their start time arrived, and from the playlist to the free list once they played all their
/// samples. Exhausted grains are unlinked lazily, when they are visited the next time, so a
/// grain boundary never shows two grains playing at once.
///
/// The packfile is shared via an `Arc`: replacing it hands the previous one back to the caller,
/// so the audio thread never frees packfile memory.
#[derive(Debug)]
pub struct FileGranulator {
    grains: Vec<PlayingGrain>,
    queue_head: Option<usize>,
    free_head: Option<usize>,
    packfile: Option<Arc<GrainPackfile>>,
    samples_elapsed: u64,
    capacity: usize,
    queued_count: usize,
    playing_count: usize,
    free_count: usize,
}

impl FileGranulator {
    /// Create a new granulator with preallocated slots for `capacity` grains.
    pub fn new(capacity: usize) -> Self {
        let mut grains = Vec::with_capacity(capacity + 1);
        grains.push(PlayingGrain::sentinel());
        Self {
            grains,
            queue_head: None,
            free_head: None,
            packfile: None,
            samples_elapsed: 0,
            capacity,
            queued_count: 0,
            playing_count: 0,
            free_count: 0,
        }
    }

    /// The packfile grains currently are queued from, if any.
    pub fn packfile(&self) -> Option<&Arc<GrainPackfile>> {
        self.packfile.as_ref()
    }

    /// Number of grains waiting for their start time.
    pub fn queued_count(&self) -> usize {
        self.queued_count
    }

    /// Number of grains in the playlist, including exhausted ones which are not yet unlinked.
    pub fn playing_count(&self) -> usize {
        self.playing_count
    }

    /// Number of recycled grain slots.
    pub fn free_count(&self) -> usize {
        self.free_count
    }

    /// Number of allocated grain slots.
    pub fn total_count(&self) -> usize {
        self.grains.len() - 1
    }

    /// Max number of grains a single packfile can queue.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples mixed since the last queue operation.
    pub fn samples_elapsed(&self) -> u64 {
        self.samples_elapsed
    }

    /// Queue all grains of the given packfile for sequential playback, starting at the next
    /// mixed sample. Grain tags are not used for scheduling.
    ///
    /// Returns the previously used packfile, when it got replaced, so the caller can release it
    /// outside of the audio thread. Grains of a replaced packfile which are still playing get
    /// stopped.
    ///
    /// Grains beyond the granulator's [`capacity`](Self::capacity) are not queued.
    ///
    /// Panics when grains of a previous queue operation are still waiting.
    pub fn queue_all_grains_from_file(
        &mut self,
        packfile: &Arc<GrainPackfile>,
    ) -> Option<Arc<GrainPackfile>> {
        assert_eq!(
            self.queued_count, 0,
            "Grains must be played or cleared before queueing new ones"
        );
        let mut retired = self.packfile.replace(Arc::clone(packfile));
        if retired.as_ref().is_some_and(|prev| Arc::ptr_eq(prev, packfile)) {
            retired = None;
        } else if self.playing_count > 0 {
            log::debug!(
                "Stopping {} playing grains of the replaced packfile",
                self.playing_count
            );
            self.free_playing_grains();
        }

        self.samples_elapsed = 0;
        let grain_length = packfile.grain_length();
        for grain_index in 0..packfile.grain_count() {
            let Some(slot) = self.alloc_slot() else {
                log::warn!(
                    "File grain pool is exhausted: dropping {} of {} grains",
                    packfile.grain_count() - grain_index,
                    packfile.grain_count()
                );
                break;
            };
            self.grains[slot] = PlayingGrain {
                state: FileGrainState::Queued {
                    next: self.queue_head,
                },
                start_sample_index: (grain_length * grain_index) as u64,
                samples_remaining: grain_length,
                grain_index,
            };
            self.queue_head = Some(slot);
            self.queued_count += 1;
        }
        // the earliest grain was pushed first, so it's at the tail now
        self.reverse_queue();
        retired
    }

    /// Mix all grains which are due within the given buffers, scaled by `volume`.
    pub fn mix_playing_grains(&mut self, dest_l: &mut [f32], dest_r: &mut [f32], volume: f32) {
        debug_assert_eq!(dest_l.len(), dest_r.len());
        let Some(packfile) = self.packfile.clone() else {
            self.samples_elapsed += dest_l.len() as u64;
            return;
        };
        let grain_length = packfile.grain_length();

        let mut warned_starving = false;
        let mut warned_overlapping = false;
        for (out_l, out_r) in dest_l.iter_mut().zip(dest_r.iter_mut()) {
            if let Some(head) = self.queue_head {
                if self.samples_elapsed >= self.grains[head].start_sample_index {
                    self.queue_head = self.queued_next(head);
                    self.link_playing(head);
                    self.queued_count -= 1;
                    self.playing_count += 1;
                }
            }

            let mut index = self.playing_next(SENTINEL);
            while index != SENTINEL {
                let next = self.playing_next(index);
                let grain = &mut self.grains[index];
                if grain.samples_remaining > 0 {
                    let (samples_l, samples_r) = packfile.grain_samples(grain.grain_index);
                    let position = grain_length - grain.samples_remaining;
                    *out_l += volume * samples_l[position];
                    *out_r += volume * samples_r[position];
                    grain.samples_remaining -= 1;
                } else {
                    self.unlink_playing(index);
                    self.push_free(index);
                    self.playing_count -= 1;
                }
                index = next;
            }

            if self.queued_count > 0 && self.playing_count == 0 {
                if !warned_starving {
                    log::warn!(
                        "File granulator needs grains: {} are queued, but none is playing",
                        self.queued_count
                    );
                    warned_starving = true;
                }
            } else if self.playing_count > 1 && !warned_overlapping {
                log::warn!(
                    "File granulator plays too many grains: {}",
                    self.playing_count
                );
                warned_overlapping = true;
            }

            self.samples_elapsed += 1;
        }
    }

    /// Move all queued and playing grains to the free list.
    pub fn clear(&mut self) {
        while let Some(head) = self.queue_head {
            self.queue_head = self.queued_next(head);
            self.push_free(head);
        }
        self.queued_count = 0;
        self.free_playing_grains();
        self.samples_elapsed = 0;
    }

    /// Walk all lists and check that they are consistent, disjoint and cover every slot.
    pub fn validate_lists(&self) -> bool {
        let mut visited = vec![false; self.grains.len()];
        visited[SENTINEL] = true;
        let mut visit = |index: usize| -> bool {
            if index >= visited.len() || visited[index] {
                return false;
            }
            visited[index] = true;
            true
        };

        let mut queued = 0;
        let mut cursor = self.queue_head;
        while let Some(index) = cursor {
            if !visit(index) {
                return false;
            }
            let FileGrainState::Queued { next } = self.grains[index].state else {
                return false;
            };
            queued += 1;
            cursor = next;
        }

        let mut playing = 0;
        let mut prev = SENTINEL;
        let mut index = self.playing_next(SENTINEL);
        while index != SENTINEL {
            if !visit(index) {
                return false;
            }
            let FileGrainState::Playing {
                prev: grain_prev,
                next,
            } = self.grains[index].state
            else {
                return false;
            };
            if grain_prev != prev {
                return false;
            }
            playing += 1;
            prev = index;
            index = next;
        }
        let sentinel_state = self.grains[SENTINEL].state;
        if !matches!(sentinel_state, FileGrainState::Playing { prev: last, .. } if last == prev) {
            return false;
        }

        let mut free = 0;
        let mut cursor = self.free_head;
        while let Some(index) = cursor {
            if !visit(index) {
                return false;
            }
            let FileGrainState::Free { next } = self.grains[index].state else {
                return false;
            };
            free += 1;
            cursor = next;
        }

        queued == self.queued_count
            && playing == self.playing_count
            && free == self.free_count
            && visited.iter().all(|v| *v)
    }

    /// Take a recycled slot or a not yet used preallocated one. Never grows the pool.
    fn alloc_slot(&mut self) -> Option<usize> {
        if let Some(index) = self.free_head {
            let FileGrainState::Free { next } = self.grains[index].state else {
                panic!("Grain {index} on the free list is not free");
            };
            self.free_head = next;
            self.free_count -= 1;
            Some(index)
        } else if self.total_count() < self.capacity {
            self.grains.push(PlayingGrain::sentinel());
            Some(self.grains.len() - 1)
        } else {
            None
        }
    }

    fn push_free(&mut self, index: usize) {
        self.grains[index].state = FileGrainState::Free {
            next: self.free_head,
        };
        self.free_head = Some(index);
        self.free_count += 1;
    }

    fn free_playing_grains(&mut self) {
        let mut index = self.playing_next(SENTINEL);
        while index != SENTINEL {
            let next = self.playing_next(index);
            self.push_free(index);
            index = next;
        }
        self.grains[SENTINEL].state = FileGrainState::Playing {
            prev: SENTINEL,
            next: SENTINEL,
        };
        self.playing_count = 0;
    }

    fn reverse_queue(&mut self) {
        let mut reversed = None;
        let mut cursor = self.queue_head;
        while let Some(index) = cursor {
            cursor = self.queued_next(index);
            self.grains[index].state = FileGrainState::Queued { next: reversed };
            reversed = Some(index);
        }
        self.queue_head = reversed;
    }

    fn queued_next(&self, index: usize) -> Option<usize> {
        match self.grains[index].state {
            FileGrainState::Queued { next } => next,
            state => panic!("Grain {index} is not queued: {state:?}"),
        }
    }

    fn playing_links(&self, index: usize) -> (usize, usize) {
        match self.grains[index].state {
            FileGrainState::Playing { prev, next } => (prev, next),
            state => panic!("Grain {index} is not playing: {state:?}"),
        }
    }

    fn playing_next(&self, index: usize) -> usize {
        self.playing_links(index).1
    }

    fn set_playing_links(&mut self, index: usize, prev: usize, next: usize) {
        self.grains[index].state = FileGrainState::Playing { prev, next };
    }

    /// Append the given grain to the end of the playlist ring.
    fn link_playing(&mut self, index: usize) {
        let (last, sentinel_next) = self.playing_links(SENTINEL);
        self.set_playing_links(index, last, SENTINEL);
        if last == SENTINEL {
            self.set_playing_links(SENTINEL, index, index);
        } else {
            let (last_prev, _) = self.playing_links(last);
            self.set_playing_links(last, last_prev, index);
            self.set_playing_links(SENTINEL, index, sentinel_next);
        }
    }

    fn unlink_playing(&mut self, index: usize) {
        let (prev, next) = self.playing_links(index);
        let (prev_prev, _) = self.playing_links(prev);
        self.set_playing_links(prev, prev_prev, next);
        let (_, next_next) = self.playing_links(next);
        self.set_playing_links(next, prev, next_next);
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{
        packfile::{GrainPackfileBuilder, NullTagModel},
        wav::{load_wav_file, resample_linear, tests::write_test_wav, LoadedSound},
        INTERNAL_SAMPLE_RATE,
    };

    fn ramp_packfile(grain_length: usize, grain_count: usize) -> Arc<GrainPackfile> {
        let frame_count = grain_length * grain_count;
        let left = (0..frame_count).map(|i| i as f32).collect();
        let right = (0..frame_count).map(|i| -(i as f32)).collect();
        let sound = LoadedSound::new(INTERNAL_SAMPLE_RATE, left, right);
        let mut builder = GrainPackfileBuilder::new(grain_length);
        builder.add_sound(&sound, &mut NullTagModel);
        Arc::new(builder.build())
    }

    #[test]
    fn lifecycle() {
        let packfile = ramp_packfile(16, 5);
        let mut granulator = FileGranulator::new(5);
        assert!(granulator.validate_lists());

        assert!(granulator.queue_all_grains_from_file(&packfile).is_none());
        assert_eq!(granulator.queued_count(), 5);
        assert_eq!(granulator.total_count(), 5);
        assert!(granulator.validate_lists());

        let (mut left, mut right) = (vec![0.0; 7], vec![0.0; 7]);
        for _ in 0..12 {
            granulator.mix_playing_grains(&mut left, &mut right, 1.0);
            assert!(granulator.validate_lists());
            assert_eq!(
                granulator.queued_count() + granulator.playing_count() + granulator.free_count(),
                granulator.total_count()
            );
            assert!(granulator.playing_count() <= 1);
        }
        assert_eq!(granulator.queued_count(), 0);
        assert_eq!(granulator.playing_count(), 0);
        assert_eq!(granulator.free_count(), 5);

        // free slots get recycled
        assert!(granulator.queue_all_grains_from_file(&packfile).is_none());
        assert_eq!(granulator.total_count(), 5);
        assert_eq!(granulator.free_count(), 0);

        granulator.mix_playing_grains(&mut left, &mut right, 1.0);
        granulator.clear();
        assert!(granulator.validate_lists());
        assert_eq!(granulator.free_count(), 5);
        assert_eq!(granulator.samples_elapsed(), 0);
    }

    #[test]
    fn sequential_playback() {
        let packfile = ramp_packfile(8, 3);
        let mut granulator = FileGranulator::new(3);
        granulator.queue_all_grains_from_file(&packfile);

        let (mut left, mut right) = (vec![0.0; 30], vec![0.0; 30]);
        granulator.mix_playing_grains(&mut left, &mut right, 0.5);
        for i in 0..24 {
            assert_eq!(left[i], 0.5 * i as f32);
            assert_eq!(right[i], -0.5 * i as f32);
        }
        assert!(left[24..].iter().all(|s| *s == 0.0));
        assert_eq!(granulator.samples_elapsed(), 30);
    }

    #[test]
    fn replacing_packfiles() {
        let first = ramp_packfile(8, 2);
        let second = ramp_packfile(4, 2);
        let mut granulator = FileGranulator::new(4);
        granulator.queue_all_grains_from_file(&first);

        let (mut left, mut right) = (vec![0.0; 12], vec![0.0; 12]);
        granulator.mix_playing_grains(&mut left, &mut right, 1.0);
        assert_eq!(granulator.queued_count(), 0);
        assert_eq!(granulator.playing_count(), 1);

        let retired = granulator.queue_all_grains_from_file(&second);
        assert!(retired.is_some_and(|retired| Arc::ptr_eq(&retired, &first)));
        assert_eq!(granulator.playing_count(), 0);
        assert!(granulator.validate_lists());
        assert!(Arc::ptr_eq(granulator.packfile().unwrap(), &second));
    }

    #[test]
    fn exhausted_pool() {
        let packfile = ramp_packfile(8, 10);
        let mut granulator = FileGranulator::new(4);
        granulator.queue_all_grains_from_file(&packfile);
        assert_eq!(granulator.queued_count(), 4);
        assert_eq!(granulator.total_count(), 4);
        assert!(granulator.validate_lists());

        // only the first grains play
        let (mut left, mut right) = (vec![0.0; 80], vec![0.0; 80]);
        granulator.mix_playing_grains(&mut left, &mut right, 1.0);
        for i in 0..32 {
            assert_eq!(left[i], i as f32);
        }
        assert!(left[32..].iter().all(|s| *s == 0.0));
        assert_eq!(granulator.total_count(), 4);
        assert!(granulator.validate_lists());
    }

    #[test]
    #[should_panic]
    fn queueing_twice() {
        let packfile = ramp_packfile(8, 2);
        let mut granulator = FileGranulator::new(2);
        granulator.queue_all_grains_from_file(&packfile);
        granulator.queue_all_grains_from_file(&packfile);
    }

    #[test]
    fn wav_to_playback() {
        let source_rate = 44100;
        let samples = (0..2 * source_rate)
            .map(|i| (i as f32 * 440.0 * std::f32::consts::TAU / source_rate as f32).sin() * 0.5)
            .collect::<Vec<_>>();
        let path = write_test_wav("granulator", source_rate, 1, 16, &samples);
        let sound = load_wav_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        let sound = resample_linear(&sound, INTERNAL_SAMPLE_RATE);
        assert_eq!(sound.frame_count(), 96000);

        let mut builder = GrainPackfileBuilder::new(2400);
        builder.add_sound(&sound, &mut NullTagModel);
        let packfile = Arc::new(builder.build());
        assert_eq!(packfile.grain_count(), 40);

        let mut granulator = FileGranulator::new(packfile.grain_count());
        granulator.queue_all_grains_from_file(&packfile);

        let (mut left, mut right) = (vec![0.0; 48000], vec![0.0; 48000]);
        granulator.mix_playing_grains(&mut left, &mut right, 1.0);

        assert_eq!(granulator.queued_count(), 20);
        assert_eq!(granulator.playing_count(), 1);
        assert_eq!(granulator.free_count(), 19);
        assert!(granulator.validate_lists());
        assert_eq!(&left[..], &sound.samples[0][..48000]);
        assert_eq!(&right[..], &sound.samples[1][..48000]);
    }
}
