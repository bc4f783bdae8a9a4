//! Fixed capacity stereo sample ring buffer.

// -------------------------------------------------------------------------------------------------

/// Stereo ring buffer with a single writer and a single reader.
///
/// The buffer does not track how many samples are buffered: readers and writers must keep
/// track of that themselves, e.g. via [`offset`](Self::offset). Copies which wrap around the
/// buffer's end are done in two segments.
#[derive(Debug, Clone)]
pub struct AudioRingBuffer {
    channels: [Vec<f32>; 2],
    write_index: usize,
    read_index: usize,
}

impl AudioRingBuffer {
    /// Create a new zeroed ring buffer with the given capacity in samples per channel.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Ring buffer capacity must not be zero");
        Self {
            channels: [vec![0.0; capacity], vec![0.0; capacity]],
            write_index: 0,
            read_index: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.channels[0].len()
    }

    pub fn read_index(&self) -> usize {
        self.read_index
    }

    pub fn write_index(&self) -> usize {
        self.write_index
    }

    /// Move the read position to the given absolute index.
    pub fn set_read_index(&mut self, index: usize) {
        debug_assert!(index < self.capacity());
        self.read_index = index % self.capacity();
    }

    /// Distance from the read to the write index: `(write - read) mod capacity`.
    pub fn offset(&self) -> usize {
        let capacity = self.capacity();
        (self.write_index + capacity - self.read_index) % capacity
    }

    /// Direct access to the samples of channel 0 (left) or 1 (right).
    pub fn channel(&self, channel: usize) -> &[f32] {
        &self.channels[channel]
    }

    /// Write the given stereo samples and advance the write index.
    pub fn write(&mut self, src_l: &[f32], src_r: &[f32]) {
        self.write_no_advance(src_l, src_r);
        self.advance_write(src_l.len());
    }

    /// Write the given stereo samples without moving the write index.
    pub fn write_no_advance(&mut self, src_l: &[f32], src_r: &[f32]) {
        debug_assert_eq!(src_l.len(), src_r.len());
        let start = self.write_index;
        for (channel, src) in self.channels.iter_mut().zip([src_l, src_r]) {
            copy_into_ring(channel, start, src);
        }
    }

    /// Write `count` zero samples and advance the write index.
    pub fn write_zeros(&mut self, count: usize) {
        let capacity = self.capacity();
        debug_assert!(count <= capacity);
        let start = self.write_index;
        let first = count.min(capacity - start);
        for channel in &mut self.channels {
            channel[start..start + first].fill(0.0);
            channel[..count - first].fill(0.0);
        }
        self.advance_write(count);
    }

    /// Read stereo samples into the given buffers and advance the read index.
    pub fn read(&mut self, dest_l: &mut [f32], dest_r: &mut [f32]) {
        self.peek(dest_l, dest_r);
        self.advance_read(dest_l.len());
    }

    /// Read stereo samples into the given buffers without moving the read index.
    pub fn peek(&self, dest_l: &mut [f32], dest_r: &mut [f32]) {
        debug_assert_eq!(dest_l.len(), dest_r.len());
        let start = self.read_index;
        for (channel, dest) in self.channels.iter().zip([dest_l, dest_r]) {
            copy_from_ring(channel, start, dest);
        }
    }

    pub fn advance_read(&mut self, count: usize) {
        debug_assert!(count <= self.capacity());
        self.read_index = (self.read_index + count) % self.capacity();
    }

    pub fn advance_write(&mut self, count: usize) {
        debug_assert!(count <= self.capacity());
        self.write_index = (self.write_index + count) % self.capacity();
    }

    /// Zero all samples and reset both indices.
    pub fn reset(&mut self) {
        for channel in &mut self.channels {
            channel.fill(0.0);
        }
        self.write_index = 0;
        self.read_index = 0;
    }
}

fn copy_into_ring(ring: &mut [f32], start: usize, src: &[f32]) {
    debug_assert!(src.len() <= ring.len());
    let first = src.len().min(ring.len() - start);
    ring[start..start + first].copy_from_slice(&src[..first]);
    ring[..src.len() - first].copy_from_slice(&src[first..]);
}

fn copy_from_ring(ring: &[f32], start: usize, dest: &mut [f32]) {
    debug_assert!(dest.len() <= ring.len());
    let first = dest.len().min(ring.len() - start);
    let count = dest.len();
    dest[..first].copy_from_slice(&ring[start..start + first]);
    dest[first..].copy_from_slice(&ring[..count - first]);
}

// -------------------------------------------------------------------------------------------------
