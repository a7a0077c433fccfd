use std::sync::{Mutex, MutexGuard};

/// Widest packed sample: one bit per channel, up to 64 channels.
pub const MAX_UNIT_SIZE: usize = 8;

/// Reads a little-endian word of `unit_size` bytes from the front of `bytes`.
pub fn unpack_sample(bytes: &[u8], unit_size: usize) -> u64 {
    bytes[..unit_size]
        .iter()
        .rev()
        .fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

/// Writes the low `unit_size` bytes of `value` to the front of `bytes`,
/// least significant byte first.
pub fn pack_sample(bytes: &mut [u8], unit_size: usize, value: u64) {
    for (i, b) in bytes[..unit_size].iter_mut().enumerate() {
        *b = (value >> (8 * i)) as u8;
    }
}

/// Rounds `x` up to the next multiple of `2^power`.
pub fn pow2_ceil(x: u64, power: u32) -> u64 {
    let p = 1u64 << power;
    (x + p - 1) / p * p
}

/// Append-only store of fixed-width samples.
///
/// `sample_count` always equals `data.len() / unit_size`.
#[derive(Clone, Debug)]
pub struct SampleBuffer {
    data: Vec<u8>,
    unit_size: usize,
    sample_count: u64,
}

impl SampleBuffer {
    pub fn new(unit_size: usize) -> Self {
        assert!(
            (1..=MAX_UNIT_SIZE).contains(&unit_size),
            "unit size {unit_size} out of range"
        );
        Self {
            data: Vec::new(),
            unit_size,
            sample_count: 0,
        }
    }

    pub fn unit_size(&self) -> usize {
        self.unit_size
    }

    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    /// Pre-sizes the buffer for `expected` samples in total.
    pub fn set_capacity(&mut self, expected: u64) {
        let wanted = expected as usize * self.unit_size;
        if wanted > self.data.len() {
            self.data.reserve(wanted - self.data.len());
        }
    }

    /// Copies whole samples from `payload` to the end of the buffer and
    /// returns how many were added.
    pub fn append_data(&mut self, payload: &[u8]) -> u64 {
        assert_eq!(
            payload.len() % self.unit_size,
            0,
            "payload not aligned to unit size"
        );
        self.data.extend_from_slice(payload);
        let added = (payload.len() / self.unit_size) as u64;
        self.sample_count += added;
        added
    }

    pub fn sample(&self, index: u64) -> u64 {
        assert!(
            index < self.sample_count,
            "sample {index} out of range ({} samples)",
            self.sample_count
        );
        let offset = index as usize * self.unit_size;
        unpack_sample(&self.data[offset..], self.unit_size)
    }

    /// Raw bytes of samples `[start, end)`.
    pub fn bytes(&self, start: u64, end: u64) -> &[u8] {
        assert!(start <= end, "inverted range {start}..{end}");
        assert!(end <= self.sample_count, "range end {end} past sample count");
        &self.data[start as usize * self.unit_size..end as usize * self.unit_size]
    }

    /// Deletes samples `[start, end)` and shifts the tail down.
    pub fn remove(&mut self, start: u64, end: u64) {
        assert!(start <= end, "inverted range {start}..{end}");
        assert!(end <= self.sample_count, "range end {end} past sample count");
        self.data
            .drain(start as usize * self.unit_size..end as usize * self.unit_size);
        self.sample_count -= end - start;
    }
}

/// Common read contract of logic and analog segments.
///
/// Implementations keep all mutable state behind one lock so any method may
/// be called from the acquisition thread or a render thread.
pub trait Segment: Send + Sync {
    fn get_sample_count(&self) -> u64;

    fn samplerate(&self) -> u64;

    fn unit_size(&self) -> usize;

    /// Capture-relative time of the first sample, in seconds.
    fn start_time(&self) -> f64;

    /// Erases samples `[start, end)` and rebuilds any summary data.
    fn remove_samples(&self, start: u64, end: u64);

    fn is_complete(&self) -> bool;

    /// Duration of the stored samples in seconds.
    fn time(&self) -> f64 {
        self.get_sample_count() as f64 / self.samplerate() as f64
    }
}

/// Locks a segment's state. The state is consistent between statements, so
/// a panic on another thread does not invalidate it.
pub(crate) fn lock_state<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    #[test]
    fn pack_unpack_round_trips_every_width() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut bytes = [0u8; MAX_UNIT_SIZE];
        for unit_size in 1..=MAX_UNIT_SIZE {
            let limit = if unit_size == 8 {
                u64::MAX
            } else {
                (1u64 << (8 * unit_size)) - 1
            };
            for value in [0, 1, limit, limit / 3, rng.gen_range(0..=limit)] {
                pack_sample(&mut bytes, unit_size, value);
                assert_eq!(unpack_sample(&bytes, unit_size), value, "width {unit_size}");
            }
        }
    }

    #[test]
    fn unpack_is_little_endian() {
        assert_eq!(unpack_sample(&[0x34, 0x12, 0xff], 2), 0x1234);
        assert_eq!(unpack_sample(&[0x01, 0, 0, 0, 0, 0, 0, 0x80], 8), 0x8000_0000_0000_0001);
    }

    #[test]
    fn pack_leaves_trailing_bytes_alone() {
        let mut bytes = [0xaa; 4];
        pack_sample(&mut bytes, 3, 0x0102_0304);
        assert_eq!(bytes, [0x04, 0x03, 0x02, 0xaa]);
    }

    #[test]
    fn pow2_ceil_rounds_up_to_multiple() {
        assert_eq!(pow2_ceil(0, 4), 0);
        assert_eq!(pow2_ceil(1, 4), 16);
        assert_eq!(pow2_ceil(16, 4), 16);
        assert_eq!(pow2_ceil(17, 4), 32);
        assert_eq!(pow2_ceil(257, 8), 512);
    }

    #[test]
    fn buffer_tracks_sample_count() {
        let mut buffer = SampleBuffer::new(2);
        buffer.set_capacity(100);
        assert_eq!(buffer.append_data(&[1, 0, 2, 0, 3, 0]), 3);
        assert_eq!(buffer.append_data(&[4, 1]), 1);
        assert_eq!(buffer.sample_count(), 4);
        assert_eq!(buffer.sample(3), 0x0104);
        buffer.remove(1, 3);
        assert_eq!(buffer.sample_count(), 2);
        assert_eq!(buffer.bytes(0, 2), &[1, 0, 4, 1]);
    }

    #[test]
    #[should_panic(expected = "not aligned")]
    fn unaligned_append_panics() {
        let mut buffer = SampleBuffer::new(2);
        buffer.append_data(&[1, 2, 3]);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn reading_past_end_panics() {
        let buffer = SampleBuffer::new(1);
        buffer.sample(0);
    }
}
