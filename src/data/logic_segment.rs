use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use log::{debug, trace};

use crate::data::segment::{
    lock_state, pack_sample, pow2_ceil, unpack_sample, SampleBuffer, Segment, MAX_UNIT_SIZE,
};

pub const MIP_MAP_SCALE_POWER: u32 = 4;
pub const MIP_MAP_SCALE_FACTOR: u64 = 1 << MIP_MAP_SCALE_POWER;
/// Number of mip-map levels; the top level spans 16^10 samples per word.
pub const SCALE_STEP_COUNT: usize = 10;
/// Allocation granularity of a mip-map level, in words.
const MIP_MAP_DATA_UNIT: u64 = 64 * 1024;
const SCALE_MASK: u64 = MIP_MAP_SCALE_FACTOR - 1;

/// `(sample_index, level)` pair describing the state of one channel.
pub type EdgePair = (u64, bool);

#[derive(Clone, Debug, Default)]
struct MipMapLevel {
    /// Valid words.
    length: u64,
    /// Allocated words, a multiple of `MIP_MAP_DATA_UNIT`.
    data_length: u64,
    data: Vec<u8>,
}

impl MipMapLevel {
    fn is_allocated(&self) -> bool {
        self.data_length > 0
    }

    fn reallocate(&mut self, unit_size: usize) {
        let new_data_length = (self.length + MIP_MAP_DATA_UNIT - 1) / MIP_MAP_DATA_UNIT
            * MIP_MAP_DATA_UNIT;
        if new_data_length > self.data_length {
            self.data_length = new_data_length;
            self.data.resize(new_data_length as usize * unit_size, 0);
        }
    }

    fn word(&self, offset: u64, unit_size: usize) -> u64 {
        unpack_sample(&self.data[offset as usize * unit_size..], unit_size)
    }
}

struct LogicState {
    buffer: SampleBuffer,
    mip_map: [MipMapLevel; SCALE_STEP_COUNT],
    /// Last sample folded into level 0; carried across appends so the first
    /// block of a new payload sees the transition from the previous one.
    last_append_sample: u64,
    /// Bumped whenever samples are removed. Edge iterators stop once it
    /// moves past the value they started with.
    generation: u64,
}

impl LogicState {
    fn sample(&self, index: u64) -> u64 {
        self.buffer.sample(index)
    }

    fn bit(&self, index: u64, mask: u64) -> bool {
        self.sample(index) & mask != 0
    }

    fn subsample(&self, level: usize, offset: u64) -> u64 {
        debug_assert!(self.mip_map[level].is_allocated());
        self.mip_map[level].word(offset, self.buffer.unit_size())
    }

    /// Extends every mip-map level to cover the samples appended since the
    /// last call. Only words past each level's previous length are written.
    fn append_payload_to_mipmap(&mut self) {
        let LogicState {
            buffer,
            mip_map,
            last_append_sample,
            ..
        } = self;
        let unit_size = buffer.unit_size();

        let m0 = &mut mip_map[0];
        let prev_length = m0.length;
        m0.length = buffer.sample_count() / MIP_MAP_SCALE_FACTOR;
        if m0.length == prev_length {
            return;
        }
        m0.reallocate(unit_size);

        let src = buffer.bytes(
            prev_length * MIP_MAP_SCALE_FACTOR,
            m0.length * MIP_MAP_SCALE_FACTOR,
        );
        let mut dest = prev_length as usize * unit_size;
        for block in src.chunks_exact(MIP_MAP_SCALE_FACTOR as usize * unit_size) {
            let mut accumulator = 0;
            for raw in block.chunks_exact(unit_size) {
                let sample = unpack_sample(raw, unit_size);
                accumulator |= *last_append_sample ^ sample;
                *last_append_sample = sample;
            }
            pack_sample(&mut m0.data[dest..], unit_size, accumulator);
            dest += unit_size;
        }

        for level in 1..SCALE_STEP_COUNT {
            let (lower, upper) = mip_map.split_at_mut(level);
            let ml = &lower[level - 1];
            let m = &mut upper[0];

            let prev_length = m.length;
            m.length = ml.length / MIP_MAP_SCALE_FACTOR;
            if m.length == prev_length {
                break;
            }
            m.reallocate(unit_size);

            for offset in prev_length..m.length {
                let first = offset * MIP_MAP_SCALE_FACTOR;
                let accumulator = (first..first + MIP_MAP_SCALE_FACTOR)
                    .fold(0, |acc, child| acc | ml.word(child, unit_size));
                pack_sample(&mut m.data[offset as usize * unit_size..], unit_size, accumulator);
            }
        }
    }
}

/// Multi-channel boolean trace. Bit `k` of each packed sample is the state
/// of channel `k`.
///
/// Alongside the raw samples the segment keeps a mip-map pyramid: a level-0
/// word has bit `k` set when channel `k` changed anywhere in its 16 samples,
/// and each higher level ORs 16 words of the level below. Edge queries use
/// it to skip quiet stretches without touching the raw data.
pub struct LogicSegment {
    samplerate: u64,
    unit_size: usize,
    start_time: f64,
    complete: AtomicBool,
    state: Mutex<LogicState>,
}

impl LogicSegment {
    pub fn new(samplerate: u64, unit_size: usize, start_time: f64) -> Self {
        assert!(samplerate > 0, "logic segment needs a positive sample rate");
        debug!("new logic segment: {samplerate} Hz, {unit_size}-byte samples at {start_time}s");
        Self {
            samplerate,
            unit_size,
            start_time,
            complete: AtomicBool::new(false),
            state: Mutex::new(LogicState {
                buffer: SampleBuffer::new(unit_size),
                mip_map: Default::default(),
                last_append_sample: 0,
                generation: 0,
            }),
        }
    }

    /// Creates a segment pre-sized for `expected_samples` and seeded with
    /// `payload`.
    pub fn with_payload(
        samplerate: u64,
        unit_size: usize,
        start_time: f64,
        expected_samples: u64,
        payload: &[u8],
    ) -> Self {
        let segment = Self::new(samplerate, unit_size, start_time);
        segment.set_capacity(expected_samples);
        segment.append_payload(payload, unit_size);
        segment
    }

    fn lock(&self) -> MutexGuard<'_, LogicState> {
        lock_state(&self.state)
    }

    pub fn set_capacity(&self, expected_samples: u64) {
        self.lock().buffer.set_capacity(expected_samples);
    }

    /// Appends packed samples and extends the mip-map over them.
    pub fn append_payload(&self, payload: &[u8], unit_size: usize) {
        assert_eq!(unit_size, self.unit_size, "payload unit size mismatch");
        assert_eq!(
            payload.len() % self.unit_size,
            0,
            "payload not aligned to unit size"
        );
        assert!(!self.is_complete(), "append to a completed logic segment");

        let mut state = self.lock();
        let added = state.buffer.append_data(payload);
        state.append_payload_to_mipmap();
        trace!(
            "logic append: {added} samples, {} total",
            state.buffer.sample_count()
        );
    }

    /// Copies the packed samples `[start, end)`.
    pub fn get_samples(&self, start: u64, end: u64) -> Vec<u8> {
        self.lock().buffer.bytes(start, end).to_vec()
    }

    pub fn get_sample(&self, index: u64) -> u64 {
        self.lock().sample(index)
    }

    pub fn set_complete(&self) {
        self.complete.store(true, Ordering::Release);
    }

    /// Valid word count of every mip-map level, lowest first.
    pub fn mip_map_lengths(&self) -> [u64; SCALE_STEP_COUNT] {
        let state = self.lock();
        std::array::from_fn(|level| state.mip_map[level].length)
    }

    /// Copy of the valid words of one mip-map level.
    pub fn mip_map_level(&self, level: usize) -> Vec<u64> {
        let state = self.lock();
        (0..state.mip_map[level].length)
            .map(|offset| state.subsample(level, offset))
            .collect()
    }

    /// Transitions of channel `sig_index` over the inclusive sample range
    /// `[start, end]`, coarsened so that no two edges are closer than
    /// `min_length` samples unless the mip-map forces it.
    ///
    /// The iterator yields the initial state at `start`, one pair per
    /// resolvable transition carrying the level after it, the final state at
    /// `end` when it differs from the last edge, and a terminal pair at
    /// `end + 1`.
    ///
    /// Every step runs under the segment lock, but the lock is released
    /// between steps, so the segment may be read or appended to while the
    /// iterator is alive. Removing samples ends the iteration.
    pub fn subsampled_edges(
        &self,
        start: u64,
        end: u64,
        min_length: f32,
        sig_index: usize,
    ) -> SubsampledEdges<'_> {
        let state = self.lock();
        assert!(
            end < state.buffer.sample_count(),
            "edge query end {end} past last sample"
        );
        assert!(start <= end, "inverted edge query {start}..{end}");
        assert!(
            min_length > 0.0 && min_length.is_finite(),
            "edge query resolution must be positive and finite, got {min_length}"
        );
        assert!(sig_index < MAX_UNIT_SIZE * 8, "channel {sig_index} out of range");

        let log_scale_factor = (MIP_MAP_SCALE_FACTOR as f32).ln();
        let min_level = ((min_length.ln() / log_scale_factor).floor() as i32 - 1)
            .clamp(0, SCALE_STEP_COUNT as i32 - 1) as usize;

        SubsampledEdges {
            segment: self,
            generation: state.generation,
            index: start,
            end,
            min_length,
            block_length: min_length.max(1.0) as u64,
            min_level,
            sig_mask: 1u64 << sig_index,
            last_sample: false,
            phase: EdgePhase::Initial,
        }
    }

    /// Appends the output of [`subsampled_edges`](Self::subsampled_edges)
    /// to `edges`.
    pub fn get_subsampled_edges(
        &self,
        edges: &mut Vec<EdgePair>,
        start: u64,
        end: u64,
        min_length: f32,
        sig_index: usize,
    ) {
        edges.extend(self.subsampled_edges(start, end, min_length, sig_index));
    }
}

impl Segment for LogicSegment {
    fn get_sample_count(&self) -> u64 {
        self.lock().buffer.sample_count()
    }

    fn samplerate(&self) -> u64 {
        self.samplerate
    }

    fn unit_size(&self) -> usize {
        self.unit_size
    }

    fn start_time(&self) -> f64 {
        self.start_time
    }

    /// Drops the whole mip-map and rebuilds it from the remaining samples.
    fn remove_samples(&self, start: u64, end: u64) {
        let mut state = self.lock();
        state.buffer.remove(start, end);
        state.mip_map = Default::default();
        state.last_append_sample = 0;
        state.generation += 1;
        state.append_payload_to_mipmap();
        debug!(
            "logic segment: removed samples {start}..{end}, rebuilt mip-map over {} samples",
            state.buffer.sample_count()
        );
    }

    fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum EdgePhase {
    Initial,
    Searching,
    Final,
    Terminal,
    Done,
}

/// Lazy edge sequence returned by [`LogicSegment::subsampled_edges`].
pub struct SubsampledEdges<'a> {
    segment: &'a LogicSegment,
    generation: u64,
    index: u64,
    end: u64,
    min_length: f32,
    block_length: u64,
    min_level: usize,
    sig_mask: u64,
    last_sample: bool,
    phase: EdgePhase,
}

impl SubsampledEdges<'_> {
    /// Advances to the next quantization block that carries a change and
    /// returns its start with the level of its last sample. `None` once the
    /// next block would run past `end`.
    fn next_block(&mut self, state: &LogicState) -> Option<EdgePair> {
        if self.index.saturating_add(self.block_length) > self.end {
            return None;
        }
        let mask = self.sig_mask;
        let fine = self.min_length < MIP_MAP_SCALE_FACTOR as f32;
        let mut level = self.min_level;

        // No fast-forward without mip-map data at the minimum level.
        let mut fast_forward = state.mip_map[level].is_allocated();

        if fine {
            // Walk single samples up to the next level-0 block boundary.
            let final_index = self.end.min(pow2_ceil(self.index, MIP_MAP_SCALE_POWER));
            while self.index < final_index && self.index & SCALE_MASK != 0 {
                if state.bit(self.index, mask) != self.last_sample {
                    fast_forward = false;
                    break;
                }
                self.index += 1;
            }
        } else {
            // Snap to the start of the next block at this level of detail.
            self.index = pow2_ceil(self.index, (level as u32 + 1) * MIP_MAP_SCALE_POWER);
            if self.index >= self.end {
                return None;
            }
            if state.bit(self.index, mask) != self.last_sample {
                fast_forward = false;
            }
        }

        if fast_forward {
            // Slide right and zoom out at block starts until a block shows a
            // change or the pyramid runs out.
            loop {
                let level_scale_power = (level as u32 + 1) * MIP_MAP_SCALE_POWER;
                let offset = self.index >> level_scale_power;
                if offset >= state.mip_map[level].length
                    || state.subsample(level, offset) & mask != 0
                {
                    break;
                }
                if offset & SCALE_MASK == 0 {
                    if level + 1 >= SCALE_STEP_COUNT || !state.mip_map[level + 1].is_allocated() {
                        break;
                    }
                    level += 1;
                } else {
                    self.index = pow2_ceil(self.index + 1, level_scale_power);
                }
            }

            // Zoom back in, sliding past quiet sub-blocks, down to min_level.
            loop {
                let level_scale_power = (level as u32 + 1) * MIP_MAP_SCALE_POWER;
                let offset = self.index >> level_scale_power;
                if offset >= state.mip_map[level].length
                    || state.subsample(level, offset) & mask != 0
                {
                    if level == self.min_level {
                        break;
                    }
                    level -= 1;
                } else {
                    self.index = pow2_ceil(self.index + 1, level_scale_power);
                }
            }

            if fine {
                while self.index < self.end {
                    if state.bit(self.index, mask) != self.last_sample {
                        break;
                    }
                    self.index += 1;
                }
            }
        }

        // A block reports the level of its last sample.
        let final_index = self.index.saturating_add(self.block_length);
        if final_index > self.end {
            return None;
        }
        let edge = (self.index, state.bit(final_index - 1, mask));
        self.index = final_index;
        Some(edge)
    }
}

impl Iterator for SubsampledEdges<'_> {
    type Item = EdgePair;

    fn next(&mut self) -> Option<EdgePair> {
        if self.phase == EdgePhase::Done {
            return None;
        }
        let segment = self.segment;
        let state = segment.lock();
        if state.generation != self.generation {
            trace!("edge iteration stopped: samples removed");
            self.phase = EdgePhase::Done;
            return None;
        }
        loop {
            match self.phase {
                EdgePhase::Initial => {
                    let start = self.index;
                    self.last_sample = state.bit(start, self.sig_mask);
                    self.index += 1;
                    self.phase = EdgePhase::Searching;
                    return Some((start, self.last_sample));
                }
                EdgePhase::Searching => match self.next_block(&state) {
                    Some((index, level)) if level != self.last_sample => {
                        self.last_sample = level;
                        return Some((index, level));
                    }
                    Some(_) => {}
                    None => self.phase = EdgePhase::Final,
                },
                EdgePhase::Final => {
                    self.phase = EdgePhase::Terminal;
                    let end_sample = state.bit(self.end, self.sig_mask);
                    if end_sample != self.last_sample {
                        self.last_sample = end_sample;
                        return Some((self.end, end_sample));
                    }
                }
                EdgePhase::Terminal => {
                    self.phase = EdgePhase::Done;
                    return Some((self.end + 1, self.last_sample));
                }
                EdgePhase::Done => return None,
            }
        }
    }
}
