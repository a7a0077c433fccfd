use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use log::{debug, trace};

use crate::data::segment::{lock_state, SampleBuffer, Segment};

pub const ENVELOPE_SCALE_POWER: u32 = 4;
pub const ENVELOPE_SCALE_FACTOR: u64 = 1 << ENVELOPE_SCALE_POWER;
pub const SCALE_STEP_COUNT: usize = 10;
/// Allocation granularity of an envelope level, in entries.
const ENVELOPE_DATA_UNIT: u64 = 64 * 1024;
const FLOAT_SIZE: usize = std::mem::size_of::<f32>();

/// Value range of one envelope window.
///
/// A window holding a NaN sample is a gap: both bounds are NaN, and every
/// coarser entry that covers it is a gap too.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EnvelopeSample {
    pub min: f32,
    pub max: f32,
}

impl EnvelopeSample {
    const EMPTY: EnvelopeSample = EnvelopeSample {
        min: f32::INFINITY,
        max: f32::NEG_INFINITY,
    };
    const GAP: EnvelopeSample = EnvelopeSample {
        min: f32::NAN,
        max: f32::NAN,
    };

    pub fn is_gap(&self) -> bool {
        self.min.is_nan() || self.max.is_nan()
    }

    fn widen(self, min: f32, max: f32) -> Self {
        if self.is_gap() || min.is_nan() || max.is_nan() {
            return Self::GAP;
        }
        EnvelopeSample {
            min: self.min.min(min),
            max: self.max.max(max),
        }
    }

    fn of(values: impl IntoIterator<Item = f32>) -> Self {
        values.into_iter().fold(Self::EMPTY, |acc, v| acc.widen(v, v))
    }

    fn merge(children: &[EnvelopeSample]) -> Self {
        children
            .iter()
            .fold(Self::EMPTY, |acc, s| acc.widen(s.min, s.max))
    }
}

/// Copied run of envelope entries covering part of a segment.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EnvelopeSection {
    /// Raw index of the first sample covered by `samples[0]`.
    pub start: u64,
    /// Raw samples per entry.
    pub scale: u64,
    pub length: u64,
    pub samples: Vec<EnvelopeSample>,
}

/// What a renderer should draw for a window of an analog trace.
#[derive(Clone, Debug, PartialEq)]
pub enum AnalogPlot {
    /// Zoomed in far enough to plot individual samples.
    Samples(Vec<f32>),
    /// Zoomed out; paint min/max bars.
    Envelope(EnvelopeSection),
}

#[derive(Clone, Debug, Default)]
struct Envelope {
    length: u64,
    data_length: u64,
    samples: Vec<EnvelopeSample>,
}

impl Envelope {
    fn reallocate(&mut self) {
        let new_data_length = (self.length + ENVELOPE_DATA_UNIT - 1) / ENVELOPE_DATA_UNIT
            * ENVELOPE_DATA_UNIT;
        if new_data_length > self.data_length {
            self.data_length = new_data_length;
            self.samples.reserve(new_data_length as usize - self.samples.len());
        }
    }
}

fn decode(raw: &[u8]) -> impl Iterator<Item = f32> + '_ {
    raw.chunks_exact(FLOAT_SIZE)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

struct AnalogState {
    buffer: SampleBuffer,
    envelope_levels: [Envelope; SCALE_STEP_COUNT],
}

impl AnalogState {
    fn append_payload_to_envelope_levels(&mut self) {
        let AnalogState {
            buffer,
            envelope_levels,
        } = self;

        let e0 = &mut envelope_levels[0];
        let prev_length = e0.length;
        e0.length = buffer.sample_count() / ENVELOPE_SCALE_FACTOR;
        if e0.length == prev_length {
            return;
        }
        e0.reallocate();

        let src = buffer.bytes(
            prev_length * ENVELOPE_SCALE_FACTOR,
            e0.length * ENVELOPE_SCALE_FACTOR,
        );
        e0.samples.extend(
            src.chunks_exact(ENVELOPE_SCALE_FACTOR as usize * FLOAT_SIZE)
                .map(|window| EnvelopeSample::of(decode(window))),
        );

        for level in 1..SCALE_STEP_COUNT {
            let (lower, upper) = envelope_levels.split_at_mut(level);
            let el = &lower[level - 1];
            let e = &mut upper[0];

            let prev_length = e.length;
            e.length = el.length / ENVELOPE_SCALE_FACTOR;
            if e.length == prev_length {
                break;
            }
            e.reallocate();

            let first = (prev_length * ENVELOPE_SCALE_FACTOR) as usize;
            let last = (e.length * ENVELOPE_SCALE_FACTOR) as usize;
            e.samples.extend(
                el.samples[first..last]
                    .chunks_exact(ENVELOPE_SCALE_FACTOR as usize)
                    .map(EnvelopeSample::merge),
            );
        }
    }
}

/// Floating-point trace with a min/max envelope pyramid. Each level-0 entry
/// bounds 16 raw samples, each higher entry bounds 16 entries below it.
pub struct AnalogSegment {
    samplerate: u64,
    start_time: f64,
    complete: AtomicBool,
    state: Mutex<AnalogState>,
}

impl AnalogSegment {
    pub fn new(samplerate: u64, start_time: f64) -> Self {
        assert!(samplerate > 0, "analog segment needs a positive sample rate");
        debug!("new analog segment: {samplerate} Hz at {start_time}s");
        Self {
            samplerate,
            start_time,
            complete: AtomicBool::new(false),
            state: Mutex::new(AnalogState {
                buffer: SampleBuffer::new(FLOAT_SIZE),
                envelope_levels: Default::default(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AnalogState> {
        lock_state(&self.state)
    }

    pub fn set_capacity(&self, expected_samples: u64) {
        self.lock().buffer.set_capacity(expected_samples);
    }

    pub fn append_payload(&self, samples: &[f32]) {
        assert!(!self.is_complete(), "append to a completed analog segment");
        let payload: Vec<u8> = samples.iter().flat_map(|v| v.to_le_bytes()).collect();

        let mut state = self.lock();
        state.buffer.append_data(&payload);
        state.append_payload_to_envelope_levels();
        trace!(
            "analog append: {} samples, {} total",
            samples.len(),
            state.buffer.sample_count()
        );
    }

    /// Copies the raw samples `[start, end)`.
    pub fn get_samples(&self, start: u64, end: u64) -> Vec<f32> {
        decode(self.lock().buffer.bytes(start, end)).collect()
    }

    pub fn get_sample(&self, index: u64) -> f32 {
        f32::from_bits(self.lock().buffer.sample(index) as u32)
    }

    /// Envelope entries covering `[start, end)` at the coarsest level whose
    /// window does not exceed `samples_per_pixel`.
    pub fn get_envelope_section(
        &self,
        start: u64,
        end: u64,
        samples_per_pixel: f32,
    ) -> EnvelopeSection {
        assert!(start <= end, "inverted envelope query {start}..{end}");
        assert!(samples_per_pixel > 0.0, "envelope resolution must be positive");

        let state = self.lock();
        assert!(
            end <= state.buffer.sample_count(),
            "envelope query end {end} past sample count"
        );

        let log_scale_factor = (ENVELOPE_SCALE_FACTOR as f32).ln();
        let min_level = ((samples_per_pixel.ln() / log_scale_factor).floor() as i32 - 1)
            .clamp(0, SCALE_STEP_COUNT as i32 - 1) as usize;
        let scale_power = (min_level as u32 + 1) * ENVELOPE_SCALE_POWER;
        let level = &state.envelope_levels[min_level];

        let first = (start >> scale_power).min(level.length);
        let last = (end >> scale_power).clamp(first, level.length);
        EnvelopeSection {
            start: first << scale_power,
            scale: 1 << scale_power,
            length: last - first,
            samples: level.samples[first as usize..last as usize].to_vec(),
        }
    }

    /// Raw samples below `envelope_threshold` samples per pixel, envelope
    /// entries at or above it.
    pub fn plot_data(
        &self,
        start: u64,
        end: u64,
        samples_per_pixel: f32,
        envelope_threshold: f32,
    ) -> AnalogPlot {
        if samples_per_pixel < envelope_threshold {
            AnalogPlot::Samples(self.get_samples(start, end))
        } else {
            AnalogPlot::Envelope(self.get_envelope_section(start, end, samples_per_pixel))
        }
    }

    pub fn set_complete(&self) {
        self.complete.store(true, Ordering::Release);
    }

    pub fn envelope_lengths(&self) -> [u64; SCALE_STEP_COUNT] {
        let state = self.lock();
        std::array::from_fn(|level| state.envelope_levels[level].length)
    }

    pub fn envelope_level(&self, level: usize) -> Vec<EnvelopeSample> {
        self.lock().envelope_levels[level].samples.clone()
    }
}

impl Segment for AnalogSegment {
    fn get_sample_count(&self) -> u64 {
        self.lock().buffer.sample_count()
    }

    fn samplerate(&self) -> u64 {
        self.samplerate
    }

    fn unit_size(&self) -> usize {
        FLOAT_SIZE
    }

    fn start_time(&self) -> f64 {
        self.start_time
    }

    fn remove_samples(&self, start: u64, end: u64) {
        let mut state = self.lock();
        state.buffer.remove(start, end);
        state.envelope_levels = Default::default();
        state.append_payload_to_envelope_levels();
        debug!(
            "analog segment: removed samples {start}..{end}, rebuilt envelopes over {} samples",
            state.buffer.sample_count()
        );
    }

    fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }
}
