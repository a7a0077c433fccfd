use std::sync::Arc;

use crate::data::analog_segment::AnalogSegment;
use crate::data::segment::Segment;
use crate::data::signal_data::{SegmentList, SignalData};

/// All captured frames of one analog input.
#[derive(Default)]
pub struct Analog {
    segments: SegmentList<AnalogSegment>,
}

impl Analog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_segment(&mut self, segment: Arc<AnalogSegment>) {
        self.segments.push_segment(segment);
    }

    /// Newest first.
    pub fn analog_segments(&self) -> &SegmentList<AnalogSegment> {
        &self.segments
    }

    pub fn remove(&mut self, start_time: f64, end_time: f64) {
        self.segments.remove(start_time, end_time);
    }

    pub fn crop(&mut self, start_time: f64, end_time: f64) {
        self.segments.crop(start_time, end_time);
    }
}

impl SignalData for Analog {
    fn segments(&self) -> Vec<Arc<dyn Segment>> {
        self.segments.erased()
    }

    fn clear(&mut self) {
        self.segments.clear();
    }

    fn get_max_sample_count(&self) -> u64 {
        self.segments.get_max_sample_count()
    }
}
