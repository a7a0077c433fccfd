use std::sync::Arc;

use crate::data::logic_segment::LogicSegment;
use crate::data::segment::{Segment, MAX_UNIT_SIZE};
use crate::data::signal_data::{SegmentList, SignalData};

/// All captured frames of one group of logic channels.
pub struct Logic {
    num_channels: u32,
    segments: SegmentList<LogicSegment>,
}

impl Logic {
    pub fn new(num_channels: u32) -> Self {
        assert!(
            num_channels > 0 && num_channels as usize <= MAX_UNIT_SIZE * 8,
            "logic channel count {num_channels} out of range"
        );
        Self {
            num_channels,
            segments: SegmentList::new(),
        }
    }

    pub fn get_num_channels(&self) -> u32 {
        self.num_channels
    }

    pub fn push_segment(&mut self, segment: Arc<LogicSegment>) {
        self.segments.push_segment(segment);
    }

    /// Newest first.
    pub fn logic_segments(&self) -> &SegmentList<LogicSegment> {
        &self.segments
    }

    pub fn remove(&mut self, start_time: f64, end_time: f64) {
        self.segments.remove(start_time, end_time);
    }

    pub fn crop(&mut self, start_time: f64, end_time: f64) {
        self.segments.crop(start_time, end_time);
    }
}

impl SignalData for Logic {
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
