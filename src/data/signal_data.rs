use std::collections::VecDeque;
use std::sync::Arc;

use log::debug;

use crate::data::segment::Segment;

/// Tolerance, in samples, when mapping edit times onto the sample grid.
const GRID_EPSILON: f64 = 1e-6;

/// Shared surface of the per-signal containers.
pub trait SignalData {
    /// Type-erased handles to every segment, newest first.
    fn segments(&self) -> Vec<Arc<dyn Segment>>;

    fn clear(&mut self);

    /// Largest sample count of any owned segment.
    fn get_max_sample_count(&self) -> u64;
}

/// Segments of one signal, stored newest first.
///
/// Laid end to end from the oldest, the segments form one contiguous
/// timeline that starts at `origin` seconds of capture time. Edit times are
/// capture times: erasing a leading range moves `origin` forward and leaves
/// the remaining samples where they were, erasing an interior range closes
/// the gap.
pub struct SegmentList<S> {
    segments: VecDeque<Arc<S>>,
    origin: f64,
}

impl<S> Default for SegmentList<S> {
    fn default() -> Self {
        Self {
            segments: VecDeque::new(),
            origin: 0.0,
        }
    }
}

impl<S: Segment> SegmentList<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `segment` as the newest.
    pub fn push_segment(&mut self, segment: Arc<S>) {
        self.segments.push_front(segment);
    }

    /// Newest first.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<S>> {
        self.segments.iter()
    }

    /// Timeline order, used by the edit operations.
    pub fn oldest_first(&self) -> impl Iterator<Item = &Arc<S>> {
        self.segments.iter().rev()
    }

    pub fn newest(&self) -> Option<&Arc<S>> {
        self.segments.front()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Capture time of the first retained sample.
    pub fn origin(&self) -> f64 {
        self.origin
    }

    pub fn total_time(&self) -> f64 {
        self.segments.iter().map(|s| s.time()).sum()
    }

    pub fn clear(&mut self) {
        self.segments.clear();
        self.origin = 0.0;
    }

    pub fn get_max_sample_count(&self) -> u64 {
        self.segments
            .iter()
            .map(|s| s.get_sample_count())
            .max()
            .unwrap_or(0)
    }

    /// Clamps an edit range to the stored timeline. `None` when nothing is
    /// left to erase.
    fn normalize(&self, start_time: f64, end_time: f64) -> Option<(f64, f64)> {
        if self.segments.is_empty() {
            return None;
        }
        let timeline_end = self.origin + self.total_time();
        let start = start_time.max(0.0).clamp(self.origin, timeline_end);
        let end = end_time.max(0.0).clamp(self.origin, timeline_end);
        (start < end).then_some((start, end))
    }

    /// Erases every sample in `[start_time, end_time)`.
    pub fn remove(&mut self, start_time: f64, end_time: f64) {
        if let Some((start, end)) = self.normalize(start_time, end_time) {
            self.erase(start, end);
        }
    }

    /// Erases everything outside `[start_time, end_time]`.
    pub fn crop(&mut self, start_time: f64, end_time: f64) {
        let Some((start, end)) = self.normalize(start_time, end_time) else {
            return;
        };
        let timeline_end = self.origin + self.total_time();
        if end < timeline_end {
            self.erase(end, timeline_end);
        }
        if start > self.origin {
            self.erase(self.origin, start);
        }
    }

    fn erase(&mut self, start: f64, end: f64) {
        debug!("erasing {start}s..{end}s from {} segments", self.segments.len());
        let leading = start <= self.origin;
        let mut doomed = Vec::new();
        let mut seg_start = self.origin;
        // Capture time just past the last erased sample.
        let mut erased_to = self.origin;

        // Storage is newest first; walk positions from the back.
        for pos in (0..self.segments.len()).rev() {
            let segment = &self.segments[pos];
            let seg_end = seg_start + segment.time();
            let overlap = (start.max(seg_start), end.min(seg_end));
            let offset = seg_start;
            seg_start = seg_end;

            if overlap.0 >= overlap.1 {
                if offset >= end {
                    break;
                }
                continue;
            }

            let rate = segment.samplerate() as f64;
            let count = segment.get_sample_count();
            let first = if overlap.0 <= offset {
                0
            } else {
                sample_index(overlap.0 - offset, rate, count)
            };
            let last = if overlap.1 >= seg_end {
                count
            } else {
                sample_index(overlap.1 - offset, rate, count)
            };
            erased_to = offset + last as f64 / rate;

            if first == 0 && last == count {
                doomed.push(pos);
            } else if first < last {
                segment.remove_samples(first, last);
            }
        }

        // Positions were collected in descending order, so earlier removals
        // do not shift later ones.
        for pos in doomed {
            debug!("dropping whole segment at position {pos}");
            self.segments.remove(pos);
        }

        if self.segments.is_empty() {
            self.origin = 0.0;
        } else if leading {
            self.origin = erased_to;
        }
    }
}

/// Index of the sample that covers `offset` seconds into a segment, clamped
/// to `count`. Offsets just below a sample boundary snap onto it, so a time computed from a sample index maps back to it.
fn sample_index(offset: f64, rate: f64, count: u64) -> u64 {
    ((offset * rate + GRID_EPSILON).floor().max(0.0) as u64).min(count)
}

impl<S: Segment + 'static> SegmentList<S> {
    pub fn erased(&self) -> Vec<Arc<dyn Segment>> {
        self.segments
            .iter()
            .map(|s| Arc::clone(s) as Arc<dyn Segment>)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::logic_segment::LogicSegment;

    fn list_of(counts: &[usize], samplerate: u64) -> SegmentList<LogicSegment> {
        let mut list = SegmentList::new();
        for (i, &count) in counts.iter().enumerate() {
            let payload: Vec<u8> = (0..count).map(|n| (n % 251) as u8).collect();
            let segment = LogicSegment::with_payload(samplerate, 1, i as f64, 0, &payload);
            list.push_segment(Arc::new(segment));
        }
        list
    }

    fn counts(list: &SegmentList<LogicSegment>) -> Vec<u64> {
        list.oldest_first().map(|s| s.get_sample_count()).collect()
    }

    #[test]
    fn push_keeps_newest_first() {
        let list = list_of(&[10, 20, 30], 10);
        let newest: Vec<u64> = list.iter().map(|s| s.get_sample_count()).collect();
        assert_eq!(newest, vec![30, 20, 10]);
        assert_eq!(counts(&list), vec![10, 20, 30]);
        assert_eq!(list.get_max_sample_count(), 30);
        assert_eq!(list.total_time(), 6.0);
    }

    #[test]
    fn removing_whole_duration_drops_the_segment() {
        let mut list = list_of(&[64], 1_000);
        let duration = list.total_time();
        list.remove(0.0, duration);
        assert!(list.is_empty());
        assert_eq!(list.get_max_sample_count(), 0);
    }

    #[test]
    fn interior_remove_shortens_one_segment() {
        let mut list = list_of(&[100], 100);
        list.remove(0.25, 0.5);
        assert_eq!(counts(&list), vec![75]);
        let segment = list.newest().unwrap();
        assert_eq!(segment.get_sample(24), 24);
        assert_eq!(segment.get_sample(25), 50);
        assert_eq!(list.origin(), 0.0);
    }

    #[test]
    fn remove_spanning_segments() {
        // Timeline: [0,1) [1,3) [3,4) at 10 Hz.
        let mut list = list_of(&[10, 20, 10], 10);
        list.remove(0.5, 3.5);
        assert_eq!(counts(&list), vec![5, 5]);
        let oldest = list.oldest_first().next().unwrap();
        assert_eq!(oldest.get_sample(4), 4);
        let newest = list.newest().unwrap();
        assert_eq!(newest.get_sample(0), 5);
    }

    #[test]
    fn negative_and_overlong_ranges_are_clamped() {
        let mut list = list_of(&[10, 10], 10);
        list.remove(-3.0, 1.0);
        assert_eq!(counts(&list), vec![10]);
        assert_eq!(list.origin(), 1.0);
        list.remove(1.5, 99.0);
        assert_eq!(counts(&list), vec![5]);
    }

    #[test]
    fn empty_and_inverted_ranges_are_ignored() {
        let mut list = list_of(&[10], 10);
        list.remove(0.5, 0.5);
        list.remove(0.8, 0.2);
        list.crop(0.7, 0.1);
        assert_eq!(counts(&list), vec![10]);

        let mut empty: SegmentList<LogicSegment> = SegmentList::new();
        empty.remove(0.0, 1.0);
        empty.crop(0.0, 1.0);
        assert!(empty.is_empty());
    }

    #[test]
    fn crop_keeps_only_the_window() {
        let mut list = list_of(&[10, 20, 10], 10);
        list.crop(0.5, 3.5);
        assert_eq!(counts(&list), vec![5, 20, 5]);
        assert_eq!(list.origin(), 0.5);
        assert_eq!(list.oldest_first().next().unwrap().get_sample(0), 5);
    }

    #[test]
    fn crop_is_idempotent() {
        let mut list = list_of(&[37, 120, 64], 16);
        list.crop(1.0, 9.0);
        let once = counts(&list);
        let origin = list.origin();
        list.crop(1.0, 9.0);
        assert_eq!(counts(&list), once);
        assert_eq!(list.origin(), origin);
    }

    #[test]
    fn crop_off_the_sample_grid_is_idempotent() {
        let mut list = list_of(&[100], 10);
        list.crop(0.25, 0.71);
        assert_eq!(counts(&list), vec![5]);
        // The first kept sample is index 2, at 0.2s.
        assert!((list.origin() - 0.2).abs() < 1e-12);
        assert_eq!(list.newest().unwrap().get_sample(0), 2);

        list.crop(0.25, 0.71);
        assert_eq!(counts(&list), vec![5]);
        assert!((list.origin() - 0.2).abs() < 1e-12);
    }

    #[test]
    fn crop_off_the_grid_across_segments_is_idempotent() {
        // Timeline: [0,3.7) [3.7,15.7) [15.7,22.1) at 10 Hz.
        let mut list = list_of(&[37, 120, 64], 10);
        list.crop(2.55, 13.33);
        assert_eq!(counts(&list), vec![12, 96]);
        assert!((list.origin() - 2.5).abs() < 1e-12);

        for _ in 0..3 {
            list.crop(2.55, 13.33);
            assert_eq!(counts(&list), vec![12, 96]);
            assert!((list.origin() - 2.5).abs() < 1e-12);
        }
    }

    #[test]
    fn origin_lands_on_first_kept_sample() {
        let mut list = list_of(&[30, 30], 3);
        // Seconds [0,10) and [10,20); the cut falls inside sample 16.
        list.remove(0.0, 5.5);
        assert_eq!(counts(&list), vec![14, 30]);
        assert!((list.origin() - 16.0 / 3.0).abs() < 1e-9);
        list.remove(0.0, 16.0 / 3.0);
        assert_eq!(counts(&list), vec![14, 30]);
    }

    #[test]
    fn crop_to_full_timeline_is_a_no_op() {
        let mut list = list_of(&[37, 120, 64], 16);
        let total = list.total_time();
        list.crop(0.0, total);
        assert_eq!(counts(&list), vec![37, 120, 64]);
    }

    #[test]
    fn erased_handles_share_segments() {
        let list = list_of(&[3, 4], 10);
        let handles = list.erased();
        assert_eq!(handles.len(), 2);
        assert_eq!(handles[0].get_sample_count(), 4);
    }
}
