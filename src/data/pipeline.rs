use std::sync::Arc;

use log::debug;

use crate::data::analog::Analog;
use crate::data::analog_segment::AnalogSegment;
use crate::data::config::StoreConfig;
use crate::data::error::StoreError;
use crate::data::logic::Logic;
use crate::data::logic_segment::LogicSegment;
use crate::data::segment::Segment;
use crate::data::source::{BlockSource, SampleBlock};

/// Acquisition side of the store: pulls blocks from a source and appends
/// them to the active logic and analog segments.
///
/// A frame boundary completes the active segments; the next block of either
/// kind opens a fresh segment that starts where the previous frame ended.
pub struct CaptureSession<S: BlockSource> {
    source: S,
    config: StoreConfig,
    logic: Logic,
    analog: Analog,
    active_logic: Option<Arc<LogicSegment>>,
    active_analog: Option<Arc<AnalogSegment>>,
    frame_start: f64,
}

impl<S: BlockSource> CaptureSession<S> {
    pub fn new(source: S, config: StoreConfig) -> Result<Self, StoreError> {
        config.validate()?;
        Ok(Self {
            source,
            logic: Logic::new(config.logic_channels),
            analog: Analog::new(),
            config,
            active_logic: None,
            active_analog: None,
            frame_start: 0.0,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn logic(&self) -> &Logic {
        &self.logic
    }

    pub fn logic_mut(&mut self) -> &mut Logic {
        &mut self.logic
    }

    pub fn analog(&self) -> &Analog {
        &self.analog
    }

    pub fn analog_mut(&mut self) -> &mut Analog {
        &mut self.analog
    }

    /// Appends one block from the source. Returns the number of samples it
    /// carried, or `None` once the source is drained.
    pub fn pump_once(&mut self) -> Result<Option<usize>, StoreError> {
        let Some(block) = self.source.next_block()? else {
            return Ok(None);
        };
        self.push_block(block).map(Some)
    }

    /// Pumps until the source is drained and completes the last frame.
    /// Returns the total number of samples appended.
    pub fn run_to_end(&mut self) -> Result<u64, StoreError> {
        let mut total = 0u64;
        while let Some(count) = self.pump_once()? {
            total += count as u64;
        }
        self.end_frame();
        Ok(total)
    }

    pub fn push_block(&mut self, block: SampleBlock) -> Result<usize, StoreError> {
        block.validate()?;
        let count = block.sample_count();
        match block {
            SampleBlock::Logic { unit_size, data } => {
                let segment = self.active_logic_segment(unit_size)?;
                segment.append_payload(&data, unit_size);
            }
            SampleBlock::Analog { samples } => {
                self.active_analog_segment().append_payload(&samples);
            }
            SampleBlock::FrameEnd => self.end_frame(),
        }
        Ok(count)
    }

    /// Completes the active segments. Later blocks go into new segments.
    pub fn end_frame(&mut self) {
        let logic = self.active_logic.take();
        let analog = self.active_analog.take();
        let mut duration = 0.0f64;
        if let Some(segment) = logic {
            segment.set_complete();
            duration = duration.max(segment.time());
        }
        if let Some(segment) = analog {
            segment.set_complete();
            duration = duration.max(segment.time());
        }
        if duration > 0.0 {
            debug!("frame complete: {duration}s starting at {}s", self.frame_start);
        }
        self.frame_start += duration;
    }

    fn active_logic_segment(&mut self, unit_size: usize) -> Result<Arc<LogicSegment>, StoreError> {
        let expected = self.config.logic_unit_size();
        if unit_size != expected {
            return Err(StoreError::UnitSizeMismatch {
                expected,
                actual: unit_size,
            });
        }
        if let Some(segment) = &self.active_logic {
            return Ok(Arc::clone(segment));
        }
        let segment = Arc::new(LogicSegment::new(
            self.config.samplerate,
            unit_size,
            self.frame_start,
        ));
        segment.set_capacity(self.config.expected_samples);
        self.logic.push_segment(Arc::clone(&segment));
        self.active_logic = Some(Arc::clone(&segment));
        Ok(segment)
    }

    fn active_analog_segment(&mut self) -> Arc<AnalogSegment> {
        if let Some(segment) = &self.active_analog {
            return Arc::clone(segment);
        }
        let segment = Arc::new(AnalogSegment::new(self.config.samplerate, self.frame_start));
        segment.set_capacity(self.config.expected_samples);
        self.analog.push_segment(Arc::clone(&segment));
        self.active_analog = Some(Arc::clone(&segment));
        segment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::signal_data::SignalData;
    use crate::data::source::ManualSource;

    fn config() -> StoreConfig {
        StoreConfig {
            samplerate: 16,
            logic_channels: 4,
            expected_samples: 64,
            ..StoreConfig::default()
        }
    }

    fn logic_block(data: Vec<u8>) -> SampleBlock {
        SampleBlock::Logic { unit_size: 1, data }
    }

    #[test]
    fn session_appends_to_active_segments() {
        let source = ManualSource::new(vec![
            logic_block(vec![0; 16]),
            logic_block(vec![1; 16]),
            SampleBlock::Analog {
                samples: vec![0.5; 20],
            },
        ]);
        let mut session = CaptureSession::new(source, config()).unwrap();
        assert_eq!(session.pump_once().unwrap(), Some(16));
        assert_eq!(session.pump_once().unwrap(), Some(16));
        assert_eq!(session.pump_once().unwrap(), Some(20));
        assert_eq!(session.pump_once().unwrap(), None);

        let segment = session.logic().logic_segments().newest().unwrap();
        assert_eq!(segment.get_sample_count(), 32);
        assert_eq!(segment.mip_map_lengths()[0], 2);
        assert!(!segment.is_complete());
        assert_eq!(session.analog().get_max_sample_count(), 20);
    }

    #[test]
    fn frame_end_opens_new_segments() {
        let source = ManualSource::new(vec![
            logic_block(vec![0; 32]),
            SampleBlock::FrameEnd,
            logic_block(vec![3; 8]),
        ]);
        let mut session = CaptureSession::new(source, config()).unwrap();
        assert_eq!(session.run_to_end().unwrap(), 40);

        let starts: Vec<(f64, u64)> = session
            .logic()
            .logic_segments()
            .oldest_first()
            .map(|s| (s.start_time(), s.get_sample_count()))
            .collect();
        assert_eq!(starts, vec![(0.0, 32), (2.0, 8)]);
        assert!(session
            .logic()
            .logic_segments()
            .iter()
            .all(|s| s.is_complete()));
    }

    #[test]
    fn edits_go_through_the_containers() {
        let source = ManualSource::new(vec![logic_block(vec![0; 64])]);
        let mut session = CaptureSession::new(source, config()).unwrap();
        session.run_to_end().unwrap();
        session.logic_mut().crop(1.0, 3.0);
        assert_eq!(session.logic().get_max_sample_count(), 32);
        session.logic_mut().clear();
        assert_eq!(session.logic().segments().len(), 0);
        session.analog_mut().clear();
    }

    #[test]
    fn rejects_mismatched_unit_size() {
        let source = ManualSource::new(vec![SampleBlock::Logic {
            unit_size: 2,
            data: vec![0; 4],
        }]);
        let mut session = CaptureSession::new(source, config()).unwrap();
        let err = session.pump_once().unwrap_err();
        assert!(matches!(
            err,
            StoreError::UnitSizeMismatch {
                expected: 1,
                actual: 2
            }
        ));
        assert!(session.logic().logic_segments().is_empty());
    }

    #[test]
    fn rejects_unaligned_payload() {
        let mut session = CaptureSession::new(ManualSource::new(vec![]), config()).unwrap();
        let err = session
            .push_block(SampleBlock::Logic {
                unit_size: 2,
                data: vec![0; 3],
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::UnalignedPayload { .. }));
    }

    #[test]
    fn rejects_invalid_config() {
        let bad = StoreConfig {
            samplerate: 0,
            ..StoreConfig::default()
        };
        assert!(matches!(
            CaptureSession::new(ManualSource::new(vec![]), bad),
            Err(StoreError::InvalidSampleRate)
        ));
    }
}
