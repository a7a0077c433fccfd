use std::collections::VecDeque;

use crate::data::segment::MAX_UNIT_SIZE;
use crate::data::StoreError;

/// One block of freshly acquired samples.
#[derive(Clone, Debug, PartialEq)]
pub enum SampleBlock {
    /// Packed logic samples, `unit_size` bytes each.
    Logic { unit_size: usize, data: Vec<u8> },
    Analog { samples: Vec<f32> },
    /// End of the current frame; the next block opens a new segment.
    FrameEnd,
}

impl SampleBlock {
    pub fn validate(&self) -> Result<(), StoreError> {
        if let SampleBlock::Logic { unit_size, data } = self {
            if !(1..=MAX_UNIT_SIZE).contains(unit_size) {
                return Err(StoreError::InvalidUnitSize(*unit_size));
            }
            if data.len() % unit_size != 0 {
                return Err(StoreError::UnalignedPayload {
                    len: data.len(),
                    unit_size: *unit_size,
                });
            }
        }
        Ok(())
    }

    pub fn sample_count(&self) -> usize {
        match self {
            SampleBlock::Logic { unit_size, data } => data.len() / (*unit_size).max(1),
            SampleBlock::Analog { samples } => samples.len(),
            SampleBlock::FrameEnd => 0,
        }
    }
}

/// Something that can yield sample blocks on demand.
pub trait BlockSource {
    fn next_block(&mut self) -> Result<Option<SampleBlock>, StoreError>;
}

/// In-memory source for tests and file playback.
pub struct ManualSource {
    queue: VecDeque<SampleBlock>,
}

impl ManualSource {
    pub fn new(blocks: impl IntoIterator<Item = SampleBlock>) -> Self {
        Self {
            queue: blocks.into_iter().collect(),
        }
    }
}

impl BlockSource for ManualSource {
    fn next_block(&mut self) -> Result<Option<SampleBlock>, StoreError> {
        Ok(self.queue.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_bad_logic_blocks() {
        let wide = SampleBlock::Logic {
            unit_size: 9,
            data: vec![0; 9],
        };
        assert!(matches!(wide.validate(), Err(StoreError::InvalidUnitSize(9))));

        let ragged = SampleBlock::Logic {
            unit_size: 2,
            data: vec![0; 5],
        };
        assert!(matches!(
            ragged.validate(),
            Err(StoreError::UnalignedPayload { len: 5, unit_size: 2 })
        ));

        let ok = SampleBlock::Logic {
            unit_size: 2,
            data: vec![0; 6],
        };
        assert!(ok.validate().is_ok());
        assert_eq!(ok.sample_count(), 3);
    }

    #[test]
    fn manual_source_drains_in_order() {
        let mut source = ManualSource::new(vec![
            SampleBlock::Analog { samples: vec![1.0] },
            SampleBlock::FrameEnd,
        ]);
        assert_eq!(
            source.next_block().unwrap(),
            Some(SampleBlock::Analog { samples: vec![1.0] })
        );
        assert_eq!(source.next_block().unwrap(), Some(SampleBlock::FrameEnd));
        assert_eq!(source.next_block().unwrap(), None);
    }
}
