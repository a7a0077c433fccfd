//! Sample storage for logic-analyzer and oscilloscope captures.
//!
//! Logic segments keep a bitwise-OR mip-map over sample transitions so edge
//! queries at any zoom level touch only a handful of blocks. Analog segments
//! keep a min/max envelope pyramid for the same purpose.
pub mod data;

pub use data::{
    Analog, AnalogPlot, AnalogSegment, Annotation, BlockSource, CaptureSession, Logic,
    LogicSegment, ManualSource, RowData, SampleBlock, Segment, SignalData, StoreConfig,
    StoreError,
};
