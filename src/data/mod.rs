pub mod analog;
pub mod analog_segment;
pub mod config;
pub mod decode;
pub mod error;
pub mod logic;
pub mod logic_segment;
pub mod pipeline;
pub mod segment;
pub mod signal_data;
pub mod source;

pub use analog::Analog;
pub use analog_segment::{AnalogPlot, AnalogSegment, EnvelopeSample, EnvelopeSection};
pub use config::StoreConfig;
pub use decode::{Annotation, RowData};
pub use error::StoreError;
pub use logic::Logic;
pub use logic_segment::{EdgePair, LogicSegment, SubsampledEdges};
pub use pipeline::CaptureSession;
pub use segment::Segment;
pub use signal_data::{SegmentList, SignalData};
pub use source::{BlockSource, ManualSource, SampleBlock};
