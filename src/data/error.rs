use thiserror::Error;
/// Errors raised where external data enters the store: sample blocks handed
/// over by an acquisition source and configuration loaded from disk.
///
/// Misuse of the segment query API itself (out-of-range indices, zero
/// resolution) is not represented here; those are programming errors and
/// panic at the point of detection.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sample rate must be greater than zero")]
    InvalidSampleRate,
    #[error("unit size must be between 1 and 8 bytes, got {0}")]
    InvalidUnitSize(usize),
    #[error("unit size mismatch: expected {expected}, got {actual}")]
    UnitSizeMismatch { expected: usize, actual: usize },
    #[error("payload of {len} bytes is not a multiple of the {unit_size}-byte unit size")]
    UnalignedPayload { len: usize, unit_size: usize },
    #[error("logic channel count must be between 1 and 64, got {0}")]
    InvalidChannelCount(u32),
    #[error("envelope threshold must be positive, got {0}")]
    InvalidEnvelopeThreshold(f32),
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration: {0}")]
    Json(#[from] serde_json::Error),
}
