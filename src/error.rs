//! Error types for unfrag.

use thiserror::Error;

/// Result type for unfrag operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for unfrag operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A required box was absent from its container.
    #[error("missing required box: {0}")]
    MissingBox(&'static str),

    /// The init segment carried no track with a `vide` handler.
    #[error("no video track in init segment")]
    NoVideoTrack,

    /// No input buffer contained a movie header.
    #[error("no init segment among input buffers")]
    NoInitSegment,

    /// A fragment buffer contained no movie fragment.
    #[error("no moof box in fragment buffer")]
    NoMoof,

    /// A moof box had no mdat before the next moof or end of buffer.
    #[error("moof at offset {offset} has no matching mdat")]
    MoofWithoutMdat { offset: u64 },

    /// Box version outside the decodable set.
    #[error("unsupported {box_type} version {version}")]
    UnsupportedVersion {
        box_type: &'static str,
        version: u8,
    },

    /// A 64-bit box size that cannot describe a real buffer range.
    #[error("box at offset {offset} declares unrepresentable size {size}")]
    BoxTooLarge { offset: u64, size: u64 },

    /// Chunk offset arithmetic overflowed 64 bits.
    #[error("chunk offset overflow at sample {index}")]
    ChunkOffsetOverflow { index: usize },

    /// A 64-bit value did not fit the field that carries it.
    #[error("{what} value {value} out of range")]
    IntegerOutOfRange { what: &'static str, value: u64 },

    /// Track-run byte range fell outside the mdat payload.
    #[error(
        "sample range {start}..{end} outside mdat payload {payload_start}..{payload_end}"
    )]
    MdatRangeMismatch {
        start: u64,
        end: u64,
        payload_start: u64,
        payload_end: u64,
    },

    /// A sample had no size from either trun or tfhd defaults.
    #[error("sample {index} has no size (no trun entry or tfhd default)")]
    MissingSampleSize { index: u32 },

    /// trun carried no data_offset and the fallback is disabled.
    #[error("trun in moof at offset {moof_offset} has no data_offset")]
    MissingTrunDataOffset { moof_offset: u64 },

    /// The pipeline produced no samples to build from.
    #[error("no samples to build")]
    EmptySampleList,

    /// Buffer too small for operation.
    #[error("buffer underflow: need {need} bytes, have {have}")]
    BufferUnderflow { need: usize, have: usize },
}
