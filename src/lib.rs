//! unfrag: flatten fragmented MP4 streams into progressive MP4 files.
//!
//! This crate remuxes one or more fMP4 inputs (an init segment carrying
//! a movie header plus `moof`/`mdat` media fragments) into a single
//! self-contained progressive file of the shape `ftyp` + `moov` +
//! `mdat`. Coded sample payloads are copied byte-for-byte; decode and
//! composition ordering is preserved so standard players reproduce the
//! original timeline.
//!
//! # Modules
//!
//! - `mp4` - ISO-BMFF box walking and init-segment parsing
//! - `fragment` - moof/mdat sample extraction (tfhd/tfdt/trun)
//! - `timeline` - cross-fragment splicing and monotonization
//! - `builder` - progressive MP4 serialization
//! - `flatten` - the end-to-end pipeline and its options
//! - `mfra` - random-access fragment index parsing (auxiliary)
//!
//! # Pipeline
//!
//! ```text
//! buffers -> classify -> init parse -> fragment parse -> splice -> build
//! ```
//!
//! The whole pipeline is synchronous and single-threaded; input buffers
//! are borrowed for the duration of one [`flatten`] call and the output
//! is a fresh allocation owned by the caller.

pub mod builder;
pub mod error;
pub mod flatten;
pub mod fragment;
pub mod mfra;
pub mod mp4;
pub mod timeline;

pub use builder::{BuildOutput, Mp4Builder};
pub use error::{Error, Result};
pub use flatten::{flatten, FlattenOptions, FlattenOutput};
pub use fragment::{FragmentParser, Sample};
pub use mfra::{parse_fragment_index, FragmentIndex};
pub use mp4::{parse_init_segment, TrackConfig};
