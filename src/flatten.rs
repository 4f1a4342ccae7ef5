//! End-to-end flattening pipeline.
//!
//! Classifies the input buffers, parses the init segment, extracts
//! every fragment's samples, splices them onto one timeline, and
//! serializes the progressive output file.

use tracing::debug;

use crate::builder::Mp4Builder;
use crate::error::{Error, Result};
use crate::fragment::FragmentParser;
use crate::mp4::{parse_init_segment, walk, BoxType};
use crate::timeline::splice;

/// Options controlling the flatten pipeline.
#[derive(Debug, Clone)]
pub struct FlattenOptions {
    /// Shift each file's timestamps by the preceding files' durations so
    /// their timelines concatenate. Default true.
    pub normalize_across_files: bool,
    /// Synthesize a data start for track runs that omit `data_offset`
    /// instead of failing. Default false.
    pub allow_trun_data_offset_fallback: bool,
}

impl Default for FlattenOptions {
    fn default() -> Self {
        Self {
            normalize_across_files: true,
            allow_trun_data_offset_fallback: false,
        }
    }
}

/// A flattened progressive MP4 plus timing metadata.
#[derive(Debug)]
pub struct FlattenOutput {
    /// The complete output file (`ftyp` + `moov` + `mdat`).
    pub bytes: Vec<u8>,
    /// Keyframe decode times in seconds, in decode order.
    pub idr_timestamps: Vec<f64>,
    /// Whether the source timeline had a jump larger than one tick.
    pub discontinuity_detected: bool,
    /// Number of samples in the output track.
    pub sample_count: usize,
    /// Total track duration in seconds.
    pub duration_secs: f64,
}

/// Buffer classification: which input is the init segment and which
/// carry fragments. A buffer can be both.
struct Classified {
    init: usize,
    fragments: Vec<usize>,
}

fn classify<B: AsRef<[u8]>>(buffers: &[B]) -> Result<Classified> {
    let mut init = None;
    let mut fragments = Vec::new();

    for (index, buffer) in buffers.iter().enumerate() {
        let buf = buffer.as_ref();
        let top = walk(buf, 0, buf.len() as u64)?;
        let has_moov = top.iter().any(|b| b.box_type == BoxType::MOOV);
        let has_moof = top.iter().any(|b| b.box_type == BoxType::MOOF);

        if has_moov && init.is_none() {
            init = Some(index);
            if has_moof {
                fragments.push(index);
            }
        } else {
            // Later moov-bearing buffers, plain fragments, and unknown
            // buffers all go to the fragment parser, which fails cleanly
            // on anything without a moof.
            fragments.push(index);
        }
    }

    Ok(Classified {
        init: init.ok_or(Error::NoInitSegment)?,
        fragments,
    })
}

/// Remux fragmented MP4 buffers into one progressive MP4.
///
/// The buffer order defines decode order across files. At least one
/// buffer must contain a `moov`; the first such buffer becomes the init
/// segment (and is also parsed as a fragment when it carries `moof`s).
pub fn flatten<B: AsRef<[u8]>>(buffers: &[B], options: &FlattenOptions) -> Result<FlattenOutput> {
    let classified = classify(buffers)?;
    debug!(
        init = classified.init,
        fragments = classified.fragments.len(),
        "classified input buffers"
    );

    let config = parse_init_segment(buffers[classified.init].as_ref())?;
    debug!(
        track_id = config.track_id,
        timescale = config.timescale,
        width = config.width,
        height = config.height,
        "parsed init segment"
    );

    let parser = FragmentParser::new(&config, options.allow_trun_data_offset_fallback);
    let mut files = Vec::with_capacity(classified.fragments.len());
    for &index in &classified.fragments {
        let samples = parser.parse(buffers[index].as_ref())?;
        debug!(buffer = index, samples = samples.len(), "extracted samples");
        files.push(samples);
    }

    let timeline = splice(files, options.normalize_across_files);
    let duration_ticks: u64 = timeline.samples.iter().map(|s| s.duration as u64).sum();

    let built = Mp4Builder::new(&config).build(&timeline.samples)?;
    debug!(
        bytes = built.bytes.len(),
        samples = timeline.samples.len(),
        "built progressive output"
    );

    let duration_secs = if config.timescale == 0 {
        0.0
    } else {
        duration_ticks as f64 / config.timescale as f64
    };

    Ok(FlattenOutput {
        bytes: built.bytes,
        idr_timestamps: built.idr_timestamps,
        discontinuity_detected: timeline.discontinuity_detected,
        sample_count: timeline.samples.len(),
        duration_secs,
    })
}
