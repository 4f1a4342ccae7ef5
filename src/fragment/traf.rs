//! Track-fragment box decoding (tfhd, tfdt, trun).
//!
//! The tfhd and trun flag words select an ordered subset of optional
//! fields. Decoding walks a declarative flag→width table so the cursor
//! position always matches the wire layout.

use crate::error::{Error, Result};
use crate::mp4::ByteCursor;

/// Per-track-fragment defaults from tfhd.
#[derive(Debug, Clone, Copy, Default)]
pub struct TfhdDefaults {
    pub track_id: u32,
    pub base_data_offset: Option<u64>,
    pub default_sample_duration: Option<u32>,
    pub default_sample_size: Option<u32>,
    pub default_sample_flags: Option<u32>,
}

const TFHD_BASE_DATA_OFFSET: u32 = 0x00_0001;
const TFHD_SAMPLE_DESCRIPTION_INDEX: u32 = 0x00_0002;
const TFHD_DEFAULT_SAMPLE_DURATION: u32 = 0x00_0008;
const TFHD_DEFAULT_SAMPLE_SIZE: u32 = 0x00_0010;
const TFHD_DEFAULT_SAMPLE_FLAGS: u32 = 0x00_0020;

/// tfhd optional fields in wire order: flag bit and byte width.
const TFHD_FIELDS: [(u32, usize); 5] = [
    (TFHD_BASE_DATA_OFFSET, 8),
    (TFHD_SAMPLE_DESCRIPTION_INDEX, 4),
    (TFHD_DEFAULT_SAMPLE_DURATION, 4),
    (TFHD_DEFAULT_SAMPLE_SIZE, 4),
    (TFHD_DEFAULT_SAMPLE_FLAGS, 4),
];

/// Decode a tfhd box body.
pub fn parse_tfhd(body: &[u8]) -> Result<TfhdDefaults> {
    let mut cur = ByteCursor::new(body);
    let (_version, flags) = cur.read_full_box_header()?;
    let mut out = TfhdDefaults {
        track_id: cur.read_u32()?,
        ..Default::default()
    };

    for (bit, width) in TFHD_FIELDS {
        if flags & bit == 0 {
            continue;
        }
        let value = cur.read_uint(width)?;
        match bit {
            TFHD_BASE_DATA_OFFSET => out.base_data_offset = Some(value),
            TFHD_DEFAULT_SAMPLE_DURATION => out.default_sample_duration = Some(value as u32),
            TFHD_DEFAULT_SAMPLE_SIZE => out.default_sample_size = Some(value as u32),
            TFHD_DEFAULT_SAMPLE_FLAGS => out.default_sample_flags = Some(value as u32),
            // sample_description_index: cursor advanced, value unused
            _ => {}
        }
    }

    Ok(out)
}

/// Decode a tfdt box body into the base media decode time.
pub fn parse_tfdt(body: &[u8]) -> Result<u64> {
    let mut cur = ByteCursor::new(body);
    let (version, _flags) = cur.read_full_box_header()?;
    match version {
        0 => Ok(cur.read_u32()? as u64),
        1 => cur.read_u64(),
        v => Err(Error::UnsupportedVersion {
            box_type: "tfdt",
            version: v,
        }),
    }
}

/// Per-sample optional overrides from one trun entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrunSample {
    pub duration: Option<u32>,
    pub size: Option<u32>,
    pub flags: Option<u32>,
    /// Composition time offset; signed only when trun version == 1.
    pub cto: Option<i64>,
}

/// A decoded track run.
#[derive(Debug, Clone, Default)]
pub struct TrackRun {
    pub data_offset: Option<i32>,
    pub first_sample_flags: Option<u32>,
    pub samples: Vec<TrunSample>,
}

const TRUN_DATA_OFFSET: u32 = 0x00_0001;
const TRUN_FIRST_SAMPLE_FLAGS: u32 = 0x00_0004;
const TRUN_SAMPLE_DURATION: u32 = 0x00_0100;
const TRUN_SAMPLE_SIZE: u32 = 0x00_0200;
const TRUN_SAMPLE_FLAGS: u32 = 0x00_0400;
const TRUN_SAMPLE_CTO: u32 = 0x00_0800;

/// Per-sample trun fields in wire order.
const TRUN_SAMPLE_FIELDS: [u32; 4] = [
    TRUN_SAMPLE_DURATION,
    TRUN_SAMPLE_SIZE,
    TRUN_SAMPLE_FLAGS,
    TRUN_SAMPLE_CTO,
];

/// Decode a trun box body.
pub fn parse_trun(body: &[u8]) -> Result<TrackRun> {
    let mut cur = ByteCursor::new(body);
    let (version, flags) = cur.read_full_box_header()?;
    let sample_count = cur.read_u32()?;

    let mut run = TrackRun::default();
    if flags & TRUN_DATA_OFFSET != 0 {
        run.data_offset = Some(cur.read_i32()?);
    }
    if flags & TRUN_FIRST_SAMPLE_FLAGS != 0 {
        run.first_sample_flags = Some(cur.read_u32()?);
    }

    // Cap the pre-allocation by what the body can actually hold.
    let capacity = (sample_count as usize).min(cur.remaining() / 4 + 1);
    run.samples = Vec::with_capacity(capacity);

    for _ in 0..sample_count {
        let mut sample = TrunSample::default();
        for bit in TRUN_SAMPLE_FIELDS {
            if flags & bit == 0 {
                continue;
            }
            match bit {
                TRUN_SAMPLE_DURATION => sample.duration = Some(cur.read_u32()?),
                TRUN_SAMPLE_SIZE => sample.size = Some(cur.read_u32()?),
                TRUN_SAMPLE_FLAGS => sample.flags = Some(cur.read_u32()?),
                TRUN_SAMPLE_CTO => {
                    sample.cto = Some(if version == 1 {
                        cur.read_i32()? as i64
                    } else {
                        cur.read_u32()? as i64
                    });
                }
                _ => unreachable!(),
            }
        }
        run.samples.push(sample);
    }

    Ok(run)
}
