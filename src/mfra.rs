//! Random-access fragment index (`mfra`) parsing.
//!
//! Gives callers a structured view of the movie fragment random access
//! box: one `tfra` table per track plus the trailing `mfro` size. The
//! flatten pipeline does not consume this; it exists for tooling that
//! wants to seek into source fragments without scanning every moof.

use crate::error::{Error, Result};
use crate::mp4::{find_box, walk, walk_children, BoxType, ByteCursor};

/// One random-access entry from a tfra table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TfraEntry {
    /// Presentation time of the sync sample, in media timescale units.
    pub time: u64,
    /// Absolute file offset of the moof that contains it.
    pub moof_offset: u64,
    /// 1-based traf number within the moof.
    pub traf_number: u32,
    /// 1-based trun number within the traf.
    pub trun_number: u32,
    /// 1-based sample number within the trun.
    pub sample_number: u32,
}

/// All tfra entries for one track.
#[derive(Debug, Clone)]
pub struct TrackFragmentIndex {
    pub track_id: u32,
    pub entries: Vec<TfraEntry>,
}

/// Structured view of an mfra box.
#[derive(Debug, Clone)]
pub struct FragmentIndex {
    pub tracks: Vec<TrackFragmentIndex>,
    /// Total mfra size from the trailing mfro, when present.
    pub mfra_size: Option<u32>,
}

/// Locate and parse the `mfra` box in a buffer.
///
/// Returns `Ok(None)` when the buffer has no mfra at the top level.
pub fn parse_fragment_index(buf: &[u8]) -> Result<Option<FragmentIndex>> {
    let top = walk(buf, 0, buf.len() as u64)?;
    let Some(mfra) = find_box(&top, BoxType::MFRA) else {
        return Ok(None);
    };

    let mut tracks = Vec::new();
    let mut mfra_size = None;
    for child in walk_children(buf, mfra)? {
        match child.box_type {
            BoxType::TFRA => tracks.push(parse_tfra(child.body(buf)?)?),
            BoxType::MFRO => mfra_size = Some(parse_mfro(child.body(buf)?)?),
            _ => {}
        }
    }

    Ok(Some(FragmentIndex { tracks, mfra_size }))
}

fn parse_tfra(body: &[u8]) -> Result<TrackFragmentIndex> {
    let mut cur = ByteCursor::new(body);
    let (version, _flags) = cur.read_full_box_header()?;
    if version > 1 {
        return Err(Error::UnsupportedVersion {
            box_type: "tfra",
            version,
        });
    }

    let track_id = cur.read_u32()?;
    // Two reserved bits each select a field width of 1 to 4 bytes.
    let packed = cur.read_u32()?;
    let traf_width = ((packed >> 4) & 0x3) as usize + 1;
    let trun_width = ((packed >> 2) & 0x3) as usize + 1;
    let sample_width = (packed & 0x3) as usize + 1;

    let entry_count = cur.read_u32()?;
    let mut entries = Vec::with_capacity((entry_count as usize).min(body.len() / 8 + 1));
    for _ in 0..entry_count {
        let (time, moof_offset) = if version == 1 {
            (cur.read_u64()?, cur.read_u64()?)
        } else {
            (cur.read_u32()? as u64, cur.read_u32()? as u64)
        };
        entries.push(TfraEntry {
            time,
            moof_offset,
            traf_number: cur.read_uint(traf_width)? as u32,
            trun_number: cur.read_uint(trun_width)? as u32,
            sample_number: cur.read_uint(sample_width)? as u32,
        });
    }

    Ok(TrackFragmentIndex { track_id, entries })
}

fn parse_mfro(body: &[u8]) -> Result<u32> {
    let mut cur = ByteCursor::new(body);
    cur.read_full_box_header()?;
    cur.read_u32()
}
