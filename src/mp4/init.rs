//! Init segment parsing.
//!
//! Pulls the single video track's parameters out of an fMP4
//! initialization segment (`ftyp` + `moov`). The `stsd` and `ftyp`
//! bytes are captured verbatim so the output file can reuse them
//! without re-encoding any sample descriptions.

use super::{find_box, walk, walk_children, BoxHeader, BoxType, ByteCursor};
use crate::error::{Error, Result};

/// Video track parameters from an init segment.
#[derive(Debug, Clone)]
pub struct TrackConfig {
    /// Track ID from tkhd.
    pub track_id: u32,
    /// Media timescale (ticks per second) from mdhd.
    pub timescale: u32,
    /// Width in pixels (high 16 bits of the tkhd 16.16 field).
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Full stsd box bytes, reused verbatim in the output.
    pub stsd: Vec<u8>,
    /// Full ftyp box bytes from the input, if present.
    pub ftyp: Option<Vec<u8>>,
}

/// Parse an init segment into a [`TrackConfig`].
///
/// The first track whose handler is `vide` wins. Fails with
/// [`Error::NoVideoTrack`] when no track matches.
pub fn parse_init_segment(buf: &[u8]) -> Result<TrackConfig> {
    let top = walk(buf, 0, buf.len() as u64)?;

    let ftyp = match find_box(&top, BoxType::FTYP) {
        Some(b) => Some(b.raw(buf)?.to_vec()),
        None => None,
    };
    let moov = find_box(&top, BoxType::MOOV).ok_or(Error::MissingBox("moov"))?;

    let moov_children = walk_children(buf, moov)?;
    for trak in moov_children
        .iter()
        .filter(|b| b.box_type == BoxType::TRAK)
    {
        let trak_children = walk_children(buf, trak)?;
        let Some(mdia) = find_box(&trak_children, BoxType::MDIA) else {
            continue;
        };
        let mdia_children = walk_children(buf, mdia)?;
        if !is_video_handler(buf, &mdia_children)? {
            continue;
        }

        let tkhd = find_box(&trak_children, BoxType::TKHD).ok_or(Error::MissingBox("tkhd"))?;
        let (track_id, width, height) = parse_tkhd(tkhd.body(buf)?)?;

        let mdhd = find_box(&mdia_children, BoxType::MDHD).ok_or(Error::MissingBox("mdhd"))?;
        let timescale = parse_mdhd_timescale(mdhd.body(buf)?)?;

        let minf = find_box(&mdia_children, BoxType::MINF).ok_or(Error::MissingBox("minf"))?;
        let minf_children = walk_children(buf, minf)?;
        let stbl = find_box(&minf_children, BoxType::STBL).ok_or(Error::MissingBox("stbl"))?;
        let stbl_children = walk_children(buf, stbl)?;
        let stsd = find_box(&stbl_children, BoxType::STSD).ok_or(Error::MissingBox("stsd"))?;

        return Ok(TrackConfig {
            track_id,
            timescale,
            width,
            height,
            stsd: stsd.raw(buf)?.to_vec(),
            ftyp,
        });
    }

    Err(Error::NoVideoTrack)
}

fn is_video_handler(buf: &[u8], mdia_children: &[BoxHeader]) -> Result<bool> {
    let Some(hdlr) = find_box(mdia_children, BoxType::HDLR) else {
        return Ok(false);
    };
    let body = hdlr.body(buf)?;
    let mut cur = ByteCursor::new(body);
    cur.read_full_box_header()?;
    cur.skip(4)?; // pre_defined
    Ok(cur.read_bytes(4)? == b"vide")
}

/// Track ID plus pixel dimensions from the 16.16 fields at the end of tkhd.
fn parse_tkhd(body: &[u8]) -> Result<(u32, u32, u32)> {
    let mut cur = ByteCursor::new(body);
    let (version, _flags) = cur.read_full_box_header()?;
    // creation_time and modification_time precede the track ID and are
    // 8 bytes each in version 1.
    let track_id = match version {
        0 => {
            cur.skip(8)?;
            cur.read_u32()?
        }
        _ => {
            cur.skip(16)?;
            cur.read_u32()?
        }
    };

    if body.len() < 8 {
        return Err(Error::BufferUnderflow {
            need: 8,
            have: body.len(),
        });
    }
    let mut tail = ByteCursor::new(&body[body.len() - 8..]);
    let width = tail.read_u32()? >> 16;
    let height = tail.read_u32()? >> 16;

    Ok((track_id, width, height))
}

fn parse_mdhd_timescale(body: &[u8]) -> Result<u32> {
    let mut cur = ByteCursor::new(body);
    let (version, _flags) = cur.read_full_box_header()?;
    match version {
        0 => cur.skip(8)?,
        1 => cur.skip(16)?,
        v => {
            return Err(Error::UnsupportedVersion {
                box_type: "mdhd",
                version: v,
            })
        }
    }
    cur.read_u32()
}
