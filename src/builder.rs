//! Progressive MP4 serialization.
//!
//! Emits `ftyp` + `moov` + `mdat` from a track config and an ordered
//! sample list. Chunk offsets point into the final `mdat`, which makes
//! them a fixpoint of the `moov` size: the table is measured with
//! placeholder entries first, promoted to `co64` if any offset needs
//! more than 32 bits, then rebuilt with the real values. Promotion only
//! grows offsets, so a single extra pass converges.

use bytes::{BufMut, BytesMut};

use crate::error::{Error, Result};
use crate::fragment::Sample;
use crate::mp4::TrackConfig;

/// An assembled progressive MP4 plus per-keyframe timing.
pub struct BuildOutput {
    /// The complete file bytes.
    pub bytes: Vec<u8>,
    /// Keyframe decode times in seconds, in decode order.
    pub idr_timestamps: Vec<f64>,
}

/// Chunk offset table contents, one entry per sample.
enum ChunkOffsets {
    Stco(Vec<u32>),
    Co64(Vec<u64>),
}

/// Builds a progressive MP4 from ordered samples.
pub struct Mp4Builder<'c> {
    config: &'c TrackConfig,
}

impl<'c> Mp4Builder<'c> {
    pub fn new(config: &'c TrackConfig) -> Self {
        Self { config }
    }

    /// Serialize the output file.
    pub fn build(&self, samples: &[Sample]) -> Result<BuildOutput> {
        if samples.is_empty() {
            return Err(Error::EmptySampleList);
        }

        let ftyp = match &self.config.ftyp {
            Some(bytes) => bytes.clone(),
            None => default_ftyp(),
        };

        let mdat_payload: u64 = samples.iter().map(|s| s.size as u64).sum();
        let mdat_header = mdat_header(mdat_payload);

        // Measure moov with a placeholder 32-bit table, then decide.
        let n = samples.len();
        let probe = self.build_moov(samples, &ChunkOffsets::Stco(vec![0; n]))?;
        let base = ftyp.len() as u64 + probe.len() as u64 + mdat_header.len() as u64;
        let offsets = chunk_offsets(base, samples)?;

        let needs_co64 = offsets.last().is_some_and(|&o| o > u32::MAX as u64);
        let moov = if needs_co64 {
            // The wider table grows moov, pushing offsets further up,
            // never back under 2^32, so one re-measurement suffices.
            tracing::debug!(samples = n, "promoting chunk offsets to co64");
            let probe = self.build_moov(samples, &ChunkOffsets::Co64(vec![0; n]))?;
            let base = ftyp.len() as u64 + probe.len() as u64 + mdat_header.len() as u64;
            let offsets = chunk_offsets(base, samples)?;
            self.build_moov(samples, &ChunkOffsets::Co64(offsets))?
        } else {
            let table = offsets.iter().map(|&o| o as u32).collect();
            self.build_moov(samples, &ChunkOffsets::Stco(table))?
        };

        let mut out = BytesMut::with_capacity(
            ftyp.len() + moov.len() + mdat_header.len() + mdat_payload as usize,
        );
        out.put_slice(&ftyp);
        out.put_slice(&moov);
        out.put_slice(&mdat_header);
        for sample in samples {
            out.put_slice(sample.data);
        }

        let timescale = self.config.timescale;
        let idr_timestamps = samples
            .iter()
            .filter(|s| s.is_keyframe)
            .map(|s| {
                if timescale == 0 {
                    0.0
                } else {
                    s.dts as f64 / timescale as f64
                }
            })
            .collect();

        Ok(BuildOutput {
            bytes: out.to_vec(),
            idr_timestamps,
        })
    }

    fn build_moov(&self, samples: &[Sample], offsets: &ChunkOffsets) -> Result<Vec<u8>> {
        let duration: u64 = samples.iter().map(|s| s.duration as u64).sum();

        let mut buf = BytesMut::with_capacity(512 + samples.len() * 16);
        let moov = begin_box(&mut buf, b"moov");
        self.write_mvhd(&mut buf, duration);

        let trak = begin_box(&mut buf, b"trak");
        self.write_tkhd(&mut buf, duration);

        let mdia = begin_box(&mut buf, b"mdia");
        self.write_mdhd(&mut buf, duration);
        write_hdlr(&mut buf);

        let minf = begin_box(&mut buf, b"minf");
        write_vmhd(&mut buf);
        write_dinf(&mut buf);

        let stbl = begin_box(&mut buf, b"stbl");
        buf.put_slice(&self.config.stsd);
        write_stts(&mut buf, samples);
        write_ctts(&mut buf, samples)?;
        write_stss(&mut buf, samples);
        write_stsc(&mut buf);
        write_stsz(&mut buf, samples);
        write_chunk_offsets(&mut buf, offsets);

        finish_box(&mut buf, stbl)?;
        finish_box(&mut buf, minf)?;
        finish_box(&mut buf, mdia)?;
        finish_box(&mut buf, trak)?;
        finish_box(&mut buf, moov)?;

        Ok(buf.to_vec())
    }

    fn write_mvhd(&self, buf: &mut BytesMut, duration: u64) {
        let start = begin_box(buf, b"mvhd");
        buf.put_u32(0); // version 0, flags
        buf.put_u32(0); // creation_time
        buf.put_u32(0); // modification_time
        buf.put_u32(self.config.timescale);
        buf.put_u32(clamp_u32(duration));
        buf.put_u32(0x0001_0000); // rate 1.0
        buf.put_u16(0x0100); // volume 1.0
        buf.put_u16(0); // reserved
        buf.put_u64(0); // reserved
        put_identity_matrix(buf);
        for _ in 0..6 {
            buf.put_u32(0); // pre_defined
        }
        buf.put_u32(2); // next_track_ID
        patch_size(buf, start);
    }

    fn write_tkhd(&self, buf: &mut BytesMut, duration: u64) {
        let start = begin_box(buf, b"tkhd");
        buf.put_u32(0x00_0007); // version 0; enabled, in movie, in preview
        buf.put_u32(0); // creation_time
        buf.put_u32(0); // modification_time
        buf.put_u32(self.config.track_id);
        buf.put_u32(0); // reserved
        buf.put_u32(clamp_u32(duration));
        buf.put_u64(0); // reserved
        buf.put_u16(0); // layer
        buf.put_u16(0); // alternate_group
        buf.put_u16(0); // volume
        buf.put_u16(0); // reserved
        put_identity_matrix(buf);
        buf.put_u32(self.config.width << 16);
        buf.put_u32(self.config.height << 16);
        patch_size(buf, start);
    }

    fn write_mdhd(&self, buf: &mut BytesMut, duration: u64) {
        let start = begin_box(buf, b"mdhd");
        buf.put_u32(0);
        buf.put_u32(0); // creation_time
        buf.put_u32(0); // modification_time
        buf.put_u32(self.config.timescale);
        buf.put_u32(clamp_u32(duration));
        buf.put_u16(0x55c4); // language: und
        buf.put_u16(0); // pre_defined
        patch_size(buf, start);
    }
}

fn write_hdlr(buf: &mut BytesMut) {
    let start = begin_box(buf, b"hdlr");
    buf.put_u32(0);
    buf.put_u32(0); // pre_defined
    buf.put_slice(b"vide");
    buf.put_slice(&[0u8; 12]); // reserved
    buf.put_slice(b"VideoHandler\0");
    patch_size(buf, start);
}

fn write_vmhd(buf: &mut BytesMut) {
    let start = begin_box(buf, b"vmhd");
    buf.put_u32(0x00_0001);
    buf.put_u16(0); // graphicsmode
    buf.put_slice(&[0u8; 6]); // opcolor
    patch_size(buf, start);
}

fn write_dinf(buf: &mut BytesMut) {
    let dinf = begin_box(buf, b"dinf");
    let dref = begin_box(buf, b"dref");
    buf.put_u32(0);
    buf.put_u32(1); // entry_count
    buf.put_u32(12); // url box: header + version/flags
    buf.put_slice(b"url ");
    buf.put_u32(0x00_0001); // self-contained
    patch_size(buf, dref);
    patch_size(buf, dinf);
}

fn write_stts(buf: &mut BytesMut, samples: &[Sample]) {
    let runs = run_length(samples.iter().map(|s| s.duration));
    let start = begin_box(buf, b"stts");
    buf.put_u32(0);
    buf.put_u32(runs.len() as u32);
    for (count, delta) in runs {
        buf.put_u32(count);
        buf.put_u32(delta);
    }
    patch_size(buf, start);
}

/// ctts is omitted when every composition offset is zero; version 1
/// (signed entries) is used when any offset is negative.
fn write_ctts(buf: &mut BytesMut, samples: &[Sample]) -> Result<()> {
    let offsets: Vec<i64> = samples.iter().map(|s| s.cts - s.dts).collect();
    if offsets.iter().all(|&o| o == 0) {
        return Ok(());
    }
    let signed = offsets.iter().any(|&o| o < 0);
    let runs = run_length(offsets.into_iter());

    let start = begin_box(buf, b"ctts");
    buf.put_u32(if signed { 0x0100_0000 } else { 0 });
    buf.put_u32(runs.len() as u32);
    for (count, offset) in runs {
        buf.put_u32(count);
        if signed {
            let value = i32::try_from(offset).map_err(|_| Error::IntegerOutOfRange {
                what: "ctts offset",
                value: offset.unsigned_abs(),
            })?;
            buf.put_i32(value);
        } else {
            let value = u32::try_from(offset).map_err(|_| Error::IntegerOutOfRange {
                what: "ctts offset",
                value: offset.unsigned_abs(),
            })?;
            buf.put_u32(value);
        }
    }
    patch_size(buf, start);
    Ok(())
}

/// stss is omitted when no sample is a keyframe.
fn write_stss(buf: &mut BytesMut, samples: &[Sample]) {
    let keyframes: Vec<u32> = samples
        .iter()
        .enumerate()
        .filter(|(_, s)| s.is_keyframe)
        .map(|(i, _)| i as u32 + 1)
        .collect();
    if keyframes.is_empty() {
        return;
    }
    let start = begin_box(buf, b"stss");
    buf.put_u32(0);
    buf.put_u32(keyframes.len() as u32);
    for index in keyframes {
        buf.put_u32(index);
    }
    patch_size(buf, start);
}

/// One sample per chunk, so the chunk offset table addresses every
/// sample directly.
fn write_stsc(buf: &mut BytesMut) {
    let start = begin_box(buf, b"stsc");
    buf.put_u32(0);
    buf.put_u32(1); // entry_count
    buf.put_u32(1); // first_chunk
    buf.put_u32(1); // samples_per_chunk
    buf.put_u32(1); // sample_description_index
    patch_size(buf, start);
}

fn write_stsz(buf: &mut BytesMut, samples: &[Sample]) {
    let start = begin_box(buf, b"stsz");
    buf.put_u32(0);
    buf.put_u32(0); // sample_size: per-sample entries follow
    buf.put_u32(samples.len() as u32);
    for sample in samples {
        buf.put_u32(sample.size);
    }
    patch_size(buf, start);
}

fn write_chunk_offsets(buf: &mut BytesMut, offsets: &ChunkOffsets) {
    match offsets {
        ChunkOffsets::Stco(entries) => {
            let start = begin_box(buf, b"stco");
            buf.put_u32(0);
            buf.put_u32(entries.len() as u32);
            for &offset in entries {
                buf.put_u32(offset);
            }
            patch_size(buf, start);
        }
        ChunkOffsets::Co64(entries) => {
            let start = begin_box(buf, b"co64");
            buf.put_u32(0);
            buf.put_u32(entries.len() as u32);
            for &offset in entries {
                buf.put_u64(offset);
            }
            patch_size(buf, start);
        }
    }
}

/// Absolute offset of every sample's payload in the final file, given
/// where the mdat payload starts.
fn chunk_offsets(payload_start: u64, samples: &[Sample]) -> Result<Vec<u64>> {
    let mut offsets = Vec::with_capacity(samples.len());
    let mut cursor = payload_start;
    for (index, sample) in samples.iter().enumerate() {
        offsets.push(cursor);
        cursor = cursor
            .checked_add(sample.size as u64)
            .ok_or(Error::ChunkOffsetOverflow { index })?;
    }
    Ok(offsets)
}

/// mdat header: compact when the total box size fits 32 bits, otherwise
/// the large-size form.
fn mdat_header(payload: u64) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(16);
    if payload + 8 > u32::MAX as u64 {
        buf.put_u32(1);
        buf.put_slice(b"mdat");
        buf.put_u64(payload + 16);
    } else {
        buf.put_u32(payload as u32 + 8);
        buf.put_slice(b"mdat");
    }
    buf.to_vec()
}

fn default_ftyp() -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(32);
    let start = begin_box(&mut buf, b"ftyp");
    buf.put_slice(b"isom"); // major brand
    buf.put_u32(0x200); // minor version
    for brand in [b"isom", b"iso2", b"avc1", b"mp41"] {
        buf.put_slice(brand);
    }
    patch_size(&mut buf, start);
    buf.to_vec()
}

fn run_length<T: PartialEq>(values: impl Iterator<Item = T>) -> Vec<(u32, T)> {
    let mut runs: Vec<(u32, T)> = Vec::new();
    for value in values {
        match runs.last_mut() {
            Some((count, last)) if *last == value => *count += 1,
            _ => runs.push((1, value)),
        }
    }
    runs
}

fn begin_box(buf: &mut BytesMut, box_type: &[u8; 4]) -> usize {
    let start = buf.len();
    buf.put_u32(0); // placeholder size
    buf.put_slice(box_type);
    start
}

fn patch_size(buf: &mut BytesMut, start: usize) {
    let size = (buf.len() - start) as u32;
    buf[start..start + 4].copy_from_slice(&size.to_be_bytes());
}

fn finish_box(buf: &mut BytesMut, start: usize) -> Result<()> {
    let size = buf.len() - start;
    let size = u32::try_from(size).map_err(|_| Error::IntegerOutOfRange {
        what: "box size",
        value: size as u64,
    })?;
    buf[start..start + 4].copy_from_slice(&size.to_be_bytes());
    Ok(())
}

fn put_identity_matrix(buf: &mut BytesMut) {
    for value in [0x0001_0000u32, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000] {
        buf.put_u32(value);
    }
}

fn clamp_u32(value: u64) -> u32 {
    value.min(u32::MAX as u64) as u32
}
