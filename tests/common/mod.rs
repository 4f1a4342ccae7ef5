//! Shared fixture builders for integration tests.
//!
//! Synthesizes minimal but well-formed fMP4 init segments and media
//! fragments byte-by-byte, so the pipeline tests run on realistic wire
//! layouts without binary fixture files.

use bytes::{BufMut, BytesMut};

/// Keyframe sample flags (sample_depends_on = 2).
pub const KEYFRAME: u32 = 0x0200_0000;
/// Non-sync sample flags (depends-on + is-non-sync).
pub const NON_SYNC: u32 = 0x0101_0000;

/// One sample in a synthetic fragment.
pub struct SampleSpec {
    pub duration: u32,
    pub size: u32,
    pub flags: u32,
    pub cto: i32,
}

impl SampleSpec {
    pub fn key(duration: u32, size: u32) -> Self {
        Self {
            duration,
            size,
            flags: KEYFRAME,
            cto: 0,
        }
    }

    pub fn delta(duration: u32, size: u32) -> Self {
        Self {
            duration,
            size,
            flags: NON_SYNC,
            cto: 0,
        }
    }

    pub fn with_cto(mut self, cto: i32) -> Self {
        self.cto = cto;
        self
    }
}

pub fn put_box(buf: &mut BytesMut, box_type: &[u8; 4], body: &[u8]) {
    buf.put_u32(8 + body.len() as u32);
    buf.put_slice(box_type);
    buf.put_slice(body);
}

fn boxed(box_type: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::new();
    put_box(&mut buf, box_type, body);
    buf.to_vec()
}

/// A minimal avc1 sample description, carried verbatim through the
/// pipeline.
pub fn stsd() -> Vec<u8> {
    let mut body = BytesMut::new();
    body.put_u32(0); // version/flags
    body.put_u32(1); // entry_count
    let mut entry = BytesMut::new();
    entry.put_slice(&[0u8; 6]); // reserved
    entry.put_u16(1); // data_reference_index
    entry.put_slice(&[0u8; 16]);
    body.put_slice(&boxed(b"avc1", &entry));
    boxed(b"stsd", &body)
}

/// ftyp + moov init segment with a single video track.
pub fn init_segment(track_id: u32, timescale: u32, width: u32, height: u32) -> Vec<u8> {
    let mut ftyp_body = BytesMut::new();
    ftyp_body.put_slice(b"isom");
    ftyp_body.put_u32(0x200);
    for brand in [b"isom", b"iso6", b"mp41"] {
        ftyp_body.put_slice(brand);
    }

    let mut mvhd = BytesMut::new();
    mvhd.put_u32(0);
    mvhd.put_u32(0); // creation_time
    mvhd.put_u32(0); // modification_time
    mvhd.put_u32(timescale);
    mvhd.put_u32(0); // duration
    mvhd.put_u32(0x0001_0000);
    mvhd.put_u16(0x0100);
    mvhd.put_u16(0);
    mvhd.put_u64(0);
    put_matrix(&mut mvhd);
    mvhd.put_slice(&[0u8; 24]); // pre_defined
    mvhd.put_u32(track_id + 1); // next_track_ID

    let mut tkhd = BytesMut::new();
    tkhd.put_u32(0x00_0007);
    tkhd.put_u32(0);
    tkhd.put_u32(0);
    tkhd.put_u32(track_id);
    tkhd.put_u32(0);
    tkhd.put_u32(0); // duration
    tkhd.put_u64(0);
    tkhd.put_u16(0);
    tkhd.put_u16(0);
    tkhd.put_u16(0);
    tkhd.put_u16(0);
    put_matrix(&mut tkhd);
    tkhd.put_u32(width << 16);
    tkhd.put_u32(height << 16);

    let mut mdhd = BytesMut::new();
    mdhd.put_u32(0);
    mdhd.put_u32(0);
    mdhd.put_u32(0);
    mdhd.put_u32(timescale);
    mdhd.put_u32(0);
    mdhd.put_u16(0x55c4);
    mdhd.put_u16(0);

    let mut hdlr = BytesMut::new();
    hdlr.put_u32(0);
    hdlr.put_u32(0);
    hdlr.put_slice(b"vide");
    hdlr.put_slice(&[0u8; 12]);
    hdlr.put_slice(b"VideoHandler\0");

    let stbl = boxed(b"stbl", &stsd());
    let minf = boxed(b"minf", &stbl);

    let mut mdia_body = boxed(b"mdhd", &mdhd);
    mdia_body.extend(boxed(b"hdlr", &hdlr));
    mdia_body.extend(minf);
    let mdia = boxed(b"mdia", &mdia_body);

    let mut trak_body = boxed(b"tkhd", &tkhd);
    trak_body.extend(mdia);
    let trak = boxed(b"trak", &trak_body);

    let mut moov_body = boxed(b"mvhd", &mvhd);
    moov_body.extend(trak);
    let moov = boxed(b"moov", &moov_body);

    let mut out = boxed(b"ftyp", &ftyp_body);
    out.extend(moov);
    out
}

/// moof + mdat fragment for one track with a version-1 trun.
pub fn fragment(track_id: u32, decode_time: u64, samples: &[SampleSpec]) -> Vec<u8> {
    fragment_opts(track_id, decode_time, samples, true)
}

/// As [`fragment`], optionally omitting the trun data_offset.
pub fn fragment_opts(
    track_id: u32,
    decode_time: u64,
    samples: &[SampleSpec],
    with_data_offset: bool,
) -> Vec<u8> {
    let mut tfhd = BytesMut::new();
    tfhd.put_u32(0); // track_id only
    tfhd.put_u32(track_id);

    let mut tfdt = BytesMut::new();
    tfdt.put_u32(0x0100_0000);
    tfdt.put_u64(decode_time);

    let mut trun = BytesMut::new();
    let mut flags = 0x00_0100 | 0x00_0200 | 0x00_0400 | 0x00_0800;
    if with_data_offset {
        flags |= 0x00_0001;
    }
    trun.put_u32(0x0100_0000 | flags);
    trun.put_u32(samples.len() as u32);
    let data_offset_pos = if with_data_offset {
        let pos = trun.len();
        trun.put_u32(0); // patched below
        Some(pos)
    } else {
        None
    };
    for s in samples {
        trun.put_u32(s.duration);
        trun.put_u32(s.size);
        trun.put_u32(s.flags);
        trun.put_i32(s.cto);
    }

    let mut mfhd = BytesMut::new();
    mfhd.put_u32(0);
    mfhd.put_u32(1); // sequence_number

    let mut traf = BytesMut::new();
    put_box(&mut traf, b"tfhd", &tfhd);
    put_box(&mut traf, b"tfdt", &tfdt);
    let trun_offset_in_traf = traf.len() + 8;
    put_box(&mut traf, b"trun", &trun);

    let mut moof_body = BytesMut::new();
    put_box(&mut moof_body, b"mfhd", &mfhd);
    let traf_pos = moof_body.len();
    put_box(&mut moof_body, b"traf", &traf);

    let moof_size = 8 + moof_body.len();
    if let Some(pos) = data_offset_pos {
        // data_offset is relative to the moof start (the tfhd default
        // base) and lands on the mdat payload.
        let value = (moof_size + 8) as i32;
        let at = traf_pos + 8 + trun_offset_in_traf + pos;
        moof_body[at..at + 4].copy_from_slice(&value.to_be_bytes());
    }

    let mut out = BytesMut::new();
    out.put_u32(moof_size as u32);
    out.put_slice(b"moof");
    out.put_slice(&moof_body);

    let payload: usize = samples.iter().map(|s| s.size as usize).sum();
    out.put_u32(8 + payload as u32);
    out.put_slice(b"mdat");
    for (i, s) in samples.iter().enumerate() {
        out.put_bytes(i as u8 + 1, s.size as usize);
    }
    out.to_vec()
}

fn put_matrix(buf: &mut BytesMut) {
    for value in [0x0001_0000u32, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000] {
        buf.put_u32(value);
    }
}
