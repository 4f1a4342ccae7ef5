//! Movie-fragment sample extraction.
//!
//! Walks a fragment buffer's (`moof`, `mdat`) pairs and reconstructs
//! per-sample timing, flags, and payload byte ranges for one track.
//! Sample payloads stay borrowed from the input buffer; the builder
//! performs the only copy when it assembles the output `mdat`.

mod traf;

pub use traf::{parse_tfdt, parse_tfhd, parse_trun, TfhdDefaults, TrackRun, TrunSample};

use crate::error::{Error, Result};
use crate::mp4::{find_box, walk, walk_children, BoxHeader, BoxType, TrackConfig};

/// Sample flag bit meaning "not independently decodable".
const SAMPLE_IS_NON_SYNC: u32 = 0x0001_0000;

/// One coded access unit.
#[derive(Debug, Clone, Copy)]
pub struct Sample<'a> {
    /// Decode timestamp in media timescale units.
    pub dts: i64,
    /// Composition timestamp (`dts` + composition time offset).
    pub cts: i64,
    /// Duration in media timescale units.
    pub duration: u32,
    /// Payload size in bytes.
    pub size: u32,
    /// Whether this sample is a sync sample.
    pub is_keyframe: bool,
    /// Payload bytes, borrowed from the input buffer.
    pub data: &'a [u8],
}

/// Extracts one track's samples from fragment buffers.
pub struct FragmentParser<'c> {
    config: &'c TrackConfig,
    allow_data_offset_fallback: bool,
}

impl<'c> FragmentParser<'c> {
    pub fn new(config: &'c TrackConfig, allow_data_offset_fallback: bool) -> Self {
        Self {
            config,
            allow_data_offset_fallback,
        }
    }

    /// Extract the configured track's samples from one fragment buffer.
    ///
    /// Successive (`moof`, `mdat`) pairs within the buffer are offset so
    /// their decode times concatenate monotonically even when each pair
    /// restarts its tfdt clock.
    pub fn parse<'a>(&self, buf: &'a [u8]) -> Result<Vec<Sample<'a>>> {
        let top = walk(buf, 0, buf.len() as u64)?;
        let pairs = pair_fragments(&top)?;

        let mut samples = Vec::new();
        let mut intra_offset: i64 = 0;
        let mut last_end: Option<i64> = None;

        for (moof, mdat) in pairs {
            let pair_samples = self.extract_pair(buf, moof, mdat)?;
            if pair_samples.is_empty() {
                continue;
            }
            if let Some(end) = last_end {
                if pair_samples[0].dts + intra_offset < end {
                    intra_offset = end - pair_samples[0].dts;
                }
            }
            for mut sample in pair_samples {
                sample.dts += intra_offset;
                sample.cts += intra_offset;
                let sample_end = sample.dts + sample.duration as i64;
                last_end = Some(last_end.map_or(sample_end, |e| e.max(sample_end)));
                samples.push(sample);
            }
        }

        Ok(samples)
    }

    fn extract_pair<'a>(
        &self,
        buf: &'a [u8],
        moof: &BoxHeader,
        mdat: &BoxHeader,
    ) -> Result<Vec<Sample<'a>>> {
        let payload_start = mdat.body_start();
        let payload_end = mdat.end();
        let moof_children = walk_children(buf, moof)?;

        let mut out = Vec::new();
        for traf in moof_children
            .iter()
            .filter(|b| b.box_type == BoxType::TRAF)
        {
            let traf_children = walk_children(buf, traf)?;
            let tfhd_box =
                find_box(&traf_children, BoxType::TFHD).ok_or(Error::MissingBox("tfhd"))?;
            let tfhd = parse_tfhd(tfhd_box.body(buf)?)?;
            if tfhd.track_id != self.config.track_id {
                continue;
            }

            let tfdt_box =
                find_box(&traf_children, BoxType::TFDT).ok_or(Error::MissingBox("tfdt"))?;
            let base_decode_time = parse_tfdt(tfdt_box.body(buf)?)?;
            let mut dts = i64::try_from(base_decode_time).map_err(|_| Error::IntegerOutOfRange {
                what: "tfdt baseMediaDecodeTime",
                value: base_decode_time,
            })?;

            let truns: Vec<&BoxHeader> = traf_children
                .iter()
                .filter(|b| b.box_type == BoxType::TRUN)
                .collect();
            if truns.is_empty() {
                return Err(Error::MissingBox("trun"));
            }

            let base_data_offset = tfhd.base_data_offset.unwrap_or(moof.start);
            for trun_box in truns {
                let run = parse_trun(trun_box.body(buf)?)?;
                let data_start = self.resolve_data_start(
                    &run,
                    &tfhd,
                    base_data_offset,
                    moof,
                    payload_start,
                )?;
                self.emit_run(
                    buf,
                    &run,
                    &tfhd,
                    data_start,
                    payload_start,
                    payload_end,
                    &mut dts,
                    &mut out,
                )?;
            }
        }

        Ok(out)
    }

    fn resolve_data_start(
        &self,
        run: &TrackRun,
        tfhd: &TfhdDefaults,
        base_data_offset: u64,
        moof: &BoxHeader,
        payload_start: u64,
    ) -> Result<i64> {
        match run.data_offset {
            Some(offset) => Ok(base_data_offset as i64 + offset as i64),
            None if self.allow_data_offset_fallback => {
                if tfhd.base_data_offset.is_some() {
                    Ok(moof.end() as i64)
                } else {
                    Ok(payload_start as i64)
                }
            }
            None => Err(Error::MissingTrunDataOffset {
                moof_offset: moof.start,
            }),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_run<'a>(
        &self,
        buf: &'a [u8],
        run: &TrackRun,
        tfhd: &TfhdDefaults,
        data_start: i64,
        payload_start: u64,
        payload_end: u64,
        dts: &mut i64,
        out: &mut Vec<Sample<'a>>,
    ) -> Result<()> {
        // Resolve every sample before touching bytes so the whole run's
        // range is validated against the mdat payload at once.
        struct Resolved {
            duration: u32,
            size: u32,
            flags: u32,
            cto: i64,
        }

        let mut resolved = Vec::with_capacity(run.samples.len());
        let mut total_size: u64 = 0;
        for (i, entry) in run.samples.iter().enumerate() {
            let duration = entry
                .duration
                .or(tfhd.default_sample_duration)
                .unwrap_or(0);
            let size = entry.size.or(tfhd.default_sample_size).unwrap_or(0);
            if size == 0 {
                return Err(Error::MissingSampleSize { index: i as u32 });
            }
            let flags = entry
                .flags
                .or(if i == 0 { run.first_sample_flags } else { None })
                .or(tfhd.default_sample_flags)
                .unwrap_or(0);
            let cto = entry.cto.unwrap_or(0);
            total_size += size as u64;
            resolved.push(Resolved {
                duration,
                size,
                flags,
                cto,
            });
        }

        let run_end = data_start + total_size as i64;
        if data_start < payload_start as i64 || run_end > payload_end as i64 {
            return Err(Error::MdatRangeMismatch {
                start: data_start.max(0) as u64,
                end: run_end.max(0) as u64,
                payload_start,
                payload_end,
            });
        }

        let mut cursor = data_start as u64;
        for sample in resolved {
            let start = cursor as usize;
            let end = start + sample.size as usize;
            out.push(Sample {
                dts: *dts,
                cts: *dts + sample.cto,
                duration: sample.duration,
                size: sample.size,
                is_keyframe: sample.flags & SAMPLE_IS_NON_SYNC == 0,
                data: &buf[start..end],
            });
            cursor += sample.size as u64;
            *dts += sample.duration as i64;
        }

        Ok(())
    }
}

/// Pair each moof with the next mdat that appears before the next moof.
fn pair_fragments(top: &[BoxHeader]) -> Result<Vec<(&BoxHeader, &BoxHeader)>> {
    let mut pairs = Vec::new();
    let mut i = 0;
    while i < top.len() {
        if top[i].box_type != BoxType::MOOF {
            i += 1;
            continue;
        }
        let moof = &top[i];
        let mut mdat = None;
        i += 1;
        while i < top.len() {
            match top[i].box_type {
                BoxType::MOOF => break,
                BoxType::MDAT => {
                    mdat = Some(&top[i]);
                    i += 1;
                    break;
                }
                _ => i += 1,
            }
        }
        match mdat {
            Some(m) => pairs.push((moof, m)),
            None => {
                return Err(Error::MoofWithoutMdat {
                    offset: moof.start,
                })
            }
        }
    }
    if pairs.is_empty() {
        return Err(Error::NoMoof);
    }
    Ok(pairs)
}
