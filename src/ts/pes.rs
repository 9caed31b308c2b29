use crate::error::{Result, TsmonError};

/// Coarse classification of a PES stream by its stream_id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamKind {
    /// stream_id 0xE0..=0xEF
    Video,
    /// stream_id 0xC0..=0xDF
    Audio,
    /// Anything else, including the special stream ids without an
    /// optional PES header
    #[default]
    Other,
}

/// A decoded PES header.
///
/// Only the header is decoded; elementary-stream payloads are never
/// inspected. The monitor cares about the PTS for the `PTS_error`
/// indicator and about the flag bits for reporting.
#[derive(Debug, Clone, Default)]
pub struct PESHeader {
    /// Stream identifier byte following the 00 00 01 prefix
    pub stream_id: u8,
    /// Video/audio/other classification inferred from the stream_id
    pub stream_kind: StreamKind,
    /// Stream number within its kind (low nibble for video, low five bits
    /// for audio)
    pub stream_number: u8,
    /// PES scrambling control (2-bit)
    pub scrambling_control: u8,
    /// Copyright flag
    pub copyright: bool,
    /// Original-or-copy flag
    pub original_or_copy: bool,
    /// PTS/DTS flags (2-bit): 2 = PTS only, 3 = PTS and DTS
    pub pts_dts_flags: u8,
    /// ESCR flag
    pub escr_flag: bool,
    /// ES rate flag
    pub es_rate_flag: bool,
    /// DSM trick mode flag
    pub dsm_trick_mode_flag: bool,
    /// Additional copy info flag
    pub additional_copy_info_flag: bool,
    /// PES CRC flag
    pub crc_flag: bool,
    /// PES extension flag
    pub extension_flag: bool,
    /// Presentation time stamp (33-bit), when signalled
    pub pts: Option<u64>,
    /// Decoding time stamp (33-bit), when signalled
    pub dts: Option<u64>,
}

/// Stream ids that carry no optional PES header.
///
/// program_stream_map, padding_stream, private_stream_2, ECM, EMM,
/// DSMCC_stream, H.222.1 type E and program_stream_directory, plus the
/// 0x21 value observed in the wild.
const NO_HEADER_STREAM_IDS: [u8; 9] = [33, 188, 190, 191, 240, 241, 242, 248, 255];

/// Decodes a PES header.
///
/// `data` starts at the stream_id byte, i.e. just past the 00 00 01
/// prefix. The caller is expected to have checked the prefix and that the
/// stream_id is outside the reserved range.
///
/// # Errors
///
/// Returns [`TsmonError::Parser`] when the announced fields run past the
/// available bytes.
pub fn decode_pes(data: &[u8]) -> Result<PESHeader> {
    if data.len() < 3 {
        return Err(TsmonError::Parser("PES header too short".into()));
    }
    let mut pes = PESHeader {
        stream_id: data[0],
        ..Default::default()
    };

    if NO_HEADER_STREAM_IDS.contains(&pes.stream_id) {
        return Ok(pes);
    }

    if pes.stream_id >> 4 == 0x0E {
        pes.stream_kind = StreamKind::Video;
        pes.stream_number = pes.stream_id & 0x0F;
    } else if pes.stream_id >> 5 == 0x06 {
        pes.stream_kind = StreamKind::Audio;
        pes.stream_number = pes.stream_id & 0x1F;
    }

    if data.len() < 6 {
        return Err(TsmonError::Parser("PES optional header too short".into()));
    }
    let b1 = data[3];
    let b2 = data[4];
    pes.scrambling_control = (b1 & 0x30) >> 4;
    pes.copyright = (b1 & 0x02) != 0;
    pes.original_or_copy = (b1 & 0x01) != 0;
    pes.pts_dts_flags = (b2 & 0xC0) >> 6;
    pes.escr_flag = (b2 & 0x20) != 0;
    pes.es_rate_flag = (b2 & 0x10) != 0;
    pes.dsm_trick_mode_flag = (b2 & 0x08) != 0;
    pes.additional_copy_info_flag = (b2 & 0x04) != 0;
    pes.crc_flag = (b2 & 0x02) != 0;
    pes.extension_flag = (b2 & 0x01) != 0;

    let mut pos = 6;
    if matches!(pes.pts_dts_flags, 2 | 3) {
        pes.pts = Some(read_timestamp(data, pos)?);
        pos += 5;
    }
    if pes.pts_dts_flags == 3 {
        pes.dts = Some(read_timestamp(data, pos)?);
    }

    Ok(pes)
}

/// Reads a 33-bit marker-interleaved PTS/DTS:
/// `(b1 & 0x0E) << 29 | (b23 >> 1) << 15 | (b45 >> 1)`.
fn read_timestamp(data: &[u8], pos: usize) -> Result<u64> {
    if pos + 5 > data.len() {
        return Err(TsmonError::Parser("PES timestamp too short".into()));
    }
    let b1 = data[pos] as u64;
    let b23 = u16::from_be_bytes([data[pos + 1], data[pos + 2]]) as u64;
    let b45 = u16::from_be_bytes([data[pos + 3], data[pos + 4]]) as u64;
    Ok(((b1 & 0x0E) << 29) + ((b23 >> 1) << 15) + (b45 >> 1))
}
