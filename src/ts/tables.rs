use super::descriptor::{decode_descriptors, Descriptor};
use crate::error::{Result, TsmonError};
use crate::utils::Crc32Mpeg2;

/// One entry of the PAT program loop
///
/// program_number 0 maps to a network PID; every other program_number maps
/// to the PID carrying that program's PMT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PATEntry {
    /// Program number (16-bit); 0 designates the network entry
    pub program_number: u16,
    /// PID of the Network Information Table, set when program_number is 0
    pub network_pid: Option<u16>,
    /// PID of the program's PMT, set when program_number is not 0
    pub program_map_pid: Option<u16>,
}

/// Program Association Table
///
/// Carried on PID 0x0000; maps program numbers to PMT PIDs and anchors the
/// whole program topology.
#[derive(Debug, Clone, Default)]
pub struct PAT {
    /// Table ID, 0x00 on a conforming PAT
    pub table_id: u8,
    /// Transport stream identifier
    pub transport_stream_id: u16,
    /// Version number (5-bit)
    pub version_number: u8,
    /// Current/next indicator
    pub current_next: bool,
    /// Section number
    pub section_number: u8,
    /// Last section number
    pub last_section_number: u8,
    /// Program loop entries
    pub programs: Vec<PATEntry>,
    /// CRC-32 stored in the section
    pub crc32: u32,
    /// Whether the stored CRC matched the computed one
    pub crc32_ok: bool,
}

/// One elementary stream entry of a PMT
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ESEntry {
    /// Elementary stream type code
    pub stream_type: u8,
    /// PID carrying the elementary stream (13-bit)
    pub elementary_pid: u16,
}

/// Program Map Table
///
/// Lists the elementary streams of one program, the PID carrying the
/// program's PCR and the program-level descriptors.
#[derive(Debug, Clone, Default)]
pub struct PMT {
    /// Table ID, 0x02 on a conforming PMT
    pub table_id: u8,
    /// Program number this PMT describes
    pub program_number: u16,
    /// Version number (5-bit)
    pub version_number: u8,
    /// Current/next indicator
    pub current_next: bool,
    /// Section number
    pub section_number: u8,
    /// Last section number
    pub last_section_number: u8,
    /// PID carrying the PCR for this program
    pub pcr_pid: u16,
    /// Program-level descriptors
    pub descriptors: Vec<Descriptor>,
    /// Elementary streams of the program
    pub streams: Vec<ESEntry>,
    /// CRC-32 stored in the section
    pub crc32: u32,
    /// Whether the stored CRC matched the computed one
    pub crc32_ok: bool,
}

/// Conditional Access Table
///
/// Carried on PID 0x0001; associates CA systems with their EMM PIDs via
/// CA descriptors.
#[derive(Debug, Clone, Default)]
pub struct CAT {
    /// Table ID, 0x01 on a conforming CAT
    pub table_id: u8,
    /// Version number (5-bit)
    pub version_number: u8,
    /// Current/next indicator
    pub current_next: bool,
    /// Section number
    pub section_number: u8,
    /// Last section number
    pub last_section_number: u8,
    /// CA descriptors
    pub descriptors: Vec<Descriptor>,
    /// CRC-32 stored in the section
    pub crc32: u32,
    /// Whether the stored CRC matched the computed one
    pub crc32_ok: bool,
}

/// One service of an SDT
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SDTService {
    /// Service identifier (matches a PAT program_number for local services)
    pub service_id: u16,
    /// EIT schedule flag
    pub eit_schedule_flag: bool,
    /// EIT present/following flag
    pub eit_present_following_flag: bool,
    /// Running status (3-bit)
    pub running_status: u8,
    /// Free CA mode: true when one or more streams are scrambled
    pub free_ca_mode: bool,
    /// Service descriptors
    pub descriptors: Vec<Descriptor>,
}

/// Service Description Table
///
/// Carried on PID 0x0011 with table_id 0x42 (actual transport stream) or
/// 0x46 (other transport stream).
#[derive(Debug, Clone, Default)]
pub struct SDT {
    /// Table ID, 0x42 or 0x46
    pub table_id: u8,
    /// Transport stream identifier
    pub transport_stream_id: u16,
    /// Version number (5-bit)
    pub version_number: u8,
    /// Current/next indicator
    pub current_next: bool,
    /// Section number
    pub section_number: u8,
    /// Last section number
    pub last_section_number: u8,
    /// Original network identifier
    pub original_network_id: u16,
    /// Described services
    pub services: Vec<SDTService>,
    /// CRC-32 stored in the section
    pub crc32: u32,
    /// Whether the stored CRC matched the computed one
    pub crc32_ok: bool,
}

/// One transport stream entry of a BAT
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BATTransportStream {
    /// Transport stream identifier
    pub transport_stream_id: u16,
    /// Original network identifier
    pub original_network_id: u16,
    /// Per-transport-stream descriptors
    pub descriptors: Vec<Descriptor>,
}

/// Bouquet Association Table
///
/// Carried on PID 0x0011 with table_id 0x4A; groups services into
/// bouquets across transport streams.
#[derive(Debug, Clone, Default)]
pub struct BAT {
    /// Table ID, 0x4A
    pub table_id: u8,
    /// Bouquet identifier
    pub bouquet_id: u16,
    /// Version number (5-bit)
    pub version_number: u8,
    /// Current/next indicator
    pub current_next: bool,
    /// Section number
    pub section_number: u8,
    /// Last section number
    pub last_section_number: u8,
    /// Bouquet-level descriptors
    pub descriptors: Vec<Descriptor>,
    /// Transport stream loop
    pub transport_streams: Vec<BATTransportStream>,
    /// CRC-32 stored in the section
    pub crc32: u32,
    /// Whether the stored CRC matched the computed one
    pub crc32_ok: bool,
}

/// Decoder for reassembled PSI/SI sections.
///
/// Every decoder takes the section bytes starting at the pointer_field and
/// verifies CRC-32/MPEG-2 over `[pointer_field+1 .. pos_crc)`. A CRC
/// mismatch never fails the decode: the table comes back with
/// `crc32_ok = false` so that statistics can count the error.
#[derive(Default)]
pub struct SectionDecoder {
    crc: Crc32Mpeg2,
}

impl SectionDecoder {
    /// Creates a decoder with its CRC table.
    pub fn new() -> Self {
        Self {
            crc: Crc32Mpeg2::new(),
        }
    }

    /// Decodes a Program Association Table section.
    pub fn decode_pat(&self, data: &[u8]) -> Result<PAT> {
        let pos = section_start(data)?;
        let mut pat = PAT {
            table_id: read_u8(data, pos)?,
            ..Default::default()
        };
        let section_length = (read_u16(data, pos + 1)? & 0x0FFF) as usize;
        pat.transport_stream_id = read_u16(data, pos + 3)?;
        let b = read_u8(data, pos + 5)?;
        pat.version_number = (b & 0x3E) >> 1;
        pat.current_next = (b & 0x01) != 0;
        pat.section_number = read_u8(data, pos + 6)?;
        pat.last_section_number = read_u8(data, pos + 7)?;

        let mut pos2 = pos + 8;
        let entries = (section_length as isize - 9) / 2 - 1;
        for _ in 0..entries.max(0) {
            let program_number = read_u16(data, pos2)?;
            let pid = read_u16(data, pos2 + 2)? & 0x1FFF;
            pat.programs.push(if program_number == 0 {
                PATEntry {
                    program_number,
                    network_pid: Some(pid),
                    program_map_pid: None,
                }
            } else {
                PATEntry {
                    program_number,
                    network_pid: None,
                    program_map_pid: Some(pid),
                }
            });
            pos2 += 4;
        }

        self.finish_crc(data, pos, pos2, &mut pat.crc32, &mut pat.crc32_ok);
        Ok(pat)
    }

    /// Decodes a Program Map Table section.
    pub fn decode_pmt(&self, data: &[u8]) -> Result<PMT> {
        let pos = section_start(data)?;
        let mut pmt = PMT {
            table_id: read_u8(data, pos)?,
            ..Default::default()
        };
        let section_length = (read_u16(data, pos + 1)? & 0x0FFF) as usize;
        if section_length < 13 {
            return Err(TsmonError::Parser("PMT section too short".into()));
        }
        let pos_crc = pos + 3 + section_length - 4;
        pmt.program_number = read_u16(data, pos + 3)?;
        let b = read_u8(data, pos + 5)?;
        pmt.version_number = (b & 0x3E) >> 1;
        pmt.current_next = (b & 0x01) != 0;
        pmt.section_number = read_u8(data, pos + 6)?;
        pmt.last_section_number = read_u8(data, pos + 7)?;
        pmt.pcr_pid = read_u16(data, pos + 8)? & 0x1FFF;
        let program_info_length = (read_u16(data, pos + 10)? & 0x0FFF) as usize;

        let mut pos2 = pos + 12;
        if program_info_length > 0 {
            pmt.descriptors = decode_descriptors(slice(data, pos2, program_info_length)?)?;
        }
        pos2 += program_info_length;

        while pos2 < pos_crc {
            let stream_type = read_u8(data, pos2)?;
            let elementary_pid = read_u16(data, pos2 + 1)? & 0x1FFF;
            let es_info_length = (read_u16(data, pos2 + 3)? & 0x0FFF) as usize;
            pmt.streams.push(ESEntry {
                stream_type,
                elementary_pid,
            });
            // ES descriptors are skipped; only their length matters here
            pos2 += 5 + es_info_length;
        }

        self.finish_crc(data, pos, pos_crc, &mut pmt.crc32, &mut pmt.crc32_ok);
        Ok(pmt)
    }

    /// Decodes a Conditional Access Table section.
    pub fn decode_cat(&self, data: &[u8]) -> Result<CAT> {
        let pos = section_start(data)?;
        let mut cat = CAT {
            table_id: read_u8(data, pos)?,
            ..Default::default()
        };
        let section_length = (read_u16(data, pos + 1)? & 0x0FFF) as usize;
        if section_length < 9 {
            return Err(TsmonError::Parser("CAT section too short".into()));
        }
        let pos_crc = pos + 3 + section_length - 4;
        let b = read_u8(data, pos + 5)?;
        cat.version_number = (b & 0x3E) >> 1;
        cat.current_next = (b & 0x01) != 0;
        cat.section_number = read_u8(data, pos + 6)?;
        cat.last_section_number = read_u8(data, pos + 7)?;

        let pos2 = pos + 8;
        if pos2 < pos_crc {
            cat.descriptors = decode_descriptors(slice(data, pos2, pos_crc - pos2)?)?;
        }

        self.finish_crc(data, pos, pos_crc, &mut cat.crc32, &mut cat.crc32_ok);
        Ok(cat)
    }

    /// Decodes a Service Description Table section (actual or other).
    pub fn decode_sdt(&self, data: &[u8]) -> Result<SDT> {
        let pos = section_start(data)?;
        let mut sdt = SDT {
            table_id: read_u8(data, pos)?,
            ..Default::default()
        };
        let section_length = (read_u16(data, pos + 1)? & 0x0FFF) as usize;
        if section_length < 12 {
            return Err(TsmonError::Parser("SDT section too short".into()));
        }
        let pos_crc = pos + 3 + section_length - 4;
        sdt.transport_stream_id = read_u16(data, pos + 3)?;
        let b = read_u8(data, pos + 5)?;
        sdt.version_number = (b & 0x3E) >> 1;
        sdt.current_next = (b & 0x01) != 0;
        sdt.section_number = read_u8(data, pos + 6)?;
        sdt.last_section_number = read_u8(data, pos + 7)?;
        sdt.original_network_id = read_u16(data, pos + 8)?;

        // one reserved byte after original_network_id
        let mut pos2 = pos + 11;
        while pos2 < pos_crc {
            let service_id = read_u16(data, pos2)?;
            let b34 = read_u8(data, pos2 + 2)?;
            let b56 = read_u16(data, pos2 + 3)?;
            let descriptors_loop_length = (b56 & 0x0FFF) as usize;
            pos2 += 5;
            let descriptors = if descriptors_loop_length > 0 {
                let descriptors =
                    decode_descriptors(slice(data, pos2, descriptors_loop_length)?)?;
                pos2 += descriptors_loop_length;
                descriptors
            } else {
                Vec::new()
            };
            sdt.services.push(SDTService {
                service_id,
                eit_schedule_flag: (b34 & 0x02) != 0,
                eit_present_following_flag: (b34 & 0x01) != 0,
                running_status: ((b56 & 0xE000) >> 13) as u8,
                free_ca_mode: (b56 & 0x1000) != 0,
                descriptors,
            });
        }

        self.finish_crc(data, pos, pos_crc, &mut sdt.crc32, &mut sdt.crc32_ok);
        Ok(sdt)
    }

    /// Decodes a Bouquet Association Table section.
    pub fn decode_bat(&self, data: &[u8]) -> Result<BAT> {
        let pos = section_start(data)?;
        let mut bat = BAT {
            table_id: read_u8(data, pos)?,
            ..Default::default()
        };
        let section_length = (read_u16(data, pos + 1)? & 0x0FFF) as usize;
        if section_length < 13 {
            return Err(TsmonError::Parser("BAT section too short".into()));
        }
        let pos_crc = pos + 3 + section_length - 4;
        bat.bouquet_id = read_u16(data, pos + 3)?;
        let b = read_u8(data, pos + 5)?;
        bat.version_number = (b & 0x3E) >> 1;
        bat.current_next = (b & 0x01) != 0;
        bat.section_number = read_u8(data, pos + 6)?;
        bat.last_section_number = read_u8(data, pos + 7)?;
        let descriptors_length = (read_u16(data, pos + 8)? & 0x0FFF) as usize;

        let mut pos2 = pos + 10;
        if descriptors_length > 0 {
            bat.descriptors = decode_descriptors(slice(data, pos2, descriptors_length)?)?;
        }
        pos2 += descriptors_length;

        let transport_stream_loop_length = (read_u16(data, pos2)? & 0x0FFF) as usize;
        pos2 += 2;
        let loop_end = pos2 + transport_stream_loop_length;
        while pos2 < loop_end {
            let transport_stream_id = read_u16(data, pos2)?;
            let original_network_id = read_u16(data, pos2 + 2)?;
            let descriptors_loop_length = (read_u16(data, pos2 + 4)? & 0x0FFF) as usize;
            pos2 += 6;
            let descriptors = if descriptors_loop_length > 0 {
                let descriptors =
                    decode_descriptors(slice(data, pos2, descriptors_loop_length)?)?;
                pos2 += descriptors_loop_length;
                descriptors
            } else {
                Vec::new()
            };
            bat.transport_streams.push(BATTransportStream {
                transport_stream_id,
                original_network_id,
                descriptors,
            });
        }

        self.finish_crc(data, pos, pos_crc, &mut bat.crc32, &mut bat.crc32_ok);
        Ok(bat)
    }

    /// Verifies only the CRC of a section without decoding its body.
    ///
    /// Used for PID 17 tables nobody subscribed to; any structural problem
    /// reports as a failed check.
    pub fn check_crc_only(&self, data: &[u8]) -> bool {
        let Ok(pos) = section_start(data) else {
            return false;
        };
        let Ok(b12) = read_u16(data, pos + 1) else {
            return false;
        };
        let section_length = (b12 & 0x0FFF) as usize;
        if section_length < 4 {
            return false;
        }
        let pos_crc = pos + 3 + section_length - 4;
        let Ok(stored) = read_u32(data, pos_crc) else {
            return false;
        };
        stored == self.crc.calculate(&data[pos..pos_crc])
    }

    /// Reads the stored CRC at `pos_crc` and compares it with the CRC
    /// computed over `[pos .. pos_crc)`.
    fn finish_crc(&self, data: &[u8], pos: usize, pos_crc: usize, crc32: &mut u32, ok: &mut bool) {
        match read_u32(data, pos_crc) {
            Ok(stored) => {
                *crc32 = stored;
                *ok = stored == self.crc.calculate(&data[pos..pos_crc]);
            }
            Err(_) => {
                log::warn!("section CRC field unreadable");
                *ok = false;
            }
        }
    }
}

/// Position of the table_id byte: one past the pointer_field skip.
fn section_start(data: &[u8]) -> Result<usize> {
    let pointer = *data
        .first()
        .ok_or_else(|| TsmonError::Parser("empty section".into()))? as usize;
    Ok(1 + pointer)
}

fn read_u8(data: &[u8], pos: usize) -> Result<u8> {
    data.get(pos)
        .copied()
        .ok_or_else(|| TsmonError::Parser("section truncated".into()))
}

fn read_u16(data: &[u8], pos: usize) -> Result<u16> {
    if pos + 2 > data.len() {
        return Err(TsmonError::Parser("section truncated".into()));
    }
    Ok(u16::from_be_bytes([data[pos], data[pos + 1]]))
}

fn read_u32(data: &[u8], pos: usize) -> Result<u32> {
    if pos + 4 > data.len() {
        return Err(TsmonError::Parser("section truncated".into()));
    }
    Ok(u32::from_be_bytes([
        data[pos],
        data[pos + 1],
        data[pos + 2],
        data[pos + 3],
    ]))
}

fn slice(data: &[u8], pos: usize, len: usize) -> Result<&[u8]> {
    data.get(pos..pos + len)
        .ok_or_else(|| TsmonError::Parser("section truncated".into()))
}
