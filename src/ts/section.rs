use std::collections::HashMap;

/// Reassembles PSI/SI sections that cross packet boundaries.
///
/// The first packet of a section carries a one-byte pointer_field at the
/// start of its payload; the section header then announces a 12-bit
/// section_length counting the bytes after the length field, so the whole
/// section occupies `1 + pointer_field + 3 + section_length` payload bytes.
///
/// At most one buffer exists per PID, and a buffer never grows beyond the
/// size declared by its section header. Lost packets are not detected
/// here; loss surfaces through continuity-counter checks and through the
/// CRC of the reassembled section.
#[derive(Debug, Default)]
pub struct SectionReassembler {
    buffers: HashMap<u16, SectionBuffer>,
}

#[derive(Debug)]
struct SectionBuffer {
    needed: usize,
    data: Vec<u8>,
}

impl SectionReassembler {
    /// Creates an empty reassembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one packet's payload for `pid`.
    ///
    /// `unit_start` is the packet's PUSI bit. Returns the complete section
    /// bytes (starting at the pointer_field) once the declared size has
    /// been accumulated; the per-PID buffer is released at that point.
    ///
    /// A payload that neither starts a section nor continues an open
    /// buffer is ignored: a section cannot be joined mid-flight.
    pub fn feed(&mut self, pid: u16, payload: &[u8], unit_start: bool) -> Option<Vec<u8>> {
        if let Some(buffer) = self.buffers.get_mut(&pid) {
            buffer.data.extend_from_slice(payload);
            if buffer.data.len() >= buffer.needed {
                return self.buffers.remove(&pid).map(|buffer| buffer.data);
            }
            return None;
        }

        if !unit_start {
            return None;
        }

        let needed = match Self::declared_size(payload) {
            Some(needed) => needed,
            None => {
                log::warn!("section header truncated on PID 0x{:04X}", pid);
                return None;
            }
        };

        if payload.len() >= needed {
            return Some(payload.to_vec());
        }

        self.buffers.insert(
            pid,
            SectionBuffer {
                needed,
                data: payload.to_vec(),
            },
        );
        None
    }

    /// Total payload bytes the section starting in `payload` occupies, or
    /// `None` when the pointer and section header cannot be read.
    fn declared_size(payload: &[u8]) -> Option<usize> {
        let pointer = *payload.first()? as usize;
        let base = 1 + pointer;
        if payload.len() < base + 3 {
            return None;
        }
        let section_length = (((payload[base + 1] & 0x0F) as usize) << 8) | payload[base + 2] as usize;
        Some(base + 3 + section_length)
    }

    /// True when a buffer is open for `pid`.
    pub fn is_buffering(&self, pid: u16) -> bool {
        self.buffers.contains_key(&pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    /// Builds a section payload: pointer_field, table_id, section_length,
    /// `body_len` filler bytes standing in for body + CRC.
    fn section_bytes(pointer: u8, table_id: u8, body_len: usize) -> Vec<u8> {
        let section_length = body_len + 2; // two header bytes after the length field
        let mut data = vec![pointer];
        data.extend(std::iter::repeat(0xAA).take(pointer as usize));
        data.push(table_id);
        data.push(0xB0 | ((section_length >> 8) as u8 & 0x0F));
        data.push((section_length & 0xFF) as u8);
        data.push(0x00);
        data.push(0x01);
        data.extend((0..body_len).map(|i| i as u8));
        data
    }

    #[test]
    fn test_section_within_one_payload() {
        let mut reasm = SectionReassembler::new();
        let section = section_bytes(0, 0x42, 20);
        let out = reasm.feed(17, &section, true).expect("complete");
        assert_eq!(out, section);
        assert!(!reasm.is_buffering(17));
    }

    #[test]
    fn test_section_across_two_payloads() {
        let mut reasm = SectionReassembler::new();
        let section = section_bytes(0, 0x4A, 300);
        let (a, b) = section.split_at(184);

        assert!(reasm.feed(17, a, true).is_none());
        assert!(reasm.is_buffering(17));
        let out = reasm.feed(17, b, false).expect("complete");
        assert_eq!(out, section);
        assert!(!reasm.is_buffering(17));
    }

    #[test]
    fn test_pointer_field_offsets_the_header() {
        let mut reasm = SectionReassembler::new();
        let section = section_bytes(5, 0x02, 250);
        let (a, b) = section.split_at(184);

        assert!(reasm.feed(0x20, a, true).is_none());
        let out = reasm.feed(0x20, b, false).expect("complete");
        assert_eq!(out, section);
    }

    #[test]
    fn test_continuation_without_buffer_is_ignored() {
        let mut reasm = SectionReassembler::new();
        assert!(reasm.feed(17, &[0xAA; 184], false).is_none());
        assert!(!reasm.is_buffering(17));
    }

    #[test]
    fn test_buffers_are_independent_per_pid() {
        let mut reasm = SectionReassembler::new();
        let s1 = section_bytes(0, 0x02, 200);
        let s2 = section_bytes(0, 0x02, 220);

        assert!(reasm.feed(0x20, &s1[..184], true).is_none());
        assert!(reasm.feed(0x21, &s2[..184], true).is_none());
        assert_eq!(reasm.feed(0x20, &s1[184..], false), Some(s1.clone()));
        assert_eq!(reasm.feed(0x21, &s2[184..], false), Some(s2.clone()));
    }

    /// Splitting a section into arbitrary fragments must reproduce the
    /// same reassembled bytes as feeding it whole.
    #[quickcheck]
    fn prop_reassembly_is_split_invariant(cuts: Vec<u16>) -> bool {
        let section = section_bytes(2, 0x46, 600);
        let mut points: Vec<usize> = cuts
            .into_iter()
            .take(8)
            .map(|c| 1 + (c as usize) % (section.len() - 1))
            .collect();
        points.sort_unstable();
        points.dedup();

        let mut reasm = SectionReassembler::new();
        let mut result = None;
        let mut start = 0;
        let mut first = true;
        for point in points.into_iter().chain(std::iter::once(section.len())) {
            if let Some(out) = reasm.feed(17, &section[start..point], first) {
                result = Some(out);
            }
            first = false;
            start = point;
        }
        result.as_deref() == Some(&section[..])
    }
}
