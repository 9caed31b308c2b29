use super::framer::{Framed, Framer};
use super::packet::{TSPacket, TSPacketParser};
use super::pes::{decode_pes, PESHeader};
use super::registry::ProgramRegistry;
use super::section::SectionReassembler;
use super::tables::{SectionDecoder, BAT, CAT, PAT, PMT, SDT};
use super::{
    PID_CAT, PID_NULL, PID_PAT, PID_SDT, TABLE_ID_BAT, TABLE_ID_SDT_ACTUAL, TABLE_ID_SDT_OTHER,
};
use crate::event::Event;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Context published on `onPacketDecoded` for every framed packet.
///
/// Tables are attached only on the packet that completed their section;
/// `crc32_ok` carries the CRC verdict of that section so statistics can
/// raise `CRC_error` without re-decoding.
#[derive(Debug, Clone)]
pub struct PacketEvent {
    /// The decoded packet
    pub packet: TSPacket,
    /// Resync offset the framer applied before this packet
    pub resync: usize,
    /// PAT completed by this packet
    pub pat: Option<PAT>,
    /// PMT completed by this packet
    pub pmt: Option<PMT>,
    /// CAT completed by this packet
    pub cat: Option<CAT>,
    /// CRC verdict of whatever section this packet completed
    pub crc32_ok: Option<bool>,
    /// True when the packet's PID carries a PCR for an installed program
    pub is_pcr_pid: bool,
    /// PES header found at the start of this packet's payload
    pub pes: Option<PESHeader>,
}

/// Payload of the table channels: the table plus a snapshot of the
/// registry as of its installation.
#[derive(Debug, Clone)]
pub struct TableEvent<T> {
    /// Arrival timestamp of the packet that completed the table
    pub dt: DateTime<Utc>,
    /// Registry state after the table was installed
    pub registry: ProgramRegistry,
    /// The decoded table
    pub table: T,
}

/// The demultiplexer's named event channels.
pub struct DemuxerEvents {
    /// Fired for each decoded packet; drives the statistics engine
    pub on_packet_decoded: Event<PacketEvent>,
    /// Fired when a PAT is first received or updated
    pub on_pat_received: Event<TableEvent<PAT>>,
    /// Fired when a PMT is first received or updated
    pub on_pmt_received: Event<TableEvent<PMT>>,
    /// Fired when a CAT is first received or updated
    pub on_cat_received: Event<TableEvent<CAT>>,
    /// Fired once for the SDT describing a PAT program
    pub on_program_sdt_received: Event<TableEvent<SDT>>,
    /// Fired for every SDT when subscribed
    pub on_sdt_received: Event<TableEvent<SDT>>,
    /// Fired for every BAT when subscribed
    pub on_bat_received: Event<TableEvent<BAT>>,
    /// Reserved: fired when a NIT decoder exists; carries the raw section
    pub on_nit_received: Event<TableEvent<Vec<u8>>>,
}

impl Default for DemuxerEvents {
    fn default() -> Self {
        Self {
            on_packet_decoded: Event::new("onPacketDecoded"),
            on_pat_received: Event::new("onPatReceived"),
            on_pmt_received: Event::new("onPmtReceived"),
            on_cat_received: Event::new("onCatReceived"),
            on_program_sdt_received: Event::new("onProgramSdtReceived"),
            on_sdt_received: Event::new("onSdtReceived"),
            on_bat_received: Event::new("onBatReceived"),
            on_nit_received: Event::new("onNitReceived"),
        }
    }
}

/// Streaming MPEG-TS demultiplexer.
///
/// Bytes pushed into the demuxer are framed into packets, decoded, routed
/// by PID, reflected into the program registry and published on the event
/// channels. All work happens synchronously on the calling thread; event
/// handlers must not block.
pub struct TSDemuxer {
    framer: Framer,
    parser: TSPacketParser,
    reassembler: SectionReassembler,
    decoder: SectionDecoder,
    registry: ProgramRegistry,
    known_pids: HashSet<u16>,
    /// Event channels of this demuxer
    pub events: DemuxerEvents,
}

impl Default for TSDemuxer {
    fn default() -> Self {
        Self::new()
    }
}

impl TSDemuxer {
    /// Creates a demuxer with an empty registry.
    pub fn new() -> Self {
        // Reserved PID assignments: PSI on 0-3, DVB SI on 16-22, inband
        // signalling / measurement / DIT / SIT on 28-31, ATSC MGT
        // metadata, null packets.
        let known_pids = [
            0x0000, 0x0001, 0x0002, 0x0003, 0x0010, 0x0011, 0x0012, 0x0013, 0x0014, 0x0015,
            0x0016, 0x001C, 0x001D, 0x001E, 0x001F, 0x1FFB, 0x1FFF,
        ]
        .into_iter()
        .collect();

        Self {
            framer: Framer::new(),
            parser: TSPacketParser::new(),
            reassembler: SectionReassembler::new(),
            decoder: SectionDecoder::new(),
            registry: ProgramRegistry::new(),
            known_pids,
            events: DemuxerEvents::default(),
        }
    }

    /// The current program topology.
    pub fn registry(&self) -> &ProgramRegistry {
        &self.registry
    }

    /// Pushes one datagram or file chunk into the demuxer.
    ///
    /// `dt` is the arrival timestamp attached to every packet framed out
    /// of this buffer.
    pub fn push(&mut self, data: &[u8], dt: DateTime<Utc>) {
        for framed in self.framer.clone().frame(data) {
            match framed {
                Framed::Drop { len } => {
                    log::debug!("dropped {} unframeable bytes", len);
                }
                Framed::Packet { raw, resync } => self.handle_packet(raw, resync, dt),
            }
        }
    }

    fn handle_packet(&mut self, raw: &[u8], resync: usize, dt: DateTime<Utc>) {
        let packet = self.parser.parse(raw, dt);

        if packet.error.is_some() {
            // Seen-PID packet with no semantics.
            let is_pcr_pid = self.registry.is_pcr_pid(packet.pid);
            self.fire_packet(PacketEvent {
                is_pcr_pid,
                ..basic_event(packet, resync)
            });
            return;
        }

        match packet.pid {
            PID_PAT => self.handle_pat(raw, packet, resync),
            PID_CAT => self.handle_cat(raw, packet, resync),
            PID_SDT => self.handle_pid_17(raw, packet, resync),
            pid if self.registry.pmt_pids().contains(&pid) => {
                self.handle_pmt(raw, packet, resync)
            }
            pid if self.registry.net_pids().contains(&pid) => {
                log::warn!("NIT on PID 0x{:04X} - no decoder", pid);
                self.fire_packet(basic_event(packet, resync));
            }
            pid if self.registry.stream_pids().contains(&pid) => {
                self.handle_stream(raw, packet, resync)
            }
            pid if self.registry.other_pids().contains(&pid) => {
                let is_pcr_pid = self.registry.is_pcr_pid(pid);
                self.fire_packet(PacketEvent {
                    is_pcr_pid,
                    ..basic_event(packet, resync)
                });
            }
            pid if pid != PID_NULL && self.known_pids.contains(&pid) => {
                log::debug!("known PID 0x{:04X} - no decoder", pid);
                self.fire_packet(basic_event(packet, resync));
            }
            _ => self.fire_packet(basic_event(packet, resync)),
        }
    }

    fn handle_pat(&mut self, raw: &[u8], packet: TSPacket, resync: usize) {
        let Some(section) = self.reassemble(raw, &packet) else {
            self.fire_packet(basic_event(packet, resync));
            return;
        };
        let pat = match self.decoder.decode_pat(&section) {
            Ok(pat) => pat,
            Err(err) => {
                log::warn!("PAT parsing error: {}", err);
                self.fire_packet(basic_event(packet, resync));
                return;
            }
        };

        if self.registry.pat().is_none() {
            self.registry.set_pat(pat.clone());
            if self.events.on_pat_received.has_subscribers() {
                let event = self.table_event(packet.dt, pat.clone());
                self.events.on_pat_received.fire(&event);
            }
        } else if let Some(installed) = self.registry.pat() {
            if pat.crc32 != installed.crc32 && pat.crc32_ok {
                log_pat_update(installed, &pat);
                self.registry.update_pat(pat.clone());
                if self.events.on_pat_received.has_subscribers() {
                    let event = self.table_event(packet.dt, pat.clone());
                    self.events.on_pat_received.fire(&event);
                }
            }
        }

        let crc32_ok = Some(pat.crc32_ok);
        self.fire_packet(PacketEvent {
            pat: Some(pat),
            crc32_ok,
            ..basic_event(packet, resync)
        });
    }

    fn handle_cat(&mut self, raw: &[u8], packet: TSPacket, resync: usize) {
        let Some(section) = self.reassemble(raw, &packet) else {
            self.fire_packet(basic_event(packet, resync));
            return;
        };
        let cat = match self.decoder.decode_cat(&section) {
            Ok(cat) => cat,
            Err(err) => {
                log::warn!("CAT parsing error: {}", err);
                self.fire_packet(basic_event(packet, resync));
                return;
            }
        };

        if self.registry.cat().is_none() {
            self.registry.set_cat(cat.clone());
            if self.events.on_cat_received.has_subscribers() {
                let event = self.table_event(packet.dt, cat.clone());
                self.events.on_cat_received.fire(&event);
            }
        } else if let Some(installed) = self.registry.cat() {
            if cat.crc32 != installed.crc32 && cat.crc32_ok {
                log::warn!("CAT updated");
                self.registry.update_cat(cat.clone());
                if self.events.on_cat_received.has_subscribers() {
                    let event = self.table_event(packet.dt, cat.clone());
                    self.events.on_cat_received.fire(&event);
                }
            }
        }

        let crc32_ok = Some(cat.crc32_ok);
        self.fire_packet(PacketEvent {
            cat: Some(cat),
            crc32_ok,
            ..basic_event(packet, resync)
        });
    }

    fn handle_pmt(&mut self, raw: &[u8], packet: TSPacket, resync: usize) {
        let Some(section) = self.reassemble(raw, &packet) else {
            self.fire_packet(basic_event(packet, resync));
            return;
        };
        let pmt = match self.decoder.decode_pmt(&section) {
            Ok(pmt) => pmt,
            Err(err) => {
                log::warn!("PMT parsing error: {}", err);
                self.fire_packet(basic_event(packet, resync));
                return;
            }
        };

        let pid = packet.pid;
        let installed_crc = self.registry.prog_pmt(pid).map(|p| p.crc32);
        match installed_crc {
            None => {
                self.registry.set_prog_pmt(pid, pmt.clone());
                if self.events.on_pmt_received.has_subscribers() {
                    let event = self.table_event(packet.dt, pmt.clone());
                    self.events.on_pmt_received.fire(&event);
                }
            }
            Some(crc) if pmt.crc32 != crc && pmt.crc32_ok => {
                if let Some(installed) = self.registry.prog_pmt(pid) {
                    log_pmt_update(pid, installed, &pmt);
                }
                self.registry.update_prog_pmt(pid, pmt.clone());
                if self.events.on_pmt_received.has_subscribers() {
                    let event = self.table_event(packet.dt, pmt.clone());
                    self.events.on_pmt_received.fire(&event);
                }
            }
            _ => {}
        }

        let crc32_ok = Some(pmt.crc32_ok);
        self.fire_packet(PacketEvent {
            pmt: Some(pmt),
            crc32_ok,
            ..basic_event(packet, resync)
        });
    }

    fn handle_pid_17(&mut self, raw: &[u8], packet: TSPacket, resync: usize) {
        let Some(section) = self.reassemble(raw, &packet) else {
            self.fire_packet(basic_event(packet, resync));
            return;
        };

        // The reassembled section determines the decoder: PID 17 carries
        // SDT actual/other and BAT interleaved.
        let table_id = section
            .first()
            .map(|&pointer| 1 + pointer as usize)
            .and_then(|pos| section.get(pos))
            .copied();

        let parse_sdt = self.events.on_sdt_received.has_subscribers()
            || (self.events.on_program_sdt_received.has_subscribers()
                && self.registry.sdt().is_none());
        let parse_bat = self.events.on_bat_received.has_subscribers();

        match table_id {
            Some(TABLE_ID_SDT_ACTUAL) => {
                match self.decoder.decode_sdt(&section) {
                    Ok(sdt) => self.dispatch_sdt(sdt, packet, resync),
                    Err(err) => {
                        log::warn!("SDT parsing error: {}", err);
                        self.fire_packet(basic_event(packet, resync));
                    }
                }
            }
            Some(TABLE_ID_SDT_OTHER) => {
                if parse_sdt {
                    match self.decoder.decode_sdt(&section) {
                        Ok(sdt) => self.dispatch_sdt(sdt, packet, resync),
                        Err(err) => {
                            log::warn!("SDT parsing error: {}", err);
                            self.fire_packet(basic_event(packet, resync));
                        }
                    }
                } else {
                    let sdt = SDT {
                        table_id: TABLE_ID_SDT_OTHER,
                        crc32_ok: self.decoder.check_crc_only(&section),
                        ..Default::default()
                    };
                    self.dispatch_sdt(sdt, packet, resync);
                }
            }
            Some(TABLE_ID_BAT) => {
                if parse_bat {
                    match self.decoder.decode_bat(&section) {
                        Ok(bat) => self.dispatch_bat(bat, packet, resync),
                        Err(err) => {
                            log::warn!("BAT parsing error: {}", err);
                            self.fire_packet(basic_event(packet, resync));
                        }
                    }
                } else {
                    let bat = BAT {
                        table_id: TABLE_ID_BAT,
                        crc32_ok: self.decoder.check_crc_only(&section),
                        ..Default::default()
                    };
                    self.dispatch_bat(bat, packet, resync);
                }
            }
            other => {
                log::debug!("PID 17 table_id {:?} - no decoder", other);
                self.fire_packet(basic_event(packet, resync));
            }
        }
    }

    fn dispatch_sdt(&mut self, sdt: SDT, packet: TSPacket, resync: usize) {
        // A service whose service_id matches a PAT program number and which
        // carries a service descriptor describes the monitored program;
        // store it once, trimmed to that service.
        if self.events.on_program_sdt_received.has_subscribers()
            && self.registry.sdt().is_none()
        {
            let program_numbers: Option<HashSet<u16>> = self
                .registry
                .pat()
                .map(|pat| pat.programs.iter().map(|p| p.program_number).collect());
            if let Some(program_numbers) = program_numbers {
                let service = sdt
                    .services
                    .iter()
                    .find(|s| {
                        program_numbers.contains(&s.service_id)
                            && s.descriptors.iter().any(|d| d.tag() == 72)
                    })
                    .cloned();
                if let Some(service) = service {
                    let mut program_sdt = sdt.clone();
                    program_sdt.services = vec![service];
                    self.registry.set_sdt(program_sdt.clone());
                    let event = self.table_event(packet.dt, program_sdt);
                    self.events.on_program_sdt_received.fire(&event);
                }
            }
        }

        if self.events.on_sdt_received.has_subscribers() {
            let event = self.table_event(packet.dt, sdt.clone());
            self.events.on_sdt_received.fire(&event);
        }

        let crc32_ok = Some(sdt.crc32_ok);
        self.fire_packet(PacketEvent {
            crc32_ok,
            ..basic_event(packet, resync)
        });
    }

    fn dispatch_bat(&mut self, bat: BAT, packet: TSPacket, resync: usize) {
        if self.events.on_bat_received.has_subscribers() {
            let event = self.table_event(packet.dt, bat.clone());
            self.events.on_bat_received.fire(&event);
        }
        let crc32_ok = Some(bat.crc32_ok);
        self.fire_packet(PacketEvent {
            crc32_ok,
            ..basic_event(packet, resync)
        });
    }

    fn handle_stream(&mut self, raw: &[u8], packet: TSPacket, resync: usize) {
        let mut pes = None;
        if let Some(offset) = packet.payload_offset {
            let payload = &raw[offset..];
            if payload.len() >= 4 && payload[..3] == [0x00, 0x00, 0x01] && payload[3] >= 188 {
                match decode_pes(&payload[3..]) {
                    Ok(header) => pes = Some(header),
                    Err(err) => log::warn!("PES parsing error: {}", err),
                }
            }
        }

        let is_pcr_pid = self.registry.is_pcr_pid(packet.pid);
        self.fire_packet(PacketEvent {
            pes,
            is_pcr_pid,
            ..basic_event(packet, resync)
        });
    }

    /// Feeds the packet's payload to the section reassembler.
    fn reassemble(&mut self, raw: &[u8], packet: &TSPacket) -> Option<Vec<u8>> {
        let offset = packet.payload_offset?;
        self.reassembler
            .feed(packet.pid, &raw[offset..], packet.payload_unit_start)
    }

    fn fire_packet(&self, event: PacketEvent) {
        if self.events.on_packet_decoded.has_subscribers() {
            self.events.on_packet_decoded.fire(&event);
        }
    }

    /// Builds a table-channel payload with the registry as of now.
    fn table_event<T>(&self, dt: DateTime<Utc>, table: T) -> TableEvent<T> {
        TableEvent {
            dt,
            registry: self.registry.clone(),
            table,
        }
    }
}

fn basic_event(packet: TSPacket, resync: usize) -> PacketEvent {
    PacketEvent {
        packet,
        resync,
        pat: None,
        pmt: None,
        cat: None,
        crc32_ok: None,
        is_pcr_pid: false,
        pes: None,
    }
}

fn log_pat_update(old: &PAT, new: &PAT) {
    let mut detail = String::new();
    if old.transport_stream_id != new.transport_stream_id {
        detail.push_str(&format!(
            ": ts_id {} -> {}",
            old.transport_stream_id, new.transport_stream_id
        ));
    }
    if old.version_number != new.version_number {
        detail.push_str(&format!(
            ": version {} -> {}",
            old.version_number, new.version_number
        ));
    }
    if old.programs != new.programs {
        detail.push_str(": program loop changed");
    }
    log::warn!("PAT updated{}", detail);
}

fn log_pmt_update(pid: u16, old: &PMT, new: &PMT) {
    let mut detail = String::new();
    if old.program_number != new.program_number {
        detail.push_str(&format!(
            ": program {} -> {}",
            old.program_number, new.program_number
        ));
    }
    if old.pcr_pid != new.pcr_pid {
        detail.push_str(&format!(
            ": pcr_pid 0x{:04X} -> 0x{:04X}",
            old.pcr_pid, new.pcr_pid
        ));
    }
    if old.version_number != new.version_number {
        detail.push_str(&format!(
            ": version {} -> {}",
            old.version_number, new.version_number
        ));
    }
    if old.streams != new.streams {
        detail.push_str(": stream loop changed");
    }
    log::warn!("PMT on PID 0x{:04X} updated{}", pid, detail);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ts::{SYNC_BYTE, TS_PACKET_SIZE};
    use crate::utils::Crc32Mpeg2;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Appends the section CRC, as the tables module does in its tests.
    fn seal(mut section: Vec<u8>) -> Vec<u8> {
        let pointer = section[0] as usize;
        let crc = Crc32Mpeg2::new().calculate(&section[1 + pointer..]);
        section.extend_from_slice(&crc.to_be_bytes());
        section
    }

    /// Wraps a section into TS packets on `pid`, stuffing the tail.
    fn section_packets(pid: u16, cc_start: u8, section: &[u8]) -> Vec<Vec<u8>> {
        let mut packets = Vec::new();
        let mut cc = cc_start;
        let mut first = true;
        for chunk in section.chunks(TS_PACKET_SIZE - 4) {
            let mut raw = vec![0xFFu8; TS_PACKET_SIZE];
            raw[0] = SYNC_BYTE;
            raw[1] = if first { 0x40 } else { 0x00 } | ((pid >> 8) as u8 & 0x1F);
            raw[2] = (pid & 0xFF) as u8;
            raw[3] = 0x10 | (cc & 0x0F);
            raw[4..4 + chunk.len()].copy_from_slice(chunk);
            packets.push(raw);
            cc = (cc + 1) & 0x0F;
            first = false;
        }
        packets
    }

    fn sample_pat_section(version: u8, pmt_pid: u16) -> Vec<u8> {
        seal(vec![
            0x00,
            0x00,
            0xB0,
            0x0D,
            0x00,
            0x07,
            0xC1 | (version << 1),
            0x00,
            0x00,
            0x00,
            0x01,
            0xE0 | (pmt_pid >> 8) as u8,
            (pmt_pid & 0xFF) as u8,
        ])
    }

    fn sample_pmt_section(pcr_pid: u16, audio_pid: u16) -> Vec<u8> {
        seal(vec![
            0x00,
            0x02,
            0xB0,
            0x17, // section_length 23
            0x00,
            0x01,
            0xC1,
            0x00,
            0x00,
            0xE0 | (pcr_pid >> 8) as u8,
            (pcr_pid & 0xFF) as u8,
            0xF0,
            0x00, // no program descriptors
            0x1B,
            0xE0 | (pcr_pid >> 8) as u8,
            (pcr_pid & 0xFF) as u8,
            0xF0,
            0x00,
            0x03,
            0xE0 | (audio_pid >> 8) as u8,
            (audio_pid & 0xFF) as u8,
            0xF0,
            0x00,
        ])
    }

    fn push_all(demux: &mut TSDemuxer, packets: &[Vec<u8>]) {
        for packet in packets {
            demux.push(packet, Utc::now());
        }
    }

    #[test]
    fn test_pat_installs_and_fires_once() {
        let mut demux = TSDemuxer::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        demux.events.on_pat_received.subscribe(move |event| {
            assert_eq!(event.table.transport_stream_id, 7);
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let packets = section_packets(0, 0, &sample_pat_section(0, 0x100));
        push_all(&mut demux, &packets);
        // The identical PAT again: no update event.
        push_all(&mut demux, &packets);

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(demux.registry().pmt_pids().contains(&0x100));
    }

    #[test]
    fn test_pat_update_fires_again() {
        let mut demux = TSDemuxer::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        demux
            .events
            .on_pat_received
            .subscribe(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });

        push_all(&mut demux, &section_packets(0, 0, &sample_pat_section(0, 0x100)));
        push_all(&mut demux, &section_packets(0, 1, &sample_pat_section(1, 0x200)));

        assert_eq!(fired.load(Ordering::SeqCst), 2);
        assert!(demux.registry().pmt_pids().contains(&0x200));
        assert!(!demux.registry().pmt_pids().contains(&0x100));
    }

    #[test]
    fn test_pmt_routes_after_pat() {
        let mut demux = TSDemuxer::new();
        push_all(&mut demux, &section_packets(0, 0, &sample_pat_section(0, 0x100)));
        push_all(
            &mut demux,
            &section_packets(0x100, 0, &sample_pmt_section(0x200, 0x201)),
        );

        assert!(demux.registry().stream_pids().contains(&0x200));
        assert!(demux.registry().stream_pids().contains(&0x201));
        assert!(demux.registry().is_pcr_pid(0x200));
    }

    #[test]
    fn test_crc_bad_pmt_does_not_replace_installed() {
        let mut demux = TSDemuxer::new();
        push_all(&mut demux, &section_packets(0, 0, &sample_pat_section(0, 0x100)));
        push_all(
            &mut demux,
            &section_packets(0x100, 0, &sample_pmt_section(0x200, 0x201)),
        );

        let crc_flags = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&crc_flags);
        demux.events.on_packet_decoded.subscribe(move |event| {
            if let Some(ok) = event.crc32_ok {
                sink.lock().push(ok);
            }
        });

        // A different PMT with its last CRC byte flipped.
        let mut bad = sample_pmt_section(0x300, 0x301);
        let last = bad.len() - 1;
        bad[last] ^= 0xFF;
        push_all(&mut demux, &section_packets(0x100, 1, &bad));

        assert_eq!(crc_flags.lock().as_slice(), &[false]);
        // Registry still describes the first PMT.
        assert!(demux.registry().is_pcr_pid(0x200));
        assert!(!demux.registry().is_pcr_pid(0x300));
    }

    #[test]
    fn test_pes_detected_on_stream_pid() {
        let mut demux = TSDemuxer::new();
        push_all(&mut demux, &section_packets(0, 0, &sample_pat_section(0, 0x100)));
        push_all(
            &mut demux,
            &section_packets(0x100, 0, &sample_pmt_section(0x200, 0x201)),
        );

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        demux.events.on_packet_decoded.subscribe(move |event| {
            if let Some(pes) = &event.pes {
                sink.lock().push((event.packet.pid, pes.stream_id, event.is_pcr_pid));
            }
        });

        let mut raw = vec![0xFFu8; TS_PACKET_SIZE];
        raw[0] = SYNC_BYTE;
        raw[1] = 0x40 | 0x02; // PUSI, PID 0x200
        raw[2] = 0x00;
        raw[3] = 0x10;
        raw[4..13].copy_from_slice(&[0x00, 0x00, 0x01, 0xE0, 0x00, 0x00, 0x80, 0x00, 0x00]);
        demux.push(&raw, Utc::now());

        assert_eq!(seen.lock().as_slice(), &[(0x200, 0xE0, true)]);
    }

    #[test]
    fn test_bat_body_parsed_only_with_subscriber() {
        let bat_section = seal(vec![
            0x00, 0x4A, 0xB0, 0x13, // section_length 19
            0x11, 0x22, 0xC1, 0x00, 0x00, 0xF0, 0x00, // no bouquet descriptors
            0xF0, 0x06, // transport_stream_loop_length 6
            0x00, 0x07, 0x00, 0x55, 0xF0, 0x00,
        ]);

        // Without a subscriber only the CRC verdict is visible.
        let mut demux = TSDemuxer::new();
        let flags = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&flags);
        demux.events.on_packet_decoded.subscribe(move |event| {
            sink.lock().push(event.crc32_ok);
        });
        push_all(&mut demux, &section_packets(17, 0, &bat_section));
        assert_eq!(flags.lock().as_slice(), &[Some(true)]);

        // With a subscriber the body is decoded.
        let mut demux = TSDemuxer::new();
        let bouquets = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&bouquets);
        demux.events.on_bat_received.subscribe(move |event| {
            sink.lock().push(event.table.bouquet_id);
        });
        push_all(&mut demux, &section_packets(17, 0, &bat_section));
        assert_eq!(bouquets.lock().as_slice(), &[0x1122]);
    }

    #[test]
    fn test_program_sdt_filtered_to_pat_service() {
        let sdt_section = seal(vec![
            0x00, 0x42, 0xB0, 0x2C, // section_length 44
            0x00, 0x07, 0xC1, 0x00, 0x00, 0x00, 0x55, 0xFF,
            // service 9: not in the PAT
            0x00, 0x09, 0xFC, 0x80, 0x0B, 0x48, 0x09, 0x01, 0x02, b'T', b'V', 0x04, b'O',
            b't', b'h', b'r',
            // service 1: the monitored program
            0x00, 0x01, 0xFC, 0x80, 0x0B, 0x48, 0x09, 0x01, 0x02, b'T', b'V', 0x04, b'N',
            b'e', b'w', b's',
        ]);

        let mut demux = TSDemuxer::new();
        let services = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&services);
        demux.events.on_program_sdt_received.subscribe(move |event| {
            let ids: Vec<u16> = event.table.services.iter().map(|s| s.service_id).collect();
            sink.lock().push(ids);
        });

        push_all(&mut demux, &section_packets(0, 0, &sample_pat_section(0, 0x100)));
        push_all(&mut demux, &section_packets(17, 0, &sdt_section));

        assert_eq!(services.lock().as_slice(), &[vec![1]]);
        assert_eq!(demux.registry().sdt().unwrap().services.len(), 1);
    }
}
