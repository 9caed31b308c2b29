use super::{PacketSource, SourceChunk};
use crate::error::{Result, TsmonError};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

/// Classic little-endian PCAP magic with microsecond timestamps.
const PCAP_MAGIC_LE: [u8; 4] = [0xD4, 0xC3, 0xB2, 0xA1];
/// Size of the PCAP global header.
const GLOBAL_HEADER_LEN: usize = 24;
/// Offset of the IP protocol byte within an Ethernet+IPv4 frame.
const IP_PROTOCOL_OFFSET: usize = 23;
/// Ethernet + IPv4 + UDP header bytes stripped from each frame.
const UDP_PAYLOAD_OFFSET: usize = 42;
/// IP protocol number of UDP.
const IPPROTO_UDP: u8 = 17;

/// PCAP capture source.
///
/// Walks the capture record by record, keeps UDP frames, strips the
/// link/IP/UDP headers and stamps each chunk with the capture timestamp.
/// Those timestamps drive the synthetic-time snapshot path.
pub struct PcapSource {
    file: File,
}

impl PcapSource {
    /// Opens a capture and validates its global header.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path).await?;
        let mut header = [0u8; GLOBAL_HEADER_LEN];
        file.read_exact(&mut header).await?;
        if header[..4] != PCAP_MAGIC_LE {
            return Err(TsmonError::InvalidData(
                "not a little-endian microsecond PCAP capture".into(),
            ));
        }
        Ok(Self { file })
    }

    /// Reads one record header, `None` at a clean end of file.
    async fn read_record_header(&mut self) -> Result<Option<(DateTime<Utc>, usize)>> {
        let mut header = [0u8; 16];
        match self.file.read_exact(&mut header).await {
            Ok(_) => {}
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(err) => return Err(err.into()),
        }
        let sec = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as i64;
        let usec = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        let incl_len = u32::from_le_bytes([header[8], header[9], header[10], header[11]]) as usize;
        let dt = DateTime::from_timestamp(sec, usec.saturating_mul(1000))
            .ok_or_else(|| TsmonError::InvalidData("capture timestamp out of range".into()))?;
        Ok(Some((dt, incl_len)))
    }
}

#[async_trait::async_trait]
impl PacketSource for PcapSource {
    async fn next_chunk(&mut self) -> Result<Option<SourceChunk>> {
        loop {
            let Some((dt, incl_len)) = self.read_record_header().await? else {
                return Ok(None);
            };
            let mut frame = vec![0u8; incl_len];
            self.file.read_exact(&mut frame).await?;

            if frame.len() <= UDP_PAYLOAD_OFFSET || frame[IP_PROTOCOL_OFFSET] != IPPROTO_UDP {
                continue;
            }
            return Ok(Some(SourceChunk {
                data: Bytes::from(frame.split_off(UDP_PAYLOAD_OFFSET)),
                dt,
            }));
        }
    }
}
