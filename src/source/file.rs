use super::{PacketSource, SourceChunk};
use crate::error::Result;
use crate::ts::TS_PACKET_SIZE;
use bytes::Bytes;
use chrono::Utc;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

/// Packets per chunk when reading raw TS files.
const CHUNK_PACKETS: usize = 7;

/// Raw TS file source.
///
/// Reads chunks of 7 x 188 bytes and stamps them with the wallclock, the
/// way a capture replayed without timing information is monitored.
pub struct FileSource {
    file: File,
    chunk_size: usize,
}

impl FileSource {
    /// Opens a raw TS file.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path).await?;
        Ok(Self {
            file,
            chunk_size: CHUNK_PACKETS * TS_PACKET_SIZE,
        })
    }
}

#[async_trait::async_trait]
impl PacketSource for FileSource {
    async fn next_chunk(&mut self) -> Result<Option<SourceChunk>> {
        let mut buf = vec![0u8; self.chunk_size];
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.file.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == 0 {
            return Ok(None);
        }
        buf.truncate(filled);
        Ok(Some(SourceChunk {
            data: Bytes::from(buf),
            dt: Utc::now(),
        }))
    }
}
