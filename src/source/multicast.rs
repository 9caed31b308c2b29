use super::{PacketSource, SourceChunk};
use crate::error::{Result, TsmonError};
use bytes::Bytes;
use chrono::Utc;
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::net::UdpSocket;

/// Largest datagram the monitor expects: 7 TS packets plus headroom.
pub const DATAGRAM_MAX: usize = 1358;

/// UDP multicast source.
///
/// Binds the group port, joins the group on the default interface and
/// yields one chunk per datagram. A receive timeout ends the session
/// cleanly with `Ok(None)`; the caller reports the absence of multicast
/// through the final snapshot.
pub struct MulticastSource {
    socket: UdpSocket,
    buf: Vec<u8>,
    timeout: Duration,
}

impl MulticastSource {
    /// Joins `group:port`, waiting at most `timeout` per datagram.
    ///
    /// # Errors
    ///
    /// Returns [`TsmonError::Setup`] when the address is not a multicast
    /// group, and I/O errors from binding or joining.
    pub async fn join(group: Ipv4Addr, port: u16, timeout: Duration) -> Result<Self> {
        if !group.is_multicast() {
            return Err(TsmonError::Setup(format!(
                "{} is not a multicast address",
                group
            )));
        }
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port)).await?;
        socket.join_multicast_v4(group, Ipv4Addr::UNSPECIFIED)?;
        log::debug!("joined multicast group {}:{}", group, port);
        Ok(Self {
            socket,
            buf: vec![0u8; DATAGRAM_MAX],
            timeout,
        })
    }
}

#[async_trait::async_trait]
impl PacketSource for MulticastSource {
    async fn next_chunk(&mut self) -> Result<Option<SourceChunk>> {
        match tokio::time::timeout(self.timeout, self.socket.recv(&mut self.buf)).await {
            Err(_elapsed) => Ok(None),
            Ok(Ok(len)) => Ok(Some(SourceChunk {
                data: Bytes::copy_from_slice(&self.buf[..len]),
                dt: Utc::now(),
            })),
            Ok(Err(err)) => Err(err.into()),
        }
    }
}
