//! UDP stand-in for the radio
//!
//! [`RadioSocket`] is a blocking UDP socket configured through socket2.
//! [`UdpLink`] carries one frame per datagram with a CRC-16 trailer, the way
//! the radio's packet engine appends one, and reports checksum failures as
//! corrupted receives.

use crate::time::{Pacer, Timestamp};
use bytes::Bytes;
use crc::{Crc, CRC_16_XMODEM};
use loralink_protocol::channel::{LinkChannel, LinkError, Received};
use socket2::{Domain, Protocol, SockRef, Socket, Type};
use std::io::{self, ErrorKind};
use std::net::{SocketAddr, UdpSocket};
use std::thread;
use std::time::Duration;
use thiserror::Error;

const CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// Checksum trailer length
pub const CRC_LEN: usize = 2;

/// Largest frame the link accepts
pub const MAX_FRAME: usize = 255;

/// Shortest read timeout the OS accepts
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// Socket configuration errors
#[derive(Error, Debug)]
pub enum SocketError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid socket address")]
    InvalidAddress,
}

/// Blocking UDP socket
pub struct RadioSocket {
    inner: UdpSocket,
}

impl RadioSocket {
    /// Create a socket bound to the given address
    pub fn bind(addr: SocketAddr) -> Result<Self, SocketError> {
        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };

        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.set_nonblocking(false)?;

        Ok(RadioSocket {
            inner: socket.into(),
        })
    }

    /// Set the send buffer size
    pub fn set_send_buffer_size(&self, size: usize) -> Result<(), SocketError> {
        SockRef::from(&self.inner).set_send_buffer_size(size)?;
        Ok(())
    }

    /// Set the receive buffer size
    pub fn set_recv_buffer_size(&self, size: usize) -> Result<(), SocketError> {
        SockRef::from(&self.inner).set_recv_buffer_size(size)?;
        Ok(())
    }

    /// Get the receive buffer size
    pub fn recv_buffer_size(&self) -> Result<usize, SocketError> {
        Ok(SockRef::from(&self.inner).recv_buffer_size()?)
    }

    /// Get the local address this socket is bound to
    pub fn local_addr(&self) -> Result<SocketAddr, SocketError> {
        Ok(self.inner.local_addr()?)
    }

    /// Send a datagram to the given address
    pub fn send_to(&self, buf: &[u8], target: SocketAddr) -> Result<usize, SocketError> {
        Ok(self.inner.send_to(buf, target)?)
    }

    /// Wait up to `timeout` for one datagram
    ///
    /// Returns `None` when the timeout elapses first.
    pub fn recv_from(
        &self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<Option<(usize, SocketAddr)>, SocketError> {
        self.inner
            .set_read_timeout(Some(timeout.max(MIN_READ_TIMEOUT)))?;

        match self.inner.recv_from(buf) {
            Ok(received) => Ok(Some(received)),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(None),
            Err(e) => Err(SocketError::Io(e)),
        }
    }
}

/// Append the CRC-16 trailer to a frame
pub fn encode_datagram(frame: &[u8]) -> Vec<u8> {
    let mut datagram = Vec::with_capacity(frame.len() + CRC_LEN);
    datagram.extend_from_slice(frame);
    datagram.extend_from_slice(&CRC.checksum(frame).to_be_bytes());
    datagram
}

/// Check and strip the CRC-16 trailer
pub fn check_datagram(datagram: &[u8]) -> Received {
    if datagram.len() <= CRC_LEN {
        return Received::Corrupt(Bytes::copy_from_slice(datagram));
    }

    let (frame, trailer) = datagram.split_at(datagram.len() - CRC_LEN);
    let expected = u16::from_be_bytes([trailer[0], trailer[1]]);
    let frame = Bytes::copy_from_slice(frame);

    if CRC.checksum(&frame) == expected {
        Received::Ok(frame)
    } else {
        Received::Corrupt(frame)
    }
}

/// Point-to-point frame link over UDP
///
/// Datagrams from any address other than the peer are ignored. A link bound
/// without a peer adopts the source of the first datagram it hears.
pub struct UdpLink {
    socket: RadioSocket,
    peer: Option<SocketAddr>,
    pacer: Option<Pacer>,
    buf: Vec<u8>,
}

impl UdpLink {
    /// Bind a link, optionally fixing the peer address up front
    pub fn bind(local: SocketAddr, peer: Option<SocketAddr>) -> Result<Self, SocketError> {
        let socket = RadioSocket::bind(local)?;
        tracing::debug!("UDP link bound to {}", socket.local_addr()?);

        Ok(UdpLink {
            socket,
            peer,
            pacer: None,
            buf: vec![0u8; MAX_FRAME + CRC_LEN + 1],
        })
    }

    /// Hold every send for its airtime
    pub fn with_pacer(mut self, pacer: Pacer) -> Self {
        self.pacer = Some(pacer);
        self
    }

    /// Local socket address
    pub fn local_addr(&self) -> Result<SocketAddr, SocketError> {
        self.socket.local_addr()
    }

    /// Peer address, once known
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Underlying socket
    pub fn socket(&self) -> &RadioSocket {
        &self.socket
    }
}

impl LinkChannel for UdpLink {
    fn send(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        if frame.len() > MAX_FRAME {
            return Err(LinkError::FrameTooLarge {
                len: frame.len(),
                max: MAX_FRAME,
            });
        }

        let peer = self
            .peer
            .ok_or_else(|| LinkError::SendFailed("peer address not known yet".to_string()))?;

        if let Some(pacer) = self.pacer.as_mut() {
            pacer.transmit(frame.len());
        }

        self.socket
            .send_to(&encode_datagram(frame), peer)
            .map_err(|e| LinkError::SendFailed(e.to_string()))?;
        Ok(())
    }

    fn recv(&mut self, timeout: Duration) -> Received {
        let deadline = Timestamp::now() + timeout;

        loop {
            let remaining = deadline.remaining();
            if remaining.is_zero() {
                return Received::Timeout;
            }

            let (len, source) = match self.socket.recv_from(&mut self.buf, remaining) {
                Ok(Some(received)) => received,
                Ok(None) => return Received::Timeout,
                Err(e) => {
                    tracing::warn!("UDP receive failed: {}", e);
                    thread::sleep(deadline.remaining());
                    return Received::Timeout;
                }
            };

            match self.peer {
                Some(peer) if peer != source => {
                    tracing::debug!("Ignoring datagram from {}", source);
                    continue;
                }
                Some(_) => {}
                None => {
                    tracing::info!("Peer is {}", source);
                    self.peer = Some(source);
                }
            }

            return check_datagram(&self.buf[..len]);
        }
    }
}
