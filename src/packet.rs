//! Wire frame encode/decode (§3, §6).
//!
//! Fixed 7-byte header (`chan` + `seq` + `ts_ms`) followed by opaque payload
//! bytes. All integers are big-endian.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{GameNetError, Result};

/// Header size in bytes: 1 (chan) + 2 (seq) + 4 (ts_ms).
pub const HEADER_LEN: usize = 7;

/// Channel tag carried in byte 0 of every gameNet datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Chan {
    ReliableData = 0x01,
    Unreliable = 0x02,
    Sack = 0x03,
}

impl TryFrom<u8> for Chan {
    type Error = GameNetError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(Chan::ReliableData),
            0x02 => Ok(Chan::Unreliable),
            0x03 => Ok(Chan::Sack),
            other => Err(GameNetError::UnknownChannel(other)),
        }
    }
}

/// A decoded gameNet packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// RELIABLE_DATA: seq is the reliable sequence number.
    Data {
        seq: u16,
        ts_ms: u32,
        payload: Bytes,
    },
    /// UNRELIABLE: seq is the unreliable counter.
    Unreliable {
        seq: u16,
        ts_ms: u32,
        payload: Bytes,
    },
    /// SACK: header seq doubles as `cum_ack` (§6); payload is the bitmap.
    Sack {
        cum_ack: u16,
        ts_ms: u32,
        bitmap: Bytes,
    },
}

impl Packet {
    pub fn chan(&self) -> Chan {
        match self {
            Packet::Data { .. } => Chan::ReliableData,
            Packet::Unreliable { .. } => Chan::Unreliable,
            Packet::Sack { .. } => Chan::Sack,
        }
    }

    /// Encode this packet into a fresh buffer.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    pub fn encoded_len(&self) -> usize {
        HEADER_LEN
            + match self {
                Packet::Data { payload, .. } => payload.len(),
                Packet::Unreliable { payload, .. } => payload.len(),
                Packet::Sack { bitmap, .. } => bitmap.len(),
            }
    }

    pub fn encode_into(&self, buf: &mut BytesMut) {
        match self {
            Packet::Data { seq, ts_ms, payload } => {
                buf.put_u8(Chan::ReliableData as u8);
                buf.put_u16(*seq);
                buf.put_u32(*ts_ms);
                buf.put_slice(payload);
            }
            Packet::Unreliable { seq, ts_ms, payload } => {
                buf.put_u8(Chan::Unreliable as u8);
                buf.put_u16(*seq);
                buf.put_u32(*ts_ms);
                buf.put_slice(payload);
            }
            Packet::Sack { cum_ack, ts_ms, bitmap } => {
                buf.put_u8(Chan::Sack as u8);
                buf.put_u16(*cum_ack);
                buf.put_u32(*ts_ms);
                buf.put_slice(bitmap);
            }
        }
    }

    /// Decode a packet from a received datagram. A buffer shorter than
    /// `HEADER_LEN` or carrying an unknown `chan` byte is rejected; the
    /// caller (transport layer) counts and drops it silently per §4.1.
    pub fn decode(mut data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN {
            return Err(GameNetError::FrameTooShort {
                expected: HEADER_LEN,
                actual: data.len(),
            });
        }

        let chan = Chan::try_from(data[0])?;
        let seq = (&data[1..3]).get_u16();
        let ts_ms = (&data[3..7]).get_u32();
        data = &data[HEADER_LEN..];
        let payload = Bytes::copy_from_slice(data);

        Ok(match chan {
            Chan::ReliableData => Packet::Data {
                seq,
                ts_ms,
                payload,
            },
            Chan::Unreliable => Packet::Unreliable {
                seq,
                ts_ms,
                payload,
            },
            Chan::Sack => Packet::Sack {
                cum_ack: seq,
                ts_ms,
                bitmap: payload,
            },
        })
    }
}
