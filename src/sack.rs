//! SACK bitmap encode/decode (§6).
//!
//! `bit i of byte j` represents `seq = (cum_ack + 1 + 8*j + i) mod 2^16`.
//! The bitmap is capped at `ceil(SACK_WIDTH / 8)` bytes; callers building a
//! SACK only ever set bits for sequences actually held, so the bitmap is
//! naturally no larger than it needs to be (an all-zero suffix is never
//! emitted, an empty bitmap is valid and conveys `cum_ack` alone, per §6).

use bytes::{Bytes, BytesMut};

use crate::seq::SeqNum;

/// Build a SACK bitmap from `cum_ack` and a set of additionally-received
/// sequence numbers, each of which must be strictly ahead of `cum_ack`.
/// Sequences outside `[cum_ack+1, cum_ack+sack_width]` are silently
/// excluded (SACK_WIDTH bounds the bitmap per §6; a reorder buffer bounded
/// by `WINDOW` never holds a sequence further out than that).
pub fn build_bitmap(cum_ack: SeqNum, held: impl IntoIterator<Item = SeqNum>, sack_width: u16) -> Bytes {
    let width = sack_width as usize;
    let nbytes = width.div_ceil(8);
    let mut bytes = vec![0u8; nbytes];
    let mut highest_set: i64 = -1;

    for seq in held {
        let offset = cum_ack.distance_to(seq);
        if offset <= 0 {
            continue; // at or before cum_ack: not a gap entry
        }
        let offset = (offset - 1) as usize; // 0-based index above cum_ack+1
        if offset >= width {
            continue;
        }
        let byte_idx = offset / 8;
        let bit_idx = offset % 8;
        bytes[byte_idx] |= 1 << bit_idx;
        highest_set = highest_set.max(byte_idx as i64);
    }

    // Trim trailing all-zero bytes: an empty bitmap conveys cum_ack alone.
    bytes.truncate((highest_set + 1) as usize);
    BytesMut::from(&bytes[..]).freeze()
}

/// Expand a SACK bitmap back into the set of acknowledged sequence numbers
/// (not including `cum_ack` itself, which is acknowledged cumulatively).
pub fn decode_bitmap(cum_ack: SeqNum, bitmap: &[u8]) -> Vec<SeqNum> {
    let mut out = Vec::new();
    for (byte_idx, byte) in bitmap.iter().enumerate() {
        for bit_idx in 0..8u16 {
            if byte & (1 << bit_idx) != 0 {
                let offset = 1 + (byte_idx as u16) * 8 + bit_idx;
                out.push(cum_ack.wrapping_add(offset));
            }
        }
    }
    out
}
