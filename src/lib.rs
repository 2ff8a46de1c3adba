//! gameNet: a dual-channel datagram transport over UDP.
//!
//! One [`Endpoint`] owns a socket and exposes two delivery semantics on
//! the same wire: a reliable, in-order Selective-Repeat channel bounded
//! by a fixed window and a skip-deadline policy, and an unreliable
//! fire-and-forget channel. There is no handshake, no congestion control,
//! and no encryption -- see the module docs on [`endpoint`] for what an
//! application is expected to layer on top.

pub mod clock;
pub mod config;
pub mod delivery;
pub mod endpoint;
pub mod error;
pub mod packet;
pub mod reliable;
pub mod rtt;
pub mod sack;
pub mod seq;
pub mod transport;
pub mod unreliable;

pub use config::Config;
pub use delivery::DeliveryRecord;
pub use endpoint::Endpoint;
pub use error::{GameNetError, Result};
pub use seq::SeqNum;
