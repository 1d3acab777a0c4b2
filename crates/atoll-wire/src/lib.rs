//! atoll-wire — wire codec for the atoll overlay protocol.
//!
//! Two datagram protocols share this crate:
//!
//! 1. **Edge protocol** ([`edge`]) — the messages edges exchange with a
//!    supernode: tunneled PACKETs, edge-to-edge REGISTER relays, and
//!    the REGISTER_SUPER / REGISTER_SUPER_ACK registration handshake.
//! 2. **SNM** ([`snm`]) — the supernode-to-supernode management
//!    protocol used to federate communities across supernodes.
//!
//! All multi-byte integers are network byte order. Decoders consume a
//! running cursor and fail cleanly on truncation; encoders are the
//! exact inverse, so `decode(encode(m)) == m` and re-encoding a decoded
//! message reproduces the input bytes bit for bit.

pub mod edge;
pub mod error;
pub mod snm;
pub mod types;

pub use error::WireError;
pub use types::{Community, Decoder, Encoder, Mac, PACKET_BUF_SIZE, PROTOCOL_VERSION};
