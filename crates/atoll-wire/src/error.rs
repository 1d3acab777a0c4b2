/// Errors from the wire codec layer.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("datagram truncated")]
    Truncated,

    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    #[error("unknown packet code: {0}")]
    UnknownPacketCode(u8),

    #[error("unknown SNM message type: {0}")]
    UnknownSnmType(u8),

    #[error("unknown address family: {0:#06x}")]
    UnknownAddressFamily(u16),

    #[error("community name too long: {0} bytes (max 16)")]
    CommunityTooLong(usize),
}
