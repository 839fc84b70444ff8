//! Bolt protocol handshake.
//!
//! On connect the client sends a 20-byte preamble: the 4-byte magic
//! `0x60 0x60 0xB0 0x17` followed by four 4-byte protocol version
//! proposals in big-endian, most preferred first, zero-padded. The
//! server replies with the single 4-byte version it selected, or all
//! zeros when none of the proposals is acceptable, after which the
//! connection must be closed.
//!
//! This implementation speaks protocol version 1 only.

use crate::error::HandshakeError;

/// Bolt protocol magic preamble bytes.
pub const BOLT_MAGIC: [u8; 4] = [0x60, 0x60, 0xB0, 0x17];

/// The protocol version this implementation speaks.
pub const PROTOCOL_VERSION: u32 = 1;

/// Size of the complete client preamble (magic + 4 proposals).
pub const HANDSHAKE_SIZE: usize = 20;

/// Size of the server response (chosen version).
pub const HANDSHAKE_RESPONSE_SIZE: usize = 4;

/// "No acceptable version" response value.
pub const NO_VERSION: u32 = 0;

/// Build the 20-byte client preamble proposing version 1.
pub fn build_client_preamble() -> [u8; HANDSHAKE_SIZE] {
    let mut data = [0u8; HANDSHAKE_SIZE];
    data[0..4].copy_from_slice(&BOLT_MAGIC);
    data[4..8].copy_from_slice(&PROTOCOL_VERSION.to_be_bytes());
    // Remaining three proposal slots stay zero
    data
}

/// Server side: validate the client preamble and pick a version.
///
/// Walks the client's proposals in preference order and selects the
/// first one equal to [`PROTOCOL_VERSION`].
pub fn negotiate(data: &[u8]) -> Result<u32, HandshakeError> {
    if data.len() < HANDSHAKE_SIZE {
        return Err(HandshakeError::InvalidData(format!(
            "Expected {} bytes, got {}",
            HANDSHAKE_SIZE,
            data.len()
        )));
    }

    let mut magic = [0u8; 4];
    magic.copy_from_slice(&data[0..4]);
    if magic != BOLT_MAGIC {
        return Err(HandshakeError::InvalidMagic {
            expected: BOLT_MAGIC,
            received: magic,
        });
    }

    for proposal in data[4..HANDSHAKE_SIZE].chunks_exact(4) {
        let version = u32::from_be_bytes([proposal[0], proposal[1], proposal[2], proposal[3]]);
        if version == PROTOCOL_VERSION {
            return Ok(version);
        }
    }

    Err(HandshakeError::NoCompatibleVersion)
}

/// Server side: encode the negotiation outcome as the 4-byte response.
pub fn encode_response(result: &Result<u32, HandshakeError>) -> [u8; HANDSHAKE_RESPONSE_SIZE] {
    match result {
        Ok(version) => version.to_be_bytes(),
        Err(_) => NO_VERSION.to_be_bytes(),
    }
}

/// Client side: interpret the server's 4-byte version response.
pub fn parse_response(data: [u8; HANDSHAKE_RESPONSE_SIZE]) -> Result<u32, HandshakeError> {
    let version = u32::from_be_bytes(data);
    if version == NO_VERSION {
        return Err(HandshakeError::NoCompatibleVersion);
    }
    if version != PROTOCOL_VERSION {
        return Err(HandshakeError::UnsupportedVersion(version));
    }
    Ok(version)
}
