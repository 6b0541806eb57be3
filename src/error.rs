use std::io;

use thiserror::Error;

/// Errors while decoding a container file.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The 4-byte tag at offset 0x10 did not match the expected format magic.
    /// This is the only top level validation; the remaining structure is
    /// trusted positional decoding.
    #[error("invalid magic: expected {expected:?}, found {found:?}")]
    MalformedContainer { expected: [u8; 4], found: [u8; 4] },

    /// More than five UV or color sets were declared for a polygon group.
    /// The per vertex record shape can no longer be inferred safely.
    #[error("polygon group declares {count} {kind} sets, at most 5 are supported")]
    UnsupportedChannelCount { kind: &'static str, count: usize },

    /// The vertex attribute layout named a stream this decoder does not
    /// recognize. Stride inference depends on a fully recognized set.
    #[error("unrecognized vertex attribute {0:?}")]
    UnknownAttributeName(String),

    /// A recognized attribute declared a data format with an unknown stride.
    #[error("attribute {attribute} uses unsupported data format {format}")]
    UnknownAttributeFormat { attribute: &'static str, format: u32 },

    /// The polygon group's index width flag was neither 0 (16 bit) nor 1 (32 bit).
    #[error("unknown face index width flag {0}")]
    UnknownIndexWidth(u32),

    /// A track header addressed payload bytes outside the shared data buffer.
    #[error("track payload at {offset:#x}+{size:#x} falls outside the animation buffer")]
    InvalidPayloadRange { offset: u32, size: u32 },

    /// The compressed bit stream ended before all frames were decoded.
    #[error("compressed bit stream ended prematurely")]
    NotEnoughBits,

    /// Bit-packed channels wider than 32 bits are not representable.
    #[error("bit reads are limited to 32 bits, requested {0}")]
    TooManyBits(usize),

    /// An error occurred while reading from the underlying stream.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// An error occurred while reading a fixed layout payload struct.
    #[error(transparent)]
    BinRead(#[from] binread::Error),
}
