//! Track payload decoding, dispatched over encoding kind and payload shape.

use std::io::{Cursor, Read, Seek, SeekFrom};

use binread::{BinRead, BinReaderExt, BinResult};
use itertools::Itertools;
use log::warn;

use super::bitutils::BitReader;
use super::compression::{
    read_compressed_transform, read_compressed_vector4, CompressedHeader, TransformCompression,
    UncompressedTransform, Vector4Compression,
};
use super::{CompressionType, TrackFlags, TrackType, TrackValues, Transform};
use crate::error::DecodeError;
use crate::vectors::Vector4;

/// Decodes the value sequence for one track from its payload slice.
///
/// Returns `None` for payload shapes with no decoder. The caller's stream
/// position is unaffected either way, so unimplemented shapes never
/// desynchronize the remaining tracks.
pub(crate) fn read_track_values(
    track_data: &[u8],
    flags: TrackFlags,
    frame_count: usize,
) -> Result<Option<TrackValues>, DecodeError> {
    let mut reader = Cursor::new(track_data);

    match flags.compression_type {
        CompressionType::Compressed => match flags.track_type {
            TrackType::Transform => {
                let values = read_compressed_transforms(&mut reader, track_data, frame_count)?;
                Ok(Some(TrackValues::Transform(
                    values.iter().map(Transform::from).collect(),
                )))
            }
            TrackType::Vector4 => Ok(Some(TrackValues::Vector4(read_compressed_vector4s(
                &mut reader,
                track_data,
                frame_count,
            )?))),
            TrackType::Boolean => Ok(Some(TrackValues::Boolean(read_compressed_booleans(
                &mut reader,
                track_data,
            )?))),
            TrackType::Float | TrackType::Texture | TrackType::PatternIndex => {
                warn!(
                    "compressed {:?} data extraction is not implemented, skipping track payload",
                    flags.track_type
                );
                Ok(None)
            }
        },
        // Constant tracks store exactly one value.
        // The host broadcasts it across the track's stated frame count.
        CompressionType::Constant | CompressionType::ConstTransform => {
            read_direct_values(&mut reader, flags.track_type, 1)
        }
        CompressionType::Direct => read_direct_values(&mut reader, flags.track_type, frame_count),
    }
}

fn read_direct_values(
    reader: &mut Cursor<&[u8]>,
    track_type: TrackType,
    frame_count: usize,
) -> Result<Option<TrackValues>, DecodeError> {
    match track_type {
        TrackType::Transform => {
            let values: Vec<UncompressedTransform> = read_uncompressed(reader, frame_count)?;
            Ok(Some(TrackValues::Transform(
                values.iter().map(Transform::from).collect(),
            )))
        }
        TrackType::Float => Ok(Some(TrackValues::Float(read_uncompressed(
            reader,
            frame_count,
        )?))),
        TrackType::Boolean => {
            let values: Vec<u8> = read_uncompressed(reader, frame_count)?;
            Ok(Some(TrackValues::Boolean(
                values.iter().map(|v| *v == 1).collect_vec(),
            )))
        }
        TrackType::Vector4 => Ok(Some(TrackValues::Vector4(read_uncompressed(
            reader,
            frame_count,
        )?))),
        TrackType::Texture | TrackType::PatternIndex => {
            warn!(
                "{:?} data extraction is not implemented, skipping track payload",
                track_type
            );
            Ok(None)
        }
    }
}

fn read_uncompressed<R: Read + Seek, T: BinRead>(
    reader: &mut R,
    frame_count: usize,
) -> BinResult<Vec<T>>
where
    T::Args: Default,
{
    (0..frame_count).map(|_| reader.read_le()).collect()
}

fn read_compressed_transforms(
    reader: &mut Cursor<&[u8]>,
    track_data: &[u8],
    frame_count: usize,
) -> Result<Vec<UncompressedTransform>, DecodeError> {
    let header: CompressedHeader = reader.read_le()?;
    // The nine channel specs directly follow the header.
    let compression: TransformCompression = reader.read_le()?;

    reader.seek(SeekFrom::Start(u64::from(header.default_offset)))?;
    let default: UncompressedTransform = reader.read_le()?;

    let mut bits = BitReader::from_slice(compressed_block(track_data, &header)?);
    let mut values = Vec::with_capacity(frame_count);
    for _ in 0..frame_count {
        values.push(read_compressed_transform(
            &mut bits,
            &compression,
            &default,
            header.flags,
        )?);
    }
    Ok(values)
}

fn read_compressed_vector4s(
    reader: &mut Cursor<&[u8]>,
    track_data: &[u8],
    frame_count: usize,
) -> Result<Vec<Vector4>, DecodeError> {
    let header: CompressedHeader = reader.read_le()?;
    let compression: Vector4Compression = reader.read_le()?;

    reader.seek(SeekFrom::Start(u64::from(header.default_offset)))?;
    let default: Vector4 = reader.read_le()?;

    let mut bits = BitReader::from_slice(compressed_block(track_data, &header)?);
    let mut values = Vec::with_capacity(frame_count);
    for _ in 0..frame_count {
        values.push(read_compressed_vector4(&mut bits, &compression, &default)?);
    }
    Ok(values)
}

fn read_compressed_booleans(
    reader: &mut Cursor<&[u8]>,
    track_data: &[u8],
) -> Result<Vec<bool>, DecodeError> {
    // Booleans have no channel spec table. The header's bits per entry is
    // the only width information, and it is not cross checked against the
    // frame count. The header's own frame count drives the loop here.
    let header: CompressedHeader = reader.read_le()?;

    let mut bits = BitReader::from_slice(compressed_block(track_data, &header)?);
    (0..header.frame_count)
        .map(|_| Ok(bits.read_u32(usize::from(header.bits_per_entry))? == 1))
        .collect()
}

fn compressed_block<'a>(
    track_data: &'a [u8],
    header: &CompressedHeader,
) -> Result<&'a [u8], DecodeError> {
    track_data
        .get(header.compressed_offset as usize..)
        .ok_or(DecodeError::NotEnoughBits)
}
