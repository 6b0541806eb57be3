//! Bit-packed track payloads.
//!
//! Compressed tracks store a per channel `(min, max, bit_count)` spec table.
//! Each frame packs the active channels back to back in a shared bit stream.
//! A quantized value expands by linear interpolation between the channel
//! bounds. A channel with a bit count of zero consumes nothing and falls
//! back to the default value block.

use std::num::NonZeroU64;

use binread::BinRead;
use modular_bitfield::prelude::*;

use super::bitutils::{BitReadError, BitReader};
use super::Transform;
use crate::vectors::{Vector3, Vector4};

#[derive(Debug, Clone, Copy, PartialEq, Eq, BitfieldSpecifier)]
#[bits = 2]
pub enum ScaleType {
    None = 0,
    ScaleNoInheritance = 1,
    Scale = 2,
    UniformScale = 3,
}

/// Determines which values are stored in the compressed bit buffer.
/// Missing values come from the default value block.
#[bitfield(bits = 16)]
#[derive(BinRead, Debug, Clone, Copy, PartialEq, Eq)]
#[br(map = Self::from_bytes)]
pub struct CompressionFlags {
    #[bits = 2]
    pub scale_type: ScaleType,
    pub has_rotation: bool,
    pub has_translation: bool,
    #[skip]
    __: B12,
}

/// The 16 byte header at the start of every compressed track payload.
/// Both offsets are relative to the start of the payload.
#[derive(BinRead, Debug)]
pub struct CompressedHeader {
    pub unk_4: u16, // always 4?
    pub flags: CompressionFlags,
    pub default_offset: u16,
    pub bits_per_entry: u16,
    pub compressed_offset: u32,
    pub frame_count: u32,
}

#[derive(BinRead, Debug, Clone, Copy, Default)]
pub struct F32Compression {
    pub min: f32,
    pub max: f32,
    // High bit counts should use uncompressed instead.
    // This also prevents a potential overflow.
    #[br(assert(bit_count <= 32))]
    pub bit_count: u64,
}

#[derive(BinRead, Debug, Default)]
pub struct Vector3Compression {
    pub x: F32Compression,
    pub y: F32Compression,
    pub z: F32Compression,
}

#[derive(BinRead, Debug, Default)]
pub struct Vector4Compression {
    pub x: F32Compression,
    pub y: F32Compression,
    pub z: F32Compression,
    pub w: F32Compression,
}

/// The nine transform channel specs in storage order.
#[derive(BinRead, Debug, Default)]
pub struct TransformCompression {
    // The x component is used for uniform scale.
    pub scale: Vector3Compression,
    // The w component for rotation is handled separately.
    pub rotation: Vector3Compression,
    pub translation: Vector3Compression,
}

/// The wire layout shared by uncompressed transform values and the default
/// value block of compressed transform tracks.
#[derive(BinRead, Debug, Clone, Copy, Default)]
pub struct UncompressedTransform {
    pub scale: Vector3,
    pub rotation: Vector4,
    pub translation: Vector3,
    // Compensates for the immediate parent's scale when 1.
    pub compensate_scale: u32,
}

impl From<&UncompressedTransform> for Transform {
    fn from(t: &UncompressedTransform) -> Self {
        Self {
            scale: t.scale,
            rotation: t.rotation,
            translation: t.translation,
        }
    }
}

fn bit_mask(bit_count: NonZeroU64) -> u64 {
    // A mask of bit_count many bits set to 1.
    // Zero is excluded to avoid overflow.
    (1u64 << bit_count.get()) - 1u64
}

fn dequantize_f32(value: u32, min: f32, max: f32, bit_count: NonZeroU64) -> f32 {
    // 2 ^ bit_count evenly spaced values between min and max,
    // so 0 decodes to exactly min and the all ones pattern to exactly max.
    let scale = bit_mask(bit_count);

    let lerp = |a, b, t| a * (1.0 - t) + b * t;
    lerp(min, max, value as f32 / scale as f32)
}

pub(crate) fn read_compressed_f32(
    reader: &mut BitReader,
    compression: &F32Compression,
    default: f32,
) -> Result<f32, BitReadError> {
    match NonZeroU64::new(compression.bit_count) {
        // A degenerate range stores no bits even with a nonzero bit count.
        Some(bit_count) if compression.min != compression.max => {
            let value = reader.read_u32(bit_count.get() as usize)?;
            Ok(dequantize_f32(
                value,
                compression.min,
                compression.max,
                bit_count,
            ))
        }
        _ => Ok(default),
    }
}

pub(crate) fn read_compressed_vector3(
    reader: &mut BitReader,
    compression: &Vector3Compression,
    default: &Vector3,
) -> Result<Vector3, BitReadError> {
    Ok(Vector3 {
        x: read_compressed_f32(reader, &compression.x, default.x)?,
        y: read_compressed_f32(reader, &compression.y, default.y)?,
        z: read_compressed_f32(reader, &compression.z, default.z)?,
    })
}

pub(crate) fn read_compressed_vector4(
    reader: &mut BitReader,
    compression: &Vector4Compression,
    default: &Vector4,
) -> Result<Vector4, BitReadError> {
    Ok(Vector4 {
        x: read_compressed_f32(reader, &compression.x, default.x)?,
        y: read_compressed_f32(reader, &compression.y, default.y)?,
        z: read_compressed_f32(reader, &compression.z, default.z)?,
        w: read_compressed_f32(reader, &compression.w, default.w)?,
    })
}

pub(crate) fn read_compressed_transform(
    reader: &mut BitReader,
    compression: &TransformCompression,
    default: &UncompressedTransform,
    flags: CompressionFlags,
) -> Result<UncompressedTransform, BitReadError> {
    let scale = match flags.scale_type() {
        ScaleType::UniformScale => {
            // One channel broadcast to all three axes.
            let uniform_scale =
                read_compressed_f32(reader, &compression.scale.x, default.scale.x)?;
            Vector3::new(uniform_scale, uniform_scale, uniform_scale)
        }
        ScaleType::Scale | ScaleType::ScaleNoInheritance => {
            read_compressed_vector3(reader, &compression.scale, &default.scale)?
        }
        ScaleType::None => default.scale,
    };

    let rotation_xyz = if flags.has_rotation() {
        read_compressed_vector3(reader, &compression.rotation, &default.rotation.xyz())?
    } else {
        default.rotation.xyz()
    };

    let translation = if flags.has_translation() {
        read_compressed_vector3(reader, &compression.translation, &default.translation)?
    } else {
        default.translation
    };

    // The sign bit trails all nine channel values.
    let rotation_w = if flags.has_rotation() {
        calculate_rotation_w(reader, rotation_xyz)?
    } else {
        default.rotation.w
    };

    Ok(UncompressedTransform {
        scale,
        rotation: Vector4::new(rotation_xyz.x, rotation_xyz.y, rotation_xyz.z, rotation_w),
        translation,
        // Compressed transforms don't specify compensate scale per frame.
        compensate_scale: default.compensate_scale,
    })
}

fn calculate_rotation_w(reader: &mut BitReader, rotation: Vector3) -> Result<f32, BitReadError> {
    // Rotations are encoded as xyzw unit quaternions, so
    // x^2 + y^2 + z^2 + w^2 = 1 determines w up to sign.
    // A single trailing bit selects the negative solution.
    let flip_w = reader.read_bit()?;

    let w2 = 1.0 - (rotation.x * rotation.x + rotation.y * rotation.y + rotation.z * rotation.z);
    let w = w2.abs().sqrt();

    Ok(if flip_w { -w } else { w })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn bit_masks() {
        assert_eq!(0b1u64, bit_mask(NonZeroU64::new(1).unwrap()));
        assert_eq!(0b11u64, bit_mask(NonZeroU64::new(2).unwrap()));
        assert_eq!(0b111111111u64, bit_mask(NonZeroU64::new(9).unwrap()));
    }

    #[test]
    fn dequantize_boundaries_are_exact() {
        let bit_count = NonZeroU64::new(14).unwrap();
        assert_eq!(-1.5, dequantize_f32(0, -1.5, 2.5, bit_count));
        assert_eq!(2.5, dequantize_f32(0x3fff, -1.5, 2.5, bit_count));
    }

    #[test]
    fn dequantize_float_8bit() {
        let bit_count = NonZeroU64::new(8).unwrap();
        for i in 0..=255u8 {
            assert_eq!(
                i as f32 / u8::MAX as f32,
                dequantize_f32(i as u32, 0.0, 1.0, bit_count)
            );
        }
    }

    #[test]
    fn dequantize_float_14bit() {
        // stage/poke_unova/battle/motion/s13_a, D_lightning_B, CustomVector3
        assert_eq!(
            1.254_003_3,
            dequantize_f32(2350, 0.0, 8.74227, NonZeroU64::new(14).unwrap())
        );
        assert_eq!(
            1.185_819_5,
            dequantize_f32(2654, 0.0, 7.32, NonZeroU64::new(14).unwrap())
        );
        assert_eq!(
            2.964_048_1,
            dequantize_f32(2428, 0.0, 20.0, NonZeroU64::new(14).unwrap())
        );
    }

    #[test]
    fn zero_bit_count_uses_default_without_consuming_bits() {
        let mut reader = BitReader::from_slice(&[0xff]);
        let compression = F32Compression {
            min: 0.0,
            max: 1.0,
            bit_count: 0,
        };
        assert_eq!(
            3.5,
            read_compressed_f32(&mut reader, &compression, 3.5).unwrap()
        );
        // The next read still starts at the first bit.
        assert_eq!(0xff, reader.read_u32(8).unwrap());
    }

    #[test]
    fn degenerate_range_uses_default() {
        let mut reader = BitReader::from_slice(&[0xff]);
        let compression = F32Compression {
            min: 2.0,
            max: 2.0,
            bit_count: 16,
        };
        assert_eq!(
            7.0,
            read_compressed_f32(&mut reader, &compression, 7.0).unwrap()
        );
    }

    #[test]
    fn rotation_w_positive() {
        let mut reader = BitReader::from_slice(&[0u8]);
        let w = calculate_rotation_w(&mut reader, Vector3::new(0.6, 0.0, 0.0)).unwrap();
        assert_relative_eq!(0.8, w, epsilon = 0.0001);
    }

    #[test]
    fn rotation_w_flipped() {
        let mut reader = BitReader::from_slice(&[1u8]);
        let w = calculate_rotation_w(&mut reader, Vector3::new(0.6, 0.0, 0.0)).unwrap();
        assert_relative_eq!(-0.8, w, epsilon = 0.0001);
    }

    #[test]
    fn rotation_w_non_unit_quaternion() {
        // The radicand is clamped through its absolute value.
        let mut reader = BitReader::from_slice(&[0u8]);
        let w = calculate_rotation_w(&mut reader, Vector3::new(1.0, 1.0, 1.0)).unwrap();
        assert_relative_eq!(2.0f32.sqrt(), w, epsilon = 0.0001);
    }

    #[test]
    fn compression_flags_round_trip_bits() {
        let flags = CompressionFlags::new()
            .with_scale_type(ScaleType::Scale)
            .with_has_rotation(true)
            .with_has_translation(true);
        assert_eq!([0x0e, 0x00], flags.into_bytes());
    }
}
