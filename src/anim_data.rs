//! Animation containers (`.nuanmb` files).
//!
//! The header at offset 0x10 leads to a table of groups, each group to a
//! table of nodes, and each node record chains to a track data record.
//! Track payloads live in a shared byte buffer at the end of the file and
//! are decoded in a second pass once every track header is known, since
//! payload offsets are relative to that buffer rather than to the header
//! section.

use std::io::{Read, Seek};

use byteorder::{LittleEndian, ReadBytesExt};
use log::warn;

use crate::error::DecodeError;
use crate::reader::ReadContainerExt;
use crate::ImportData;

pub use crate::vectors::{Vector3, Vector4};

pub(crate) mod bitutils;
mod buffers;
mod compression;

use buffers::read_track_values;

const ANIM_MAGIC: [u8; 4] = *b"MINA";

/// The decoded contents of an animation container.
#[derive(Debug)]
pub struct AnimData {
    pub major_version: u16,
    pub minor_version: u16,
    /// The index of the last frame in the animation.
    /// Constant tracks still last for `final_frame_index + 1` many frames.
    pub final_frame_index: f32,
    pub name: String,
    pub groups: Vec<GroupData>,
}

#[derive(Debug)]
pub struct GroupData {
    /// The usage type for all the [NodeData] in [nodes](#structfield.nodes).
    pub group_type: GroupType,
    pub nodes: Vec<NodeData>,
}

#[derive(Debug)]
pub struct NodeData {
    pub name: String,
    pub track: TrackData,
}

#[derive(Debug)]
pub struct TrackData {
    /// The name of the animated property, such as `Transform` or `Visibility`.
    pub name: String,
    pub flags: TrackFlags,
    /// The frame count stated by the track header. Constant tracks decode a
    /// single value regardless; broadcasting is the host's responsibility.
    pub frame_count: u32,
    /// `None` when the payload shape has no decoder.
    pub values: Option<TrackValues>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupType {
    Transform = 1,
    Visibility = 2,
    Material = 4,
    Camera = 5,
}

impl GroupType {
    fn from_bits(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::Transform),
            2 => Some(Self::Visibility),
            4 => Some(Self::Material),
            5 => Some(Self::Camera),
            _ => None,
        }
    }
}

/// The payload shape from the low byte of the track flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackType {
    Transform = 1,
    Texture = 2,
    Float = 3,
    PatternIndex = 5,
    Boolean = 8,
    Vector4 = 9,
}

/// The storage kind from the high byte of the track flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionType {
    Direct = 1,
    ConstTransform = 2,
    Compressed = 4,
    Constant = 5,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackFlags {
    pub track_type: TrackType,
    pub compression_type: CompressionType,
}

impl TrackFlags {
    fn from_bits(bits: u32) -> Option<Self> {
        let track_type = match bits & 0x00ff {
            1 => TrackType::Transform,
            2 => TrackType::Texture,
            3 => TrackType::Float,
            5 => TrackType::PatternIndex,
            8 => TrackType::Boolean,
            9 => TrackType::Vector4,
            _ => return None,
        };
        let compression_type = match bits & 0xff00 {
            0x0100 => CompressionType::Direct,
            0x0200 => CompressionType::ConstTransform,
            0x0400 => CompressionType::Compressed,
            0x0500 => CompressionType::Constant,
            _ => return None,
        };
        Some(Self {
            track_type,
            compression_type,
        })
    }
}

/// A decomposed transformation consisting of a scale, rotation, and translation.
#[derive(Debug, PartialEq, Clone, Copy, Default)]
pub struct Transform {
    /// XYZ scale
    pub scale: Vector3,
    /// An XYZW unit quaternion where XYZ represent the axis component
    /// and W represents the angle component.
    pub rotation: Vector4,
    /// XYZ translation
    pub translation: Vector3,
}

/// A value collection with an element for each frame of the animation.
/// Constant tracks contain a single element.
#[derive(Debug, PartialEq)]
pub enum TrackValues {
    /// Transformations used for camera or skeletal animations.
    Transform(Vec<Transform>),
    /// Animated scalar parameter values.
    Float(Vec<f32>),
    /// Visibility animations or animated boolean parameters.
    Boolean(Vec<bool>),
    /// Material animations or animated vector parameters.
    Vector4(Vec<Vector4>),
}

struct RawTrack {
    node_name: String,
    track_name: String,
    flag_bits: u32,
    frame_count: u32,
    payload_offset: u32,
    payload_size: u32,
}

impl ImportData for AnimData {
    fn read<R: Read + Seek>(reader: &mut R) -> Result<Self, DecodeError> {
        reader.seek_to(0x10)?;
        reader.check_magic(ANIM_MAGIC)?;
        let major_version = reader.read_u16::<LittleEndian>()?;
        let minor_version = reader.read_u16::<LittleEndian>()?;
        let final_frame_index = reader.read_f32::<LittleEndian>()?;
        let _unk1 = reader.read_u16::<LittleEndian>()?;
        let _unk2 = reader.read_u16::<LittleEndian>()?;
        let name_offset = reader.read_relative_offset()?;
        reader.skip(4)?;
        let group_offset = reader.read_relative_offset()?;
        reader.skip(4)?;
        let group_count = reader.read_u32::<LittleEndian>()?;
        reader.skip(4)?;
        let buffer_offset = reader.read_relative_offset()?;
        reader.skip(4)?;
        let buffer_size = reader.read_u32::<LittleEndian>()?;
        reader.skip(4)?;

        reader.seek_to(name_offset)?;
        let name = reader.read_cstring()?;

        // First pass: collect every track header.
        reader.seek_to(group_offset)?;
        let mut raw_groups = Vec::new();
        for _ in 0..group_count {
            let group_kind = reader.read_u32::<LittleEndian>()?;
            reader.skip(4)?;
            let node_offset = reader.read_relative_offset()?;
            reader.skip(4)?;
            let node_count = reader.read_u32::<LittleEndian>()?;
            reader.skip(4)?;
            let next_group_pos = reader.stream_position()?;

            match GroupType::from_bits(group_kind) {
                Some(group_type) => {
                    reader.seek_to(node_offset)?;
                    let mut tracks = Vec::new();
                    for _ in 0..node_count {
                        tracks.push(read_node_record(reader)?);
                    }
                    raw_groups.push((group_type, tracks));
                }
                None => warn!("skipping animation group with unknown kind {group_kind}"),
            }

            reader.seek_to(next_group_pos)?;
        }

        // Payload offsets are relative to the shared data buffer.
        reader.seek_to(buffer_offset)?;
        let mut buffer = vec![0u8; buffer_size as usize];
        reader.read_exact(&mut buffer)?;

        // Second pass: decode each track's payload slice.
        let mut groups = Vec::new();
        for (group_type, tracks) in raw_groups {
            let mut nodes = Vec::new();
            for raw in tracks {
                let flags = match TrackFlags::from_bits(raw.flag_bits) {
                    Some(flags) => flags,
                    None => {
                        warn!(
                            "skipping track {} with unknown flags {:#06x}",
                            raw.track_name, raw.flag_bits
                        );
                        continue;
                    }
                };

                let start = raw.payload_offset as usize;
                let end = start + raw.payload_size as usize;
                let payload =
                    buffer
                        .get(start..end)
                        .ok_or(DecodeError::InvalidPayloadRange {
                            offset: raw.payload_offset,
                            size: raw.payload_size,
                        })?;
                let values = read_track_values(payload, flags, raw.frame_count as usize)?;

                nodes.push(NodeData {
                    name: raw.node_name,
                    track: TrackData {
                        name: raw.track_name,
                        flags,
                        frame_count: raw.frame_count,
                        values,
                    },
                });
            }
            groups.push(GroupData { group_type, nodes });
        }

        Ok(Self {
            major_version,
            minor_version,
            final_frame_index,
            name,
            groups,
        })
    }
}

fn read_node_record<R: Read + Seek>(reader: &mut R) -> Result<RawTrack, DecodeError> {
    let name_offset = reader.read_relative_offset()?;
    reader.skip(4)?;
    let data_offset = reader.read_relative_offset()?;
    reader.skip(4)?;
    // The next node record sits 7 bytes past the stored delta.
    let next_node_pos = reader.read_relative_offset()? + 0x07;

    reader.seek_to(name_offset)?;
    let node_name = reader.read_cstring()?;

    reader.seek_to(data_offset + 0x08)?;
    let flag_bits = reader.read_u32::<LittleEndian>()?;
    let frame_count = reader.read_u32::<LittleEndian>()?;
    let _reserved = reader.read_u32::<LittleEndian>()?;
    let payload_offset = reader.read_u32::<LittleEndian>()?;
    let payload_size = reader.read_u32::<LittleEndian>()?;
    reader.skip(4)?;
    let track_name = reader.read_cstring()?;

    reader.seek_to(next_node_pos)?;

    Ok(RawTrack {
        node_name,
        track_name,
        flag_bits,
        frame_count,
        payload_offset,
        payload_size,
    })
}
