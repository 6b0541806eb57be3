//! Mesh containers (`.numshb` files).
//!
//! A mesh file holds one polygon group per drawable sub mesh. Each group's
//! vertex attribute layout table declares which streams are present, which
//! fixes the per vertex record shape for the subsequent buffer reads. The
//! stride fields are stored but never validated independently.

use std::io::{Read, Seek};

use byteorder::{LittleEndian, ReadBytesExt};
use log::warn;

use crate::error::DecodeError;
use crate::reader::ReadContainerExt;
use crate::ImportData;

const MESH_MAGIC: [u8; 4] = *b"HSEM";

/// More sets than this and the per vertex record shape can't be inferred.
const MAX_CHANNEL_SETS: usize = 5;

const UV_ATTRIBUTE_NAMES: [&str; 5] = ["map1", "uvSet", "uvSet1", "uvSet2", "bake1"];
const COLOR_ATTRIBUTE_NAMES: [&str; 10] = [
    "colorSet1",
    "colorSet2",
    "colorSet2_1",
    "colorSet2_2",
    "colorSet2_3",
    "colorSet3",
    "colorSet4",
    "colorSet5",
    "colorSet6",
    "colorSet7",
];

/// Three packed f32 components.
const FORMAT_FLOAT3: u32 = 0;
/// Four packed binary16 components.
const FORMAT_HALF4: u32 = 5;

/// Color components are fixed point bytes with 128 as the 1.0 reference,
/// not the conventional 255.
const COLOR_SCALE: f32 = 128.0;

/// The decoded contents of a mesh container.
#[derive(Debug)]
pub struct MeshData {
    pub major_version: u16,
    pub minor_version: u16,
    pub objects: Vec<MeshObjectData>,
    pub weight_groups: Vec<WeightGroupData>,
}

/// One drawable polygon group.
#[derive(Debug, PartialEq)]
pub struct MeshObjectData {
    /// The visibility group name, suffixed with `.001` style counters when
    /// consecutive groups share a stored name.
    pub name: String,
    /// Rigidly binds every vertex to one bone, bypassing the weight groups.
    pub single_bind_name: Option<String>,
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub tangents: Vec<[f32; 3]>,
    /// Up to five UV sets. The stored v is flipped to `1.0 - v`.
    pub uv_sets: Vec<Vec<[f32; 2]>>,
    /// Up to five RGBA color sets.
    pub color_sets: Vec<Vec<[f32; 4]>>,
    /// Triangle list with one-based vertex indices.
    pub faces: Vec<[u32; 3]>,
}

/// Per vertex skinning data for the groups that are not single bound.
#[derive(Debug, PartialEq)]
pub struct WeightGroupData {
    pub name: String,
    pub sub_group: u32,
    pub max_influences: u8,
    pub influences: Vec<BoneInfluence>,
}

#[derive(Debug, PartialEq)]
pub struct BoneInfluence {
    pub bone_name: String,
    pub vertex_weights: Vec<VertexWeight>,
}

#[derive(Debug, PartialEq)]
pub struct VertexWeight {
    pub vertex_index: u16,
    pub weight: f32,
}

/// A resolved skin weight against a skeleton's bone array.
#[derive(Debug, Clone, PartialEq)]
pub struct BoneWeight {
    pub bone_index: usize,
    pub weight: f32,
}

struct PolygonGroupInfo {
    name: String,
    single_bind_name: Option<String>,
    vertex_count: u32,
    facepoint_count: u32,
    vertex_start: u32,
    uv_start: u32,
    facepoint_start: u32,
    index_width: u32,
    buffer_param_offset: u64,
    buffer_param_count: u32,
}

#[derive(Default)]
struct AttributeLayout {
    position_format: Option<u32>,
    normal_format: Option<u32>,
    tangent_format: Option<u32>,
    uv_count: usize,
    color_count: usize,
}

impl AttributeLayout {
    fn classify(&mut self, name: String, format: u32) -> Result<(), DecodeError> {
        match name.as_str() {
            "Position0" => self.position_format = Some(format),
            "Normal0" => self.normal_format = Some(format),
            "Tangent0" => self.tangent_format = Some(format),
            n if UV_ATTRIBUTE_NAMES.contains(&n) => self.uv_count += 1,
            n if COLOR_ATTRIBUTE_NAMES.contains(&n) => self.color_count += 1,
            _ => return Err(DecodeError::UnknownAttributeName(name)),
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), DecodeError> {
        if self.uv_count > MAX_CHANNEL_SETS {
            return Err(DecodeError::UnsupportedChannelCount {
                kind: "UV",
                count: self.uv_count,
            });
        }
        if self.color_count > MAX_CHANNEL_SETS {
            return Err(DecodeError::UnsupportedChannelCount {
                kind: "color",
                count: self.color_count,
            });
        }
        if let Some(format) = self.position_format {
            if format != FORMAT_FLOAT3 {
                return Err(DecodeError::UnknownAttributeFormat {
                    attribute: "Position0",
                    format,
                });
            }
        }
        if let Some(format) = self.normal_format {
            if format != FORMAT_HALF4 {
                return Err(DecodeError::UnknownAttributeFormat {
                    attribute: "Normal0",
                    format,
                });
            }
        }
        if let Some(format) = self.tangent_format {
            if format != FORMAT_HALF4 {
                return Err(DecodeError::UnknownAttributeFormat {
                    attribute: "Tangent0",
                    format,
                });
            }
        }
        Ok(())
    }
}

impl ImportData for MeshData {
    fn read<R: Read + Seek>(reader: &mut R) -> Result<Self, DecodeError> {
        reader.seek_to(0x10)?;
        reader.check_magic(MESH_MAGIC)?;
        let major_version = reader.read_u16::<LittleEndian>()?;
        let minor_version = reader.read_u16::<LittleEndian>()?;

        reader.seek_to(0x88)?;
        let polygon_group_offset = reader.read_relative_offset()?;
        reader.skip(4)?;
        let polygon_group_count = reader.read_u32::<LittleEndian>()?;
        reader.skip(4)?;
        let _unk_offset = reader.read_relative_offset()?;
        reader.skip(4)?;
        let _unk_count = reader.read_u32::<LittleEndian>()?;
        reader.skip(4)?;
        let _face_buffer_size_offset = reader.read_relative_offset()?;
        reader.skip(4)?;
        let vertex_buffer_offset = reader.read_relative_offset()?;
        reader.skip(4)?;
        let _unk_count2 = reader.read_u32::<LittleEndian>()?;
        reader.skip(4)?;
        let face_data_offset = reader.read_relative_offset()?;
        reader.skip(4)?;
        let _face_buffer_size = reader.read_relative_offset()?;
        reader.skip(4)?;
        let weight_group_offset = reader.read_relative_offset()?;
        reader.skip(4)?;
        let weight_group_count = reader.read_u32::<LittleEndian>()?;
        reader.skip(4)?;

        reader.seek_to(polygon_group_offset)?;
        let groups = read_polygon_group_infos(reader, polygon_group_count)?;

        // The vertex buffer field points at a descriptor for the two
        // interleaved regions, vertices and UV/color data.
        reader.seek_to(vertex_buffer_offset)?;
        let vertex_data_offset = reader.read_relative_offset()?;
        reader.skip(4)?;
        let _vertex_buffer_size = reader.read_u32::<LittleEndian>()?;
        reader.skip(4)?;
        let uv_data_offset = reader.read_relative_offset()?;
        reader.skip(4)?;
        let _uv_buffer_size = reader.read_u32::<LittleEndian>()?;
        reader.skip(4)?;

        reader.seek_to(weight_group_offset)?;
        let weight_groups = read_weight_groups(reader, weight_group_count)?;

        let mut objects = Vec::with_capacity(groups.len());
        for group in groups {
            objects.push(read_mesh_object(
                reader,
                group,
                vertex_data_offset,
                uv_data_offset,
                face_data_offset,
            )?);
        }

        Ok(Self {
            major_version,
            minor_version,
            objects,
            weight_groups,
        })
    }
}

fn read_polygon_group_infos<R: Read + Seek>(
    reader: &mut R,
    count: u32,
) -> Result<Vec<PolygonGroupInfo>, DecodeError> {
    let mut groups: Vec<PolygonGroupInfo> = Vec::with_capacity(count as usize);
    let mut name_counter = 0;
    let mut last_base = String::new();
    for _ in 0..count {
        let name_offset = reader.read_relative_offset()?;
        reader.skip(8)?;
        let _unk1 = reader.read_u32::<LittleEndian>()?;
        let single_bind_offset = reader.read_relative_offset()?;
        reader.skip(4)?;
        let vertex_count = reader.read_u32::<LittleEndian>()?;
        let facepoint_count = reader.read_u32::<LittleEndian>()?;
        let _unk2 = reader.read_u32::<LittleEndian>()?; // always 3?
        let vertex_start = reader.read_u32::<LittleEndian>()?;
        let uv_start = reader.read_u32::<LittleEndian>()?;
        let _unk_offset1 = reader.read_u32::<LittleEndian>()?;
        let _unk3 = reader.read_u32::<LittleEndian>()?;
        let _vertex_stride = reader.read_u32::<LittleEndian>()?;
        let _uv_stride = reader.read_u32::<LittleEndian>()?;
        let _unk4 = reader.read_u32::<LittleEndian>()?; // either 0 or 32
        let _unk5 = reader.read_u32::<LittleEndian>()?;
        let facepoint_start = reader.read_u32::<LittleEndian>()?;
        let _unk6 = reader.read_u32::<LittleEndian>()?; // always 4
        let index_width = reader.read_u32::<LittleEndian>()?;
        let _unk8 = reader.read_u32::<LittleEndian>()?;
        let _sort_priority = reader.read_u32::<LittleEndian>()?;
        let _unk9 = reader.read_u32::<LittleEndian>()?; // 0, 1, 256 or 257
        reader.skip(0x64)?; // unused float fields
        let buffer_param_offset = reader.read_relative_offset()?;
        reader.skip(4)?;
        let buffer_param_count = reader.read_u32::<LittleEndian>()?;
        let _unk10 = reader.read_u32::<LittleEndian>()?;
        let next_group_pos = reader.stream_position()?;

        reader.seek_to(name_offset)?;
        let stored_name = reader.read_cstring()?;
        reader.seek_to(single_bind_offset)?;
        let single_bind = reader.read_cstring()?;

        let name = if !groups.is_empty() && last_base == stored_name {
            name_counter += 1;
            format!("{stored_name}.{name_counter:03}")
        } else {
            last_base = stored_name.clone();
            name_counter = 0;
            stored_name
        };

        groups.push(PolygonGroupInfo {
            name,
            single_bind_name: (!single_bind.is_empty()).then_some(single_bind),
            vertex_count,
            facepoint_count,
            vertex_start,
            uv_start,
            facepoint_start,
            index_width,
            buffer_param_offset,
            buffer_param_count,
        });
        reader.seek_to(next_group_pos)?;
    }
    Ok(groups)
}

fn read_attribute_layout<R: Read + Seek>(
    reader: &mut R,
    group: &PolygonGroupInfo,
) -> Result<AttributeLayout, DecodeError> {
    reader.seek_to(group.buffer_param_offset)?;
    let mut layout = AttributeLayout::default();
    for _ in 0..group.buffer_param_count {
        let _attribute_type = reader.read_u32::<LittleEndian>()?;
        let format = reader.read_u32::<LittleEndian>()?;
        let _set = reader.read_u32::<LittleEndian>()?;
        let _buffer_offset = reader.read_u32::<LittleEndian>()?;
        let _layer = reader.read_u32::<LittleEndian>()?;
        let _unk1 = reader.read_u32::<LittleEndian>()?;
        let _name_offset1 = reader.read_relative_offset()?;
        reader.skip(4)?;
        let name_offset2 = reader.read_relative_offset()?;
        reader.skip(4)?;
        let _unk2 = reader.read_u32::<LittleEndian>()?; // always 1?
        let _unk3 = reader.read_u32::<LittleEndian>()?;
        let next_param_pos = reader.stream_position()?;

        // The second string field is itself an offset to the name.
        reader.seek_to(name_offset2)?;
        let name_offset = reader.read_relative_offset()?;
        reader.seek_to(name_offset)?;
        let name = reader.read_cstring()?;
        layout.classify(name, format)?;

        reader.seek_to(next_param_pos)?;
    }
    layout.validate()?;
    Ok(layout)
}

fn read_mesh_object<R: Read + Seek>(
    reader: &mut R,
    group: PolygonGroupInfo,
    vertex_data_offset: u64,
    uv_data_offset: u64,
    face_data_offset: u64,
) -> Result<MeshObjectData, DecodeError> {
    let layout = read_attribute_layout(reader, &group)?;
    let vertex_count = group.vertex_count as usize;

    // Vertex region: position, normal, tangent per vertex for the streams
    // declared present. The stride is implied by that set.
    reader.seek_to(vertex_data_offset + u64::from(group.vertex_start))?;
    let mut positions = Vec::with_capacity(vertex_count);
    let mut normals = Vec::with_capacity(vertex_count);
    let mut tangents = Vec::with_capacity(vertex_count);
    for _ in 0..group.vertex_count {
        if layout.position_format.is_some() {
            positions.push([
                reader.read_f32::<LittleEndian>()?,
                reader.read_f32::<LittleEndian>()?,
                reader.read_f32::<LittleEndian>()?,
            ]);
        }
        if layout.normal_format.is_some() {
            let normal = [
                reader.read_half()?,
                reader.read_half()?,
                reader.read_half()?,
            ];
            let _w = reader.read_half()?;
            normals.push(normal);
        }
        if layout.tangent_format.is_some() {
            let tangent = [
                reader.read_half()?,
                reader.read_half()?,
                reader.read_half()?,
            ];
            let _w = reader.read_half()?;
            tangents.push(tangent);
        }
    }

    // UV region: the UV sets and color sets interleave per vertex.
    reader.seek_to(uv_data_offset + u64::from(group.uv_start))?;
    let mut uv_sets = vec![Vec::with_capacity(vertex_count); layout.uv_count];
    let mut color_sets = vec![Vec::with_capacity(vertex_count); layout.color_count];
    for _ in 0..group.vertex_count {
        for uv_set in uv_sets.iter_mut() {
            let u = reader.read_half()?;
            let v = 1.0 - reader.read_half()?;
            uv_set.push([u, v]);
        }
        for color_set in color_sets.iter_mut() {
            let mut color = [0f32; 4];
            for component in color.iter_mut() {
                *component = f32::from(reader.read_u8()?) / COLOR_SCALE;
            }
            color_set.push(color);
        }
    }

    // Index buffer: the wire format is zero based, decoded faces are one based.
    reader.seek_to(face_data_offset + u64::from(group.facepoint_start))?;
    let triangle_count = group.facepoint_count / 3;
    let mut faces = Vec::with_capacity(triangle_count as usize);
    for _ in 0..triangle_count {
        let face = match group.index_width {
            0 => [
                u32::from(reader.read_u16::<LittleEndian>()?) + 1,
                u32::from(reader.read_u16::<LittleEndian>()?) + 1,
                u32::from(reader.read_u16::<LittleEndian>()?) + 1,
            ],
            1 => [
                reader.read_u32::<LittleEndian>()? + 1,
                reader.read_u32::<LittleEndian>()? + 1,
                reader.read_u32::<LittleEndian>()? + 1,
            ],
            other => return Err(DecodeError::UnknownIndexWidth(other)),
        };
        faces.push(face);
    }

    Ok(MeshObjectData {
        name: group.name,
        single_bind_name: group.single_bind_name,
        positions,
        normals,
        tangents,
        uv_sets,
        color_sets,
        faces,
    })
}

fn read_weight_groups<R: Read + Seek>(
    reader: &mut R,
    count: u32,
) -> Result<Vec<WeightGroupData>, DecodeError> {
    let mut groups: Vec<WeightGroupData> = Vec::with_capacity(count as usize);
    let mut name_counter = 0;
    let mut last_base = String::new();
    for _ in 0..count {
        let name_offset = reader.read_relative_offset()?;
        reader.skip(4)?;
        let sub_group = reader.read_u32::<LittleEndian>()?;
        reader.skip(4)?;
        let max_influences = reader.read_u8()?;
        let _flag2 = reader.read_u8()?;
        let _flag3 = reader.read_u8()?;
        let _flag4 = reader.read_u8()?;
        reader.skip(4)?;
        let influence_offset = reader.read_relative_offset()?;
        reader.skip(4)?;
        let influence_count = reader.read_u32::<LittleEndian>()?;
        reader.skip(4)?;
        let next_group_pos = reader.stream_position()?;

        reader.seek_to(name_offset)?;
        let stored_name = reader.read_cstring()?;

        // Split groups share stored names the same way polygon groups do.
        let name = if !groups.is_empty() && last_base == stored_name {
            name_counter += 1;
            format!("{stored_name}.{name_counter:03}")
        } else {
            last_base = stored_name.clone();
            name_counter = 0;
            stored_name
        };

        reader.seek_to(influence_offset)?;
        let influences = read_influences(reader, influence_count)?;

        groups.push(WeightGroupData {
            name,
            sub_group,
            max_influences,
            influences,
        });
        reader.seek_to(next_group_pos)?;
    }
    Ok(groups)
}

fn read_influences<R: Read + Seek>(
    reader: &mut R,
    count: u32,
) -> Result<Vec<BoneInfluence>, DecodeError> {
    let mut influences = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let bone_name_offset = reader.read_relative_offset()?;
        reader.skip(4)?;
        let buffer_offset = reader.read_relative_offset()?;
        reader.skip(4)?;
        let buffer_size = reader.read_u32::<LittleEndian>()?;
        reader.skip(4)?;
        let next_influence_pos = reader.stream_position()?;

        reader.seek_to(bone_name_offset)?;
        let bone_name = reader.read_cstring()?;

        // 6 byte records of vertex index and weight.
        reader.seek_to(buffer_offset)?;
        let mut vertex_weights = Vec::with_capacity(buffer_size as usize / 6);
        for _ in 0..buffer_size / 6 {
            vertex_weights.push(VertexWeight {
                vertex_index: reader.read_u16::<LittleEndian>()?,
                weight: reader.read_f32::<LittleEndian>()?,
            });
        }

        influences.push(BoneInfluence {
            bone_name,
            vertex_weights,
        });
        reader.seek_to(next_influence_pos)?;
    }
    Ok(influences)
}

/// Resolves the skinning for one mesh object against a skeleton's bone
/// names, producing one weight list per vertex.
///
/// Missing references are recoverable: an unknown influence bone, a missing
/// single bind bone, and a weight group without influences all degrade to a
/// full weight bind on the root bone.
pub fn resolve_vertex_weights(
    object: &MeshObjectData,
    weight_groups: &[WeightGroupData],
    bone_names: &[String],
) -> Vec<Vec<BoneWeight>> {
    let vertex_count = object.positions.len();
    let root_bind = || {
        vec![
            vec![BoneWeight {
                bone_index: 0,
                weight: 1.0,
            }];
            vertex_count
        ]
    };

    if let Some(bind_name) = &object.single_bind_name {
        let bone_index = match bone_names.iter().position(|name| name == bind_name) {
            Some(index) => index,
            None => {
                warn!(
                    "single bind bone {bind_name} doesn't exist, binding {} to the root bone",
                    object.name
                );
                0
            }
        };
        return vec![
            vec![BoneWeight {
                bone_index,
                weight: 1.0,
            }];
            vertex_count
        ];
    }

    let group = weight_groups.iter().find(|group| group.name == object.name);
    let group = match group {
        Some(group) if !group.influences.is_empty() => group,
        _ => {
            warn!(
                "{} has no influences, treating as a root single bind instead",
                object.name
            );
            return root_bind();
        }
    };

    let mut weights = vec![Vec::new(); vertex_count];
    for influence in &group.influences {
        let bone_index = match bone_names.iter().position(|name| name == &influence.bone_name) {
            Some(index) => index,
            None => {
                warn!(
                    "{} doesn't exist on {}, transferring rigging to the root bone",
                    influence.bone_name, object.name
                );
                0
            }
        };
        for vertex_weight in &influence.vertex_weights {
            match weights.get_mut(usize::from(vertex_weight.vertex_index)) {
                Some(vertex) => vertex.push(BoneWeight {
                    bone_index,
                    weight: vertex_weight.weight,
                }),
                None => warn!(
                    "influence for {} indexes vertex {} past the {} vertices of {}",
                    influence.bone_name, vertex_weight.vertex_index, vertex_count, object.name
                ),
            }
        }
    }

    // Vertices no influence record covers fall back to a root bind.
    for vertex in weights.iter_mut().filter(|vertex| vertex.is_empty()) {
        vertex.push(BoneWeight {
            bone_index: 0,
            weight: 1.0,
        });
    }

    weights
}
