//! Material containers (`.numatb` files).
//!
//! Each material is a shader label plus a variable length parameter list.
//! Only parameters of the texture type contribute here; a fixed table of
//! parameter IDs assigns each texture name to a semantic role.

use std::io::{Read, Seek};

use byteorder::{LittleEndian, ReadBytesExt};
use log::{debug, warn};

use crate::error::DecodeError;
use crate::reader::ReadContainerExt;
use crate::ImportData;

const MATL_MAGIC: [u8; 4] = *b"LTAM";

/// Parameter values of this type reference a texture name string.
const TEXTURE_PARAM_TYPE: u32 = 0x0b;

/// The decoded contents of a material container.
#[derive(Debug)]
pub struct MatlData {
    pub major_version: u16,
    pub minor_version: u16,
    pub entries: Vec<MaterialData>,
}

/// One material and the texture names assigned to its semantic roles.
/// Texture names are lowercased for case insensitive lookups downstream.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct MaterialData {
    pub name: String,
    pub shader_label: String,
    /// Primary albedo.
    pub color1_name: Option<String>,
    /// Secondary albedo.
    pub color2_name: Option<String>,
    /// Baked lighting.
    pub bake_name: Option<String>,
    pub normal_name: Option<String>,
    pub emissive1_name: Option<String>,
    pub emissive2_name: Option<String>,
    /// Packed PRM map (metalness, roughness, ambient occlusion, specular).
    pub prm_name: Option<String>,
    /// Environment cubemap.
    pub env_name: Option<String>,
}

impl MaterialData {
    fn assign_texture(&mut self, param_id: u32, texture_name: String) {
        match param_id {
            0x5c => self.color1_name = Some(texture_name),
            0x5d => self.color2_name = Some(texture_name),
            0x5f => self.bake_name = Some(texture_name),
            0x60 => self.normal_name = Some(texture_name),
            0x61 => {
                if self.color1_name.is_none() {
                    self.color1_name = Some(texture_name.clone());
                }
                self.emissive1_name = Some(texture_name);
            }
            0x62 => self.prm_name = Some(texture_name),
            0x63 => self.env_name = Some(texture_name),
            0x65 => self.bake_name = Some(texture_name),
            0x66 => self.color1_name = Some(texture_name),
            0x67 => self.color2_name = Some(texture_name),
            0x6a => {
                if self.color2_name.is_none() {
                    self.color2_name = Some(texture_name.clone());
                }
                self.emissive2_name = Some(texture_name);
            }
            // Known benign non texture marker.
            0x133 => debug!("noise_for_warp texture for {}", self.name),
            _ => warn!(
                "unknown texture parameter {param_id:#x} for {texture_name} on {}",
                self.name
            ),
        }
    }
}

impl ImportData for MatlData {
    fn read<R: Read + Seek>(reader: &mut R) -> Result<Self, DecodeError> {
        reader.seek_to(0x10)?;
        reader.check_magic(MATL_MAGIC)?;
        let major_version = reader.read_u16::<LittleEndian>()?;
        let minor_version = reader.read_u16::<LittleEndian>()?;
        let entry_offset = reader.read_relative_offset()?;
        reader.skip(4)?;
        let entry_count = reader.read_u32::<LittleEndian>()?;
        reader.skip(4)?;

        reader.seek_to(entry_offset)?;
        let mut entries = Vec::with_capacity(entry_count as usize);
        for _ in 0..entry_count {
            entries.push(read_material(reader)?);
        }

        Ok(Self {
            major_version,
            minor_version,
            entries,
        })
    }
}

fn read_material<R: Read + Seek>(reader: &mut R) -> Result<MaterialData, DecodeError> {
    let name_offset = reader.read_relative_offset()?;
    reader.skip(4)?;
    let param_offset = reader.read_relative_offset()?;
    reader.skip(4)?;
    let param_count = reader.read_u32::<LittleEndian>()?;
    reader.skip(4)?;
    let shader_offset = reader.read_relative_offset()?;
    reader.skip(4)?;
    let next_entry_pos = reader.stream_position()?;

    let mut material = MaterialData::default();
    reader.seek_to(name_offset)?;
    material.name = reader.read_cstring()?;
    reader.seek_to(shader_offset)?;
    material.shader_label = reader.read_cstring()?;

    reader.seek_to(param_offset)?;
    for _ in 0..param_count {
        let param_id = reader.read_u32::<LittleEndian>()?;
        reader.skip(4)?;
        let value_offset = reader.read_relative_offset()?;
        reader.skip(4)?;
        let param_type = reader.read_u32::<LittleEndian>()?;
        reader.skip(4)?;
        let next_param_pos = reader.stream_position()?;

        if param_type == TEXTURE_PARAM_TYPE {
            // The string sits 8 bytes into the parameter value record.
            reader.seek_to(value_offset + 0x08)?;
            let texture_name = reader.read_cstring()?.to_lowercase();
            material.assign_texture(param_id, texture_name);
            reader.seek_to(next_param_pos)?;
        }
    }

    reader.seek_to(next_entry_pos)?;
    Ok(material)
}
