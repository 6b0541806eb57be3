//! Model containers (`.numdlb` files).
//!
//! A model file carries no geometry of its own. It names the skeleton,
//! material, and mesh files and maps each mesh group to a material.

use std::io::{Read, Seek};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::DecodeError;
use crate::reader::ReadContainerExt;
use crate::ImportData;

const MODL_MAGIC: [u8; 4] = *b"LDOM";

/// The decoded contents of a model container.
#[derive(Debug)]
pub struct ModlData {
    pub major_version: u16,
    pub minor_version: u16,
    pub model_name: String,
    pub skeleton_file_name: String,
    pub material_file_name: String,
    pub mesh_file_name: String,
    pub groups: Vec<ModlGroup>,
}

/// Associates a mesh group with the material used to render it.
#[derive(Debug, PartialEq, Eq)]
pub struct ModlGroup {
    /// The mesh group name, suffixed with `.001` style counters when the
    /// stored name collides with an earlier entry. Duplicate stored names
    /// are valid in the format, but the lookup keys must stay distinct.
    pub mesh_group_name: String,
    pub sub_index: u64,
    pub material_name: String,
}

impl ImportData for ModlData {
    fn read<R: Read + Seek>(reader: &mut R) -> Result<Self, DecodeError> {
        reader.seek_to(0x10)?;
        reader.check_magic(MODL_MAGIC)?;
        let major_version = reader.read_u16::<LittleEndian>()?;
        let minor_version = reader.read_u16::<LittleEndian>()?;
        let model_name_offset = reader.read_relative_offset()?;
        reader.skip(4)?;
        let skeleton_name_offset = reader.read_relative_offset()?;
        reader.skip(4)?;
        let material_name_offset = reader.read_relative_offset()?;
        reader.skip(4)?;
        reader.skip(0x10)?;
        let mesh_name_offset = reader.read_relative_offset()?;
        reader.skip(4)?;
        let group_offset = reader.read_relative_offset()?;
        reader.skip(4)?;
        let group_count = reader.read_u32::<LittleEndian>()?;

        reader.seek_to(model_name_offset)?;
        let model_name = reader.read_cstring()?;

        reader.seek_to(skeleton_name_offset)?;
        let skeleton_file_name = reader.read_cstring()?;

        // The material record is length prefixed before the string payload.
        reader.seek_to(material_name_offset)?;
        let _material_name_len = reader.read_u32::<LittleEndian>()?;
        reader.skip(4)?;
        let material_file_name = reader.read_cstring()?;

        reader.seek_to(mesh_name_offset)?;
        let mesh_file_name = reader.read_cstring()?;

        reader.seek_to(group_offset)?;
        let mut groups: Vec<ModlGroup> = Vec::new();
        let mut name_counter = 0;
        for _ in 0..group_count {
            let group_name_offset = reader.read_relative_offset()?;
            reader.skip(4)?;
            let sub_index = reader.read_u64::<LittleEndian>()?;
            let material_offset = reader.read_relative_offset()?;
            reader.skip(4)?;
            let next_group_pos = reader.stream_position()?;

            reader.seek_to(group_name_offset)?;
            let stored_name = reader.read_cstring()?;
            reader.seek_to(material_offset)?;
            let material_name = reader.read_cstring()?;

            let mesh_group_name = if groups.iter().any(|g| g.mesh_group_name == stored_name) {
                name_counter += 1;
                format!("{}.{:03}", stored_name, name_counter)
            } else {
                name_counter = 0;
                stored_name
            };

            groups.push(ModlGroup {
                mesh_group_name,
                sub_index,
                material_name,
            });
            reader.seek_to(next_group_pos)?;
        }

        Ok(Self {
            major_version,
            minor_version,
            model_name,
            skeleton_file_name,
            material_file_name,
            mesh_file_name,
            groups,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn put_u16(buffer: &mut [u8], position: usize, value: u16) {
        buffer[position..position + 2].copy_from_slice(&value.to_le_bytes());
    }

    fn put_u32(buffer: &mut [u8], position: usize, value: u32) {
        buffer[position..position + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn put_relative(buffer: &mut [u8], position: usize, target: usize) {
        put_u32(buffer, position, (target - position) as u32);
    }

    fn put_str(buffer: &mut [u8], position: usize, value: &str) {
        buffer[position..position + value.len()].copy_from_slice(value.as_bytes());
        buffer[position + value.len()] = 0;
    }

    fn modl_file() -> Vec<u8> {
        let mut file = vec![0u8; 0x150];

        file[0x10..0x14].copy_from_slice(b"LDOM");
        put_u16(&mut file, 0x14, 1);
        put_u16(&mut file, 0x16, 7);
        put_relative(&mut file, 0x18, 0x80); // model name
        put_relative(&mut file, 0x20, 0x90); // skeleton file
        put_relative(&mut file, 0x28, 0xa0); // material file record
        // 0x30..0x40 reserved
        put_relative(&mut file, 0x40, 0xc0); // mesh file
        put_relative(&mut file, 0x48, 0xd0); // group table
        put_u32(&mut file, 0x50, 3); // group count

        put_str(&mut file, 0x80, "mario");
        put_str(&mut file, 0x90, "model.nusktb");
        put_u32(&mut file, 0xa0, 13); // length prefix
        put_str(&mut file, 0xa8, "model.numatb");
        put_str(&mut file, 0xc0, "model.numshb");

        // three group records, two sharing a stored name
        put_relative(&mut file, 0xd0, 0x120);
        put_relative(&mut file, 0xe0, 0x130);
        put_relative(&mut file, 0xe8, 0x120);
        put_relative(&mut file, 0xf8, 0x140);
        put_relative(&mut file, 0x100, 0x128);
        put_relative(&mut file, 0x110, 0x130);

        put_str(&mut file, 0x120, "body");
        put_str(&mut file, 0x128, "face");
        put_str(&mut file, 0x130, "alp_mario_001");
        put_str(&mut file, 0x140, "alp_mario_002");

        file
    }

    #[test]
    fn read_modl() {
        let data = ModlData::read(&mut Cursor::new(modl_file())).unwrap();

        assert_eq!(1, data.major_version);
        assert_eq!(7, data.minor_version);
        assert_eq!("mario", data.model_name);
        assert_eq!("model.nusktb", data.skeleton_file_name);
        assert_eq!("model.numatb", data.material_file_name);
        assert_eq!("model.numshb", data.mesh_file_name);

        assert_eq!(
            vec![
                ModlGroup {
                    mesh_group_name: "body".to_string(),
                    sub_index: 0,
                    material_name: "alp_mario_001".to_string(),
                },
                ModlGroup {
                    mesh_group_name: "body.001".to_string(),
                    sub_index: 0,
                    material_name: "alp_mario_002".to_string(),
                },
                ModlGroup {
                    mesh_group_name: "face".to_string(),
                    sub_index: 0,
                    material_name: "alp_mario_001".to_string(),
                },
            ],
            data.groups
        );
    }

    #[test]
    fn duplicate_group_names_stay_distinct() {
        let data = ModlData::read(&mut Cursor::new(modl_file())).unwrap();
        let mut names: Vec<_> = data.groups.iter().map(|g| &g.mesh_group_name).collect();
        names.sort();
        names.dedup();
        assert_eq!(3, names.len());
    }

    #[test]
    fn wrong_magic_is_malformed() {
        let mut file = modl_file();
        file[0x10..0x14].copy_from_slice(b"HSEM");

        assert!(matches!(
            ModlData::read(&mut Cursor::new(file)),
            Err(DecodeError::MalformedContainer { .. })
        ));
    }
}
