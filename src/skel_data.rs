//! Skeleton containers (`.nusktb` files).
//!
//! Bone entries and their transform tables are stored separately and joined
//! by declaration order. Parent references are indices into the same bone
//! array; child records can precede their parents, so parents resolve in a
//! second pass after every entry is loaded.

use std::io::{Read, Seek};

use byteorder::{LittleEndian, ReadBytesExt};
use log::warn;

use crate::error::DecodeError;
use crate::reader::ReadContainerExt;
use crate::ImportData;

const SKEL_MAGIC: [u8; 4] = *b"LEKS";

/// The stored parent index for bones without a parent.
const NO_PARENT: u16 = 0xffff;

/// The decoded contents of a skeleton container.
#[derive(Debug)]
pub struct SkelData {
    pub major_version: u16,
    pub minor_version: u16,
    pub bones: Vec<BoneData>,
}

/// A named bone with its bind pose world transform.
#[derive(Debug, PartialEq)]
pub struct BoneData {
    pub name: String,
    /// The index of the parent bone in [bones](struct.SkelData.html#structfield.bones)
    /// or `None` for root bones.
    pub parent_index: Option<usize>,
    /// A row-major world transform with the translation in the final row.
    pub transform: [[f32; 4]; 4],
}

impl ImportData for SkelData {
    fn read<R: Read + Seek>(reader: &mut R) -> Result<Self, DecodeError> {
        reader.seek_to(0x10)?;
        reader.check_magic(SKEL_MAGIC)?;
        let major_version = reader.read_u16::<LittleEndian>()?;
        let minor_version = reader.read_u16::<LittleEndian>()?;

        reader.seek_to(0x18)?;
        let entry_offset = reader.read_relative_offset()?;
        reader.skip(4)?;
        let entry_count = reader.read_u32::<LittleEndian>()?;
        reader.skip(4)?;
        let world_transform_offset = reader.read_relative_offset()?;
        reader.skip(4)?;
        let _world_transform_count = reader.read_u32::<LittleEndian>()?;
        reader.skip(4)?;
        let _inv_world_transform_offset = reader.read_relative_offset()?;
        reader.skip(4)?;
        let _inv_world_transform_count = reader.read_u32::<LittleEndian>()?;
        reader.skip(4)?;
        let _transform_offset = reader.read_relative_offset()?;
        reader.skip(4)?;
        let _transform_count = reader.read_u32::<LittleEndian>()?;
        reader.skip(4)?;
        let _inv_transform_offset = reader.read_relative_offset()?;
        reader.skip(4)?;
        let _inv_transform_count = reader.read_u32::<LittleEndian>()?;
        reader.skip(4)?;

        // First pass: names and raw parent indices.
        reader.seek_to(entry_offset)?;
        let mut names = Vec::with_capacity(entry_count as usize);
        let mut parents = Vec::with_capacity(entry_count as usize);
        for _ in 0..entry_count {
            let name_offset = reader.read_relative_offset()?;
            reader.skip(4)?;
            let entry_pos = reader.stream_position()?;
            reader.seek_to(name_offset)?;
            names.push(reader.read_cstring()?);
            reader.seek_to(entry_pos)?;
            let _bone_id = reader.read_u16::<LittleEndian>()?;
            parents.push(reader.read_u16::<LittleEndian>()?);
            let _flags = reader.read_u32::<LittleEndian>()?;
        }

        // The bind pose world transforms, one matrix per bone in entry order.
        reader.seek_to(world_transform_offset)?;
        let mut transforms = Vec::with_capacity(entry_count as usize);
        for _ in 0..entry_count {
            let mut matrix = [[0f32; 4]; 4];
            for row in &mut matrix {
                for value in row.iter_mut() {
                    *value = reader.read_f32::<LittleEndian>()?;
                }
            }
            transforms.push(matrix);
        }

        // Second pass: resolve parents now that the bone count is final.
        // Forward references are fine, only out of range indices are demoted.
        let bones = names
            .into_iter()
            .zip(parents)
            .zip(transforms)
            .map(|((name, parent), transform)| {
                let parent_index = match parent {
                    NO_PARENT => None,
                    index if usize::from(index) < entry_count as usize => {
                        Some(usize::from(index))
                    }
                    index => {
                        warn!("bone {name} references nonexistent parent {index}");
                        None
                    }
                };
                BoneData {
                    name,
                    parent_index,
                    transform,
                }
            })
            .collect();

        Ok(Self {
            major_version,
            minor_version,
            bones,
        })
    }
}

impl SkelData {
    /// A stable, non degenerate bone length for visualization, derived from
    /// the bounding extent of all bone translations. Presentation only, not
    /// skinning relevant.
    pub fn display_length(&self) -> f32 {
        let mut maxs = [0f32; 3];
        let mut mins = [0f32; 3];
        for bone in &self.bones {
            for i in 0..3 {
                maxs[i] = maxs[i].max(bone.transform[3][i]);
                mins[i] = mins[i].min(bone.transform[3][i]);
            }
        }

        let extent: f32 = (0..3).map(|i| maxs[i] - mins[i]).sum();
        (extent / 600.0).max(0.001)
    }

    pub fn bone_names(&self) -> Vec<String> {
        self.bones.iter().map(|b| b.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Cursor;

    fn put_u16(buffer: &mut [u8], position: usize, value: u16) {
        buffer[position..position + 2].copy_from_slice(&value.to_le_bytes());
    }

    fn put_u32(buffer: &mut [u8], position: usize, value: u32) {
        buffer[position..position + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn put_f32(buffer: &mut [u8], position: usize, value: f32) {
        buffer[position..position + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn put_relative(buffer: &mut [u8], position: usize, target: usize) {
        put_u32(buffer, position, (target - position) as u32);
    }

    fn put_str(buffer: &mut [u8], position: usize, value: &str) {
        buffer[position..position + value.len()].copy_from_slice(value.as_bytes());
        buffer[position + value.len()] = 0;
    }

    fn identity_with_translation(x: f32, y: f32, z: f32) -> [[f32; 4]; 4] {
        [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [x, y, z, 1.0],
        ]
    }

    /// Two bones where the child entry precedes its parent.
    fn skel_file() -> Vec<u8> {
        let mut file = vec![0u8; 0x160];

        file[0x10..0x14].copy_from_slice(b"LEKS");
        put_u16(&mut file, 0x14, 1);
        put_u16(&mut file, 0x16, 0);
        put_relative(&mut file, 0x18, 0x70); // bone entries
        put_u32(&mut file, 0x20, 2); // bone count
        put_relative(&mut file, 0x28, 0x90); // world transforms
        put_u32(&mut file, 0x30, 2);
        // remaining transform tables are parsed but unused
        put_relative(&mut file, 0x38, 0x110);
        put_u32(&mut file, 0x40, 0);
        put_relative(&mut file, 0x48, 0x110);
        put_u32(&mut file, 0x50, 0);
        put_relative(&mut file, 0x58, 0x110);
        put_u32(&mut file, 0x60, 0);

        // child first, parented to entry 1
        put_relative(&mut file, 0x70, 0x110);
        put_u16(&mut file, 0x78, 0);
        put_u16(&mut file, 0x7a, 1);
        put_relative(&mut file, 0x80, 0x120);
        put_u16(&mut file, 0x88, 1);
        put_u16(&mut file, 0x8a, 0xffff);

        put_str(&mut file, 0x110, "Hip");
        put_str(&mut file, 0x120, "Trans");

        let hip = identity_with_translation(0.0, 6.0, 0.0);
        let trans = identity_with_translation(0.0, 0.0, 0.0);
        for (base, matrix) in [(0x90, hip), (0xd0, trans)] {
            for (row_index, row) in matrix.iter().enumerate() {
                for (col_index, value) in row.iter().enumerate() {
                    put_f32(&mut file, base + row_index * 16 + col_index * 4, *value);
                }
            }
        }

        file
    }

    #[test]
    fn read_skel_with_forward_parent_reference() {
        let data = SkelData::read(&mut Cursor::new(skel_file())).unwrap();

        assert_eq!(2, data.bones.len());
        assert_eq!("Hip", data.bones[0].name);
        assert_eq!(Some(1), data.bones[0].parent_index);
        assert_eq!("Trans", data.bones[1].name);
        assert_eq!(None, data.bones[1].parent_index);
        assert_eq!(
            identity_with_translation(0.0, 6.0, 0.0),
            data.bones[0].transform
        );
    }

    #[test]
    fn out_of_range_parent_is_demoted_to_root() {
        let mut file = skel_file();
        put_u16(&mut file, 0x7a, 7);

        let data = SkelData::read(&mut Cursor::new(file)).unwrap();
        assert_eq!(None, data.bones[0].parent_index);
    }

    #[test]
    fn display_length_tracks_the_bounding_extent() {
        let data = SkelData::read(&mut Cursor::new(skel_file())).unwrap();
        // One bone at y = 6 gives an extent sum of 6.
        assert_relative_eq!(0.01, data.display_length(), epsilon = 1e-6);
    }

    #[test]
    fn display_length_is_never_degenerate() {
        let data = SkelData {
            major_version: 1,
            minor_version: 0,
            bones: Vec::new(),
        };
        assert_eq!(0.001, data.display_length());
    }

    #[test]
    fn wrong_magic_is_malformed() {
        let mut file = skel_file();
        file[0x10..0x14].copy_from_slice(b"LDOM");

        assert!(matches!(
            SkelData::read(&mut Cursor::new(file)),
            Err(DecodeError::MalformedContainer { .. })
        ));
    }
}
