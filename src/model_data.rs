//! Whole model decoding.
//!
//! A model file references its skeleton, material, and mesh files by name.
//! [ModelData::from_file] resolves those siblings against the model's
//! directory, decodes each one, and joins the results: every mesh object is
//! paired with its material label and its resolved per vertex skinning.
//!
//! All decode state lives in the returned value. Decoding several models
//! concurrently from different threads is safe.

use std::collections::HashMap;
use std::path::Path;

use log::warn;

use crate::error::DecodeError;
use crate::matl_data::MatlData;
use crate::mesh_data::{resolve_vertex_weights, BoneWeight, MeshData, MeshObjectData};
use crate::modl_data::{ModlData, ModlGroup};
use crate::skel_data::SkelData;
use crate::ImportData;

/// Everything referenced by one model file.
#[derive(Debug)]
pub struct ModelData {
    pub model_name: String,
    pub modl: ModlData,
    pub matl: Option<MatlData>,
    pub skel: Option<SkelData>,
    pub objects: Vec<ModelObjectData>,
}

/// A mesh object joined with its material and resolved skinning.
#[derive(Debug)]
pub struct ModelObjectData {
    pub mesh: MeshObjectData,
    /// `None` when the model's group table has no entry for this object.
    pub material_label: Option<String>,
    /// One weight list per vertex. Empty when the model has no mesh.
    pub vertex_weights: Vec<Vec<BoneWeight>>,
}

impl ModelData {
    /// Decodes the model at `path` along with the skeleton, material, and
    /// mesh files it references. A referenced file that does not exist is
    /// logged and skipped; a referenced file that fails to decode is an
    /// error.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, DecodeError> {
        let modl = ModlData::from_file(path.as_ref())?;
        let directory = path.as_ref().parent().unwrap_or_else(|| Path::new(""));

        let matl = read_sibling::<MatlData>(directory, &modl.material_file_name)?;
        let skel = read_sibling::<SkelData>(directory, &modl.skeleton_file_name)?;
        let mesh = read_sibling::<MeshData>(directory, &modl.mesh_file_name)?;

        let bone_names = skel.as_ref().map(SkelData::bone_names).unwrap_or_default();
        let objects = mesh
            .map(|mesh| assemble_objects(mesh, &modl.groups, &bone_names))
            .unwrap_or_default();

        Ok(Self {
            model_name: modl.model_name.clone(),
            modl,
            matl,
            skel,
            objects,
        })
    }

    /// The material entry assigned to `object`, when both the group mapping
    /// and the material table have one.
    pub fn material_for<'a>(
        &'a self,
        object: &ModelObjectData,
    ) -> Option<&'a crate::matl_data::MaterialData> {
        let label = object.material_label.as_ref()?;
        self.matl
            .as_ref()?
            .entries
            .iter()
            .find(|entry| &entry.name == label)
    }
}

fn read_sibling<T: ImportData>(directory: &Path, file_name: &str) -> Result<Option<T>, DecodeError> {
    let path = directory.join(file_name);
    if path.is_file() {
        Ok(Some(T::from_file(path)?))
    } else {
        warn!("{} does not exist, skipping", path.display());
        Ok(None)
    }
}

fn assemble_objects(
    mesh: MeshData,
    groups: &[ModlGroup],
    bone_names: &[String],
) -> Vec<ModelObjectData> {
    let materials: HashMap<&str, &str> = groups
        .iter()
        .map(|group| (group.mesh_group_name.as_str(), group.material_name.as_str()))
        .collect();

    let MeshData {
        objects,
        weight_groups,
        ..
    } = mesh;

    objects
        .into_iter()
        .map(|object| {
            let material_label = match materials.get(object.name.as_str()) {
                Some(name) => Some((*name).to_string()),
                None => {
                    warn!("no material assignment for mesh group {}", object.name);
                    None
                }
            };
            let vertex_weights = resolve_vertex_weights(&object, &weight_groups, bone_names);
            ModelObjectData {
                mesh: object,
                material_label,
                vertex_weights,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_mesh(names: &[&str]) -> MeshData {
        MeshData {
            major_version: 1,
            minor_version: 10,
            objects: names
                .iter()
                .map(|name| MeshObjectData {
                    name: (*name).to_string(),
                    single_bind_name: None,
                    positions: vec![[0.0; 3]; 2],
                    normals: Vec::new(),
                    tangents: Vec::new(),
                    uv_sets: Vec::new(),
                    color_sets: Vec::new(),
                    faces: Vec::new(),
                })
                .collect(),
            weight_groups: Vec::new(),
        }
    }

    #[test]
    fn objects_pair_with_their_group_materials() {
        let groups = vec![
            ModlGroup {
                mesh_group_name: "body".to_string(),
                sub_index: 0,
                material_name: "alp_body".to_string(),
            },
            ModlGroup {
                mesh_group_name: "body.001".to_string(),
                sub_index: 0,
                material_name: "alp_face".to_string(),
            },
        ];
        let bone_names = vec!["Trans".to_string()];

        let objects = assemble_objects(test_mesh(&["body", "body.001"]), &groups, &bone_names);

        assert_eq!(2, objects.len());
        assert_eq!(Some("alp_body".to_string()), objects[0].material_label);
        assert_eq!(Some("alp_face".to_string()), objects[1].material_label);
        // Weight resolution ran for every vertex.
        assert_eq!(2, objects[0].vertex_weights.len());
    }

    #[test]
    fn missing_group_mapping_leaves_the_material_unassigned() {
        let objects = assemble_objects(test_mesh(&["teeth"]), &[], &[]);

        assert_eq!(1, objects.len());
        assert_eq!(None, objects[0].material_label);
    }
}
