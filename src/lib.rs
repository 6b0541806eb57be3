//! # ssbh_import
//!
//! ssbh_import decodes the binary container formats referenced by a model's
//! `.numdlb` file (MODL, MATL, SKEL, MESH) as well as `.nuanmb` animations
//! (ANIM) into plain Rust data suitable for import pipelines.
//!
//! ## Features
//! - Automatic decoding of bit-packed animation tracks and half precision vertex buffers
//! - Usage of standard Rust types like [Vec] and [String]
//! - Typed errors for malformed containers, so batch imports can continue past one bad file
//! - No shared state between decodes, so independent files can be decoded concurrently
//!
//! ## Getting Started
//! The easiest way to access important items like [ModelData](crate::model_data::ModelData)
//! is to import the [prelude].
/*!
```no_run
use ssbh_import::prelude::*;

# fn main() -> Result<(), ssbh_import::DecodeError> {
// Decode a model and every file it references.
let model = ModelData::from_file("model.numdlb")?;

for object in &model.objects {
    println!("{}: {} vertices", object.mesh.name, object.mesh.positions.len());
}

// Animations are decoded separately.
let anim = AnimData::from_file("a00wait1.nuanmb")?;
# Ok(())
# }
```
 */
//!
//! Decoding is strictly sequential within a file. Every stored offset is
//! relative to the stream position recorded immediately before it is read,
//! so out of order reads are unsafe. Parallelism belongs across files, not
//! within one.
pub mod anim_data;
pub mod error;
pub mod half;
pub mod matl_data;
pub mod mesh_data;
pub mod model_data;
pub mod modl_data;
mod reader;
pub mod skel_data;
pub mod vectors;

use std::io::{Cursor, Read, Seek};
use std::path::Path;

pub use crate::error::DecodeError;
pub use crate::half::Half;

/// Decoding entry points shared by the container formats.
pub trait ImportData: Sized {
    /// Tries to read and decode the data from `reader`.
    fn read<R: Read + Seek>(reader: &mut R) -> Result<Self, DecodeError>;

    /// Tries to read and decode the data from `path`.
    /// The entire file is buffered for performance.
    fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, DecodeError> {
        let mut reader = Cursor::new(std::fs::read(path)?);
        Self::read(&mut reader)
    }
}

/// Common imports for top level types and important traits.
pub mod prelude {
    pub use crate::anim_data::AnimData;
    pub use crate::matl_data::MatlData;
    pub use crate::mesh_data::MeshData;
    pub use crate::model_data::ModelData;
    pub use crate::modl_data::ModlData;
    pub use crate::skel_data::SkelData;
    pub use crate::ImportData;
}
