use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use super::{NavMesh, NavMeshDescription, NavMeshError};

impl NavMesh {
    /// Write the built mesh as zlib-compressed bincode.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), NavMeshError> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        let mut encoder = ZlibEncoder::new(writer, Compression::default());
        bincode::serialize_into(&mut encoder, self)?;
        encoder.finish()?;
        Ok(())
    }

    /// Read a mesh written by [`NavMesh::save`], rejecting out-of-range indices.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, NavMeshError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut decoder = ZlibDecoder::new(reader);
        let mesh: NavMesh = bincode::deserialize_from(&mut decoder)?;
        mesh.validate_indices()?;
        Ok(mesh)
    }
}

impl NavMeshDescription {
    pub fn from_ron(source: &str) -> Result<Self, NavMeshError> {
        Ok(ron::from_str(source)?)
    }

    /// Read an authored tile from a RON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, NavMeshError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_ron(&source)
    }
}
