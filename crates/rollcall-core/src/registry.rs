//! Known-faces registry built from a directory of reference images.
//!
//! Each file is one identity: the file stem is the display name and the
//! first detected face is its embedding. Name and embedding are produced
//! together, so a skipped image can never shift later names onto the
//! wrong embeddings.

use crate::engine::FaceEngine;
use crate::types::{FaceEncoding, KnownFace};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("cannot read image directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Why a reference image was left out of the registry.
#[derive(Debug)]
enum Skip {
    Decode(image::ImageError),
    NoFace,
    Encode(crate::engine::EngineError),
}

/// Immutable, ordered table of known faces.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    faces: Vec<KnownFace>,
}

impl Registry {
    pub fn new(faces: Vec<KnownFace>) -> Self {
        Self { faces }
    }

    /// Build the registry from every file in `dir` (non-recursive).
    ///
    /// Files are visited in file-name order. Images that fail to decode or
    /// contain no detectable face are skipped with a warning; only an
    /// unreadable directory is an error.
    pub fn build<E: FaceEngine + ?Sized>(dir: &Path, engine: &mut E) -> Result<Self, RegistryError> {
        let files = list_files(dir)?;
        tracing::info!(dir = %dir.display(), count = files.len(), "loading reference images");

        let mut faces = Vec::with_capacity(files.len());
        for path in &files {
            let Some(name) = display_name(path) else {
                tracing::warn!(path = %path.display(), "file name is not a usable identity, skipping");
                continue;
            };
            match encode_file(path, engine) {
                Ok(embedding) => faces.push(KnownFace { name, embedding }),
                Err(Skip::Decode(e)) => {
                    tracing::warn!(path = %path.display(), error = %e, "cannot decode image, skipping");
                }
                Err(Skip::NoFace) => {
                    tracing::warn!(path = %path.display(), "no face found in image, skipping");
                }
                Err(Skip::Encode(e)) => {
                    tracing::warn!(path = %path.display(), error = %e, "face encoding failed, skipping");
                }
            }
        }

        let registry = Self::new(faces);
        tracing::info!(
            loaded = registry.len(),
            skipped = files.len() - registry.len(),
            names = ?registry.names().collect::<Vec<_>>(),
            "registry ready"
        );
        Ok(registry)
    }

    pub fn faces(&self) -> &[KnownFace] {
        &self.faces
    }

    pub fn get(&self, index: usize) -> Option<&KnownFace> {
        self.faces.get(index)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.faces.iter().map(|f| f.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }
}

fn list_files(dir: &Path) -> Result<Vec<PathBuf>, RegistryError> {
    let read_err = |source| RegistryError::ReadDir { path: dir.to_path_buf(), source };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(read_err)? {
        let path = entry.map_err(read_err)?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

fn encode_file<E: FaceEngine + ?Sized>(path: &Path, engine: &mut E) -> Result<crate::types::Embedding, Skip> {
    let image = image::open(path).map_err(Skip::Decode)?.to_rgb8();
    match engine.encode_face(&image, None).map_err(Skip::Encode)? {
        FaceEncoding::Face(embedding) => Ok(embedding),
        FaceEncoding::NoFaceFound => Err(Skip::NoFace),
    }
}

/// Identity for a reference image: the file name without its extension.
pub fn display_name(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_string_lossy();
    if stem.is_empty() {
        None
    } else {
        Some(stem.into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fake::ColourEngine;
    use image::{Rgb, RgbImage};

    fn write_image(dir: &Path, file: &str, colour: [u8; 3]) {
        RgbImage::from_pixel(16, 16, Rgb(colour)).save(dir.join(file)).unwrap();
    }

    #[test]
    fn test_display_name_strips_extension() {
        assert_eq!(display_name(Path::new("imgs/Alice.jpg")).as_deref(), Some("Alice"));
        assert_eq!(display_name(Path::new("imgs/Mary Ann.smith.png")).as_deref(), Some("Mary Ann.smith"));
        assert_eq!(display_name(Path::new("imgs/noext")).as_deref(), Some("noext"));
    }

    #[test]
    fn test_display_name_keeps_surrounding_whitespace() {
        assert_eq!(display_name(Path::new("imgs/ Alice .jpg")).as_deref(), Some(" Alice "));
    }

    #[test]
    fn test_build_skips_faceless_images_without_misalignment() {
        let dir = tempfile::tempdir().unwrap();
        // Faceless images interleaved with face images, not just at the end.
        write_image(dir.path(), "a_blank.png", [0, 0, 0]);
        write_image(dir.path(), "b_red.png", [255, 0, 0]);
        write_image(dir.path(), "c_blank.png", [0, 0, 0]);
        write_image(dir.path(), "d_green.png", [0, 255, 0]);
        write_image(dir.path(), "e_blue.png", [0, 0, 255]);

        let registry = Registry::build(dir.path(), &mut ColourEngine).unwrap();

        assert_eq!(registry.len(), 3);
        let names: Vec<&str> = registry.names().collect();
        assert_eq!(names, vec!["b_red", "d_green", "e_blue"]);
        assert_eq!(registry.get(0).unwrap().embedding.values, vec![1.0, 0.0, 0.0]);
        assert_eq!(registry.get(1).unwrap().embedding.values, vec![0.0, 1.0, 0.0]);
        assert_eq!(registry.get(2).unwrap().embedding.values, vec![0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_build_skips_undecodable_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not an image").unwrap();
        write_image(dir.path(), "Alice.png", [200, 10, 10]);

        let registry = Registry::build(dir.path(), &mut ColourEngine).unwrap();
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["Alice"]);
    }

    #[test]
    fn test_build_ignores_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        write_image(&dir.path().join("nested"), "Hidden.png", [9, 9, 9]);
        write_image(dir.path(), "Top.png", [9, 9, 9]);

        let registry = Registry::build(dir.path(), &mut ColourEngine).unwrap();
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["Top"]);
    }

    #[test]
    fn test_build_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::build(dir.path(), &mut ColourEngine).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_build_missing_directory_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        let err = Registry::build(&missing, &mut ColourEngine).unwrap_err();
        assert!(matches!(err, RegistryError::ReadDir { .. }));
    }
}
