// src/storage.rs
//
// Output storage for composited edits. Mirrors `mask_generator`'s own
// save-to-disk convention (app-data subdirectory, uuid-based filename) but
// swaps the hand-rolled PNG writer for the `image` crate and adds the
// filename validation that `generate_mask`/`save_mask_image` never needed
// because they only ever wrote files they named themselves.

use crate::errors::CoreError;
use regex::Regex;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const GENERATED_SUBDIR: &str = "generated";
const EDITS_SUBDIR: &str = "edits";

fn filename_pattern() -> Regex {
    Regex::new(r"^[a-f0-9-]+\.(png|jpg|jpeg|webp)$").expect("static filename regex is valid")
}

/// The two flat directories on disk (spec §6.3): `generated/` holds
/// uploads and raw model generations, `edits/` holds composited outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dest {
    Generated,
    Edits,
}

impl Dest {
    fn subdir(self) -> &'static str {
        match self {
            Self::Generated => GENERATED_SUBDIR,
            Self::Edits => EDITS_SUBDIR,
        }
    }
}

/// Which of the two directories a file read back by `read_by_name` was
/// found in (spec §6.2 "origin_tag").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Generated,
    Edits,
}

pub trait Storage: Send + Sync {
    /// Persist `bytes` under a fresh uuid-based filename in `dest` and
    /// return the path the caller can hand back to the frontend.
    fn save(&self, dest: Dest, bytes: &[u8], extension: &str) -> Result<PathBuf, CoreError>;

    /// Read back previously saved bytes by filename, rejecting anything
    /// that doesn't match the filename convention this storage writes
    /// (`bad_file_name` — spec §7). Searches `generated/` before `edits/`.
    fn read(&self, filename: &str) -> Result<Vec<u8>, CoreError>;

    /// As `read`, but also reports which directory the file came from.
    fn read_by_name(&self, filename: &str) -> Result<(Vec<u8>, Origin), CoreError>;
}

pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new(root: PathBuf) -> Result<Self, CoreError> {
        for dest in [Dest::Generated, Dest::Edits] {
            let dir = root.join(dest.subdir());
            std::fs::create_dir_all(&dir)
                .map_err(|e| CoreError::invariant("storage_init_failed", format!("cannot create {}: {}", dir.display(), e)))?;
        }
        Ok(Self { root })
    }

    fn dir(&self, dest: Dest) -> PathBuf {
        self.root.join(dest.subdir())
    }

    fn validate_filename(&self, filename: &str) -> Result<(), CoreError> {
        if Path::new(filename).file_name().map(|n| n.to_string_lossy().into_owned()) != Some(filename.to_string()) {
            return Err(CoreError::validation("bad_file_name", "filename must not contain path separators"));
        }
        if !filename_pattern().is_match(filename) {
            return Err(CoreError::validation("bad_file_name", format!("filename '{}' does not match the expected pattern", filename)));
        }
        Ok(())
    }
}

impl Storage for FsStorage {
    fn save(&self, dest: Dest, bytes: &[u8], extension: &str) -> Result<PathBuf, CoreError> {
        let filename = format!("{}.{}", Uuid::new_v4(), extension);
        self.validate_filename(&filename)?;
        let path = self.dir(dest).join(&filename);
        std::fs::write(&path, bytes)
            .map_err(|e| CoreError::image(format!("cannot write {}: {}", path.display(), e)))?;
        Ok(path)
    }

    fn read(&self, filename: &str) -> Result<Vec<u8>, CoreError> {
        self.read_by_name(filename).map(|(bytes, _)| bytes)
    }

    fn read_by_name(&self, filename: &str) -> Result<(Vec<u8>, Origin), CoreError> {
        self.validate_filename(filename)?;
        let generated_path = self.dir(Dest::Generated).join(filename);
        if let Ok(bytes) = std::fs::read(&generated_path) {
            return Ok((bytes, Origin::Generated));
        }
        let edits_path = self.dir(Dest::Edits).join(filename);
        std::fs::read(&edits_path)
            .map(|bytes| (bytes, Origin::Edits))
            .map_err(|_| CoreError::not_found(format!("no such file: {}", filename)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_read_round_trips() {
        let dir = std::env::temp_dir().join(format!("maskmend-test-{}", Uuid::new_v4()));
        let storage = FsStorage::new(dir.clone()).unwrap();
        let path = storage.save(Dest::Edits, b"hello", "png").unwrap();
        let filename = path.file_name().unwrap().to_str().unwrap();
        let read_back = storage.read(filename).unwrap();
        assert_eq!(read_back, b"hello");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn read_by_name_reports_origin_and_prefers_generated() {
        let dir = std::env::temp_dir().join(format!("maskmend-test-{}", Uuid::new_v4()));
        let storage = FsStorage::new(dir.clone()).unwrap();
        let path = storage.save(Dest::Generated, b"upload", "png").unwrap();
        let filename = path.file_name().unwrap().to_str().unwrap().to_string();
        let (bytes, origin) = storage.read_by_name(&filename).unwrap();
        assert_eq!(bytes, b"upload");
        assert_eq!(origin, Origin::Generated);

        let edit_path = storage.save(Dest::Edits, b"composited", "png").unwrap();
        let edit_filename = edit_path.file_name().unwrap().to_str().unwrap().to_string();
        let (bytes, origin) = storage.read_by_name(&edit_filename).unwrap();
        assert_eq!(bytes, b"composited");
        assert_eq!(origin, Origin::Edits);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn read_rejects_path_traversal() {
        let dir = std::env::temp_dir().join(format!("maskmend-test-{}", Uuid::new_v4()));
        let storage = FsStorage::new(dir.clone()).unwrap();
        let err = storage.read("../../etc/passwd").unwrap_err();
        assert_eq!(err.tag(), "bad_file_name");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn read_rejects_unexpected_extension() {
        let dir = std::env::temp_dir().join(format!("maskmend-test-{}", Uuid::new_v4()));
        let storage = FsStorage::new(dir.clone()).unwrap();
        let err = storage.read("not-a-uuid.exe").unwrap_err();
        assert_eq!(err.tag(), "bad_file_name");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn read_missing_file_is_not_found() {
        let dir = std::env::temp_dir().join(format!("maskmend-test-{}", Uuid::new_v4()));
        let storage = FsStorage::new(dir.clone()).unwrap();
        let err = storage.read("00000000-0000-0000-0000-000000000000.png").unwrap_err();
        assert_eq!(err.tag(), "file_not_found");
        std::fs::remove_dir_all(&dir).ok();
    }
}
