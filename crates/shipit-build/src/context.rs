//! Build context assembly.
//!
//! Packs the workspace into a gzipped tar archive for the Docker daemon.
//! The build descriptor is normalized to "Dockerfile" at the archive root
//! and the ".git" directory is excluded.

use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tar::Builder;
use tracing::{debug, warn};

use shipit_core::{Error, Result};

const MAX_CONTEXT_SIZE: usize = 500 * 1024 * 1024;

pub struct ContextArchive;

impl ContextArchive {
    /// Archive `context_root` with `dockerfile_path` placed at
    /// "Dockerfile" regardless of where it lives in the workspace.
    pub fn pack(context_root: &Path, dockerfile_path: &Path) -> Result<Vec<u8>> {
        debug!(context = %context_root.display(), "Creating build context");

        let mut archive_data = Vec::new();
        {
            let encoder = GzEncoder::new(&mut archive_data, Compression::default());
            let mut tar = Builder::new(encoder);

            let entries = std::fs::read_dir(context_root)
                .map_err(|e| Error::Internal(format!("failed to read context dir: {e}")))?;

            for entry in entries {
                let entry =
                    entry.map_err(|e| Error::Internal(format!("failed to read entry: {e}")))?;
                let name = entry.file_name();

                if name == ".git" {
                    continue;
                }

                let path = entry.path();
                let io_err = |e: std::io::Error| {
                    Error::Internal(format!("failed to archive {}: {e}", path.display()))
                };

                if path.is_dir() {
                    tar.append_dir_all(&name, &path).map_err(io_err)?;
                } else {
                    tar.append_path_with_name(&path, &name).map_err(io_err)?;
                }
            }

            let mut dockerfile = File::open(dockerfile_path)
                .map_err(|e| Error::Internal(format!("failed to open build descriptor: {e}")))?;
            let mut content = Vec::new();
            dockerfile
                .read_to_end(&mut content)
                .map_err(|e| Error::Internal(format!("failed to read build descriptor: {e}")))?;

            let mut header = tar::Header::new_gnu();
            header
                .set_path("Dockerfile")
                .map_err(|e| Error::Internal(format!("failed to set Dockerfile path: {e}")))?;
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();

            tar.append(&header, &content[..])
                .map_err(|e| Error::Internal(format!("failed to append Dockerfile: {e}")))?;

            tar.finish()
                .map_err(|e| Error::Internal(format!("failed to finish archive: {e}")))?;
        }

        debug!(bytes = archive_data.len(), "Build context created");

        if archive_data.len() > MAX_CONTEXT_SIZE {
            warn!(
                megabytes = archive_data.len() / 1024 / 1024,
                "Build context is very large; consider a .dockerignore"
            );
        }

        Ok(archive_data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn unpack(archive: Vec<u8>) -> tempfile::TempDir {
        let extract_dir = tempdir().unwrap();
        let mut reader = std::io::Cursor::new(archive);
        let decoder = flate2::read::GzDecoder::new(&mut reader);
        let mut tar = tar::Archive::new(decoder);
        tar.unpack(extract_dir.path()).unwrap();
        extract_dir
    }

    #[test]
    fn test_pack_includes_tree_and_dockerfile() {
        let temp_dir = tempdir().unwrap();
        fs::write(temp_dir.path().join("main.js"), "console.log(1)").unwrap();

        let subdir = temp_dir.path().join("lib");
        fs::create_dir(&subdir).unwrap();
        fs::write(subdir.join("util.js"), "module.exports = {}").unwrap();

        let dockerfile = temp_dir.path().join("Dockerfile");
        fs::write(&dockerfile, "FROM node:20").unwrap();

        let archive = ContextArchive::pack(temp_dir.path(), &dockerfile).unwrap();
        let extracted = unpack(archive);

        assert!(extracted.path().join("Dockerfile").exists());
        assert!(extracted.path().join("main.js").exists());
        assert!(extracted.path().join("lib/util.js").exists());
    }

    #[test]
    fn test_pack_excludes_git_directory() {
        let temp_dir = tempdir().unwrap();
        fs::write(temp_dir.path().join("app.py"), "print(1)").unwrap();

        let git_dir = temp_dir.path().join(".git");
        fs::create_dir(&git_dir).unwrap();
        fs::write(git_dir.join("HEAD"), "ref: refs/heads/main").unwrap();

        let dockerfile = temp_dir.path().join("Dockerfile");
        fs::write(&dockerfile, "FROM python:3").unwrap();

        let archive = ContextArchive::pack(temp_dir.path(), &dockerfile).unwrap();
        let extracted = unpack(archive);

        assert!(extracted.path().join("app.py").exists());
        assert!(!extracted.path().join(".git").exists());
    }

    #[test]
    fn test_pack_normalizes_dockerfile_location() {
        let temp_dir = tempdir().unwrap();

        let docker_dir = temp_dir.path().join("docker");
        fs::create_dir(&docker_dir).unwrap();
        let dockerfile = docker_dir.join("Dockerfile.prod");
        fs::write(&dockerfile, "FROM alpine").unwrap();

        let archive = ContextArchive::pack(temp_dir.path(), &dockerfile).unwrap();
        let extracted = unpack(archive);

        let content = fs::read_to_string(extracted.path().join("Dockerfile")).unwrap();
        assert_eq!(content, "FROM alpine");
    }
}
