//! ZIP archive assembly for successful batch outputs

use crate::{
    cleanup::RunWorkspace,
    config::ArchiveCompression,
    error::{BgStudioError, Result},
    types::{BatchRun, ProcessingResult},
};
use std::{
    collections::HashSet,
    io::{Cursor, Write},
    path::Path,
};
use tracing::{debug, instrument};
use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

/// One file to place in an archive
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    /// 1-based position of the originating item, used to disambiguate names
    pub position: usize,
    /// Desired entry name; directory components are stripped
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Builds ZIP archives from batch outputs
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveBuilder {
    compression: ArchiveCompression,
}

impl ArchiveBuilder {
    #[must_use]
    pub fn new(compression: ArchiveCompression) -> Self {
        Self { compression }
    }

    /// Archive every successful output of `run`
    ///
    /// # Errors
    /// - An output was already consumed or the archive cannot be written
    pub fn build(&self, run: &BatchRun) -> Result<Vec<u8>> {
        self.build_from_results(run.results(), run.workspace())
    }

    /// Archive the successful results among `results`; failed ones are skipped
    ///
    /// # Errors
    /// - An output was already consumed or the archive cannot be written
    pub fn build_from_results(
        &self,
        results: &[ProcessingResult],
        workspace: &RunWorkspace,
    ) -> Result<Vec<u8>> {
        let mut entries = Vec::new();
        for result in results.iter().filter(|r| r.is_success()) {
            if let Some(output) = &result.output {
                let bytes = workspace
                    .read(&output.handle)
                    .map_err(|e| BgStudioError::archive(format!("{}: {}", output.file_name, e)))?;
                entries.push(ArchiveEntry {
                    position: result.index + 1,
                    name: output.file_name.clone(),
                    bytes,
                });
            }
        }
        self.build_entries(entries)
    }

    /// Write `entries` into a ZIP archive, keeping names unique
    ///
    /// # Errors
    /// - Archive encoding failure
    #[instrument(skip_all, fields(entries = entries.len()))]
    pub fn build_entries(&self, entries: Vec<ArchiveEntry>) -> Result<Vec<u8>> {
        let method = match self.compression {
            ArchiveCompression::Deflated => CompressionMethod::Deflated,
            ArchiveCompression::Stored => CompressionMethod::Stored,
        };
        let options = SimpleFileOptions::default().compression_method(method);

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let mut taken = HashSet::new();
        for entry in entries {
            let base = base_file_name(&entry.name);
            let name = unique_entry_name(&base, entry.position, &mut taken);
            debug!(entry = %name, bytes = entry.bytes.len(), "Adding archive entry");
            writer.start_file(name.as_str(), options)?;
            writer
                .write_all(&entry.bytes)
                .map_err(|e| BgStudioError::archive(format!("Failed to write '{}': {}", name, e)))?;
        }

        Ok(writer.finish()?.into_inner())
    }

    /// Build the archive for `run` and write it to `path`
    ///
    /// # Errors
    /// - Archive build failure or the file cannot be written
    pub fn write_to_path<P: AsRef<Path>>(&self, run: &BatchRun, path: P) -> Result<u64> {
        let path = path.as_ref();
        let bytes = self.build(run)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| BgStudioError::file_io_error("create archive directory", parent, &e))?;
        }
        std::fs::write(path, &bytes)
            .map_err(|e| BgStudioError::file_io_error("write archive", path, &e))?;
        Ok(bytes.len() as u64)
    }
}

fn base_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    if base.is_empty() {
        "output".to_string()
    } else {
        base.to_string()
    }
}

/// Claim a unique name in `taken`
///
/// A clash appends `_{position}` before the extension; if that is taken too a
/// counter follows (`cat_processed_3.png`, `cat_processed_3_2.png`).
pub(crate) fn unique_entry_name(name: &str, position: usize, taken: &mut HashSet<String>) -> String {
    if taken.insert(name.to_string()) {
        return name.to_string();
    }

    let (stem, ext) = match name.rfind('.') {
        Some(dot) if dot > 0 => (&name[..dot], &name[dot..]),
        _ => (name, ""),
    };

    let candidate = format!("{}_{}{}", stem, position, ext);
    if taken.insert(candidate.clone()) {
        return candidate;
    }

    let mut counter = 2;
    loop {
        let candidate = format!("{}_{}_{}{}", stem, position, counter, ext);
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use zip::ZipArchive;

    fn entry(position: usize, name: &str, bytes: &[u8]) -> ArchiveEntry {
        ArchiveEntry {
            position,
            name: name.to_string(),
            bytes: bytes.to_vec(),
        }
    }

    fn names(bytes: Vec<u8>) -> Vec<String> {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect()
    }

    #[test]
    fn test_empty_archive_is_valid() {
        let bytes = ArchiveBuilder::default().build_entries(Vec::new()).unwrap();
        let archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 0);
    }

    #[test]
    fn test_duplicate_names_are_disambiguated() {
        let bytes = ArchiveBuilder::new(ArchiveCompression::Stored)
            .build_entries(vec![
                entry(1, "cat_processed.png", b"one"),
                entry(3, "cat_processed.png", b"two"),
            ])
            .unwrap();
        assert_eq!(names(bytes), vec!["cat_processed.png", "cat_processed_3.png"]);
    }

    #[test]
    fn test_directory_components_are_stripped() {
        let bytes = ArchiveBuilder::default()
            .build_entries(vec![entry(1, "some/dir/dog.png", b"x")])
            .unwrap();
        assert_eq!(names(bytes), vec!["dog.png"]);
    }

    #[test]
    fn test_entry_contents_survive_deflate() {
        let payload = vec![7_u8; 4096];
        let bytes = ArchiveBuilder::new(ArchiveCompression::Deflated)
            .build_entries(vec![entry(1, "a.png", &payload)])
            .unwrap();
        assert!(bytes.len() < payload.len());

        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut file = archive.by_name("a.png").unwrap();
        let mut read_back = Vec::new();
        file.read_to_end(&mut read_back).unwrap();
        assert_eq!(read_back, payload);
    }

    #[test]
    fn test_unique_entry_name_counter() {
        let mut taken = HashSet::new();
        assert_eq!(unique_entry_name("a.png", 1, &mut taken), "a.png");
        taken.insert("a_2.png".to_string());
        assert_eq!(unique_entry_name("a.png", 2, &mut taken), "a_2_2.png");
        assert_eq!(unique_entry_name("README", 4, &mut taken), "README");
        assert_eq!(unique_entry_name("README", 4, &mut taken), "README_4");
    }
}
