//! Partition a build output directory into size-bounded zip archives.
//!
//! Files are visited in relative-path order so that an unchanged tree always
//! produces the same archives. An archive is closed as soon as the next file
//! would push it past the byte budget; a file that is larger than the budget
//! on its own gets an archive to itself.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{DeployError, Result};

/// Name of the listing written next to the archives.
pub const FILENAMES_FILE: &str = "filenames";

/// One file discovered under the source directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Path relative to the source directory, `/`-separated.
    pub relative_path: String,
    pub absolute_path: PathBuf,
    pub size_bytes: u64,
}

/// A group of files destined for one zip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Archive {
    pub index: usize,
    pub entries: Vec<FileEntry>,
    pub total_size_bytes: u64,
}

impl Archive {
    fn new(index: usize) -> Self {
        Self {
            index,
            entries: Vec::new(),
            total_size_bytes: 0,
        }
    }

    fn push(&mut self, entry: FileEntry) {
        self.total_size_bytes += entry.size_bytes;
        self.entries.push(entry);
    }

    /// File name of this archive inside the output directory.
    pub fn file_name(&self) -> String {
        format!("part{}.zip", self.index)
    }
}

/// Archives written to disk plus the flat listing of archived paths.
#[derive(Debug, Clone)]
pub struct ArchiveOutput {
    pub archives: Vec<Archive>,
    pub parts: Vec<PathBuf>,
    pub filenames_path: PathBuf,
    pub filenames: Vec<String>,
}

fn relative_key(root: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let mut segments = Vec::new();
    for component in relative.components() {
        let segment = component.as_os_str().to_str().ok_or_else(|| DeployError::ReadFailed {
            path: path.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "file name is not valid UTF-8",
            ),
        })?;
        segments.push(segment);
    }
    Ok(segments.join("/"))
}

/// List every file below `source_dir`, sorted by relative path.
///
/// Symlinks are followed so that linked assets are archived by content.
pub fn list_files(source_dir: &Path) -> Result<Vec<FileEntry>> {
    if !source_dir.is_dir() {
        return Err(DeployError::SourceNotFound(source_dir.to_path_buf()));
    }

    let mut entries = Vec::new();
    for entry in WalkDir::new(source_dir).follow_links(true).min_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let metadata = entry.metadata()?;
        entries.push(FileEntry {
            relative_path: relative_key(source_dir, entry.path())?,
            absolute_path: entry.path().to_path_buf(),
            size_bytes: metadata.len(),
        });
    }
    entries.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(entries)
}

/// Split `entries` (already sorted) into archives of at most
/// `max_archive_bytes`, except single files that exceed the budget alone.
pub fn partition(entries: Vec<FileEntry>, max_archive_bytes: u64) -> Vec<Archive> {
    let mut archives = Vec::new();
    let mut current = Archive::new(0);

    for entry in entries {
        if !current.entries.is_empty()
            && current.total_size_bytes + entry.size_bytes > max_archive_bytes
        {
            let next = Archive::new(current.index + 1);
            archives.push(std::mem::replace(&mut current, next));
        }
        current.push(entry);
    }
    if !current.entries.is_empty() {
        archives.push(current);
    }
    archives
}

fn write_zip(archive: &Archive, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    let mut zip = ZipWriter::new(BufWriter::new(file));

    for entry in &archive.entries {
        // Fixed timestamps keep identical inputs byte-identical.
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(zip::DateTime::default())
            .unix_permissions(0o644)
            .large_file(entry.size_bytes >= u64::from(u32::MAX));
        zip.start_file(entry.relative_path.as_str(), options)?;

        let read_failed = |source| DeployError::ReadFailed {
            path: entry.absolute_path.clone(),
            source,
        };
        let mut src = File::open(&entry.absolute_path).map_err(read_failed)?;
        std::io::copy(&mut src, &mut zip).map_err(read_failed)?;
    }

    let mut writer = zip.finish()?;
    writer.flush()?;
    Ok(())
}

/// Write `filenames` into `path`, one relative path per line.
pub fn write_filenames(path: &Path, filenames: &[String]) -> Result<()> {
    let mut body = filenames.join("\n");
    if !body.is_empty() {
        body.push('\n');
    }
    std::fs::write(path, body)?;
    Ok(())
}

/// Parse a `filenames` listing.
pub fn parse_filenames(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// Absolute form of `path` with every existing ancestor canonicalized, so
/// that directories which do not exist yet can still be compared.
fn resolve(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut existing = absolute.as_path();
    let mut missing = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => break,
        }
    }

    let mut resolved = existing.canonicalize()?;
    resolved.extend(missing.into_iter().rev());
    Ok(resolved)
}

/// Refuse an output directory that is, contains, or lies inside the source.
fn check_disjoint(source_dir: &Path, output_dir: &Path) -> Result<()> {
    let source = resolve(source_dir)?;
    let output = resolve(output_dir)?;
    if output.starts_with(&source) || source.starts_with(&output) {
        return Err(DeployError::OutputOverlapsSource {
            source_dir: source_dir.to_path_buf(),
            output: output_dir.to_path_buf(),
        });
    }
    Ok(())
}

/// Whether `name` is a file this module writes into an output directory.
fn is_generated(name: &str) -> bool {
    if name == FILENAMES_FILE {
        return true;
    }
    name.strip_prefix("part")
        .and_then(|rest| rest.strip_suffix(".zip"))
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

/// Delete parts and listings left by a previous run. Anything else in
/// `output_dir` is left alone.
fn remove_stale_outputs(output_dir: &Path) -> Result<()> {
    for entry in std::fs::read_dir(output_dir)? {
        let entry = entry?;
        let stale = entry.file_type()?.is_file()
            && entry.file_name().to_str().is_some_and(is_generated);
        if stale {
            std::fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}

/// Archive `source_dir` into `output_dir` as `part0.zip, part1.zip, ...`
/// plus a `filenames` listing.
///
/// Parts and listings from a previous run are removed first; other files in
/// `output_dir` are kept. `output_dir` must not overlap `source_dir`.
pub fn archive_directory(
    source_dir: &Path,
    output_dir: &Path,
    max_archive_bytes: u64,
) -> Result<ArchiveOutput> {
    let entries = list_files(source_dir)?;
    check_disjoint(source_dir, output_dir)?;
    let filenames: Vec<String> = entries.iter().map(|e| e.relative_path.clone()).collect();
    let archives = partition(entries, max_archive_bytes);

    std::fs::create_dir_all(output_dir)?;
    remove_stale_outputs(output_dir)?;

    let mut parts = Vec::with_capacity(archives.len());
    for archive in &archives {
        let path = output_dir.join(archive.file_name());
        write_zip(archive, &path)?;
        debug!(
            part = %archive.file_name(),
            files = archive.entries.len(),
            bytes = archive.total_size_bytes,
            "wrote archive"
        );
        parts.push(path);
    }

    let filenames_path = output_dir.join(FILENAMES_FILE);
    write_filenames(&filenames_path, &filenames)?;

    info!(
        source = %source_dir.display(),
        archives = archives.len(),
        files = filenames.len(),
        "archived build output"
    );

    Ok(ArchiveOutput {
        archives,
        parts,
        filenames_path,
        filenames,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: u64 = 1024 * 1024;

    fn entry(name: &str, size: u64) -> FileEntry {
        FileEntry {
            relative_path: name.to_string(),
            absolute_path: PathBuf::from(format!("/src/{name}")),
            size_bytes: size,
        }
    }

    fn names(archive: &Archive) -> Vec<&str> {
        archive
            .entries
            .iter()
            .map(|e| e.relative_path.as_str())
            .collect()
    }

    #[test]
    fn ten_ten_five_under_fifteen_gives_two_archives() {
        let archives = partition(
            vec![entry("a", 10 * MB), entry("b", 10 * MB), entry("c", 5 * MB)],
            15 * MB,
        );
        assert_eq!(archives.len(), 2);
        assert!(archives.iter().all(|a| a.total_size_bytes <= 15 * MB));
        assert_eq!(names(&archives[0]), vec!["a"]);
        assert_eq!(names(&archives[1]), vec!["b", "c"]);
        assert_eq!(archives[1].total_size_bytes, 15 * MB);
    }

    #[test]
    fn oversized_file_gets_its_own_archive() {
        let archives = partition(vec![entry("video.mp4", 300 * MB)], 200 * MB);
        assert_eq!(archives.len(), 1);
        assert_eq!(archives[0].entries.len(), 1);
        assert_eq!(archives[0].total_size_bytes, 300 * MB);
    }

    #[test]
    fn oversized_file_between_small_files_is_isolated() {
        let archives = partition(
            vec![entry("a", 1), entry("b", 500), entry("c", 1)],
            100,
        );
        let groups: Vec<_> = archives.iter().map(names).collect();
        assert_eq!(groups, vec![vec!["a"], vec!["b"], vec!["c"]]);
        assert_eq!(
            archives.iter().map(|a| a.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn empty_input_yields_no_archives() {
        assert!(partition(Vec::new(), 10).is_empty());
    }

    #[test]
    fn zero_byte_files_never_split() {
        let entries = (0..50).map(|i| entry(&format!("f{i:02}"), 0)).collect();
        let archives = partition(entries, 1);
        assert_eq!(archives.len(), 1);
        assert_eq!(archives[0].entries.len(), 50);
    }

    #[test]
    fn budget_holds_for_mixed_sizes() {
        let sizes = [7u64, 3, 9, 1, 12, 4, 4, 4, 20, 2, 8, 6];
        let entries = sizes
            .iter()
            .enumerate()
            .map(|(i, s)| entry(&format!("f{i:02}"), *s))
            .collect();
        let limit = 10;
        for archive in partition(entries, limit) {
            assert!(
                archive.total_size_bytes <= limit || archive.entries.len() == 1,
                "archive {} over budget",
                archive.index
            );
        }
    }

    #[test]
    fn only_generated_names_are_stale() {
        assert!(is_generated("part0.zip"));
        assert!(is_generated("part12.zip"));
        assert!(is_generated(FILENAMES_FILE));
        assert!(!is_generated("part.zip"));
        assert!(!is_generated("partx.zip"));
        assert!(!is_generated("README.md"));
        assert!(!is_generated("part0.zip.bak"));
    }

    #[test]
    fn filenames_listing_parses_back() {
        let parsed = parse_filenames("index.html\nassets/app.js\n\n");
        assert_eq!(parsed, vec!["index.html", "assets/app.js"]);
    }
}
