//! Archiving and fingerprinting real directory trees.

use std::collections::BTreeSet;
use std::fs::File;
use std::path::Path;

use sitedeploy_core::archiver::{self, list_files, partition};
use sitedeploy_core::{archive_directory, build_id_for_dir, DeployError};

const MB: u64 = 1024 * 1024;

fn write(root: &Path, path: &str, content: &[u8]) {
    let full = root.join(path);
    std::fs::create_dir_all(full.parent().unwrap()).unwrap();
    std::fs::write(full, content).unwrap();
}

/// Sparse file of `len` zero bytes.
fn write_sized(root: &Path, path: &str, len: u64) {
    let full = root.join(path);
    std::fs::create_dir_all(full.parent().unwrap()).unwrap();
    File::create(full).unwrap().set_len(len).unwrap();
}

fn zip_entries(path: &Path) -> Vec<String> {
    let mut zip = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
    (0..zip.len())
        .map(|i| zip.by_index(i).unwrap().name().to_string())
        .collect()
}

// ===========================================================================
// Archiver
// ===========================================================================

#[test]
fn test_archives_respect_budget_and_cover_every_file() {
    let src = tempfile::tempdir().unwrap();
    for (i, size) in [300u64, 900, 50, 700, 1200, 10, 0, 450].iter().enumerate() {
        write_sized(src.path(), &format!("d{}/f{i}.bin", i % 3), *size);
    }
    let out = tempfile::tempdir().unwrap();

    let output = archive_directory(src.path(), &out.path().join("artifacts"), 1000).unwrap();

    let mut seen = BTreeSet::new();
    for archive in &output.archives {
        assert!(
            archive.total_size_bytes <= 1000 || archive.entries.len() == 1,
            "archive {} holds {} bytes",
            archive.index,
            archive.total_size_bytes
        );
        for entry in &archive.entries {
            assert!(seen.insert(entry.relative_path.clone()), "duplicate {}", entry.relative_path);
        }
    }
    assert_eq!(seen.len(), 8);
    assert_eq!(seen.into_iter().collect::<Vec<_>>(), output.filenames);

    for (archive, part) in output.archives.iter().zip(&output.parts) {
        assert_eq!(
            part.file_name().unwrap().to_str().unwrap(),
            format!("part{}.zip", archive.index)
        );
        let names: Vec<String> = archive.entries.iter().map(|e| e.relative_path.clone()).collect();
        assert_eq!(zip_entries(part), names);
    }
}

#[test]
fn test_identical_trees_produce_identical_artifacts() {
    let src = tempfile::tempdir().unwrap();
    write(src.path(), "index.html", b"<h1>home</h1>");
    write(src.path(), "css/site.css", b"body { margin: 0 }");
    write(src.path(), "js/app.js", b"console.log('hi')");
    let out = tempfile::tempdir().unwrap();

    let first = archive_directory(src.path(), &out.path().join("a"), 20).unwrap();
    let second = archive_directory(src.path(), &out.path().join("b"), 20).unwrap();

    assert_eq!(first.filenames, second.filenames);
    assert_eq!(first.parts.len(), second.parts.len());
    for (a, b) in first.parts.iter().zip(&second.parts) {
        assert_eq!(std::fs::read(a).unwrap(), std::fs::read(b).unwrap());
    }
    assert_eq!(
        std::fs::read(&first.filenames_path).unwrap(),
        std::fs::read(&second.filenames_path).unwrap()
    );
}

#[test]
fn test_rebuild_clears_stale_parts() {
    let src = tempfile::tempdir().unwrap();
    write(src.path(), "a.txt", b"aaaa");
    write(src.path(), "b.txt", b"bbbb");
    let out = tempfile::tempdir().unwrap();
    let artifacts = out.path().join("artifacts");

    assert_eq!(archive_directory(src.path(), &artifacts, 4).unwrap().parts.len(), 2);
    std::fs::remove_file(src.path().join("b.txt")).unwrap();
    let output = archive_directory(src.path(), &artifacts, 4).unwrap();

    assert_eq!(output.parts.len(), 1);
    assert!(!artifacts.join("part1.zip").exists());
    assert_eq!(
        archiver::parse_filenames(&std::fs::read_to_string(output.filenames_path).unwrap()),
        vec!["a.txt"]
    );
}

#[test]
fn test_rebuild_keeps_unrelated_files_in_output_dir() {
    let src = tempfile::tempdir().unwrap();
    write(src.path(), "index.html", b"home");
    let out = tempfile::tempdir().unwrap();
    write(out.path(), "README.md", b"notes");
    write(out.path(), "keep/part9.zip", b"not ours");
    write(out.path(), "part7.zip", b"stale");

    archive_directory(src.path(), out.path(), MB).unwrap();

    assert_eq!(std::fs::read(out.path().join("README.md")).unwrap(), b"notes");
    assert!(out.path().join("keep/part9.zip").exists());
    assert!(!out.path().join("part7.zip").exists());
    assert!(out.path().join("part0.zip").exists());
}

#[test]
fn test_output_dir_containing_source_is_rejected() {
    let project = tempfile::tempdir().unwrap();
    write(project.path(), "README.md", b"notes");
    write(project.path(), "dist/index.html", b"home");
    let src = project.path().join("dist");

    let err = archive_directory(&src, project.path(), MB).unwrap_err();

    assert!(matches!(err, DeployError::OutputOverlapsSource { .. }), "{err}");
    assert!(project.path().join("README.md").exists());
    assert!(src.join("index.html").exists());
    assert!(!project.path().join("filenames").exists());
}

#[test]
fn test_output_dir_equal_to_source_is_rejected() {
    let src = tempfile::tempdir().unwrap();
    write(src.path(), "index.html", b"home");

    let err = archive_directory(src.path(), src.path(), MB).unwrap_err();

    assert!(matches!(err, DeployError::OutputOverlapsSource { .. }), "{err}");
    assert!(!src.path().join("part0.zip").exists());
}

#[test]
fn test_output_dir_inside_source_is_rejected() {
    let src = tempfile::tempdir().unwrap();
    write(src.path(), "index.html", b"home");
    let nested = src.path().join("build/artifacts");

    let err = archive_directory(src.path(), &nested, MB).unwrap_err();

    assert!(matches!(err, DeployError::OutputOverlapsSource { .. }), "{err}");
    assert!(!src.path().join("build").exists());
}

#[test]
fn test_overlap_is_detected_through_relative_components() {
    let project = tempfile::tempdir().unwrap();
    write(project.path(), "dist/index.html", b"home");
    let src = project.path().join("dist");
    let sneaky = src.join("../dist/../dist/out");

    let err = archive_directory(&src, &sneaky, MB).unwrap_err();

    assert!(matches!(err, DeployError::OutputOverlapsSource { .. }), "{err}");
}

#[test]
fn test_ten_ten_five_at_fifteen() {
    let src = tempfile::tempdir().unwrap();
    write_sized(src.path(), "a", 10 * MB);
    write_sized(src.path(), "b", 10 * MB);
    write_sized(src.path(), "c", 5 * MB);

    let archives = partition(list_files(src.path()).unwrap(), 15 * MB);

    assert_eq!(archives.len(), 2);
    assert!(archives.iter().all(|a| a.total_size_bytes <= 15 * MB));
    let files: BTreeSet<&str> = archives
        .iter()
        .flat_map(|a| a.entries.iter().map(|e| e.relative_path.as_str()))
        .collect();
    assert_eq!(files, BTreeSet::from(["a", "b", "c"]));
}

#[test]
fn test_oversized_file_gets_its_own_archive() {
    let src = tempfile::tempdir().unwrap();
    write_sized(src.path(), "movie.mp4", 300 * MB);

    let archives = partition(list_files(src.path()).unwrap(), 200 * MB);

    assert_eq!(archives.len(), 1);
    assert_eq!(archives[0].entries.len(), 1);
    assert_eq!(archives[0].total_size_bytes, 300 * MB);
}

#[test]
fn test_empty_tree_yields_empty_listing() {
    let src = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(src.path().join("empty/nested")).unwrap();
    let out = tempfile::tempdir().unwrap();

    let output = archive_directory(src.path(), &out.path().join("artifacts"), MB).unwrap();

    assert!(output.archives.is_empty());
    assert!(output.filenames.is_empty());
    assert_eq!(std::fs::read_to_string(output.filenames_path).unwrap(), "");
}

#[test]
fn test_missing_source_is_reported() {
    let out = tempfile::tempdir().unwrap();
    let missing = out.path().join("does-not-exist");

    let err = archive_directory(&missing, &out.path().join("artifacts"), MB).unwrap_err();

    assert!(matches!(err, DeployError::SourceNotFound(p) if p == missing));
}

#[test]
fn test_dotfiles_and_nested_paths_use_forward_slashes() {
    let src = tempfile::tempdir().unwrap();
    write(src.path(), ".well-known/security.txt", b"contact");
    write(src.path(), "a/b/c/deep.txt", b"deep");

    let names: Vec<String> = list_files(src.path())
        .unwrap()
        .into_iter()
        .map(|e| e.relative_path)
        .collect();

    assert_eq!(names, vec![".well-known/security.txt", "a/b/c/deep.txt"]);
}

// ===========================================================================
// Fingerprinting
// ===========================================================================

#[test]
fn test_build_id_ignores_creation_order_and_content() {
    let a = tempfile::tempdir().unwrap();
    write(a.path(), "index.html", b"one");
    write(a.path(), "js/app.js", b"one");

    let b = tempfile::tempdir().unwrap();
    write(b.path(), "js/app.js", b"two, and longer");
    write(b.path(), "index.html", b"two");

    assert_eq!(
        build_id_for_dir(a.path(), &[]).unwrap(),
        build_id_for_dir(b.path(), &[]).unwrap()
    );
}

#[test]
fn test_build_id_tracks_file_set_outside_excluded_subtree() {
    let dir = tempfile::tempdir().unwrap();
    let excluded = vec!["_app/immutable".to_string()];
    write(dir.path(), "index.html", b"home");
    write(dir.path(), "_app/immutable/chunk-1a2b.js", b"x");
    let base = build_id_for_dir(dir.path(), &excluded).unwrap();

    std::fs::rename(
        dir.path().join("_app/immutable/chunk-1a2b.js"),
        dir.path().join("_app/immutable/chunk-9f8e.js"),
    )
    .unwrap();
    assert_eq!(build_id_for_dir(dir.path(), &excluded).unwrap(), base);

    write(dir.path(), "about.html", b"about");
    let added = build_id_for_dir(dir.path(), &excluded).unwrap();
    assert_ne!(added, base);

    std::fs::rename(dir.path().join("about.html"), dir.path().join("team.html")).unwrap();
    let renamed = build_id_for_dir(dir.path(), &excluded).unwrap();
    assert_ne!(renamed, added);
    assert_ne!(renamed, base);

    std::fs::remove_file(dir.path().join("team.html")).unwrap();
    assert_eq!(build_id_for_dir(dir.path(), &excluded).unwrap(), base);
}
