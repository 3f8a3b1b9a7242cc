//! Stub assets used in local development instead of a real build.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::archiver::{self, ArchiveOutput};
use crate::error::{DeployError, Result};

/// Holding page served while the real app runs through live reload.
pub const STUB_INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>Deploying</title>
  </head>
  <body>
    <p>This site is running in development mode. Deploy it to see the real content.</p>
  </body>
</html>
"#;

/// Where the placeholder assets come from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PlaceholderSource {
    /// A single `index.html` holding page.
    #[default]
    BuiltIn,
    /// A user-provided stub directory.
    Directory(PathBuf),
}

/// Write the placeholder as a single archive into `output_dir`.
pub fn write_placeholder(source: &PlaceholderSource, output_dir: &Path) -> Result<ArchiveOutput> {
    let output = match source {
        PlaceholderSource::BuiltIn => {
            let stub = tempfile::tempdir()?;
            std::fs::write(stub.path().join("index.html"), STUB_INDEX_HTML)?;
            archiver::archive_directory(stub.path(), output_dir, u64::MAX)?
        }
        PlaceholderSource::Directory(dir) => {
            if !dir.is_dir() {
                return Err(DeployError::SourceNotFound(dir.clone()));
            }
            archiver::archive_directory(dir, output_dir, u64::MAX)?
        }
    };
    info!(files = output.filenames.len(), "wrote placeholder archive");
    Ok(output)
}
