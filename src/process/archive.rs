//! Zip and gzipped tar extraction.

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fs::File;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use zip::ZipArchive;

use crate::error::StepFailure;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
}

impl ArchiveFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        if name.ends_with(".zip") {
            Some(Self::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else {
            None
        }
    }
}

/// Unpack `archive` into `dest`.
///
/// Returns the single top-level entry when the archive has exactly one,
/// otherwise `dest` itself.
pub fn extract(archive: &Path, dest: &Path) -> Result<PathBuf, StepFailure> {
    let format = ArchiveFormat::from_path(archive).ok_or_else(|| StepFailure::Archive {
        path: archive.to_path_buf(),
        message: "unsupported archive format".to_string(),
    })?;

    std::fs::create_dir_all(dest).map_err(|e| StepFailure::io(dest, e))?;

    let roots = match format {
        ArchiveFormat::Zip => extract_zip(archive, dest)?,
        ArchiveFormat::TarGz => extract_tar_gz(archive, dest)?,
    };

    tracing::debug!(
        "Extracted {} into {} ({} top-level entries)",
        archive.display(),
        dest.display(),
        roots.len()
    );

    if roots.len() == 1 {
        if let Some(root) = roots.into_iter().next() {
            return Ok(dest.join(root));
        }
    }
    Ok(dest.to_path_buf())
}

fn archive_error(archive: &Path, e: impl std::fmt::Display) -> StepFailure {
    StepFailure::Archive {
        path: archive.to_path_buf(),
        message: e.to_string(),
    }
}

fn top_level(path: &Path) -> Option<OsString> {
    path.components().find_map(|c| match c {
        Component::Normal(name) => Some(name.to_os_string()),
        _ => None,
    })
}

fn extract_zip(archive: &Path, dest: &Path) -> Result<BTreeSet<OsString>, StepFailure> {
    let file = File::open(archive).map_err(|e| StepFailure::io(archive, e))?;
    let mut zip = ZipArchive::new(file).map_err(|e| archive_error(archive, e))?;
    let mut roots = BTreeSet::new();

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(|e| archive_error(archive, e))?;
        let relative = match entry.enclosed_name() {
            Some(path) => path,
            None => continue,
        };
        if let Some(root) = top_level(&relative) {
            roots.insert(root);
        }

        let outpath = dest.join(&relative);
        if entry.is_dir() {
            std::fs::create_dir_all(&outpath).map_err(|e| StepFailure::io(&outpath, e))?;
            continue;
        }

        if let Some(parent) = outpath.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StepFailure::io(parent, e))?;
        }
        let mut outfile = File::create(&outpath).map_err(|e| StepFailure::io(&outpath, e))?;
        std::io::copy(&mut entry, &mut outfile).map_err(|e| StepFailure::io(&outpath, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode))
                    .map_err(|e| StepFailure::io(&outpath, e))?;
            }
        }
    }

    Ok(roots)
}

fn extract_tar_gz(archive: &Path, dest: &Path) -> Result<BTreeSet<OsString>, StepFailure> {
    let file = File::open(archive).map_err(|e| StepFailure::io(archive, e))?;
    let mut tar = Archive::new(GzDecoder::new(file));
    let mut roots = BTreeSet::new();

    let entries = tar.entries().map_err(|e| archive_error(archive, e))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| archive_error(archive, e))?;
        let relative = entry
            .path()
            .map_err(|e| archive_error(archive, e))?
            .into_owned();

        // unpack_in refuses entries escaping dest
        let unpacked = entry
            .unpack_in(dest)
            .map_err(|e| archive_error(archive, e))?;
        if unpacked {
            if let Some(root) = top_level(&relative) {
                roots.insert(root);
            }
        }
    }

    Ok(roots)
}
