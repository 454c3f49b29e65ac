//! Guarded unpacking of source archives.
//!
//! arXiv e-prints arrive as gzip-compressed tarballs, plain tarballs, or (for
//! single-file submissions) a bare gzip-compressed `.tex` file. The archive
//! is read twice:
//!
//! 1. Sum every member's declared size and refuse the whole archive when the
//!    total exceeds the cap, before anything touches the disk.
//! 2. Unpack regular files only. Each member path is normalized lexically;
//!    absolute paths and paths that climb above the root via `..` are
//!    skipped, so nothing is ever written outside `dest`.
//!
//! Symlinks, hard links and device nodes are never materialized.

use crate::error::FulltextError;
use flate2::read::GzDecoder;
use std::fs;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};
use tar::Archive;
use tracing::{debug, info, warn};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// File name used when the archive is a single compressed document.
pub const SINGLE_FILE_NAME: &str = "main.tex";

/// What [`extract_archive`] wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub files_written: usize,
    pub entries_skipped: usize,
    pub bytes: u64,
}

/// Unpack `archive` into `dest`, refusing archives larger than `max_bytes`
/// once decompressed.
pub fn extract_archive(
    archive: &Path,
    dest: &Path,
    max_bytes: u64,
) -> Result<ExtractSummary, FulltextError> {
    let invalid = |detail: String| FulltextError::InvalidArchive {
        path: archive.to_path_buf(),
        detail,
    };

    match unpacked_size(archive) {
        Ok(0) => {
            debug!("{} has no tar members", archive.display());
            extract_single_document(archive, dest, max_bytes)
                .map_err(|e| e.unwrap_or_else(|| invalid("archive is empty".into())))
        }
        Ok(total) if total > max_bytes => {
            warn!(
                "Refusing {}: unpacks to {total} bytes (limit {max_bytes})",
                archive.display()
            );
            Err(FulltextError::ArchiveTooLarge {
                path: archive.to_path_buf(),
                total_bytes: total,
                limit_bytes: max_bytes,
            })
        }
        Ok(_) => unpack_safe_members(archive, dest),
        Err(tar_err) => {
            debug!("{} is not a tar archive: {tar_err}", archive.display());
            extract_single_document(archive, dest, max_bytes)
                .map_err(|e| e.unwrap_or_else(|| invalid(tar_err.to_string())))
        }
    }
}

/// Open the archive, transparently decompressing gzip.
fn open_reader(path: &Path) -> Result<Box<dyn Read>, FulltextError> {
    let mut file = fs::File::open(path).map_err(|e| FulltextError::io(path, e))?;
    let mut magic = Vec::with_capacity(2);
    (&mut file)
        .take(2)
        .read_to_end(&mut magic)
        .map_err(|e| FulltextError::io(path, e))?;
    file.seek(SeekFrom::Start(0))
        .map_err(|e| FulltextError::io(path, e))?;
    let reader = BufReader::new(file);
    if magic == GZIP_MAGIC {
        Ok(Box::new(GzDecoder::new(reader)))
    } else {
        Ok(Box::new(reader))
    }
}

fn unpacked_size(path: &Path) -> Result<u64, FulltextError> {
    let mut archive = Archive::new(open_reader(path)?);
    let mut total = 0u64;
    let entries = archive.entries().map_err(|e| FulltextError::io(path, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| FulltextError::io(path, e))?;
        total = total.saturating_add(entry.size());
    }
    Ok(total)
}

fn unpack_safe_members(archive_path: &Path, dest: &Path) -> Result<ExtractSummary, FulltextError> {
    fs::create_dir_all(dest).map_err(|e| FulltextError::io(dest, e))?;

    let mut archive = Archive::new(open_reader(archive_path)?);
    let corrupt = |e: std::io::Error| FulltextError::InvalidArchive {
        path: archive_path.to_path_buf(),
        detail: e.to_string(),
    };

    let mut summary = ExtractSummary::default();
    for entry in archive.entries().map_err(corrupt)? {
        let mut entry = entry.map_err(corrupt)?;
        if !entry.header().entry_type().is_file() {
            summary.entries_skipped += 1;
            continue;
        }
        let member = entry.path().map_err(corrupt)?.into_owned();
        let Some(relative) = contained_path(&member) else {
            warn!(
                "Skipping unsafe member '{}' in {}",
                member.display(),
                archive_path.display()
            );
            summary.entries_skipped += 1;
            continue;
        };

        let target = dest.join(&relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| FulltextError::io(parent, e))?;
        }
        entry.unpack(&target).map_err(corrupt)?;
        summary.files_written += 1;
        summary.bytes += entry.size();
    }

    info!(
        "Unpacked {} files ({} bytes) from {}",
        summary.files_written,
        summary.bytes,
        archive_path.display()
    );
    Ok(summary)
}

/// Normalize a member path relative to the extraction root.
///
/// Returns `None` for absolute paths, Windows prefixes, paths that climb
/// above the root, and paths that normalize to nothing.
pub fn contained_path(member: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in member.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if out.as_os_str().is_empty() {
        None
    } else {
        Some(out)
    }
}

/// Write a non-tar stream that looks like a LaTeX document as `main.tex`.
///
/// `Err(None)` means the stream is readable but is not a document, so the
/// caller reports its own, more specific error.
fn extract_single_document(
    archive: &Path,
    dest: &Path,
    max_bytes: u64,
) -> Result<ExtractSummary, Option<FulltextError>> {
    let reader = open_reader(archive).map_err(Some)?;
    let mut content = Vec::new();
    reader
        .take(max_bytes.saturating_add(1))
        .read_to_end(&mut content)
        .map_err(|e| {
            Some(FulltextError::InvalidArchive {
                path: archive.to_path_buf(),
                detail: e.to_string(),
            })
        })?;

    if content.len() as u64 > max_bytes {
        return Err(Some(FulltextError::ArchiveTooLarge {
            path: archive.to_path_buf(),
            total_bytes: content.len() as u64,
            limit_bytes: max_bytes,
        }));
    }
    if !looks_like_latex(&content) {
        return Err(None);
    }

    fs::create_dir_all(dest).map_err(|e| Some(FulltextError::io(dest, e)))?;
    let target = dest.join(SINGLE_FILE_NAME);
    fs::write(&target, &content).map_err(|e| Some(FulltextError::io(&target, e)))?;
    info!(
        "{} is a single document; wrote {}",
        archive.display(),
        target.display()
    );
    Ok(ExtractSummary {
        files_written: 1,
        entries_skipped: 0,
        bytes: content.len() as u64,
    })
}

fn looks_like_latex(content: &[u8]) -> bool {
    let text = String::from_utf8_lossy(content);
    ["\\documentclass", "\\begin{document}", "\\section"]
        .iter()
        .any(|marker| text.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::TempDir;

    /// Append a regular file whose header name is written verbatim, so
    /// traversal names that `tar::Builder` would refuse can be produced.
    fn append_raw(builder: &mut tar::Builder<Vec<u8>>, name: &str, body: &[u8]) {
        let mut header = tar::Header::new_gnu();
        let raw = &mut header.as_gnu_mut().unwrap().name;
        raw[..name.len()].copy_from_slice(name.as_bytes());
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_cksum();
        builder.append(&header, body).unwrap();
    }

    fn gz(bytes: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(bytes).unwrap();
        enc.finish().unwrap()
    }

    fn tarball(members: &[(&str, &str)]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, body) in members {
            append_raw(&mut builder, name, body.as_bytes());
        }
        builder.into_inner().unwrap()
    }

    #[test]
    fn contained_path_rules() {
        assert_eq!(contained_path(Path::new("a/b.tex")), Some(PathBuf::from("a/b.tex")));
        assert_eq!(contained_path(Path::new("./a/../b.tex")), Some(PathBuf::from("b.tex")));
        assert_eq!(contained_path(Path::new("../../evil.tex")), None);
        assert_eq!(contained_path(Path::new("a/../../evil.tex")), None);
        assert_eq!(contained_path(Path::new("/etc/passwd")), None);
        assert_eq!(contained_path(Path::new(".")), None);
    }

    #[test]
    fn traversal_member_is_skipped_and_rest_extracted() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("paper.tar");
        let bytes = gz(&tarball(&[
            ("../../evil.tex", "pwned"),
            ("main.tex", "\\begin{document}hi\\end{document}"),
            ("sec/intro.tex", "intro"),
        ]));
        fs::write(&archive, bytes).unwrap();

        let dest = tmp.path().join("out").join("paper");
        let summary = extract_archive(&archive, &dest, 1 << 20).unwrap();

        assert_eq!(summary.files_written, 2);
        assert_eq!(summary.entries_skipped, 1);
        assert!(dest.join("main.tex").exists());
        assert!(dest.join("sec/intro.tex").exists());
        assert!(!tmp.path().join("evil.tex").exists());
        assert!(!tmp.path().join("out").join("evil.tex").exists());
    }

    #[test]
    fn plain_tar_is_accepted() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("paper.tar");
        fs::write(&archive, tarball(&[("main.tex", "x")])).unwrap();
        let dest = tmp.path().join("out");
        assert_eq!(extract_archive(&archive, &dest, 1024).unwrap().files_written, 1);
    }

    #[test]
    fn oversized_archive_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("bomb.tar");
        let big = "a".repeat(4096);
        fs::write(&archive, gz(&tarball(&[("main.tex", &big)]))).unwrap();

        let dest = tmp.path().join("out");
        let err = extract_archive(&archive, &dest, 1024).unwrap_err();
        assert!(matches!(err, FulltextError::ArchiveTooLarge { total_bytes: 4096, .. }));
        assert!(!dest.exists());
    }

    #[test]
    fn single_gzipped_document_becomes_main_tex() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("single.tar");
        let doc = "\\documentclass{article}\\begin{document}Body\\end{document}";
        fs::write(&archive, gz(doc.as_bytes())).unwrap();

        let dest = tmp.path().join("out");
        let summary = extract_archive(&archive, &dest, 1 << 20).unwrap();
        assert_eq!(summary.files_written, 1);
        assert_eq!(fs::read_to_string(dest.join(SINGLE_FILE_NAME)).unwrap(), doc);
    }

    #[test]
    fn garbage_is_invalid() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("junk.tar");
        fs::write(&archive, b"<html>not found</html>").unwrap();
        let err = extract_archive(&archive, &tmp.path().join("out"), 1024).unwrap_err();
        assert!(matches!(err, FulltextError::InvalidArchive { .. }));
    }

    #[test]
    fn truncated_gzip_is_invalid() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("cut.tar");
        let full = gz(&tarball(&[("main.tex", &"x".repeat(2000))]));
        fs::write(&archive, &full[..full.len() / 2]).unwrap();
        let err = extract_archive(&archive, &tmp.path().join("out"), 1 << 20).unwrap_err();
        assert!(matches!(
            err,
            FulltextError::InvalidArchive { .. } | FulltextError::Io { .. }
        ));
    }
}
