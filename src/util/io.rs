//! File and archive helpers
//!
//! Corpus files are referenced by name in the workload; the compressed
//! variant is an archive whose single entry equals the uncompressed file.
//! These helpers mirror that contract: extension splitting that keeps the
//! inner extension intact, archive detection, and decompression for the
//! accepted archive formats (bz2, gz, zip, tar.*).

use std::fs;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;

use crate::error::{BenchError, BenchResult};

const ARCHIVE_EXTENSIONS: &[&str] = &["zip", "bz2", "gz", "tar", "tgz"];

/// True if the file name refers to a supported archive format.
pub fn is_archive(file_name: &str) -> bool {
    match split_extension(file_name) {
        (_, Some(ext)) => ARCHIVE_EXTENSIONS.contains(&ext.as_str()),
        _ => false,
    }
}

/// Split `name` into `(stem, extension)` where the extension is the part
/// after the last dot, without the dot. `documents.json.bz2` splits into
/// `("documents.json", Some("bz2"))`.
pub fn split_extension(name: &str) -> (String, Option<String>) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => (name[..idx].to_string(), Some(name[idx + 1..].to_string())),
        _ => (name.to_string(), None),
    }
}

/// Name of the uncompressed file inside an archive (the archive name with
/// its outermost extension stripped).
pub fn strip_archive_extension(file_name: &str) -> String {
    split_extension(file_name).0
}

/// Ensure that the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> BenchResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| BenchError::Data(format!("cannot create directory [{}]: {e}", parent.display())))?;
    }
    Ok(())
}

/// Size of a local file in bytes, or `None` if it does not exist.
pub fn file_size(path: &Path) -> Option<u64> {
    fs::metadata(path).ok().map(|m| m.len())
}

/// Decompress `archive_path` into its containing directory.
///
/// Plain `gz`/`bz2` archives are streamed into the file name with the outer
/// extension stripped; `zip` and `tar.*` archives are unpacked in place.
pub fn decompress(archive_path: &Path) -> BenchResult<()> {
    let file_name = archive_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| BenchError::Data(format!("invalid archive path [{}]", archive_path.display())))?;
    let target_dir = archive_path
        .parent()
        .ok_or_else(|| BenchError::Data(format!("archive [{}] has no parent directory", archive_path.display())))?;

    let archive = File::open(archive_path)
        .map_err(|e| BenchError::Data(format!("cannot open archive [{}]: {e}", archive_path.display())))?;
    let reader = BufReader::new(archive);

    let (stem, ext) = split_extension(file_name);
    match ext.as_deref() {
        Some("bz2") if stem.ends_with(".tar") => unpack_tar(bzip2::bufread::BzDecoder::new(reader), target_dir),
        Some("gz") if stem.ends_with(".tar") => unpack_tar(flate2::bufread::GzDecoder::new(reader), target_dir),
        Some("tgz") => unpack_tar(flate2::bufread::GzDecoder::new(reader), target_dir),
        Some("tar") => unpack_tar(reader, target_dir),
        Some("bz2") => unpack_single(bzip2::bufread::BzDecoder::new(reader), &target_dir.join(stem)),
        Some("gz") => unpack_single(flate2::bufread::GzDecoder::new(reader), &target_dir.join(stem)),
        Some("zip") => unpack_zip(archive_path, target_dir),
        _ => Err(BenchError::Data(format!(
            "unsupported archive format for [{}]",
            archive_path.display()
        ))),
    }
}

fn unpack_single<R: std::io::Read>(mut decoder: R, target: &Path) -> BenchResult<()> {
    let mut out = File::create(target)
        .map_err(|e| BenchError::Data(format!("cannot create [{}]: {e}", target.display())))?;
    std::io::copy(&mut decoder, &mut out)
        .map_err(|e| BenchError::Data(format!("cannot decompress into [{}]: {e}", target.display())))?;
    out.flush()
        .map_err(|e| BenchError::Data(format!("cannot flush [{}]: {e}", target.display())))?;
    Ok(())
}

fn unpack_tar<R: std::io::Read>(decoder: R, target_dir: &Path) -> BenchResult<()> {
    tar::Archive::new(decoder)
        .unpack(target_dir)
        .map_err(|e| BenchError::Data(format!("cannot unpack tar archive into [{}]: {e}", target_dir.display())))
}

fn unpack_zip(archive_path: &Path, target_dir: &Path) -> BenchResult<()> {
    let archive = File::open(archive_path)
        .map_err(|e| BenchError::Data(format!("cannot open archive [{}]: {e}", archive_path.display())))?;
    let mut zip = zip::ZipArchive::new(archive)
        .map_err(|e| BenchError::Data(format!("cannot read zip archive [{}]: {e}", archive_path.display())))?;
    zip.extract(target_dir)
        .map_err(|e| BenchError::Data(format!("cannot unpack zip archive into [{}]: {e}", target_dir.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_split_extension() {
        assert_eq!(
            split_extension("documents.json.bz2"),
            ("documents.json".to_string(), Some("bz2".to_string()))
        );
        assert_eq!(split_extension("documents"), ("documents".to_string(), None));
        assert_eq!(
            split_extension("documents.json"),
            ("documents".to_string(), Some("json".to_string()))
        );
    }

    #[test]
    fn test_is_archive() {
        assert!(is_archive("documents.json.bz2"));
        assert!(is_archive("documents.json.gz"));
        assert!(is_archive("corpus.zip"));
        assert!(!is_archive("documents.json"));
    }

    #[test]
    fn test_decompress_gz_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("docs.json.gz");
        let payload = b"{\"a\": 1}\n{\"a\": 2}\n";

        let mut encoder =
            flate2::write::GzEncoder::new(File::create(&archive_path).unwrap(), flate2::Compression::default());
        encoder.write_all(payload).unwrap();
        encoder.finish().unwrap();

        decompress(&archive_path).unwrap();

        let mut decompressed = Vec::new();
        File::open(dir.path().join("docs.json"))
            .unwrap()
            .read_to_end(&mut decompressed)
            .unwrap();
        assert_eq!(decompressed, payload);
    }
}
