//! Local document-set preparation
//!
//! Ensures that each referenced corpus file is present locally with the
//! declared size before any client starts: reuse the uncompressed file if
//! it already matches, otherwise decompress a matching archive, otherwise
//! download (preferring the compressed variant), then loop until the
//! uncompressed file checks out and its offset table exists.

use std::fs::File;
use std::path::Path;

use tracing::info;

use crate::corpus::offsets;
use crate::error::{BenchError, BenchResult};
use crate::util;
use crate::workload::Documents;

/// Downloads corpus files over HTTP(S).
pub struct Downloader {
    offline: bool,
    test_mode: bool,
}

impl Downloader {
    pub fn new(offline: bool, test_mode: bool) -> Self {
        Self {
            offline,
            test_mode,
        }
    }

    /// Download a corpus file to `target_path` and verify its size.
    ///
    /// The URL is the document set's `source-url` when given, otherwise
    /// `base-url/<file-name>`.
    pub fn download(
        &self,
        base_url: Option<&str>,
        source_url: Option<&str>,
        target_path: &Path,
        expected_size: Option<u64>,
    ) -> BenchResult<()> {
        let file_name = target_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| BenchError::Data(format!("invalid download target [{}]", target_path.display())))?;

        let data_url = match (source_url, base_url) {
            (Some(url), _) => url.to_string(),
            (None, Some(base)) => {
                let separator = if base.ends_with('/') {
                    ""
                } else {
                    "/"
                };
                format!("{base}{separator}{file_name}")
            }
            (None, None) => {
                return Err(BenchError::Data(
                    "Cannot download data because no base URL is provided.".to_string(),
                ))
            }
        };
        if self.offline {
            return Err(BenchError::SystemSetup(format!(
                "Cannot find [{}]. Please disable offline mode and retry.",
                target_path.display()
            )));
        }

        util::io::ensure_parent_dir(target_path)?;
        info!(url = %data_url, target = %target_path.display(), "downloading corpus data");

        let response = reqwest::blocking::get(&data_url)
            .map_err(|e| BenchError::Data(format!("Could not download [{data_url}] to [{}]: {e}", target_path.display())))?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND && self.test_mode {
            return Err(BenchError::Data(
                "This workload does not support test mode. Ask the workload author to add it or \
                 disable test mode and retry."
                    .to_string(),
            ));
        }
        if !status.is_success() {
            return Err(BenchError::Data(format!(
                "Could not download [{data_url}] to [{}] (HTTP status: {status})",
                target_path.display()
            )));
        }

        let mut out = File::create(target_path)
            .map_err(|e| BenchError::Data(format!("cannot create [{}]: {e}", target_path.display())))?;
        let mut response = response;
        std::io::copy(&mut response, &mut out)
            .map_err(|e| BenchError::Data(format!("Could not download [{data_url}] to [{}]: {e}", target_path.display())))?;

        let actual_size = util::io::file_size(target_path).ok_or_else(|| {
            BenchError::SystemSetup(format!(
                "Could not download [{data_url}] to [{}]. Verify data are available at [{data_url}] \
                 and check your Internet connection.",
                target_path.display()
            ))
        })?;
        if let Some(expected) = expected_size {
            if actual_size != expected {
                return Err(BenchError::Data(format!(
                    "[{}] is corrupt. Downloaded [{actual_size}] bytes but [{expected}] bytes are expected.",
                    target_path.display()
                )));
            }
        }
        Ok(())
    }
}

/// Decompresses corpus archives in place.
pub struct Decompressor;

impl Decompressor {
    pub fn decompress(
        &self,
        archive_path: &Path,
        documents_path: &Path,
        uncompressed_size: Option<u64>,
    ) -> BenchResult<()> {
        info!(archive = %archive_path.display(), target = %documents_path.display(), "decompressing corpus data");
        util::io::decompress(archive_path)?;
        if !documents_path.is_file() {
            return Err(BenchError::Data(format!(
                "Decompressing [{}] did not create [{}]. Please check with the workload author if the \
                 compressed archive has been created correctly.",
                archive_path.display(),
                documents_path.display()
            )));
        }
        let extracted_bytes = util::io::file_size(documents_path).unwrap_or(0);
        if let Some(expected) = uncompressed_size {
            if extracted_bytes != expected {
                return Err(BenchError::Data(format!(
                    "[{}] is corrupt. Extracted [{extracted_bytes}] bytes but [{expected}] bytes are expected.",
                    documents_path.display()
                )));
            }
        }
        Ok(())
    }
}

/// Drives the prepare loop for a single document set.
pub struct DocumentSetPreparator {
    workload_name: String,
    downloader: Downloader,
    decompressor: Decompressor,
}

impl DocumentSetPreparator {
    pub fn new(workload_name: impl Into<String>, downloader: Downloader, decompressor: Decompressor) -> Self {
        Self {
            workload_name: workload_name.into(),
            downloader,
            decompressor,
        }
    }

    fn has_expected_size(path: &Path, expected: Option<u64>) -> bool {
        match expected {
            None => true,
            Some(expected) => util::io::file_size(path) == Some(expected),
        }
    }

    fn create_file_offset_table(&self, doc_path: &Path, document_set: &Documents) -> BenchResult<()> {
        offsets::prepare_file_offset_table(doc_path, Some(document_set.number_of_lines()), &self.workload_name)?;
        Ok(())
    }

    /// Prepare a document set below `data_root`.
    ///
    /// Postcondition on success: the uncompressed file exists with the
    /// declared size and its offset table is consistent with the declared
    /// line count.
    pub fn prepare_document_set(&self, document_set: &Documents, data_root: &Path) -> BenchResult<()> {
        let file_name = document_set
            .document_file
            .as_deref()
            .ok_or_else(|| {
                BenchError::assertion(format!(
                    "Workload {} specifies documents but no corpus",
                    self.workload_name
                ))
            })?;
        let doc_path = data_root.join(file_name);
        let archive_path = document_set.document_archive.as_deref().map(|a| data_root.join(a));

        loop {
            if doc_path.is_file() && Self::has_expected_size(&doc_path, document_set.uncompressed_size_in_bytes) {
                break;
            }
            let usable_archive = archive_path
                .as_deref()
                .filter(|p| p.is_file() && Self::has_expected_size(p, document_set.compressed_size_in_bytes));
            if let Some(archive) = usable_archive {
                self.decompressor
                    .decompress(archive, &doc_path, document_set.uncompressed_size_in_bytes)?;
                continue;
            }

            // prefer the compressed variant when both are declared
            let (target_path, expected_size) = if let Some(archive) = archive_path.as_deref() {
                (archive, document_set.compressed_size_in_bytes)
            } else {
                (doc_path.as_path(), document_set.uncompressed_size_in_bytes)
            };

            let result = self.downloader.download(
                document_set.base_url.as_deref(),
                document_set.source_url.as_deref(),
                target_path,
                expected_size,
            );
            if let Err(BenchError::Data(msg)) = &result {
                if msg.starts_with("Cannot download data because no base URL is provided")
                    && target_path.is_file()
                {
                    return Err(BenchError::Data(format!(
                        "[{}] is present but does not have the expected size of [{:?}] bytes and it \
                         cannot be downloaded because no base URL is provided.",
                        target_path.display(),
                        expected_size
                    )));
                }
            }
            result?;
        }

        self.create_file_offset_table(&doc_path, document_set)
    }

    /// Prepare a document set that comes bundled with the workload, i.e.
    /// its files sit next to the workload file. Returns `false` when no
    /// bundled file exists so the caller can fall back to the corpus cache
    /// directory; a bundled file with the wrong size is an error.
    pub fn prepare_bundled_document_set(
        &self,
        document_set: &Documents,
        data_root: &Path,
    ) -> BenchResult<bool> {
        let file_name = match document_set.document_file.as_deref() {
            Some(name) => name,
            None => return Ok(false),
        };
        let doc_path = data_root.join(file_name);
        let archive_path = document_set.document_archive.as_deref().map(|a| data_root.join(a));

        loop {
            if doc_path.is_file() {
                if Self::has_expected_size(&doc_path, document_set.uncompressed_size_in_bytes) {
                    self.create_file_offset_table(&doc_path, document_set)?;
                    return Ok(true);
                }
                return Err(BenchError::Data(format!(
                    "[{}] is present but does not have the expected size of [{:?}] bytes.",
                    doc_path.display(),
                    document_set.uncompressed_size_in_bytes
                )));
            }

            match archive_path.as_deref().filter(|p| p.is_file()) {
                Some(archive) => {
                    if Self::has_expected_size(archive, document_set.compressed_size_in_bytes) {
                        self.decompressor
                            .decompress(archive, &doc_path, document_set.uncompressed_size_in_bytes)?;
                    } else {
                        // a present-but-mis-sized archive hints at a corpus
                        // that is still being authored
                        return Err(BenchError::Data(format!(
                            "[{}] is present but does not have the expected size of [{:?}] bytes.",
                            archive.display(),
                            document_set.compressed_size_in_bytes
                        )));
                    }
                }
                None => return Ok(false),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::offsets::OffsetTable;
    use crate::workload::test_support;
    use std::io::Write;

    fn preparator(offline: bool) -> DocumentSetPreparator {
        DocumentSetPreparator::new("unittest", Downloader::new(offline, false), Decompressor)
    }

    fn docs_with_sizes(file: &str, uncompressed: Option<u64>, num_docs: u64) -> Documents {
        let mut docs = test_support::documents(num_docs, Some("idx"));
        docs.document_file = Some(file.to_string());
        docs.uncompressed_size_in_bytes = uncompressed;
        docs
    }

    #[test]
    fn test_present_file_with_expected_size_needs_no_download() {
        let dir = tempfile::tempdir().unwrap();
        let payload = b"{\"a\":1}\n{\"a\":2}\n";
        std::fs::write(dir.path().join("docs.json"), payload).unwrap();

        let docs = docs_with_sizes("docs.json", Some(payload.len() as u64), 2);
        // offline: any download attempt would fail loudly
        preparator(true).prepare_document_set(&docs, dir.path()).unwrap();
        assert!(OffsetTable::table_path(&dir.path().join("docs.json")).is_file());
    }

    #[test]
    fn test_archive_is_decompressed_and_verified() {
        let dir = tempfile::tempdir().unwrap();
        let payload = b"{\"a\":1}\n{\"a\":2}\n{\"a\":3}\n";
        let archive_path = dir.path().join("docs.json.gz");
        let mut encoder = flate2::write::GzEncoder::new(
            File::create(&archive_path).unwrap(),
            flate2::Compression::default(),
        );
        encoder.write_all(payload).unwrap();
        encoder.finish().unwrap();
        let archive_size = util::io::file_size(&archive_path).unwrap();

        let mut docs = docs_with_sizes("docs.json", Some(payload.len() as u64), 3);
        docs.document_archive = Some("docs.json.gz".to_string());
        docs.compressed_size_in_bytes = Some(archive_size);

        preparator(true).prepare_document_set(&docs, dir.path()).unwrap();
        assert_eq!(
            util::io::file_size(&dir.path().join("docs.json")),
            Some(payload.len() as u64)
        );
    }

    #[test]
    fn test_decompressed_size_mismatch_is_a_data_error() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("docs.json.gz");
        let mut encoder = flate2::write::GzEncoder::new(
            File::create(&archive_path).unwrap(),
            flate2::Compression::default(),
        );
        encoder.write_all(b"{\"a\":1}\n").unwrap();
        encoder.finish().unwrap();

        let mut docs = docs_with_sizes("docs.json", Some(9999), 1);
        docs.document_archive = Some("docs.json.gz".to_string());
        docs.compressed_size_in_bytes = util::io::file_size(&archive_path);

        let err = preparator(true).prepare_document_set(&docs, dir.path()).unwrap_err();
        assert!(matches!(err, BenchError::Data(_)), "{err}");
        assert!(err.to_string().contains("corrupt"), "{err}");
    }

    #[test]
    fn test_offline_with_missing_file_is_a_setup_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut docs = docs_with_sizes("docs.json", Some(10), 1);
        docs.base_url = Some("http://benchmark.example.org/corpora".to_string());

        let err = preparator(true).prepare_document_set(&docs, dir.path()).unwrap_err();
        assert!(matches!(err, BenchError::SystemSetup(_)), "{err}");
    }

    #[test]
    fn test_bundled_set_missing_returns_false() {
        let dir = tempfile::tempdir().unwrap();
        let docs = docs_with_sizes("docs.json", Some(10), 1);
        assert!(!preparator(true).prepare_bundled_document_set(&docs, dir.path()).unwrap());
    }

    #[test]
    fn test_bundled_set_with_wrong_size_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("docs.json"), b"{\"a\":1}\n").unwrap();
        let docs = docs_with_sizes("docs.json", Some(12345), 1);

        let err = preparator(true)
            .prepare_bundled_document_set(&docs, dir.path())
            .unwrap_err();
        assert!(err.to_string().contains("does not have the expected size"), "{err}");
    }
}
