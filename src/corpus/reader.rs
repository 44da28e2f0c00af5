//! Bulk readers
//!
//! A reader wraps one [`Slice`] and yields batches of ready-to-send bulk
//! request bodies. Depending on the corpus it either injects a generated
//! action and meta-data line before every document or passes the source
//! file through verbatim (when the file already interleaves meta-data
//! lines). Batches group `batch_size / bulk_size` bulks read in one go.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Exp};
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::corpus::Slice;
use crate::error::{BenchError, BenchResult};

/// Which id conflicts to simulate during indexing.
///
/// Conflicting ids assume that each document in the corpus partition gets
/// an id from a contiguous, zero-padded range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdConflictKind {
    NoConflicts,
    /// A conflicting id is drawn sequentially from the already-emitted range.
    Sequential,
    /// A conflicting id is drawn at random from the already-emitted range.
    Random,
}

impl IdConflictKind {
    pub fn parse(value: Option<&str>) -> BenchResult<Self> {
        match value {
            None => Ok(Self::NoConflicts),
            Some("sequential") => Ok(Self::Sequential),
            Some("random") => Ok(Self::Random),
            Some(other) => Err(BenchError::WorkloadSyntax(format!(
                "Unknown 'conflicts' setting [{other}]"
            ))),
        }
    }
}

/// Action taken when an id conflict fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnConflict {
    Index,
    Update,
}

impl OnConflict {
    pub fn parse(value: Option<&str>) -> BenchResult<Self> {
        match value {
            None | Some("index") => Ok(Self::Index),
            Some("update") => Ok(Self::Update),
            Some(other) => Err(BenchError::WorkloadSyntax(format!(
                "Unknown 'on-conflict' setting [{other}]"
            ))),
        }
    }
}

/// The bulk action carried by a generated meta-data line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Index,
    Create,
    Update,
}

/// Ids for one client partition: zero-padded decimals starting at the
/// partition's document offset so clients never conflict with each other.
pub fn build_conflicting_ids(
    conflicts: IdConflictKind,
    docs_to_index: u64,
    offset: u64,
    rng: &mut Xoshiro256PlusPlus,
) -> Option<Vec<String>> {
    if conflicts == IdConflictKind::NoConflicts {
        return None;
    }
    let mut ids: Vec<String> = (0..docs_to_index)
        .map(|i| format!("{:010}", offset + i))
        .collect();
    if conflicts == IdConflictKind::Random {
        ids.shuffle(rng);
    }
    Some(ids)
}

/// Generates the action and meta-data line preceding each document.
///
/// Without conflicting ids the generator is constant: every document gets
/// the same `index` (or `create`, for data streams) line. With conflicts it
/// keeps the high-water mark of emitted ids and reuses an earlier id with
/// the configured probability, optionally biased towards recent ids.
#[derive(Debug)]
pub struct GenerateActionMetaData {
    meta_index_no_id: String,
    meta_create_no_id: String,
    index_name: Option<String>,
    type_name: Option<String>,
    conflicting_ids: Option<Vec<String>>,
    conflict_probability: f64,
    on_conflict: OnConflict,
    recency: f64,
    use_create: bool,
    rng: Xoshiro256PlusPlus,
    id_up_to: usize,
}

impl GenerateActionMetaData {
    const RECENCY_SLOPE: f64 = 30.0;

    #[allow(clippy::too_many_arguments)]
    pub fn new(
        index_name: Option<&str>,
        type_name: Option<&str>,
        conflicting_ids: Option<Vec<String>>,
        conflict_probability: f64,
        on_conflict: OnConflict,
        recency: f64,
        use_create: bool,
        seed: u64,
    ) -> BenchResult<Self> {
        if use_create && conflicting_ids.is_some() {
            return Err(BenchError::WorkloadSyntax(
                "Index mode 'create' cannot be used with conflicting ids".to_string(),
            ));
        }
        let meta_index_no_id = match (index_name, type_name) {
            (Some(index), Some(doc_type)) => {
                format!("{{\"index\": {{\"_index\": \"{index}\", \"_type\": \"{doc_type}\"}}}}\n")
            }
            (Some(index), None) => format!("{{\"index\": {{\"_index\": \"{index}\"}}}}\n"),
            _ => "{\"index\": {}}\n".to_string(),
        };
        let meta_create_no_id = match index_name {
            Some(index) => format!("{{\"create\": {{\"_index\": \"{index}\"}}}}\n"),
            None => "{\"create\": {}}\n".to_string(),
        };
        Ok(Self {
            meta_index_no_id,
            meta_create_no_id,
            index_name: index_name.map(str::to_string),
            type_name: type_name.map(str::to_string),
            conflicting_ids,
            // the workload denotes the probability in percent
            conflict_probability: conflict_probability / 100.0,
            on_conflict,
            recency,
            use_create,
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
            id_up_to: 0,
        })
    }

    /// True iff every emitted line is identical.
    pub fn is_constant(&self) -> bool {
        self.conflicting_ids.is_none()
    }

    fn line_with_id(&self, action: &str, doc_id: &str) -> String {
        match (&self.index_name, &self.type_name) {
            (Some(index), Some(doc_type)) => format!(
                "{{\"{action}\": {{\"_index\": \"{index}\", \"_type\": \"{doc_type}\", \"_id\": \"{doc_id}\"}}}}\n"
            ),
            (Some(index), None) => {
                format!("{{\"{action}\": {{\"_index\": \"{index}\", \"_id\": \"{doc_id}\"}}}}\n")
            }
            _ => format!("{{\"{action}\": {{\"_id\": \"{doc_id}\"}}}}\n"),
        }
    }

    /// The next meta-data line, or `None` once the id range is exhausted.
    pub fn next_line(&mut self) -> BenchResult<Option<(ActionKind, String)>> {
        let Some(ids) = &self.conflicting_ids else {
            return if self.use_create {
                Ok(Some((ActionKind::Create, self.meta_create_no_id.clone())))
            } else {
                Ok(Some((ActionKind::Index, self.meta_index_no_id.clone())))
            };
        };

        let conflict =
            self.conflict_probability > 0.0 && self.rng.gen::<f64>() <= self.conflict_probability;
        if conflict {
            // the reuse pool is the set of already-emitted ids; before any
            // id has been emitted (possible with a conflict probability of
            // 100) the whole range is eligible
            let pool = if self.id_up_to > 0 {
                self.id_up_to
            } else {
                ids.len()
            };
            // recency zero draws uniformly over the pool; larger values
            // clip an exponential towards the most recent ids
            let idx = if self.recency == 0.0 {
                self.rng.gen_range(0..pool)
            } else {
                let exp = Exp::new(Self::RECENCY_SLOPE * self.recency)
                    .map_err(|e| BenchError::assertion(format!("invalid recency rate: {e}")))?;
                let idx_range: f64 = exp.sample(&mut self.rng).min(1.0);
                (((pool - 1) as f64) * (1.0 - idx_range)).round() as usize
            };
            let doc_id = ids[idx].clone();
            let (action_kind, action) = match self.on_conflict {
                OnConflict::Index => (ActionKind::Index, "index"),
                OnConflict::Update => (ActionKind::Update, "update"),
            };
            Ok(Some((action_kind, self.line_with_id(action, &doc_id))))
        } else {
            if self.id_up_to >= ids.len() {
                return Ok(None);
            }
            let doc_id = ids[self.id_up_to].clone();
            self.id_up_to += 1;
            Ok(Some((ActionKind::Index, self.line_with_id("index", &doc_id))))
        }
    }
}

/// One batch of assembled bulks: the target plus `(docs_in_bulk, body)`
/// pairs ready to hand to the bulk runner.
#[derive(Debug)]
pub struct Batch {
    pub index: Option<String>,
    pub doc_type: Option<String>,
    pub bulks: Vec<(u64, Vec<u8>)>,
}

enum ReaderMode {
    /// Inject a generated meta-data line before every document.
    Metadata {
        generator: GenerateActionMetaData,
        constant_line: Option<Vec<u8>>,
    },
    /// The source file already interleaves meta-data lines.
    SourceOnly,
}

/// Reads a slice in bulks and assembles request bodies.
pub struct DocsReader {
    slice: Slice,
    batch_size: u64,
    mode: ReaderMode,
    index: Option<String>,
    doc_type: Option<String>,
}

impl DocsReader {
    /// Reader for corpora without embedded meta-data lines. `slice` must
    /// serve `bulk_size` lines per iteration.
    pub fn with_metadata(
        slice: Slice,
        batch_size: u64,
        generator: GenerateActionMetaData,
        index: Option<String>,
        doc_type: Option<String>,
    ) -> Self {
        Self {
            slice,
            batch_size,
            mode: ReaderMode::Metadata {
                generator,
                constant_line: None,
            },
            index,
            doc_type,
        }
    }

    /// Reader for corpora whose files already carry meta-data lines.
    /// `slice` must serve `2 * bulk_size` lines per iteration.
    pub fn source_only(
        slice: Slice,
        batch_size: u64,
        index: Option<String>,
        doc_type: Option<String>,
    ) -> Self {
        Self {
            slice,
            batch_size,
            mode: ReaderMode::SourceOnly,
            index,
            doc_type,
        }
    }

    /// Read up to `batch_size` documents worth of bulks.
    pub fn next_batch(&mut self) -> BenchResult<Option<Batch>> {
        let mut bulks = Vec::new();
        let mut docs_in_batch = 0;
        while docs_in_batch < self.batch_size {
            match self.read_bulk()? {
                None => break,
                Some((0, _)) => break,
                Some((docs, body)) => {
                    docs_in_batch += docs;
                    bulks.push((docs, body));
                }
            }
        }
        if docs_in_batch == 0 {
            return Ok(None);
        }
        Ok(Some(Batch {
            index: self.index.clone(),
            doc_type: self.doc_type.clone(),
            bulks,
        }))
    }

    fn read_bulk(&mut self) -> BenchResult<Option<(u64, Vec<u8>)>> {
        let Some(lines) = self.slice.next_lines()? else {
            return Ok(None);
        };
        match &mut self.mode {
            ReaderMode::SourceOnly => {
                let docs = (lines.len() / 2) as u64;
                Ok(Some((docs, lines.concat())))
            }
            ReaderMode::Metadata {
                generator,
                constant_line,
            } => {
                if generator.is_constant() && constant_line.is_none() {
                    if let Some((_, line)) = generator.next_line()? {
                        *constant_line = Some(line.into_bytes());
                    }
                }
                let mut body = Vec::new();
                let mut docs = 0;
                for doc in &lines {
                    if let Some(line) = constant_line {
                        body.extend_from_slice(line);
                        body.extend_from_slice(doc);
                    } else {
                        let Some((action, line)) = generator.next_line()? else {
                            break;
                        };
                        body.extend_from_slice(line.as_bytes());
                        if action == ActionKind::Update {
                            // the document has to fit on one line next to
                            // the update wrapper
                            let trimmed: &[u8] = trim_ascii_end(doc);
                            body.extend_from_slice(b"{\"doc\":");
                            body.extend_from_slice(trimmed);
                            body.extend_from_slice(b"}\n");
                        } else {
                            body.extend_from_slice(doc);
                        }
                    }
                    docs += 1;
                }
                Ok(Some((docs, body)))
            }
        }
    }
}

fn trim_ascii_end(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && line[end - 1].is_ascii_whitespace() {
        end -= 1;
    }
    &line[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};

    fn corpus_file(dir: &Path, count: usize) -> PathBuf {
        let path = dir.join("docs.json");
        let mut content = String::new();
        for i in 0..count {
            content.push_str(&format!("{{\"id\": {i}}}\n"));
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    fn rng() -> Xoshiro256PlusPlus {
        Xoshiro256PlusPlus::seed_from_u64(42)
    }

    #[test]
    fn test_conflicting_ids_are_zero_padded_and_offset() {
        let ids = build_conflicting_ids(IdConflictKind::Sequential, 3, 5, &mut rng()).unwrap();
        assert_eq!(ids, vec!["0000000005", "0000000006", "0000000007"]);
        assert!(build_conflicting_ids(IdConflictKind::NoConflicts, 3, 0, &mut rng()).is_none());
    }

    #[test]
    fn test_random_conflicting_ids_are_a_permutation() {
        let ids = build_conflicting_ids(IdConflictKind::Random, 100, 0, &mut rng()).unwrap();
        let mut sorted = ids.clone();
        sorted.sort();
        let expected: Vec<String> = (0..100).map(|i| format!("{i:010}")).collect();
        assert_eq!(sorted, expected);
    }

    #[test]
    fn test_constant_generator_emits_index_line() {
        let mut generator = GenerateActionMetaData::new(
            Some("logs"),
            None,
            None,
            0.0,
            OnConflict::Index,
            0.0,
            false,
            1,
        )
        .unwrap();
        assert!(generator.is_constant());
        let (action, line) = generator.next_line().unwrap().unwrap();
        assert_eq!(action, ActionKind::Index);
        assert_eq!(line, "{\"index\": {\"_index\": \"logs\"}}\n");
    }

    #[test]
    fn test_data_stream_generator_emits_create_line() {
        let mut generator = GenerateActionMetaData::new(
            Some("logs-ds"),
            None,
            None,
            0.0,
            OnConflict::Index,
            0.0,
            true,
            1,
        )
        .unwrap();
        let (action, line) = generator.next_line().unwrap().unwrap();
        assert_eq!(action, ActionKind::Create);
        assert_eq!(line, "{\"create\": {\"_index\": \"logs-ds\"}}\n");
    }

    #[test]
    fn test_create_with_conflicts_is_rejected() {
        let err = GenerateActionMetaData::new(
            Some("logs-ds"),
            None,
            Some(vec!["0000000000".to_string()]),
            100.0,
            OnConflict::Index,
            0.0,
            true,
            1,
        )
        .unwrap_err();
        assert!(matches!(err, BenchError::WorkloadSyntax(_)), "{err}");
    }

    #[test]
    fn test_full_conflict_probability_updates_over_whole_id_range() {
        // conflict probability 100 with recency 0: every item reuses an id
        // drawn uniformly with replacement from the whole range and every
        // action line is an update
        let ids = build_conflicting_ids(IdConflictKind::Random, 100, 0, &mut rng()).unwrap();
        let mut generator = GenerateActionMetaData::new(
            Some("logs"),
            None,
            Some(ids.clone()),
            100.0,
            OnConflict::Update,
            0.0,
            false,
            7,
        )
        .unwrap();

        let mut seen = std::collections::HashSet::new();
        for _ in 0..100 {
            let (action, line) = generator.next_line().unwrap().unwrap();
            assert_eq!(action, ActionKind::Update);
            assert!(line.starts_with("{\"update\": "), "{line}");
            let id_start = line.find("\"_id\": \"").unwrap() + 8;
            let id = line[id_start..id_start + 10].to_string();
            assert!(ids.contains(&id), "unknown id {id}");
            seen.insert(id);
        }
        // uniform draws with replacement cover a large part of the range
        assert!(seen.len() > 30, "only {} distinct ids", seen.len());
    }

    #[test]
    fn test_sequential_generator_exhausts_after_all_ids() {
        let ids = build_conflicting_ids(IdConflictKind::Sequential, 3, 0, &mut rng()).unwrap();
        let mut generator = GenerateActionMetaData::new(
            Some("logs"),
            None,
            Some(ids),
            0.0,
            OnConflict::Index,
            0.0,
            false,
            1,
        )
        .unwrap();
        for expected in ["0000000000", "0000000001", "0000000002"] {
            let (_, line) = generator.next_line().unwrap().unwrap();
            assert!(line.contains(expected), "{line}");
        }
        assert!(generator.next_line().unwrap().is_none());
    }

    #[test]
    fn test_metadata_reader_interleaves_meta_and_docs() {
        let dir = tempfile::tempdir().unwrap();
        let path = corpus_file(dir.path(), 4);
        let slice = Slice::open_file(&path, 0, 4, 2).unwrap();
        let generator =
            GenerateActionMetaData::new(Some("logs"), None, None, 0.0, OnConflict::Index, 0.0, false, 1)
                .unwrap();
        let mut reader = DocsReader::with_metadata(slice, 4, generator, Some("logs".to_string()), None);

        let batch = reader.next_batch().unwrap().unwrap();
        assert_eq!(batch.index.as_deref(), Some("logs"));
        assert_eq!(batch.bulks.len(), 2);
        let (docs, body) = &batch.bulks[0];
        assert_eq!(*docs, 2);
        let text = String::from_utf8(body.clone()).unwrap();
        assert_eq!(
            text,
            "{\"index\": {\"_index\": \"logs\"}}\n{\"id\": 0}\n{\"index\": {\"_index\": \"logs\"}}\n{\"id\": 1}\n"
        );
        assert!(reader.next_batch().unwrap().is_none());
    }

    #[test]
    fn test_update_conflicts_wrap_documents() {
        let dir = tempfile::tempdir().unwrap();
        let path = corpus_file(dir.path(), 3);
        let slice = Slice::open_file(&path, 0, 3, 3).unwrap();
        let ids = build_conflicting_ids(IdConflictKind::Sequential, 3, 0, &mut rng()).unwrap();
        let generator = GenerateActionMetaData::new(
            Some("logs"),
            None,
            Some(ids),
            100.0,
            OnConflict::Update,
            0.0,
            false,
            3,
        )
        .unwrap();
        let mut reader = DocsReader::with_metadata(slice, 3, generator, Some("logs".to_string()), None);

        let batch = reader.next_batch().unwrap().unwrap();
        let (docs, body) = &batch.bulks[0];
        assert_eq!(*docs, 3);
        let text = String::from_utf8(body.clone()).unwrap();
        // with conflict probability 100 every document becomes an update
        // and is wrapped to fit the single-line bulk protocol
        assert_eq!(text.matches("{\"update\": ").count(), 3, "{text}");
        for i in 0..3 {
            assert!(text.contains(&format!("{{\"doc\":{{\"id\": {i}}}}}\n")), "{text}");
        }
    }

    #[test]
    fn test_source_only_reader_counts_documents_not_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docs.json");
        let mut content = String::new();
        for i in 0..3 {
            content.push_str(&format!("{{\"index\": {{\"_index\": \"logs\"}}}}\n{{\"id\": {i}}}\n"));
        }
        std::fs::write(&path, &content).unwrap();

        // two lines per document: the slice serves 2 * bulk_size lines
        let slice = Slice::open_file(&path, 0, 6, 4).unwrap();
        let mut reader = DocsReader::source_only(slice, 2, Some("logs".to_string()), None);

        let batch = reader.next_batch().unwrap().unwrap();
        assert_eq!(batch.bulks.len(), 1);
        assert_eq!(batch.bulks[0].0, 2);
        let batch = reader.next_batch().unwrap().unwrap();
        assert_eq!(batch.bulks[0].0, 1);
        assert!(reader.next_batch().unwrap().is_none());
    }
}
