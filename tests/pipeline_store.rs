use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use mlm_pack::{
    JsonLinesCorpus, MaskingConfig, MemorySink, MlmError, PackingConfig, Paragraph,
    PipelineConfig, PipelineDriver, ReaderConfig, RecordBytes, RecordCodec, RecordReader,
    RecordSink, StoreRecordSink, TailPolicy, TextDirCorpus, Vocabulary, WhitespaceSegmenter,
    WordPieceTokenizer,
};
use tempfile::tempdir;

const CAPACITY: usize = 12;

fn driver(workers: usize, preserve_order: bool) -> PipelineDriver {
    let vocab = Vocabulary::from_tokens(
        ["[PAD]", "[UNK]", "[CLS]", "[SEP]", "alpha", "beta", "gamma", "delta", "eps", "."]
            .into_iter(),
    )
    .unwrap();
    let config = PipelineConfig {
        masking: MaskingConfig { mask_rate: 0.3 },
        packing: PackingConfig {
            capacity: CAPACITY,
            tail: TailPolicy::Flush,
        },
        worker_count: workers,
        queue_bound: 4,
        seed: 1234,
        preserve_order,
    };
    PipelineDriver::from_collaborators(
        Arc::new(WordPieceTokenizer::new(Arc::new(vocab))),
        Arc::new(WhitespaceSegmenter),
        config,
    )
    .unwrap()
}

fn corpus(paragraphs: usize) -> Vec<Paragraph> {
    let words = ["alpha", "beta", "gamma", "delta", "eps"];
    (0..paragraphs)
        .map(|idx| {
            (0..1 + idx % 4)
                .map(|unit| {
                    (0..2 + (idx + unit) % 5)
                        .map(|word| words[(idx + unit + word) % words.len()])
                        .collect::<Vec<_>>()
                        .join(" ")
                })
                .collect()
        })
        .collect()
}

fn counts(records: Vec<RecordBytes>) -> BTreeMap<RecordBytes, usize> {
    let mut counts = BTreeMap::new();
    for record in records {
        *counts.entry(record).or_insert(0) += 1;
    }
    counts
}

#[test]
fn record_multiset_does_not_depend_on_worker_count() {
    let single = MemorySink::new();
    driver(1, false).run_paragraphs(corpus(60), &single).unwrap();
    let many = MemorySink::new();
    driver(5, false).run_paragraphs(corpus(60), &many).unwrap();
    assert!(!single.is_empty());
    assert_eq!(counts(single.records()), counts(many.records()));
}

#[test]
fn every_record_decodes_to_a_valid_window() {
    let sink = MemorySink::new();
    let report = driver(3, true).run_paragraphs(corpus(25), &sink).unwrap();
    let codec = RecordCodec::new(CAPACITY);
    let mut masked = 0;
    for record in sink.records() {
        let example = codec.decode(&record).unwrap();
        assert_eq!(example.token_ids()[0], 2);
        assert_eq!(example.token_ids()[example.content_len() - 1], 3);
        masked += example.masked_count() as u64;
    }
    assert_eq!(report.examples(), sink.len() as u64);
    assert_eq!(report.stats.masked_tokens, masked);
    assert_eq!(report.paragraphs_seen, 25);
    assert_eq!(report.paragraphs_dropped, 0);
}

struct FailingSink {
    appends: AtomicUsize,
    fail_after: usize,
    closed: AtomicUsize,
}

impl RecordSink for FailingSink {
    fn append(&self, _records: &[RecordBytes]) -> Result<(), MlmError> {
        if self.appends.fetch_add(1, Ordering::SeqCst) >= self.fail_after {
            return Err(MlmError::Sink("disk full".into()));
        }
        Ok(())
    }

    fn close(&self) -> Result<(), MlmError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn sink_failure_stops_the_run_and_still_closes() {
    let sink = FailingSink {
        appends: AtomicUsize::new(0),
        fail_after: 3,
        closed: AtomicUsize::new(0),
    };
    let err = driver(4, false)
        .run_paragraphs(corpus(500), &sink)
        .unwrap_err();
    assert!(matches!(err, MlmError::Sink(reason) if reason == "disk full"));
    assert_eq!(sink.closed.load(Ordering::SeqCst), 1);
    assert!(sink.appends.load(Ordering::SeqCst) < 500);
}

#[test]
fn jsonl_corpus_to_store_and_back() {
    let dir = tempdir().unwrap();
    let corpus_path = dir.path().join("corpus.jsonl");
    let mut lines = String::new();
    for paragraph in corpus(30) {
        lines.push_str(&serde_json::to_string(&paragraph.join("\n")).unwrap());
        lines.push('\n');
    }
    lines.push_str("not json\n");
    fs::write(&corpus_path, lines).unwrap();

    let store_path = dir.path().join("store").join("records.bin");
    let sink = StoreRecordSink::open(&store_path, CAPACITY).unwrap();
    let report = driver(3, true)
        .run(JsonLinesCorpus::open(&corpus_path).unwrap(), &sink)
        .unwrap();
    assert_eq!(report.paragraphs_seen, 31);
    assert_eq!(report.paragraphs_dropped, 1);

    let memory = MemorySink::new();
    driver(1, true).run_paragraphs(corpus(30), &memory).unwrap();

    let reader = RecordReader::open([&store_path], CAPACITY).unwrap();
    assert_eq!(reader.record_count(), report.examples());
    let codec = RecordCodec::new(CAPACITY);
    let expected: Vec<_> = memory
        .records()
        .iter()
        .map(|record| codec.decode(record).unwrap())
        .collect();
    assert_eq!(reader.read_all().unwrap(), expected);

    assert!(matches!(
        RecordReader::open([&store_path], CAPACITY * 2),
        Err(MlmError::SchemaViolation { .. })
    ));

    let batch = reader
        .shuffled_batches(ReaderConfig::with_batch_size(7))
        .unwrap()
        .nth(3)
        .unwrap()
        .unwrap();
    assert_eq!(batch.len(), 7);
    assert!(batch.token_ids.iter().all(|row| row.len() == CAPACITY));
}

#[test]
fn text_directory_corpus_runs_end_to_end() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("one.txt"),
        "alpha beta gamma. delta eps alpha beta.\n\ngamma delta. eps eps eps.",
    )
    .unwrap();
    fs::write(dir.path().join("two.txt"), "beta beta beta beta. gamma gamma gamma.").unwrap();
    let sink = MemorySink::new();
    let report = driver(2, true)
        .run(TextDirCorpus::open(dir.path()).unwrap(), &sink)
        .unwrap();
    assert_eq!(report.paragraphs_seen, 3);
    assert_eq!(report.paragraphs_dropped, 0);
    assert!(report.examples() >= 3);
    assert_eq!(sink.append_sizes().len(), 3);
}
