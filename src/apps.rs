use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, ValueEnum, error::ErrorKind};

use crate::config::{PipelineConfig, ReaderConfig, TailPolicy};
use crate::constants::defaults::SHUFFLE_BUFFER_FACTOR;
use crate::corpus::{JsonLinesCorpus, TextDirCorpus};
use crate::errors::MlmError;
use crate::metrics::RunReport;
use crate::pipeline::PipelineDriver;
use crate::reader::{MlmBatch, RecordReader};
use crate::segment::{CjkCharSegmenter, WhitespaceSegmenter, WordSegmenter};
use crate::sink::StoreRecordSink;
use crate::tokenizer::WordPieceTokenizer;
use crate::types::Paragraph;
use crate::vocab::Vocabulary;

type DynCorpus = Box<dyn Iterator<Item = Result<Paragraph, MlmError>> + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CorpusFormat {
    /// One JSON string per line; units separated by `\n`.
    Jsonl,
    /// Directory of `.txt` files; blank-line blocks, one sentence per unit.
    TextDir,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SegmenterArg {
    Whitespace,
    CjkChar,
}

#[derive(Debug, Parser)]
#[command(
    name = "build_mlm_records",
    disable_help_subcommand = true,
    about = "Build whole-word-masked MLM records from a text corpus",
    long_about = "Mask whole words, pack sentences into fixed-length windows, and write the resulting token_ids/mask_ids records into a record store.",
    after_help = "Flag values override fields loaded from --config; unspecified fields keep their defaults."
)]
struct BuildRecordsCli {
    #[arg(long, value_name = "VOCAB_TXT", help = "BERT-style vocab.txt")]
    vocab: PathBuf,
    #[arg(
        long,
        value_name = "PATH",
        help = "Corpus file (jsonl) or directory (text-dir)"
    )]
    input: PathBuf,
    #[arg(
        long,
        value_enum,
        help = "Corpus format; inferred from --input when omitted"
    )]
    format: Option<CorpusFormat>,
    #[arg(
        long,
        value_name = "STORE_PATH",
        help = "Record store file, or a directory to use the default filename"
    )]
    output: PathBuf,
    #[arg(long, value_name = "JSON", help = "Pipeline config file")]
    config: Option<PathBuf>,
    #[arg(long, help = "Window length in tokens")]
    capacity: Option<usize>,
    #[arg(long = "mask-rate", help = "Per-word mask-candidate probability")]
    mask_rate: Option<f64>,
    #[arg(long, help = "Number of paragraph workers")]
    workers: Option<usize>,
    #[arg(long = "queue-bound", help = "Paragraphs buffered ahead of the workers")]
    queue_bound: Option<usize>,
    #[arg(long, help = "Deterministic seed for mask decisions")]
    seed: Option<u64>,
    #[arg(
        long = "flush-tail",
        help = "Emit each paragraph's trailing window instead of dropping it"
    )]
    flush_tail: bool,
    #[arg(
        long = "preserve-order",
        help = "Write records in corpus order regardless of worker scheduling"
    )]
    preserve_order: bool,
    #[arg(long, value_enum, default_value = "whitespace", help = "Word segmentation")]
    segmenter: SegmenterArg,
    #[arg(long, help = "Keep letter case (for cased vocabularies)")]
    cased: bool,
}

impl BuildRecordsCli {
    fn pipeline_config(&self) -> Result<PipelineConfig, MlmError> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(capacity) = self.capacity {
            config.packing.capacity = capacity;
        }
        if let Some(mask_rate) = self.mask_rate {
            config.masking.mask_rate = mask_rate;
        }
        if let Some(workers) = self.workers {
            config.worker_count = workers;
        }
        if let Some(queue_bound) = self.queue_bound {
            config.queue_bound = queue_bound;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if self.flush_tail {
            config.packing.tail = TailPolicy::Flush;
        }
        if self.preserve_order {
            config.preserve_order = true;
        }
        config.validate()?;
        Ok(config)
    }

    fn corpus(&self) -> Result<DynCorpus, MlmError> {
        let format = self.format.unwrap_or_else(|| infer_format(&self.input));
        Ok(match format {
            CorpusFormat::Jsonl => Box::new(JsonLinesCorpus::open(&self.input)?),
            CorpusFormat::TextDir => Box::new(TextDirCorpus::open(&self.input)?),
        })
    }

    fn segmenter(&self) -> Arc<dyn WordSegmenter> {
        match self.segmenter {
            SegmenterArg::Whitespace => Arc::new(WhitespaceSegmenter),
            SegmenterArg::CjkChar => Arc::new(CjkCharSegmenter),
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "inspect_mlm_records",
    disable_help_subcommand = true,
    about = "Print record store metadata and sample shuffled batches",
    long_about = "Open one or more record stores, report their record count, and print a few batches from the repeating shuffled stream."
)]
struct InspectRecordsCli {
    #[arg(required = true, value_name = "STORE_PATH", help = "Record store files")]
    stores: Vec<PathBuf>,
    #[arg(long, help = "Window length the stores were built with")]
    capacity: usize,
    #[arg(
        long = "batch-size",
        default_value_t = 4,
        value_parser = parse_positive_usize,
        help = "Rows per batch"
    )]
    batch_size: usize,
    #[arg(
        long,
        default_value_t = 1,
        help = "Number of batches to print"
    )]
    batches: usize,
    #[arg(
        long = "shuffle-buffer",
        value_parser = parse_positive_usize,
        help = "Shuffle buffer size (defaults to batch size x 1000)"
    )]
    shuffle_buffer: Option<usize>,
    #[arg(long, help = "Shuffle seed override")]
    seed: Option<u64>,
    #[arg(
        long,
        value_name = "VOCAB_TXT",
        help = "Vocabulary used to render token ids as text"
    )]
    vocab: Option<PathBuf>,
}

/// Build a record store from a corpus.
pub fn run_build_records<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let Some(cli) = parse_cli::<BuildRecordsCli, _>(
        std::iter::once("build_mlm_records".to_string()).chain(args_iter),
    )?
    else {
        return Ok(());
    };

    let config = cli.pipeline_config()?;
    let report = build_records(&cli, config)?;
    println!(
        "write {} examples into {}",
        report.examples(),
        cli.output.display()
    );
    print_report(&report);
    Ok(())
}

fn build_records(cli: &BuildRecordsCli, config: PipelineConfig) -> Result<RunReport, MlmError> {
    let vocab = Arc::new(Vocabulary::from_file(&cli.vocab)?);
    let tokenizer = Arc::new(WordPieceTokenizer::new(vocab).with_lowercase(!cli.cased));
    let capacity = config.packing.capacity;
    let driver = PipelineDriver::from_collaborators(tokenizer, cli.segmenter(), config)?;
    let corpus = cli.corpus()?;
    let sink = StoreRecordSink::open(&cli.output, capacity)?;
    driver.run(corpus, &sink)
}

/// Inspect one or more record stores.
pub fn run_inspect_records<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let Some(cli) = parse_cli::<InspectRecordsCli, _>(
        std::iter::once("inspect_mlm_records".to_string()).chain(args_iter),
    )?
    else {
        return Ok(());
    };

    let vocab = cli.vocab.as_deref().map(Vocabulary::from_file).transpose()?;
    let reader = RecordReader::open(cli.stores.iter().cloned(), cli.capacity)?;
    println!(
        "{} store(s), capacity {}, {} records",
        cli.stores.len(),
        reader.capacity(),
        reader.record_count()
    );

    let mut config = ReaderConfig::with_batch_size(cli.batch_size);
    config.shuffle_buffer = cli
        .shuffle_buffer
        .unwrap_or(cli.batch_size.saturating_mul(SHUFFLE_BUFFER_FACTOR));
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }
    for (idx, batch) in reader
        .shuffled_batches(config)?
        .take(cli.batches)
        .enumerate()
    {
        print_batch(idx, &batch?, vocab.as_ref());
    }
    Ok(())
}

fn infer_format(input: &Path) -> CorpusFormat {
    if input.is_dir() {
        CorpusFormat::TextDir
    } else {
        CorpusFormat::Jsonl
    }
}

fn print_report(report: &RunReport) {
    println!(
        "paragraphs: {} seen, {} dropped",
        report.paragraphs_seen, report.paragraphs_dropped
    );
    println!(
        "tokens: {} content, {} masked, {} padding (fill {:.3}, mask {:.3})",
        report.stats.content_tokens,
        report.stats.masked_tokens,
        report.stats.padding_tokens,
        report.stats.fill_ratio(),
        report.stats.mask_ratio()
    );
    println!("elapsed: {:.2}s", report.elapsed_secs());
}

fn print_batch(idx: usize, batch: &MlmBatch, vocab: Option<&Vocabulary>) {
    println!("=== batch {idx} ({} rows) ===", batch.len());
    for (row, (tokens, masks)) in batch.token_ids.iter().zip(&batch.mask_ids).enumerate() {
        let masked = masks.iter().filter(|flag| **flag != 0).count();
        println!("row {row}: {masked} mask candidates");
        println!("  {}", render_row(tokens, masks, vocab));
    }
}

/// Render non-padding positions; mask candidates are wrapped in `<>`.
fn render_row(tokens: &[u32], masks: &[u32], vocab: Option<&Vocabulary>) -> String {
    let content = tokens
        .iter()
        .rposition(|id| *id != 0)
        .map(|idx| idx + 1)
        .unwrap_or(0);
    tokens[..content]
        .iter()
        .zip(masks)
        .map(|(id, flag)| {
            let text = vocab
                .and_then(|vocab| vocab.token_of(*id))
                .map(str::to_string)
                .unwrap_or_else(|| id.to_string());
            if *flag != 0 { format!("<{text}>") } else { text }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_positive_usize(raw: &str) -> Result<usize, String> {
    let parsed = raw
        .parse::<usize>()
        .map_err(|_| format!("invalid value '{raw}': expected a positive integer"))?;
    if parsed == 0 {
        return Err("value must be greater than zero".to_string());
    }
    Ok(parsed)
}

fn parse_cli<T, I>(args: I) -> Result<Option<T>, Box<dyn Error>>
where
    T: Parser,
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString> + Clone,
{
    match T::try_parse_from(args) {
        Ok(cli) => Ok(Some(cli)),
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                err.print()?;
                Ok(None)
            }
            _ => Err(err.into()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn args(items: &[&str]) -> impl Iterator<Item = String> {
        items
            .iter()
            .map(|item| item.to_string())
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn help_is_not_an_error() {
        assert!(run_build_records(args(&["--help"])).is_ok());
        assert!(run_inspect_records(args(&["--help"])).is_ok());
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        fs::write(&config_path, r#"{"worker_count": 3, "seed": 5}"#).unwrap();
        let cli = BuildRecordsCli::try_parse_from([
            "build_mlm_records",
            "--vocab",
            "vocab.txt",
            "--input",
            "corpus.jsonl",
            "--output",
            "out.bin",
            "--config",
            config_path.to_str().unwrap(),
            "--capacity",
            "64",
            "--flush-tail",
        ])
        .unwrap();
        let config = cli.pipeline_config().unwrap();
        assert_eq!(config.worker_count, 3);
        assert_eq!(config.seed, 5);
        assert_eq!(config.packing.capacity, 64);
        assert_eq!(config.packing.tail, TailPolicy::Flush);
        assert!(!config.preserve_order);
    }

    #[test]
    fn invalid_overrides_are_rejected() {
        let cli = BuildRecordsCli::try_parse_from([
            "build_mlm_records",
            "--vocab",
            "v",
            "--input",
            "i",
            "--output",
            "o",
            "--mask-rate",
            "1.5",
        ])
        .unwrap();
        assert!(matches!(
            cli.pipeline_config(),
            Err(MlmError::Configuration(_))
        ));
    }

    #[test]
    fn build_then_inspect_round_trip() {
        let dir = tempdir().unwrap();
        let vocab = dir.path().join("vocab.txt");
        fs::write(&vocab, "[PAD]\n[UNK]\n[CLS]\n[SEP]\nthe\ncat\nsat\non\nmat\n").unwrap();
        let corpus = dir.path().join("corpus.jsonl");
        fs::write(
            &corpus,
            "\"the cat sat\\non the mat\\nthe cat\"\n\"the mat\\nthe cat sat on\"\n",
        )
        .unwrap();
        let output = dir.path().join("records.bin");
        run_build_records(args(&[
            "--vocab",
            vocab.to_str().unwrap(),
            "--input",
            corpus.to_str().unwrap(),
            "--output",
            output.to_str().unwrap(),
            "--capacity",
            "6",
            "--workers",
            "2",
            "--flush-tail",
        ]))
        .unwrap();

        let reader = RecordReader::open([&output], 6).unwrap();
        assert!(reader.record_count() > 0);
        run_inspect_records(args(&[
            output.to_str().unwrap(),
            "--capacity",
            "6",
            "--batch-size",
            "2",
            "--batches",
            "2",
            "--vocab",
            vocab.to_str().unwrap(),
        ]))
        .unwrap();
    }

    #[test]
    fn render_row_marks_candidates_and_trims_padding() {
        let vocab = Vocabulary::from_tokens(["[PAD]", "[UNK]", "[CLS]", "[SEP]", "cat"]).unwrap();
        assert_eq!(
            render_row(&[2, 4, 3, 0, 0], &[0, 1, 0, 0, 0], Some(&vocab)),
            "[CLS] <cat> [SEP]"
        );
        assert_eq!(render_row(&[2, 9, 3, 0], &[0, 0, 0, 0], None), "2 9 3");
    }
}
