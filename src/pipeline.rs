//! Concurrent corpus → record-sink driver.
//!
//! Threads inside one `thread::scope`:
//! - a producer that numbers corpus items and pushes them into a bounded
//!   queue (blocking when it is full);
//! - `worker_count` workers that pull jobs, pack and encode one paragraph each,
//!   and report a completion;
//! - the calling thread, which owns the sink and every counter and applies
//!   completions one at a time.
//!
//! The producer also takes a permit from an in-flight window of
//! `queue_bound + worker_count` before pulling each corpus item; the aggregator
//! returns it once the paragraph is committed. With `preserve_order` this caps
//! the reorder buffer while an early paragraph is still running.
//!
//! A fatal error (sink failure, schema violation, panic) raises the halt flag:
//! the producer stops enqueueing and workers drain the queue without work.
//! Outputs that already completed are still committed unless the sink itself
//! failed.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, mpsc};
use std::thread;
use tracing::{debug, info, warn};

use crate::codec::RecordCodec;
use crate::config::PipelineConfig;
use crate::constants::pipeline::DROPPED_PARAGRAPH_MSG;
use crate::errors::MlmError;
use crate::hash::paragraph_seed;
use crate::masker::WordMasker;
use crate::metrics::{ExampleStats, RunReport};
use crate::packer::Packer;
use crate::rng::DeterministicRng;
use crate::segment::WordSegmenter;
use crate::sink::RecordSink;
use crate::tokenizer::Tokenizer;
use crate::types::{Paragraph, RecordBytes};

/// Records and token totals produced from one paragraph.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParagraphOutput {
    /// Encoded records in packing order.
    pub records: Vec<RecordBytes>,
    /// Totals over the packed examples.
    pub stats: ExampleStats,
}

struct Job {
    index: u64,
    item: Result<Paragraph, MlmError>,
}

struct Completion {
    index: u64,
    outcome: Result<ParagraphOutput, MlmError>,
}

/// Drives a corpus through packing and encoding into a [`RecordSink`].
pub struct PipelineDriver {
    packer: Packer,
    codec: RecordCodec,
    config: PipelineConfig,
}

impl PipelineDriver {
    /// Wrap an existing packer; its capacity must match `config.packing`.
    pub fn new(packer: Packer, config: PipelineConfig) -> Result<Self, MlmError> {
        config.validate()?;
        if packer.capacity() != config.packing.capacity {
            return Err(MlmError::Configuration(format!(
                "packer capacity {} does not match configured capacity {}",
                packer.capacity(),
                config.packing.capacity
            )));
        }
        Ok(Self {
            codec: RecordCodec::new(packer.capacity()),
            packer,
            config,
        })
    }

    /// Build the masker and packer from collaborators and `config`.
    pub fn from_collaborators(
        tokenizer: Arc<dyn Tokenizer>,
        segmenter: Arc<dyn WordSegmenter>,
        config: PipelineConfig,
    ) -> Result<Self, MlmError> {
        let masker = WordMasker::new(tokenizer, segmenter, config.masking)?;
        let packer = Packer::new(masker, config.packing)?;
        Self::new(packer, config)
    }

    /// Validated run configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Codec matching the packer capacity.
    pub fn codec(&self) -> RecordCodec {
        self.codec
    }

    /// Pack and encode the paragraph at corpus position `index`.
    ///
    /// The RNG is seeded from the run seed and `index` alone, so the result
    /// does not depend on which worker runs it or when.
    pub fn process_paragraph(
        &self,
        index: u64,
        paragraph: &[String],
    ) -> Result<ParagraphOutput, MlmError> {
        let mut rng = DeterministicRng::new(paragraph_seed(self.config.seed, index));
        let examples = self.packer.pack(paragraph, &mut rng)?;
        let records = self.codec.encode_all(&examples)?;
        Ok(ParagraphOutput {
            records,
            stats: ExampleStats::from_examples(&examples),
        })
    }

    /// Run over plain paragraphs.
    pub fn run_paragraphs<I>(
        &self,
        paragraphs: I,
        sink: &dyn RecordSink,
    ) -> Result<RunReport, MlmError>
    where
        I: IntoIterator<Item = Paragraph>,
        I::IntoIter: Send,
    {
        self.run(paragraphs.into_iter().map(Ok), sink)
    }

    /// Run over a fallible corpus, appending each paragraph's records to
    /// `sink` in one call, then close the sink.
    ///
    /// Corpus errors and per-paragraph segmentation/tokenization failures are
    /// logged and counted as dropped. Any other error stops the run; the sink
    /// is still closed so records already appended stay readable.
    pub fn run<C>(&self, corpus: C, sink: &dyn RecordSink) -> Result<RunReport, MlmError>
    where
        C: IntoIterator<Item = Result<Paragraph, MlmError>>,
        C::IntoIter: Send,
    {
        let corpus = corpus.into_iter();
        let worker_count = self.config.worker_count;
        info!(
            worker_count,
            queue_bound = self.config.queue_bound,
            capacity = self.codec.capacity(),
            mask_rate = self.packer.masker().mask_rate(),
            "starting record build"
        );

        let (job_tx, job_rx) = mpsc::sync_channel::<Job>(self.config.queue_bound);
        let job_rx = Mutex::new(job_rx);
        let (done_tx, done_rx) = mpsc::channel::<Completion>();
        let halt = AtomicBool::new(false);
        let window = InFlightWindow::new(self.config.queue_bound + worker_count);

        let mut aggregator = Aggregator::new(sink, self.config.preserve_order, &window);

        thread::scope(|scope| {
            let halt = &halt;
            let job_rx = &job_rx;
            let window = &window;

            let producer = scope.spawn(move || {
                let mut corpus = corpus;
                let mut index = 0u64;
                while window.acquire(halt) {
                    let Some(item) = corpus.next() else {
                        break;
                    };
                    if job_tx.send(Job { index, item }).is_err() {
                        break;
                    }
                    index += 1;
                }
                index
            });

            for worker_id in 0..worker_count {
                let done_tx = done_tx.clone();
                scope.spawn(move || {
                    loop {
                        let next = job_rx.lock().expect("job queue poisoned").recv();
                        let Ok(job) = next else {
                            break;
                        };
                        if halt.load(Ordering::Acquire) {
                            continue;
                        }
                        let index = job.index;
                        let outcome = panic::catch_unwind(AssertUnwindSafe(|| match job.item {
                            Ok(paragraph) => self.process_paragraph(index, &paragraph),
                            Err(err) => Err(err),
                        }))
                        .unwrap_or_else(|_| {
                            Err(MlmError::Worker(format!(
                                "worker {worker_id} panicked on paragraph {index}"
                            )))
                        });
                        if done_tx.send(Completion { index, outcome }).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(done_tx);

            for completion in done_rx {
                aggregator.apply(completion);
                if aggregator.fatal.is_some() && !halt.swap(true, Ordering::AcqRel) {
                    window.wake_all();
                }
            }

            match producer.join() {
                Ok(enqueued) => debug!(enqueued, "corpus producer finished"),
                Err(_) => aggregator.fail(MlmError::Worker("corpus producer panicked".into())),
            }
        });

        let Aggregator {
            mut report, fatal, ..
        } = aggregator;

        if let Some(err) = fatal {
            if let Err(close_err) = sink.close() {
                warn!(error = %close_err, "closing sink after failed run also failed");
            }
            warn!(
                error = %err,
                examples = report.examples(),
                "record build aborted"
            );
            return Err(err);
        }

        sink.close()?;
        report.finish();
        info!(
            examples = report.examples(),
            paragraphs_seen = report.paragraphs_seen,
            paragraphs_dropped = report.paragraphs_dropped,
            fill_ratio = report.stats.fill_ratio(),
            mask_ratio = report.stats.mask_ratio(),
            "wrote {} examples",
            report.examples()
        );
        Ok(report)
    }
}

/// Bounds the number of corpus items between the producer and the sink.
struct InFlightWindow {
    limit: usize,
    count: Mutex<usize>,
    changed: Condvar,
}

impl InFlightWindow {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            count: Mutex::new(0),
            changed: Condvar::new(),
        }
    }

    /// Wait for a free slot; `false` once the run is halted.
    fn acquire(&self, halt: &AtomicBool) -> bool {
        let mut count = self.count.lock().expect("in-flight window poisoned");
        loop {
            if halt.load(Ordering::Acquire) {
                return false;
            }
            if *count < self.limit {
                *count += 1;
                return true;
            }
            count = self
                .changed
                .wait(count)
                .expect("in-flight window poisoned");
        }
    }

    fn release(&self) {
        let mut count = self.count.lock().expect("in-flight window poisoned");
        *count = count.saturating_sub(1);
        self.changed.notify_one();
    }

    /// Wake a producer blocked in `acquire` so it can observe the halt flag.
    fn wake_all(&self) {
        let _count = self.count.lock().expect("in-flight window poisoned");
        self.changed.notify_all();
    }
}

/// Single owner of the sink and run counters.
struct Aggregator<'a> {
    sink: &'a dyn RecordSink,
    window: &'a InFlightWindow,
    report: RunReport,
    fatal: Option<MlmError>,
    sink_failed: bool,
    reorder: Option<Reorder>,
}

struct Reorder {
    next_index: u64,
    pending: BTreeMap<u64, Result<ParagraphOutput, MlmError>>,
}

impl<'a> Aggregator<'a> {
    fn new(sink: &'a dyn RecordSink, preserve_order: bool, window: &'a InFlightWindow) -> Self {
        Self {
            sink,
            window,
            report: RunReport::start(),
            fatal: None,
            sink_failed: false,
            reorder: preserve_order.then(|| Reorder {
                next_index: 0,
                pending: BTreeMap::new(),
            }),
        }
    }

    /// Apply one completion. Ordered runs commit the contiguous ready prefix.
    fn apply(&mut self, completion: Completion) {
        if self.sink_failed {
            return;
        }
        let Some(reorder) = self.reorder.as_mut() else {
            self.commit(completion.index, completion.outcome);
            return;
        };
        reorder.pending.insert(completion.index, completion.outcome);
        while !self.sink_failed {
            let Some(reorder) = self.reorder.as_mut() else {
                break;
            };
            let index = reorder.next_index;
            let Some(outcome) = reorder.pending.remove(&index) else {
                break;
            };
            reorder.next_index += 1;
            self.commit(index, outcome);
        }
    }

    fn commit(&mut self, index: u64, outcome: Result<ParagraphOutput, MlmError>) {
        self.window.release();
        self.report.paragraphs_seen += 1;
        match outcome {
            Ok(output) => {
                if !output.records.is_empty()
                    && let Err(err) = self.sink.append(&output.records)
                {
                    self.sink_failed = true;
                    self.fail(err);
                    return;
                }
                debug!(
                    paragraph = index,
                    examples = output.stats.examples,
                    "appended paragraph records"
                );
                self.report.stats.merge(output.stats);
            }
            Err(err) if err.is_paragraph_local() => {
                self.report.paragraphs_dropped += 1;
                warn!(paragraph = index, error = %err, "{DROPPED_PARAGRAPH_MSG}");
            }
            Err(err) => self.fail(err),
        }
    }

    fn fail(&mut self, err: MlmError) {
        if self.fatal.is_none() {
            self.fatal = Some(err);
        }
    }
}
