//! One ingestion pass: load ledger, authenticate, walk, write, persist.

use crate::config::{Credentials, IngestOptions};
use crate::error::IngestError;
use crate::governor::{Clock, RateBudget, RateGovernor};
use crate::ledger::Ledger;
use crate::reddit::RedditClient;
use crate::sink::CsvSink;
use crate::source::PostSource;
use crate::walker::{FetchWalker, WalkStats};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::Span;

/// Run states, in order. `Failed` is terminal and reachable from any stage that
/// can abort the run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunStage {
    Init,
    Authenticating,
    Walking,
    Writing,
    Persisting,
    Done,
    Failed,
}

impl RunStage {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStage::Init => "init",
            RunStage::Authenticating => "authenticating",
            RunStage::Walking => "walking",
            RunStage::Writing => "writing",
            RunStage::Persisting => "persisting",
            RunStage::Done => "done",
            RunStage::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A run that ended in `Failed`, with the stage it failed in.
#[derive(Debug, Error)]
#[error("run failed while {stage}: {source}")]
pub struct RunFailure {
    pub stage: RunStage,
    #[source]
    pub source: IngestError,
}

/// Outcome of a successful run.
#[derive(Debug)]
pub struct RunReport {
    pub subreddit: String,
    pub new_posts: usize,
    pub new_comments: usize,
    pub ledger_size: usize,
    pub output: PathBuf,
    pub stats: WalkStats,
    pub rate_waits: u32,
    /// Set when the sink append failed. Those items are still in the ledger.
    pub sink_error: Option<IngestError>,
}

#[derive(Clone, Debug, Default)]
pub struct SubredditIngest {
    pub(crate) opts: IngestOptions,
}

impl SubredditIngest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_options(opts: IngestOptions) -> Self {
        Self { opts }
    }

    // -------- Builder methods --------
    pub fn subreddit(mut self, sub: impl AsRef<str>) -> Self { self.opts = self.opts.with_subreddit(sub); self }
    pub fn post_limit(mut self, n: usize) -> Self { self.opts = self.opts.with_post_limit(n); self }
    pub fn ledger_path(mut self, path: impl AsRef<Path>) -> Self { self.opts = self.opts.with_ledger_path(path); self }
    pub fn output_dir(mut self, dir: impl AsRef<Path>) -> Self { self.opts = self.opts.with_output_dir(dir); self }
    pub fn rate_budget(mut self, budget: RateBudget) -> Self { self.opts = self.opts.with_rate_budget(budget); self }
    pub fn page_size(mut self, n: usize) -> Self { self.opts = self.opts.with_page_size(n); self }
    pub fn interval(mut self, every: Duration) -> Self { self.opts = self.opts.with_interval(every); self }
    pub fn progress(mut self, yes: bool) -> Self { self.opts = self.opts.with_progress(yes); self }

    pub fn options(&self) -> &IngestOptions {
        &self.opts
    }

    pub fn sink(&self) -> CsvSink {
        CsvSink::new(&self.opts.output_dir)
    }

    /// Full pass against the live API, credentials from the environment.
    pub fn run_once(&self) -> Result<RunReport, RunFailure> {
        self.run_with_credentials(Credentials::from_env)
    }

    /// Full pass against the live API with an explicit credential source.
    pub fn run_with_credentials(
        &self,
        credentials: impl FnOnce() -> Result<Credentials, IngestError>,
    ) -> Result<RunReport, RunFailure> {
        let span = self.run_span();
        let _enter = span.enter();

        enter_stage(&span, RunStage::Init);
        let subreddit = self.opts.validate().map_err(|e| fail(RunStage::Init, e))?;
        let creds = credentials().map_err(|e| fail(RunStage::Init, e))?;
        let ledger = Ledger::load(&self.opts.ledger_path);

        enter_stage(&span, RunStage::Authenticating);
        let client = RedditClient::connect(&creds).map_err(|e| fail(RunStage::Authenticating, e))?;
        let mut governor = RateGovernor::new(self.opts.rate_budget);

        self.ingest(&span, subreddit, &client, ledger, &mut governor)
    }

    /// Pass against any source with a caller-supplied governor. There is no
    /// authentication stage: the source is assumed ready.
    pub fn run_with_source<S, C>(&self, source: &S, governor: &mut RateGovernor<C>) -> Result<RunReport, RunFailure>
    where
        S: PostSource + ?Sized,
        C: Clock,
    {
        let span = self.run_span();
        let _enter = span.enter();

        enter_stage(&span, RunStage::Init);
        let subreddit = self.opts.validate().map_err(|e| fail(RunStage::Init, e))?;
        let ledger = Ledger::load(&self.opts.ledger_path);

        self.ingest(&span, subreddit, source, ledger, governor)
    }

    fn run_span(&self) -> Span {
        tracing::info_span!(
            "ingest",
            subreddit = self.opts.subreddit.as_deref().unwrap_or("<unset>"),
            stage = tracing::field::Empty,
        )
    }

    fn ingest<S, C>(
        &self,
        span: &Span,
        subreddit: &str,
        source: &S,
        mut ledger: Ledger,
        governor: &mut RateGovernor<C>,
    ) -> Result<RunReport, RunFailure>
    where
        S: PostSource + ?Sized,
        C: Clock,
    {
        let known_before = ledger.len();

        enter_stage(span, RunStage::Walking);
        let walker = FetchWalker::new(subreddit, self.opts.post_limit)
            .page_size(self.opts.page_size)
            .progress(self.opts.progress);
        // On error the ledger is dropped unpersisted: this run's items are retried next run.
        let walked = walker.walk(source, &mut ledger, governor).map_err(|e| fail(RunStage::Walking, e.into()))?;
        let stats = walked.stats;
        tracing::info!(
            posts_seen = stats.posts_seen,
            posts_skipped = stats.posts_skipped,
            comments = stats.comments_emitted,
            remote_calls = stats.remote_calls,
            "walk finished"
        );

        enter_stage(span, RunStage::Writing);
        let sink = self.sink();
        let records = walked.records;
        let new_posts = records.iter().filter(|r| r.is_post()).count();
        let new_comments = records.len() - new_posts;
        let (output, sink_error) = match sink.append(&records, subreddit) {
            Ok(path) => {
                tracing::info!(path = %path.display(), rows = records.len(), "records appended");
                (path, None)
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    rows = records.len(),
                    "sink write failed, continuing; these items are marked seen and will not be re-fetched"
                );
                (sink.destination(subreddit), Some(e))
            }
        };

        enter_stage(span, RunStage::Persisting);
        if let Err(e) = ledger.persist(&self.opts.ledger_path) {
            return Err(fail(RunStage::Persisting, IngestError::LedgerPersist(format!("{e:#}"))));
        }
        tracing::debug!(new_ids = ledger.len() - known_before, total = ledger.len(), "ledger persisted");

        enter_stage(span, RunStage::Done);
        Ok(RunReport {
            subreddit: subreddit.to_string(),
            new_posts,
            new_comments,
            ledger_size: ledger.len(),
            output,
            stats,
            rate_waits: governor.waits(),
            sink_error,
        })
    }
}

fn enter_stage(span: &Span, stage: RunStage) {
    span.record("stage", stage.as_str());
    tracing::debug!(%stage, "entering stage");
}

fn fail(stage: RunStage, source: IngestError) -> RunFailure {
    Span::current().record("stage", RunStage::Failed.as_str());
    tracing::error!(failed_in = %stage, error = %source, "run failed; ledger progress for this run not persisted");
    RunFailure { stage, source }
}
