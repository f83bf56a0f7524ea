mod config;
mod error;
mod util;
mod progress;

mod ledger;
mod governor;
mod normalize;
mod record;
mod source;
mod reddit;
mod walker;
mod sink;
mod run;

pub use crate::config::{load_config, Credentials, FileConfig, IngestOptions};
pub use crate::error::{IngestError, SourceError};
pub use crate::run::{RunFailure, RunReport, RunStage, SubredditIngest};

// Building blocks, usable on their own (e.g. with a custom PostSource).
pub use crate::ledger::Ledger;
pub use crate::governor::{Clock, ManualClock, RateBudget, RateGovernor, SystemClock};
pub use crate::walker::{FetchWalker, WalkOutput, WalkStats, MAX_PAGE_SIZE};
pub use crate::sink::{CsvSink, HEADER, MISSING_AUTHOR};
pub use crate::record::{CommentRecord, PostRecord, Record};
pub use crate::source::{Comment, Post, PostPage, PostSource};
pub use crate::reddit::RedditClient;

// Text cleaning applied to every body field.
pub use crate::normalize::clean_text;

// tracing setup and robust file ops for the binary.
pub use crate::util::{init_tracing_once, replace_file_atomic_backoff};
