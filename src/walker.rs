//! Paginated walk over the newest posts and their comment trees.

use crate::error::SourceError;
use crate::governor::{Clock, RateGovernor};
use crate::ledger::Ledger;
use crate::progress::ProgressScope;
use crate::record::{CommentRecord, PostRecord, Record};
use crate::source::PostSource;

/// Reddit listings return at most 100 items per page.
pub const MAX_PAGE_SIZE: usize = 100;

/// Counters for one walk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WalkStats {
    pub posts_seen: u64,
    pub posts_skipped: u64,
    pub comments_emitted: u64,
    pub comments_skipped: u64,
    pub remote_calls: u64,
}

#[derive(Debug, Default)]
pub struct WalkOutput {
    pub records: Vec<Record>,
    pub stats: WalkStats,
}

#[derive(Clone, Debug)]
pub struct FetchWalker {
    subreddit: String,
    limit: usize,
    page_size: usize,
    progress: bool,
}

impl FetchWalker {
    pub fn new(subreddit: impl Into<String>, limit: usize) -> Self {
        Self { subreddit: subreddit.into(), limit, page_size: MAX_PAGE_SIZE, progress: false }
    }

    pub fn page_size(mut self, n: usize) -> Self {
        self.page_size = n.clamp(1, MAX_PAGE_SIZE);
        self
    }

    pub fn progress(mut self, yes: bool) -> Self {
        self.progress = yes;
        self
    }

    /// Walk the newest `limit` posts newest-first. Known posts are skipped, new
    /// posts and comments are claimed in `ledger` and emitted, each post ahead of
    /// its own comments. Any client error aborts the whole walk.
    pub fn walk<S, C>(&self, source: &S, ledger: &mut Ledger, governor: &mut RateGovernor<C>) -> Result<WalkOutput, SourceError>
    where
        S: PostSource + ?Sized,
        C: Clock,
    {
        let pb = if self.progress {
            ProgressScope::count(format!("r/{}", self.subreddit), self.limit as u64)
        } else {
            ProgressScope::hidden()
        };
        let mut out = WalkOutput::default();
        let mut remaining = self.limit;
        let mut after: Option<String> = None;

        while remaining > 0 {
            governor.before_call();
            out.stats.remote_calls += 1;
            let page = source.fetch_new_page(&self.subreddit, after.as_deref(), self.page_size.min(remaining))?;
            tracing::debug!(posts = page.posts.len(), after = ?page.after, "listing page fetched");
            if page.posts.is_empty() {
                break;
            }

            let take = remaining.min(page.posts.len());
            remaining -= take;
            for post in page.posts.iter().take(take) {
                out.stats.posts_seen += 1;
                pb.inc_items(1);
                if !claim(ledger, &post.id) {
                    out.stats.posts_skipped += 1;
                    continue;
                }
                out.records.push(Record::Post(PostRecord::from_post(post)));

                governor.before_call();
                out.stats.remote_calls += 1;
                let mut follow_ups = 0u64;
                let comments = source.expand_comments(post, &mut || {
                    governor.before_call();
                    follow_ups += 1;
                })?;
                out.stats.remote_calls += follow_ups;
                for comment in &comments {
                    if !claim(ledger, &comment.id) {
                        out.stats.comments_skipped += 1;
                        continue;
                    }
                    out.records.push(Record::Comment(CommentRecord::from_comment(post, comment)));
                    out.stats.comments_emitted += 1;
                }
            }

            match page.after {
                Some(cursor) => after = Some(cursor),
                None => break,
            }
        }

        pb.finish(format!("{} new records", out.records.len()));
        Ok(out)
    }
}

/// Mark `id` as seen and report whether it was new.
///
/// Items are claimed *before* their record is produced or written: a crash or
/// failed write after this point loses the record rather than duplicating it.
/// Moving this after the sink write flips the tradeoff.
fn claim(ledger: &mut Ledger, id: &str) -> bool {
    if ledger.contains(id) {
        return false;
    }
    ledger.add(id)
}
