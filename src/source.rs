//! The forum client capability surface the walker consumes.

use crate::error::SourceError;

/// A post as delivered by the forum client.
#[derive(Clone, Debug, PartialEq)]
pub struct Post {
    pub id: String,
    pub title: String,
    pub body: String,
    pub score: i64,
    pub comment_count: u64,
    /// Unix seconds, UTC.
    pub created_utc: i64,
    /// `None` for deleted accounts.
    pub author: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Comment {
    pub id: String,
    pub body: String,
    pub score: i64,
    pub created_utc: i64,
    pub author: Option<String>,
}

/// One newest-first listing page and the cursor for the next one.
#[derive(Clone, Debug, Default)]
pub struct PostPage {
    pub posts: Vec<Post>,
    pub after: Option<String>,
}

/// Remote forum access. Each method call is one remote request as far as the
/// caller's rate budget is concerned; any further requests a method needs are
/// announced through the hook it is given.
pub trait PostSource {
    /// Fetch up to `page_size` posts of `subreddit`, newest first, continuing
    /// after the cursor `after` (`None` for the first page).
    fn fetch_new_page(&self, subreddit: &str, after: Option<&str>, page_size: usize) -> Result<PostPage, SourceError>;

    /// Every comment of `post`, fully expanded (no "load more" placeholders),
    /// flattened in tree order.
    ///
    /// `follow_up` must be called immediately before every request made after
    /// the first one (stub batches, continued threads). It may block.
    fn expand_comments(&self, post: &Post, follow_up: &mut dyn FnMut()) -> Result<Vec<Comment>, SourceError>;
}
