#![allow(dead_code)]

use reddit_ingest::{Comment, Post, PostPage, PostSource, SourceError};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// In-memory forum: posts newest-first, comments keyed by post id.
/// Counts every remote call and can be told to fail on one post's comments.
#[derive(Default)]
pub struct FakeForum {
    pub posts: Vec<Post>,
    pub comments: HashMap<String, Vec<Comment>>,
    pub fail_expanding: Option<String>,
    /// Extra requests each post's comment tree needs beyond the first.
    pub stub_batches: HashMap<String, usize>,
    pub page_calls: Cell<usize>,
    pub expanded: RefCell<Vec<String>>,
}

impl FakeForum {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a post (appended after existing ones, i.e. older) with `n` comments
    /// named `<post>-c1..=cn`.
    pub fn with_post(mut self, id: &str, n: usize) -> Self {
        self.posts.push(post(id));
        self.comments.insert(id.to_string(), (1..=n).map(|i| comment(&format!("{id}-c{i}"))).collect());
        self
    }

    /// A newer post shows up at the head of the listing.
    pub fn publish_newest(&mut self, id: &str, n: usize) {
        self.posts.insert(0, post(id));
        self.comments.insert(id.to_string(), (1..=n).map(|i| comment(&format!("{id}-c{i}"))).collect());
    }

    pub fn add_comment(&mut self, post_id: &str, comment_id: &str) {
        self.comments.entry(post_id.to_string()).or_default().push(comment(comment_id));
    }

    /// Comments of `post_id` sit behind `n` "load more" batches.
    pub fn with_stub_batches(mut self, post_id: &str, n: usize) -> Self {
        self.stub_batches.insert(post_id.to_string(), n);
        self
    }

    pub fn failing_on(mut self, post_id: &str) -> Self {
        self.fail_expanding = Some(post_id.to_string());
        self
    }
}

impl PostSource for FakeForum {
    fn fetch_new_page(&self, _subreddit: &str, after: Option<&str>, page_size: usize) -> Result<PostPage, SourceError> {
        self.page_calls.set(self.page_calls.get() + 1);
        let start = match after {
            Some(cursor) => self.posts.iter().position(|p| p.id == cursor).map(|i| i + 1).unwrap_or(self.posts.len()),
            None => 0,
        };
        let end = (start + page_size).min(self.posts.len());
        let page = self.posts[start..end].to_vec();
        let after = if end < self.posts.len() { page.last().map(|p| p.id.clone()) } else { None };
        Ok(PostPage { posts: page, after })
    }

    fn expand_comments(&self, post: &Post, follow_up: &mut dyn FnMut()) -> Result<Vec<Comment>, SourceError> {
        self.expanded.borrow_mut().push(post.id.clone());
        if self.fail_expanding.as_deref() == Some(post.id.as_str()) {
            return Err(SourceError::Api { status: 503, message: "upstream unavailable".into() });
        }
        for _ in 0..self.stub_batches.get(&post.id).copied().unwrap_or(0) {
            follow_up();
        }
        Ok(self.comments.get(&post.id).cloned().unwrap_or_default())
    }
}

pub fn post(id: &str) -> Post {
    Post {
        id: id.to_string(),
        title: format!("Post {id}"),
        body: format!("Body of {id} 🚀\nsecond line"),
        score: 10,
        comment_count: 0,
        created_utc: 1_700_000_000,
        author: Some("poster".to_string()),
    }
}

pub fn comment(id: &str) -> Comment {
    Comment {
        id: id.to_string(),
        body: format!("reply {id}"),
        score: 1,
        created_utc: 1_700_000_060,
        author: None,
    }
}

/// Data rows of a CSV written by the sink (header dropped), split naively:
/// the fixtures above never produce quoted fields.
pub fn csv_rows(path: &Path) -> Vec<Vec<String>> {
    let text = fs::read_to_string(path).unwrap();
    text.lines().skip(1).map(|l| l.split(',').map(String::from).collect()).collect()
}

/// `id` column of every data row.
pub fn csv_ids(path: &Path) -> Vec<String> {
    csv_rows(path).into_iter().map(|r| r[1].clone()).collect()
}
