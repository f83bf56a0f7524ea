//! Flat, append-only records produced for each new post and comment.

use crate::normalize::clean_text;
use crate::source::{Comment, Post};
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq)]
pub struct PostRecord {
    pub id: String,
    pub title: String,
    pub score: i64,
    pub comment_count: u64,
    pub created_at: OffsetDateTime,
    pub author: Option<String>,
    pub body: String,
}

/// A comment, denormalized with its parent's title and cleaned body.
#[derive(Clone, Debug, PartialEq)]
pub struct CommentRecord {
    pub id: String,
    pub post_id: String,
    pub post_title: String,
    pub post_body: String,
    pub body: String,
    pub author: Option<String>,
    pub score: i64,
    pub created_at: OffsetDateTime,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Record {
    Post(PostRecord),
    Comment(CommentRecord),
}

impl Record {
    pub fn id(&self) -> &str {
        match self {
            Record::Post(p) => &p.id,
            Record::Comment(c) => &c.id,
        }
    }

    pub fn is_post(&self) -> bool {
        matches!(self, Record::Post(_))
    }
}

impl PostRecord {
    pub fn from_post(post: &Post) -> Self {
        Self {
            id: post.id.clone(),
            title: post.title.clone(),
            score: post.score,
            comment_count: post.comment_count,
            created_at: datetime_from_epoch(post.created_utc),
            author: post.author.clone(),
            body: clean_text(&post.body),
        }
    }
}

impl CommentRecord {
    pub fn from_comment(post: &Post, comment: &Comment) -> Self {
        Self {
            id: comment.id.clone(),
            post_id: post.id.clone(),
            post_title: post.title.clone(),
            post_body: clean_text(&post.body),
            body: clean_text(&comment.body),
            author: comment.author.clone(),
            score: comment.score,
            created_at: datetime_from_epoch(comment.created_utc),
        }
    }
}

/// Out-of-range timestamps clamp to the Unix epoch.
fn datetime_from_epoch(ts: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(ts).unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn post() -> Post {
        Post {
            id: "p1".into(),
            title: "Weekly thread: <b>Rust</b> 🚀".into(),
            body: "Line one\nLine two 🚀".into(),
            score: 12,
            comment_count: 3,
            created_utc: 1_136_073_600,
            author: None,
        }
    }

    #[test]
    fn post_record_cleans_body_but_not_title() {
        let r = PostRecord::from_post(&post());
        assert_eq!(r.body, "Line one Line two");
        assert_eq!(r.title, "Weekly thread: <b>Rust</b> 🚀");
        assert_eq!(r.created_at, datetime!(2006-01-01 0:00 UTC));
        assert_eq!(r.author, None);
    }

    #[test]
    fn comment_record_copies_parent_context() {
        let c = Comment {
            id: "c1".into(),
            body: "Nice!! 👍".into(),
            score: -2,
            created_utc: 1_136_073_660,
            author: Some("alice".into()),
        };
        let r = CommentRecord::from_comment(&post(), &c);
        assert_eq!(r.post_id, "p1");
        assert_eq!(r.post_body, "Line one Line two");
        assert_eq!(r.body, "Nice!!");
        assert_eq!(r.author.as_deref(), Some("alice"));
        assert_eq!(r.created_at, datetime!(2006-01-01 0:01 UTC));
        assert_eq!(Record::Comment(r).id(), "c1");
    }
}
