//! Append-only CSV table, one file per subreddit.
//!
//! Posts and comments share one flat schema (the union of both record kinds plus a
//! `kind` column) so mixed rows stay rectangular. The header is written only when
//! the file is created.

use crate::error::IngestError;
use crate::record::Record;
use crate::util::append_with_backoff;
use std::borrow::Cow;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use time::macros::format_description;
use time::OffsetDateTime;

pub const HEADER: [&str; 13] = [
    "kind",
    "id",
    "post_id",
    "title",
    "score",
    "num_comments",
    "created_utc",
    "author",
    "post_text",
    "comment_text",
    "comment_author",
    "comment_score",
    "comment_created_utc",
];

/// Rendered in place of a missing (deleted) author.
pub const MISSING_AUTHOR: &str = "N/A";

#[derive(Clone, Debug)]
pub struct CsvSink {
    output_dir: PathBuf,
}

impl CsvSink {
    pub fn new(output_dir: impl AsRef<Path>) -> Self {
        Self { output_dir: output_dir.as_ref().to_path_buf() }
    }

    /// Deterministic table path for `subreddit`.
    pub fn destination(&self, subreddit: &str) -> PathBuf {
        self.output_dir.join(format!("reddit_{subreddit}_posts.csv"))
    }

    /// Append exactly `records` to the subreddit's table. An empty batch touches nothing.
    pub fn append(&self, records: &[Record], subreddit: &str) -> Result<PathBuf, IngestError> {
        let path = self.destination(subreddit);
        if records.is_empty() {
            return Ok(path);
        }
        let sink_err = |e: std::io::Error| IngestError::SinkWrite { path: path.display().to_string(), message: e.to_string() };

        if !self.output_dir.as_os_str().is_empty() {
            std::fs::create_dir_all(&self.output_dir).map_err(sink_err)?;
        }
        let needs_header = std::fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(true);
        let f = append_with_backoff(&path).map_err(sink_err)?;
        let mut w = BufWriter::new(f);
        if needs_header {
            write_row(&mut w, HEADER.iter().map(|h| Cow::Borrowed(*h))).map_err(sink_err)?;
        }
        for r in records {
            write_row(&mut w, to_row(r).into_iter()).map_err(sink_err)?;
        }
        w.flush().map_err(sink_err)?;
        Ok(path)
    }
}

fn to_row(record: &Record) -> [Cow<'_, str>; 13] {
    let author = |a: &Option<String>| Cow::Owned(a.clone().unwrap_or_else(|| MISSING_AUTHOR.to_string()));
    let empty = || Cow::Borrowed("");
    match record {
        Record::Post(p) => [
            Cow::Borrowed("post"),
            Cow::Borrowed(p.id.as_str()),
            empty(),
            Cow::Borrowed(p.title.as_str()),
            Cow::Owned(p.score.to_string()),
            Cow::Owned(p.comment_count.to_string()),
            Cow::Owned(format_ts(p.created_at)),
            author(&p.author),
            Cow::Borrowed(p.body.as_str()),
            empty(),
            empty(),
            empty(),
            empty(),
        ],
        Record::Comment(c) => [
            Cow::Borrowed("comment"),
            Cow::Borrowed(c.id.as_str()),
            Cow::Borrowed(c.post_id.as_str()),
            Cow::Borrowed(c.post_title.as_str()),
            empty(),
            empty(),
            empty(),
            empty(),
            Cow::Borrowed(c.post_body.as_str()),
            Cow::Borrowed(c.body.as_str()),
            author(&c.author),
            Cow::Owned(c.score.to_string()),
            Cow::Owned(format_ts(c.created_at)),
        ],
    }
}

fn format_ts(ts: OffsetDateTime) -> String {
    ts.format(format_description!("[year]-[month]-[day] [hour]:[minute]:[second]")).unwrap_or_else(|_| ts.unix_timestamp().to_string())
}

/// RFC 4180: quote fields holding a delimiter, quote or line break; double inner quotes.
fn escape_field(s: &str) -> Cow<'_, str> {
    if s.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", s.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(s)
    }
}

fn write_row<'a, W: Write>(w: &mut W, fields: impl Iterator<Item = Cow<'a, str>>) -> std::io::Result<()> {
    for (i, field) in fields.enumerate() {
        if i > 0 {
            w.write_all(b",")?;
        }
        w.write_all(escape_field(&field).as_bytes())?;
    }
    w.write_all(b"\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{CommentRecord, PostRecord};
    use time::macros::datetime;

    fn post_record() -> Record {
        Record::Post(PostRecord {
            id: "p1".into(),
            title: "Hello, \"world\"".into(),
            score: 5,
            comment_count: 1,
            created_at: datetime!(2024-03-01 12:30:05 UTC),
            author: None,
            body: "body".into(),
        })
    }

    fn comment_record() -> Record {
        Record::Comment(CommentRecord {
            id: "c1".into(),
            post_id: "p1".into(),
            post_title: "t".into(),
            post_body: "body".into(),
            body: "reply".into(),
            author: Some("alice".into()),
            score: -1,
            created_at: datetime!(2024-03-01 12:31:00 UTC),
        })
    }

    #[test]
    fn escapes_only_when_needed() {
        assert_eq!(escape_field("plain"), "plain");
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn header_written_once_across_appends() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path().join("out"));
        let path = sink.append(&[post_record()], "rust").unwrap();
        sink.append(&[comment_record()], "rust").unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], HEADER.join(","));
        assert_eq!(lines[1], "post,p1,,\"Hello, \"\"world\"\"\",5,1,2024-03-01 12:30:05,N/A,body,,,,");
        assert_eq!(lines[2], "comment,c1,p1,t,,,,,body,reply,alice,-1,2024-03-01 12:31:00");
    }

    #[test]
    fn empty_batch_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path());
        let path = sink.append(&[], "rust").unwrap();
        assert!(!path.exists());
        assert_eq!(path.file_name().unwrap(), "reddit_rust_posts.csv");
    }

    #[test]
    fn unwritable_destination_is_a_sink_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, "x").unwrap();
        let err = CsvSink::new(&blocker).append(&[post_record()], "rust").unwrap_err();
        assert!(matches!(err, IngestError::SinkWrite { .. }));
    }
}
