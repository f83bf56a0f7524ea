//! Blocking Reddit API client (application-only OAuth).

use crate::config::Credentials;
use crate::error::{IngestError, SourceError};
use crate::source::{Comment, Post, PostPage, PostSource};
use ahash::AHashSet;
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::time::Duration;

const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
const API_BASE: &str = "https://oauth.reddit.com";

/// `/api/morechildren` accepts at most 100 ids per request.
const MORE_CHILDREN_BATCH: usize = 100;

/// Upper bound on follow-up requests spent expanding a single post.
const MAX_FOLLOW_UPS: usize = 500;

/// Authors Reddit reports for removed accounts.
const DELETED_AUTHORS: [&str; 2] = ["[deleted]", "[removed]"];

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct Listing<T> {
    data: ListingData<T>,
}

#[derive(Deserialize)]
struct ListingData<T> {
    #[serde(default)]
    after: Option<String>,
    children: Vec<Thing<T>>,
}

#[derive(Deserialize)]
struct Thing<T> {
    data: T,
}

#[derive(Deserialize)]
struct RawPost {
    id: String,
    title: String,
    #[serde(default)]
    selftext: String,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    num_comments: u64,
    created_utc: f64,
    author: Option<String>,
}

impl From<RawPost> for Post {
    fn from(p: RawPost) -> Self {
        Post {
            id: p.id,
            title: p.title,
            body: p.selftext,
            score: p.score,
            comment_count: p.num_comments,
            created_utc: p.created_utc as i64,
            author: known_author(p.author),
        }
    }
}

fn known_author(author: Option<String>) -> Option<String> {
    author.filter(|a| !DELETED_AUTHORS.contains(&a.as_str()))
}

pub struct RedditClient {
    http: Client,
    token: String,
}

impl RedditClient {
    /// Exchange client credentials for a bearer token.
    pub fn connect(creds: &Credentials) -> Result<Self, IngestError> {
        let http = Client::builder()
            .user_agent(creds.user_agent.clone())
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| IngestError::Authentication(format!("building HTTP client: {e}")))?;

        let resp = http
            .post(TOKEN_URL)
            .basic_auth(&creds.client_id, Some(&creds.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .map_err(|e| IngestError::Authentication(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(IngestError::Authentication(format!("token endpoint returned {status}: {body}")));
        }
        let token: TokenResponse = resp.json().map_err(|e| IngestError::Authentication(e.to_string()))?;
        match (token.access_token, token.error) {
            (Some(t), None) if !t.is_empty() => {
                tracing::debug!("obtained application-only access token");
                Ok(Self { http, token: t })
            }
            (_, err) => Err(IngestError::Authentication(err.unwrap_or_else(|| "empty access token".into()))),
        }
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T, SourceError> {
        let url = format!("{API_BASE}{path}");
        let resp = self.http.get(&url).bearer_auth(&self.token).query(query).query(&[("raw_json", "1")]).send()?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(SourceError::Api { status: status.as_u16(), message: body });
        }
        let bytes = resp.bytes()?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn fetch_more_children(&self, post_id: &str, ids: &[String]) -> Result<Value, SourceError> {
        let link_id = format!("t3_{post_id}");
        let children = ids.join(",");
        let v: Value = self.get_json(
            "/api/morechildren",
            &[("api_type", "json"), ("link_id", link_id.as_str()), ("children", children.as_str())],
        )?;
        Ok(v.pointer("/json/data/things").cloned().unwrap_or_else(|| Value::Array(Vec::new())))
    }
}

impl PostSource for RedditClient {
    fn fetch_new_page(&self, subreddit: &str, after: Option<&str>, page_size: usize) -> Result<PostPage, SourceError> {
        let limit = page_size.to_string();
        let mut query = vec![("limit", limit.as_str())];
        if let Some(a) = after {
            query.push(("after", a));
        }
        let listing: Listing<RawPost> = self.get_json(&format!("/r/{subreddit}/new"), &query)?;
        Ok(PostPage {
            posts: listing.data.children.into_iter().map(|t| t.data.into()).collect(),
            after: listing.data.after.filter(|a| !a.is_empty()),
        })
    }

    /// Loads the tree, then keeps resolving "load more" and "continue this thread"
    /// stubs until none are left. Each stub request is announced via `follow_up`.
    fn expand_comments(&self, post: &Post, follow_up: &mut dyn FnMut()) -> Result<Vec<Comment>, SourceError> {
        let v: Value = self.get_json(&format!("/comments/{}", post.id), &[("limit", "500")])?;
        let root = v.get(1).ok_or_else(|| SourceError::Parse("comment listing missing".into()))?;

        let mut tree = FlatTree::default();
        tree.absorb_listing(root);
        resolve_stubs(&mut tree, follow_up, |req| match req {
            Pending::More(ids) => self.fetch_more_children(&post.id, ids),
            Pending::Continue(parent) => self.get_json(&format!("/comments/{}", post.id), &[("comment", parent.as_str())]),
        })?;
        tracing::debug!(post_id = %post.id, comments = tree.comments.len(), "comment tree expanded");
        Ok(tree.comments)
    }
}

/// One outstanding stub request.
#[derive(Debug, PartialEq)]
enum Pending {
    /// A `/api/morechildren` batch.
    More(Vec<String>),
    /// Replies of this comment, via `/comments/{post}?comment=`.
    Continue(String),
}

/// Drain every stub of `tree` through `fetch`, calling `follow_up` before each
/// request. Stops early, keeping what was gathered, after `MAX_FOLLOW_UPS` requests.
fn resolve_stubs(
    tree: &mut FlatTree,
    follow_up: &mut dyn FnMut(),
    mut fetch: impl FnMut(&Pending) -> Result<Value, SourceError>,
) -> Result<(), SourceError> {
    let mut requests = 0;
    while let Some(req) = tree.next_request() {
        if requests == MAX_FOLLOW_UPS {
            tracing::warn!(
                requests,
                pending_more = tree.more_ids.len(),
                pending_threads = tree.continue_from.len(),
                "comment expansion cut short"
            );
            break;
        }
        requests += 1;
        follow_up();
        let v = fetch(&req)?;
        tree.absorb_response(&req, &v);
    }
    Ok(())
}

/// Breadth-first flattening of a comment tree with its unresolved stubs.
#[derive(Debug, Default)]
struct FlatTree {
    comments: Vec<Comment>,
    seen: AHashSet<String>,
    /// Ids behind "load more" stubs, not yet requested.
    more_ids: VecDeque<String>,
    /// Every id ever queued in `more_ids`; each is asked for at most once.
    requested: AHashSet<String>,
    /// Comment ids whose replies sit behind a "continue this thread" stub.
    continue_from: VecDeque<String>,
    continued: AHashSet<String>,
}

impl FlatTree {
    fn absorb_listing(&mut self, listing: &Value) {
        let mut queue: VecDeque<&Value> = children(listing).iter().collect();
        while let Some(thing) = queue.pop_front() {
            if let Some(data) = self.absorb_thing(thing) {
                if let Some(replies) = data.get("replies") {
                    queue.extend(children(replies).iter());
                }
            }
        }
    }

    /// Next stub to resolve: "load more" batches first, then continued threads.
    fn next_request(&mut self) -> Option<Pending> {
        if !self.more_ids.is_empty() {
            let n = self.more_ids.len().min(MORE_CHILDREN_BATCH);
            return Some(Pending::More(self.more_ids.drain(..n).collect()));
        }
        self.continue_from.pop_front().map(Pending::Continue)
    }

    fn absorb_response(&mut self, req: &Pending, v: &Value) {
        match req {
            Pending::More(_) => self.absorb_things(v.as_array().map(Vec::as_slice).unwrap_or(&[])),
            Pending::Continue(_) => {
                if let Some(sub) = v.get(1) {
                    self.absorb_listing(sub);
                }
            }
        }
    }

    /// `/api/morechildren` returns a flat list; nesting is implied by `parent_id`.
    fn absorb_things(&mut self, things: &[Value]) {
        for thing in things {
            self.absorb_thing(thing);
        }
    }

    /// Record one `t1` or `more` thing. Returns the comment's data for reply traversal.
    fn absorb_thing<'v>(&mut self, thing: &'v Value) -> Option<&'v Value> {
        let data = thing.get("data")?;
        match thing.get("kind").and_then(Value::as_str) {
            Some("t1") => {
                let comment = parse_comment(data)?;
                if self.seen.insert(comment.id.clone()) {
                    self.comments.push(comment);
                }
                Some(data)
            }
            Some("more") => {
                let ids: Vec<String> = data
                    .get("children")
                    .and_then(Value::as_array)
                    .map(|a| a.iter().filter_map(|c| c.as_str().map(String::from)).collect())
                    .unwrap_or_default();
                if ids.is_empty() {
                    if let Some(parent) = data.get("parent_id").and_then(Value::as_str).and_then(|p| p.strip_prefix("t1_")) {
                        if self.continued.insert(parent.to_string()) {
                            self.continue_from.push_back(parent.to_string());
                        }
                    }
                } else {
                    for id in ids {
                        if !self.seen.contains(&id) && self.requested.insert(id.clone()) {
                            self.more_ids.push_back(id);
                        }
                    }
                }
                None
            }
            _ => None,
        }
    }
}

fn children(listing: &Value) -> &[Value] {
    listing.pointer("/data/children").and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[])
}

fn parse_comment(data: &Value) -> Option<Comment> {
    Some(Comment {
        id: data.get("id")?.as_str()?.to_string(),
        body: data.get("body").and_then(Value::as_str).unwrap_or_default().to_string(),
        score: data.get("score").and_then(Value::as_i64).unwrap_or(0),
        created_utc: data.get("created_utc").and_then(Value::as_f64).unwrap_or(0.0) as i64,
        author: known_author(data.get("author").and_then(Value::as_str).map(String::from)),
    })
}
