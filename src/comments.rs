use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::docstore::{Db, FieldUpdate};
use crate::errors::StoreError;

pub const MAX_COMMENT_LEN: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    #[serde(default, skip_serializing)]
    pub id: String,
    pub user_id: String,
    pub display_name: String,
    pub text: String,
    /// Milliseconds since the epoch.
    pub created_at: i64,
    #[serde(default)]
    pub like_count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct Like<'a> {
    user_id: &'a str,
    liked_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeOutcome {
    Liked,
    Unliked,
}

pub fn comments_collection(fixture_id: u32) -> String {
    format!("matches/{fixture_id}/comments")
}

fn comment_path(fixture_id: u32, comment_id: &str) -> String {
    format!("{}/{comment_id}", comments_collection(fixture_id))
}

fn replies_collection(fixture_id: u32, comment_id: &str) -> String {
    format!("{}/replies", comment_path(fixture_id, comment_id))
}

fn like_path(fixture_id: u32, comment_id: &str, uid: &str) -> String {
    format!("{}/likes/{uid}", comment_path(fixture_id, comment_id))
}

fn new_comment(db: &Db, text: &str) -> Result<Option<Comment>, StoreError> {
    let session = db.session();
    let Some(uid) = session.uid() else {
        return Ok(None);
    };
    let text: String = text.trim().chars().take(MAX_COMMENT_LEN).collect();
    if text.is_empty() {
        return Ok(None);
    }
    let created_at = Utc::now().timestamp_millis();
    Ok(Some(Comment {
        id: format!("{created_at}-{uid}"),
        user_id: uid.to_string(),
        display_name: session.display_name().to_string(),
        text,
        created_at,
        like_count: 0,
    }))
}

/// `base`, or `base-N` when a same-millisecond post already took it.
fn free_id(db: &Db, collection: &str, base: &str) -> Result<String, StoreError> {
    let mut id = base.to_string();
    let mut seq = 1;
    while db.get(&format!("{collection}/{id}"))?.is_some() {
        id = format!("{base}-{seq}");
        seq += 1;
    }
    Ok(id)
}

/// Posts a comment on a match. Guests and blank text post nothing.
pub fn post(db: &Db, fixture_id: u32, text: &str) -> Result<Option<Comment>, StoreError> {
    let Some(mut comment) = new_comment(db, text)? else {
        return Ok(None);
    };
    let collection = comments_collection(fixture_id);
    comment.id = free_id(db, &collection, &comment.id)?;
    db.set(&format!("{collection}/{}", comment.id), &comment, false)?;
    tracing::debug!(fixture_id, id = %comment.id, "comment posted");
    Ok(Some(comment))
}

pub fn reply(
    db: &Db,
    fixture_id: u32,
    comment_id: &str,
    text: &str,
) -> Result<Option<Comment>, StoreError> {
    let Some(mut reply) = new_comment(db, text)? else {
        return Ok(None);
    };
    let collection = replies_collection(fixture_id, comment_id);
    reply.id = free_id(db, &collection, &reply.id)?;
    db.set(&format!("{collection}/{}", reply.id), &reply, false)?;
    Ok(Some(reply))
}

/// Likes the comment, or takes the like back if the caller already liked it.
/// The like document and `likeCount` change together.
pub fn toggle_like(db: &Db, fixture_id: u32, comment_id: &str) -> Result<LikeOutcome, StoreError> {
    let Some(uid) = db.session().uid() else {
        return Err(StoreError::PermissionDenied {
            path: comment_path(fixture_id, comment_id),
            operation: crate::errors::Operation::Update,
            payload: None,
        });
    };
    let like = like_path(fixture_id, comment_id, uid);
    let comment = comment_path(fixture_id, comment_id);

    if db.get(&like)?.is_some() {
        db.delete(&like)?;
        db.update(&comment, &[FieldUpdate::increment("likeCount", -1)])?;
        Ok(LikeOutcome::Unliked)
    } else {
        let record = Like {
            user_id: uid,
            liked_at: Utc::now().timestamp_millis(),
        };
        db.set(&like, &record, false)?;
        db.update(&comment, &[FieldUpdate::increment("likeCount", 1)])?;
        Ok(LikeOutcome::Liked)
    }
}

pub fn has_liked(db: &Db, fixture_id: u32, comment_id: &str) -> Result<bool, StoreError> {
    let Some(uid) = db.session().uid() else {
        return Ok(false);
    };
    Ok(db.get(&like_path(fixture_id, comment_id, uid))?.is_some())
}

pub fn list(db: &Db, fixture_id: u32) -> Result<Vec<Comment>, StoreError> {
    newest_first(db, &comments_collection(fixture_id))
}

pub fn replies(db: &Db, fixture_id: u32, comment_id: &str) -> Result<Vec<Comment>, StoreError> {
    newest_first(db, &replies_collection(fixture_id, comment_id))
}

fn newest_first(db: &Db, collection: &str) -> Result<Vec<Comment>, StoreError> {
    let mut out: Vec<Comment> = db
        .list(collection)?
        .into_iter()
        .filter_map(|doc| {
            let mut comment: Comment = doc.decode().ok()?;
            comment.id = doc.id;
            Some(comment)
        })
        .collect();
    out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    Ok(out)
}
