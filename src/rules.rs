use serde_json::Value;

use crate::errors::{Operation, StoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub uid: String,
    pub display_name: String,
}

/// Who is talking to the store. `None` identity means a guest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub identity: Option<Identity>,
    pub admin: bool,
}

impl Session {
    pub fn guest() -> Self {
        Self::default()
    }

    pub fn user(uid: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            identity: Some(Identity {
                uid: uid.into(),
                display_name: display_name.into(),
            }),
            admin: false,
        }
    }

    pub fn admin(uid: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            admin: true,
            ..Self::user(uid, display_name)
        }
    }

    pub fn uid(&self) -> Option<&str> {
        self.identity.as_ref().map(|i| i.uid.as_str())
    }

    pub fn display_name(&self) -> &str {
        self.identity
            .as_ref()
            .map(|i| i.display_name.as_str())
            .unwrap_or("Guest")
    }

    pub fn is_signed_in(&self) -> bool {
        self.identity.is_some()
    }
}

/// Access rules for every document path.
///
/// Reads are public except a user's favorites. Writes are owner-only under
/// `users/{uid}`, `predictions/{uid}_{fixture}` and comment likes; any signed-in
/// user may post comments and replies; everything else is admin-only.
pub fn authorize(
    session: &Session,
    operation: Operation,
    path: &str,
    payload: Option<&Value>,
) -> Result<(), StoreError> {
    let segments: Vec<&str> = path.split('/').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    if session.admin && session.is_signed_in() {
        return Ok(());
    }

    let allowed = match operation {
        Operation::Get | Operation::List => can_read(session, &segments),
        Operation::Set | Operation::Update | Operation::Delete => {
            can_write(session, operation, &segments, payload)
        }
    };
    if allowed {
        return Ok(());
    }
    Err(StoreError::PermissionDenied {
        path: path.to_string(),
        operation,
        payload: payload.cloned(),
    })
}

fn can_read(session: &Session, segments: &[&str]) -> bool {
    match segments {
        ["users", uid, "favorites", ..] => session.uid() == Some(*uid),
        _ => true,
    }
}

fn can_write(
    session: &Session,
    operation: Operation,
    segments: &[&str],
    payload: Option<&Value>,
) -> bool {
    let Some(uid) = session.uid() else {
        return false;
    };
    match segments {
        ["users", owner, ..] => *owner == uid && !touches_role(payload),
        ["predictions", doc_id] => {
            let Some((owner, fixture)) = doc_id.rsplit_once('_') else {
                return false;
            };
            let Ok(fixture_id) = fixture.parse::<u32>() else {
                return false;
            };
            owner == uid
                && operation != Operation::Delete
                && prediction_matches_key(operation, payload, uid, fixture_id)
                && !touches_points(payload)
        }
        ["matches", _, "comments", _, "likes", liker] => *liker == uid,
        ["matches", _, "comments", _] | ["matches", _, "comments", _, "replies", _] => {
            match operation {
                Operation::Set => payload_owner_matches(payload, uid),
                Operation::Update => only_like_count(payload),
                _ => false,
            }
        }
        _ => false,
    }
}

fn payload_owner_matches(payload: Option<&Value>, uid: &str) -> bool {
    match payload.and_then(|p| p.get("userId")) {
        Some(Value::String(owner)) => owner == uid,
        Some(_) => false,
        None => true,
    }
}

/// A prediction body must name the same user and fixture as its document id.
/// The first write has to carry both, with numeric goals.
fn prediction_matches_key(
    operation: Operation,
    payload: Option<&Value>,
    uid: &str,
    fixture_id: u32,
) -> bool {
    let Some(body) = payload else {
        return false;
    };
    if operation == Operation::Set
        && (body.get("userId").is_none() || body.get("fixtureId").is_none())
    {
        return false;
    }
    let fixture_ok = body
        .get("fixtureId")
        .is_none_or(|v| v.as_u64() == Some(u64::from(fixture_id)));
    let goals_ok = ["homeGoals", "awayGoals"].iter().all(|field| {
        body.get(*field)
            .is_none_or(|v| v.as_u64().is_some_and(|goals| goals <= u64::from(u8::MAX)))
    });
    fixture_ok && goals_ok && payload_owner_matches(payload, uid)
}

fn touches_role(payload: Option<&Value>) -> bool {
    payload.is_some_and(|p| p.get("role").is_some())
}

fn touches_points(payload: Option<&Value>) -> bool {
    payload.is_some_and(|p| p.get("points").is_some_and(|v| !v.is_null()))
}

/// Non-owners may only bump `likeCount` by one in either direction.
fn only_like_count(payload: Option<&Value>) -> bool {
    let Some(obj) = payload.and_then(|p| p.as_object()) else {
        return false;
    };
    obj.len() == 1
        && obj
            .get("likeCount")
            .and_then(|v| v.get("increment"))
            .and_then(Value::as_i64)
            .is_some_and(|by| by == 1 || by == -1)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn favorites_are_private_to_their_owner() {
        let alice = Session::user("alice", "Alice");
        let bob = Session::user("bob", "Bob");
        let path = "users/alice/favorites/data";
        assert!(authorize(&alice, Operation::Get, path, None).is_ok());
        let err = authorize(&bob, Operation::Get, path, None).unwrap_err();
        assert!(err.is_permission_denied());
    }

    #[test]
    fn users_cannot_grant_themselves_points() {
        let alice = Session::user("alice", "Alice");
        let payload = json!({"userId": "alice", "homeGoals": 1, "awayGoals": 0, "points": 3});
        let err = authorize(&alice, Operation::Set, "predictions/alice_10", Some(&payload))
            .unwrap_err();
        match err {
            StoreError::PermissionDenied {
                path,
                operation,
                payload,
            } => {
                assert_eq!(path, "predictions/alice_10");
                assert_eq!(operation, Operation::Set);
                assert!(payload.is_some());
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn predictions_for_other_users_are_rejected() {
        let alice = Session::user("alice", "Alice");
        let payload = json!({"userId": "bob", "homeGoals": 1, "awayGoals": 0});
        assert!(authorize(&alice, Operation::Set, "predictions/bob_10", Some(&payload)).is_err());
        assert!(
            authorize(&alice, Operation::Set, "predictions/alice_10", Some(&payload)).is_err()
        );
    }

    #[test]
    fn prediction_bodies_must_match_their_key() {
        let alice = Session::user("alice", "Alice");
        let path = "predictions/alice_10";
        let full = json!({"userId": "alice", "fixtureId": 10, "homeGoals": 2, "awayGoals": 1});
        assert!(authorize(&alice, Operation::Set, path, Some(&full)).is_ok());

        let retargeted = json!({"fixtureId": 11});
        assert!(authorize(&alice, Operation::Update, path, Some(&retargeted)).is_err());
        let cleared = json!({"fixtureId": null});
        assert!(authorize(&alice, Operation::Update, path, Some(&cleared)).is_err());
        let missing_owner = json!({"fixtureId": 10, "homeGoals": 1, "awayGoals": 0});
        assert!(authorize(&alice, Operation::Set, path, Some(&missing_owner)).is_err());
        let text_goals = json!({"homeGoals": "x"});
        assert!(authorize(&alice, Operation::Update, path, Some(&text_goals)).is_err());
        let score_only = json!({"homeGoals": 3, "awayGoals": 0});
        assert!(authorize(&alice, Operation::Update, path, Some(&score_only)).is_ok());
        assert!(authorize(&alice, Operation::Set, "predictions/alice_x", Some(&full)).is_err());
    }

    #[test]
    fn like_counts_only_move_by_one() {
        let bob = Session::user("bob", "Bob");
        let path = "matches/3/comments/c1";
        let up = json!({"likeCount": {"increment": 1}});
        let down = json!({"likeCount": {"increment": -1}});
        assert!(authorize(&bob, Operation::Update, path, Some(&up)).is_ok());
        assert!(authorize(&bob, Operation::Update, path, Some(&down)).is_ok());

        let jump = json!({"likeCount": {"increment": 50}});
        assert!(authorize(&bob, Operation::Update, path, Some(&jump)).is_err());
        let overwrite = json!({"likeCount": 9000});
        assert!(authorize(&bob, Operation::Update, path, Some(&overwrite)).is_err());
    }

    #[test]
    fn leaderboard_writes_need_admin() {
        let alice = Session::user("alice", "Alice");
        let admin = Session::admin("root", "Root");
        let payload = json!({"totalPoints": 4});
        assert!(authorize(&alice, Operation::Set, "leaderboard/alice", Some(&payload)).is_err());
        assert!(authorize(&admin, Operation::Set, "leaderboard/alice", Some(&payload)).is_ok());
    }

    #[test]
    fn guests_cannot_write_anything() {
        let guest = Session::guest();
        let payload = json!({"text": "hi"});
        assert!(
            authorize(&guest, Operation::Set, "matches/1/comments/c1", Some(&payload)).is_err()
        );
    }

    #[test]
    fn empty_segments_are_invalid() {
        let alice = Session::user("alice", "Alice");
        let err = authorize(&alice, Operation::Get, "users//favorites", None).unwrap_err();
        assert!(matches!(err, StoreError::InvalidPath(_)));
    }
}
