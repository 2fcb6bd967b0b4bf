use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::docstore::{Db, DocumentStore};
use crate::errors::StoreError;
use crate::favorites::FavoriteKind;
use crate::leaderboard::{DAILY_PICKS, DailyPicks};
use crate::rules::Session;

pub const PINNED_MATCHES: &str = "pinnedIraqiMatches";
pub const MANAGED_COMPETITIONS: &str = "managedCompetitions";
pub const ADMIN_FAVORITES: &str = "adminFavorites";

/// Entities whose display name an admin can override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    League,
    Team,
    Player,
}

impl EntityKind {
    pub fn collection(self) -> &'static str {
        match self {
            EntityKind::League => "leagueCustomizations",
            EntityKind::Team => "teamCustomizations",
            EntityKind::Player => "playerCustomizations",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customization {
    pub name: String,
}

/// Builds the store session for a signed-in user, reading their role from
/// `users/{uid}`.
pub fn session_for(store: Arc<dyn DocumentStore>, uid: &str, display_name: &str) -> Session {
    let profile = store.get(&format!("users/{uid}")).ok().flatten();
    let admin = profile
        .as_ref()
        .and_then(|p| p.get("role"))
        .and_then(|r| r.as_str())
        == Some("admin");
    if admin {
        Session::admin(uid, display_name)
    } else {
        Session::user(uid, display_name)
    }
}

pub fn rename_entity(db: &Db, kind: EntityKind, id: u32, name: &str) -> Result<(), StoreError> {
    let path = format!("{}/{id}", kind.collection());
    let name = name.trim();
    if name.is_empty() {
        return db.delete(&path);
    }
    db.set(
        &path,
        &Customization {
            name: name.to_string(),
        },
        false,
    )?;
    tracing::info!(%path, name, "entity renamed");
    Ok(())
}

/// The admin override when one exists, the API name otherwise.
pub fn display_name(db: &Db, kind: EntityKind, id: u32, api_name: &str) -> String {
    db.get_as::<Customization>(&format!("{}/{id}", kind.collection()))
        .ok()
        .flatten()
        .map(|c| c.name)
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| api_name.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinnedMatch {
    pub fixture_id: u32,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub pinned_at: i64,
}

pub fn pin_match(db: &Db, fixture_id: u32, label: &str) -> Result<(), StoreError> {
    let entry = PinnedMatch {
        fixture_id,
        label: label.to_string(),
        pinned_at: Utc::now().timestamp_millis(),
    };
    db.set(&format!("{PINNED_MATCHES}/{fixture_id}"), &entry, false)
}

pub fn unpin_match(db: &Db, fixture_id: u32) -> Result<(), StoreError> {
    db.delete(&format!("{PINNED_MATCHES}/{fixture_id}"))
}

/// Pinned matches, most recently pinned first.
pub fn pinned_matches(db: &Db) -> Result<Vec<PinnedMatch>, StoreError> {
    let mut pinned: Vec<PinnedMatch> = db
        .list(PINNED_MATCHES)?
        .iter()
        .filter_map(|doc| doc.decode().ok())
        .collect();
    pinned.sort_by(|a, b| b.pinned_at.cmp(&a.pinned_at));
    Ok(pinned)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedCompetition {
    pub league_id: u32,
    pub name: String,
    #[serde(default)]
    pub logo: String,
    #[serde(default)]
    pub order: u32,
}

pub fn add_managed_competition(db: &Db, competition: &ManagedCompetition) -> Result<(), StoreError> {
    db.set(
        &format!("{MANAGED_COMPETITIONS}/{}", competition.league_id),
        competition,
        false,
    )
}

pub fn remove_managed_competition(db: &Db, league_id: u32) -> Result<(), StoreError> {
    db.delete(&format!("{MANAGED_COMPETITIONS}/{league_id}"))
}

/// Managed competitions in display order.
pub fn managed_competitions(db: &Db) -> Result<Vec<ManagedCompetition>, StoreError> {
    let mut list: Vec<ManagedCompetition> = db
        .list(MANAGED_COMPETITIONS)?
        .iter()
        .filter_map(|doc| doc.decode().ok())
        .collect();
    list.sort_by(|a, b| a.order.cmp(&b.order).then(a.league_id.cmp(&b.league_id)));
    Ok(list)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminFavorite {
    pub kind: String,
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub image: String,
}

pub fn admin_favorite_path(kind: FavoriteKind, id: u32) -> String {
    format!("{ADMIN_FAVORITES}/{}_{id}", kind.field())
}

pub fn promote_favorite(
    db: &Db,
    kind: FavoriteKind,
    id: u32,
    name: &str,
    image: &str,
) -> Result<(), StoreError> {
    let entry = AdminFavorite {
        kind: kind.field().to_string(),
        id,
        name: name.to_string(),
        image: image.to_string(),
    };
    db.set(&admin_favorite_path(kind, id), &entry, false)
}

pub fn demote_favorite(db: &Db, kind: FavoriteKind, id: u32) -> Result<(), StoreError> {
    db.delete(&admin_favorite_path(kind, id))
}

pub fn admin_favorites(db: &Db, kind: FavoriteKind) -> Result<Vec<AdminFavorite>, StoreError> {
    Ok(db
        .query(ADMIN_FAVORITES, "kind", &Value::from(kind.field()))?
        .iter()
        .filter_map(|doc| doc.decode().ok())
        .collect())
}

/// Replaces the fixtures open for prediction on `date` (`YYYY-MM-DD`).
pub fn set_daily_picks(db: &Db, date: &str, fixture_ids: &[u32]) -> Result<DailyPicks, StoreError> {
    let mut ids = fixture_ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    let picks = DailyPicks {
        date: date.to_string(),
        fixture_ids: ids,
    };
    db.set(&format!("{DAILY_PICKS}/{date}"), &picks, false)?;
    tracing::info!(date, count = picks.fixture_ids.len(), "daily picks saved");
    Ok(picks)
}
