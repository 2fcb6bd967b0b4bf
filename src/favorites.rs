use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::mpsc::Receiver;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::docstore::{Db, FieldUpdate};
use crate::errors::{ErrorSink, StoreError};
use crate::local_store::{GUEST_FAVORITES_KEY, LocalStorage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FavoriteKind {
    League,
    Team,
    Player,
    CrownedTeam,
}

impl FavoriteKind {
    pub fn field(self) -> &'static str {
        match self {
            FavoriteKind::League => "leagues",
            FavoriteKind::Team => "teams",
            FavoriteKind::Player => "players",
            FavoriteKind::CrownedTeam => "crownedTeams",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LeagueFavorite {
    pub name: String,
    #[serde(default)]
    pub logo: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TeamFavorite {
    pub name: String,
    #[serde(default)]
    pub logo: String,
    #[serde(rename = "type", default)]
    pub team_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PlayerFavorite {
    pub name: String,
    #[serde(default)]
    pub photo: String,
    #[serde(default)]
    pub team: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CrownedTeam {
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FavoriteValue {
    League(LeagueFavorite),
    Team(TeamFavorite),
    Player(PlayerFavorite),
    Crowned(CrownedTeam),
}

impl FavoriteValue {
    pub fn kind(&self) -> FavoriteKind {
        match self {
            FavoriteValue::League(_) => FavoriteKind::League,
            FavoriteValue::Team(_) => FavoriteKind::Team,
            FavoriteValue::Player(_) => FavoriteKind::Player,
            FavoriteValue::Crowned(_) => FavoriteKind::CrownedTeam,
        }
    }

    fn to_json(&self) -> Value {
        let value = match self {
            FavoriteValue::League(v) => serde_json::to_value(v),
            FavoriteValue::Team(v) => serde_json::to_value(v),
            FavoriteValue::Player(v) => serde_json::to_value(v),
            FavoriteValue::Crowned(v) => serde_json::to_value(v),
        };
        value.unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Favorites {
    #[serde(default)]
    pub leagues: BTreeMap<u32, LeagueFavorite>,
    #[serde(default)]
    pub teams: BTreeMap<u32, TeamFavorite>,
    #[serde(default)]
    pub players: BTreeMap<u32, PlayerFavorite>,
    #[serde(default)]
    pub crowned_teams: BTreeMap<u32, CrownedTeam>,
}

impl Favorites {
    pub fn contains(&self, kind: FavoriteKind, id: u32) -> bool {
        match kind {
            FavoriteKind::League => self.leagues.contains_key(&id),
            FavoriteKind::Team => self.teams.contains_key(&id),
            FavoriteKind::Player => self.players.contains_key(&id),
            FavoriteKind::CrownedTeam => self.crowned_teams.contains_key(&id),
        }
    }

    pub fn insert(&mut self, id: u32, value: FavoriteValue) {
        match value {
            FavoriteValue::League(v) => {
                self.leagues.insert(id, v);
            }
            FavoriteValue::Team(v) => {
                self.teams.insert(id, v);
            }
            FavoriteValue::Player(v) => {
                self.players.insert(id, v);
            }
            FavoriteValue::Crowned(v) => {
                self.crowned_teams.insert(id, v);
            }
        }
    }

    pub fn remove(&mut self, kind: FavoriteKind, id: u32) -> bool {
        match kind {
            FavoriteKind::League => self.leagues.remove(&id).is_some(),
            FavoriteKind::Team => self.teams.remove(&id).is_some(),
            FavoriteKind::Player => self.players.remove(&id).is_some(),
            FavoriteKind::CrownedTeam => self.crowned_teams.remove(&id).is_some(),
        }
    }

    pub fn len(&self) -> usize {
        self.leagues.len() + self.teams.len() + self.players.len() + self.crowned_teams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Missing or malformed documents read as "no favorites".
    pub fn from_snapshot(snapshot: Option<&Value>) -> Self {
        snapshot
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }
}

pub fn favorites_path(uid: &str) -> String {
    format!("users/{uid}/favorites/data")
}

/// Entities guests may favorite without an account.
#[derive(Debug, Clone)]
pub struct PopularCatalog {
    entries: HashSet<(FavoriteKind, u32)>,
}

impl PopularCatalog {
    pub fn new(entries: impl IntoIterator<Item = (FavoriteKind, u32)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    pub fn contains(&self, kind: FavoriteKind, id: u32) -> bool {
        self.entries.contains(&(kind, id))
    }

    pub fn ids(&self, kind: FavoriteKind) -> Vec<u32> {
        let mut ids: Vec<u32> = self
            .entries
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, id)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }
}

impl Default for PopularCatalog {
    fn default() -> Self {
        const LEAGUES: &[u32] = &[1, 2, 3, 39, 61, 78, 135, 140];
        const TEAMS: &[u32] = &[33, 40, 42, 49, 50, 85, 157, 496, 505, 529, 530, 541];
        const PLAYERS: &[u32] = &[154, 278, 306, 874, 1100];
        let entries = LEAGUES
            .iter()
            .map(|id| (FavoriteKind::League, *id))
            .chain(TEAMS.iter().map(|id| (FavoriteKind::Team, *id)))
            .chain(TEAMS.iter().map(|id| (FavoriteKind::CrownedTeam, *id)))
            .chain(PLAYERS.iter().map(|id| (FavoriteKind::Player, *id)));
        Self::new(entries)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    NotPopular,
    NoLocalStorage,
    NotFavorited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Added,
    Removed,
    Updated,
    Rejected(RejectReason),
    /// The write failed; local state is back to what it was before the call.
    RolledBack,
}

/// Single read/toggle path for favorites, signed in or not.
///
/// Changes are applied locally first, then only the changed key is written.
/// A failed write restores the previous local state and is reported on the sink.
pub struct FavoritesSync {
    db: Db,
    local: Option<LocalStorage>,
    popular: PopularCatalog,
    sink: Arc<dyn ErrorSink>,
    state: Favorites,
    feed: Option<Receiver<Option<Value>>>,
}

impl FavoritesSync {
    pub fn new(
        db: Db,
        local: Option<LocalStorage>,
        popular: PopularCatalog,
        sink: Arc<dyn ErrorSink>,
    ) -> Self {
        Self {
            db,
            local,
            popular,
            sink,
            state: Favorites::default(),
            feed: None,
        }
    }

    pub fn favorites(&self) -> &Favorites {
        &self.state
    }

    pub fn popular(&self) -> &PopularCatalog {
        &self.popular
    }

    pub fn is_guest(&self) -> bool {
        !self.db.session().is_signed_in()
    }

    pub fn is_favorite(&self, kind: FavoriteKind, id: u32) -> bool {
        self.state.contains(kind, id)
    }

    /// Signed in: follow the remote document. Guest: load the local snapshot.
    pub fn subscribe(&mut self) -> Result<(), StoreError> {
        match self.db.session().uid().map(favorites_path) {
            Some(path) => {
                let rx = self.db.subscribe(&path)?;
                self.feed = Some(rx);
                self.poll();
            }
            None => {
                self.state = self
                    .local
                    .as_ref()
                    .and_then(|local| local.get::<Favorites>(GUEST_FAVORITES_KEY))
                    .unwrap_or_default();
            }
        }
        Ok(())
    }

    /// Applies the newest pending remote snapshot, if any.
    pub fn poll(&mut self) -> bool {
        let Some(rx) = self.feed.as_ref() else {
            return false;
        };
        let mut latest = None;
        while let Ok(snapshot) = rx.try_recv() {
            latest = Some(snapshot);
        }
        match latest {
            Some(snapshot) => {
                self.apply_snapshot(snapshot.as_ref());
                true
            }
            None => false,
        }
    }

    pub fn apply_snapshot(&mut self, snapshot: Option<&Value>) {
        self.state = Favorites::from_snapshot(snapshot);
    }

    pub fn toggle(&mut self, id: u32, value: FavoriteValue) -> ToggleOutcome {
        let kind = value.kind();
        if self.is_guest() && !self.popular.contains(kind, id) {
            return ToggleOutcome::Rejected(RejectReason::NotPopular);
        }
        if self.is_guest() && self.local.is_none() {
            return ToggleOutcome::Rejected(RejectReason::NoLocalStorage);
        }

        let previous = self.state.clone();
        let field = format!("{}.{id}", kind.field());
        let (update, outcome) = if self.state.remove(kind, id) {
            (FieldUpdate::delete(field), ToggleOutcome::Removed)
        } else {
            let json = value.to_json();
            self.state.insert(id, value);
            (FieldUpdate::set(field, json), ToggleOutcome::Added)
        };
        self.commit(previous, update, outcome)
    }

    /// Edits the note on an already crowned team.
    pub fn set_crowned_note(&mut self, id: u32, note: &str) -> ToggleOutcome {
        let Some(current) = self.state.crowned_teams.get(&id) else {
            return ToggleOutcome::Rejected(RejectReason::NotFavorited);
        };
        if current.note == note {
            return ToggleOutcome::Updated;
        }
        if self.is_guest() && self.local.is_none() {
            return ToggleOutcome::Rejected(RejectReason::NoLocalStorage);
        }
        let previous = self.state.clone();
        self.state.crowned_teams.insert(
            id,
            CrownedTeam {
                note: note.to_string(),
            },
        );
        let update = FieldUpdate::set(
            format!("{}.{id}.note", FavoriteKind::CrownedTeam.field()),
            Value::String(note.to_string()),
        );
        self.commit(previous, update, ToggleOutcome::Updated)
    }

    fn commit(
        &mut self,
        previous: Favorites,
        update: FieldUpdate,
        outcome: ToggleOutcome,
    ) -> ToggleOutcome {
        match self.db.session().uid().map(favorites_path) {
            Some(path) => {
                if let Err(err) = self.db.update(&path, &[update]) {
                    tracing::warn!(%path, error = %err, "favorite write failed, rolling back");
                    self.state = previous;
                    self.sink.report(err);
                    return ToggleOutcome::RolledBack;
                }
            }
            None => {
                let Some(local) = self.local.as_ref() else {
                    self.state = previous;
                    return ToggleOutcome::Rejected(RejectReason::NoLocalStorage);
                };
                if let Err(err) = local.set(GUEST_FAVORITES_KEY, &self.state) {
                    tracing::warn!(error = %err, "guest favorites write failed, rolling back");
                    self.state = previous;
                    self.sink.report(StoreError::LocalWrite {
                        key: GUEST_FAVORITES_KEY.to_string(),
                        reason: format!("{err:#}"),
                    });
                    return ToggleOutcome::RolledBack;
                }
            }
        }
        outcome
    }
}
