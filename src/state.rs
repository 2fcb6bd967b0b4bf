use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, Utc};

use crate::admin::{ManagedCompetition, PinnedMatch};
use crate::comments::Comment;
use crate::debounce::Debouncer;
use crate::errors::StoreError;
use crate::favorites::{FavoriteKind, FavoriteValue, FavoritesSync, RejectReason, ToggleOutcome};
use crate::football_api::{
    Competition, Country, Fixture, FixtureOdds, PlayerSummary, StandingRow, TeamRef,
};
use crate::leaderboard::{DailyPicks, LeaderboardEntry};
use crate::navigation::{Navigator, Screen, ScreenParams};
use crate::news::NewsItem;
use crate::predictions::{Prediction, PredictionInput};

pub const SEARCH_DEBOUNCE: Duration = Duration::from_millis(400);
pub const SEARCH_MIN_CHARS: usize = 3;
const MAX_LOGS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Search,
    PredictHome,
    PredictAway,
    Comment,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResults {
    pub query: String,
    pub teams: Vec<TeamRef>,
    pub players: Vec<PlayerSummary>,
    pub competitions: Vec<Competition>,
}

impl SearchResults {
    pub fn is_empty(&self) -> bool {
        self.teams.is_empty() && self.players.is_empty() && self.competitions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.teams.len() + self.players.len() + self.competitions.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdminView {
    pub pinned: Vec<PinnedMatch>,
    pub managed: Vec<ManagedCompetition>,
    pub picks: DailyPicks,
}

pub struct AppState {
    pub nav: Navigator,
    pub selected: usize,
    pub input_mode: InputMode,
    pub fixtures_date: NaiveDate,
    pub fixtures: Vec<Fixture>,
    pub fixtures_loading: bool,
    pub competitions: Vec<Competition>,
    pub countries: Vec<Country>,
    pub league_teams: HashMap<u32, Vec<TeamRef>>,
    pub standings: HashMap<u32, Vec<StandingRow>>,
    pub team_fixtures: HashMap<u32, Vec<Fixture>>,
    pub news: Vec<NewsItem>,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub comments: HashMap<u32, Vec<Comment>>,
    pub comment_draft: String,
    pub odds: HashMap<u32, FixtureOdds>,
    pub predictions: HashMap<u32, Prediction>,
    pub prediction_inputs: HashMap<u32, PredictionInput>,
    pub search_query: String,
    pub search_debounce: Debouncer<String>,
    pub search_results: SearchResults,
    pub admin: AdminView,
    pub favorites: Option<FavoritesSync>,
    pub logs: VecDeque<String>,
    pub help_overlay: bool,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(Utc::now().date_naive())
    }
}

impl AppState {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            nav: Navigator::new(Screen::Matches),
            selected: 0,
            input_mode: InputMode::Normal,
            fixtures_date: today,
            fixtures: Vec::new(),
            fixtures_loading: false,
            competitions: Vec::new(),
            countries: Vec::new(),
            league_teams: HashMap::new(),
            standings: HashMap::new(),
            team_fixtures: HashMap::new(),
            news: Vec::new(),
            leaderboard: Vec::new(),
            comments: HashMap::new(),
            comment_draft: String::new(),
            odds: HashMap::new(),
            predictions: HashMap::new(),
            prediction_inputs: HashMap::new(),
            search_query: String::new(),
            search_debounce: Debouncer::new(SEARCH_DEBOUNCE),
            search_results: SearchResults::default(),
            admin: AdminView::default(),
            favorites: None,
            logs: VecDeque::new(),
            help_overlay: false,
        }
    }

    pub fn with_favorites(mut self, mut favorites: FavoritesSync) -> Self {
        if let Err(err) = favorites.subscribe() {
            self.push_log(format!("[WARN] Favorites unavailable: {err}"));
        }
        self.favorites = Some(favorites);
        self
    }

    pub fn push_log(&mut self, msg: impl Into<String>) {
        self.logs.push_back(msg.into());
        while self.logs.len() > MAX_LOGS {
            self.logs.pop_front();
        }
    }

    pub fn screen(&self) -> Screen {
        self.nav.top().screen
    }

    pub fn navigate(&mut self, screen: Screen, params: ScreenParams, now: Instant) {
        let before = self.nav.top().key.clone();
        self.nav.navigate(screen, params, now);
        if self.nav.top().key != before {
            self.selected = 0;
            self.input_mode = InputMode::Normal;
        }
    }

    pub fn go_back(&mut self, now: Instant) {
        self.nav.go_back(now);
        self.input_mode = InputMode::Normal;
    }

    /// Settles pending pops and remote favorites; call once per frame.
    pub fn tick(&mut self, now: Instant) {
        if self.nav.tick(now) {
            self.selected = 0;
        }
        if let Some(favorites) = self.favorites.as_mut() {
            favorites.poll();
        }
    }

    /// Moves queued store errors into the console.
    pub fn drain_errors(&mut self, rx: &Receiver<StoreError>) {
        while let Ok(err) = rx.try_recv() {
            if err.is_permission_denied() {
                self.push_log(format!("[WARN] Not allowed: {}", err.path()));
            } else {
                self.push_log(format!("[WARN] {err}"));
            }
        }
    }

    /// Short code for a country name, when the country list knows it.
    pub fn country_code(&self, name: &str) -> Option<&str> {
        self.countries
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.code.as_str())
            .filter(|code| !code.is_empty())
    }

    pub fn selected_fixture(&self) -> Option<&Fixture> {
        self.fixtures.get(self.selected)
    }

    pub fn fixture(&self, id: u32) -> Option<&Fixture> {
        self.fixtures
            .iter()
            .chain(self.team_fixtures.values().flatten())
            .find(|f| f.id == id)
    }

    pub fn select_next(&mut self, total: usize) {
        if total == 0 {
            self.selected = 0;
        } else {
            self.selected = (self.selected + 1).min(total - 1);
        }
    }

    pub fn select_prev(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn is_favorite(&self, kind: FavoriteKind, id: u32) -> bool {
        self.favorites
            .as_ref()
            .is_some_and(|f| f.is_favorite(kind, id))
    }

    pub fn toggle_favorite(&mut self, id: u32, value: FavoriteValue) -> Option<ToggleOutcome> {
        let outcome = self.favorites.as_mut()?.toggle(id, value);
        match outcome {
            ToggleOutcome::Added => self.push_log("[INFO] Added to favorites"),
            ToggleOutcome::Removed => self.push_log("[INFO] Removed from favorites"),
            ToggleOutcome::Updated => {}
            ToggleOutcome::Rejected(RejectReason::NotPopular) => {
                self.push_log("[WARN] Sign in to follow more than the popular picks")
            }
            ToggleOutcome::Rejected(reason) => {
                self.push_log(format!("[WARN] Favorite not saved: {reason:?}"))
            }
            ToggleOutcome::RolledBack => self.push_log("[WARN] Favorite change reverted"),
        }
        Some(outcome)
    }

    pub fn set_search_query(&mut self, text: &str, now: Instant) {
        self.search_query = text.to_string();
        if text.trim().chars().count() < SEARCH_MIN_CHARS {
            self.search_debounce.cancel();
            self.search_results = SearchResults::default();
            return;
        }
        self.search_debounce.push(text.trim().to_string(), now);
    }

    /// The query to run once typing has paused, if it is long enough.
    pub fn poll_search(&mut self, now: Instant) -> Option<String> {
        self.search_debounce.poll(now)
    }

    pub fn prediction_input(&mut self, fixture_id: u32) -> &mut PredictionInput {
        let stored = self.predictions.get(&fixture_id);
        self.prediction_inputs
            .entry(fixture_id)
            .or_insert_with(|| match stored {
                Some(p) => PredictionInput::from_stored(p),
                None => PredictionInput::new(fixture_id),
            })
    }

    /// Scores whose inputs settled since the last call, with their kickoff.
    pub fn ready_predictions(&mut self, now: Instant) -> Vec<(u32, DateTime<Utc>, (u8, u8))> {
        let mut ready = Vec::new();
        let ids: Vec<u32> = self.prediction_inputs.keys().copied().collect();
        for id in ids {
            let stored = self.predictions.get(&id).cloned();
            let Some(score) = self
                .prediction_inputs
                .get_mut(&id)
                .and_then(|input| input.poll_ready(now, stored.as_ref()))
            else {
                continue;
            };
            match self.fixture(id).and_then(|f| f.kickoff) {
                Some(kickoff) => ready.push((id, kickoff, score)),
                None => self.push_log(format!("[WARN] No kickoff time for fixture {id}")),
            }
        }
        ready
    }
}

#[derive(Debug, Clone)]
pub enum Delta {
    SetFixtures {
        date: NaiveDate,
        fixtures: Vec<Fixture>,
    },
    SetCompetitions(Vec<Competition>),
    SetCountries(Vec<Country>),
    SetTeams {
        league_id: u32,
        teams: Vec<TeamRef>,
    },
    SetStandings {
        league_id: u32,
        rows: Vec<StandingRow>,
    },
    SetTeamFixtures {
        team_id: u32,
        fixtures: Vec<Fixture>,
    },
    SetSearch(SearchResults),
    SetNews(Vec<NewsItem>),
    SetLeaderboard(Vec<LeaderboardEntry>),
    SetComments {
        fixture_id: u32,
        comments: Vec<Comment>,
    },
    SetOdds {
        fixture_id: u32,
        odds: Option<FixtureOdds>,
    },
    SetPredictions(Vec<Prediction>),
    PredictionSaved(Prediction),
    SetAdmin(AdminView),
    Log(String),
}

#[derive(Debug, Clone)]
pub enum ProviderCommand {
    FetchFixtures {
        date: NaiveDate,
    },
    FetchCompetitions,
    /// Drops the cached competition, country and team lists, then refetches.
    RefreshCompetitions,
    FetchTeams {
        league_id: u32,
        season: u16,
    },
    FetchStandings {
        league_id: u32,
        season: u16,
    },
    FetchTeamFixtures {
        team_id: u32,
    },
    Search {
        query: String,
    },
    FetchNews,
    FetchLeaderboard,
    FetchComments {
        fixture_id: u32,
    },
    PostComment {
        fixture_id: u32,
        text: String,
    },
    ToggleLike {
        fixture_id: u32,
        comment_id: String,
    },
    FetchOdds {
        fixture_id: u32,
    },
    FetchMyPredictions,
    SubmitPrediction {
        fixture_id: u32,
        kickoff: DateTime<Utc>,
        score: (u8, u8),
    },
    FetchAdmin {
        date: NaiveDate,
    },
    TogglePin {
        fixture_id: u32,
        label: String,
    },
    ToggleDailyPick {
        date: NaiveDate,
        fixture_id: u32,
    },
}

pub fn apply_delta(state: &mut AppState, delta: Delta) {
    match delta {
        Delta::SetFixtures { date, mut fixtures } => {
            // A slow response for a day the user already left is dropped.
            if date != state.fixtures_date {
                return;
            }
            fixtures.sort_by(|a, b| {
                a.kickoff
                    .cmp(&b.kickoff)
                    .then_with(|| a.league_name.cmp(&b.league_name))
                    .then(a.id.cmp(&b.id))
            });
            let selected_id = state.selected_fixture().map(|f| f.id);
            state.fixtures = fixtures;
            state.fixtures_loading = false;
            state.selected = selected_id
                .and_then(|id| state.fixtures.iter().position(|f| f.id == id))
                .unwrap_or(0);
        }
        Delta::SetCompetitions(competitions) => {
            state.competitions = competitions;
        }
        Delta::SetCountries(countries) => {
            state.countries = countries;
        }
        Delta::SetTeams { league_id, teams } => {
            state.league_teams.insert(league_id, teams);
        }
        Delta::SetStandings { league_id, rows } => {
            state.standings.insert(league_id, rows);
        }
        Delta::SetTeamFixtures { team_id, fixtures } => {
            state.team_fixtures.insert(team_id, fixtures);
        }
        Delta::SetSearch(results) => {
            if results.query.trim() == state.search_query.trim() {
                state.search_results = results;
            }
        }
        Delta::SetNews(news) => {
            state.news = news;
        }
        Delta::SetLeaderboard(entries) => {
            state.leaderboard = entries;
        }
        Delta::SetComments {
            fixture_id,
            comments,
        } => {
            state.comments.insert(fixture_id, comments);
        }
        Delta::SetOdds { fixture_id, odds } => match odds {
            Some(odds) => {
                state.odds.insert(fixture_id, odds);
            }
            None => {
                state.odds.remove(&fixture_id);
            }
        },
        Delta::SetPredictions(predictions) => {
            state.predictions = predictions
                .into_iter()
                .map(|p| (p.fixture_id, p))
                .collect();
            // Untouched inputs pick up the stored values.
            state.prediction_inputs.retain(|_, input| input.is_dirty());
        }
        Delta::PredictionSaved(prediction) => {
            state.push_log(format!(
                "[INFO] Prediction saved: {}-{}",
                prediction.home_goals, prediction.away_goals
            ));
            state.predictions.insert(prediction.fixture_id, prediction);
        }
        Delta::SetAdmin(view) => {
            state.admin = view;
        }
        Delta::Log(msg) => state.push_log(msg),
    }
}
