use std::sync::mpsc::{Receiver, Sender};
use std::thread;
use std::time::Duration;

use anyhow::Result;
use chrono::{Datelike, NaiveDate, Utc};

use crate::admin::{self, EntityKind};
use crate::comments;
use crate::docstore::Db;
use crate::football_api::{Competition, Country, Fixture, FootballApi, StandingRow, TeamRef};
use crate::leaderboard::{self, DAILY_PICKS, DailyPicks};
use crate::news;
use crate::predictions::{self, PredictionError};
use crate::session_cache::{COMPETITIONS_KEY, COUNTRIES_KEY, TtlCache, teams_key};
use crate::state::{AdminView, Delta, ProviderCommand, SearchResults};

const STANDINGS_TTL: Duration = Duration::from_secs(10 * 60);
const LEADERBOARD_LIMIT: usize = 50;
const NEWS_LIMIT: usize = 30;
const TEAM_FIXTURES_NEXT: u8 = 10;

/// Background worker that owns all network and store reads for the client.
pub struct Provider {
    api: FootballApi,
    db: Db,
    competitions: TtlCache<Vec<Competition>>,
    countries: TtlCache<Vec<Country>>,
    teams: TtlCache<Vec<TeamRef>>,
    standings: TtlCache<Vec<StandingRow>>,
}

pub fn spawn_provider(api: FootballApi, db: Db, tx: Sender<Delta>, cmd_rx: Receiver<ProviderCommand>) {
    thread::spawn(move || {
        let mut provider = Provider::new(api, db);
        for cmd in cmd_rx {
            for delta in provider.handle(cmd) {
                if tx.send(delta).is_err() {
                    return;
                }
            }
        }
    });
}

impl Provider {
    pub fn new(api: FootballApi, db: Db) -> Self {
        Self {
            api,
            db,
            competitions: TtlCache::default(),
            countries: TtlCache::default(),
            teams: TtlCache::default(),
            standings: TtlCache::new(STANDINGS_TTL),
        }
    }

    /// Runs one command to completion. Failures come back as `[WARN]` log
    /// deltas next to an empty result.
    pub fn handle(&mut self, cmd: ProviderCommand) -> Vec<Delta> {
        match cmd {
            ProviderCommand::FetchFixtures { date } => match self.fixtures(date) {
                Ok(fixtures) => vec![Delta::SetFixtures { date, fixtures }],
                Err(err) => vec![
                    warn(format!("Fixtures fetch error: {err:#}")),
                    Delta::SetFixtures {
                        date,
                        fixtures: Vec::new(),
                    },
                ],
            },
            ProviderCommand::FetchCompetitions => self.competitions_deltas(),
            ProviderCommand::RefreshCompetitions => {
                self.competitions.clear();
                self.countries.clear();
                self.teams.clear();
                let mut out = vec![Delta::Log("[INFO] Competition lists refreshed".to_string())];
                out.extend(self.competitions_deltas());
                out
            }
            ProviderCommand::FetchTeams { league_id, season } => {
                let key = teams_key(league_id, season);
                if let Some(teams) = self.teams.get(&key) {
                    return vec![Delta::SetTeams { league_id, teams }];
                }
                match self.api.teams(league_id, season) {
                    Ok(mut teams) => {
                        for team in &mut teams {
                            team.name =
                                admin::display_name(&self.db, EntityKind::Team, team.id, &team.name);
                        }
                        self.teams.set(key, teams.clone());
                        vec![Delta::SetTeams { league_id, teams }]
                    }
                    Err(err) => vec![
                        warn(format!("Teams fetch error: {err:#}")),
                        Delta::SetTeams {
                            league_id,
                            teams: Vec::new(),
                        },
                    ],
                }
            }
            ProviderCommand::FetchStandings { league_id, season } => {
                let key = format!("standings:{league_id}:{season}");
                if let Some(rows) = self.standings.get(&key) {
                    return vec![Delta::SetStandings { league_id, rows }];
                }
                match self.api.standings(league_id, season) {
                    Ok(rows) => {
                        self.standings.set(key, rows.clone());
                        vec![Delta::SetStandings { league_id, rows }]
                    }
                    Err(err) => vec![
                        warn(format!("Standings fetch error: {err:#}")),
                        Delta::SetStandings {
                            league_id,
                            rows: Vec::new(),
                        },
                    ],
                }
            }
            ProviderCommand::FetchTeamFixtures { team_id } => {
                match self.api.team_fixtures(team_id, TEAM_FIXTURES_NEXT) {
                    Ok(fixtures) => vec![Delta::SetTeamFixtures { team_id, fixtures }],
                    Err(err) => vec![
                        warn(format!("Team fixtures fetch error: {err:#}")),
                        Delta::SetTeamFixtures {
                            team_id,
                            fixtures: Vec::new(),
                        },
                    ],
                }
            }
            ProviderCommand::Search { query } => {
                let (results, errors) = self.search(&query);
                let mut out: Vec<Delta> = errors.into_iter().map(warn).collect();
                out.push(Delta::SetSearch(results));
                out
            }
            ProviderCommand::FetchNews => match news::latest(&self.db, NEWS_LIMIT) {
                Ok(items) => vec![Delta::SetNews(items)],
                Err(err) => vec![warn(format!("News load error: {err}")), Delta::SetNews(Vec::new())],
            },
            ProviderCommand::FetchLeaderboard => {
                match leaderboard::top_entries(&self.db, LEADERBOARD_LIMIT) {
                    Ok(entries) => vec![Delta::SetLeaderboard(entries)],
                    Err(err) => vec![
                        warn(format!("Leaderboard load error: {err}")),
                        Delta::SetLeaderboard(Vec::new()),
                    ],
                }
            }
            ProviderCommand::FetchComments { fixture_id } => self.comments_delta(fixture_id),
            ProviderCommand::PostComment { fixture_id, text } => {
                let mut out = Vec::new();
                match comments::post(&self.db, fixture_id, &text) {
                    Ok(Some(_)) => {}
                    Ok(None) => out.push(warn("Sign in and type something to comment".to_string())),
                    Err(err) => out.push(warn(format!("Comment not posted: {err}"))),
                }
                out.extend(self.comments_delta(fixture_id));
                out
            }
            ProviderCommand::ToggleLike {
                fixture_id,
                comment_id,
            } => {
                let mut out = Vec::new();
                if let Err(err) = comments::toggle_like(&self.db, fixture_id, &comment_id) {
                    out.push(warn(format!("Like not saved: {err}")));
                }
                out.extend(self.comments_delta(fixture_id));
                out
            }
            ProviderCommand::FetchOdds { fixture_id } => match self.api.odds(fixture_id) {
                Ok(odds) => vec![Delta::SetOdds { fixture_id, odds }],
                Err(err) => vec![
                    warn(format!("Odds fetch error: {err:#}")),
                    Delta::SetOdds {
                        fixture_id,
                        odds: None,
                    },
                ],
            },
            ProviderCommand::FetchMyPredictions => {
                let Some(uid) = self.db.session().uid().map(|s| s.to_string()) else {
                    return vec![Delta::SetPredictions(Vec::new())];
                };
                match predictions::user_predictions(&self.db, &uid) {
                    Ok(list) => vec![Delta::SetPredictions(list)],
                    Err(err) => vec![
                        warn(format!("Predictions load error: {err}")),
                        Delta::SetPredictions(Vec::new()),
                    ],
                }
            }
            ProviderCommand::SubmitPrediction {
                fixture_id,
                kickoff,
                score,
            } => match predictions::submit_prediction(&self.db, fixture_id, kickoff, score, Utc::now()) {
                Ok(saved) => vec![Delta::PredictionSaved(saved)],
                Err(PredictionError::Locked(_)) => {
                    vec![warn("Predictions close at kickoff".to_string())]
                }
                Err(err) => vec![warn(format!("Prediction not saved: {err}"))],
            },
            ProviderCommand::FetchAdmin { date } => self.admin_delta(date),
            ProviderCommand::TogglePin { fixture_id, label } => {
                let pinned = admin::pinned_matches(&self.db)
                    .map(|list| list.iter().any(|p| p.fixture_id == fixture_id));
                let result = match pinned {
                    Ok(true) => admin::unpin_match(&self.db, fixture_id),
                    Ok(false) => admin::pin_match(&self.db, fixture_id, &label),
                    Err(err) => Err(err),
                };
                let mut out = Vec::new();
                if let Err(err) = result {
                    out.push(warn(format!("Pin not saved: {err}")));
                }
                out.extend(self.admin_delta(Utc::now().date_naive()));
                out
            }
            ProviderCommand::ToggleDailyPick { date, fixture_id } => {
                let day = date.format("%Y-%m-%d").to_string();
                let result = leaderboard::daily_picks(&self.db, &day).and_then(|picks| {
                    let mut ids = picks.fixture_ids;
                    if let Some(pos) = ids.iter().position(|id| *id == fixture_id) {
                        ids.remove(pos);
                    } else {
                        ids.push(fixture_id);
                    }
                    admin::set_daily_picks(&self.db, &day, &ids)
                });
                let mut out = Vec::new();
                if let Err(err) = result {
                    out.push(warn(format!("Daily pick not saved: {err}")));
                }
                out.extend(self.admin_delta(date));
                out
            }
        }
    }

    fn fixtures(&self, date: NaiveDate) -> Result<Vec<Fixture>> {
        let mut fixtures = self.api.fixtures_by_date(date)?;
        for fixture in &mut fixtures {
            fixture.home.name =
                admin::display_name(&self.db, EntityKind::Team, fixture.home.id, &fixture.home.name);
            fixture.away.name =
                admin::display_name(&self.db, EntityKind::Team, fixture.away.id, &fixture.away.name);
            fixture.league_name = admin::display_name(
                &self.db,
                EntityKind::League,
                fixture.league_id,
                &fixture.league_name,
            );
        }
        Ok(fixtures)
    }

    fn competitions_deltas(&mut self) -> Vec<Delta> {
        let mut out = Vec::new();
        match self.competitions() {
            Ok(list) => out.push(Delta::SetCompetitions(list)),
            Err(err) => {
                out.push(warn(format!("Competitions fetch error: {err:#}")));
                out.push(Delta::SetCompetitions(Vec::new()));
            }
        }
        match self.countries() {
            Ok(list) => out.push(Delta::SetCountries(list)),
            Err(err) => out.push(warn(format!("Countries fetch error: {err:#}"))),
        }
        out
    }

    fn countries(&mut self) -> Result<Vec<Country>> {
        if let Some(list) = self.countries.get(COUNTRIES_KEY) {
            return Ok(list);
        }
        let list = self.api.countries()?;
        self.countries.set(COUNTRIES_KEY, list.clone());
        Ok(list)
    }

    fn competitions(&mut self) -> Result<Vec<Competition>> {
        if let Some(list) = self.competitions.get(COMPETITIONS_KEY) {
            return Ok(list);
        }
        let mut list = self.api.competitions()?;
        for competition in &mut list {
            competition.name =
                admin::display_name(&self.db, EntityKind::League, competition.id, &competition.name);
        }
        // Managed competitions go first, in the order the admins chose.
        if let Ok(managed) = admin::managed_competitions(&self.db) {
            list.sort_by_key(|c| {
                managed
                    .iter()
                    .position(|m| m.league_id == c.id)
                    .unwrap_or(usize::MAX)
            });
        }
        self.competitions.set(COMPETITIONS_KEY, list.clone());
        Ok(list)
    }

    fn search(&self, query: &str) -> (SearchResults, Vec<String>) {
        let mut results = SearchResults {
            query: query.to_string(),
            ..SearchResults::default()
        };
        let mut errors = Vec::new();
        match self.api.search_teams(query) {
            Ok(teams) => results.teams = teams,
            Err(err) => errors.push(format!("Team search error: {err:#}")),
        }
        match self.api.search_players(query) {
            Ok(players) => results.players = players,
            Err(err) => errors.push(format!("Player search error: {err:#}")),
        }
        match self.api.search_competitions(query) {
            Ok(competitions) => results.competitions = competitions,
            Err(err) => errors.push(format!("Competition search error: {err:#}")),
        }
        (results, errors)
    }

    fn comments_delta(&self, fixture_id: u32) -> Vec<Delta> {
        match comments::list(&self.db, fixture_id) {
            Ok(comments) => vec![Delta::SetComments {
                fixture_id,
                comments,
            }],
            Err(err) => vec![
                warn(format!("Comments load error: {err}")),
                Delta::SetComments {
                    fixture_id,
                    comments: Vec::new(),
                },
            ],
        }
    }

    fn admin_delta(&self, date: NaiveDate) -> Vec<Delta> {
        let day = date.format("%Y-%m-%d").to_string();
        let mut out = Vec::new();
        let pinned = admin::pinned_matches(&self.db).unwrap_or_else(|err| {
            out.push(warn(format!("Pinned matches load error: {err}")));
            Vec::new()
        });
        let managed = admin::managed_competitions(&self.db).unwrap_or_else(|err| {
            out.push(warn(format!("Managed competitions load error: {err}")));
            Vec::new()
        });
        let picks = leaderboard::daily_picks(&self.db, &day).unwrap_or_else(|err| {
            out.push(warn(format!("{DAILY_PICKS} load error: {err}")));
            DailyPicks {
                date: day.clone(),
                fixture_ids: Vec::new(),
            }
        });
        out.push(Delta::SetAdmin(AdminView {
            pinned,
            managed,
            picks,
        }));
        out
    }
}

/// Season year API-Football uses for a league running on `date`
/// (European seasons start in July).
pub fn season_for(date: NaiveDate) -> u16 {
    let year = date.year();
    let season = if date.month() >= 7 { year } else { year - 1 };
    u16::try_from(season).unwrap_or(0)
}

fn warn(msg: String) -> Delta {
    Delta::Log(format!("[WARN] {msg}"))
}
