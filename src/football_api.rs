use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;

use crate::http_cache::fetch_json_cached;
use crate::http_client::http_client;
use crate::leaderboard::FinalScore;

pub const API_KEY_HEADER: &str = "x-apisports-key";

const FINISHED_STATUSES: [&str; 3] = ["FT", "AET", "PEN"];
const NOT_STARTED_STATUSES: [&str; 3] = ["NS", "TBD", "PST"];
const VOID_STATUSES: [&str; 4] = ["CANC", "ABD", "AWD", "WO"];

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TeamRef {
    pub id: u32,
    pub name: String,
    pub logo: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fixture {
    pub id: u32,
    pub kickoff: Option<DateTime<Utc>>,
    pub status: String,
    pub elapsed: Option<u16>,
    pub league_id: u32,
    pub league_name: String,
    pub round: String,
    pub home: TeamRef,
    pub away: TeamRef,
    pub home_goals: Option<u8>,
    pub away_goals: Option<u8>,
}

impl Fixture {
    pub fn is_finished(&self) -> bool {
        FINISHED_STATUSES.contains(&self.status.as_str())
    }

    pub fn is_void(&self) -> bool {
        VOID_STATUSES.contains(&self.status.as_str())
    }

    pub fn has_started(&self) -> bool {
        !self.status.is_empty() && !NOT_STARTED_STATUSES.contains(&self.status.as_str())
    }

    pub fn is_live(&self) -> bool {
        self.has_started() && !self.is_finished() && !self.is_void()
    }

    pub fn final_score(&self) -> Option<FinalScore> {
        if !self.is_finished() {
            return None;
        }
        Some(FinalScore {
            fixture_id: self.id,
            home_goals: self.home_goals?,
            away_goals: self.away_goals?,
        })
    }

    pub fn score_label(&self) -> String {
        match (self.home_goals, self.away_goals) {
            (Some(h), Some(a)) if self.has_started() => format!("{h}-{a}"),
            _ => "vs".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandingRow {
    pub rank: u16,
    pub team: TeamRef,
    pub points: i32,
    pub played: u16,
    pub win: u16,
    pub draw: u16,
    pub lose: u16,
    pub goals_diff: i32,
    pub form: String,
    pub group: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Competition {
    pub id: u32,
    pub name: String,
    pub kind: String,
    pub logo: String,
    pub country: String,
    pub current_season: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Country {
    pub name: String,
    pub code: String,
    pub flag: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerSummary {
    pub id: u32,
    pub name: String,
    pub photo: String,
    pub team: Option<String>,
    pub position: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OddValue {
    pub label: String,
    pub odd: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OddsMarket {
    pub bookmaker: String,
    pub bet: String,
    pub values: Vec<OddValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FixtureOdds {
    pub fixture_id: u32,
    pub markets: Vec<OddsMarket>,
    /// Attached by the proxy on `odds` requests; shape is provider-defined.
    pub history: Option<Value>,
}

/// Sports-data client. Points at the proxy route, or at the upstream directly
/// when an API key is supplied (admin tools).
#[derive(Debug, Clone)]
pub struct FootballApi {
    base: String,
    api_key: Option<String>,
}

impl FootballApi {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
            api_key: None,
        }
    }

    pub fn direct(base: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Self::new(base)
        }
    }

    pub fn url(&self, route: &str, query: &[(&str, String)]) -> String {
        let mut url = format!("{}/{}", self.base, route.trim_start_matches('/'));
        let mut sep = '?';
        for (key, value) in query {
            url.push(sep);
            url.push_str(key);
            url.push('=');
            url.push_str(&encode_query_value(value));
            sep = '&';
        }
        url
    }

    fn get(&self, route: &str, query: &[(&str, String)]) -> Result<String> {
        let client = http_client()?;
        let url = self.url(route, query);
        let headers: Vec<(&str, &str)> = match self.api_key.as_deref() {
            Some(key) => vec![(API_KEY_HEADER, key)],
            None => Vec::new(),
        };
        fetch_json_cached(client, &url, &headers).with_context(|| format!("GET {route} failed"))
    }

    pub fn fixtures_by_date(&self, date: NaiveDate) -> Result<Vec<Fixture>> {
        let body = self.get("fixtures", &[("date", date.format("%Y-%m-%d").to_string())])?;
        parse_fixtures_json(&body)
    }

    pub fn fixture(&self, id: u32) -> Result<Option<Fixture>> {
        let body = self.get("fixtures", &[("id", id.to_string())])?;
        Ok(parse_fixtures_json(&body)?.into_iter().next())
    }

    pub fn standings(&self, league_id: u32, season: u16) -> Result<Vec<StandingRow>> {
        let body = self.get(
            "standings",
            &[("league", league_id.to_string()), ("season", season.to_string())],
        )?;
        parse_standings_json(&body)
    }

    pub fn competitions(&self) -> Result<Vec<Competition>> {
        let body = self.get("leagues", &[("current", "true".to_string())])?;
        parse_competitions_json(&body)
    }

    pub fn countries(&self) -> Result<Vec<Country>> {
        let body = self.get("countries", &[])?;
        parse_countries_json(&body)
    }

    pub fn teams(&self, league_id: u32, season: u16) -> Result<Vec<TeamRef>> {
        let body = self.get(
            "teams",
            &[("league", league_id.to_string()), ("season", season.to_string())],
        )?;
        parse_teams_json(&body)
    }

    pub fn team_fixtures(&self, team_id: u32, next: u8) -> Result<Vec<Fixture>> {
        let body = self.get(
            "fixtures",
            &[("team", team_id.to_string()), ("next", next.to_string())],
        )?;
        parse_fixtures_json(&body)
    }

    pub fn search_teams(&self, query: &str) -> Result<Vec<TeamRef>> {
        let body = self.get("teams", &[("search", query.to_string())])?;
        parse_teams_json(&body)
    }

    pub fn search_players(&self, query: &str) -> Result<Vec<PlayerSummary>> {
        let body = self.get("players/profiles", &[("search", query.to_string())])?;
        parse_players_json(&body)
    }

    pub fn search_competitions(&self, query: &str) -> Result<Vec<Competition>> {
        let body = self.get("leagues", &[("search", query.to_string())])?;
        parse_competitions_json(&body)
    }

    pub fn odds(&self, fixture_id: u32) -> Result<Option<FixtureOdds>> {
        let body = self.get("odds", &[("fixture", fixture_id.to_string())])?;
        parse_odds_json(&body)
    }
}

fn encode_query_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for b in value.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            b' ' => out.push_str("%20"),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

fn response_items(raw: &str) -> Result<Vec<Value>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(Vec::new());
    }
    let root: Value = serde_json::from_str(trimmed).context("invalid sports-data json")?;
    Ok(root
        .get("response")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default())
}

pub fn parse_fixtures_json(raw: &str) -> Result<Vec<Fixture>> {
    let items = response_items(raw)?;
    Ok(items.iter().filter_map(parse_fixture).collect())
}

fn parse_fixture(v: &Value) -> Option<Fixture> {
    let fixture = v.get("fixture")?;
    let id = as_u32(fixture.get("id"))?;
    let kickoff = fixture
        .get("date")
        .and_then(|d| d.as_str())
        .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
        .map(|d| d.with_timezone(&Utc));
    let status = fixture.get("status").unwrap_or(&Value::Null);
    let league = v.get("league").unwrap_or(&Value::Null);
    let teams = v.get("teams")?;
    let goals = v.get("goals").unwrap_or(&Value::Null);

    Some(Fixture {
        id,
        kickoff,
        status: str_field(status, "short"),
        elapsed: status
            .get("elapsed")
            .and_then(|x| x.as_u64())
            .and_then(|x| u16::try_from(x).ok()),
        league_id: as_u32(league.get("id")).unwrap_or(0),
        league_name: str_field(league, "name"),
        round: str_field(league, "round"),
        home: parse_team(teams.get("home")?)?,
        away: parse_team(teams.get("away")?)?,
        home_goals: as_u8(goals.get("home")),
        away_goals: as_u8(goals.get("away")),
    })
}

fn parse_team(v: &Value) -> Option<TeamRef> {
    Some(TeamRef {
        id: as_u32(v.get("id"))?,
        name: str_field(v, "name"),
        logo: str_field(v, "logo"),
    })
}

pub fn parse_standings_json(raw: &str) -> Result<Vec<StandingRow>> {
    let items = response_items(raw)?;
    let mut rows = Vec::new();
    for item in &items {
        let Some(groups) = item
            .get("league")
            .and_then(|l| l.get("standings"))
            .and_then(|s| s.as_array())
        else {
            continue;
        };
        for group in groups {
            let Some(group) = group.as_array() else {
                continue;
            };
            for row in group {
                let Some(team) = row.get("team").and_then(parse_team) else {
                    continue;
                };
                let all = row.get("all").unwrap_or(&Value::Null);
                rows.push(StandingRow {
                    rank: as_u16(row.get("rank")).unwrap_or(0),
                    team,
                    points: as_i32(row.get("points")),
                    played: as_u16(all.get("played")).unwrap_or(0),
                    win: as_u16(all.get("win")).unwrap_or(0),
                    draw: as_u16(all.get("draw")).unwrap_or(0),
                    lose: as_u16(all.get("lose")).unwrap_or(0),
                    goals_diff: as_i32(row.get("goalsDiff")),
                    form: str_field(row, "form"),
                    group: str_field(row, "group"),
                });
            }
        }
    }
    Ok(rows)
}

pub fn parse_competitions_json(raw: &str) -> Result<Vec<Competition>> {
    let items = response_items(raw)?;
    Ok(items
        .iter()
        .filter_map(|item| {
            let league = item.get("league")?;
            let current_season = item
                .get("seasons")
                .and_then(|s| s.as_array())
                .and_then(|seasons| {
                    seasons
                        .iter()
                        .find(|s| s.get("current").and_then(|c| c.as_bool()) == Some(true))
                        .or_else(|| seasons.last())
                })
                .and_then(|s| as_u16(s.get("year")));
            Some(Competition {
                id: as_u32(league.get("id"))?,
                name: str_field(league, "name"),
                kind: str_field(league, "type"),
                logo: str_field(league, "logo"),
                country: item
                    .get("country")
                    .map(|c| str_field(c, "name"))
                    .unwrap_or_default(),
                current_season,
            })
        })
        .collect())
}

pub fn parse_countries_json(raw: &str) -> Result<Vec<Country>> {
    let items = response_items(raw)?;
    Ok(items
        .iter()
        .map(|c| Country {
            name: str_field(c, "name"),
            code: str_field(c, "code"),
            flag: str_field(c, "flag"),
        })
        .filter(|c| !c.name.is_empty())
        .collect())
}

pub fn parse_teams_json(raw: &str) -> Result<Vec<TeamRef>> {
    let items = response_items(raw)?;
    Ok(items
        .iter()
        .filter_map(|item| parse_team(item.get("team")?))
        .collect())
}

pub fn parse_players_json(raw: &str) -> Result<Vec<PlayerSummary>> {
    let items = response_items(raw)?;
    Ok(items
        .iter()
        .filter_map(|item| {
            let player = item.get("player")?;
            let stats = item
                .get("statistics")
                .and_then(|s| s.as_array())
                .and_then(|s| s.first());
            let team = stats
                .and_then(|s| s.get("team"))
                .map(|t| str_field(t, "name"))
                .filter(|s| !s.is_empty());
            let position = player
                .get("position")
                .and_then(|p| p.as_str())
                .map(|p| p.to_string())
                .or_else(|| {
                    stats
                        .and_then(|s| s.get("games"))
                        .and_then(|g| g.get("position"))
                        .and_then(|p| p.as_str())
                        .map(|p| p.to_string())
                });
            Some(PlayerSummary {
                id: as_u32(player.get("id"))?,
                name: str_field(player, "name"),
                photo: str_field(player, "photo"),
                team,
                position,
            })
        })
        .collect())
}

pub fn parse_odds_json(raw: &str) -> Result<Option<FixtureOdds>> {
    let trimmed = raw.trim();
    let history = if trimmed.is_empty() {
        None
    } else {
        serde_json::from_str::<Value>(trimmed)
            .ok()
            .and_then(|root| root.get("history").cloned())
            .filter(|h| !h.is_null())
    };
    let items = response_items(raw)?;
    let Some(item) = items.first() else {
        return Ok(None);
    };
    let Some(fixture_id) = item.get("fixture").and_then(|f| as_u32(f.get("id"))) else {
        return Ok(None);
    };

    let mut markets = Vec::new();
    for bookmaker in item
        .get("bookmakers")
        .and_then(|b| b.as_array())
        .into_iter()
        .flatten()
    {
        let bookmaker_name = str_field(bookmaker, "name");
        for bet in bookmaker
            .get("bets")
            .and_then(|b| b.as_array())
            .into_iter()
            .flatten()
        {
            let values = bet
                .get("values")
                .and_then(|v| v.as_array())
                .into_iter()
                .flatten()
                .filter_map(|v| {
                    let odd = match v.get("odd")? {
                        Value::String(s) => s.parse::<f64>().ok()?,
                        other => other.as_f64()?,
                    };
                    Some(OddValue {
                        label: value_label(v.get("value")?),
                        odd,
                    })
                })
                .collect();
            markets.push(OddsMarket {
                bookmaker: bookmaker_name.clone(),
                bet: str_field(bet, "name"),
                values,
            });
        }
    }

    Ok(Some(FixtureOdds {
        fixture_id,
        markets,
        history,
    }))
}

fn value_label(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn str_field(v: &Value, key: &str) -> String {
    v.get(key)
        .and_then(|x| x.as_str())
        .unwrap_or_default()
        .to_string()
}

fn as_u32(v: Option<&Value>) -> Option<u32> {
    v?.as_u64().and_then(|x| u32::try_from(x).ok())
}

fn as_u16(v: Option<&Value>) -> Option<u16> {
    v?.as_u64().and_then(|x| u16::try_from(x).ok())
}

fn as_u8(v: Option<&Value>) -> Option<u8> {
    v?.as_u64().and_then(|x| u8::try_from(x).ok())
}

fn as_i32(v: Option<&Value>) -> i32 {
    v.and_then(|x| x.as_i64())
        .and_then(|x| i32::try_from(x).ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::encode_query_value;

    #[test]
    fn query_values_are_percent_encoded() {
        assert_eq!(encode_query_value("real madrid"), "real%20madrid");
        assert_eq!(encode_query_value("a&b=c"), "a%26b%3Dc");
        assert_eq!(encode_query_value("2025-01-31"), "2025-01-31");
    }
}
