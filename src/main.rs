use std::io;
use std::sync::Arc;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use chrono::{Duration as ChronoDuration, Local, Utc};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::prelude::*;
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Tabs};

use pitchside::admin;
use pitchside::config::{AppConfig, load_dotenv};
use pitchside::docstore::{Db, DocumentStore, SqliteStore};
use pitchside::errors::{ErrorChannel, StoreError};
use pitchside::favorites::{
    FavoriteKind, FavoriteValue, FavoritesSync, LeagueFavorite, PlayerFavorite, PopularCatalog,
    TeamFavorite,
};
use pitchside::football_api::{Fixture, FootballApi, TeamRef};
use pitchside::local_store::LocalStorage;
use pitchside::navigation::{MAIN_TABS, Screen, ScreenParams, Visibility, params};
use pitchside::provider::{season_for, spawn_provider};
use pitchside::rules::Session;
use pitchside::state::{
    AppState, Delta, InputMode, ProviderCommand, SEARCH_MIN_CHARS, apply_delta,
};

struct App {
    state: AppState,
    should_quit: bool,
    cmd_tx: Option<mpsc::Sender<ProviderCommand>>,
    error_rx: mpsc::Receiver<StoreError>,
    is_admin: bool,
    display_name: String,
    fixtures_refresh: Duration,
    last_fixtures_refresh: Instant,
}

impl App {
    fn send(&mut self, cmd: ProviderCommand) {
        let Some(tx) = self.cmd_tx.as_ref() else {
            return;
        };
        if tx.send(cmd).is_err() {
            self.state.push_log("[WARN] Background worker stopped");
            self.cmd_tx = None;
        }
    }

    fn open(&mut self, screen: Screen, params: ScreenParams) {
        let now = Instant::now();
        self.state.navigate(screen, params, now);
        let top = self.state.nav.top().clone();
        match top.screen {
            Screen::Matches => {
                let date = self.state.fixtures_date;
                self.send(ProviderCommand::FetchFixtures { date });
            }
            Screen::Competitions => self.send(ProviderCommand::FetchCompetitions),
            Screen::News => self.send(ProviderCommand::FetchNews),
            Screen::Predictions => self.send(ProviderCommand::FetchMyPredictions),
            Screen::MatchDetail => {
                if let Some(fixture_id) = top.param_u32("fixture") {
                    self.send(ProviderCommand::FetchOdds { fixture_id });
                    self.send(ProviderCommand::FetchComments { fixture_id });
                }
            }
            Screen::Comments => {
                if let Some(fixture_id) = top.param_u32("fixture") {
                    self.send(ProviderCommand::FetchComments { fixture_id });
                }
            }
            Screen::CompetitionDetail => {
                if let Some(league_id) = top.param_u32("league") {
                    let season = top
                        .param("season")
                        .and_then(|s| s.parse().ok())
                        .unwrap_or_else(|| season_for(self.state.fixtures_date));
                    self.send(ProviderCommand::FetchStandings { league_id, season });
                    self.send(ProviderCommand::FetchTeams { league_id, season });
                }
            }
            Screen::TeamDetail => {
                if let Some(team_id) = top.param_u32("team") {
                    self.send(ProviderCommand::FetchTeamFixtures { team_id });
                }
            }
            Screen::Leaderboard => self.send(ProviderCommand::FetchLeaderboard),
            Screen::Admin => {
                let date = self.state.fixtures_date;
                self.send(ProviderCommand::FetchAdmin { date });
            }
            Screen::Search => self.state.input_mode = InputMode::Search,
            Screen::Profile | Screen::PlayerDetail => {}
        }
    }

    fn on_key(&mut self, key: KeyEvent) {
        let now = Instant::now();
        match self.state.input_mode {
            InputMode::Normal => {}
            InputMode::Search => return self.on_search_key(key, now),
            InputMode::PredictHome | InputMode::PredictAway => {
                return self.on_prediction_key(key, now);
            }
            InputMode::Comment => return self.on_comment_key(key),
        }

        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('?') => self.state.help_overlay = !self.state.help_overlay,
            KeyCode::Char(c @ '1'..='5') => {
                let idx = (c as usize) - ('1' as usize);
                self.open(MAIN_TABS[idx], ScreenParams::new());
            }
            KeyCode::Esc | KeyCode::Char('b') => {
                if self.state.help_overlay {
                    self.state.help_overlay = false;
                } else {
                    self.state.go_back(now);
                }
            }
            KeyCode::Char('/') => self.open(Screen::Search, ScreenParams::new()),
            KeyCode::Char('L') => self.open(Screen::Leaderboard, ScreenParams::new()),
            KeyCode::Char('A') if self.is_admin => self.open(Screen::Admin, ScreenParams::new()),
            KeyCode::Down | KeyCode::Char('j') => {
                let total = list_len(&self.state);
                self.state.select_next(total);
            }
            KeyCode::Up | KeyCode::Char('k') => self.state.select_prev(),
            KeyCode::Enter => self.open_selected(),
            _ => self.on_screen_key(key),
        }
    }

    fn on_screen_key(&mut self, key: KeyEvent) {
        let top = self.state.nav.top().clone();
        match (top.screen, key.code) {
            (Screen::Matches | Screen::Admin, KeyCode::Char('[')) => self.shift_day(-1),
            (Screen::Competitions, KeyCode::Char('r')) => {
                self.send(ProviderCommand::RefreshCompetitions)
            }
            (Screen::Matches | Screen::Admin, KeyCode::Char(']')) => self.shift_day(1),
            (Screen::MatchDetail, KeyCode::Char('h')) => {
                if let Some(id) = top.param_u32("fixture") {
                    self.state.prediction_input(id);
                    self.state.input_mode = InputMode::PredictHome;
                }
            }
            (Screen::MatchDetail, KeyCode::Char('a')) => {
                if let Some(id) = top.param_u32("fixture") {
                    self.state.prediction_input(id);
                    self.state.input_mode = InputMode::PredictAway;
                }
            }
            (Screen::MatchDetail, KeyCode::Char('c')) => {
                let fixture = top.param("fixture").unwrap_or_default().to_string();
                self.open(Screen::Comments, params([("fixture", fixture)]));
            }
            (Screen::MatchDetail, KeyCode::Char('o')) => {
                if let Some(fixture_id) = top.param_u32("fixture") {
                    self.send(ProviderCommand::FetchOdds { fixture_id });
                }
            }
            (Screen::Comments, KeyCode::Char('i')) => {
                self.state.comment_draft.clear();
                self.state.input_mode = InputMode::Comment;
            }
            (Screen::Comments, KeyCode::Char('l')) => {
                let Some(fixture_id) = top.param_u32("fixture") else {
                    return;
                };
                let comment_id = self
                    .state
                    .comments
                    .get(&fixture_id)
                    .and_then(|list| list.get(self.state.selected))
                    .map(|c| c.id.clone());
                if let Some(comment_id) = comment_id {
                    self.send(ProviderCommand::ToggleLike {
                        fixture_id,
                        comment_id,
                    });
                }
            }
            (Screen::Admin, KeyCode::Char('p')) => {
                if let Some(f) = self.state.selected_fixture() {
                    let label = format!("{} vs {}", f.home.name, f.away.name);
                    let fixture_id = f.id;
                    self.send(ProviderCommand::TogglePin { fixture_id, label });
                }
            }
            (Screen::Admin, KeyCode::Char('d')) => {
                if let Some(fixture_id) = self.state.selected_fixture().map(|f| f.id) {
                    let date = self.state.fixtures_date;
                    self.send(ProviderCommand::ToggleDailyPick { date, fixture_id });
                }
            }
            (_, KeyCode::Char('f')) => self.toggle_favorite(false),
            (Screen::TeamDetail, KeyCode::Char('C')) => self.toggle_favorite(true),
            _ => {}
        }
    }

    fn on_search_key(&mut self, key: KeyEvent, now: Instant) {
        match key.code {
            KeyCode::Esc => self.state.input_mode = InputMode::Normal,
            KeyCode::Enter => {
                self.state.input_mode = InputMode::Normal;
                self.open_selected();
            }
            KeyCode::Down => {
                let total = self.state.search_results.len();
                self.state.select_next(total);
            }
            KeyCode::Up => self.state.select_prev(),
            KeyCode::Backspace => {
                let mut text = self.state.search_query.clone();
                text.pop();
                self.state.set_search_query(&text, now);
                self.state.selected = 0;
            }
            KeyCode::Char(c) => {
                let text = format!("{}{c}", self.state.search_query);
                self.state.set_search_query(&text, now);
                self.state.selected = 0;
            }
            _ => {}
        }
    }

    fn on_prediction_key(&mut self, key: KeyEvent, now: Instant) {
        let Some(fixture_id) = self.state.nav.top().param_u32("fixture") else {
            self.state.input_mode = InputMode::Normal;
            return;
        };
        let home_side = self.state.input_mode == InputMode::PredictHome;
        match key.code {
            KeyCode::Esc | KeyCode::Enter => self.state.input_mode = InputMode::Normal,
            KeyCode::Tab => {
                self.state.input_mode = if home_side {
                    InputMode::PredictAway
                } else {
                    InputMode::PredictHome
                };
            }
            KeyCode::Backspace | KeyCode::Char(_) => {
                let input = self.state.prediction_input(fixture_id);
                let mut text = if home_side {
                    input.home.clone()
                } else {
                    input.away.clone()
                };
                match key.code {
                    KeyCode::Char(c) => text.push(c),
                    _ => {
                        text.pop();
                    }
                }
                if home_side {
                    input.set_home(&text, now);
                } else {
                    input.set_away(&text, now);
                }
            }
            _ => {}
        }
    }

    fn on_comment_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.state.comment_draft.clear();
                self.state.input_mode = InputMode::Normal;
            }
            KeyCode::Enter => {
                self.state.input_mode = InputMode::Normal;
                let text = std::mem::take(&mut self.state.comment_draft);
                if let Some(fixture_id) = self.state.nav.top().param_u32("fixture") {
                    self.send(ProviderCommand::PostComment { fixture_id, text });
                }
            }
            KeyCode::Backspace => {
                self.state.comment_draft.pop();
            }
            KeyCode::Char(c) => self.state.comment_draft.push(c),
            _ => {}
        }
    }

    fn shift_day(&mut self, days: i64) {
        self.state.fixtures_date += ChronoDuration::days(days);
        self.state.fixtures.clear();
        self.state.fixtures_loading = true;
        self.state.selected = 0;
        let date = self.state.fixtures_date;
        self.send(ProviderCommand::FetchFixtures { date });
        if self.state.screen() == Screen::Admin {
            self.send(ProviderCommand::FetchAdmin { date });
        }
    }

    fn open_selected(&mut self) {
        let state = &self.state;
        let selected = state.selected;
        let target = match state.screen() {
            Screen::Matches | Screen::Admin => state
                .selected_fixture()
                .map(|f| (Screen::MatchDetail, params([("fixture", f.id.to_string())]))),
            Screen::Predictions => predictions_rows(state)
                .get(selected)
                .map(|(id, _)| (Screen::MatchDetail, params([("fixture", id.to_string())]))),
            Screen::Competitions => state.competitions.get(selected).map(|c| {
                let season = c
                    .current_season
                    .unwrap_or_else(|| season_for(state.fixtures_date));
                (
                    Screen::CompetitionDetail,
                    params([
                        ("league", c.id.to_string()),
                        ("name", c.name.clone()),
                        ("logo", c.logo.clone()),
                        ("season", season.to_string()),
                    ]),
                )
            }),
            Screen::CompetitionDetail => {
                let league = state.nav.top().param_u32("league").unwrap_or_default();
                league_rows(state, league)
                    .get(selected)
                    .map(|t| team_target(t.id, &t.name, &t.logo))
            }
            Screen::TeamDetail => {
                let team = state.nav.top().param_u32("team").unwrap_or_default();
                state
                    .team_fixtures
                    .get(&team)
                    .and_then(|list| list.get(selected))
                    .map(|f| (Screen::MatchDetail, params([("fixture", f.id.to_string())])))
            }
            Screen::Search => search_target(state, selected),
            Screen::Profile => state.favorites.as_ref().and_then(|f| {
                let favs = f.favorites();
                favs.teams
                    .iter()
                    .nth(selected)
                    .map(|(id, t)| team_target(*id, &t.name, &t.logo))
            }),
            _ => None,
        };
        if let Some((screen, params)) = target {
            self.open(screen, params);
        }
    }

    fn toggle_favorite(&mut self, crown: bool) {
        let top = self.state.nav.top().clone();
        let name = top.param("name").unwrap_or_default().to_string();
        let (id, value) = match top.screen {
            Screen::TeamDetail if crown => {
                let Some(id) = top.param_u32("team") else {
                    return;
                };
                (id, FavoriteValue::Crowned(Default::default()))
            }
            Screen::TeamDetail => {
                let Some(id) = top.param_u32("team") else {
                    return;
                };
                let value = TeamFavorite {
                    name,
                    logo: top.param("logo").unwrap_or_default().to_string(),
                    team_type: "club".to_string(),
                };
                (id, FavoriteValue::Team(value))
            }
            Screen::CompetitionDetail => {
                let Some(id) = top.param_u32("league") else {
                    return;
                };
                let value = LeagueFavorite {
                    name,
                    logo: top.param("logo").unwrap_or_default().to_string(),
                };
                (id, FavoriteValue::League(value))
            }
            Screen::PlayerDetail => {
                let Some(id) = top.param_u32("player") else {
                    return;
                };
                let value = PlayerFavorite {
                    name,
                    photo: top.param("photo").unwrap_or_default().to_string(),
                    team: top.param("team").map(|s| s.to_string()),
                };
                (id, FavoriteValue::Player(value))
            }
            _ => return,
        };
        if self.state.toggle_favorite(id, value).is_none() {
            self.state.push_log("[WARN] Favorites are not available");
        }
    }

    fn maybe_refresh_fixtures(&mut self) {
        if self.last_fixtures_refresh.elapsed() < self.fixtures_refresh {
            return;
        }
        self.last_fixtures_refresh = Instant::now();
        let date = self.state.fixtures_date;
        self.send(ProviderCommand::FetchFixtures { date });
    }

    fn flush_inputs(&mut self, now: Instant) {
        if let Some(query) = self.state.poll_search(now) {
            self.send(ProviderCommand::Search { query });
        }
        for (fixture_id, kickoff, score) in self.state.ready_predictions(now) {
            self.send(ProviderCommand::SubmitPrediction {
                fixture_id,
                kickoff,
                score,
            });
        }
    }
}

fn team_target(id: u32, name: &str, logo: &str) -> (Screen, ScreenParams) {
    (
        Screen::TeamDetail,
        params([
            ("team", id.to_string()),
            ("name", name.to_string()),
            ("logo", logo.to_string()),
        ]),
    )
}

fn search_target(state: &AppState, selected: usize) -> Option<(Screen, ScreenParams)> {
    let results = &state.search_results;
    if let Some(team) = results.teams.get(selected) {
        return Some(team_target(team.id, &team.name, &team.logo));
    }
    let idx = selected.checked_sub(results.teams.len())?;
    if let Some(player) = results.players.get(idx) {
        return Some((
            Screen::PlayerDetail,
            params([
                ("player", player.id.to_string()),
                ("name", player.name.clone()),
                ("photo", player.photo.clone()),
                ("team", player.team.clone().unwrap_or_default()),
                ("position", player.position.clone().unwrap_or_default()),
            ]),
        ));
    }
    let idx = idx.checked_sub(results.players.len())?;
    results.competitions.get(idx).map(|c| {
        (
            Screen::CompetitionDetail,
            params([
                ("league", c.id.to_string()),
                ("name", c.name.clone()),
                ("logo", c.logo.clone()),
                (
                    "season",
                    c.current_season
                        .unwrap_or_else(|| season_for(state.fixtures_date))
                        .to_string(),
                ),
            ]),
        )
    })
}

fn main() -> io::Result<()> {
    load_dotenv();
    let config = AppConfig::from_env();

    let store: Arc<dyn DocumentStore> = match open_store(&config) {
        Ok(store) => Arc::new(store),
        Err(err) => {
            eprintln!("error: {err:#}");
            return Ok(());
        }
    };
    let session = match config.user_id.as_deref() {
        Some(uid) => admin::session_for(Arc::clone(&store), uid, &config.display_name),
        None => Session::guest(),
    };
    let is_admin = session.admin;
    let db = Db::new(store, session);

    let (errors, error_rx) = ErrorChannel::new();
    let local = LocalStorage::open_default();
    let first_guest_run = !db.session().is_signed_in()
        && local.as_ref().is_some_and(|l| !l.onboarding_complete());
    let favorites = FavoritesSync::new(
        db.clone(),
        local.clone(),
        PopularCatalog::default(),
        Arc::new(errors),
    );
    let mut state = AppState::new(Local::now().date_naive()).with_favorites(favorites);
    state.push_log(format!(
        "[INFO] Signed in as {}{}",
        db.session().display_name(),
        if is_admin { " (admin)" } else { "" }
    ));
    if first_guest_run {
        state.help_overlay = true;
        state.push_log("[INFO] Guest mode: favorites are limited to popular picks");
        if let Some(Err(err)) = local.as_ref().map(|l| l.mark_onboarding_complete()) {
            state.push_log(format!("[WARN] Could not save onboarding state: {err:#}"));
        }
    }

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = ratatui::backend::CrosstermBackend::new(stdout);
    let mut terminal = ratatui::Terminal::new(backend)?;

    let (tx, rx) = mpsc::channel();
    let (cmd_tx, cmd_rx) = mpsc::channel();
    spawn_provider(FootballApi::new(config.proxy_url.clone()), db.clone(), tx, cmd_rx);

    let mut app = App {
        state,
        should_quit: false,
        cmd_tx: Some(cmd_tx),
        error_rx,
        is_admin,
        display_name: db.session().display_name().to_string(),
        fixtures_refresh: config.fixtures_refresh,
        last_fixtures_refresh: Instant::now(),
    };
    app.state.fixtures_loading = true;
    app.open(Screen::Matches, ScreenParams::new());
    app.send(ProviderCommand::FetchFixtures {
        date: app.state.fixtures_date,
    });
    app.send(ProviderCommand::FetchMyPredictions);

    let res = run_app(&mut terminal, &mut app, rx);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        eprintln!("error: {err}");
    }
    Ok(())
}

fn open_store(config: &AppConfig) -> anyhow::Result<SqliteStore> {
    match config.db_path.clone().or_else(SqliteStore::default_path) {
        Some(path) => SqliteStore::open(&path),
        None => SqliteStore::open_in_memory(),
    }
}

fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    rx: mpsc::Receiver<Delta>,
) -> io::Result<()> {
    let tick_rate = Duration::from_millis(100);

    loop {
        while let Ok(delta) = rx.try_recv() {
            apply_delta(&mut app.state, delta);
        }
        app.state.drain_errors(&app.error_rx);

        let now = Instant::now();
        app.state.tick(now);
        app.flush_inputs(now);
        app.maybe_refresh_fixtures();

        terminal.draw(|f| ui(f, app))?;

        if event::poll(tick_rate)?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            app.on_key(key);
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

fn ui(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(5),
            Constraint::Length(1),
        ])
        .split(frame.size());

    render_tabs(frame, chunks[0], app);
    render_body(frame, chunks[1], &app.state);

    let console = Paragraph::new(console_text(&app.state))
        .block(Block::default().title("Console").borders(Borders::ALL));
    frame.render_widget(console, chunks[2]);

    let footer = Paragraph::new(footer_text(&app.state)).style(Style::default().fg(Color::DarkGray));
    frame.render_widget(footer, chunks[3]);

    if app.state.help_overlay {
        render_help_overlay(frame, frame.size());
    }
}

fn render_tabs(frame: &mut Frame, area: Rect, app: &App) {
    let state = &app.state;
    let titles: Vec<String> = MAIN_TABS
        .iter()
        .enumerate()
        .map(|(i, tab)| format!("{} {}", i + 1, tab.label()))
        .collect();
    let current = state.nav.current_tab();
    let selected = MAIN_TABS.iter().position(|t| *t == current).unwrap_or(0);

    let trail: Vec<&str> = state.nav.entries().iter().map(|e| e.screen.label()).collect();
    let title = format!(" PITCHSIDE | {} | {} ", app.display_name, trail.join(" > "));
    let tabs = Tabs::new(titles)
        .select(selected)
        .block(Block::default().title(title).borders(Borders::ALL))
        .highlight_style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        );
    frame.render_widget(tabs, area);
}

fn render_body(frame: &mut Frame, area: Rect, state: &AppState) {
    let now = Instant::now();
    let top = state.nav.top();
    let mut title = top.screen.label().to_string();
    if let Some(name) = top.param("name").filter(|n| !n.is_empty()) {
        title = format!("{title}: {name}");
    }
    let mounted = state
        .nav
        .entries()
        .iter()
        .enumerate()
        .filter(|(i, _)| state.nav.visibility(*i, now) == Visibility::Mounted)
        .map(|(_, e)| e.screen.label())
        .last();
    if let Some(under) = mounted {
        title = format!("{title} (from {under})");
    }

    let style = if state.nav.in_transition(now) {
        Style::default().fg(Color::DarkGray)
    } else {
        Style::default()
    };
    let mut text: Vec<Line<'static>> = header_lines(state)
        .into_iter()
        .map(|l| Line::from(Span::styled(l, Style::default().fg(Color::Cyan))))
        .collect();
    let header_len = text.len();
    let lines = screen_lines(state);
    if lines.is_empty() {
        if !matches!(top.screen, Screen::MatchDetail | Screen::PlayerDetail) {
            text.push(Line::from(Span::styled(
                empty_label(state),
                Style::default().fg(Color::DarkGray),
            )));
        }
    } else {
        text.extend(selectable(state, lines));
    }
    let visible = area.height.saturating_sub(2) as usize;
    let (start, end) = visible_range(state.selected + header_len, text.len(), visible);
    let text = text[start..end].to_vec();

    let body = Paragraph::new(text)
        .style(style)
        .block(Block::default().title(title).borders(Borders::ALL));
    frame.render_widget(body, area);
}

fn selectable(state: &AppState, lines: Vec<String>) -> Vec<Line<'static>> {
    lines
        .into_iter()
        .enumerate()
        .map(|(idx, line)| {
            if idx == state.selected {
                Line::from(Span::styled(
                    format!("> {line}"),
                    Style::default().add_modifier(Modifier::REVERSED),
                ))
            } else {
                Line::from(format!("  {line}"))
            }
        })
        .collect()
}

fn visible_range(selected: usize, total: usize, visible: usize) -> (usize, usize) {
    if total <= visible || visible == 0 {
        return (0, total);
    }
    let start = selected.saturating_sub(visible / 2).min(total - visible);
    (start, start + visible)
}

/// Fixed lines shown above the selectable list.
fn header_lines(state: &AppState) -> Vec<String> {
    let top = state.nav.top();
    match top.screen {
        Screen::Matches => vec![format!(
            "{}{}",
            state.fixtures_date.format("%a %d %b %Y"),
            if state.fixtures_loading { "  (loading)" } else { "" }
        )],
        Screen::Admin => vec![format!(
            "{}  picks: {}  pinned: {}  managed: {}",
            state.fixtures_date,
            state.admin.picks.fixture_ids.len(),
            state.admin.pinned.len(),
            state.admin.managed.len()
        )],
        Screen::MatchDetail => top
            .param_u32("fixture")
            .map(|id| match_detail_lines(state, id))
            .unwrap_or_default(),
        Screen::Search => vec![format!("Search: {}_", state.search_query)],
        Screen::Comments if state.input_mode == InputMode::Comment => {
            vec![format!("New comment: {}_", state.comment_draft)]
        }
        Screen::PlayerDetail => {
            let mut lines = Vec::new();
            if let Some(team) = top.param("team").filter(|t| !t.is_empty()) {
                lines.push(format!("Team: {team}"));
            }
            if let Some(pos) = top.param("position").filter(|p| !p.is_empty()) {
                lines.push(format!("Position: {pos}"));
            }
            let id = top.param_u32("player").unwrap_or_default();
            lines.push(star(state.is_favorite(FavoriteKind::Player, id)).to_string());
            lines
        }
        Screen::TeamDetail => {
            let id = top.param_u32("team").unwrap_or_default();
            let crowned = if state.is_favorite(FavoriteKind::CrownedTeam, id) {
                "  crowned"
            } else {
                ""
            };
            vec![format!(
                "{}{crowned}  | next fixtures",
                star(state.is_favorite(FavoriteKind::Team, id))
            )]
        }
        Screen::CompetitionDetail => {
            let id = top.param_u32("league").unwrap_or_default();
            vec![format!(
                "{}  | season {}",
                star(state.is_favorite(FavoriteKind::League, id)),
                top.param("season").unwrap_or("-")
            )]
        }
        _ => Vec::new(),
    }
}

fn match_detail_lines(state: &AppState, id: u32) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(f) = state.fixture(id) {
        lines.push(format!(
            "{} {} {}   [{}]",
            f.home.name,
            f.score_label(),
            f.away.name,
            status_label(f)
        ));
        lines.push(format!("{} | {}", f.league_name, f.round));
        if let Some(kickoff) = f.kickoff {
            lines.push(format!(
                "Kickoff {}",
                kickoff.with_timezone(&Local).format("%Y-%m-%d %H:%M")
            ));
        }
        let open = f.kickoff.is_some_and(|k| Utc::now() < k);
        let input = state.prediction_inputs.get(&id);
        let stored = state.predictions.get(&id);
        let (home, away) = match (input, stored) {
            (Some(i), _) => (i.home.clone(), i.away.clone()),
            (None, Some(p)) => (p.home_goals.to_string(), p.away_goals.to_string()),
            (None, None) => (String::new(), String::new()),
        };
        let cursor = |mode: InputMode| if state.input_mode == mode { "_" } else { "" };
        let mut line = format!(
            "Your pick: [{home}{}] - [{away}{}]",
            cursor(InputMode::PredictHome),
            cursor(InputMode::PredictAway)
        );
        if !open {
            line.push_str("  (closed)");
        }
        if let Some(points) = stored.and_then(|p| p.points) {
            line.push_str(&format!("  {points} pts"));
        }
        lines.push(line);
    } else {
        lines.push(format!("Fixture {id}"));
    }
    match state.odds.get(&id) {
        Some(odds) => {
            for market in odds.markets.iter().take(2) {
                let values: Vec<String> = market
                    .values
                    .iter()
                    .map(|v| format!("{} {:.2}", v.label, v.odd))
                    .collect();
                lines.push(format!("{} ({}): {}", market.bet, market.bookmaker, values.join("  ")));
            }
            if odds.history.is_some() {
                lines.push("Odds history available".to_string());
            }
        }
        None => lines.push("No odds".to_string()),
    }
    let comments = state.comments.get(&id).map(|c| c.len()).unwrap_or(0);
    lines.push(format!("{comments} comments (c to open)"));
    lines
}

fn star(on: bool) -> &'static str {
    if on { "[*] favorite" } else { "[ ] favorite" }
}

fn status_label(f: &Fixture) -> String {
    if f.is_live() {
        match f.elapsed {
            Some(min) => format!("{min}'"),
            None => f.status.clone(),
        }
    } else if f.status.is_empty() {
        "-".to_string()
    } else {
        f.status.clone()
    }
}

fn fixture_line(state: &AppState, f: &Fixture) -> String {
    let time = f
        .kickoff
        .map(|k| k.with_timezone(&Local).format("%H:%M").to_string())
        .unwrap_or_else(|| "--:--".to_string());
    let mut line = format!(
        "{time} {:>5} {} {} {}  ({})",
        status_label(f),
        f.home.name,
        f.score_label(),
        f.away.name,
        f.league_name
    );
    if let Some(p) = state.predictions.get(&f.id) {
        line.push_str(&format!("  pick {}-{}", p.home_goals, p.away_goals));
    }
    if state.admin.picks.fixture_ids.contains(&f.id) {
        line.push_str("  [daily]");
    }
    if state.admin.pinned.iter().any(|p| p.fixture_id == f.id) {
        line.push_str("  [pinned]");
    }
    line
}

fn predictions_rows(state: &AppState) -> Vec<(u32, String)> {
    let mut rows: Vec<(u32, String)> = state
        .predictions
        .values()
        .map(|p| {
            let label = state
                .fixture(p.fixture_id)
                .map(|f| format!("{} vs {}", f.home.name, f.away.name))
                .unwrap_or_else(|| format!("Fixture {}", p.fixture_id));
            let points = p
                .points
                .map(|pts| format!("{pts} pts"))
                .unwrap_or_else(|| "pending".to_string());
            (
                p.fixture_id,
                format!("{label}: {}-{}  {points}", p.home_goals, p.away_goals),
            )
        })
        .collect();
    rows.sort_by(|a, b| b.0.cmp(&a.0));
    rows
}

/// Selectable rows of the current screen.
fn screen_lines(state: &AppState) -> Vec<String> {
    let top = state.nav.top();
    match top.screen {
        Screen::Matches | Screen::Admin => state
            .fixtures
            .iter()
            .map(|f| fixture_line(state, f))
            .collect(),
        Screen::Competitions => state
            .competitions
            .iter()
            .map(|c| {
                let fav = if state.is_favorite(FavoriteKind::League, c.id) { "* " } else { "" };
                match state.country_code(&c.country) {
                    Some(code) => format!("{fav}{} ({} {code}, {})", c.name, c.country, c.kind),
                    None => format!("{fav}{} ({}, {})", c.name, c.country, c.kind),
                }
            })
            .collect(),
        Screen::News => state
            .news
            .iter()
            .map(|n| {
                let when = chrono::DateTime::from_timestamp_millis(n.published_at)
                    .map(|d| d.with_timezone(&Local).format("%d %b %H:%M").to_string())
                    .unwrap_or_default();
                format!("{when}  {}", n.title)
            })
            .collect(),
        Screen::Predictions => predictions_rows(state).into_iter().map(|(_, l)| l).collect(),
        Screen::Profile => profile_lines(state),
        Screen::MatchDetail | Screen::PlayerDetail => Vec::new(),
        Screen::CompetitionDetail => {
            let league = top.param_u32("league").unwrap_or_default();
            // Cups without a table list their teams instead.
            if state.standings.get(&league).is_none_or(|rows| rows.is_empty()) {
                return state
                    .league_teams
                    .get(&league)
                    .map(|teams| teams.iter().map(|t| t.name.clone()).collect())
                    .unwrap_or_default();
            }
            state
                .standings
                .get(&league)
                .map(|rows| {
                    rows.iter()
                        .map(|r| {
                            format!(
                                "{:>2}. {:<24} {:>3} pts  P{} W{} D{} L{}  GD {:+}  {}",
                                r.rank,
                                r.team.name,
                                r.points,
                                r.played,
                                r.win,
                                r.draw,
                                r.lose,
                                r.goals_diff,
                                r.form
                            )
                        })
                        .collect()
                })
                .unwrap_or_default()
        }
        Screen::TeamDetail => {
            let team = top.param_u32("team").unwrap_or_default();
            state
                .team_fixtures
                .get(&team)
                .map(|list| list.iter().map(|f| fixture_line(state, f)).collect())
                .unwrap_or_default()
        }
        Screen::Search => {
            let r = &state.search_results;
            r.teams
                .iter()
                .map(|t| format!("Team    {}", t.name))
                .chain(r.players.iter().map(|p| {
                    format!(
                        "Player  {}{}",
                        p.name,
                        p.team.as_deref().map(|t| format!(" ({t})")).unwrap_or_default()
                    )
                }))
                .chain(
                    r.competitions
                        .iter()
                        .map(|c| format!("League  {} ({})", c.name, c.country)),
                )
                .collect()
        }
        Screen::Leaderboard => state
            .leaderboard
            .iter()
            .enumerate()
            .map(|(i, e)| {
                format!(
                    "{:>3}. {:<20} {:>4} pts  {} picks  {} exact",
                    i + 1,
                    e.display_name,
                    e.total_points,
                    e.predictions_count,
                    e.exact_scores
                )
            })
            .collect(),
        Screen::Comments => {
            let fixture = top.param_u32("fixture").unwrap_or_default();
            state
                .comments
                .get(&fixture)
                .map(|list| {
                    list.iter()
                        .map(|c| format!("{}: {}  ({} likes)", c.display_name, c.text, c.like_count))
                        .collect()
                })
                .unwrap_or_default()
        }
    }
}

/// Teams behind the rows of a competition screen: table order, else the team list.
fn league_rows(state: &AppState, league: u32) -> Vec<TeamRef> {
    match state.standings.get(&league) {
        Some(rows) if !rows.is_empty() => rows.iter().map(|r| r.team.clone()).collect(),
        _ => state.league_teams.get(&league).cloned().unwrap_or_default(),
    }
}

fn profile_lines(state: &AppState) -> Vec<String> {
    let Some(sync) = state.favorites.as_ref() else {
        return Vec::new();
    };
    let favs = sync.favorites();
    let mut lines: Vec<String> = favs
        .teams
        .iter()
        .map(|(id, t)| {
            let crown = favs
                .crowned_teams
                .get(id)
                .map(|c| format!("  crowned {}", c.note))
                .unwrap_or_default();
            format!("Team    {}{crown}", t.name)
        })
        .collect();
    lines.extend(favs.leagues.values().map(|l| format!("League  {}", l.name)));
    lines.extend(favs.players.values().map(|p| format!("Player  {}", p.name)));
    if sync.is_guest() {
        lines.push(format!(
            "Guest mode: {} popular picks available",
            sync.popular().ids(FavoriteKind::Team).len()
                + sync.popular().ids(FavoriteKind::League).len()
                + sync.popular().ids(FavoriteKind::Player).len()
        ));
    }
    lines
}

fn list_len(state: &AppState) -> usize {
    match state.screen() {
        Screen::Profile => state
            .favorites
            .as_ref()
            .map(|f| f.favorites().teams.len())
            .unwrap_or(0),
        Screen::Search => state.search_results.len(),
        _ => screen_lines(state).len(),
    }
}

fn empty_label(state: &AppState) -> String {
    match state.screen() {
        Screen::Matches if state.fixtures_loading => "Loading fixtures...".to_string(),
        Screen::Matches => "No fixtures on this day".to_string(),
        Screen::Search if state.search_query.trim().chars().count() < SEARCH_MIN_CHARS => {
            format!("Type at least {SEARCH_MIN_CHARS} characters")
        }
        Screen::Search => "No results".to_string(),
        Screen::Profile => "No favorites yet".to_string(),
        screen => format!("Nothing in {screen} yet"),
    }
}

fn footer_text(state: &AppState) -> String {
    match state.input_mode {
        InputMode::Search => return "Type to search | ↑/↓ Move | Enter Open | Esc Done".to_string(),
        InputMode::PredictHome | InputMode::PredictAway => {
            return "Digits set the score | Tab Switch side | Enter/Esc Done".to_string();
        }
        InputMode::Comment => return "Type your comment | Enter Post | Esc Cancel".to_string(),
        InputMode::Normal => {}
    }
    let screen_keys = match state.screen() {
        Screen::Matches => "[/] Day | Enter Match",
        Screen::MatchDetail => "h/a Predict | c Comments | o Odds",
        Screen::Comments => "i Write | l Like",
        Screen::TeamDetail => "f Favorite | C Crown",
        Screen::CompetitionDetail | Screen::PlayerDetail => "f Favorite",
        Screen::Admin => "[/] Day | p Pin | d Daily pick",
        _ => "Enter Open",
    };
    format!("1-5 Tabs | j/k Move | {screen_keys} | / Search | L Leaderboard | b Back | ? Help | q Quit")
}

fn console_text(state: &AppState) -> String {
    let lines: Vec<&str> = state
        .logs
        .iter()
        .rev()
        .take(3)
        .map(String::as_str)
        .collect();
    lines.into_iter().rev().collect::<Vec<_>>().join("\n")
}

fn render_help_overlay(frame: &mut Frame, area: Rect) {
    let popup_area = centered_rect(60, 60, area);
    frame.render_widget(Clear, popup_area);

    let text = [
        "Pitchside - Help",
        "",
        "Global:",
        "  1-5          Matches / Competitions / News / Predictions / Profile",
        "  Enter        Open selection",
        "  b / Esc      Back",
        "  /            Search teams, players, leagues",
        "  L            Leaderboard",
        "  A            Admin (admins only)",
        "  f            Toggle favorite",
        "  ?            Toggle help",
        "  q            Quit",
        "",
        "Match:",
        "  h / a        Edit home / away prediction",
        "  c            Comments",
        "",
        "Competitions:",
        "  r            Reload competition lists",
    ]
    .join("\n");

    let help = Paragraph::new(text)
        .block(Block::default().title("Help").borders(Borders::ALL))
        .style(Style::default());
    frame.render_widget(help, popup_area);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1]);

    horizontal[1]
}
