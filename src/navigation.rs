use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

pub const ENTER_TRANSITION: Duration = Duration::from_millis(300);
pub const EXIT_TRANSITION: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Screen {
    Matches,
    Competitions,
    News,
    Predictions,
    Profile,
    MatchDetail,
    CompetitionDetail,
    TeamDetail,
    PlayerDetail,
    Search,
    Leaderboard,
    Comments,
    Admin,
}

pub const MAIN_TABS: [Screen; 5] = [
    Screen::Matches,
    Screen::Competitions,
    Screen::News,
    Screen::Predictions,
    Screen::Profile,
];

impl Screen {
    pub fn is_main_tab(self) -> bool {
        MAIN_TABS.contains(&self)
    }

    pub fn label(self) -> &'static str {
        match self {
            Screen::Matches => "Matches",
            Screen::Competitions => "Competitions",
            Screen::News => "News",
            Screen::Predictions => "Predictions",
            Screen::Profile => "Profile",
            Screen::MatchDetail => "Match",
            Screen::CompetitionDetail => "Competition",
            Screen::TeamDetail => "Team",
            Screen::PlayerDetail => "Player",
            Screen::Search => "Search",
            Screen::Leaderboard => "Leaderboard",
            Screen::Comments => "Comments",
            Screen::Admin => "Admin",
        }
    }
}

impl fmt::Display for Screen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub type ScreenParams = BTreeMap<String, String>;

pub fn params<const N: usize>(pairs: [(&str, String); N]) -> ScreenParams {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackEntry {
    pub key: String,
    pub screen: Screen,
    pub params: ScreenParams,
}

impl StackEntry {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn param_u32(&self, name: &str) -> Option<u32> {
        self.param(name)?.parse().ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Receives input and header actions.
    Active,
    /// Kept mounted under the active screen while a transition runs.
    Mounted,
    Hidden,
}

/// In-memory screen stack. Never empty.
#[derive(Debug, Clone)]
pub struct Navigator {
    stack: Vec<StackEntry>,
    next_seq: u64,
    entering_until: Option<Instant>,
    exiting_until: Option<Instant>,
}

impl Navigator {
    pub fn new(initial: Screen) -> Self {
        let mut nav = Self {
            stack: Vec::with_capacity(8),
            next_seq: 0,
            entering_until: None,
            exiting_until: None,
        };
        let entry = nav.entry(initial, ScreenParams::new());
        nav.stack.push(entry);
        nav
    }

    pub fn navigate(&mut self, screen: Screen, params: ScreenParams, now: Instant) {
        self.tick(now);
        // A pending back completes before the new frame lands on top of it.
        if self.exiting_until.take().is_some() && self.stack.len() > 1 {
            self.stack.pop();
        }
        let top = self.top().screen;
        if screen.is_main_tab() {
            if top == screen {
                return;
            }
            let entry = self.entry(screen, params);
            self.stack.clear();
            self.stack.push(entry);
            self.entering_until = None;
            return;
        }
        if top == screen {
            return;
        }
        let entry = self.entry(screen, params);
        self.stack.push(entry);
        self.entering_until = Some(now + ENTER_TRANSITION);
    }

    /// Starts the exit transition; the pop lands on the first `tick` after it ends.
    pub fn go_back(&mut self, now: Instant) {
        self.tick(now);
        if self.stack.len() <= 1 || self.exiting_until.is_some() {
            return;
        }
        self.entering_until = None;
        self.exiting_until = Some(now + EXIT_TRANSITION);
    }

    /// Settles finished transitions. Returns true when the stack changed.
    pub fn tick(&mut self, now: Instant) -> bool {
        if self.entering_until.is_some_and(|until| now >= until) {
            self.entering_until = None;
        }
        let Some(until) = self.exiting_until else {
            return false;
        };
        if now < until {
            return false;
        }
        self.exiting_until = None;
        if self.stack.len() > 1 {
            self.stack.pop();
            return true;
        }
        false
    }

    pub fn top(&self) -> &StackEntry {
        // The stack is created with one entry and never drops below one.
        &self.stack[self.stack.len() - 1]
    }

    pub fn previous(&self) -> Option<&StackEntry> {
        self.stack.iter().rev().nth(1)
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn entries(&self) -> &[StackEntry] {
        &self.stack
    }

    pub fn is_entering(&self, now: Instant) -> bool {
        self.entering_until.is_some_and(|until| now < until)
    }

    pub fn is_exiting(&self) -> bool {
        self.exiting_until.is_some()
    }

    pub fn in_transition(&self, now: Instant) -> bool {
        self.is_entering(now) || self.is_exiting()
    }

    pub fn visibility(&self, index: usize, now: Instant) -> Visibility {
        let len = self.stack.len();
        if index + 1 == len {
            Visibility::Active
        } else if index + 2 == len && self.in_transition(now) {
            Visibility::Mounted
        } else {
            Visibility::Hidden
        }
    }

    /// Entries that must stay mounted right now, bottom first.
    pub fn mounted(&self, now: Instant) -> Vec<&StackEntry> {
        self.stack
            .iter()
            .enumerate()
            .filter(|(idx, _)| self.visibility(*idx, now) != Visibility::Hidden)
            .map(|(_, entry)| entry)
            .collect()
    }

    /// The main tab the current history was rooted in.
    pub fn current_tab(&self) -> Screen {
        self.stack
            .first()
            .map(|e| e.screen)
            .filter(|s| s.is_main_tab())
            .unwrap_or(Screen::Matches)
    }

    fn entry(&mut self, screen: Screen, params: ScreenParams) -> StackEntry {
        self.next_seq += 1;
        StackEntry {
            key: format!("{}-{}", screen.label().to_ascii_lowercase(), self.next_seq),
            screen,
            params,
        }
    }
}

impl Default for Navigator {
    fn default() -> Self {
        Self::new(Screen::Matches)
    }
}
