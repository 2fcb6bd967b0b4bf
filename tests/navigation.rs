use std::time::{Duration, Instant};

use pitchside::navigation::{
    EXIT_TRANSITION, MAIN_TABS, Navigator, Screen, ScreenParams, Visibility, params,
};

fn detail(id: u32) -> ScreenParams {
    params([("fixture", id.to_string())])
}

#[test]
fn main_tab_navigation_always_leaves_one_entry() {
    let t0 = Instant::now();
    let mut nav = Navigator::new(Screen::Matches);
    nav.navigate(Screen::MatchDetail, detail(1), t0);
    nav.navigate(Screen::TeamDetail, params([("team", "33".to_string())]), t0);
    nav.navigate(Screen::Comments, detail(1), t0);
    assert_eq!(nav.len(), 4);

    for tab in MAIN_TABS {
        nav.navigate(tab, ScreenParams::new(), t0);
        assert_eq!(nav.len(), 1);
        assert_eq!(nav.top().screen, tab);
    }
}

#[test]
fn main_tab_on_itself_is_a_no_op() {
    let t0 = Instant::now();
    let mut nav = Navigator::new(Screen::News);
    let key = nav.top().key.clone();
    nav.navigate(Screen::News, ScreenParams::new(), t0);
    assert_eq!(nav.len(), 1);
    assert_eq!(nav.top().key, key);
}

#[test]
fn detail_navigation_grows_by_one_except_duplicate_top() {
    let t0 = Instant::now();
    let mut nav = Navigator::new(Screen::Matches);

    nav.navigate(Screen::MatchDetail, detail(10), t0);
    assert_eq!(nav.len(), 2);
    assert!(nav.is_entering(t0));

    nav.navigate(Screen::MatchDetail, detail(11), t0);
    assert_eq!(nav.len(), 2, "same screen on top is not pushed twice");
    assert_eq!(nav.top().param_u32("fixture"), Some(10));

    nav.navigate(Screen::Comments, detail(10), t0);
    assert_eq!(nav.len(), 3);
    nav.navigate(Screen::MatchDetail, detail(12), t0);
    assert_eq!(nav.len(), 4, "a screen deeper in the stack can be pushed again");
}

#[test]
fn go_back_is_a_no_op_on_a_single_entry() {
    let t0 = Instant::now();
    let mut nav = Navigator::new(Screen::Profile);
    nav.go_back(t0);
    assert!(!nav.is_exiting());
    assert!(!nav.tick(t0 + Duration::from_secs(5)));
    assert_eq!(nav.len(), 1);
}

#[test]
fn go_back_pops_after_the_exit_delay() {
    let t0 = Instant::now();
    let mut nav = Navigator::new(Screen::Matches);
    nav.navigate(Screen::MatchDetail, detail(1), t0);
    nav.navigate(Screen::Comments, detail(1), t0);

    nav.go_back(t0);
    assert!(nav.is_exiting());
    assert!(!nav.tick(t0 + Duration::from_millis(100)));
    assert_eq!(nav.len(), 3, "top stays mounted during the exit transition");

    assert!(nav.tick(t0 + EXIT_TRANSITION));
    assert_eq!(nav.len(), 2);
    assert_eq!(nav.top().screen, Screen::MatchDetail);
}

#[test]
fn repeated_back_during_exit_pops_once() {
    let t0 = Instant::now();
    let mut nav = Navigator::new(Screen::Matches);
    nav.navigate(Screen::MatchDetail, detail(1), t0);
    nav.navigate(Screen::Comments, detail(1), t0);

    nav.go_back(t0);
    nav.go_back(t0 + Duration::from_millis(50));
    nav.tick(t0 + Duration::from_secs(1));
    assert_eq!(nav.len(), 2);
}

#[test]
fn navigate_during_exit_finishes_the_pending_back_first() {
    let t0 = Instant::now();
    let mut nav = Navigator::new(Screen::Matches);
    nav.navigate(Screen::MatchDetail, detail(1), t0);
    nav.navigate(Screen::Comments, detail(1), t0);

    nav.go_back(t0);
    nav.navigate(Screen::Leaderboard, ScreenParams::new(), t0 + Duration::from_millis(10));
    let screens: Vec<Screen> = nav.entries().iter().map(|e| e.screen).collect();
    assert_eq!(
        screens,
        vec![Screen::Matches, Screen::MatchDetail, Screen::Leaderboard]
    );
    assert!(!nav.is_exiting());
}

#[test]
fn second_from_top_stays_mounted_only_during_transitions() {
    let t0 = Instant::now();
    let mut nav = Navigator::new(Screen::Matches);
    nav.navigate(Screen::MatchDetail, detail(1), t0);
    nav.navigate(Screen::Comments, detail(1), t0);

    assert_eq!(nav.visibility(2, t0), Visibility::Active);
    assert_eq!(nav.visibility(1, t0), Visibility::Mounted);
    assert_eq!(nav.visibility(0, t0), Visibility::Hidden);
    assert_eq!(nav.mounted(t0).len(), 2);

    let later = t0 + Duration::from_secs(1);
    nav.tick(later);
    assert_eq!(nav.visibility(1, later), Visibility::Hidden);
    assert_eq!(nav.mounted(later).len(), 1);
}

#[test]
fn entry_keys_are_unique_across_the_navigator_lifetime() {
    let t0 = Instant::now();
    let mut nav = Navigator::new(Screen::Matches);
    let mut keys = vec![nav.top().key.clone()];
    for round in 0..3 {
        nav.navigate(Screen::MatchDetail, detail(round), t0);
        keys.push(nav.top().key.clone());
        nav.navigate(Screen::Competitions, ScreenParams::new(), t0);
        keys.push(nav.top().key.clone());
        nav.navigate(Screen::Matches, ScreenParams::new(), t0);
        keys.push(nav.top().key.clone());
    }
    let mut deduped = keys.clone();
    deduped.sort();
    deduped.dedup();
    assert_eq!(deduped.len(), keys.len());
    assert!(keys[0].starts_with("matches-"));
}

#[test]
fn current_tab_follows_the_stack_root() {
    let t0 = Instant::now();
    let mut nav = Navigator::new(Screen::Matches);
    nav.navigate(Screen::Competitions, ScreenParams::new(), t0);
    nav.navigate(Screen::CompetitionDetail, params([("league", "39".to_string())]), t0);
    assert_eq!(nav.current_tab(), Screen::Competitions);
    assert_eq!(nav.previous().map(|e| e.screen), Some(Screen::Competitions));
}
