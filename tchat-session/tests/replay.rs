use tchat_session::{ReplayMode, ReplayState, REPLAY_WINDOW};

#[test]
fn strict_mode_requires_monotonic_sequences() {
    let mut state = ReplayState::default();
    assert!(state.accept(1, ReplayMode::Strict));
    assert!(state.accept(2, ReplayMode::Strict));
    assert!(state.accept(5, ReplayMode::Strict), "gaps are fine, going back is not");
    assert!(!state.accept(5, ReplayMode::Strict));
    assert!(!state.accept(3, ReplayMode::Strict));
    assert!(state.accept(6, ReplayMode::Strict));
    assert_eq!(state.highest(), 6);
}

#[test]
fn windowed_mode_accepts_reordering_within_window() {
    let mut state = ReplayState::default();
    assert!(state.accept(10, ReplayMode::Windowed));
    // Late arrivals inside the window, each exactly once.
    assert!(state.accept(7, ReplayMode::Windowed));
    assert!(state.accept(9, ReplayMode::Windowed));
    assert!(!state.accept(9, ReplayMode::Windowed), "window remembers 9");
    assert!(!state.accept(10, ReplayMode::Windowed), "highest itself replays");
    assert!(state.accept(8, ReplayMode::Windowed));
}

#[test]
fn windowed_mode_rejects_sequences_older_than_the_window() {
    let mut state = ReplayState::default();
    assert!(state.accept(100, ReplayMode::Windowed));
    // 100 − 63 = 37 is the oldest trackable sequence.
    assert!(state.accept(100 - (REPLAY_WINDOW - 1), ReplayMode::Windowed));
    assert!(!state.accept(100 - REPLAY_WINDOW, ReplayMode::Windowed));
    assert!(!state.accept(1, ReplayMode::Windowed));
}

#[test]
fn windowed_mode_slides_forward() {
    let mut state = ReplayState::default();
    assert!(state.accept(1, ReplayMode::Windowed));
    assert!(state.accept(2, ReplayMode::Windowed));
    // Jump far ahead: everything before the new window is gone.
    assert!(state.accept(1000, ReplayMode::Windowed));
    assert!(!state.accept(2, ReplayMode::Windowed));
    assert!(!state.accept(1000, ReplayMode::Windowed));
    assert!(state.accept(999, ReplayMode::Windowed));
}

#[test]
fn windowed_jump_inside_window_keeps_history() {
    let mut state = ReplayState::default();
    assert!(state.accept(10, ReplayMode::Windowed));
    assert!(state.accept(20, ReplayMode::Windowed));
    // 10 slid to bit 10 of the window and must still be remembered.
    assert!(!state.accept(10, ReplayMode::Windowed));
    assert!(state.accept(15, ReplayMode::Windowed));
}
