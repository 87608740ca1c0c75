//! Tests for the match state machine.

use chrono::Utc;
use strictly_gomoku::{
    InvariantSet, MatchErrorKind, MatchInvariants, MatchState, Phase, Placement, Position, Rules,
    Stone,
};

fn started(rules: Rules) -> MatchState {
    let mut state = MatchState::new(rules);
    state.assign_seat("alice");
    state.assign_seat("bob");
    state.start(Utc::now()).expect("both seats filled");
    state
}

/// Colouring of a 15×15 board with no run longer than two on any axis.
fn is_black_cell(row: i32, col: i32) -> bool {
    (col + 2 * row) % 4 < 2
}

#[test]
fn test_turn_follows_move_parity() {
    let mut state = started(Rules::default());
    let plays = [(7, 7), (8, 8), (6, 6), (0, 14), (3, 9), (12, 1), (10, 10)];
    for (row, col) in plays {
        let expected = if state.move_count() % 2 == 0 {
            Stone::Black
        } else {
            Stone::White
        };
        assert_eq!(state.current_player(), expected);
        state
            .place(state.current_player(), Position::new(row, col))
            .expect("legal move");
    }
    assert_eq!(state.move_count(), plays.len());
    assert!(state.is_balanced());
}

#[test]
fn test_rejected_placements_leave_state_unchanged() {
    let mut state = started(Rules::default());
    state.place(Stone::Black, Position::new(7, 7)).unwrap();
    let before = state.clone();

    let err = state.place(Stone::White, Position::new(7, 7)).unwrap_err();
    assert_eq!(err.kind(), &MatchErrorKind::CellOccupied(Position::new(7, 7)));
    assert_eq!(state, before);

    for pos in [Position::new(-1, 0), Position::new(0, 15), Position::new(15, 15)] {
        let err = state.place(Stone::White, pos).unwrap_err();
        assert_eq!(err.kind(), &MatchErrorKind::OutOfBounds(pos));
        assert_eq!(state, before);
    }

    // Replaying a rejection yields the same rejection.
    for _ in 0..3 {
        let err = state.place(Stone::Black, Position::new(0, 0)).unwrap_err();
        assert_eq!(err.kind(), &MatchErrorKind::NotYourTurn(Stone::White));
    }
    assert_eq!(state, before);
}

#[test]
fn test_three_plays_alternate_turns() {
    let mut state = started(Rules::default());
    let mut seen = vec![state.current_player()];
    for (row, col) in [(7, 7), (8, 8), (6, 6)] {
        state.place(state.current_player(), Position::new(row, col)).unwrap();
        seen.push(state.current_player());
    }
    assert_eq!(seen, vec![Stone::Black, Stone::White, Stone::Black, Stone::White]);
    assert_eq!(state.move_count(), 3);
}

#[test]
fn test_top_row_win_reports_line_left_to_right() {
    let mut state = started(Rules::default());
    let mut outcome = Placement::Continue;
    for col in 0..5 {
        outcome = state.place(Stone::Black, Position::new(0, col)).unwrap();
        if col < 4 {
            state.place(Stone::White, Position::new(10, col * 2)).unwrap();
        }
    }
    assert_eq!(state.phase(), Phase::BlackWins);
    let Placement::Won(line) = outcome else {
        panic!("expected a win, got {outcome:?}");
    };
    let expected: Vec<_> = (0..5).map(|col| Position::new(0, col)).collect();
    assert_eq!(line.positions, expected);

    // Terminal phases are absorbing.
    let before = state.clone();
    let err = state.place(Stone::White, Position::new(5, 5)).unwrap_err();
    assert!(matches!(err.kind(), MatchErrorKind::InvalidState(_)));
    assert_eq!(state, before);
}

#[test]
fn test_full_board_without_run_is_draw() {
    let mut state = started(Rules::default());
    let (black, white): (Vec<_>, Vec<_>) = (0..225)
        .map(|idx| Position::from_index(idx, 15))
        .partition(|p| is_black_cell(p.row, p.col));
    assert_eq!(black.len(), white.len() + 1);

    for (i, pos) in black.iter().enumerate() {
        let outcome = state.place(Stone::Black, *pos).unwrap();
        if let Some(w) = white.get(i) {
            assert_eq!(outcome, Placement::Continue);
            state.place(Stone::White, *w).unwrap();
        } else {
            assert_eq!(outcome, Placement::Draw);
        }
    }

    assert_eq!(state.phase(), Phase::Draw);
    assert_eq!(state.move_count(), 225);
    assert!(MatchInvariants::check_all(&state).is_ok());
}

#[test]
fn test_small_rules_diagonal_win() {
    let rules = Rules::new(3, 3).unwrap();
    let mut state = started(rules);
    state.place(Stone::Black, Position::new(0, 0)).unwrap();
    state.place(Stone::White, Position::new(1, 0)).unwrap();
    state.place(Stone::Black, Position::new(1, 1)).unwrap();
    state.place(Stone::White, Position::new(2, 0)).unwrap();
    let outcome = state.place(Stone::Black, Position::new(2, 2)).unwrap();
    assert!(matches!(outcome, Placement::Won(_)));
    assert_eq!(state.phase().winner(), Some(Stone::Black));
}

#[test]
fn test_undo_then_replay_same_cell() {
    let mut state = started(Rules::default());
    state.place(Stone::Black, Position::new(7, 7)).unwrap();
    state.undo(Stone::Black).unwrap();
    assert_eq!(state.move_count(), 0);
    assert_eq!(state.current_player(), Stone::Black);
    assert_eq!(state.last_move(), None);
    state.place(Stone::Black, Position::new(7, 7)).unwrap();
    assert_eq!(state.move_count(), 1);
}

#[test]
fn test_undo_refused_after_win() {
    let mut state = started(Rules::new(5, 3).unwrap());
    state.place(Stone::Black, Position::new(0, 0)).unwrap();
    state.place(Stone::White, Position::new(4, 4)).unwrap();
    state.place(Stone::Black, Position::new(0, 1)).unwrap();
    state.place(Stone::White, Position::new(4, 3)).unwrap();
    state.place(Stone::Black, Position::new(0, 2)).unwrap();
    assert_eq!(state.phase(), Phase::BlackWins);

    let before = state.clone();
    let err = state.undo(Stone::Black).unwrap_err();
    assert!(matches!(err.kind(), MatchErrorKind::InvalidState(_)));
    assert_eq!(state, before);
}
