//! Update-window policy.
//!
//! Every `interval_secs`-long cycle starting at genesis opens with a
//! `window_secs`-long update window; the remainder of the cycle is locked.
//! Nothing is scheduled: callers evaluate the policy against the ledger
//! clock at the moment a mutation is attempted.

use soroban_sdk::contracttype;

use crate::StakeError;

/// Snapshot of the window policy at a given ledger timestamp.
#[contracttype]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WindowState {
    /// True while ledger mutations are permitted.
    pub open: bool,
    /// Zero-based index of the current cycle.
    pub cycle: u64,
    /// Seconds elapsed since the start of the current cycle.
    pub position: u64,
    /// Timestamp at which `open` next flips.
    pub next_change: u64,
}

/// Evaluate the window policy at `now`.
///
/// Returns `ClockError` if `now` precedes `genesis`. The closed side of the
/// boundary is exclusive: `position == window_secs` is already locked.
pub fn window_state(
    genesis: u64,
    interval_secs: u64,
    window_secs: u64,
    now: u64,
) -> Result<WindowState, StakeError> {
    let elapsed = now.checked_sub(genesis).ok_or(StakeError::ClockError)?;
    if interval_secs == 0 {
        return Err(StakeError::InvalidConfig);
    }
    let cycle = elapsed / interval_secs;
    let position = elapsed % interval_secs;
    let open = position < window_secs;

    let cycle_start = genesis.saturating_add(cycle.saturating_mul(interval_secs));
    let next_change = if open {
        cycle_start.saturating_add(window_secs)
    } else {
        cycle_start.saturating_add(interval_secs)
    };

    Ok(WindowState {
        open,
        cycle,
        position,
        next_change,
    })
}

/// Fail with `WindowClosed` unless a mutation is permitted at `now`.
pub fn require_window_open(
    genesis: u64,
    interval_secs: u64,
    window_secs: u64,
    now: u64,
) -> Result<WindowState, StakeError> {
    let state = window_state(genesis, interval_secs, window_secs, now)?;
    if !state.open {
        return Err(StakeError::WindowClosed);
    }
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: u64 = 2_592_000;
    const WINDOW: u64 = 604_800;

    #[test]
    fn open_at_genesis() {
        let state = window_state(1_000, INTERVAL, WINDOW, 1_000).unwrap();
        assert!(state.open);
        assert_eq!(state.cycle, 0);
        assert_eq!(state.position, 0);
        assert_eq!(state.next_change, 1_000 + WINDOW);
    }

    #[test]
    fn last_open_second_and_first_closed_second() {
        let g = 50;
        assert!(window_state(g, INTERVAL, WINDOW, g + 604_799).unwrap().open);

        let closed = window_state(g, INTERVAL, WINDOW, g + 604_800).unwrap();
        assert!(!closed.open);
        assert_eq!(closed.next_change, g + INTERVAL);
    }

    #[test]
    fn reopens_every_cycle() {
        let state = window_state(0, INTERVAL, WINDOW, 2 * INTERVAL + 10).unwrap();
        assert!(state.open);
        assert_eq!(state.cycle, 2);
        assert_eq!(state.position, 10);

        // 62 days in: day 2 of the third cycle.
        assert!(window_state(0, INTERVAL, WINDOW, 5_356_800).unwrap().open);
        // 30 days + 5s: start of the second cycle.
        assert!(window_state(0, INTERVAL, WINDOW, 2_592_005).unwrap().open);
        // Day 8 of the first cycle.
        assert!(!window_state(0, INTERVAL, WINDOW, 8 * 86_400).unwrap().open);
    }

    #[test]
    fn clock_before_genesis() {
        assert_eq!(
            window_state(100, INTERVAL, WINDOW, 99),
            Err(StakeError::ClockError)
        );
    }

    #[test]
    fn window_equal_to_interval_is_always_open() {
        for now in [0, 1, INTERVAL - 1, INTERVAL, 7 * INTERVAL + 3] {
            assert!(window_state(0, INTERVAL, INTERVAL, now).unwrap().open);
        }
    }

    #[test]
    fn require_open_maps_closed_to_error() {
        assert_eq!(
            require_window_open(0, INTERVAL, WINDOW, WINDOW).map(|s| s.open),
            Err(StakeError::WindowClosed)
        );
        assert!(require_window_open(0, INTERVAL, WINDOW, WINDOW - 1).is_ok());
    }
}
