//! Timer-gated winner selection.
//!
//! The machine is driven from a single event loop: membership changes arrive
//! through [`MembershipObserver`], timers through [`SelectionStateMachine::poll`]
//! or [`SelectionStateMachine::on_timer`]. Every armed timer carries an epoch;
//! a token whose epoch is not the live one is stale and never touches the phase.

use log::{debug, info, warn};
use rand::{Rng, rngs::StdRng};
use serde::Serialize;
use std::{mem, time::Duration};

use crate::clock::Clock;
use crate::tracker::{MembershipObserver, TouchId, TouchTracker};

/// Touches required before a round starts.
pub const MIN_TOUCHES: usize = 2;

/// Shortest window a timer is armed for; a zero window would fire forever at
/// the same instant.
pub const MIN_WINDOW: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Pool must stay unchanged this long before a draw.
    pub waiting: Duration,
    /// How long a winner stays chosen.
    pub chosen: Duration,
}

impl Timing {
    /// Both windows raised to at least [`MIN_WINDOW`].
    pub fn clamped(self) -> Self {
        Self {
            waiting: self.waiting.max(MIN_WINDOW),
            chosen: self.chosen.max(MIN_WINDOW),
        }
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            waiting: Duration::from_millis(2000),
            chosen: Duration::from_millis(3000),
        }
    }
}

/// An armed single-shot timer. Owned by exactly one phase.
#[derive(Debug, PartialEq, Eq)]
pub struct TimerHandle {
    epoch: u64,
    deadline: Duration,
}

impl TimerHandle {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Waiting { timer: TimerHandle },
    Chosen { winners: Vec<TouchId>, timer: TimerHandle },
}

impl Phase {
    pub fn kind(&self) -> PhaseKind {
        match self {
            Phase::Idle => PhaseKind::Idle,
            Phase::Waiting { .. } => PhaseKind::Waiting,
            Phase::Chosen { .. } => PhaseKind::Chosen,
        }
    }

    pub fn timer(&self) -> Option<&TimerHandle> {
        match self {
            Phase::Idle => None,
            Phase::Waiting { timer } | Phase::Chosen { timer, .. } => Some(timer),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseKind {
    Idle,
    Waiting,
    Chosen,
}

#[derive(Debug)]
pub struct SelectionStateMachine<C: Clock> {
    phase: Phase,
    timing: Timing,
    clock: C,
    rng: StdRng,
    last_epoch: u64,
}

impl<C: Clock> SelectionStateMachine<C> {
    pub fn new(timing: Timing, clock: C, rng: StdRng) -> Self {
        Self {
            phase: Phase::Idle,
            timing: timing.clamped(),
            clock,
            rng,
            last_epoch: 0,
        }
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn timing(&self) -> Timing {
        self.timing
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Winners while chosen, empty otherwise.
    pub fn chosen_ids(&self) -> &[TouchId] {
        match &self.phase {
            Phase::Chosen { winners, .. } => winners,
            _ => &[],
        }
    }

    pub fn live_timer(&self) -> Option<&TimerHandle> {
        self.phase.timer()
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.live_timer().map(TimerHandle::deadline)
    }

    /// Fires the live timer if it is due. Returns whether it fired.
    pub fn poll(&mut self, pool: &TouchTracker) -> bool {
        let Some(timer) = self.live_timer() else {
            return false;
        };
        if timer.deadline > self.clock.now() {
            return false;
        }
        let epoch = timer.epoch;
        self.on_timer(epoch, pool);
        true
    }

    /// Delivers a fired timer token.
    pub fn on_timer(&mut self, epoch: u64, pool: &TouchTracker) {
        let live = self.live_timer().map(TimerHandle::epoch);
        if live != Some(epoch) {
            warn!(
                "bad state: stale timer {epoch} fired while {:?} (live {live:?})",
                self.phase.kind()
            );
            return;
        }
        match self.phase.kind() {
            PhaseKind::Waiting => self.draw(pool),
            PhaseKind::Chosen => self.finish_round(pool.count()),
            PhaseKind::Idle => {}
        }
    }

    /// Picks one active touch uniformly. Only valid while waiting.
    pub fn draw(&mut self, pool: &TouchTracker) {
        if !matches!(self.phase, Phase::Waiting { .. }) {
            warn!("bad state: draw requested while {:?}", self.phase.kind());
            return;
        }

        let ids = pool.ids();
        if ids.is_empty() {
            warn!("no active touches to draw from; waiting again");
            self.enter_waiting();
            return;
        }

        let winner = ids[self.rng.random_range(0..ids.len())];
        info!("chose {winner} out of {} touches", ids.len());
        self.cancel_timer();
        let timer = self.arm(self.timing.chosen);
        self.phase = Phase::Chosen {
            winners: vec![winner],
            timer,
        };
    }

    fn finish_round(&mut self, count: usize) {
        if count >= MIN_TOUCHES {
            debug!("round over, {count} touches remain; waiting again");
            self.enter_waiting();
        } else {
            debug!("round over, {count} touches remain; idle");
            self.cancel_timer();
        }
    }

    fn enter_waiting(&mut self) {
        self.cancel_timer();
        let timer = self.arm(self.timing.waiting);
        debug!("waiting until {:?} (timer {})", timer.deadline, timer.epoch);
        self.phase = Phase::Waiting { timer };
    }

    /// Drops the current phase and its timer, leaving `Idle`.
    fn cancel_timer(&mut self) {
        let prev = mem::replace(&mut self.phase, Phase::Idle);
        if let Some(t) = prev.timer() {
            debug!("cancelled timer {}", t.epoch);
        }
    }

    fn arm(&mut self, after: Duration) -> TimerHandle {
        self.last_epoch += 1;
        TimerHandle {
            epoch: self.last_epoch,
            deadline: self.clock.now() + after,
        }
    }
}

impl<C: Clock> MembershipObserver for SelectionStateMachine<C> {
    fn touch_added(&mut self, count: usize) {
        match self.phase.kind() {
            PhaseKind::Idle if count >= MIN_TOUCHES => self.enter_waiting(),
            PhaseKind::Idle => {}
            PhaseKind::Waiting => self.enter_waiting(),
            // held regardless of churn
            PhaseKind::Chosen => {}
        }
    }

    fn touch_removed(&mut self, _count: usize) {
        match self.phase.kind() {
            PhaseKind::Waiting => self.enter_waiting(),
            PhaseKind::Idle | PhaseKind::Chosen => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::tracker::Point;
    use rand::SeedableRng;

    struct Rig {
        clock: ManualClock,
        pool: TouchTracker,
        sm: SelectionStateMachine<ManualClock>,
    }

    impl Rig {
        fn new(seed: u64) -> Self {
            let _ = env_logger::builder().is_test(true).try_init();
            let clock = ManualClock::new();
            Self {
                pool: TouchTracker::new(Vec::new(), StdRng::seed_from_u64(seed)),
                sm: SelectionStateMachine::new(
                    Timing::default(),
                    clock.clone(),
                    StdRng::seed_from_u64(seed),
                ),
                clock,
            }
        }

        fn down(&mut self, id: u64) {
            self.pool.upsert(TouchId(id), Point::default(), &mut self.sm);
        }

        fn up(&mut self, id: u64) {
            self.pool.remove(TouchId(id), &mut self.sm);
        }

        fn at(&mut self, ms: u64) -> bool {
            self.clock.set_ms(ms);
            self.sm.poll(&self.pool)
        }
    }

    #[test]
    fn one_touch_stays_idle() {
        let mut r = Rig::new(1);
        r.down(1);
        assert_eq!(r.sm.phase(), &Phase::Idle);
        r.up(1);
        assert_eq!(r.sm.phase(), &Phase::Idle);
        assert!(r.sm.chosen_ids().is_empty());
    }

    #[test]
    fn second_touch_arms_draw_timer() {
        let mut r = Rig::new(1);
        r.down(1);
        r.down(2);
        assert_eq!(r.sm.phase().kind(), PhaseKind::Waiting);
        assert_eq!(r.sm.next_deadline(), Some(Duration::from_millis(2000)));
        assert!(r.sm.chosen_ids().is_empty());
    }

    #[test]
    fn membership_change_while_waiting_restarts_window() {
        let mut r = Rig::new(1);
        r.down(1);
        r.down(2);
        r.clock.set_ms(1500);
        r.down(3);
        assert_eq!(r.sm.next_deadline(), Some(Duration::from_millis(3500)));

        assert!(!r.at(2000));
        assert_eq!(r.sm.phase().kind(), PhaseKind::Waiting);

        r.clock.set_ms(3000);
        r.up(3);
        assert_eq!(r.sm.next_deadline(), Some(Duration::from_millis(5000)));
        assert!(!r.at(4999));
        assert!(r.at(5000));
        assert_eq!(r.sm.phase().kind(), PhaseKind::Chosen);
    }

    #[test]
    fn moves_do_not_restart_window() {
        let mut r = Rig::new(1);
        r.down(1);
        r.down(2);
        r.clock.set_ms(1000);
        r.pool.upsert(TouchId(1), Point::new(3.0, 4.0), &mut r.sm);
        assert_eq!(r.sm.next_deadline(), Some(Duration::from_millis(2000)));
    }

    #[test]
    fn dropping_to_one_touch_while_waiting_rearms() {
        let mut r = Rig::new(1);
        r.down(1);
        r.down(2);
        let first = r.sm.live_timer().unwrap().epoch();

        r.clock.set_ms(1200);
        r.up(2);
        assert_eq!(r.sm.phase().kind(), PhaseKind::Waiting);
        assert!(r.sm.chosen_ids().is_empty());
        assert!(r.sm.live_timer().unwrap().epoch() > first);
        assert_eq!(r.sm.next_deadline(), Some(Duration::from_millis(3200)));

        assert!(!r.at(2000));
        assert!(r.at(3200));
        assert_eq!(r.sm.chosen_ids(), &[TouchId(1)]);
    }

    #[test]
    fn everyone_lifting_while_waiting_keeps_rearming_without_a_winner() {
        let mut r = Rig::new(2);
        r.down(1);
        r.down(2);
        r.clock.set_ms(500);
        r.up(1);
        r.up(2);
        assert_eq!(r.sm.next_deadline(), Some(Duration::from_millis(2500)));

        let before = r.sm.live_timer().unwrap().epoch();
        assert!(r.at(2500));
        assert_eq!(r.sm.phase().kind(), PhaseKind::Waiting);
        assert!(r.sm.chosen_ids().is_empty());
        assert!(r.sm.live_timer().unwrap().epoch() > before);
        assert_eq!(r.sm.next_deadline(), Some(Duration::from_millis(4500)));

        assert!(r.at(4500));
        assert_eq!(r.sm.phase().kind(), PhaseKind::Waiting);
        assert_eq!(r.sm.next_deadline(), Some(Duration::from_millis(6500)));
    }

    #[test]
    fn zero_windows_are_raised_to_the_minimum() {
        let clock = ManualClock::new();
        let zero = Timing {
            waiting: Duration::ZERO,
            chosen: Duration::ZERO,
        };
        let mut sm = SelectionStateMachine::new(zero, clock.clone(), StdRng::seed_from_u64(0));
        let mut pool = TouchTracker::new(Vec::new(), StdRng::seed_from_u64(0));
        pool.upsert(TouchId(1), Point::default(), &mut sm);
        pool.upsert(TouchId(2), Point::default(), &mut sm);

        assert_eq!(sm.timing().waiting, MIN_WINDOW);
        assert_eq!(sm.next_deadline(), Some(MIN_WINDOW));
        assert!(!sm.poll(&pool));
        clock.set(MIN_WINDOW);
        assert!(sm.poll(&pool));
        assert!(!sm.poll(&pool));
        assert_eq!(sm.next_deadline(), Some(MIN_WINDOW * 2));
    }

    #[test]
    fn draw_picks_an_active_touch() {
        for seed in 0..16 {
            let mut r = Rig::new(seed);
            r.down(10);
            r.down(20);
            r.down(30);
            assert!(r.at(2000));
            let chosen = r.sm.chosen_ids().to_vec();
            assert_eq!(chosen.len(), 1);
            assert!(r.pool.contains(chosen[0]));
        }
    }

    #[test]
    fn churn_while_chosen_keeps_winner_and_timer() {
        let mut r = Rig::new(3);
        r.down(1);
        r.down(2);
        r.at(2000);
        let epoch = r.sm.live_timer().unwrap().epoch();
        let winner = r.sm.chosen_ids().to_vec();

        r.down(3);
        r.up(winner[0].0);
        r.up(3);

        assert_eq!(r.sm.chosen_ids(), winner.as_slice());
        assert_eq!(r.sm.live_timer().unwrap().epoch(), epoch);
        assert_eq!(r.sm.next_deadline(), Some(Duration::from_millis(5000)));
    }

    #[test]
    fn round_ends_waiting_when_enough_touches_remain() {
        let mut r = Rig::new(4);
        r.down(1);
        r.down(2);
        r.at(2000);
        assert!(r.at(5000));
        assert_eq!(r.sm.phase().kind(), PhaseKind::Waiting);
        assert_eq!(r.sm.next_deadline(), Some(Duration::from_millis(7000)));
        assert!(r.sm.chosen_ids().is_empty());
    }

    #[test]
    fn round_ends_idle_when_touches_left() {
        let mut r = Rig::new(5);
        r.down(1);
        r.down(2);
        r.at(2000);
        r.up(1);
        assert_eq!(r.sm.phase().kind(), PhaseKind::Chosen);
        assert!(r.at(5000));
        assert_eq!(r.sm.phase(), &Phase::Idle);
        assert_eq!(r.sm.next_deadline(), None);
    }

    #[test]
    fn stale_timer_token_is_ignored() {
        let mut r = Rig::new(6);
        r.down(1);
        r.down(2);
        let stale = r.sm.live_timer().unwrap().epoch();
        r.down(3);
        let live = r.sm.live_timer().unwrap().epoch();
        assert!(live > stale);

        r.clock.set_ms(10_000);
        r.sm.on_timer(stale, &r.pool);
        assert_eq!(r.sm.phase().kind(), PhaseKind::Waiting);
        assert_eq!(r.sm.live_timer().unwrap().epoch(), live);
    }

    #[test]
    fn draw_outside_waiting_is_rejected() {
        let mut r = Rig::new(7);
        r.down(1);
        r.sm.draw(&r.pool);
        assert_eq!(r.sm.phase(), &Phase::Idle);

        r.down(2);
        r.at(2000);
        let winners = r.sm.chosen_ids().to_vec();
        let epoch = r.sm.live_timer().unwrap().epoch();
        r.sm.draw(&r.pool);
        assert_eq!(r.sm.chosen_ids(), winners.as_slice());
        assert_eq!(r.sm.live_timer().unwrap().epoch(), epoch);
    }

    #[test]
    fn empty_pool_draw_rearms() {
        let mut r = Rig::new(8);
        r.down(1);
        r.down(2);
        let empty = TouchTracker::new(Vec::new(), StdRng::seed_from_u64(0));
        let before = r.sm.live_timer().unwrap().epoch();

        r.clock.set_ms(2000);
        r.sm.on_timer(before, &empty);

        assert_eq!(r.sm.phase().kind(), PhaseKind::Waiting);
        assert!(r.sm.live_timer().unwrap().epoch() > before);
        assert_eq!(r.sm.next_deadline(), Some(Duration::from_millis(4000)));
    }

    #[test]
    fn same_seed_same_winner() {
        let pick = |seed| {
            let mut r = Rig::new(seed);
            for id in 0..8 {
                r.down(id);
            }
            r.at(2000);
            r.sm.chosen_ids().to_vec()
        };
        assert_eq!(pick(99), pick(99));
    }
}
