//! Touch tracker and selection machine wired together on one clock.

use rand::{SeedableRng, rngs::StdRng};
use serde::Serialize;
use std::time::Duration;

use crate::clock::{Clock, SystemClock};
use crate::config::PickerConfig;
use crate::event::TouchEvent;
use crate::selection::{Phase, PhaseKind, SelectionStateMachine};
use crate::tracker::{Color, Point, Touch, TouchId, TouchTracker};

#[derive(Debug)]
pub struct Picker<C: Clock = SystemClock> {
    touches: TouchTracker,
    selection: SelectionStateMachine<C>,
}

/// What a renderer needs for one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    pub timestamp_ms: u64,
    pub phase: PhaseKind,
    pub active_count: usize,
    /// Sorted by id.
    pub touches: Vec<TouchView>,
    pub chosen: Vec<TouchId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TouchView {
    pub id: TouchId,
    pub x: f32,
    pub y: f32,
    pub color: Color,
}

impl From<&Touch> for TouchView {
    fn from(t: &Touch) -> Self {
        Self {
            id: t.id,
            x: t.position.x,
            y: t.position.y,
            color: t.color(),
        }
    }
}

impl Frame {
    /// Touches to draw: only the winners while chosen, everything otherwise.
    pub fn visible(&self) -> impl Iterator<Item = &TouchView> + '_ {
        let chosen = &self.chosen;
        self.touches
            .iter()
            .filter(move |t| chosen.is_empty() || chosen.contains(&t.id))
    }
}

impl<C: Clock> Picker<C> {
    pub fn new(cfg: &PickerConfig, clock: C) -> Self {
        let mut root = match cfg.draw.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let touch_rng = StdRng::from_rng(&mut root);
        Self {
            touches: TouchTracker::new(cfg.draw.palette.clone(), touch_rng),
            selection: SelectionStateMachine::new(cfg.timing.to_timing(), clock, root),
        }
    }

    pub fn handle(&mut self, event: TouchEvent) {
        match event {
            TouchEvent::Begin { id, position } | TouchEvent::Move { id, position } => {
                self.upsert(id, position)
            }
            TouchEvent::End { id } | TouchEvent::Cancel { id } => self.remove(id),
        }
    }

    pub fn upsert(&mut self, id: TouchId, position: Point) {
        self.touches.upsert(id, position, &mut self.selection);
    }

    pub fn remove(&mut self, id: TouchId) {
        self.touches.remove(id, &mut self.selection);
    }

    /// Fires the pending timer if due. Returns whether anything fired.
    pub fn tick(&mut self) -> bool {
        self.selection.poll(&self.touches)
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.selection.next_deadline()
    }

    pub fn phase(&self) -> &Phase {
        self.selection.phase()
    }

    pub fn count(&self) -> usize {
        self.touches.count()
    }

    pub fn snapshot(&self) -> impl Iterator<Item = &Touch> + Clone + '_ {
        self.touches.snapshot()
    }

    pub fn chosen_ids(&self) -> &[TouchId] {
        self.selection.chosen_ids()
    }

    pub fn tracker(&self) -> &TouchTracker {
        &self.touches
    }

    pub fn selection(&self) -> &SelectionStateMachine<C> {
        &self.selection
    }

    pub fn frame(&self) -> Frame {
        let mut touches: Vec<TouchView> = self.snapshot().map(TouchView::from).collect();
        touches.sort_by_key(|t| t.id);
        Frame {
            timestamp_ms: self.selection.clock().now().as_millis() as u64,
            phase: self.phase().kind(),
            active_count: self.touches.count(),
            touches,
            chosen: self.chosen_ids().to_vec(),
        }
    }
}
