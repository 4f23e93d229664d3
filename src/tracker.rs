//! Live set of active touch contacts.

use log::debug;
use rand::{Rng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt};

/// Opaque contact identifier supplied by the input layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TouchId(pub u64);

impl fmt::Display for TouchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Per-touch display attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Blue,
    Red,
    Green,
    Yellow,
    Orange,
    Brown,
    Purple,
    Cyan,
    Primary,
}

impl Color {
    pub const ALL: [Color; 9] = [
        Color::Blue,
        Color::Red,
        Color::Green,
        Color::Yellow,
        Color::Orange,
        Color::Brown,
        Color::Purple,
        Color::Cyan,
        Color::Primary,
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Touch {
    pub id: TouchId,
    pub position: Point,
    color: Color,
}

impl Touch {
    /// Fixed for the lifetime of the touch.
    pub fn color(&self) -> Color {
        self.color
    }
}

/// Receives membership changes from [`TouchTracker`] before `upsert`/`remove`
/// return. Position-only updates are never reported.
pub trait MembershipObserver {
    fn touch_added(&mut self, count: usize);
    fn touch_removed(&mut self, count: usize);
}

/// Observer that ignores everything; handy when only the set matters.
impl MembershipObserver for () {
    fn touch_added(&mut self, _count: usize) {}
    fn touch_removed(&mut self, _count: usize) {}
}

#[derive(Debug)]
pub struct TouchTracker {
    touches: HashMap<TouchId, Touch>,
    palette: Vec<Color>,
    rng: StdRng,
}

impl TouchTracker {
    /// An empty palette falls back to [`Color::ALL`].
    pub fn new(palette: Vec<Color>, rng: StdRng) -> Self {
        let palette = if palette.is_empty() {
            Color::ALL.to_vec()
        } else {
            palette
        };
        Self {
            touches: HashMap::new(),
            palette,
            rng,
        }
    }

    pub fn upsert(&mut self, id: TouchId, position: Point, observer: &mut dyn MembershipObserver) {
        if let Some(t) = self.touches.get_mut(&id) {
            t.position = position;
            return;
        }

        let color = self.palette[self.rng.random_range(0..self.palette.len())];
        self.touches.insert(
            id,
            Touch {
                id,
                position,
                color,
            },
        );
        debug!("touch {id} down ({color:?}), {} active", self.touches.len());
        observer.touch_added(self.touches.len());
    }

    /// Removing an id that is not present is a no-op and reports nothing.
    pub fn remove(&mut self, id: TouchId, observer: &mut dyn MembershipObserver) {
        if self.touches.remove(&id).is_none() {
            debug!("release for unknown touch {id} ignored");
            return;
        }
        debug!("touch {id} up, {} active", self.touches.len());
        observer.touch_removed(self.touches.len());
    }

    pub fn count(&self) -> usize {
        self.touches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.touches.is_empty()
    }

    pub fn contains(&self, id: TouchId) -> bool {
        self.touches.contains_key(&id)
    }

    pub fn get(&self, id: TouchId) -> Option<&Touch> {
        self.touches.get(&id)
    }

    /// Active ids in ascending order.
    pub fn ids(&self) -> Vec<TouchId> {
        let mut ids: Vec<TouchId> = self.touches.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Current touches in no particular order. Clone the iterator to walk it again.
    pub fn snapshot(&self) -> impl Iterator<Item = &Touch> + Clone + '_ {
        self.touches.values()
    }
}
