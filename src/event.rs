use serde::{Deserialize, Serialize};

use crate::tracker::{Point, TouchId};

/// One report from the input layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TouchEvent {
    Begin { id: TouchId, position: Point },
    Move { id: TouchId, position: Point },
    End { id: TouchId },
    Cancel { id: TouchId },
}

impl TouchEvent {
    pub fn id(&self) -> TouchId {
        match *self {
            TouchEvent::Begin { id, .. }
            | TouchEvent::Move { id, .. }
            | TouchEvent::End { id }
            | TouchEvent::Cancel { id } => id,
        }
    }
}
