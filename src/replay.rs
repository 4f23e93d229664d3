//! Scripted touch sessions on a virtual clock.
//!
//! A script is JSON lines, one event per line:
//!
//! ```text
//! # two fingers, then a third once someone is chosen
//! {"at_ms": 0,    "kind": "begin", "id": 1, "position": {"x": 10.0, "y": 20.0}}
//! {"at_ms": 0,    "kind": "begin", "id": 2, "position": {"x": 80.0, "y": 20.0}}
//! {"at_ms": 2000, "kind": "begin", "id": 3, "position": {"x": 40.0, "y": 90.0}}
//! {"at_ms": 2600, "kind": "end",   "id": 3}
//! ```

use log::debug;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::clock::ManualClock;
use crate::config::{ConfigError, PickerConfig};
use crate::event::TouchEvent;
use crate::picker::{Frame, Picker};

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("line {line}: {source}")]
    Malformed {
        line: usize,
        source: serde_json::Error,
    },
    #[error("line {line}: at_ms {at_ms} is earlier than the previous step ({previous})")]
    OutOfOrder { line: usize, at_ms: u64, previous: u64 },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptStep {
    pub at_ms: u64,
    #[serde(flatten)]
    pub event: TouchEvent,
}

pub fn parse_script(text: &str) -> Result<Vec<ScriptStep>, ScriptError> {
    let mut steps = Vec::new();
    let mut previous = 0;
    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let step: ScriptStep = serde_json::from_str(line).map_err(|source| {
            ScriptError::Malformed {
                line: idx + 1,
                source,
            }
        })?;
        if step.at_ms < previous {
            return Err(ScriptError::OutOfOrder {
                line: idx + 1,
                at_ms: step.at_ms,
                previous,
            });
        }
        previous = step.at_ms;
        steps.push(step);
    }
    Ok(steps)
}

/// Drives a fresh [`Picker`] through `steps`, returning a frame after every
/// step and every timer firing. Timers fire at their exact deadlines.
pub fn run(
    cfg: &PickerConfig,
    steps: &[ScriptStep],
    until_ms: Option<u64>,
) -> Result<Vec<Frame>, ScriptError> {
    cfg.validate()?;
    let clock = ManualClock::new();
    let mut picker = Picker::new(cfg, clock.clone());
    let mut frames = Vec::new();

    for step in steps {
        advance_to(&mut picker, &clock, Duration::from_millis(step.at_ms), &mut frames);
        debug!("t={}ms {:?}", step.at_ms, step.event);
        picker.handle(step.event);
        frames.push(picker.frame());
    }
    if let Some(until) = until_ms {
        advance_to(&mut picker, &clock, Duration::from_millis(until), &mut frames);
    }
    Ok(frames)
}

fn advance_to(
    picker: &mut Picker<ManualClock>,
    clock: &ManualClock,
    target: Duration,
    frames: &mut Vec<Frame>,
) {
    while let Some(deadline) = picker.next_deadline() {
        if deadline > target {
            break;
        }
        clock.set(deadline);
        if picker.tick() {
            frames.push(picker.frame());
        }
    }
    clock.set(target);
}
