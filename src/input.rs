//! evdev multitouch input: device discovery, MT protocol-B decoding and the
//! live watch loop.

use evdev::{AbsoluteAxisCode, Device, EventType, SynchronizationCode};
use log::{info, warn};
use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use crate::clock::SystemClock;
use crate::config::PickerConfig;
use crate::event::TouchEvent;
use crate::picker::Picker;
use crate::tracker::{Point, TouchId};

#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
}

pub fn discover_multitouch() -> Vec<DeviceInfo> {
    let mut out = vec![];
    if let Ok(rd) = std::fs::read_dir("/dev/input") {
        for e in rd.flatten() {
            let p = e.path();
            let is_event_node = p
                .file_name()
                .and_then(|s| s.to_str())
                .is_some_and(|s| s.starts_with("event"));
            if !is_event_node {
                continue;
            }
            if let Ok(dev) = Device::open(&p) {
                let has_abs = dev.supported_events().contains(EventType::ABSOLUTE);
                let has_mt = dev.supported_absolute_axes().is_some_and(|a| {
                    a.contains(AbsoluteAxisCode::ABS_MT_SLOT)
                        && a.contains(AbsoluteAxisCode::ABS_MT_POSITION_X)
                        && a.contains(AbsoluteAxisCode::ABS_MT_POSITION_Y)
                });
                if has_abs && has_mt {
                    out.push(DeviceInfo {
                        path: p.display().to_string(),
                        name: dev.name().unwrap_or("unknown").to_string(),
                    });
                }
            }
        }
    }
    out.sort_by(|a, b| a.path.cmp(&b.path));
    out
}

#[derive(Debug, Clone, Default)]
struct SlotState {
    tracking_id: Option<i32>,
    x_norm: f32,
    y_norm: f32,
    began: bool,
    moved: bool,
}

/// Turns the per-slot MT stream of one device into [`TouchEvent`]s, emitted
/// once per SYN_REPORT frame.
#[derive(Debug)]
pub struct SlotDecoder {
    device: u32,
    slots: Vec<SlotState>,
    cur_slot: usize,
    released: Vec<i32>,
    x_min: i32,
    x_max: i32,
    y_min: i32,
    y_max: i32,
}

impl SlotDecoder {
    pub fn new(device: u32) -> Self {
        Self {
            device,
            slots: vec![SlotState::default(); 10],
            cur_slot: 0,
            released: Vec::new(),
            x_min: 0,
            x_max: 4096,
            y_min: 0,
            y_max: 4096,
        }
    }

    /// Resizes the slot table, dropping any contacts it held.
    pub fn set_slot_count(&mut self, count: usize) {
        self.slots = vec![SlotState::default(); count.max(1)];
        self.cur_slot = 0;
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn set_norm_ranges(&mut self, x_min: i32, x_max: i32, y_min: i32, y_max: i32) {
        self.x_min = x_min;
        self.x_max = x_max.max(x_min + 1);
        self.y_min = y_min;
        self.y_max = y_max.max(y_min + 1);
    }

    /// Tracking ids are only unique per device, so the device index goes in
    /// the high half.
    pub fn touch_id(&self, tracking_id: i32) -> TouchId {
        namespaced(self.device, tracking_id)
    }

    pub fn on_slot(&mut self, slot: i32) {
        self.cur_slot = slot.clamp(0, self.slots.len() as i32 - 1) as usize;
    }

    pub fn on_tracking_id(&mut self, tracking_id: i32) {
        let s = &mut self.slots[self.cur_slot];
        if let Some(old) = s.tracking_id {
            if tracking_id < 0 || old != tracking_id {
                self.released.push(old);
            }
        }
        if tracking_id < 0 {
            s.tracking_id = None;
            s.began = false;
            s.moved = false;
        } else if s.tracking_id != Some(tracking_id) {
            s.tracking_id = Some(tracking_id);
            s.began = true;
        }
    }

    pub fn on_pos_x(&mut self, raw: i32) {
        let nx = ((raw - self.x_min) as f32 / (self.x_max - self.x_min) as f32).clamp(0.0, 1.0);
        let s = &mut self.slots[self.cur_slot];
        s.x_norm = nx;
        s.moved = true;
    }

    pub fn on_pos_y(&mut self, raw: i32) {
        let ny = ((raw - self.y_min) as f32 / (self.y_max - self.y_min) as f32).clamp(0.0, 1.0);
        let s = &mut self.slots[self.cur_slot];
        s.y_norm = ny;
        s.moved = true;
    }

    /// Releases first, then new contacts, then moves.
    pub fn on_syn_report(&mut self) -> Vec<TouchEvent> {
        let device = self.device;
        let mut out: Vec<TouchEvent> = self
            .released
            .drain(..)
            .map(|tid| TouchEvent::End {
                id: namespaced(device, tid),
            })
            .collect();

        for s in self.slots.iter_mut() {
            let Some(tid) = s.tracking_id else {
                continue;
            };
            let id = namespaced(device, tid);
            let position = Point::new(s.x_norm, s.y_norm);
            if s.began {
                out.push(TouchEvent::Begin { id, position });
            } else if s.moved {
                out.push(TouchEvent::Move { id, position });
            }
            s.began = false;
            s.moved = false;
        }
        out
    }
}

fn namespaced(device: u32, tracking_id: i32) -> TouchId {
    TouchId((u64::from(device) << 32) | u64::from(tracking_id as u32))
}

struct Source {
    dev: Device,
    decoder: SlotDecoder,
    path: String,
    alive: bool,
}

/// Sizes the decoder from the device's ABS_MT_SLOT and position limits.
fn configure_decoder(dev: &Device, decoder: &mut SlotDecoder) -> io::Result<()> {
    let (mut x, mut y) = ((0, 4096), (0, 4096));
    for (code, info) in dev.get_absinfo()? {
        if code == AbsoluteAxisCode::ABS_MT_SLOT {
            decoder.set_slot_count(usize::try_from(info.maximum()).unwrap_or(0) + 1);
        } else if code == AbsoluteAxisCode::ABS_MT_POSITION_X {
            x = (info.minimum(), info.maximum());
        } else if code == AbsoluteAxisCode::ABS_MT_POSITION_Y {
            y = (info.minimum(), info.maximum());
        }
    }
    decoder.set_norm_ranges(x.0, x.1, y.0, y.1);
    Ok(())
}

/// Nothing to read right now; anything else means the device is gone or broken.
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// Runs a picker against every detected multitouch device until SIGINT or
/// SIGTERM.
pub fn watch(cfg: &PickerConfig) -> io::Result<()> {
    let devices = discover_multitouch();
    if devices.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            "no multitouch devices detected",
        ));
    }

    let mut sources = Vec::new();
    for (idx, d) in devices.iter().enumerate() {
        match Device::open(&d.path) {
            Ok(mut dev) => {
                if let Err(e) = dev.set_nonblocking(true) {
                    warn!("failed to set {} non-blocking: {e}", d.path);
                    continue;
                }
                let mut decoder = SlotDecoder::new(idx as u32);
                if let Err(e) = configure_decoder(&dev, &mut decoder) {
                    warn!("failed to read axis limits of {}: {e}; assuming 0..4096", d.path);
                }
                info!(
                    "watching {} ({}), {} slots",
                    d.name,
                    d.path,
                    decoder.slot_count()
                );
                sources.push(Source {
                    dev,
                    decoder,
                    path: d.path.clone(),
                    alive: true,
                });
            }
            Err(e) => warn!("failed to open {}: {e}", d.path),
        }
    }
    if sources.is_empty() {
        return Err(io::Error::other("failed to open all detected devices"));
    }

    let term = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&term))?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&term))?;

    let mut picker = Picker::new(cfg, SystemClock::new());
    let idle = Duration::from_millis(cfg.input.poll_ms);
    let mut last_chosen: Vec<TouchId> = Vec::new();

    while !term.load(Ordering::Relaxed) {
        let mut any_event = false;

        for src in sources.iter_mut() {
            let Source {
                dev,
                decoder,
                path,
                alive,
            } = src;
            let events = match dev.fetch_events() {
                Ok(events) => events,
                Err(e) if is_transient(&e) => continue,
                Err(e) => {
                    warn!("dropping {path}: {e}");
                    *alive = false;
                    continue;
                }
            };
            for ev in events {
                any_event = true;
                if ev.event_type() == EventType::ABSOLUTE {
                    match ev.code() {
                        c if c == AbsoluteAxisCode::ABS_MT_SLOT.0 => decoder.on_slot(ev.value()),
                        c if c == AbsoluteAxisCode::ABS_MT_TRACKING_ID.0 => {
                            decoder.on_tracking_id(ev.value())
                        }
                        c if c == AbsoluteAxisCode::ABS_MT_POSITION_X.0 => {
                            decoder.on_pos_x(ev.value())
                        }
                        c if c == AbsoluteAxisCode::ABS_MT_POSITION_Y.0 => {
                            decoder.on_pos_y(ev.value())
                        }
                        _ => {}
                    }
                } else if ev.event_type() == EventType::SYNCHRONIZATION
                    && ev.code() == SynchronizationCode::SYN_REPORT.0
                {
                    for te in decoder.on_syn_report() {
                        picker.handle(te);
                    }
                }
            }
        }

        sources.retain(|s| s.alive);
        if sources.is_empty() {
            return Err(io::Error::other("all multitouch devices went away"));
        }

        picker.tick();
        if picker.chosen_ids() != last_chosen.as_slice() {
            last_chosen = picker.chosen_ids().to_vec();
            if last_chosen.is_empty() {
                info!("selection cleared ({} touches)", picker.count());
            } else {
                info!("selected {:?}", last_chosen);
            }
        }

        if !any_event {
            thread::sleep(idle);
        }
    }

    info!("watch stopped");
    Ok(())
}
