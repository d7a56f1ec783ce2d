//! Frame-based input model with DAS (Delayed Auto Shift)
//!
//! The game loop consumes one `FrameInput` per tick: keys that went down
//! since the previous frame, plus keys currently held. Held directions are
//! turned into repeats by `DasCounter`, counted in frames rather than time.
//!
//! `InputCollector` builds `FrameInput`s from crossterm key events. Terminals
//! that cannot report key releases fall back to treating a key as released
//! once no event has been seen for it for `KEY_TIMEOUT`.

use crate::settings::Settings;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Time after which we consider a key "released" if no repeat received
const KEY_TIMEOUT: Duration = Duration::from_millis(100);

/// Default frames a direction must be held before auto-repeat starts
pub const DEFAULT_DAS_STARTUP_FRAMES: u32 = 16;
/// Default frames between auto-repeats
pub const DEFAULT_DAS_INTERVAL_FRAMES: u32 = 6;

/// Logical game keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Left,
    Right,
    Down,
    Rotate,
    Hold,
    HardDrop,
    Pause,
    Quit,
}

impl Key {
    fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

/// A small set of keys
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeySet(u16);

impl KeySet {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn of(keys: &[Key]) -> Self {
        let mut set = Self::empty();
        for &key in keys {
            set.insert(key);
        }
        set
    }

    pub fn insert(&mut self, key: Key) {
        self.0 |= key.bit();
    }

    pub fn remove(&mut self, key: Key) {
        self.0 &= !key.bit();
    }

    pub fn contains(&self, key: Key) -> bool {
        self.0 & key.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

/// Input state for one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameInput {
    /// Keys that went down since the previous frame
    pub pressed: KeySet,
    /// Keys held down during this frame
    pub held: KeySet,
}

impl FrameInput {
    pub fn none() -> Self {
        Self::default()
    }

    /// Keys pressed this frame (and therefore also held)
    pub fn press(keys: &[Key]) -> Self {
        let set = KeySet::of(keys);
        Self {
            pressed: set,
            held: set,
        }
    }

    /// Keys held from an earlier frame
    pub fn hold(keys: &[Key]) -> Self {
        Self {
            pressed: KeySet::empty(),
            held: KeySet::of(keys),
        }
    }

    pub fn pressed(&self, key: Key) -> bool {
        self.pressed.contains(key)
    }

    pub fn held(&self, key: Key) -> bool {
        self.held.contains(key)
    }
}

/// Startup delay and repeat interval for held keys, in frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DasTiming {
    pub startup_frames: u32,
    pub interval_frames: u32,
}

impl Default for DasTiming {
    fn default() -> Self {
        Self {
            startup_frames: DEFAULT_DAS_STARTUP_FRAMES,
            interval_frames: DEFAULT_DAS_INTERVAL_FRAMES,
        }
    }
}

/// Counts how long one key has been held and decides when it repeats
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DasCounter {
    frames: u32,
}

impl DasCounter {
    /// Advance by one frame, returns true if a repeat fires this frame
    ///
    /// The first repeat fires on the frame the key has been held for
    /// `startup_frames`, then every `interval_frames` after that.
    pub fn update(&mut self, held: bool, timing: DasTiming) -> bool {
        if !held {
            self.frames = 0;
            return false;
        }
        self.frames = self.frames.saturating_add(1);

        let startup = timing.startup_frames.max(1);
        let interval = timing.interval_frames.max(1);
        if self.frames < startup {
            return false;
        }
        (self.frames - startup) % interval == 0
    }

    pub fn reset(&mut self) {
        self.frames = 0;
    }

    pub fn frames(&self) -> u32 {
        self.frames
    }
}

/// Key bindings configuration - supports multiple keys per action
#[derive(Debug, Clone)]
pub struct KeyBindings {
    bindings: Vec<(KeyCode, Key)>,
}

impl KeyBindings {
    /// Parse a key string into KeyCode
    fn parse_key(s: &str) -> Option<KeyCode> {
        let code = match s.to_lowercase().as_str() {
            "left" => KeyCode::Left,
            "right" => KeyCode::Right,
            "up" => KeyCode::Up,
            "down" => KeyCode::Down,
            "space" => KeyCode::Char(' '),
            "enter" => KeyCode::Enter,
            "tab" => KeyCode::Tab,
            "esc" | "escape" => KeyCode::Esc,
            s if s.chars().count() == 1 => KeyCode::Char(s.chars().next()?),
            _ => return None,
        };
        Some(code)
    }

    /// Create keybindings from settings
    pub fn from_settings(settings: &Settings) -> Self {
        let keys = &settings.keys;
        let table = [
            (&keys.move_left, Key::Left),
            (&keys.move_right, Key::Right),
            (&keys.soft_drop, Key::Down),
            (&keys.rotate, Key::Rotate),
            (&keys.hold, Key::Hold),
            (&keys.hard_drop, Key::HardDrop),
            (&keys.pause, Key::Pause),
            (&keys.quit, Key::Quit),
        ];

        let mut bindings = Vec::new();
        for (names, key) in table {
            for name in names {
                match Self::parse_key(name) {
                    Some(code) => bindings.push((code, key)),
                    None => tracing::warn!("Ignoring unknown key binding {:?}", name),
                }
            }
        }
        Self { bindings }
    }

    /// Look up the game key bound to a terminal key code
    pub fn lookup(&self, code: KeyCode) -> Option<Key> {
        let code = normalize_key(code);
        self.bindings
            .iter()
            .find(|(bound, _)| *bound == code)
            .map(|&(_, key)| key)
    }
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// Collects terminal key events into per-frame input
pub struct InputCollector {
    bindings: KeyBindings,
    /// Last time an event was seen for each held key
    held: HashMap<Key, Instant>,
    pressed: KeySet,
    /// Whether the terminal reports key release events
    release_events: bool,
}

impl InputCollector {
    pub fn new(bindings: KeyBindings, release_events: bool) -> Self {
        Self {
            bindings,
            held: HashMap::new(),
            pressed: KeySet::empty(),
            release_events,
        }
    }

    /// Feed one key event from the terminal
    pub fn key_event(&mut self, event: KeyEvent) {
        self.key_event_at(event, Instant::now());
    }

    fn key_event_at(&mut self, event: KeyEvent, now: Instant) {
        // Ctrl+C always quits
        if event.modifiers.contains(KeyModifiers::CONTROL) && event.code == KeyCode::Char('c') {
            self.pressed.insert(Key::Quit);
            return;
        }

        let Some(key) = self.bindings.lookup(event.code) else {
            return;
        };

        match event.kind {
            KeyEventKind::Release => {
                self.held.remove(&key);
            }
            KeyEventKind::Press | KeyEventKind::Repeat => {
                // Terminals without release reporting send repeats as presses
                if self.held.insert(key, now).is_none() {
                    self.pressed.insert(key);
                }
            }
        }
    }

    /// Produce the input for the next frame
    pub fn frame(&mut self) -> FrameInput {
        self.frame_at(Instant::now())
    }

    fn frame_at(&mut self, now: Instant) -> FrameInput {
        if !self.release_events {
            self.held
                .retain(|_, last_seen| now.duration_since(*last_seen) <= KEY_TIMEOUT);
        }

        let mut held = KeySet::empty();
        for &key in self.held.keys() {
            held.insert(key);
        }
        let pressed = std::mem::take(&mut self.pressed);
        // A tap shorter than one frame still counts as held for that frame
        for key in [Key::Left, Key::Right, Key::Down] {
            if pressed.contains(key) {
                held.insert(key);
            }
        }

        FrameInput { pressed, held }
    }

    /// Clear all held keys (useful for pause/resume)
    pub fn clear(&mut self) {
        self.held.clear();
        self.pressed = KeySet::empty();
    }
}

/// Normalize key codes for consistent handling
fn normalize_key(code: KeyCode) -> KeyCode {
    match code {
        KeyCode::Char(c) => KeyCode::Char(c.to_ascii_lowercase()),
        other => other,
    }
}
