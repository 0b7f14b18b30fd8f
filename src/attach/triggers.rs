//! Detach triggers and the input classifier that applies them.
//!
//! Terminals disagree on how the detach chords are encoded: a terminal with
//! the kitty keyboard protocol sends `CSI 93 ; 5 u` for Ctrl+], a legacy one
//! sends the raw control byte `0x1D`, and some (or some multiplexers in
//! between) deliver nothing but ESC. All recognised encodings live in one
//! ordered table; the first entry that matches wins.

use super::filter::{incomplete_tail, strip_terminal_noise};
use std::time::{Duration, Instant};

pub const ESC: u8 = 0x1b;

/// Default window for two lone ESC presses to count as a detach.
pub const DOUBLE_ESCAPE_WINDOW: Duration = Duration::from_millis(500);

/// How long an unterminated `CSI` tail waits for the rest of its sequence.
pub const SPLIT_SEQUENCE_WINDOW: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerPattern {
    /// Byte sequence anywhere in the chunk.
    Sequence(&'static [u8]),
    /// `count` adjacent copies of `byte` in one chunk.
    Repeated { byte: u8, count: usize },
    /// A chunk that is exactly `byte`, twice within the window.
    TimedDouble { byte: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetachTrigger {
    /// Human-readable chord, shown in the detach notice.
    pub name: &'static str,
    pub pattern: TriggerPattern,
}

const fn seq(name: &'static str, bytes: &'static [u8]) -> DetachTrigger {
    DetachTrigger {
        name,
        pattern: TriggerPattern::Sequence(bytes),
    }
}

/// Every detach encoding, highest priority first.
pub static DETACH_TRIGGERS: &[DetachTrigger] = &[
    // Keyboard-protocol (CSI u) chords, plain Ctrl then Ctrl+Shift.
    seq("ctrl+]", b"\x1b[93;5u"),
    seq("ctrl+shift+]", b"\x1b[93;6u"),
    seq("ctrl+\\", b"\x1b[92;5u"),
    seq("ctrl+shift+\\", b"\x1b[92;6u"),
    seq("ctrl+^", b"\x1b[94;5u"),
    seq("ctrl+shift+^", b"\x1b[94;6u"),
    seq("ctrl+6", b"\x1b[54;5u"),
    seq("ctrl+shift+6", b"\x1b[54;6u"),
    seq("ctrl+_", b"\x1b[95;5u"),
    seq("ctrl+shift+_", b"\x1b[95;6u"),
    seq("ctrl+-", b"\x1b[45;5u"),
    seq("ctrl+shift+-", b"\x1b[45;6u"),
    // Legacy control bytes.
    seq("ctrl+]", b"\x1d"),
    seq("ctrl+\\", b"\x1c"),
    seq("ctrl+^", b"\x1e"),
    seq("ctrl+_", b"\x1f"),
    DetachTrigger {
        name: "esc esc",
        pattern: TriggerPattern::Repeated {
            byte: ESC,
            count: 2,
        },
    },
    DetachTrigger {
        name: "esc esc",
        pattern: TriggerPattern::TimedDouble { byte: ESC },
    },
];

/// What the attach loop should do with one chunk of input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputAction {
    /// Write these bytes to the subprocess.
    Forward(Vec<u8>),
    /// Stop the attachment; the rest of the chunk is discarded.
    Detach(&'static DetachTrigger),
    /// Nothing to do yet (noise only, or a lone ESC being held).
    Hold,
}

/// Applies the trigger table to input chunks.
///
/// A lone ESC could be the first half of a double-ESC detach or a real
/// Escape keypress, so it is held instead of forwarded. It is released to
/// the subprocess when other input arrives or when the window expires
/// ([`InputClassifier::poll_expired`]); a second lone ESC inside the window
/// detaches and neither press reaches the subprocess.
///
/// An unterminated `CSI` tail at the end of a chunk is held the same way,
/// for [`SPLIT_SEQUENCE_WINDOW`], so a terminal reply split across two reads
/// is filtered as a whole.
#[derive(Debug)]
pub struct InputClassifier {
    triggers: &'static [DetachTrigger],
    window: Duration,
    pending: Option<(u8, Instant)>,
    partial: Option<(Vec<u8>, Instant)>,
}

impl Default for InputClassifier {
    fn default() -> Self {
        Self::new(DOUBLE_ESCAPE_WINDOW)
    }
}

impl InputClassifier {
    pub fn new(window: Duration) -> Self {
        Self::with_triggers(DETACH_TRIGGERS, window)
    }

    pub fn with_triggers(triggers: &'static [DetachTrigger], window: Duration) -> Self {
        Self {
            triggers,
            window,
            pending: None,
            partial: None,
        }
    }

    pub fn classify(&mut self, chunk: &[u8], now: Instant) -> InputAction {
        let mut joined = self.partial.take().map(|(tail, _)| tail).unwrap_or_default();
        // A held ESC followed by `[` is a sequence split after its first byte.
        if joined.is_empty() && chunk.first() == Some(&b'[') && self.is_holding_byte(ESC) {
            self.pending = None;
            joined.push(ESC);
        }
        joined.extend_from_slice(chunk);

        let input = strip_terminal_noise(&joined);
        let split = incomplete_tail(&input);
        if split < input.len() {
            self.partial = Some((input[split..].to_vec(), now));
        }
        let complete = &input[..split];

        for trigger in self.triggers {
            match trigger.pattern {
                TriggerPattern::Sequence(bytes) => {
                    if contains(&input, bytes) {
                        self.reset();
                        return InputAction::Detach(trigger);
                    }
                }
                TriggerPattern::Repeated { byte, count } => {
                    if count > 0 && input.windows(count).any(|w| w.iter().all(|b| *b == byte)) {
                        self.reset();
                        return InputAction::Detach(trigger);
                    }
                }
                TriggerPattern::TimedDouble { byte } => {
                    if complete != [byte] {
                        continue;
                    }
                    return match self.pending.take() {
                        Some((held, at)) if held == byte && now.duration_since(at) <= self.window => {
                            self.partial = None;
                            InputAction::Detach(trigger)
                        }
                        Some((held, _)) => {
                            // First press expired unseen; release it and hold this one.
                            self.pending = Some((byte, now));
                            InputAction::Forward(vec![held])
                        }
                        None => {
                            self.pending = Some((byte, now));
                            InputAction::Hold
                        }
                    };
                }
            }
        }

        if complete.is_empty() {
            return InputAction::Hold;
        }
        let mut out = Vec::with_capacity(complete.len() + 1);
        if let Some((held, _)) = self.pending.take() {
            out.push(held);
        }
        out.extend_from_slice(complete);
        InputAction::Forward(out)
    }

    /// Release held input whose window has passed. An expired sequence tail
    /// takes any held ESC with it, which arrived first.
    pub fn poll_expired(&mut self, now: Instant) -> Option<Vec<u8>> {
        if let Some((_, at)) = &self.partial {
            if now.duration_since(*at) > SPLIT_SEQUENCE_WINDOW {
                let mut out = Vec::new();
                if let Some((held, _)) = self.pending.take() {
                    out.push(held);
                }
                if let Some((tail, _)) = self.partial.take() {
                    out.extend_from_slice(&tail);
                }
                return Some(out);
            }
        }
        match self.pending {
            Some((held, at)) if now.duration_since(at) > self.window => {
                self.pending = None;
                Some(vec![held])
            }
            _ => None,
        }
    }

    /// When held input, if any, should be released.
    pub fn deadline(&self) -> Option<Instant> {
        let escape = self.pending.map(|(_, at)| at + self.window);
        let tail = self.partial.as_ref().map(|(_, at)| *at + SPLIT_SEQUENCE_WINDOW);
        match (escape, tail) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn is_holding(&self) -> bool {
        self.pending.is_some() || self.partial.is_some()
    }

    fn is_holding_byte(&self, byte: u8) -> bool {
        matches!(self.pending, Some((held, _)) if held == byte)
    }

    fn reset(&mut self) {
        self.pending = None;
        self.partial = None;
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}
