//! Terminal protocol noise that must never reach a subprocess.
//!
//! The outer terminal answers queries (device attributes, cursor position,
//! keyboard protocol flags) and reports focus changes asynchronously on the
//! same stream as keystrokes. Forwarded verbatim, a reply like
//! `ESC [ ? 1 ; 2 c` shows up in the tool as typed text. Recognition is exact
//! for the shapes below; anything else passes through untouched.

const ESC: u8 = 0x1b;

/// A recognised sequence at the start of the input, and its length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Noise {
    FocusIn,
    FocusOut,
    /// `CSI ? Ps ; ... c`
    PrimaryDeviceAttributes,
    /// `CSI > Ps ; ... c`
    SecondaryDeviceAttributes,
    /// `CSI Pr ; Pc R`
    CursorPosition,
    /// `CSI ? flags u`
    KeyboardEnhancementFlags,
}

/// Remove focus reports and terminal responses from a chunk of input.
pub fn strip_terminal_noise(input: &[u8]) -> Vec<u8> {
    strip_matching(input, |_| true)
}

/// Remove only focus-in / focus-out reports. Used on replayed output, where
/// the other shapes are legitimate program output.
pub fn strip_focus_reports(input: &[u8]) -> Vec<u8> {
    strip_matching(input, |noise| matches!(noise, Noise::FocusIn | Noise::FocusOut))
}

fn strip_matching(input: &[u8], mut keep_out: impl FnMut(Noise) -> bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut idx = 0;
    while idx < input.len() {
        if input[idx] == ESC {
            if let Some((noise, len)) = match_noise(&input[idx..]) {
                if keep_out(noise) {
                    idx += len;
                    continue;
                }
            }
        }
        out.push(input[idx]);
        idx += 1;
    }
    out
}

/// Match one noise sequence at the start of `bytes` (which begins with ESC).
pub fn match_noise(bytes: &[u8]) -> Option<(Noise, usize)> {
    if bytes.len() < 3 || bytes[0] != ESC || bytes[1] != b'[' {
        return None;
    }

    match bytes[2] {
        b'I' => Some((Noise::FocusIn, 3)),
        b'O' => Some((Noise::FocusOut, 3)),
        b'?' => {
            let params = param_len(&bytes[3..]);
            match bytes.get(3 + params) {
                Some(b'c') if params > 0 => {
                    Some((Noise::PrimaryDeviceAttributes, 3 + params + 1))
                }
                Some(b'u') if params > 0 && !bytes[3..3 + params].contains(&b';') => {
                    Some((Noise::KeyboardEnhancementFlags, 3 + params + 1))
                }
                _ => None,
            }
        }
        b'>' => {
            let params = param_len(&bytes[3..]);
            match bytes.get(3 + params) {
                Some(b'c') if params > 0 => {
                    Some((Noise::SecondaryDeviceAttributes, 3 + params + 1))
                }
                _ => None,
            }
        }
        b'0'..=b'9' => {
            let params = param_len(&bytes[2..]);
            let body = &bytes[2..2 + params];
            let is_pair = body.iter().filter(|b| **b == b';').count() == 1
                && !body.starts_with(b";")
                && !body.ends_with(b";");
            match bytes.get(2 + params) {
                Some(b'R') if is_pair => Some((Noise::CursorPosition, 2 + params + 1)),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Start of an unterminated `CSI` sequence at the end of `bytes`, or
/// `bytes.len()` if there is none.
///
/// Terminal replies can be split across reads. A tail like `ESC [ ? 62` may
/// still become a device-attributes reply (or a keyboard-protocol chord), so
/// the caller holds it until more input arrives. A bare trailing ESC is not
/// reported here.
pub fn incomplete_tail(bytes: &[u8]) -> usize {
    let Some(start) = bytes.iter().rposition(|b| *b == ESC) else {
        return bytes.len();
    };
    let tail = &bytes[start..];
    if tail.len() < 2 || tail[1] != b'[' {
        return bytes.len();
    }
    let body = match tail.get(2) {
        Some(b'?' | b'>') => &tail[3..],
        _ => &tail[2..],
    };
    if param_len(body) == body.len() {
        start
    } else {
        bytes.len()
    }
}

/// Length of the leading run of digits and `;`.
fn param_len(bytes: &[u8]) -> usize {
    bytes
        .iter()
        .take_while(|b| b.is_ascii_digit() || **b == b';')
        .count()
}
