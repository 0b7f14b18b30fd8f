use regex::Regex;

/// Turn raw terminal output into plain text.
///
/// Removes escape sequences, resolves carriage-return overwrites (spinners,
/// progress lines), drops control bytes, removes lines matching any of
/// `strip_lines`, and collapses runs of blank lines.
pub fn clean_terminal_text(raw: &[u8], strip_lines: &[Regex]) -> String {
    let mut lines: Vec<String> = Vec::new();
    for raw_line in raw.split(|byte| *byte == b'\n') {
        let mut raw_line = raw_line;
        while let Some(rest) = raw_line.strip_suffix(b"\r") {
            raw_line = rest;
        }
        // Whatever follows the last carriage return overwrote the rest.
        // Resolved before stripping escapes, which also drops the `\r`.
        let visible = match raw_line.iter().rposition(|byte| *byte == b'\r') {
            Some(idx) => &raw_line[idx + 1..],
            None => raw_line,
        };
        let plain = strip_ansi_escapes::strip(visible);
        let line: String = String::from_utf8_lossy(&plain)
            .chars()
            .filter(|c| *c == '\t' || !c.is_control())
            .collect();
        let line = line.trim_end();

        if strip_lines.iter().any(|pattern| pattern.is_match(line)) {
            continue;
        }
        if line.is_empty() && lines.last().is_some_and(|last| last.is_empty()) {
            continue;
        }
        lines.push(line.to_string());
    }

    while lines.first().is_some_and(|line| line.is_empty()) {
        lines.remove(0);
    }
    while lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_colour_codes() {
        assert_eq!(clean_terminal_text(b"\x1b[1;31mred\x1b[0m text", &[]), "red text");
    }

    #[test]
    fn carriage_return_keeps_last_overwrite() {
        assert_eq!(
            clean_terminal_text(b"working |\rworking /\rdone\r\n", &[]),
            "done"
        );
    }

    #[test]
    fn collapses_blank_runs_and_trims() {
        assert_eq!(
            clean_terminal_text(b"\n\nfirst\n\n\n\nsecond\n\n", &[]),
            "first\n\nsecond"
        );
    }

    #[test]
    fn removes_matching_lines() {
        let strip = vec![Regex::new(r"^╭").unwrap()];
        assert_eq!(
            clean_terminal_text("╭────╮\nbody\n".as_bytes(), &strip),
            "body"
        );
    }

    #[test]
    fn drops_bell_and_backspace() {
        assert_eq!(clean_terminal_text(b"a\x07b\x08c", &[]), "abc");
    }
}
