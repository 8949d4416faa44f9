//! Log previews of text that came from outside the process.
//!
//! Two sources end up in the log: mesh text (short, often emoji) and raw
//! bridge lines (JSON, potentially long). Both are kept on one log line; they
//! differ in how much is shown.

/// Mesh messages fit in one radio packet, so this is rarely hit.
const MESH_PREVIEW_CHARS: usize = 240;
/// Bridge lines only need enough to recognise the event.
const BRIDGE_PREVIEW_CHARS: usize = 96;

/// One-line preview of mesh text. Emoji and other printable characters
/// pass through; line breaks, tabs and other controls are escaped.
pub fn escape_log(s: &str) -> String {
    preview(s, MESH_PREVIEW_CHARS)
}

/// One-line preview of a raw bridge line, cut shorter than mesh text.
pub fn preview_bridge_line(line: &str) -> String {
    preview(line.trim_end(), BRIDGE_PREVIEW_CHARS)
}

fn preview(s: &str, max_chars: usize) -> String {
    let total = s.chars().count();
    let mut out: String = s
        .chars()
        .take(max_chars)
        .map(|c| match c {
            '\n' | '\r' | '\t' | '\\' => c.escape_default().to_string(),
            c if c.is_control() => format!("\\u{{{:x}}}", c as u32),
            c => c.to_string(),
        })
        .collect();
    if total > max_chars {
        out.push_str(&format!("…(+{})", total - max_chars));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multi_line_reply_stays_on_one_line() {
        assert_eq!(escape_log("AB: hi\nCD: yo\t!"), "AB: hi\\nCD: yo\\t!");
        assert_eq!(escape_log("bell\u{7}"), "bell\\u{7}");
    }

    #[test]
    fn emoji_pass_through() {
        assert_eq!(escape_log("👋🏽"), "👋🏽");
    }

    #[test]
    fn cut_text_reports_what_was_dropped() {
        let long = "x".repeat(300);
        assert_eq!(escape_log(&long), format!("{}…(+60)", "x".repeat(240)));
    }

    #[test]
    fn bridge_lines_are_cut_shorter() {
        let line = format!("{{\"type\":\"text\",\"text\":\"{}\"}}\n", "y".repeat(200));
        let shown = preview_bridge_line(&line);
        assert!(shown.starts_with("{\"type\":\"text\""));
        assert!(shown.contains("…(+"));
        assert!(!shown.contains('\n'));
    }
}
