//! Greedy packing of reply lines into radio-sized messages.

/// Reply size limit used when nothing else is configured.
pub const DEFAULT_REPLY_CAP: usize = 200;

/// Pack `lines` into as few messages as possible, each at most `cap`
/// characters, joining lines with `\n`.
///
/// Packing is greedy and keeps input order. A line is never split: one that
/// is longer than `cap` on its own becomes a message by itself.
pub fn pack_lines<S: AsRef<str>>(lines: &[S], cap: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;
    // an empty line still occupies its slot, so track this apart from `current`
    let mut started = false;

    for line in lines {
        let line = line.as_ref();
        let line_len = line.chars().count();
        if !started {
            current.push_str(line);
            current_len = line_len;
            started = true;
        } else if current_len + 1 + line_len <= cap {
            current.push('\n');
            current.push_str(line);
            current_len += 1 + line_len;
        } else {
            out.push(std::mem::take(&mut current));
            current.push_str(line);
            current_len = line_len;
        }
    }
    if started {
        out.push(current);
    }
    out
}
