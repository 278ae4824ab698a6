// Name sanitizers for room ids and upload file names

/// Room used when the client sends none
pub const DEFAULT_ROOM: &str = "default";
/// Participant name used when nothing printable is left
pub const UNKNOWN_PARTICIPANT: &str = "unknown";
/// Maximum participant name length, in characters
pub const MAX_NAME_CHARS: usize = 80;

/// Keep `[A-Za-z0-9_-]`, replace everything else with `_`
pub fn safe_room_id(raw: &str) -> String {
    let room: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if room.is_empty() {
        DEFAULT_ROOM.to_string()
    } else {
        room
    }
}

fn is_forbidden(c: char) -> bool {
    matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') || c.is_control()
}

/// Make a user-supplied name safe as a file or directory name
///
/// Path separators, `:*?"<>|` and control characters become `_`, runs of
/// whitespace collapse to one space, runs of `_` collapse to one, trailing dots
/// and spaces are dropped and the result is capped at [`MAX_NAME_CHARS`].
/// Non-ASCII letters are kept.
pub fn sanitize_name(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    let mut pending_space = false;
    for c in raw.chars() {
        let c = if is_forbidden(c) { '_' } else { c };
        if c.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }

    let trimmed = out.trim_end_matches(['.', ' ']);
    let capped: String = trimmed.chars().take(MAX_NAME_CHARS).collect();
    let capped = capped.trim_end_matches(['.', ' ']);
    (!capped.is_empty()).then(|| capped.to_string())
}

pub fn sanitize_participant(raw: Option<&str>) -> String {
    raw.and_then(sanitize_name)
        .unwrap_or_else(|| UNKNOWN_PARTICIPANT.to_string())
}
