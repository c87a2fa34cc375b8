//! Filesystem-safe slugging shared by directory and data-file names.

/// Lowercases `name`, replaces any run of non `[a-z0-9]` characters with a
/// single `-`, and trims leading/trailing dashes.
#[must_use]
pub fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_dash = false;
    for ch in name.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_alphanumeric() {
            out.push(ch);
            last_was_dash = false;
        } else if !last_was_dash {
            out.push('-');
            last_was_dash = true;
        }
    }
    out.trim_matches('-').to_string()
}
