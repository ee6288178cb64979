use std::fs;
use std::path::Path;

/// Marker appended to content cut down by [`truncate_for_context`].
pub const TRUNCATION_MARKER: &str = "\n\n/* [truncated for context] */";

/// Default number of characters of a single file sent to the model.
pub const DEFAULT_CONTEXT_LIMIT: usize = 60_000;

/// Cut `text` to at most `limit` characters, appending [`TRUNCATION_MARKER`]
/// when anything was dropped.
///
/// Counts Unicode scalar values, so the cut never lands inside a character and
/// the same input always yields the same output.
pub fn truncate_for_context(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((byte_idx, _)) => {
            let mut out = String::with_capacity(byte_idx + TRUNCATION_MARKER.len());
            out.push_str(&text[..byte_idx]);
            out.push_str(TRUNCATION_MARKER);
            out
        }
        None => text.to_string(),
    }
}

/// Truncate a string for display (Unicode-safe)
pub fn truncate_str(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &s[..byte_idx],
        None => s,
    }
}

/// Write `content` to a sibling temp file and rename it over `path`.
///
/// On unix the file is created owner read/write only.
pub fn write_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600));
    }

    #[cfg(windows)]
    {
        let backup_path = path.with_extension("bak");
        if backup_path.exists() {
            let _ = fs::remove_file(&backup_path);
        }
        if path.exists() {
            if let Err(err) = fs::rename(path, &backup_path) {
                let _ = fs::remove_file(&tmp_path);
                return Err(err);
            }
        }
        if let Err(err) = fs::rename(&tmp_path, path) {
            if backup_path.exists() {
                let _ = fs::rename(&backup_path, path);
            }
            let _ = fs::remove_file(&tmp_path);
            return Err(err);
        }
        let _ = fs::remove_file(&backup_path);
        return Ok(());
    }

    #[cfg(not(windows))]
    {
        if let Err(err) = fs::rename(&tmp_path, path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(err);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_is_untouched() {
        assert_eq!(truncate_for_context("fn main() {}", 60_000), "fn main() {}");
    }

    #[test]
    fn test_text_at_limit_is_untouched() {
        let text = "x".repeat(100);
        assert_eq!(truncate_for_context(&text, 100), text);
    }

    #[test]
    fn test_long_text_is_cut_and_marked() {
        let text = "a".repeat(70_000);
        let out = truncate_for_context(&text, 60_000);
        let expected = format!("{}{}", "a".repeat(60_000), TRUNCATION_MARKER);
        assert_eq!(out, expected);
        assert_eq!(out.len(), 60_000 + TRUNCATION_MARKER.len());
    }

    #[test]
    fn test_truncation_counts_characters_not_bytes() {
        let out = truncate_for_context("héllo wörld", 5);
        assert_eq!(out, format!("héllo{}", TRUNCATION_MARKER));
    }

    #[test]
    fn test_write_atomic_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        write_atomic(&path, "first").unwrap();
        write_atomic(&path, "second").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_truncate_str_unicode_safe() {
        assert_eq!(truncate_str("错误: 失败 😊", 5), "错误: 失");
        assert_eq!(truncate_str("short", 10), "short");
    }
}
