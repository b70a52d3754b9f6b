//! Path display helpers.

/// Shorten `path` to its last `max_chars` characters, prefixed by `...`.
///
/// Paths that already fit are returned unchanged. Works on characters, not
/// bytes, so multi-byte names are never split.
///
/// # Example
///
/// ```
/// use deduplicate::scanner::path_utils::shorten_path;
///
/// assert_eq!(shorten_path("/a/b.txt", 40), "/a/b.txt");
/// assert_eq!(shorten_path("/very/long/dir/file.txt", 8), "...file.txt");
/// ```
#[must_use]
pub fn shorten_path(path: &str, max_chars: usize) -> String {
    let count = path.chars().count();
    if count <= max_chars {
        return path.to_string();
    }
    let tail: String = path.chars().skip(count - max_chars).collect();
    format!("...{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_path_unchanged() {
        assert_eq!(shorten_path("/tmp/x", 40), "/tmp/x");
    }

    #[test]
    fn test_exact_length_unchanged() {
        assert_eq!(shorten_path("abcd", 4), "abcd");
    }

    #[test]
    fn test_long_path_keeps_tail() {
        assert_eq!(shorten_path("/home/user/photos/2020/img.jpg", 12), "...2020/img.jpg");
    }

    #[test]
    fn test_multibyte_not_split() {
        assert_eq!(shorten_path("/données/café.txt", 8), "...café.txt");
    }
}
