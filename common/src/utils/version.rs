use std::sync::OnceLock;

use regex::Regex;

// Matches v1.2.3, 1.2.3, version-1.2.3 and pre-release suffixes like 2.0.0-rc1.
#[allow(clippy::expect_used)]
fn version_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(?:v|version[-_]?)?(\d+\.\d+\.\d+(?:[-.][0-9a-z]+)?)")
            .expect("version pattern is valid")
    })
}

/// Extracts a version string from a file or directory path, used as a
/// fallback when an embedding request does not name a version explicitly.
pub fn extract_version_from_path(path: &str) -> Option<String> {
    version_pattern()
        .captures(path)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_plain_version() {
        assert_eq!(
            extract_version_from_path("docs/1.2.3/intro.md"),
            Some("1.2.3".to_string())
        );
    }

    #[test]
    fn test_extracts_prefixed_versions() {
        assert_eq!(
            extract_version_from_path("docs/v2.0.1/intro.md"),
            Some("2.0.1".to_string())
        );
        assert_eq!(
            extract_version_from_path("archive/version-4.5.6/manual.html"),
            Some("4.5.6".to_string())
        );
    }

    #[test]
    fn test_extracts_prerelease_suffix() {
        assert_eq!(
            extract_version_from_path("docs/v2.0.0-rc1/notes.txt"),
            Some("2.0.0-rc1".to_string())
        );
    }

    #[test]
    fn test_no_version_in_path() {
        assert_eq!(extract_version_from_path("docs/latest/intro.md"), None);
    }
}
