//! Language detection over room name and topic.

use lingua::LanguageDetectorBuilder;

/// Wrapper around the lingua detector returning uppercase ISO 639-1 codes.
pub struct LanguageDetector {
    inner: lingua::LanguageDetector,
}

impl LanguageDetector {
    pub fn new() -> Self {
        Self {
            inner: LanguageDetectorBuilder::from_all_languages().build(),
        }
    }

    /// Detect the language of the given text. Returns `None` for empty or
    /// undecidable input.
    pub fn detect(&self, text: &str) -> Option<String> {
        if text.trim().is_empty() {
            return None;
        }
        self.inner
            .detect_language_of(text)
            .map(|language| language.iso_code_639_1().to_string().to_uppercase())
    }
}

impl Default for LanguageDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_english() {
        let detector = LanguageDetector::new();
        let code = detector.detect("a room to discuss free and open source software");
        assert_eq!(code.as_deref(), Some("EN"));
    }

    #[test]
    fn test_detect_german() {
        let detector = LanguageDetector::new();
        let code = detector.detect("ein Raum, um über freie Software zu diskutieren");
        assert_eq!(code.as_deref(), Some("DE"));
    }

    #[test]
    fn test_detect_empty() {
        let detector = LanguageDetector::new();
        assert!(detector.detect("").is_none());
        assert!(detector.detect("   ").is_none());
    }
}
