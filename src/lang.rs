//! Supported languages and the pivot language used for generation

/// Pivot language: answers are generated in this language and translated
/// to/from the user's selection around the generation call
pub const PIVOT_LANG: &str = "en";

/// Default target language when none is configured
pub const DEFAULT_LANG: &str = "hi";

/// A supported interface language
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Language {
    /// ISO 639-1 code used by both gateways
    pub code: &'static str,
    /// English display name
    pub name: &'static str,
    /// Native-script display name
    pub native: &'static str,
}

/// Languages the engine can translate to and synthesize speech in
pub const LANGUAGES: &[Language] = &[
    Language { code: "hi", name: "Hindi", native: "हिन्दी" },
    Language { code: "bn", name: "Bengali", native: "বাংলা" },
    Language { code: "te", name: "Telugu", native: "తెలుగు" },
    Language { code: "mr", name: "Marathi", native: "मराठी" },
    Language { code: "ta", name: "Tamil", native: "தமிழ்" },
    Language { code: "ur", name: "Urdu", native: "اردو" },
    Language { code: "gu", name: "Gujarati", native: "ગુજરાતી" },
    Language { code: "kn", name: "Kannada", native: "ಕನ್ನಡ" },
    Language { code: "ml", name: "Malayalam", native: "മലയാളം" },
    Language { code: "pa", name: "Punjabi", native: "ਪੰਜਾਬੀ" },
    Language { code: "en", name: "English", native: "English" },
];

/// Look up a language by its code
#[must_use]
pub fn find(code: &str) -> Option<&'static Language> {
    LANGUAGES.iter().find(|l| l.code == code)
}

/// English display name for a language code, falling back to Hindi for
/// unknown codes
#[must_use]
pub fn display_name(code: &str) -> &'static str {
    find(code).map_or("Hindi", |l| l.name)
}

/// Whether a code names a supported language
#[must_use]
pub fn is_supported(code: &str) -> bool {
    find(code).is_some()
}
