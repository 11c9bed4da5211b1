use std::fmt;

/// Which body-text strategy produced a [`ComposedPost`].
///
/// Ordered from most to least preferred.
#[cfg_attr(feature = "bincode", derive(::bincode::Encode, ::bincode::Decode))]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ComposeTier {
    /// The model-written summary.
    Summary,
    /// Templated sentence built from a detected company, action and figure.
    Rich,
    /// Topic prefix plus the article title.
    Simple,
    /// The bare title.
    BareTitle,
}

impl fmt::Display for ComposeTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ComposeTier::Summary => "summary",
            ComposeTier::Rich => "rich",
            ComposeTier::Simple => "simple",
            ComposeTier::BareTitle => "bare-title",
        })
    }
}

/// A post ready for publishing.
///
/// `final_text` never exceeds [`crate::PLATFORM_LIMIT`] characters and always
/// contains `url` verbatim.
#[cfg_attr(feature = "bincode", derive(::bincode::Encode, ::bincode::Decode))]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedPost {
    pub body_text: String,
    pub emojis: Vec<String>,
    pub hashtags: Vec<String>,
    pub url: String,
    pub final_text: String,
    pub tier: ComposeTier,
}
