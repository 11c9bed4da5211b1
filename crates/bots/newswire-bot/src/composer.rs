//! Turns a scored article into a post that fits the platform limit.
//!
//! Body text comes from the first tier that yields something usable:
//! the model summary, a templated sentence around a detected company,
//! a topic-prefixed title, or the bare title. Emojis and hashtags come
//! from fixed keyword tables. When the assembled post is too long,
//! decorations are shed before the body is cut, and the link is never
//! touched.

use std::sync::LazyLock;

use newswire_core::{Article, ComposeTier, ComposedPost, PLATFORM_LIMIT, ScoreResult, char_len};
use rand::Rng;
use regex::Regex;

pub const MAX_HASHTAGS: usize = 5;
pub const MAX_EMOJIS: usize = 3;
pub const BARE_TITLE_MAX_HASHTAGS: usize = 3;
pub const BARE_TITLE_MAX_EMOJIS: usize = 2;

/// A body cut shorter than this is not worth posting; decorations go first.
pub const MIN_BODY_CHARS: usize = 10;

/// Budget passed to the model when asking for a summary.
pub const SUMMARY_MAX_CHARS: usize = 200;

/// Separates the text from the link; kept intact by [`clamp_to_limit`].
pub const LINK_SEPARATOR: &str = "\n\n🔗 ";

const ELLIPSIS: &str = "...";

struct KeywordGroup {
    keywords: &'static [&'static str],
    values: &'static [&'static str],
}

const HASHTAG_GROUPS: &[KeywordGroup] = &[
    KeywordGroup {
        keywords: &[
            "artificial intelligence",
            "ai",
            "machine learning",
            "ml",
            "neural",
            "deep learning",
        ],
        values: &[
            "#ArtificialIntelligence",
            "#MachineLearning",
            "#DeepLearning",
            "#NeuralNetworks",
        ],
    },
    KeywordGroup {
        keywords: &["software", "programming", "code", "developer", "api"],
        values: &["#SoftwareDevelopment", "#Programming", "#Developer", "#API"],
    },
    KeywordGroup {
        keywords: &["startup", "funding", "investment", "venture", "billion", "million"],
        values: &[
            "#Startup",
            "#Investment",
            "#VentureCapital",
            "#Funding",
            "#Business",
        ],
    },
    KeywordGroup {
        keywords: &["openai"],
        values: &["#OpenAI", "#ChatGPT", "#GPT"],
    },
    KeywordGroup {
        keywords: &["google"],
        values: &["#Google", "#Alphabet", "#GoogleAI"],
    },
    KeywordGroup {
        keywords: &["microsoft"],
        values: &["#Microsoft", "#Azure", "#Copilot"],
    },
    KeywordGroup {
        keywords: &["meta"],
        values: &["#Meta", "#Facebook", "#MetaAI"],
    },
    KeywordGroup {
        keywords: &["apple"],
        values: &["#Apple", "#iOS", "#AppleAI"],
    },
    KeywordGroup {
        keywords: &["tesla"],
        values: &["#Tesla", "#ElonMusk", "#Autopilot"],
    },
    KeywordGroup {
        keywords: &["nvidia"],
        values: &["#NVIDIA", "#GPU", "#CUDA"],
    },
    KeywordGroup {
        keywords: &["anthropic"],
        values: &["#Anthropic", "#Claude"],
    },
    KeywordGroup {
        keywords: &["blockchain", "crypto", "bitcoin", "ethereum"],
        values: &["#Blockchain", "#Cryptocurrency", "#Web3", "#DeFi"],
    },
    KeywordGroup {
        keywords: &["cloud", "aws", "azure", "gcp"],
        values: &["#CloudComputing", "#AWS", "#Azure", "#CloudNative"],
    },
    KeywordGroup {
        keywords: &["cybersecurity", "security", "privacy", "encryption"],
        values: &["#Cybersecurity", "#DataPrivacy", "#InfoSec"],
    },
    KeywordGroup {
        keywords: &["quantum"],
        values: &["#QuantumComputing", "#Quantum", "#QuantumTech"],
    },
    KeywordGroup {
        keywords: &["robotics", "robot", "automation"],
        values: &["#Robotics", "#Automation", "#RoboticProcess"],
    },
    KeywordGroup {
        keywords: &["iot", "internet of things", "smart home"],
        values: &["#IoT", "#SmartHome", "#ConnectedDevices"],
    },
    KeywordGroup {
        keywords: &["5g", "6g", "network", "connectivity"],
        values: &["#5G", "#Connectivity", "#Telecommunications"],
    },
    KeywordGroup {
        keywords: &[
            "ar",
            "vr",
            "augmented reality",
            "virtual reality",
            "metaverse",
        ],
        values: &["#AR", "#VR", "#Metaverse", "#XR"],
    },
];

/// Appended after the topical tags to fill up to [`MAX_HASHTAGS`].
const GENERAL_HASHTAGS: &[&str] = &[
    "#Innovation",
    "#Technology",
    "#DigitalTransformation",
    "#FutureTech",
    "#TechNews",
];

const EMOJI_GROUPS: &[KeywordGroup] = &[
    KeywordGroup {
        keywords: &["ai", "artificial intelligence", "robot", "machine learning"],
        values: &["🤖", "🧠", "⚡"],
    },
    KeywordGroup {
        keywords: &["funding", "investment", "billion", "million", "money"],
        values: &["💰", "💸", "📈"],
    },
    KeywordGroup {
        keywords: &["launch", "release", "unveil", "announce"],
        values: &["🚀", "🎉", "✨"],
    },
    KeywordGroup {
        keywords: &["research", "development", "breakthrough", "discovery"],
        values: &["🔬", "💡", "🧪"],
    },
    KeywordGroup {
        keywords: &["security", "privacy", "protection", "safe"],
        values: &["🔒", "🛡️", "🔐"],
    },
    KeywordGroup {
        keywords: &["acquisition", "merger", "partnership"],
        values: &["🤝", "🔗", "💼"],
    },
    KeywordGroup {
        keywords: &["search", "query", "find", "discover"],
        values: &["🔍", "🔎", "📊"],
    },
    KeywordGroup {
        keywords: &["mobile", "phone", "app", "smartphone"],
        values: &["📱", "📲", "💻"],
    },
    KeywordGroup {
        keywords: &["cloud", "server", "data", "storage"],
        values: &["☁️", "💾", "🗄️"],
    },
    KeywordGroup {
        keywords: &["game", "gaming", "entertainment"],
        values: &["🎮", "🕹️", "🎯"],
    },
];

/// One of these is drawn when no emoji keyword matches.
const DEFAULT_EMOJIS: &[&str] = &["🚀", "💻", "🌟", "⚡", "🔥"];

/// Companies recognized by the templated tier, in priority order.
const COMPANIES: &[&str] = &[
    "OpenAI",
    "Google",
    "Microsoft",
    "Meta",
    "Apple",
    "Amazon",
    "Tesla",
    "Nvidia",
    "Anthropic",
    "Perplexity",
    "Cursor",
    "DeviantArt",
    "AMD",
    "Intel",
];

static MAGNITUDE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\$?(\d+(?:\.\d+)?)\s*(billion|million|%|percent)").expect("Valid regex")
});

static BRACKETED_IMPACT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[(\[{]\s*(?:impact|effect)\s*:\s*\w+\s*[)\]}]").expect("Valid regex")
});

static IMPACT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:impact|effect)\s*:\s*\w+\b").expect("Valid regex"));

static REPLY_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*tweet(?:\s+text)?\s*:\s*").expect("Valid regex"));

/// Whether lowercase `text` mentions lowercase `keyword`.
///
/// Keywords of three characters or fewer must stand as a whole word, so
/// "ai" does not fire on "said" and "ar" not on "market".
fn mentions(text: &str, keyword: &str) -> bool {
    if 3 < char_len(keyword) {
        return text.contains(keyword);
    }
    text.match_indices(keyword).any(|(start, _)| {
        let before = text[..start].chars().next_back();
        let after = text[start + keyword.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

fn mentions_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| mentions(text, k))
}

/// Up to [`MAX_HASHTAGS`] unique tags: topical ones in table order, then
/// general ones.
pub fn hashtags_for(text: &str) -> Vec<String> {
    let mut tags: Vec<String> = vec![];
    let topical = HASHTAG_GROUPS
        .iter()
        .filter(|group| mentions_any(text, group.keywords))
        .flat_map(|group| group.values.iter());
    for tag in topical.chain(GENERAL_HASHTAGS) {
        if tags.len() == MAX_HASHTAGS {
            break;
        }
        if !tags.iter().any(|t| t == tag) {
            tags.push((*tag).to_owned());
        }
    }
    tags
}

/// Up to [`MAX_EMOJIS`] emojis matching `text`, or a single random default.
pub fn emojis_for(text: &str, rng: &mut impl Rng) -> Vec<String> {
    let mut emojis: Vec<String> = EMOJI_GROUPS
        .iter()
        .filter(|group| mentions_any(text, group.keywords))
        .flat_map(|group| group.values.iter())
        .take(MAX_EMOJIS)
        .map(|e| (*e).to_owned())
        .collect();
    if emojis.is_empty() {
        let pick = DEFAULT_EMOJIS[rng.random_range(0..DEFAULT_EMOJIS.len())];
        emojis.push(pick.to_owned());
    }
    emojis
}

/// Strip artifacts the model tends to add around a summary.
pub fn clean_summary(raw: &str) -> String {
    let text = REPLY_PREFIX_RE.replace(raw, "");
    let text = BRACKETED_IMPACT_RE.replace_all(&text, " ");
    let text = IMPACT_RE.replace_all(&text, " ");
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    text.trim_matches(|c: char| matches!(c, '"' | '\'' | '“' | '”'))
        .trim()
        .to_owned()
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Unit {
    Billion,
    Million,
    Percent,
}

/// A figure like "$6.6 billion" or "40%".
#[derive(Debug, Clone, PartialEq)]
struct Magnitude {
    /// As written in the article.
    number: String,
    unit: Unit,
}

impl Magnitude {
    fn weight(&self) -> f64 {
        let value: f64 = self.number.parse().unwrap_or_default();
        match self.unit {
            Unit::Billion => value * 1e9,
            Unit::Million => value * 1e6,
            Unit::Percent => value,
        }
    }

    fn note(&self) -> String {
        match self.unit {
            Unit::Billion => format!("(${}B)", self.number),
            Unit::Million => format!("(${}M)", self.number),
            Unit::Percent => format!("({}% improvement)", self.number),
        }
    }
}

/// The largest figure mentioned in `text`.
fn largest_magnitude(text: &str) -> Option<Magnitude> {
    MAGNITUDE_RE
        .captures_iter(text)
        .map(|c| Magnitude {
            number: c[1].to_owned(),
            unit: match c[2].to_lowercase().as_str() {
                "billion" => Unit::Billion,
                "million" => Unit::Million,
                _ => Unit::Percent,
            },
        })
        .max_by(|a, b| a.weight().total_cmp(&b.weight()))
}

fn detect_company(text: &str) -> Option<&'static str> {
    COMPANIES
        .iter()
        .copied()
        .find(|c| mentions(text, &c.to_lowercase()))
}

/// Templated sentence around `company`, from the action the text describes.
fn rich_body(company: &str, title: &str, text: &str) -> String {
    let magnitude = largest_magnitude(text);

    let mut body = if mentions_any(text, &["acquisition", "acquire"]) {
        if mentions(text, "billion") {
            format!("{company} completes major acquisition")
        } else {
            format!("{company} acquires strategic company")
        }
    } else if mentions_any(text, &["funding", "investment"]) {
        match &magnitude {
            Some(Magnitude {
                number,
                unit: Unit::Billion,
            }) => format!("{company} raises ${number}B in funding"),
            Some(Magnitude {
                number,
                unit: Unit::Million,
            }) => format!("{company} secures ${number}M investment"),
            Some(_) => format!("{company} secures major funding"),
            None => format!("{company} secures new funding round"),
        }
    } else if mentions_any(text, &["launch", "release"]) {
        if mentions(text, "ai") {
            format!("{company} launches new AI technology")
        } else if mentions(text, "robot") {
            format!("{company} unveils advanced robotics")
        } else {
            format!("{company} releases breakthrough innovation")
        }
    } else if mentions_any(text, &["partnership", "partner"]) {
        format!("{company} forms strategic partnership")
    } else if mentions_any(text, &["breakthrough", "innovation"]) {
        format!("{company} achieves major breakthrough")
    } else {
        let rest = title
            .replace(company, "")
            .trim_matches(|c: char| c.is_whitespace() || c == ':' || c == ',' || c == '-')
            .to_owned();
        if rest.is_empty() {
            format!("{company} makes major announcement")
        } else {
            format!("{company}: {}", truncate_chars(&rest, 80))
        }
    };

    if let Some(magnitude) = magnitude {
        if !body.contains('$') {
            body.push(' ');
            body.push_str(&magnitude.note());
        }
    }
    body
}

/// Body text and the tier it came from.
fn body_text(article: &Article, score: &ScoreResult, text: &str) -> (String, ComposeTier) {
    let summary = clean_summary(&score.summary);
    if MIN_BODY_CHARS <= char_len(&summary) {
        return (summary, ComposeTier::Summary);
    }

    let title = article.title();
    if let Some(company) = detect_company(text) {
        return (rich_body(company, title, text), ComposeTier::Rich);
    }
    if mentions(text, "ai") || mentions(text, "artificial intelligence") {
        return (format!("AI breakthrough: {title}"), ComposeTier::Simple);
    }
    if mentions(text, "robot") {
        return (format!("Robotics advance: {title}"), ComposeTier::Simple);
    }
    (title.to_owned(), ComposeTier::BareTitle)
}

/// The first `max` characters of `s`.
fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// `s` cut to at most `max` characters, ending in an ellipsis if cut.
fn shorten(s: &str, max: usize) -> String {
    if char_len(s) <= max {
        return s.to_owned();
    }
    if max <= ELLIPSIS.len() {
        return String::new();
    }
    format!(
        "{}{ELLIPSIS}",
        truncate_chars(s, max - ELLIPSIS.len()).trim_end()
    )
}

fn assemble(emojis: &str, body: &str, hashtags: &str, url: &str) -> String {
    let main = [emojis, body, hashtags]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if main.is_empty() {
        format!("🔗 {url}")
    } else {
        format!("{main}{LINK_SEPARATOR}{url}")
    }
}

/// How many decorations each attempt keeps, most decorated first.
const DEGRADATION_STEPS: &[(Option<usize>, Option<usize>)] = &[
    // (hashtags, emojis); `None` keeps all of them
    (None, None),
    (Some(2), None),
    (Some(0), None),
    (Some(0), Some(0)),
];

pub fn compose(article: &Article, score: &ScoreResult, rng: &mut impl Rng) -> ComposedPost {
    compose_with_limit(article, score, rng, PLATFORM_LIMIT)
}

/// Like [`compose`] for an arbitrary character limit.
///
/// The result fits `limit` unless the link alone does not.
pub fn compose_with_limit(
    article: &Article,
    score: &ScoreResult,
    rng: &mut impl Rng,
    limit: usize,
) -> ComposedPost {
    let text = article.searchable_text();
    let url = article.url();
    let (body, tier) = body_text(article, score, &text);

    let mut hashtags = hashtags_for(&text);
    let mut emojis = emojis_for(&text, rng);
    if tier == ComposeTier::BareTitle {
        hashtags.truncate(BARE_TITLE_MAX_HASHTAGS);
        emojis.truncate(BARE_TITLE_MAX_EMOJIS);
    }

    let link_len = char_len(LINK_SEPARATOR) + char_len(url);

    for &(max_tags, max_emojis) in DEGRADATION_STEPS {
        let used_tags = &hashtags[..max_tags.unwrap_or(hashtags.len()).min(hashtags.len())];
        let used_emojis = &emojis[..max_emojis.unwrap_or(emojis.len()).min(emojis.len())];
        let tags_str = used_tags.join(" ");
        let emojis_str = used_emojis.concat();

        let decoration_len = char_len(&tags_str) + char_len(&emojis_str);
        let budget = limit
            .saturating_sub(link_len)
            .saturating_sub(decoration_len)
            .saturating_sub(2);
        let mut fitted = shorten(&body, budget);
        let mut final_text = assemble(&emojis_str, &fitted, &tags_str, url);

        let total = char_len(&final_text);
        if limit < total {
            let excess = total - limit;
            fitted = shorten(&fitted, char_len(&fitted).saturating_sub(excess));
            final_text = assemble(&emojis_str, &fitted, &tags_str, url);
        }

        let body_too_cut = fitted != body && char_len(&fitted) < MIN_BODY_CHARS;
        if char_len(&final_text) <= limit && !body_too_cut {
            return ComposedPost {
                body_text: fitted,
                emojis: used_emojis.to_vec(),
                hashtags: used_tags.to_vec(),
                url: url.to_owned(),
                final_text,
                tier,
            };
        }
    }

    ComposedPost {
        body_text: String::new(),
        emojis: vec![],
        hashtags: vec![],
        url: url.to_owned(),
        final_text: assemble("", "", "", url),
        tier,
    }
}

/// Shorten an already assembled post to `limit` characters.
///
/// Text before the final [`LINK_SEPARATOR`] is cut and the link part is
/// kept whole. Without a link part the whole text is cut.
pub fn clamp_to_limit(text: &str, limit: usize) -> String {
    if char_len(text) <= limit {
        return text.to_owned();
    }
    let Some(split) = text.rfind(LINK_SEPARATOR) else {
        return shorten(text, limit);
    };
    let (main, link) = text.split_at(split);
    let available = limit.saturating_sub(char_len(link));
    let main = shorten(main, available);
    if main.is_empty() {
        return shorten(text, limit);
    }
    format!("{main}{link}")
}

#[cfg(test)]
mod tests {
    use newswire_core::{Audience, Importance, ScoreSource, Timestamp};
    use proptest::prelude::*;
    use rand::SeedableRng as _;
    use rand::rngs::StdRng;

    use super::*;

    fn article(title: &str, content: &str) -> Article {
        Article::new(
            title,
            "https://techcrunch.com/2025/01/01/story/",
            content,
            "test",
            Timestamp::ZERO,
        )
        .expect("valid")
    }

    fn scored(summary: &str) -> ScoreResult {
        ScoreResult {
            importance: Importance::new(8).expect("valid"),
            audience: Audience::General,
            summary: summary.to_owned(),
            source: ScoreSource::Model,
        }
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn short_keywords_match_whole_words_only() {
        assert!(mentions("new ai model", "ai"));
        assert!(mentions("ai.", "ai"));
        assert!(!mentions("she said so", "ai"));
        assert!(!mentions("market update", "ar"));
        assert!(mentions("ar/vr headsets", "ar"));
        assert!(mentions("openai ships", "openai"));
    }

    #[test]
    fn hashtags_are_topical_then_general_and_unique() {
        let tags = hashtags_for("openai raises funding for ai research");
        assert_eq!(
            tags,
            [
                "#ArtificialIntelligence",
                "#MachineLearning",
                "#DeepLearning",
                "#NeuralNetworks",
                "#Startup"
            ]
        );

        let tags = hashtags_for("azure cloud outage");
        assert_eq!(
            tags,
            [
                "#CloudComputing",
                "#AWS",
                "#Azure",
                "#CloudNative",
                "#Innovation"
            ]
        );

        assert_eq!(hashtags_for("nothing relevant"), GENERAL_HASHTAGS);
    }

    #[test]
    fn emojis_follow_keywords_or_pick_one_default() {
        assert_eq!(
            emojis_for("startup raises money in a funding round", &mut rng()),
            ["💰", "💸", "📈"]
        );
        assert_eq!(
            emojis_for("new robot launch", &mut rng()),
            ["🤖", "🧠", "⚡"]
        );

        let fallback = emojis_for("quiet day", &mut rng());
        assert_eq!(fallback.len(), 1);
        assert!(DEFAULT_EMOJIS.contains(&fallback[0].as_str()));
        assert_eq!(fallback, emojis_for("quiet day", &mut rng()), "seeded");
    }

    #[test]
    fn clean_summary_strips_model_artifacts() {
        assert_eq!(
            clean_summary("Tweet: \"OpenAI ships GPT-5 (Impact: High) to everyone\"  impact: major"),
            "OpenAI ships GPT-5 to everyone"
        );
        assert_eq!(clean_summary("  plain   text "), "plain text");
    }

    #[test]
    fn summary_tier_is_preferred() {
        let post = compose(
            &article("OpenAI launches a model", "Some text"),
            &scored("A compact model that runs on a laptop"),
            &mut rng(),
        );
        assert_eq!(post.tier, ComposeTier::Summary);
        assert_eq!(post.body_text, "A compact model that runs on a laptop");
        assert!(post.final_text.ends_with("\n\n🔗 https://techcrunch.com/2025/01/01/story/"));
    }

    #[test]
    fn rich_tier_reports_funding_with_figure() {
        let post = compose(
            &article(
                "OpenAI closes round",
                "OpenAI raised $6.6 billion in new funding, the company said.",
            ),
            &ScoreResult::fallback(),
            &mut rng(),
        );
        assert_eq!(post.tier, ComposeTier::Rich);
        assert_eq!(post.body_text, "OpenAI raises $6.6B in funding");
    }

    #[test]
    fn rich_tier_appends_figure_note() {
        let body = rich_body(
            "Nvidia",
            "Nvidia partners with carmaker",
            "nvidia partner deal improves efficiency by 40%",
        );
        assert_eq!(body, "Nvidia forms strategic partnership (40% improvement)");

        let body = rich_body("Intel", "Intel: new fab plans", "intel shares plans");
        assert_eq!(body, "Intel: new fab plans");
    }

    #[test]
    fn simple_and_bare_title_tiers() {
        let post = compose(
            &article("Robots learn to fold laundry", "A lab shows a robot folding"),
            &ScoreResult::fallback(),
            &mut rng(),
        );
        assert_eq!(post.tier, ComposeTier::Simple);
        assert_eq!(post.body_text, "Robotics advance: Robots learn to fold laundry");

        let post = compose(
            &article("Quarterly chip shipments", "Shipments grew"),
            &ScoreResult::fallback(),
            &mut rng(),
        );
        assert_eq!(post.tier, ComposeTier::BareTitle);
        assert_eq!(post.body_text, "Quarterly chip shipments");
        assert!(post.hashtags.len() <= BARE_TITLE_MAX_HASHTAGS);
        assert!(post.emojis.len() <= BARE_TITLE_MAX_EMOJIS);
    }

    #[test]
    fn fallback_output_is_deterministic_for_same_seed() {
        let a = article("Apple unveils a headset", "Apple said the launch is in June");
        let first = compose(&a, &ScoreResult::fallback(), &mut rng());
        let second = compose(&a, &ScoreResult::fallback(), &mut rng());
        assert_eq!(first, second);
    }

    #[test]
    fn overlong_summary_is_cut_with_ellipsis() {
        let summary = "word ".repeat(100);
        let post = compose(
            &article("AI news", "ai"),
            &scored(&summary),
            &mut rng(),
        );
        assert_eq!(char_len(&post.final_text), PLATFORM_LIMIT);
        assert!(post.body_text.ends_with(ELLIPSIS));
        assert_eq!(post.hashtags.len(), MAX_HASHTAGS);
        assert!(post.final_text.contains(LINK_SEPARATOR));
    }

    #[test]
    fn decorations_are_dropped_before_body_vanishes() {
        let a = article("OpenAI ships a new model to everyone today", "ai model");
        let post = compose_with_limit(&a, &scored("A long enough summary of the news"), &mut rng(), 90);
        assert!(char_len(&post.final_text) <= 90);
        assert!(MIN_BODY_CHARS <= char_len(&post.body_text));
        assert!(post.hashtags.len() < MAX_HASHTAGS);
    }

    #[test]
    fn very_long_title_without_model_fits_with_link() {
        let title = "Startup raises funding for AI chips ".repeat(9);
        assert!(300 <= char_len(title.trim()));
        let a = Article::new(
            title,
            "https://techcrunch.com/2025/01/01/a-very-long-story/",
            "",
            "test",
            Timestamp::ZERO,
        )
        .expect("valid");

        let post = compose(&a, &ScoreResult::fallback(), &mut rng());
        assert!(char_len(&post.final_text) <= PLATFORM_LIMIT);
        assert!(post.final_text.ends_with(a.url()));
        assert_ne!(post.tier, ComposeTier::Summary);
    }

    #[test]
    fn tiny_limit_leaves_only_the_link() {
        let a = article("OpenAI ships", "ai");
        let post = compose_with_limit(&a, &scored("A long enough summary"), &mut rng(), 52);
        assert_eq!(post.final_text, format!("🔗 {}", a.url()));
        assert!(post.body_text.is_empty());
    }

    #[test]
    fn clamp_keeps_link_part() {
        let text = format!("{}{LINK_SEPARATOR}https://example.com/a", "x".repeat(300));
        let clamped = clamp_to_limit(&text, PLATFORM_LIMIT);
        assert_eq!(char_len(&clamped), PLATFORM_LIMIT);
        assert!(clamped.ends_with("...\n\n🔗 https://example.com/a"));

        assert_eq!(clamp_to_limit("short", PLATFORM_LIMIT), "short");
        assert_eq!(char_len(&clamp_to_limit(&"y".repeat(400), 100)), 100);
    }

    fn any_article() -> impl Strategy<Value = Article> {
        (
            "[A-Za-z0-9 $%.]{1,400}",
            "[a-z0-9/._-]{0,170}",
            "[A-Za-z0-9 $%.,]{0,600}",
        )
            .prop_filter_map("non-blank title", |(title, path, content)| {
                Article::new(
                    title,
                    format!("https://example.com/{path}"),
                    content,
                    "prop",
                    Timestamp::ZERO,
                )
                .ok()
            })
    }

    proptest! {
        #[test]
        fn post_fits_limit_and_keeps_url(
            article in any_article(),
            summary in "[A-Za-z0-9 ()\":]{0,400}",
            seed in any::<u64>(),
        ) {
            let score = ScoreResult { summary, ..ScoreResult::fallback() };
            let post = compose(&article, &score, &mut StdRng::seed_from_u64(seed));

            prop_assert!(char_len(&post.final_text) <= PLATFORM_LIMIT);
            prop_assert!(post.final_text.ends_with(article.url()));
            prop_assert_eq!(&post.url, article.url());
            prop_assert!(post.hashtags.len() <= MAX_HASHTAGS);
            prop_assert!(post.emojis.len() <= MAX_EMOJIS);
        }

        #[test]
        fn clamp_never_exceeds_limit(text in "\\PC{0,500}", limit in 20usize..300) {
            prop_assert!(char_len(&clamp_to_limit(&text, limit)) <= limit);
        }
    }
}
