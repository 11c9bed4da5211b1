use std::fmt;
use std::str::FromStr;

use crate::{Article, ComposedPost, ContentHash, Timestamp};

/// What the social network returned for a successful post.
#[cfg_attr(feature = "bincode", derive(::bincode::Encode, ::bincode::Decode))]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub id: String,
    pub url: String,
}

/// Record of a published article.
#[cfg_attr(feature = "bincode", derive(::bincode::Encode, ::bincode::Decode))]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub title: String,
    pub url: String,
    pub content_hash: ContentHash,
    pub posted_at: Timestamp,
    pub external_post_id: String,
    pub external_post_url: String,
}

impl LedgerEntry {
    pub fn new(article: &Article, receipt: &PublishReceipt, posted_at: Timestamp) -> Self {
        Self {
            title: article.title().to_owned(),
            url: article.url().to_owned(),
            content_hash: article.content_hash(),
            posted_at,
            external_post_id: receipt.id.clone(),
            external_post_url: receipt.url.clone(),
        }
    }
}

/// Stable identifier of a pending queue entry. Never reused.
#[cfg_attr(feature = "bincode", derive(::bincode::Encode, ::bincode::Decode))]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PendingId(u64);

impl PendingId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for PendingId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for PendingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for PendingId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().trim_start_matches('#').parse().map(Self)
    }
}

#[cfg_attr(feature = "bincode", derive(::bincode::Encode, ::bincode::Decode))]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PendingStatus {
    Pending,
    Posted,
    Rejected,
}

impl fmt::Display for PendingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PendingStatus::Pending => "pending",
            PendingStatus::Posted => "posted",
            PendingStatus::Rejected => "rejected",
        })
    }
}

/// A composed post waiting for a human decision.
///
/// Status only ever moves `Pending -> Posted` or `Pending -> Rejected`.
#[cfg_attr(feature = "bincode", derive(::bincode::Encode, ::bincode::Decode))]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    pub article: Article,
    pub post: ComposedPost,
    pub score: u8,
    pub created_at: Timestamp,
    pub status: PendingStatus,
    pub receipt: Option<PublishReceipt>,
    pub decided_at: Option<Timestamp>,
}

impl PendingEntry {
    pub fn new(article: Article, post: ComposedPost, score: u8, created_at: Timestamp) -> Self {
        Self {
            article,
            post,
            score,
            created_at,
            status: PendingStatus::Pending,
            receipt: None,
            decided_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == PendingStatus::Pending
    }
}
