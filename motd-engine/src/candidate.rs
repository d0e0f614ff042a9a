//! Candidate records and the identifiers that key them.
//!
//! Every id on the chat platform is an opaque 64-bit snowflake. Each kind of
//! id gets its own newtype so a voter can never be passed where a candidate
//! is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! snowflake_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Wraps a raw platform id.
            #[must_use]
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// Returns the raw platform id.
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse().map(Self)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }
    };
}

snowflake_id!(
    /// Id of the source message a candidate was recorded from.
    CandidateId
);

snowflake_id!(
    /// Id of a community member (poster or voter).
    UserId
);

snowflake_id!(
    /// Id of a chat channel.
    ChannelId
);

/// A tracked post eligible to become the cycle's winner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRecord {
    /// Id of the source message.
    pub id: CandidateId,

    /// Member who posted the candidate. Never changes.
    pub author_id: UserId,

    /// Current text body; edits overwrite it.
    pub content: String,

    /// Stored attachment file names, in posting order.
    pub attachments: Vec<String>,

    /// Weighted reaction score plus favorite points.
    pub score: i64,
}

impl CandidateRecord {
    /// Create a fresh record with a zero score.
    #[must_use]
    pub fn new(
        id: CandidateId,
        author_id: UserId,
        content: impl Into<String>,
        attachments: Vec<String>,
    ) -> Self {
        Self {
            id,
            author_id,
            content: content.into(),
            attachments,
            score: 0,
        }
    }

    /// Check whether `user` posted this candidate.
    #[must_use]
    pub fn is_authored_by(&self, user: UserId) -> bool {
        self.author_id == user
    }
}

/// Raw attachment payload as delivered with a new post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentBlob {
    /// File name on the platform, used only for its extension.
    #[serde(default)]
    pub filename: String,

    /// File contents.
    #[serde(default)]
    pub bytes: Vec<u8>,
}

impl AttachmentBlob {
    /// Create a blob from a platform file name and its contents.
    #[must_use]
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }

    /// Local name for the attachment at `index`: the index, plus the
    /// original extension when there is one (`0`, `1.png`, ...).
    #[must_use]
    pub fn stored_name(&self, index: usize) -> String {
        let extension = std::path::Path::new(&self.filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()));

        match extension {
            Some(ext) => format!("{index}.{}", ext.to_ascii_lowercase()),
            None => index.to_string(),
        }
    }
}
