//! Platform events the engine reacts to.
//!
//! Events arrive in platform order. Only activity in the candidate channel
//! from accounts other than our own is relevant; [`EventFilter`] drops the
//! rest before it reaches the engine.

use crate::candidate::{AttachmentBlob, CandidateId, ChannelId, UserId};
use crate::config::MotdSettings;
use serde::{Deserialize, Serialize};

/// Something that happened on the chat platform.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlatformEvent {
    /// A new post appeared.
    CandidateCreated {
        id: CandidateId,
        channel: ChannelId,
        author: UserId,
        #[serde(default)]
        content: String,
        #[serde(default)]
        attachments: Vec<AttachmentBlob>,
    },

    /// A post was edited. `content` is absent when only embeds changed.
    CandidateEdited {
        id: CandidateId,
        channel: ChannelId,
        #[serde(default)]
        author: Option<UserId>,
        #[serde(default)]
        content: Option<String>,
    },

    /// A post was deleted.
    CandidateDeleted { id: CandidateId, channel: ChannelId },

    /// A member reacted to a post.
    ReactionAdded {
        id: CandidateId,
        channel: ChannelId,
        voter: UserId,
        emoji: String,
    },

    /// A member's reaction disappeared from a post.
    ReactionRemoved {
        id: CandidateId,
        channel: ChannelId,
        voter: UserId,
        emoji: String,
    },
}

impl PlatformEvent {
    /// Channel the event happened in.
    #[must_use]
    pub fn channel(&self) -> ChannelId {
        match self {
            Self::CandidateCreated { channel, .. }
            | Self::CandidateEdited { channel, .. }
            | Self::CandidateDeleted { channel, .. }
            | Self::ReactionAdded { channel, .. }
            | Self::ReactionRemoved { channel, .. } => *channel,
        }
    }

    /// The post the event concerns.
    #[must_use]
    pub fn candidate(&self) -> CandidateId {
        match self {
            Self::CandidateCreated { id, .. }
            | Self::CandidateEdited { id, .. }
            | Self::CandidateDeleted { id, .. }
            | Self::ReactionAdded { id, .. }
            | Self::ReactionRemoved { id, .. } => *id,
        }
    }

    /// Member who caused the event, when the platform reports one.
    #[must_use]
    pub fn actor(&self) -> Option<UserId> {
        match self {
            Self::CandidateCreated { author, .. } => Some(*author),
            Self::CandidateEdited { author, .. } => *author,
            Self::CandidateDeleted { .. } => None,
            Self::ReactionAdded { voter, .. } | Self::ReactionRemoved { voter, .. } => Some(*voter),
        }
    }

    /// Short name for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CandidateCreated { .. } => "candidate_created",
            Self::CandidateEdited { .. } => "candidate_edited",
            Self::CandidateDeleted { .. } => "candidate_deleted",
            Self::ReactionAdded { .. } => "reaction_added",
            Self::ReactionRemoved { .. } => "reaction_removed",
        }
    }
}

/// Decides which platform events reach the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventFilter {
    enabled: bool,
    candidate_channel: ChannelId,
    bot_user: Option<UserId>,
}

impl EventFilter {
    /// Create a filter.
    #[must_use]
    pub const fn new(enabled: bool, candidate_channel: ChannelId, bot_user: Option<UserId>) -> Self {
        Self {
            enabled,
            candidate_channel,
            bot_user,
        }
    }

    /// Build the filter described by the selection settings.
    #[must_use]
    pub fn from_settings(settings: &MotdSettings) -> Self {
        Self::new(settings.enabled, settings.candidate_channel, settings.bot_user_id)
    }

    /// Whether the engine should process `event`.
    #[must_use]
    pub fn accepts(&self, event: &PlatformEvent) -> bool {
        if !self.enabled || event.channel() != self.candidate_channel {
            return false;
        }
        match (self.bot_user, event.actor()) {
            (Some(bot), Some(actor)) => bot != actor,
            _ => true,
        }
    }
}
