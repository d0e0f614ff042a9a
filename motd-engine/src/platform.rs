//! Collaborators on the chat platform side.
//!
//! The engine never speaks the platform protocol. It asks these traits to
//! act on its behalf: post content impersonating a member, and add or remove
//! reactions on candidate posts.

use crate::candidate::{CandidateId, ChannelId, UserId};
use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by platform collaborators.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// Posting the winner failed.
    #[error("Publish failed: {0}")]
    PublishFailed(String),

    /// Adding or removing a reaction failed.
    #[error("Reaction update failed: {0}")]
    ReactionFailed(String),

    /// The collaborator is gone (e.g. its output closed).
    #[error("Platform connection closed")]
    Closed,
}

/// Content to post so that it appears to come from `author`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishRequest {
    /// Member to impersonate.
    pub author: UserId,
    /// Message body.
    pub content: String,
    /// Files to attach, in order.
    pub attachments: Vec<PathBuf>,
    /// Channel to post in.
    pub channel: ChannelId,
}

/// Posts content impersonating a community member.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Post `request`.
    async fn publish(&self, request: PublishRequest) -> Result<(), PlatformError>;
}

/// Adds and removes reactions on candidate posts.
#[async_trait]
pub trait ReactionControl: Send + Sync {
    /// Remove `user`'s `emoji` reaction from a candidate.
    async fn remove_reaction(
        &self,
        candidate: CandidateId,
        channel: ChannelId,
        user: UserId,
        emoji: &str,
    ) -> Result<(), PlatformError>;

    /// Add our own `emoji` reaction to a candidate so members can click it.
    async fn add_reaction(
        &self,
        candidate: CandidateId,
        channel: ChannelId,
        emoji: &str,
    ) -> Result<(), PlatformError>;
}
