//! Shared harness for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use motd_engine::candidate::{CandidateId, ChannelId, UserId};
use motd_engine::config::FavoritesConfig;
use motd_engine::cycle::CycleManager;
use motd_engine::engine::{MotdEngine, MotdState, SharedState};
use motd_engine::events::{EventFilter, PlatformEvent};
use motd_engine::favorites::FavoriteTracker;
use motd_engine::platform::{PlatformError, PublishRequest, Publisher, ReactionControl};
use motd_engine::scoring::ScoringEngine;
use motd_engine::selector::WinnerSelector;
use motd_engine::store::SqliteCandidateStore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const CHANNEL: ChannelId = ChannelId::new(100);
pub const TARGET: ChannelId = ChannelId::new(200);
pub const BOT: UserId = UserId::new(1);
pub const STAR: &str = "⭐";

/// Platform action observed by the recorder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Published(PublishRequest),
    Removed {
        candidate: CandidateId,
        user: UserId,
        emoji: String,
    },
    Added {
        candidate: CandidateId,
        emoji: String,
    },
}

/// Records every platform action instead of performing it.
#[derive(Default)]
pub struct Recorder {
    actions: Mutex<Vec<Action>>,
}

impl Recorder {
    fn push(&self, action: Action) -> Result<(), PlatformError> {
        self.actions
            .lock()
            .map_err(|e| PlatformError::ReactionFailed(e.to_string()))?
            .push(action);
        Ok(())
    }

    pub fn actions(&self) -> Vec<Action> {
        self.actions.lock().map(|a| a.clone()).unwrap_or_default()
    }

    pub fn removals(&self) -> Vec<(CandidateId, UserId)> {
        self.actions()
            .into_iter()
            .filter_map(|action| match action {
                Action::Removed {
                    candidate, user, ..
                } => Some((candidate, user)),
                _ => None,
            })
            .collect()
    }

    pub fn published(&self) -> Vec<PublishRequest> {
        self.actions()
            .into_iter()
            .filter_map(|action| match action {
                Action::Published(request) => Some(request),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Publisher for Recorder {
    async fn publish(&self, request: PublishRequest) -> Result<(), PlatformError> {
        self.push(Action::Published(request))
    }
}

#[async_trait]
impl ReactionControl for Recorder {
    async fn remove_reaction(
        &self,
        candidate: CandidateId,
        _channel: ChannelId,
        user: UserId,
        emoji: &str,
    ) -> Result<(), PlatformError> {
        self.push(Action::Removed {
            candidate,
            user,
            emoji: emoji.to_string(),
        })
    }

    async fn add_reaction(
        &self,
        candidate: CandidateId,
        _channel: ChannelId,
        emoji: &str,
    ) -> Result<(), PlatformError> {
        self.push(Action::Added {
            candidate,
            emoji: emoji.to_string(),
        })
    }
}

/// An engine, a cycle manager and the recorder they both talk to.
pub struct Harness {
    pub dir: TempDir,
    pub state: SharedState,
    pub engine: MotdEngine,
    pub cycles: Arc<CycleManager>,
    pub recorder: Arc<Recorder>,
}

impl Harness {
    pub fn new(weights: &[(&str, i64)], seed: u64) -> Result<Self, Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        let store = SqliteCandidateStore::new(dir.path().join("motd.db"), dir.path().join("candidates"))?;
        let weights: HashMap<String, i64> = weights.iter().map(|(e, w)| ((*e).to_string(), *w)).collect();
        let state = MotdState::new(
            Box::new(store),
            ScoringEngine::new(weights),
            FavoriteTracker::new(FavoritesConfig::default()),
        )
        .shared();

        let recorder = Arc::new(Recorder::default());
        let engine = MotdEngine::new(
            state.clone(),
            recorder.clone(),
            EventFilter::new(true, CHANNEL, Some(BOT)),
            STAR,
        );
        let cycles = Arc::new(CycleManager::new(
            state.clone(),
            WinnerSelector::seeded(seed),
            recorder.clone(),
            TARGET,
            dir.path().join("outbox"),
        ));

        Ok(Self {
            dir,
            state,
            engine,
            cycles,
            recorder,
        })
    }

    pub async fn score(&self, id: u64) -> Result<i64, Box<dyn std::error::Error>> {
        Ok(self.state.lock().await.store.get(CandidateId::new(id))?.score)
    }
}

pub fn created(id: u64, author: u64, content: &str) -> PlatformEvent {
    PlatformEvent::CandidateCreated {
        id: CandidateId::new(id),
        channel: CHANNEL,
        author: UserId::new(author),
        content: content.to_string(),
        attachments: Vec::new(),
    }
}

pub fn react(id: u64, voter: u64, emoji: &str) -> PlatformEvent {
    PlatformEvent::ReactionAdded {
        id: CandidateId::new(id),
        channel: CHANNEL,
        voter: UserId::new(voter),
        emoji: emoji.to_string(),
    }
}

pub fn unreact(id: u64, voter: u64, emoji: &str) -> PlatformEvent {
    PlatformEvent::ReactionRemoved {
        id: CandidateId::new(id),
        channel: CHANNEL,
        voter: UserId::new(voter),
        emoji: emoji.to_string(),
    }
}
