//! The JSON-lines pipeline as the binary wires it: reader, serial server,
//! writer.

use motd_engine::admin::AdminConsole;
use motd_engine::candidate::ChannelId;
use motd_engine::config::MotdConfig;
use motd_engine::cycle::CycleManager;
use motd_engine::engine::{MotdEngine, MotdState};
use motd_engine::events::EventFilter;
use motd_engine::favorites::FavoriteTracker;
use motd_engine::oplog::OperatorLog;
use motd_engine::scoring::ScoringEngine;
use motd_engine::selector::WinnerSelector;
use motd_engine::store::SqliteCandidateStore;
use motd_engine::wire::{self, JsonLinesSink};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::{mpsc, watch};
use tracing_subscriber::layer::SubscriberExt;

const CONFIG: &str = r#"
[motd]
candidate_channel = 100
target_channel = 200
bot_user_id = 1

[motd.reactions]
"👍" = 1
"#;

const LOGS: u64 = 900;

async fn run_pipeline(input: &str, logs: Option<ChannelId>) -> Result<Vec<Value>, Box<dyn std::error::Error>> {
    let config = MotdConfig::parse(CONFIG)?;
    let dir = TempDir::new()?;
    let store = SqliteCandidateStore::in_memory(dir.path().join("candidates"))?;
    let state = MotdState::new(
        Box::new(store),
        ScoringEngine::new(config.motd.reactions.clone()),
        FavoriteTracker::new(config.favorites),
    )
    .shared();

    let (sink, outbound_rx) = JsonLinesSink::channel(64);
    let _log_guard = logs.map(|channel| {
        tracing::subscriber::set_default(tracing_subscriber::registry().with(OperatorLog::new(&sink, channel)))
    });
    let engine = MotdEngine::new(
        state.clone(),
        Arc::new(sink.clone()),
        EventFilter::from_settings(&config.motd),
        &config.motd.favorite_emoji,
    );
    let cycles = Arc::new(CycleManager::new(
        state.clone(),
        WinnerSelector::seeded(5),
        Arc::new(sink.clone()),
        config.motd.target_channel,
        dir.path().join("outbox"),
    ));
    let console = Arc::new(AdminConsole::new(state, cycles, config.admin.confirm_ttl()));

    let (inbound_tx, inbound_rx) = mpsc::channel(64);
    let (_stop, stopped) = watch::channel(false);

    wire::read_lines(tokio::io::BufReader::new(input.as_bytes()), inbound_tx, stopped).await?;
    wire::serve(inbound_rx, engine, console, sink).await;

    let mut out = Vec::new();
    wire::write_lines(outbound_rx, &mut out).await?;
    let lines = String::from_utf8(out)?
        .lines()
        .map(serde_json::from_str::<Value>)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(lines)
}

#[tokio::test]
async fn test_events_admin_and_publish_flow() -> Result<(), Box<dyn std::error::Error>> {
    let input = [
        r#"{"kind":"event","event":{"type":"candidate_created","id":10,"channel":100,"author":2,"content":"hello"}}"#,
        r#"{"kind":"event","event":{"type":"candidate_created","id":11,"channel":999,"author":2,"content":"elsewhere"}}"#,
        r#"{"kind":"event","event":{"type":"reaction_added","id":10,"channel":100,"voter":3,"emoji":"👍"}}"#,
        r#"{"kind":"event","event":{"type":"reaction_added","id":10,"channel":100,"voter":2,"emoji":"⭐"}}"#,
        r#"{"kind":"admin","command":{"type":"list"}}"#,
        r#"{"kind":"admin","command":{"type":"run_cycle"}}"#,
    ]
    .join("\n");

    let lines = run_pipeline(&input, None).await?;
    let kinds: Vec<&str> = lines.iter().filter_map(|l| l["kind"].as_str()).collect();
    assert_eq!(
        kinds,
        vec![
            "add_reaction",
            "add_reaction",
            "remove_reaction",
            "admin_reply",
            "publish",
            "admin_reply",
        ]
    );

    // Seeding: tracked emoji first, then the favorite.
    assert_eq!(lines[0]["emoji"], "👍");
    assert_eq!(lines[1]["emoji"], "⭐");

    // The author's own favorite is taken back.
    assert_eq!(lines[2]["candidate"], 10);
    assert_eq!(lines[2]["user"], 2);

    let listing = &lines[3]["reply"];
    assert_eq!(listing["type"], "candidates");
    assert_eq!(listing["candidates"].as_array().map(Vec::len), Some(1));
    assert_eq!(listing["candidates"][0]["score"], 1);

    assert_eq!(lines[4]["author"], 2);
    assert_eq!(lines[4]["channel"], ChannelId::new(200).get());
    assert_eq!(lines[4]["content"], "hello\n> Score: 1");

    let report = &lines[5]["reply"]["report"];
    assert_eq!(report["outcome"], "completed");
    assert_eq!(report["winner"], 10);
    assert_eq!(report["cleared"], 1);
    Ok(())
}

#[tokio::test]
async fn test_empty_cycle_over_the_wire() -> Result<(), Box<dyn std::error::Error>> {
    let lines = run_pipeline(r#"{"kind":"admin","command":{"type":"run_cycle"}}"#, None).await?;
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["reply"]["type"], "cycle");
    assert_eq!(lines[0]["reply"]["report"]["outcome"], "no_candidates");
    Ok(())
}

#[tokio::test]
async fn test_warnings_reach_the_log_channel() -> Result<(), Box<dyn std::error::Error>> {
    let input = [
        r#"{"kind":"event","event":{"type":"reaction_added","id":42,"channel":100,"voter":3,"emoji":"👍"}}"#,
        r#"{"kind":"admin","command":{"type":"list"}}"#,
    ]
    .join("\n");

    let lines = run_pipeline(&input, Some(ChannelId::new(LOGS))).await?;
    let kinds: Vec<&str> = lines.iter().filter_map(|l| l["kind"].as_str()).collect();
    assert_eq!(kinds, vec!["log", "admin_reply"]);

    assert_eq!(lines[0]["channel"], LOGS);
    assert_eq!(lines[0]["level"], "warn");
    assert_eq!(lines[0]["message"], "Candidate 42 not found; event ignored");
    Ok(())
}
