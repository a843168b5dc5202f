//! Replay a recorded inbound event log against the engine.
//!
//! The chat list stands in for the REST fetch, the event log for the
//! socket. Frames go through a mock transport so the engine sees them
//! exactly as it would from the backend.

use anyhow::{Context, Result};
use std::path::Path;
use veil_chat_client::{ChatClient, ClientConfig, ClientError, MockTransport};
use veil_chat_core::{MirrorSnapshot, RouteOutcome};
use veil_chat_types::{Chat, ChatId, UserId};

/// What happened to the replayed frames.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Messages appended
    pub appended: usize,
    /// Optimistic sends confirmed
    pub confirmed: usize,
    /// Redelivered messages skipped
    pub duplicates: usize,
    /// Events that did not apply to the mirror
    pub ignored: usize,
    /// Typing and presence updates
    pub updates: usize,
    /// Frames that failed to decode
    pub rejected: usize,
}

impl ReplaySummary {
    fn record(&mut self, outcome: &RouteOutcome) {
        match outcome {
            RouteOutcome::Appended => self.appended += 1,
            RouteOutcome::Confirmed => self.confirmed += 1,
            RouteOutcome::Duplicate => self.duplicates += 1,
            RouteOutcome::Ignored => self.ignored += 1,
            RouteOutcome::Typing(_) | RouteOutcome::Presence(_) => self.updates += 1,
        }
    }
}

/// Run the replay command and print the resulting mirror as JSON.
pub async fn run(
    config: ClientConfig,
    user: &str,
    chats: &Path,
    events: &Path,
    active: Option<&str>,
) -> Result<()> {
    let (snapshot, summary) = replay(config, user, chats, events, active).await?;

    tracing::info!(
        "Replayed: {} appended, {} confirmed, {} duplicates, {} ignored, {} updates, {} rejected",
        summary.appended,
        summary.confirmed,
        summary.duplicates,
        summary.ignored,
        summary.updates,
        summary.rejected
    );
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

/// Feed the event log through a signed-in engine.
pub async fn replay(
    config: ClientConfig,
    user: &str,
    chats: &Path,
    events: &Path,
    active: Option<&str>,
) -> Result<(MirrorSnapshot, ReplaySummary)> {
    let chats = load_chats(chats).await?;
    let log = tokio::fs::read_to_string(events)
        .await
        .with_context(|| format!("Failed to read event log {}", events.display()))?;

    let active = match active {
        Some(id) => {
            let id = ChatId::from(id);
            let chat = chats
                .iter()
                .find(|c| c.id == id)
                .cloned()
                .with_context(|| format!("Active chat {} is not in the chat list", id))?;
            Some(chat)
        }
        None => None,
    };

    let transport = MockTransport::new();
    let client = ChatClient::new(config, transport.clone());
    client.login_succeeded(UserId::from(user)).await?;
    client.set_chats(chats).await?;
    client.set_active_chat(active).await?;

    let mut summary = ReplaySummary::default();
    for (index, line) in log.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        transport.queue_frame(line.as_bytes().to_vec());
        match client.poll_once().await {
            Ok(outcome) => summary.record(&outcome),
            Err(ClientError::Wire(e)) => {
                tracing::warn!("Line {}: {}", index + 1, e);
                summary.rejected += 1;
            }
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("Replay stopped at line {}", index + 1)))
            }
        }
    }

    let snapshot = client
        .snapshot()
        .await
        .context("Session ended during replay")?;
    client.logged_out().await?;
    Ok((snapshot, summary))
}

async fn load_chats(path: &Path) -> Result<Vec<Chat>> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read chat list {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Invalid chat list {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const CHATS: &str = r#"[
        {"id": "c1", "participantId": "ada", "participantName": "Ada", "participantUsername": "ada"},
        {"id": "c2", "participantId": "bob", "participantName": "Bob", "participantUsername": "bob"}
    ]"#;

    fn message(chat: &str, id: &str) -> String {
        format!(
            r#"{{"event":"message:receive","data":{{"chatId":"{}","message":{{"id":"{}","senderId":"ada","receiverId":"me","content":"x","timestamp":1}}}}}}"#,
            chat, id
        )
    }

    async fn replay_lines(lines: &[String], active: Option<&str>) -> (MirrorSnapshot, ReplaySummary) {
        let dir = tempdir().unwrap();
        let chats = dir.path().join("chats.json");
        let events = dir.path().join("events.jsonl");
        std::fs::write(&chats, CHATS).unwrap();
        std::fs::write(&events, lines.join("\n")).unwrap();

        replay(ClientConfig::default(), "me", &chats, &events, active)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn replays_messages_and_presence() {
        let lines = vec![
            message("c1", "m1"),
            message("c1", "m1"),
            message("ghost", "m2"),
            r#"{"event":"user:online","data":{"userId":"ada"}}"#.to_string(),
            String::new(),
            "not json".to_string(),
        ];

        let (snapshot, summary) = replay_lines(&lines, None).await;

        assert_eq!(
            summary,
            ReplaySummary {
                appended: 1,
                duplicates: 1,
                ignored: 1,
                updates: 1,
                rejected: 1,
                ..ReplaySummary::default()
            }
        );
        assert_eq!(snapshot.chats[0].messages.len(), 1);
        assert_eq!(snapshot.chats[0].unread_count, 1);
        assert!(snapshot.chats[0].is_online);
    }

    #[tokio::test]
    async fn active_chat_does_not_count_unread() {
        let (snapshot, summary) = replay_lines(&[message("c2", "m1")], Some("c2")).await;

        assert_eq!(summary.appended, 1);
        assert_eq!(snapshot.chats[1].unread_count, 0);
        assert_eq!(snapshot.active_chat.map(|c| c.id), Some(ChatId::from("c2")));
    }

    #[tokio::test]
    async fn unknown_active_chat_is_an_error() {
        let dir = tempdir().unwrap();
        let chats = dir.path().join("chats.json");
        let events = dir.path().join("events.jsonl");
        std::fs::write(&chats, CHATS).unwrap();
        std::fs::write(&events, "").unwrap();

        let result = replay(ClientConfig::default(), "me", &chats, &events, Some("c9")).await;

        assert!(result.is_err());
    }
}
