//! Connect to a live backend and log inbound events.

use anyhow::{Context, Result};
use veil_chat_client::{ChatClient, ClientConfig, WsTransport};
use veil_chat_types::UserId;

/// Run the watch command until Ctrl-C or until retries run out.
pub async fn run(config: ClientConfig, user: &str) -> Result<()> {
    let transport = WsTransport::new(&config.server.url);
    println!("Connecting to {} as {}...", transport.server_url(), user);

    let client = ChatClient::new(config, transport);
    client
        .session_restored(UserId::from(user))
        .await
        .context("Failed to connect")?;
    println!("Connected. Press Ctrl-C to stop.");

    let result = tokio::select! {
        result = client.run() => result.context("Connection lost"),
        _ = tokio::signal::ctrl_c() => {
            println!("Stopping...");
            Ok(())
        }
    };

    if let Some(snapshot) = client.snapshot().await {
        println!(
            "{} chats, {} unread",
            snapshot.chats.len(),
            snapshot.chats.iter().map(|c| c.unread_count).sum::<u32>()
        );
    }
    client.logged_out().await?;
    result
}
