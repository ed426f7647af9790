//! Loopback call demo.
//!
//! Runs a host and a guest controller against the in-process signaling
//! service, starts a conversation, then leaves from both sides.
//!
//! ```bash
//! RUST_LOG=p2p=debug cargo run -p p2p-test-utils --bin loopback-call -- room-42
//! ```

use anyhow::{bail, Context, Result};
use common::config::ObservabilityConfig;
use p2p_session::observability::init_tracing;
use p2p_session::{Role, SessionConfig};
use p2p_test_utils::{LoopbackSignaling, TestParticipant};
use std::collections::HashMap;
use std::env;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let vars: HashMap<String, String> = env::vars().collect();
    init_tracing(&ObservabilityConfig::from_vars(&vars))
        .map_err(anyhow::Error::msg)
        .context("failed to initialize tracing")?;

    let room = env::args().nth(1).unwrap_or_else(|| "room-42".to_string());
    let signaling = LoopbackSignaling::new();

    let mut host_config = SessionConfig::new(Role::Host);
    let mut guest_config = SessionConfig::new(Role::Guest);
    if let Ok(config) = SessionConfig::from_vars(&vars) {
        host_config.operation_timeout = config.operation_timeout;
        guest_config.operation_timeout = config.operation_timeout;
    }

    let host = TestParticipant::spawn_with_config(host_config, &signaling);
    let guest = TestParticipant::spawn_with_config(guest_config, &signaling);

    host.join(&room).await.context("host join")?;
    guest.join(&room).await.context("guest join")?;
    host.wait_for(|s| s.remote_member_joined).await;
    info!(target: "p2p.demo", room = %room, "Both participants joined");

    host.handle
        .start_conversation()
        .await
        .context("start conversation")?;
    let guest_status = guest.wait_for(|s| s.in_conversation).await;
    let host_status = host.handle.status().await?;
    if !host_status.in_conversation {
        bail!("host did not enter the conversation");
    }

    info!(
        target: "p2p.demo",
        host = %status_line(&host_status),
        guest = %status_line(&guest_status),
        host_remote_tracks = host.attached_remote_tracks().len(),
        guest_remote_tracks = guest.attached_remote_tracks().len(),
        "Conversation running"
    );

    guest.handle.leave_session().await.context("guest leave")?;
    host.wait_for(|s| !s.remote_member_joined).await;
    host.handle.leave_session().await.context("host leave")?;

    let leaked: Vec<String> = host
        .local_tracks()
        .into_iter()
        .chain(guest.local_tracks())
        .chain(host.received_tracks())
        .chain(guest.received_tracks())
        .filter(|track| !signaling.log().is_released(track))
        .collect();
    if !leaked.is_empty() {
        bail!("tracks not released: {leaked:?}");
    }

    info!(target: "p2p.demo", room = %room, "Both participants left");
    host.shutdown().await;
    guest.shutdown().await;
    Ok(())
}

fn status_line(status: &p2p_session::SessionStatus) -> String {
    format!(
        "{}/local={}/remote={}/conversation={}",
        status.phase.as_str(),
        status.local_member_joined,
        status.remote_member_joined,
        status.in_conversation
    )
}
