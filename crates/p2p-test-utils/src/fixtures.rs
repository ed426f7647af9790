//! Participant harness and small helpers.

use crate::loopback::LoopbackSignaling;
use crate::media::{CallLog, FakeMediaDevices, RecordingSink};
use common::credential::{Capability, CredentialConfig, CredentialIssuer};
use common::secret::SecretString;
use p2p_session::{
    Role, SessionActor, SessionActorHandle, SessionCollaborators, SessionConfig, SessionError,
    SessionStatus,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Upper bound for every wait in the helpers below.
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

const TEST_APP_ID: &str = "p2p-test-app";
const TEST_SECRET_KEY: &str = "p2p-test-secret-key-do-not-use";

/// Credential issuer with a fixed test key.
#[must_use]
pub fn test_issuer() -> CredentialIssuer {
    CredentialIssuer::new(CredentialConfig {
        app_id: TEST_APP_ID.to_string(),
        secret_key: SecretString::from(TEST_SECRET_KEY),
        validity: Duration::from_secs(3600),
    })
    .expect("test issuer")
}

/// Valid credential for `role`.
#[must_use]
pub fn test_credential(role: Role) -> SecretString {
    let capability = match role {
        Role::Host => Capability::Host,
        Role::Guest => Capability::Attendee,
    };
    test_issuer().mint(capability).expect("mint test credential")
}

/// Poll `condition` until it holds.
///
/// # Panics
///
/// Panics after [`WAIT_TIMEOUT`].
pub async fn eventually(what: &str, mut condition: impl FnMut() -> bool) {
    let wait = async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    if tokio::time::timeout(WAIT_TIMEOUT, wait).await.is_err() {
        panic!("timed out waiting for {what}");
    }
}

/// One controller wired to the loopback service and recording media.
///
/// All participants of one [`LoopbackSignaling`] share its call log; track
/// and sink ids are unique, so per-participant assertions stay exact.
pub struct TestParticipant {
    pub handle: SessionActorHandle,
    pub task: JoinHandle<()>,
    pub signaling: LoopbackSignaling,
    pub log: CallLog,
    pub devices: Arc<FakeMediaDevices>,
    pub local_sink: Arc<RecordingSink>,
    pub remote_sink: Arc<RecordingSink>,
}

impl TestParticipant {
    /// Spawn a controller for `role` with default configuration.
    #[must_use]
    pub fn spawn(role: Role, signaling: &LoopbackSignaling) -> Self {
        Self::spawn_with_config(SessionConfig::new(role), signaling)
    }

    #[must_use]
    pub fn spawn_with_config(config: SessionConfig, signaling: &LoopbackSignaling) -> Self {
        let log = signaling.log();
        let name = config.role.as_str();
        let devices = FakeMediaDevices::new(log.clone());
        let local_sink = RecordingSink::new(format!("{name}-local-video"), log.clone());
        let remote_sink = RecordingSink::new(format!("{name}-remote-video"), log.clone());

        let collaborators = SessionCollaborators {
            signaling: Arc::new(signaling.clone()),
            media: devices.clone(),
            local_sink: local_sink.clone(),
            remote_sink: remote_sink.clone(),
        };
        let (handle, task) = SessionActor::spawn(config, collaborators, CancellationToken::new());

        Self {
            handle,
            task,
            signaling: signaling.clone(),
            log,
            devices,
            local_sink,
            remote_sink,
        }
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.handle.role()
    }

    /// Join `room` with a freshly minted credential.
    pub async fn join(&self, room: &str) -> Result<(), SessionError> {
        self.handle
            .join_session(room, test_credential(self.role()))
            .await
    }

    /// Wait until the published status satisfies `predicate`.
    ///
    /// # Panics
    ///
    /// Panics after [`WAIT_TIMEOUT`] or if the actor stops.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&SessionStatus) -> bool,
    ) -> SessionStatus {
        let mut status = self.handle.watch_status();
        let result = tokio::time::timeout(WAIT_TIMEOUT, status.wait_for(predicate))
            .await
            .expect("timed out waiting for session status");
        let status = *result.expect("session actor stopped");
        status
    }

    /// Reception tracks the service handed to this participant.
    #[must_use]
    pub fn received_tracks(&self) -> Vec<String> {
        self.signaling
            .subscriptions_of(self.role().as_str())
            .into_iter()
            .map(|record| record.track_id)
            .collect()
    }

    /// Reception tracks currently bound to this participant's remote sink.
    #[must_use]
    pub fn attached_remote_tracks(&self) -> Vec<String> {
        self.received_tracks()
            .into_iter()
            .filter(|track| self.log.is_attached(track))
            .collect()
    }

    /// Local capture tracks handed out so far.
    #[must_use]
    pub fn local_tracks(&self) -> Vec<String> {
        self.devices.captured_ids()
    }

    /// Cancel the actor and wait for it to finish.
    pub async fn shutdown(self) {
        self.handle.cancel();
        self.task.await.expect("session actor task");
    }
}
