//! # P2P Test Utilities
//!
//! Shared test utilities for the P2P session controller.
//!
//! This crate provides in-memory implementations of the external
//! collaborators so the controller can be exercised end to end without a
//! hosted signaling service, a camera or a screen.
//!
//! ## Modules
//!
//! - `loopback` - In-process signaling service shared by every participant
//! - `media` - Recording tracks, sinks and capture devices with a call log
//! - `fixtures` - Participant harness, credentials and wait helpers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use p2p_test_utils::*;
//! use p2p_session::Role;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let signaling = LoopbackSignaling::new();
//!     let host = TestParticipant::spawn(Role::Host, &signaling);
//!     let guest = TestParticipant::spawn(Role::Guest, &signaling);
//!
//!     host.join("room-42").await.unwrap();
//!     guest.join("room-42").await.unwrap();
//!     host.wait_for(|s| s.remote_member_joined).await;
//!     host.handle.start_conversation().await.unwrap();
//!     guest.wait_for(|s| s.in_conversation).await;
//! }
//! ```
//!
//! ## Failure Injection
//!
//! ```rust,ignore
//! signaling.fail(Operation::Subscribe, SignalingError::PermissionDenied("subscription".into()));
//! devices.set_failing(true);
//! ```

pub mod fixtures;
pub mod loopback;
pub mod media;

// Re-export commonly used items
pub use fixtures::*;
pub use loopback::*;
pub use media::*;
