//! # bluekit-agent
//!
//! Pairing agent bridge for BlueZ.
//!
//! BlueZ issues synchronous, timeout-bound agent callbacks (PIN entry,
//! passkey confirmation, service authorization) into the registered
//! pairing agent, while the answer can only come from a slow, human-paced
//! decision source. This crate reconciles the two with a bounded
//! rendezvous: each callback becomes one [`DecisionRequest`] with a
//! single-use reply slot, awaited up to a deadline and racing
//! cancellation. Secrets fall back to a safe default on timeout; consent
//! questions fail with a protocol-level rejection, so trust is never
//! granted by silence.

#![cfg(target_os = "linux")]

pub mod bridge;
pub mod decision;
pub mod error;

// Re-exports for convenience
pub use bridge::{register, AgentConfig, PairingBridge};
pub use decision::{
    decision_channel, AgentRequest, AskOutcome, Decision, DecisionChannel, DecisionKind,
    DecisionRequest, DisplayEvent,
};
pub use error::{Error, Result};
