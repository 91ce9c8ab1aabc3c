//! Pairing agent bridge.
//!
//! Registers with BlueZ as the default pairing agent and converts each
//! blocking agent callback into one decision-channel round trip. The
//! daemon's agent calls are timeout-bound and the daemon cannot tolerate
//! an indefinitely blocked callback, so every primitive resolves within
//! its deadline: secrets fall back to a safe default, consent questions
//! fail with a protocol-level rejection.

use std::sync::Arc;
use std::time::Duration;

use bluer::agent::{
    Agent, AgentHandle, AuthorizeService, DisplayPasskey, DisplayPinCode, ReqError, ReqResult,
    RequestAuthorization, RequestConfirmation, RequestPasskey, RequestPinCode,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use bluekit_device::Address;

use crate::decision::{AskOutcome, Decision, DecisionChannel, DecisionKind, DisplayEvent};
use crate::error::{Error, Result};

/// PIN returned when no answer arrives for a PIN request in time.
const DEFAULT_PIN: &str = "0000";

/// Passkey returned when no answer arrives for a passkey request in time.
const DEFAULT_PASSKEY: u32 = 0;

/// Deadlines for the two categories of agent question.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Milliseconds to wait for a secret (PIN or passkey) before falling
    /// back to the safe default.
    pub secret_deadline_ms: u64,
    /// Milliseconds to wait for a confirmation or authorization before
    /// rejecting.
    pub consent_deadline_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            secret_deadline_ms: 30_000,
            consent_deadline_ms: 30_000,
        }
    }
}

impl AgentConfig {
    fn secret_deadline(&self) -> Duration {
        Duration::from_millis(self.secret_deadline_ms)
    }

    fn consent_deadline(&self) -> Duration {
        Duration::from_millis(self.consent_deadline_ms)
    }
}

/// Maps agent primitives onto decision-channel round trips.
///
/// One bridge serves all concurrent pairing requests; each request gets
/// its own reply slot, so questions about different devices never share
/// state.
pub struct PairingBridge {
    channel: DecisionChannel,
    config: AgentConfig,
}

impl PairingBridge {
    /// Create a bridge that asks questions over the given channel.
    pub fn new(channel: DecisionChannel, config: AgentConfig) -> Self {
        Self { channel, config }
    }

    /// Handle a PIN request. Timeout yields the safe default; an explicit
    /// rejection fails the call.
    pub async fn request_pin_code(&self, device: Address) -> ReqResult<String> {
        info!("PIN requested for {}", device);
        let outcome = self
            .channel
            .ask(device.clone(), DecisionKind::PinCode, self.config.secret_deadline())
            .await;
        match outcome {
            AskOutcome::Answered(Decision::PinCode(pin)) => Ok(pin),
            AskOutcome::Answered(Decision::Reject) => Err(ReqError::Rejected),
            AskOutcome::Answered(other) => {
                warn!("Unusable answer {:?} for PIN request from {}", other, device);
                Err(ReqError::Rejected)
            }
            AskOutcome::Canceled => Err(ReqError::Canceled),
            AskOutcome::Unanswered => {
                info!("No PIN for {} in time, using fallback", device);
                Ok(DEFAULT_PIN.to_string())
            }
        }
    }

    /// Handle a passkey request. Same fallback contract as PIN requests.
    pub async fn request_passkey(&self, device: Address) -> ReqResult<u32> {
        info!("Passkey requested for {}", device);
        let outcome = self
            .channel
            .ask(device.clone(), DecisionKind::Passkey, self.config.secret_deadline())
            .await;
        match outcome {
            AskOutcome::Answered(Decision::Passkey(passkey)) => Ok(passkey),
            AskOutcome::Answered(Decision::Reject) => Err(ReqError::Rejected),
            AskOutcome::Answered(other) => {
                warn!("Unusable answer {:?} for passkey request from {}", other, device);
                Err(ReqError::Rejected)
            }
            AskOutcome::Canceled => Err(ReqError::Canceled),
            AskOutcome::Unanswered => {
                info!("No passkey for {} in time, using fallback", device);
                Ok(DEFAULT_PASSKEY)
            }
        }
    }

    /// Handle a passkey confirmation. Anything but an accept in time is a
    /// rejection.
    pub async fn request_confirmation(&self, device: Address, passkey: u32) -> ReqResult<()> {
        info!("Confirmation requested for {} (passkey {:06})", device, passkey);
        let outcome = self
            .channel
            .ask(
                device,
                DecisionKind::Confirm { passkey },
                self.config.consent_deadline(),
            )
            .await;
        consent_verdict(outcome)
    }

    /// Handle a service authorization. Same consent contract as
    /// confirmation; connection teardown on rejection is handled at
    /// registration (see [`register`]).
    pub async fn authorize_service(&self, device: Address, service: &str) -> ReqResult<()> {
        info!("Authorization requested for {} (service {})", device, service);
        let outcome = self
            .channel
            .ask(
                device,
                DecisionKind::AuthorizeService {
                    service: service.to_string(),
                },
                self.config.consent_deadline(),
            )
            .await;
        consent_verdict(outcome)
    }

    /// Handle an incoming-pairing authorization.
    pub async fn request_authorization(&self, device: Address) -> ReqResult<()> {
        info!("Pairing authorization requested for {}", device);
        let outcome = self
            .channel
            .ask(
                device,
                DecisionKind::AuthorizePairing,
                self.config.consent_deadline(),
            )
            .await;
        consent_verdict(outcome)
    }

    /// Forward a PIN display. Fire-and-forget.
    pub fn display_pin_code(&self, device: Address, pincode: String) {
        info!("Display PIN for {}: {}", device, pincode);
        self.channel.notify(DisplayEvent::PinCode { device, pincode });
    }

    /// Forward a passkey display. Fire-and-forget.
    pub fn display_passkey(&self, device: Address, passkey: u32) {
        info!("Display passkey for {}: {:06}", device, passkey);
        self.channel.notify(DisplayEvent::Passkey { device, passkey });
    }

    /// Resolve every outstanding question as canceled and release the
    /// waiters. A cancel with nothing pending is a no-op.
    pub fn cancel(&self) {
        info!("Pairing canceled by the daemon");
        self.channel.cancel_pending();
    }
}

/// Consent questions (confirmation/authorization) fail unless accepted in
/// time; trust is never granted by silence.
fn consent_verdict(outcome: AskOutcome) -> ReqResult<()> {
    match outcome {
        AskOutcome::Answered(Decision::Accept) => Ok(()),
        AskOutcome::Answered(_) => Err(ReqError::Rejected),
        AskOutcome::Canceled => Err(ReqError::Canceled),
        AskOutcome::Unanswered => Err(ReqError::Rejected),
    }
}

/// Register the bridge with BlueZ as the default pairing agent.
///
/// The returned handle must be kept alive for the agent to stay
/// registered. When the daemon cancels an individual request it drops the
/// pending callback future; the abandoned reply slot then makes any late
/// decision a no-op. A rejected service authorization additionally
/// disconnects the device: rejecting a service means the peer is no
/// longer welcome, not just that one service is off limits.
pub async fn register(
    session: &bluer::Session,
    adapter: bluer::Adapter,
    bridge: Arc<PairingBridge>,
) -> Result<AgentHandle> {
    let pin_bridge = bridge.clone();
    let passkey_bridge = bridge.clone();
    let confirm_bridge = bridge.clone();
    let authorize_bridge = bridge.clone();
    let pairing_bridge = bridge.clone();
    let display_pin_bridge = bridge.clone();
    let display_passkey_bridge = bridge;

    let agent = Agent {
        request_default: true,

        request_pin_code: Some(Box::new(move |req: RequestPinCode| {
            let bridge = pin_bridge.clone();
            Box::pin(async move { bridge.request_pin_code(Address::from(req.device)).await })
        })),

        request_passkey: Some(Box::new(move |req: RequestPasskey| {
            let bridge = passkey_bridge.clone();
            Box::pin(async move { bridge.request_passkey(Address::from(req.device)).await })
        })),

        request_confirmation: Some(Box::new(move |req: RequestConfirmation| {
            let bridge = confirm_bridge.clone();
            Box::pin(async move {
                bridge
                    .request_confirmation(Address::from(req.device), req.passkey)
                    .await
            })
        })),

        authorize_service: Some(Box::new(move |req: AuthorizeService| {
            let bridge = authorize_bridge.clone();
            let adapter = adapter.clone();
            Box::pin(async move {
                let device = Address::from(req.device);
                let verdict = bridge
                    .authorize_service(device.clone(), &req.service.to_string())
                    .await;
                if verdict.is_err() {
                    tokio::spawn(disconnect_rejected(adapter, req.device));
                }
                verdict
            })
        })),

        request_authorization: Some(Box::new(move |req: RequestAuthorization| {
            let bridge = pairing_bridge.clone();
            Box::pin(async move { bridge.request_authorization(Address::from(req.device)).await })
        })),

        display_pin_code: Some(Box::new(move |req: DisplayPinCode| {
            let bridge = display_pin_bridge.clone();
            Box::pin(async move {
                bridge.display_pin_code(Address::from(req.device), req.pincode);
                Ok(())
            })
        })),

        display_passkey: Some(Box::new(move |req: DisplayPasskey| {
            let bridge = display_passkey_bridge.clone();
            Box::pin(async move {
                bridge.display_passkey(Address::from(req.device), req.passkey);
                Ok(())
            })
        })),

        ..Default::default()
    };

    let handle = session
        .register_agent(agent)
        .await
        .map_err(|e| Error::Bus(format!("Failed to register agent: {}", e)))?;
    info!("Registered as default pairing agent");
    Ok(handle)
}

async fn disconnect_rejected(adapter: bluer::Adapter, device: bluer::Address) {
    match adapter.device(device) {
        Ok(dev) => {
            if let Err(e) = dev.disconnect().await {
                warn!("Failed to disconnect {} after rejected authorization: {}", device, e);
            } else {
                info!("Disconnected {} after rejected authorization", device);
            }
        }
        Err(e) => warn!("No device handle for {} during teardown: {}", device, e),
    }
}
