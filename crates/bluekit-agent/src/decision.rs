//! Bounded rendezvous between blocking agent calls and a decision source.
//!
//! Each pairing question becomes one [`DecisionRequest`] with a
//! single-use reply slot. The asking side waits on the slot up to a
//! deadline, racing a cancellation signal; whichever resolution happens
//! first wins and the other paths become no-ops. A decision source that
//! never answers is indistinguishable from a timeout.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

use bluekit_device::Address;

/// What a pairing question is asking for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionKind {
    /// Legacy PIN entry.
    PinCode,
    /// Numeric passkey entry.
    Passkey,
    /// Confirm that the displayed passkey matches the remote device.
    Confirm { passkey: u32 },
    /// Authorize use of a service, identified by UUID.
    AuthorizeService { service: String },
    /// Authorize an incoming pairing with no further context.
    AuthorizePairing,
}

/// An answer produced by the decision source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Reject,
    PinCode(String),
    Passkey(u32),
}

/// Informational display events; no answer is expected.
#[derive(Debug, Clone)]
pub enum DisplayEvent {
    /// Show this PIN so the user can type it on the remote device.
    PinCode { device: Address, pincode: String },
    /// Show this passkey so the user can type it on the remote device.
    Passkey { device: Address, passkey: u32 },
}

/// One in-flight pairing question.
///
/// The reply slot is written at most once: [`respond`](Self::respond)
/// consumes the request, and a response sent after the asker has given
/// up is silently discarded.
#[derive(Debug)]
pub struct DecisionRequest {
    device: Address,
    kind: DecisionKind,
    reply: oneshot::Sender<Decision>,
}

impl DecisionRequest {
    /// The device this question concerns.
    pub fn device(&self) -> &Address {
        &self.device
    }

    /// What is being asked.
    pub fn kind(&self) -> &DecisionKind {
        &self.kind
    }

    /// Answer the question. A no-op if the asker already timed out or
    /// was canceled.
    pub fn respond(self, decision: Decision) {
        if self.reply.send(decision).is_err() {
            debug!("Decision for {} arrived after resolution", self.device);
        }
    }
}

/// What the decision source receives.
#[derive(Debug)]
pub enum AgentRequest {
    /// A question that must be answered via [`DecisionRequest::respond`].
    Question(DecisionRequest),
    /// Fire-and-forget display event.
    Display(DisplayEvent),
}

/// How one ask resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AskOutcome {
    /// The decision source answered in time.
    Answered(Decision),
    /// Deadline elapsed, the source went away, or it dropped the request.
    Unanswered,
    /// The daemon canceled the pairing while the ask was pending.
    Canceled,
}

/// Asking half of the rendezvous, held by the agent bridge.
#[derive(Clone)]
pub struct DecisionChannel {
    requests: mpsc::Sender<AgentRequest>,
    cancel: Arc<watch::Sender<u64>>,
}

/// Create a channel pair: the [`DecisionChannel`] for the bridge and the
/// receiver the decision source consumes.
pub fn decision_channel(capacity: usize) -> (DecisionChannel, mpsc::Receiver<AgentRequest>) {
    let (requests, rx) = mpsc::channel(capacity);
    let (cancel, _) = watch::channel(0);
    (
        DecisionChannel {
            requests,
            cancel: Arc::new(cancel),
        },
        rx,
    )
}

impl DecisionChannel {
    /// Ask one question and wait for the answer, racing the deadline and
    /// any cancellation issued while the ask is pending.
    pub async fn ask(&self, device: Address, kind: DecisionKind, deadline: Duration) -> AskOutcome {
        let (reply, slot) = oneshot::channel();
        let request = DecisionRequest {
            device,
            kind,
            reply,
        };

        // Subscribe before parking so only cancellations issued from now
        // on resolve this ask.
        let mut canceled = self.cancel.subscribe();

        if self
            .requests
            .send(AgentRequest::Question(request))
            .await
            .is_err()
        {
            debug!("Decision source is gone; treating ask as unanswered");
            return AskOutcome::Unanswered;
        }

        tokio::select! {
            answer = slot => match answer {
                Ok(decision) => AskOutcome::Answered(decision),
                Err(_) => AskOutcome::Unanswered,
            },
            _ = canceled.changed() => AskOutcome::Canceled,
            _ = tokio::time::sleep(deadline) => AskOutcome::Unanswered,
        }
    }

    /// Push a display event without waiting for the source to consume it.
    pub fn notify(&self, event: DisplayEvent) {
        if self.requests.try_send(AgentRequest::Display(event)).is_err() {
            debug!("Decision source not draining display events");
        }
    }

    /// Resolve every pending ask as canceled. Asks issued afterwards are
    /// unaffected; calling with nothing pending is a no-op.
    pub fn cancel_pending(&self) {
        self.cancel.send_modify(|generation| *generation += 1);
    }
}
