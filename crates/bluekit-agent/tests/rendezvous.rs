//! End-to-end properties of the decision rendezvous as seen through the
//! public bridge API: bounded waits, exactly-once resolution, and
//! independence of concurrent questions.

#![cfg(target_os = "linux")]

use std::sync::Arc;
use std::time::{Duration, Instant};

use bluekit_agent::{decision_channel, AgentConfig, AgentRequest, Decision, PairingBridge};
use bluekit_device::Address;

fn bridge_with_deadline(
    ms: u64,
) -> (Arc<PairingBridge>, tokio::sync::mpsc::Receiver<AgentRequest>) {
    let (channel, rx) = decision_channel(16);
    let config = AgentConfig {
        secret_deadline_ms: ms,
        consent_deadline_ms: ms,
    };
    (Arc::new(PairingBridge::new(channel, config)), rx)
}

#[tokio::test]
async fn unanswered_consent_resolves_within_deadline_plus_epsilon() {
    let (bridge, _rx) = bridge_with_deadline(100);

    let start = Instant::now();
    let result = bridge
        .request_confirmation(Address::new("AA:BB:CC:DD:EE:FF"), 123456)
        .await;
    let elapsed = start.elapsed();

    assert!(result.is_err());
    assert!(
        elapsed < Duration::from_millis(600),
        "consent wait overran its deadline: {:?}",
        elapsed
    );
}

#[tokio::test]
async fn unanswered_secret_resolves_to_default_within_deadline_plus_epsilon() {
    let (bridge, _rx) = bridge_with_deadline(100);

    let start = Instant::now();
    let pin = bridge
        .request_pin_code(Address::new("AA:BB:CC:DD:EE:FF"))
        .await
        .unwrap();
    let elapsed = start.elapsed();

    assert_eq!(pin, "0000");
    assert!(
        elapsed < Duration::from_millis(600),
        "secret wait overran its deadline: {:?}",
        elapsed
    );
}

#[tokio::test]
async fn questions_for_different_devices_resolve_independently() {
    let (bridge, mut rx) = bridge_with_deadline(5_000);

    let accept_device = Address::new("AA:BB:CC:DD:EE:01");
    let reject_device = Address::new("AA:BB:CC:DD:EE:02");

    let first = {
        let bridge = bridge.clone();
        let device = accept_device.clone();
        tokio::spawn(async move { bridge.request_confirmation(device, 111111).await })
    };
    let second = {
        let bridge = bridge.clone();
        let device = reject_device.clone();
        tokio::spawn(async move { bridge.request_confirmation(device, 222222).await })
    };

    for _ in 0..2 {
        match rx.recv().await {
            Some(AgentRequest::Question(question)) => {
                let decision = if question.device() == &accept_device {
                    Decision::Accept
                } else {
                    Decision::Reject
                };
                question.respond(decision);
            }
            other => panic!("unexpected request: {:?}", other),
        }
    }

    assert!(first.await.unwrap().is_ok());
    assert!(second.await.unwrap().is_err());
}

#[tokio::test]
async fn resolution_is_exactly_once_under_racing_answer_and_timeout() {
    // Drive many short-deadline asks while the source answers with a
    // varying delay that straddles the deadline. Whatever side wins, the
    // call must resolve exactly once and never hang.
    let (bridge, mut rx) = bridge_with_deadline(20);

    let source = tokio::spawn(async move {
        let mut delay = 0u64;
        while let Some(request) = rx.recv().await {
            if let AgentRequest::Question(question) = request {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                question.respond(Decision::PinCode("7777".into()));
                delay = (delay + 7) % 45;
            }
        }
    });

    for _ in 0..12 {
        let pin = bridge
            .request_pin_code(Address::new("AA:BB:CC:DD:EE:FF"))
            .await
            .unwrap();
        assert!(pin == "7777" || pin == "0000", "unexpected pin {}", pin);
    }

    drop(bridge);
    source.abort();
}
