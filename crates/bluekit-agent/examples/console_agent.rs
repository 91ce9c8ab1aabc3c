//! Register as the system's default pairing agent and answer pairing
//! questions on the terminal.
//!
//! Run with: cargo run -p bluekit-agent --example console_agent

use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};

use bluekit_agent::{
    decision_channel, register, AgentConfig, AgentRequest, Decision, DecisionKind, DisplayEvent,
    PairingBridge,
};
use bluekit_device::BluetoothAdapter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("bluekit_agent=info,bluekit_device=info")
        .init();

    let adapter = BluetoothAdapter::new().await?;
    adapter.make_visible().await?;

    let (channel, mut requests) = decision_channel(16);
    let bridge = Arc::new(PairingBridge::new(channel, AgentConfig::default()));
    let _agent = register(adapter.session(), adapter.adapter().clone(), bridge).await?;

    println!("Acting as pairing agent on {}; waiting for requests.", adapter.name());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(request) = requests.recv().await {
        match request {
            AgentRequest::Display(DisplayEvent::PinCode { device, pincode }) => {
                println!("Enter PIN {} on {}", pincode, device);
            }
            AgentRequest::Display(DisplayEvent::Passkey { device, passkey }) => {
                println!("Enter passkey {:06} on {}", passkey, device);
            }
            AgentRequest::Question(question) => {
                match question.kind() {
                    DecisionKind::PinCode => println!("PIN for {}?", question.device()),
                    DecisionKind::Passkey => println!("Passkey for {}?", question.device()),
                    DecisionKind::Confirm { passkey } => {
                        println!("Confirm passkey {:06} for {}? (yes/no)", passkey, question.device())
                    }
                    DecisionKind::AuthorizeService { service } => {
                        println!("Allow {} to use service {}? (yes/no)", question.device(), service)
                    }
                    DecisionKind::AuthorizePairing => {
                        println!("Allow pairing with {}? (yes/no)", question.device())
                    }
                }

                let answer = match lines.next_line().await? {
                    Some(line) => line.trim().to_string(),
                    None => break,
                };

                let decision = match question.kind() {
                    DecisionKind::PinCode => Decision::PinCode(answer),
                    DecisionKind::Passkey => match answer.parse() {
                        Ok(passkey) => Decision::Passkey(passkey),
                        Err(_) => Decision::Reject,
                    },
                    _ if answer.eq_ignore_ascii_case("yes") => Decision::Accept,
                    _ => Decision::Reject,
                };
                question.respond(decision);
            }
        }
    }

    Ok(())
}
