use crate::{ParamMap, Probe};
use async_trait::async_trait;
use relaymon_common::types::Event;
use serde_json::Value;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time::timeout;

const CONNECT_DEADLINE: Duration = Duration::from_secs(1);
const ECHO_PORT: u16 = 7;

/// Measures the time to open a TCP connection to the target.
///
/// The target is `host` or `host:port`; a bare host probes the echo port.
pub struct PingProbe;

#[async_trait]
impl Probe for PingProbe {
    async fn run(&self, params: &ParamMap) -> Vec<Event> {
        let target = params
            .get("target")
            .and_then(Value::as_str)
            .unwrap_or_default();

        let addr = match target.parse::<IpAddr>() {
            Ok(ip) => SocketAddr::new(ip, ECHO_PORT).to_string(),
            Err(_) if target.contains(':') => target.to_string(),
            Err(_) => format!("{target}:{ECHO_PORT}"),
        };

        let started = Instant::now();
        let outcome = timeout(CONNECT_DEADLINE, TcpStream::connect(&addr)).await;
        let latency = started.elapsed();

        let mut event = Event {
            metric: Some(latency.as_secs_f64()),
            ..Event::default()
        };
        match outcome {
            Ok(Ok(_)) => event.state = "success".into(),
            Ok(Err(e)) => {
                event.state = "failure".into();
                event.attributes.insert("error".into(), e.to_string());
            }
            Err(_) => {
                event.state = "failure".into();
                event
                    .attributes
                    .insert("error".into(), format!("connection to {addr} timed out"));
            }
        }

        vec![event]
    }
}
