use crate::{ParamMap, Probe};
use async_trait::async_trait;
use relaymon_common::types::Event;
use serde_json::Value;

/// Diagnostic probe emitting two synthetic events per tick.
pub struct FakeProbe;

#[async_trait]
impl Probe for FakeProbe {
    async fn run(&self, params: &ParamMap) -> Vec<Event> {
        let attribute = params
            .get("attribute")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let make = |service: &str, metric: Option<f64>| {
            let mut event = Event {
                service: service.to_string(),
                state: "ok".into(),
                metric,
                ..Event::default()
            };
            event.attributes.insert("test".into(), attribute.clone());
            event
        };

        vec![
            make("value1", params.get("value1").and_then(Value::as_f64)),
            make("value2", params.get("value2").and_then(Value::as_f64)),
        ]
    }
}
