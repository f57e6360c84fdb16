use crate::{ParamMap, Probe};
use async_trait::async_trait;
use relaymon_common::types::Event;
use serde_json::Value;
use std::time::{Duration, Instant};

/// Issues an HTTP request and reports latency and response status.
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn run(&self, params: &ParamMap) -> Vec<Event> {
        let url = params.get("url").and_then(Value::as_str).unwrap_or_default();
        let timeout = params
            .get("timeout")
            .and_then(Value::as_f64)
            .filter(|t| *t > 0.0)
            .unwrap_or(10.0);
        let include_response = params
            .get("include_response")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let body = params
            .get("body")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let mut event = Event {
            state: "failure".into(),
            ..Event::default()
        };

        let method = params
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or("GET");
        let method = match reqwest::Method::from_bytes(method.as_bytes()) {
            Ok(method) => method,
            Err(e) => {
                event.attributes.insert("error".into(), e.to_string());
                return vec![event];
            }
        };

        let mut request = self
            .client
            .request(method, url)
            .timeout(Duration::from_secs_f64(timeout))
            .body(body);
        if let Some(Value::Object(headers)) = params.get("headers") {
            for (name, value) in headers {
                if let Some(value) = value.as_str() {
                    request = request.header(name, value);
                }
            }
        }

        let started = Instant::now();
        let response = request.send().await;
        event.metric = Some(started.elapsed().as_secs_f64());

        match response {
            Ok(response) => {
                let status = response.status();
                event
                    .attributes
                    .insert("code".into(), status.as_u16().to_string());
                if status.as_u16() >= 300 {
                    event.attributes.insert("error".into(), status.to_string());
                } else {
                    event.state = "success".into();
                }

                if include_response {
                    match response.text().await {
                        Ok(text) => {
                            event.attributes.insert("response".into(), text);
                        }
                        Err(e) => {
                            event
                                .attributes
                                .insert("response_error".into(), e.to_string());
                        }
                    }
                }
            }
            Err(e) => {
                event.attributes.insert("error".into(), e.to_string());
            }
        }

        vec![event]
    }
}
