use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The unit shipped to the remote event bus.
///
/// Modules produce events carrying at least `state` (and usually `service`
/// and `metric`); the driver runner fills in `description`, `host`, `tags`,
/// `ttl` and `time` from the driver descriptor before enqueueing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Event {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub service: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<f64>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub host: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub ttl: f32,
    pub time: i64,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, String>,
}

/// A partial event, as decoded from an external module record.
///
/// Only the fields present in the record replace the driver-seeded values.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EventPatch {
    pub service: Option<String>,
    pub state: Option<String>,
    pub metric: Option<f64>,
    pub description: Option<String>,
    pub host: Option<String>,
    pub tags: Option<Vec<String>>,
    pub ttl: Option<f32>,
    pub time: Option<i64>,
    pub attributes: Option<HashMap<String, String>>,
}

impl EventPatch {
    /// Overlays the fields present in the record onto `event`.
    pub fn apply(self, event: &mut Event) {
        if let Some(service) = self.service {
            event.service = service;
        }
        if let Some(state) = self.state {
            event.state = state;
        }
        if let Some(metric) = self.metric {
            event.metric = Some(metric);
        }
        if let Some(description) = self.description {
            event.description = description;
        }
        if let Some(host) = self.host {
            event.host = host;
        }
        if let Some(tags) = self.tags {
            event.tags = tags;
        }
        if let Some(ttl) = self.ttl {
            event.ttl = ttl;
        }
        if let Some(time) = self.time {
            event.time = time;
        }
        if let Some(attributes) = self.attributes {
            event.attributes = attributes;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_overlays_only_present_fields() {
        let mut event = Event {
            description: "probe".into(),
            host: "web-01".into(),
            tags: vec!["prod".into()],
            ttl: 60.0,
            time: 1000,
            ..Event::default()
        };

        let patch: EventPatch =
            serde_json::from_str(r#"{"service": "disk", "state": "ok", "metric": 0.5}"#).unwrap();
        patch.apply(&mut event);

        assert_eq!(event.service, "disk");
        assert_eq!(event.state, "ok");
        assert_eq!(event.metric, Some(0.5));
        assert_eq!(event.description, "probe");
        assert_eq!(event.host, "web-01");
        assert_eq!(event.tags, vec!["prod".to_string()]);
        assert_eq!(event.ttl, 60.0);
        assert_eq!(event.time, 1000);
    }

    #[test]
    fn event_serialization_omits_empty_fields() {
        let event = Event {
            service: "ping".into(),
            state: "success".into(),
            metric: Some(0.01),
            time: 1000,
            ..Event::default()
        };

        let json = serde_json::to_value(&event).unwrap();
        let object = json.as_object().unwrap();
        assert!(object.contains_key("service"));
        assert!(object.contains_key("metric"));
        assert!(!object.contains_key("description"));
        assert!(!object.contains_key("tags"));
        assert!(!object.contains_key("attributes"));
    }
}
