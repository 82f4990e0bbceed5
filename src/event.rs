use serde::Serialize;
use serde_json::{Map, Value};

/// One flat field set bound for the telemetry sink.
///
/// Fields keep insertion order. Once handed to a sink the event is never
/// mutated or retried; delivery is at-most-once.
#[derive(Debug, Clone, Serialize)]
pub struct StructuredEvent {
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl StructuredEvent {
    pub fn new(kind: &str) -> Self {
        let mut fields = Map::new();
        fields.insert("type".to_string(), Value::from(kind));
        Self { fields }
    }

    pub fn add_field(&mut self, key: &str, value: impl Into<Value>) {
        self.fields.insert(key.to_string(), value.into());
    }

    /// Merge an externally serialized record into the event. Later keys
    /// overwrite earlier ones.
    pub fn extend(&mut self, record: Map<String, Value>) {
        for (key, value) in record {
            self.fields.insert(key, value);
        }
    }

    pub fn kind(&self) -> Option<&str> {
        self.fields.get("type").and_then(Value::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_tag_is_first_field() {
        let mut event = StructuredEvent::new("asr_latency");
        event.add_field("latency_sec", 0.5);
        let keys: Vec<&str> = event.fields().keys().map(String::as_str).collect();
        assert_eq!(keys[0], "type");
        assert_eq!(event.kind(), Some("asr_latency"));
    }

    #[test]
    fn extend_overwrites_existing_keys() {
        let mut event = StructuredEvent::new("transcription");
        event.add_field("confidence", 0.1);

        let mut record = Map::new();
        record.insert("confidence".to_string(), Value::from(0.9));
        record.insert("message".to_string(), Value::from("hello"));
        event.extend(record);

        assert_eq!(event.get("confidence"), Some(&Value::from(0.9)));
        assert_eq!(event.get("message"), Some(&Value::from("hello")));
    }
}
