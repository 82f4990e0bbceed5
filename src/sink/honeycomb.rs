use std::sync::Mutex;
use std::time::Duration;

use reqwest::Client;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

use super::{EventSink, SinkError};
use crate::config::SinkConfig;
use crate::event::StructuredEvent;

const EVENT_BUFFER: usize = 1024;
const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

/// Honeycomb events-API sink.
///
/// `submit` pushes onto a bounded channel; a spawned worker task owns the
/// HTTP client and posts one event per request. If the channel is full the
/// event is dropped — losing telemetry is acceptable, stalling the call is
/// not. Must be constructed inside a tokio runtime.
pub struct HoneycombSink {
    tx: Mutex<Option<mpsc::Sender<StructuredEvent>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    app: String,
}

impl HoneycombSink {
    pub fn new(config: SinkConfig) -> Self {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let app = config.app.clone();
        let worker = tokio::spawn(run_worker(rx, config));
        Self {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            app,
        }
    }

    /// Wait for the worker to finish draining. Only meaningful after
    /// `close()`; used at orderly process shutdown.
    pub async fn join(&self) {
        let handle = lock(&self.worker).take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

impl EventSink for HoneycombSink {
    fn submit(&self, mut event: StructuredEvent) -> Result<(), SinkError> {
        event.add_field("app", self.app.as_str());
        let guard = lock(&self.tx);
        let tx = guard.as_ref().ok_or(SinkError::Closed)?;
        tx.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => SinkError::Saturated,
            TrySendError::Closed(_) => SinkError::Closed,
        })
    }

    fn close(&self) {
        // Dropping the sender lets the worker drain what is buffered and
        // exit on its own; nobody blocks on it.
        if lock(&self.tx).take().is_some() {
            tracing::debug!("closing honeycomb sink");
        }
    }
}

async fn run_worker(mut rx: mpsc::Receiver<StructuredEvent>, config: SinkConfig) {
    let client = Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_default();
    let url = format!("{}/1/events/{}", config.api_host, config.dataset);

    while let Some(event) = rx.recv().await {
        let result = client
            .post(&url)
            .header("X-Honeycomb-Team", &config.api_key)
            .json(&event)
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => {
                tracing::warn!(status = %resp.status(), "telemetry backend rejected event");
            }
            Err(e) => {
                tracing::warn!("failed to deliver event: {e}");
            }
        }
    }

    tracing::debug!("honeycomb worker drained");
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(host: String) -> SinkConfig {
        SinkConfig {
            api_key: "test-key".to_string(),
            dataset: "calls".to_string(),
            api_host: host,
            app: "telephony_app".to_string(),
        }
    }

    #[tokio::test]
    async fn posts_events_with_team_header() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/1/events/calls")
            .match_header("x-honeycomb-team", "test-key")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "type": "asr_latency",
                "latency_sec": 0.5,
                "app": "telephony_app",
            })))
            .with_status(200)
            .create_async()
            .await;

        let sink = HoneycombSink::new(test_config(server.url()));
        let mut event = StructuredEvent::new("asr_latency");
        event.add_field("latency_sec", 0.5);
        sink.submit(event).expect("sink open");

        sink.close();
        sink.join().await;

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn submit_after_close_is_rejected() {
        let server = mockito::Server::new_async().await;
        let sink = HoneycombSink::new(test_config(server.url()));

        sink.close();
        sink.close(); // idempotent

        let err = sink
            .submit(StructuredEvent::new("tts_latency"))
            .expect_err("sink closed");
        assert!(matches!(err, SinkError::Closed));

        sink.join().await;
    }

    #[tokio::test]
    async fn backend_failure_is_swallowed() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/1/events/calls")
            .with_status(500)
            .create_async()
            .await;

        let sink = HoneycombSink::new(test_config(server.url()));
        sink.submit(StructuredEvent::new("e2e_latency"))
            .expect("enqueue succeeds regardless of backend health");

        sink.close();
        sink.join().await;
        mock.assert_async().await;
    }
}
