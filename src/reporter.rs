use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::event::StructuredEvent;
use crate::sink::{EventSink, SinkError};
use crate::turn::{Stage, Timer, TurnLatency};

/// One recognized utterance as handed over by the transcriber.
#[derive(Debug, Clone, Serialize)]
pub struct Transcription {
    pub message: String,
    pub confidence: f64,
    pub is_final: bool,
    pub is_interrupt: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
}

struct CallSession {
    call_log_uuid: String,
    conversation_id: String,
    stream_start: Option<SystemTime>,
}

#[derive(Default)]
struct ReporterState {
    turns: u32,
    call: Option<CallSession>,
    latency: TurnLatency,
    deepgram_params: Map<String, Value>,
    tts_provider: Option<String>,
    tts_config: Option<String>,
    tts_endpoint: Option<String>,
}

/// Per-call telemetry façade.
///
/// The ASR, agent and TTS stages run concurrently against the same call
/// and all report through this one object, so everything mutable sits
/// behind a single lock: a stage stamp plus the end-to-end check-and-reset
/// is a composite read-modify-write that must not interleave across
/// stages. Emission only enqueues onto the sink; no reporting call ever
/// waits on the network, and a sink failure is logged and swallowed so the
/// audio path stays live.
pub struct CallEventReporter {
    sink: Arc<dyn EventSink>,
    state: Mutex<ReporterState>,
}

impl CallEventReporter {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            sink,
            state: Mutex::new(ReporterState::default()),
        }
    }

    /// Bind a new call. Constructs a fresh accumulator so nothing can leak
    /// in from a previous call; the turn counter is monotonic across the
    /// reporter's lifetime and is deliberately not reset.
    pub fn new_call(&self, call_log_uuid: &str, conversation_id: &str) {
        let mut state = self.lock();
        state.call = Some(CallSession {
            call_log_uuid: call_log_uuid.to_string(),
            conversation_id: conversation_id.to_string(),
            stream_start: None,
        });
        state.latency = TurnLatency::new();
        tracing::debug!(call_log_uuid, conversation_id, "bound new call");
    }

    pub fn call_start(&self, timestamp: SystemTime) {
        let mut state = self.lock();
        match state.call.as_mut() {
            Some(call) => call.stream_start = Some(timestamp),
            None => tracing::warn!("call_start with no active call"),
        }
    }

    /// Store transcription-provider parameters; attached to every
    /// ASR-related event, namespaced to avoid clobbering core fields.
    pub fn set_deepgram_params(&self, params: &Map<String, Value>) {
        let mut state = self.lock();
        state.deepgram_params = params
            .iter()
            .map(|(key, value)| (format!("deepgram_{key}"), value.clone()))
            .collect();
    }

    pub fn set_tts_config(&self, provider: &str, config_json: &str) {
        let mut state = self.lock();
        state.tts_provider = Some(provider.to_string());
        state.tts_config = Some(config_json.to_string());
    }

    pub fn set_tts_endpoint(&self, endpoint: &str) {
        self.lock().tts_endpoint = Some(endpoint.to_string());
    }

    pub fn report_asr_latency(
        &self,
        latency: Duration,
        audio_latency: Duration,
        is_final: bool,
        confidence: f64,
    ) {
        let mut state = self.lock();
        state.latency.stamp(Stage::Asr, latency);

        let Some(mut event) = tagged_event(&state, "asr_latency") else {
            return;
        };
        event.add_field("latency_sec", latency.as_secs_f64());
        event.add_field("audio_latency", audio_latency.as_secs_f64());
        event.add_field("final", is_final);
        event.add_field("confidence", confidence);
        event.extend(state.deepgram_params.clone());
        self.emit(event);
    }

    pub fn report_asr_queue_latency(&self, latency: Duration) {
        let mut state = self.lock();
        state.latency.stamp(Stage::AsrQueue, latency);

        let Some(mut event) = tagged_event(&state, "asr_queue_latency") else {
            return;
        };
        event.add_field("latency_sec", latency.as_secs_f64());
        self.emit(event);
    }

    /// Endpointing is emitted for visibility but is not one of the five
    /// stages that make up the end-to-end figure.
    pub fn report_endpointing_latency(&self, latency: Duration) {
        let state = self.lock();
        let Some(mut event) = tagged_event(&state, "endpointing_latency") else {
            return;
        };
        event.add_field("latency_sec", latency.as_secs_f64());
        event.extend(state.deepgram_params.clone());
        self.emit(event);
    }

    pub fn stamp_agent_begin(&self) {
        self.lock().latency.begin_timer(Timer::Agent);
    }

    pub fn report_agent_latency(&self) {
        let mut state = self.lock();
        let Some(latency) = state.latency.end_timer(Timer::Agent) else {
            tracing::warn!("agent begin timestamp missing");
            return;
        };
        state.latency.stamp(Stage::Agent, latency);

        let Some(mut event) = tagged_event(&state, "agent_latency") else {
            return;
        };
        event.add_field("latency_sec", latency.as_secs_f64());
        self.emit(event);
    }

    pub fn report_agent_queue_latency(&self, latency: Duration) {
        let mut state = self.lock();
        state.latency.stamp(Stage::AgentQueue, latency);

        let Some(mut event) = tagged_event(&state, "agent_queue_latency") else {
            return;
        };
        event.add_field("latency_sec", latency.as_secs_f64());
        self.emit(event);
    }

    /// Per-token generation latency from the agent's streaming path.
    /// Independent of the per-turn accumulator.
    pub fn report_token_latency(&self, latency: Duration, token_num: u32) {
        let state = self.lock();
        let Some(mut event) = tagged_event(&state, "token_latency") else {
            return;
        };
        event.add_field("latency_sec", latency.as_secs_f64());
        event.add_field("token_num", token_num);
        self.emit(event);
    }

    pub fn stamp_tts_begin(&self) {
        self.lock().latency.begin_timer(Timer::Tts);
    }

    /// Close the TTS timer. TTS is the terminal stage of a turn, so a
    /// successful close also runs the end-to-end computation before the
    /// tts_latency event goes out.
    pub fn report_tts_latency(&self) {
        let mut state = self.lock();
        let Some(latency) = state.latency.end_timer(Timer::Tts) else {
            tracing::warn!("tts begin timestamp missing");
            return;
        };
        state.latency.stamp(Stage::Tts, latency);
        self.emit_e2e(&mut state);

        let Some(mut event) = tagged_event(&state, "tts_latency") else {
            return;
        };
        event.add_field("latency_sec", latency.as_secs_f64());
        if let Some(provider) = &state.tts_provider {
            event.add_field("tts_provider", provider.as_str());
        }
        if let Some(config) = &state.tts_config {
            event.add_field("tts_config", config.as_str());
        }
        if let Some(endpoint) = &state.tts_endpoint {
            event.add_field("tts_endpoint", endpoint.as_str());
        }
        self.emit(event);
    }

    pub fn report_e2e_latency(&self) {
        let mut state = self.lock();
        self.emit_e2e(&mut state);
    }

    fn emit_e2e(&self, state: &mut ReporterState) {
        // The accumulator distinguishes the normal skip (no ASR, nothing
        // logged) from partial data (warned inside try_compute_e2e).
        let Some(total) = state.latency.try_compute_e2e() else {
            return;
        };
        let Some(mut event) = tagged_event(state, "e2e_latency") else {
            return;
        };
        event.add_field("latency_sec", total.as_secs_f64());
        self.emit(event);
    }

    pub fn end_turn(&self) {
        self.lock().turns += 1;
    }

    pub fn report_rate_limit(&self) {
        let state = self.lock();
        let Some(mut event) = tagged_event(&state, "rate_limited") else {
            return;
        };
        event.add_field("rate_limited", true);
        self.emit(event);
    }

    pub fn report_transcription(
        &self,
        transcription: &Transcription,
        ignored: bool,
        agent_input: bool,
    ) {
        let state = self.lock();
        let Some(mut event) = tagged_event(&state, "transcription") else {
            return;
        };
        event.add_field("ignored", ignored);
        event.add_field("agent_input", agent_input);
        match serde_json::to_value(transcription) {
            Ok(Value::Object(record)) => {
                event.extend(record);
                self.emit(event);
            }
            Ok(other) => {
                event.add_field("transcription", other);
                self.emit(event);
            }
            Err(e) => tracing::error!("couldn't report transcription: {e}"),
        }
    }

    /// Verbatim dump of a raw transcriber result, correlated to the call.
    pub fn report_deepgram_result<T: Serialize>(&self, request_id: &str, result: &T) {
        let state = self.lock();
        let Some(mut event) = tagged_event(&state, "deepgram_result") else {
            return;
        };
        event.add_field("request_id", request_id);
        match serde_json::to_value(result) {
            Ok(Value::Object(record)) => {
                event.extend(record);
                self.emit(event);
            }
            Ok(other) => {
                event.add_field("result", other);
                self.emit(event);
            }
            Err(e) => tracing::error!("couldn't report deepgram_result: {e}"),
        }
    }

    /// Final event of a call's lifetime: total duration and turn count.
    pub fn report_call(&self) {
        let state = self.lock();
        let Some(mut event) = tagged_event(&state, "call_summary") else {
            return;
        };
        let stream_start = state.call.as_ref().and_then(|call| call.stream_start);
        match stream_start {
            Some(start) => {
                let elapsed = SystemTime::now()
                    .duration_since(start)
                    .unwrap_or_default();
                event.add_field("call_duration_sec", elapsed.as_secs_f64());
            }
            None => tracing::warn!("call_start was never recorded, omitting call duration"),
        }
        event.add_field("num_turns", state.turns);
        self.emit(event);
    }

    /// Release the sink. Buffered events drain in the background; safe to
    /// call more than once.
    pub fn terminate(&self) {
        tracing::debug!("closing telemetry sink");
        self.sink.close();
    }

    fn emit(&self, event: StructuredEvent) {
        let kind = event.kind().unwrap_or("unknown").to_string();
        match self.sink.submit(event) {
            Ok(()) => tracing::debug!("sent {kind}"),
            Err(SinkError::Serialize(e)) => {
                tracing::error!("couldn't serialize {kind}: {e}");
            }
            Err(e) => tracing::warn!("dropping {kind}: {e}"),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ReporterState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Event pre-tagged with the identifiers every emission carries. `None`
/// (with a warning) when no call is bound yet — stage reports before
/// `new_call` are dropped rather than crashing the call path.
fn tagged_event(state: &ReporterState, kind: &str) -> Option<StructuredEvent> {
    let Some(call) = state.call.as_ref() else {
        tracing::warn!("no active call, dropping {kind}");
        return None;
    };
    let mut event = StructuredEvent::new(kind);
    event.add_field("turn", state.turns);
    event.add_field("call_log_uuid", call.call_log_uuid.as_str());
    event.add_field("conversation_id", call.conversation_id.as_str());
    Some(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;

    fn reporter() -> (Arc<MemorySink>, CallEventReporter) {
        let sink = Arc::new(MemorySink::new());
        let reporter = CallEventReporter::new(sink.clone());
        (sink, reporter)
    }

    #[test]
    fn reports_before_new_call_are_dropped() {
        let (sink, reporter) = reporter();
        reporter.report_asr_queue_latency(Duration::from_millis(1));
        reporter.report_call();
        assert!(sink.events().is_empty());
    }

    #[test]
    fn deepgram_params_are_namespaced_onto_asr_events() {
        let (sink, reporter) = reporter();
        reporter.new_call("log-1", "conv-1");

        let mut params = Map::new();
        params.insert("model".to_string(), Value::from("nova-2-phonecall"));
        reporter.set_deepgram_params(&params);

        reporter.report_asr_latency(Duration::from_millis(500), Duration::ZERO, true, 0.9);

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].get("deepgram_model"),
            Some(&Value::from("nova-2-phonecall"))
        );
        assert_eq!(events[0].get("model"), None);
    }

    #[test]
    fn turn_counter_survives_new_call() {
        let (sink, reporter) = reporter();
        reporter.new_call("log-1", "conv-1");
        reporter.end_turn();
        reporter.end_turn();
        reporter.new_call("log-2", "conv-2");
        reporter.report_rate_limit();

        let events = sink.events();
        assert_eq!(events[0].get("turn"), Some(&Value::from(2)));
        assert_eq!(events[0].get("call_log_uuid"), Some(&Value::from("log-2")));
    }

    #[test]
    fn transcription_dump_carries_record_fields() {
        let (sink, reporter) = reporter();
        reporter.new_call("log-1", "conv-1");

        let transcription = Transcription {
            message: "hello there".to_string(),
            confidence: 0.87,
            is_final: true,
            is_interrupt: false,
            duration_seconds: Some(1.4),
        };
        reporter.report_transcription(&transcription, false, true);

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), Some("transcription"));
        assert_eq!(events[0].get("message"), Some(&Value::from("hello there")));
        assert_eq!(events[0].get("agent_input"), Some(&Value::from(true)));
        assert_eq!(events[0].get("ignored"), Some(&Value::from(false)));
    }
}
