use std::sync::Arc;
use std::time::{Duration, SystemTime};

use callpulse::config::SinkConfig;
use callpulse::sink::HoneycombSink;
use callpulse::CallEventReporter;
use serde_json::Map;
use uuid::Uuid;

// Soak driver: runs a few simulated calls through every stage report so a
// live sink (and its dataset schema) can be checked end to end.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    tracing::info!("callpulse soak driver starting");

    let config = SinkConfig::from_env()?;
    let sink = Arc::new(HoneycombSink::new(config));
    let reporter = CallEventReporter::new(sink.clone());

    for call in 0..3u32 {
        let call_log_uuid = Uuid::new_v4().to_string();
        reporter.new_call(&call_log_uuid, &format!("soak_conversation_{call}"));
        reporter.call_start(SystemTime::now());
        reporter.set_deepgram_params(&Map::new());

        for turn in 0..5u32 {
            reporter.report_asr_latency(Duration::from_millis(500), Duration::ZERO, true, 0.9);
            reporter.stamp_agent_begin();
            tokio::time::sleep(pause(call, turn)).await;
            reporter.report_asr_queue_latency(Duration::from_millis(1));
            reporter.report_agent_latency();
            reporter.report_agent_queue_latency(Duration::from_millis(1));
            reporter.stamp_tts_begin();
            tokio::time::sleep(pause(call, turn + 1)).await;
            reporter.report_tts_latency();
            reporter.end_turn();
        }

        reporter.report_call();
        tracing::info!(%call_log_uuid, "simulated call complete");
    }

    reporter.terminate();
    sink.join().await;
    Ok(())
}

// Spread the simulated stage times across 250-750ms without a RNG.
fn pause(call: u32, turn: u32) -> Duration {
    Duration::from_millis(250 + 100 * u64::from((call * 3 + turn) % 6))
}
