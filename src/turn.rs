use std::time::{Duration, Instant};

/// Pipeline stages that contribute a latency figure to one turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Asr,
    AsrQueue,
    Agent,
    AgentQueue,
    Tts,
}

/// Stages measured as elapsed wall-clock time instead of a pre-computed
/// value handed in by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timer {
    Agent,
    Tts,
}

/// Per-turn latency accumulator. One instance per call session, always
/// accessed under the reporter's lock.
///
/// Every field is optional rather than zero-defaulted so that "never
/// measured" stays distinguishable from "measured as zero" — the partial
/// data check below depends on that.
#[derive(Debug, Default)]
pub struct TurnLatency {
    asr: Option<Duration>,
    asr_queue: Option<Duration>,
    agent: Option<Duration>,
    agent_queue: Option<Duration>,
    tts: Option<Duration>,

    // Open timers. Explicit fields under the same lock as the stage
    // values, not ambient state, so an overlapping stage cannot leak a
    // start instant across turns.
    agent_begin: Option<Instant>,
    tts_begin: Option<Instant>,
}

impl TurnLatency {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed duration for one stage. Overwrites any prior
    /// value for that stage within the current turn; callers are expected
    /// to finish one turn's stages before starting the next.
    pub fn stamp(&mut self, stage: Stage, value: Duration) {
        let slot = match stage {
            Stage::Asr => &mut self.asr,
            Stage::AsrQueue => &mut self.asr_queue,
            Stage::Agent => &mut self.agent,
            Stage::AgentQueue => &mut self.agent_queue,
            Stage::Tts => &mut self.tts,
        };
        *slot = Some(value);
    }

    pub fn begin_timer(&mut self, timer: Timer) {
        let slot = match timer {
            Timer::Agent => &mut self.agent_begin,
            Timer::Tts => &mut self.tts_begin,
        };
        *slot = Some(Instant::now());
    }

    /// Close an open timer and return the elapsed time. Returns `None` if
    /// no matching `begin_timer` happened — the caller logs and moves on,
    /// nothing is emitted and nothing panics.
    pub fn end_timer(&mut self, timer: Timer) -> Option<Duration> {
        let slot = match timer {
            Timer::Agent => &mut self.agent_begin,
            Timer::Tts => &mut self.tts_begin,
        };
        slot.take().map(|begin| begin.elapsed())
    }

    /// End-to-end latency for the turn, if computable.
    ///
    /// No ASR latency means the turn never had user speech (e.g. an
    /// idle-timeout prompt) — normal skip, no logging. ASR present with
    /// any other stage missing is an anomaly: a warning is logged and the
    /// accumulator is left untouched. With all five present the sum is
    /// returned and the accumulator resets for the next turn.
    pub fn try_compute_e2e(&mut self) -> Option<Duration> {
        let asr = self.asr?;

        match (self.asr_queue, self.agent, self.agent_queue, self.tts) {
            (Some(asr_queue), Some(agent), Some(agent_queue), Some(tts)) => {
                let total = asr + asr_queue + agent + agent_queue + tts;
                self.asr = None;
                self.asr_queue = None;
                self.agent = None;
                self.agent_queue = None;
                self.tts = None;
                Some(total)
            }
            _ => {
                tracing::warn!("some latency values were missing, skipping e2e latency");
                None
            }
        }
    }

    #[cfg(test)]
    fn asr(&self) -> Option<Duration> {
        self.asr
    }
}
