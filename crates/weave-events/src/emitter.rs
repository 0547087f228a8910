use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use weave_types::event::kind;
use weave_types::RuntimeEvent;

use crate::EventBus;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StageKey {
    adapter: String,
    stage: String,
    parent_id: String,
    group_id: String,
}

impl StageKey {
    fn from_event(event: &RuntimeEvent) -> Self {
        let field = |name: &str| {
            event
                .properties
                .get(name)
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string()
        };
        Self {
            adapter: field("adapter"),
            stage: field("stage"),
            parent_id: field("parentId"),
            group_id: field("groupId"),
        }
    }
}

#[derive(Default)]
struct EmitterState {
    sequence: u64,
    terminal_emitted: bool,
    open_stages: HashMap<StageKey, DateTime<Utc>>,
    open_tool_calls: HashMap<String, DateTime<Utc>>,
}

/// Per-run envelope stamping: monotone sequence from 1, identity, timestamps,
/// duration pairing, and the once-only terminal guarantee. The emit step is a
/// short critical section; event-producing work stays outside the lock.
#[derive(Clone)]
pub struct RunEmitter {
    session_id: String,
    run_id: String,
    bus: EventBus,
    cancel: CancellationToken,
    state: Arc<Mutex<EmitterState>>,
}

impl RunEmitter {
    pub fn new(
        session_id: impl Into<String>,
        run_id: impl Into<String>,
        bus: EventBus,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            run_id: run_id.into(),
            bus,
            cancel,
            state: Arc::new(Mutex::new(EmitterState::default())),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Downstream transport went away; unwind in-flight work.
    pub fn transport_closed(&self) {
        self.cancel.cancel();
    }

    pub fn terminal_emitted(&self) -> bool {
        self.state.lock().expect("emitter lock").terminal_emitted
    }

    /// Stamps and publishes. Returns false when a terminal event was already
    /// emitted for this run and the attempt was dropped.
    pub fn emit(&self, mut event: RuntimeEvent) -> bool {
        let now = Utc::now();
        {
            let mut state = self.state.lock().expect("emitter lock");
            if event.is_terminal() {
                if state.terminal_emitted {
                    return false;
                }
                state.terminal_emitted = true;
            }

            state.sequence += 1;
            event.sequence = state.sequence;
            event.session_id = self.session_id.clone();
            event.run_id = self.run_id.clone();
            event.timestamp = now;

            match event.event_type.as_str() {
                kind::RENDER_PIPELINE_STAGE => {
                    let key = StageKey::from_event(&event);
                    let started = event.property_str("status") == Some("started");
                    if started {
                        state.open_stages.insert(key, now);
                    } else if let Some(opened) = state.open_stages.remove(&key) {
                        event.duration_ms = elapsed_ms(opened, now);
                    }
                }
                kind::TOOL_CALL_STARTED => {
                    if let Some(call_id) = event.property_str("callId") {
                        state.open_tool_calls.insert(call_id.to_string(), now);
                    }
                }
                kind::TOOL_CALL_PROGRESS => {
                    if let Some(call_id) = event.property_str("callId") {
                        if let Some(opened) = state.open_tool_calls.get(call_id) {
                            event.duration_ms = elapsed_ms(*opened, now);
                        }
                    }
                }
                kind::TOOL_CALL_COMPLETED | kind::TOOL_CALL_FAILED => {
                    if let Some(call_id) = event.property_str("callId") {
                        if let Some(opened) = state.open_tool_calls.remove(call_id) {
                            event.duration_ms = elapsed_ms(opened, now);
                        }
                    }
                }
                _ => {}
            }
        }

        self.bus.publish(event);
        true
    }
}

fn elapsed_ms(from: DateTime<Utc>, to: DateTime<Utc>) -> Option<u64> {
    let millis = to.signed_duration_since(from).num_milliseconds();
    Some(millis.max(0) as u64)
}
