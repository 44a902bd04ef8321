use crate::target::TargetSummary;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    ScriptGlowOn,
    ScriptGlowOff,
    BlockGlowOn,
    BlockGlowOff,
    ProjectRunStart,
    ProjectRunStop,
    VisualReport,
    SpriteInfoReport,
}

impl SignalKind {
    pub const ALL: [SignalKind; 8] = [
        SignalKind::ScriptGlowOn,
        SignalKind::ScriptGlowOff,
        SignalKind::BlockGlowOn,
        SignalKind::BlockGlowOff,
        SignalKind::ProjectRunStart,
        SignalKind::ProjectRunStop,
        SignalKind::VisualReport,
        SignalKind::SpriteInfoReport,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SignalKind::ScriptGlowOn => "SCRIPT_GLOW_ON",
            SignalKind::ScriptGlowOff => "SCRIPT_GLOW_OFF",
            SignalKind::BlockGlowOn => "BLOCK_GLOW_ON",
            SignalKind::BlockGlowOff => "BLOCK_GLOW_OFF",
            SignalKind::ProjectRunStart => "PROJECT_RUN_START",
            SignalKind::ProjectRunStop => "PROJECT_RUN_STOP",
            SignalKind::VisualReport => "VISUAL_REPORT",
            SignalKind::SpriteInfoReport => "SPRITE_INFO_REPORT",
        }
    }
}

/// Lifecycle and visual signal emitted by the execution engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RuntimeSignal {
    ScriptGlowOn { id: String },
    ScriptGlowOff { id: String },
    BlockGlowOn { id: String },
    BlockGlowOff { id: String },
    ProjectRunStart,
    ProjectRunStop,
    VisualReport { id: String, value: Value },
    SpriteInfoReport(TargetSummary),
}

impl RuntimeSignal {
    pub fn kind(&self) -> SignalKind {
        match self {
            RuntimeSignal::ScriptGlowOn { .. } => SignalKind::ScriptGlowOn,
            RuntimeSignal::ScriptGlowOff { .. } => SignalKind::ScriptGlowOff,
            RuntimeSignal::BlockGlowOn { .. } => SignalKind::BlockGlowOn,
            RuntimeSignal::BlockGlowOff { .. } => SignalKind::BlockGlowOff,
            RuntimeSignal::ProjectRunStart => SignalKind::ProjectRunStart,
            RuntimeSignal::ProjectRunStop => SignalKind::ProjectRunStop,
            RuntimeSignal::VisualReport { .. } => SignalKind::VisualReport,
            RuntimeSignal::SpriteInfoReport(_) => SignalKind::SpriteInfoReport,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Signal payload as observers receive it; unit signals carry `null`.
    pub fn payload(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl fmt::Display for RuntimeSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeSignal::ScriptGlowOn { id }
            | RuntimeSignal::ScriptGlowOff { id }
            | RuntimeSignal::BlockGlowOn { id }
            | RuntimeSignal::BlockGlowOff { id } => write!(f, "{} id={id}", self.name()),
            RuntimeSignal::ProjectRunStart | RuntimeSignal::ProjectRunStop => f.write_str(self.name()),
            RuntimeSignal::VisualReport { id, value } => write!(f, "{} id={id} value={value}", self.name()),
            RuntimeSignal::SpriteInfoReport(summary) => {
                write!(f, "{} target={} x={:.1} y={:.1}", self.name(), summary.id, summary.x, summary.y)
            }
        }
    }
}

pub type SignalHandler = Box<dyn FnMut(&RuntimeSignal)>;

/// Engine-side publish surface. Handlers run synchronously in subscription order.
#[derive(Default)]
pub struct SignalBus {
    handlers: Vec<(SignalKind, SignalHandler)>,
}

impl SignalBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, kind: SignalKind, handler: SignalHandler) {
        self.handlers.push((kind, handler));
    }

    pub fn subscriber_count(&self, kind: SignalKind) -> usize {
        self.handlers.iter().filter(|(subscribed, _)| *subscribed == kind).count()
    }

    pub fn emit(&mut self, signal: RuntimeSignal) {
        let kind = signal.kind();
        for (subscribed, handler) in self.handlers.iter_mut() {
            if *subscribed == kind {
                handler(&signal);
            }
        }
    }
}

impl fmt::Debug for SignalBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalBus").field("handlers", &self.handlers.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn handlers_only_see_their_kind() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut bus = SignalBus::new();
        let sink = Rc::clone(&seen);
        bus.subscribe(
            SignalKind::ScriptGlowOn,
            Box::new(move |signal| sink.borrow_mut().push(signal.name())),
        );
        bus.emit(RuntimeSignal::ProjectRunStart);
        bus.emit(RuntimeSignal::ScriptGlowOn { id: "a".into() });
        assert_eq!(*seen.borrow(), vec!["SCRIPT_GLOW_ON"]);
        assert_eq!(bus.subscriber_count(SignalKind::ScriptGlowOn), 1);
    }

    #[test]
    fn glow_payload_carries_block_id() {
        let payload = RuntimeSignal::BlockGlowOff { id: "blk".into() }.payload();
        assert_eq!(payload["id"], "blk");
        assert!(RuntimeSignal::ProjectRunStop.payload().is_null());
    }
}
