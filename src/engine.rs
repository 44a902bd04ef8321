use crate::blocks::ScriptHost;
use crate::io::IoDevice;
use crate::signals::SignalBus;
use crate::store::TargetStore;
use crate::target::{SpriteInfo, TargetId};
use serde::Serialize;

/// Step pacing requested by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepMode {
    /// 60 steps per second.
    #[default]
    Normal,
    /// 30 steps per second, matching older projects' timing.
    Compatibility,
}

impl StepMode {
    pub fn interval_ms(self) -> f64 {
        match self {
            StepMode::Normal => 1000.0 / 60.0,
            StepMode::Compatibility => 1000.0 / 30.0,
        }
    }
}

/// Thread state reported to playground/debug observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadSummary {
    pub top_block: String,
    pub current_block: Option<String>,
}

/// Narrow interface the coordinator drives the execution engine through.
pub trait Engine: ScriptHost {
    /// Authoritative target store.
    fn targets(&self) -> &TargetStore;

    /// Mutable store access for serializers and sprite edits.
    fn targets_mut(&mut self) -> &mut TargetStore;

    /// Engine-side signal surface; subscribers run synchronously on emit.
    fn signals_mut(&mut self) -> &mut SignalBus;

    /// Registered virtual IO device, matched by exact name.
    fn io_device_mut(&mut self, name: &str) -> Option<&mut dyn IoDevice>;

    /// Drop every target, sprite and thread.
    fn dispose_all(&mut self);

    /// Record which target the editor is looking at; used for sprite-info reports and stack clicks.
    fn set_editing_target(&mut self, target: Option<&TargetId>);

    /// Stop every thread running on `target`.
    fn stop_for_target(&mut self, target: &TargetId);

    /// Remove `target` from the store.
    fn dispose_target(&mut self, target: &TargetId);

    /// Apply a sprite-info patch to `target`.
    fn post_sprite_info(&mut self, target: &TargetId, info: &SpriteInfo);

    /// Begin accepting steps.
    fn start(&mut self);

    /// Advance the scheduler by one tick; inert until [`Engine::start`].
    fn step(&mut self);

    /// Stop everything, then start green-flag scripts.
    fn green_flag(&mut self);

    /// Stop all threads and dispose clones.
    fn stop_all(&mut self);

    fn set_turbo_mode(&mut self, enabled: bool);

    fn set_compatibility_mode(&mut self, enabled: bool);

    /// Threads currently running on `target`.
    fn threads_for(&self, target: &TargetId) -> Vec<ThreadSummary>;
}
