use crate::blocks::ScriptHost;
use crate::config::RuntimeConfig;
use crate::engine::{Engine, StepMode, ThreadSummary};
use crate::io::{Clock, IoDevice, IoDevices};
use crate::signals::{RuntimeSignal, SignalBus};
use crate::store::TargetStore;
use crate::target::{SpriteInfo, TargetId};
use log::{debug, info};
use serde_json::Value;

pub const GREEN_FLAG_OPCODE: &str = "event_whenflagclicked";
pub const MAX_CLONES: usize = 300;

#[derive(Debug, Clone)]
struct Thread {
    top_block: String,
    target: TargetId,
    current: Option<String>,
}

/// Reference execution engine.
///
/// Threads only walk `next` links, one block per step; blocks have no effect. What the engine does
/// model is everything the coordinator observes: target and clone bookkeeping, script glows, run
/// start/stop transitions, sprite-info reports for the editing target, and IO device state.
pub struct Runtime {
    store: TargetStore,
    signals: SignalBus,
    io: IoDevices,
    threads: Vec<Thread>,
    glowing: Vec<String>,
    editing_target: Option<TargetId>,
    started: bool,
    was_running: bool,
    turbo_mode: bool,
    step_mode: StepMode,
    max_clones: usize,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            store: TargetStore::new(),
            signals: SignalBus::new(),
            io: IoDevices::with_builtins(),
            threads: Vec::new(),
            glowing: Vec::new(),
            editing_target: None,
            started: false,
            was_running: false,
            turbo_mode: false,
            step_mode: StepMode::Normal,
            max_clones: MAX_CLONES,
        }
    }

    pub fn with_config(config: &RuntimeConfig) -> Self {
        let mut runtime = Self::new();
        runtime.turbo_mode = config.turbo_mode;
        runtime.set_compatibility_mode(config.compatibility_mode);
        runtime.max_clones = config.max_clones;
        runtime
    }

    pub fn io(&self) -> &IoDevices {
        &self.io
    }

    pub fn io_mut(&mut self) -> &mut IoDevices {
        &mut self.io
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn turbo_mode(&self) -> bool {
        self.turbo_mode
    }

    pub fn step_mode(&self) -> StepMode {
        self.step_mode
    }

    pub fn editing_target(&self) -> Option<&TargetId> {
        self.editing_target.as_ref()
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    pub fn glowing_scripts(&self) -> &[String] {
        &self.glowing
    }

    fn is_running_script(&self, top_block: &str, target: &TargetId) -> bool {
        self.threads.iter().any(|thread| thread.top_block == top_block && thread.target == *target)
    }

    pub fn push_thread(&mut self, top_block: impl Into<String>, target: TargetId) {
        let top_block = top_block.into();
        if self.is_running_script(&top_block, &target) {
            return;
        }
        self.threads.push(Thread { current: Some(top_block.clone()), top_block, target });
    }

    /// Starts every top-level script whose hat is `opcode`, across all targets in load order.
    pub fn start_hats(&mut self, opcode: &str) -> usize {
        let mut scripts = Vec::new();
        for target in self.store.iter() {
            for top in target.blocks.top_blocks_with_opcode(opcode) {
                scripts.push((top.to_string(), target.id.clone()));
            }
        }
        let started = scripts.len();
        for (top_block, target) in scripts {
            self.push_thread(top_block, target);
        }
        started
    }

    /// Creates a clone of `source` appended to the store; `None` past the clone limit or for the stage.
    pub fn make_clone(&mut self, source: &TargetId) -> Option<TargetId> {
        if self.store.clone_count() >= self.max_clones {
            debug!("clone limit {} reached, skipping clone of '{source}'", self.max_clones);
            return None;
        }
        let original = self.store.get(source).filter(|target| !target.is_stage)?;
        let clone = original.make_clone(TargetId::fresh());
        let id = clone.id.clone();
        self.store.push(clone);
        Some(id)
    }

    /// Moves a target and reports it when it is the editing target.
    pub fn move_target(&mut self, target: &TargetId, x: f64, y: f64) {
        let moved = self.store.get_mut(target).map(|t| t.set_xy(x, y)).unwrap_or(false);
        if moved {
            self.report_sprite_info(target);
        }
    }

    fn report_sprite_info(&mut self, target: &TargetId) {
        if self.editing_target.as_ref() != Some(target) {
            return;
        }
        let Some(summary) = self.store.get(target).map(|t| self.store.summary(t)) else {
            return;
        };
        self.signals.emit(RuntimeSignal::SpriteInfoReport(summary));
    }

    pub fn glow_script(&mut self, top_block: &str, on: bool) {
        let id = top_block.to_string();
        if on {
            self.signals.emit(RuntimeSignal::ScriptGlowOn { id });
        } else {
            self.signals.emit(RuntimeSignal::ScriptGlowOff { id });
        }
    }

    pub fn glow_block(&mut self, block: &str, on: bool) {
        let id = block.to_string();
        if on {
            self.signals.emit(RuntimeSignal::BlockGlowOn { id });
        } else {
            self.signals.emit(RuntimeSignal::BlockGlowOff { id });
        }
    }

    pub fn visual_report(&mut self, block: &str, value: Value) {
        self.signals.emit(RuntimeSignal::VisualReport { id: block.to_string(), value });
    }

    fn update_glows(&mut self) {
        let mut wanted: Vec<String> = Vec::new();
        if let Some(editing) = self.editing_target.as_ref() {
            for thread in self.threads.iter().filter(|thread| thread.target == *editing) {
                if !wanted.contains(&thread.top_block) {
                    wanted.push(thread.top_block.clone());
                }
            }
        }
        let stale: Vec<String> = self.glowing.iter().filter(|id| !wanted.contains(id)).cloned().collect();
        for id in stale {
            self.glowing.retain(|glowing| *glowing != id);
            self.glow_script(&id, false);
        }
        for id in wanted {
            if !self.glowing.contains(&id) {
                self.glow_script(&id, true);
                self.glowing.push(id);
            }
        }
    }
}

impl ScriptHost for Runtime {
    fn toggle_script(&mut self, top_block_id: &str) {
        let before = self.threads.len();
        self.threads.retain(|thread| thread.top_block != top_block_id);
        if self.threads.len() != before {
            return;
        }
        match self.editing_target.clone() {
            Some(target) => self.push_thread(top_block_id, target),
            None => debug!("stack click on '{top_block_id}' ignored without an editing target"),
        }
    }

    fn quiet_glow(&mut self, top_block_id: &str) {
        self.glowing.retain(|glowing| glowing != top_block_id);
        if let Some(editing) = self.editing_target.clone() {
            self.threads.retain(|thread| thread.top_block != top_block_id || thread.target != editing);
        }
    }
}

impl Engine for Runtime {
    fn targets(&self) -> &TargetStore {
        &self.store
    }

    fn targets_mut(&mut self) -> &mut TargetStore {
        &mut self.store
    }

    fn signals_mut(&mut self) -> &mut SignalBus {
        &mut self.signals
    }

    fn io_device_mut(&mut self, name: &str) -> Option<&mut dyn IoDevice> {
        self.io.get_mut(name)
    }

    fn dispose_all(&mut self) {
        self.threads.clear();
        self.glowing.clear();
        self.store.clear();
        self.editing_target = None;
        if let Some(clock) = self.io.device_mut::<Clock>("clock") {
            clock.reset();
        }
    }

    fn set_editing_target(&mut self, target: Option<&TargetId>) {
        self.editing_target = target.cloned();
    }

    fn stop_for_target(&mut self, target: &TargetId) {
        self.threads.retain(|thread| thread.target != *target);
    }

    fn dispose_target(&mut self, target: &TargetId) {
        self.stop_for_target(target);
        if self.store.remove(target).is_none() {
            return;
        }
        self.store.prune_sprites();
        if self.editing_target.as_ref() == Some(target) {
            self.editing_target = None;
        }
    }

    fn post_sprite_info(&mut self, target: &TargetId, info: &SpriteInfo) {
        let moved = self.store.get_mut(target).map(|t| info.apply_to(t)).unwrap_or(false);
        if moved {
            self.report_sprite_info(target);
        }
    }

    fn start(&mut self) {
        self.started = true;
    }

    /// Glow diff, run-state transition, then advance every thread one block.
    fn step(&mut self) {
        if !self.started {
            return;
        }
        self.update_glows();

        let running = !self.threads.is_empty();
        if running && !self.was_running {
            self.signals.emit(RuntimeSignal::ProjectRunStart);
        } else if !running && self.was_running {
            self.signals.emit(RuntimeSignal::ProjectRunStop);
        }
        self.was_running = running;

        let store = &self.store;
        for thread in self.threads.iter_mut() {
            let next = thread.current.as_deref().and_then(|current| {
                store.get(&thread.target).and_then(|target| target.blocks.next_of(current))
            });
            thread.current = next.map(str::to_string);
        }
        self.threads.retain(|thread| thread.current.is_some());
    }

    fn green_flag(&mut self) {
        self.stop_all();
        if let Some(clock) = self.io.device_mut::<Clock>("clock") {
            clock.reset();
        }
        let started = self.start_hats(GREEN_FLAG_OPCODE);
        info!("green flag started {started} script(s)");
    }

    fn stop_all(&mut self) {
        let clones: Vec<TargetId> =
            self.store.iter().filter(|target| target.is_clone()).map(|target| target.id.clone()).collect();
        for clone in &clones {
            self.dispose_target(clone);
        }
        self.threads.clear();
    }

    fn set_turbo_mode(&mut self, enabled: bool) {
        self.turbo_mode = enabled;
    }

    fn set_compatibility_mode(&mut self, enabled: bool) {
        self.step_mode = if enabled { StepMode::Compatibility } else { StepMode::Normal };
    }

    fn threads_for(&self, target: &TargetId) -> Vec<ThreadSummary> {
        self.threads
            .iter()
            .filter(|thread| thread.target == *target)
            .map(|thread| ThreadSummary { top_block: thread.top_block.clone(), current_block: thread.current.clone() })
            .collect()
    }
}
