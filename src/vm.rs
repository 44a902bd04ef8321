use crate::blocks::{BlockEvent, Blocks};
use crate::config::{SerializationConfig, VmConfig};
use crate::engine::Engine;
use crate::error::{VmError, VmResult};
use crate::events::{
    Observer, ObserverHubHandle, PlaygroundData, SubscriptionId, TargetsUpdate, VmEvent, WorkspaceUpdate,
};
use crate::runtime::Runtime;
use crate::serialization::{self, ProjectFormat, Sb2, Sb3, Serializer};
use crate::signals::{RuntimeSignal, SignalKind};
use crate::target::{Costume, DrawableId, SpriteId, SpriteInfo, Target, TargetId};
use log::{debug, error, info};
use serde_json::Value;
use std::borrow::Cow;

/// Result of [`VirtualMachine::load_project`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded { format: ProjectFormat, editing_target: Option<TargetId> },
    /// The input was neither a JSON string nor an object; the session was cleared and left empty.
    Ignored,
}

/// Coordinator between the execution engine, the project serializers and the editing surface.
///
/// Owns exactly one engine and remembers the editing target by id. The id is resolved against the
/// engine's target store on every use, so a disposed editing target reads back as `None` rather
/// than as a stale object. Engine signals are relayed to observers synchronously, in emission order,
/// interleaved with the updates this type publishes itself.
pub struct VirtualMachine<E: Engine = Runtime> {
    engine: E,
    editing_target: Option<TargetId>,
    flyout_blocks: Blocks,
    observers: ObserverHubHandle,
    serialization: SerializationConfig,
}

impl Default for VirtualMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualMachine {
    pub fn new() -> Self {
        Self::with_config(&VmConfig::default())
    }

    pub fn with_config(config: &VmConfig) -> Self {
        let mut vm = Self::with_engine(Runtime::with_config(&config.runtime));
        vm.serialization = config.serialization.clone();
        vm
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Accepts either a JSON document or a string holding one.
fn parse_document(input: &Value) -> VmResult<Option<Cow<'_, Value>>> {
    match input {
        Value::String(text) => Ok(Some(Cow::Owned(serde_json::from_str(text)?))),
        Value::Object(_) => Ok(Some(Cow::Borrowed(input))),
        _ => Ok(None),
    }
}

impl<E: Engine> VirtualMachine<E> {
    /// Wraps an engine and subscribes one relay handler per signal kind on its bus.
    pub fn with_engine(mut engine: E) -> Self {
        let observers = ObserverHubHandle::new();
        for kind in SignalKind::ALL {
            let hub = observers.clone();
            let relay = move |signal: &RuntimeSignal| hub.publish(VmEvent::Runtime(signal.clone()));
            engine.signals_mut().subscribe(kind, Box::new(relay));
        }
        Self {
            engine,
            editing_target: None,
            flyout_blocks: Blocks::new(),
            observers,
            serialization: SerializationConfig::default(),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn subscribe(&self, observer: Box<dyn Observer>) -> SubscriptionId {
        self.observers.subscribe(observer)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    /// Editing target, if one is set and still live.
    pub fn editing_target(&self) -> Option<&Target> {
        self.editing_target.as_ref().and_then(|id| self.engine.targets().get(id))
    }

    pub fn editing_target_id(&self) -> Option<&TargetId> {
        self.editing_target().map(|target| &target.id)
    }

    pub fn flyout_blocks(&self) -> &Blocks {
        &self.flyout_blocks
    }

    /// Disposes every target and forgets the editing target. Publishes nothing.
    pub fn clear(&mut self) {
        self.engine.dispose_all();
        self.editing_target = None;
    }

    /// Replaces the session with `project`, a JSON object or a string holding one.
    ///
    /// The format is chosen by the presence of `meta.semver`. On success the second target in load
    /// order (the first sprite) becomes the editing target, falling back to the only target.
    pub fn load_project(&mut self, project: &Value) -> VmResult<LoadOutcome> {
        self.clear();
        let Some(document) = parse_document(project)? else {
            error!("Ignoring project load: expected a JSON object or string, got {}", json_kind(project));
            return Ok(LoadOutcome::Ignored);
        };
        let (format, targets) = serialization::deserialize(&document)?;
        let ids = serialization::install(self.engine.targets_mut(), targets);
        let editing_target = ids.get(1).or_else(|| ids.first()).cloned();
        info!("Loaded {format} project with {} target(s)", ids.len());

        self.editing_target = editing_target.clone();
        self.emit_targets_update();
        self.emit_workspace_update();
        self.engine.set_editing_target(editing_target.as_ref());
        Ok(LoadOutcome::Loaded { format, editing_target })
    }

    pub fn load_project_str(&mut self, project: &str) -> VmResult<LoadOutcome> {
        self.load_project(&Value::String(project.to_owned()))
    }

    /// Current-format document of all original targets. Clones are never written.
    pub fn save(&self) -> VmResult<Value> {
        Sb3::with_config(&self.serialization).serialize(self.engine.targets())
    }

    pub fn save_to_string(&self) -> VmResult<String> {
        let project = self.save()?;
        let text = if self.serialization.pretty {
            serde_json::to_string_pretty(&project)?
        } else {
            serde_json::to_string(&project)?
        };
        Ok(text)
    }

    /// Adds a sprite exported in the legacy format without clearing the session, and edits it.
    pub fn add_sprite2(&mut self, sprite: &Value) -> VmResult<TargetId> {
        let Some(document) = parse_document(sprite)? else {
            return Err(VmError::malformed(format!("sprite: expected an object, got {}", json_kind(sprite))));
        };
        let target = Sb2.deserialize_sprite(&document)?;
        debug!("Adding sprite '{}'", target.name());
        let ids = serialization::install(self.engine.targets_mut(), vec![target]);
        let id = ids.into_iter().next().ok_or_else(|| VmError::malformed("sprite: nothing to add"))?;

        self.editing_target = Some(id.clone());
        self.emit_targets_update();
        self.emit_workspace_update();
        self.engine.set_editing_target(Some(&id));
        Ok(id)
    }

    /// Switches the editing target. Returns `false` without publishing anything when `id` already is
    /// the editing target or names no live target.
    pub fn set_editing_target(&mut self, id: &TargetId) -> bool {
        if self.editing_target.as_ref() == Some(id) {
            return false;
        }
        if !self.engine.targets().contains(id) {
            debug!("Ignoring editing target switch to unknown target '{id}'");
            return false;
        }
        self.editing_target = Some(id.clone());
        self.emit_targets_update();
        self.emit_workspace_update();
        self.engine.set_editing_target(Some(id));
        true
    }

    pub fn emit_targets_update(&self) {
        let store = self.engine.targets();
        let target_list =
            store.iter().filter(|target| target.is_original).map(|target| store.summary(target)).collect();
        let editing_target = self.editing_target_id().cloned();
        self.observers.publish(VmEvent::TargetsUpdate(TargetsUpdate { target_list, editing_target }));
    }

    pub fn emit_workspace_update(&self) {
        match self.editing_target() {
            Some(target) => {
                let structured_blocks = target.blocks.to_value();
                self.observers.publish(VmEvent::WorkspaceUpdate(WorkspaceUpdate { structured_blocks }));
            }
            None => debug!("Skipping workspace update without an editing target"),
        }
    }

    /// Target rendered by `drawable`; the stage is never reported.
    pub fn target_id_for_drawable_id(&self, drawable: DrawableId) -> Option<TargetId> {
        let target = self.engine.targets().target_for_drawable(drawable)?;
        (!target.is_stage).then(|| target.id.clone())
    }

    /// Appends a costume to the editing target's sprite and wears it.
    pub fn add_costume(&mut self, costume: Costume) -> VmResult<()> {
        let target = self.editing_target().ok_or(VmError::NoEditingTarget)?;
        let (id, sprite) = (target.id.clone(), target.sprite);
        self.append_costume(&id, sprite, costume)
    }

    /// Appends a backdrop to the stage, whichever target is being edited.
    pub fn add_backdrop(&mut self, backdrop: Costume) -> VmResult<()> {
        let stage = self.engine.targets().stage().ok_or(VmError::NoStage)?;
        let (id, sprite) = (stage.id.clone(), stage.sprite);
        self.append_costume(&id, sprite, backdrop)
    }

    fn append_costume(&mut self, id: &TargetId, sprite: Option<SpriteId>, costume: Costume) -> VmResult<()> {
        let store = self.engine.targets_mut();
        let sprite = match sprite {
            Some(sprite) => store.sprite_mut(sprite),
            None => None,
        };
        let sprite = sprite.ok_or_else(|| VmError::SpriteMissing(id.clone()))?;
        debug!("Adding costume '{}' to '{}'", costume.name, sprite.name);
        sprite.costumes.push(costume);
        let last = sprite.costumes.len() - 1;
        if let Some(target) = store.get_mut(id) {
            target.current_costume = last;
        }
        Ok(())
    }

    fn sprite_for(&self, id: &TargetId) -> VmResult<SpriteId> {
        let target = self.engine.targets().get(id).ok_or_else(|| VmError::TargetNotFound(id.clone()))?;
        if !target.is_sprite() {
            return Err(VmError::NotASprite(id.clone()));
        }
        let sprite = target.sprite.ok_or_else(|| VmError::SpriteMissing(id.clone()))?;
        match self.engine.targets().sprite(sprite) {
            Some(_) => Ok(sprite),
            None => Err(VmError::SpriteMissing(id.clone())),
        }
    }

    /// Renames the sprite behind `id`. Names are not required to be unique.
    pub fn rename_sprite(&mut self, id: &TargetId, name: impl Into<String>) -> VmResult<()> {
        let sprite_id = self.sprite_for(id)?;
        let sprite =
            self.engine.targets_mut().sprite_mut(sprite_id).ok_or_else(|| VmError::SpriteMissing(id.clone()))?;
        let name = name.into();
        debug!("Renaming sprite '{}' to '{name}'", sprite.name);
        sprite.name = name;
        self.emit_targets_update();
        Ok(())
    }

    /// Deletes the sprite behind `id` together with every target built from it.
    ///
    /// If one of the disposed targets was the editing target when the call started, editing moves to
    /// the first remaining target as soon as that target is gone.
    pub fn delete_sprite(&mut self, id: &TargetId) -> VmResult<()> {
        let sprite_id = self.sprite_for(id)?;
        let clones =
            self.engine.targets().sprite(sprite_id).map(|sprite| sprite.clones.clone()).unwrap_or_default();
        let editing = self.editing_target.clone();
        info!("Deleting sprite behind '{id}' ({} target(s))", clones.len());

        for clone in &clones {
            self.engine.stop_for_target(clone);
            self.engine.dispose_target(clone);
            if editing.as_ref() != Some(clone) {
                continue;
            }
            match self.engine.targets().first().map(|target| target.id.clone()) {
                Some(first) => {
                    self.set_editing_target(&first);
                }
                None => {
                    self.editing_target = None;
                    self.engine.set_editing_target(None);
                }
            }
        }
        self.emit_targets_update();
        Ok(())
    }

    /// Marks `id` as dragged and makes it the editing target. `false` for unknown targets.
    pub fn start_drag(&mut self, id: &TargetId) -> bool {
        match self.engine.targets_mut().get_mut(id) {
            Some(target) => target.start_drag(),
            None => return false,
        }
        self.set_editing_target(id);
        true
    }

    pub fn stop_drag(&mut self, id: &TargetId) -> bool {
        match self.engine.targets_mut().get_mut(id) {
            Some(target) => {
                target.stop_drag();
                true
            }
            None => false,
        }
    }

    /// Forwards `data` to the IO device registered under exactly `device`.
    pub fn post_io_data(&mut self, device: &str, data: &Value) {
        match self.engine.io_device_mut(device) {
            Some(io) => io.post_data(data),
            None => debug!("Dropping IO data for unknown device '{device}'"),
        }
    }

    /// Applies an edit from the workspace to the editing target's blocks.
    pub fn block_listener(&mut self, event: &BlockEvent) {
        let Some(id) = self.editing_target_id().cloned() else {
            debug!("Dropping block event without an editing target");
            return;
        };
        let Some(target) = self.engine.targets_mut().get_mut(&id) else {
            return;
        };
        let mut blocks = std::mem::take(&mut target.blocks);
        blocks.listen(event, &mut self.engine);
        if let Some(target) = self.engine.targets_mut().get_mut(&id) {
            target.blocks = blocks;
        }
    }

    /// Applies an edit from the palette to the shared flyout blocks.
    pub fn flyout_block_listener(&mut self, event: &BlockEvent) {
        self.flyout_blocks.listen(event, &mut self.engine);
    }

    pub fn start(&mut self) {
        self.engine.start();
    }

    pub fn step(&mut self) {
        self.engine.step();
    }

    pub fn green_flag(&mut self) {
        self.engine.green_flag();
    }

    pub fn stop_all(&mut self) {
        self.engine.stop_all();
    }

    pub fn set_turbo_mode(&mut self, enabled: bool) {
        self.engine.set_turbo_mode(enabled);
    }

    pub fn set_compatibility_mode(&mut self, enabled: bool) {
        self.engine.set_compatibility_mode(enabled);
    }

    /// Patches the editing target from the sprite info panel.
    pub fn post_sprite_info(&mut self, info: &SpriteInfo) {
        match self.editing_target_id().cloned() {
            Some(id) => self.engine.post_sprite_info(&id, info),
            None => debug!("Dropping sprite info without an editing target"),
        }
    }

    /// Publishes the editing target's blocks and running threads for debugging surfaces.
    pub fn playground_data(&self) {
        let Some(target) = self.editing_target() else {
            debug!("Skipping playground data without an editing target");
            return;
        };
        let threads = self.engine.threads_for(&target.id);
        let data = PlaygroundData { blocks: target.blocks.to_value(), threads };
        self.observers.publish(VmEvent::PlaygroundData(data));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventLog;
    use serde_json::json;

    fn project() -> Value {
        json!({
            "targets": [
                {"id": "stage", "name": "Stage", "isStage": true},
                {"id": "cat", "name": "Cat"},
                {"id": "dog", "name": "Dog"}
            ],
            "meta": {"semver": "3.0.0"}
        })
    }

    #[test]
    fn load_selects_first_sprite_and_publishes_in_order() {
        let mut vm = VirtualMachine::new();
        let log = EventLog::new();
        vm.subscribe(log.observer());
        let outcome = vm.load_project(&project()).expect("load");
        assert_eq!(
            outcome,
            LoadOutcome::Loaded { format: ProjectFormat::Current, editing_target: Some(TargetId::new("cat")) }
        );
        assert_eq!(log.names(), vec!["targetsUpdate", "workspaceUpdate"]);
        assert_eq!(vm.engine().editing_target(), Some(&TargetId::new("cat")));
    }

    #[test]
    fn non_document_input_is_ignored_after_clearing() {
        let mut vm = VirtualMachine::new();
        vm.load_project(&project()).expect("load");
        assert_eq!(vm.load_project(&json!(17)).expect("ignored"), LoadOutcome::Ignored);
        assert!(vm.engine().targets().is_empty());
        assert!(vm.editing_target().is_none());
        assert!(matches!(vm.load_project(&json!("{not json")), Err(VmError::Json(_))));
    }

    #[test]
    fn switching_to_current_or_unknown_target_is_silent() {
        let mut vm = VirtualMachine::new();
        vm.load_project(&project()).expect("load");
        let log = EventLog::new();
        vm.subscribe(log.observer());
        assert!(!vm.set_editing_target(&TargetId::new("cat")));
        assert!(!vm.set_editing_target(&TargetId::new("ghost")));
        assert!(log.names().is_empty());
        assert!(vm.set_editing_target(&TargetId::new("dog")));
        assert_eq!(log.names(), vec!["targetsUpdate", "workspaceUpdate"]);
    }

    #[test]
    fn rename_rejects_stage_and_clones() {
        let mut vm = VirtualMachine::new();
        vm.load_project(&project()).expect("load");
        assert!(matches!(vm.rename_sprite(&TargetId::new("stage"), "x"), Err(VmError::NotASprite(_))));
        let clone = vm.engine_mut().make_clone(&TargetId::new("cat")).expect("clone");
        assert!(matches!(vm.rename_sprite(&clone, "x"), Err(VmError::NotASprite(_))));
        assert!(matches!(vm.rename_sprite(&TargetId::new("nope"), "x"), Err(VmError::TargetNotFound(_))));
        vm.rename_sprite(&TargetId::new("cat"), "Dog").expect("rename");
        let store = vm.engine().targets();
        let names: Vec<String> = store.iter().filter(|t| t.is_original).map(|t| store.display_name(t)).collect();
        assert_eq!(names, vec!["Stage", "Dog", "Dog"]);
    }

    #[test]
    fn costumes_go_to_editing_sprite_and_backdrops_to_stage() {
        let mut vm = VirtualMachine::new();
        assert!(matches!(vm.add_costume(Costume::new("a", "a.png")), Err(VmError::NoEditingTarget)));
        assert!(matches!(vm.add_backdrop(Costume::new("b", "b.png")), Err(VmError::NoStage)));
        vm.load_project(&project()).expect("load");
        vm.add_costume(Costume::new("a", "a.png")).expect("costume");
        vm.add_backdrop(Costume::new("b", "b.png")).expect("backdrop");
        let store = vm.engine().targets();
        let cat = store.get(&TargetId::new("cat")).expect("cat");
        assert_eq!(store.sprite_of(cat).map(|s| s.costumes.len()), Some(1));
        let stage = store.stage().expect("stage");
        assert_eq!(store.sprite_of(stage).map(|s| s.costumes[0].name.clone()), Some("b".to_string()));
    }

    #[test]
    fn drawable_lookup_skips_stage() {
        let mut vm = VirtualMachine::new();
        vm.load_project(&project()).expect("load");
        let store = vm.engine().targets();
        let stage = store.drawable_id(&TargetId::new("stage")).expect("stage drawable");
        let dog = store.drawable_id(&TargetId::new("dog")).expect("dog drawable");
        assert_eq!(vm.target_id_for_drawable_id(stage), None);
        assert_eq!(vm.target_id_for_drawable_id(dog), Some(TargetId::new("dog")));
        assert_eq!(vm.target_id_for_drawable_id(9999), None);
    }
}
