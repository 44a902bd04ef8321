use crate::target::{DrawableId, Sprite, SpriteId, Target, TargetId, TargetSummary};
use std::collections::{BTreeMap, HashMap};

/// Ordered collection of live targets plus the sprites they are built from.
///
/// Load order is preserved: by convention the first entry is the stage and the second is the first
/// sprite. Every added target gets a drawable id that stays fixed until the target is removed.
#[derive(Debug, Default)]
pub struct TargetStore {
    targets: Vec<Target>,
    sprites: BTreeMap<SpriteId, Sprite>,
    drawables: HashMap<DrawableId, TargetId>,
    drawable_of: HashMap<TargetId, DrawableId>,
    next_sprite: u32,
    next_drawable: DrawableId,
}

impl TargetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.targets.clear();
        self.sprites.clear();
        self.drawables.clear();
        self.drawable_of.clear();
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Target> {
        self.targets.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Target> {
        self.targets.iter_mut()
    }

    pub fn first(&self) -> Option<&Target> {
        self.targets.first()
    }

    pub fn get_index(&self, index: usize) -> Option<&Target> {
        self.targets.get(index)
    }

    pub fn get(&self, id: &TargetId) -> Option<&Target> {
        self.targets.iter().find(|target| target.id == *id)
    }

    pub fn get_mut(&mut self, id: &TargetId) -> Option<&mut Target> {
        self.targets.iter_mut().find(|target| target.id == *id)
    }

    pub fn contains(&self, id: &TargetId) -> bool {
        self.get(id).is_some()
    }

    pub fn stage(&self) -> Option<&Target> {
        self.targets.iter().find(|target| target.is_stage)
    }

    pub fn stage_mut(&mut self) -> Option<&mut Target> {
        self.targets.iter_mut().find(|target| target.is_stage)
    }

    pub fn clone_count(&self) -> usize {
        self.targets.iter().filter(|target| target.is_clone()).count()
    }

    pub fn add_sprite(&mut self, sprite: Sprite) -> SpriteId {
        let id = SpriteId(self.next_sprite);
        self.next_sprite = self.next_sprite.wrapping_add(1);
        self.sprites.insert(id, sprite);
        id
    }

    pub fn sprite(&self, id: SpriteId) -> Option<&Sprite> {
        self.sprites.get(&id)
    }

    pub fn sprite_mut(&mut self, id: SpriteId) -> Option<&mut Sprite> {
        self.sprites.get_mut(&id)
    }

    pub fn sprite_of(&self, target: &Target) -> Option<&Sprite> {
        target.sprite.and_then(|id| self.sprites.get(&id))
    }

    /// Appends a target in load order and records it in its sprite's clone list.
    pub fn push(&mut self, target: Target) -> DrawableId {
        let drawable = self.next_drawable;
        self.next_drawable = self.next_drawable.wrapping_add(1);
        if let Some(sprite) = target.sprite.and_then(|id| self.sprites.get_mut(&id)) {
            if !sprite.clones.contains(&target.id) {
                sprite.clones.push(target.id.clone());
            }
        }
        self.drawables.insert(drawable, target.id.clone());
        self.drawable_of.insert(target.id.clone(), drawable);
        self.targets.push(target);
        drawable
    }

    /// Removes a target and unlinks it from its sprite. The sprite itself stays in the arena until
    /// [`TargetStore::prune_sprites`] finds no target referencing it.
    pub fn remove(&mut self, id: &TargetId) -> Option<Target> {
        let index = self.targets.iter().position(|target| target.id == *id)?;
        let target = self.targets.remove(index);
        if let Some(sprite) = target.sprite.and_then(|sprite| self.sprites.get_mut(&sprite)) {
            sprite.remove_clone(id);
        }
        if let Some(drawable) = self.drawable_of.remove(id) {
            self.drawables.remove(&drawable);
        }
        Some(target)
    }

    pub fn prune_sprites(&mut self) -> usize {
        let before = self.sprites.len();
        let targets = &self.targets;
        self.sprites.retain(|id, _| targets.iter().any(|target| target.sprite == Some(*id)));
        before - self.sprites.len()
    }

    pub fn drawable_id(&self, id: &TargetId) -> Option<DrawableId> {
        self.drawable_of.get(id).copied()
    }

    pub fn target_for_drawable(&self, drawable: DrawableId) -> Option<&Target> {
        self.drawables.get(&drawable).and_then(|id| self.get(id))
    }

    pub fn display_name(&self, target: &Target) -> String {
        match self.sprite_of(target) {
            Some(sprite) => sprite.name.clone(),
            None if target.is_stage => "Stage".to_string(),
            None => target.id.to_string(),
        }
    }

    pub fn summary(&self, target: &Target) -> TargetSummary {
        let costume_count = self.sprite_of(target).map(|sprite| sprite.costumes.len()).unwrap_or(0);
        TargetSummary {
            id: target.id.clone(),
            name: self.display_name(target),
            is_stage: target.is_stage,
            x: target.x,
            y: target.y,
            direction: target.direction,
            size: target.size,
            visible: target.visible,
            draggable: target.draggable,
            rotation_style: target.rotation_style,
            current_costume: target.current_costume,
            costume_count,
        }
    }
}
