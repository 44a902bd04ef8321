pub mod sb2;
pub mod sb3;

use crate::error::{VmError, VmResult};
use crate::store::TargetStore;
use crate::target::{Sprite, Target, TargetId};
use serde_json::Value;
use std::fmt;

pub use sb2::Sb2;
pub use sb3::Sb3;

/// Wire format of a project document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectFormat {
    /// Object-tree layout with the stage at the root and sprites under `children`.
    Legacy,
    /// Flat `targets` list plus a `meta` block carrying `semver`.
    Current,
}

impl ProjectFormat {
    /// A document is in the current format iff it carries `meta.semver`.
    pub fn detect(project: &Value) -> Self {
        match project.get("meta").and_then(|meta| meta.get("semver")) {
            Some(_) => ProjectFormat::Current,
            None => ProjectFormat::Legacy,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ProjectFormat::Legacy => "sb2",
            ProjectFormat::Current => "sb3",
        }
    }
}

impl fmt::Display for ProjectFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One deserialized target together with the sprite definition it was built from.
#[derive(Debug, Clone)]
pub struct ProjectTarget {
    pub sprite: Sprite,
    pub target: Target,
}

impl ProjectTarget {
    pub fn name(&self) -> &str {
        &self.sprite.name
    }
}

pub trait Serializer {
    fn format(&self) -> ProjectFormat;

    /// Converts a parsed project document into targets in load order.
    fn deserialize(&self, project: &Value) -> VmResult<Vec<ProjectTarget>>;

    /// Writes the original targets of `store`.
    fn serialize(&self, _store: &TargetStore) -> VmResult<Value> {
        Err(VmError::ReadOnlyFormat(self.format().label()))
    }
}

/// Deserializes `project` with the serializer its shape selects.
pub fn deserialize(project: &Value) -> VmResult<(ProjectFormat, Vec<ProjectTarget>)> {
    let format = ProjectFormat::detect(project);
    let targets = match format {
        ProjectFormat::Legacy => Sb2.deserialize(project)?,
        ProjectFormat::Current => Sb3::default().deserialize(project)?,
    };
    Ok((format, targets))
}

/// Adds deserialized targets to `store` in order, returning their ids.
pub fn install(store: &mut TargetStore, targets: Vec<ProjectTarget>) -> Vec<TargetId> {
    let mut ids = Vec::with_capacity(targets.len());
    for ProjectTarget { sprite, mut target } in targets {
        target.sprite = Some(store.add_sprite(sprite));
        ids.push(target.id.clone());
        store.push(target);
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn semver_selects_current_format() {
        assert_eq!(ProjectFormat::detect(&json!({"meta": {"semver": "3.0.0"}, "targets": []})), ProjectFormat::Current);
        assert_eq!(ProjectFormat::detect(&json!({"meta": {}})), ProjectFormat::Legacy);
        assert_eq!(ProjectFormat::detect(&json!({"objName": "Stage"})), ProjectFormat::Legacy);
    }

    #[test]
    fn install_links_targets_to_fresh_sprites() {
        let mut store = TargetStore::new();
        let project = json!({"objName": "Stage", "children": [{"objName": "Cat"}, {"objName": "Dog"}]});
        let (format, targets) = deserialize(&project).expect("legacy project");
        assert_eq!(format, ProjectFormat::Legacy);
        let ids = install(&mut store, targets);
        assert_eq!(ids.len(), 3);
        let names: Vec<String> = store.iter().map(|target| store.display_name(target)).collect();
        assert_eq!(names, vec!["Stage", "Cat", "Dog"]);
        let cat = store.get(&ids[1]).expect("cat");
        assert_eq!(store.sprite_of(cat).map(|sprite| sprite.clones.clone()), Some(vec![ids[1].clone()]));
    }
}
