use super::{ProjectFormat, ProjectTarget, Serializer};
use crate::blocks::Blocks;
use crate::config::SerializationConfig;
use crate::error::{VmError, VmResult};
use crate::store::TargetStore;
use crate::target::{Costume, RotationStyle, Sprite, Target, TargetId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

const fn default_size() -> f64 {
    100.0
}

const fn default_direction() -> f64 {
    90.0
}

const fn default_visible() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TargetRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<TargetId>,
    name: String,
    #[serde(default)]
    is_stage: bool,
    #[serde(default)]
    x: f64,
    #[serde(default)]
    y: f64,
    #[serde(default = "default_size")]
    size: f64,
    #[serde(default = "default_direction")]
    direction: f64,
    #[serde(default = "default_visible")]
    visible: bool,
    #[serde(default)]
    draggable: bool,
    #[serde(default)]
    rotation_style: RotationStyle,
    #[serde(default)]
    current_costume: usize,
    #[serde(default)]
    costumes: Vec<Costume>,
    #[serde(default)]
    variables: BTreeMap<String, Value>,
    #[serde(default)]
    blocks: Blocks,
}

#[derive(Debug, Serialize, Deserialize)]
struct MetaRecord {
    semver: String,
    #[serde(default)]
    vm: String,
    #[serde(default)]
    agent: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ProjectRecord {
    #[serde(default)]
    targets: Vec<TargetRecord>,
    meta: MetaRecord,
}

impl TargetRecord {
    fn into_project_target(self) -> ProjectTarget {
        let id = self.id.unwrap_or_else(TargetId::fresh);
        let mut target = if self.is_stage { Target::stage(id, None) } else { Target::new(id, None) };
        target.x = self.x;
        target.y = self.y;
        target.size = self.size;
        target.set_direction(self.direction);
        target.visible = self.visible;
        target.draggable = self.draggable;
        target.rotation_style = self.rotation_style;
        target.current_costume = self.current_costume.min(self.costumes.len().saturating_sub(1));
        target.variables = self.variables;
        target.blocks = self.blocks;
        ProjectTarget { sprite: Sprite::new(self.name).with_costumes(self.costumes), target }
    }

    fn from_store(store: &TargetStore, target: &Target) -> Self {
        Self {
            id: Some(target.id.clone()),
            name: store.display_name(target),
            is_stage: target.is_stage,
            x: target.x,
            y: target.y,
            size: target.size,
            direction: target.direction,
            visible: target.visible,
            draggable: target.draggable,
            rotation_style: target.rotation_style,
            current_costume: target.current_costume,
            costumes: store.sprite_of(target).map(|sprite| sprite.costumes.clone()).unwrap_or_default(),
            variables: target.variables.clone(),
            blocks: target.blocks.clone(),
        }
    }
}

/// Current project format: reads and writes the flat `targets` + `meta` document.
#[derive(Debug, Clone)]
pub struct Sb3 {
    semver: String,
    agent: String,
}

impl Default for Sb3 {
    fn default() -> Self {
        Self::with_config(&SerializationConfig::default())
    }
}

impl Sb3 {
    pub fn with_config(config: &SerializationConfig) -> Self {
        Self { semver: config.semver.clone(), agent: config.agent.clone() }
    }
}

impl Serializer for Sb3 {
    fn format(&self) -> ProjectFormat {
        ProjectFormat::Current
    }

    fn deserialize(&self, project: &Value) -> VmResult<Vec<ProjectTarget>> {
        let record = ProjectRecord::deserialize(project)
            .map_err(|err| VmError::malformed(format!("current-format project: {err}")))?;
        if record.targets.iter().filter(|target| target.is_stage).count() > 1 {
            return Err(VmError::malformed("targets: more than one stage"));
        }
        let mut seen = BTreeSet::new();
        let mut ids = record.targets.iter().filter_map(|target| target.id.as_ref());
        if let Some(id) = ids.find(|id| !seen.insert(*id)) {
            return Err(VmError::malformed(format!("targets: duplicate id '{id}'")));
        }
        Ok(record.targets.into_iter().map(TargetRecord::into_project_target).collect())
    }

    fn serialize(&self, store: &TargetStore) -> VmResult<Value> {
        let targets = store
            .iter()
            .filter(|target| target.is_original)
            .map(|target| TargetRecord::from_store(store, target))
            .collect();
        let record = ProjectRecord {
            targets,
            meta: MetaRecord {
                semver: self.semver.clone(),
                vm: env!("CARGO_PKG_VERSION").to_string(),
                agent: self.agent.clone(),
            },
        };
        Ok(serde_json::to_value(record)?)
    }
}
