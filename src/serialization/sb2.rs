use super::{ProjectFormat, ProjectTarget, Serializer};
use crate::blocks::{Block, Blocks};
use crate::error::{VmError, VmResult};
use crate::target::{Costume, RotationStyle, Sprite, Target, TargetId};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

const fn default_resolution() -> u32 {
    1
}

const fn default_scale() -> f64 {
    1.0
}

const fn default_direction() -> f64 {
    90.0
}

const fn default_visible() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyCostume {
    costume_name: String,
    #[serde(rename = "baseLayerMD5", default)]
    base_layer_md5: String,
    #[serde(default = "default_resolution")]
    bitmap_resolution: u32,
    #[serde(default)]
    rotation_center_x: f64,
    #[serde(default)]
    rotation_center_y: f64,
}

#[derive(Debug, Deserialize)]
struct LegacyVariable {
    name: String,
    #[serde(default)]
    value: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyObject {
    obj_name: String,
    #[serde(default)]
    costumes: Vec<LegacyCostume>,
    #[serde(default)]
    current_costume_index: f64,
    #[serde(default)]
    scripts: Vec<Value>,
    #[serde(default)]
    variables: Vec<LegacyVariable>,
    #[serde(default)]
    children: Vec<Value>,
    #[serde(default)]
    scratch_x: f64,
    #[serde(default)]
    scratch_y: f64,
    #[serde(default = "default_scale")]
    scale: f64,
    #[serde(default = "default_direction")]
    direction: f64,
    #[serde(default = "default_visible")]
    visible: bool,
    #[serde(default)]
    is_draggable: bool,
    #[serde(default)]
    rotation_style: Option<String>,
}

impl LegacyCostume {
    fn into_costume(self) -> Costume {
        let mut costume = Costume::new(self.costume_name, self.base_layer_md5)
            .with_rotation_center(self.rotation_center_x, self.rotation_center_y);
        costume.bitmap_resolution = self.bitmap_resolution;
        costume
    }
}

impl LegacyObject {
    fn parse(value: &Value, context: &str) -> VmResult<Self> {
        Self::deserialize(value).map_err(|err| VmError::malformed(format!("{context}: {err}")))
    }

    fn into_project_target(self, is_stage: bool) -> VmResult<ProjectTarget> {
        let id = TargetId::fresh();
        let mut target = if is_stage { Target::stage(id, None) } else { Target::new(id, None) };
        if !is_stage {
            target.x = self.scratch_x;
            target.y = self.scratch_y;
            target.size = self.scale * 100.0;
            target.set_direction(self.direction);
            target.visible = self.visible;
            target.draggable = self.is_draggable;
            target.rotation_style =
                self.rotation_style.as_deref().and_then(RotationStyle::from_label).unwrap_or_default();
        }
        let index = self.current_costume_index;
        let index = if index.is_finite() && index > 0.0 { index as usize } else { 0 };
        target.current_costume = index.min(self.costumes.len().saturating_sub(1));
        target.variables = self
            .variables
            .into_iter()
            .map(|var| (var.name.clone(), Value::Array(vec![Value::String(var.name), var.value])))
            .collect::<BTreeMap<_, _>>();

        let mut reader = ScriptReader::default();
        for script in &self.scripts {
            reader.read_script(script)?;
        }
        target.blocks = Blocks::from_blocks(reader.blocks);

        let costumes = self.costumes.into_iter().map(LegacyCostume::into_costume).collect();
        Ok(ProjectTarget { sprite: Sprite::new(self.obj_name).with_costumes(costumes), target })
    }
}

/// Converts `[x, y, [[opcode, args...], ...]]` scripts into linked blocks.
#[derive(Default)]
struct ScriptReader {
    counter: usize,
    blocks: Vec<Block>,
}

impl ScriptReader {
    fn fresh_id(&mut self) -> String {
        self.counter += 1;
        format!("block-{}", self.counter)
    }

    fn block_mut(&mut self, id: &str) -> Option<&mut Block> {
        self.blocks.iter_mut().rev().find(|block| block.id == id)
    }

    fn read_script(&mut self, script: &Value) -> VmResult<()> {
        let parts = script
            .as_array()
            .filter(|parts| parts.len() == 3)
            .ok_or_else(|| VmError::malformed("scripts: each script must be [x, y, blocks]"))?;
        let stack = parts[2].as_array().ok_or_else(|| VmError::malformed("scripts: block list must be an array"))?;
        let x = parts[0].as_f64().unwrap_or(0.0);
        let y = parts[1].as_f64().unwrap_or(0.0);
        if let Some(top) = self.read_stack(stack, None)? {
            if let Some(block) = self.block_mut(&top) {
                block.top_level = true;
                block.x = Some(x);
                block.y = Some(y);
            }
        }
        Ok(())
    }

    fn read_stack(&mut self, stack: &[Value], parent: Option<&str>) -> VmResult<Option<String>> {
        let mut first = None;
        let mut previous: Option<String> = None;
        for entry in stack {
            let id = self.read_block(entry, previous.as_deref().or(parent))?;
            if let Some(prev) = previous.as_deref() {
                if let Some(block) = self.block_mut(prev) {
                    block.next = Some(id.clone());
                }
            }
            if first.is_none() {
                first = Some(id.clone());
            }
            previous = Some(id);
        }
        Ok(first)
    }

    fn read_block(&mut self, entry: &Value, parent: Option<&str>) -> VmResult<String> {
        let parts = entry.as_array().ok_or_else(|| VmError::malformed("scripts: block must be an array"))?;
        let opcode = parts
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| VmError::malformed("scripts: block is missing its opcode"))?;
        let id = self.fresh_id();
        let mut block = Block::new(id.clone(), opcode);
        block.parent = parent.map(str::to_string);

        let mut substacks = 0;
        for (index, arg) in parts.iter().enumerate().skip(1) {
            let name = format!("ARG{index}");
            match arg {
                Value::Array(items) if items.first().is_some_and(Value::is_string) => {
                    let reporter = self.read_block(arg, Some(id.as_str()))?;
                    block = block.with_input(name, Some(reporter));
                }
                Value::Array(items) => {
                    substacks += 1;
                    let input = if substacks == 1 { "SUBSTACK".to_string() } else { format!("SUBSTACK{substacks}") };
                    let first = self.read_stack(items, Some(id.as_str()))?;
                    block = block.with_input(input, first);
                }
                Value::Null => {}
                Value::String(text) => block = block.with_field(name, text.as_str()),
                other => block = block.with_field(name, other.to_string()),
            }
        }
        self.blocks.push(block);
        Ok(id)
    }
}

/// Legacy project format. Read-only: projects are always saved in the current format.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sb2;

impl Sb2 {
    /// Reads a single exported sprite; the object is treated as a sprite even if it looks like a stage.
    pub fn deserialize_sprite(&self, sprite: &Value) -> VmResult<ProjectTarget> {
        LegacyObject::parse(sprite, "sprite")?.into_project_target(false)
    }
}

impl Serializer for Sb2 {
    fn format(&self) -> ProjectFormat {
        ProjectFormat::Legacy
    }

    fn deserialize(&self, project: &Value) -> VmResult<Vec<ProjectTarget>> {
        let mut stage = LegacyObject::parse(project, "stage")?;
        let children = std::mem::take(&mut stage.children);
        let mut targets = vec![stage.into_project_target(true)?];
        for child in &children {
            if child.get("objName").is_none() {
                continue;
            }
            let sprite = LegacyObject::parse(child, "children")?;
            targets.push(sprite.into_project_target(false)?);
        }
        Ok(targets)
    }
}
