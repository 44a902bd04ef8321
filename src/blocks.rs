use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockInput {
    pub name: String,
    #[serde(default)]
    pub block: Option<String>,
    #[serde(default)]
    pub shadow: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockField {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub id: String,
    pub opcode: String,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub inputs: BTreeMap<String, BlockInput>,
    #[serde(default)]
    pub fields: BTreeMap<String, BlockField>,
    #[serde(default)]
    pub shadow: bool,
    #[serde(default)]
    pub top_level: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mutation: Option<Value>,
}

impl Block {
    pub fn new(id: impl Into<String>, opcode: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            opcode: opcode.into(),
            next: None,
            parent: None,
            inputs: BTreeMap::new(),
            fields: BTreeMap::new(),
            shadow: false,
            top_level: false,
            x: None,
            y: None,
            mutation: None,
        }
    }

    pub fn top_level_at(mut self, x: f64, y: f64) -> Self {
        self.top_level = true;
        self.x = Some(x);
        self.y = Some(y);
        self
    }

    pub fn with_next(mut self, next: impl Into<String>) -> Self {
        self.next = Some(next.into());
        self
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.fields.insert(name.clone(), BlockField { name, value: value.into() });
        self
    }

    pub fn with_input(mut self, name: impl Into<String>, block: Option<String>) -> Self {
        let name = name.into();
        self.inputs.insert(name.clone(), BlockInput { name, block, shadow: None });
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeElement {
    Field,
    Mutation,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
}

/// Structural edit emitted by an editing surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockEvent {
    Create {
        blocks: Vec<Block>,
    },
    Change {
        block_id: String,
        element: ChangeElement,
        #[serde(default)]
        name: Option<String>,
        new_value: Value,
    },
    Move {
        block_id: String,
        #[serde(default)]
        old_parent_id: Option<String>,
        #[serde(default)]
        old_input_name: Option<String>,
        #[serde(default)]
        new_parent_id: Option<String>,
        #[serde(default)]
        new_input_name: Option<String>,
        #[serde(default)]
        new_coordinate: Option<Coordinate>,
    },
    Delete {
        block_id: String,
    },
    StackClick {
        block_id: String,
    },
}

/// Engine hooks the block listener needs while applying edits.
pub trait ScriptHost {
    /// Starts the script under `top_block_id` on the editing target, or stops it if running.
    fn toggle_script(&mut self, top_block_id: &str);

    /// Drops a script and its glow without emitting a glow-off signal.
    fn quiet_glow(&mut self, top_block_id: &str);
}

/// Block graph of one target (or of the shared flyout).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Blocks {
    blocks: BTreeMap<String, Block>,
    scripts: Vec<String>,
}

impl Blocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_blocks(blocks: impl IntoIterator<Item = Block>) -> Self {
        let mut container = Self::new();
        for block in blocks {
            container.create_block(block);
        }
        container
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Block> {
        self.blocks.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values()
    }

    /// Ids of top-level blocks in creation order.
    pub fn scripts(&self) -> &[String] {
        &self.scripts
    }

    pub fn next_of(&self, id: &str) -> Option<&str> {
        self.blocks.get(id).and_then(|block| block.next.as_deref())
    }

    pub fn top_blocks_with_opcode<'a>(&'a self, opcode: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.scripts
            .iter()
            .filter(move |id| self.blocks.get(id.as_str()).is_some_and(|block| block.opcode == opcode))
            .map(String::as_str)
    }

    /// Map form used by workspace updates and the project format.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(&self.blocks).unwrap_or(Value::Null)
    }

    pub fn create_block(&mut self, block: Block) {
        if self.blocks.contains_key(&block.id) {
            return;
        }
        if block.top_level {
            self.scripts.push(block.id.clone());
        }
        self.blocks.insert(block.id.clone(), block);
    }

    pub fn listen(&mut self, event: &BlockEvent, host: &mut dyn ScriptHost) {
        match event {
            BlockEvent::Create { blocks } => {
                for block in blocks {
                    self.create_block(block.clone());
                }
            }
            BlockEvent::Change { block_id, element, name, new_value } => {
                self.change_block(block_id, *element, name.as_deref(), new_value);
            }
            BlockEvent::Move {
                block_id,
                old_parent_id,
                old_input_name,
                new_parent_id,
                new_input_name,
                new_coordinate,
            } => {
                self.move_block(
                    block_id,
                    old_parent_id.as_deref(),
                    old_input_name.as_deref(),
                    new_parent_id.as_deref(),
                    new_input_name.as_deref(),
                    *new_coordinate,
                );
            }
            BlockEvent::Delete { block_id } => {
                if self.blocks.get(block_id).is_some_and(|block| block.top_level) {
                    host.quiet_glow(block_id);
                }
                self.delete_block(block_id);
            }
            BlockEvent::StackClick { block_id } => host.toggle_script(block_id),
        }
    }

    fn change_block(&mut self, id: &str, element: ChangeElement, name: Option<&str>, value: &Value) {
        let Some(block) = self.blocks.get_mut(id) else {
            debug!("change for unknown block '{id}' ignored");
            return;
        };
        match element {
            ChangeElement::Field => {
                let Some(name) = name else {
                    return;
                };
                let value = match value {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                };
                block
                    .fields
                    .entry(name.to_string())
                    .and_modify(|field| field.value = value.clone())
                    .or_insert_with(|| BlockField { name: name.to_string(), value });
            }
            ChangeElement::Mutation => {
                block.mutation = Some(value.clone());
            }
        }
    }

    fn move_block(
        &mut self,
        id: &str,
        old_parent: Option<&str>,
        old_input: Option<&str>,
        new_parent: Option<&str>,
        new_input: Option<&str>,
        coordinate: Option<Coordinate>,
    ) {
        if !self.blocks.contains_key(id) {
            debug!("move for unknown block '{id}' ignored");
            return;
        }
        if let Some(old_parent) = old_parent.and_then(|parent| self.blocks.get_mut(parent)) {
            match old_input.and_then(|input| old_parent.inputs.get_mut(input)) {
                Some(input) => input.block = None,
                None => {
                    if old_parent.next.as_deref() == Some(id) {
                        old_parent.next = None;
                    }
                }
            }
        }

        let attached = match new_parent {
            Some(parent_id) => match self.blocks.get_mut(parent_id) {
                Some(parent) => {
                    match new_input {
                        Some(input) => {
                            parent
                                .inputs
                                .entry(input.to_string())
                                .or_insert_with(|| BlockInput {
                                    name: input.to_string(),
                                    block: None,
                                    shadow: None,
                                })
                                .block = Some(id.to_string());
                        }
                        None => parent.next = Some(id.to_string()),
                    }
                    true
                }
                None => false,
            },
            None => false,
        };

        if let Some(block) = self.blocks.get_mut(id) {
            if let Some(coordinate) = coordinate {
                block.x = Some(coordinate.x);
                block.y = Some(coordinate.y);
            }
            if attached {
                block.parent = new_parent.map(str::to_string);
                block.top_level = false;
            } else {
                block.parent = None;
                block.top_level = true;
            }
        }

        if attached {
            self.scripts.retain(|script| script != id);
        } else if !self.scripts.iter().any(|script| script == id) {
            self.scripts.push(id.to_string());
        }
    }

    fn delete_block(&mut self, id: &str) {
        let Some(block) = self.blocks.remove(id) else {
            return;
        };
        if let Some(parent) = block.parent.as_deref().and_then(|parent| self.blocks.get_mut(parent)) {
            if parent.next.as_deref() == Some(id) {
                parent.next = None;
            }
            for input in parent.inputs.values_mut() {
                if input.block.as_deref() == Some(id) {
                    input.block = None;
                }
            }
        }
        for input in block.inputs.values() {
            if let Some(child) = input.block.as_deref() {
                self.delete_block(child);
            }
            if let Some(shadow) = input.shadow.as_deref() {
                if input.block.as_deref() != Some(shadow) {
                    self.delete_block(shadow);
                }
            }
        }
        if let Some(next) = block.next.as_deref() {
            self.delete_block(next);
        }
        self.scripts.retain(|script| script != id);
    }
}

impl Serialize for Blocks {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.blocks.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Blocks {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = BTreeMap::<String, Block>::deserialize(deserializer)?;
        Ok(Self::from_blocks(map.into_values()))
    }
}
