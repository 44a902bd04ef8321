use crate::blocks::Blocks;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(String);

impl TargetId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn fresh() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TargetId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TargetId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpriteId(pub(crate) u32);

pub type DrawableId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RotationStyle {
    #[default]
    #[serde(rename = "all around")]
    AllAround,
    #[serde(rename = "left-right")]
    LeftRight,
    #[serde(rename = "don't rotate")]
    DontRotate,
}

impl RotationStyle {
    pub fn label(self) -> &'static str {
        match self {
            RotationStyle::AllAround => "all around",
            RotationStyle::LeftRight => "left-right",
            RotationStyle::DontRotate => "don't rotate",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "all around" | "normal" => Some(RotationStyle::AllAround),
            "left-right" | "leftRight" => Some(RotationStyle::LeftRight),
            "don't rotate" | "none" => Some(RotationStyle::DontRotate),
            _ => None,
        }
    }
}

const fn default_bitmap_resolution() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Costume {
    pub name: String,
    #[serde(default)]
    pub asset_id: String,
    #[serde(default)]
    pub md5ext: String,
    #[serde(default)]
    pub data_format: String,
    #[serde(default = "default_bitmap_resolution")]
    pub bitmap_resolution: u32,
    #[serde(default)]
    pub rotation_center_x: f64,
    #[serde(default)]
    pub rotation_center_y: f64,
}

impl Costume {
    pub fn new(name: impl Into<String>, md5ext: impl Into<String>) -> Self {
        let md5ext = md5ext.into();
        let (asset_id, data_format) = match md5ext.rsplit_once('.') {
            Some((stem, ext)) => (stem.to_string(), ext.to_string()),
            None => (md5ext.clone(), String::new()),
        };
        Self {
            name: name.into(),
            asset_id,
            md5ext,
            data_format,
            bitmap_resolution: default_bitmap_resolution(),
            rotation_center_x: 0.0,
            rotation_center_y: 0.0,
        }
    }

    pub fn with_rotation_center(mut self, x: f64, y: f64) -> Self {
        self.rotation_center_x = x;
        self.rotation_center_y = y;
        self
    }
}

/// Named, costume-owning definition shared by an original target and its clones.
#[derive(Debug, Clone)]
pub struct Sprite {
    pub name: String,
    pub costumes: Vec<Costume>,
    /// Every target built from this sprite, original first.
    pub clones: Vec<TargetId>,
}

impl Sprite {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), costumes: Vec::new(), clones: Vec::new() }
    }

    pub fn with_costumes(mut self, costumes: Vec<Costume>) -> Self {
        self.costumes = costumes;
        self
    }

    pub fn remove_clone(&mut self, id: &TargetId) -> bool {
        let before = self.clones.len();
        self.clones.retain(|clone| clone != id);
        before != self.clones.len()
    }
}

#[derive(Debug, Clone)]
pub struct Target {
    pub id: TargetId,
    pub sprite: Option<SpriteId>,
    pub is_stage: bool,
    pub is_original: bool,
    pub x: f64,
    pub y: f64,
    pub direction: f64,
    pub size: f64,
    pub visible: bool,
    pub draggable: bool,
    pub rotation_style: RotationStyle,
    pub current_costume: usize,
    pub dragging: bool,
    pub variables: BTreeMap<String, Value>,
    pub blocks: Blocks,
}

impl Target {
    pub fn new(id: TargetId, sprite: Option<SpriteId>) -> Self {
        Self {
            id,
            sprite,
            is_stage: false,
            is_original: true,
            x: 0.0,
            y: 0.0,
            direction: 90.0,
            size: 100.0,
            visible: true,
            draggable: false,
            rotation_style: RotationStyle::default(),
            current_costume: 0,
            dragging: false,
            variables: BTreeMap::new(),
            blocks: Blocks::default(),
        }
    }

    pub fn stage(id: TargetId, sprite: Option<SpriteId>) -> Self {
        let mut target = Self::new(id, sprite);
        target.is_stage = true;
        target
    }

    /// Only original, non-stage targets count as sprites for rename/delete.
    pub fn is_sprite(&self) -> bool {
        !self.is_stage && self.is_original
    }

    pub fn is_clone(&self) -> bool {
        !self.is_original
    }

    /// Copy of this target's runtime state under a new id, flagged as a clone.
    pub fn make_clone(&self, id: TargetId) -> Self {
        let mut clone = self.clone();
        clone.id = id;
        clone.is_original = false;
        clone.dragging = false;
        clone
    }

    pub fn set_xy(&mut self, x: f64, y: f64) -> bool {
        let moved = self.x != x || self.y != y;
        self.x = x;
        self.y = y;
        moved
    }

    pub fn set_direction(&mut self, direction: f64) {
        if !direction.is_finite() {
            return;
        }
        let wrapped = (direction + 179.0).rem_euclid(360.0) - 179.0;
        self.direction = wrapped;
    }

    pub fn start_drag(&mut self) {
        self.dragging = true;
    }

    pub fn stop_drag(&mut self) {
        self.dragging = false;
    }
}

/// Partial sprite-state patch posted by an editor's sprite info panel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpriteInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draggable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation_style: Option<RotationStyle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
}

impl SpriteInfo {
    /// Applies the patch; returns whether the position changed.
    pub fn apply_to(&self, target: &mut Target) -> bool {
        let mut moved = false;
        if self.x.is_some() || self.y.is_some() {
            let x = self.x.unwrap_or(target.x);
            let y = self.y.unwrap_or(target.y);
            moved = target.set_xy(x, y);
        }
        if let Some(direction) = self.direction {
            target.set_direction(direction);
        }
        if let Some(draggable) = self.draggable {
            target.draggable = draggable;
        }
        if let Some(style) = self.rotation_style {
            target.rotation_style = style;
        }
        if let Some(visible) = self.visible {
            target.visible = visible;
        }
        moved
    }
}

/// Serializable projection of a target used in targets-list and sprite-info payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetSummary {
    pub id: TargetId,
    pub name: String,
    pub is_stage: bool,
    pub x: f64,
    pub y: f64,
    pub direction: f64,
    pub size: f64,
    pub visible: bool,
    pub draggable: bool,
    pub rotation_style: RotationStyle,
    pub current_costume: usize,
    pub costume_count: usize,
}
