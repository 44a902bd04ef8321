use log::debug;
use serde_json::Value;
use std::any::Any;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

pub const STAGE_WIDTH: f64 = 480.0;
pub const STAGE_HEIGHT: f64 = 360.0;

/// Named virtual device the host can post data to.
pub trait IoDevice {
    fn name(&self) -> &'static str;

    fn post_data(&mut self, data: &Value);

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

#[derive(Debug, Default)]
pub struct Keyboard {
    pressed: Vec<String>,
}

impl Keyboard {
    pub fn key_is_down(&self, key: &str) -> bool {
        let key = key.to_lowercase();
        self.pressed.iter().any(|pressed| *pressed == key)
    }

    pub fn pressed(&self) -> &[String] {
        &self.pressed
    }

    fn key_name(data: &Value) -> Option<String> {
        if let Some(key) = data.get("key").and_then(Value::as_str) {
            return Some(match key {
                " " => "space".to_string(),
                "ArrowLeft" => "left arrow".to_string(),
                "ArrowUp" => "up arrow".to_string(),
                "ArrowRight" => "right arrow".to_string(),
                "ArrowDown" => "down arrow".to_string(),
                other => other.to_lowercase(),
            });
        }
        let code = data.get("keyCode").and_then(Value::as_u64)?;
        let name = match code {
            32 => "space".to_string(),
            37 => "left arrow".to_string(),
            38 => "up arrow".to_string(),
            39 => "right arrow".to_string(),
            40 => "down arrow".to_string(),
            other => char::from_u32(u32::try_from(other).ok()?)?.to_lowercase().to_string(),
        };
        Some(name)
    }
}

impl IoDevice for Keyboard {
    fn name(&self) -> &'static str {
        "keyboard"
    }

    fn post_data(&mut self, data: &Value) {
        let Some(key) = Self::key_name(data) else {
            debug!("keyboard data without key ignored: {data}");
            return;
        };
        let is_down = data.get("isDown").and_then(Value::as_bool).unwrap_or(false);
        let index = self.pressed.iter().position(|pressed| *pressed == key);
        match (is_down, index) {
            (true, None) => self.pressed.push(key),
            (false, Some(index)) => {
                self.pressed.remove(index);
            }
            _ => {}
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Mouse position in stage coordinates (origin at the centre, y up).
#[derive(Debug, Default)]
pub struct Mouse {
    x: f64,
    y: f64,
    is_down: bool,
}

impl Mouse {
    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn is_down(&self) -> bool {
        self.is_down
    }
}

impl IoDevice for Mouse {
    fn name(&self) -> &'static str {
        "mouse"
    }

    fn post_data(&mut self, data: &Value) {
        let number = |key: &str| data.get(key).and_then(Value::as_f64);
        let width = number("canvasWidth").filter(|w| *w > 0.0).unwrap_or(STAGE_WIDTH);
        let height = number("canvasHeight").filter(|h| *h > 0.0).unwrap_or(STAGE_HEIGHT);
        if let Some(x) = number("x") {
            let half = STAGE_WIDTH / 2.0;
            self.x = (STAGE_WIDTH * (x / width - 0.5)).round().clamp(-half, half);
        }
        if let Some(y) = number("y") {
            let half = STAGE_HEIGHT / 2.0;
            self.y = (-STAGE_HEIGHT * (y / height - 0.5)).round().clamp(-half, half);
        }
        if let Some(is_down) = data.get("isDown").and_then(Value::as_bool) {
            self.is_down = is_down;
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[derive(Debug)]
pub struct Clock {
    started: Instant,
    paused_at: Option<Instant>,
    paused_total: Duration,
}

impl Default for Clock {
    fn default() -> Self {
        Self { started: Instant::now(), paused_at: None, paused_total: Duration::ZERO }
    }
}

impl Clock {
    pub fn reset(&mut self) {
        *self = Self { paused_at: self.paused_at.map(|_| Instant::now()), ..Self::default() };
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    pub fn project_timer(&self) -> f64 {
        let now = self.paused_at.unwrap_or_else(Instant::now);
        now.duration_since(self.started).saturating_sub(self.paused_total).as_secs_f64()
    }

    fn pause(&mut self) {
        if self.paused_at.is_none() {
            self.paused_at = Some(Instant::now());
        }
    }

    fn resume(&mut self) {
        if let Some(paused_at) = self.paused_at.take() {
            self.paused_total += paused_at.elapsed();
        }
    }
}

impl IoDevice for Clock {
    fn name(&self) -> &'static str {
        "clock"
    }

    fn post_data(&mut self, data: &Value) {
        match data.get("paused").and_then(Value::as_bool) {
            Some(true) => self.pause(),
            Some(false) => self.resume(),
            None => debug!("clock data without 'paused' ignored: {data}"),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Registry of devices addressed by exact name.
#[derive(Default)]
pub struct IoDevices {
    devices: BTreeMap<String, Box<dyn IoDevice>>,
}

impl IoDevices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut devices = Self::new();
        devices.register(Box::new(Clock::default()));
        devices.register(Box::new(Keyboard::default()));
        devices.register(Box::new(Mouse::default()));
        devices
    }

    pub fn register(&mut self, device: Box<dyn IoDevice>) {
        self.devices.insert(device.name().to_string(), device);
    }

    pub fn get(&self, name: &str) -> Option<&dyn IoDevice> {
        self.devices.get(name).map(|device| device.as_ref())
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut dyn IoDevice> {
        match self.devices.get_mut(name) {
            Some(device) => Some(device.as_mut()),
            None => None,
        }
    }

    pub fn device<T: 'static>(&self, name: &str) -> Option<&T> {
        self.get(name).and_then(|device| device.as_any().downcast_ref::<T>())
    }

    pub fn device_mut<T: 'static>(&mut self, name: &str) -> Option<&mut T> {
        self.devices.get_mut(name).and_then(|device| device.as_any_mut().downcast_mut::<T>())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.devices.keys().map(String::as_str)
    }
}
