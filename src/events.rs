use crate::engine::ThreadSummary;
use crate::signals::RuntimeSignal;
use crate::target::{TargetId, TargetSummary};
use serde::Serialize;
use serde_json::Value;
use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetsUpdate {
    pub target_list: Vec<TargetSummary>,
    pub editing_target: Option<TargetId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceUpdate {
    pub structured_blocks: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaygroundData {
    pub blocks: Value,
    pub threads: Vec<ThreadSummary>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VmEvent {
    TargetsUpdate(TargetsUpdate),
    WorkspaceUpdate(WorkspaceUpdate),
    PlaygroundData(PlaygroundData),
    /// Engine signal relayed unchanged.
    Runtime(RuntimeSignal),
}

impl VmEvent {
    pub fn name(&self) -> &'static str {
        match self {
            VmEvent::TargetsUpdate(_) => "targetsUpdate",
            VmEvent::WorkspaceUpdate(_) => "workspaceUpdate",
            VmEvent::PlaygroundData(_) => "playgroundData",
            VmEvent::Runtime(signal) => signal.name(),
        }
    }

    pub fn payload(&self) -> Value {
        let value = match self {
            VmEvent::TargetsUpdate(update) => serde_json::to_value(update),
            VmEvent::WorkspaceUpdate(update) => serde_json::to_value(update),
            VmEvent::PlaygroundData(data) => serde_json::to_value(data),
            VmEvent::Runtime(signal) => return signal.payload(),
        };
        value.unwrap_or(Value::Null)
    }
}

impl fmt::Display for VmEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmEvent::TargetsUpdate(update) => {
                let editing = update.editing_target.as_ref().map(TargetId::as_str).unwrap_or("-");
                write!(f, "targetsUpdate targets={} editing={}", update.target_list.len(), editing)
            }
            VmEvent::WorkspaceUpdate(update) => {
                let blocks = update.structured_blocks.as_object().map(|map| map.len()).unwrap_or(0);
                write!(f, "workspaceUpdate blocks={blocks}")
            }
            VmEvent::PlaygroundData(data) => write!(f, "playgroundData threads={}", data.threads.len()),
            VmEvent::Runtime(signal) => write!(f, "{signal}"),
        }
    }
}

pub trait Observer {
    fn notify(&mut self, event: &VmEvent);
}

impl<F: FnMut(&VmEvent)> Observer for F {
    fn notify(&mut self, event: &VmEvent) {
        self(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Coordinator-side publish surface, independent of the engine's subscribers.
#[derive(Default)]
pub struct ObserverHub {
    observers: Vec<(SubscriptionId, Box<dyn Observer>)>,
    next_id: u64,
}

impl ObserverHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, observer: Box<dyn Observer>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.observers.push((id, observer));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(subscribed, _)| *subscribed != id);
        before != self.observers.len()
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn publish(&mut self, event: &VmEvent) {
        for (_, observer) in self.observers.iter_mut() {
            observer.notify(event);
        }
    }
}

/// Shared handle to the hub; relay handlers on the engine hold clones of it.
#[derive(Clone, Default)]
pub struct ObserverHubHandle(Rc<RefCell<ObserverHub>>);

impl ObserverHubHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, observer: Box<dyn Observer>) -> SubscriptionId {
        self.0.borrow_mut().subscribe(observer)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.0.borrow_mut().unsubscribe(id)
    }

    pub fn publish(&self, event: VmEvent) {
        self.0.borrow_mut().publish(&event);
    }

    pub fn observer_count(&self) -> usize {
        self.0.borrow().len()
    }
}

/// Observer that records every event it sees, in order.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Rc<RefCell<Vec<VmEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Boxed observer writing into this log.
    pub fn observer(&self) -> Box<dyn Observer> {
        let events = Rc::clone(&self.events);
        Box::new(move |event: &VmEvent| events.borrow_mut().push(event.clone()))
    }

    pub fn events(&self) -> Ref<'_, Vec<VmEvent>> {
        self.events.borrow()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events.borrow().iter().map(VmEvent::name).collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.events.borrow().iter().filter(|event| event.name() == name).count()
    }

    pub fn last_targets_update(&self) -> Option<TargetsUpdate> {
        self.events.borrow().iter().rev().find_map(|event| match event {
            VmEvent::TargetsUpdate(update) => Some(update.clone()),
            _ => None,
        })
    }

    pub fn drain(&self) -> Vec<VmEvent> {
        self.events.borrow_mut().drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hub_delivers_in_subscription_order_and_unsubscribes() {
        let hub = ObserverHubHandle::new();
        let first = EventLog::new();
        let second = EventLog::new();
        let first_id = hub.subscribe(first.observer());
        hub.subscribe(second.observer());
        hub.publish(VmEvent::Runtime(RuntimeSignal::ProjectRunStart));
        assert!(hub.unsubscribe(first_id));
        assert!(!hub.unsubscribe(first_id));
        hub.publish(VmEvent::Runtime(RuntimeSignal::ProjectRunStop));
        assert_eq!(first.names(), vec!["PROJECT_RUN_START"]);
        assert_eq!(second.names(), vec!["PROJECT_RUN_START", "PROJECT_RUN_STOP"]);
        assert_eq!(hub.observer_count(), 1);
    }

    #[test]
    fn targets_update_payload_uses_camel_case() {
        let event = VmEvent::TargetsUpdate(TargetsUpdate { target_list: Vec::new(), editing_target: None });
        let payload = event.payload();
        assert!(payload["targetList"].as_array().is_some_and(Vec::is_empty));
        assert!(payload["editingTarget"].is_null());
        assert_eq!(event.to_string(), "targetsUpdate targets=0 editing=-");
    }
}
