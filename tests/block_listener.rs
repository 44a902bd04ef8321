use serde_json::{json, Value};
use stagehand::blocks::BlockEvent;
use stagehand::{Engine, EventLog, TargetId, VirtualMachine, VmEvent};

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

fn event(value: Value) -> BlockEvent {
    serde_json::from_value(value).expect("block event should parse")
}

fn create_script() -> BlockEvent {
    event(json!({
        "type": "create",
        "blocks": [
            {"id": "hat", "opcode": "event_whenflagclicked", "topLevel": true, "x": 5.0, "y": 5.0, "next": "move"},
            {"id": "move", "opcode": "motion_movesteps", "parent": "hat"}
        ]
    }))
}

fn loaded() -> VirtualMachine {
    let mut vm = VirtualMachine::new();
    vm.load_project(&project()).expect("project should load");
    vm
}

#[test]
fn edits_go_to_the_editing_target_only() {
    let mut vm = loaded();
    vm.block_listener(&create_script());
    vm.block_listener(&event(json!({
        "type": "change", "block_id": "move", "element": "field", "name": "STEPS", "new_value": 10
    })));

    let store = vm.engine().targets();
    let cat = store.get(&TargetId::new("cat")).expect("cat");
    assert_eq!(cat.blocks.scripts(), ["hat".to_string()]);
    assert_eq!(cat.blocks.get("move").map(|block| block.fields["STEPS"].value.as_str()), Some("10"));
    assert!(store.get(&TargetId::new("dog")).is_some_and(|dog| dog.blocks.is_empty()));

    let log = EventLog::new();
    vm.subscribe(log.observer());
    vm.set_editing_target(&TargetId::new("dog"));
    vm.set_editing_target(&TargetId::new("cat"));
    let events = log.events();
    let Some(VmEvent::WorkspaceUpdate(workspace)) = events.last() else {
        panic!("last event should be a workspace update");
    };
    assert_eq!(workspace.structured_blocks["move"]["parent"], "hat");
}

#[test]
fn move_detaches_and_reattaches_blocks() {
    let mut vm = loaded();
    vm.block_listener(&create_script());
    vm.block_listener(&event(json!({
        "type": "move", "block_id": "move", "old_parent_id": "hat", "new_coordinate": {"x": 100.0, "y": 50.0}
    })));
    let cat = vm.editing_target().expect("cat");
    assert_eq!(cat.blocks.scripts(), ["hat".to_string(), "move".to_string()]);
    assert_eq!(cat.blocks.next_of("hat"), None);
    assert_eq!(cat.blocks.get("move").and_then(|block| block.x), Some(100.0));

    vm.block_listener(&event(json!({"type": "move", "block_id": "move", "new_parent_id": "hat"})));
    let cat = vm.editing_target().expect("cat");
    assert_eq!(cat.blocks.scripts(), ["hat".to_string()]);
    assert_eq!(cat.blocks.next_of("hat"), Some("move"));
}

#[test]
fn stack_click_toggles_the_script() {
    let mut vm = loaded();
    vm.block_listener(&create_script());
    let cat = TargetId::new("cat");
    vm.block_listener(&BlockEvent::StackClick { block_id: "hat".to_string() });
    assert_eq!(vm.engine().threads_for(&cat).len(), 1);

    let log = EventLog::new();
    vm.subscribe(log.observer());
    vm.playground_data();
    let events = log.events();
    let Some(VmEvent::PlaygroundData(data)) = events.first() else {
        panic!("playground data should be published");
    };
    assert_eq!(data.threads[0].top_block, "hat");
    assert_eq!(data.blocks["hat"]["opcode"], "event_whenflagclicked");
    drop(events);

    vm.block_listener(&BlockEvent::StackClick { block_id: "hat".to_string() });
    assert!(vm.engine().threads_for(&cat).is_empty());
}

#[test]
fn events_without_editing_target_are_dropped() {
    let mut vm = VirtualMachine::new();
    vm.block_listener(&create_script());
    vm.block_listener(&BlockEvent::StackClick { block_id: "hat".to_string() });
    assert_eq!(vm.engine().thread_count(), 0);
    assert!(vm.flyout_blocks().is_empty());
}

#[test]
fn flyout_edits_stay_out_of_targets() {
    let mut vm = loaded();
    vm.flyout_block_listener(&create_script());
    assert_eq!(vm.flyout_blocks().len(), 2);
    assert!(vm.editing_target().is_some_and(|cat| cat.blocks.is_empty()));

    vm.flyout_block_listener(&BlockEvent::Delete { block_id: "hat".to_string() });
    assert!(vm.flyout_blocks().is_empty());
}

#[test]
fn duplicate_creates_are_skipped() {
    let mut vm = loaded();
    vm.block_listener(&create_script());
    vm.block_listener(&event(json!({
        "type": "create", "blocks": [{"id": "hat", "opcode": "control_forever", "topLevel": true}]
    })));
    let cat = vm.editing_target().expect("cat");
    assert_eq!(cat.blocks.len(), 2);
    assert_eq!(cat.blocks.get("hat").map(|block| block.opcode.as_str()), Some("event_whenflagclicked"));
}
