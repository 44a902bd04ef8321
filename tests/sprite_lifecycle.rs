use serde_json::{json, Value};
use stagehand::{Costume, Engine, EventLog, TargetId, VirtualMachine, VmError};

fn project() -> Value {
    json!({
        "targets": [
            {"id": "stage", "name": "Stage", "isStage": true},
            {"id": "cat", "name": "Cat", "costumes": [{"name": "cat-a", "md5ext": "cat-a.svg"}]},
            {"id": "dog", "name": "Dog"}
        ],
        "meta": {"semver": "3.0.0"}
    })
}

fn loaded() -> VirtualMachine {
    let mut vm = VirtualMachine::new();
    vm.load_project(&project()).expect("project should load");
    vm
}

#[test]
fn deleting_sprite_disposes_every_clone() {
    let mut vm = loaded();
    let first = vm.engine_mut().make_clone(&TargetId::new("cat")).expect("clone");
    let second = vm.engine_mut().make_clone(&TargetId::new("cat")).expect("clone");
    assert_eq!(vm.engine().targets().len(), 5);

    vm.delete_sprite(&TargetId::new("cat")).expect("delete");
    let store = vm.engine().targets();
    assert_eq!(store.len(), 2);
    for id in [TargetId::new("cat"), first, second] {
        assert!(!store.contains(&id), "target '{id}' should be gone");
    }
}

#[test]
fn deleting_edited_clone_moves_editing_to_first_target() {
    let mut vm = loaded();
    let clones: Vec<TargetId> =
        (0..3).map(|_| vm.engine_mut().make_clone(&TargetId::new("cat")).expect("clone")).collect();
    assert!(vm.set_editing_target(&clones[1]));
    let log = EventLog::new();
    vm.subscribe(log.observer());

    vm.delete_sprite(&TargetId::new("cat")).expect("delete");
    for clone in &clones {
        assert!(!vm.engine().targets().contains(clone), "clone '{clone}' should be gone");
    }
    assert_eq!(vm.engine().targets().len(), 2);
    assert_eq!(vm.editing_target_id(), Some(&TargetId::new("stage")));
    assert_eq!(vm.engine().editing_target(), Some(&TargetId::new("stage")));
    assert_eq!(log.names(), vec!["targetsUpdate", "workspaceUpdate", "targetsUpdate"]);
    let update = log.last_targets_update().expect("targets update");
    let ids: Vec<&str> = update.target_list.iter().map(|summary| summary.id.as_str()).collect();
    assert_eq!(ids, vec!["stage", "dog"]);
}

#[test]
fn deleting_other_sprite_keeps_editing_target() {
    let mut vm = loaded();
    let log = EventLog::new();
    vm.subscribe(log.observer());
    vm.delete_sprite(&TargetId::new("dog")).expect("delete");
    assert_eq!(vm.editing_target_id(), Some(&TargetId::new("cat")));
    assert_eq!(log.names(), vec!["targetsUpdate"]);
}

#[test]
fn delete_and_rename_reject_non_sprites() {
    let mut vm = loaded();
    let clone = vm.engine_mut().make_clone(&TargetId::new("cat")).expect("clone");
    assert!(matches!(vm.delete_sprite(&TargetId::new("stage")), Err(VmError::NotASprite(_))));
    assert!(matches!(vm.delete_sprite(&clone), Err(VmError::NotASprite(_))));
    assert!(matches!(vm.delete_sprite(&TargetId::new("ghost")), Err(VmError::TargetNotFound(_))));
    assert!(matches!(vm.rename_sprite(&TargetId::new("ghost"), "Ghost"), Err(VmError::TargetNotFound(_))));
    assert_eq!(vm.engine().targets().len(), 4);
}

#[test]
fn rename_publishes_one_targets_update() {
    let mut vm = loaded();
    let log = EventLog::new();
    vm.subscribe(log.observer());
    vm.rename_sprite(&TargetId::new("dog"), "Cat").expect("rename");
    assert_eq!(log.names(), vec!["targetsUpdate"]);
    let update = log.last_targets_update().expect("targets update");
    let names: Vec<&str> = update.target_list.iter().map(|summary| summary.name.as_str()).collect();
    assert_eq!(names, vec!["Stage", "Cat", "Cat"]);
}

#[test]
fn add_costume_appends_and_wears_it() {
    let mut vm = loaded();
    let log = EventLog::new();
    vm.subscribe(log.observer());
    vm.add_costume(Costume::new("cat-b", "cat-b.png")).expect("add costume");
    let target = vm.editing_target().expect("editing target");
    assert_eq!(target.current_costume, 1);
    let sprite = vm.engine().targets().sprite_of(target).expect("sprite");
    let names: Vec<&str> = sprite.costumes.iter().map(|costume| costume.name.as_str()).collect();
    assert_eq!(names, vec!["cat-a", "cat-b"]);
    assert!(log.names().is_empty());
}

#[test]
fn add_backdrop_targets_stage_regardless_of_editing_target() {
    let mut vm = loaded();
    vm.add_backdrop(Costume::new("night", "night.png").with_rotation_center(240.0, 180.0)).expect("backdrop");
    let store = vm.engine().targets();
    let stage = store.stage().expect("stage");
    let backdrops = &store.sprite_of(stage).expect("stage sprite").costumes;
    assert_eq!(backdrops.len(), 1);
    assert_eq!(backdrops[0].data_format, "png");
    assert_eq!(backdrops[0].rotation_center_x, 240.0);
    let cat = store.get(&TargetId::new("cat")).expect("cat");
    assert_eq!(store.sprite_of(cat).map(|sprite| sprite.costumes.len()), Some(1));
}

#[test]
fn add_sprite2_merges_without_clearing() {
    let mut vm = loaded();
    let log = EventLog::new();
    vm.subscribe(log.observer());
    let sprite = json!({
        "objName": "Bat",
        "scratchX": 30,
        "costumes": [{"costumeName": "bat-a", "baseLayerMD5": "bat.svg"}],
        "scripts": [[0, 0, [["whenGreenFlag"], ["turnRight:", 15]]]]
    });
    let id = vm.add_sprite2(&sprite).expect("sprite should load");

    assert_eq!(vm.engine().targets().len(), 4);
    assert_eq!(vm.editing_target_id(), Some(&id));
    assert_eq!(vm.engine().editing_target(), Some(&id));
    assert_eq!(log.names(), vec!["targetsUpdate", "workspaceUpdate"]);
    let target = vm.editing_target().expect("bat");
    assert_eq!(target.x, 30.0);
    assert_eq!(target.blocks.len(), 2);
    assert_eq!(vm.engine().targets().display_name(target), "Bat");
}

#[test]
fn add_sprite2_accepts_string_and_rejects_other_json() {
    let mut vm = loaded();
    let id = vm.add_sprite2(&Value::String(r#"{"objName": "Owl"}"#.to_string())).expect("string sprite");
    assert!(vm.engine().targets().contains(&id));
    assert!(matches!(vm.add_sprite2(&json!(5)), Err(VmError::MalformedProject(_))));
    assert!(matches!(vm.add_sprite2(&json!("{broken")), Err(VmError::Json(_))));
    assert_eq!(vm.engine().targets().len(), 4);
}

#[test]
fn stop_all_disposes_clones_and_forgets_clone_editing_target() {
    let mut vm = loaded();
    let clone = vm.engine_mut().make_clone(&TargetId::new("cat")).expect("clone");
    assert!(vm.set_editing_target(&clone));
    vm.stop_all();
    assert!(!vm.engine().targets().contains(&clone));
    assert!(vm.editing_target().is_none());
    assert_eq!(vm.engine().targets().len(), 3);
}
