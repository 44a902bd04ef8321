use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use stagehand::cli::CliOverrides;
use stagehand::config::{VmConfig, DEFAULT_CONFIG_PATH};
use stagehand::serialization::{self, ProjectFormat};
use stagehand::{Engine, EventLog, LoadOutcome, VirtualMachine, VmEvent};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;
use std::process;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(err) = run() {
        eprintln!("error: {err:?}");
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let mut args = env::args().skip(1);
    let Some(command) = args.next() else {
        print_usage();
        return Ok(());
    };
    match command.as_str() {
        "inspect" => {
            let path =
                args.next().ok_or_else(|| anyhow!("inspect requires a path: project_tool inspect <project>"))?;
            cmd_inspect(&path)
        }
        "validate" => {
            let path =
                args.next().ok_or_else(|| anyhow!("validate requires a path: project_tool validate <project>"))?;
            cmd_validate(&path)
        }
        "convert" => {
            let input = args
                .next()
                .ok_or_else(|| anyhow!("convert requires input path: project_tool convert <in> <out>"))?;
            let output = args
                .next()
                .ok_or_else(|| anyhow!("convert requires output path: project_tool convert <in> <out>"))?;
            cmd_convert(&input, &output)
        }
        "run" => {
            let path = args.next().ok_or_else(|| anyhow!("run requires a path: project_tool run <project>"))?;
            let overrides = CliOverrides::parse(std::iter::once(command.clone()).chain(args))?;
            cmd_run(&path, overrides)
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => Err(anyhow!("unknown command '{other}'")),
    }
}

fn print_usage() {
    eprintln!(
        "Project Tool

Usage:
  project_tool inspect <project>        List targets, sprites, costumes and scripts
  project_tool validate <project>       Check block links and costume indices
  project_tool convert <input> <output> Load a project in either format and save it in the current one
  project_tool run <project> [flags]    Load, press the green flag and step the reference runtime
      --steps <n>          Number of steps to run (default 60)
      --turbo <on|off>     Turbo mode
      --compat <on|off>    Compatibility (30 Hz) stepping
      --max-clones <n>     Clone limit
      --config <path>      Config file (default {DEFAULT_CONFIG_PATH})
  project_tool help                     Show this message
"
    );
}

fn read_project(path: &str) -> Result<Value> {
    let normalized = Path::new(path).canonicalize().unwrap_or_else(|_| Path::new(path).to_path_buf());
    let bytes = fs::read(&normalized).with_context(|| format!("Reading project file {}", normalized.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("Parsing project file {}", normalized.display()))
}

fn load_vm(path: &str, config: &VmConfig) -> Result<VirtualMachine> {
    let project = read_project(path)?;
    let mut vm = VirtualMachine::with_config(config);
    match vm.load_project(&project).with_context(|| format!("loading project '{path}'"))? {
        LoadOutcome::Loaded { .. } => Ok(vm),
        LoadOutcome::Ignored => Err(anyhow!("project '{path}' is not a JSON object")),
    }
}

fn cmd_inspect(path: &str) -> Result<()> {
    let project = read_project(path)?;
    let format = ProjectFormat::detect(&project);
    let vm = load_vm(path, &VmConfig::default())?;
    let store = vm.engine().targets();
    println!("Project '{path}' ({format}), {} target(s)", store.len());
    println!("{:<38} {:<20} {:<6} {:<9} {:<8} {}", "Target ID", "Name", "Stage", "Costumes", "Scripts", "Blocks");
    println!("{}", "-".repeat(100));
    for target in store.iter() {
        let costumes = store.sprite_of(target).map(|sprite| sprite.costumes.len()).unwrap_or(0);
        println!(
            "{:<38} {:<20} {:<6} {:<9} {:<8} {}",
            target.id,
            store.display_name(target),
            if target.is_stage { "yes" } else { "-" },
            costumes,
            target.blocks.scripts().len(),
            target.blocks.len()
        );
    }
    if let Some(editing) = vm.editing_target_id() {
        println!("Editing target: {editing}");
    }
    Ok(())
}

fn cmd_validate(path: &str) -> Result<()> {
    let project = read_project(path)?;
    let (format, targets) =
        serialization::deserialize(&project).with_context(|| format!("deserializing project '{path}'"))?;
    let mut issues = Vec::new();

    for entry in &targets {
        let target = &entry.target;
        if !entry.sprite.costumes.is_empty() && target.current_costume >= entry.sprite.costumes.len() {
            issues.push(format!("target '{}' wears missing costume {}", entry.name(), target.current_costume));
        }
        for block in target.blocks.iter() {
            let inputs = block.inputs.values().filter_map(|input| input.block.as_ref());
            let links = block.next.iter().chain(block.parent.iter()).chain(inputs);
            for link in links {
                if target.blocks.get(link).is_none() {
                    issues.push(format!(
                        "target '{}' block '{}' references missing block '{}'",
                        entry.name(),
                        block.id,
                        link
                    ));
                }
            }
        }
    }
    if targets.iter().filter(|entry| entry.target.is_stage).count() != 1 {
        issues.push("project must contain exactly one stage".to_string());
    }

    if issues.is_empty() {
        println!("Project '{path}' ({format}) is valid. Targets: {}", targets.len());
        Ok(())
    } else {
        Err(anyhow!(format!("project '{}' has issues:\n  - {}", path, issues.join("\n  - "))))
    }
}

fn cmd_convert(input: &str, output: &str) -> Result<()> {
    let vm = load_vm(input, &VmConfig::default())?;
    let text = vm.save_to_string()?;
    if let Some(parent) = Path::new(output).parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("Creating output directory {}", parent.display()))?;
    }
    fs::write(output, text.as_bytes()).with_context(|| format!("Writing project file {output}"))?;
    println!("Converted '{input}' -> '{output}'");
    Ok(())
}

fn cmd_run(path: &str, overrides: CliOverrides) -> Result<()> {
    let config_path = overrides.config_path().map(Path::to_path_buf);
    let steps = overrides.steps();
    let config_overrides = overrides.into_config_overrides();
    let mut config = match config_path {
        Some(config_path) => VmConfig::load(&config_path)?,
        None => VmConfig::load_or_default(DEFAULT_CONFIG_PATH),
    };
    if !config_overrides.is_empty() {
        log::info!("CLI overrides applied: {}", config_overrides.applied_fields().join(", "));
    }
    config.apply_overrides(&config_overrides);

    let mut vm = load_vm(path, &config)?;
    let events = EventLog::new();
    vm.subscribe(events.observer());
    vm.start();
    vm.green_flag();
    for _ in 0..steps {
        vm.step();
    }
    vm.stop_all();

    let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    for event in events.events().iter() {
        if let VmEvent::Runtime(signal) = event {
            log::debug!("{signal}");
        }
        *counts.entry(event.name()).or_default() += 1;
    }
    println!(
        "Ran '{path}' for {steps} step(s) ({} ms per step, turbo {}).",
        vm.engine().step_mode().interval_ms(),
        if vm.engine().turbo_mode() { "on" } else { "off" }
    );
    for (name, count) in counts {
        println!("  {name:<20} {count}");
    }
    Ok(())
}
