use patchwork::patch::key_split;
use patchwork::scene::scene_switch_from_program;
use patchwork::stateful::{latch_notes, make_monophonic, sustain_pedal};
use patchwork::units::{channel, port, print, program_filter, transpose, velocity, Curve};
use patchwork::{
    spawn_engine, Engine, EngineCommand, EngineSetup, EngineUpdate, Event, Node, PatchError,
    Scene, SceneGroup, SceneTable, Settings, SwitchTarget,
};
use std::io::BufRead;
use std::path::Path;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn demo_setup() -> Result<EngineSetup, PatchError> {
    let split = key_split(
        60,
        channel(1)? >> transpose(-12),
        channel(2)? >> velocity(Curve::Gamma(0.7)),
    )?;
    let lead = SceneGroup::new(
        "lead",
        [
            Scene::new("mono", make_monophonic()),
            Scene::new("latch", latch_notes(true, Some(21))?),
        ],
    );
    let scenes = SceneTable::new()
        .with(1, Scene::new("piano", sustain_pedal(64)? >> port(1)))?
        .with(2, Scene::new("split", split))?
        .with(3, lead)?;

    Ok(EngineSetup {
        scenes,
        control: Some(Node::from(program_filter(1..=3)?) >> scene_switch_from_program()),
        pre: None,
        post: Some(print(Some("out"))),
    })
}

/// `scene N`, `subscene N`, `scene +1` or an event in text form.
fn parse_command(line: &str) -> Result<EngineCommand, String> {
    let mut words = line.split_whitespace();
    let switch = match words.next() {
        Some("scene") => EngineCommand::SwitchScene,
        Some("subscene") => EngineCommand::SwitchSubscene,
        _ => {
            return line
                .parse::<Event>()
                .map(EngineCommand::Event)
                .map_err(|e| e.to_string());
        }
    };
    let arg = words.next().ok_or("missing scene number")?;
    let target = if arg.starts_with(['+', '-']) {
        let offset = arg.parse().map_err(|_| format!("bad offset {arg:?}"))?;
        SwitchTarget::Offset { offset, wrap: true }
    } else {
        SwitchTarget::Number(arg.parse().map_err(|_| format!("bad number {arg:?}"))?)
    };
    Ok(switch(target))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = match std::env::args().nth(1) {
        Some(path) => Settings::load(Path::new(&path))?,
        None => Settings::default(),
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let engine = Engine::new(settings, demo_setup()?)?;
    let handle = spawn_engine(engine);

    let update_rx = handle.update_rx.clone();
    let printer = std::thread::spawn(move || {
        for update in update_rx {
            match update {
                EngineUpdate::Output(events) => {
                    for event in events {
                        println!("{}", event);
                    }
                }
                EngineUpdate::SceneChanged {
                    scene,
                    subscene,
                    name,
                } => info!(scene, subscene, %name, "scene changed"),
                EngineUpdate::Error { message } => error!("{}", message),
                EngineUpdate::Stopped => break,
            }
        }
    });

    for line in std::io::stdin().lock().lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match parse_command(line) {
            Ok(command) => {
                if handle.command_tx.send(command).is_err() {
                    break;
                }
            }
            Err(message) => warn!(input = line, "{}", message),
        }
    }

    let _ = handle.command_tx.send(EngineCommand::Stop);
    let _ = printer.join();
    Ok(())
}
