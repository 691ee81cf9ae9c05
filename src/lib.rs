pub mod engine;
pub mod error;
pub mod events;
pub mod notes;
pub mod patch;
pub mod scene;
pub mod settings;
pub mod stateful;
pub mod units;

pub use engine::{
    spawn_engine, Engine, EngineCommand, EngineHandle, EngineSetup, EngineUpdate, SceneStatus,
};
pub use error::{EventError, PatchError, SettingsError};
pub use events::{Event, EventType, EventTypes, SwitchTarget};
pub use patch::{chain, exit, fork, fork_with, init, split, split_or, Node, Patch, Selector};
pub use scene::{Scene, SceneGroup, SceneTable};
pub use settings::Settings;
pub use units::Unit;
