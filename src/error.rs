use crate::events::EventType;

/// Reading or writing an event field the event's type does not carry, or
/// building an event from malformed input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    #[error("{kind:?} event has no `{field}` field")]
    InvalidField {
        kind: EventType,
        field: &'static str,
    },
    #[error("sysex data must start with 0xf0, got {0:02x?}")]
    InvalidSysEx(Vec<u8>),
    #[error("invalid note name {0:?}")]
    InvalidNoteName(String),
    #[error("cannot parse event from {input:?}: {reason}")]
    Parse { input: String, reason: String },
}

/// Problems found while building a patch. These are raised before any event
/// flows and must abort setup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatchError {
    #[error("invalid range [{lo}, {hi}) for {what}")]
    InvalidRange { what: &'static str, lo: i32, hi: i32 },
    #[error("{what} {value} is out of range")]
    OutOfRange { what: &'static str, value: i32 },
    #[error("split key must be a non-empty event type mask")]
    EmptyTypeMask,
    #[error("{0} must be given at least one value")]
    EmptyList(&'static str),
    #[error("init/exit action nested inside another init/exit action: {0}")]
    NestedAction(String),
    #[error("scene {0} is declared twice")]
    DuplicateScene(u32),
    #[error("scene group {0} has no subscenes")]
    EmptySceneGroup(u32),
    #[error("initial scene {0} does not exist")]
    UnknownScene(u32),
    #[error(transparent)]
    Event(#[from] EventError),
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to access settings file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse settings: {0}")]
    Parse(#[from] ron::error::SpannedError),
    #[error("failed to write settings: {0}")]
    Serialize(#[from] ron::Error),
}
