use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam::channel::Sender;
use tracing::{debug, info};

use super::{IntoEvents, Unit};
use crate::events::Event;
use crate::notes::note_name;
use crate::patch::Node;

type EventFn = dyn Fn(Event) -> Vec<Event> + Send + Sync;

/// Synchronous escape hatch. Whatever the function returns is spliced into
/// the output at this point of the tree.
///
/// The function runs on the processing thread: anything slow stalls every
/// event behind it. Use [`Call`] for work that does not need to answer.
#[derive(Clone)]
pub struct Process {
    f: Arc<EventFn>,
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Process(..)")
    }
}

impl Unit for Process {
    fn process(&self, event: Event) -> Vec<Event> {
        (self.f)(event)
    }
}

pub fn process<F, R>(f: F) -> Node
where
    F: Fn(Event) -> R + Send + Sync + 'static,
    R: IntoEvents,
{
    Node::unit(Process {
        f: Arc::new(move |event| f(event).into_events()),
    })
}

/// Fire-and-forget escape hatch: hands a copy of the event to an external
/// task and emits nothing.
#[derive(Debug, Clone)]
pub struct Call {
    tx: Sender<Event>,
}

impl Unit for Call {
    fn process(&self, event: Event) -> Vec<Event> {
        if self.tx.send(event).is_err() {
            debug!("call receiver is gone, dropping event");
        }
        Vec::new()
    }
}

pub fn call(tx: Sender<Event>) -> Node {
    Node::unit(Call { tx })
}

/// Runs `f` on a dedicated thread for every event reaching the returned node.
/// The thread exits once every copy of the node has been dropped.
pub fn call_thread<F>(mut f: F) -> (Node, JoinHandle<()>)
where
    F: FnMut(Event) + Send + 'static,
{
    let (tx, rx) = crossbeam::channel::unbounded::<Event>();
    let handle = std::thread::spawn(move || {
        for event in rx {
            f(event);
        }
    });
    (call(tx), handle)
}

/// Logs every event it sees and passes it on.
#[derive(Debug, Clone, Default)]
pub struct Print {
    label: Option<String>,
}

impl Unit for Print {
    fn process(&self, event: Event) -> Vec<Event> {
        let note = event.note().map(note_name).unwrap_or_default();
        match &self.label {
            Some(label) => info!(%label, %note, "{}", event),
            None => info!(%note, "{}", event),
        }
        vec![event]
    }
}

pub fn print(label: Option<&str>) -> Node {
    Node::unit(Print {
        label: label.map(str::to_string),
    })
}
