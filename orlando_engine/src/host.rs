use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use serde::Serialize;

/// Presentation side effects the scene runtime asks its host to perform.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineEvent {
    MusicPlay { name: String },
    MusicStop,
    SoundPlay { name: String },
    SoundStop { name: String },
    Volume { level: i32 },
    Voice { name: String },
    Speech { person: String, text: String },
    DialogShown { dialog: String, answers: Vec<String> },
    DialogClosed { dialog: String, answer: i32 },
    FaceShown { person: String },
    FaceHidden,
    FilmRequested { film: String, resource: String },
    SceneRequested { scene: String },
    Cursor { name: Option<String>, visible: bool },
    Log { source: String, text: String },
    Quit,
}

/// Receives [`EngineEvent`]s and answers playback queries for blocking commands.
pub trait HostCallback {
    fn event(&self, event: EngineEvent);

    /// Whether a sound, voice or film started through an event is still running.
    fn is_playing(&self, _name: &str) -> bool {
        false
    }
}

/// Host that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullHost;

impl HostCallback for NullHost {
    fn event(&self, _event: EngineEvent) {}
}

/// Host that keeps every event and lets callers mark media as playing.
#[derive(Debug, Clone, Default)]
pub struct RecordingHost {
    events: Rc<RefCell<Vec<EngineEvent>>>,
    playing: Rc<RefCell<BTreeSet<String>>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.borrow().clone()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }

    pub fn set_playing(&self, name: &str, playing: bool) {
        let mut set = self.playing.borrow_mut();
        if playing {
            set.insert(name.to_string());
        } else {
            set.remove(name);
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&*self.events.borrow())
    }
}

impl HostCallback for RecordingHost {
    fn event(&self, event: EngineEvent) {
        self.events.borrow_mut().push(event);
    }

    fn is_playing(&self, name: &str) -> bool {
        self.playing.borrow().contains(name)
    }
}
