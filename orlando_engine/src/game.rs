use std::collections::{BTreeMap, BTreeSet};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

/// Script variables. Reading an unset name yields 0.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Variables {
    values: BTreeMap<String, i32>,
}

impl Variables {
    pub fn get(&self, name: &str) -> i32 {
        self.values.get(name).copied().unwrap_or(0)
    }

    pub fn set(&mut self, name: &str, value: i32) {
        self.values.insert(name.to_string(), value);
    }

    pub fn update(&mut self, name: &str, f: impl FnOnce(i32) -> i32) -> i32 {
        let value = f(self.get(name));
        self.set(name, value);
        value
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i32)> {
        self.values.iter().map(|(name, value)| (name.as_str(), *value))
    }
}

/// State that outlives individual scenes.
#[derive(Debug)]
pub struct GameState {
    pub variables: Variables,
    pub inventory: BTreeSet<String>,
    pub last_answer: Option<i32>,
    pub current_scene: Option<String>,
    pub previous_scene: Option<String>,
    pub cursor: Option<String>,
    pub cursor_visible: bool,
    pub input_enabled: bool,
    pub quit_requested: bool,
    pending_scene: Option<String>,
    pending_film: Option<String>,
    rng: StdRng,
}

/// Serialisable view of [`GameState`] for reports.
#[derive(Debug, Clone, Serialize)]
pub struct GameSnapshot {
    pub variables: Variables,
    pub inventory: Vec<String>,
    pub last_answer: Option<i32>,
    pub current_scene: Option<String>,
    pub previous_scene: Option<String>,
    pub cursor: Option<String>,
    pub cursor_visible: bool,
    pub input_enabled: bool,
    pub quit_requested: bool,
}

impl GameState {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            variables: Variables::default(),
            inventory: BTreeSet::new(),
            last_answer: None,
            current_scene: None,
            previous_scene: None,
            cursor: None,
            cursor_visible: true,
            input_enabled: true,
            quit_requested: false,
            pending_scene: None,
            pending_film: None,
            rng,
        }
    }

    /// Uniform value in `0..max`; 0 when `max` is not positive.
    pub fn random(&mut self, max: i32) -> i32 {
        if max <= 0 {
            return 0;
        }
        self.rng.gen_range(0..max)
    }

    pub fn request_scene(&mut self, name: &str) {
        self.pending_scene = Some(name.to_string());
    }

    pub fn take_pending_scene(&mut self) -> Option<String> {
        self.pending_scene.take()
    }

    pub fn request_film(&mut self, resource: &str) {
        self.pending_film = Some(resource.to_string());
    }

    pub fn take_pending_film(&mut self) -> Option<String> {
        self.pending_film.take()
    }

    /// Record a scene transition.
    pub fn enter_scene(&mut self, name: &str) {
        self.previous_scene = self.current_scene.replace(name.to_string());
    }

    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            variables: self.variables.clone(),
            inventory: self.inventory.iter().cloned().collect(),
            last_answer: self.last_answer,
            current_scene: self.current_scene.clone(),
            previous_scene: self.previous_scene.clone(),
            cursor: self.cursor.clone(),
            cursor_visible: self.cursor_visible,
            input_enabled: self.input_enabled,
            quit_requested: self.quit_requested,
        }
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new(None)
    }
}
