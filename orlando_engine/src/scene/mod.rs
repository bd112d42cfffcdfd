pub mod draw;
pub mod entities;
pub mod loader;
pub mod walk;

use std::collections::BTreeMap;

use anyhow::Result;
use log::{debug, info, warn};
use orlando_formats::Surface;
use thiserror::Error;

use crate::config::EngineConfig;
use crate::game::GameState;
use crate::host::{EngineEvent, HostCallback};
use crate::interpreter::{Interpreter, MacroState, ScriptEnv};
use crate::resources::ResourceManager;
use entities::{Area, Dialog, Element, Face, Insertion, Person};
use walk::{step_towards, Direction, Point, WalkMap};

/// Macro run to completion before a scene becomes interactive.
pub const PRE_MACRO: &str = "PRE";
/// Macro started once the scene is interactive.
pub const INIT_MACRO: &str = "INIT";

/// Distance at which a following person stops closing in.
const FOLLOW_DISTANCE: i32 = 40;

#[derive(Debug, Error)]
pub enum SceneLoadError {
    #[error("scene archive {0} not found")]
    MissingArchive(String),
    #[error("required resource {0} is missing")]
    MissingResource(String),
    #[error("{file} is malformed: {reason}")]
    Malformed { file: String, reason: String },
    #[error("{file}: cannot load {resource}: {reason}")]
    Resource {
        file: String,
        resource: String,
        reason: String,
    },
}

/// Scene-relevant slice of [`EngineConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneSettings {
    pub screen_width: i32,
    pub screen_height: i32,
    pub speech_frames_per_word: u32,
    pub max_pre_steps: u64,
}

impl From<&EngineConfig> for SceneSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            screen_width: config.screen_width as i32,
            screen_height: config.screen_height as i32,
            speech_frames_per_word: config.speech_frames_per_word,
            max_pre_steps: config.max_pre_steps,
        }
    }
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrollState {
    pub x: i32,
    pub target: Option<i32>,
    pub speed: i32,
}

/// Brightness ramp; 255 is fully visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FadeState {
    pub level: u8,
    pub target: u8,
    pub step: u8,
}

impl FadeState {
    pub fn is_idle(&self) -> bool {
        self.level == self.target
    }
}

impl Default for FadeState {
    fn default() -> Self {
        Self {
            level: u8::MAX,
            target: u8::MAX,
            step: 16,
        }
    }
}

/// Every entity a scene owns, keyed by id within its own category.
#[derive(Debug)]
pub struct World {
    pub background: Surface,
    pub elements: BTreeMap<String, Element>,
    pub persons: BTreeMap<String, Person>,
    pub areas: BTreeMap<String, Area>,
    pub dialogs: BTreeMap<String, Dialog>,
    pub faces: BTreeMap<String, Face>,
    /// Animation id to resource name.
    pub animations: BTreeMap<String, String>,
    pub insertions: BTreeMap<String, Insertion>,
    /// Film id to resource name.
    pub films: BTreeMap<String, String>,
    pub walk: WalkMap,
    pub player: Option<String>,
    pub scroll: ScrollState,
    pub fade: FadeState,
    pub active_dialog: Option<String>,
    pub face: Option<String>,
    pub screen_width: i32,
    pub screen_height: i32,
}

impl World {
    pub fn new(background: Surface, settings: &SceneSettings) -> Self {
        Self {
            background,
            elements: BTreeMap::new(),
            persons: BTreeMap::new(),
            areas: BTreeMap::new(),
            dialogs: BTreeMap::new(),
            faces: BTreeMap::new(),
            animations: BTreeMap::new(),
            insertions: BTreeMap::new(),
            films: BTreeMap::new(),
            walk: WalkMap::default(),
            player: None,
            scroll: ScrollState::default(),
            fade: FadeState::default(),
            active_dialog: None,
            face: None,
            screen_width: settings.screen_width,
            screen_height: settings.screen_height,
        }
    }

    pub fn max_scroll(&self) -> i32 {
        (self.background.width() as i32 - self.screen_width).max(0)
    }

    pub fn set_scroll(&mut self, x: i32) {
        self.scroll.x = x.clamp(0, self.max_scroll());
    }

    pub fn scroll_to(&mut self, x: i32, speed: i32) {
        self.scroll.target = Some(x.clamp(0, self.max_scroll()));
        self.scroll.speed = speed.max(1);
    }

    /// Resolve an animation id to its resource; unknown ids are used verbatim.
    pub fn animation_resource<'a>(&'a self, name: &'a str) -> &'a str {
        self.animations.get(name).map_or(name, String::as_str)
    }

    /// Answer the open dialog with `number` (1-based).
    pub fn answer_dialog(&mut self, number: i32, game: &mut GameState, host: &dyn HostCallback) -> bool {
        let Some(dialog_id) = self.active_dialog.clone() else {
            debug!("answer {number} given with no open dialog");
            return false;
        };
        let enabled = self
            .dialogs
            .get_mut(&dialog_id)
            .and_then(|dialog| dialog.answer_mut(number))
            .is_some_and(|answer| answer.enabled);
        if !enabled {
            warn!("dialog {dialog_id} has no enabled answer {number}");
            return false;
        }
        game.last_answer = Some(number);
        self.active_dialog = None;
        host.event(EngineEvent::DialogClosed {
            dialog: dialog_id,
            answer: number,
        });
        true
    }

    /// Advance motion, animations, scrolling, fades and speech by one frame.
    pub fn update(&mut self) {
        self.update_elements();
        self.update_persons();
        self.update_insertions();
        self.update_scroll();
        self.update_fade();
    }

    fn update_elements(&mut self) {
        for element in self.elements.values_mut() {
            if let Some(motion) = element.motion {
                let next = step_towards(element.position(), motion.target, motion.speed);
                element.window.move_to(next.x, next.y);
                if next == motion.target {
                    element.motion = None;
                }
            }
            if let Some(animation) = element.animation.as_mut() {
                if let Err(err) = animation.advance() {
                    warn!("element {}: animation {} failed: {err:#}", element.id, animation.name);
                    element.stop_animation();
                    continue;
                }
            }
            element.sync_window();
        }
    }

    fn update_persons(&mut self) {
        let positions: BTreeMap<String, Point> = self
            .persons
            .iter()
            .map(|(id, person)| (id.clone(), person.position))
            .collect();

        for person in self.persons.values_mut() {
            if let Some(leader) = person.follow.as_ref().and_then(|id| positions.get(id)) {
                let dx = leader.x - person.position.x;
                let dy = leader.y - person.position.y;
                if dx.abs().max(dy.abs()) > FOLLOW_DISTANCE {
                    person.walk_target = Some(self.walk.clamp(*leader));
                }
            }

            if let Some(target) = person.walk_target {
                let next = step_towards(person.position, target, person.speed);
                if let Some(direction) =
                    Direction::from_delta(next.x - person.position.x, next.y - person.position.y)
                {
                    person.direction = direction;
                }
                person.position = next;
                if let Some(graphic) = person.graphics[person.direction.index()].as_mut() {
                    if let Err(err) = graphic.advance() {
                        warn!("person {}: walk animation failed: {err:#}", person.id);
                        person.graphics[person.direction.index()] = None;
                    }
                }
                if next == target {
                    person.walk_target = None;
                }
            }

            if let Some(animation) = person.animation.as_mut() {
                match animation.advance() {
                    Ok(()) if animation.is_finished() => person.animation = None,
                    Ok(()) => {}
                    Err(err) => {
                        warn!("person {}: animation {} failed: {err:#}", person.id, animation.name);
                        person.animation = None;
                    }
                }
            }

            if let Some(speech) = person.speech.as_mut() {
                speech.frames_left = speech.frames_left.saturating_sub(1);
                if speech.frames_left == 0 {
                    person.speech = None;
                }
            }
        }
    }

    fn update_insertions(&mut self) {
        for insertion in self.insertions.values_mut() {
            if !insertion.is_active() {
                continue;
            }
            if let Some(animation) = insertion.animation.as_mut() {
                if let Err(err) = animation.advance() {
                    warn!("insertion {}: {err:#}", insertion.id);
                    insertion.animation = None;
                }
            }
        }
    }

    fn update_scroll(&mut self) {
        let Some(target) = self.scroll.target else {
            return;
        };
        let delta = (target - self.scroll.x).clamp(-self.scroll.speed, self.scroll.speed);
        self.set_scroll(self.scroll.x + delta);
        if self.scroll.x == target {
            self.scroll.target = None;
        }
    }

    fn update_fade(&mut self) {
        let fade = &mut self.fade;
        if fade.level < fade.target {
            fade.level = fade.level.saturating_add(fade.step).min(fade.target);
        } else if fade.level > fade.target {
            fade.level = fade.level.saturating_sub(fade.step).max(fade.target);
        }
    }
}

/// A loaded room with its interpreter.
#[derive(Debug)]
pub struct Scene {
    name: String,
    resources: ResourceManager,
    world: World,
    interpreter: Interpreter,
    settings: SceneSettings,
    frame: u64,
}

impl Scene {
    /// Open the scene's archives, load every resource category, run `PRE` to
    /// completion and start `INIT`.
    pub fn initialize(
        name: &str,
        config: &EngineConfig,
        game: &mut GameState,
        host: &dyn HostCallback,
    ) -> Result<Self> {
        let resources = ResourceManager::for_scene(config, name)?;
        Self::load(name, resources, SceneSettings::from(config), game, host)
    }

    /// Build a scene from an already assembled resource set.
    pub fn load(
        name: &str,
        resources: ResourceManager,
        settings: SceneSettings,
        game: &mut GameState,
        host: &dyn HostCallback,
    ) -> Result<Self> {
        let data = loader::load_scene_data(name, &resources, &settings)?;
        info!(
            "scene {name}: {} elements, {} persons, {} areas, {} macros",
            data.world.elements.len(),
            data.world.persons.len(),
            data.world.areas.len(),
            data.macros.len()
        );

        let mut scene = Self {
            name: name.to_string(),
            resources,
            world: data.world,
            interpreter: Interpreter::new(data.macros),
            settings,
            frame: 0,
        };
        game.enter_scene(name);
        scene.run_pre(game, host);
        if scene.interpreter.contains(INIT_MACRO) {
            scene.interpreter.start(INIT_MACRO);
        } else {
            debug!("scene {name} has no {INIT_MACRO} macro");
        }
        Ok(scene)
    }

    fn run_pre(&mut self, game: &mut GameState, host: &dyn HostCallback) {
        if !self.interpreter.contains(PRE_MACRO) {
            return;
        }
        self.interpreter.start(PRE_MACRO);
        let mut steps = 0u64;
        while self.interpreter.is_active(PRE_MACRO) {
            if steps >= self.settings.max_pre_steps {
                warn!(
                    "scene {}: {PRE_MACRO} still running after {steps} steps; stopping it",
                    self.name
                );
                self.interpreter.kill(PRE_MACRO);
                break;
            }
            let mut env = ScriptEnv {
                world: &mut self.world,
                game: &mut *game,
                host,
                resources: &self.resources,
                settings: &self.settings,
            };
            self.interpreter.step_all(&mut env);
            self.world.update();
            steps += 1;
        }
        debug!("scene {}: {PRE_MACRO} finished after {steps} steps", self.name);
    }

    /// One frame: step every enabled macro once, then update the world.
    pub fn run(&mut self, game: &mut GameState, host: &dyn HostCallback) {
        let mut env = ScriptEnv {
            world: &mut self.world,
            game,
            host,
            resources: &self.resources,
            settings: &self.settings,
        };
        self.interpreter.step_all(&mut env);
        self.world.update();
        self.frame += 1;
    }

    /// Compose the current frame into `target`.
    pub fn render(&self, target: &mut Surface) {
        draw::render(&self.world, target);
    }

    /// Start the macro of the first enabled area under the screen point.
    pub fn click(&mut self, x: i32, y: i32, game: &GameState) -> Option<String> {
        if !game.input_enabled {
            debug!("click at ({x}, {y}) ignored while input is disabled");
            return None;
        }
        let point = (x + self.world.scroll.x, y);
        let macro_id = self
            .world
            .areas
            .values()
            .find(|area| area.enabled && area.rect.contains(point.0, point.1))?
            .macro_id
            .clone()?;
        self.interpreter.start(&macro_id).then_some(macro_id)
    }

    pub fn answer(&mut self, number: i32, game: &mut GameState, host: &dyn HostCallback) -> bool {
        self.world.answer_dialog(number, game, host)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    pub fn resources(&self) -> &ResourceManager {
        &self.resources
    }

    pub fn macro_state(&self, id: &str) -> Option<MacroState> {
        self.interpreter.state(id)
    }

    pub fn start_macro(&mut self, id: &str) -> bool {
        self.interpreter.start(id)
    }

    /// Disable every macro and rerun the `PRE`/`INIT` startup.
    pub fn reinitialize(&mut self, game: &mut GameState, host: &dyn HostCallback) {
        self.interpreter.reset();
        self.run_pre(game, host);
        if self.interpreter.contains(INIT_MACRO) {
            self.interpreter.start(INIT_MACRO);
        }
    }
}
