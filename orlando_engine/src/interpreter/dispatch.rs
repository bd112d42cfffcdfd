use std::collections::BTreeMap;

use anyhow::{anyhow, bail, Result};
use log::{debug, info, warn};

use super::{MacroRun, ScriptEnv};
use crate::condition::{Comparison, Operand, WaitCondition};
use crate::host::EngineEvent;
use crate::opcode::Opcode;
use crate::scene::entities::{Animation, Area, Element, Motion, Person, PlayMode, Speech};
use crate::scene::walk::{Direction, Point};
use crate::scene::World;
use crate::script::MacroCommand;

const DEFAULT_MOVE_SPEED: i32 = 4;
const DEFAULT_SCROLL_SPEED: i32 = 8;
const DEFAULT_FADE_FRAMES: i32 = 16;

/// How the current macro continues after a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Flow {
    Next,
    Block(WaitCondition),
    /// A conditional was false: continue after its `ELSE` or `ENDIF`.
    SkipBranch,
    /// `ELSE` reached from the true branch: continue after `ENDIF`.
    SkipElse,
    Goto(String),
    Restart,
    ReactiveSelf,
    Stop,
    End,
}

/// Changes to other macros, applied once the current step is done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MacroRequest {
    Start(String),
    Kill(String),
    Pause(String),
    Resume(String),
}

pub(crate) struct Exec<'e, 'a> {
    pub env: &'e mut ScriptEnv<'a>,
    /// Id of the macro being stepped; it is not part of `macros`.
    pub current: &'e str,
    pub macros: &'e BTreeMap<String, MacroRun>,
    pub requests: Vec<MacroRequest>,
}

impl Exec<'_, '_> {
    fn macro_exists(&self, id: &str) -> bool {
        id == self.current || self.macros.contains_key(id)
    }

    fn macro_active(&self, id: &str) -> bool {
        if id == self.current {
            return true;
        }
        let pending_start = self
            .requests
            .iter()
            .any(|request| matches!(request, MacroRequest::Start(started) if started == id));
        pending_start || self.macros.get(id).is_some_and(MacroRun::is_active)
    }

    fn request(&mut self, command: &MacroCommand, build: fn(String) -> MacroRequest) -> Result<Flow> {
        let id = arg(command, 0)?;
        if !self.macro_exists(id) {
            bail!("unknown macro {id}");
        }
        self.requests.push(build(id.to_string()));
        Ok(Flow::Next)
    }

    fn value(&self, command: &MacroCommand, index: usize) -> Result<i32> {
        Ok(Operand::parse(arg(command, index)?).value(&self.env.game.variables))
    }

    fn optional_value(&self, command: &MacroCommand, index: usize) -> Option<i32> {
        command
            .arg(index)
            .map(|token| Operand::parse(token).value(&self.env.game.variables))
    }

    fn point(&self, command: &MacroCommand, index: usize) -> Result<Point> {
        Ok(Point::new(
            self.value(command, index)?,
            self.value(command, index + 1)?,
        ))
    }

    /// Open `name` (an animation id or a resource) positioned on its first frame.
    fn animation(&self, name: &str, owner: &str, mode: PlayMode) -> Result<Animation> {
        let resource = self.env.world.animation_resource(name);
        let flx = self.env.resources.load_flx(resource)?;
        let mut animation = Animation::new(name, owner, flx, mode);
        animation.advance()?;
        Ok(animation)
    }

    /// Whether a blocked macro may continue.
    pub(crate) fn poll(&self, wait: &mut WaitCondition) -> bool {
        let world = &*self.env.world;
        match wait {
            WaitCondition::Frames { remaining } => {
                if *remaining <= 1 {
                    true
                } else {
                    *remaining -= 1;
                    false
                }
            }
            WaitCondition::Forever => false,
            WaitCondition::PersonIdle { person } => world
                .persons
                .get(person.as_str())
                .map_or(true, |p| !p.is_walking()),
            WaitCondition::ElementIdle { element } => world
                .elements
                .get(element.as_str())
                .map_or(true, |e| !e.is_moving()),
            WaitCondition::ElementAnimation { element } => world
                .elements
                .get(element.as_str())
                .map_or(true, Element::animation_done),
            WaitCondition::PersonAnimation { person } => world
                .persons
                .get(person.as_str())
                .map_or(true, |p| p.animation.is_none()),
            WaitCondition::Insertion { insertion } => world
                .insertions
                .get(insertion.as_str())
                .map_or(true, |i| !i.is_active()),
            WaitCondition::Speech { person } => world
                .persons
                .get(person.as_str())
                .map_or(true, |p| !p.is_talking()),
            WaitCondition::DialogAnswered => world.active_dialog.is_none(),
            WaitCondition::MacroFinished { macro_id } => !self.macro_active(macro_id),
            WaitCondition::While { comparison } => !comparison.evaluate(&self.env.game.variables),
            WaitCondition::Until { comparison } => comparison.evaluate(&self.env.game.variables),
            WaitCondition::Scroll => world.scroll.target.is_none(),
            WaitCondition::Fade => world.fade.is_idle(),
            WaitCondition::Media { name } => !self.env.host.is_playing(name),
        }
    }
}

fn arg(command: &MacroCommand, index: usize) -> Result<&str> {
    command
        .arg(index)
        .ok_or_else(|| anyhow!("missing operand {}", index + 1))
}

fn element<'w>(world: &'w mut World, id: &str) -> Result<&'w mut Element> {
    world
        .elements
        .get_mut(id)
        .ok_or_else(|| anyhow!("unknown element {id}"))
}

fn person<'w>(world: &'w mut World, id: &str) -> Result<&'w mut Person> {
    world
        .persons
        .get_mut(id)
        .ok_or_else(|| anyhow!("unknown person {id}"))
}

fn area<'w>(world: &'w mut World, id: &str) -> Result<&'w mut Area> {
    world
        .areas
        .get_mut(id)
        .ok_or_else(|| anyhow!("unknown area {id}"))
}

fn branch(taken: bool) -> Flow {
    if taken {
        Flow::Next
    } else {
        Flow::SkipBranch
    }
}

fn fade_step(frames: Option<i32>) -> u8 {
    let frames = frames.unwrap_or(DEFAULT_FADE_FRAMES).max(1);
    (255 / frames).clamp(1, 255) as u8
}

pub(crate) fn execute(command: &MacroCommand, exec: &mut Exec<'_, '_>) -> Result<Flow> {
    match command.opcode {
        Opcode::Unknown => Ok(Flow::Next),

        Opcode::Let => {
            let value = exec.value(command, 1)?;
            exec.env.game.variables.set(arg(command, 0)?, value);
            Ok(Flow::Next)
        }
        Opcode::Inc => arithmetic(command, exec, |v, _| v.wrapping_add(1), false),
        Opcode::Dec => arithmetic(command, exec, |v, _| v.wrapping_sub(1), false),
        Opcode::Add => arithmetic(command, exec, i32::wrapping_add, true),
        Opcode::Sub => arithmetic(command, exec, i32::wrapping_sub, true),
        Opcode::Mul => arithmetic(command, exec, i32::wrapping_mul, true),
        Opcode::Div | Opcode::Mod => {
            let divisor = exec.value(command, 1)?;
            if divisor == 0 {
                warn!("{} {} by zero ignored", command.name, arg(command, 0)?);
                return Ok(Flow::Next);
            }
            if command.opcode == Opcode::Div {
                arithmetic(command, exec, i32::wrapping_div, true)
            } else {
                arithmetic(command, exec, i32::wrapping_rem, true)
            }
        }
        Opcode::Random => {
            let max = exec.value(command, 1)?;
            let value = exec.env.game.random(max);
            exec.env.game.variables.set(arg(command, 0)?, value);
            Ok(Flow::Next)
        }
        Opcode::SetFlag => {
            exec.env.game.variables.set(arg(command, 0)?, 1);
            Ok(Flow::Next)
        }
        Opcode::ClearFlag => {
            exec.env.game.variables.set(arg(command, 0)?, 0);
            Ok(Flow::Next)
        }
        Opcode::Toggle => {
            exec.env
                .game
                .variables
                .update(arg(command, 0)?, |v| i32::from(v == 0));
            Ok(Flow::Next)
        }

        Opcode::If => {
            let comparison = Comparison::parse(&command.args)?;
            Ok(branch(comparison.evaluate(&exec.env.game.variables)))
        }
        Opcode::IfNot => {
            let comparison = Comparison::parse(&command.args)?;
            Ok(branch(!comparison.evaluate(&exec.env.game.variables)))
        }
        Opcode::IfFlag => Ok(branch(exec.env.game.variables.get(arg(command, 0)?) != 0)),
        Opcode::IfNotFlag => Ok(branch(exec.env.game.variables.get(arg(command, 0)?) == 0)),
        Opcode::IfAnswer => {
            let wanted = exec.value(command, 0)?;
            Ok(branch(exec.env.game.last_answer == Some(wanted)))
        }
        Opcode::IfHave => Ok(branch(exec.env.game.inventory.contains(arg(command, 0)?))),
        Opcode::IfNotHave => Ok(branch(!exec.env.game.inventory.contains(arg(command, 0)?))),
        Opcode::IfVisible => {
            let id = arg(command, 0)?;
            let visible = exec.env.world.elements.get(id).map(|e| e.visible);
            if visible.is_none() {
                warn!("IFVISIBLE: unknown element {id}");
            }
            Ok(branch(visible.unwrap_or(false)))
        }
        Opcode::IfWalking => {
            let id = arg(command, 0)?;
            let walking = exec.env.world.persons.get(id).map(Person::is_walking);
            if walking.is_none() {
                warn!("IFWALKING: unknown person {id}");
            }
            Ok(branch(walking.unwrap_or(false)))
        }
        Opcode::IfPrevScene => {
            let scene = arg(command, 0)?;
            Ok(branch(exec.env.game.previous_scene.as_deref() == Some(scene)))
        }
        Opcode::IfArea => {
            let id = arg(command, 0)?;
            Ok(branch(exec.env.world.areas.get(id).is_some_and(|a| a.enabled)))
        }
        Opcode::IfMacro => Ok(branch(exec.macro_active(arg(command, 0)?))),
        Opcode::Else => Ok(Flow::SkipElse),
        Opcode::EndIf | Opcode::Label => Ok(Flow::Next),

        Opcode::WaitWhile => Ok(Flow::Block(WaitCondition::While {
            comparison: Comparison::parse(&command.args)?,
        })),
        Opcode::WaitUntil => Ok(Flow::Block(WaitCondition::Until {
            comparison: Comparison::parse(&command.args)?,
        })),
        Opcode::DoNothing => Ok(Flow::Block(match exec.optional_value(command, 0) {
            Some(frames) => WaitCondition::Frames {
                remaining: frames.max(0) as u32,
            },
            None => WaitCondition::Forever,
        })),
        Opcode::Wait => Ok(Flow::Block(WaitCondition::Frames {
            remaining: exec.value(command, 0)?.max(0) as u32,
        })),
        Opcode::Goto => Ok(Flow::Goto(arg(command, 0)?.to_string())),
        Opcode::Loop => Ok(Flow::Restart),
        Opcode::ReactiveSelf => Ok(Flow::ReactiveSelf),
        Opcode::Stop => Ok(Flow::Stop),
        Opcode::End => Ok(Flow::End),

        Opcode::Start => exec.request(command, MacroRequest::Start),
        Opcode::StartWait => {
            exec.request(command, MacroRequest::Start)?;
            Ok(Flow::Block(WaitCondition::MacroFinished {
                macro_id: arg(command, 0)?.to_string(),
            }))
        }
        Opcode::Kill => exec.request(command, MacroRequest::Kill),
        Opcode::Pause => exec.request(command, MacroRequest::Pause),
        Opcode::Resume => exec.request(command, MacroRequest::Resume),
        Opcode::WaitMacro => Ok(Flow::Block(WaitCondition::MacroFinished {
            macro_id: arg(command, 0)?.to_string(),
        })),
        Opcode::Log => {
            let text = command.text_from(0);
            info!("[{}] {text}", exec.current);
            exec.env.host.event(EngineEvent::Log {
                source: exec.current.to_string(),
                text,
            });
            Ok(Flow::Next)
        }
        Opcode::DebugVars => {
            for (name, value) in exec.env.game.variables.iter() {
                debug!("[{}] {name} = {value}", exec.current);
            }
            Ok(Flow::Next)
        }

        op @ (Opcode::Show
        | Opcode::Hide
        | Opcode::Pos
        | Opcode::Move
        | Opcode::MoveTo
        | Opcode::MoveToWait
        | Opcode::MoveToAsync
        | Opcode::Anima
        | Opcode::AnimaWait
        | Opcode::AnimaOnce
        | Opcode::StopAnim
        | Opcode::Frame
        | Opcode::Bitmap
        | Opcode::Flip
        | Opcode::WaitAnim) => element_command(op, command, exec),

        op @ (Opcode::WalkTo
        | Opcode::WalkToWait
        | Opcode::WalkToAsync
        | Opcode::WalkToElement
        | Opcode::WalkToElementWait
        | Opcode::WalkToArea
        | Opcode::WalkToAreaWait
        | Opcode::Place
        | Opcode::Turn
        | Opcode::TurnTo
        | Opcode::Speed
        | Opcode::ShowPerson
        | Opcode::HidePerson
        | Opcode::SetPlayer
        | Opcode::Stand
        | Opcode::PersonAnim
        | Opcode::PersonAnimWait
        | Opcode::PersonAnimOnce
        | Opcode::Say
        | Opcode::SayWait
        | Opcode::SayAsync
        | Opcode::Follow
        | Opcode::Unfollow
        | Opcode::WaitWalk) => person_command(op, command, exec),

        op @ (Opcode::EnableArea
        | Opcode::DisableArea
        | Opcode::AreaMacro
        | Opcode::Click
        | Opcode::Dialog
        | Opcode::DialogWait
        | Opcode::Answer
        | Opcode::EnableAnswer
        | Opcode::DisableAnswer
        | Opcode::ShowFace
        | Opcode::HideFace) => interaction_command(op, command, exec),

        op @ (Opcode::Scene
        | Opcode::Scroll
        | Opcode::ScrollTo
        | Opcode::ScrollToWait
        | Opcode::ScrollToPerson
        | Opcode::WaitScroll
        | Opcode::Background
        | Opcode::FadeIn
        | Opcode::FadeInWait
        | Opcode::FadeOut
        | Opcode::FadeOutWait
        | Opcode::WaitFade
        | Opcode::Film
        | Opcode::FilmWait
        | Opcode::Insertion
        | Opcode::InsertionWait
        | Opcode::InsertionOnce
        | Opcode::StopInsertion) => presentation_command(op, command, exec),

        op @ (Opcode::Music
        | Opcode::StopMusic
        | Opcode::Sound
        | Opcode::SoundWait
        | Opcode::StopSound
        | Opcode::Volume
        | Opcode::Voice
        | Opcode::VoiceWait
        | Opcode::Cursor
        | Opcode::ShowCursor
        | Opcode::HideCursor
        | Opcode::DisableInput
        | Opcode::EnableInput
        | Opcode::Take
        | Opcode::Drop
        | Opcode::Quit) => host_command(op, command, exec),
    }
}

fn arithmetic(
    command: &MacroCommand,
    exec: &mut Exec<'_, '_>,
    apply: fn(i32, i32) -> i32,
    takes_operand: bool,
) -> Result<Flow> {
    let operand = if takes_operand {
        exec.value(command, 1)?
    } else {
        0
    };
    exec.env
        .game
        .variables
        .update(arg(command, 0)?, |value| apply(value, operand));
    Ok(Flow::Next)
}

fn element_command(op: Opcode, command: &MacroCommand, exec: &mut Exec<'_, '_>) -> Result<Flow> {
    let id = arg(command, 0)?;
    if !exec.env.world.elements.contains_key(id) {
        bail!("unknown element {id}");
    }

    match op {
        Opcode::Show | Opcode::Hide => {
            element(exec.env.world, id)?.visible = op == Opcode::Show;
        }
        Opcode::Pos => {
            let at = exec.point(command, 1)?;
            let target = element(exec.env.world, id)?;
            target.motion = None;
            target.window.move_to(at.x, at.y);
        }
        Opcode::Move => {
            let delta = exec.point(command, 1)?;
            let target = element(exec.env.world, id)?;
            let at = target.position();
            target.window.move_to(at.x + delta.x, at.y + delta.y);
        }
        Opcode::MoveTo | Opcode::MoveToWait | Opcode::MoveToAsync => {
            let to = exec.point(command, 1)?;
            let speed = exec.optional_value(command, 3).unwrap_or(DEFAULT_MOVE_SPEED);
            element(exec.env.world, id)?.motion = Some(Motion {
                target: to,
                speed: speed.max(1),
            });
            if op == Opcode::MoveToWait {
                return Ok(Flow::Block(WaitCondition::ElementIdle {
                    element: id.to_string(),
                }));
            }
        }
        Opcode::Anima | Opcode::AnimaWait | Opcode::AnimaOnce => {
            let mode = if op == Opcode::Anima {
                PlayMode::Loop
            } else {
                PlayMode::Once
            };
            let animation = exec.animation(arg(command, 1)?, id, mode)?;
            element(exec.env.world, id)?.play(animation);
            if op == Opcode::AnimaWait {
                return Ok(Flow::Block(WaitCondition::ElementAnimation {
                    element: id.to_string(),
                }));
            }
        }
        Opcode::StopAnim => element(exec.env.world, id)?.stop_animation(),
        Opcode::Frame => {
            let frame = exec.value(command, 1)?.max(0) as u32;
            let target = element(exec.env.world, id)?;
            let animation = target
                .animation
                .as_mut()
                .ok_or_else(|| anyhow!("element {id} has no animation"))?;
            animation.seek(frame)?;
            target.sync_window();
        }
        Opcode::Bitmap => {
            let surface = exec.env.resources.load_surface(arg(command, 1)?)?;
            element(exec.env.world, id)?.set_bitmap(surface);
        }
        Opcode::Flip => {
            let target = element(exec.env.world, id)?;
            target.flip = !target.flip;
        }
        Opcode::WaitAnim => {
            return Ok(Flow::Block(WaitCondition::ElementAnimation {
                element: id.to_string(),
            }));
        }
        _ => bail!("{} is not an element command", op.name()),
    }
    Ok(Flow::Next)
}

fn person_command(op: Opcode, command: &MacroCommand, exec: &mut Exec<'_, '_>) -> Result<Flow> {
    let id = arg(command, 0)?;
    if !exec.env.world.persons.contains_key(id) {
        bail!("unknown person {id}");
    }
    let idle = || {
        Flow::Block(WaitCondition::PersonIdle {
            person: id.to_string(),
        })
    };

    match op {
        Opcode::WalkTo | Opcode::WalkToWait | Opcode::WalkToAsync => {
            let to = exec.point(command, 1)?;
            walk(exec.env.world, id, to)?;
            if op == Opcode::WalkToWait {
                return Ok(idle());
            }
        }
        Opcode::WalkToElement | Opcode::WalkToElementWait => {
            let target = arg(command, 1)?;
            let to = element(exec.env.world, target)?.foot_point();
            walk(exec.env.world, id, to)?;
            if op == Opcode::WalkToElementWait {
                return Ok(idle());
            }
        }
        Opcode::WalkToArea | Opcode::WalkToAreaWait => {
            let target = arg(command, 1)?;
            let to = area(exec.env.world, target)?.foot_point();
            walk(exec.env.world, id, to)?;
            if op == Opcode::WalkToAreaWait {
                return Ok(idle());
            }
        }
        Opcode::Place => {
            let at = exec.point(command, 1)?;
            let p = person(exec.env.world, id)?;
            p.position = at;
            p.walk_target = None;
        }
        Opcode::Turn => {
            let token = arg(command, 1)?;
            let direction =
                Direction::parse(token).ok_or_else(|| anyhow!("bad direction {token:?}"))?;
            person(exec.env.world, id)?.direction = direction;
        }
        Opcode::TurnTo => {
            let other = arg(command, 1)?;
            let towards = person(exec.env.world, other)?.position;
            let p = person(exec.env.world, id)?;
            if let Some(direction) =
                Direction::from_delta(towards.x - p.position.x, towards.y - p.position.y)
            {
                p.direction = direction;
            }
        }
        Opcode::Speed => {
            let speed = exec.value(command, 1)?;
            person(exec.env.world, id)?.speed = speed.max(1);
        }
        Opcode::ShowPerson | Opcode::HidePerson => {
            person(exec.env.world, id)?.visible = op == Opcode::ShowPerson;
        }
        Opcode::SetPlayer => exec.env.world.player = Some(id.to_string()),
        Opcode::Stand => {
            let p = person(exec.env.world, id)?;
            p.walk_target = None;
            p.animation = None;
        }
        Opcode::PersonAnim | Opcode::PersonAnimWait | Opcode::PersonAnimOnce => {
            let mode = if op == Opcode::PersonAnim {
                PlayMode::Loop
            } else {
                PlayMode::Once
            };
            let animation = exec.animation(arg(command, 1)?, id, mode)?;
            person(exec.env.world, id)?.animation = Some(animation);
            if op == Opcode::PersonAnimWait {
                return Ok(Flow::Block(WaitCondition::PersonAnimation {
                    person: id.to_string(),
                }));
            }
        }
        Opcode::Say | Opcode::SayWait | Opcode::SayAsync => {
            let text = command.text_from(1);
            let words = text.split_whitespace().count().max(1) as u32;
            let frames_left = words.saturating_mul(exec.env.settings.speech_frames_per_word.max(1));
            person(exec.env.world, id)?.speech = Some(Speech {
                text: text.clone(),
                frames_left,
            });
            exec.env.host.event(EngineEvent::Speech {
                person: id.to_string(),
                text,
            });
            if op == Opcode::SayWait {
                return Ok(Flow::Block(WaitCondition::Speech {
                    person: id.to_string(),
                }));
            }
        }
        Opcode::Follow => {
            let leader = arg(command, 1)?;
            if !exec.env.world.persons.contains_key(leader) {
                bail!("unknown person {leader}");
            }
            person(exec.env.world, id)?.follow = Some(leader.to_string());
        }
        Opcode::Unfollow => person(exec.env.world, id)?.follow = None,
        Opcode::WaitWalk => return Ok(idle()),
        _ => bail!("{} is not a person command", op.name()),
    }
    Ok(Flow::Next)
}

fn walk(world: &mut World, id: &str, to: Point) -> Result<()> {
    let target = world.walk.clamp(to);
    if target != to {
        debug!("{id}: walk target {to:?} clamped to {target:?}");
    }
    person(world, id)?.walk_target = Some(target);
    Ok(())
}

fn interaction_command(op: Opcode, command: &MacroCommand, exec: &mut Exec<'_, '_>) -> Result<Flow> {
    match op {
        Opcode::EnableArea | Opcode::DisableArea => {
            area(exec.env.world, arg(command, 0)?)?.enabled = op == Opcode::EnableArea;
        }
        Opcode::AreaMacro => {
            let macro_id = arg(command, 1)?;
            area(exec.env.world, arg(command, 0)?)?.macro_id =
                (macro_id != "-").then(|| macro_id.to_string());
        }
        Opcode::Click => {
            let id = arg(command, 0)?;
            let macro_id = area(exec.env.world, id)?
                .macro_id
                .clone()
                .ok_or_else(|| anyhow!("area {id} has no macro"))?;
            if !exec.macro_exists(&macro_id) {
                bail!("area {id} names unknown macro {macro_id}");
            }
            exec.requests.push(MacroRequest::Start(macro_id));
        }
        Opcode::Dialog | Opcode::DialogWait => {
            let id = arg(command, 0)?;
            let answers = exec
                .env
                .world
                .dialogs
                .get(id)
                .ok_or_else(|| anyhow!("unknown dialog {id}"))?
                .enabled_answers();
            exec.env.world.active_dialog = Some(id.to_string());
            exec.env.game.last_answer = None;
            exec.env.host.event(EngineEvent::DialogShown {
                dialog: id.to_string(),
                answers,
            });
            if op == Opcode::DialogWait {
                return Ok(Flow::Block(WaitCondition::DialogAnswered));
            }
        }
        Opcode::Answer => {
            let number = exec.value(command, 0)?;
            let env = &mut *exec.env;
            env.world.answer_dialog(number, env.game, env.host);
        }
        Opcode::EnableAnswer | Opcode::DisableAnswer => {
            let id = arg(command, 0)?;
            let number = exec.value(command, 1)?;
            let answer = exec
                .env
                .world
                .dialogs
                .get_mut(id)
                .ok_or_else(|| anyhow!("unknown dialog {id}"))?
                .answer_mut(number)
                .ok_or_else(|| anyhow!("dialog {id} has no answer {number}"))?;
            answer.enabled = op == Opcode::EnableAnswer;
        }
        Opcode::ShowFace => {
            let id = arg(command, 0)?;
            if !exec.env.world.faces.contains_key(id) {
                bail!("no face for {id}");
            }
            exec.env.world.face = Some(id.to_string());
            exec.env.host.event(EngineEvent::FaceShown {
                person: id.to_string(),
            });
        }
        Opcode::HideFace => {
            exec.env.world.face = None;
            exec.env.host.event(EngineEvent::FaceHidden);
        }
        _ => bail!("{} is not an interaction command", op.name()),
    }
    Ok(Flow::Next)
}

fn presentation_command(op: Opcode, command: &MacroCommand, exec: &mut Exec<'_, '_>) -> Result<Flow> {
    match op {
        Opcode::Scene => {
            let name = arg(command, 0)?;
            exec.env.game.request_scene(name);
            exec.env.host.event(EngineEvent::SceneRequested {
                scene: name.to_string(),
            });
        }
        Opcode::Scroll => {
            let dx = exec.value(command, 0)?;
            let world = &mut *exec.env.world;
            world.scroll.target = None;
            world.set_scroll(world.scroll.x + dx);
        }
        Opcode::ScrollTo | Opcode::ScrollToWait => {
            let x = exec.value(command, 0)?;
            let speed = exec.optional_value(command, 1).unwrap_or(DEFAULT_SCROLL_SPEED);
            exec.env.world.scroll_to(x, speed);
            if op == Opcode::ScrollToWait {
                return Ok(Flow::Block(WaitCondition::Scroll));
            }
        }
        Opcode::ScrollToPerson => {
            let id = arg(command, 0)?;
            let x = person(exec.env.world, id)?.position.x;
            let world = &mut *exec.env.world;
            world.scroll.target = None;
            world.set_scroll(x - world.screen_width / 2);
        }
        Opcode::WaitScroll => return Ok(Flow::Block(WaitCondition::Scroll)),
        Opcode::Background => {
            let surface = exec.env.resources.load_surface(arg(command, 0)?)?;
            let world = &mut *exec.env.world;
            world.background = surface;
            world.set_scroll(world.scroll.x);
        }
        Opcode::FadeIn | Opcode::FadeInWait | Opcode::FadeOut | Opcode::FadeOutWait => {
            let step = fade_step(exec.optional_value(command, 0));
            let fade = &mut exec.env.world.fade;
            fade.step = step;
            fade.target = if matches!(op, Opcode::FadeIn | Opcode::FadeInWait) {
                u8::MAX
            } else {
                0
            };
            if matches!(op, Opcode::FadeInWait | Opcode::FadeOutWait) {
                return Ok(Flow::Block(WaitCondition::Fade));
            }
        }
        Opcode::WaitFade => return Ok(Flow::Block(WaitCondition::Fade)),
        Opcode::Film | Opcode::FilmWait => {
            let film = arg(command, 0)?;
            let resource = match exec.env.world.films.get(film) {
                Some(resource) => resource.clone(),
                None => {
                    debug!("film {film} not listed; using it as a resource name");
                    film.to_string()
                }
            };
            exec.env.game.request_film(&resource);
            exec.env.host.event(EngineEvent::FilmRequested {
                film: film.to_string(),
                resource: resource.clone(),
            });
            if op == Opcode::FilmWait {
                return Ok(Flow::Block(WaitCondition::Media { name: resource }));
            }
        }
        Opcode::Insertion | Opcode::InsertionWait | Opcode::InsertionOnce => {
            let id = arg(command, 0)?;
            let resource = exec
                .env
                .world
                .insertions
                .get(id)
                .ok_or_else(|| anyhow!("unknown insertion {id}"))?
                .resource
                .clone();
            let mode = if op == Opcode::Insertion {
                PlayMode::Loop
            } else {
                PlayMode::Once
            };
            let animation = exec.animation(&resource, id, mode)?;
            if let Some(insertion) = exec.env.world.insertions.get_mut(id) {
                insertion.animation = Some(animation);
            }
            if op == Opcode::InsertionWait {
                return Ok(Flow::Block(WaitCondition::Insertion {
                    insertion: id.to_string(),
                }));
            }
        }
        Opcode::StopInsertion => {
            let id = arg(command, 0)?;
            exec.env
                .world
                .insertions
                .get_mut(id)
                .ok_or_else(|| anyhow!("unknown insertion {id}"))?
                .animation = None;
        }
        _ => bail!("{} is not a presentation command", op.name()),
    }
    Ok(Flow::Next)
}

fn host_command(op: Opcode, command: &MacroCommand, exec: &mut Exec<'_, '_>) -> Result<Flow> {
    let host = exec.env.host;
    let game = &mut *exec.env.game;
    match op {
        Opcode::Music => host.event(EngineEvent::MusicPlay {
            name: arg(command, 0)?.to_string(),
        }),
        Opcode::StopMusic => host.event(EngineEvent::MusicStop),
        Opcode::Sound | Opcode::SoundWait => {
            let name = arg(command, 0)?.to_string();
            host.event(EngineEvent::SoundPlay { name: name.clone() });
            if op == Opcode::SoundWait {
                return Ok(Flow::Block(WaitCondition::Media { name }));
            }
        }
        Opcode::StopSound => host.event(EngineEvent::SoundStop {
            name: arg(command, 0)?.to_string(),
        }),
        Opcode::Volume => {
            let level = Operand::parse(arg(command, 0)?).value(&game.variables);
            host.event(EngineEvent::Volume { level });
        }
        Opcode::Voice | Opcode::VoiceWait => {
            let name = arg(command, 0)?.to_string();
            host.event(EngineEvent::Voice { name: name.clone() });
            if op == Opcode::VoiceWait {
                return Ok(Flow::Block(WaitCondition::Media { name }));
            }
        }
        Opcode::Cursor | Opcode::ShowCursor | Opcode::HideCursor => {
            match op {
                Opcode::Cursor => game.cursor = Some(arg(command, 0)?.to_string()),
                Opcode::ShowCursor => game.cursor_visible = true,
                _ => game.cursor_visible = false,
            }
            host.event(EngineEvent::Cursor {
                name: game.cursor.clone(),
                visible: game.cursor_visible,
            });
        }
        Opcode::DisableInput => game.input_enabled = false,
        Opcode::EnableInput => game.input_enabled = true,
        Opcode::Take => {
            game.inventory.insert(arg(command, 0)?.to_string());
        }
        Opcode::Drop => {
            let item = arg(command, 0)?;
            if !game.inventory.remove(item) {
                debug!("DROP {item}: not carried");
            }
        }
        Opcode::Quit => {
            game.quit_requested = true;
            host.event(EngineEvent::Quit);
        }
        _ => bail!("{} is not a host command", op.name()),
    }
    Ok(Flow::Next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::GameState;
    use crate::host::RecordingHost;
    use crate::resources::ResourceManager;
    use crate::scene::entities::{Dialog, DialogAnswer, Graphic};
    use crate::scene::SceneSettings;
    use orlando_formats::Surface;

    struct Harness {
        world: World,
        game: GameState,
        host: RecordingHost,
        resources: ResourceManager,
        settings: SceneSettings,
        macros: BTreeMap<String, MacroRun>,
    }

    impl Harness {
        fn new() -> Self {
            let settings = SceneSettings::default();
            let mut world = World::new(Surface::new(1280, 480), &settings);
            let mut graphics: [Option<Graphic>; 8] = Default::default();
            graphics[0] = Some(Graphic::Still(Surface::new(2, 2)));
            world
                .persons
                .insert("JACK".into(), Person::new("JACK", Point::new(10, 10), 2, graphics));
            world.elements.insert(
                "DOOR".into(),
                Element::new("DOOR", 100, 50, Graphic::Still(Surface::new(10, 20))),
            );
            world.dialogs.insert(
                "ASK".into(),
                Dialog {
                    id: "ASK".into(),
                    answers: vec![
                        DialogAnswer {
                            text: "yes".into(),
                            enabled: true,
                        },
                        DialogAnswer {
                            text: "no".into(),
                            enabled: false,
                        },
                    ],
                },
            );
            Self {
                world,
                game: GameState::new(Some(1)),
                host: RecordingHost::new(),
                resources: ResourceManager::new(std::env::temp_dir(), Vec::new(), false),
                settings,
                macros: BTreeMap::new(),
            }
        }

        fn run(&mut self, line: &str) -> (Result<Flow>, Vec<MacroRequest>) {
            let mut tokens = line.split_whitespace();
            let name = tokens.next().unwrap();
            let command = MacroCommand::new(name, tokens.map(String::from).collect(), 1);
            let mut env = ScriptEnv {
                world: &mut self.world,
                game: &mut self.game,
                host: &self.host,
                resources: &self.resources,
                settings: &self.settings,
            };
            let mut exec = Exec {
                env: &mut env,
                current: "TEST",
                macros: &self.macros,
                requests: Vec::new(),
            };
            let flow = execute(&command, &mut exec);
            (flow, exec.requests)
        }

        fn flow(&mut self, line: &str) -> Flow {
            self.run(line).0.unwrap()
        }
    }

    #[test]
    fn arithmetic_reads_variables_as_operands() {
        let mut h = Harness::new();
        h.flow("LET A 6");
        h.flow("LET B A");
        h.flow("MUL B 7");
        h.flow("SUB B A");
        h.flow("MOD B 5");
        assert_eq!(h.game.variables.get("B"), 1);
        h.flow("DIV B 0");
        assert_eq!(h.game.variables.get("B"), 1);
        h.flow("TOGGLE F");
        h.flow("TOGGLE F");
        h.flow("TOGGLE F");
        assert_eq!(h.game.variables.get("F"), 1);
    }

    #[test]
    fn random_stays_below_its_bound() {
        let mut h = Harness::new();
        for _ in 0..50 {
            h.flow("RANDOM R 4");
            assert!((0..4).contains(&h.game.variables.get("R")));
        }
    }

    #[test]
    fn conditionals_choose_between_next_and_skip() {
        let mut h = Harness::new();
        assert_eq!(h.flow("IF X 0"), Flow::Next);
        assert_eq!(h.flow("IFNOT X 0"), Flow::SkipBranch);
        assert_eq!(h.flow("IFHAVE KEY"), Flow::SkipBranch);
        h.flow("TAKE KEY");
        assert_eq!(h.flow("IFHAVE KEY"), Flow::Next);
        assert_eq!(h.flow("IFVISIBLE DOOR"), Flow::Next);
        assert_eq!(h.flow("IFVISIBLE GHOST"), Flow::SkipBranch);
        assert_eq!(h.flow("ELSE"), Flow::SkipElse);
    }

    #[test]
    fn blocking_walk_clamps_and_waits_for_the_person() {
        let mut h = Harness::new();
        let flow = h.flow("WALKTO- JACK 40 10");
        assert_eq!(
            flow,
            Flow::Block(WaitCondition::PersonIdle {
                person: "JACK".into()
            })
        );
        assert_eq!(h.world.persons["JACK"].walk_target, Some(Point::new(40, 10)));
        assert_eq!(h.flow("WALKTO+ JACK 0 0"), Flow::Next);
    }

    #[test]
    fn unknown_entities_are_errors() {
        let mut h = Harness::new();
        assert!(h.run("SHOW GHOST").0.is_err());
        assert!(h.run("WALKTO NOBODY 1 1").0.is_err());
        assert!(h.run("LET").0.is_err());
        assert!(h.run("START NOWHERE").0.is_err());
    }

    #[test]
    fn dialogs_report_enabled_answers() {
        let mut h = Harness::new();
        assert_eq!(h.flow("DIALOG- ASK"), Flow::Block(WaitCondition::DialogAnswered));
        assert_eq!(h.world.active_dialog.as_deref(), Some("ASK"));
        h.flow("ANSWER 2");
        assert_eq!(h.world.active_dialog.as_deref(), Some("ASK"));
        h.flow("ANSWER 1");
        assert!(h.world.active_dialog.is_none());
        assert_eq!(h.game.last_answer, Some(1));
        assert_eq!(
            h.host.events(),
            vec![
                EngineEvent::DialogShown {
                    dialog: "ASK".into(),
                    answers: vec!["yes".into()],
                },
                EngineEvent::DialogClosed {
                    dialog: "ASK".into(),
                    answer: 1,
                },
            ]
        );
    }

    #[test]
    fn say_sets_a_timer_per_word() {
        let mut h = Harness::new();
        let flow = h.flow("SAY- JACK hello there_friend");
        assert!(matches!(flow, Flow::Block(WaitCondition::Speech { .. })));
        let speech = h.world.persons["JACK"].speech.clone().unwrap();
        assert_eq!(speech.text, "hello there friend");
        assert_eq!(speech.frames_left, 3 * h.settings.speech_frames_per_word);
    }

    #[test]
    fn start_requests_are_deferred() {
        let mut h = Harness::new();
        let (flow, requests) = h.run("START- TEST");
        assert!(matches!(flow.unwrap(), Flow::Block(WaitCondition::MacroFinished { .. })));
        assert_eq!(requests, vec![MacroRequest::Start("TEST".into())]);
    }

    #[test]
    fn frame_waits_count_down() {
        let mut h = Harness::new();
        let mut wait = WaitCondition::Frames { remaining: 2 };
        let mut env = ScriptEnv {
            world: &mut h.world,
            game: &mut h.game,
            host: &h.host,
            resources: &h.resources,
            settings: &h.settings,
        };
        let exec = Exec {
            env: &mut env,
            current: "TEST",
            macros: &h.macros,
            requests: Vec::new(),
        };
        assert!(!exec.poll(&mut wait));
        assert!(exec.poll(&mut wait));
    }

    #[test]
    fn scroll_and_fade_targets_are_set() {
        let mut h = Harness::new();
        assert_eq!(h.flow("SCROLLTO- 9999 20"), Flow::Block(WaitCondition::Scroll));
        assert_eq!(h.world.scroll.target, Some(h.world.max_scroll()));
        h.flow("SCROLLTOPERSON JACK");
        assert_eq!(h.world.scroll.x, 0);
        assert!(h.world.scroll.target.is_none());

        h.flow("FADEOUT 5");
        assert_eq!((h.world.fade.target, h.world.fade.step), (0, 51));
    }
}
