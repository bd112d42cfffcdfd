//! Per-frame macro execution.
//!
//! Every enabled macro runs exactly one command per frame. Commands that
//! block leave the macro in [`MacroState::Blocked`] with a [`WaitCondition`]
//! that is polled on later frames; the frame that releases a macro does not
//! also run its next command.

mod dispatch;

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, warn};
use serde::Serialize;

use crate::condition::WaitCondition;
use crate::game::GameState;
use crate::host::HostCallback;
use crate::opcode::Opcode;
use crate::resources::ResourceManager;
use crate::scene::{SceneSettings, World};
use crate::script::Macro;
use dispatch::{Exec, Flow, MacroRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MacroState {
    Disabled,
    Running,
    Blocked,
    /// Ran past its last command; disabled (or restarted) on the next frame.
    Terminated,
}

/// Everything a command may touch besides the interpreter itself.
pub struct ScriptEnv<'a> {
    pub world: &'a mut World,
    pub game: &'a mut GameState,
    pub host: &'a dyn HostCallback,
    pub resources: &'a ResourceManager,
    pub settings: &'a SceneSettings,
}

/// Execution state of one macro.
#[derive(Debug, Clone)]
pub struct MacroRun {
    script: Macro,
    pc: usize,
    state: MacroState,
    wait: Option<WaitCondition>,
    paused: bool,
    restart: bool,
    warned_unknown: BTreeSet<usize>,
}

impl MacroRun {
    fn new(script: Macro) -> Self {
        Self {
            script,
            pc: 0,
            state: MacroState::Disabled,
            wait: None,
            paused: false,
            restart: false,
            warned_unknown: BTreeSet::new(),
        }
    }

    pub fn script(&self) -> &Macro {
        &self.script
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn state(&self) -> MacroState {
        self.state
    }

    pub fn wait(&self) -> Option<&WaitCondition> {
        self.wait.as_ref()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, MacroState::Running | MacroState::Blocked)
    }

    fn start(&mut self) {
        self.pc = 0;
        self.state = MacroState::Running;
        self.wait = None;
        self.paused = false;
        self.restart = false;
    }

    fn disable(&mut self) {
        self.state = MacroState::Disabled;
        self.wait = None;
        self.paused = false;
    }

    fn terminate(&mut self) {
        self.state = MacroState::Terminated;
        self.wait = None;
    }

    fn advance_to(&mut self, pc: usize) {
        self.pc = pc;
        if self.pc >= self.script.len() {
            self.terminate();
        }
    }
}

/// Serializable view of one macro, for dumps.
#[derive(Debug, Clone, Serialize)]
pub struct MacroStatus {
    pub id: String,
    pub state: MacroState,
    pub pc: usize,
    pub paused: bool,
    pub wait: Option<WaitCondition>,
}

/// Index after the `ELSE` or `ENDIF` matching the conditional at `from`.
fn skip_false_branch(script: &Macro, from: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (index, command) in script.commands().iter().enumerate().skip(from + 1) {
        match command.opcode {
            op if op.is_conditional() => depth += 1,
            Opcode::Else if depth == 0 => return Some(index + 1),
            Opcode::EndIf if depth == 0 => return Some(index + 1),
            Opcode::EndIf => depth -= 1,
            _ => {}
        }
    }
    None
}

/// Index after the `ENDIF` closing the block whose `ELSE` sits at `from`.
fn skip_else_branch(script: &Macro, from: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (index, command) in script.commands().iter().enumerate().skip(from + 1) {
        match command.opcode {
            op if op.is_conditional() => depth += 1,
            Opcode::EndIf if depth == 0 => return Some(index + 1),
            Opcode::EndIf => depth -= 1,
            _ => {}
        }
    }
    None
}

/// All macros of a scene, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct Interpreter {
    runs: BTreeMap<String, MacroRun>,
}

impl Interpreter {
    pub fn new<M>(macros: M) -> Self
    where
        M: IntoIterator<Item = Macro>,
    {
        let mut runs = BTreeMap::new();
        for script in macros {
            let id = script.id().to_string();
            if runs.insert(id.clone(), MacroRun::new(script)).is_some() {
                warn!("macro {id} defined twice; keeping the last definition");
            }
        }
        Interpreter { runs }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.runs.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn macro_ids(&self) -> impl Iterator<Item = &str> {
        self.runs.keys().map(String::as_str)
    }

    pub fn run(&self, id: &str) -> Option<&MacroRun> {
        self.runs.get(id)
    }

    pub fn state(&self, id: &str) -> Option<MacroState> {
        self.runs.get(id).map(MacroRun::state)
    }

    pub fn pc(&self, id: &str) -> Option<usize> {
        self.runs.get(id).map(MacroRun::pc)
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.runs.get(id).is_some_and(MacroRun::is_active)
    }

    /// (Re)start `id` from its first command. `false` if no such macro.
    pub fn start(&mut self, id: &str) -> bool {
        match self.runs.get_mut(id) {
            Some(run) => {
                debug!("macro {id} started");
                run.start();
                true
            }
            None => {
                warn!("cannot start unknown macro {id}");
                false
            }
        }
    }

    pub fn kill(&mut self, id: &str) -> bool {
        match self.runs.get_mut(id) {
            Some(run) => {
                debug!("macro {id} killed");
                run.disable();
                true
            }
            None => false,
        }
    }

    pub fn pause(&mut self, id: &str) -> bool {
        self.runs.get_mut(id).map(|run| run.paused = true).is_some()
    }

    pub fn resume(&mut self, id: &str) -> bool {
        self.runs.get_mut(id).map(|run| run.paused = false).is_some()
    }

    /// Disable every macro and rewind it.
    pub fn reset(&mut self) {
        for run in self.runs.values_mut() {
            run.disable();
            run.pc = 0;
            run.restart = false;
        }
    }

    pub fn status(&self) -> Vec<MacroStatus> {
        self.runs
            .iter()
            .map(|(id, run)| MacroStatus {
                id: id.clone(),
                state: run.state,
                pc: run.pc,
                paused: run.paused,
                wait: run.wait.clone(),
            })
            .collect()
    }

    /// One frame: one step of every macro that is not disabled when the
    /// frame begins, in id order.
    pub fn step_all(&mut self, env: &mut ScriptEnv<'_>) {
        let scheduled: Vec<String> = self
            .runs
            .iter()
            .filter(|(_, run)| run.state != MacroState::Disabled)
            .map(|(id, _)| id.clone())
            .collect();
        for id in scheduled {
            self.step_macro(&id, env);
        }
    }

    /// One step of a single macro. Returns `false` when it does not exist.
    pub fn step_macro(&mut self, id: &str, env: &mut ScriptEnv<'_>) -> bool {
        let Some(mut run) = self.runs.remove(id) else {
            return false;
        };
        let mut exec = Exec {
            env,
            current: id,
            macros: &self.runs,
            requests: Vec::new(),
        };
        step_run(&mut run, &mut exec);
        let requests = std::mem::take(&mut exec.requests);
        self.runs.insert(id.to_string(), run);
        for request in requests {
            self.apply(request);
        }
        true
    }

    fn apply(&mut self, request: MacroRequest) {
        match request {
            MacroRequest::Start(id) => {
                self.start(&id);
            }
            MacroRequest::Kill(id) => {
                if !self.kill(&id) {
                    warn!("cannot kill unknown macro {id}");
                }
            }
            MacroRequest::Pause(id) => {
                if !self.pause(&id) {
                    warn!("cannot pause unknown macro {id}");
                }
            }
            MacroRequest::Resume(id) => {
                if !self.resume(&id) {
                    warn!("cannot resume unknown macro {id}");
                }
            }
        }
    }
}

fn step_run(run: &mut MacroRun, exec: &mut Exec<'_, '_>) {
    match run.state {
        MacroState::Disabled => {}
        MacroState::Terminated => {
            if run.restart {
                debug!("macro {} restarting", exec.current);
                run.pc = 0;
                run.state = MacroState::Running;
            } else {
                debug!("macro {} finished", exec.current);
                run.disable();
            }
        }
        MacroState::Blocked if run.paused => {}
        MacroState::Blocked => {
            let released = match run.wait.as_mut() {
                Some(wait) => exec.poll(wait),
                None => true,
            };
            if released {
                run.wait = None;
                run.state = MacroState::Running;
            }
        }
        MacroState::Running if run.paused => {}
        MacroState::Running => execute_next(run, exec),
    }
}

fn execute_next(run: &mut MacroRun, exec: &mut Exec<'_, '_>) {
    let pc = run.pc;
    let Some(command) = run.script.command(pc) else {
        run.terminate();
        return;
    };

    if command.opcode == Opcode::Unknown {
        if run.warned_unknown.insert(pc) {
            warn!(
                "macro {}: skipping unknown command {:?} on line {}",
                exec.current, command.name, command.line
            );
        }
        run.advance_to(pc + 1);
        return;
    }

    let flow = match dispatch::execute(command, exec) {
        Ok(flow) => flow,
        Err(err) => {
            warn!(
                "macro {}: {} on line {} failed: {err:#}",
                exec.current, command.name, command.line
            );
            Flow::Next
        }
    };

    match flow {
        Flow::Next => run.advance_to(pc + 1),
        Flow::Block(wait) => {
            run.pc = pc + 1;
            run.state = MacroState::Blocked;
            run.wait = Some(wait);
        }
        Flow::SkipBranch => match skip_false_branch(&run.script, pc) {
            Some(next) => run.advance_to(next),
            None => {
                warn!(
                    "macro {}: conditional on line {} has no matching ENDIF",
                    exec.current, command.line
                );
                run.terminate();
            }
        },
        Flow::SkipElse => match skip_else_branch(&run.script, pc) {
            Some(next) => run.advance_to(next),
            None => {
                warn!(
                    "macro {}: ELSE on line {} has no matching ENDIF",
                    exec.current, command.line
                );
                run.terminate();
            }
        },
        Flow::Goto(label) => match run.script.label(&label) {
            Some(index) => run.advance_to(index),
            None => {
                warn!("macro {}: GOTO unknown label {label}", exec.current);
                run.advance_to(pc + 1);
            }
        },
        Flow::Restart => run.advance_to(0),
        Flow::ReactiveSelf => {
            run.restart = true;
            run.advance_to(pc + 1);
        }
        Flow::Stop => {
            run.restart = false;
            run.terminate();
        }
        Flow::End => run.terminate(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::RecordingHost;
    use orlando_formats::{Surface, TextParser};

    use crate::script::load_macros;

    struct Fixture {
        world: World,
        game: GameState,
        host: RecordingHost,
        resources: ResourceManager,
        settings: SceneSettings,
    }

    impl Fixture {
        fn new() -> Self {
            let settings = SceneSettings::default();
            Self {
                world: World::new(Surface::new(4, 4), &settings),
                game: GameState::new(Some(7)),
                host: RecordingHost::new(),
                resources: ResourceManager::new(std::env::temp_dir(), Vec::new(), false),
                settings,
            }
        }

        fn frame(&mut self, interpreter: &mut Interpreter) {
            let mut env = ScriptEnv {
                world: &mut self.world,
                game: &mut self.game,
                host: &self.host,
                resources: &self.resources,
                settings: &self.settings,
            };
            interpreter.step_all(&mut env);
            self.world.update();
        }

        fn run_until_idle(&mut self, interpreter: &mut Interpreter, id: &str) -> usize {
            let mut frames = 0;
            while interpreter.is_active(id) {
                assert!(frames < 1000, "macro {id} never finished");
                self.frame(interpreter);
                frames += 1;
            }
            frames
        }
    }

    fn interpreter(source: &str) -> Interpreter {
        Interpreter::new(load_macros(&mut TextParser::from_plain(source)))
    }

    #[test]
    fn one_command_per_frame() {
        let mut fixture = Fixture::new();
        let mut interp = interpreter("[A]\nINC X\nINC X\nINC X\n");
        interp.start("A");

        fixture.frame(&mut interp);
        assert_eq!(fixture.game.variables.get("X"), 1);
        assert_eq!(interp.pc("A"), Some(1));
        fixture.frame(&mut interp);
        fixture.frame(&mut interp);
        assert_eq!(fixture.game.variables.get("X"), 3);
        assert_eq!(interp.state("A"), Some(MacroState::Terminated));
        fixture.frame(&mut interp);
        assert_eq!(interp.state("A"), Some(MacroState::Disabled));
    }

    #[test]
    fn true_condition_runs_the_block() {
        let mut fixture = Fixture::new();
        let mut interp = interpreter("[A]\nLET X 0\nIF X 0\nINC X\nENDIF\n");
        interp.start("A");
        fixture.run_until_idle(&mut interp, "A");
        assert_eq!(fixture.game.variables.get("X"), 1);
    }

    #[test]
    fn false_condition_skips_to_endif() {
        let mut fixture = Fixture::new();
        let mut interp = interpreter("[A]\nLET X 1\nIF X 0\nINC X\nENDIF\n");
        interp.start("A");
        fixture.run_until_idle(&mut interp, "A");
        assert_eq!(fixture.game.variables.get("X"), 1);
    }

    #[test]
    fn nested_conditionals_match_by_depth() {
        let source = "[A]\nIF X 1\nIF Y 0\nLET R 1\nENDIF\nLET S 1\nELSE\nLET R 2\nENDIF\nINC DONE\n";
        let mut fixture = Fixture::new();
        let mut interp = interpreter(source);
        interp.start("A");
        fixture.run_until_idle(&mut interp, "A");
        let vars = &fixture.game.variables;
        assert_eq!((vars.get("R"), vars.get("S"), vars.get("DONE")), (2, 0, 1));

        let mut fixture = Fixture::new();
        fixture.game.variables.set("X", 1);
        let mut interp = interpreter(source);
        interp.start("A");
        fixture.run_until_idle(&mut interp, "A");
        let vars = &fixture.game.variables;
        assert_eq!((vars.get("R"), vars.get("S"), vars.get("DONE")), (1, 1, 1));
    }

    #[test]
    fn unknown_commands_are_skipped() {
        let mut fixture = Fixture::new();
        let mut interp = interpreter("[A]\nFROBNICATE 1\nINC X\n");
        interp.start("A");
        fixture.run_until_idle(&mut interp, "A");
        assert_eq!(fixture.game.variables.get("X"), 1);
    }

    #[test]
    fn wait_holds_for_the_given_frames() {
        let mut fixture = Fixture::new();
        let mut interp = interpreter("[A]\nWAIT 3\nINC X\n");
        interp.start("A");
        fixture.frame(&mut interp);
        assert_eq!(interp.state("A"), Some(MacroState::Blocked));
        for _ in 0..3 {
            fixture.frame(&mut interp);
        }
        assert_eq!(interp.state("A"), Some(MacroState::Running));
        assert_eq!(fixture.game.variables.get("X"), 0);
        fixture.frame(&mut interp);
        assert_eq!(fixture.game.variables.get("X"), 1);
    }

    #[test]
    fn waitwhile_releases_once_the_condition_flips() {
        let mut fixture = Fixture::new();
        let mut interp = interpreter("[A]\nWAITWHILE GO 0\nINC X\n[B]\nWAIT 2\nLET GO 1\n");
        interp.start("A");
        interp.start("B");
        for _ in 0..5 {
            fixture.frame(&mut interp);
        }
        assert_eq!(fixture.game.variables.get("X"), 0);
        fixture.frame(&mut interp);
        fixture.frame(&mut interp);
        assert_eq!(fixture.game.variables.get("X"), 1);
    }

    #[test]
    fn reactiveself_restarts_and_stop_ends_for_good() {
        let mut fixture = Fixture::new();
        let mut interp = interpreter("[A]\nREACTIVESELF\nINC X\n");
        interp.start("A");
        for _ in 0..8 {
            fixture.frame(&mut interp);
        }
        assert_eq!(fixture.game.variables.get("X"), 3);

        let mut interp = interpreter("[B]\nINC Y\nSTOP\nINC Y\n");
        interp.start("B");
        fixture.run_until_idle(&mut interp, "B");
        assert_eq!(fixture.game.variables.get("Y"), 1);
    }

    #[test]
    fn goto_and_labels() {
        let mut fixture = Fixture::new();
        let mut interp =
            interpreter("[A]\nLABEL TOP\nINC X\nIF X < 3\nGOTO TOP\nENDIF\n");
        interp.start("A");
        fixture.run_until_idle(&mut interp, "A");
        assert_eq!(fixture.game.variables.get("X"), 3);
    }

    #[test]
    fn start_wait_blocks_until_the_child_finishes() {
        let mut fixture = Fixture::new();
        let mut interp = interpreter("[CHILD]\nINC C\nINC C\n[MAIN]\nSTART- CHILD\nLET SEEN C\n");
        interp.start("MAIN");
        fixture.run_until_idle(&mut interp, "MAIN");
        assert_eq!(fixture.game.variables.get("SEEN"), 2);
    }

    #[test]
    fn kill_and_pause_apply_to_other_macros() {
        let mut fixture = Fixture::new();
        let mut interp = interpreter("[LOOPER]\nINC N\nLOOP\n[CTRL]\nWAIT 4\nPAUSE LOOPER\nWAIT 4\nKILL LOOPER\n");
        interp.start("LOOPER");
        interp.start("CTRL");
        for _ in 0..6 {
            fixture.frame(&mut interp);
        }
        let paused_at = fixture.game.variables.get("N");
        assert!(interp.run("LOOPER").unwrap().is_paused());
        for _ in 0..3 {
            fixture.frame(&mut interp);
        }
        assert_eq!(fixture.game.variables.get("N"), paused_at);
        fixture.run_until_idle(&mut interp, "CTRL");
        assert_eq!(interp.state("LOOPER"), Some(MacroState::Disabled));
    }

    #[test]
    fn missing_endif_terminates_the_macro() {
        let mut fixture = Fixture::new();
        let mut interp = interpreter("[A]\nIF X 1\nINC Y\n");
        interp.start("A");
        fixture.run_until_idle(&mut interp, "A");
        assert_eq!(fixture.game.variables.get("Y"), 0);
    }
}
