use std::collections::HashMap;

use log::warn;
use orlando_formats::TextParser;
use serde::Serialize;

use crate::opcode::{Completion, Opcode};

/// One parsed script line: a resolved opcode plus its raw argument tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MacroCommand {
    pub opcode: Opcode,
    /// Name as written in the script, kept for diagnostics.
    pub name: String,
    pub args: Vec<String>,
    pub completion: Completion,
    pub line: u32,
}

impl MacroCommand {
    pub fn new(name: &str, args: Vec<String>, line: u32) -> Self {
        let opcode = Opcode::resolve(name);
        Self {
            opcode,
            name: name.to_string(),
            args,
            completion: opcode.completion(),
            line,
        }
    }

    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }

    /// Arguments from `index` on, joined into display text (`_` reads as a space).
    pub fn text_from(&self, index: usize) -> String {
        self.args
            .get(index..)
            .unwrap_or_default()
            .join(" ")
            .replace('_', " ")
    }
}

/// A named command list. Immutable once loaded; execution state lives in the
/// interpreter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Macro {
    id: String,
    commands: Vec<MacroCommand>,
    #[serde(skip)]
    labels: HashMap<String, usize>,
}

impl Macro {
    pub fn new(id: impl Into<String>, commands: Vec<MacroCommand>) -> Self {
        let labels = commands
            .iter()
            .enumerate()
            .filter(|(_, command)| command.opcode == Opcode::Label)
            .filter_map(|(index, command)| Some((command.arg(0)?.to_string(), index)))
            .collect();
        Self {
            id: id.into(),
            commands,
            labels,
        }
    }

    /// Read commands until end of input or the next `[SECTION]` token.
    ///
    /// A command's arguments are the tokens on its line up to the next
    /// recognised command name.
    pub fn load(id: impl Into<String>, parser: &mut TextParser) -> Self {
        let id = id.into();
        let mut commands = Vec::new();

        while let Some(token) = parser.next_token() {
            if token.is_section() {
                parser.rewind();
                break;
            }

            let mut args = Vec::new();
            while let Some(arg) = parser.next_token() {
                if arg.is_section()
                    || arg.line != token.line
                    || Opcode::resolve(&arg.text) != Opcode::Unknown
                {
                    parser.rewind();
                    break;
                }
                args.push(arg.text);
            }

            let command = MacroCommand::new(&token.text, args, token.line);
            if command.opcode == Opcode::Unknown {
                warn!(
                    "macro {id}: unknown command {:?} on line {}",
                    token.text, token.line
                );
            }
            commands.push(command);
        }

        Macro::new(id, commands)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn commands(&self) -> &[MacroCommand] {
        &self.commands
    }

    pub fn command(&self, index: usize) -> Option<&MacroCommand> {
        self.commands.get(index)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn label(&self, name: &str) -> Option<usize> {
        self.labels.get(name).copied()
    }
}

/// Parse a whole macro file: `[ID]` headers each followed by commands.
pub fn load_macros(parser: &mut TextParser) -> Vec<Macro> {
    let mut macros = Vec::new();
    while let Some(token) = parser.next_token() {
        match token.section_name() {
            Some(id) => macros.push(Macro::load(id, parser)),
            None => warn!(
                "ignoring {:?} outside any macro on line {}",
                token.text, token.line
            ),
        }
    }
    macros
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Vec<Macro> {
        load_macros(&mut TextParser::from_plain(source))
    }

    #[test]
    fn arguments_stop_at_line_end_and_next_command() {
        let macros = parse("[INIT]\nLET X 5 INC X\nSAY JACK hello_there friend\n[OTHER]\nSTOP\n");
        assert_eq!(macros.len(), 2);

        let init = &macros[0];
        assert_eq!(init.id(), "INIT");
        let names: Vec<_> = init.commands().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["LET", "INC", "SAY"]);
        assert_eq!(init.commands()[0].args, ["X", "5"]);
        assert_eq!(init.commands()[1].args, ["X"]);
        assert_eq!(init.commands()[2].text_from(1), "hello there friend");
        assert_eq!(init.commands()[2].line, 3);

        assert_eq!(macros[1].commands()[0].opcode, Opcode::Stop);
    }

    #[test]
    fn unknown_commands_are_kept_as_unknown() {
        let macros = parse("[A]\nFROB 1 2\nINC X\n");
        let commands = macros[0].commands();
        assert_eq!(commands[0].opcode, Opcode::Unknown);
        assert_eq!(commands[0].args, ["1", "2"]);
        assert_eq!(commands[1].opcode, Opcode::Inc);
    }

    #[test]
    fn completion_is_decided_at_load() {
        let macros = parse("[A] WALKTO- JACK 10 10\nWALKTO+ JACK 1 1\n");
        let commands = macros[0].commands();
        assert_eq!(commands[0].completion, Completion::BlockUntilCondition);
        assert_eq!(commands[1].completion, Completion::FireAndForget);
    }

    #[test]
    fn labels_are_indexed() {
        let macros = parse("[A]\nINC X\nLABEL TOP\nGOTO TOP\n");
        assert_eq!(macros[0].label("TOP"), Some(1));
        assert_eq!(macros[0].label("MISSING"), None);
    }
}
