//! The fixed script vocabulary.
//!
//! Names are matched case-sensitively. An opcode's index is its position in
//! [`OPCODE_NAMES`] plus one; `0` is reserved for [`Opcode::Unknown`].

use std::collections::HashMap;
use std::sync::OnceLock;

use serde::Serialize;

/// Whether the interpreter may advance past a command as soon as it ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    FireAndForget,
    BlockUntilCondition,
}

macro_rules! opcodes {
    ($($variant:ident => $name:literal,)+) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
        pub enum Opcode {
            Unknown = 0,
            $($variant,)+
        }

        /// Script names in table order.
        pub const OPCODE_NAMES: &[&str] = &[$($name,)+];

        const OPCODE_TABLE: &[Opcode] = &[$(Opcode::$variant,)+];
    };
}

opcodes! {
    Let => "LET",
    Inc => "INC",
    Dec => "DEC",
    Add => "ADD",
    Sub => "SUB",
    Mul => "MUL",
    Div => "DIV",
    Mod => "MOD",
    Random => "RANDOM",
    SetFlag => "SETFLAG",
    ClearFlag => "CLEARFLAG",
    Toggle => "TOGGLE",
    If => "IF",
    IfNot => "IFNOT",
    IfFlag => "IFF",
    IfNotFlag => "IFNF",
    IfAnswer => "IFANSWER",
    IfHave => "IFHAVE",
    IfNotHave => "IFNHAVE",
    IfVisible => "IFVISIBLE",
    IfWalking => "IFWALKING",
    IfPrevScene => "IFPREVSCENE",
    IfArea => "IFAREA",
    IfMacro => "IFMACRO",
    Else => "ELSE",
    EndIf => "ENDIF",
    WaitWhile => "WAITWHILE",
    WaitUntil => "WAITUNTIL",
    DoNothing => "DONOTHING",
    Wait => "WAIT",
    Label => "LABEL",
    Goto => "GOTO",
    Loop => "LOOP",
    ReactiveSelf => "REACTIVESELF",
    Stop => "STOP",
    End => "END",
    Start => "START",
    StartWait => "START-",
    Kill => "KILL",
    Pause => "PAUSE",
    Resume => "RESUME",
    WaitMacro => "WAITMACRO",
    Log => "LOG",
    DebugVars => "DEBUGVARS",
    Show => "SHOW",
    Hide => "HIDE",
    Pos => "POS",
    Move => "MOVE",
    MoveTo => "MOVETO",
    MoveToWait => "MOVETO-",
    MoveToAsync => "MOVETO+",
    Anima => "ANIMA",
    AnimaWait => "ANIMA-",
    AnimaOnce => "ANIMA+",
    StopAnim => "STOPANIM",
    Frame => "FRAME",
    Bitmap => "BITMAP",
    Flip => "FLIP",
    WaitAnim => "WAITANIM",
    WalkTo => "WALKTO",
    WalkToWait => "WALKTO-",
    WalkToAsync => "WALKTO+",
    WalkToElement => "WALKTOEL",
    WalkToElementWait => "WALKTOEL-",
    WalkToArea => "WALKTOAREA",
    WalkToAreaWait => "WALKTOAREA-",
    Place => "PLACE",
    Turn => "TURN",
    TurnTo => "TURNTO",
    Speed => "SPEED",
    ShowPerson => "SHOWPERSON",
    HidePerson => "HIDEPERSON",
    SetPlayer => "SETPLAYER",
    Stand => "STAND",
    PersonAnim => "PERSONANIM",
    PersonAnimWait => "PERSONANIM-",
    PersonAnimOnce => "PERSONANIM+",
    Say => "SAY",
    SayWait => "SAY-",
    SayAsync => "SAY+",
    Follow => "FOLLOW",
    Unfollow => "UNFOLLOW",
    WaitWalk => "WAITWALK",
    EnableArea => "ENABLEAREA",
    DisableArea => "DISABLEAREA",
    AreaMacro => "AREAMACRO",
    Click => "CLICK",
    Dialog => "DIALOG",
    DialogWait => "DIALOG-",
    Answer => "ANSWER",
    EnableAnswer => "ENABLEANSWER",
    DisableAnswer => "DISABLEANSWER",
    ShowFace => "SHOWFACE",
    HideFace => "HIDEFACE",
    Scene => "SCENE",
    Scroll => "SCROLL",
    ScrollTo => "SCROLLTO",
    ScrollToWait => "SCROLLTO-",
    ScrollToPerson => "SCROLLTOPERSON",
    WaitScroll => "WAITSCROLL",
    Background => "BACKGROUND",
    FadeIn => "FADEIN",
    FadeInWait => "FADEIN-",
    FadeOut => "FADEOUT",
    FadeOutWait => "FADEOUT-",
    WaitFade => "WAITFADE",
    Film => "FILM",
    FilmWait => "FILM-",
    Insertion => "INSERTION",
    InsertionWait => "INSERTION-",
    InsertionOnce => "INSERTION+",
    StopInsertion => "STOPINSERTION",
    Music => "MUSIC",
    StopMusic => "STOPMUSIC",
    Sound => "SOUND",
    SoundWait => "SOUND-",
    StopSound => "STOPSOUND",
    Volume => "VOLUME",
    Voice => "VOICE",
    VoiceWait => "VOICE-",
    Cursor => "CURSOR",
    ShowCursor => "SHOWCURSOR",
    HideCursor => "HIDECURSOR",
    DisableInput => "DISABLEINPUT",
    EnableInput => "ENABLEINPUT",
    Take => "TAKE",
    Drop => "DROP",
    Quit => "QUIT",
}

fn name_index() -> &'static HashMap<&'static str, Opcode> {
    static INDEX: OnceLock<HashMap<&'static str, Opcode>> = OnceLock::new();
    INDEX.get_or_init(|| {
        OPCODE_NAMES
            .iter()
            .copied()
            .zip(OPCODE_TABLE.iter().copied())
            .collect()
    })
}

impl Opcode {
    /// Resolve a command name, exact and case-sensitive.
    pub fn resolve(name: &str) -> Opcode {
        name_index().get(name).copied().unwrap_or(Opcode::Unknown)
    }

    /// Table position plus one, or 0 for `Unknown`.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Opcode::Unknown => "UNKNOWN",
            other => OPCODE_NAMES[other as usize - 1],
        }
    }

    pub fn completion(self) -> Completion {
        let name = self.name();
        if name.ends_with('-') || name.starts_with("WAIT") || self == Opcode::DoNothing {
            Completion::BlockUntilCondition
        } else {
            Completion::FireAndForget
        }
    }

    /// Opens a block closed by `ENDIF`.
    pub fn is_conditional(self) -> bool {
        matches!(
            self,
            Opcode::If
                | Opcode::IfNot
                | Opcode::IfFlag
                | Opcode::IfNotFlag
                | Opcode::IfAnswer
                | Opcode::IfHave
                | Opcode::IfNotHave
                | Opcode::IfVisible
                | Opcode::IfWalking
                | Opcode::IfPrevScene
                | Opcode::IfArea
                | Opcode::IfMacro
        )
    }
}
