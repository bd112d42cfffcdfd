//! Scripted-scene runtime: scene loading, the macro interpreter, the world
//! model it drives, and AVX film playback.

pub mod audio_stream;
pub mod condition;
pub mod config;
pub mod game;
pub mod host;
pub mod interpreter;
pub mod opcode;
pub mod resources;
pub mod runtime;
pub mod scene;
pub mod script;
pub mod video;

pub use config::EngineConfig;
pub use game::GameState;
pub use host::{EngineEvent, HostCallback, NullHost, RecordingHost};
pub use interpreter::{Interpreter, MacroState};
pub use resources::ResourceManager;
pub use runtime::{Runtime, RuntimeReport};
pub use scene::{Scene, SceneLoadError};
