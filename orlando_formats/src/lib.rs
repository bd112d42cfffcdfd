pub mod avx;
pub mod bitmap;
pub mod flx;
pub mod gsm;
pub mod pak;
pub mod surface;
pub mod text;

pub use avx::{AvxAudioCodec, AvxAudioDecoder, AvxBuilder, AvxHeader, AvxReader};
pub use bitmap::{decode_bitmap, write_png};
pub use flx::{FlxAnimation, FlxBuilder, FlxHeader, FrameOutcome};
pub use gsm::{GsmDecoder, GsmLayout};
pub use pak::{PakArchive, PakEntry, PakLayout, PakWriter};
pub use surface::{BlitOptions, Palette, Rect, Surface};
pub use text::{TextParser, Token};
