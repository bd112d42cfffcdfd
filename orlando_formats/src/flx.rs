// FLX palette animation decoder.
//
// An FLX file is a 20-byte header followed by a stream of chunks. Frame
// chunks hold delta data (skip/count runs of palette indices) drawn over the
// previous frame; RLE frame chunks wrap the same payload in a 0xFF-escaped
// run-length layer. The stream loops forever: reaching the end seeks back to
// the first chunk.

use std::io::{Cursor, Read, Seek, SeekFrom};
use std::sync::Arc;

use anyhow::{Context, Result, bail, ensure};
use byteorder::{LittleEndian, ReadBytesExt};

use crate::surface::{Palette, Surface};

pub const FLX_HEADER_LEN: u64 = 20;
const FLX_MAGIC: &[u8; 4] = b"FLX\0";
const CHUNK_HEADER_LEN: u64 = 6;
const RLE_ESCAPE: u8 = 0xFF;

const CHUNK_BLANK: u16 = 0;
const CHUNK_FRAME: u16 = 1;
const CHUNK_RLE_FRAME: u16 = 2;
const CHUNK_RESERVED: u16 = 3;
const CHUNK_PALETTE: u16 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlxHeader {
    pub frame_count: u16,
    pub width: u16,
    pub height: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    Blank,
    Frame,
    RleFrame,
    Reserved,
    Palette,
    Unknown(u16),
}

impl From<u16> for ChunkKind {
    fn from(value: u16) -> Self {
        match value {
            CHUNK_BLANK => ChunkKind::Blank,
            CHUNK_FRAME => ChunkKind::Frame,
            CHUNK_RLE_FRAME => ChunkKind::RleFrame,
            CHUNK_RESERVED => ChunkKind::Reserved,
            CHUNK_PALETTE => ChunkKind::Palette,
            other => ChunkKind::Unknown(other),
        }
    }
}

/// What a call to [`FlxAnimation::next_frame`] produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A frame chunk was drawn into the surface.
    Decoded,
    /// A blank chunk was consumed; the surface is unchanged.
    Skipped,
}

pub fn parse_header(bytes: &[u8]) -> Result<FlxHeader> {
    ensure!(
        bytes.len() as u64 >= FLX_HEADER_LEN,
        "FLX data shorter than its header"
    );
    if &bytes[0..4] != FLX_MAGIC {
        bail!("FLX data missing FLX tag");
    }
    let mut cursor = Cursor::new(&bytes[4..10]);
    let frame_count = cursor
        .read_u16::<LittleEndian>()
        .context("failed to read FLX frame count")?;
    let width = cursor
        .read_u16::<LittleEndian>()
        .context("failed to read FLX width")?;
    let height = cursor
        .read_u16::<LittleEndian>()
        .context("failed to read FLX height")?;
    Ok(FlxHeader {
        frame_count,
        width,
        height,
    })
}

pub struct FlxAnimation {
    header: FlxHeader,
    stream: Cursor<Arc<[u8]>>,
    surface: Surface,
    palette: Palette,
    frames_read: u64,
    visible_chunks: u64,
}

impl std::fmt::Debug for FlxAnimation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlxAnimation")
            .field("header", &self.header)
            .field("position", &self.stream.position())
            .field("frames_read", &self.frames_read)
            .finish()
    }
}

impl FlxAnimation {
    pub fn open(data: impl Into<Arc<[u8]>>) -> Result<Self> {
        let data = data.into();
        let header = parse_header(&data)?;
        let surface = Surface::new(header.width as usize, header.height as usize);
        let visible_chunks = count_visible_chunks(&data);
        if header.frame_count > 0 && u64::from(header.frame_count) != visible_chunks {
            log::debug!(
                "FLX header claims {} frames, stream holds {visible_chunks}",
                header.frame_count
            );
        }
        let mut stream = Cursor::new(data);
        stream.set_position(FLX_HEADER_LEN);
        Ok(Self {
            header,
            stream,
            surface,
            palette: Palette::default(),
            frames_read: 0,
            visible_chunks,
        })
    }

    #[inline]
    pub fn header(&self) -> FlxHeader {
        self.header
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.surface.width()
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.surface.height()
    }

    #[inline]
    pub fn frame_count(&self) -> u16 {
        self.header.frame_count
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    /// Visible frames (decoded or blank) produced since opening or the last rewind.
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Frames in one pass: the header count, or the chunks actually present
    /// when the header leaves it at zero.
    pub fn frames_per_pass(&self) -> u64 {
        match self.header.frame_count {
            0 => self.visible_chunks,
            count => u64::from(count),
        }
    }

    /// True right after the last frame of a full pass has been produced.
    pub fn cycle_complete(&self) -> bool {
        let count = self.frames_per_pass();
        count > 0 && self.frames_read > 0 && self.frames_read % count == 0
    }

    pub fn rewind(&mut self) {
        self.stream.set_position(FLX_HEADER_LEN);
        self.frames_read = 0;
    }

    /// Decode chunks until one visible frame has been produced.
    pub fn next_frame(&mut self) -> Result<FrameOutcome> {
        let mut wrapped = false;
        loop {
            let Some((kind, payload)) = self.read_chunk()? else {
                if wrapped {
                    bail!("FLX stream contains no frame chunks");
                }
                wrapped = true;
                log::trace!("FLX stream exhausted, looping to first chunk");
                self.stream.set_position(FLX_HEADER_LEN);
                continue;
            };

            let data = Arc::clone(self.stream.get_ref());
            let payload = &data[payload.0..payload.1];
            match kind {
                ChunkKind::Blank => {
                    self.frames_read += 1;
                    return Ok(FrameOutcome::Skipped);
                }
                ChunkKind::Frame => {
                    self.draw_delta(payload.iter().copied());
                    self.frames_read += 1;
                    return Ok(FrameOutcome::Decoded);
                }
                ChunkKind::RleFrame => {
                    // The leading dword is the unpacked size; the frame decoder
                    // does not need it.
                    let packed = payload.get(4..).unwrap_or_default();
                    self.draw_delta(RleBytes::new(packed));
                    self.frames_read += 1;
                    return Ok(FrameOutcome::Decoded);
                }
                ChunkKind::Palette => {
                    self.palette.load_le(payload);
                    self.surface.fill(self.palette.color(0));
                }
                ChunkKind::Reserved => {}
                ChunkKind::Unknown(value) => {
                    log::debug!("skipping unknown FLX chunk type {value}");
                }
            }
        }
    }

    /// Returns the chunk kind and the payload byte range, or `None` at end of stream.
    fn read_chunk(&mut self) -> Result<Option<(ChunkKind, (usize, usize))>> {
        let total = self.stream.get_ref().len() as u64;
        let start = self.stream.position();
        if total.saturating_sub(start) < CHUNK_HEADER_LEN {
            return Ok(None);
        }

        let kind = self
            .stream
            .read_u16::<LittleEndian>()
            .context("failed to read FLX chunk type")?;
        let size = self
            .stream
            .read_u32::<LittleEndian>()
            .context("failed to read FLX chunk size")? as u64;
        ensure!(
            size >= CHUNK_HEADER_LEN,
            "FLX chunk at offset {start} has invalid size {size}"
        );
        let end = start + size;
        ensure!(
            end <= total,
            "FLX chunk at offset {start} extends {} bytes past the end of the stream",
            end - total
        );
        self.stream
            .seek(SeekFrom::Start(end))
            .context("failed to seek past FLX chunk")?;

        Ok(Some((
            ChunkKind::from(kind),
            ((start + CHUNK_HEADER_LEN) as usize, end as usize),
        )))
    }

    fn draw_delta<I: Iterator<Item = u8>>(&mut self, mut bytes: I) {
        let Some(offset) = read_u32_le(&mut bytes) else {
            return;
        };
        let palette = &self.palette;
        let pixels = self.surface.pixels_mut();
        let mut cursor = offset as usize;

        loop {
            let (Some(skip), Some(count)) = (bytes.next(), bytes.next()) else {
                return;
            };
            cursor += skip as usize;
            for _ in 0..count {
                let Some(index) = bytes.next() else {
                    return;
                };
                if let Some(pixel) = pixels.get_mut(cursor) {
                    *pixel = palette.color(index);
                }
                cursor += 1;
            }
        }
    }
}

/// Number of frame and blank chunks, walking headers only. Stops at the first
/// malformed chunk.
fn count_visible_chunks(data: &[u8]) -> u64 {
    let mut offset = FLX_HEADER_LEN as usize;
    let mut visible = 0;
    while let Some(header) = data.get(offset..offset + CHUNK_HEADER_LEN as usize) {
        let kind = u16::from_le_bytes([header[0], header[1]]);
        let size = u32::from_le_bytes([header[2], header[3], header[4], header[5]]) as usize;
        if size < CHUNK_HEADER_LEN as usize || offset + size > data.len() {
            break;
        }
        if matches!(
            ChunkKind::from(kind),
            ChunkKind::Blank | ChunkKind::Frame | ChunkKind::RleFrame
        ) {
            visible += 1;
        }
        offset += size;
    }
    visible
}

fn read_u32_le<I: Iterator<Item = u8>>(bytes: &mut I) -> Option<u32> {
    let mut value = [0u8; 4];
    for slot in &mut value {
        *slot = bytes.next()?;
    }
    Some(u32::from_le_bytes(value))
}

/// Lazily expands `0xFF value count` runs; every other byte is a literal.
pub struct RleBytes<'a> {
    data: &'a [u8],
    pos: usize,
    run_value: u8,
    run_left: usize,
}

impl<'a> RleBytes<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            run_value: 0,
            run_left: 0,
        }
    }
}

impl Iterator for RleBytes<'_> {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        loop {
            if self.run_left > 0 {
                self.run_left -= 1;
                return Some(self.run_value);
            }
            let byte = *self.data.get(self.pos)?;
            self.pos += 1;
            if byte != RLE_ESCAPE {
                return Some(byte);
            }
            let value = *self.data.get(self.pos)?;
            let count = *self.data.get(self.pos + 1)?;
            self.pos += 2;
            self.run_value = value;
            self.run_left = count as usize;
        }
    }
}

/// Pack bytes with the FLX run-length layer.
pub fn rle_encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut index = 0;
    while index < data.len() {
        let value = data[index];
        let mut run = 1;
        while index + run < data.len() && data[index + run] == value && run < u8::MAX as usize {
            run += 1;
        }
        if run >= 3 || value == RLE_ESCAPE {
            out.extend_from_slice(&[RLE_ESCAPE, value, run as u8]);
        } else {
            out.extend(std::iter::repeat(value).take(run));
        }
        index += run;
    }
    out
}

/// Delta frame payload: a start offset plus `(skip, indices)` runs.
#[derive(Debug, Clone, Default)]
pub struct DeltaFrame {
    pub offset: u32,
    pub runs: Vec<(u8, Vec<u8>)>,
}

impl DeltaFrame {
    pub fn new(offset: u32) -> Self {
        Self {
            offset,
            runs: Vec::new(),
        }
    }

    pub fn run(mut self, skip: u8, indices: &[u8]) -> Self {
        self.runs.push((skip, indices.to_vec()));
        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.offset.to_le_bytes().to_vec();
        for (skip, indices) in &self.runs {
            for part in indices.chunks(u8::MAX as usize) {
                out.push(*skip);
                out.push(part.len() as u8);
                out.extend_from_slice(part);
            }
            if indices.is_empty() {
                out.extend_from_slice(&[*skip, 0]);
            }
        }
        out
    }
}

/// Assembles FLX files for tools and tests.
#[derive(Debug, Clone)]
pub struct FlxBuilder {
    width: u16,
    height: u16,
    frame_count: Option<u16>,
    chunks: Vec<(u16, Vec<u8>)>,
}

impl FlxBuilder {
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            frame_count: None,
            chunks: Vec::new(),
        }
    }

    pub fn frame_count(mut self, count: u16) -> Self {
        self.frame_count = Some(count);
        self
    }

    pub fn palette(mut self, colors: &[u16]) -> Self {
        let bytes = colors.iter().flat_map(|color| color.to_le_bytes()).collect();
        self.chunks.push((CHUNK_PALETTE, bytes));
        self
    }

    pub fn frame(mut self, frame: &DeltaFrame) -> Self {
        self.chunks.push((CHUNK_FRAME, frame.to_bytes()));
        self
    }

    pub fn rle_frame(mut self, frame: &DeltaFrame) -> Self {
        let raw = frame.to_bytes();
        let mut payload = (raw.len() as u32).to_le_bytes().to_vec();
        payload.extend_from_slice(&rle_encode(&raw));
        self.chunks.push((CHUNK_RLE_FRAME, payload));
        self
    }

    pub fn blank(mut self) -> Self {
        self.chunks.push((CHUNK_BLANK, Vec::new()));
        self
    }

    pub fn reserved(mut self, payload: &[u8]) -> Self {
        self.chunks.push((CHUNK_RESERVED, payload.to_vec()));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let visible = self
            .chunks
            .iter()
            .filter(|(kind, _)| matches!(*kind, CHUNK_BLANK | CHUNK_FRAME | CHUNK_RLE_FRAME))
            .count() as u16;
        let mut out = Vec::new();
        out.extend_from_slice(FLX_MAGIC);
        out.extend_from_slice(&self.frame_count.unwrap_or(visible).to_le_bytes());
        out.extend_from_slice(&self.width.to_le_bytes());
        out.extend_from_slice(&self.height.to_le_bytes());
        out.resize(FLX_HEADER_LEN as usize, 0);
        for (kind, payload) in &self.chunks {
            out.extend_from_slice(&kind.to_le_bytes());
            out.extend_from_slice(&((payload.len() as u64 + CHUNK_HEADER_LEN) as u32).to_le_bytes());
            out.extend_from_slice(payload);
        }
        out
    }
}

/// Read just enough of a stream to report its header.
pub fn peek_header<R: Read>(mut reader: R) -> Result<FlxHeader> {
    let mut bytes = [0u8; FLX_HEADER_LEN as usize];
    reader
        .read_exact(&mut bytes)
        .context("failed to read FLX header")?;
    parse_header(&bytes)
}
