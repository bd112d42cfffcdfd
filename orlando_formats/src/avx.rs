use std::fs::File;
use std::io::{BufReader, ErrorKind, Read, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail, ensure};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::warn;

use crate::gsm::{GsmDecoder, GsmLayout, SAMPLES_PER_FRAME, STANDARD_FRAME_LEN, WAV49_PAIR_LEN};

const AVX_MAGIC: &[u8; 4] = b"AVX\0";
pub const AVX_HEADER_LEN: usize = 20;
pub const AVX_VERSION: u16 = 1;

/// Upper bound for a single length-prefixed block.
const MAX_BLOCK_LEN: u32 = 64 * 1024 * 1024;

/// Audio encoding of the chunk payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvxAudioCodec {
    Pcm16Le,
    Gsm,
    GsmWav49,
    None,
}

impl AvxAudioCodec {
    pub fn from_u16(value: u16) -> Result<Self> {
        Ok(match value {
            0 => AvxAudioCodec::Pcm16Le,
            1 => AvxAudioCodec::Gsm,
            2 => AvxAudioCodec::GsmWav49,
            0xFFFF => AvxAudioCodec::None,
            other => bail!("unsupported AVX audio codec {other:#06x}"),
        })
    }

    pub fn to_u16(self) -> u16 {
        match self {
            AvxAudioCodec::Pcm16Le => 0,
            AvxAudioCodec::Gsm => 1,
            AvxAudioCodec::GsmWav49 => 2,
            AvxAudioCodec::None => 0xFFFF,
        }
    }

    /// Decoded PCM byte count for a payload of `len` encoded bytes.
    pub fn decoded_len(self, len: usize) -> usize {
        match self {
            AvxAudioCodec::Pcm16Le => len & !1,
            AvxAudioCodec::Gsm => len / STANDARD_FRAME_LEN * SAMPLES_PER_FRAME * 2,
            AvxAudioCodec::GsmWav49 => len / WAV49_PAIR_LEN * SAMPLES_PER_FRAME * 4,
            AvxAudioCodec::None => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvxHeader {
    pub version: u16,
    pub codec: AvxAudioCodec,
    pub sample_rate: u32,
    /// Total decoded PCM bytes the soundtrack declares.
    pub pcm_size: u32,
    pub flx_count: u16,
}

fn read_header<R: Read>(reader: &mut R) -> Result<AvxHeader> {
    let mut magic = [0u8; 4];
    reader
        .read_exact(&mut magic)
        .context("reading AVX magic")?;
    ensure!(&magic == AVX_MAGIC, "not an AVX file (magic {magic:02x?})");

    let version = reader.read_u16::<LittleEndian>()?;
    let codec = AvxAudioCodec::from_u16(reader.read_u16::<LittleEndian>()?)?;
    let sample_rate = reader.read_u32::<LittleEndian>()?;
    let pcm_size = reader.read_u32::<LittleEndian>()?;
    let flx_count = reader.read_u16::<LittleEndian>()?;
    let _reserved = reader.read_u16::<LittleEndian>()?;

    Ok(AvxHeader {
        version,
        codec,
        sample_rate,
        pcm_size,
        flx_count,
    })
}

/// Sequential reader over an AVX container: header, embedded FLX streams,
/// then one length-prefixed audio chunk per video frame until end of file.
pub struct AvxReader<R> {
    header: AvxHeader,
    flx_streams: Vec<Arc<[u8]>>,
    reader: R,
    chunks_read: u64,
    exhausted: bool,
}

impl<R> std::fmt::Debug for AvxReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvxReader")
            .field("header", &self.header)
            .field("flx_streams", &self.flx_streams.len())
            .field("chunks_read", &self.chunks_read)
            .field("exhausted", &self.exhausted)
            .finish()
    }
}

impl AvxReader<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file =
            File::open(path).with_context(|| format!("opening AVX file {}", path.display()))?;
        Self::from_reader(BufReader::new(file))
            .with_context(|| format!("parsing AVX file {}", path.display()))
    }
}

impl<R: Read> AvxReader<R> {
    /// Parse the header and load every embedded FLX stream.
    pub fn from_reader(mut reader: R) -> Result<Self> {
        let header = read_header(&mut reader)?;
        let mut flx_streams = Vec::with_capacity(header.flx_count as usize);
        for index in 0..header.flx_count {
            let len = reader
                .read_u32::<LittleEndian>()
                .with_context(|| format!("reading length of FLX stream {index}"))?;
            ensure!(
                len <= MAX_BLOCK_LEN,
                "FLX stream {index} claims {len} bytes"
            );
            let mut bytes = vec![0u8; len as usize];
            reader
                .read_exact(&mut bytes)
                .with_context(|| format!("reading FLX stream {index}"))?;
            flx_streams.push(Arc::from(bytes));
        }

        Ok(Self {
            header,
            flx_streams,
            reader,
            chunks_read: 0,
            exhausted: false,
        })
    }

    pub fn header(&self) -> &AvxHeader {
        &self.header
    }

    pub fn flx_streams(&self) -> &[Arc<[u8]>] {
        &self.flx_streams
    }

    pub fn chunks_read(&self) -> u64 {
        self.chunks_read
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Next audio chunk payload, or `None` once the source runs out.
    pub fn next_audio_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        if self.exhausted {
            return Ok(None);
        }
        let len = match self.reader.read_u32::<LittleEndian>() {
            Ok(len) => len,
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => {
                self.exhausted = true;
                return Ok(None);
            }
            Err(err) => return Err(err).context("reading AVX chunk length"),
        };
        ensure!(
            len <= MAX_BLOCK_LEN,
            "AVX chunk {} claims {len} bytes",
            self.chunks_read
        );

        let mut payload = vec![0u8; len as usize];
        if let Err(err) = self.reader.read_exact(&mut payload) {
            if err.kind() == ErrorKind::UnexpectedEof {
                warn!(
                    "AVX chunk {} truncated; stopping playback input",
                    self.chunks_read
                );
                self.exhausted = true;
                return Ok(None);
            }
            return Err(err).context("reading AVX chunk payload");
        }
        self.chunks_read += 1;
        Ok(Some(payload))
    }
}

/// Turns chunk payloads into 16-bit PCM for the declared codec.
#[derive(Debug, Clone)]
pub struct AvxAudioDecoder {
    codec: AvxAudioCodec,
    gsm: Option<GsmDecoder>,
}

impl AvxAudioDecoder {
    pub fn new(codec: AvxAudioCodec) -> Self {
        let gsm = match codec {
            AvxAudioCodec::Gsm => Some(GsmDecoder::new(GsmLayout::Standard)),
            AvxAudioCodec::GsmWav49 => Some(GsmDecoder::new(GsmLayout::Wav49)),
            AvxAudioCodec::Pcm16Le | AvxAudioCodec::None => None,
        };
        Self { codec, gsm }
    }

    pub fn codec(&self) -> AvxAudioCodec {
        self.codec
    }

    pub fn decode(&mut self, payload: &[u8]) -> Result<Vec<i16>> {
        match (&mut self.gsm, self.codec) {
            (Some(decoder), _) => decoder.decode_all(payload),
            (None, AvxAudioCodec::Pcm16Le) => Ok(payload
                .chunks_exact(2)
                .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
                .collect()),
            (None, _) => Ok(Vec::new()),
        }
    }

    /// Decode straight to little-endian PCM bytes, ready for a ring buffer.
    pub fn decode_bytes(&mut self, payload: &[u8]) -> Result<Vec<u8>> {
        if self.codec == AvxAudioCodec::Pcm16Le {
            return Ok(payload[..payload.len() & !1].to_vec());
        }
        let samples = self.decode(payload)?;
        let mut out = Vec::with_capacity(samples.len() * 2);
        for sample in samples {
            out.write_i16::<LittleEndian>(sample)?;
        }
        Ok(out)
    }
}

/// Assembles AVX containers (tooling and fixtures).
#[derive(Debug, Clone)]
pub struct AvxBuilder {
    codec: AvxAudioCodec,
    sample_rate: u32,
    pcm_size: Option<u32>,
    flx_streams: Vec<Vec<u8>>,
    chunks: Vec<Vec<u8>>,
}

impl AvxBuilder {
    pub fn new(codec: AvxAudioCodec, sample_rate: u32) -> Self {
        Self {
            codec,
            sample_rate,
            pcm_size: None,
            flx_streams: Vec::new(),
            chunks: Vec::new(),
        }
    }

    /// Override the declared PCM size; defaults to the decoded chunk total.
    pub fn pcm_size(mut self, size: u32) -> Self {
        self.pcm_size = Some(size);
        self
    }

    pub fn flx(mut self, bytes: Vec<u8>) -> Self {
        self.flx_streams.push(bytes);
        self
    }

    pub fn chunk(mut self, payload: Vec<u8>) -> Self {
        self.chunks.push(payload);
        self
    }

    pub fn build(&self) -> Result<Vec<u8>> {
        let pcm_size = match self.pcm_size {
            Some(size) => size,
            None => self
                .chunks
                .iter()
                .map(|chunk| self.codec.decoded_len(chunk.len()))
                .sum::<usize>()
                .try_into()
                .context("AVX soundtrack exceeds 4 GiB")?,
        };

        let mut out = Vec::new();
        out.write_all(AVX_MAGIC)?;
        out.write_u16::<LittleEndian>(AVX_VERSION)?;
        out.write_u16::<LittleEndian>(self.codec.to_u16())?;
        out.write_u32::<LittleEndian>(self.sample_rate)?;
        out.write_u32::<LittleEndian>(pcm_size)?;
        out.write_u16::<LittleEndian>(self.flx_streams.len().try_into()?)?;
        out.write_u16::<LittleEndian>(0)?;
        for block in self.flx_streams.iter().chain(&self.chunks) {
            out.write_u32::<LittleEndian>(block.len().try_into()?)?;
            out.write_all(block)?;
        }
        Ok(out)
    }
}
