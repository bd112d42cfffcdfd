use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use byteorder::{LittleEndian, WriteBytesExt};
use log::warn;
use serde::Serialize;

#[derive(Debug)]
struct Ring {
    buffer: Vec<u8>,
    write_total: u64,
    read_total: u64,
    size: u64,
    end_of_stream: bool,
}

/// Cloneable handle to a fixed-capacity ring holding decoded PCM bytes.
///
/// Writes always succeed and wrap. A read is clamped to the declared total
/// `size` (setting end-of-stream once reached) and returns 0 when the data it
/// asks for has not been written yet or has already been overwritten.
#[derive(Debug, Clone)]
pub struct MemoryAudioStream {
    inner: Arc<Mutex<Ring>>,
}

/// Counters for dumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StreamStats {
    pub capacity: usize,
    pub size: u64,
    pub write_total: u64,
    pub read_total: u64,
    pub end_of_stream: bool,
}

impl MemoryAudioStream {
    pub fn new(capacity: usize, size: u64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Ring {
                buffer: vec![0; capacity.max(1)],
                write_total: 0,
                read_total: 0,
                size,
                end_of_stream: size == 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Ring> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.lock().buffer.len()
    }

    pub fn write(&self, data: &[u8]) {
        let mut ring = self.lock();
        let capacity = ring.buffer.len();
        let mut pos = (ring.write_total % capacity as u64) as usize;
        for chunk in data.chunks(capacity) {
            let first = chunk.len().min(capacity - pos);
            ring.buffer[pos..pos + first].copy_from_slice(&chunk[..first]);
            ring.buffer[..chunk.len() - first].copy_from_slice(&chunk[first..]);
            pos = (pos + chunk.len()) % capacity;
        }
        ring.write_total += data.len() as u64;
    }

    /// Copy up to `out.len()` bytes; see the type docs for the clamping rules.
    pub fn read(&self, out: &mut [u8]) -> usize {
        let mut ring = self.lock();
        let capacity = ring.buffer.len() as u64;

        let remaining = ring.size.saturating_sub(ring.read_total);
        if remaining == 0 {
            ring.end_of_stream = true;
            return 0;
        }
        let wanted = (out.len() as u64).min(remaining);
        if wanted == 0 {
            return 0;
        }

        if ring.read_total + wanted > ring.write_total {
            warn!(
                "audio underrun: {} bytes requested, {} buffered",
                wanted,
                ring.write_total - ring.read_total
            );
            return 0;
        }
        if ring.write_total - ring.read_total > capacity {
            warn!(
                "audio underrun: {} unread bytes overflowed a {capacity}-byte buffer",
                ring.write_total - ring.read_total
            );
            return 0;
        }

        let wanted = wanted as usize;
        let pos = (ring.read_total % capacity) as usize;
        let first = wanted.min(ring.buffer.len() - pos);
        out[..first].copy_from_slice(&ring.buffer[pos..pos + first]);
        out[first..wanted].copy_from_slice(&ring.buffer[..wanted - first]);
        ring.read_total += wanted as u64;
        if ring.read_total >= ring.size {
            ring.end_of_stream = true;
        }
        wanted
    }

    pub fn end_of_stream(&self) -> bool {
        self.lock().end_of_stream
    }

    pub fn buffered(&self) -> u64 {
        let ring = self.lock();
        ring.write_total - ring.read_total
    }

    pub fn stats(&self) -> StreamStats {
        let ring = self.lock();
        StreamStats {
            capacity: ring.buffer.len(),
            size: ring.size,
            write_total: ring.write_total,
            read_total: ring.read_total,
            end_of_stream: ring.end_of_stream,
        }
    }
}

/// Write 16-bit mono PCM as a RIFF/WAVE file.
pub fn write_wav(path: &Path, samples: &[i16], sample_rate: u32) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut out = BufWriter::new(file);
    let data_len = (samples.len() * 2) as u32;
    out.write_all(b"RIFF")?;
    out.write_u32::<LittleEndian>(36 + data_len)?;
    out.write_all(b"WAVE")?;
    out.write_all(b"fmt ")?;
    out.write_u32::<LittleEndian>(16)?;
    out.write_u16::<LittleEndian>(1)?;
    out.write_u16::<LittleEndian>(1)?;
    out.write_u32::<LittleEndian>(sample_rate)?;
    out.write_u32::<LittleEndian>(sample_rate * 2)?;
    out.write_u16::<LittleEndian>(2)?;
    out.write_u16::<LittleEndian>(16)?;
    out.write_all(b"data")?;
    out.write_u32::<LittleEndian>(data_len)?;
    for &sample in samples {
        out.write_i16::<LittleEndian>(sample)?;
    }
    out.flush()
        .with_context(|| format!("writing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_follow_writes_across_the_wrap() {
        let stream = MemoryAudioStream::new(8, 100);
        let mut out = [0u8; 6];
        stream.write(&[1, 2, 3, 4, 5, 6]);
        assert_eq!(stream.read(&mut out), 6);
        stream.write(&[7, 8, 9, 10, 11, 12]);
        assert_eq!(stream.read(&mut out), 6);
        assert_eq!(out, [7, 8, 9, 10, 11, 12]);
        assert_eq!(stream.buffered(), 0);
    }

    #[test]
    fn reading_ahead_of_the_writer_is_an_underrun() {
        let stream = MemoryAudioStream::new(8, 100);
        stream.write(&[1, 2]);
        let mut out = [0u8; 4];
        assert_eq!(stream.read(&mut out), 0);
        assert_eq!(stream.stats().read_total, 0);
        assert_eq!(stream.read(&mut out[..2]), 2);
    }

    #[test]
    fn overwritten_data_is_an_underrun() {
        let stream = MemoryAudioStream::new(4, 100);
        stream.write(&[1, 2, 3, 4, 5, 6]);
        let mut out = [0u8; 2];
        assert_eq!(stream.read(&mut out), 0);
        let stats = stream.stats();
        assert!(stats.read_total <= stats.write_total);
    }

    #[test]
    fn end_of_stream_exactly_at_the_declared_size() {
        let stream = MemoryAudioStream::new(16, 5);
        stream.write(&[1, 2, 3, 4, 5, 6, 7]);
        let mut out = [0u8; 3];
        assert_eq!(stream.read(&mut out), 3);
        assert!(!stream.end_of_stream());
        assert_eq!(stream.read(&mut out), 2);
        assert!(stream.end_of_stream());
        assert_eq!(stream.read(&mut out), 0);
    }

    #[test]
    fn clones_share_the_buffer_across_threads() {
        let stream = MemoryAudioStream::new(64, 32);
        let producer = stream.clone();
        std::thread::spawn(move || producer.write(&[9; 32]))
            .join()
            .unwrap();
        let mut out = [0u8; 32];
        assert_eq!(stream.read(&mut out), 32);
        assert_eq!(out, [9; 32]);
        assert!(stream.end_of_stream());
    }

    #[test]
    fn wav_header_describes_mono_16_bit_pcm() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let samples = [0i16, 1000, -1000, i16::MAX];
        write_wav(&path, &samples, 22050).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 44 + 8);
        assert_eq!(&bytes[..4], b"RIFF");
        assert_eq!(&bytes[8..16], b"WAVEfmt ");
        assert_eq!(u32::from_le_bytes(bytes[24..28].try_into().unwrap()), 22050);
        assert_eq!(u32::from_le_bytes(bytes[40..44].try_into().unwrap()), 8);
        assert_eq!(i16::from_le_bytes([bytes[50], bytes[51]]), i16::MAX);
    }
}
