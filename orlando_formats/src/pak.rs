use std::fs::File;
use std::io::{Cursor, Write};
use std::ops::{Deref, Range};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail, ensure};
use memmap2::{Mmap, MmapOptions};
use serde::Serialize;

const WINDOWS_MAGIC: &[u8; 4] = b"PAK\0";
const DOS_NAME_LEN: usize = 13;
const DOS_ENTRY_SIZE: usize = 4 + 4 + DOS_NAME_LEN;

/// On-disk table layout of a PAK archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PakLayout {
    /// `i32 header size` followed by fixed 21-byte entries.
    Dos,
    /// `PAK\0` magic, entry count and length-prefixed names.
    Windows,
}

#[derive(Debug, Clone, Serialize)]
pub struct PakEntry {
    pub name: String,
    pub offset: u64,
    pub size: u32,
}

impl PakEntry {
    pub fn data_range(&self) -> Range<usize> {
        let start = self.offset as usize;
        let end = start + self.size as usize;
        start..end
    }
}

#[derive(Debug)]
enum Backing {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Deref for Backing {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Backing::Mapped(mmap) => &mmap[..],
            Backing::Owned(bytes) => &bytes[..],
        }
    }
}

#[derive(Debug)]
pub struct PakArchive {
    path: Option<PathBuf>,
    layout: PakLayout,
    data: Backing,
    entries: Vec<PakEntry>,
}

impl PakArchive {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_buf = path.as_ref().to_path_buf();
        let file = File::open(&path_buf)
            .with_context(|| format!("opening PAK archive at {}", path_buf.display()))?;
        let mmap = unsafe { MmapOptions::new().map(&file) }
            .with_context(|| format!("memory-mapping PAK archive {}", path_buf.display()))?;

        let (layout, entries) = parse_entries(&mmap)
            .with_context(|| format!("parsing PAK archive {}", path_buf.display()))?;

        Ok(PakArchive {
            path: Some(path_buf),
            layout,
            data: Backing::Mapped(mmap),
            entries,
        })
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let (layout, entries) = parse_entries(&bytes).context("parsing in-memory PAK archive")?;
        Ok(PakArchive {
            path: None,
            layout,
            data: Backing::Owned(bytes),
            entries,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn layout(&self) -> PakLayout {
        self.layout
    }

    pub fn entries(&self) -> &[PakEntry] {
        &self.entries
    }

    pub fn find_entry(&self, name: &str) -> Option<&PakEntry> {
        self.entries
            .iter()
            .find(|entry| entry.name.eq_ignore_ascii_case(name))
    }

    pub fn has_member(&self, name: &str) -> bool {
        self.find_entry(name).is_some()
    }

    pub fn read_entry_bytes(&self, entry: &PakEntry) -> &[u8] {
        &self.data[entry.data_range()]
    }

    pub fn member_bytes(&self, name: &str) -> Option<&[u8]> {
        self.find_entry(name)
            .map(|entry| self.read_entry_bytes(entry))
    }

    /// Seekable stream over a member, matched case-insensitively.
    pub fn create_read_stream_for_member(&self, name: &str) -> Option<Cursor<&[u8]>> {
        self.member_bytes(name).map(Cursor::new)
    }

    pub fn extract_entry<P: AsRef<Path>>(&self, entry: &PakEntry, dest: P) -> Result<()> {
        let bytes = self.read_entry_bytes(entry);
        let mut file = File::create(dest.as_ref())
            .with_context(|| format!("creating {}", dest.as_ref().display()))?;
        file.write_all(bytes)
            .with_context(|| format!("writing {}", dest.as_ref().display()))?;
        Ok(())
    }
}

fn parse_entries(data: &[u8]) -> Result<(PakLayout, Vec<PakEntry>)> {
    ensure!(data.len() >= 4, "PAK archive is too small to contain a header");
    if &data[0..4] == WINDOWS_MAGIC {
        Ok((PakLayout::Windows, parse_windows_entries(data)?))
    } else {
        Ok((PakLayout::Dos, parse_dos_entries(data)?))
    }
}

fn parse_dos_entries(data: &[u8]) -> Result<Vec<PakEntry>> {
    let header_size = read_i32(data, 0)?;
    ensure!(
        header_size >= 4 && header_size as usize <= data.len(),
        "PAK header size {header_size} is out of range"
    );
    let count = (header_size as usize - 4) / DOS_ENTRY_SIZE;

    let mut entries = Vec::with_capacity(count);
    for index in 0..count {
        let base = 4 + index * DOS_ENTRY_SIZE;
        let offset = read_i32(data, base)?;
        let size = read_i32(data, base + 4)?;
        let name = read_c_string(&data[base + 8..base + DOS_ENTRY_SIZE]);
        if name.is_empty() {
            continue;
        }
        entries.push(checked_entry(data, index, name, offset, size)?);
    }

    Ok(entries)
}

fn parse_windows_entries(data: &[u8]) -> Result<Vec<PakEntry>> {
    let count = read_i32(data, 4)?;
    ensure!(count >= 0, "PAK entry count {count} is negative");

    // 8 bytes after the count are unused.
    let mut pos = 16usize;
    let mut entries = Vec::with_capacity(count as usize);
    for index in 0..count as usize {
        let offset = read_i32(data, pos)?;
        let size = read_i32(data, pos + 4)?;
        let name_len = read_i32(data, pos + 8)?;
        ensure!(name_len >= 0, "PAK entry {index} has negative name length");
        pos += 12;
        let name_end = pos
            .checked_add(name_len as usize)
            .ok_or_else(|| anyhow!("PAK entry {index} name overflow"))?;
        ensure!(
            name_end <= data.len(),
            "PAK archive truncated inside the name of entry {index}"
        );
        let name = read_c_string(&data[pos..name_end]);
        pos = name_end;
        entries.push(checked_entry(data, index, name, offset, size)?);
    }

    Ok(entries)
}

fn checked_entry(data: &[u8], index: usize, name: String, offset: i32, size: i32) -> Result<PakEntry> {
    ensure!(
        offset >= 0 && size >= 0,
        "PAK entry {index} ({name}) has a negative offset or size"
    );
    let end = (offset as usize)
        .checked_add(size as usize)
        .ok_or_else(|| anyhow!("PAK entry {index} size overflow"))?;
    ensure!(
        end <= data.len(),
        "PAK entry {index} ({name}) data extends beyond file"
    );
    Ok(PakEntry {
        name,
        offset: offset as u64,
        size: size as u32,
    })
}

fn read_i32(data: &[u8], at: usize) -> Result<i32> {
    let Some(bytes) = data.get(at..at + 4) else {
        bail!("PAK archive truncated at offset {at}");
    };
    Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_c_string(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Builds PAK archives in either layout (tooling and fixtures).
#[derive(Debug, Clone)]
pub struct PakWriter {
    layout: PakLayout,
    members: Vec<(String, Vec<u8>)>,
}

impl PakWriter {
    pub fn new(layout: PakLayout) -> Self {
        Self {
            layout,
            members: Vec::new(),
        }
    }

    pub fn add(&mut self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> &mut Self {
        self.members.push((name.into(), bytes.into()));
        self
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        match self.layout {
            PakLayout::Dos => {
                let header_size = 4 + self.members.len() * DOS_ENTRY_SIZE;
                out.extend_from_slice(&(header_size as i32).to_le_bytes());
                let mut offset = header_size;
                for (name, bytes) in &self.members {
                    ensure!(
                        name.len() < DOS_NAME_LEN,
                        "name {name} does not fit a DOS PAK entry"
                    );
                    out.extend_from_slice(&(offset as i32).to_le_bytes());
                    out.extend_from_slice(&(bytes.len() as i32).to_le_bytes());
                    let mut field = [0u8; DOS_NAME_LEN];
                    field[..name.len()].copy_from_slice(name.as_bytes());
                    out.extend_from_slice(&field);
                    offset += bytes.len();
                }
            }
            PakLayout::Windows => {
                let table_len: usize = self
                    .members
                    .iter()
                    .map(|(name, _)| 12 + name.len() + 1)
                    .sum();
                out.extend_from_slice(WINDOWS_MAGIC);
                out.extend_from_slice(&(self.members.len() as i32).to_le_bytes());
                out.extend_from_slice(&[0u8; 8]);
                let mut offset = 16 + table_len;
                for (name, bytes) in &self.members {
                    out.extend_from_slice(&(offset as i32).to_le_bytes());
                    out.extend_from_slice(&(bytes.len() as i32).to_le_bytes());
                    out.extend_from_slice(&((name.len() + 1) as i32).to_le_bytes());
                    out.extend_from_slice(name.as_bytes());
                    out.push(0);
                    offset += bytes.len();
                }
            }
        }
        for (_, bytes) in &self.members {
            out.extend_from_slice(bytes);
        }
        Ok(out)
    }

    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = self.to_bytes()?;
        std::fs::write(path.as_ref(), bytes)
            .with_context(|| format!("writing PAK archive {}", path.as_ref().display()))
    }
}
