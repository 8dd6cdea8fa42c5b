//! Framed, checksummed row journal.
//!
//! A minimal storage sink for the chunked row contract. Each frame is
//! `[len:u32][crc32:u32][bincode payload]`, little endian. The first frame is
//! a [`JournalHeader`]; every following frame holds one [`FlatRecord`].
//!
//! [`JournalReader::read_chunk`] only ever closes a chunk right after a row
//! flagged `_last`, so an encode call's rows never straddle two decode calls.
use anyhow::{bail, Context, Result};
use crc32fast::Hasher as Crc32;
use crossbeam_channel::{bounded, Sender};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

use crate::model::BookData;
use crate::record::FlatRecord;
use crate::registry::TableFormat;

pub const JOURNAL_VERSION: u16 = 1;

/// Largest payload a frame may declare. A row is a few hundred bytes.
pub const MAX_FRAME_LEN: usize = 1 << 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalHeader {
    pub version: u16,
    pub created_unix_ns: u128,
    /// Schema table name, used to find the format again on read.
    pub table: String,
    pub chunked: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JournalFrame {
    Header(JournalHeader),
    Row(FlatRecord),
}

fn now_unix_ns() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
}

fn write_frame<W: Write>(w: &mut W, frame: &JournalFrame) -> Result<()> {
    let payload = bincode::serialize(frame)?;
    let mut hasher = Crc32::new();
    hasher.update(&payload);
    let crc = hasher.finalize();

    if payload.len() > MAX_FRAME_LEN {
        bail!("frame of {} bytes exceeds {} bytes", payload.len(), MAX_FRAME_LEN);
    }
    let len = u32::try_from(payload.len()).context("frame larger than 4 GiB")?;
    w.write_all(&len.to_le_bytes())?;
    w.write_all(&crc.to_le_bytes())?;
    w.write_all(&payload)?;
    Ok(())
}

pub struct JournalWriter {
    w: BufWriter<File>,
    format: Arc<TableFormat>,
    path: PathBuf,
    rows: u64,
}

impl JournalWriter {
    /// Create (truncating) a journal for `format` and write its header.
    pub fn create(path: &Path, format: Arc<TableFormat>) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| format!("create {parent:?}"))?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("open {path:?} for writing"))?;
        let mut w = BufWriter::with_capacity(1 << 20, file); // 1 MiB buffer
        let header = JournalHeader {
            version: JOURNAL_VERSION,
            created_unix_ns: now_unix_ns(),
            table: format.schema.table.to_string(),
            chunked: format.chunked,
        };
        write_frame(&mut w, &JournalFrame::Header(header))?;
        debug!("Opened journal {} for table {}", path.display(), format.schema.table);
        Ok(Self { w, format, path: path.to_path_buf(), rows: 0 })
    }

    /// Encode one event through the format and append its rows.
    pub fn append(&mut self, data: &BookData) -> Result<usize> {
        let rows = self.format.serialize(data);
        self.append_rows(&rows)?;
        Ok(rows.len())
    }

    /// Append already-encoded rows verbatim.
    pub fn append_rows(&mut self, rows: &[FlatRecord]) -> Result<()> {
        for row in rows {
            write_frame(&mut self.w, &JournalFrame::Row(row.clone()))?;
        }
        self.rows += rows.len() as u64;
        Ok(())
    }

    /// Flush and close; returns the number of rows written.
    pub fn finish(mut self) -> Result<u64> {
        self.w.flush()?;
        debug!("Closed journal {} with {} rows", self.path.display(), self.rows);
        Ok(self.rows)
    }
}

/// Run a [`JournalWriter`] on a background thread fed by a bounded channel.
///
/// Dropping every sender ends the thread; joining it yields the row count.
pub fn spawn_writer(
    path: PathBuf,
    format: Arc<TableFormat>,
    capacity: usize,
) -> (Sender<BookData>, JoinHandle<Result<u64>>) {
    let (tx, rx) = bounded::<BookData>(capacity);
    let handle = std::thread::spawn(move || -> Result<u64> {
        let mut writer = JournalWriter::create(&path, format)?;
        for data in rx {
            writer.append(&data)?;
        }
        writer.finish()
    });
    (tx, handle)
}

fn read_u32<R: Read>(r: &mut R) -> std::io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

pub struct JournalReader {
    r: BufReader<File>,
    header: JournalHeader,
    frames: u64,
}

impl JournalReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("open {path:?}"))?;
        let mut reader = Self {
            r: BufReader::new(file),
            header: JournalHeader { version: 0, created_unix_ns: 0, table: String::new(), chunked: false },
            frames: 0,
        };
        match reader.next_frame()? {
            Some(JournalFrame::Header(h)) => {
                if h.version != JOURNAL_VERSION {
                    bail!("unsupported journal version {} (expected {})", h.version, JOURNAL_VERSION);
                }
                reader.header = h;
            }
            Some(JournalFrame::Row(_)) => bail!("journal {path:?} does not start with a header"),
            None => bail!("journal {path:?} is empty"),
        }
        debug!("Reading journal {} (table {})", path.display(), reader.header.table);
        Ok(reader)
    }

    pub fn header(&self) -> &JournalHeader {
        &self.header
    }

    /// Frames consumed so far, header included.
    pub fn frames_read(&self) -> u64 {
        self.frames
    }

    /// Next frame, or `None` at a clean end of file.
    ///
    /// Only a file ending exactly on a frame boundary is a clean end; a torn
    /// length prefix is reported like any other truncated frame.
    fn next_frame(&mut self) -> Result<Option<JournalFrame>> {
        let mut len_buf = [0u8; 4];
        loop {
            match self.r.read(&mut len_buf[..1]) {
                Ok(0) => return Ok(None),
                Ok(_) => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        self.r
            .read_exact(&mut len_buf[1..])
            .with_context(|| format!("frame {} truncated", self.frames))?;
        let len = u32::from_le_bytes(len_buf) as usize;
        if len > MAX_FRAME_LEN {
            bail!("frame {} length {} exceeds {} bytes", self.frames, len, MAX_FRAME_LEN);
        }
        let crc_on_file = read_u32(&mut self.r).with_context(|| format!("frame {} truncated", self.frames))?;
        let mut payload = vec![0u8; len];
        self.r
            .read_exact(&mut payload)
            .with_context(|| format!("frame {} truncated", self.frames))?;
        let mut hasher = Crc32::new();
        hasher.update(&payload);
        let crc_calc = hasher.finalize();
        if crc_calc != crc_on_file {
            bail!("CRC mismatch at frame {}: file={:#x}, calc={:#x}", self.frames, crc_on_file, crc_calc);
        }
        let frame = bincode::deserialize(&payload).context("bincode decode")?;
        self.frames += 1;
        Ok(Some(frame))
    }

    pub fn next_row(&mut self) -> Result<Option<FlatRecord>> {
        match self.next_frame()? {
            Some(JournalFrame::Row(row)) => Ok(Some(row)),
            Some(JournalFrame::Header(_)) => bail!("unexpected header at frame {}", self.frames - 1),
            None => Ok(None),
        }
    }

    /// Read at least `target_rows` rows (fewer at end of file), extended up to
    /// the next `_last` row. Returns `None` once the journal is exhausted.
    pub fn read_chunk(&mut self, target_rows: usize) -> Result<Option<Vec<FlatRecord>>> {
        let mut chunk = Vec::with_capacity(target_rows);
        while let Some(row) = self.next_row()? {
            let closes_group = row.last;
            chunk.push(row);
            if closes_group && chunk.len() >= target_rows {
                return Ok(Some(chunk));
            }
        }
        match chunk.last() {
            None => Ok(None),
            Some(row) if row.last => Ok(Some(chunk)),
            Some(row) => bail!(
                "journal ends inside group {} @ {} ({} row(s) since the last boundary)",
                row.instrument_id,
                row.ts_event,
                chunk.iter().rev().take_while(|r| !r.last).count()
            ),
        }
    }
}
