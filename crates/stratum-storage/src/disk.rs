//! Table files: fixed-offset page I/O.
//!
//! ```text
//! [ TableHeader: 64 KB ][ page 0 ][ page 1 ] ... [ page N-1 ]
//! ```

use crate::page::Page;
use crate::table_header::TableHeader;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use stratum_common::{Result, StratumError};
use tracing::trace;

/// One table's backing file.
pub struct TableFile {
    /// Path to the file.
    path: PathBuf,
    /// The file handle.
    file: Mutex<File>,
    /// Page size of the table.
    page_size: usize,
    /// Sync after header writes and on [`sync`](Self::sync).
    fsync_enabled: bool,
}

impl TableFile {
    /// Creates a new table file and writes its header.
    ///
    /// Fails with `ElementExists` if the file is already present.
    pub fn create(header: &TableHeader, fsync_enabled: bool) -> Result<Self> {
        let path = header.path();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = match OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(StratumError::ElementExists(path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let table_file = Self {
            path,
            file: Mutex::new(file),
            page_size: header.page_size as usize,
            fsync_enabled,
        };
        table_file.write_header(header)?;
        Ok(table_file)
    }

    /// Opens an existing table file, returning it with its header.
    ///
    /// Fails with `ElementDoesNotExist` if there is no such file.
    pub fn open(path: impl AsRef<Path>, fsync_enabled: bool) -> Result<(Self, TableHeader)> {
        let path = path.as_ref().to_path_buf();
        let mut file = match OpenOptions::new().read(true).write(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StratumError::ElementDoesNotExist(path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let mut buffer = vec![0u8; TableHeader::SIZE];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut buffer).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => StratumError::CorruptHeader {
                reason: format!("{} is shorter than a table header", path.display()),
            },
            _ => e.into(),
        })?;
        let header = TableHeader::from_bytes(&buffer)?;

        Ok((
            Self {
                path,
                file: Mutex::new(file),
                page_size: header.page_size as usize,
                fsync_enabled,
            },
            header,
        ))
    }

    /// Returns the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the page size.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    fn page_offset(&self, page_id: u32) -> u64 {
        TableHeader::SIZE as u64 + page_id as u64 * self.page_size as u64
    }

    /// Overwrites the header region.
    pub fn write_header(&self, header: &TableHeader) -> Result<()> {
        let bytes = header.to_bytes()?;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&bytes)?;
        if self.fsync_enabled {
            file.sync_all()?;
        }
        Ok(())
    }

    /// Reads the header region.
    pub fn read_header(&self) -> Result<TableHeader> {
        let mut buffer = vec![0u8; TableHeader::SIZE];
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut buffer)?;
        TableHeader::from_bytes(&buffer)
    }

    /// Number of whole page slots present in the file.
    pub fn page_slots(&self) -> Result<u32> {
        let len = self.file.lock().metadata()?.len();
        let body = len.saturating_sub(TableHeader::SIZE as u64);
        Ok((body / self.page_size as u64) as u32)
    }

    /// Reads and decodes page `page_id`.
    pub fn read_page(&self, page_id: u32) -> Result<Page> {
        let slots = self.page_slots()?;
        if page_id >= slots {
            return Err(StratumError::ElementDoesNotExist(format!(
                "page {} of {} ({} on disk)",
                page_id,
                self.path.display(),
                slots
            )));
        }

        let mut buffer = vec![0u8; self.page_size];
        {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(self.page_offset(page_id)))?;
            file.read_exact(&mut buffer)?;
        }
        trace!(page_id, path = %self.path.display(), "read page");

        let page = Page::from_bytes(&buffer)?;
        if page.page_id() != page_id {
            return Err(stratum_common::error::corrupt_page(format!(
                "slot {} holds page {}",
                page_id,
                page.page_id()
            )));
        }
        Ok(page)
    }

    /// Encodes and writes `page` at its slot.
    pub fn write_page(&self, page: &Page) -> Result<()> {
        if page.page_size() != self.page_size {
            return Err(StratumError::PageOverflow {
                size: page.page_size(),
                page_size: self.page_size,
            });
        }
        let bytes = page.to_bytes()?;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(self.page_offset(page.page_id())))?;
        file.write_all(&bytes)?;
        trace!(page_id = page.page_id(), path = %self.path.display(), "wrote page");
        Ok(())
    }

    /// Flushes pending writes to disk when syncing is enabled.
    pub fn sync(&self) -> Result<()> {
        if self.fsync_enabled {
            self.file.lock().sync_all()?;
        }
        Ok(())
    }

    /// Closes and deletes the file.
    pub fn delete(self) -> Result<()> {
        let Self { path, file, .. } = self;
        drop(file);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for TableFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableFile")
            .field("path", &self.path)
            .field("page_size", &self.page_size)
            .finish()
    }
}
