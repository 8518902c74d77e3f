//! Memory-mapped raw data files.
//!

use crate::Result;
use cbcscan_cbc::{DecoderConfig, FrameDecoder, RawEventRecord, RECORD_SIZE};
use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};

/// A memory-mapped file reader.
///
/// Uses memmap2 to access file contents without loading the entire file
/// into memory.
pub struct MappedFileReader {
    mmap: Mmap,
    path: PathBuf,
}

impl MappedFileReader {
    /// Opens a file for memory-mapped reading.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or memory-mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        // SAFETY: The file is opened read-only and we assume it is not modified concurrently.
        // This is the standard safety contract for memory mapping.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self {
            mmap,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Returns the file contents as a byte slice.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.mmap[..]
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    /// Returns true if the file is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    /// Path the file was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// A raw test-stand dump of fixed-size event records.
pub struct RawDataFile {
    reader: MappedFileReader,
    config: DecoderConfig,
}

impl RawDataFile {
    /// Opens a raw data file with the default decoder configuration.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or memory-mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            reader: MappedFileReader::open(path)?,
            config: DecoderConfig::default(),
        })
    }

    /// Sets the decoder configuration.
    #[must_use]
    pub fn with_config(mut self, config: DecoderConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub fn file_size(&self) -> usize {
        self.reader.len()
    }

    /// Path the file was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.reader.path()
    }

    /// Number of complete records in the file.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.reader.len() / RECORD_SIZE
    }

    /// Bytes after the last complete record. These are never decoded.
    #[must_use]
    pub fn trailing_bytes(&self) -> usize {
        self.reader.len() % RECORD_SIZE
    }

    /// Decoder over the mapped bytes.
    #[must_use]
    pub fn events(&self) -> FrameDecoder<&[u8]> {
        FrameDecoder::new(self.reader.as_bytes()).with_config(self.config.clone())
    }

    /// Decodes the first record, if the file holds one.
    ///
    /// # Errors
    /// Returns a decode error if the first record is malformed.
    pub fn first_event(&self) -> Result<Option<RawEventRecord>> {
        Ok(self.events().next_event()?)
    }
}
