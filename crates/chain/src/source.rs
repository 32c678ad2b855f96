//! Where blocks come from.

use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use utxoshard_core::{Block, BlockError, Hash};

/// Errors raised while fetching the next block.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("invalid hex in {path}: {source}")]
    Hex {
        path: PathBuf,
        source: hex::FromHexError,
    },

    #[error("block error: {0}")]
    Block(#[from] BlockError),

    #[error("block height {height} does not follow {previous}")]
    HeightOrder { height: u32, previous: u32 },
}

pub type Result<T> = std::result::Result<T, SourceError>;

/// A linear sequence of blocks delivered in height order.
pub trait BlockSource: Send {
    /// The next block, or `None` at the end of the available range.
    fn next_block(&mut self) -> Result<Option<Block>>;
}

impl<S: BlockSource + ?Sized> BlockSource for Box<S> {
    fn next_block(&mut self) -> Result<Option<Block>> {
        (**self).next_block()
    }
}

enum Pending {
    Raw { height: u32, bytes: Vec<u8> },
    Decoded(Block),
}

/// Blocks held in memory, raw or already decoded.
#[derive(Default)]
pub struct MemorySource {
    pending: VecDeque<Pending>,
    last_height: Option<u32>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw blocks starting at `start_height`, one height each.
    pub fn from_raw(start_height: u32, blocks: Vec<Vec<u8>>) -> Self {
        let mut source = Self::new();
        for (offset, bytes) in blocks.into_iter().enumerate() {
            source.push_raw(start_height + offset as u32, bytes);
        }
        source
    }

    pub fn from_blocks(blocks: Vec<Block>) -> Self {
        let mut source = Self::new();
        for block in blocks {
            source.push_block(block);
        }
        source
    }

    pub fn push_raw(&mut self, height: u32, bytes: Vec<u8>) {
        self.pending.push_back(Pending::Raw { height, bytes });
    }

    pub fn push_block(&mut self, block: Block) {
        self.pending.push_back(Pending::Decoded(block));
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl BlockSource for MemorySource {
    fn next_block(&mut self) -> Result<Option<Block>> {
        let block = match self.pending.pop_front() {
            None => return Ok(None),
            Some(Pending::Raw { height, bytes }) => Block::decode(&bytes, height, None)?,
            Some(Pending::Decoded(block)) => block,
        };
        if let Some(previous) = self.last_height {
            if block.height() <= previous {
                return Err(SourceError::HeightOrder {
                    height: block.height(),
                    previous,
                });
            }
        }
        self.last_height = Some(block.height());
        Ok(Some(block))
    }
}

/// Reads `<height>.bin` (raw bytes) or `<height>.hex` files from a directory.
///
/// The first missing height ends the range.
pub struct DirSource {
    dir: PathBuf,
    next_height: u32,
    stop_height: Option<u32>,
}

impl DirSource {
    /// Start reading at `start_height`.
    pub fn new<P: AsRef<Path>>(dir: P, start_height: u32) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            next_height: start_height,
            stop_height: None,
        }
    }

    /// End the range after `height`, even if more files exist.
    pub fn with_stop_height(mut self, height: u32) -> Self {
        self.stop_height = Some(height);
        self
    }

    pub fn next_height(&self) -> u32 {
        self.next_height
    }

    fn read(&self, height: u32) -> Result<Option<Vec<u8>>> {
        let bin = self.dir.join(format!("{}.bin", height));
        if let Some(bytes) = read_optional(&bin)? {
            return Ok(Some(bytes));
        }

        let hex_path = self.dir.join(format!("{}.hex", height));
        match read_optional(&hex_path)? {
            Some(text) => {
                let text = String::from_utf8_lossy(&text);
                let bytes = hex::decode(text.trim()).map_err(|source| SourceError::Hex {
                    path: hex_path.clone(),
                    source,
                })?;
                Ok(Some(bytes))
            }
            None => Ok(None),
        }
    }
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(SourceError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

impl BlockSource for DirSource {
    fn next_block(&mut self) -> Result<Option<Block>> {
        let height = self.next_height;
        if self.stop_height.is_some_and(|stop| height > stop) {
            return Ok(None);
        }
        let bytes = match self.read(height)? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        let block = Block::decode(&bytes, height, None)?;
        tracing::trace!(height, blockhash = %block.hash(), bytes = bytes.len(), "block read");
        self.next_height += 1;
        Ok(Some(block))
    }
}

/// Parse a display-order blockhash, as accepted on the command line.
pub fn parse_blockhash(text: &str) -> std::result::Result<Hash, hex::FromHexError> {
    Hash::from_hex(text.trim())
}
