//! Chunked encrypted file transfer.
//!
//! A transfer is ordinary traffic on an established session: one
//! `FILE_TRANSFER_START` announcing metadata, then `num_chunks` ×
//! `FILE_CHUNK`, each wrapped in its own envelope with its own sequence
//! number. The receiver reassembles in order and verifies the whole-file
//! SHA-256 before releasing anything upstream.

use std::collections::HashMap;
use std::fmt;

use sha2::{Digest, Sha256};
use tchat_proto::messages::{FileChunk, FileTransferStart};

/// Default chunk size (64 KiB).
pub const CHUNK_SIZE_DEFAULT: usize = 64 * 1024;

/// Largest chunk a receiver will accept (1 MiB).
pub const CHUNK_SIZE_MAX: usize = 1024 * 1024;

// ─── Error ───────────────────────────────────────────────────────────────────

/// Errors from the receiving side of a transfer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TransferError {
    /// A chunk arrived for a file id with no announced transfer.
    UnknownTransfer { file_id: String },
    /// Chunks must arrive in `chunk_index` order on today's transport.
    OutOfOrderChunk { file_id: String, expected: u32, got: u32 },
    /// One chunk exceeded [`CHUNK_SIZE_MAX`].
    OversizeChunk { file_id: String, len: usize },
    /// Reassembled bytes did not hash to the announced SHA-256; the
    /// whole transfer is discarded.
    HashMismatch { file_id: String },
    /// The announced metadata was inconsistent (chunk count vs size).
    BadMetadata { file_id: String },
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownTransfer { file_id } => {
                write!(f, "chunk for unannounced transfer {file_id}")
            }
            Self::OutOfOrderChunk { file_id, expected, got } => {
                write!(f, "transfer {file_id}: expected chunk {expected}, got {got}")
            }
            Self::OversizeChunk { file_id, len } => {
                write!(f, "transfer {file_id}: chunk of {len} bytes exceeds maximum")
            }
            Self::HashMismatch { file_id } => {
                write!(f, "transfer {file_id}: SHA-256 mismatch, file rejected")
            }
            Self::BadMetadata { file_id } => {
                write!(f, "transfer {file_id}: inconsistent metadata")
            }
        }
    }
}

impl std::error::Error for TransferError {}

// ─── sending side ────────────────────────────────────────────────────────────

/// Split `bytes` into a transfer announcement plus its chunk messages.
///
/// `chunk_size` is clamped to `1..=CHUNK_SIZE_MAX`; pass
/// [`CHUNK_SIZE_DEFAULT`] unless there is a reason not to.
pub fn plan_transfer(
    file_id: &str,
    filename: &str,
    bytes: &[u8],
    chunk_size: usize,
) -> (FileTransferStart, Vec<FileChunk>) {
    let chunk_size = chunk_size.clamp(1, CHUNK_SIZE_MAX);
    let chunks: Vec<FileChunk> = bytes
        .chunks(chunk_size)
        .enumerate()
        .map(|(i, data)| FileChunk {
            file_id: file_id.to_string(),
            chunk_index: i as u32,
            data: data.to_vec(),
        })
        .collect();

    let start = FileTransferStart {
        file_id: file_id.to_string(),
        filename: filename.to_string(),
        total_size: bytes.len() as u64,
        num_chunks: chunks.len() as u32,
        sha256: Sha256::digest(bytes).into(),
    };
    (start, chunks)
}

// ─── receiving side ──────────────────────────────────────────────────────────

/// A fully received and hash-verified file.
#[derive(Debug)]
pub struct CompletedFile {
    pub file_id: String,
    pub filename: String,
    pub bytes: Vec<u8>,
}

struct ActiveTransfer {
    meta: FileTransferStart,
    next_chunk: u32,
    buffer: Vec<u8>,
}

/// Reassembly state for every in-flight incoming transfer, keyed by
/// `(sender, file_id)` so concurrent senders cannot collide.
#[derive(Default)]
pub struct IncomingTransfers {
    active: HashMap<(u32, String), ActiveTransfer>,
}

impl IncomingTransfers {
    pub fn new() -> Self {
        Self { active: HashMap::new() }
    }

    /// Handle a `FILE_TRANSFER_START`. Restarting an id discards any
    /// partial state for it.
    pub fn on_start(&mut self, sender: u32, meta: FileTransferStart) -> Result<(), TransferError> {
        let max_total = (meta.num_chunks as u64).saturating_mul(CHUNK_SIZE_MAX as u64);
        if meta.total_size > max_total {
            return Err(TransferError::BadMetadata { file_id: meta.file_id });
        }
        let key = (sender, meta.file_id.clone());
        self.active.insert(
            key,
            ActiveTransfer {
                buffer: Vec::with_capacity(meta.total_size.min(CHUNK_SIZE_MAX as u64) as usize),
                next_chunk: 0,
                meta,
            },
        );
        Ok(())
    }

    /// Handle one chunk. Returns the completed file once the final chunk
    /// lands and the hash checks out; any error discards the transfer.
    pub fn on_chunk(
        &mut self,
        sender: u32,
        chunk: FileChunk,
    ) -> Result<Option<CompletedFile>, TransferError> {
        let key = (sender, chunk.file_id.clone());
        let Some(transfer) = self.active.get_mut(&key) else {
            return Err(TransferError::UnknownTransfer { file_id: chunk.file_id });
        };

        if chunk.data.len() > CHUNK_SIZE_MAX {
            let len = chunk.data.len();
            self.active.remove(&key);
            return Err(TransferError::OversizeChunk { file_id: chunk.file_id, len });
        }
        if chunk.chunk_index != transfer.next_chunk {
            let expected = transfer.next_chunk;
            self.active.remove(&key);
            return Err(TransferError::OutOfOrderChunk {
                file_id: chunk.file_id,
                expected,
                got: chunk.chunk_index,
            });
        }
        // Never buffer past the announced size, whatever the sender claims.
        if transfer.buffer.len() as u64 + chunk.data.len() as u64 > transfer.meta.total_size {
            self.active.remove(&key);
            return Err(TransferError::BadMetadata { file_id: chunk.file_id });
        }

        transfer.buffer.extend_from_slice(&chunk.data);
        transfer.next_chunk += 1;

        if transfer.next_chunk < transfer.meta.num_chunks {
            return Ok(None);
        }

        // Final chunk: verify and release, or reject the whole file.
        let transfer = self.active.remove(&key).expect("transfer entry vanished");
        let digest: [u8; 32] = Sha256::digest(&transfer.buffer).into();
        if digest != transfer.meta.sha256 || transfer.buffer.len() as u64 != transfer.meta.total_size
        {
            return Err(TransferError::HashMismatch { file_id: transfer.meta.file_id });
        }
        Ok(Some(CompletedFile {
            file_id: transfer.meta.file_id,
            filename: transfer.meta.filename,
            bytes: transfer.buffer,
        }))
    }

    /// Drop all partial state from `sender` (disconnect).
    pub fn drop_sender(&mut self, sender: u32) {
        self.active.retain(|(s, _), _| *s != sender);
    }

    pub fn in_flight(&self) -> usize {
        self.active.len()
    }
}
