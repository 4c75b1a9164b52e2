//! Buffer pool lifecycle events, surfaced only as structured log records.
//! There is no event bus or subscriber API here — callers that want to
//! observe cache behavior read logs, the same as every other subsystem.

use tracing::trace;

/// One step in a page's journey through a buffer pool frame. Every variant
/// corresponds to a `tracing::trace!` call site in `buffer::manager`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferPoolEvent {
    Read,
    Write,
    Allocate,
    Pin,
    Unpin,
    MarkDirty,
    Evict,
    Flush,
}

impl BufferPoolEvent {
    fn label(self) -> &'static str {
        match self {
            BufferPoolEvent::Read => "read",
            BufferPoolEvent::Write => "write",
            BufferPoolEvent::Allocate => "allocate",
            BufferPoolEvent::Pin => "pin",
            BufferPoolEvent::Unpin => "unpin",
            BufferPoolEvent::MarkDirty => "mark_dirty",
            BufferPoolEvent::Evict => "evict",
            BufferPoolEvent::Flush => "flush",
        }
    }
}

pub fn record(tablespace: &str, page_number: u32, event: BufferPoolEvent) {
    trace!(tablespace, page_number, event = event.label(), "buffer pool event");
}
