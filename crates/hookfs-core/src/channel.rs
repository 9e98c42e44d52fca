//! In-memory channels and their close hooks.
//!
//! A [`Channel`] is a shared handle: clones refer to the same stream.
//! Hooks registered with [`Channel::on_close`] run exactly once, inside
//! [`Channel::close`], while the stream is still readable. This is what
//! lets a mount read back everything written to a file before the close
//! completes.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{VfsError, VfsResult};

static NEXT_CHANNEL: AtomicU64 = AtomicU64::new(0);

/// Largest buffer a write may grow a channel to unless a limit is given.
pub const DEFAULT_CHANNEL_LIMIT: usize = 64 * 1024 * 1024;

/// Hook run when a channel closes.
pub type CloseHook = Box<dyn FnOnce(&Channel) + Send>;

#[derive(Default)]
struct Stream {
    data: Vec<u8>,
    pos: usize,
}

struct ChannelInner {
    name: String,
    limit: usize,
    stream: Mutex<Stream>,
    hooks: Mutex<Vec<CloseHook>>,
    closing: AtomicBool,
    closed: AtomicBool,
}

/// Shared handle to an in-memory byte stream.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.inner.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl PartialEq for Channel {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Channel {
    /// Create a memory channel with a generated name.
    pub fn memory(data: impl Into<Vec<u8>>) -> Self {
        Self::memory_with_limit(data, DEFAULT_CHANNEL_LIMIT)
    }

    /// Create a memory channel whose writes may not grow it past `limit` bytes.
    pub fn memory_with_limit(data: impl Into<Vec<u8>>, limit: usize) -> Self {
        let n = NEXT_CHANNEL.fetch_add(1, Ordering::Relaxed);
        Self::with_limit(format!("memchan{n}"), data, limit)
    }

    /// Create a memory channel with an explicit name.
    pub fn named(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self::with_limit(name, data, DEFAULT_CHANNEL_LIMIT)
    }

    fn with_limit(name: impl Into<String>, data: impl Into<Vec<u8>>, limit: usize) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                name: name.into(),
                limit,
                stream: Mutex::new(Stream {
                    data: data.into(),
                    pos: 0,
                }),
                hooks: Mutex::new(Vec::new()),
                closing: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// The name scripts use to address this channel.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns true once `close` has completed.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    fn check_open(&self) -> VfsResult<()> {
        if self.is_closed() {
            return Err(VfsError::ChannelClosed(self.name().to_string()));
        }
        Ok(())
    }

    /// Read up to `max` bytes from the current position.
    pub fn read(&self, max: usize) -> VfsResult<Vec<u8>> {
        self.check_open()?;
        let mut stream = self.inner.stream.lock();
        let start = stream.pos.min(stream.data.len());
        let end = start.saturating_add(max).min(stream.data.len());
        stream.pos = end;
        Ok(stream.data[start..end].to_vec())
    }

    /// Read everything from the current position to the end.
    pub fn read_to_end(&self) -> VfsResult<Vec<u8>> {
        self.read(usize::MAX)
    }

    /// Write at the current position, overwriting and extending.
    ///
    /// Fails without touching the buffer if the write would end past the
    /// channel's limit.
    pub fn write(&self, bytes: &[u8]) -> VfsResult<usize> {
        self.check_open()?;
        let mut stream = self.inner.stream.lock();
        let pos = stream.pos;
        let bound = self.inner.limit.max(stream.data.len());
        let end = pos
            .checked_add(bytes.len())
            .filter(|end| *end <= bound)
            .ok_or_else(|| VfsError::ChannelLimit {
                name: self.name().to_string(),
                limit: self.inner.limit,
            })?;
        if stream.data.len() < end {
            stream.data.resize(end, 0);
        }
        stream.data[pos..end].copy_from_slice(bytes);
        stream.pos = end;
        Ok(bytes.len())
    }

    /// Move the position. Seeking past the end is allowed.
    pub fn seek(&self, pos: usize) -> VfsResult<()> {
        self.check_open()?;
        self.inner.stream.lock().pos = pos;
        Ok(())
    }

    /// Current position.
    pub fn tell(&self) -> usize {
        self.inner.stream.lock().pos
    }

    /// Whole buffer, independent of position.
    pub fn contents(&self) -> VfsResult<Vec<u8>> {
        self.check_open()?;
        Ok(self.inner.stream.lock().data.clone())
    }

    /// Register a hook to run when the channel closes.
    pub fn on_close(&self, hook: CloseHook) {
        self.inner.hooks.lock().push(hook);
    }

    /// Close the channel, running close hooks first.
    ///
    /// Hooks cannot prevent the close. Closing twice is an error.
    pub fn close(&self) -> VfsResult<()> {
        if self.inner.closing.swap(true, Ordering::AcqRel) {
            return Err(VfsError::ChannelClosed(self.name().to_string()));
        }
        let hooks = std::mem::take(&mut *self.inner.hooks.lock());
        debug!(channel = %self.name(), hooks = hooks.len(), "closing channel");
        for hook in hooks {
            hook(self);
        }
        self.inner.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Channels an environment can address by name.
#[derive(Debug, Default)]
pub struct ChannelTable {
    channels: Mutex<HashMap<String, Channel>>,
}

impl ChannelTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `channel` addressable by its name.
    pub fn register(&self, channel: &Channel) {
        self.channels
            .lock()
            .insert(channel.name().to_string(), channel.clone());
    }

    /// Remove a channel from the table without closing it.
    pub fn detach(&self, name: &str) -> Option<Channel> {
        self.channels.lock().remove(name)
    }

    /// Look up a channel by name.
    pub fn get(&self, name: &str) -> Option<Channel> {
        self.channels.lock().get(name).cloned()
    }

    /// Returns true if `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.channels.lock().contains_key(name)
    }

    /// Registered channel names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.channels.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Remove and return every channel.
    pub fn drain(&self) -> Vec<Channel> {
        self.channels.lock().drain().map(|(_, chan)| chan).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_read_write_seek() {
        let chan = Channel::memory("hello");
        assert_eq!(chan.read(2).unwrap(), b"he");
        assert_eq!(chan.read_to_end().unwrap(), b"llo");
        chan.seek(5).unwrap();
        chan.write(b" world").unwrap();
        assert_eq!(chan.contents().unwrap(), b"hello world");
        chan.seek(0).unwrap();
        chan.write(b"J").unwrap();
        assert_eq!(chan.contents().unwrap(), b"Jello world");
    }

    #[test]
    fn test_write_past_end_zero_fills() {
        let chan = Channel::memory("");
        chan.seek(3).unwrap();
        chan.write(b"x").unwrap();
        assert_eq!(chan.contents().unwrap(), b"\0\0\0x");
    }

    #[test]
    fn test_write_after_huge_seek_is_rejected() {
        let chan = Channel::memory("abc");
        chan.seek(usize::MAX).unwrap();
        let err = chan.write(b"x").unwrap_err();
        assert!(matches!(err, VfsError::ChannelLimit { .. }));
        assert_eq!(chan.contents().unwrap(), b"abc");
    }

    #[test]
    fn test_write_respects_limit() {
        let chan = Channel::memory_with_limit("", 4);
        assert_eq!(chan.write(b"abcd").unwrap(), 4);
        assert!(chan.write(b"e").is_err());
        chan.seek(1).unwrap();
        chan.write(b"XY").unwrap();
        assert_eq!(chan.contents().unwrap(), b"aXYd");

        let sparse = Channel::memory_with_limit("", 4);
        sparse.seek(10).unwrap();
        let err = sparse.write(b"x").unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("channel \"{}\" would exceed 4 bytes", sparse.name())
        );
        assert!(sparse.contents().unwrap().is_empty());
    }

    #[test]
    fn test_close_hooks_run_once_before_closed() {
        let chan = Channel::memory("data");
        let runs = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let (r, s) = (runs.clone(), seen.clone());
        chan.on_close(Box::new(move |c: &Channel| {
            r.fetch_add(1, Ordering::SeqCst);
            *s.lock() = c.contents().unwrap();
        }));

        chan.close().unwrap();
        assert!(chan.is_closed());
        assert!(chan.close().is_err());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(&*seen.lock(), b"data");
        assert!(matches!(chan.read(1), Err(VfsError::ChannelClosed(_))));
    }

    #[test]
    fn test_table_register_detach() {
        let table = ChannelTable::new();
        let chan = Channel::named("file7", "");
        table.register(&chan);
        assert!(table.contains("file7"));
        assert_eq!(table.get("file7"), Some(chan.clone()));

        let detached = table.detach("file7").unwrap();
        assert_eq!(detached, chan);
        assert!(!detached.is_closed());
        assert!(table.get("file7").is_none());
        assert!(table.names().is_empty());
    }

    #[test]
    fn test_generated_names_unique() {
        let a = Channel::memory("");
        let b = Channel::memory("");
        assert_ne!(a.name(), b.name());
    }
}
