use hashbrown::HashMap;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Source ID for identifying source buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(pub(crate) NonZeroU32);

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SourceId({})", self.0)
    }
}

impl SourceId {
    /// create a new SourceId from a u32. panics if id is zero.
    pub(crate) fn new(id: u32) -> Self {
        SourceId(NonZeroU32::new(id).expect("SourceId must be non-zero"))
    }

    fn to_u32(self) -> u32 {
        self.0.get()
    }
}

/// Source ID and byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceLoc {
    pub source_id: SourceId,
    pub offset: u32,
}

impl Default for SourceLoc {
    fn default() -> Self {
        Self::builtin()
    }
}

impl SourceLoc {
    pub fn new(source_id: SourceId, offset: u32) -> Self {
        SourceLoc { source_id, offset }
    }

    /// built-in source location (SourceId = 1, offset = 0)
    pub fn builtin() -> Self {
        SourceLoc::new(SourceId::new(1), 0)
    }

    pub fn source_id(&self) -> SourceId {
        self.source_id
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Location shifted by `delta` bytes within the same buffer.
    ///
    /// Used for synthetic tokens that have no real source text, e.g. the
    /// delimiters inserted around a protected macro parameter. The result is
    /// an anchor for diagnostics, not a position of actual text.
    pub fn with_offset(self, delta: i32) -> Self {
        let offset = self.offset.saturating_add_signed(delta);
        SourceLoc::new(self.source_id, offset)
    }
}

impl std::fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SourceLoc(source_id={}, offset={})", self.source_id, self.offset)
    }
}

/// Represents a half-open range [start, end) in one source buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceSpan {
    pub start: SourceLoc,
    pub end: SourceLoc,
}

impl Default for SourceSpan {
    fn default() -> Self {
        Self::empty()
    }
}

impl SourceSpan {
    pub fn new(start: SourceLoc, end: SourceLoc) -> Self {
        if start.source_id != end.source_id {
            // Spans crossing buffers (e.g. a macro name and its expansion)
            // degrade to a zero-length span at the start location.
            return SourceSpan { start, end: start };
        }
        SourceSpan { start, end }
    }

    pub fn empty() -> Self {
        SourceSpan::new(SourceLoc::builtin(), SourceLoc::builtin())
    }

    pub fn start(&self) -> SourceLoc {
        self.start
    }

    pub fn end(&self) -> SourceLoc {
        self.end
    }

    pub fn source_id(&self) -> SourceId {
        self.start.source_id
    }

    /// Merge two spans into a single span covering both.
    pub fn merge(self, other: SourceSpan) -> SourceSpan {
        if self.source_id() != other.source_id() {
            return self;
        }
        let start = if self.start.offset <= other.start.offset {
            self.start
        } else {
            other.start
        };
        let end = if self.end.offset >= other.end.offset { self.end } else { other.end };
        SourceSpan { start, end }
    }
}

impl std::fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SourceSpan(source_id={}, start={}, end={})",
            self.source_id(),
            self.start.offset,
            self.end.offset
        )
    }
}

/// Information about a single source buffer
#[derive(Debug)]
pub struct FileInfo {
    pub file_id: SourceId,
    pub path: PathBuf,
    pub size: u32,
    pub(crate) buffer: Arc<[u8]>,
    pub line_starts: Vec<u32>,
}

/// Manages source buffers and locations
pub struct SourceManager {
    file_infos: Vec<FileInfo>,
    path_to_id: HashMap<PathBuf, SourceId>,
    next_file_id: u32,
}

impl Default for SourceManager {
    fn default() -> Self {
        Self {
            file_infos: Vec::new(),
            path_to_id: HashMap::new(),
            next_file_id: 2, // Start from 2, reserve 1 for built-ins
        }
    }
}

impl SourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a buffer from a file path.
    pub fn add_file_from_path(&mut self, path: &Path) -> Result<SourceId, std::io::Error> {
        let buffer = std::fs::read(path)?;
        let path_str = path.to_str().unwrap_or("<invalid-utf8>");
        Ok(self.add_buffer(buffer, path_str))
    }

    /// Add a buffer with raw bytes (UTF-8 assumed).
    pub fn add_buffer(&mut self, buffer: Vec<u8>, path: &str) -> SourceId {
        let file_id = SourceId::new(self.next_file_id);
        self.next_file_id += 1;

        let mut line_starts = vec![0];
        for (i, &byte) in buffer.iter().enumerate() {
            if byte == b'\n' {
                line_starts.push((i + 1) as u32);
            }
        }

        let path_buf = PathBuf::from(path);
        self.path_to_id.insert(path_buf.clone(), file_id);

        let size = buffer.len() as u32;
        self.file_infos.push(FileInfo {
            file_id,
            path: path_buf,
            size,
            buffer: Arc::from(buffer),
            line_starts,
        });

        file_id
    }

    /// Get the buffer for a given source ID
    pub fn get_buffer(&self, source_id: SourceId) -> &[u8] {
        let id = source_id.to_u32();
        if id < 2 {
            panic!("invalid source_id {source_id}");
        }
        match self.file_infos.get(id as usize - 2) {
            Some(info) => &info.buffer[..],
            None => panic!("invalid source_id {source_id}"),
        }
    }

    /// Get file info for a given source ID
    pub fn get_file_info(&self, source_id: SourceId) -> Option<&FileInfo> {
        let id = source_id.to_u32();
        if id < 2 {
            return None;
        }
        self.file_infos.get(id as usize - 2)
    }

    /// Get source ID for a given file path
    pub fn get_file_id(&self, path: &str) -> Option<SourceId> {
        self.path_to_id.get(Path::new(path)).copied()
    }

    /// Get 1-based line and column for a source location
    pub fn get_line_column(&self, loc: SourceLoc) -> Option<(u32, u32)> {
        let file_info = self.get_file_info(loc.source_id())?;
        let offset = loc.offset();

        let line_starts = &file_info.line_starts;
        if line_starts.is_empty() {
            return Some((1, offset + 1));
        }

        // partition_point performs a binary search
        let idx = line_starts.partition_point(|&start| start <= offset);
        if idx == 0 {
            return Some((0, 1));
        }

        let line_idx = idx - 1;
        let column = offset - line_starts[line_idx];
        Some((line_idx as u32 + 1, column + 1))
    }
}
