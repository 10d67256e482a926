//! Read-only content access and content contributions.
//!
//! A `ContentAccessor` is the framework-owned, read-only view over one node's
//! raw bytes, lent to exactly one node-function invocation. Content is frozen
//! before an accessor is handed out: size, bytes, and digest never change for
//! the accessor's lifetime.
//!
//! A node describes its own content as an ordered list of [`Contribution`]s:
//! literal derived bytes, byte ranges of the parent's content, and sparse
//! (logical zero) regions. [`ComposedContent`] assembles these into a new
//! accessor without copying parent bytes.

use crate::error::BridgeError;
use crate::types::Sha1Digest;
use parking_lot::Mutex;
use sha1::{Digest, Sha1};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Chunk size used when streaming content for digest computation.
const HASH_CHUNK: usize = 64 * 1024;

/// Read-only access to one node's frozen content.
///
/// The stream view ([`ContentAccessorExt::reader`]) and the path view
/// ([`ContentAccessor::local_path`]) expose the same logical bytes; a module
/// picks whichever is cheaper for its algorithm. The path view may be the
/// more expensive one in a distributed deployment since it can force a local
/// materialization.
pub trait ContentAccessor: Send + Sync {
    /// Total byte length of the content.
    fn size(&self) -> u64;

    /// Random-access read at `offset`. Returns the number of bytes read,
    /// fewer than `buf.len()` only at end of content.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, BridgeError>;

    /// Path of a local file holding the same bytes, for handing to external
    /// tools. May materialize the content on first call.
    fn local_path(&self) -> Result<PathBuf, BridgeError>;

    /// SHA-1 digest of the full content. Computed at most once per accessor
    /// and memoized; repeated calls return the identical value.
    fn sha1(&self) -> Result<Sha1Digest, BridgeError>;
}

/// Convenience operations derived from the core accessor contract.
pub trait ContentAccessorExt: ContentAccessor {
    /// Sequential-read view over the content, starting at offset zero.
    fn reader(&self) -> AccessorReader<'_, Self> {
        AccessorReader {
            content: self,
            pos: 0,
        }
    }

    /// Digest rendered as lowercase hex.
    fn sha1_hex(&self) -> Result<String, BridgeError> {
        Ok(hex::encode(self.sha1()?))
    }

    /// Read the full content into memory. Intended for small nodes and tests.
    fn read_all(&self) -> Result<Vec<u8>, BridgeError> {
        let mut out = vec![0u8; self.size() as usize];
        let mut filled = 0usize;
        while filled < out.len() {
            let n = self.read_at(filled as u64, &mut out[filled..])?;
            if n == 0 {
                return Err(BridgeError::content(format!(
                    "content ended at {} bytes, expected {}",
                    filled,
                    out.len()
                )));
            }
            filled += n;
        }
        Ok(out)
    }
}

impl<T: ContentAccessor + ?Sized> ContentAccessorExt for T {}

/// `std::io::Read` adapter over an accessor's random-access view.
pub struct AccessorReader<'a, T: ?Sized> {
    content: &'a T,
    pos: u64,
}

impl<T: ContentAccessor + ?Sized> Read for AccessorReader<'_, T> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self
            .content
            .read_at(self.pos, buf)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
        self.pos += n as u64;
        Ok(n)
    }
}

/// Stream the accessor's bytes through SHA-1.
fn compute_sha1<T: ContentAccessor + ?Sized>(content: &T) -> Result<Sha1Digest, BridgeError> {
    let mut hasher = Sha1::new();
    let mut buf = vec![0u8; HASH_CHUNK];
    let mut pos = 0u64;
    let size = content.size();
    while pos < size {
        let n = content.read_at(pos, &mut buf)?;
        if n == 0 {
            return Err(BridgeError::content(format!(
                "content ended at {} bytes while hashing, expected {}",
                pos, size
            )));
        }
        hasher.update(&buf[..n]);
        pos += n as u64;
    }
    Ok(hasher.finalize().into())
}

/// In-memory content, used for derived chunks and tests.
pub struct BytesContent {
    bytes: Vec<u8>,
    spill_dir: Option<PathBuf>,
    digest: Mutex<Option<Sha1Digest>>,
    local: Mutex<Option<PathBuf>>,
}

impl BytesContent {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            spill_dir: None,
            digest: Mutex::new(None),
            local: Mutex::new(None),
        }
    }

    /// In-memory content that may materialize a path view under `spill_dir`.
    pub fn with_spill_dir(bytes: Vec<u8>, spill_dir: PathBuf) -> Self {
        Self {
            spill_dir: Some(spill_dir),
            ..Self::new(bytes)
        }
    }
}

impl ContentAccessor for BytesContent {
    fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, BridgeError> {
        if offset >= self.bytes.len() as u64 {
            return Ok(0);
        }
        let start = offset as usize;
        let n = buf.len().min(self.bytes.len() - start);
        buf[..n].copy_from_slice(&self.bytes[start..start + n]);
        Ok(n)
    }

    fn local_path(&self) -> Result<PathBuf, BridgeError> {
        let mut local = self.local.lock();
        if let Some(path) = local.as_ref() {
            return Ok(path.clone());
        }
        let dir = self.spill_dir.as_ref().ok_or_else(|| {
            BridgeError::content("no local materialization available for in-memory content")
        })?;
        let path = spill_to(dir, &self.bytes)?;
        *local = Some(path.clone());
        Ok(path)
    }

    fn sha1(&self) -> Result<Sha1Digest, BridgeError> {
        let mut digest = self.digest.lock();
        if let Some(d) = *digest {
            return Ok(d);
        }
        let d: Sha1Digest = Sha1::digest(&self.bytes).into();
        *digest = Some(d);
        Ok(d)
    }
}

/// Content backed by a closed file on the local filesystem.
pub struct FileContent {
    path: PathBuf,
    size: u64,
    file: Mutex<File>,
    digest: Mutex<Option<Sha1Digest>>,
}

impl FileContent {
    /// Open `path` for read access. The file must be fully written and
    /// closed by its producer before this is called.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BridgeError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            path,
            size,
            file: Mutex::new(file),
            digest: Mutex::new(None),
        })
    }
}

impl ContentAccessor for FileContent {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, BridgeError> {
        if offset >= self.size {
            return Ok(0);
        }
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        let want = buf.len().min((self.size - offset) as usize);
        let mut filled = 0usize;
        while filled < want {
            let n = file.read(&mut buf[filled..want])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }

    fn local_path(&self) -> Result<PathBuf, BridgeError> {
        Ok(self.path.clone())
    }

    fn sha1(&self) -> Result<Sha1Digest, BridgeError> {
        let mut digest = self.digest.lock();
        if let Some(d) = *digest {
            return Ok(d);
        }
        let d = compute_sha1(self)?;
        *digest = Some(d);
        Ok(d)
    }
}

/// One ordered piece of a node's logical content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Contribution {
    /// Literal bytes derived by the module.
    Derived(Vec<u8>),
    /// A byte range of the parent's content, referenced without copying.
    ParentFragment { offset: u64, length: u64 },
    /// A run of logical zero bytes, not physically stored.
    Sparse { length: u64 },
}

impl Contribution {
    pub fn length(&self) -> u64 {
        match self {
            Contribution::Derived(bytes) => bytes.len() as u64,
            Contribution::ParentFragment { length, .. } => *length,
            Contribution::Sparse { length } => *length,
        }
    }
}

struct Segment {
    /// Logical offset of this segment within the composed content.
    start: u64,
    contribution: Contribution,
}

/// A child node's content assembled from ordered contributions against its
/// parent's accessor. Parent fragments are read through the parent on demand;
/// sparse regions read as zeros.
pub struct ComposedContent {
    parent: Arc<dyn ContentAccessor>,
    segments: Vec<Segment>,
    size: u64,
    spill_dir: Option<PathBuf>,
    digest: Mutex<Option<Sha1Digest>>,
    local: Mutex<Option<PathBuf>>,
}

impl ComposedContent {
    /// Compose content from `contributions` in order. Every parent fragment
    /// is validated against the parent's size up front.
    pub fn new(
        parent: Arc<dyn ContentAccessor>,
        contributions: Vec<Contribution>,
        spill_dir: Option<PathBuf>,
    ) -> Result<Self, BridgeError> {
        let parent_size = parent.size();
        let mut segments = Vec::with_capacity(contributions.len());
        let mut size = 0u64;
        for contribution in contributions {
            if let Contribution::ParentFragment { offset, length } = contribution {
                if offset.checked_add(length).map_or(true, |end| end > parent_size) {
                    return Err(BridgeError::FragmentOutOfRange {
                        offset,
                        length,
                        parent_size,
                    });
                }
            }
            let length = contribution.length();
            segments.push(Segment {
                start: size,
                contribution,
            });
            size += length;
        }
        Ok(Self {
            parent,
            segments,
            size,
            spill_dir,
            digest: Mutex::new(None),
            local: Mutex::new(None),
        })
    }

    /// Read from the single segment containing `offset`.
    fn read_segment(&self, index: usize, offset: u64, buf: &mut [u8]) -> Result<usize, BridgeError> {
        let segment = &self.segments[index];
        let within = offset - segment.start;
        let remaining = segment.contribution.length() - within;
        let want = buf.len().min(remaining as usize);
        if want == 0 {
            return Ok(0);
        }
        match &segment.contribution {
            Contribution::Derived(bytes) => {
                let start = within as usize;
                buf[..want].copy_from_slice(&bytes[start..start + want]);
                Ok(want)
            }
            Contribution::ParentFragment { offset: parent_offset, .. } => {
                let n = self.parent.read_at(parent_offset + within, &mut buf[..want])?;
                if n == 0 {
                    // The fragment was validated in range; a short read here
                    // means the parent's bytes changed underneath us.
                    return Err(BridgeError::content(
                        "parent content ended inside a validated fragment",
                    ));
                }
                Ok(n)
            }
            Contribution::Sparse { .. } => {
                buf[..want].fill(0);
                Ok(want)
            }
        }
    }
}

impl ContentAccessor for ComposedContent {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, BridgeError> {
        if offset >= self.size || buf.is_empty() {
            return Ok(0);
        }
        // Segments are ordered by start offset; find the one covering `offset`.
        let mut index = match self
            .segments
            .binary_search_by(|s| s.start.cmp(&offset))
        {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        // Skip zero-length contributions that share the same start.
        while self.segments[index].contribution.length() == 0 {
            index += 1;
        }
        let mut filled = 0usize;
        let mut pos = offset;
        while filled < buf.len() && pos < self.size {
            let n = self.read_segment(index, pos, &mut buf[filled..])?;
            filled += n;
            pos += n as u64;
            if index + 1 < self.segments.len() && pos >= self.segments[index + 1].start {
                index += 1;
            }
        }
        Ok(filled)
    }

    fn local_path(&self) -> Result<PathBuf, BridgeError> {
        let mut local = self.local.lock();
        if let Some(path) = local.as_ref() {
            return Ok(path.clone());
        }
        let dir = self.spill_dir.as_ref().ok_or_else(|| {
            BridgeError::content("no local materialization available for composed content")
        })?;
        let bytes = self.read_all()?;
        let path = spill_to(dir, &bytes)?;
        *local = Some(path.clone());
        Ok(path)
    }

    fn sha1(&self) -> Result<Sha1Digest, BridgeError> {
        let mut digest = self.digest.lock();
        if let Some(d) = *digest {
            return Ok(d);
        }
        let d = compute_sha1(self)?;
        *digest = Some(d);
        Ok(d)
    }
}

/// Write `bytes` to a fresh file under `dir` and return its path.
fn spill_to(dir: &Path, bytes: &[u8]) -> Result<PathBuf, BridgeError> {
    use std::sync::atomic::{AtomicU64, Ordering};
    static SPILL_COUNTER: AtomicU64 = AtomicU64::new(0);
    std::fs::create_dir_all(dir)?;
    let name = format!(
        "content-{}-{}.bin",
        std::process::id(),
        SPILL_COUNTER.fetch_add(1, Ordering::Relaxed)
    );
    let path = dir.join(name);
    std::fs::write(&path, bytes)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{digest_hex, EMPTY_SHA1};

    fn parent() -> Arc<dyn ContentAccessor> {
        // 32 bytes: 0x00, 0x01, .. 0x1f
        Arc::new(BytesContent::new((0u8..32).collect()))
    }

    #[test]
    fn random_access_reads_cover_full_content() {
        let content = BytesContent::new(b"hello treegraph".to_vec());
        let mut total = 0u64;
        let mut collected = Vec::new();
        let mut buf = [0u8; 4];
        loop {
            let n = content.read_at(total, &mut buf).unwrap();
            if n == 0 {
                break;
            }
            collected.extend_from_slice(&buf[..n]);
            total += n as u64;
        }
        assert_eq!(total, content.size());
        assert_eq!(collected, b"hello treegraph");
    }

    #[test]
    fn stream_view_matches_random_access_view() {
        let content = BytesContent::new(b"cross-view consistency".to_vec());
        let mut streamed = Vec::new();
        content.reader().read_to_end(&mut streamed).unwrap();
        assert_eq!(streamed, content.read_all().unwrap());
    }

    #[test]
    fn sha1_is_memoized_and_deterministic() {
        let content = BytesContent::new(b"abc".to_vec());
        let first = content.sha1().unwrap();
        let second = content.sha1().unwrap();
        assert_eq!(first, second);
        assert_eq!(digest_hex(&first), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn equal_content_yields_equal_digests_across_accessors() {
        let a = BytesContent::new(b"same bytes".to_vec());
        let b = BytesContent::new(b"same bytes".to_vec());
        assert_eq!(a.sha1().unwrap(), b.sha1().unwrap());

        let c = BytesContent::new(b"same bytez".to_vec());
        assert_ne!(a.sha1().unwrap(), c.sha1().unwrap());
    }

    #[test]
    fn file_and_memory_accessors_agree() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("item.bin");
        std::fs::write(&path, b"file-backed bytes").unwrap();
        let file = FileContent::open(&path).unwrap();
        let mem = BytesContent::new(b"file-backed bytes".to_vec());
        assert_eq!(file.size(), mem.size());
        assert_eq!(file.sha1().unwrap(), mem.sha1().unwrap());
        assert_eq!(file.read_all().unwrap(), mem.read_all().unwrap());
        assert_eq!(file.local_path().unwrap(), path);
    }

    #[test]
    fn composition_reconstructs_in_contribution_order() {
        let composed = ComposedContent::new(
            parent(),
            vec![
                Contribution::Derived(b"AB".to_vec()),
                Contribution::ParentFragment {
                    offset: 10,
                    length: 4,
                },
                Contribution::Sparse { length: 3 },
            ],
            None,
        )
        .unwrap();
        assert_eq!(composed.size(), 9);
        let bytes = composed.read_all().unwrap();
        assert_eq!(&bytes[0..2], b"AB");
        assert_eq!(&bytes[2..6], &[10, 11, 12, 13]);
        assert_eq!(&bytes[6..9], &[0, 0, 0]);
    }

    #[test]
    fn composed_reads_span_segment_boundaries() {
        let composed = ComposedContent::new(
            parent(),
            vec![
                Contribution::Derived(b"xy".to_vec()),
                Contribution::ParentFragment { offset: 0, length: 2 },
                Contribution::Sparse { length: 2 },
            ],
            None,
        )
        .unwrap();
        let mut buf = [0xffu8; 6];
        let n = composed.read_at(1, &mut buf).unwrap();
        assert_eq!(n, 5);
        assert_eq!(&buf[..5], &[b'y', 0, 1, 0, 0]);
    }

    #[test]
    fn fragment_beyond_parent_is_rejected() {
        let err = ComposedContent::new(
            parent(),
            vec![Contribution::ParentFragment {
                offset: 30,
                length: 4,
            }],
            None,
        )
        .err()
        .unwrap();
        assert!(matches!(err, BridgeError::FragmentOutOfRange { .. }));
    }

    #[test]
    fn zero_contributions_describe_an_empty_node() {
        let composed = ComposedContent::new(parent(), Vec::new(), None).unwrap();
        assert_eq!(composed.size(), 0);
        assert_eq!(composed.sha1().unwrap(), EMPTY_SHA1);
    }

    #[test]
    fn spilled_local_path_holds_identical_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let composed = ComposedContent::new(
            parent(),
            vec![Contribution::ParentFragment { offset: 4, length: 8 }],
            Some(dir.path().to_path_buf()),
        )
        .unwrap();
        let path = composed.local_path().unwrap();
        let again = composed.local_path().unwrap();
        assert_eq!(path, again);
        assert_eq!(std::fs::read(&path).unwrap(), composed.read_all().unwrap());
    }
}
