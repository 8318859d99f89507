//! Streaming ZIP64 archive creation.
//!
//! Archives are always ZIP64 (version-needed 45) and STORE-only. Every
//! entry is written as LFH → raw data → ZIP64 data descriptor, with sizes
//! and CRC streamed in a single pass. The central directory, ZIP64 EOCD,
//! ZIP64 locator and classic EOCD (with truncated maxima) are emitted at
//! finish. The ghost block always occupies byte 0 and is mirrored by an
//! ordinary central-directory entry.

use crate::codec::{put_u16, put_u32, put_u64};
use crate::error::{Result, TacoError};
use crate::ghost::{self, MetaTable, GHOST_LEN, GHOST_NAME};
use crc32fast::Hasher as Crc32;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

/// Size of the buffered sink attached to the output file.
pub const OUTPUT_BUFFER_SIZE: usize = 4 << 20;

/// Size of the reusable copy buffer used when streaming source files.
pub const COPY_BUFFER_SIZE: usize = 1 << 20;

const SIG_LFH: u32 = 0x04034B50;
const SIG_CDFH: u32 = 0x02014B50;
const SIG_EOCD: u32 = 0x06054B50;
const SIG_ZIP64_EOCD: u32 = 0x06064B50;
const SIG_ZIP64_LOCATOR: u32 = 0x07064B50;
const SIG_DATA_DESCRIPTOR: u32 = 0x08074B50;

const VERSION_NEEDED_ZIP64: u16 = 45;
const VERSION_MADE_BY: u16 = 0x031E; // host Unix (3), version 3.0
const METHOD_STORE: u16 = 0;
const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;
#[cfg(feature = "utf8-names")]
const FLAG_UTF8: u16 = 0x0800;

/// ZIP64 extra field: id + size + uncompressed + compressed + LFH offset.
const ZIP64_EXTRA_LEN: u16 = 2 + 2 + 8 + 8 + 8;

const MAX_NAME_LEN: usize = u16::MAX as usize;

/// General-purpose flags used for non-ghost entries.
fn entry_flags() -> u16 {
    #[cfg(feature = "utf8-names")]
    {
        FLAG_DATA_DESCRIPTOR | FLAG_UTF8
    }
    #[cfg(not(feature = "utf8-names"))]
    {
        FLAG_DATA_DESCRIPTOR
    }
}

/// Per-entry record kept in memory until central-directory emission.
struct EntryDescriptor {
    name: Vec<u8>,
    flags: u16,
    method: u16,
    crc32: u32,
    compressed_size: u64,
    uncompressed_size: u64,
    lfh_offset: u64,
}

/// Archive writing session.
///
/// Writes the ghost block at byte 0 on construction, streams source files
/// in the order they are added, and emits the central directory on
/// [`finish`](TacoWriter::finish). Dropping the writer without calling
/// `finish` leaves a partial archive on disk.
///
/// A session owns its file handle and buffers exclusively; it is not safe
/// to run two sessions against the same path concurrently.
///
/// # Examples
///
/// ```no_run
/// use tacozip::{MetaTable, TacoWriter};
///
/// # fn main() -> tacozip::Result<()> {
/// let mut writer = TacoWriter::new("out.zip", &MetaTable::single(4096, 512))?;
/// writer.add_file("/data/a.bin", "a.bin")?;
/// writer.add_file("/data/b.bin", "sub/b.bin")?;
/// writer.finish()?;
/// # Ok(())
/// # }
/// ```
pub struct TacoWriter {
    out: BufWriter<File>,
    /// Bytes emitted so far; doubles as the absolute offset of the next write.
    position: u64,
    entries: Vec<EntryDescriptor>,
    copy_buf: Vec<u8>,
}

impl TacoWriter {
    /// Create `path` (truncating any existing file) and write the ghost
    /// block for `table` at byte 0.
    ///
    /// Finishing without adding files produces a valid ghost-only archive.
    pub fn new<P: AsRef<Path>>(path: P, table: &MetaTable) -> Result<Self> {
        Self::from_file(File::create(path)?, table)
    }

    fn from_file(file: File, table: &MetaTable) -> Result<Self> {
        let mut writer = TacoWriter {
            out: BufWriter::with_capacity(OUTPUT_BUFFER_SIZE, file),
            position: 0,
            entries: Vec::new(),
            copy_buf: vec![0u8; COPY_BUFFER_SIZE],
        };
        writer.write_ghost(table)?;
        Ok(writer)
    }

    fn emit(&mut self, bytes: &[u8]) -> Result<()> {
        self.out.write_all(bytes)?;
        self.position += bytes.len() as u64;
        Ok(())
    }

    /// The ghost block plus its central-directory descriptor. The mirror
    /// keeps zero CRC and sizes so in-place payload patches stay byte-safe.
    fn write_ghost(&mut self, table: &MetaTable) -> Result<()> {
        debug_assert_eq!(self.position, 0);
        self.emit(&ghost::encode_ghost(table))?;
        self.entries.push(EntryDescriptor {
            name: GHOST_NAME.to_vec(),
            flags: 0,
            method: METHOD_STORE,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            lfh_offset: 0,
        });
        Ok(())
    }

    /// Append one source file: LFH, name, streamed data, ZIP64 data
    /// descriptor. The archive name is written verbatim (no normalization)
    /// and must fit the 16-bit ZIP name-length field.
    pub fn add_file<P: AsRef<Path>, S: AsRef<str>>(&mut self, src_path: P, arc_name: S) -> Result<()> {
        let name = arc_name.as_ref().as_bytes();
        if name.len() > MAX_NAME_LEN {
            return Err(TacoError::InvalidParam(format!(
                "archive name is {} bytes; the ZIP name field is limited to {}",
                name.len(),
                MAX_NAME_LEN
            )));
        }

        let mut input = File::open(src_path)?;
        let lfh_offset = self.position;
        let flags = entry_flags();

        // Sizes and CRC are unknown up front; bit 3 defers them to the data
        // descriptor, and 0xFFFFFFFF marks the 32-bit fields as ZIP64.
        let mut lfh = [0u8; 30];
        put_u32(&mut lfh, 0, SIG_LFH);
        put_u16(&mut lfh, 4, VERSION_NEEDED_ZIP64);
        put_u16(&mut lfh, 6, flags);
        put_u16(&mut lfh, 8, METHOD_STORE);
        put_u32(&mut lfh, 18, u32::MAX);
        put_u32(&mut lfh, 22, u32::MAX);
        put_u16(&mut lfh, 26, name.len() as u16);
        self.emit(&lfh)?;
        self.emit(name)?;

        // Single pass: CRC and byte count accumulate while copying.
        let mut hasher = Crc32::new();
        let mut size: u64 = 0;
        loop {
            let n = input.read(&mut self.copy_buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&self.copy_buf[..n]);
            self.out.write_all(&self.copy_buf[..n])?;
            self.position += n as u64;
            size += n as u64;
        }
        let crc32 = hasher.finalize();

        // ZIP64 data descriptor; compressed equals uncompressed under STORE.
        let mut dd = [0u8; 24];
        put_u32(&mut dd, 0, SIG_DATA_DESCRIPTOR);
        put_u32(&mut dd, 4, crc32);
        put_u64(&mut dd, 8, size);
        put_u64(&mut dd, 16, size);
        self.emit(&dd)?;

        self.entries.push(EntryDescriptor {
            name: name.to_vec(),
            flags,
            method: METHOD_STORE,
            crc32,
            compressed_size: size,
            uncompressed_size: size,
            lfh_offset,
        });
        Ok(())
    }

    /// Emit the central directory and terminator records, then flush and
    /// close the archive.
    pub fn finish(mut self) -> Result<()> {
        self.write_central_directory()?;
        // into_inner flushes the sink into the file before handing it back;
        // the file handle closes when it drops here.
        self.out
            .into_inner()
            .map_err(|e| TacoError::Io(e.into_error()))?;
        Ok(())
    }

    fn write_central_directory(&mut self) -> Result<()> {
        let cd_start = self.position;
        let entries = std::mem::take(&mut self.entries);

        // One contiguous block per entry: CDFH, name, ZIP64 extra.
        for entry in &entries {
            let mut cdfh = [0u8; 46];
            put_u32(&mut cdfh, 0, SIG_CDFH);
            put_u16(&mut cdfh, 4, VERSION_MADE_BY);
            put_u16(&mut cdfh, 6, VERSION_NEEDED_ZIP64);
            put_u16(&mut cdfh, 8, entry.flags);
            put_u16(&mut cdfh, 10, entry.method);
            put_u32(&mut cdfh, 16, entry.crc32);
            put_u32(&mut cdfh, 20, u32::MAX); // sizes and offset live in the
            put_u32(&mut cdfh, 24, u32::MAX); // ZIP64 extra field
            put_u16(&mut cdfh, 28, entry.name.len() as u16);
            put_u16(&mut cdfh, 30, ZIP64_EXTRA_LEN);
            put_u32(&mut cdfh, 42, u32::MAX);
            self.out.write_all(&cdfh)?;
            self.out.write_all(&entry.name)?;

            let mut extra = [0u8; ZIP64_EXTRA_LEN as usize];
            put_u16(&mut extra, 0, 0x0001);
            put_u16(&mut extra, 2, 24);
            put_u64(&mut extra, 4, entry.uncompressed_size);
            put_u64(&mut extra, 12, entry.compressed_size);
            put_u64(&mut extra, 20, entry.lfh_offset);
            self.out.write_all(&extra)?;

            self.position += 46 + entry.name.len() as u64 + ZIP64_EXTRA_LEN as u64;
        }

        let cd_end = self.position;
        let cd_size = cd_end - cd_start;
        let total_entries = entries.len() as u64;

        // ZIP64 EOCD: fixed 44-byte body.
        let mut z64 = [0u8; 56];
        put_u32(&mut z64, 0, SIG_ZIP64_EOCD);
        put_u64(&mut z64, 4, 44);
        put_u16(&mut z64, 12, VERSION_MADE_BY);
        put_u16(&mut z64, 14, VERSION_NEEDED_ZIP64);
        put_u64(&mut z64, 24, total_entries);
        put_u64(&mut z64, 32, total_entries);
        put_u64(&mut z64, 40, cd_size);
        put_u64(&mut z64, 48, cd_start);
        self.emit(&z64)?;

        // Locator points at the ZIP64 EOCD we just wrote; one disk total.
        let mut locator = [0u8; 20];
        put_u32(&mut locator, 0, SIG_ZIP64_LOCATOR);
        put_u64(&mut locator, 8, cd_end);
        put_u32(&mut locator, 16, 1);
        self.emit(&locator)?;

        // Classic EOCD always carries the sentinel maxima, even when the
        // true values would fit.
        let mut eocd = [0u8; 22];
        put_u32(&mut eocd, 0, SIG_EOCD);
        put_u16(&mut eocd, 8, 0xFFFF);
        put_u16(&mut eocd, 10, 0xFFFF);
        put_u32(&mut eocd, 12, u32::MAX);
        put_u32(&mut eocd, 16, u32::MAX);
        self.emit(&eocd)?;

        Ok(())
    }
}

/// Create an archive from `(source path, archive name)` pairs with up to
/// seven metadata pointers in the ghost.
///
/// The file list must not be empty; ghost-only archives go through
/// [`TacoWriter`] explicitly. Validation happens before the output path is
/// created or truncated. On a streaming failure the partial output file is
/// left on disk and the caller owns cleanup.
///
/// # Examples
///
/// ```no_run
/// use tacozip::{create_multi, MetaTable};
///
/// # fn main() -> tacozip::Result<()> {
/// let table = MetaTable::from_arrays(
///     &[4096, 9000, 0, 0, 0, 0, 0],
///     &[512, 128, 0, 0, 0, 0, 0],
/// );
/// create_multi(
///     "out.zip",
///     &[("/data/a.parquet", "a.parquet"), ("/data/b.parquet", "b.parquet")],
///     &table,
/// )?;
/// # Ok(())
/// # }
/// ```
pub fn create_multi<P, S, N>(zip_path: P, files: &[(S, N)], table: &MetaTable) -> Result<()>
where
    P: AsRef<Path>,
    S: AsRef<Path>,
    N: AsRef<str>,
{
    if files.is_empty() {
        return Err(TacoError::InvalidParam(
            "at least one source file is required".into(),
        ));
    }

    let file = File::create(zip_path)?;
    preallocate(&file, estimate_archive_size(files));

    let mut writer = TacoWriter::from_file(file, table)?;
    for (src_path, arc_name) in files {
        writer.add_file(src_path, arc_name)?;
    }
    writer.finish()
}

/// Shorthand for [`create_multi`] with a single metadata pointer in slot 0.
pub fn create<P, S, N>(zip_path: P, files: &[(S, N)], meta_offset: u64, meta_length: u64) -> Result<()>
where
    P: AsRef<Path>,
    S: AsRef<Path>,
    N: AsRef<str>,
{
    create_multi(zip_path, files, &MetaTable::single(meta_offset, meta_length))
}

/// Exact final archive size for the given sources, assuming their on-disk
/// sizes do not change before they are streamed.
fn estimate_archive_size<S: AsRef<Path>, N: AsRef<str>>(files: &[(S, N)]) -> u64 {
    let mut sum = GHOST_LEN as u64;
    for (src_path, arc_name) in files {
        let data_len = std::fs::metadata(src_path)
            .ok()
            .filter(|m| m.is_file())
            .map(|m| m.len())
            .unwrap_or(0);
        let name_len = arc_name.as_ref().len().min(MAX_NAME_LEN) as u64;
        sum += 30 + name_len + data_len + 24; // LFH + name + data + descriptor
        sum += 46 + name_len + ZIP64_EXTRA_LEN as u64; // CDFH block
    }
    // Ghost CDFH block, then ZIP64 EOCD + locator + classic EOCD.
    sum += 46 + GHOST_NAME.len() as u64 + ZIP64_EXTRA_LEN as u64;
    sum + 56 + 20 + 22
}

/// Ask the filesystem to reserve the estimated final size. Advisory only;
/// failures are ignored.
#[cfg(target_os = "linux")]
fn preallocate(file: &File, len: u64) {
    use std::os::unix::io::AsRawFd;
    unsafe {
        let _ = libc::posix_fallocate(file.as_raw_fd(), 0, len as libc::off_t);
    }
}

#[cfg(not(target_os = "linux"))]
fn preallocate(_file: &File, _len: u64) {}
