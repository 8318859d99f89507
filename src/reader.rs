//! Reading and patching the ghost of an existing archive.
//!
//! Only bytes 0..160 are trusted: the ghost is validated and decoded
//! without parsing the central directory or the rest of the archive. The
//! patch path rewrites the payload window in place; no CRC covers those
//! bytes, so appending external metadata and re-pointing the ghost at it is
//! byte-safe on a live archive.

use crate::codec::put_u64;
use crate::error::Result;
use crate::ghost::{
    self, MetaEntry, MetaTable, GHOST_COUNT_OFFSET, GHOST_LEN, GHOST_PAIRS_OFFSET,
    MAX_META_ENTRIES,
};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

fn read_ghost_block(file: &mut File) -> Result<[u8; GHOST_LEN]> {
    let mut block = [0u8; GHOST_LEN];
    file.read_exact(&mut block)?;
    Ok(block)
}

/// Decode the ghost's full metadata table.
///
/// The count byte and all seven pairs are returned verbatim; slots past the
/// valid prefix are visible to callers that want to inspect them.
pub fn read_ghost_multi<P: AsRef<Path>>(zip_path: P) -> Result<MetaTable> {
    let mut file = File::open(zip_path)?;
    let block = read_ghost_block(&mut file)?;
    ghost::decode_ghost(&block)
}

/// Read the first metadata pointer, or `(0, 0)` when the table is empty.
pub fn read_ghost<P: AsRef<Path>>(zip_path: P) -> Result<MetaEntry> {
    let table = read_ghost_multi(zip_path)?;
    if table.count() > 0 {
        Ok(table.entries()[0])
    } else {
        Ok(MetaEntry::default())
    }
}

/// Rewrite the ghost payload in place with `table`'s slots, recomputing the
/// count byte from them.
///
/// The existing ghost is validated before anything is written, so a
/// malformed archive is left untouched. The patch never touches any byte at
/// offset 160 or beyond. It is not atomic: an I/O failure between the count
/// write and the pair writes leaves the payload mixed.
pub fn update_ghost_multi<P: AsRef<Path>>(zip_path: P, table: &MetaTable) -> Result<()> {
    let mut file = OpenOptions::new().read(true).write(true).open(zip_path)?;
    let block = read_ghost_block(&mut file)?;
    ghost::validate_ghost(&block)?;

    let count = ghost::count_valid_entries(table.entries());
    file.seek(SeekFrom::Start(GHOST_COUNT_OFFSET))?;
    file.write_all(&[count])?;

    let mut pairs = [0u8; MAX_META_ENTRIES * 16];
    for (i, entry) in table.entries().iter().enumerate() {
        put_u64(&mut pairs, i * 16, entry.offset);
        put_u64(&mut pairs, i * 16 + 8, entry.length);
    }
    file.seek(SeekFrom::Start(GHOST_PAIRS_OFFSET))?;
    file.write_all(&pairs)?;
    file.flush()?;
    Ok(())
}

/// Replace the first metadata pointer, preserving slots 1..7, and recompute
/// the count.
pub fn update_ghost<P: AsRef<Path>>(zip_path: P, new_offset: u64, new_length: u64) -> Result<()> {
    let path = zip_path.as_ref();
    let current = read_ghost_multi(path)?;

    let mut entries = *current.entries();
    entries[0] = MetaEntry::new(new_offset, new_length);
    update_ghost_multi(path, &MetaTable::new(entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::TacoWriter;
    use tempfile::TempDir;

    fn ghost_only_archive(dir: &TempDir, table: &MetaTable) -> std::path::PathBuf {
        let path = dir.path().join("out.zip");
        TacoWriter::new(&path, table).unwrap().finish().unwrap();
        path
    }

    #[test]
    fn read_returns_first_entry() {
        let dir = TempDir::new().unwrap();
        let path = ghost_only_archive(&dir, &MetaTable::single(123, 456));

        assert_eq!(read_ghost(&path).unwrap(), MetaEntry::new(123, 456));
    }

    #[test]
    fn read_of_empty_table_is_zero_pair() {
        let dir = TempDir::new().unwrap();
        let path = ghost_only_archive(&dir, &MetaTable::default());

        let table = read_ghost_multi(&path).unwrap();
        assert_eq!(table.count(), 0);
        assert_eq!(read_ghost(&path).unwrap(), MetaEntry::default());
    }

    #[test]
    fn update_single_preserves_other_slots() {
        let dir = TempDir::new().unwrap();
        let table = MetaTable::from_arrays(&[100, 200, 0, 0, 0, 0, 0], &[10, 20, 0, 0, 0, 0, 0]);
        let path = ghost_only_archive(&dir, &table);

        update_ghost(&path, 999, 111).unwrap();

        let after = read_ghost_multi(&path).unwrap();
        assert_eq!(after.count(), 2);
        assert_eq!(after.entries()[0], MetaEntry::new(999, 111));
        assert_eq!(after.entries()[1], MetaEntry::new(200, 20));
    }

    #[test]
    fn update_to_zero_shrinks_count() {
        let dir = TempDir::new().unwrap();
        let table = MetaTable::single(100, 10);
        let path = ghost_only_archive(&dir, &table);

        update_ghost(&path, 0, 0).unwrap();
        assert_eq!(read_ghost_multi(&path).unwrap().count(), 0);
    }

    #[test]
    fn corrupt_ghost_is_rejected_and_unmodified() {
        let dir = TempDir::new().unwrap();
        let path = ghost_only_archive(&dir, &MetaTable::single(1, 2));

        let mut bytes = std::fs::read(&path).unwrap();
        bytes[40] = 0x55; // wrong extra id
        std::fs::write(&path, &bytes).unwrap();

        assert_eq!(read_ghost_multi(&path).unwrap_err().code(), -3);
        assert_eq!(
            update_ghost_multi(&path, &MetaTable::default()).unwrap_err().code(),
            -3
        );
        assert_eq!(std::fs::read(&path).unwrap(), bytes);
    }

    #[test]
    fn truncated_file_is_an_io_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("short.zip");
        std::fs::write(&path, b"PK\x03\x04 too short").unwrap();

        assert_eq!(read_ghost_multi(&path).unwrap_err().code(), -1);
    }
}
