//! # tacozip
//!
//! A streaming ZIP64 archive writer with a reserved "ghost" entry at byte
//! offset zero. The ghost carries up to seven `(offset, length)` pointer
//! pairs referencing external metadata regions (for example index footers
//! appended after the archive), and can be re-pointed in place without
//! rewriting anything else. The output is an ordinary ZIP64 archive that
//! any standards-conformant reader can open.
//!
//! ## Format in one paragraph
//!
//! Archives are always ZIP64 (version-needed 45) and STORE-only. Each file
//! is streamed in a single pass; CRC-32 and sizes accumulate during the
//! copy and land in a ZIP64 data descriptor after the data. The ghost is a
//! fixed 160-byte local file header whose extra field (id `0x7454`) holds a
//! count byte and seven little-endian `u64` pairs; unused slots are
//! `(0, 0)` and the count is the length of the valid slot prefix.
//!
//! ## Creating an archive
//!
//! ```no_run
//! use tacozip::{create_multi, MetaTable};
//!
//! # fn main() -> tacozip::Result<()> {
//! let table = MetaTable::single(0, 0); // filled in later via update_ghost
//! create_multi(
//!     "data.taco.zip",
//!     &[("/data/a.parquet", "a.parquet"), ("/data/b.parquet", "b.parquet")],
//!     &table,
//! )?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Pointing the ghost at appended metadata
//!
//! ```no_run
//! use tacozip::{read_ghost, update_ghost};
//!
//! # fn main() -> tacozip::Result<()> {
//! // After appending an index footer at byte 1_048_576, 4096 bytes long:
//! update_ghost("data.taco.zip", 1_048_576, 4096)?;
//! assert_eq!(read_ghost("data.taco.zip")?.offset, 1_048_576);
//! # Ok(())
//! # }
//! ```

mod codec;
pub mod error;
pub mod ghost;
pub mod reader;
pub mod writer;

pub use error::{Result, TacoError};
pub use ghost::{MetaEntry, MetaTable, MAX_META_ENTRIES};
pub use reader::{read_ghost, read_ghost_multi, update_ghost, update_ghost_multi};
pub use writer::{create, create_multi, TacoWriter};
