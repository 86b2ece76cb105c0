//! EBF content file, secondary indices and the chunking engine
//!
//! `entitydb-storage` owns everything that lives on disk besides the WAL:
//! the append-only entity binary file ([`ebf`]), the in-memory secondary
//! indices that make lookups by id/tag/prefix O(1)-ish ([`index`]), and the
//! chunking engine that splits oversized content across child entities
//! ([`chunking`]). [`recovery`] layers the integrity checks and repair
//! operations from spec §4.8 on top of the EBF.

#![warn(missing_docs)]

pub mod chunking;
pub mod ebf;
pub mod index;
pub mod recovery;

pub use ebf::{EbfFile, EbfRecord};
pub use index::Indices;
