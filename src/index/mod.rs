//! Secondary Indexes
//!
//! [`IndexWriter`] maintains index memberships as records are written,
//! updated, deleted or expire. [`IndexReader`] answers lookups against them.

pub mod reader;
pub mod writer;

pub use reader::IndexReader;
pub use writer::IndexWriter;
