//! Index persistence
//!
//! An index is persisted as two files:
//!
//! - `<path>`: an [`IndexFileHeader`] plus the method's serialized structure
//! - `<path>.dat`: the raw point dump, written only when data is included
//!
//! See [`file`] for the byte layout.

pub mod file;

pub use file::{
    data_path, load_index_file, load_points, save_index_file, save_points, IndexFileHeader,
};
