// # Mapping Store Implementations
//
// This module provides implementations of the MappingStore trait for
// different persistence strategies. Both share the reference-counting
// table in `table`.

pub mod file;
pub mod memory;
mod table;

pub use file::{FileMappingStore, FileMappingStoreFactory};
pub use memory::{MemoryMappingStore, MemoryMappingStoreFactory};
