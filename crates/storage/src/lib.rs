#![forbid(unsafe_code)]

pub mod codec;
pub mod fs;
pub mod index;
pub mod repository;

/// Name of the cache index, both locally and on the remote host.
pub const INDEX_FILE: &str = "meta.txt";

/// Name of the saved quiz progress file.
pub const STATES_FILE: &str = "states.dat";
