mod dictionary;
mod version;

pub use dictionary::{Dictionary, DictionaryError, Entry};
pub use version::Version;
