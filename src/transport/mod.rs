/// Filesystem walking for directory corpora.
pub mod fs;
