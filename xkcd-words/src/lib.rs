pub mod stemmer;
pub mod words;

// Re-export the normalization entry points for external use
pub use stemmer::stem;
pub use words::{STOP_WORDS, is_stop_word, normalize, tokenize};
