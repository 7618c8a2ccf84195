pub mod index_updater;
pub mod inverted_index;
pub mod normalizer;
pub mod ranking;
pub mod search_engine;
pub mod update_engine;
