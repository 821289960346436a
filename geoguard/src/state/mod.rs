pub mod history;

pub use history::{HistoryStore, InMemoryHistoryStore, LocationHistory, SharedHistory};
