pub mod blocklist_store;

pub use blocklist_store::{BlocklistStore, JsonFileStore, MemoryStore};
