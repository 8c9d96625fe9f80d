pub mod obsidian;
pub mod store;
pub mod tags;

pub use obsidian::{ObsidianVault, Vault, VaultError, select_daily_notes, slugify};
pub use store::{FileKnowledgeStore, InMemoryKnowledgeStore, KnowledgeStore, StoreError};
pub use tags::extract_tags;
