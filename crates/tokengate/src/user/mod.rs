//! User records and the stores that hold them.

mod models;
mod store;

pub use models::{UserProfile, UserRecord};
pub use store::{FileUserStore, MemoryUserStore, StoreError, UserStore, UsersFile};
