mod entries;
mod feeds;
mod schema;
mod settings;
mod types;

pub use schema::Database;
pub use types::{
    DatabaseError, Entry, EntryCounts, Feed, NewEntry, PublishFailure, Validators,
};
