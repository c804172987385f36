pub mod common;

mod token_lifecycle;
mod tracker_store;
