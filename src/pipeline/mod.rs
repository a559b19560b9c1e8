//! Load pipeline: directory listing/filtering shared by the warm and cold
//! paths, and the load state machine itself.

pub mod listing;
pub mod loader;

pub use listing::{Listing, list_dir};
pub use loader::{LoadContext, load};
