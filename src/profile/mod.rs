//! Profiles: named binding tables selected by the focused window.
//!
//! - `schema`: in-memory [`ProfileStore`] and its JSON form
//! - `store`: the durable [`ProfileDocument`]
//! - `resolver`: window-match resolution

mod resolver;
mod schema;
mod store;

pub use resolver::{resolve, ProfileResolver};
pub use schema::{
    app_name_from_path, describe_binding, BindingTable, Profile, ProfileStore, DEFAULT_PROFILE,
};
pub use store::{LoadStatus, ProfileDocument, DEFAULT_DOCUMENT};
