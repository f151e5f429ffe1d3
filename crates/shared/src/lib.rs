//! Data model and collaborator contracts shared across the Threadline
//! workspace.

pub mod capabilities;
pub mod message;
pub mod notice;
pub mod store;
pub mod stream;
pub mod transport;
