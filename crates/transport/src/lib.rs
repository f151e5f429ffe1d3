//! Chat transport implementations and stream plumbing: the in-process
//! reference transport, the wire-frame decoder, and the reasoning event
//! fan-out.

pub mod decoder;
pub mod local;
pub mod source;
