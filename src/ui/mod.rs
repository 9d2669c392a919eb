//! Terminal presentation of a chat session.
//!
//! - [`view`] projects history entries into numbered message views with the
//!   actions each one offers.
//! - [`terminal`] prints those views and follows [`crate::core::session::SessionEvent`]s
//!   while a turn streams.

pub mod terminal;
pub mod view;
