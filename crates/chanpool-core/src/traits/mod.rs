//! Collaborator trait definitions

mod channels;
mod factory;

pub use channels::{ChannelCountSource, FixedChannelCount};
pub use factory::HandleFactory;
