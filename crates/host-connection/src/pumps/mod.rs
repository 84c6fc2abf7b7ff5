//! Background tasks moving messages between a host process and a channel.

pub(crate) mod read;
pub(crate) mod stderr;
pub(crate) mod write;
