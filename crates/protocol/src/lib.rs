//! Wire protocol for talking to a native messaging host.
//!
//! Messages are flat JSON objects framed with a 4-byte native-endian
//! length prefix, the format browsers use for native messaging.

pub mod codec;
pub mod constants;
pub mod envelope;
pub mod messages;

// Re-export primary types for convenience.
pub use codec::{CodecError, DecodedFrame, NativeMessageCodec};
pub use constants::MessageType;
pub use envelope::Message;
pub use messages::{HealthCheckResponse, PongResponse, ProgressEvent};
