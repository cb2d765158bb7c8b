pub mod aggregate;
pub mod catalog;
pub mod chat;
pub mod client;
pub mod convert;
pub mod decode;
pub mod emit;
pub mod error;
pub mod pool;
pub mod stream;
pub mod turn;

pub use chat::{handle_non_stream, handle_stream};
pub use client::{SmitheryClient, UpstreamClient};
pub use error::{ChatError, TransportError};
pub use pool::{CredentialPool, PoolEmpty, PoolSnapshot};
pub use stream::StreamTuning;
