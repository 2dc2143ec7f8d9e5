//! The live location pipeline: fix source → ordered queue → publisher.

mod publisher;
mod session;
mod source;

pub use publisher::LocationPublisher;
pub use session::SessionManager;
pub use source::{
    ChannelPositionSource, FixHandler, PositionSource, SourceError, SourceErrorHandler,
    WatchOptions,
};
