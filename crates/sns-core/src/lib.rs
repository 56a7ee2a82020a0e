//! In-memory registry, timeline fan-out, and persistence for the
//! social-network service, independent of the gRPC transport.

mod persistence;
mod registry;
mod user;

pub use persistence::Persistence;
pub use registry::{SnsError, UserRegistry};
pub use user::{Post, User, MAX_RECENT_POSTS};
