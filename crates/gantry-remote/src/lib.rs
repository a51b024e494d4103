//! Client abstraction over the hosted gateway-configuration API
//!
//! The engine depends only on [`RemoteApi`]: create, upsert by id, delete
//! by id, list by tag and get by id, for every [`EntityKind`], plus
//! consumer group membership. Failures are classified by [`RemoteError`].

#![deny(missing_docs)]

mod client;
mod error;
mod http;
pub mod kind;
mod memory;
mod scope;

pub use client::{
    HttpClientFactory, RemoteApi, RemoteAuth, RemoteClientFactory, StaticClientFactory,
};
#[cfg(any(test, feature = "mock"))]
pub use client::MockRemoteApi;
pub use error::{ErrorClass, RemoteError};
pub use http::HttpRemote;
pub use kind::{EntityKind, TagStyle};
pub use memory::{InMemoryRemote, RecordedCall, RemoteOp};
pub use scope::RemoteScope;
