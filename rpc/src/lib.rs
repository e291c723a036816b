//! Node client for the Coda chain mirror.
//!
//! The indexer talks to a single upstream daemon through the [`NodeClient`]
//! trait. [`GraphQlClient`] is the production implementation: GraphQL
//! queries over HTTP POST and a `graphql-ws` WebSocket subscription for new
//! block notifications. Node-specific response shapes never leave this crate;
//! everything is converted to `coda-types` at the boundary.

pub mod client;
pub mod error;
pub mod graphql;
mod queries;
mod response;
pub mod subscription;

pub use client::{ClientConfig, NodeClient};
pub use error::ClientError;
pub use graphql::GraphQlClient;
