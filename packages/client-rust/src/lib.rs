//! `slquery` client: paginated record queries over HTTP, lookup caches and
//! per-domain query handlers.

pub mod batch;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod handler;
pub mod http;

pub use batch::{query_in_batches, query_until_complete, query_using_skip, RequestPacer};
pub use cache::{LookupCache, LookupWarning, PartNumberCache, Product, Workspace, WorkspaceCache};
pub use config::ClientConfig;
pub use domain::{Domain, DomainDescriptor, PaginationStyle};
pub use error::QueryError;
pub use handler::{
    AlertSink, QueryHandler, RecordQuery, RecordQueryHandler, Table, TracingAlertSink,
};
pub use http::{HttpClient, ReqwestHttpClient};
