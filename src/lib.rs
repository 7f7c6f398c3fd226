//! Entity CRUD over an in-process request bus with pooled SQL execution.
//!
//! Each entity registers five operations (get-all, search, add, update,
//! delete) on the [`bus::RequestBus`]; the REST surface in [`routes`]
//! forwards to those addresses and renders replies as pretty JSON.

pub mod bus;
pub mod dispatch;
pub mod entity;
pub mod error;
pub mod handlers;
pub mod operation;
pub mod provider;
pub mod record;
pub mod response;
pub mod routes;
pub mod state;

pub use bus::{BusFailure, Reply, RequestBus};
pub use dispatch::register_entity;
pub use entity::{EntityHandler, EntityInfo, QuerySet};
pub use error::{HandlerError, ProviderError};
pub use operation::Operation;
pub use provider::{ConnectionProvider, ExecResult, MySqlProvider, SqlConnection, SqliteProvider};
pub use record::{Params, Record};
pub use routes::{api_routes, common_routes};
pub use state::ApiState;
