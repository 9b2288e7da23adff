mod api;

pub mod auth;
pub mod server;
pub mod state;

pub use api::{ApiError, ApiResponse, AssetPayload, StatsResponse};
pub use server::{SkinhubServer, SkinhubServerConfig};

pub mod prelude {
    pub use crate::auth::*;
    pub use crate::server::*;
    pub use crate::state::*;
}
