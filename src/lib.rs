pub use skinhub_core::*;

#[cfg(feature = "server")]
pub mod server {
    pub use skinhub_server::*;
}

#[cfg(feature = "client")]
pub mod client {
    pub use skinhub_client::*;
}

#[cfg(feature = "fs")]
pub mod fs {
    pub use skinhub_fs::*;
}

#[cfg(feature = "memory")]
pub mod memory {
    pub use skinhub_memory::*;
}

#[cfg(feature = "github")]
pub mod github {
    pub use skinhub_github::*;
}

pub mod prelude {
    pub use skinhub_core::prelude::*;

    #[cfg(feature = "server")]
    pub use skinhub_server::prelude::*;

    #[cfg(feature = "client")]
    pub use skinhub_client::SkinhubClient;

    #[cfg(feature = "fs")]
    pub use skinhub_fs::FileSystemStorage;

    #[cfg(feature = "memory")]
    pub use skinhub_memory::MemoryStorage;

    #[cfg(feature = "github")]
    pub use skinhub_github::{GithubConfig, GithubStorage};
}
