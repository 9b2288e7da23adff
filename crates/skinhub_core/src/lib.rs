pub mod asset;
pub mod error;
pub mod player;
pub mod registry;
pub mod traits;
pub mod validate;

pub mod prelude {
    pub use super::asset::*;
    pub use super::error::*;
    pub use super::player::*;
    pub use super::registry::*;
    pub use super::traits::*;
}
