pub mod api;
pub mod error;
pub mod ident;
pub mod ids;
pub mod index;

pub use api::*;
pub use error::{StoreError, StoreResult};
pub use ident::Ident;
pub use ids::ObjectId;
pub use index::*;
