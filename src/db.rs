//! SeaORM implementation of [`NoteStore`](crate::NoteStore).
pub mod driver;
pub mod entity;
pub mod migrations;
pub mod store;

#[doc(inline)]
pub use store::DbStore;

pub mod prelude {
    pub use super::driver::DatabaseDriver;
    pub use super::entity::*;
    pub use super::store::DbStore;
}
