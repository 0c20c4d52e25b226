pub mod note;
pub mod user;

pub use note::Entity as Notes;
pub use user::Entity as Users;
