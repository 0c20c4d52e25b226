pub mod note;
pub mod user;

use sea_orm_migration::prelude::*;

pub struct Migrator;

impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(user::Migration), Box::new(note::Migration)]
    }
}
