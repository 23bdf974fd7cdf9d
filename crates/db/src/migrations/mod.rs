//! Database migrations.
//!
//! Schema migrations for the database.

#![allow(missing_docs)]

use sea_orm_migration::prelude::*;

mod m20250101_000001_create_quiz_tables;
mod m20250101_000002_create_invitation_table;
mod m20250101_000003_create_workflow_stage_table;
mod m20250101_000004_create_result_tables;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250101_000001_create_quiz_tables::Migration),
            Box::new(m20250101_000002_create_invitation_table::Migration),
            Box::new(m20250101_000003_create_workflow_stage_table::Migration),
            Box::new(m20250101_000004_create_result_tables::Migration),
        ]
    }
}
