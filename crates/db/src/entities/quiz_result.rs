//! Quiz result entity: scored and ranked attempts.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "quiz_result")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    #[sea_orm(indexed)]
    pub quiz_id: String,

    pub student_id: String,

    #[sea_orm(unique)]
    pub invitation_id: String,

    pub correct: i32,

    pub total: i32,

    #[sea_orm(column_type = "Double")]
    pub percentage: f64,

    /// 1-based rank within the quiz.
    pub rank: i32,

    pub completed_at: DateTimeWithTimeZone,

    /// Set once the qualification email is delivered.
    #[sea_orm(nullable)]
    pub notified_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
