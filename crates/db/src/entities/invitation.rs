//! Invitation entity.
//!
//! At most one row per `(quiz_id, student_id)` may be active (unused and not
//! superseded); a partial unique index enforces it.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "invitation")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    #[sea_orm(indexed)]
    pub quiz_id: String,

    #[sea_orm(indexed)]
    pub student_id: String,

    /// Bearer token, unique.
    #[sea_orm(unique)]
    pub token: String,

    /// Frozen quiz metadata, written once.
    #[sea_orm(column_type = "JsonBinary")]
    pub quiz_snapshot: Json,

    /// Frozen question list, written once.
    #[sea_orm(column_type = "JsonBinary")]
    pub questions_snapshot: Json,

    pub is_used: bool,

    #[sea_orm(nullable)]
    pub used_at: Option<DateTimeWithTimeZone>,

    #[sea_orm(nullable)]
    pub sent_at: Option<DateTimeWithTimeZone>,

    #[sea_orm(nullable)]
    pub superseded_at: Option<DateTimeWithTimeZone>,

    /// Id of the invitation that replaced this one.
    #[sea_orm(nullable)]
    pub superseded_by: Option<String>,

    /// Last terminal dispatch failure.
    #[sea_orm(column_type = "Text", nullable)]
    pub last_error: Option<String>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::quiz::Entity",
        from = "Column::QuizId",
        to = "super::quiz::Column::Id",
        on_delete = "Cascade"
    )]
    Quiz,
    #[sea_orm(
        belongs_to = "super::student::Entity",
        from = "Column::StudentId",
        to = "super::student::Column::Id",
        on_delete = "Cascade"
    )]
    Student,
}

impl Related<super::quiz::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Quiz.def()
    }
}

impl Related<super::student::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Student.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
