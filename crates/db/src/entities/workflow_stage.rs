//! Workflow stage entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Workflow stages, in execution order.
///
/// Stored as its `SCREAMING_SNAKE_CASE` name in the `stage` key column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    /// Questions generated, validated and persisted.
    QuestionsGenerated,
    /// Invitations created and dispatched.
    InvitationsSent,
    /// Enough invitations redeemed to score.
    AwaitingCompletion,
    /// Completed attempts scored and ranked.
    Scored,
    /// Top-ranked students notified.
    Notified,
}

impl Stage {
    /// Every stage, in order.
    pub const ALL: [Self; 5] = [
        Self::QuestionsGenerated,
        Self::InvitationsSent,
        Self::AwaitingCompletion,
        Self::Scored,
        Self::Notified,
    ];

    /// Position in [`Stage::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::QuestionsGenerated => 0,
            Self::InvitationsSent => 1,
            Self::AwaitingCompletion => 2,
            Self::Scored => 3,
            Self::Notified => 4,
        }
    }

    /// Stored name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::QuestionsGenerated => "QUESTIONS_GENERATED",
            Self::InvitationsSent => "INVITATIONS_SENT",
            Self::AwaitingCompletion => "AWAITING_COMPLETION",
            Self::Scored => "SCORED",
            Self::Notified => "NOTIFIED",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = DbErr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| DbErr::Type(format!("unknown workflow stage: {s}")))
    }
}

/// Status of a stage.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, Default,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    #[sea_orm(string_value = "pending")]
    #[default]
    Pending,
    #[sea_orm(string_value = "done")]
    Done,
    #[sea_orm(string_value = "failed")]
    Failed,
}

/// One row per (quiz, stage).
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "workflow_stage")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub quiz_id: String,

    /// [`Stage`] name.
    #[sea_orm(primary_key, auto_increment = false)]
    pub stage: String,

    pub status: StageStatus,

    /// Failure reason, or a note for a pending stage.
    #[sea_orm(column_type = "Text", nullable)]
    pub error: Option<String>,

    #[sea_orm(nullable)]
    pub completed_at: Option<DateTimeWithTimeZone>,

    pub updated_at: DateTimeWithTimeZone,
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
}

impl Related<super::quiz::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Quiz.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
