use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "screenshots")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub job_id: Uuid,
    pub screenshot_id: String,
    pub ocr1_hand_id: Option<String>,
    pub ocr1_retry_count: i32,
    pub ocr1_error: Option<String>,
    #[sea_orm(column_type = "Json", nullable)]
    pub ocr2: Option<Json>,
    pub ocr2_error: Option<String>,
    pub matched_hand_id: Option<String>,
    pub match_source: Option<String>,
    #[sea_orm(column_type = "Double", nullable)]
    pub match_score: Option<f64>,
    pub discard_reason: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
