use serde::Serialize;
use utoipa::ToSchema;

use crate::guard::{GuardDecision, View};

#[derive(Debug, Serialize, ToSchema)]
pub struct ViewAccess {
    pub view: View,
    pub decision: GuardDecision,
    pub redirect_to: Option<String>,
}
