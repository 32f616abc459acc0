use serde_json::Value;
use uuid::Uuid;

use crate::{db::DbPool, error::AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    SignUp,
    SignIn,
    SignOut,
    Checkout,
    ProductCreate,
    ProductUpdate,
    ProductDelete,
    ReviewCreate,
    RolesUpdate,
    OrderStatusUpdate,
}

impl AuditAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            AuditAction::SignUp => "user_sign_up",
            AuditAction::SignIn => "user_sign_in",
            AuditAction::SignOut => "user_sign_out",
            AuditAction::Checkout => "checkout",
            AuditAction::ProductCreate => "product_create",
            AuditAction::ProductUpdate => "product_update",
            AuditAction::ProductDelete => "product_delete",
            AuditAction::ReviewCreate => "review_create",
            AuditAction::RolesUpdate => "roles_update",
            AuditAction::OrderStatusUpdate => "order_status_update",
        }
    }
}

pub async fn log_audit(
    pool: &DbPool,
    user_id: Option<Uuid>,
    action: AuditAction,
    resource: Option<&str>,
    metadata: Option<Value>,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO audit_logs (id, user_id, action, resource, metadata)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(action.as_str())
    .bind(resource)
    .bind(metadata)
    .execute(pool)
    .await?;

    Ok(())
}

/// Audit rows are best effort: a failed insert is logged, never surfaced.
pub async fn record(
    pool: &DbPool,
    user_id: Option<Uuid>,
    action: AuditAction,
    resource: &str,
    metadata: Value,
) {
    if let Err(err) = log_audit(pool, user_id, action, Some(resource), Some(metadata)).await {
        tracing::warn!(error = %err, action = action.as_str(), "audit log failed");
    }
}
