use serde::Serialize;
use utoipa::ToSchema;

/// Paging details; all fields are `null` on unpaged responses.
#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
pub struct Meta {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub total: Option<i64>,
    pub total_pages: Option<i64>,
}

impl Meta {
    pub fn new(page: i64, per_page: i64, total: i64) -> Self {
        let total_pages = if per_page > 0 {
            (total + per_page - 1) / per_page
        } else {
            0
        };
        Self {
            page: Some(page),
            per_page: Some(per_page),
            total: Some(total),
            total_pages: Some(total_pages),
        }
    }

    pub fn empty() -> Self {
        Self {
            page: None,
            per_page: None,
            total: None,
            total_pages: None,
        }
    }
}

/// Envelope shared by every JSON response, errors included.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub message: String,
    pub data: Option<T>,
    pub meta: Option<Meta>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(message: impl Into<String>, data: T, meta: Option<Meta>) -> Self {
        Self {
            message: message.into(),
            data: Some(data),
            meta,
        }
    }

    /// Error body; `data` carries the error details.
    pub fn error(message: impl Into<String>, details: T) -> Self {
        Self {
            message: message.into(),
            data: Some(details),
            meta: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(Meta::new(1, 20, 41).total_pages, Some(3));
        assert_eq!(Meta::new(1, 20, 40).total_pages, Some(2));
        assert_eq!(Meta::new(1, 20, 0).total_pages, Some(0));
    }

    #[test]
    fn error_envelope_has_no_meta() {
        let body = ApiResponse::error("Forbidden", serde_json::json!({ "error": "Forbidden" }));
        let json = serde_json::to_value(&body).expect("serialize");
        assert_eq!(json["meta"], serde_json::Value::Null);
        assert_eq!(json["data"]["error"], "Forbidden");
    }
}
