use serde::{Deserialize, Serialize};

/// Body of the `/health` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

/// Liveness check shared by every Nadym server.
#[derive(Clone, Debug, Default)]
pub struct HealthService;

impl HealthService {
    pub fn new() -> Self {
        Self
    }

    /// Static method to check health without creating an instance.
    pub fn check_health() -> HealthRes {
        HealthRes {
            ok: true,
            message: "Nadym is alive".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_serializes_as_ok_and_message() {
        let json = serde_json::to_value(HealthService::check_health()).unwrap();
        assert_eq!(json, serde_json::json!({"ok": true, "message": "Nadym is alive"}));
    }
}
