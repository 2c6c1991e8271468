use std::time::Duration;

const NODE_NAME: &str = "GUARDIA_NODE";

/// Share of the iteration budget given to the parsing phase
const PARSING_SHARE: f64 = 0.8;

/// Resolve this node's identity: explicit name, then `GUARDIA_NODE`, then the hostname
pub fn get_node_name(configured: Option<&str>) -> String {
    if let Some(name) = configured {
        return name.to_string();
    }

    std::env::var(NODE_NAME)
        .ok()
        .or_else(|| std::env::var("HOSTNAME").ok())
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .map(|name| name.trim().to_string())
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| String::from("localhost"))
}

/// Fresh identifier for one dispatch iteration
pub fn generate_session_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Split an iteration duration (seconds) into `(parsing, whole)` budgets
pub fn session_time_frame(iteration_duration: u64) -> (Duration, Duration) {
    let whole = Duration::from_secs(iteration_duration);
    (whole.mul_f64(PARSING_SHARE), whole)
}
