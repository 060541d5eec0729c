//! User-Agent string shared by registry and file-transfer HTTP clients.

/// Project URL for User-Agent identification (RFC 9308).
const PROJECT_UA_URL: &str = "https://github.com/fierce/stockpile";

/// Default User-Agent for every outgoing request.
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("stockpile/{version} (artifact-mirror; +{PROJECT_UA_URL})")
}
