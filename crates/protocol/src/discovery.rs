//! Payloads served by the local discovery HTTP endpoint.
//!
//! A debuggable target exposes a small HTTP surface next to its websocket:
//! `/json/version` describes the browser-level endpoint and `/json/list`
//! enumerates open page targets. Both are polled by
//! `tether-runtime::discovery` until the fields needed to attach appear.

use serde::Deserialize;

/// `/json/version` response subset.
///
/// `webSocketDebuggerUrl` is absent until the target is actually ready to
/// accept a debugger connection, which is what the endpoint waiter polls for.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    /// Browser-level websocket debugger URL, present once ready.
    pub web_socket_debugger_url: Option<String>,
    /// Product identifier (e.g. `"Chrome/124.0.6367.60"`).
    #[serde(rename = "Browser")]
    pub browser: Option<String>,
}

/// One entry of the `/json/list` target enumeration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInfo {
    /// Opaque target identifier.
    pub id: String,
    /// Target kind (`"page"`, `"iframe"`, `"service_worker"`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    /// URL currently loaded in the target.
    #[serde(default)]
    pub url: String,
    /// Page title, if any.
    pub title: Option<String>,
    /// Per-target websocket debugger URL. Absent while another client is
    /// attached to this target.
    pub web_socket_debugger_url: Option<String>,
}

impl TargetInfo {
    /// True for top-level page targets, the only kind tether attaches to.
    pub fn is_page(&self) -> bool {
        self.kind == "page"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_info_parses_ready_payload() {
        let json = r#"{
            "Browser": "Chrome/124.0.6367.60",
            "Protocol-Version": "1.3",
            "webSocketDebuggerUrl": "ws://127.0.0.1:9222/devtools/browser/abc"
        }"#;
        let info: VersionInfo = serde_json::from_str(json).unwrap();
        assert_eq!(
            info.web_socket_debugger_url.as_deref(),
            Some("ws://127.0.0.1:9222/devtools/browser/abc")
        );
        assert_eq!(info.browser.as_deref(), Some("Chrome/124.0.6367.60"));
    }

    #[test]
    fn version_info_tolerates_not_ready_payload() {
        let info: VersionInfo = serde_json::from_str(r#"{"Browser": "Chrome/124"}"#).unwrap();
        assert!(info.web_socket_debugger_url.is_none());
    }

    #[test]
    fn target_list_parses_and_classifies_pages() {
        let json = r#"[
            {
                "id": "A1",
                "type": "page",
                "url": "https://game.example.com/play",
                "title": "Game",
                "webSocketDebuggerUrl": "ws://127.0.0.1:9222/devtools/page/A1"
            },
            {
                "id": "B2",
                "type": "service_worker",
                "url": "https://game.example.com/sw.js"
            }
        ]"#;
        let targets: Vec<TargetInfo> = serde_json::from_str(json).unwrap();
        assert_eq!(targets.len(), 2);
        assert!(targets[0].is_page());
        assert!(!targets[1].is_page());
        assert!(targets[1].web_socket_debugger_url.is_none());
    }
}
