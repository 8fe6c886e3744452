//! Knowledge about the remote console: the controls the launcher touches, the
//! URLs it recognizes, and the payloads it decodes from intercepted traffic.

use crate::core::state::RunStatus;
use crate::surface::ResponseMatcher;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// Selectors for the identity provider's login form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginSelectors {
    /// Link that switches the form to sub-user (IAM) login
    pub iam_switch: String,
    pub tenant: String,
    pub username: String,
    pub password: String,
    pub submit: String,
}

impl Default for LoginSelectors {
    fn default() -> Self {
        Self {
            iam_switch: "#IAMLinkDiv".to_string(),
            tenant: "#IAMAccountInputId".to_string(),
            username: "#IAMUsernameInputId".to_string(),
            password: "#IAMPasswordInputId".to_string(),
            submit: "#btn_submit".to_string(),
        }
    }
}

/// The fixed set of markers, selectors and codes used to drive the console
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleProfile {
    /// Substring of identity-provider URLs
    pub identity_host_marker: String,
    /// Substring of URLs inside the application's project namespace
    pub project_namespace_marker: String,
    /// Substring of a run-detail page URL
    pub run_detail_url_marker: String,
    /// Substring of the launch request URL
    pub launch_endpoint_marker: String,
    pub launch_method: String,
    /// Substring of the run-detail polling endpoint
    pub detail_endpoint_marker: String,
    /// Launch error codes meaning "too many concurrent runs, try later"
    pub concurrency_codes: Vec<String>,
    /// Primary run control (selector union, first match wins)
    pub run_button_selector: String,
    /// Affirmative buttons of a confirmation dialog, tried in order
    pub dialog_confirm_selectors: Vec<String>,
    /// Exact labels accepted by the heuristic scan
    pub confirm_labels: Vec<String>,
    /// Elements considered clickable by the heuristic scan
    pub scan_selectors: Vec<String>,
    pub login: LoginSelectors,
}

impl Default for ConsoleProfile {
    fn default() -> Self {
        Self {
            identity_host_marker: "auth.huaweicloud.com".to_string(),
            project_namespace_marker: "cicd/project".to_string(),
            run_detail_url_marker: "pipeline-runs/detail".to_string(),
            launch_endpoint_marker: "/run".to_string(),
            launch_method: "POST".to_string(),
            detail_endpoint_marker: "pipeline-runs/detail".to_string(),
            concurrency_codes: vec![
                "DEVPIPE.00011104".to_string(),
                "DEVPIPE.00011105".to_string(),
            ],
            run_button_selector: r#"button:has-text("执行"), .run-btn, button:has-text("运行")"#
                .to_string(),
            dialog_confirm_selectors: vec![
                r#".devui-modal-container button:has-text("确定")"#.to_string(),
                r#".devui-modal-container button:has-text("确认")"#.to_string(),
                r#".modal-footer button:has-text("确定")"#.to_string(),
                r#".modal-footer button:has-text("确认")"#.to_string(),
                r#"d-button[content="确定"]"#.to_string(),
                r#"button:has-text("确定")"#.to_string(),
                r#"button:has-text("确认")"#.to_string(),
            ],
            confirm_labels: vec!["确定".to_string(), "确认".to_string()],
            scan_selectors: vec![
                "button".to_string(),
                "d-button".to_string(),
                ".devui-btn".to_string(),
            ],
            login: LoginSelectors::default(),
        }
    }
}

impl ConsoleProfile {
    pub fn is_identity_page(&self, url: &str) -> bool {
        url.contains(&self.identity_host_marker)
    }

    pub fn is_project_page(&self, url: &str) -> bool {
        url.contains(&self.project_namespace_marker)
    }

    pub fn is_run_detail_page(&self, url: &str) -> bool {
        url.contains(&self.run_detail_url_marker)
    }

    /// Matches the launch request's response
    pub fn launch_matcher(&self) -> ResponseMatcher {
        ResponseMatcher::new(&self.launch_endpoint_marker).with_method(&self.launch_method)
    }

    /// Matches the run-detail polling responses
    pub fn detail_matcher(&self) -> ResponseMatcher {
        ResponseMatcher::new(&self.detail_endpoint_marker)
    }

    /// Decide what a launch response means
    pub fn classify_launch(&self, body: &Value) -> LaunchReply {
        let result = payload_result(body);

        if let Some(run_id) = field_string(result, "pipeline_run_id").or_else(|| field_string(result, "id")) {
            return LaunchReply::Accepted { run_id };
        }

        let code = field_string(body, "error_code")
            .or_else(|| body.get("error").and_then(|e| field_string(e, "code")));

        match code {
            Some(code) if self.concurrency_codes.iter().any(|c| *c == code) => {
                LaunchReply::ConcurrencyLimited { code }
            }
            Some(code) => {
                let message = field_string(body, "error_msg")
                    .or_else(|| field_string(body, "message"))
                    .unwrap_or_else(|| "unknown".to_string());
                LaunchReply::Rejected { code, message }
            }
            None => LaunchReply::Unrecognized,
        }
    }
}

/// Meaning of one launch response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchReply {
    /// The console created a run
    Accepted { run_id: String },
    /// Too many concurrent runs; worth retrying
    ConcurrencyLimited { code: String },
    /// Any other structured error; retrying would reproduce it
    Rejected { code: String, message: String },
    /// Neither a run id nor an error code
    Unrecognized,
}

/// Fields of one run-detail response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunDetail {
    pub status: Option<RunStatus>,
    pub start_time: Option<i64>,
    pub update_time: Option<i64>,
    pub run_id: Option<String>,
    pub executor: Option<String>,
    pub project_id: Option<String>,
    pub pipeline_id: Option<String>,
}

impl RunDetail {
    pub fn from_payload(body: &Value) -> Self {
        let result = payload_result(body);
        Self {
            status: field_string(result, "status").map(|s| RunStatus::from_remote(&s)),
            start_time: field_millis(result, "start_time"),
            update_time: field_millis(result, "update_time"),
            run_id: field_string(result, "pipeline_run_id").or_else(|| field_string(result, "id")),
            executor: field_string(result, "executor_name"),
            project_id: field_string(result, "project_id"),
            pipeline_id: field_string(result, "pipeline_id"),
        }
    }
}

/// Deep link to a run's detail page on the entry URL's host
pub fn canonical_detail_url(
    entry_url: &str,
    project_id: &str,
    pipeline_id: &str,
    run_id: &str,
) -> Option<String> {
    static HOST: OnceLock<Regex> = OnceLock::new();
    let host = HOST.get_or_init(|| Regex::new(r"^https?://([^/?#]+)").expect("valid host regex"));

    let host = host.captures(entry_url)?.get(1)?.as_str();
    Some(format!(
        "https://{}/cicd/project/{}/pipeline/detail/{}/{}?v=1",
        host, project_id, pipeline_id, run_id
    ))
}

fn payload_result(body: &Value) -> &Value {
    match body.get("result") {
        Some(result) if result.is_object() => result,
        _ => body,
    }
}

fn field_string(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn field_millis(value: &Value, key: &str) -> Option<i64> {
    let millis = match value.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    };
    millis.filter(|ms| *ms > 0)
}
