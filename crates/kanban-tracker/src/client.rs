use async_trait::async_trait;
use kanban_core::{ensure_issue_key, KanbanError, KanbanResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const SEARCH_JQL: &str = "assignee=currentUser() AND statusCategory!=Done ORDER BY updated DESC";
const SEARCH_MAX_RESULTS: u32 = 50;

/// Connection settings for the tracker. An empty `host` disables sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// `acme.atlassian.net` or a full base URL.
    #[serde(default)]
    pub host: String,
    /// Account email for basic auth.
    #[serde(default)]
    pub email: String,
    /// API token for basic auth.
    #[serde(default)]
    pub api_token: String,
}

impl TrackerConfig {
    /// True once a host is set.
    pub fn is_configured(&self) -> bool {
        !self.host.trim().is_empty()
    }
}

/// One workflow transition offered by the tracker for an issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    /// Passed back when executing the transition.
    pub id: String,
    /// Label shown on the tracker's workflow button.
    pub name: String,
    /// Where the transition leads, when the tracker says.
    #[serde(default)]
    pub to: Option<TransitionState>,
}

/// Destination state of a [`Transition`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionState {
    /// Status name, e.g. `In Review`.
    pub name: String,
}

impl Transition {
    /// Name of the destination status, if known.
    pub fn destination(&self) -> Option<&str> {
        self.to.as_ref().map(|t| t.name.as_str())
    }
}

/// The authenticated tracker account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerUser {
    /// Name shown in the tracker UI.
    #[serde(default)]
    pub display_name: String,
    /// Account email.
    #[serde(default)]
    pub email_address: String,
}

/// Flattened issue summary, as shown in the import dialog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerIssue {
    /// Numeric tracker id.
    pub id: String,
    /// Human key, e.g. `PROJ-42`.
    pub key: String,
    /// Issue title.
    pub summary: String,
    /// Current status name.
    pub status: Option<String>,
    /// Issue type name (`Bug`, `Story`, ...).
    #[serde(rename = "type")]
    pub issue_type: Option<String>,
    /// Priority name (`Highest` .. `Lowest`).
    pub priority: Option<String>,
    /// Project display name.
    pub project: Option<String>,
    /// Project key, the part of `key` before the dash.
    pub project_key: Option<String>,
    /// First paragraph of the description.
    pub description: String,
}

impl TrackerIssue {
    /// Build from a raw Jira issue object (`{id, key, fields: {...}}`).
    pub fn from_jira(raw: &Value) -> Self {
        let fields = &raw["fields"];
        let name_of = |field: &str| fields[field]["name"].as_str().map(str::to_string);
        Self {
            id: raw["id"].as_str().unwrap_or_default().to_string(),
            key: raw["key"].as_str().unwrap_or_default().to_string(),
            summary: fields["summary"].as_str().unwrap_or_default().to_string(),
            status: name_of("status"),
            issue_type: name_of("issuetype"),
            priority: name_of("priority"),
            project: name_of("project"),
            project_key: fields["project"]["key"].as_str().map(str::to_string),
            description: first_adf_text(&fields["description"]),
        }
    }
}

/// First text node of an Atlassian Document Format body, or the string itself.
fn first_adf_text(description: &Value) -> String {
    if let Some(text) = description.as_str() {
        return text.to_string();
    }
    description["content"][0]["content"][0]["text"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}

/// Operations the board needs from an external issue tracker.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// One issue by key.
    async fn fetch_issue(&self, key: &str) -> KanbanResult<TrackerIssue>;

    /// Transitions currently available for the issue, in tracker order.
    async fn list_transitions(&self, key: &str) -> KanbanResult<Vec<Transition>>;

    /// Move the issue along `transition_id`.
    async fn execute_transition(&self, key: &str, transition_id: &str) -> KanbanResult<()>;

    /// Verify credentials and return the authenticated account.
    async fn test_connection(&self) -> KanbanResult<TrackerUser>;

    /// Unfinished issues assigned to the authenticated account.
    async fn search_my_issues(&self) -> KanbanResult<Vec<TrackerIssue>>;

    /// Human-facing link to an issue.
    fn browse_url(&self, key: &str) -> String;
}

/// Jira Cloud REST v3 client using basic auth (email + API token).
pub struct JiraClient {
    http: reqwest::Client,
    base_url: String,
    email: String,
    api_token: String,
}

impl JiraClient {
    /// Build a client; nothing is contacted until the first call.
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: normalize_base_url(&config.host),
            email: config.email.clone(),
            api_token: config.api_token.clone(),
        }
    }

    /// Normalized base URL, scheme included.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Path of an issue resource. Keys are checked first since they are
    /// interpolated into the URL path.
    fn issue_endpoint(key: &str, suffix: &str) -> KanbanResult<String> {
        ensure_issue_key(key)?;
        Ok(format!("/rest/api/3/issue/{key}{suffix}"))
    }

    fn request(&self, method: reqwest::Method, endpoint: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, endpoint))
            .basic_auth(&self.email, Some(&self.api_token))
            .header("Accept", "application/json")
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> KanbanResult<reqwest::Response> {
        let resp = builder
            .send()
            .await
            .map_err(|e| KanbanError::Tracker(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(KanbanError::Tracker(format!(
                "Jira API error {status}: {body}"
            )));
        }
        Ok(resp)
    }

    async fn send_json(&self, builder: reqwest::RequestBuilder) -> KanbanResult<Value> {
        self.send(builder)
            .await?
            .json()
            .await
            .map_err(|e| KanbanError::Tracker(e.to_string()))
    }
}

/// `example.atlassian.net` becomes `https://example.atlassian.net`; explicit schemes are kept.
fn normalize_base_url(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

#[async_trait]
impl IssueTracker for JiraClient {
    async fn fetch_issue(&self, key: &str) -> KanbanResult<TrackerIssue> {
        let endpoint = Self::issue_endpoint(key, "")?;
        let raw = self
            .send_json(self.request(reqwest::Method::GET, &endpoint))
            .await?;
        Ok(TrackerIssue::from_jira(&raw))
    }

    async fn list_transitions(&self, key: &str) -> KanbanResult<Vec<Transition>> {
        let endpoint = Self::issue_endpoint(key, "/transitions")?;
        let body = self
            .send_json(self.request(reqwest::Method::GET, &endpoint))
            .await?;
        let transitions = body
            .get("transitions")
            .cloned()
            .ok_or_else(|| KanbanError::Tracker(format!("no transitions listed for {key}")))?;
        Ok(serde_json::from_value(transitions)?)
    }

    async fn execute_transition(&self, key: &str, transition_id: &str) -> KanbanResult<()> {
        let endpoint = Self::issue_endpoint(key, "/transitions")?;
        let body = serde_json::json!({ "transition": { "id": transition_id } });
        self.send(self.request(reqwest::Method::POST, &endpoint).json(&body))
            .await?;
        Ok(())
    }

    async fn test_connection(&self) -> KanbanResult<TrackerUser> {
        let body = self
            .send_json(self.request(reqwest::Method::GET, "/rest/api/3/myself"))
            .await?;
        Ok(serde_json::from_value(body)?)
    }

    async fn search_my_issues(&self) -> KanbanResult<Vec<TrackerIssue>> {
        let body = serde_json::json!({
            "jql": SEARCH_JQL,
            "maxResults": SEARCH_MAX_RESULTS,
            "fields": ["summary", "status", "issuetype", "priority", "project", "description"],
        });
        let result = self
            .send_json(
                self.request(reqwest::Method::POST, "/rest/api/3/search/jql")
                    .json(&body),
            )
            .await?;
        Ok(result["issues"]
            .as_array()
            .map(|issues| issues.iter().map(TrackerIssue::from_jira).collect())
            .unwrap_or_default())
    }

    fn browse_url(&self, key: &str) -> String {
        format!("{}/browse/{}", self.base_url, key)
    }
}
