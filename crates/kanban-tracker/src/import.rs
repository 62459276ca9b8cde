use kanban_core::{NewTicket, Priority, TicketType};
use serde::{Deserialize, Serialize};

/// An issue selected for import, as sent back by the board.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueImport {
    /// Becomes the ticket's `jira_key` and the title prefix.
    pub key: String,
    /// Issue title.
    #[serde(default)]
    pub summary: String,
    /// Tracker issue type name, see [`map_issue_type`].
    #[serde(rename = "type", default)]
    pub issue_type: Option<String>,
    /// Tracker priority name, see [`map_priority`].
    #[serde(default)]
    pub priority: Option<String>,
    /// Informational only; imported tickets get no project.
    #[serde(default)]
    pub project: Option<String>,
    /// Becomes the ticket description.
    #[serde(default)]
    pub description: Option<String>,
}

/// `Bug` and `Improvement` map across; everything else is a feature.
pub fn map_issue_type(name: &str) -> TicketType {
    match name {
        "Bug" | "버그" => TicketType::Bug,
        "Improvement" | "개선" => TicketType::Improvement,
        _ => TicketType::Feature,
    }
}

/// Highest is critical, Lowest folds into low, unknown names are medium.
pub fn map_priority(name: &str) -> Priority {
    match name {
        "Highest" => Priority::Critical,
        "High" => Priority::High,
        "Low" | "Lowest" => Priority::Low,
        _ => Priority::Medium,
    }
}

impl IssueImport {
    /// New backlog ticket titled `"[KEY] summary"`, not attached to a project.
    pub fn to_new_ticket(&self) -> NewTicket {
        NewTicket {
            project_id: None,
            ticket_type: self
                .issue_type
                .as_deref()
                .map(map_issue_type)
                .unwrap_or_default(),
            title: format!("[{}] {}", self.key, self.summary),
            description: self.description.clone().unwrap_or_default(),
            success_criteria: None,
            priority: self
                .priority
                .as_deref()
                .map(map_priority)
                .unwrap_or_default(),
            jira_key: Some(self.key.clone()),
            session_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_mapping() {
        assert_eq!(map_issue_type("Bug"), TicketType::Bug);
        assert_eq!(map_issue_type("버그"), TicketType::Bug);
        assert_eq!(map_issue_type("Improvement"), TicketType::Improvement);
        assert_eq!(map_issue_type("Story"), TicketType::Feature);
        assert_eq!(map_issue_type("Epic"), TicketType::Feature);
    }

    #[test]
    fn test_priority_mapping() {
        assert_eq!(map_priority("Highest"), Priority::Critical);
        assert_eq!(map_priority("High"), Priority::High);
        assert_eq!(map_priority("Lowest"), Priority::Low);
        assert_eq!(map_priority("Whatever"), Priority::Medium);
    }

    #[test]
    fn test_to_new_ticket() {
        let issue = IssueImport {
            key: "PROJ-9".into(),
            summary: "Crash on save".into(),
            issue_type: Some("Bug".into()),
            priority: Some("Highest".into()),
            project: Some("Project".into()),
            description: None,
        };
        let ticket = issue.to_new_ticket();
        assert_eq!(ticket.title, "[PROJ-9] Crash on save");
        assert_eq!(ticket.ticket_type, TicketType::Bug);
        assert_eq!(ticket.priority, Priority::Critical);
        assert_eq!(ticket.jira_key.as_deref(), Some("PROJ-9"));
        assert!(ticket.project_id.is_none());
        assert_eq!(ticket.description, "");
    }
}
