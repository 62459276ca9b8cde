use crate::workflow::ReworkRequest;
use kanban_core::{Project, Ticket, TicketType};

fn type_instructions(ticket_type: TicketType) -> &'static str {
    match ticket_type {
        TicketType::Feature => {
            "## Instructions (new feature)
1. Implement the requested functionality.
2. Create or modify whatever files are needed.
3. Summarize the changes when you are done.
4. Do not commit to git; that happens after review."
        }
        TicketType::Bug => {
            "## Instructions (bug fix)
1. Analyse the root cause of the bug first.
2. Fix it once the cause is understood.
3. Explain both the cause and the fix.
4. Do not commit to git; that happens after review."
        }
        TicketType::Improvement => {
            "## Instructions (improvement / refactoring)
1. Analyse the existing code.
2. Identify improvements and refactor.
3. Compare the code before and after the change.
4. Do not commit to git; that happens after review."
        }
        TicketType::Check => {
            "## Instructions (check / analysis)
1. Check or analyse what is requested.
2. Do NOT modify any files. Analysis only.
3. Report the findings in detail.
4. Suggest improvements where useful, without applying them."
        }
    }
}

fn or_none(text: &str) -> &str {
    if text.trim().is_empty() {
        "(none)"
    } else {
        text
    }
}

/// Prompt for the first run of a ticket (and restarts after a stop).
pub fn start_prompt(ticket: &Ticket, project: &Project, jira_url: Option<&str>) -> String {
    let mut prompt = format!(
        "Project: {}\nPath: {}\n",
        project.name,
        project.path.display()
    );

    if let Some(key) = &ticket.jira_key {
        prompt.push_str(&format!("\n## Jira issue\n- Key: {key}\n"));
        if let Some(url) = jira_url {
            prompt.push_str(&format!("- URL: {url}\n"));
        }
    }

    prompt.push_str(&format!(
        "\n## Task\nTitle: {}\nDescription: {}\n",
        ticket.title,
        or_none(&ticket.description)
    ));
    if let Some(criteria) = &ticket.success_criteria {
        prompt.push_str(&format!("Success criteria: {criteria}\n"));
    }

    prompt.push('\n');
    prompt.push_str(type_instructions(ticket.ticket_type));
    prompt
}

/// Commit-phase prompt sent after a reviewer approves the work.
pub fn approve_prompt(ticket: &Ticket) -> String {
    format!(
        "## Approval

Please commit and push the changes.

### Ticket
- Title: {}
- Description: {}

### Instructions
1. Review the current changes.
2. Commit them with an appropriate commit message.
3. Push to the remote repository.
4. Report the result when finished.",
        ticket.title,
        or_none(&ticket.description)
    )
}

/// Follow-up prompt carrying the reviewer's rework instructions.
pub fn rework_prompt(ticket: &Ticket, request: &ReworkRequest) -> String {
    format!(
        "## Rework request (#{})

Requested changes to the previous work:
{}

## Original ticket
Title: {}
Description: {}

Please revise the previous work accordingly.",
        request.count,
        request.text,
        ticket.title,
        or_none(&ticket.description)
    )
}
