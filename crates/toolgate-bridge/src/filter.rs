use toolgate_core::{GroupMember, ToolEntry, ToolGroup, ToolListResult, ToolScope};
use tracing::warn;

/// Narrow a tools-list result to the subset visible to `group_id`.
///
/// An unknown group id is a configuration inconsistency to tolerate, not to
/// fail on: the result passes through unfiltered. Non-tool result fields are
/// preserved either way.
pub fn filter_tools_by_group(
    result: ToolListResult,
    group_id: &str,
    groups: &[ToolGroup],
) -> ToolListResult {
    let Some(group) = groups.iter().find(|g| g.id == group_id) else {
        warn!(group = %group_id, "Unknown group id, passing tool list through unfiltered");
        return result;
    };

    let ToolListResult { tools, extra } = result;
    let tools = tools
        .into_iter()
        .filter(|tool| group.servers.iter().any(|member| member_allows(member, tool)))
        .collect();
    ToolListResult { tools, extra }
}

/// A member admits a tool when the tool's owning server matches it and the
/// member's scope covers the tool name. Tools the catalog did not attribute
/// to a server fall back to the name-only check.
fn member_allows(member: &GroupMember, tool: &ToolEntry) -> bool {
    if let Some(server) = tool.server.as_deref() {
        if member.server_name() != server {
            return false;
        }
    }
    scope_allows(member, &tool.name)
}

fn scope_allows(member: &GroupMember, tool_name: &str) -> bool {
    match member {
        GroupMember::Name(_) => true,
        GroupMember::Scoped { tools, .. } => match tools {
            ToolScope::Keyword(keyword) => keyword == "all",
            ToolScope::Allowed(names) => names.iter().any(|n| n == tool_name),
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool(name: &str, server: Option<&str>) -> ToolEntry {
        ToolEntry {
            name: name.to_string(),
            description: String::new(),
            input_schema: json!({"type": "object"}),
            server: server.map(str::to_string),
        }
    }

    fn groups() -> Vec<ToolGroup> {
        serde_json::from_value(json!([
            {
                "id": "g1",
                "name": "Ops",
                "servers": [
                    "alpha",
                    {"name": "beta", "tools": ["beta_one"]},
                    {"name": "gamma", "tools": "all"}
                ]
            },
            {"id": "g2", "name": "Empty", "servers": []}
        ]))
        .unwrap()
    }

    fn names(result: &ToolListResult) -> Vec<&str> {
        result.tools.iter().map(|t| t.name.as_str()).collect()
    }

    #[test]
    fn test_filters_by_server_membership() {
        let result = ToolListResult {
            tools: vec![
                tool("alpha_one", Some("alpha")),
                tool("beta_one", Some("beta")),
                tool("beta_two", Some("beta")),
                tool("gamma_one", Some("gamma")),
                tool("delta_one", Some("delta")),
            ],
            extra: serde_json::Map::new(),
        };

        let filtered = filter_tools_by_group(result, "g1", &groups());
        // alpha: bare member, all tools. beta: only the listed tool.
        // gamma: "all" keyword. delta: not a member at all.
        assert_eq!(names(&filtered), vec!["alpha_one", "beta_one", "gamma_one"]);
    }

    #[test]
    fn test_unattributed_tools_use_name_check() {
        let result = ToolListResult {
            tools: vec![tool("beta_one", None), tool("other", None)],
            extra: serde_json::Map::new(),
        };

        // "beta_one" is on beta's allow-list; "other" passes through the
        // bare "alpha" member, which admits any name.
        let filtered = filter_tools_by_group(result, "g1", &groups());
        assert_eq!(names(&filtered), vec!["beta_one", "other"]);
    }

    #[test]
    fn test_empty_group_hides_everything() {
        let result = ToolListResult {
            tools: vec![tool("alpha_one", Some("alpha"))],
            extra: serde_json::Map::new(),
        };
        let filtered = filter_tools_by_group(result, "g2", &groups());
        assert!(filtered.tools.is_empty());
    }

    #[test]
    fn test_unknown_group_passes_through() {
        let result = ToolListResult {
            tools: vec![tool("a", Some("alpha")), tool("b", Some("zeta"))],
            extra: serde_json::Map::new(),
        };
        let filtered = filter_tools_by_group(result, "missing", &groups());
        assert_eq!(filtered.tools.len(), 2);
    }

    #[test]
    fn test_extra_fields_survive_filtering() {
        let mut extra = serde_json::Map::new();
        extra.insert("nextCursor".to_string(), json!("xyz"));
        let result = ToolListResult {
            tools: vec![tool("delta_one", Some("delta"))],
            extra,
        };

        let filtered = filter_tools_by_group(result, "g1", &groups());
        assert!(filtered.tools.is_empty());
        assert_eq!(filtered.extra["nextCursor"], "xyz");
    }

    #[test]
    fn test_non_all_keyword_matches_nothing() {
        let groups: Vec<ToolGroup> = serde_json::from_value(json!([
            {"id": "g", "servers": [{"name": "alpha", "tools": "none"}]}
        ]))
        .unwrap();
        let result = ToolListResult {
            tools: vec![tool("alpha_one", Some("alpha"))],
            extra: serde_json::Map::new(),
        };
        let filtered = filter_tools_by_group(result, "g", &groups);
        assert!(filtered.tools.is_empty());
    }
}
