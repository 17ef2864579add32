//! Glob filters for exposing or blocking tools.
//!
//! Patterns support `*` and `?`. A pattern containing `/` is matched
//! against `server/tool`; otherwise it is matched against the bare tool
//! name, so `"*/*"` blocks every tool on every server.

use serde::{Deserialize, Serialize};

/// Per-server tool filters from the config (`includeTools` /
/// `disabledTools`). Disabled wins over include.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolFilters {
    pub include: Option<Vec<String>>,
    pub disabled: Vec<String>,
}

impl ToolFilters {
    /// Whether a tool may be listed or called at all.
    pub fn allows(&self, server: &str, tool: &str) -> bool {
        if self
            .disabled
            .iter()
            .any(|pat| matches_tool(pat, server, tool))
        {
            return false;
        }
        match &self.include {
            Some(patterns) => patterns.iter().any(|pat| matches_tool(pat, server, tool)),
            None => true,
        }
    }

    /// The disabled pattern that blocks this tool, if any. Used for the
    /// refusal message.
    pub fn blocking_pattern(&self, server: &str, tool: &str) -> Option<&str> {
        self.disabled
            .iter()
            .find(|pat| matches_tool(pat, server, tool))
            .map(String::as_str)
    }
}

fn matches_tool(pattern: &str, server: &str, tool: &str) -> bool {
    if pattern.contains('/') {
        glob_match(pattern, &format!("{server}/{tool}"))
    } else {
        glob_match(pattern, tool)
    }
}

/// Iterative glob matcher with star backtracking. `*` matches any run of
/// characters (including `/`), `?` matches exactly one.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pat: Vec<char> = pattern.chars().collect();
    let txt: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while t < txt.len() {
        if p < pat.len() && (pat[p] == '?' || pat[p] == txt[t]) {
            p += 1;
            t += 1;
        } else if p < pat.len() && pat[p] == '*' {
            star = Some((p, t));
            p += 1;
        } else if let Some((star_p, star_t)) = star {
            p = star_p + 1;
            t = star_t + 1;
            star = Some((star_p, star_t + 1));
        } else {
            return false;
        }
    }

    while p < pat.len() && pat[p] == '*' {
        p += 1;
    }
    p == pat.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_literal() {
        assert!(glob_match("navigate", "navigate"));
        assert!(!glob_match("navigate", "navigate_back"));
    }

    #[test]
    fn test_glob_star() {
        assert!(glob_match("nav*", "navigate"));
        assert!(glob_match("*shot", "screenshot"));
        assert!(glob_match("*", "anything"));
        assert!(glob_match("a*c", "abbbc"));
        assert!(!glob_match("a*c", "abd"));
    }

    #[test]
    fn test_glob_question_mark() {
        assert!(glob_match("rea?", "read"));
        assert!(!glob_match("rea?", "reads"));
    }

    #[test]
    fn test_slash_all_blocks_everything() {
        let filters = ToolFilters {
            include: None,
            disabled: vec!["*/*".to_string()],
        };
        assert!(!filters.allows("browser", "navigate"));
        assert!(!filters.allows("fs", "read_file"));
    }

    #[test]
    fn test_disabled_beats_include() {
        let filters = ToolFilters {
            include: Some(vec!["*".to_string()]),
            disabled: vec!["write*".to_string()],
        };
        assert!(filters.allows("fs", "read_file"));
        assert!(!filters.allows("fs", "write_file"));
    }

    #[test]
    fn test_include_restricts() {
        let filters = ToolFilters {
            include: Some(vec!["read*".to_string()]),
            disabled: vec![],
        };
        assert!(filters.allows("fs", "read_file"));
        assert!(!filters.allows("fs", "delete_file"));
    }

    #[test]
    fn test_server_qualified_pattern() {
        let filters = ToolFilters {
            include: None,
            disabled: vec!["browser/nav*".to_string()],
        };
        assert!(!filters.allows("browser", "navigate"));
        // Bare-name form of the same tool on a different server is fine.
        assert!(filters.allows("crawler", "navigate"));
    }

    #[test]
    fn test_empty_filters_allow_all() {
        let filters = ToolFilters::default();
        assert!(filters.allows("any", "tool"));
    }
}
