//! Advisory static scanner over script source.
//!
//! Grounded in the teacher's `security::{scanner, default_rules, rules}`
//! trio: a small table of regexes tagged with a severity and issue type,
//! matched line-by-line, with per-line comment skipping to cut down false
//! positives. Unlike C6's import admission, nothing here blocks execution —
//! a caller surfaces [`ScanResult`] alongside a successful admission as a
//! warning, never as a rejection. Off unless a caller asks for it.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Severity of a single finding. Ordered so `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Category a finding belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    DynamicEval,
    ProcessExecution,
    ObfuscatedCode,
    FileOperation,
    NetworkRequest,
}

/// One pattern match found in a script.
#[derive(Debug, Clone, Serialize)]
pub struct Issue {
    pub rule_id: &'static str,
    pub severity: Severity,
    pub issue_type: IssueType,
    pub line_number: usize,
    pub description: &'static str,
    pub code_snippet: String,
}

/// Outcome of scanning one script's source.
#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    pub is_safe: bool,
    pub issues: Vec<Issue>,
}

struct Rule {
    id: &'static str,
    pattern: &'static str,
    issue_type: IssueType,
    severity: Severity,
    description: &'static str,
    languages: &'static [&'static str],
}

/// Patterns for the interpreted languages `launchCodeScript` can be handed
/// (`python`/`node` via `interpreter -c code`). Mirrors the teacher's
/// `default_rules::get_default_python_rules`/`get_default_node_rules` split,
/// trimmed to the subset this Open Question actually calls for: dynamic
/// `eval`/`Function` construction, obviously-encoded payloads, and raw
/// process spawning from inside interpreted code.
const DEFAULT_RULES: &[Rule] = &[
    Rule {
        id: "py-eval-exec",
        pattern: r"(?:^|[^.\w])(?:eval|exec)\s*\(",
        issue_type: IssueType::DynamicEval,
        severity: Severity::Critical,
        description: "dynamic eval()/exec() of a computed string",
        languages: &["python"],
    },
    Rule {
        id: "py-compile",
        pattern: r"\bcompile\s*\(",
        issue_type: IssueType::DynamicEval,
        severity: Severity::High,
        description: "compile() building code at runtime",
        languages: &["python"],
    },
    Rule {
        id: "py-subprocess",
        pattern: r"\b(?:subprocess\.(?:run|call|Popen|check_output)|os\.system|os\.popen|os\.exec\w*)\s*\(",
        issue_type: IssueType::ProcessExecution,
        severity: Severity::High,
        description: "spawns a subprocess from inside interpreted code",
        languages: &["python"],
    },
    Rule {
        id: "py-base64-decode",
        pattern: r"base64\.(?:b64decode|decode)\s*\(",
        issue_type: IssueType::ObfuscatedCode,
        severity: Severity::Medium,
        description: "base64-decodes a payload before use",
        languages: &["python"],
    },
    Rule {
        id: "js-eval-function",
        pattern: r"(?:^|[^.\w])(?:eval|new\s+Function)\s*\(",
        issue_type: IssueType::DynamicEval,
        severity: Severity::Critical,
        description: "dynamic eval()/new Function() of a computed string",
        languages: &["javascript"],
    },
    Rule {
        id: "js-child-process",
        pattern: r"child_process\.(?:exec|execSync|spawn|spawnSync)\s*\(",
        issue_type: IssueType::ProcessExecution,
        severity: Severity::High,
        description: "spawns a subprocess from inside interpreted code",
        languages: &["javascript"],
    },
    Rule {
        id: "js-base64-decode",
        pattern: r#"Buffer\.from\([^)]*,\s*['"]base64['"]\)"#,
        issue_type: IssueType::ObfuscatedCode,
        severity: Severity::Medium,
        description: "base64-decodes a payload before use",
        languages: &["javascript"],
    },
    Rule {
        id: "shared-high-entropy-string",
        pattern: r#"["'][A-Za-z0-9+/]{80,}={0,2}["']"#,
        issue_type: IssueType::ObfuscatedCode,
        severity: Severity::Medium,
        description: "long opaque string literal, consistent with an encoded payload",
        languages: &[],
    },
];

/// Best-effort, non-blocking scan of interpreted-language source for
/// suspicious constructs. `language` should be the interpreter name
/// (`"python"`, `"node"`/`"javascript"`); unrecognized languages only match
/// rules that apply to every language (empty `languages`).
pub fn scan_content(source: &str, language: &str) -> ScanResult {
    let language = normalize_language(language);
    let comment_prefix = comment_prefix_for(language);
    let mut issues = Vec::new();

    for (line_idx, line) in source.lines().enumerate() {
        let trimmed = line.trim();
        if let Some(prefix) = comment_prefix {
            if trimmed.starts_with(prefix) {
                continue;
            }
        }

        for rule in DEFAULT_RULES {
            if !rule.languages.is_empty() && !rule.languages.contains(&language) {
                continue;
            }
            let Ok(regex) = compile(rule.pattern) else {
                continue;
            };
            if regex.is_match(line) {
                issues.push(Issue {
                    rule_id: rule.id,
                    severity: rule.severity,
                    issue_type: rule.issue_type,
                    line_number: line_idx + 1,
                    description: rule.description,
                    code_snippet: trimmed.to_string(),
                });
            }
        }
    }

    let is_safe = issues.iter().all(|issue| issue.severity == Severity::Low);
    ScanResult { is_safe, issues }
}

fn compile(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(pattern)
}

fn normalize_language(language: &str) -> &str {
    match language.to_ascii_lowercase().as_str() {
        "python" | "python3" | "py" => "python",
        "node" | "nodejs" | "javascript" | "js" => "javascript",
        _ => "unknown",
    }
}

fn comment_prefix_for(language: &str) -> Option<&'static str> {
    match language {
        "python" => Some("#"),
        "javascript" => Some("//"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_dynamic_eval_in_python() {
        let result = scan_content("eval(user_input)\n", "python");
        assert!(!result.is_safe);
        assert!(result.issues.iter().any(|i| i.rule_id == "py-eval-exec"));
    }

    #[test]
    fn flags_new_function_in_javascript() {
        let result = scan_content("const f = new Function('return 1')();\n", "node");
        assert!(result.issues.iter().any(|i| i.rule_id == "js-eval-function"));
    }

    #[test]
    fn flags_subprocess_spawn_from_python() {
        let result = scan_content("subprocess.run(['rm', '-rf', '/'])\n", "python");
        assert!(result.issues.iter().any(|i| i.rule_id == "py-subprocess"));
    }

    #[test]
    fn skips_commented_lines() {
        let result = scan_content("# eval(danger)\n", "python");
        assert!(result.issues.is_empty());
    }

    #[test]
    fn clean_script_is_safe() {
        let result = scan_content("print('hello world')\n", "python");
        assert!(result.is_safe);
        assert!(result.issues.is_empty());
    }

    #[test]
    fn flags_long_base64_like_literal_regardless_of_language() {
        let payload = "A".repeat(90);
        let source = format!("x = \"{payload}\"\n");
        let result = scan_content(&source, "unknown");
        assert!(result.issues.iter().any(|i| i.rule_id == "shared-high-entropy-string"));
    }
}
