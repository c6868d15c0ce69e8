// SQL security screening.
//
// Keyword-signature matching over the raw statement text, not a SQL
// parser. Obfuscated keywords can slip through; the screen is a guardrail
// for a read-only surface, not an authorization boundary.
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Leading keywords that mark a statement as read-only.
const READ_ONLY_PREFIXES: &[&str] = &["select ", "show ", "desc ", "describe ", "explain "];

/// Danger signatures checked on every statement. The `object_scoped` flag
/// marks keywords that are common English words inside legitimate
/// read-only SQL (identifiers, literals); for those, a read-only statement
/// is only flagged when the keyword is followed by an object-type keyword,
/// which is the shape of genuine DDL/DML.
const DANGER_RULES: &[(&str, &str, &str, bool)] = &[
    (r"\bdelete\b", "delete", "DELETE operation", true),
    (r"\bdrop\b", "drop", "DROP TABLE/DATABASE operation", true),
    (r"\btruncate\b", "truncate", "TRUNCATE TABLE operation", false),
    (r"\bupdate\b", "update", "UPDATE operation", true),
    (r"\binsert\b", "insert", "INSERT operation", true),
    (r"\balter\b", "alter", "ALTER TABLE structure operation", true),
    (r"\bcreate\b", "create", "CREATE TABLE/DATABASE operation", true),
    (r"\bgrant\b", "grant", "GRANT operation", false),
    (r"\brevoke\b", "revoke", "REVOKE permission operation", false),
    (r"\bexec\b", "exec", "EXECUTE stored procedure", false),
    (r"\bxp_", "xp_", "Extended stored procedure", false),
    (r"\bshutdown\b", "shutdown", "SHUTDOWN database operation", false),
    (
        r"\bunion\s+all\s+select\b",
        "union all select",
        "UNION statement, potential SQL injection",
        false,
    ),
    (
        r"\bunion\s+select\b",
        "union select",
        "UNION statement, potential SQL injection",
        false,
    ),
    (
        r"\binto\s+outfile\b",
        "into outfile",
        "Write to file operation",
        false,
    ),
    (r"\bload_file\b", "load_file", "Load file operation", false),
];

const OBJECT_TYPE_SUFFIX: &str =
    r"\s+(?:table|database|view|index|procedure|function|trigger|event)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    High,
    Medium,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityIssue {
    pub operation: String,
    pub description: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityVerdict {
    pub is_safe: bool,
    pub security_issues: Vec<SecurityIssue>,
}

struct DangerRule {
    pattern: Regex,
    /// Stricter variant requiring an object-type keyword; present only for
    /// the ambiguous DDL/DML keywords.
    object_scoped: Option<Regex>,
    operation: &'static str,
    description: &'static str,
}

/// Screens raw SQL text before execution. When disabled, every statement
/// is reported safe.
pub struct SqlSecurityGuard {
    enabled: bool,
    rules: Vec<DangerRule>,
}

impl SqlSecurityGuard {
    pub fn new(enabled: bool) -> Self {
        let rules = DANGER_RULES
            .iter()
            .map(|&(pattern, operation, description, object_scoped)| DangerRule {
                pattern: Regex::new(pattern).expect("danger signature must compile"),
                object_scoped: object_scoped.then(|| {
                    let strict = format!("{}{}", pattern, OBJECT_TYPE_SUFFIX);
                    Regex::new(&strict).expect("danger signature must compile")
                }),
                operation,
                description,
            })
            .collect();

        Self { enabled, rules }
    }

    pub fn screen(&self, sql: &str) -> SecurityVerdict {
        if !self.enabled {
            return SecurityVerdict {
                is_safe: true,
                security_issues: Vec::new(),
            };
        }

        let lowered = sql.to_lowercase();
        let read_only = is_read_only(&lowered);

        let mut issues = Vec::new();

        for rule in &self.rules {
            if !rule.pattern.is_match(&lowered) {
                continue;
            }

            // Read-only statements legitimately mention words like
            // "create" in identifiers and literals; require the DDL shape.
            if read_only {
                if let Some(strict) = &rule.object_scoped {
                    if !strict.is_match(&lowered) {
                        continue;
                    }
                }
            }

            issues.push(SecurityIssue {
                operation: rule.operation.to_string(),
                description: rule.description.to_string(),
                severity: Severity::High,
            });
        }

        // Parameterized non-read-only statements from this system never
        // carry embedded comments; treat them as injection markers. The
        // same markers in a read-only statement are left alone.
        if !read_only {
            for (marker, description) in [
                ("--", "SQL comment, potential SQL injection"),
                ("/*", "SQL block comment, potential SQL injection"),
            ] {
                if lowered.contains(marker) {
                    issues.push(SecurityIssue {
                        operation: marker.to_string(),
                        description: description.to_string(),
                        severity: Severity::Medium,
                    });
                }
            }
        }

        SecurityVerdict {
            is_safe: issues.is_empty(),
            security_issues: issues,
        }
    }
}

fn is_read_only(lowered: &str) -> bool {
    let trimmed = lowered.trim();
    READ_ONLY_PREFIXES.iter().any(|p| trimmed.starts_with(p))
}
