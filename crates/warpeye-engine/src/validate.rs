//! Scene manifest lint (friendly warnings)
//!
//! Fatal problems (missing video files, unparsable JSON) are `EngineError`s raised
//! by the scene loader. Everything here is advisory: it is logged and the scene
//! stays in rotation.

use serde_json::Value;

use crate::{logi, logw};

#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub level: IssueLevel,
    pub path: String,
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueLevel {
    Warn,
    Error,
}

impl ValidationIssue {
    pub fn warn(path: impl Into<String>, message: impl Into<String>, hint: Option<String>) -> Self {
        Self { level: IssueLevel::Warn, path: path.into(), message: message.into(), hint }
    }
}

pub fn emit_issues(tag: &str, issues: &[ValidationIssue]) {
    for it in issues {
        let hint = it.hint.as_deref().map(|h| format!(" (hint: {h})")).unwrap_or_default();
        match it.level {
            IssueLevel::Warn => logw!(tag, "{}: {}{hint}", it.path, it.message),
            IssueLevel::Error => crate::loge!(tag, "{}: {}{hint}", it.path, it.message),
        }
    }
}

/// One line per manifest so the log shows validation ran.
pub fn emit_summary(tag: &str, label: &str, issues: &[ValidationIssue]) {
    let warns = issues.iter().filter(|i| i.level == IssueLevel::Warn).count();
    let errs = issues.iter().filter(|i| i.level == IssueLevel::Error).count();
    if errs == 0 && warns == 0 {
        logi!(tag, "validation: {label} OK (0 issues)");
    } else {
        logw!(tag, "validation: {label} issues found (errors={errs} warnings={warns})");
    }
}

/// Lint a parsed `scene.json`. `label` prefixes every issue path, e.g.
/// `scenes/eye/scene.json`.
pub fn lint_manifest(label: &str, manifest: &Value) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    let Some(variants) = manifest.as_object() else {
        // The loader reports this one as a hard error.
        return issues;
    };

    if !variants.contains_key("default") {
        let mut names: Vec<&str> = variants.keys().map(String::as_str).collect();
        names.sort_unstable();
        issues.push(ValidationIssue::warn(
            format!("{label}:/"),
            "no 'default' variant",
            Some(format!("scene start falls back to '{}'", names.first().copied().unwrap_or(""))),
        ));
    }

    for (name, variant) in variants {
        let base = format!("{label}:/{}", escape_ptr(name));
        let Some(fields) = variant.as_object() else {
            continue;
        };

        for key in fields.keys() {
            if key != "video" && key != "moves" {
                issues.push(ValidationIssue::warn(
                    format!("{base}/{}", escape_ptr(key)),
                    format!("unknown variant key '{key}'"),
                    Some("variants accept 'video' and 'moves'".into()),
                ));
            }
        }

        let Some(moves) = fields.get("moves").and_then(Value::as_array) else {
            continue;
        };
        for (i, step) in moves.iter().enumerate() {
            let duration = step.as_array().and_then(|s| s.get(2)).and_then(Value::as_f64);
            if matches!(duration, Some(d) if d <= 0.0) {
                issues.push(ValidationIssue::warn(
                    format!("{base}/moves/{i}"),
                    "non-positive move duration",
                    Some("the step will be reached instantly".into()),
                ));
            }
        }
    }

    issues
}

// JSON Pointer escaping for friendly paths
fn escape_ptr(s: &str) -> String {
    s.replace('~', "~0").replace('/', "~1")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clean_manifest_has_no_issues() {
        let m = json!({
            "default": { "video": "loop.mp4", "moves": [[0.2, 0.0, 2.0], [-0.2, 0.0, 2.0]] },
            "calm": { "video": "calm.mp4" }
        });
        assert!(lint_manifest("scenes/eye/scene.json", &m).is_empty());
    }

    #[test]
    fn missing_default_is_a_warning() {
        let m = json!({ "calm": { "video": "calm.mp4" } });
        let issues = lint_manifest("scene.json", &m);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].level, IssueLevel::Warn);
        assert_eq!(issues[0].path, "scene.json:/");
    }

    #[test]
    fn flags_bad_durations_and_unknown_keys() {
        let m = json!({
            "default": {
                "video": "loop.mp4",
                "speed": 2,
                "moves": [[0.0, 0.0, 1.0], [0.1, 0.0, 0.0], [0.2, 0.0, -1.0]]
            }
        });
        let paths: Vec<String> = lint_manifest("scenes/foo/scene.json", &m)
            .into_iter()
            .map(|i| i.path)
            .collect();
        assert_eq!(
            paths,
            vec![
                "scenes/foo/scene.json:/default/speed",
                "scenes/foo/scene.json:/default/moves/1",
                "scenes/foo/scene.json:/default/moves/2",
            ]
        );
    }

    #[test]
    fn escapes_pointer_segments() {
        assert_eq!(escape_ptr("a/b~c"), "a~1b~0c");
    }
}
