//! Side tables loaded once at startup: skip/ignore lists, explicit test
//! lists, per-group option tables, and the in-source environment comment.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::error::{RegressError, RegressResult};

/// Group whose members run with `--enable-force-gc=false`
pub const GROUP_NO_FORCE_GC: &str = "NO_FORCE_GC";

/// Group whose members run with `--enable-elements-kind=true`
pub const GROUP_ELEMENTS_KIND: &str = "ELEMENTS_KIND";

/// Comment prefix carrying per-test environment variables
pub const ENV_COMMENT_PREFIX: &str = "// Environment Variables:";

/// One block of a skip or ignore list file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListEntry {
    /// Why these files are listed
    pub reason: String,

    /// Corpus-relative test paths
    pub files: Vec<String>,
}

/// Load a skip or ignore list into a set of test ids.
///
/// Format: `[{"reason": "...", "files": ["regresstest/a.js", ...]}, ...]`.
pub fn load_id_set(path: &Path) -> RegressResult<HashSet<String>> {
    let content = std::fs::read_to_string(path).map_err(|err| RegressError::List {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    let entries: Vec<ListEntry> =
        serde_json::from_str(&content).map_err(|err| RegressError::List {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;

    let mut ids = HashSet::new();
    for entry in entries {
        tracing::debug!(reason = %entry.reason, count = entry.files.len(), "list block");
        ids.extend(entry.files);
    }
    Ok(ids)
}

/// Load an explicit test list: one corpus-relative path per line, blank
/// lines and `#` comments skipped.
pub fn load_test_list(path: &Path) -> RegressResult<Vec<String>> {
    let content = std::fs::read_to_string(path).map_err(|err| RegressError::List {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// Group-name → member-paths table driving per-test interpreter options
#[derive(Debug, Clone, Default)]
pub struct RegressGroups {
    groups: HashMap<String, HashSet<String>>,
}

impl RegressGroups {
    /// Load from a JSON object: `{"NO_FORCE_GC": ["regresstest/a.js"], ...}`
    pub fn load(path: &Path) -> RegressResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|err| RegressError::List {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        let raw: HashMap<String, Vec<String>> =
            serde_json::from_str(&content).map_err(|err| RegressError::List {
                path: path.to_path_buf(),
                reason: err.to_string(),
            })?;
        Ok(Self {
            groups: raw
                .into_iter()
                .map(|(name, files)| (name, files.into_iter().collect()))
                .collect(),
        })
    }

    pub fn contains(&self, group: &str, test_id: &str) -> bool {
        self.groups
            .get(group)
            .is_some_and(|members| members.contains(test_id))
    }
}

/// Extract `VAR=value` pairs from a `// Environment Variables:` comment line
/// in a test source. Locale tests use this to pin TZ and LC_ALL.
pub fn parse_env_comment(source: &str) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    for line in source.lines() {
        let Some(rest) = line.trim_start().strip_prefix(ENV_COMMENT_PREFIX) else {
            continue;
        };
        for pair in rest.split_whitespace() {
            if let Some((key, value)) = pair.split_once('=') {
                vars.insert(key.to_string(), value.to_string());
            }
        }
    }
    vars
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, content: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, "{}", content).unwrap();
        path
    }

    #[test]
    fn test_load_id_set() {
        let path = write_temp(
            "ark-regress-skip.json",
            r#"[
                {"reason": "flaky on qemu", "files": ["regresstest/a.js", "regresstest/b.js"]},
                {"reason": "needs icu 73", "files": ["regresstest/intl/c.js"]}
            ]"#,
        );
        let ids = load_id_set(&path).unwrap();
        assert_eq!(ids.len(), 3);
        assert!(ids.contains("regresstest/a.js"));
        assert!(ids.contains("regresstest/intl/c.js"));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_id_set_rejects_malformed() {
        let path = write_temp("ark-regress-skip-bad.json", r#"{"not": "an array"}"#);
        let err = load_id_set(&path).unwrap_err();
        assert!(matches!(err, RegressError::List { .. }));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_test_list_skips_comments() {
        let path = write_temp(
            "ark-regress-list.txt",
            "# curated subset\nregresstest/a.js\n\n  regresstest/b.js  \n",
        );
        let list = load_test_list(&path).unwrap();
        assert_eq!(list, vec!["regresstest/a.js", "regresstest/b.js"]);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_regress_groups() {
        let path = write_temp(
            "ark-regress-groups.json",
            r#"{"NO_FORCE_GC": ["regresstest/gc/a.js"], "ELEMENTS_KIND": []}"#,
        );
        let groups = RegressGroups::load(&path).unwrap();
        assert!(groups.contains(GROUP_NO_FORCE_GC, "regresstest/gc/a.js"));
        assert!(!groups.contains(GROUP_NO_FORCE_GC, "regresstest/other.js"));
        assert!(!groups.contains(GROUP_ELEMENTS_KIND, "regresstest/gc/a.js"));
        assert!(!groups.contains("UNKNOWN", "regresstest/gc/a.js"));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_parse_env_comment() {
        let source = "\
// Copyright something
// Environment Variables: TZ=Asia/Shanghai LC_ALL=zh_CN.UTF-8
print(new Date());
";
        let vars = parse_env_comment(source);
        assert_eq!(vars.get("TZ").map(String::as_str), Some("Asia/Shanghai"));
        assert_eq!(vars.get("LC_ALL").map(String::as_str), Some("zh_CN.UTF-8"));
    }

    #[test]
    fn test_parse_env_comment_absent() {
        assert!(parse_env_comment("print(1);\n").is_empty());
    }
}
