use serde::{Deserialize, Serialize};

use crate::completion::decode::decode_json_object;
use crate::errors::ParseError;

/// One proposed edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum FileChange {
    /// Replace the first exact occurrence of `original` with `replacement`.
    Modify {
        path: String,
        original: String,
        replacement: String,
    },
    /// Write the whole file.
    Create { path: String, content: String },
}

impl FileChange {
    pub fn path(&self) -> &str {
        match self {
            FileChange::Modify { path, .. } | FileChange::Create { path, .. } => path,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FixDescriptor {
    pub changes: Vec<FileChange>,
    pub explanation: String,
}

#[derive(Debug, Deserialize)]
struct RawDescriptor {
    #[serde(default)]
    changes: Vec<RawChange>,
    #[serde(default)]
    explanation: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawChange {
    path: Option<String>,
    action: Option<String>,
    original: Option<String>,
    replacement: Option<String>,
    content: Option<String>,
}

impl RawChange {
    fn validate(self) -> Result<FileChange, String> {
        let path = self
            .path
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .ok_or("missing path")?;
        match self.action.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("modify") => match (self.original, self.replacement) {
                (Some(original), Some(replacement)) if !original.is_empty() => Ok(FileChange::Modify {
                    path,
                    original,
                    replacement,
                }),
                _ => Err(format!("modify of {} needs original and replacement", path)),
            },
            Some("create") => self
                .content
                .map(|content| FileChange::Create {
                    path: path.clone(),
                    content,
                })
                .ok_or_else(|| format!("create of {} needs content", path)),
            other => Err(format!("unsupported action {:?} for {}", other, path)),
        }
    }
}

impl FixDescriptor {
    /// Decode completion output. Entries that break the shape contract are
    /// dropped with a warning; a descriptor with no usable entry is an error.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let raw: RawDescriptor = decode_json_object(text, "fix descriptor")?;

        let mut changes = Vec::with_capacity(raw.changes.len());
        for entry in raw.changes {
            match entry.validate() {
                Ok(change) => changes.push(change),
                Err(reason) => tracing::warn!(%reason, "Dropping invalid file change"),
            }
        }

        if changes.is_empty() {
            return Err(ParseError::new("fix descriptor", "no valid changes"));
        }

        Ok(Self {
            changes,
            explanation: raw.explanation.unwrap_or_default().trim().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fenced_descriptor() {
        let text = r#"Here is the fix:
```json
{
  "changes": [
    {"path": "src/A.java", "action": "modify", "original": "int x = 1;", "replacement": "int x = 2;"},
    {"path": "src/B.java", "action": "create", "content": "class B { }"}
  ],
  "explanation": "Bumps x and adds B."
}
```"#;
        let descriptor = FixDescriptor::parse(text).unwrap();
        assert_eq!(descriptor.changes.len(), 2);
        assert_eq!(
            descriptor.changes[0],
            FileChange::Modify {
                path: "src/A.java".into(),
                original: "int x = 1;".into(),
                replacement: "int x = 2;".into(),
            }
        );
        assert_eq!(descriptor.changes[1].path(), "src/B.java");
        assert_eq!(descriptor.explanation, "Bumps x and adds B.");
    }

    #[test]
    fn test_parse_unfenced_with_braces_in_code() {
        let text = r#"{"changes": [{"path": "A.java", "action": "create", "content": "class A { void f() { } }"}], "explanation": "x"}"#;
        let descriptor = FixDescriptor::parse(text).unwrap();
        assert_eq!(
            descriptor.changes[0],
            FileChange::Create {
                path: "A.java".into(),
                content: "class A { void f() { } }".into(),
            }
        );
    }

    #[test]
    fn test_invalid_entries_dropped() {
        let text = r#"{"changes": [
            {"path": "A.java", "action": "modify", "original": "a"},
            {"path": "B.java", "action": "delete"},
            {"action": "create", "content": "x"},
            {"path": "C.java", "action": "CREATE", "content": ""}
        ]}"#;
        let descriptor = FixDescriptor::parse(text).unwrap();
        assert_eq!(descriptor.changes.len(), 1);
        assert_eq!(descriptor.changes[0].path(), "C.java");
        assert_eq!(descriptor.explanation, "");
    }

    #[test]
    fn test_no_valid_changes_is_error() {
        let err = FixDescriptor::parse(r#"{"changes": [], "explanation": "nothing to do"}"#).unwrap_err();
        assert_eq!(err.what, "fix descriptor");
        assert!(FixDescriptor::parse("I cannot help with that").is_err());
    }

    #[test]
    fn test_serializes_with_action_tag() {
        let change = FileChange::Create {
            path: "a".into(),
            content: "b".into(),
        };
        let json = serde_json::to_value(&change).unwrap();
        assert_eq!(json["action"], "create");
        assert_eq!(json["path"], "a");
    }
}
