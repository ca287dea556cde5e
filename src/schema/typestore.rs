//! Type store for user-declared message definitions.
//!
//! A `TypeStore` is an explicit value owned by the caller: it scans
//! directories of `.msg` files, and `find` assembles the full schema text for
//! a type, with every transitively referenced sub-schema appended behind
//! `MSG:` separators. There is no process-global store.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::core::{CodecError, Result};
use crate::schema::ast::{normalize_name, short_name};
use crate::schema::parser::{strip_comment, Dialect};

/// A named schema text, ready to be parsed or embedded in a container.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaText {
    /// Type name in the store's dialect form
    pub name: String,
    /// Full schema text including sub-schema blocks
    pub text: String,
}

#[derive(Debug, Clone)]
struct MsgDefinition {
    text: String,
    #[allow(dead_code)]
    path: PathBuf,
}

/// Resolves message names to full schema texts from user-provided .msg trees.
pub struct TypeStore {
    dialect: Dialect,
    /// Definitions keyed by normalized (`pkg/msg/Short`) name
    messages: HashMap<String, MsgDefinition>,
}

fn field_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\S+)(\s+)(\S+)(.*)$").unwrap())
}

const PRIMITIVES: &[&str] = &[
    "bool", "byte", "char", "int8", "uint8", "int16", "uint16", "int32", "uint32", "int64",
    "uint64", "float32", "float64", "string", "wstring",
];

const ROS1_PRIMITIVES: &[&str] = &["time", "duration"];

impl TypeStore {
    /// Create an empty store for the given dialect.
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            messages: HashMap::new(),
        }
    }

    /// The store's dialect.
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Add a directory of message definitions.
    ///
    /// Three layouts are recognized:
    /// 1. a folder of `.msg` files (folder name is the package name);
    /// 2. a folder with a `msg/` subfolder of `.msg` files;
    /// 3. a folder whose subfolders match 1 or 2.
    ///
    /// Later additions override earlier ones.
    pub fn add_path<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        if !path.is_dir() {
            return Err(CodecError::unsupported(format!(
                "type store path is not a directory: {}",
                path.display()
            )));
        }
        self.scan(path)
    }

    fn scan(&mut self, path: &Path) -> Result<()> {
        let msg_files = list_msg_files(path)?;
        if !msg_files.is_empty() {
            let package = dir_name(path)?;
            for file in msg_files {
                self.add_msg_file(&package, &file)?;
            }
            return Ok(());
        }

        let msg_subdir = path.join("msg");
        if msg_subdir.is_dir() {
            let msg_files = list_msg_files(&msg_subdir)?;
            if !msg_files.is_empty() {
                let package = dir_name(path)?;
                for file in msg_files {
                    self.add_msg_file(&package, &file)?;
                }
                return Ok(());
            }
        }

        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            if entry.path().is_dir() {
                self.scan(&entry.path())?;
            }
        }
        Ok(())
    }

    fn add_msg_file(&mut self, package: &str, file: &Path) -> Result<()> {
        let stem = file
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| CodecError::unsupported(format!("bad .msg path: {}", file.display())))?;
        let text = std::fs::read_to_string(file)?;
        let full_name = format!("{package}/msg/{stem}");
        self.messages.insert(
            full_name,
            MsgDefinition {
                text,
                path: file.to_path_buf(),
            },
        );
        Ok(())
    }

    /// List all known message names (normalized form).
    pub fn list_messages(&self) -> Vec<&str> {
        self.messages.keys().map(|k| k.as_str()).collect()
    }

    /// True if the store holds a definition for `name`.
    pub fn contains(&self, name: &str) -> bool {
        normalize_name(name)
            .map(|n| self.messages.contains_key(&n))
            .unwrap_or(false)
    }

    /// Find a message and assemble its full schema text.
    pub fn find(&self, name: &str) -> Result<SchemaText> {
        let normalized = normalize_name(name)?;
        if !self.messages.contains_key(&normalized) {
            return Err(CodecError::type_not_found(name));
        }

        let mut dependencies = Vec::new();
        let mut seen = HashSet::from([normalized.clone()]);
        let mut stack = HashSet::from([normalized.clone()]);
        let main_text = self.collect_dependencies(
            &self.messages[&normalized].text,
            package_of(&normalized),
            &mut dependencies,
            &mut seen,
            &mut stack,
        )?;

        let mut parts = vec![main_text.trim_end().to_string()];
        for dep in dependencies {
            let dep_text = self
                .messages
                .get(&dep)
                .ok_or_else(|| CodecError::type_not_found(&dep))?;
            parts.push("=".repeat(80));
            parts.push(format!("MSG: {}", short_name(&dep)));
            parts.push(clean_msg_text(&dep_text.text).trim_end().to_string());
        }

        Ok(SchemaText {
            name: self.output_name(&normalized),
            text: parts.join("\n") + "\n",
        })
    }

    fn output_name(&self, normalized: &str) -> String {
        match self.dialect {
            Dialect::Ros1 => short_name(normalized),
            Dialect::Ros2 => normalized.to_string(),
        }
    }

    /// Walk a message text, qualifying complex type references and recording
    /// dependencies depth-first.
    fn collect_dependencies(
        &self,
        text: &str,
        package: &str,
        dependencies: &mut Vec<String>,
        seen: &mut HashSet<String>,
        stack: &mut HashSet<String>,
    ) -> Result<String> {
        let mut out_lines = Vec::new();
        for line in clean_msg_text(text).lines() {
            let stripped = line.trim();
            if stripped.is_empty() {
                continue;
            }

            let caps = match field_line_re().captures(stripped) {
                Some(c) => c,
                None => {
                    out_lines.push(line.to_string());
                    continue;
                }
            };
            let field_type = caps.get(1).unwrap().as_str();
            let space = caps.get(2).unwrap().as_str();
            let field_name = caps.get(3).unwrap().as_str();
            let rest = caps.get(4).unwrap().as_str();

            // Strip array suffix and string bound to inspect the bare type.
            let (bare, array_suffix) = match field_type.find('[') {
                Some(pos) => (&field_type[..pos], &field_type[pos..]),
                None => (field_type, ""),
            };
            let bare_no_bound = bare.split("<=").next().unwrap_or(bare);

            if PRIMITIVES.contains(&bare_no_bound) {
                out_lines.push(line.to_string());
                continue;
            }
            if ROS1_PRIMITIVES.contains(&bare_no_bound) {
                match self.dialect {
                    Dialect::Ros1 => {
                        out_lines.push(line.to_string());
                        continue;
                    }
                    Dialect::Ros2 => {
                        return Err(CodecError::malformed_schema(
                            package,
                            format!(
                                "ROS1 primitive '{bare_no_bound}' cannot be used with a ros2msg store"
                            ),
                        ))
                    }
                }
            }

            let full_type = if bare_no_bound == "Header" {
                "std_msgs/msg/Header".to_string()
            } else if !bare_no_bound.contains('/') {
                format!("{package}/msg/{bare_no_bound}")
            } else {
                normalize_name(bare_no_bound)?
            };

            if stack.contains(&full_type) {
                return Err(CodecError::malformed_schema(
                    &full_type,
                    "circular complex reference",
                ));
            }

            let qualified = format!("{}{array_suffix}", short_name(&full_type));
            out_lines.push(format!("{qualified}{space}{field_name}{rest}"));

            if seen.insert(full_type.clone()) {
                dependencies.push(full_type.clone());
                if let Some(dep) = self.messages.get(&full_type) {
                    stack.insert(full_type.clone());
                    // Depth-first so a dependency's own dependencies follow it.
                    let dep_package = package_of(&full_type).to_string();
                    self.collect_dependencies(
                        &dep.text,
                        &dep_package,
                        dependencies,
                        seen,
                        stack,
                    )?;
                    stack.remove(&full_type);
                } else {
                    return Err(CodecError::type_not_found(&full_type));
                }
            }
        }
        Ok(out_lines.join("\n"))
    }
}

fn package_of(normalized: &str) -> &str {
    normalized.split('/').next().unwrap_or(normalized)
}

fn dir_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_string())
        .ok_or_else(|| {
            CodecError::unsupported(format!("cannot derive package name from {}", path.display()))
        })
}

fn list_msg_files(path: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        let p = entry.path();
        if p.is_file() && p.extension().and_then(|e| e.to_str()) == Some("msg") {
            files.push(p);
        }
    }
    files.sort();
    Ok(files)
}

/// Remove comments and blank lines from .msg text.
fn clean_msg_text(text: &str) -> String {
    let mut lines = Vec::new();
    for line in text.lines() {
        let cleaned = strip_comment(line);
        if !cleaned.trim().is_empty() {
            lines.push(cleaned.to_string());
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "roslog-typestore-{tag}-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_flat_package_layout() {
        let dir = temp_dir("flat");
        let pkg = dir.join("my_msgs");
        fs::create_dir_all(&pkg).unwrap();
        fs::write(pkg.join("Simple.msg"), "int32 value\n").unwrap();

        let mut store = TypeStore::new(Dialect::Ros2);
        store.add_path(&pkg).unwrap();
        assert!(store.contains("my_msgs/msg/Simple"));
        let schema = store.find("my_msgs/Simple").unwrap();
        assert_eq!(schema.name, "my_msgs/msg/Simple");
        assert!(schema.text.contains("int32 value"));
    }

    #[test]
    fn test_msg_subfolder_layout() {
        let dir = temp_dir("sub");
        let pkg = dir.join("my_msgs").join("msg");
        fs::create_dir_all(&pkg).unwrap();
        fs::write(pkg.join("Simple.msg"), "int32 value\n").unwrap();

        let mut store = TypeStore::new(Dialect::Ros2);
        store.add_path(dir.join("my_msgs")).unwrap();
        assert!(store.contains("my_msgs/Simple"));
    }

    #[test]
    fn test_dependency_expansion() {
        let dir = temp_dir("deps");
        let pkg = dir.join("my_msgs");
        fs::create_dir_all(&pkg).unwrap();
        fs::write(pkg.join("Outer.msg"), "Inner nested\nint32 x\n").unwrap();
        fs::write(pkg.join("Inner.msg"), "float64 y\n").unwrap();

        let mut store = TypeStore::new(Dialect::Ros2);
        store.add_path(&pkg).unwrap();
        let schema = store.find("my_msgs/msg/Outer").unwrap();
        assert!(schema.text.contains("my_msgs/Inner nested"));
        assert!(schema.text.contains("MSG: my_msgs/Inner"));
        assert!(schema.text.contains(&"=".repeat(80)));
        // The assembled text must parse.
        crate::schema::parser::parse_schema_auto(&schema.name, &schema.text).unwrap();
    }

    #[test]
    fn test_circular_dependency_rejected() {
        let dir = temp_dir("cycle");
        let pkg = dir.join("my_msgs");
        fs::create_dir_all(&pkg).unwrap();
        fs::write(pkg.join("A.msg"), "B other\n").unwrap();
        fs::write(pkg.join("B.msg"), "A other\n").unwrap();

        let mut store = TypeStore::new(Dialect::Ros2);
        store.add_path(&pkg).unwrap();
        assert!(store.find("my_msgs/A").is_err());
    }

    #[test]
    fn test_missing_type() {
        let store = TypeStore::new(Dialect::Ros2);
        assert!(matches!(
            store.find("nope/msg/Missing"),
            Err(CodecError::TypeNotFound { .. })
        ));
    }

    #[test]
    fn test_ros1_time_rejected_under_ros2() {
        let dir = temp_dir("ros1prim");
        let pkg = dir.join("my_msgs");
        fs::create_dir_all(&pkg).unwrap();
        fs::write(pkg.join("Stamped.msg"), "time stamp\n").unwrap();

        let mut store = TypeStore::new(Dialect::Ros2);
        store.add_path(&pkg).unwrap();
        assert!(store.find("my_msgs/Stamped").is_err());

        let mut ros1_store = TypeStore::new(Dialect::Ros1);
        ros1_store.add_path(&pkg).unwrap();
        let schema = ros1_store.find("my_msgs/Stamped").unwrap();
        assert_eq!(schema.name, "my_msgs/Stamped");
    }
}
