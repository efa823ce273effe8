//! Declaration linting - static analysis of schema declaration files.
//!
//! Checks declaration files for:
//! - JSON syntax errors (E001)
//! - Malformed declarations (E002)
//! - Unknown policy names (E003)
//! - Arguments a policy rejects (E004)
//! - Files that cannot be read (E005)
//! - Fields that declare nothing at all (W001)

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;

use crate::error::{ConfigError, LoadError};
use crate::loader::{load_json, parse_declaration, FieldDecl};
use crate::policy::Slot;
use crate::registry::PolicyRegistry;

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A single diagnostic message from linting.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: String,
    pub file: PathBuf,
    /// JSON path to the issue (e.g., "/fields/title/policies/0")
    pub path: String,
    pub message: String,
}

/// Result of linting a single file.
#[derive(Debug, Clone, Serialize)]
pub struct FileResult {
    pub file: PathBuf,
    pub status: FileStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

/// Status of a linted file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Ok,
    Error,
    Warning,
}

/// Result of linting a directory or set of files.
#[derive(Debug, Clone, Serialize)]
pub struct LintResult {
    pub path: PathBuf,
    pub files_checked: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub warnings: usize,
    pub results: Vec<FileResult>,
}

impl LintResult {
    /// Returns true if all files passed (no errors).
    pub fn is_ok(&self) -> bool {
        self.errors == 0
    }
}

/// Lint a declaration file or every `.json` file below a directory.
///
/// If `strict` is true, files with warnings count as failed.
pub fn lint(path: &Path, registry: &PolicyRegistry, strict: bool) -> LintResult {
    let files = collect_declaration_files(path);
    let mut results = Vec::new();
    let mut total_errors = 0;
    let mut total_warnings = 0;

    for file in &files {
        let file_result = lint_file(file, path, registry);
        total_errors += file_result
            .diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count();
        total_warnings += file_result
            .diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count();
        results.push(file_result);
    }

    let failed = results
        .iter()
        .filter(|r| {
            if strict {
                r.status != FileStatus::Ok
            } else {
                r.status == FileStatus::Error
            }
        })
        .count();

    LintResult {
        path: path.to_path_buf(),
        files_checked: files.len(),
        passed: files.len() - failed,
        failed,
        errors: total_errors,
        warnings: total_warnings,
        results,
    }
}

/// Lint a single declaration file.
pub fn lint_file(file: &Path, base_path: &Path, registry: &PolicyRegistry) -> FileResult {
    let mut diagnostics = Vec::new();

    match load_json(file) {
        Ok(declaration) => check_declaration(&declaration, file, "", registry, &mut diagnostics),
        Err(e) => {
            let (code, message) = match e {
                LoadError::InvalidJson { .. } => ("E001", format!("syntax error: {}", e)),
                other => ("E005", format!("read error: {}", other)),
            };
            diagnostics.push(Diagnostic {
                severity: Severity::Error,
                code: code.to_string(),
                file: file.to_path_buf(),
                path: "/".to_string(),
                message,
            });
        }
    }

    let has_errors = diagnostics.iter().any(|d| d.severity == Severity::Error);
    let has_warnings = diagnostics.iter().any(|d| d.severity == Severity::Warning);

    let status = if has_errors {
        FileStatus::Error
    } else if has_warnings {
        FileStatus::Warning
    } else {
        FileStatus::Ok
    };

    FileResult {
        file: file.strip_prefix(base_path).unwrap_or(file).to_path_buf(),
        status,
        diagnostics,
    }
}

fn check_declaration(
    declaration: &Value,
    file: &Path,
    path: &str,
    registry: &PolicyRegistry,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let fields = match parse_declaration(declaration, path) {
        Ok((_, fields)) => fields,
        Err(LoadError::InvalidDeclaration { path, message }) => {
            diagnostics.push(Diagnostic {
                severity: Severity::Error,
                code: "E002".to_string(),
                file: file.to_path_buf(),
                path,
                message,
            });
            return;
        }
        Err(other) => {
            diagnostics.push(Diagnostic {
                severity: Severity::Error,
                code: "E002".to_string(),
                file: file.to_path_buf(),
                path: if path.is_empty() { "/".to_string() } else { path.to_string() },
                message: other.to_string(),
            });
            return;
        }
    };

    for field in &fields {
        check_field(field, file, registry, diagnostics);
    }
}

fn check_field(
    field: &FieldDecl<'_>,
    file: &Path,
    registry: &PolicyRegistry,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if field.type_name.is_none()
        && field.default.is_none()
        && field.policies.is_empty()
        && field.schema.is_none()
    {
        diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            code: "W001".to_string(),
            file: file.to_path_buf(),
            path: field.path.clone(),
            message: format!("field \"{}\" declares no type, default, policies or schema", field.key),
        });
    }

    if let Some(name) = field.type_name {
        check_policy(
            name,
            Vec::new(),
            Slot::Type,
            &format!("{}/type", field.path),
            file,
            registry,
            diagnostics,
        );
    }

    for policy in &field.policies {
        check_policy(
            &policy.name,
            policy.args.clone(),
            Slot::Chain,
            &policy.path,
            file,
            registry,
            diagnostics,
        );
    }

    if let Some(nested) = field.schema {
        check_declaration(
            nested,
            file,
            &format!("{}/schema", field.path),
            registry,
            diagnostics,
        );
    }
}

fn check_policy(
    name: &str,
    args: Vec<Value>,
    slot: Slot,
    path: &str,
    file: &Path,
    registry: &PolicyRegistry,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let (code, message) = match registry.bind(name, args, slot) {
        Ok(_) => return,
        Err(e @ ConfigError::UnknownPolicy { .. }) => ("E003", e.to_string()),
        Err(e) => ("E004", e.to_string()),
    };
    diagnostics.push(Diagnostic {
        severity: Severity::Error,
        code: code.to_string(),
        file: file.to_path_buf(),
        path: path.to_string(),
        message,
    });
}

/// Collect all .json files from a path (file or directory).
fn collect_declaration_files(path: &Path) -> Vec<PathBuf> {
    if path.is_file() {
        return vec![path.to_path_buf()];
    }

    let mut files = Vec::new();
    collect_recursive(path, &mut files);
    files.sort();
    files
}

fn collect_recursive(dir: &Path, files: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_recursive(&path, files);
        } else if path.extension().map(|e| e == "json").unwrap_or(false) {
            files.push(path);
        }
    }
}
