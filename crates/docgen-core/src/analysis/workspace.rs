//! Heuristic repository analyzer.
//!
//! Surveys a checked-out repository without any model calls:
//! - file-type counts over the tree
//! - top-level modules (children of `crates/`, `packages/`, `src/`, `lib/`
//!   or the root, plus single-file modules directly under `src/`)
//! - module descriptions from a README or leading doc comment
//! - dependencies from textual references between modules

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use super::{AnalysisKind, AnalysisRequest, Analyzer};

const SKIP_DIRS: [&str; 5] = ["target", "node_modules", "__pycache__", "dist", "build"];
const CONTAINER_DIRS: [&str; 4] = ["crates", "packages", "src", "lib"];
const ENTRY_STEMS: [&str; 5] = ["main", "lib", "mod", "__init__", "index"];
const MAX_READ_BYTES: u64 = 256 * 1024;

fn language_of(path: &Path) -> Option<&'static str> {
    match path.extension()?.to_str()? {
        "rs" => Some("rust"),
        "py" => Some("python"),
        "js" | "jsx" | "mjs" => Some("javascript"),
        "ts" | "tsx" => Some("typescript"),
        "java" => Some("java"),
        "go" => Some("go"),
        _ => None,
    }
}

fn is_skipped(name: &str) -> bool {
    name.starts_with('.') || SKIP_DIRS.contains(&name)
}

/// Filesystem walker that never descends into hidden or build directories.
fn walk(root: &Path, max_depth: usize) -> impl Iterator<Item = walkdir::DirEntry> {
    WalkDir::new(root)
        .max_depth(max_depth)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_skipped(&e.file_name().to_string_lossy()))
        .filter_map(|e| e.ok())
}

#[derive(Debug, Clone)]
struct Module {
    name: String,
    rel_path: String,
    files: Vec<PathBuf>,
    language: Option<&'static str>,
    description: String,
    dependencies: BTreeSet<String>,
}

impl Module {
    fn to_component(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "dependencies": self.dependencies,
            "metadata": {
                "path": self.rel_path,
                "files": self.files.len(),
                "language": self.language,
            },
        })
    }
}

#[derive(Debug)]
struct Survey {
    project_name: String,
    root: PathBuf,
    extension_counts: BTreeMap<String, usize>,
    total_files: usize,
    modules: Vec<Module>,
}

/// Deterministic, model-free [`Analyzer`] over a local checkout.
#[derive(Debug, Clone)]
pub struct WorkspaceAnalyzer {
    max_depth: usize,
}

impl Default for WorkspaceAnalyzer {
    fn default() -> Self {
        Self {
            max_depth: crate::config::DEFAULT_ANALYZER_MAX_DEPTH,
        }
    }
}

impl WorkspaceAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    fn survey(&self, root: &Path, cancel: &CancellationToken) -> anyhow::Result<Survey> {
        if !root.is_dir() {
            bail!("repository root {} is not a directory", root.display());
        }

        let mut extension_counts = BTreeMap::new();
        let mut total_files = 0usize;
        for entry in walk(root, self.max_depth) {
            if cancel.is_cancelled() {
                bail!("analysis cancelled");
            }
            if !entry.file_type().is_file() {
                continue;
            }
            total_files += 1;
            let ext = entry
                .path()
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_else(|| "(none)".to_string());
            *extension_counts.entry(ext).or_insert(0) += 1;
        }

        let mut modules = self.discover_modules(root)?;
        link_dependencies(&mut modules, cancel)?;

        let project_name = root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "project".to_string());

        Ok(Survey {
            project_name,
            root: root.to_path_buf(),
            extension_counts,
            total_files,
            modules,
        })
    }

    fn discover_modules(&self, root: &Path) -> anyhow::Result<Vec<Module>> {
        let mut modules: BTreeMap<String, Module> = BTreeMap::new();

        let mut containers: Vec<PathBuf> = CONTAINER_DIRS
            .iter()
            .map(|d| root.join(d))
            .filter(|p| p.is_dir())
            .collect();
        containers.push(root.to_path_buf());

        for container in &containers {
            let children = std::fs::read_dir(container)
                .with_context(|| format!("failed to list {}", container.display()))?;
            for child in children.filter_map(|c| c.ok()) {
                let path = child.path();
                let name = child.file_name().to_string_lossy().to_string();
                if is_skipped(&name) || modules.contains_key(&name) {
                    continue;
                }

                if path.is_dir() {
                    if container == root && CONTAINER_DIRS.contains(&name.as_str()) {
                        continue;
                    }
                    let files: Vec<PathBuf> = walk(&path, self.max_depth)
                        .filter(|e| e.file_type().is_file() && language_of(e.path()).is_some())
                        .map(|e| e.into_path())
                        .collect();
                    if files.is_empty() {
                        continue;
                    }
                    let module = build_module(root, &path, name.clone(), files);
                    modules.insert(name, module);
                } else if container.ends_with("src") && language_of(&path).is_some() {
                    let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().to_string())
                    else {
                        continue;
                    };
                    if ENTRY_STEMS.contains(&stem.as_str()) || modules.contains_key(&stem) {
                        continue;
                    }
                    let module = build_module(root, &path, stem.clone(), vec![path.clone()]);
                    modules.insert(stem, module);
                }
            }
        }

        Ok(modules.into_values().collect())
    }
}

fn build_module(root: &Path, path: &Path, name: String, mut files: Vec<PathBuf>) -> Module {
    files.sort();
    let language = dominant_language(&files);
    let rel_path = path
        .strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/");
    let description = describe(path, &files).unwrap_or_else(|| {
        format!(
            "{} module at {} ({} files)",
            language.unwrap_or("source"),
            rel_path,
            files.len()
        )
    });
    Module {
        name,
        rel_path,
        files,
        language,
        description,
        dependencies: BTreeSet::new(),
    }
}

fn dominant_language(files: &[PathBuf]) -> Option<&'static str> {
    let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    for lang in files.iter().filter_map(|f| language_of(f)) {
        *counts.entry(lang).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(a.0)))
        .map(|(lang, _)| lang)
}

fn read_limited(path: &Path) -> Option<String> {
    let meta = std::fs::metadata(path).ok()?;
    if meta.len() > MAX_READ_BYTES {
        return None;
    }
    std::fs::read_to_string(path).ok()
}

/// First prose line of a README in `path`, else the first doc-comment line.
fn describe(path: &Path, files: &[PathBuf]) -> Option<String> {
    if path.is_dir() {
        if let Some(readme) = read_limited(&path.join("README.md")) {
            if let Some(line) = readme
                .lines()
                .map(str::trim)
                .find(|l| !l.is_empty() && !l.starts_with('#'))
            {
                return Some(line.to_string());
            }
        }
    }

    for file in files {
        let Some(source) = read_limited(file) else {
            continue;
        };
        for line in source.lines().map(str::trim) {
            for marker in ["//!", "///", "\"\"\"", "#", "/**", "*"] {
                if let Some(rest) = line.strip_prefix(marker) {
                    let rest = rest.trim().trim_end_matches("\"\"\"").trim_end_matches("*/").trim();
                    if !rest.is_empty() && !rest.starts_with('!') && !rest.starts_with('[') {
                        return Some(rest.to_string());
                    }
                }
            }
            if !line.is_empty() {
                break;
            }
        }
    }
    None
}

/// True if `haystack` contains `needle` delimited by non-identifier chars.
fn mentions(haystack: &str, needle: &str) -> bool {
    let is_ident = |c: char| c.is_alphanumeric() || c == '_';
    haystack.match_indices(needle).any(|(idx, _)| {
        let before = haystack[..idx].chars().next_back();
        let after = haystack[idx + needle.len()..].chars().next();
        !before.is_some_and(is_ident) && !after.is_some_and(is_ident)
    })
}

fn link_dependencies(modules: &mut [Module], cancel: &CancellationToken) -> anyhow::Result<()> {
    let names: Vec<String> = modules.iter().map(|m| m.name.clone()).collect();
    for module in modules.iter_mut() {
        let mut deps = BTreeSet::new();
        for file in &module.files {
            if cancel.is_cancelled() {
                bail!("analysis cancelled");
            }
            let Some(source) = read_limited(file) else {
                continue;
            };
            for other in names.iter().filter(|n| **n != module.name) {
                let snake = other.replace('-', "_");
                if mentions(&source, other) || mentions(&source, &snake) {
                    deps.insert(other.clone());
                }
            }
        }
        module.dependencies = deps;
    }
    Ok(())
}

fn architecture_markdown(survey: &Survey) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {} architecture\n", survey.project_name);
    let _ = writeln!(
        out,
        "{} files, {} top-level modules.\n",
        survey.total_files,
        survey.modules.len()
    );

    let _ = writeln!(out, "## File types\n");
    for (ext, count) in &survey.extension_counts {
        let _ = writeln!(out, "- `{ext}`: {count}");
    }

    let _ = writeln!(out, "\n## Modules\n");
    for module in &survey.modules {
        let _ = writeln!(out, "- **{}** (`{}`): {}", module.name, module.rel_path, module.description);
    }

    let _ = writeln!(out, "\n## Dependency graph\n\n```mermaid\ngraph TD");
    for module in &survey.modules {
        if module.dependencies.is_empty() {
            let _ = writeln!(out, "    {}", module.name);
        }
        for dep in &module.dependencies {
            let _ = writeln!(out, "    {} --> {}", module.name, dep);
        }
    }
    let _ = writeln!(out, "```");
    out
}

fn component_markdown(survey: &Survey, module: &Module) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {}\n\n{}\n", module.name, module.description);
    let _ = writeln!(out, "## Files\n");
    for file in &module.files {
        let rel = file.strip_prefix(&survey.root).unwrap_or(file);
        let _ = writeln!(out, "- `{}`", rel.display());
    }
    if !module.dependencies.is_empty() {
        let _ = writeln!(out, "\n## Depends on\n");
        for dep in &module.dependencies {
            let _ = writeln!(out, "- {dep}");
        }
    }
    let dependents: Vec<&str> = survey
        .modules
        .iter()
        .filter(|m| m.dependencies.contains(&module.name))
        .map(|m| m.name.as_str())
        .collect();
    if !dependents.is_empty() {
        let _ = writeln!(out, "\n## Used by\n");
        for name in dependents {
            let _ = writeln!(out, "- {name}");
        }
    }
    out
}

fn usage_markdown(survey: &Survey) -> String {
    if let Some(readme) = read_limited(&survey.root.join("README.md")) {
        if !readme.trim().is_empty() {
            return readme;
        }
    }

    let mut out = String::new();
    let _ = writeln!(out, "# Using {}\n", survey.project_name);
    let manifests = [
        ("Cargo.toml", "cargo build --release"),
        ("package.json", "npm install"),
        ("pyproject.toml", "pip install ."),
        ("requirements.txt", "pip install -r requirements.txt"),
        ("go.mod", "go build ./..."),
    ];
    let steps: Vec<&str> = manifests
        .iter()
        .filter(|(file, _)| survey.root.join(file).is_file())
        .map(|(_, cmd)| *cmd)
        .collect();
    if steps.is_empty() {
        let _ = writeln!(out, "No build manifest detected.");
    } else {
        let _ = writeln!(out, "## Build\n\n```sh");
        for step in steps {
            let _ = writeln!(out, "{step}");
        }
        let _ = writeln!(out, "```");
    }
    out
}

fn payload(components: Vec<Value>, fragments: Vec<Value>) -> Map<String, Value> {
    let mut out = Map::new();
    out.insert("components".to_string(), Value::Array(components));
    out.insert("fragments".to_string(), Value::Array(fragments));
    out
}

impl WorkspaceAnalyzer {
    fn analyze_blocking(
        &self,
        request: AnalysisRequest,
        cancel: CancellationToken,
    ) -> anyhow::Result<Map<String, Value>> {
        let survey = self.survey(&request.repository_root, &cancel)?;

        match request.kind {
            AnalysisKind::Architecture => Ok(payload(
                survey.modules.iter().map(Module::to_component).collect(),
                vec![json!({"kind": "architecture", "content": architecture_markdown(&survey)})],
            )),
            AnalysisKind::Component { name } => {
                let Some(module) = survey
                    .modules
                    .iter()
                    .find(|m| m.name.eq_ignore_ascii_case(&name))
                else {
                    bail!("component {name} not found in repository");
                };
                Ok(payload(
                    vec![module.to_component()],
                    vec![json!({
                        "kind": "component",
                        "component": module.name,
                        "content": component_markdown(&survey, module),
                    })],
                ))
            }
            AnalysisKind::Usage => Ok(payload(
                Vec::new(),
                vec![json!({"kind": "usage", "content": usage_markdown(&survey)})],
            )),
        }
    }
}

#[async_trait]
impl Analyzer for WorkspaceAnalyzer {
    async fn analyze(
        &self,
        request: AnalysisRequest,
        cancel: CancellationToken,
    ) -> anyhow::Result<Map<String, Value>> {
        let analyzer = self.clone();
        tokio::task::spawn_blocking(move || analyzer.analyze_blocking(request, cancel)).await?
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("storage")).unwrap();
        fs::write(dir.path().join("Cargo.toml"), "[package]\nname = \"demo\"\n").unwrap();
        fs::write(src.join("main.rs"), "mod cache;\nmod storage;\nfn main() {}\n").unwrap();
        fs::write(
            src.join("cache.rs"),
            "//! In-memory LRU cache\nuse crate::storage::Disk;\n",
        )
        .unwrap();
        fs::write(src.join("storage").join("mod.rs"), "pub struct Disk;\n").unwrap();
        fs::write(
            src.join("storage").join("README.md"),
            "# Storage\n\nDisk-backed persistence.\n",
        )
        .unwrap();
        dir
    }

    fn request(kind: AnalysisKind, root: &Path) -> AnalysisRequest {
        AnalysisRequest {
            kind,
            repository_root: root.to_path_buf(),
            input: Map::new(),
        }
    }

    #[test]
    fn test_mentions_respects_identifier_boundaries() {
        assert!(mentions("use crate::storage::Disk;", "storage"));
        assert!(!mentions("let storage_engine = 1;", "storage"));
        assert!(!mentions("cachemanager", "cache"));
    }

    #[tokio::test]
    async fn test_architecture_finds_modules_and_edges() {
        let dir = fixture();
        let out = WorkspaceAnalyzer::new()
            .analyze(request(AnalysisKind::Architecture, dir.path()), CancellationToken::new())
            .await
            .unwrap();

        let components = out["components"].as_array().unwrap();
        let names: Vec<&str> = components
            .iter()
            .map(|c| c["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["cache", "storage"]);

        assert_eq!(components[0]["description"], "In-memory LRU cache");
        assert_eq!(components[0]["dependencies"], json!(["storage"]));
        assert_eq!(components[1]["description"], "Disk-backed persistence.");

        let fragment = &out["fragments"][0];
        assert_eq!(fragment["kind"], "architecture");
        assert!(fragment["content"].as_str().unwrap().contains("cache --> storage"));
    }

    #[tokio::test]
    async fn test_component_lookup_is_case_insensitive() {
        let dir = fixture();
        let out = WorkspaceAnalyzer::new()
            .analyze(
                request(
                    AnalysisKind::Component {
                        name: "Storage".to_string(),
                    },
                    dir.path(),
                ),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(out["fragments"][0]["component"], "storage");
        assert!(out["fragments"][0]["content"]
            .as_str()
            .unwrap()
            .contains("## Used by"));
    }

    #[tokio::test]
    async fn test_unknown_component_errors() {
        let dir = fixture();
        let err = WorkspaceAnalyzer::new()
            .analyze(
                request(
                    AnalysisKind::Component {
                        name: "Nope".to_string(),
                    },
                    dir.path(),
                ),
                CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn test_usage_without_readme_lists_build_steps() {
        let dir = fixture();
        let out = WorkspaceAnalyzer::new()
            .analyze(request(AnalysisKind::Usage, dir.path()), CancellationToken::new())
            .await
            .unwrap();
        let content = out["fragments"][0]["content"].as_str().unwrap();
        assert!(content.contains("cargo build --release"));
    }

    #[tokio::test]
    async fn test_cancelled_analysis_stops() {
        let dir = fixture();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = WorkspaceAnalyzer::new()
            .analyze(request(AnalysisKind::Architecture, dir.path()), cancel)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cancelled"));
    }

    #[tokio::test]
    async fn test_missing_root_errors() {
        let err = WorkspaceAnalyzer::new()
            .analyze(
                request(AnalysisKind::Usage, Path::new("/definitely/not/here")),
                CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not a directory"));
    }
}
