//! C6 - Module loader.
//!
//! `use`/`use_as`/`use_with` pull another `.franz` file's top-level
//! bindings into the importing module. The loader tracks an import
//! stack of `(module path, line)` pairs so a cycle can be reported with
//! the full chain rather than just "import failed"; depth is capped so
//! a pathological or accidentally-cyclic chain fails fast instead of
//! blowing the stack. Grounded in `why_lib`'s `src/loader/mod.rs`,
//! generalized with the cycle detection that module actually lacks.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::ast::Node;
use crate::error::{CapabilityDenied, CircularImport, FranzError, ParseError};
use crate::lexer::lex;
use crate::parser::parse;
use crate::span::Span;

/// Capabilities a module may request via `use_with`. Anything outside
/// this list is rejected with `CapabilityDenied` before the imported
/// module's code ever runs.
const KNOWN_CAPABILITIES: &[&str] = &["io", "math", "fs"];

const MAX_IMPORT_DEPTH: usize = 256;

#[derive(Debug, Clone)]
struct ImportFrame {
    module_path: String,
    line: usize,
}

/// Loads and caches every module reachable (by `use`) from an entry
/// file, failing on the first circular or over-deep import chain.
pub struct Loader {
    root: PathBuf,
    stack: Vec<ImportFrame>,
    loaded: HashMap<String, Vec<Node>>,
    finish_order: Vec<String>,
    granted_capabilities: HashMap<String, Vec<String>>,
}

impl Loader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            stack: Vec::new(),
            loaded: HashMap::new(),
            finish_order: Vec::new(),
            granted_capabilities: HashMap::new(),
        }
    }

    /// Load the entry file and every module it (transitively) imports.
    /// Returns the flattened list of modules in load order, the entry
    /// file last.
    pub fn load_entry(&mut self, entry: &str) -> Result<Vec<(String, Vec<Node>)>, FranzError> {
        self.load_module(entry, 0)?;
        let mut modules: Vec<(String, Vec<Node>)> =
            self.loaded.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        modules.sort_by_key(|(path, _)| self.stack_order(path));
        Ok(modules)
    }

    /// Position in `finish_order`: a module's imports finish loading
    /// (and so get pushed here) before the module itself does, since
    /// `load_module` records its own path only after recursing into
    /// every `use` it contains. This makes the resulting order
    /// deterministic across runs instead of HashMap iteration order.
    fn stack_order(&self, path: &str) -> usize {
        self.finish_order.iter().position(|p| p == path).unwrap_or(usize::MAX)
    }

    /// Parse `path` if it hasn't been already, pushing it onto the
    /// import stack for the duration so a cycle reached from deeper in
    /// the chain can report every frame back to the original import.
    fn load_module(&mut self, path: &str, line: usize) -> Result<(), FranzError> {
        let canonical = self.canonicalize(path);

        if let Some(position) = self.stack.iter().position(|f| f.module_path == canonical) {
            let mut chain: Vec<String> = self.stack[position..].iter().map(|f| f.module_path.clone()).collect();
            chain.push(canonical.clone());
            return Err(FranzError::CircularImport(CircularImport { chain }, Span::new(path, line)));
        }

        if self.stack.len() >= MAX_IMPORT_DEPTH {
            return Err(FranzError::CircularImport(
                CircularImport { chain: self.stack.iter().map(|f| f.module_path.clone()).collect() },
                Span::new(path, line),
            ));
        }

        if self.loaded.contains_key(&canonical) {
            return Ok(());
        }

        self.stack.push(ImportFrame { module_path: canonical.clone(), line });

        let source = fs::read_to_string(&canonical).map_err(|e| {
            FranzError::Parse(
                ParseError { message: format!("cannot read module '{canonical}': {e}") },
                Span::new(path, line),
            )
        })?;
        let tokens = lex(&canonical, &source)?;
        let mut nodes = parse(&canonical, tokens)?;

        for node in nodes.iter_mut() {
            self.resolve_imports_in(node)?;
        }

        self.loaded.insert(canonical.clone(), nodes);
        self.finish_order.push(canonical);
        self.stack.pop();
        Ok(())
    }

    /// Walk a node looking for `use`/`use_as`/`use_with` applications
    /// and recursively load what they name. Rewrites nothing in the
    /// AST itself - the generator resolves imported names by looking
    /// them up in the flattened module list the driver hands it.
    fn resolve_imports_in(&mut self, node: &mut Node) -> Result<(), FranzError> {
        use crate::ast::Opcode;
        if node.opcode == Opcode::Application {
            match node.value.as_str() {
                "use" | "use_as" => {
                    if let Some(path_node) = node.children.first() {
                        let imported = self.resolve_relative(&path_node.value);
                        self.load_module(&imported, node.line)?;
                    }
                }
                "use_with" => {
                    if let (Some(path_node), Some(cap_node)) = (node.children.first(), node.children.get(1)) {
                        let capability = cap_node.value.clone();
                        if !KNOWN_CAPABILITIES.contains(&capability.as_str()) {
                            return Err(FranzError::CapabilityDenied(
                                CapabilityDenied { capability, module: path_node.value.clone() },
                                Span::new(&path_node.value, node.line),
                            ));
                        }
                        let imported = self.resolve_relative(&path_node.value);
                        self.granted_capabilities.entry(imported.clone()).or_default().push(capability);
                        self.load_module(&imported, node.line)?;
                    }
                }
                _ => {}
            }
        }
        for child in node.children.iter_mut() {
            self.resolve_imports_in(child)?;
        }
        Ok(())
    }

    fn resolve_relative(&self, import_path: &str) -> String {
        let candidate = Path::new(import_path);
        if candidate.is_absolute() {
            candidate.to_string_lossy().into_owned()
        } else {
            self.root
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(candidate)
                .to_string_lossy()
                .into_owned()
        }
    }

    fn canonicalize(&self, path: &str) -> String {
        fs::canonicalize(path).map(|p| p.to_string_lossy().into_owned()).unwrap_or_else(|_| path.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn loads_a_single_module_with_no_imports() {
        let dir = std::env::temp_dir().join("franz_loader_test_single");
        fs::create_dir_all(&dir).unwrap();
        let entry = write_temp(&dir, "entry.franz", "x = 1");
        let mut loader = Loader::new(&entry);
        let modules = loader.load_entry(entry.to_str().unwrap()).unwrap();
        assert_eq!(modules.len(), 1);
    }

    #[test]
    fn detects_a_direct_circular_import() {
        let dir = std::env::temp_dir().join("franz_loader_test_cycle");
        fs::create_dir_all(&dir).unwrap();
        write_temp(&dir, "a.franz", "(use \"b.franz\")");
        let entry = write_temp(&dir, "b.franz", "(use \"a.franz\")");
        let mut loader = Loader::new(&entry);
        let err = loader.load_entry(entry.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, FranzError::CircularImport(_, _)));
    }

    #[test]
    fn rejects_an_unknown_capability() {
        let dir = std::env::temp_dir().join("franz_loader_test_capability");
        fs::create_dir_all(&dir).unwrap();
        write_temp(&dir, "lib.franz", "x = 1");
        let entry = write_temp(&dir, "entry.franz", "(use_with \"lib.franz\" \"gpu\")");
        let mut loader = Loader::new(&entry);
        let err = loader.load_entry(entry.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, FranzError::CapabilityDenied(_, _)));
    }
}
