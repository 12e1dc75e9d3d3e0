//! Variable substitution over YAML-shaped configuration trees.
//!
//! Configuration values may reference other values in the same tree with the
//! `${path}` pattern, where `path` is a `/`-separated sequence of mapping
//! keys and sequence indices walked from the tree root:
//!
//! ```rust
//! use stat_harmonize::resolve::Resolver;
//!
//! let tree: serde_yaml::Value = serde_yaml::from_str(
//!     "base: /data\nraw: ${base}/raw\nfiles:\n  - ${raw}/a.csv\n",
//! )
//! .unwrap();
//! let resolved = Resolver::new().resolve(&tree).unwrap();
//! assert_eq!(
//!     resolved["files"][0].as_str(),
//!     Some("/data/raw/a.csv"),
//! );
//! ```
//!
//! Resolution is a fixed-point iteration: each pass substitutes every
//! reference once, and passes repeat until one makes no changes. References
//! produced *by* a substitution are therefore picked up on the next pass,
//! and circular definitions are caught by the pass budget instead of looping
//! forever.

use regex::Regex;
use serde_yaml::Value;

use crate::error::{HarmonizeError, HarmonizeResult};

/// Default variable-reference pattern: `${path}`.
pub const DEFAULT_PATTERN: &str = r"\$\{([^}]+)\}";

/// Default path separator inside a reference.
///
/// There is no mechanism for escaping the separator inside a path segment.
pub const DEFAULT_SEPARATOR: &str = "/";

/// Default upper bound on fixed-point passes.
pub const DEFAULT_MAX_PASSES: u32 = 20;

/// Substitution engine for configuration trees.
///
/// Construction never fails for the defaults; [`Resolver::with_pattern`]
/// validates custom patterns.
#[derive(Debug, Clone)]
pub struct Resolver {
    pattern: Regex,
    separator: String,
    max_passes: u32,
}

impl Default for Resolver {
    fn default() -> Self {
        Self {
            // The default pattern is a crate constant and always compiles.
            pattern: Regex::new(DEFAULT_PATTERN).expect("default pattern is valid"),
            separator: DEFAULT_SEPARATOR.to_string(),
            max_passes: DEFAULT_MAX_PASSES,
        }
    }
}

impl Resolver {
    /// Create a resolver with the default pattern, separator and pass budget.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom reference pattern.
    ///
    /// The pattern must contain exactly one capture group holding the path;
    /// the *entire* match is replaced on substitution.
    pub fn with_pattern(mut self, pattern: &str) -> HarmonizeResult<Self> {
        let compiled = Regex::new(pattern)
            .map_err(|e| HarmonizeError::config(format!("invalid reference pattern: {e}")))?;
        if compiled.captures_len() != 2 {
            return Err(HarmonizeError::config(
                "reference pattern must have exactly one capture group",
            ));
        }
        self.pattern = compiled;
        Ok(self)
    }

    /// Use a custom path separator.
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Use a custom upper bound on fixed-point passes.
    pub fn with_max_passes(mut self, max_passes: u32) -> Self {
        self.max_passes = max_passes;
        self
    }

    /// Resolve a borrowed tree into a new owned copy.
    ///
    /// Use [`Resolver::resolve_in_place`] to skip the copy when the caller
    /// owns the tree and is willing to have it mutated.
    pub fn resolve(&self, tree: &Value) -> HarmonizeResult<Value> {
        let mut owned = tree.clone();
        self.resolve_in_place(&mut owned)?;
        Ok(owned)
    }

    /// Resolve an owned tree by mutating it directly.
    ///
    /// Lookups walk the tree itself, so substitutions made earlier in a pass
    /// are visible to references resolved later in the same pass.
    pub fn resolve_in_place(&self, tree: &mut Value) -> HarmonizeResult<()> {
        // A bare string root has nothing to recurse into; resolve it in a
        // single pass against itself.
        if let Value::String(text) = tree {
            let root = Value::String(text.clone());
            let substituted = self.substitute(text, &root)?;
            *tree = Value::String(substituted);
            return Ok(());
        }

        let paths = string_leaf_paths(tree);
        for _ in 0..self.max_passes {
            let mut substituted_any = false;
            for path in &paths {
                let current = match descend(tree, path) {
                    Some(Value::String(s)) => s.clone(),
                    _ => continue,
                };
                let (substituted, matched) = self.substitute_inner(&current, tree)?;
                if matched {
                    substituted_any = true;
                    if let Some(slot) = descend_mut(tree, path) {
                        *slot = Value::String(substituted);
                    }
                }
            }
            if !substituted_any {
                return Ok(());
            }
        }
        Err(HarmonizeError::Resolution {
            iterations: self.max_passes,
        })
    }

    /// Resolve a borrowed tree against a caller-supplied alternate root.
    ///
    /// References in `tree` are looked up in `root`, not in `tree` itself.
    pub fn resolve_against(&self, tree: &Value, root: &Value) -> HarmonizeResult<Value> {
        let mut owned = tree.clone();
        if let Value::String(text) = &owned {
            return Ok(Value::String(self.substitute(text, root)?));
        }
        let paths = string_leaf_paths(&owned);
        for _ in 0..self.max_passes {
            let mut substituted_any = false;
            for path in &paths {
                let current = match descend(&owned, path) {
                    Some(Value::String(s)) => s.clone(),
                    _ => continue,
                };
                let (substituted, matched) = self.substitute_inner(&current, root)?;
                if matched {
                    substituted_any = true;
                    if let Some(slot) = descend_mut(&mut owned, path) {
                        *slot = Value::String(substituted);
                    }
                }
            }
            if !substituted_any {
                return Ok(owned);
            }
        }
        Err(HarmonizeError::Resolution {
            iterations: self.max_passes,
        })
    }

    /// Substitute every reference in a single string, exactly once each.
    ///
    /// The replacement text is *not* rescanned, so a reference whose target
    /// contains another reference survives until the caller's next pass.
    pub fn substitute(&self, text: &str, root: &Value) -> HarmonizeResult<String> {
        self.substitute_inner(text, root).map(|(out, _)| out)
    }

    /// Substitution plus whether any reference matched.
    ///
    /// The fixed point is "a pass performs no substitutions", not "a pass
    /// changes no text": a reference whose target is itself (directly or
    /// through a cycle) reproduces its own text on every pass, and textual
    /// comparison would mistake that for convergence.
    fn substitute_inner(&self, text: &str, root: &Value) -> HarmonizeResult<(String, bool)> {
        let mut out = String::with_capacity(text.len());
        let mut tail = 0;
        let mut matched = false;
        for caps in self.pattern.captures_iter(text) {
            let (Some(whole), Some(path)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            matched = true;
            let target = self.lookup(path.as_str(), root)?;
            out.push_str(&text[tail..whole.start()]);
            out.push_str(&scalar_string(target, path.as_str())?);
            tail = whole.end();
        }
        out.push_str(&text[tail..]);
        Ok((out, matched))
    }

    fn lookup<'a>(&self, path: &str, root: &'a Value) -> HarmonizeResult<&'a Value> {
        let mut current = root;
        for segment in path.split(self.separator.as_str()) {
            current = match current {
                Value::Mapping(map) => {
                    let key = Value::String(segment.to_string());
                    map.get(&key).ok_or_else(|| {
                        HarmonizeError::config(format!(
                            "no key '{segment}' while resolving reference '{path}'"
                        ))
                    })?
                }
                Value::Sequence(seq) => {
                    let idx: usize = segment.parse().map_err(|_| {
                        HarmonizeError::config(format!(
                            "segment '{segment}' is not a sequence index while resolving \
                             reference '{path}'"
                        ))
                    })?;
                    seq.get(idx).ok_or_else(|| {
                        HarmonizeError::config(format!(
                            "sequence index {idx} out of bounds while resolving \
                             reference '{path}'"
                        ))
                    })?
                }
                _ => {
                    return Err(HarmonizeError::config(format!(
                        "segment '{segment}' indexes a scalar while resolving \
                         reference '{path}'"
                    )));
                }
            };
        }
        Ok(current)
    }
}

/// String form of a looked-up scalar. Containers and nulls cannot be
/// spliced into a string and are configuration errors.
fn scalar_string(value: &Value, path: &str) -> HarmonizeResult<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(HarmonizeError::config(format!(
            "reference '{path}' does not point at a scalar value"
        ))),
    }
}

#[derive(Debug, Clone)]
enum Seg {
    Key(Value),
    Idx(usize),
}

/// Paths to every string leaf, in tree order.
///
/// Substitution rewrites string leaves as strings, so the path set stays
/// valid for the whole fixed-point loop.
fn string_leaf_paths(tree: &Value) -> Vec<Vec<Seg>> {
    let mut out = Vec::new();
    let mut prefix = Vec::new();
    collect_string_paths(tree, &mut prefix, &mut out);
    out
}

fn collect_string_paths(value: &Value, prefix: &mut Vec<Seg>, out: &mut Vec<Vec<Seg>>) {
    match value {
        Value::String(_) => out.push(prefix.clone()),
        Value::Mapping(map) => {
            for (key, child) in map {
                prefix.push(Seg::Key(key.clone()));
                collect_string_paths(child, prefix, out);
                prefix.pop();
            }
        }
        Value::Sequence(seq) => {
            for (idx, child) in seq.iter().enumerate() {
                prefix.push(Seg::Idx(idx));
                collect_string_paths(child, prefix, out);
                prefix.pop();
            }
        }
        _ => {}
    }
}

fn descend<'a>(root: &'a Value, path: &[Seg]) -> Option<&'a Value> {
    let mut current = root;
    for seg in path {
        current = match (current, seg) {
            (Value::Mapping(map), Seg::Key(key)) => map.get(key)?,
            (Value::Sequence(seq), Seg::Idx(idx)) => seq.get(*idx)?,
            _ => return None,
        };
    }
    Some(current)
}

fn descend_mut<'a>(root: &'a mut Value, path: &[Seg]) -> Option<&'a mut Value> {
    let mut current = root;
    for seg in path {
        current = match (current, seg) {
            (Value::Mapping(map), Seg::Key(key)) => map.get_mut(key)?,
            (Value::Sequence(seq), Seg::Idx(idx)) => seq.get_mut(*idx)?,
            _ => return None,
        };
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::Resolver;
    use serde_yaml::Value;

    fn tree(yaml: &str) -> Value {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn substitutes_mapping_and_sequence_paths() {
        let t = tree("paths:\n  root: /data\nfiles:\n  - web.csv\nout: ${paths/root}/${files/0}\n");
        let resolved = Resolver::new().resolve(&t).unwrap();
        assert_eq!(resolved["out"].as_str(), Some("/data/web.csv"));
    }

    #[test]
    fn numbers_and_bools_take_display_form() {
        let t = tree("year: 2019\nstrict: true\nlabel: y${year}_${strict}\n");
        let resolved = Resolver::new().resolve(&t).unwrap();
        assert_eq!(resolved["label"].as_str(), Some("y2019_true"));
    }

    #[test]
    fn chained_references_resolve_over_multiple_passes() {
        let t = tree("a: ${b}\nb: ${c}\nc: leaf\n");
        let resolved = Resolver::new().resolve(&t).unwrap();
        assert_eq!(resolved["a"].as_str(), Some("leaf"));
        assert_eq!(resolved["b"].as_str(), Some("leaf"));
    }

    #[test]
    fn missing_key_is_a_config_error() {
        let t = tree("a: ${nope}\n");
        let err = Resolver::new().resolve(&t).unwrap_err();
        assert!(err.to_string().contains("no key 'nope'"));
    }

    #[test]
    fn indexing_into_scalar_is_a_config_error() {
        let t = tree("a: leaf\nb: ${a/deeper}\n");
        let err = Resolver::new().resolve(&t).unwrap_err();
        assert!(err.to_string().contains("indexes a scalar"));
    }

    #[test]
    fn container_target_is_a_config_error() {
        let t = tree("a:\n  b: 1\nc: ${a}\n");
        let err = Resolver::new().resolve(&t).unwrap_err();
        assert!(err.to_string().contains("not point at a scalar"));
    }

    #[test]
    fn bare_string_root_resolves_in_single_pass() {
        let t = Value::String("${0}".to_string());
        // A string is not indexable, so self-reference fails cleanly.
        assert!(Resolver::new().resolve(&t).is_err());

        let t = Value::String("no references".to_string());
        let resolved = Resolver::new().resolve(&t).unwrap();
        assert_eq!(resolved.as_str(), Some("no references"));
    }

    #[test]
    fn alternate_root_lookup() {
        let root = tree("base: /srv\n");
        let t = tree("- ${base}/x\n- ${base}/y\n");
        let resolved = Resolver::new().resolve_against(&t, &root).unwrap();
        assert_eq!(resolved[0].as_str(), Some("/srv/x"));
        assert_eq!(resolved[1].as_str(), Some("/srv/y"));
    }

    #[test]
    fn custom_pattern_requires_single_group() {
        assert!(Resolver::new().with_pattern(r"%\((\w+)\)(s)").is_err());
        let resolver = Resolver::new().with_pattern(r"%\(([^)]+)\)").unwrap();
        let t = tree("a: leaf\nb: '%(a)'\n");
        let resolved = resolver.resolve(&t).unwrap();
        assert_eq!(resolved["b"].as_str(), Some("leaf"));
    }
}
