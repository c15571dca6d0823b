use crate::fetch::protocol::{FetchOutcome, FetchedAsset, FetchedTokenizer};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

/// Tokenizer class downloaded when none is requested explicitly
pub const DEFAULT_TOKENIZER: &str = "AutoTokenizer";

/// Library a model is loaded with
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Module {
    Transformers,
    Diffusers,
    #[default]
    Unknown,
    Other(String),
}

impl Module {
    /// Only transformers models carry tokenizers
    #[must_use]
    pub const fn supports_tokenizers(&self) -> bool {
        matches!(self, Self::Transformers)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Transformers => "transformers",
            Self::Diffusers => "diffusers",
            Self::Unknown => "",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for Module {
    fn from(value: String) -> Self {
        match value.as_str() {
            "transformers" => Self::Transformers,
            "diffusers" => Self::Diffusers,
            "" => Self::Unknown,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for Module {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<Module> for String {
    fn from(value: Module) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tokenizer configured for a model, keyed by its class
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Tokenizer {
    #[serde(default)]
    pub path: PathBuf,
    pub class: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
}

impl Tokenizer {
    #[must_use]
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            ..Self::default()
        }
    }
}

/// A model entry of the manifest
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Asset {
    pub name: String,
    #[serde(default)]
    pub module: Module,
    #[serde(default)]
    pub class: String,
    #[serde(default)]
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Tokenizers::is_empty")]
    pub tokenizers: Tokenizers,
    #[serde(default)]
    pub add_to_binary: bool,
    #[serde(default)]
    pub is_downloaded: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
}

impl Asset {
    #[must_use]
    pub fn new(name: impl Into<String>, module: Module) -> Self {
        Self {
            name: name.into(),
            module,
            ..Self::default()
        }
    }

    /// Directory holding everything downloaded for this asset
    #[must_use]
    pub fn base_path(&self, download_root: &Path) -> PathBuf {
        download_root.join(&self.name)
    }

    /// Derive the on-disk paths of the model and its tokenizers
    ///
    /// Transformers models are stored under `<root>/<name>/model` with each
    /// tokenizer next to it in `<root>/<name>/<class>`; other modules use
    /// `<root>/<name>` directly.
    pub fn resolve_paths(&mut self, download_root: &Path) {
        let base = self.base_path(download_root);
        if self.module.supports_tokenizers() {
            self.path = base.join("model");
            for tokenizer in &mut self.tokenizers.0 {
                tokenizer.path = base.join(&tokenizer.class);
            }
        } else {
            self.path = base;
        }
    }

    /// Path a tokenizer of this asset is stored at
    #[must_use]
    pub fn tokenizer_path(&self, download_root: &Path, class: &str) -> PathBuf {
        self.base_path(download_root).join(class)
    }

    /// Merge the result of a successful fetch into this asset
    ///
    /// Model fields are only overwritten by a populated model part, and a
    /// fetched tokenizer replaces any tokenizer with the same class.
    pub fn apply_fetch(&mut self, outcome: &FetchOutcome) {
        let FetchOutcome::Populated(fetched) = outcome else {
            return;
        };
        self.apply_fetched_model(fetched);
        if let Some(tokenizer) = fetched.tokenizer.as_ref().filter(|t| !t.is_empty()) {
            self.tokenizers.upsert(Tokenizer::from(tokenizer));
        }
    }

    fn apply_fetched_model(&mut self, fetched: &FetchedAsset) {
        if fetched.is_model_empty() {
            return;
        }
        if !fetched.path.is_empty() {
            self.path = PathBuf::from(&fetched.path);
        }
        self.module = Module::from(fetched.module.as_str());
        self.class.clone_from(&fetched.class);
        self.options.clone_from(&fetched.options);
    }
}

impl From<&FetchedTokenizer> for Tokenizer {
    fn from(fetched: &FetchedTokenizer) -> Self {
        Self {
            path: PathBuf::from(&fetched.path),
            class: fetched.class.clone(),
            options: fetched.options.clone(),
        }
    }
}

/// Tokenizers of a model, a set keyed by class kept in insertion order
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tokenizers(pub Vec<Tokenizer>);

impl Tokenizers {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Tokenizer> {
        self.0.iter()
    }

    #[must_use]
    pub fn contains_class(&self, class: &str) -> bool {
        self.0.iter().any(|t| t.class == class)
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.0.iter().map(|t| t.class.clone()).collect()
    }

    #[must_use]
    pub fn map(&self) -> HashMap<&str, &Tokenizer> {
        self.0.iter().map(|t| (t.class.as_str(), t)).collect()
    }

    /// Tokenizers whose class is absent from `subset`
    #[must_use]
    pub fn difference(&self, subset: &Self) -> Self {
        let keys: HashSet<&str> = subset.0.iter().map(|t| t.class.as_str()).collect();
        Self(
            self.0
                .iter()
                .filter(|t| !keys.contains(t.class.as_str()))
                .cloned()
                .collect(),
        )
    }

    /// Tokenizers whose class also appears in `other`
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let keys: HashSet<&str> = other.0.iter().map(|t| t.class.as_str()).collect();
        Self(
            self.0
                .iter()
                .filter(|t| keys.contains(t.class.as_str()))
                .cloned()
                .collect(),
        )
    }

    /// Tokenizers whose class is one of `classes`
    #[must_use]
    pub fn with_classes(&self, classes: &[String]) -> Self {
        let keys: HashSet<&str> = classes.iter().map(String::as_str).collect();
        Self(
            self.0
                .iter()
                .filter(|t| keys.contains(t.class.as_str()))
                .cloned()
                .collect(),
        )
    }

    /// Insert a tokenizer, replacing the one with the same class if present
    pub fn upsert(&mut self, tokenizer: Tokenizer) {
        if let Some(existing) = self.0.iter_mut().find(|t| t.class == tokenizer.class) {
            *existing = tokenizer;
        } else {
            self.0.push(tokenizer);
        }
    }

    /// Remove a tokenizer by class, returning it if it was configured
    pub fn remove(&mut self, class: &str) -> Option<Tokenizer> {
        let index = self.0.iter().position(|t| t.class == class)?;
        Some(self.0.remove(index))
    }

    /// `(self - updated) + updated`, stable under repeated application
    #[must_use]
    pub fn merge_updated(&self, updated: &Self) -> Self {
        let mut merged = self.difference(updated);
        for tokenizer in &updated.0 {
            merged.upsert(tokenizer.clone());
        }
        merged
    }
}

impl From<Vec<Tokenizer>> for Tokenizers {
    fn from(tokenizers: Vec<Tokenizer>) -> Self {
        Self(tokenizers)
    }
}

impl<'a> IntoIterator for &'a Tokenizers {
    type Item = &'a Tokenizer;
    type IntoIter = std::slice::Iter<'a, Tokenizer>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Models of a manifest, a set keyed by name kept in manifest order
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Assets(pub Vec<Asset>);

impl Assets {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Asset> {
        self.0.iter()
    }

    #[must_use]
    pub fn find(&self, name: &str) -> Option<&Asset> {
        self.0.iter().find(|a| a.name == name)
    }

    #[must_use]
    pub fn contains_name(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.0.iter().map(|a| a.name.clone()).collect()
    }

    /// Assets whose name is absent from `subset`
    #[must_use]
    pub fn difference(&self, subset: &Self) -> Self {
        let keys: HashSet<&str> = subset.0.iter().map(|a| a.name.as_str()).collect();
        Self(
            self.0
                .iter()
                .filter(|a| !keys.contains(a.name.as_str()))
                .cloned()
                .collect(),
        )
    }

    /// Assets whose name is one of `names`
    #[must_use]
    pub fn by_names(&self, names: &[String]) -> Self {
        let keys: HashSet<&str> = names.iter().map(String::as_str).collect();
        Self(
            self.0
                .iter()
                .filter(|a| keys.contains(a.name.as_str()))
                .cloned()
                .collect(),
        )
    }

    /// Assets whose module supports tokenizers
    #[must_use]
    pub fn transformers(&self) -> Self {
        Self(
            self.0
                .iter()
                .filter(|a| a.module.supports_tokenizers())
                .cloned()
                .collect(),
        )
    }

    /// Insert an asset, replacing the one with the same name in place
    pub fn upsert(&mut self, asset: Asset) {
        if let Some(existing) = self.0.iter_mut().find(|a| a.name == asset.name) {
            *existing = asset;
        } else {
            self.0.push(asset);
        }
    }
}

impl From<Vec<Asset>> for Assets {
    fn from(assets: Vec<Asset>) -> Self {
        Self(assets)
    }
}

impl<'a> IntoIterator for &'a Assets {
    type Item = &'a Asset;
    type IntoIter = std::slice::Iter<'a, Asset>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Names of `all` that are not in `subset`, order of `all` preserved
#[must_use]
pub fn names_difference(all: &[String], subset: &[String]) -> Vec<String> {
    let keys: HashSet<&str> = subset.iter().map(String::as_str).collect();
    all.iter()
        .filter(|name| !keys.contains(name.as_str()))
        .cloned()
        .collect()
}

/// Drop repeated names while keeping the first occurrence
#[must_use]
pub fn dedup_names(names: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .iter()
        .filter(|name| seen.insert(name.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenizer(class: &str, path: &str) -> Tokenizer {
        Tokenizer {
            path: PathBuf::from(path),
            class: class.to_string(),
            options: BTreeMap::new(),
        }
    }

    fn assets(names: &[&str]) -> Assets {
        Assets(
            names
                .iter()
                .map(|n| Asset::new(*n, Module::Transformers))
                .collect(),
        )
    }

    #[test]
    fn test_module_round_trips_through_strings() {
        assert_eq!(Module::from("transformers"), Module::Transformers);
        assert_eq!(Module::from("diffusers"), Module::Diffusers);
        assert_eq!(Module::from(""), Module::Unknown);
        assert_eq!(
            Module::from("sentence_transformers"),
            Module::Other("sentence_transformers".to_string())
        );
        assert_eq!(String::from(Module::Diffusers), "diffusers");
        assert!(Module::Transformers.supports_tokenizers());
        assert!(!Module::Diffusers.supports_tokenizers());
    }

    #[test]
    fn test_assets_difference_preserves_order() {
        let all = assets(&["a", "b", "c", "d"]);
        let subset = assets(&["c", "a", "x"]);
        assert_eq!(all.difference(&subset).names(), vec!["b", "d"]);
    }


    #[test]
    fn test_assets_upsert_keeps_position() {
        let mut all = assets(&["a", "b", "c"]);
        let mut updated = Asset::new("b", Module::Diffusers);
        updated.is_downloaded = true;
        all.upsert(updated);
        all.upsert(Asset::new("d", Module::Unknown));

        assert_eq!(all.names(), vec!["a", "b", "c", "d"]);
        assert!(all.find("b").unwrap().is_downloaded);
    }

    #[test]
    fn test_tokenizers_union_keeps_left_order() {
        let left = Tokenizers(vec![tokenizer("A", ""), tokenizer("B", ""), tokenizer("C", "")]);
        let right = Tokenizers(vec![tokenizer("C", "c"), tokenizer("A", "a"), tokenizer("X", "")]);

        let both = left.union(&right);
        assert_eq!(both.names(), vec!["A", "C"]);
        assert!(!both.map().contains_key("X"));
    }

    #[test]
    fn test_upsert_replaces_same_class() {
        let mut tokenizers = Tokenizers(vec![tokenizer("Auto", "old"), tokenizer("Fast", "f")]);
        tokenizers.upsert(tokenizer("Auto", "new"));

        assert_eq!(tokenizers.len(), 2);
        assert_eq!(tokenizers.map()["Auto"].path, PathBuf::from("new"));
        assert_eq!(tokenizers.names(), vec!["Auto", "Fast"]);
    }

    #[test]
    fn test_merge_updated_is_idempotent() {
        let current = Tokenizers(vec![
            tokenizer("A", "a1"),
            tokenizer("B", "b1"),
            tokenizer("C", "c1"),
        ]);
        let updated = Tokenizers(vec![tokenizer("B", "b2"), tokenizer("D", "d2")]);

        let once = current.merge_updated(&updated);
        let twice = once.merge_updated(&updated);

        assert_eq!(once, twice);
        assert_eq!(once.names(), vec!["A", "C", "B", "D"]);
        assert_eq!(once.map()["B"].path, PathBuf::from("b2"));
    }

    #[test]
    fn test_merge_updated_never_duplicates_classes() {
        let current = Tokenizers(vec![tokenizer("A", "a1")]);
        let updated = Tokenizers(vec![tokenizer("A", "a2"), tokenizer("A", "a3")]);
        let merged = current.merge_updated(&updated);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged.0[0].path, PathBuf::from("a3"));
    }

    #[test]
    fn test_resolve_paths_for_transformers() {
        let mut asset = Asset::new("org/model", Module::Transformers);
        asset.tokenizers.upsert(Tokenizer::new("AutoTokenizer"));
        asset.resolve_paths(Path::new("models"));

        assert_eq!(asset.path, PathBuf::from("models/org/model/model"));
        assert_eq!(
            asset.tokenizers.0[0].path,
            PathBuf::from("models/org/model/AutoTokenizer")
        );
    }

    #[test]
    fn test_resolve_paths_for_other_modules() {
        let mut asset = Asset::new("org/diffuser", Module::Diffusers);
        asset.resolve_paths(Path::new("models"));
        assert_eq!(asset.path, PathBuf::from("models/org/diffuser"));
    }

    #[test]
    fn test_apply_fetch_replaces_tokenizer_by_class() {
        let mut asset = Asset::new("model1", Module::Transformers);
        asset.tokenizers.upsert(tokenizer("AutoTokenizer", "old"));

        let outcome = FetchOutcome::Populated(FetchedAsset {
            tokenizer: Some(FetchedTokenizer {
                path: "new".to_string(),
                class: "AutoTokenizer".to_string(),
                options: BTreeMap::new(),
            }),
            ..FetchedAsset::default()
        });
        asset.apply_fetch(&outcome);

        assert_eq!(asset.tokenizers.len(), 1);
        assert_eq!(asset.tokenizers.0[0].path, PathBuf::from("new"));
        // model part was empty, so model fields are untouched
        assert_eq!(asset.module, Module::Transformers);
    }

    #[test]
    fn test_apply_fetch_ignores_absent_and_empty() {
        let mut asset = Asset::new("model1", Module::Transformers);
        asset.class = "AutoModel".to_string();
        let before = asset.clone();

        asset.apply_fetch(&FetchOutcome::Absent);
        asset.apply_fetch(&FetchOutcome::Empty);
        assert_eq!(asset, before);
    }

    #[test]
    fn test_apply_fetch_updates_model_fields() {
        let mut asset = Asset::new("model1", Module::Unknown);
        let outcome = FetchOutcome::Populated(FetchedAsset {
            path: "models/model1/model".to_string(),
            module: "transformers".to_string(),
            class: "AutoModelForCausalLM".to_string(),
            ..FetchedAsset::default()
        });
        asset.apply_fetch(&outcome);

        assert_eq!(asset.path, PathBuf::from("models/model1/model"));
        assert_eq!(asset.module, Module::Transformers);
        assert_eq!(asset.class, "AutoModelForCausalLM");
    }

    #[test]
    fn test_names_helpers() {
        let all = vec!["a".to_string(), "b".to_string(), "a".to_string()];
        assert_eq!(dedup_names(&all), vec!["a", "b"]);
        assert_eq!(names_difference(&all, &["a".to_string()]), vec!["b"]);
    }
}
