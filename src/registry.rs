use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use strum::Display;
use strum_macros::EnumString;

use crate::{
    error::{EngineError, TaResult},
    kernel::Kernel,
};

pub mod builtin;

// ================================================================================================
// Parameter model
// ================================================================================================

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum ParamKind {
    Int,
    Float,
    Str,
    Bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

impl ParamValue {
    pub fn kind(&self) -> ParamKind {
        match self {
            ParamValue::Int(_) => ParamKind::Int,
            ParamValue::Float(_) => ParamKind::Float,
            ParamValue::Str(_) => ParamKind::Str,
            ParamValue::Bool(_) => ParamKind::Bool,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            ParamValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(v) => Some(v),
            _ => None,
        }
    }
}

/// Schema for one scalar indicator parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub default: Option<ParamValue>,
    pub required: bool,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub choices: Option<Vec<String>>,
}

impl ParamSpec {
    pub fn int(name: &str, default: i64) -> Self {
        Self {
            name: name.to_string(),
            kind: ParamKind::Int,
            default: Some(ParamValue::Int(default)),
            required: false,
            min: Some(1.0),
            max: None,
            choices: None,
        }
    }

    pub fn float(name: &str, default: f64) -> Self {
        Self {
            name: name.to_string(),
            kind: ParamKind::Float,
            default: Some(ParamValue::Float(default)),
            required: false,
            min: None,
            max: None,
            choices: None,
        }
    }

    pub fn required_float(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ParamKind::Float,
            default: None,
            required: true,
            min: None,
            max: None,
            choices: None,
        }
    }

    pub fn optional_str(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ParamKind::Str,
            default: None,
            required: false,
            min: None,
            max: None,
            choices: None,
        }
    }

    pub fn with_min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn with_max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }
}

// ================================================================================================
// Output model
// ================================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum OutputRole {
    Line,
    Level,
    Flag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Polarity {
    High,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSpec {
    pub name: String,
    pub role: OutputRole,
    pub polarity: Option<Polarity>,
}

impl OutputSpec {
    pub fn line(name: &str) -> Self {
        Self {
            name: name.to_string(),
            role: OutputRole::Line,
            polarity: None,
        }
    }

    pub fn level(name: &str, polarity: Polarity) -> Self {
        Self {
            name: name.to_string(),
            role: OutputRole::Level,
            polarity: Some(polarity),
        }
    }

    pub fn flag(name: &str, polarity: Polarity) -> Self {
        Self {
            name: name.to_string(),
            role: OutputRole::Flag,
            polarity: Some(polarity),
        }
    }
}

// ================================================================================================
// Semantics
// ================================================================================================

/// How the engine assembles kernel samples for an indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum InputLayout {
    /// One value per step, from an input slot or a context field.
    Value,
    /// Two expression inputs (crossing tests).
    Pair,
    /// Three expression inputs (channel tests).
    Triple,
    /// A full bar from the context.
    Bar,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Semantics {
    pub required_fields: Vec<String>,
    pub optional_fields: Vec<String>,
    pub lookback_params: Vec<String>,
    pub default_lookback: usize,
    pub input_layout: InputLayout,
    /// Number of expression-valued input slots the call accepts.
    pub input_slots: usize,
}

impl Semantics {
    /// Single-value input with one expression slot defaulting to `close`.
    pub fn value(lookback_params: &[&str]) -> Self {
        Self {
            required_fields: vec!["close".to_string()],
            optional_fields: Vec::new(),
            lookback_params: lookback_params.iter().map(|s| s.to_string()).collect(),
            default_lookback: 1,
            input_layout: InputLayout::Value,
            input_slots: 1,
        }
    }

    /// Bar input assembled from context fields; no expression slots.
    pub fn bar(required_fields: &[&str], lookback_params: &[&str]) -> Self {
        Self {
            required_fields: required_fields.iter().map(|s| s.to_string()).collect(),
            optional_fields: Vec::new(),
            lookback_params: lookback_params.iter().map(|s| s.to_string()).collect(),
            default_lookback: 1,
            input_layout: InputLayout::Bar,
            input_slots: 0,
        }
    }

    pub fn pair() -> Self {
        Self {
            required_fields: vec!["close".to_string()],
            optional_fields: Vec::new(),
            lookback_params: Vec::new(),
            default_lookback: 2,
            input_layout: InputLayout::Pair,
            input_slots: 2,
        }
    }

    pub fn triple() -> Self {
        Self {
            required_fields: vec!["close".to_string()],
            optional_fields: Vec::new(),
            lookback_params: Vec::new(),
            default_lookback: 2,
            input_layout: InputLayout::Triple,
            input_slots: 3,
        }
    }
}

// ================================================================================================
// Indicator spec
// ================================================================================================

/// Frozen description of one indicator: parameters, outputs, semantics and
/// the kernel binding. Registered once at boot, read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSpec {
    pub name: String,
    pub description: String,
    pub params: Vec<ParamSpec>,
    pub outputs: Vec<OutputSpec>,
    pub semantics: Semantics,
    pub kernel_id: String,
    pub aliases: Vec<String>,
    pub param_aliases: Vec<(String, String)>,
}

impl IndicatorSpec {
    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Resolves a parameter alias to its canonical name.
    pub fn canonical_param<'a>(&'a self, name: &'a str) -> &'a str {
        self.param_aliases
            .iter()
            .find(|(alias, _)| alias == name)
            .map(|(_, target)| target.as_str())
            .unwrap_or(name)
    }

    pub fn output_index(&self, name: &str) -> Option<usize> {
        self.outputs.iter().position(|o| o.name == name)
    }
}

/// Literal parameter values for one call, defaults applied.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResolvedParams(BTreeMap<String, ParamValue>);

impl ResolvedParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ParamValue) {
        self.0.insert(name.into(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn get_usize(&self, name: &str) -> TaResult<usize> {
        self.get(name)
            .and_then(ParamValue::as_i64)
            .and_then(|v| usize::try_from(v).ok())
            .ok_or_else(|| missing_param(name))
    }

    pub fn get_f64(&self, name: &str) -> TaResult<f64> {
        self.get(name)
            .and_then(ParamValue::as_f64)
            .ok_or_else(|| missing_param(name))
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(ParamValue::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }
}

fn missing_param(name: &str) -> crate::error::TaError {
    EngineError::InvariantViolation(format!(
        "parameter '{name}' absent after typechecking"
    ))
    .into()
}

// ================================================================================================
// Registry
// ================================================================================================

pub type KernelFactory = fn(&ResolvedParams) -> TaResult<Box<dyn Kernel>>;

/// One registered indicator: its frozen spec plus a kernel constructor.
pub struct IndicatorDef {
    pub spec: IndicatorSpec,
    pub factory: KernelFactory,
}

impl std::fmt::Debug for IndicatorDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndicatorDef")
            .field("spec", &self.spec.name)
            .finish()
    }
}

/// Indicator name → definition, alias-aware. Built once at boot and passed
/// explicitly to the parser, typechecker and engine; no lookups mutate it.
#[derive(Debug, Default)]
pub struct Registry {
    defs: Vec<IndicatorDef>,
    index: HashMap<String, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The full built-in indicator set.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        builtin::register_all(&mut registry).expect("built-in registrations are validated");
        registry
    }

    pub fn register(&mut self, def: IndicatorDef) -> TaResult<()> {
        let spec = &def.spec;
        let reject = |reason: String| -> crate::error::TaError {
            EngineError::InvalidRegistration {
                name: spec.name.clone(),
                reason,
            }
            .into()
        };

        if spec.name.is_empty() {
            return Err(reject("indicator name must be non-empty".to_string()));
        }

        for param in &spec.params {
            if param.required && param.default.is_some() {
                return Err(reject(format!(
                    "required parameter '{}' cannot have a default",
                    param.name
                )));
            }
            if let Some(default) = &param.default {
                if let (Some(min), Some(v)) = (param.min, default.as_f64()) {
                    if v < min {
                        return Err(reject(format!(
                            "default for '{}' violates minimum {min}",
                            param.name
                        )));
                    }
                }
                if let (Some(max), Some(v)) = (param.max, default.as_f64()) {
                    if v > max {
                        return Err(reject(format!(
                            "default for '{}' violates maximum {max}",
                            param.name
                        )));
                    }
                }
                if let (Some(choices), Some(v)) = (&param.choices, default.as_str()) {
                    if !choices.iter().any(|c| c == v) {
                        return Err(reject(format!(
                            "default for '{}' not among its valid values",
                            param.name
                        )));
                    }
                }
            }
        }

        let mut seen_outputs = std::collections::HashSet::new();
        for output in &spec.outputs {
            if !seen_outputs.insert(output.name.as_str()) {
                return Err(reject(format!("duplicate output name '{}'", output.name)));
            }
        }

        for lookback in &spec.semantics.lookback_params {
            if spec.param(lookback).is_none() {
                return Err(reject(format!(
                    "lookback parameter '{lookback}' is not declared"
                )));
            }
        }

        for (alias, target) in &spec.param_aliases {
            if spec.param(target).is_none() {
                return Err(reject(format!(
                    "parameter alias '{alias}' targets unknown parameter '{target}'"
                )));
            }
        }

        let idx = self.defs.len();
        let mut names = vec![spec.name.clone()];
        names.extend(spec.aliases.iter().cloned());
        for name in &names {
            if self.index.contains_key(name.as_str()) {
                return Err(reject(format!("name or alias '{name}' already registered")));
            }
        }
        for name in names {
            self.index.insert(name, idx);
        }
        self.defs.push(def);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&IndicatorDef> {
        let lowered = name.to_ascii_lowercase();
        self.index.get(&lowered).map(|&idx| &self.defs[idx])
    }

    /// Every registered name, aliases included, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.index.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// JSON catalog of every indicator spec, for host consumption.
    pub fn catalog_json(&self) -> serde_json::Value {
        let entries: Vec<serde_json::Value> = self
            .defs
            .iter()
            .map(|def| serde_json::to_value(&def.spec).expect("specs are serializable"))
            .collect();
        serde_json::Value::Array(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::elementwise::PosKernel;

    fn passthrough(_: &ResolvedParams) -> TaResult<Box<dyn Kernel>> {
        Ok(Box::new(PosKernel::new()))
    }

    fn minimal_spec(name: &str) -> IndicatorSpec {
        IndicatorSpec {
            name: name.to_string(),
            description: String::new(),
            params: vec![ParamSpec::int("period", 5)],
            outputs: vec![OutputSpec::line("result")],
            semantics: Semantics::value(&["period"]),
            kernel_id: name.to_string(),
            aliases: Vec::new(),
            param_aliases: Vec::new(),
        }
    }

    #[test]
    fn rejects_alias_collisions() {
        let mut registry = Registry::new();
        registry
            .register(IndicatorDef {
                spec: minimal_spec("alpha"),
                factory: passthrough,
            })
            .unwrap();

        let mut clashing = minimal_spec("beta");
        clashing.aliases = vec!["alpha".to_string()];
        assert!(registry
            .register(IndicatorDef {
                spec: clashing,
                factory: passthrough,
            })
            .is_err());
    }

    #[test]
    fn rejects_required_param_with_default() {
        let mut spec = minimal_spec("gamma");
        spec.params = vec![ParamSpec {
            required: true,
            ..ParamSpec::int("period", 5)
        }];
        let mut registry = Registry::new();
        assert!(registry
            .register(IndicatorDef {
                spec,
                factory: passthrough,
            })
            .is_err());
    }

    #[test]
    fn rejects_duplicate_outputs_and_unknown_lookbacks() {
        let mut spec = minimal_spec("delta");
        spec.outputs = vec![OutputSpec::line("a"), OutputSpec::line("a")];
        let mut registry = Registry::new();
        assert!(registry
            .register(IndicatorDef {
                spec,
                factory: passthrough,
            })
            .is_err());

        let mut spec = minimal_spec("epsilon");
        spec.semantics.lookback_params = vec!["window".to_string()];
        assert!(registry
            .register(IndicatorDef {
                spec,
                factory: passthrough,
            })
            .is_err());
    }

    #[test]
    fn rejects_default_outside_bounds() {
        let mut spec = minimal_spec("zeta");
        spec.params = vec![ParamSpec::int("period", 0)];
        let mut registry = Registry::new();
        assert!(registry
            .register(IndicatorDef {
                spec,
                factory: passthrough,
            })
            .is_err());
    }

    #[test]
    fn lookup_is_case_insensitive_and_alias_aware() {
        let mut spec = minimal_spec("eta");
        spec.aliases = vec!["eta_alias".to_string()];
        let mut registry = Registry::new();
        registry
            .register(IndicatorDef {
                spec,
                factory: passthrough,
            })
            .unwrap();

        assert!(registry.lookup("ETA").is_some());
        assert_eq!(registry.lookup("eta_alias").unwrap().spec.name, "eta");
        assert!(registry.lookup("theta").is_none());
    }
}
