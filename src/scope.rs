//! The per-request variable scope used to render response templates.
use crate::mapping::MappingRule;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::BTreeMap;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_.\-\[\]]+)\s*\}\}").expect("placeholder regex is valid")
});

/// A single-valued `name -> value` mapping.
///
/// A scope is assembled from five layers, from lowest to highest precedence:
///
/// 1. captures of the path template (e.g. `id` for `/users/{id}`);
/// 2. the default variables configured on the mock;
/// 3. form and query parameters, when form parsing is enabled;
/// 4. variables extracted by checks and extraction rules;
/// 5. outputs of the mapping rules.
///
/// Each layer overwrites the same-named keys of the layers below it, so a lookup always
/// resolves to the highest-precedence value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableScope {
    vars: BTreeMap<String, String>,
}

impl VariableScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start building a scope layer by layer.
    pub fn builder() -> ScopeBuilder {
        ScopeBuilder {
            scope: VariableScope::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    /// Overwrite this scope with every entry of `layer`.
    pub fn merge<I, K, V>(&mut self, layer: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (name, value) in layer {
            self.insert(name, value);
        }
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Replace every `{{name}}` in `template` with the value bound to `name`.
    ///
    /// Placeholders naming a variable that is not in scope are left untouched.
    pub fn substitute(&self, template: &str) -> String {
        PLACEHOLDER
            .replace_all(template, |caps: &Captures| match self.get(&caps[1]) {
                Some(value) => value.to_string(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }
}

/// Assembles a [`VariableScope`] enforcing the precedence order of its layers.
///
/// Every stage consumes the builder and hands back the next stage, so layers cannot be merged
/// out of order.
pub struct ScopeBuilder {
    scope: VariableScope,
}

impl ScopeBuilder {
    pub fn path_captures<I, K, V>(mut self, captures: I) -> DefaultsStage
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.scope.merge(captures);
        DefaultsStage { scope: self.scope }
    }
}

pub struct DefaultsStage {
    scope: VariableScope,
}

impl DefaultsStage {
    pub fn defaults<'a, I>(mut self, defaults: I) -> FormStage
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        self.scope
            .merge(defaults.into_iter().map(|(k, v)| (k.clone(), v.clone())));
        FormStage { scope: self.scope }
    }
}

pub struct FormStage {
    scope: VariableScope,
}

impl FormStage {
    /// Merge form and query parameters. Pass `None` when form parsing is disabled.
    pub fn form(mut self, params: Option<Vec<(String, String)>>) -> ExtractionStage {
        if let Some(params) = params {
            self.scope.merge(params);
        }
        ExtractionStage { scope: self.scope }
    }
}

pub struct ExtractionStage {
    scope: VariableScope,
}

impl ExtractionStage {
    pub fn extracted<I, K, V>(mut self, extracted: I) -> MappingStage
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.scope.merge(extracted);
        MappingStage { scope: self.scope }
    }
}

pub struct MappingStage {
    scope: VariableScope,
}

impl MappingStage {
    /// Evaluate the mapping rules in order and merge their outputs.
    ///
    /// Every rule is looked up against the scope as it stands, including the outputs of the
    /// rules evaluated before it.
    pub fn mappings(mut self, rules: &[MappingRule]) -> VariableScope {
        for rule in rules {
            let (name, value) = rule.lookup(&self.scope);
            if !name.is_empty() {
                self.scope.insert(name, value);
            }
        }
        self.scope
    }
}

/// Flatten multi-valued parameters: a single value is bound to `name`, several values to
/// `name[0]`, `name[1]`, ...
pub(crate) fn flatten_params<I>(pairs: I) -> Vec<(String, String)>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut grouped: Vec<(String, Vec<String>)> = Vec::new();
    for (name, value) in pairs {
        match grouped.iter_mut().find(|(n, _)| *n == name) {
            Some((_, values)) => values.push(value),
            None => grouped.push((name, vec![value])),
        }
    }

    let mut flat = Vec::new();
    for (name, mut values) in grouped {
        if values.len() == 1 {
            flat.push((name, values.remove(0)));
        } else {
            for (i, value) in values.into_iter().enumerate() {
                flat.push((format!("{}[{}]", name, i), value));
            }
        }
    }
    flat
}
