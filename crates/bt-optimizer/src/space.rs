//! Search space definitions and feasibility constraints.

use bt_types::{Configuration, ParameterValue, SpaceError};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Describes how a parameter's domain was declared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterKind {
    /// Explicit ordered list of choices.
    Categorical,
    /// Integer range [low, high] inclusive, every `step` values.
    IntRange { low: i64, high: i64, step: i64 },
}

/// A single parameter dimension in the search space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    /// Parameter name (e.g. "BLOCK_X").
    pub name: String,
    pub kind: ParameterKind,
    /// Ordered, materialized domain. Integer ranges are expanded here.
    pub domain: Vec<ParameterValue>,
}

impl ParameterDef {
    /// Position of `value` in the domain, if it belongs to it.
    pub fn index_of(&self, value: &ParameterValue) -> Option<usize> {
        self.domain.iter().position(|v| v == value)
    }

    pub fn len(&self) -> usize {
        self.domain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domain.is_empty()
    }
}

type Predicate = dyn Fn(&Configuration) -> bool + Send + Sync;
type Explainer = dyn Fn(&Configuration) -> String + Send + Sync;

/// A hard feasibility predicate over complete configurations.
///
/// Predicates must be pure: the same configuration always yields the same
/// answer, and checking it has no side effects.
#[derive(Clone)]
pub struct Constraint {
    description: String,
    predicate: Arc<Predicate>,
    explain: Option<Arc<Explainer>>,
}

impl Constraint {
    pub fn new<F>(description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Configuration) -> bool + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            predicate: Arc::new(predicate),
            explain: None,
        }
    }

    /// Attach a custom rejection message built from the offending configuration.
    pub fn with_explanation<F>(mut self, explain: F) -> Self
    where
        F: Fn(&Configuration) -> String + Send + Sync + 'static,
    {
        self.explain = Some(Arc::new(explain));
        self
    }

    /// The product of the named integer parameters must not exceed `limit`.
    ///
    /// This is the device thread limit for a block of `BLOCK_X * BLOCK_Y`
    /// threads. A configuration missing one of the parameters (or assigning
    /// a non-integer) never satisfies it.
    pub fn product_at_most(names: &[&str], limit: i64) -> Self {
        let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        let description = format!("{} <= {limit}", names.join(" * "));

        let predicate_names = names.clone();
        let explain_names = names;

        Self::new(description, move |config| {
            product_of(config, &predicate_names).is_some_and(|p| p <= limit)
        })
        .with_explanation(move |config| {
            let dims: Vec<String> = explain_names
                .iter()
                .map(|n| {
                    config
                        .get(n)
                        .map(|v| v.to_string())
                        .unwrap_or_else(|| "?".to_string())
                })
                .collect();
            match product_of(config, &explain_names) {
                Some(product) => format!(
                    "block size too large: {} = {product} > {limit}",
                    dims.join("x")
                ),
                None => format!("cannot compute block size from {}", dims.join("x")),
            }
        })
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn is_satisfied(&self, config: &Configuration) -> bool {
        (self.predicate)(config)
    }

    /// Human-readable reason why `config` violates this constraint.
    pub fn rejection_reason(&self, config: &Configuration) -> String {
        match &self.explain {
            Some(explain) => explain(config),
            None => format!("constraint violated ({}): {config}", self.description),
        }
    }
}

impl fmt::Debug for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constraint")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

fn product_of(config: &Configuration, names: &[String]) -> Option<i64> {
    names
        .iter()
        .try_fold(1i64, |acc, name| acc.checked_mul(config.get_int(name)?))
}

/// The full search space: an ordered list of parameters plus the constraints
/// every evaluated configuration must satisfy.
#[derive(Debug, Clone, Default)]
pub struct ParameterSpace {
    parameters: Vec<ParameterDef>,
    constraints: Vec<Constraint>,
}

impl ParameterSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a categorical parameter over an ordered domain.
    pub fn declare<V>(mut self, name: impl Into<String>, domain: impl IntoIterator<Item = V>) -> Self
    where
        V: Into<ParameterValue>,
    {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::Categorical,
            domain: domain.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Register an integer range, materialized as `low, low + step, ..., <= high`.
    pub fn declare_int_range(mut self, name: impl Into<String>, low: i64, high: i64, step: i64) -> Self {
        // Invalid ranges keep an empty domain; `validate` reports them.
        let domain = if step > 0 && low <= high {
            (low..=high).step_by(step as usize).map(ParameterValue::Int).collect()
        } else {
            Vec::new()
        };
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::IntRange { low, high, step },
            domain,
        });
        self
    }

    pub fn constrain(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn parameters(&self) -> &[ParameterDef] {
        &self.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterDef> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Check the declaration itself. Run once before a study starts.
    pub fn validate(&self) -> Result<(), SpaceError> {
        if self.parameters.is_empty() {
            return Err(SpaceError::Empty);
        }

        for (i, param) in self.parameters.iter().enumerate() {
            if self.parameters[..i].iter().any(|p| p.name == param.name) {
                return Err(SpaceError::DuplicateParameter {
                    parameter: param.name.clone(),
                });
            }

            if let ParameterKind::IntRange { low, high, step } = param.kind {
                if step <= 0 || low > high {
                    return Err(SpaceError::InvalidRange {
                        parameter: param.name.clone(),
                        low,
                        high,
                        step,
                    });
                }
            }

            if param.domain.is_empty() {
                return Err(SpaceError::EmptyDomain {
                    parameter: param.name.clone(),
                });
            }

            for (j, value) in param.domain.iter().enumerate() {
                if param.domain[..j].contains(value) {
                    return Err(SpaceError::DuplicateValue {
                        parameter: param.name.clone(),
                        value: value.to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Number of points in the joint domain (`None` on overflow).
    pub fn cardinality(&self) -> Option<usize> {
        self.parameters
            .iter()
            .try_fold(1usize, |total, p| total.checked_mul(p.len()))
    }

    /// Verify that `config` assigns exactly the declared parameters, each to a
    /// value from its domain.
    pub fn check_assignment(&self, config: &Configuration) -> Result<(), SpaceError> {
        for param in &self.parameters {
            let value = config.get(&param.name).ok_or_else(|| SpaceError::MissingParameter {
                parameter: param.name.clone(),
            })?;
            if param.index_of(value).is_none() {
                return Err(SpaceError::OutOfDomain {
                    parameter: param.name.clone(),
                    value: value.to_string(),
                });
            }
        }

        if let Some(unknown) = config.names().find(|n| self.parameter(n).is_none()) {
            return Err(SpaceError::UnknownParameter {
                parameter: unknown.to_string(),
            });
        }

        Ok(())
    }

    /// First constraint that `config` violates, if any.
    pub fn first_violation(&self, config: &Configuration) -> Option<&Constraint> {
        self.constraints.iter().find(|c| !c.is_satisfied(config))
    }

    /// True when every declared constraint holds.
    pub fn feasible(&self, config: &Configuration) -> bool {
        self.first_violation(config).is_none()
    }

    /// Draw each parameter uniformly and independently from its domain.
    pub fn sample_uniform<R: Rng + ?Sized>(&self, rng: &mut R) -> Configuration {
        let mut config = Configuration::new();
        for param in &self.parameters {
            if param.domain.is_empty() {
                continue;
            }
            let idx = rng.random_range(0..param.domain.len());
            config.insert(param.name.clone(), param.domain[idx].clone());
        }
        config
    }
}
