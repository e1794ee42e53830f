//! Argument domains: the legal value space of a tool argument.

use core::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Default importance for arguments that do not declare one.
pub const DEFAULT_IMPORTANCE: f64 = 0.5;

/// Shape of an argument's value space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainKind {
    /// An explicit list of allowed values.
    Finite {
        /// Allowed values
        values: Vec<Value>,
    },
    /// A closed numeric interval `[min, max]`.
    NumericRange {
        /// Lower bound (inclusive)
        min: f64,
        /// Upper bound (inclusive)
        max: f64,
    },
    /// Any non-empty string.
    String,
    /// `true` or `false`.
    Boolean,
    /// A JSON array whose elements follow an optional element domain.
    List {
        /// Domain every element must satisfy, if constrained
        #[serde(default, skip_serializing_if = "Option::is_none")]
        element: Option<Box<ArgumentDomain>>,
    },
    /// Anything goes; validation is left to the owning plugin.
    Custom,
}

/// Number of distinct values a domain admits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainSize {
    /// Countable domain with this many values
    Finite(u64),
    /// Unbounded domain
    Infinite,
}

/// Structured description of an argument's legal value space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgumentDomain {
    /// Value space shape
    #[serde(flatten)]
    pub kind: DomainKind,
    /// Weight of this argument in regret, always within `[0, 1]`
    #[serde(
        default = "default_importance",
        deserialize_with = "deserialize_importance"
    )]
    pub importance: f64,
    /// Whether the value space depends on runtime data (e.g. a page count)
    #[serde(default)]
    pub data_dependent: bool,
    /// Human-readable description, used for custom domains
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// Serde default for [`ArgumentDomain::importance`].
fn default_importance() -> f64 {
    DEFAULT_IMPORTANCE
}

/// Deserializes an importance weight and clamps it into `[0, 1]`.
///
/// # Errors
/// Returns an error if the value is not a number.
fn deserialize_importance<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    Ok(clamp_unit(raw))
}

/// Clamps a value into `[0, 1]`, mapping NaN to 0.
fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

impl ArgumentDomain {
    /// Creates a domain of the given kind with default importance.
    #[must_use]
    pub fn new(kind: DomainKind) -> Self {
        Self {
            kind,
            importance: DEFAULT_IMPORTANCE,
            data_dependent: false,
            description: String::new(),
        }
    }

    /// Finite domain over the given values.
    #[must_use]
    pub fn finite<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::new(DomainKind::Finite {
            values: values.into_iter().map(Into::into).collect(),
        })
    }

    /// Closed numeric range.
    #[must_use]
    pub fn numeric_range(min: f64, max: f64) -> Self {
        Self::new(DomainKind::NumericRange { min, max })
    }

    /// Free-text string domain.
    #[must_use]
    pub fn string() -> Self {
        Self::new(DomainKind::String)
    }

    /// Boolean domain.
    #[must_use]
    pub fn boolean() -> Self {
        Self::new(DomainKind::Boolean)
    }

    /// List domain with an optional element constraint.
    #[must_use]
    pub fn list(element: Option<Self>) -> Self {
        Self::new(DomainKind::List {
            element: element.map(Box::new),
        })
    }

    /// Custom domain that accepts any value.
    #[must_use]
    pub fn custom(description: impl Into<String>) -> Self {
        Self::new(DomainKind::Custom).with_description(description)
    }

    /// Sets the importance weight, clamped into `[0, 1]`.
    #[must_use]
    pub fn with_importance(mut self, importance: f64) -> Self {
        self.importance = clamp_unit(importance);
        self
    }

    /// Marks the domain as data dependent.
    #[must_use]
    pub fn with_data_dependent(mut self, data_dependent: bool) -> Self {
        self.data_dependent = data_dependent;
        self
    }

    /// Sets the human-readable description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Number of values this domain admits.
    pub fn size(&self) -> DomainSize {
        match &self.kind {
            DomainKind::Finite { values } => DomainSize::Finite(values.len() as u64),
            DomainKind::Boolean => DomainSize::Finite(2),
            DomainKind::NumericRange { min, max } => {
                let span = (max - min).floor() + 1.0;
                if span.is_finite() && span >= 1.0 {
                    DomainSize::Finite(span as u64)
                } else {
                    DomainSize::Finite(1)
                }
            }
            DomainKind::String | DomainKind::List { .. } | DomainKind::Custom => {
                DomainSize::Infinite
            }
        }
    }

    /// Checks whether `value` lies inside this domain.
    pub fn is_valid(&self, value: &Value) -> bool {
        match &self.kind {
            DomainKind::Finite { values } => values.contains(value),
            DomainKind::NumericRange { min, max } => {
                numeric_value(value).is_some_and(|number| *min <= number && number <= *max)
            }
            DomainKind::Boolean => match value {
                Value::Bool(_) => true,
                Value::String(text) => {
                    text.eq_ignore_ascii_case("true") || text.eq_ignore_ascii_case("false")
                }
                _ => false,
            },
            DomainKind::String => value.as_str().is_some_and(|text| !text.trim().is_empty()),
            DomainKind::List { element } => value.as_array().is_some_and(|items| {
                element
                    .as_ref()
                    .is_none_or(|domain| items.iter().all(|item| domain.is_valid(item)))
            }),
            DomainKind::Custom => true,
        }
    }
}

/// Reads a number from a JSON number or a numeric string.
fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Renders a JSON value the way it should appear in prompts (strings unquoted).
fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

impl fmt::Display for ArgumentDomain {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DomainKind::Finite { values } => {
                let rendered: Vec<String> = values.iter().map(display_value).collect();
                write!(formatter, "One of: {}", rendered.join(", "))
            }
            DomainKind::NumericRange { min, max } => {
                write!(formatter, "Number between {min} and {max}")
            }
            DomainKind::Boolean => write!(formatter, "True or False"),
            DomainKind::String => write!(formatter, "Any text string"),
            DomainKind::List { element: Some(element) } => {
                write!(formatter, "List of values, each: {element}")
            }
            DomainKind::List { element: None } => write!(formatter, "List of values"),
            DomainKind::Custom => {
                if self.description.is_empty() {
                    write!(formatter, "Custom domain")
                } else {
                    write!(formatter, "{}", self.description)
                }
            }
        }
    }
}
