use serde::Serialize;
use serde_json::Value;

/// How a condition compares a field with its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterAction {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Contains,
    NotContains,
    /// The handler decides what the value means.
    CustomPredicate,
}

/// How a condition joins the ones before it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterLogic {
    #[default]
    And,
    Or,
}

/// One key/value test a query handler is asked to apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterCondition {
    pub key: String,
    pub value: Value,
    pub action: FilterAction,
    pub logic: FilterLogic,
}

impl FilterCondition {
    pub fn new(key: impl Into<String>, action: FilterAction, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            action,
            logic: FilterLogic::And,
        }
    }

    pub fn equal(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(key, FilterAction::Equal, value)
    }

    pub fn contains(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(key, FilterAction::Contains, value)
    }

    /// Joins this condition with `Or` instead of `And`.
    pub fn or(mut self) -> Self {
        self.logic = FilterLogic::Or;
        self
    }
}
