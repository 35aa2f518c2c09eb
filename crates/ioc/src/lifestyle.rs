use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::errors::ContainerError;
use crate::expression::{Expression, Instance};

/// Время жизни экземпляров registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifestyle {
    /// Новый экземпляр на каждый запрос
    #[default]
    Transient,
    /// Один экземпляр на registration
    Singleton,
}

impl Lifestyle {
    pub fn name(&self) -> &'static str {
        match self {
            Lifestyle::Transient => "transient",
            Lifestyle::Singleton => "singleton",
        }
    }

    /// Обернуть expression согласно lifestyle. `cell` принадлежит registration.
    pub fn apply(&self, expression: Expression, cell: &Arc<OnceCell<Instance>>) -> Expression {
        match self {
            Lifestyle::Transient => expression,
            Lifestyle::Singleton if expression.is_cached() => expression,
            Lifestyle::Singleton => Expression::Cached {
                inner: Box::new(expression),
                cell: cell.clone(),
            },
        }
    }
}

impl fmt::Display for Lifestyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Lifestyle {
    type Err = ContainerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "transient" => Ok(Lifestyle::Transient),
            "singleton" => Ok(Lifestyle::Singleton),
            other => Err(ContainerError::configuration(format!(
                "unknown lifestyle '{}'",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lifestyle() {
        assert_eq!("Singleton".parse::<Lifestyle>().unwrap(), Lifestyle::Singleton);
        assert_eq!(" transient ".parse::<Lifestyle>().unwrap(), Lifestyle::Transient);
        assert!("scoped".parse::<Lifestyle>().is_err());
    }

    #[test]
    fn test_singleton_wraps_once() {
        let cell = Arc::new(OnceCell::new());
        let expression = Expression::Constant(Arc::new(1_u8) as Instance);

        let wrapped = Lifestyle::Singleton.apply(expression, &cell);
        assert!(wrapped.is_cached());
        let again = Lifestyle::Singleton.apply(wrapped, &cell);
        assert!(matches!(again, Expression::Cached { ref inner, .. } if !inner.is_cached()));
        assert!(!Lifestyle::Transient
            .apply(Expression::Constant(Arc::new(1_u8) as Instance), &cell)
            .is_cached());
    }
}
