//! Компиляция expressions в вызываемые factories

use std::sync::Arc;

use tracing::debug;

use crate::errors::{ContainerError, Result};
use crate::expression::{default_activator, Expression, Instance};
use crate::types::TypeDescriptor;

/// Скомпилированная factory одного producer
#[derive(Clone)]
pub struct CompiledFactory {
    service_type: TypeDescriptor,
    expression: Arc<Expression>,
}

impl CompiledFactory {
    pub fn compile(service_type: TypeDescriptor, expression: Expression) -> Self {
        debug!("Compiled factory for {}: {:?}", service_type, expression);
        Self {
            service_type,
            expression: Arc::new(expression),
        }
    }

    pub fn service_type(&self) -> &TypeDescriptor {
        &self.service_type
    }

    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    pub fn create(&self) -> Result<Instance> {
        evaluate(&self.expression)
    }
}

impl std::fmt::Debug for CompiledFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledFactory")
            .field("service_type", &self.service_type.to_string())
            .field("expression", &self.expression)
            .finish()
    }
}

fn evaluate(expression: &Expression) -> Result<Instance> {
    match expression {
        Expression::Constant(instance) => Ok(instance.clone()),
        Expression::New {
            implementation,
            constructor,
            arguments,
        } => {
            let values = arguments.iter().map(evaluate).collect::<Result<Vec<_>>>()?;
            let activator = constructor
                .activator()
                .cloned()
                .unwrap_or_else(default_activator);
            activator(implementation, values)
                .map_err(|e| ContainerError::activation_failed(implementation, e))
        }
        Expression::Invoke {
            service_type,
            factory,
        } => match factory() {
            Ok(Some(instance)) => Ok(instance),
            Ok(None) => Err(ContainerError::NullInstance {
                service: service_type.to_string(),
            }),
            Err(e) => Err(ContainerError::activation_failed(service_type, e)),
        },
        Expression::Initialize {
            implementation,
            inner,
            initializer,
        } => {
            let instance = evaluate(inner)?;
            initializer(&instance)
                .map_err(|e| ContainerError::initializer_failed(implementation, e))?;
            Ok(instance)
        }
        Expression::Cached { inner, cell } => cell.get_or_try_init(|| evaluate(inner)).cloned(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use once_cell::sync::OnceCell;

    use super::*;
    use crate::expression::{Activator, InstanceFactory};
    use crate::types::{ConstructorDescriptor, TypeDefinition};

    fn service() -> TypeDescriptor {
        TypeDefinition::reference("Mailer").build().unwrap().to_type()
    }

    #[test]
    fn test_null_factory_result_is_reported() {
        let factory: InstanceFactory = Arc::new(|| -> anyhow::Result<Option<Instance>> { Ok(None) });
        let compiled = CompiledFactory::compile(
            service(),
            Expression::Invoke {
                service_type: service(),
                factory,
            },
        );

        assert!(matches!(
            compiled.create(),
            Err(ContainerError::NullInstance { .. })
        ));
    }

    #[test]
    fn test_activator_failure_becomes_activation_error() {
        let activator: Activator = Arc::new(
            |_: &TypeDescriptor, _: Vec<Instance>| -> anyhow::Result<Instance> {
                Err(anyhow::anyhow!("smtp down"))
            },
        );
        let constructor = ConstructorDescriptor::parameterless().with_activator(activator);
        let compiled = CompiledFactory::compile(
            service(),
            Expression::New {
                implementation: service(),
                constructor,
                arguments: Vec::new(),
            },
        );

        let error = compiled.create().unwrap_err();
        assert_eq!(error.category(), "construction");
        assert!(error.to_string().contains("smtp down"));
    }

    #[test]
    fn test_cached_expression_evaluates_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let factory: InstanceFactory = Arc::new(move || -> anyhow::Result<Option<Instance>> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Some(Arc::new(42_u32) as Instance))
        });
        let compiled = CompiledFactory::compile(
            service(),
            Expression::Cached {
                inner: Box::new(Expression::Invoke {
                    service_type: service(),
                    factory,
                }),
                cell: Arc::new(OnceCell::new()),
            },
        );

        let a = compiled.create().unwrap();
        let b = compiled.create().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
