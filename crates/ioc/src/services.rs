//! Коллабораторы, которые registration получает от контейнера
//!
//! Registration не знает про конкретный контейнер: выбор конструктора,
//! parameter injection, initializers и decoration поставляются через
//! [`ContainerServices`]. Registration хранит `Weak` ссылку на владельца.

use std::sync::Arc;

use crate::decoration::ExpressionBuilt;
use crate::errors::{ContainerError, Result};
use crate::expression::{Expression, InitializerAction};
use crate::producer::InstanceProducer;
use crate::types::{ConstructorDescriptor, ParameterDescriptor, TypeDescriptor};

/// Кто потребляет параметр конструктора
#[derive(Debug, Clone, Copy)]
pub struct InjectionConsumer<'a> {
    pub service_type: &'a TypeDescriptor,
    pub implementation_type: &'a TypeDescriptor,
}

pub trait ContainerServices: Send + Sync {
    /// Producer, зарегистрированный для service type (если есть)
    fn producer_for(&self, service_type: &TypeDescriptor) -> Option<Arc<InstanceProducer>>;

    /// Constructor resolution behavior
    fn select_constructor(
        &self,
        service_type: &TypeDescriptor,
        implementation_type: &TypeDescriptor,
    ) -> Result<ConstructorDescriptor>;

    /// Parameter injection behavior. `Ok(None)` - выражение построить нельзя.
    fn expression_for(
        &self,
        consumer: &InjectionConsumer<'_>,
        parameter: &ParameterDescriptor,
    ) -> Result<Option<Expression>>;

    /// Initializer для конкретного типа, собранный из всех подходящих
    fn initializer_for(&self, implementation_type: &TypeDescriptor) -> Result<Option<InitializerAction>>;

    /// Expression-building hooks, вызываются до lifestyle
    fn on_expression_building(
        &self,
        service_type: &TypeDescriptor,
        implementation_type: &TypeDescriptor,
        expression: Expression,
    ) -> Expression;

    /// Expression-built event: здесь применяются decorators
    fn on_expression_built(
        &self,
        producer: &Arc<InstanceProducer>,
        built: &mut ExpressionBuilt,
    ) -> Result<()>;
}

/// Constructor resolution по умолчанию: ровно один публичный конструктор
pub fn select_single_constructor(implementation_type: &TypeDescriptor) -> Result<ConstructorDescriptor> {
    let mut constructors = implementation_type.constructors();
    match constructors.len() {
        1 => Ok(constructors.remove(0)),
        0 => Err(ContainerError::NoPublicConstructor {
            implementation: implementation_type.to_string(),
        }),
        count => Err(ContainerError::AmbiguousConstructor {
            implementation: implementation_type.to_string(),
            count,
        }),
    }
}
