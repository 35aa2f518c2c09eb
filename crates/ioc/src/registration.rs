//! Registration - план производства экземпляров одной реализации
//!
//! Registration строит construction expression: выбирает конструктор,
//! получает выражение для каждого параметра, применяет hooks, initializers и
//! lifestyle. По ходу записывает known relationships (кто от кого зависит).

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

use indexmap::IndexSet;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::trace;

use crate::errors::{ContainerError, Result};
use crate::expression::{Expression, Instance, InstanceFactory};
use crate::lifestyle::Lifestyle;
use crate::producer::InstanceProducer;
use crate::services::{ContainerServices, InjectionConsumer};
use crate::types::TypeDescriptor;

/// Ребро графа зависимостей: реализация с данным lifestyle использует
/// `dependency`
#[derive(Clone)]
pub struct KnownRelationship {
    implementation_type: TypeDescriptor,
    lifestyle: Lifestyle,
    dependency: Arc<InstanceProducer>,
}

impl KnownRelationship {
    pub fn new(
        implementation_type: TypeDescriptor,
        lifestyle: Lifestyle,
        dependency: Arc<InstanceProducer>,
    ) -> Self {
        Self {
            implementation_type,
            lifestyle,
            dependency,
        }
    }

    /// Реализация, которая потребляет зависимость
    pub fn implementation_type(&self) -> &TypeDescriptor {
        &self.implementation_type
    }

    /// Lifestyle потребителя, не зависимости
    pub fn lifestyle(&self) -> Lifestyle {
        self.lifestyle
    }

    pub fn dependency(&self) -> &Arc<InstanceProducer> {
        &self.dependency
    }
}

impl PartialEq for KnownRelationship {
    fn eq(&self, other: &Self) -> bool {
        self.implementation_type == other.implementation_type
            && self.lifestyle == other.lifestyle
            && self.dependency.id() == other.dependency.id()
    }
}

impl Eq for KnownRelationship {}

impl Hash for KnownRelationship {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.implementation_type.hash(state);
        self.lifestyle.hash(state);
        self.dependency.id().hash(state);
    }
}

impl fmt::Debug for KnownRelationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) -> {}",
            self.implementation_type,
            self.lifestyle,
            self.dependency.service_type()
        )
    }
}

/// Decorated expression, которое подставляется в конструктор decorator.
/// `producer` оборачивает то же выражение, decorator зависит от него.
#[derive(Clone)]
pub struct Decoratee {
    pub service_type: TypeDescriptor,
    pub expression: Expression,
    pub producer: Arc<InstanceProducer>,
}

/// Как registration создает экземпляр
#[derive(Clone)]
pub enum InstanceCreator {
    Constructor,
    Factory(InstanceFactory),
    Instance(Instance),
    /// Готовое выражение, lifestyle уже применен
    Expression(Expression),
    Decorator(Decoratee),
}

pub struct Registration {
    implementation_type: TypeDescriptor,
    lifestyle: Lifestyle,
    container: Weak<dyn ContainerServices>,
    creator: InstanceCreator,
    relationships: Mutex<IndexSet<KnownRelationship>>,
    instance_cell: Arc<OnceCell<Instance>>,
}

impl Registration {
    pub fn new(
        implementation_type: TypeDescriptor,
        lifestyle: Lifestyle,
        container: Weak<dyn ContainerServices>,
    ) -> Self {
        Self::with_creator(implementation_type, lifestyle, container, InstanceCreator::Constructor)
    }

    /// Registration через пользовательскую factory. Конкретный тип неизвестен,
    /// поэтому в его роли выступает service type.
    pub fn for_factory(
        service_type: TypeDescriptor,
        lifestyle: Lifestyle,
        factory: InstanceFactory,
        container: Weak<dyn ContainerServices>,
    ) -> Self {
        Self::with_creator(service_type, lifestyle, container, InstanceCreator::Factory(factory))
    }

    pub fn for_instance(
        implementation_type: TypeDescriptor,
        instance: Instance,
        container: Weak<dyn ContainerServices>,
    ) -> Self {
        Self::with_creator(
            implementation_type,
            Lifestyle::Singleton,
            container,
            InstanceCreator::Instance(instance),
        )
    }

    pub fn for_expression(
        implementation_type: TypeDescriptor,
        lifestyle: Lifestyle,
        expression: Expression,
        container: Weak<dyn ContainerServices>,
    ) -> Self {
        Self::with_creator(
            implementation_type,
            lifestyle,
            container,
            InstanceCreator::Expression(expression),
        )
    }

    pub fn for_decorator(
        decorator_type: TypeDescriptor,
        lifestyle: Lifestyle,
        decoratee: Decoratee,
        container: Weak<dyn ContainerServices>,
    ) -> Self {
        Self::with_creator(decorator_type, lifestyle, container, InstanceCreator::Decorator(decoratee))
    }

    fn with_creator(
        implementation_type: TypeDescriptor,
        lifestyle: Lifestyle,
        container: Weak<dyn ContainerServices>,
        creator: InstanceCreator,
    ) -> Self {
        Self {
            implementation_type,
            lifestyle,
            container,
            creator,
            relationships: Mutex::new(IndexSet::new()),
            instance_cell: Arc::new(OnceCell::new()),
        }
    }

    pub fn implementation_type(&self) -> &TypeDescriptor {
        &self.implementation_type
    }

    pub fn lifestyle(&self) -> Lifestyle {
        self.lifestyle
    }

    pub fn creator(&self) -> &InstanceCreator {
        &self.creator
    }

    pub fn is_decorator(&self) -> bool {
        matches!(self.creator, InstanceCreator::Decorator(_))
    }

    /// Выражение передано готовым: hooks и decorators к нему уже применены
    pub fn wraps_expression(&self) -> bool {
        matches!(self.creator, InstanceCreator::Expression(_))
    }

    pub fn container_handle(&self) -> Weak<dyn ContainerServices> {
        self.container.clone()
    }

    fn container(&self) -> Result<Arc<dyn ContainerServices>> {
        self.container
            .upgrade()
            .ok_or_else(|| ContainerError::ContainerDropped {
                implementation: self.implementation_type.to_string(),
            })
    }

    /// Полное выражение: creation -> hooks -> initializer -> lifestyle
    pub fn build_expression(&self, service_type: &TypeDescriptor) -> Result<Expression> {
        match &self.creator {
            InstanceCreator::Instance(instance) => return Ok(Expression::Constant(instance.clone())),
            InstanceCreator::Expression(expression) => return Ok(expression.clone()),
            _ => {}
        }

        let container = self.container()?;
        let expression = match &self.creator {
            InstanceCreator::Factory(factory) => Expression::Invoke {
                service_type: service_type.clone(),
                factory: factory.clone(),
            },
            InstanceCreator::Decorator(decoratee) => {
                self.build_new(container.as_ref(), service_type, Some(decoratee))?
            }
            InstanceCreator::Constructor
            | InstanceCreator::Instance(_)
            | InstanceCreator::Expression(_) => self.build_new(container.as_ref(), service_type, None)?,
        };

        let expression = self.intercept_instance_creation(container.as_ref(), service_type, expression);
        let expression = self.wrap_with_initializer(container.as_ref(), expression)?;
        Ok(self.lifestyle.apply(expression, &self.instance_cell))
    }

    /// Выражение вызова конструктора. Каждый параметр, для которого есть
    /// producer, записывается как known relationship.
    pub fn build_new(
        &self,
        container: &dyn ContainerServices,
        service_type: &TypeDescriptor,
        decoratee: Option<&Decoratee>,
    ) -> Result<Expression> {
        let constructor = container.select_constructor(service_type, &self.implementation_type)?;
        let consumer = InjectionConsumer {
            service_type,
            implementation_type: &self.implementation_type,
        };

        let mut decoratee = decoratee;
        let mut arguments = Vec::with_capacity(constructor.parameters().len());
        for parameter in constructor.parameters() {
            if let Some(decorated) = decoratee.filter(|d| parameter.parameter_type() == &d.service_type) {
                arguments.push(decorated.expression.clone());
                self.add_relationship(KnownRelationship::new(
                    self.implementation_type.clone(),
                    self.lifestyle,
                    decorated.producer.clone(),
                ));
                decoratee = None;
                continue;
            }

            let expression = container.expression_for(&consumer, parameter)?.ok_or_else(|| {
                ContainerError::MissingParameterExpression {
                    implementation: self.implementation_type.to_string(),
                    parameter: parameter.name().to_string(),
                    parameter_type: parameter.parameter_type().to_string(),
                }
            })?;

            if let Some(dependency) = container.producer_for(parameter.parameter_type()) {
                self.add_relationship(KnownRelationship::new(
                    self.implementation_type.clone(),
                    self.lifestyle,
                    dependency,
                ));
            }
            arguments.push(expression);
        }

        trace!(
            "Built constructor call for {} with {} arguments",
            self.implementation_type,
            arguments.len()
        );

        Ok(Expression::New {
            implementation: self.implementation_type.clone(),
            constructor,
            arguments,
        })
    }

    fn intercept_instance_creation(
        &self,
        container: &dyn ContainerServices,
        service_type: &TypeDescriptor,
        expression: Expression,
    ) -> Expression {
        container.on_expression_building(service_type, &self.implementation_type, expression)
    }

    fn wrap_with_initializer(&self, container: &dyn ContainerServices, expression: Expression) -> Result<Expression> {
        Ok(match container.initializer_for(&self.implementation_type)? {
            Some(initializer) => Expression::Initialize {
                implementation: self.implementation_type.clone(),
                inner: Box::new(expression),
                initializer,
            },
            None => expression,
        })
    }

    pub fn add_relationship(&self, relationship: KnownRelationship) {
        self.relationships.lock().insert(relationship);
    }

    /// Заменить весь набор (после decoration)
    pub fn replace_relationships(&self, relationships: impl IntoIterator<Item = KnownRelationship>) {
        let mut guard = self.relationships.lock();
        guard.clear();
        guard.extend(relationships);
    }

    /// Snapshot в порядке добавления
    pub fn relationships(&self) -> Vec<KnownRelationship> {
        self.relationships.lock().iter().cloned().collect()
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let creator = match self.creator {
            InstanceCreator::Constructor => "constructor",
            InstanceCreator::Factory(_) => "factory",
            InstanceCreator::Instance(_) => "instance",
            InstanceCreator::Expression(_) => "expression",
            InstanceCreator::Decorator(_) => "decorator",
        };
        f.debug_struct("Registration")
            .field("implementation_type", &self.implementation_type.to_string())
            .field("lifestyle", &self.lifestyle)
            .field("creator", &creator)
            .field("relationships", &self.relationships.lock().len())
            .finish()
    }
}
