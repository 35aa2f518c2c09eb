//! Construction expressions и runtime представление экземпляров
//!
//! Expression - данные, описывающие как создать экземпляр. Они строятся один
//! раз на producer, могут быть переписаны decorators и hooks, и затем
//! компилируются в [`crate::CompiledFactory`].

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::types::{ConstructorDescriptor, TypeDescriptor};

/// Созданный контейнером экземпляр
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Пользовательская factory. `Ok(None)` трактуется как null результат.
pub type InstanceFactory = Arc<dyn Fn() -> anyhow::Result<Option<Instance>> + Send + Sync>;

/// Действие, выполняемое над только что созданным экземпляром
pub type InitializerAction = Arc<dyn Fn(&Instance) -> anyhow::Result<()> + Send + Sync>;

/// Создание экземпляра из конкретного типа и уже созданных аргументов
/// конструктора
pub type Activator = Arc<dyn Fn(&TypeDescriptor, Vec<Instance>) -> anyhow::Result<Instance> + Send + Sync>;

#[derive(Clone)]
pub enum Expression {
    /// Готовое значение (registered instance, default value параметра)
    Constant(Instance),
    /// Вызов конструктора
    New {
        implementation: TypeDescriptor,
        constructor: ConstructorDescriptor,
        arguments: Vec<Expression>,
    },
    /// Вызов пользовательской factory
    Invoke {
        service_type: TypeDescriptor,
        factory: InstanceFactory,
    },
    /// Выполнить initializer после создания
    Initialize {
        implementation: TypeDescriptor,
        inner: Box<Expression>,
        initializer: InitializerAction,
    },
    /// Кешировать результат на время жизни registration
    Cached {
        inner: Box<Expression>,
        cell: Arc<OnceCell<Instance>>,
    },
}

impl Expression {
    /// Тип, который создается выражением, если он известен статически
    pub fn implementation_type(&self) -> Option<&TypeDescriptor> {
        match self {
            Expression::New { implementation, .. } => Some(implementation),
            Expression::Initialize { implementation, .. } => Some(implementation),
            Expression::Cached { inner, .. } => inner.implementation_type(),
            Expression::Constant(_) | Expression::Invoke { .. } => None,
        }
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, Expression::Cached { .. })
    }

    /// Аргументы конструктора, если выражение сводится к `New`
    pub fn constructor_arguments(&self) -> &[Expression] {
        match self {
            Expression::New { arguments, .. } => arguments,
            Expression::Initialize { inner, .. } | Expression::Cached { inner, .. } => {
                inner.constructor_arguments()
            }
            Expression::Constant(_) | Expression::Invoke { .. } => &[],
        }
    }
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Constant(_) => f.write_str("Constant"),
            Expression::New {
                implementation,
                arguments,
                ..
            } => f
                .debug_struct("New")
                .field("implementation", &implementation.to_string())
                .field("arguments", arguments)
                .finish(),
            Expression::Invoke { service_type, .. } => f
                .debug_struct("Invoke")
                .field("service_type", &service_type.to_string())
                .finish(),
            Expression::Initialize {
                implementation,
                inner,
                ..
            } => f
                .debug_struct("Initialize")
                .field("implementation", &implementation.to_string())
                .field("inner", inner)
                .finish(),
            Expression::Cached { inner, cell } => f
                .debug_struct("Cached")
                .field("created", &cell.get().is_some())
                .field("inner", inner)
                .finish(),
        }
    }
}

/// Экземпляр, создаваемый activator по умолчанию.
///
/// Хранит конкретный тип, аргументы конструктора (в том числе decoratee) и
/// произвольные свойства, которые могут заполнять initializers.
pub struct Component {
    implementation: TypeDescriptor,
    arguments: Vec<Instance>,
    properties: Mutex<Map<String, Value>>,
}

impl Component {
    pub fn new(implementation: TypeDescriptor, arguments: Vec<Instance>) -> Self {
        Self {
            implementation,
            arguments,
            properties: Mutex::new(Map::new()),
        }
    }

    pub fn implementation(&self) -> &TypeDescriptor {
        &self.implementation
    }

    pub fn arguments(&self) -> &[Instance] {
        &self.arguments
    }

    pub fn argument(&self, index: usize) -> Option<&Instance> {
        self.arguments.get(index)
    }

    /// Аргумент как `Component` (например, decoratee)
    pub fn component_argument(&self, index: usize) -> Option<&Component> {
        self.argument(index).and_then(|a| a.downcast_ref::<Component>())
    }

    pub fn set_property(&self, key: &str, value: Value) {
        self.properties.lock().insert(key.to_string(), value);
    }

    pub fn property(&self, key: &str) -> Option<Value> {
        self.properties.lock().get(key).cloned()
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("implementation", &self.implementation.to_string())
            .field("arguments", &self.arguments.len())
            .field("properties", &*self.properties.lock())
            .finish()
    }
}

pub fn default_activator() -> Activator {
    Arc::new(|implementation: &TypeDescriptor, arguments: Vec<Instance>| {
        Ok(Arc::new(Component::new(implementation.clone(), arguments)) as Instance)
    })
}

/// Удобное приведение экземпляра к `Component`
pub fn as_component(instance: &Instance) -> Option<&Component> {
    instance.downcast_ref::<Component>()
}
