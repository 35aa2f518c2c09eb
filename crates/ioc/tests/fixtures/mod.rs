//! Общие fixtures для интеграционных тестов: каталог событий и handlers

#![allow(dead_code)]

use std::sync::Arc;

use ioc::{
    as_component, Constraint, ConstructorDescriptor, Instance, ParameterDescriptor,
    TypeDefinition, TypeDescriptor,
};

// === TEST FIXTURES ===

pub struct Catalogue {
    pub handler: Arc<TypeDefinition>,
    pub struct_event: TypeDescriptor,
    pub class_event: TypeDescriptor,
    pub no_default_ctor_event: TypeDescriptor,
    /// `A<T> : Handler<T> where T : new()`
    pub a: TypeDescriptor,
    /// `B<T> : Handler<T> where T : struct`
    pub b: TypeDescriptor,
    /// `C : Handler<StructEvent>`
    pub c: TypeDescriptor,
    /// `LoggingDecorator<T> : Handler<T>`, принимает `Handler<T>`
    pub logging_decorator: TypeDescriptor,
    /// `RetryDecorator<T> : Handler<T>`, принимает `Handler<T>`
    pub retry_decorator: TypeDescriptor,
    /// `StructOnlyDecorator<T> : Handler<T> where T : struct`
    pub struct_only_decorator: TypeDescriptor,
}

impl Catalogue {
    pub fn handler_of(&self, event: &TypeDescriptor) -> TypeDescriptor {
        self.handler
            .close(vec![event.clone()])
            .expect("Handler takes one type argument")
    }

    pub fn open_handler(&self) -> TypeDescriptor {
        self.handler.to_type()
    }
}

pub fn catalogue() -> Catalogue {
    common::init_test_logging();
    let handler = TypeDefinition::interface("Handler")
        .generic_parameters(&["T"])
        .build()
        .expect("Handler definition");

    let struct_event = TypeDefinition::value("StructEvent")
        .build()
        .expect("StructEvent definition")
        .to_type();
    let class_event = TypeDefinition::reference("ClassEvent")
        .default_constructor()
        .build()
        .expect("ClassEvent definition")
        .to_type();
    let no_default_ctor_event = TypeDefinition::reference("NoDefaultCtorEvent")
        .constructor(ConstructorDescriptor::new(vec![ParameterDescriptor::new(
            "payload",
            struct_event.clone(),
        )]))
        .build()
        .expect("NoDefaultCtorEvent definition")
        .to_type();

    let a = open_handler_impl(&handler, "A", Some(Constraint::DefaultConstructor));
    let b = open_handler_impl(&handler, "B", Some(Constraint::ValueType));
    let c = TypeDefinition::reference("C")
        .implements(handler.close(vec![struct_event.clone()]).expect("closed handler"))
        .default_constructor()
        .build()
        .expect("C definition")
        .to_type();

    let logging_decorator = decorator(&handler, "LoggingDecorator", None);
    let retry_decorator = decorator(&handler, "RetryDecorator", None);
    let struct_only_decorator = decorator(&handler, "StructOnlyDecorator", Some(Constraint::ValueType));

    Catalogue {
        handler,
        struct_event,
        class_event,
        no_default_ctor_event,
        a,
        b,
        c,
        logging_decorator,
        retry_decorator,
        struct_only_decorator,
    }
}

fn open_handler_impl(
    handler: &Arc<TypeDefinition>,
    name: &str,
    constraint: Option<Constraint>,
) -> TypeDescriptor {
    let mut builder = TypeDefinition::reference(name).generic_parameters(&["T"]);
    let t = builder.parameter("T");
    if let Some(constraint) = constraint {
        builder = builder.constraint("T", constraint);
    }
    builder
        .implements(handler.close(vec![t]).expect("open handler shape"))
        .default_constructor()
        .build()
        .expect("handler implementation definition")
        .to_type()
}

fn decorator(
    handler: &Arc<TypeDefinition>,
    name: &str,
    constraint: Option<Constraint>,
) -> TypeDescriptor {
    let mut builder = TypeDefinition::reference(name).generic_parameters(&["T"]);
    let t = builder.parameter("T");
    if let Some(constraint) = constraint {
        builder = builder.constraint("T", constraint);
    }
    let handler_t = handler.close(vec![t]).expect("open handler shape");
    builder
        .implements(handler_t.clone())
        .constructor(ConstructorDescriptor::new(vec![ParameterDescriptor::new(
            "inner", handler_t,
        )]))
        .build()
        .expect("decorator definition")
        .to_type()
}

/// Имя конкретного типа созданного экземпляра
pub fn implementation_name(instance: &Instance) -> String {
    as_component(instance)
        .map(|c| c.implementation().to_string())
        .unwrap_or_default()
}

/// Цепочка decorators от внешнего к внутреннему экземпляру
pub fn decoration_chain(instance: &Instance) -> Vec<String> {
    let mut chain = Vec::new();
    let mut current = as_component(instance);
    while let Some(component) = current {
        chain.push(component.implementation().to_string());
        current = component.component_argument(0);
    }
    chain
}

pub fn names(types: impl IntoIterator<Item = TypeDescriptor>) -> Vec<String> {
    types.into_iter().map(|t| t.to_string()).collect()
}
