//! Open generic registrations, initializers, hooks, instances и verify

mod fixtures;

use std::sync::{Arc, Mutex};

use fixtures::{catalogue, implementation_name};
use ioc::{
    as_component, ConstructorDescriptor, Container, ContainerError, ContainerOptions, Expression,
    ExpressionBuildingHook, InitializerAction, Instance, Lifestyle, ParameterDescriptor,
    TypeDefinition, TypeDescriptor,
};
use serde_json::json;

fn reference_with_default_ctor(name: &str) -> TypeDescriptor {
    TypeDefinition::reference(name)
        .default_constructor()
        .build()
        .unwrap()
        .to_type()
}

#[test]
fn test_open_generic_registration_is_closed_on_demand() {
    let c = catalogue();
    let container = Container::with_defaults();
    container
        .register(&c.open_handler(), &c.a, Lifestyle::Transient)
        .unwrap();

    let service = c.handler_of(&c.class_event);
    let instance = container.get_instance(&service).unwrap();
    assert_eq!(implementation_name(&instance), "A<ClassEvent>");

    let first = container.get_producer(&service).unwrap();
    let second = container.get_producer(&service).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(container.stats().open_generic_registrations, 1);
}

#[test]
fn test_constraints_apply_to_open_generic_registrations() {
    let c = catalogue();
    let container = Container::with_defaults();
    container
        .register(&c.open_handler(), &c.b, Lifestyle::Transient)
        .unwrap();

    assert!(container.get_instance(&c.handler_of(&c.struct_event)).is_ok());
    assert!(matches!(
        container.get_instance(&c.handler_of(&c.class_event)),
        Err(ContainerError::ServiceNotFound { .. })
    ));
}

#[test]
fn test_explicit_closed_registration_wins_over_open_generic() {
    let c = catalogue();
    let container = Container::with_defaults();
    container
        .register(&c.open_handler(), &c.a, Lifestyle::Transient)
        .unwrap();
    container
        .register(&c.handler_of(&c.struct_event), &c.c, Lifestyle::Transient)
        .unwrap();

    let instance = container
        .get_instance(&c.handler_of(&c.struct_event))
        .unwrap();
    assert_eq!(implementation_name(&instance), "C");
}

#[test]
fn test_duplicate_open_generic_registration() {
    let c = catalogue();
    let strict = Container::with_defaults();
    strict
        .register(&c.open_handler(), &c.a, Lifestyle::Transient)
        .unwrap();
    assert!(matches!(
        strict.register(&c.open_handler(), &c.b, Lifestyle::Transient),
        Err(ContainerError::DuplicateRegistration { .. })
    ));

    let relaxed = Container::new(ContainerOptions::development());
    relaxed
        .register(&c.open_handler(), &c.a, Lifestyle::Transient)
        .unwrap();
    relaxed
        .register(&c.open_handler(), &c.b, Lifestyle::Transient)
        .unwrap();
    let instance = relaxed
        .get_instance(&c.handler_of(&c.struct_event))
        .unwrap();
    assert_eq!(implementation_name(&instance), "B<StructEvent>");
}

#[test]
fn test_initializers_run_in_registration_order() {
    let service = TypeDefinition::interface("Job").build().unwrap().to_type();
    let job = TypeDefinition::reference("NightlyJob")
        .implements(service.clone())
        .default_constructor()
        .build()
        .unwrap()
        .to_type();

    let container = Container::with_defaults();
    container.register(&service, &job, Lifestyle::Transient).unwrap();

    let first: InitializerAction = Arc::new(|instance: &Instance| -> anyhow::Result<()> {
        let component = as_component(instance).ok_or_else(|| anyhow::anyhow!("not a component"))?;
        component.set_property("steps", json!(["by-interface"]));
        Ok(())
    });
    let second: InitializerAction = Arc::new(|instance: &Instance| -> anyhow::Result<()> {
        let component = as_component(instance).ok_or_else(|| anyhow::anyhow!("not a component"))?;
        let mut steps = component.property("steps").unwrap_or_else(|| json!([]));
        if let Some(list) = steps.as_array_mut() {
            list.push(json!("by-implementation"));
        }
        component.set_property("steps", steps);
        Ok(())
    });
    container.register_initializer(&service, first);
    container.register_initializer(&job, second);

    let instance = container.get_instance(&service).unwrap();
    assert_eq!(
        as_component(&instance).unwrap().property("steps"),
        Some(json!(["by-interface", "by-implementation"]))
    );
}

#[test]
fn test_initializer_runs_once_for_singleton() {
    let clock = reference_with_default_ctor("Clock");
    let container = Container::with_defaults();
    container.register(&clock, &clock, Lifestyle::Singleton).unwrap();

    let calls = Arc::new(Mutex::new(0_usize));
    let counter = calls.clone();
    let initializer: InitializerAction = Arc::new(move |_: &Instance| -> anyhow::Result<()> {
        *counter.lock().unwrap() += 1;
        Ok(())
    });
    container.register_initializer(&clock, initializer);

    container.get_instance(&clock).unwrap();
    container.get_instance(&clock).unwrap();
    assert_eq!(*calls.lock().unwrap(), 1);
}

#[test]
fn test_expression_building_hooks_are_chained() {
    let clock = reference_with_default_ctor("Clock");
    let container = Container::with_defaults();
    container.register(&clock, &clock, Lifestyle::Transient).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let replace: ExpressionBuildingHook = Arc::new(
        |_: &TypeDescriptor, _: &TypeDescriptor, _: Expression| -> Expression {
            Expression::Constant(Arc::new("stub clock".to_string()) as Instance)
        },
    );
    let recorder = seen.clone();
    let observe: ExpressionBuildingHook = Arc::new(
        move |service: &TypeDescriptor, implementation: &TypeDescriptor, expression: Expression| -> Expression {
            recorder.lock().unwrap().push(format!(
                "{} -> {} constant={}",
                service,
                implementation,
                matches!(expression, Expression::Constant(_))
            ));
            expression
        },
    );
    container.add_expression_building_hook(replace);
    container.add_expression_building_hook(observe);

    let instance = container.get_instance(&clock).unwrap();
    assert_eq!(
        instance.downcast_ref::<String>().map(String::as_str),
        Some("stub clock")
    );
    assert_eq!(
        *seen.lock().unwrap(),
        vec!["Clock -> Clock constant=true".to_string()]
    );
}

#[test]
fn test_registered_instance_is_returned_as_is() {
    let settings = TypeDefinition::interface("Settings").build().unwrap().to_type();
    let value: Instance = Arc::new(json!({ "retries": 3 }));

    let container = Container::with_defaults();
    container.register_instance(&settings, value.clone()).unwrap();

    let resolved = container.get_instance(&settings).unwrap();
    assert!(Arc::ptr_eq(&resolved, &value));
    assert_eq!(
        container.get_producer(&settings).unwrap().lifestyle(),
        Lifestyle::Singleton
    );
}

#[test]
fn test_singleton_dependency_is_shared_by_transient_consumers() {
    let clock = reference_with_default_ctor("Clock");
    let scheduler = TypeDefinition::reference("Scheduler")
        .constructor(ConstructorDescriptor::new(vec![ParameterDescriptor::new(
            "clock",
            clock.clone(),
        )]))
        .build()
        .unwrap()
        .to_type();

    let container = Container::with_defaults();
    container.register(&clock, &clock, Lifestyle::Singleton).unwrap();
    container
        .register(&scheduler, &scheduler, Lifestyle::Transient)
        .unwrap();

    let producer = container.get_producer(&scheduler).unwrap();
    container.get_instance(&scheduler).unwrap();
    let relationships = producer.relationships();

    assert_eq!(relationships.len(), 1);
    assert_eq!(relationships[0].implementation_type(), &scheduler);
    assert_eq!(relationships[0].lifestyle(), Lifestyle::Transient);
    assert_eq!(relationships[0].dependency().lifestyle(), Lifestyle::Singleton);
}

#[test]
fn test_verify_builds_all_registrations() {
    let clock = reference_with_default_ctor("Clock");
    let database = reference_with_default_ctor("Database");
    let repository = TypeDefinition::reference("Repository")
        .constructor(ConstructorDescriptor::new(vec![ParameterDescriptor::new(
            "database",
            database.clone(),
        )]))
        .build()
        .unwrap()
        .to_type();

    let container = Container::with_defaults();
    container.register(&clock, &clock, Lifestyle::Transient).unwrap();
    container
        .register(&repository, &repository, Lifestyle::Transient)
        .unwrap();

    assert!(matches!(
        container.verify(),
        Err(ContainerError::MissingParameterExpression { .. })
    ));

    container
        .register(&database, &database, Lifestyle::Transient)
        .unwrap();
    container.verify().unwrap();

    let stats = container.stats();
    assert_eq!(stats.registrations, 3);
    assert_eq!(stats.producers_built, 3);
    assert_eq!(stats.instances_created, 0);
}
