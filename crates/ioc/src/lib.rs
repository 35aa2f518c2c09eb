//! IoC container: производство экземпляров и decoration
//!
//! Основные части:
//! - [`types`] - descriptors типов, candidate templates, сопоставление
//!   open generic кандидатов с запросами;
//! - [`CollectionResolver`] - стабильный выбор применимых кандидатов;
//! - [`Registration`] и [`InstanceProducer`] - построение construction
//!   expressions и граф known relationships;
//! - [`decoration`] - decorators поверх уже построенных expressions;
//! - [`Container`] - registration и resolution API.
//!
//! ```no_run
//! use ioc::{Container, Lifestyle, TypeDefinition};
//!
//! let clock = TypeDefinition::reference("Clock")
//!     .default_constructor()
//!     .build()?
//!     .to_type();
//!
//! let container = Container::with_defaults();
//! container.register(&clock, &clock, Lifestyle::Singleton)?;
//! let _instance = container.get_instance(&clock)?;
//! # Ok::<(), ioc::ContainerError>(())
//! ```

pub mod collection;
pub mod compiler;
pub mod config;
pub mod container;
pub mod decoration;
pub mod errors;
pub mod expression;
pub mod lifestyle;
pub mod producer;
pub mod registration;
pub mod services;
pub mod types;

pub use collection::{CandidateProducerSource, CollectionResolver};
pub use compiler::CompiledFactory;
pub use config::{ContainerOptions, DEFAULT_ENV_PREFIX};
pub use container::{Container, ContainerStats, ExpressionBuildingHook};
pub use decoration::{
    DecorationPass, DecoratorApplication, DecoratorInterceptor, DecoratorPredicate,
    DecoratorPredicateContext, DecoratorRegistration, ExpressionBuilt, ServiceTypeInfo,
};
pub use errors::{ContainerError, Result};
pub use expression::{
    as_component, default_activator, Activator, Component, Expression, InitializerAction,
    Instance, InstanceFactory,
};
pub use lifestyle::Lifestyle;
pub use producer::{InstanceProducer, ProducerId};
pub use registration::{Decoratee, InstanceCreator, KnownRelationship, Registration};
pub use services::{select_single_constructor, ContainerServices, InjectionConsumer};
pub use types::{
    Bindings, CandidateTemplate, Constraint, ConstructorDescriptor, GenericParameter,
    ParameterDescriptor, ResolvedCandidate, TemplateId, TemplateKind, TypeDefinition,
    TypeDefinitionBuilder, TypeDescriptor, TypeKind, TypeMatcher,
};
