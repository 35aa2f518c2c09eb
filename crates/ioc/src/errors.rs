//! Ошибки IoC контейнера
//!
//! Три класса ошибок:
//! - **Static registration errors** - обнаруживаются в момент регистрации
//!   (unresolvable type argument, неоднозначный/отсутствующий конструктор,
//!   некорректный decorator).
//! - **Construction failures** - возникают при первом построении конкретного
//!   кандидата (parameter injection вернул пустое выражение, factory вернула
//!   null или упала, initializer упал).
//! - **Decoration failures** - ошибки predicate и построения decorator plan.
//!
//! Ни одна ошибка не повторяется внутри контейнера: это ошибки конфигурации,
//! а не transient faults.

use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

/// Nested cause, которую можно клонировать вместе с ошибкой
pub type ErrorSource = Arc<dyn StdError + Send + Sync + 'static>;

pub type Result<T, E = ContainerError> = std::result::Result<T, E>;

/// Основной error type для всех операций контейнера
#[derive(Debug, Error, Clone)]
pub enum ContainerError {
    /// Open generic template содержит параметр, который нельзя вывести из service type
    #[error(
        "The supplied type {template} contains unresolvable type arguments. \
         The type would never be resolved for {service}: type parameter '{parameter}' \
         does not occur in any implemented {service} shape"
    )]
    UnresolvableTypeArgument {
        template: String,
        service: String,
        parameter: String,
    },

    #[error("The supplied type {implementation} does not implement {service}")]
    ImplementationMismatch {
        implementation: String,
        service: String,
    },

    #[error("For the container to be able to create {implementation} it should have exactly one public constructor, but it has none")]
    NoPublicConstructor { implementation: String },

    #[error("For the container to be able to create {implementation} it should have only one public constructor: it has {count}")]
    AmbiguousConstructor { implementation: String, count: usize },

    #[error("Type definition {definition} is malformed: {reason}")]
    MalformedDefinition { definition: String, reason: String },

    #[error("Type {definition} expects {expected} type arguments, but {actual} were supplied")]
    ArityMismatch {
        definition: String,
        expected: usize,
        actual: usize,
    },

    #[error("For the container to be able to use {decorator} as a decorator, its constructor must include a single parameter of type {service}")]
    DecorateeParameterMissing { decorator: String, service: String },

    #[error("Type {service} has already been registered. Enable overriding registrations to replace it")]
    DuplicateRegistration { service: String },

    #[error("No registration for type {service} could be found")]
    ServiceNotFound { service: String },

    #[error(
        "The parameter '{parameter}' of type {parameter_type} in the constructor of {implementation} \
         could not be built: the parameter injection behavior returned no expression"
    )]
    MissingParameterExpression {
        implementation: String,
        parameter: String,
        parameter_type: String,
    },

    #[error("The registered delegate for type {service} returned null")]
    NullInstance { service: String },

    #[error("The construction of {service} failed: {source}")]
    ActivationFailed {
        service: String,
        #[source]
        source: ErrorSource,
    },

    #[error("The initializer for {implementation} failed: {source}")]
    InitializerFailed {
        implementation: String,
        #[source]
        source: ErrorSource,
    },

    #[error("The predicate of decorator {decorator} failed for {service}: {source}")]
    DecoratorPredicateFailed {
        decorator: String,
        service: String,
        #[source]
        source: ErrorSource,
    },

    #[error("The configuration is invalid. {service} is directly or indirectly depending on itself")]
    CyclicDependency { service: String },

    #[error("The container that owns the registration for {implementation} has been dropped")]
    ContainerDropped { implementation: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl ContainerError {
    pub fn unresolvable_type_argument(
        template: impl ToString,
        service: impl ToString,
        parameter: impl ToString,
    ) -> Self {
        ContainerError::UnresolvableTypeArgument {
            template: template.to_string(),
            service: service.to_string(),
            parameter: parameter.to_string(),
        }
    }

    pub fn implementation_mismatch(implementation: impl ToString, service: impl ToString) -> Self {
        ContainerError::ImplementationMismatch {
            implementation: implementation.to_string(),
            service: service.to_string(),
        }
    }

    pub fn malformed_definition(definition: impl ToString, reason: impl Into<String>) -> Self {
        ContainerError::MalformedDefinition {
            definition: definition.to_string(),
            reason: reason.into(),
        }
    }

    /// Обернуть ошибку пользовательского кода (factory, activator) в construction failure
    pub fn activation_failed(service: impl ToString, cause: anyhow::Error) -> Self {
        ContainerError::ActivationFailed {
            service: service.to_string(),
            source: into_source(cause),
        }
    }

    pub fn initializer_failed(implementation: impl ToString, cause: anyhow::Error) -> Self {
        ContainerError::InitializerFailed {
            implementation: implementation.to_string(),
            source: into_source(cause),
        }
    }

    pub fn predicate_failed(
        decorator: impl ToString,
        service: impl ToString,
        cause: anyhow::Error,
    ) -> Self {
        ContainerError::DecoratorPredicateFailed {
            decorator: decorator.to_string(),
            service: service.to_string(),
            source: into_source(cause),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        ContainerError::Configuration {
            message: message.into(),
        }
    }

    /// Ошибка обнаружена при регистрации, а не при первом использовании
    pub fn is_registration_error(&self) -> bool {
        matches!(
            self,
            ContainerError::UnresolvableTypeArgument { .. }
                | ContainerError::ImplementationMismatch { .. }
                | ContainerError::NoPublicConstructor { .. }
                | ContainerError::AmbiguousConstructor { .. }
                | ContainerError::MalformedDefinition { .. }
                | ContainerError::ArityMismatch { .. }
                | ContainerError::DecorateeParameterMissing { .. }
                | ContainerError::DuplicateRegistration { .. }
        )
    }

    /// Get error category for structured log fields
    pub fn category(&self) -> &'static str {
        match self {
            ContainerError::UnresolvableTypeArgument { .. }
            | ContainerError::ImplementationMismatch { .. }
            | ContainerError::MalformedDefinition { .. }
            | ContainerError::ArityMismatch { .. } => "type",
            ContainerError::NoPublicConstructor { .. }
            | ContainerError::AmbiguousConstructor { .. } => "constructor",
            ContainerError::DecorateeParameterMissing { .. }
            | ContainerError::DecoratorPredicateFailed { .. } => "decoration",
            ContainerError::DuplicateRegistration { .. } | ContainerError::ServiceNotFound { .. } => {
                "registration"
            }
            ContainerError::MissingParameterExpression { .. }
            | ContainerError::NullInstance { .. }
            | ContainerError::ActivationFailed { .. }
            | ContainerError::InitializerFailed { .. } => "construction",
            ContainerError::CyclicDependency { .. } => "graph",
            ContainerError::ContainerDropped { .. } => "lifecycle",
            ContainerError::Configuration { .. } => "configuration",
        }
    }
}

/// anyhow::Error не реализует std::error::Error, поэтому идем через Box
fn into_source(cause: anyhow::Error) -> ErrorSource {
    let boxed: Box<dyn StdError + Send + Sync + 'static> = cause.into();
    Arc::from(boxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activation_failure_keeps_nested_cause() {
        let error = ContainerError::activation_failed(
            "Handler<OrderPlaced>",
            anyhow::anyhow!("database unavailable"),
        );

        assert!(error.to_string().contains("Handler<OrderPlaced>"));
        let source = error.source().expect("nested cause should be preserved");
        assert_eq!(source.to_string(), "database unavailable");
        assert_eq!(error.category(), "construction");
        assert!(!error.is_registration_error());
    }

    #[test]
    fn test_unresolvable_type_argument_names_template_and_parameter() {
        let error = ContainerError::unresolvable_type_argument("Odd<T, U>", "Handler<T>", "U");
        let message = error.to_string();

        assert!(message.contains("Odd<T, U>"));
        assert!(message.contains("'U'"));
        assert!(error.is_registration_error());
        assert_eq!(error.category(), "type");
    }
}
