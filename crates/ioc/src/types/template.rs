//! Candidate templates - зарегистрированные реализации до выбора под
//! конкретный запрос

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use super::descriptor::TypeDescriptor;
use super::matcher::TypeMatcher;
use crate::errors::{ContainerError, Result};

static NEXT_TEMPLATE_ID: AtomicU64 = AtomicU64::new(1);

/// Стабильный идентификатор template, используется как ключ кешей
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TemplateId(u64);

impl TemplateId {
    fn next() -> Self {
        Self(NEXT_TEMPLATE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateKind {
    NonGeneric,
    /// Generic реализация со всеми аргументами, например `Handler<StructEvent>`
    ClosedGeneric,
    /// Реализация со свободными параметрами, закрывается под каждый запрос
    OpenGeneric,
}

#[derive(Debug, Clone)]
pub struct CandidateTemplate {
    id: TemplateId,
    kind: TemplateKind,
    implementation: TypeDescriptor,
}

impl CandidateTemplate {
    /// Классифицирует реализацию без проверки против service type
    pub fn new(implementation: TypeDescriptor) -> Self {
        let kind = if implementation.is_open() {
            TemplateKind::OpenGeneric
        } else if implementation.is_generic() {
            TemplateKind::ClosedGeneric
        } else {
            TemplateKind::NonGeneric
        };

        Self {
            id: TemplateId::next(),
            kind,
            implementation,
        }
    }

    /// Template с проверками времени регистрации:
    /// - реализация должна реализовывать service (хотя бы одна форма с тем же
    ///   определением);
    /// - каждый свободный параметр open реализации должен выводиться из
    ///   какой-то формы service, иначе template никогда не будет выбран.
    pub fn for_service(service: &TypeDescriptor, implementation: TypeDescriptor) -> Result<Self> {
        let shapes: Vec<TypeDescriptor> = std::iter::once(implementation.clone())
            .chain(implementation.all_supertypes())
            .filter(|shape| shape.same_definition(service))
            .collect();

        if shapes.is_empty() {
            return Err(ContainerError::implementation_mismatch(
                &implementation,
                service,
            ));
        }

        if !implementation.is_open() {
            if !service.is_open() && !implementation.is_assignable_to(service) {
                return Err(ContainerError::implementation_mismatch(
                    &implementation,
                    service,
                ));
            }
            return Ok(Self::new(implementation));
        }

        let free = implementation.free_parameters();
        let covering = shapes.iter().find(|shape| {
            let occurring = shape.free_parameters();
            free.iter().all(|p| occurring.contains(p))
        });

        if covering.is_none() {
            let occurring = shapes[0].free_parameters();
            let missing = free
                .iter()
                .find(|p| !occurring.contains(p))
                .map(|p| p.name().to_string())
                .unwrap_or_default();
            let service_shape = service
                .definition()
                .map(|d| d.to_type())
                .unwrap_or_else(|| service.clone());
            return Err(ContainerError::unresolvable_type_argument(
                &implementation,
                service_shape,
                missing,
            ));
        }

        if !service.is_open()
            && TypeMatcher::new()
                .close_implementation(&implementation, service)
                .is_none()
        {
            return Err(ContainerError::implementation_mismatch(
                &implementation,
                service,
            ));
        }

        Ok(Self::new(implementation))
    }

    pub fn id(&self) -> TemplateId {
        self.id
    }

    pub fn kind(&self) -> TemplateKind {
        self.kind
    }

    pub fn implementation(&self) -> &TypeDescriptor {
        &self.implementation
    }

    pub fn is_open(&self) -> bool {
        self.kind == TemplateKind::OpenGeneric
    }
}

/// Кандидат, принятый для конкретного запроса
#[derive(Debug, Clone)]
pub struct ResolvedCandidate {
    template: CandidateTemplate,
    requested: TypeDescriptor,
    implementation: TypeDescriptor,
}

impl ResolvedCandidate {
    pub fn new(template: CandidateTemplate, requested: TypeDescriptor, implementation: TypeDescriptor) -> Self {
        Self {
            template,
            requested,
            implementation,
        }
    }

    pub fn template(&self) -> &CandidateTemplate {
        &self.template
    }

    pub fn requested(&self) -> &TypeDescriptor {
        &self.requested
    }

    /// Конкретная (closed) реализация
    pub fn implementation(&self) -> &TypeDescriptor {
        &self.implementation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::descriptor::TypeDefinition;

    #[test]
    fn test_template_kind_classification() {
        let handler = TypeDefinition::interface("Handler")
            .generic_parameters(&["T"])
            .build()
            .unwrap();
        let event = TypeDefinition::value("Tick").build().unwrap().to_type();
        let plain = TypeDefinition::reference("Plain").build().unwrap().to_type();

        assert_eq!(CandidateTemplate::new(plain).kind(), TemplateKind::NonGeneric);
        assert_eq!(
            CandidateTemplate::new(handler.close(vec![event]).unwrap()).kind(),
            TemplateKind::ClosedGeneric
        );
        assert_eq!(
            CandidateTemplate::new(handler.to_type()).kind(),
            TemplateKind::OpenGeneric
        );
    }

    #[test]
    fn test_ids_are_unique() {
        let plain = TypeDefinition::reference("Plain").build().unwrap().to_type();
        let a = CandidateTemplate::new(plain.clone());
        let b = CandidateTemplate::new(plain);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_parameter_missing_from_service_shape_is_rejected() {
        let handler = TypeDefinition::interface("Handler")
            .generic_parameters(&["T"])
            .build()
            .unwrap();
        let mut builder = TypeDefinition::reference("Odd").generic_parameters(&["T", "U"]);
        let t = builder.parameter("T");
        let odd = builder
            .implements(handler.close(vec![t]).unwrap())
            .default_constructor()
            .build()
            .unwrap();

        let error = CandidateTemplate::for_service(&handler.to_type(), odd.to_type()).unwrap_err();
        match error {
            ContainerError::UnresolvableTypeArgument {
                template,
                service,
                parameter,
            } => {
                assert_eq!(template, "Odd<T, U>");
                assert_eq!(service, "Handler<T>");
                assert_eq!(parameter, "U");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unrelated_implementation_is_rejected() {
        let handler = TypeDefinition::interface("Handler")
            .generic_parameters(&["T"])
            .build()
            .unwrap();
        let plain = TypeDefinition::reference("Plain").build().unwrap().to_type();

        assert!(matches!(
            CandidateTemplate::for_service(&handler.to_type(), plain),
            Err(ContainerError::ImplementationMismatch { .. })
        ));
    }
}
