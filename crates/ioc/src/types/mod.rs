//! Type catalogue: descriptors, candidate templates и сопоставление
//! кандидатов с запросами

pub mod descriptor;
pub mod matcher;
pub mod template;

pub use descriptor::{
    Bindings, Constraint, ConstructorDescriptor, GenericParameter, ParameterDescriptor,
    TypeDefinition, TypeDefinitionBuilder, TypeDescriptor, TypeKind,
};
pub use matcher::TypeMatcher;
pub use template::{CandidateTemplate, ResolvedCandidate, TemplateId, TemplateKind};
