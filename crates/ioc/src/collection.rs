//! Collection resolution
//!
//! Из пула candidate templates выбираются те, что применимы к запрошенному
//! element type. Порядок результата - порядок регистрации, без
//! переупорядочивания по kind или specificity.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::producer::InstanceProducer;
use crate::types::{CandidateTemplate, ResolvedCandidate, TemplateId, TypeDescriptor, TypeMatcher};

/// Источник producers для принятых кандидатов (registry контейнера)
pub trait CandidateProducerSource {
    fn producer_for_candidate(&self, candidate: &ResolvedCandidate) -> Arc<InstanceProducer>;
}

#[derive(Debug, Default, Clone)]
pub struct CollectionResolver {
    matcher: TypeMatcher,
}

impl CollectionResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Стабильный фильтр кандидатов. Пустой результат - не ошибка.
    pub fn resolve(&self, requested: &TypeDescriptor, candidates: &[CandidateTemplate]) -> Vec<ResolvedCandidate> {
        let resolved: Vec<ResolvedCandidate> = candidates
            .iter()
            .filter_map(|candidate| self.matcher.try_resolve(candidate, requested))
            .collect();

        debug!(
            "Collection {}: {} of {} candidates applicable",
            requested,
            resolved.len(),
            candidates.len()
        );
        resolved
    }

    /// Объединение по нескольким запрошенным типам. Один template с одной
    /// конкретной реализацией попадает в результат один раз; разные templates
    /// с одинаковой реализацией остаются оба.
    pub fn resolve_all(
        &self,
        requested_types: &[TypeDescriptor],
        candidates: &[CandidateTemplate],
    ) -> Vec<ResolvedCandidate> {
        let mut seen: HashSet<(TemplateId, TypeDescriptor)> = HashSet::new();
        let mut result = Vec::new();

        for requested in requested_types {
            for resolved in self.resolve(requested, candidates) {
                let key = (resolved.template().id(), resolved.implementation().clone());
                if seen.insert(key) {
                    result.push(resolved);
                }
            }
        }

        result
    }

    /// Producers для всех принятых кандидатов, в том же порядке
    pub fn resolve_producers(
        &self,
        requested_types: &[TypeDescriptor],
        candidates: &[CandidateTemplate],
        source: &dyn CandidateProducerSource,
    ) -> Vec<Arc<InstanceProducer>> {
        self.resolve_all(requested_types, candidates)
            .iter()
            .map(|resolved| source.producer_for_candidate(resolved))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::types::{Constraint, TypeDefinition};

    struct Pool {
        handler: Arc<TypeDefinition>,
        struct_event: TypeDescriptor,
        class_event: TypeDescriptor,
        candidates: Vec<CandidateTemplate>,
    }

    fn open(handler: &Arc<TypeDefinition>, name: &str, constraint: Constraint) -> TypeDescriptor {
        let mut builder = TypeDefinition::reference(name).generic_parameters(&["T"]);
        let t = builder.parameter("T");
        builder
            .constraint("T", constraint)
            .implements(handler.close(vec![t]).unwrap())
            .default_constructor()
            .build()
            .unwrap()
            .to_type()
    }

    fn pool() -> Pool {
        let handler = TypeDefinition::interface("Handler")
            .generic_parameters(&["T"])
            .build()
            .unwrap();
        let struct_event = TypeDefinition::value("StructEvent").build().unwrap().to_type();
        let class_event = TypeDefinition::reference("ClassEvent")
            .default_constructor()
            .build()
            .unwrap()
            .to_type();
        let fixed = TypeDefinition::reference("C")
            .implements(handler.close(vec![struct_event.clone()]).unwrap())
            .default_constructor()
            .build()
            .unwrap()
            .to_type();

        let candidates = vec![
            CandidateTemplate::new(open(&handler, "A", Constraint::DefaultConstructor)),
            CandidateTemplate::new(open(&handler, "B", Constraint::ValueType)),
            CandidateTemplate::new(fixed),
        ];

        Pool {
            handler,
            struct_event,
            class_event,
            candidates,
        }
    }

    fn names(resolved: &[ResolvedCandidate]) -> Vec<String> {
        resolved.iter().map(|r| r.implementation().to_string()).collect()
    }

    #[test]
    fn test_registration_order_is_kept() {
        let p = pool();
        let requested = p.handler.close(vec![p.struct_event.clone()]).unwrap();

        let resolved = CollectionResolver::new().resolve(&requested, &p.candidates);
        assert_eq!(
            names(&resolved),
            vec!["A<StructEvent>", "B<StructEvent>", "C"]
        );
    }

    #[test]
    fn test_constraints_filter_candidates() {
        let p = pool();
        let requested = p.handler.close(vec![p.class_event.clone()]).unwrap();

        let resolved = CollectionResolver::new().resolve(&requested, &p.candidates);
        assert_eq!(names(&resolved), vec!["A<ClassEvent>"]);
    }

    #[test]
    fn test_resolve_all_deduplicates_same_template_and_type() {
        let p = pool();
        let requested = p.handler.close(vec![p.struct_event.clone()]).unwrap();

        let resolver = CollectionResolver::new();
        let once = resolver.resolve(&requested, &p.candidates);
        let twice = resolver.resolve_all(&[requested.clone(), requested], &p.candidates);
        assert_eq!(names(&once), names(&twice));
    }

    #[test]
    fn test_distinct_templates_with_same_implementation_are_kept() {
        let p = pool();
        let requested = p.handler.close(vec![p.struct_event.clone()]).unwrap();
        let duplicate = CandidateTemplate::new(p.candidates[2].implementation().clone());
        let candidates = vec![p.candidates[2].clone(), duplicate];

        let resolved = CollectionResolver::new().resolve_all(&[requested], &candidates);
        assert_eq!(names(&resolved), vec!["C", "C"]);
    }
}
