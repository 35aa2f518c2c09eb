//! Сопоставление кандидатов с запрошенным типом.
//!
//! Open generic кандидат закрывается через унификацию его формы (самого типа
//! или одного из supertypes) с запрошенным closed type. Полученные bindings
//! обязаны покрывать все свободные параметры и удовлетворять их constraints.

use tracing::trace;

use super::descriptor::{Bindings, Constraint, GenericParameter, TypeDescriptor};
use super::template::{CandidateTemplate, ResolvedCandidate, TemplateKind};

#[derive(Debug, Default, Clone, Copy)]
pub struct TypeMatcher;

impl TypeMatcher {
    pub fn new() -> Self {
        Self
    }

    /// Принимает или отклоняет кандидата для запрошенного типа.
    /// `None` означает "не подходит", это не ошибка.
    pub fn try_resolve(
        &self,
        candidate: &CandidateTemplate,
        requested: &TypeDescriptor,
    ) -> Option<ResolvedCandidate> {
        let implementation = match candidate.kind() {
            TemplateKind::NonGeneric | TemplateKind::ClosedGeneric => {
                if candidate.implementation().is_assignable_to(requested) {
                    Some(candidate.implementation().clone())
                } else {
                    None
                }
            }
            TemplateKind::OpenGeneric => {
                self.close_implementation(candidate.implementation(), requested)
            }
        }?;

        Some(ResolvedCandidate::new(
            candidate.clone(),
            requested.clone(),
            implementation,
        ))
    }

    /// Закрыть (возможно open) реализацию так, чтобы она была assignable к
    /// `requested`
    pub fn close_implementation(
        &self,
        implementation: &TypeDescriptor,
        requested: &TypeDescriptor,
    ) -> Option<TypeDescriptor> {
        let free = implementation.free_parameters();
        if free.is_empty() {
            return implementation
                .is_assignable_to(requested)
                .then(|| implementation.clone());
        }

        let mut solutions: Vec<Bindings> = Vec::new();
        let shapes = std::iter::once(implementation.clone()).chain(implementation.all_supertypes());
        for shape in shapes {
            let mut bindings = Bindings::new();
            if !Self::unify(&shape, requested, &mut bindings) {
                continue;
            }
            if free.iter().any(|p| !bindings.contains_key(p)) {
                continue;
            }
            if !solutions.contains(&bindings) {
                solutions.push(bindings);
            }
        }

        let bindings = match solutions.len() {
            0 => return None,
            1 => solutions.pop()?,
            count => {
                trace!(
                    "{} implements {} in {} different ways, skipping",
                    implementation,
                    requested,
                    count
                );
                return None;
            }
        };

        for parameter in &free {
            let declared = declared_parameter(implementation, parameter);
            let bound = bindings.get(parameter)?;
            if !Self::satisfies_constraints(declared, bound, &bindings) {
                trace!(
                    "{} rejected for {}: {} violates constraints of '{}'",
                    implementation,
                    requested,
                    bound,
                    parameter.name()
                );
                return None;
            }
        }

        let closed = implementation.substitute(&bindings);
        closed.is_assignable_to(requested).then_some(closed)
    }

    /// Структурная унификация `pattern` с `actual`, записывает найденные
    /// bindings. Возвращает false при конфликте.
    pub fn unify(pattern: &TypeDescriptor, actual: &TypeDescriptor, bindings: &mut Bindings) -> bool {
        if let Some(parameter) = pattern.generic_parameter() {
            return match bindings.get(parameter) {
                Some(existing) => existing == actual,
                None => {
                    bindings.insert(parameter.clone(), actual.clone());
                    true
                }
            };
        }

        if !pattern.same_definition(actual) {
            return false;
        }

        let (expected, found) = (pattern.arguments(), actual.arguments());
        expected.len() == found.len()
            && expected
                .iter()
                .zip(found)
                .all(|(p, a)| Self::unify(p, a, bindings))
    }

    /// Все constraints параметра выполняются для `bound`.
    /// Open `bound` удовлетворяет constraint только если его собственные
    /// constraints его гарантируют.
    pub fn satisfies_constraints(
        parameter: &GenericParameter,
        bound: &TypeDescriptor,
        bindings: &Bindings,
    ) -> bool {
        parameter
            .constraints()
            .iter()
            .all(|constraint| Self::satisfies(constraint, bound, bindings))
    }

    fn satisfies(constraint: &Constraint, bound: &TypeDescriptor, bindings: &Bindings) -> bool {
        match constraint {
            Constraint::DefaultConstructor => bound.has_default_constructor(),
            Constraint::ValueType => bound.is_value_type(),
            Constraint::ReferenceType => bound.is_reference_type(),
            Constraint::AssignableTo(target) => bound.is_assignable_to(&target.substitute(bindings)),
        }
    }
}

/// Descriptor может нести handle из `TypeDefinitionBuilder::parameter`
/// (например после `close`), а такой handle создан до сбора constraints.
/// Constraints есть только у копии в `definition.parameters()`, она
/// находится по позиции.
fn declared_parameter<'a>(
    implementation: &'a TypeDescriptor,
    parameter: &'a GenericParameter,
) -> &'a GenericParameter {
    implementation
        .definition()
        .and_then(|definition| definition.parameters().get(parameter.position()))
        .filter(|declared| *declared == parameter)
        .unwrap_or(parameter)
}
