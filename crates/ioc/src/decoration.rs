//! Decorators
//!
//! Decorator - реализация service type, которая принимает decorated
//! экземпляр того же service type в конструкторе. Применяется в
//! expression-built event: выражение producer заменяется выражением
//! decorator, в которое подставлено исходное.
//!
//! На один decorated producer строится ровно один decorator plan, даже при
//! конкурентных resolutions (memo под reentrant lock).

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::ReentrantMutex;
use tracing::{debug, trace};

use crate::errors::{ContainerError, Result};
use crate::expression::Expression;
use crate::lifestyle::Lifestyle;
use crate::producer::{InstanceProducer, ProducerId};
use crate::registration::{Decoratee, KnownRelationship, Registration};
use crate::services::{select_single_constructor, ContainerServices};
use crate::types::{CandidateTemplate, TypeDescriptor, TypeMatcher};

/// Predicate решает, применять ли decorator к конкретному producer.
/// Ошибка predicate превращается в [`ContainerError::DecoratorPredicateFailed`].
pub type DecoratorPredicate =
    Arc<dyn Fn(&DecoratorPredicateContext) -> anyhow::Result<bool> + Send + Sync>;

/// Данные expression-built event. Владелец - producer, decorators переписывают
/// поля на месте.
pub struct ExpressionBuilt {
    pub service_type: TypeDescriptor,
    pub implementation_type: TypeDescriptor,
    pub expression: Expression,
    pub lifestyle: Lifestyle,
    pub relationships: Vec<KnownRelationship>,
    pub decorators: Vec<DecoratorApplication>,
}

impl ExpressionBuilt {
    pub fn new(
        service_type: TypeDescriptor,
        implementation_type: TypeDescriptor,
        expression: Expression,
        lifestyle: Lifestyle,
        relationships: Vec<KnownRelationship>,
    ) -> Self {
        Self {
            service_type,
            implementation_type,
            expression,
            lifestyle,
            relationships,
            decorators: Vec::new(),
        }
    }

    /// Что обернет следующий decorator: последний примененный decorator или
    /// исходная реализация
    pub fn wrapped_type(&self) -> &TypeDescriptor {
        self.decorators
            .last()
            .map(|d| &d.decorator_type)
            .unwrap_or(&self.implementation_type)
    }
}

/// Запись о примененном decorator
#[derive(Clone)]
pub struct DecoratorApplication {
    pub decorator_type: TypeDescriptor,
    /// Обернутый тип: исходная реализация или предыдущий decorator
    pub implementation_type: TypeDescriptor,
    pub lifestyle: Lifestyle,
    pub expression: Expression,
    pub registration: Arc<Registration>,
}

impl fmt::Debug for DecoratorApplication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoratorApplication")
            .field("decorator_type", &self.decorator_type.to_string())
            .field("implementation_type", &self.implementation_type.to_string())
            .field("lifestyle", &self.lifestyle)
            .finish()
    }
}

/// Что видит predicate
#[derive(Debug, Clone)]
pub struct DecoratorPredicateContext {
    pub service_type: TypeDescriptor,
    /// Исходная (не decorated) реализация
    pub implementation_type: TypeDescriptor,
    /// Уже примененные decorators, в порядке применения
    pub applied_decorators: Vec<TypeDescriptor>,
    pub expression: Expression,
}

/// Состояние decoration для пары (service type, producer) внутри одного
/// прохода
#[derive(Debug, Clone)]
pub struct ServiceTypeInfo {
    pub implementation_type: TypeDescriptor,
    pub applied_decorators: Vec<DecoratorApplication>,
}

/// Контекст одного прохода decoration. Создается на каждый expression-built
/// event, поэтому история decorators не переходит между resolutions.
#[derive(Debug, Default)]
pub struct DecorationPass {
    infos: HashMap<(TypeDescriptor, ProducerId), ServiceTypeInfo>,
}

impl DecorationPass {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info_for(&mut self, built: &ExpressionBuilt, producer: &InstanceProducer) -> &mut ServiceTypeInfo {
        self.infos
            .entry((built.service_type.clone(), producer.id()))
            .or_insert_with(|| ServiceTypeInfo {
                implementation_type: built.implementation_type.clone(),
                applied_decorators: Vec::new(),
            })
    }
}

/// Decorator plan одного decorated producer
#[derive(Clone)]
struct DecoratorPlan {
    registration: Arc<Registration>,
    expression: Expression,
}

/// Зарегистрированный decorator
pub struct DecoratorRegistration {
    service_type: TypeDescriptor,
    decorator_type: TypeDescriptor,
    lifestyle: Option<Lifestyle>,
    predicate: Option<DecoratorPredicate>,
    plans: ReentrantMutex<RefCell<HashMap<ProducerId, DecoratorPlan>>>,
    matcher: TypeMatcher,
}

impl DecoratorRegistration {
    /// Проверки времени регистрации: decorator реализует service, имеет ровно
    /// один конструктор и принимает decoratee
    pub fn new(
        service_type: TypeDescriptor,
        decorator_type: TypeDescriptor,
        lifestyle: Option<Lifestyle>,
        predicate: Option<DecoratorPredicate>,
    ) -> Result<Self> {
        CandidateTemplate::for_service(&service_type, decorator_type.clone())?;
        let constructor = select_single_constructor(&decorator_type)?;

        let shapes: Vec<TypeDescriptor> = std::iter::once(decorator_type.clone())
            .chain(decorator_type.all_supertypes())
            .filter(|shape| shape.same_definition(&service_type))
            .collect();
        let takes_decoratee = constructor
            .parameters()
            .iter()
            .any(|p| shapes.contains(p.parameter_type()));
        if !takes_decoratee {
            return Err(ContainerError::DecorateeParameterMissing {
                decorator: decorator_type.to_string(),
                service: service_type.to_string(),
            });
        }

        Ok(Self {
            service_type,
            decorator_type,
            lifestyle,
            predicate,
            plans: ReentrantMutex::new(RefCell::new(HashMap::new())),
            matcher: TypeMatcher::new(),
        })
    }

    pub fn service_type(&self) -> &TypeDescriptor {
        &self.service_type
    }

    pub fn decorator_type(&self) -> &TypeDescriptor {
        &self.decorator_type
    }

    pub fn lifestyle(&self) -> Option<Lifestyle> {
        self.lifestyle
    }

    /// Закрытый decorator type для данного service type, `None` если decorator
    /// к нему неприменим (другой service или нарушены constraints)
    pub fn decorator_for(&self, service_type: &TypeDescriptor) -> Option<TypeDescriptor> {
        if !self.service_type.same_definition(service_type) {
            return None;
        }
        if !self.service_type.is_open() && &self.service_type != service_type {
            return None;
        }
        self.matcher.close_implementation(&self.decorator_type, service_type)
    }

    /// Количество построенных plans (по одному на decorated producer)
    pub fn plan_count(&self) -> usize {
        self.plans.lock().borrow().len()
    }

    pub fn plan_for(&self, producer: ProducerId) -> Option<Arc<Registration>> {
        self.plans
            .lock()
            .borrow()
            .get(&producer)
            .map(|plan| plan.registration.clone())
    }
}

impl fmt::Debug for DecoratorRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoratorRegistration")
            .field("service_type", &self.service_type.to_string())
            .field("decorator_type", &self.decorator_type.to_string())
            .field("lifestyle", &self.lifestyle)
            .field("has_predicate", &self.predicate.is_some())
            .finish()
    }
}

/// Применение одного decorator к одному producer
pub struct DecoratorInterceptor<'a> {
    registration: &'a DecoratorRegistration,
    decorator_type: TypeDescriptor,
    producer: &'a Arc<InstanceProducer>,
}

impl<'a> DecoratorInterceptor<'a> {
    pub fn new(
        registration: &'a DecoratorRegistration,
        decorator_type: TypeDescriptor,
        producer: &'a Arc<InstanceProducer>,
    ) -> Self {
        Self {
            registration,
            decorator_type,
            producer,
        }
    }

    /// Predicate не меняет ни event, ни plans. Без predicate - всегда true.
    pub fn satisfies_predicate(&self, built: &ExpressionBuilt, pass: &mut DecorationPass) -> Result<bool> {
        let Some(predicate) = &self.registration.predicate else {
            return Ok(true);
        };

        let context = self.predicate_context(built, pass);
        predicate(&context).map_err(|e| {
            ContainerError::predicate_failed(&self.decorator_type, &built.service_type, e)
        })
    }

    fn predicate_context(&self, built: &ExpressionBuilt, pass: &mut DecorationPass) -> DecoratorPredicateContext {
        let info = pass.info_for(built, self.producer);
        DecoratorPredicateContext {
            service_type: built.service_type.clone(),
            implementation_type: info.implementation_type.clone(),
            applied_decorators: info
                .applied_decorators
                .iter()
                .map(|d| d.decorator_type.clone())
                .collect(),
            expression: built.expression.clone(),
        }
    }

    /// Заменить выражение event выражением decorator
    pub fn apply_decorator(&self, built: &mut ExpressionBuilt, pass: &mut DecorationPass) -> Result<()> {
        let plan = self.decorator_plan(built)?;
        let wrapped = built.wrapped_type().clone();

        built.expression = plan.expression.clone();
        built.lifestyle = plan.registration.lifestyle();
        built
            .relationships
            .extend(plan.registration.relationships());

        let application = DecoratorApplication {
            decorator_type: self.decorator_type.clone(),
            implementation_type: wrapped,
            lifestyle: plan.registration.lifestyle(),
            expression: plan.expression,
            registration: plan.registration,
        };
        pass.info_for(built, self.producer)
            .applied_decorators
            .push(application.clone());
        built.decorators.push(application);

        trace!(
            "Applied decorator {} to {}",
            self.decorator_type,
            built.service_type
        );
        Ok(())
    }

    /// Plan для текущего producer: из memo или построенный под lock.
    /// Lock reentrant: построение decorator может потребовать decoration
    /// других producers тем же decorator.
    fn decorator_plan(&self, built: &ExpressionBuilt) -> Result<DecoratorPlan> {
        let plans = self.registration.plans.lock();
        if let Some(plan) = plans.borrow().get(&self.producer.id()) {
            return Ok(plan.clone());
        }

        let lifestyle = self.registration.lifestyle.unwrap_or(built.lifestyle);
        let container = self.producer.registration().container_handle();
        let registration = Arc::new(Registration::for_decorator(
            self.decorator_type.clone(),
            lifestyle,
            Decoratee {
                service_type: built.service_type.clone(),
                expression: built.expression.clone(),
                producer: decoratee_producer(built, container.clone()),
            },
            container,
        ));
        let expression = registration.build_expression(&built.service_type)?;

        debug!(
            "🎨 Built decorator plan {} for {} ({})",
            self.decorator_type, built.service_type, lifestyle
        );

        let plan = DecoratorPlan {
            registration,
            expression,
        };
        plans.borrow_mut().insert(self.producer.id(), plan.clone());
        Ok(plan)
    }
}

/// Producer выражения до применения decorator. Relationships decorator
/// указывают на него, а не на decorated producer.
fn decoratee_producer(
    built: &ExpressionBuilt,
    container: Weak<dyn ContainerServices>,
) -> Arc<InstanceProducer> {
    let registration = Registration::for_expression(
        built.wrapped_type().clone(),
        built.lifestyle,
        built.expression.clone(),
        container,
    );
    registration.replace_relationships(built.relationships.iter().cloned());
    InstanceProducer::new(built.service_type.clone(), Arc::new(registration))
}
