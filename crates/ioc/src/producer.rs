//! InstanceProducer - связка service type и registration
//!
//! Expression строится лениво, один раз. После построения контейнер получает
//! expression-built event и может переписать выражение (decorators), после
//! чего выражение компилируется и кешируется.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use common::OperationTimer;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::debug;

use crate::compiler::CompiledFactory;
use crate::decoration::{DecoratorApplication, ExpressionBuilt};
use crate::errors::{ContainerError, Result};
use crate::expression::{Expression, Instance};
use crate::lifestyle::Lifestyle;
use crate::registration::{KnownRelationship, Registration};
use crate::types::TypeDescriptor;

static NEXT_PRODUCER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProducerId(u64);

impl fmt::Display for ProducerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "producer#{}", self.0)
    }
}

/// Результат построения после decoration
#[derive(Clone)]
struct BuiltPlan {
    expression: Expression,
    lifestyle: Lifestyle,
    decorators: Vec<DecoratorApplication>,
}

pub struct InstanceProducer {
    id: ProducerId,
    service_type: TypeDescriptor,
    registration: Arc<Registration>,
    plan: OnceCell<BuiltPlan>,
    factory: OnceCell<CompiledFactory>,
    /// Потоки, которые сейчас строят expression этого producer
    building: Mutex<Vec<ThreadId>>,
}

impl InstanceProducer {
    pub fn new(service_type: TypeDescriptor, registration: Arc<Registration>) -> Arc<Self> {
        Arc::new(Self {
            id: ProducerId(NEXT_PRODUCER_ID.fetch_add(1, Ordering::Relaxed)),
            service_type,
            registration,
            plan: OnceCell::new(),
            factory: OnceCell::new(),
            building: Mutex::new(Vec::new()),
        })
    }

    pub fn id(&self) -> ProducerId {
        self.id
    }

    pub fn service_type(&self) -> &TypeDescriptor {
        &self.service_type
    }

    pub fn registration(&self) -> &Arc<Registration> {
        &self.registration
    }

    pub fn implementation_type(&self) -> &TypeDescriptor {
        self.registration.implementation_type()
    }

    /// Итоговый lifestyle. До построения совпадает с lifestyle registration,
    /// decorator может его заменить.
    pub fn lifestyle(&self) -> Lifestyle {
        self.plan
            .get()
            .map(|plan| plan.lifestyle)
            .unwrap_or_else(|| self.registration.lifestyle())
    }

    pub fn is_built(&self) -> bool {
        self.plan.get().is_some()
    }

    pub fn relationships(&self) -> Vec<KnownRelationship> {
        self.registration.relationships()
    }

    /// Decorators в порядке применения (пусто до построения)
    pub fn applied_decorators(&self) -> Vec<DecoratorApplication> {
        self.plan
            .get()
            .map(|plan| plan.decorators.clone())
            .unwrap_or_default()
    }

    pub fn build_expression(self: &Arc<Self>) -> Result<Expression> {
        Ok(self.build_plan()?.expression.clone())
    }

    fn build_plan(self: &Arc<Self>) -> Result<&BuiltPlan> {
        if let Some(plan) = self.plan.get() {
            return Ok(plan);
        }

        // Повторный вход в get_or_try_init из того же потока - deadlock,
        // поэтому цикл ловится до него
        let _guard = BuildGuard::enter(self)?;
        self.plan.get_or_try_init(|| self.build_plan_uncached())
    }

    fn build_plan_uncached(self: &Arc<Self>) -> Result<BuiltPlan> {
        let mut timer = OperationTimer::new("build_expression");
        timer.add_field("service_type", self.service_type.to_string());

        let result = self.run_build_pipeline();
        timer.finish_with_result(result.as_ref().map(|_| ()));
        result
    }

    fn run_build_pipeline(self: &Arc<Self>) -> Result<BuiltPlan> {
        let expression = self.registration.build_expression(&self.service_type)?;

        let mut built = ExpressionBuilt::new(
            self.service_type.clone(),
            self.registration.implementation_type().clone(),
            expression,
            self.registration.lifestyle(),
            self.registration.relationships(),
        );

        let container = self.registration.container_handle().upgrade().ok_or_else(|| {
            ContainerError::ContainerDropped {
                implementation: self.implementation_type().to_string(),
            }
        })?;
        container.on_expression_built(self, &mut built)?;

        if !built.decorators.is_empty() {
            debug!(
                "{} decorated by {} decorator(s)",
                self.service_type,
                built.decorators.len()
            );
        }

        self.registration.replace_relationships(built.relationships);
        Ok(BuiltPlan {
            expression: built.expression,
            lifestyle: built.lifestyle,
            decorators: built.decorators,
        })
    }

    pub fn factory(self: &Arc<Self>) -> Result<&CompiledFactory> {
        self.factory.get_or_try_init(|| {
            let expression = self.build_expression()?;
            Ok(CompiledFactory::compile(self.service_type.clone(), expression))
        })
    }

    pub fn get_instance(self: &Arc<Self>) -> Result<Instance> {
        self.factory()?.create()
    }
}

impl fmt::Debug for InstanceProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceProducer")
            .field("id", &self.id)
            .field("service_type", &self.service_type.to_string())
            .field("implementation_type", &self.implementation_type().to_string())
            .field("lifestyle", &self.lifestyle())
            .field("built", &self.is_built())
            .finish()
    }
}

/// Отмечает текущий поток как строящий producer до конца scope
struct BuildGuard<'a> {
    producer: &'a InstanceProducer,
    thread: ThreadId,
}

impl<'a> BuildGuard<'a> {
    fn enter(producer: &'a InstanceProducer) -> Result<Self> {
        let thread = thread::current().id();
        let mut building = producer.building.lock();
        if building.contains(&thread) {
            return Err(ContainerError::CyclicDependency {
                service: producer.service_type.to_string(),
            });
        }
        building.push(thread);
        Ok(Self { producer, thread })
    }
}

impl Drop for BuildGuard<'_> {
    fn drop(&mut self) {
        self.producer.building.lock().retain(|t| *t != self.thread);
    }
}
