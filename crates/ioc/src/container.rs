//! Container - владелец registrations и реализация [`ContainerServices`]
//!
//! Registration API проверяет все, что можно проверить статически.
//! Resolution API строит expressions лениво, при первом запросе.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::collection::{CandidateProducerSource, CollectionResolver};
use crate::config::ContainerOptions;
use crate::decoration::{
    DecorationPass, DecoratorInterceptor, DecoratorPredicate, DecoratorRegistration, ExpressionBuilt,
};
use crate::errors::{ContainerError, Result};
use crate::expression::{Expression, InitializerAction, Instance, InstanceFactory};
use crate::lifestyle::Lifestyle;
use crate::producer::InstanceProducer;
use crate::registration::Registration;
use crate::services::{select_single_constructor, ContainerServices, InjectionConsumer};
use crate::types::{
    CandidateTemplate, ConstructorDescriptor, ParameterDescriptor, ResolvedCandidate, TemplateId,
    TypeDefinition, TypeDescriptor, TypeMatcher,
};

/// Hook, который может заменить expression до применения lifestyle.
/// Аргументы: service type, implementation type, текущее выражение.
pub type ExpressionBuildingHook =
    Arc<dyn Fn(&TypeDescriptor, &TypeDescriptor, Expression) -> Expression + Send + Sync>;

struct OpenGenericRegistration {
    service_type: TypeDescriptor,
    template: CandidateTemplate,
    lifestyle: Lifestyle,
}

/// Template collection вместе с service type, под которым он добавлен
struct CollectionEntry {
    service_type: TypeDescriptor,
    template: CandidateTemplate,
}

impl CollectionEntry {
    /// Closed service ограничивает entry ровно этим element type
    fn serves(&self, element_type: &TypeDescriptor) -> bool {
        self.service_type.is_open() || &self.service_type == element_type
    }
}

struct InitializerRegistration {
    target_type: TypeDescriptor,
    action: InitializerAction,
}

/// Снимок состояния контейнера
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContainerStats {
    pub registrations: usize,
    pub open_generic_registrations: usize,
    pub collection_templates: usize,
    pub decorators: usize,
    pub initializers: usize,
    pub producers: usize,
    pub producers_built: usize,
    pub instances_created: u64,
}

pub struct Container {
    options: ContainerOptions,
    self_handle: Weak<Container>,
    /// Явные closed registrations
    producers: RwLock<HashMap<TypeDescriptor, Arc<InstanceProducer>>>,
    open_generics: RwLock<Vec<OpenGenericRegistration>>,
    /// Producers, закрытые из open generic registrations
    closed_generic_producers: RwLock<HashMap<TypeDescriptor, Arc<InstanceProducer>>>,
    collections: RwLock<HashMap<Arc<TypeDefinition>, Vec<CollectionEntry>>>,
    template_lifestyles: RwLock<HashMap<TemplateId, Lifestyle>>,
    collection_producers: Mutex<HashMap<(TemplateId, TypeDescriptor, TypeDescriptor), Arc<InstanceProducer>>>,
    decorators: RwLock<Vec<Arc<DecoratorRegistration>>>,
    initializers: RwLock<Vec<InitializerRegistration>>,
    hooks: RwLock<Vec<ExpressionBuildingHook>>,
    collection_resolver: CollectionResolver,
    matcher: TypeMatcher,
    instances_created: AtomicU64,
}

impl Container {
    pub fn new(options: ContainerOptions) -> Arc<Self> {
        Arc::new_cyclic(|self_handle| Self {
            options,
            self_handle: self_handle.clone(),
            producers: RwLock::new(HashMap::new()),
            open_generics: RwLock::new(Vec::new()),
            closed_generic_producers: RwLock::new(HashMap::new()),
            collections: RwLock::new(HashMap::new()),
            template_lifestyles: RwLock::new(HashMap::new()),
            collection_producers: Mutex::new(HashMap::new()),
            decorators: RwLock::new(Vec::new()),
            initializers: RwLock::new(Vec::new()),
            hooks: RwLock::new(Vec::new()),
            collection_resolver: CollectionResolver::new(),
            matcher: TypeMatcher::new(),
            instances_created: AtomicU64::new(0),
        })
    }

    pub fn with_defaults() -> Arc<Self> {
        Self::new(ContainerOptions::default())
    }

    pub fn options(&self) -> &ContainerOptions {
        &self.options
    }

    fn services_handle(&self) -> Weak<dyn ContainerServices> {
        self.self_handle.clone()
    }

    fn log_registration(&self, message: std::fmt::Arguments<'_>) {
        if self.options.verbose_logging {
            info!("✅ {}", message);
        } else {
            debug!("{}", message);
        }
    }

    // ----- Registration API -----

    /// Closed registration. Open service или implementation направляются в
    /// [`Container::register_open_generic`].
    pub fn register(
        &self,
        service_type: &TypeDescriptor,
        implementation_type: &TypeDescriptor,
        lifestyle: Lifestyle,
    ) -> Result<()> {
        if service_type.is_open() || implementation_type.is_open() {
            return self.register_open_generic(service_type, implementation_type, lifestyle);
        }

        if !implementation_type.is_assignable_to(service_type) {
            return Err(ContainerError::implementation_mismatch(
                implementation_type,
                service_type,
            ));
        }
        select_single_constructor(implementation_type)?;

        let registration = Registration::new(
            implementation_type.clone(),
            lifestyle,
            self.services_handle(),
        );
        self.insert_producer(service_type, registration)?;
        self.log_registration(format_args!(
            "Registered {} -> {} ({})",
            service_type, implementation_type, lifestyle
        ));
        Ok(())
    }

    pub fn register_open_generic(
        &self,
        service_type: &TypeDescriptor,
        implementation_type: &TypeDescriptor,
        lifestyle: Lifestyle,
    ) -> Result<()> {
        let template = CandidateTemplate::for_service(service_type, implementation_type.clone())?;
        select_single_constructor(implementation_type)?;

        let mut open_generics = self.open_generics.write();
        if let Some(index) = open_generics
            .iter()
            .position(|r| &r.service_type == service_type)
        {
            if !self.options.allow_overriding_registrations {
                warn!("❌ Повторная open generic регистрация {}", service_type);
                return Err(ContainerError::DuplicateRegistration {
                    service: service_type.to_string(),
                });
            }
            warn!("⚠️ Open generic регистрация {} переопределена", service_type);
            open_generics.remove(index);
        }

        open_generics.push(OpenGenericRegistration {
            service_type: service_type.clone(),
            template,
            lifestyle,
        });
        drop(open_generics);

        self.log_registration(format_args!(
            "Registered open generic {} -> {} ({})",
            service_type, implementation_type, lifestyle
        ));
        Ok(())
    }

    /// Готовый экземпляр, всегда singleton
    pub fn register_instance(&self, service_type: &TypeDescriptor, instance: Instance) -> Result<()> {
        let registration = Registration::for_instance(service_type.clone(), instance, self.services_handle());
        self.insert_producer(service_type, registration)?;
        self.log_registration(format_args!("Registered instance of {}", service_type));
        Ok(())
    }

    /// Delegate registration. `Ok(None)` из factory - ошибка при создании.
    pub fn register_factory(
        &self,
        service_type: &TypeDescriptor,
        lifestyle: Lifestyle,
        factory: InstanceFactory,
    ) -> Result<()> {
        let registration = Registration::for_factory(
            service_type.clone(),
            lifestyle,
            factory,
            self.services_handle(),
        );
        self.insert_producer(service_type, registration)?;
        self.log_registration(format_args!(
            "Registered factory for {} ({})",
            service_type, lifestyle
        ));
        Ok(())
    }

    fn insert_producer(&self, service_type: &TypeDescriptor, registration: Registration) -> Result<()> {
        if service_type.is_open() {
            return Err(ContainerError::configuration(format!(
                "{} is an open generic type and cannot be registered directly",
                service_type
            )));
        }

        let mut producers = self.producers.write();
        if producers.contains_key(service_type) {
            if !self.options.allow_overriding_registrations {
                warn!("❌ Попытка повторной регистрации {}", service_type);
                return Err(ContainerError::DuplicateRegistration {
                    service: service_type.to_string(),
                });
            }
            warn!("⚠️ Регистрация {} переопределена", service_type);
        }

        producers.insert(
            service_type.clone(),
            InstanceProducer::new(service_type.clone(), Arc::new(registration)),
        );
        Ok(())
    }

    /// Добавить template в collection service type. Проблемы конструктора
    /// проявятся при первом построении элемента.
    pub fn append_to_collection(
        &self,
        service_type: &TypeDescriptor,
        implementation_type: &TypeDescriptor,
    ) -> Result<()> {
        self.append_to_collection_with(service_type, implementation_type, self.options.default_lifestyle)
    }

    pub fn append_to_collection_with(
        &self,
        service_type: &TypeDescriptor,
        implementation_type: &TypeDescriptor,
        lifestyle: Lifestyle,
    ) -> Result<()> {
        let definition = service_type.definition().cloned().ok_or_else(|| {
            ContainerError::configuration(format!(
                "collection service {} must be a constructed type",
                service_type
            ))
        })?;
        let template = CandidateTemplate::for_service(service_type, implementation_type.clone())?;

        self.template_lifestyles.write().insert(template.id(), lifestyle);
        self.collections
            .write()
            .entry(definition)
            .or_default()
            .push(CollectionEntry {
                service_type: service_type.clone(),
                template,
            });

        self.log_registration(format_args!(
            "Appended {} to collection of {} ({})",
            implementation_type, service_type, lifestyle
        ));
        Ok(())
    }

    /// Decorators применяются в порядке регистрации
    pub fn register_decorator(
        &self,
        service_type: &TypeDescriptor,
        decorator_type: &TypeDescriptor,
        lifestyle: Option<Lifestyle>,
        predicate: Option<DecoratorPredicate>,
    ) -> Result<()> {
        let decorator = DecoratorRegistration::new(
            service_type.clone(),
            decorator_type.clone(),
            lifestyle,
            predicate,
        )?;
        self.decorators.write().push(Arc::new(decorator));
        self.log_registration(format_args!(
            "Registered decorator {} for {}",
            decorator_type, service_type
        ));
        Ok(())
    }

    /// Decorators в порядке регистрации
    pub fn decorator_registrations(&self) -> Vec<Arc<DecoratorRegistration>> {
        self.decorators.read().clone()
    }

    /// Initializer для всех реализаций, assignable к `target_type`
    pub fn register_initializer(&self, target_type: &TypeDescriptor, action: InitializerAction) {
        self.initializers.write().push(InitializerRegistration {
            target_type: target_type.clone(),
            action,
        });
        self.log_registration(format_args!("Registered initializer for {}", target_type));
    }

    pub fn add_expression_building_hook(&self, hook: ExpressionBuildingHook) {
        self.hooks.write().push(hook);
    }

    // ----- Resolution API -----

    pub fn get_producer(&self, service_type: &TypeDescriptor) -> Result<Arc<InstanceProducer>> {
        self.producer_for(service_type)
            .ok_or_else(|| ContainerError::ServiceNotFound {
                service: service_type.to_string(),
            })
    }

    pub fn get_instance(&self, service_type: &TypeDescriptor) -> Result<Instance> {
        let producer = self.get_producer(service_type)?;
        let instance = producer.get_instance()?;
        self.instances_created.fetch_add(1, Ordering::Relaxed);
        Ok(instance)
    }

    /// Producers элементов collection в порядке регистрации
    pub fn collection_producers(&self, element_type: &TypeDescriptor) -> Vec<Arc<InstanceProducer>> {
        let candidates: Vec<CandidateTemplate> = match element_type.definition() {
            Some(definition) => self
                .collections
                .read()
                .get(definition)
                .map(|entries| {
                    entries
                        .iter()
                        .filter(|entry| entry.serves(element_type))
                        .map(|entry| entry.template.clone())
                        .collect()
                })
                .unwrap_or_default(),
            None => Vec::new(),
        };

        self.collection_resolver
            .resolve_producers(std::slice::from_ref(element_type), &candidates, self)
    }

    pub fn get_all_instances(&self, element_type: &TypeDescriptor) -> Result<Vec<Instance>> {
        let instances = self
            .collection_producers(element_type)
            .iter()
            .map(|producer| producer.get_instance())
            .collect::<Result<Vec<_>>>()?;
        self.instances_created
            .fetch_add(instances.len() as u64, Ordering::Relaxed);
        Ok(instances)
    }

    /// Построить expressions всех явных registrations, чтобы ошибки
    /// конфигурации проявились сразу
    pub fn verify(&self) -> Result<()> {
        let producers: Vec<Arc<InstanceProducer>> = self.producers.read().values().cloned().collect();
        for producer in &producers {
            producer.build_expression()?;
        }
        info!("🔍 Проверено {} registrations", producers.len());
        Ok(())
    }

    pub fn stats(&self) -> ContainerStats {
        let mut producers: Vec<Arc<InstanceProducer>> = self.producers.read().values().cloned().collect();
        producers.extend(self.closed_generic_producers.read().values().cloned());
        producers.extend(self.collection_producers.lock().values().cloned());

        ContainerStats {
            registrations: self.producers.read().len(),
            open_generic_registrations: self.open_generics.read().len(),
            collection_templates: self.collections.read().values().map(Vec::len).sum(),
            decorators: self.decorators.read().len(),
            initializers: self.initializers.read().len(),
            producers: producers.len(),
            producers_built: producers.iter().filter(|p| p.is_built()).count(),
            instances_created: self.instances_created.load(Ordering::Relaxed),
        }
    }

    fn close_open_generic(&self, service_type: &TypeDescriptor) -> Option<Arc<InstanceProducer>> {
        if !self.options.resolve_open_generics || service_type.is_open() {
            return None;
        }

        let (implementation, lifestyle) = {
            let open_generics = self.open_generics.read();
            open_generics.iter().find_map(|registration| {
                if !registration.service_type.same_definition(service_type) {
                    return None;
                }
                self.matcher
                    .try_resolve(&registration.template, service_type)
                    .map(|resolved| (resolved.implementation().clone(), registration.lifestyle))
            })?
        };

        debug!("Closed open generic registration {} for {}", implementation, service_type);
        let producer = InstanceProducer::new(
            service_type.clone(),
            Arc::new(Registration::new(implementation, lifestyle, self.services_handle())),
        );

        Some(
            self.closed_generic_producers
                .write()
                .entry(service_type.clone())
                .or_insert(producer)
                .clone(),
        )
    }
}

impl CandidateProducerSource for Container {
    fn producer_for_candidate(&self, candidate: &ResolvedCandidate) -> Arc<InstanceProducer> {
        let key = (
            candidate.template().id(),
            candidate.requested().clone(),
            candidate.implementation().clone(),
        );
        if let Some(producer) = self.collection_producers.lock().get(&key) {
            return producer.clone();
        }

        let lifestyle = self
            .template_lifestyles
            .read()
            .get(&candidate.template().id())
            .copied()
            .unwrap_or(self.options.default_lifestyle);
        let producer = InstanceProducer::new(
            candidate.requested().clone(),
            Arc::new(Registration::new(
                candidate.implementation().clone(),
                lifestyle,
                self.services_handle(),
            )),
        );

        self.collection_producers
            .lock()
            .entry(key)
            .or_insert(producer)
            .clone()
    }
}

impl ContainerServices for Container {
    fn producer_for(&self, service_type: &TypeDescriptor) -> Option<Arc<InstanceProducer>> {
        if let Some(producer) = self.producers.read().get(service_type) {
            return Some(producer.clone());
        }
        if let Some(producer) = self.closed_generic_producers.read().get(service_type) {
            return Some(producer.clone());
        }
        self.close_open_generic(service_type)
    }

    fn select_constructor(
        &self,
        _service_type: &TypeDescriptor,
        implementation_type: &TypeDescriptor,
    ) -> Result<ConstructorDescriptor> {
        select_single_constructor(implementation_type)
    }

    fn expression_for(
        &self,
        consumer: &InjectionConsumer<'_>,
        parameter: &ParameterDescriptor,
    ) -> Result<Option<Expression>> {
        if let Some(producer) = self.producer_for(parameter.parameter_type()) {
            return producer.build_expression().map(Some);
        }

        let fallback = parameter
            .default_value()
            .map(|value| Expression::Constant(Arc::new(value.clone()) as Instance));
        if fallback.is_none() {
            debug!(
                "No expression for parameter '{}' of {} ({})",
                parameter.name(),
                consumer.implementation_type,
                parameter.parameter_type()
            );
        }
        Ok(fallback)
    }

    fn initializer_for(&self, implementation_type: &TypeDescriptor) -> Result<Option<InitializerAction>> {
        let mut actions: Vec<InitializerAction> = self
            .initializers
            .read()
            .iter()
            .filter(|i| implementation_type.is_assignable_to(&i.target_type))
            .map(|i| i.action.clone())
            .collect();

        Ok(match actions.len() {
            0 => None,
            1 => actions.pop(),
            _ => {
                let composed: InitializerAction = Arc::new(move |instance: &Instance| -> anyhow::Result<()> {
                    for action in &actions {
                        action(instance)?;
                    }
                    Ok(())
                });
                Some(composed)
            }
        })
    }

    fn on_expression_building(
        &self,
        service_type: &TypeDescriptor,
        implementation_type: &TypeDescriptor,
        expression: Expression,
    ) -> Expression {
        let hooks: Vec<ExpressionBuildingHook> = self.hooks.read().clone();
        hooks
            .iter()
            .fold(expression, |current, hook| hook(service_type, implementation_type, current))
    }

    fn on_expression_built(
        &self,
        producer: &Arc<InstanceProducer>,
        built: &mut ExpressionBuilt,
    ) -> Result<()> {
        let decorators: Vec<Arc<DecoratorRegistration>> = self.decorators.read().clone();
        if decorators.is_empty() || producer.registration().wraps_expression() {
            return Ok(());
        }

        let mut pass = DecorationPass::new();
        for decorator in &decorators {
            let Some(decorator_type) = decorator.decorator_for(&built.service_type) else {
                continue;
            };

            let interceptor = DecoratorInterceptor::new(decorator, decorator_type, producer);
            if interceptor.satisfies_predicate(built, &mut pass)? {
                interceptor.apply_decorator(built, &mut pass)?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("options", &self.options)
            .field("stats", &self.stats())
            .finish()
    }
}
