//! Type descriptors - явная замена runtime reflection
//!
//! Контейнер не опирается на introspection языка: каждый тип описывается
//! значением [`TypeDescriptor`], которое строится из [`TypeDefinition`] при
//! старте приложения (manifest). Descriptor сравним, хешируем и дешево
//! клонируется (внутри `Arc`).
//!
//! Определение может быть generic: его параметры ([`GenericParameter`]) могут
//! встречаться в supertypes, constraints и типах параметров конструктора.
//! Подстановка аргументов выполняется через [`Bindings`].

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::{ContainerError, Result};
use crate::expression::Activator;

/// Отображение свободных параметров на конкретные типы
pub type Bindings = HashMap<GenericParameter, TypeDescriptor>;

/// Вид типа
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    /// Value type - всегда имеет неявный конструктор по умолчанию
    Value,
    /// Reference type (class)
    Reference,
    /// Абстрактный service type, не может быть создан напрямую
    Interface,
}

/// Ограничение на generic параметр
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Constraint {
    /// `new()` - тип должен иметь конструктор без аргументов
    DefaultConstructor,
    /// `struct`
    ValueType,
    /// `class`
    ReferenceType,
    /// Тип должен быть assignable к указанному типу. Цель может ссылаться на
    /// другие параметры того же определения (`where T : U`).
    AssignableTo(TypeDescriptor),
}

/// Свободный параметр generic определения.
///
/// Идентичность параметра - (владелец, позиция); constraints не участвуют в
/// сравнении, поэтому параметр, полученный из builder до финализации,
/// совпадает с финальным.
#[derive(Clone)]
pub struct GenericParameter {
    inner: Arc<ParameterData>,
}

struct ParameterData {
    owner: Arc<str>,
    name: Arc<str>,
    position: usize,
    constraints: Vec<Constraint>,
}

impl GenericParameter {
    fn new(owner: Arc<str>, name: Arc<str>, position: usize, constraints: Vec<Constraint>) -> Self {
        Self {
            inner: Arc::new(ParameterData {
                owner,
                name,
                position,
                constraints,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Имя определения, которому принадлежит параметр
    pub fn owner(&self) -> &str {
        &self.inner.owner
    }

    pub fn position(&self) -> usize {
        self.inner.position
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.inner.constraints
    }

    pub fn to_type(&self) -> TypeDescriptor {
        TypeDescriptor::from_node(TypeNode::Parameter(self.clone()))
    }
}

impl PartialEq for GenericParameter {
    fn eq(&self, other: &Self) -> bool {
        self.inner.position == other.inner.position && self.inner.owner == other.inner.owner
    }
}

impl Eq for GenericParameter {}

impl Hash for GenericParameter {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.owner.hash(state);
        self.inner.position.hash(state);
    }
}

impl fmt::Debug for GenericParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.inner.owner, self.inner.name)
    }
}

/// Параметр конструктора
#[derive(Debug, Clone)]
pub struct ParameterDescriptor {
    name: Arc<str>,
    parameter_type: TypeDescriptor,
    default_value: Option<serde_json::Value>,
}

impl ParameterDescriptor {
    pub fn new(name: &str, parameter_type: TypeDescriptor) -> Self {
        Self {
            name: Arc::from(name),
            parameter_type,
            default_value: None,
        }
    }

    /// Значение для примитивных параметров, у которых нет producer
    pub fn with_default(mut self, value: serde_json::Value) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameter_type(&self) -> &TypeDescriptor {
        &self.parameter_type
    }

    pub fn default_value(&self) -> Option<&serde_json::Value> {
        self.default_value.as_ref()
    }

    fn substitute(&self, bindings: &Bindings) -> Self {
        Self {
            name: self.name.clone(),
            parameter_type: self.parameter_type.substitute(bindings),
            default_value: self.default_value.clone(),
        }
    }
}

/// Публичный конструктор реализации
#[derive(Clone, Default)]
pub struct ConstructorDescriptor {
    parameters: Vec<ParameterDescriptor>,
    activator: Option<Activator>,
}

impl ConstructorDescriptor {
    pub fn new(parameters: Vec<ParameterDescriptor>) -> Self {
        Self {
            parameters,
            activator: None,
        }
    }

    pub fn parameterless() -> Self {
        Self::default()
    }

    /// Пользовательская функция создания. Без нее создается [`crate::Component`].
    pub fn with_activator(mut self, activator: Activator) -> Self {
        self.activator = Some(activator);
        self
    }

    pub fn parameters(&self) -> &[ParameterDescriptor] {
        &self.parameters
    }

    pub fn activator(&self) -> Option<&Activator> {
        self.activator.as_ref()
    }

    fn substitute(&self, bindings: &Bindings) -> Self {
        Self {
            parameters: self
                .parameters
                .iter()
                .map(|p| p.substitute(bindings))
                .collect(),
            activator: self.activator.clone(),
        }
    }
}

impl fmt::Debug for ConstructorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstructorDescriptor")
            .field("parameters", &self.parameters)
            .field("custom_activator", &self.activator.is_some())
            .finish()
    }
}

/// Определение типа (возможно generic).
///
/// Равенство и хеш определяются только по имени: имена уникальны в пределах
/// manifest.
pub struct TypeDefinition {
    name: Arc<str>,
    kind: TypeKind,
    parameters: Vec<GenericParameter>,
    supertypes: Vec<TypeDescriptor>,
    constructors: Vec<ConstructorDescriptor>,
}

impl TypeDefinition {
    pub fn value(name: &str) -> TypeDefinitionBuilder {
        TypeDefinitionBuilder::new(name, TypeKind::Value)
    }

    pub fn reference(name: &str) -> TypeDefinitionBuilder {
        TypeDefinitionBuilder::new(name, TypeKind::Reference)
    }

    pub fn interface(name: &str) -> TypeDefinitionBuilder {
        TypeDefinitionBuilder::new(name, TypeKind::Interface)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    pub fn parameters(&self) -> &[GenericParameter] {
        &self.parameters
    }

    pub fn is_generic(&self) -> bool {
        !self.parameters.is_empty()
    }

    /// Определение как тип: собственные параметры в роли аргументов.
    /// Для не-generic определения это обычный закрытый тип.
    pub fn to_type(self: &Arc<Self>) -> TypeDescriptor {
        TypeDescriptor::from_node(TypeNode::Constructed {
            definition: self.clone(),
            arguments: self.parameters.iter().map(|p| p.to_type()).collect(),
        })
    }

    /// Подставить аргументы вместо параметров
    pub fn close(self: &Arc<Self>, arguments: Vec<TypeDescriptor>) -> Result<TypeDescriptor> {
        if arguments.len() != self.parameters.len() {
            return Err(ContainerError::ArityMismatch {
                definition: self.name.to_string(),
                expected: self.parameters.len(),
                actual: arguments.len(),
            });
        }

        Ok(TypeDescriptor::from_node(TypeNode::Constructed {
            definition: self.clone(),
            arguments,
        }))
    }
}

impl PartialEq for TypeDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for TypeDefinition {}

impl Hash for TypeDefinition {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Debug for TypeDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDefinition")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("parameters", &self.parameters)
            .field("supertypes", &self.supertypes)
            .field("constructors", &self.constructors.len())
            .finish()
    }
}

/// Builder для [`TypeDefinition`].
///
/// Ошибки (неизвестный параметр, дублирующиеся имена) накапливаются и
/// возвращаются из [`TypeDefinitionBuilder::build`].
pub struct TypeDefinitionBuilder {
    name: Arc<str>,
    kind: TypeKind,
    parameter_names: Vec<Arc<str>>,
    constraints: Vec<(Arc<str>, Constraint)>,
    supertypes: Vec<TypeDescriptor>,
    constructors: Vec<ConstructorDescriptor>,
    errors: Vec<String>,
}

impl TypeDefinitionBuilder {
    fn new(name: &str, kind: TypeKind) -> Self {
        Self {
            name: Arc::from(name),
            kind,
            parameter_names: Vec::new(),
            constraints: Vec::new(),
            supertypes: Vec::new(),
            constructors: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn generic_parameters(mut self, names: &[&str]) -> Self {
        for name in names {
            if self.parameter_names.iter().any(|n| &**n == *name) {
                self.errors
                    .push(format!("type parameter '{}' is declared twice", name));
                continue;
            }
            self.parameter_names.push(Arc::from(*name));
        }
        self
    }

    /// Ссылка на объявленный параметр для использования в supertypes,
    /// constraints и конструкторах
    pub fn parameter(&mut self, name: &str) -> TypeDescriptor {
        let position = match self.parameter_names.iter().position(|n| &**n == name) {
            Some(position) => position,
            None => {
                self.errors
                    .push(format!("type parameter '{}' is not declared", name));
                usize::MAX
            }
        };

        GenericParameter::new(self.name.clone(), Arc::from(name), position, Vec::new()).to_type()
    }

    pub fn constraint(mut self, parameter: &str, constraint: Constraint) -> Self {
        if !self.parameter_names.iter().any(|n| &**n == parameter) {
            self.errors.push(format!(
                "constraint targets undeclared type parameter '{}'",
                parameter
            ));
        }
        self.constraints.push((Arc::from(parameter), constraint));
        self
    }

    pub fn implements(mut self, supertype: TypeDescriptor) -> Self {
        self.supertypes.push(supertype);
        self
    }

    pub fn constructor(mut self, constructor: ConstructorDescriptor) -> Self {
        self.constructors.push(constructor);
        self
    }

    /// Сокращение для `constructor(ConstructorDescriptor::parameterless())`
    pub fn default_constructor(self) -> Self {
        self.constructor(ConstructorDescriptor::parameterless())
    }

    pub fn build(self) -> Result<Arc<TypeDefinition>> {
        let mut errors = self.errors;

        if self.kind == TypeKind::Interface && !self.constructors.is_empty() {
            errors.push("interfaces cannot declare constructors".to_string());
        }

        let declared = |parameter: &GenericParameter| {
            parameter.owner() == &*self.name && parameter.position() < self.parameter_names.len()
        };

        let mut referenced = Vec::new();
        for supertype in &self.supertypes {
            referenced.extend(supertype.free_parameters());
        }
        for (_, constraint) in &self.constraints {
            if let Constraint::AssignableTo(target) = constraint {
                referenced.extend(target.free_parameters());
            }
        }
        for constructor in &self.constructors {
            for parameter in constructor.parameters() {
                referenced.extend(parameter.parameter_type().free_parameters());
            }
        }
        for parameter in referenced.iter().filter(|p| !declared(p)) {
            errors.push(format!(
                "references type parameter '{}' of {} which it does not declare",
                parameter.name(),
                parameter.owner()
            ));
        }

        if !errors.is_empty() {
            return Err(ContainerError::malformed_definition(
                &*self.name,
                errors.join("; "),
            ));
        }

        let parameters = self
            .parameter_names
            .iter()
            .enumerate()
            .map(|(position, name)| {
                let constraints = self
                    .constraints
                    .iter()
                    .filter(|(target, _)| target == name)
                    .map(|(_, c)| c.clone())
                    .collect();
                GenericParameter::new(self.name.clone(), name.clone(), position, constraints)
            })
            .collect();

        Ok(Arc::new(TypeDefinition {
            name: self.name,
            kind: self.kind,
            parameters,
            supertypes: self.supertypes,
            constructors: self.constructors,
        }))
    }
}

/// Непрозрачный descriptor типа
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TypeDescriptor {
    node: Arc<TypeNode>,
}

#[derive(PartialEq, Eq, Hash)]
enum TypeNode {
    Constructed {
        definition: Arc<TypeDefinition>,
        arguments: Vec<TypeDescriptor>,
    },
    Parameter(GenericParameter),
}

impl TypeDescriptor {
    fn from_node(node: TypeNode) -> Self {
        Self {
            node: Arc::new(node),
        }
    }

    pub fn definition(&self) -> Option<&Arc<TypeDefinition>> {
        match &*self.node {
            TypeNode::Constructed { definition, .. } => Some(definition),
            TypeNode::Parameter(_) => None,
        }
    }

    pub fn generic_parameter(&self) -> Option<&GenericParameter> {
        match &*self.node {
            TypeNode::Parameter(parameter) => Some(parameter),
            TypeNode::Constructed { .. } => None,
        }
    }

    pub fn arguments(&self) -> &[TypeDescriptor] {
        match &*self.node {
            TypeNode::Constructed { arguments, .. } => arguments,
            TypeNode::Parameter(_) => &[],
        }
    }

    pub fn name(&self) -> String {
        self.to_string()
    }

    /// Оба типа построены из одного определения
    pub fn same_definition(&self, other: &TypeDescriptor) -> bool {
        match (self.definition(), other.definition()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    pub fn is_generic(&self) -> bool {
        self.definition().is_some_and(|d| d.is_generic())
    }

    /// Содержит хотя бы один свободный параметр
    pub fn is_open(&self) -> bool {
        match &*self.node {
            TypeNode::Parameter(_) => true,
            TypeNode::Constructed { arguments, .. } => arguments.iter().any(|a| a.is_open()),
        }
    }

    /// Свободные параметры в порядке первого появления
    pub fn free_parameters(&self) -> Vec<GenericParameter> {
        let mut parameters = Vec::new();
        self.collect_parameters(&mut parameters);
        parameters
    }

    fn collect_parameters(&self, into: &mut Vec<GenericParameter>) {
        match &*self.node {
            TypeNode::Parameter(parameter) => {
                if !into.contains(parameter) {
                    into.push(parameter.clone());
                }
            }
            TypeNode::Constructed { arguments, .. } => {
                for argument in arguments {
                    argument.collect_parameters(into);
                }
            }
        }
    }

    /// Для параметра вид выводится из его constraints
    pub fn kind(&self) -> Option<TypeKind> {
        match &*self.node {
            TypeNode::Constructed { definition, .. } => Some(definition.kind),
            TypeNode::Parameter(parameter) => {
                if parameter.constraints().contains(&Constraint::ValueType) {
                    Some(TypeKind::Value)
                } else if parameter.constraints().contains(&Constraint::ReferenceType) {
                    Some(TypeKind::Reference)
                } else {
                    None
                }
            }
        }
    }

    pub fn is_value_type(&self) -> bool {
        self.kind() == Some(TypeKind::Value)
    }

    pub fn is_reference_type(&self) -> bool {
        matches!(
            self.kind(),
            Some(TypeKind::Reference) | Some(TypeKind::Interface)
        )
    }

    pub fn has_default_constructor(&self) -> bool {
        match &*self.node {
            TypeNode::Constructed { definition, .. } => match definition.kind {
                TypeKind::Value => true,
                TypeKind::Reference => definition
                    .constructors
                    .iter()
                    .any(|c| c.parameters().is_empty()),
                TypeKind::Interface => false,
            },
            TypeNode::Parameter(parameter) => parameter.constraints().iter().any(|c| {
                matches!(c, Constraint::DefaultConstructor | Constraint::ValueType)
            }),
        }
    }

    /// Параметры определения, связанные с аргументами этого типа
    pub fn bindings(&self) -> Bindings {
        match &*self.node {
            TypeNode::Constructed {
                definition,
                arguments,
            } => definition
                .parameters
                .iter()
                .cloned()
                .zip(arguments.iter().cloned())
                .collect(),
            TypeNode::Parameter(_) => Bindings::new(),
        }
    }

    /// Непосредственные supertypes с подставленными аргументами.
    /// Для параметра - цели его `AssignableTo` constraints.
    pub fn supertypes(&self) -> Vec<TypeDescriptor> {
        match &*self.node {
            TypeNode::Constructed { definition, .. } => {
                let bindings = self.bindings();
                definition
                    .supertypes
                    .iter()
                    .map(|s| s.substitute(&bindings))
                    .collect()
            }
            TypeNode::Parameter(parameter) => parameter
                .constraints()
                .iter()
                .filter_map(|c| match c {
                    Constraint::AssignableTo(target) => Some(target.clone()),
                    _ => None,
                })
                .collect(),
        }
    }

    /// Все supertypes транзитивно, без повторов, в порядке обхода в ширину
    pub fn all_supertypes(&self) -> Vec<TypeDescriptor> {
        let mut result: Vec<TypeDescriptor> = Vec::new();
        let mut frontier = self.supertypes();
        while !frontier.is_empty() {
            let mut next = Vec::new();
            for supertype in frontier {
                if result.contains(&supertype) {
                    continue;
                }
                next.extend(supertype.supertypes());
                result.push(supertype);
            }
            frontier = next;
        }
        result
    }

    pub fn constructors(&self) -> Vec<ConstructorDescriptor> {
        match &*self.node {
            TypeNode::Constructed { definition, .. } => {
                let bindings = self.bindings();
                definition
                    .constructors
                    .iter()
                    .map(|c| c.substitute(&bindings))
                    .collect()
            }
            TypeNode::Parameter(_) => Vec::new(),
        }
    }

    pub fn is_assignable_to(&self, target: &TypeDescriptor) -> bool {
        if self == target {
            return true;
        }
        self.supertypes().iter().any(|s| s.is_assignable_to(target))
    }

    pub fn substitute(&self, bindings: &Bindings) -> TypeDescriptor {
        match &*self.node {
            TypeNode::Parameter(parameter) => bindings
                .get(parameter)
                .cloned()
                .unwrap_or_else(|| self.clone()),
            TypeNode::Constructed {
                definition,
                arguments,
            } => {
                if !self.is_open() {
                    return self.clone();
                }
                TypeDescriptor::from_node(TypeNode::Constructed {
                    definition: definition.clone(),
                    arguments: arguments.iter().map(|a| a.substitute(bindings)).collect(),
                })
            }
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.node {
            TypeNode::Parameter(parameter) => f.write_str(parameter.name()),
            TypeNode::Constructed {
                definition,
                arguments,
            } => {
                f.write_str(definition.name())?;
                if arguments.is_empty() {
                    return Ok(());
                }
                f.write_str("<")?;
                for (index, argument) in arguments.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", argument)?;
                }
                f.write_str(">")
            }
        }
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeDescriptor({})", self)
    }
}
