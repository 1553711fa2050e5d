//! Property registry: the per-type catalog of declared properties.
//!
//! Model types are registered by name with an optional base type. Each type
//! declares properties; a type's effective property list is the union of its
//! base chain's declarations, base properties first. Effective lists are
//! built on first use and cached as immutable [`TypeSchema`] snapshots.
//!
//! # Static descriptors
//!
//! Most model types are declared with a `static` [`ModelType`] descriptor and
//! registered lazily through [`PropertyRegistry::ensure`]:
//!
//! ```
//! use mg_core::ValueType;
//! use mg_graph::{GraphError, ModelType, PropertyRegistry, PropertySpec, TypeDeclaration};
//!
//! static PERSON: ModelType = ModelType::new("Person", declare_person);
//! static EMPLOYEE: ModelType = ModelType::new("Employee", declare_employee).extending(&PERSON);
//!
//! fn declare_person(decl: &mut TypeDeclaration<'_>) -> Result<(), GraphError> {
//!     decl.property(PropertySpec::new("Name", ValueType::Text))?;
//!     Ok(())
//! }
//!
//! fn declare_employee(decl: &mut TypeDeclaration<'_>) -> Result<(), GraphError> {
//!     let person = decl.model_type_of(&PERSON)?;
//!     decl.property(PropertySpec::new("Manager", ValueType::Model(Some(person))))?;
//!     Ok(())
//! }
//!
//! let registry = PropertyRegistry::new();
//! let employee = registry.ensure(&EMPLOYEE)?;
//! let names: Vec<_> = registry
//!     .all_properties(employee)?
//!     .iter()
//!     .map(|p| p.name().to_owned())
//!     .collect();
//! assert_eq!(names, ["Name", "Manager"]);
//! # Ok::<(), GraphError>(())
//! ```

use std::fmt;
use std::sync::{Arc, OnceLock};

use mg_core::{FxHashMap, FxHashSet, ModelTypeId, Value, ValueType};
use parking_lot::{Mutex, RwLock, RwLockUpgradableReadGuard};
use tracing::{debug, trace};

use crate::error::GraphError;
use crate::validation::ValidatorFn;

static GLOBAL: OnceLock<Arc<PropertyRegistry>> = OnceLock::new();

// =============================================================================
// PROPERTY DECLARATIONS
// =============================================================================

/// How a property's initial value is produced.
#[derive(Debug, Clone)]
pub enum DefaultFactory {
    /// A fixed scalar value (or `Null`).
    Fixed(Value),
    /// A function producing a scalar value, called on first access.
    Compute(fn() -> Value),
    /// A fresh empty collection, created and subscribed on first access.
    NewCollection,
}

impl DefaultFactory {
    fn same_as(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Fixed(a), Self::Fixed(b)) => a == b,
            (Self::Compute(a), Self::Compute(b)) => std::ptr::fn_addr_eq(*a, *b),
            (Self::NewCollection, Self::NewCollection) => true,
            _ => false,
        }
    }
}

/// Builder for a property declaration.
///
/// # Examples
///
/// ```
/// use mg_core::ValueType;
/// use mg_graph::PropertySpec;
///
/// let spec = PropertySpec::new("Quantity", ValueType::Int).default_value(1_i64);
/// assert_eq!(spec.name(), "Quantity");
/// ```
#[derive(Debug, Clone)]
pub struct PropertySpec {
    name: Arc<str>,
    value_type: ValueType,
    default: Option<DefaultFactory>,
    tracks_dirty: bool,
}

impl PropertySpec {
    /// Declares a property with the type's implicit default.
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            default: None,
            tracks_dirty: true,
        }
    }

    /// Uses a fixed default value.
    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultFactory::Fixed(value.into()));
        self
    }

    /// Computes the default on first access.
    #[must_use]
    pub fn default_with(mut self, factory: fn() -> Value) -> Self {
        self.default = Some(DefaultFactory::Compute(factory));
        self
    }

    /// Creates a fresh empty collection on first access.
    #[must_use]
    pub fn new_collection(mut self) -> Self {
        self.default = Some(DefaultFactory::NewCollection);
        self
    }

    /// Changes to this property never mark the node dirty.
    #[must_use]
    pub fn untracked(mut self) -> Self {
        self.tracks_dirty = false;
        self
    }

    /// The property name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn check_default(&self, type_name: &str) -> Result<(), GraphError> {
        let reject = |reason: String| GraphError::invalid_default(&*self.name, type_name, reason);
        let sample = match &self.default {
            None => return Ok(()),
            Some(DefaultFactory::NewCollection) => {
                if self.value_type == ValueType::Collection {
                    return Ok(());
                }
                return Err(reject(format!(
                    "a new collection cannot initialize a {} property",
                    self.value_type
                )));
            }
            Some(DefaultFactory::Fixed(value)) => value.clone(),
            Some(DefaultFactory::Compute(factory)) => factory(),
        };
        if sample.references_graph() {
            return Err(reject("defaults must not reference graph entities".to_owned()));
        }
        if !self.value_type.admits(&sample) {
            return Err(reject(format!(
                "{} value does not fit a {} property",
                sample.kind(),
                self.value_type
            )));
        }
        Ok(())
    }
}

/// An immutable, registered property declaration.
#[derive(Debug, Clone)]
pub struct PropertyDefinition {
    name: Arc<str>,
    value_type: ValueType,
    default: Option<DefaultFactory>,
    declaring_type: ModelTypeId,
    tracks_dirty: bool,
}

impl PropertyDefinition {
    /// The property name, unique within its type hierarchy.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_arc(&self) -> &Arc<str> {
        &self.name
    }

    /// The declared value type.
    #[must_use]
    pub const fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// The type that declared the property.
    #[must_use]
    pub const fn declaring_type(&self) -> ModelTypeId {
        self.declaring_type
    }

    /// Whether changes to the property mark the node dirty.
    #[must_use]
    pub const fn tracks_dirty(&self) -> bool {
        self.tracks_dirty
    }

    /// The declared default factory, if any.
    #[must_use]
    pub const fn default_factory(&self) -> Option<&DefaultFactory> {
        self.default.as_ref()
    }

    /// Returns `true` if the first access creates a fresh collection.
    pub(crate) const fn creates_collection(&self) -> bool {
        matches!(self.default, Some(DefaultFactory::NewCollection))
    }

    /// The initial scalar value; `Null` for collection-creating defaults.
    pub(crate) fn initial_value(&self) -> Value {
        match &self.default {
            Some(DefaultFactory::Fixed(value)) => value.clone(),
            Some(DefaultFactory::Compute(factory)) => factory(),
            Some(DefaultFactory::NewCollection) => Value::Null,
            None => self.value_type.default_value(),
        }
    }

    fn matches(&self, spec: &PropertySpec) -> bool {
        self.value_type == spec.value_type
            && self.tracks_dirty == spec.tracks_dirty
            && match (&self.default, &spec.default) {
                (None, None) => true,
                (Some(a), Some(b)) => a.same_as(b),
                _ => false,
            }
    }
}

// =============================================================================
// STATIC MODEL TYPE DESCRIPTORS
// =============================================================================

/// Declares a model type's properties.
pub type DeclareFn = fn(&mut TypeDeclaration<'_>) -> Result<(), GraphError>;

/// A static model type descriptor, registered once per registry on first use.
///
/// See the [module documentation](self) for an example.
pub struct ModelType {
    name: &'static str,
    base: Option<&'static ModelType>,
    declare: DeclareFn,
    validator: Option<ValidatorFn>,
}

impl ModelType {
    /// Creates a root model type descriptor.
    #[must_use]
    pub const fn new(name: &'static str, declare: DeclareFn) -> Self {
        Self {
            name,
            base: None,
            declare,
            validator: None,
        }
    }

    /// Sets the base type.
    #[must_use]
    pub const fn extending(self, base: &'static ModelType) -> Self {
        Self {
            base: Some(base),
            ..self
        }
    }

    /// Sets the type's own validator.
    #[must_use]
    pub const fn with_validator(self, validator: ValidatorFn) -> Self {
        Self {
            validator: Some(validator),
            ..self
        }
    }

    /// The type name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelType")
            .field("name", &self.name)
            .field("base", &self.base.map(|b| b.name))
            .field("validator", &self.validator.is_some())
            .finish_non_exhaustive()
    }
}

/// Descriptors currently being declared, by name. `None` while the base
/// chain is still being resolved.
type InProgress = FxHashMap<&'static str, Option<ModelTypeId>>;

/// Handed to a [`ModelType`]'s declaration function.
pub struct TypeDeclaration<'r> {
    registry: &'r PropertyRegistry,
    owner: ModelTypeId,
    in_progress: &'r mut InProgress,
}

impl TypeDeclaration<'_> {
    /// The type being declared.
    #[must_use]
    pub const fn owner(&self) -> ModelTypeId {
        self.owner
    }

    /// Declares a property on the type.
    pub fn property(&mut self, spec: PropertySpec) -> Result<Arc<PropertyDefinition>, GraphError> {
        self.registry.register(self.owner, spec)
    }

    /// Resolves another descriptor, registering it if needed.
    ///
    /// Descriptors may refer to each other, and to themselves, this way.
    /// Calling [`PropertyRegistry::ensure`] from a declaration function
    /// instead would block on the initialization lock.
    pub fn model_type_of(&mut self, model_type: &'static ModelType) -> Result<ModelTypeId, GraphError> {
        self.registry.ensure_locked(model_type, self.in_progress)
    }
}

// =============================================================================
// SCHEMAS
// =============================================================================

/// The effective, inherited property list of a model type.
pub struct TypeSchema {
    ty: ModelTypeId,
    name: Arc<str>,
    chain: Vec<ModelTypeId>,
    properties: Vec<Arc<PropertyDefinition>>,
    index: FxHashMap<Arc<str>, usize>,
    validators: Vec<ValidatorFn>,
}

impl TypeSchema {
    /// The model type this schema describes.
    #[must_use]
    pub const fn model_type(&self) -> ModelTypeId {
        self.ty
    }

    /// The type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The type followed by its bases, nearest first.
    #[must_use]
    pub fn ancestry(&self) -> &[ModelTypeId] {
        &self.chain
    }

    /// Every property, base-type properties first.
    #[must_use]
    pub fn properties(&self) -> &[Arc<PropertyDefinition>] {
        &self.properties
    }

    /// Looks up a property by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<PropertyDefinition>> {
        self.index.get(name).map(|&i| &self.properties[i])
    }

    /// Validators to run, base-type validators first.
    #[must_use]
    pub fn validators(&self) -> &[ValidatorFn] {
        &self.validators
    }
}

impl fmt::Debug for TypeSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeSchema")
            .field("ty", &self.ty)
            .field("name", &self.name)
            .field("chain", &self.chain)
            .field("properties", &self.properties)
            .field("validators", &self.validators.len())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

struct TypeEntry {
    name: Arc<str>,
    base: Option<ModelTypeId>,
    declared: Vec<Arc<PropertyDefinition>>,
    validator: Option<ValidatorFn>,
    schema: Option<Arc<TypeSchema>>,
}

#[derive(Default)]
struct RegistryState {
    types: Vec<TypeEntry>,
    by_name: FxHashMap<Arc<str>, ModelTypeId>,
    initialized: FxHashMap<&'static str, ModelTypeId>,
}

impl RegistryState {
    fn entry(&self, ty: ModelTypeId) -> Result<&TypeEntry, GraphError> {
        self.types
            .get(ty.index() as usize)
            .ok_or(GraphError::UnknownType(ty))
    }

    /// `ty` and its bases, nearest first.
    fn chain(&self, ty: ModelTypeId) -> Result<Vec<ModelTypeId>, GraphError> {
        let mut chain = vec![ty];
        let mut current = self.entry(ty)?.base;
        while let Some(base) = current {
            chain.push(base);
            current = self.entry(base)?.base;
        }
        Ok(chain)
    }

    fn is_subtype(&self, ty: ModelTypeId, ancestor: ModelTypeId) -> bool {
        let mut current = Some(ty);
        while let Some(t) = current {
            if t == ancestor {
                return true;
            }
            current = self.types.get(t.index() as usize).and_then(|e| e.base);
        }
        false
    }

    fn invalidate_family(&mut self, ty: ModelTypeId) {
        for index in 0..self.types.len() {
            let Ok(raw) = u32::try_from(index) else {
                break;
            };
            let candidate = ModelTypeId::from_index(raw);
            if self.is_subtype(candidate, ty) {
                self.types[index].schema = None;
            }
        }
    }

    fn build_schema(&self, ty: ModelTypeId) -> Result<TypeSchema, GraphError> {
        let chain = self.chain(ty)?;
        let mut properties = Vec::new();
        let mut validators = Vec::new();
        for &t in chain.iter().rev() {
            let entry = self.entry(t)?;
            properties.extend(entry.declared.iter().map(Arc::clone));
            validators.extend(entry.validator);
        }
        let index = properties
            .iter()
            .enumerate()
            .map(|(i, p)| (Arc::clone(&p.name), i))
            .collect();
        Ok(TypeSchema {
            ty,
            name: Arc::clone(&self.entry(ty)?.name),
            chain,
            properties,
            index,
            validators,
        })
    }
}

/// Catalog of model types and their declared properties.
///
/// Read-mostly and safe to share across threads. A process-wide instance is
/// available through [`PropertyRegistry::global`]; tests and embedders can
/// create isolated registries with [`PropertyRegistry::new`].
pub struct PropertyRegistry {
    state: RwLock<RegistryState>,
    /// Serializes lazy descriptor initialization.
    init: Mutex<()>,
}

impl PropertyRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            init: Mutex::new(()),
        }
    }

    /// The process-wide registry.
    #[must_use]
    pub fn global() -> Arc<Self> {
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(Self::new())))
    }

    /// Registers a model type by name.
    ///
    /// Registering the same name with the same base again returns the
    /// existing identifier.
    ///
    /// # Errors
    ///
    /// [`GraphError::TypeConflict`] if the name exists with a different base,
    /// [`GraphError::UnknownType`] if `base` is not registered.
    pub fn register_type(&self, name: &str, base: Option<ModelTypeId>) -> Result<ModelTypeId, GraphError> {
        let mut state = self.state.write();
        if let Some(&existing) = state.by_name.get(name) {
            return if state.entry(existing)?.base == base {
                Ok(existing)
            } else {
                Err(GraphError::TypeConflict {
                    type_name: name.to_owned(),
                })
            };
        }
        if let Some(base) = base {
            state.entry(base)?;
        }

        let index = u32::try_from(state.types.len()).map_err(|_| GraphError::CapacityExhausted)?;
        let id = ModelTypeId::from_index(index);
        let name: Arc<str> = Arc::from(name);
        state.types.push(TypeEntry {
            name: Arc::clone(&name),
            base,
            declared: Vec::new(),
            validator: None,
            schema: None,
        });
        state.by_name.insert(Arc::clone(&name), id);
        debug!(ty = %id, name = %name, "Registered model type");
        Ok(id)
    }

    /// Declares a property on `owner`.
    ///
    /// Declaring an identical property again returns the existing definition.
    ///
    /// # Errors
    ///
    /// - [`GraphError::DuplicateProperty`] if the name is already declared
    ///   differently on `owner`, or declared on one of its bases or subtypes
    /// - [`GraphError::InvalidDefault`] if the default does not fit the type
    ///   or references graph entities
    pub fn register(&self, owner: ModelTypeId, spec: PropertySpec) -> Result<Arc<PropertyDefinition>, GraphError> {
        let mut state = self.state.write();
        let type_name = Arc::clone(&state.entry(owner)?.name);
        spec.check_default(&type_name)?;

        if let Some(existing) = state.entry(owner)?.declared.iter().find(|p| p.name == spec.name) {
            return if existing.matches(&spec) {
                Ok(Arc::clone(existing))
            } else {
                Err(GraphError::duplicate(&*spec.name, &*type_name))
            };
        }

        let declared_elsewhere = state.types.iter().enumerate().any(|(index, entry)| {
            let Ok(raw) = u32::try_from(index) else {
                return false;
            };
            let other = ModelTypeId::from_index(raw);
            other != owner
                && (state.is_subtype(owner, other) || state.is_subtype(other, owner))
                && entry.declared.iter().any(|p| p.name == spec.name)
        });
        if declared_elsewhere {
            return Err(GraphError::duplicate(&*spec.name, &*type_name));
        }

        let definition = Arc::new(PropertyDefinition {
            name: spec.name,
            value_type: spec.value_type,
            default: spec.default,
            declaring_type: owner,
            tracks_dirty: spec.tracks_dirty,
        });
        state.types[owner.index() as usize]
            .declared
            .push(Arc::clone(&definition));
        state.invalidate_family(owner);
        trace!(ty = %type_name, property = %definition.name, value_type = %definition.value_type, "Registered property");
        Ok(definition)
    }

    /// Sets the validator that runs for `ty` and its subtypes.
    pub fn set_validator(&self, ty: ModelTypeId, validator: ValidatorFn) -> Result<(), GraphError> {
        let mut state = self.state.write();
        state.entry(ty)?;
        state.types[ty.index() as usize].validator = Some(validator);
        state.invalidate_family(ty);
        Ok(())
    }

    /// The effective schema of `ty`, built and cached on first use.
    pub fn schema(&self, ty: ModelTypeId) -> Result<Arc<TypeSchema>, GraphError> {
        if let Some(schema) = &self.state.read().entry(ty)?.schema {
            return Ok(Arc::clone(schema));
        }
        // Only one upgradable guard exists at a time, so recheck under it.
        let state = self.state.upgradable_read();
        if let Some(schema) = &state.entry(ty)?.schema {
            return Ok(Arc::clone(schema));
        }
        let mut state = RwLockUpgradableReadGuard::upgrade(state);
        let schema = Arc::new(state.build_schema(ty)?);
        state.types[ty.index() as usize].schema = Some(Arc::clone(&schema));
        Ok(schema)
    }

    /// Resolves `name` on `ty` or one of its bases.
    ///
    /// # Errors
    ///
    /// [`GraphError::PropertyNotRegistered`] if no type in the chain declares it.
    pub fn resolve(&self, ty: ModelTypeId, name: &str) -> Result<Arc<PropertyDefinition>, GraphError> {
        let schema = self.schema(ty)?;
        schema
            .get(name)
            .map(Arc::clone)
            .ok_or_else(|| GraphError::not_registered(name, schema.name()))
    }

    /// Every property of `ty`, base-type properties first, then declaration order.
    pub fn all_properties(&self, ty: ModelTypeId) -> Result<Vec<Arc<PropertyDefinition>>, GraphError> {
        Ok(self.schema(ty)?.properties().to_vec())
    }

    /// Returns `true` if `ty` is `ancestor` or derives from it.
    #[must_use]
    pub fn is_subtype(&self, ty: ModelTypeId, ancestor: ModelTypeId) -> bool {
        self.state.read().is_subtype(ty, ancestor)
    }

    /// The name `ty` was registered with.
    #[must_use]
    pub fn type_name(&self, ty: ModelTypeId) -> Option<Arc<str>> {
        self.state
            .read()
            .types
            .get(ty.index() as usize)
            .map(|e| Arc::clone(&e.name))
    }

    /// Finds a model type by name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<ModelTypeId> {
        self.state.read().by_name.get(name).copied()
    }

    /// Returns `true` if `name` is a registered model type.
    #[must_use]
    pub fn is_model_type(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Number of registered model types.
    #[must_use]
    pub fn type_count(&self) -> usize {
        self.state.read().types.len()
    }

    /// Registers a static descriptor, its base chain, and its properties.
    ///
    /// Runs each descriptor's declaration function at most once per
    /// registry; later calls are a map lookup.
    pub fn ensure(&self, model_type: &'static ModelType) -> Result<ModelTypeId, GraphError> {
        if let Some(&id) = self.state.read().initialized.get(model_type.name) {
            return Ok(id);
        }
        let _init = self.init.lock();
        let mut in_progress = InProgress::default();
        self.ensure_locked(model_type, &mut in_progress)
    }

    fn ensure_locked(
        &self,
        model_type: &'static ModelType,
        in_progress: &mut InProgress,
    ) -> Result<ModelTypeId, GraphError> {
        if let Some(&id) = self.state.read().initialized.get(model_type.name) {
            return Ok(id);
        }
        match in_progress.get(model_type.name) {
            Some(Some(id)) => return Ok(*id),
            Some(None) => {
                return Err(GraphError::TypeConflict {
                    type_name: model_type.name.to_owned(),
                });
            }
            None => {}
        }

        in_progress.insert(model_type.name, None);
        let base = match model_type.base {
            Some(base) => Some(self.ensure_locked(base, in_progress)?),
            None => None,
        };
        let id = self.register_type(model_type.name, base)?;
        in_progress.insert(model_type.name, Some(id));

        if let Some(validator) = model_type.validator {
            self.set_validator(id, validator)?;
        }
        let mut declaration = TypeDeclaration {
            registry: self,
            owner: id,
            in_progress,
        };
        (model_type.declare)(&mut declaration)?;

        self.state.write().initialized.insert(model_type.name, id);
        debug!(ty = %id, name = model_type.name, "Initialized model type descriptor");
        Ok(id)
    }

    /// Names of every descriptor initialized so far.
    #[must_use]
    pub fn initialized_descriptors(&self) -> FxHashSet<&'static str> {
        self.state.read().initialized.keys().copied().collect()
    }
}

impl Default for PropertyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PropertyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyRegistry")
            .field("types", &self.type_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::ValidationContext;
    use mg_core::ValidationResults;

    fn registry_with_hierarchy() -> (PropertyRegistry, ModelTypeId, ModelTypeId) {
        let registry = PropertyRegistry::new();
        let base = registry.register_type("Entity", None).unwrap();
        let derived = registry.register_type("Customer", Some(base)).unwrap();
        registry
            .register(base, PropertySpec::new("Id", ValueType::Int))
            .unwrap();
        registry
            .register(derived, PropertySpec::new("Name", ValueType::Text))
            .unwrap();
        (registry, base, derived)
    }

    #[test]
    fn test_resolve_walks_base_chain() {
        let (registry, base, derived) = registry_with_hierarchy();
        let id = registry.resolve(derived, "Id").unwrap();
        assert_eq!(id.declaring_type(), base);
        assert!(registry.resolve(base, "Name").is_err());
    }

    #[test]
    fn test_cached_schema_reads_alongside_upgradable_guard() {
        let (registry, _, derived) = registry_with_hierarchy();
        registry.schema(derived).unwrap();

        let guard = registry.state.upgradable_read();
        let resolved = std::thread::scope(|scope| {
            let reader = scope.spawn(|| registry.resolve(derived, "Name").map(|p| p.name().to_owned()));
            reader.join().unwrap()
        });
        drop(guard);
        assert_eq!(resolved.unwrap(), "Name");
    }

    #[test]
    fn test_all_properties_base_first() {
        let (registry, _, derived) = registry_with_hierarchy();
        let names: Vec<_> = registry
            .all_properties(derived)
            .unwrap()
            .iter()
            .map(|p| p.name().to_owned())
            .collect();
        assert_eq!(names, ["Id", "Name"]);
    }

    #[test]
    fn test_unregistered_property() {
        let (registry, _, derived) = registry_with_hierarchy();
        let err = registry.resolve(derived, "Email").unwrap_err();
        assert!(matches!(
            err,
            GraphError::PropertyNotRegistered { ref name, ref type_name } if name == "Email" && type_name == "Customer"
        ));
    }

    #[test]
    fn test_identical_registration_is_idempotent() {
        let (registry, base, _) = registry_with_hierarchy();
        let again = registry
            .register(base, PropertySpec::new("Id", ValueType::Int))
            .unwrap();
        assert_eq!(again.name(), "Id");
        assert_eq!(registry.all_properties(base).unwrap().len(), 1);
    }

    #[test]
    fn test_conflicting_registration_is_duplicate() {
        let (registry, base, _) = registry_with_hierarchy();
        let err = registry
            .register(base, PropertySpec::new("Id", ValueType::Text))
            .unwrap_err();
        assert!(matches!(err, GraphError::DuplicateProperty { .. }));
    }

    #[test]
    fn test_redeclaring_base_property_in_subtype() {
        let (registry, _, derived) = registry_with_hierarchy();
        let err = registry
            .register(derived, PropertySpec::new("Id", ValueType::Int))
            .unwrap_err();
        assert!(matches!(err, GraphError::DuplicateProperty { ref type_name, .. } if type_name == "Customer"));
    }

    #[test]
    fn test_declaring_subtype_property_on_base() {
        let (registry, base, _) = registry_with_hierarchy();
        let err = registry
            .register(base, PropertySpec::new("Name", ValueType::Text))
            .unwrap_err();
        assert!(matches!(err, GraphError::DuplicateProperty { .. }));
    }

    #[test]
    fn test_new_property_invalidates_subtype_schema() {
        let (registry, base, derived) = registry_with_hierarchy();
        assert_eq!(registry.schema(derived).unwrap().properties().len(), 2);
        registry
            .register(base, PropertySpec::new("Created", ValueType::Text))
            .unwrap();
        assert_eq!(registry.schema(derived).unwrap().properties().len(), 3);
    }

    #[test]
    fn test_register_type_conflict() {
        let (registry, base, _) = registry_with_hierarchy();
        assert_eq!(registry.register_type("Customer", Some(base)).unwrap().index(), 1);
        let err = registry.register_type("Customer", None).unwrap_err();
        assert!(matches!(err, GraphError::TypeConflict { .. }));
    }

    #[test]
    fn test_invalid_defaults() {
        let registry = PropertyRegistry::new();
        let ty = registry.register_type("Order", None).unwrap();

        let err = registry
            .register(ty, PropertySpec::new("Total", ValueType::Int).default_value("zero"))
            .unwrap_err();
        assert!(matches!(err, GraphError::InvalidDefault { .. }));

        let err = registry
            .register(ty, PropertySpec::new("Lines", ValueType::Text).new_collection())
            .unwrap_err();
        assert!(matches!(err, GraphError::InvalidDefault { .. }));

        registry
            .register(ty, PropertySpec::new("Lines", ValueType::Collection).new_collection())
            .unwrap();
    }

    #[test]
    fn test_lookup_and_model_type_predicate() {
        let (registry, base, derived) = registry_with_hierarchy();
        assert_eq!(registry.lookup("Entity"), Some(base));
        assert!(registry.is_model_type("Customer"));
        assert!(!registry.is_model_type("Invoice"));
        assert!(registry.is_subtype(derived, base));
        assert!(!registry.is_subtype(base, derived));
        assert_eq!(registry.type_name(derived).as_deref(), Some("Customer"));
    }

    static NODE: ModelType = ModelType::new("TreeNode", declare_tree_node).with_validator(no_op_validator);
    static LEAF: ModelType = ModelType::new("TreeLeaf", declare_tree_leaf).extending(&NODE);

    fn declare_tree_node(decl: &mut TypeDeclaration<'_>) -> Result<(), GraphError> {
        let this = decl.model_type_of(&NODE)?;
        decl.property(PropertySpec::new("Parent", ValueType::Model(Some(this))))?;
        Ok(())
    }

    fn declare_tree_leaf(decl: &mut TypeDeclaration<'_>) -> Result<(), GraphError> {
        decl.property(PropertySpec::new("Weight", ValueType::Float))?;
        Ok(())
    }

    fn no_op_validator(_: &ValidationContext<'_>, _: &mut ValidationResults) {}

    #[test]
    fn test_ensure_registers_descriptor_chain_once() {
        let registry = PropertyRegistry::new();
        let leaf = registry.ensure(&LEAF).unwrap();
        let node = registry.lookup("TreeNode").unwrap();
        assert!(registry.is_subtype(leaf, node));
        assert_eq!(registry.ensure(&LEAF).unwrap(), leaf);
        assert_eq!(registry.ensure(&NODE).unwrap(), node);
        assert_eq!(registry.type_count(), 2);

        let schema = registry.schema(leaf).unwrap();
        let names: Vec<_> = schema.properties().iter().map(|p| p.name()).collect();
        assert_eq!(names, ["Parent", "Weight"]);
        assert_eq!(schema.validators().len(), 1);
        assert_eq!(
            registry.resolve(leaf, "Parent").unwrap().value_type(),
            ValueType::Model(Some(node))
        );
    }

    #[test]
    fn test_global_is_shared() {
        let a = PropertyRegistry::global();
        let b = PropertyRegistry::global();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
