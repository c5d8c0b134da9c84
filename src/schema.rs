//! Interface descriptors: per-interface method tables and ancestry.
//!
//! Interfaces are built once at definition time and shared immutably.
//! Method dispatch is an explicit table lookup (name → descriptor), so an
//! unknown name is a typed lookup error rather than a dynamic-attribute
//! miss. Ancestry (`extends`) is recorded per interface and answers the
//! cast registry question: is a requested interface a (possibly
//! transitive) ancestor of a client's static type? `upcast` enforces the
//! answer; `cast_as` ignores it.

use crate::error::{Error, Result};
use crate::value::ValueType;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

/// One declared field of a parameter or result list.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    /// Field name.
    pub name: String,
    /// Declared type.
    pub ty: ValueType,
    /// For capability-typed fields, the declared interface. Used to brand
    /// null capabilities substituted for absent arguments.
    pub interface: Option<Interface>,
}

impl FieldDescriptor {
    /// Creates a plain field descriptor.
    #[must_use]
    pub fn new(name: impl Into<String>, ty: ValueType) -> Self {
        Self {
            name: name.into(),
            ty,
            interface: None,
        }
    }

    /// Creates a capability-typed field descriptor with its declared
    /// interface.
    #[must_use]
    pub fn capability(name: impl Into<String>, interface: &Interface) -> Self {
        Self {
            name: name.into(),
            ty: ValueType::Capability,
            interface: Some(interface.clone()),
        }
    }
}

/// One method's calling contract: parameters, ordering, results.
#[derive(Debug, Clone)]
pub struct MethodDescriptor {
    /// Method name.
    pub name: String,
    /// Declared parameter fields.
    pub params: Vec<FieldDescriptor>,
    /// Whether the parameter list carries an implicit (ordinal) order,
    /// making positional argument binding legal.
    pub implicit_param_order: bool,
    /// Declared result fields.
    pub results: Vec<FieldDescriptor>,
}

impl MethodDescriptor {
    /// Starts a method descriptor with the given name.
    ///
    /// Parameter lists default to implicit ordinal ordering; call
    /// [`Self::explicit_param_struct`] for methods whose parameter struct
    /// is independently defined and therefore unordered.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            implicit_param_order: true,
            results: Vec::new(),
        }
    }

    /// Appends a parameter field.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, ty: ValueType) -> Self {
        self.params.push(FieldDescriptor::new(name, ty));
        self
    }

    /// Appends a capability-typed parameter with its declared interface.
    #[must_use]
    pub fn cap_param(mut self, name: impl Into<String>, interface: &Interface) -> Self {
        self.params.push(FieldDescriptor::capability(name, interface));
        self
    }

    /// Appends a result field.
    #[must_use]
    pub fn result(mut self, name: impl Into<String>, ty: ValueType) -> Self {
        self.results.push(FieldDescriptor::new(name, ty));
        self
    }

    /// Appends a capability-typed result field.
    #[must_use]
    pub fn cap_result(mut self, name: impl Into<String>, interface: &Interface) -> Self {
        self.results.push(FieldDescriptor::capability(name, interface));
        self
    }

    /// Marks the parameter struct as independently defined: no ordinal
    /// ordering, so positional argument binding is rejected.
    #[must_use]
    pub fn explicit_param_struct(mut self) -> Self {
        self.implicit_param_order = false;
        self
    }

    /// Looks up a declared parameter by name.
    #[must_use]
    pub fn param_named(&self, name: &str) -> Option<&FieldDescriptor> {
        self.params.iter().find(|f| f.name == name)
    }

    /// Looks up a declared result field by name.
    #[must_use]
    pub fn result_named(&self, name: &str) -> Option<&FieldDescriptor> {
        self.results.iter().find(|f| f.name == name)
    }
}

#[derive(Debug)]
struct InterfaceInner {
    name: String,
    methods: BTreeMap<String, Arc<MethodDescriptor>>,
    extends: Vec<Interface>,
}

/// An interface: a named, immutable method table plus declared
/// superclasses. Cheap to clone; identity is by definition, not by name.
#[derive(Debug, Clone)]
pub struct Interface {
    inner: Arc<InterfaceInner>,
}

impl Interface {
    /// Starts building an interface with the given name.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> InterfaceBuilder {
        InterfaceBuilder {
            name: name.into(),
            methods: BTreeMap::new(),
            extends: Vec::new(),
        }
    }

    /// The interface every null capability is branded with. It declares no
    /// methods; lookups against it never succeed, but null-capability
    /// calls fail before lookup anyway.
    #[must_use]
    pub fn null() -> Self {
        static NULL: OnceLock<Interface> = OnceLock::new();
        NULL.get_or_init(|| Self::builder("(null)").build()).clone()
    }

    /// Returns the interface name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns true if `self` and `other` denote the same interface
    /// definition.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Returns true if `ancestor` is this interface itself or a declared
    /// (transitive) superclass.
    #[must_use]
    pub fn descends_from(&self, ancestor: &Self) -> bool {
        if self.same_as(ancestor) {
            return true;
        }
        self.inner
            .extends
            .iter()
            .any(|parent| parent.descends_from(ancestor))
    }

    /// Resolves a method by name, searching this interface and then its
    /// superclasses depth-first.
    pub fn resolve_method(&self, name: &str) -> Result<Arc<MethodDescriptor>> {
        self.find_method(name)
            .ok_or_else(|| Error::unknown_method(&self.inner.name, name))
    }

    fn find_method(&self, name: &str) -> Option<Arc<MethodDescriptor>> {
        if let Some(m) = self.inner.methods.get(name) {
            return Some(m.clone());
        }
        self.inner
            .extends
            .iter()
            .find_map(|parent| parent.find_method(name))
    }
}

/// Builder for [`Interface`].
#[derive(Debug)]
pub struct InterfaceBuilder {
    name: String,
    methods: BTreeMap<String, Arc<MethodDescriptor>>,
    extends: Vec<Interface>,
}

impl InterfaceBuilder {
    /// Declares a superclass.
    #[must_use]
    pub fn extends(mut self, parent: &Interface) -> Self {
        self.extends.push(parent.clone());
        self
    }

    /// Adds a method to the table.
    #[must_use]
    pub fn method(mut self, method: MethodDescriptor) -> Self {
        self.methods
            .insert(method.name.clone(), Arc::new(method));
        self
    }

    /// Finalizes the interface.
    #[must_use]
    pub fn build(self) -> Interface {
        Interface {
            inner: Arc::new(InterfaceInner {
                name: self.name,
                methods: self.methods,
                extends: self.extends,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn base() -> Interface {
        Interface::builder("Base")
            .method(
                MethodDescriptor::new("foo")
                    .param("i", ValueType::Int)
                    .result("x", ValueType::Text),
            )
            .build()
    }

    #[test]
    fn method_lookup_hits_table() {
        let iface = base();
        let m = iface.resolve_method("foo").expect("foo");
        assert_eq!(m.params.len(), 1);
        assert_eq!(m.results[0].name, "x");
    }

    #[test]
    fn unknown_method_is_typed_miss() {
        let iface = base();
        let err = iface.resolve_method("foo2").expect_err("miss");
        assert_eq!(err.kind(), ErrorKind::UnknownMethod);
        assert!(err.message().unwrap().contains("foo2"));
    }

    #[test]
    fn inherited_methods_resolve_through_ancestors() {
        let parent = base();
        let child = Interface::builder("Child")
            .extends(&parent)
            .method(MethodDescriptor::new("qux"))
            .build();
        assert!(child.resolve_method("foo").is_ok());
        assert!(child.resolve_method("qux").is_ok());
    }

    #[test]
    fn ancestry_is_reflexive_and_transitive() {
        let a = base();
        let b = Interface::builder("B").extends(&a).build();
        let c = Interface::builder("C").extends(&b).build();
        assert!(a.descends_from(&a));
        assert!(c.descends_from(&a));
        assert!(!a.descends_from(&c));
    }

    #[test]
    fn identity_is_by_definition_not_name() {
        let one = base();
        let two = base();
        assert!(!one.same_as(&two));
        assert!(one.same_as(&one.clone()));
    }

    #[test]
    fn explicit_param_struct_disables_ordering() {
        let m = MethodDescriptor::new("bar")
            .param("a", ValueType::Text)
            .explicit_param_struct();
        assert!(!m.implicit_param_order);
    }
}
