//! Lexical environments.
//!
//! An [`Environment`] is a handle to the innermost scope of a chain that ends
//! at the global scope. Scopes are reference counted and shared: nesting a
//! scope is O(1) and never copies outer bindings, so a lambda captures its
//! defining environment by cloning the handle, and later assignments through
//! any handle are visible through all of them.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::ast::Value;

/// What introduced a scope. Assignment to an unbound name skips `Let` scopes
/// and lands in the innermost `Function` scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Function,
    Let,
}

struct Scope {
    kind: ScopeKind,
    bindings: RefCell<HashMap<String, Value>>,
    parent: Option<Rc<Scope>>,
}

impl Scope {
    fn ancestors(self: &Rc<Self>) -> impl Iterator<Item = &Rc<Scope>> {
        std::iter::successors(Some(self), |scope| scope.parent.as_ref())
    }
}

/// Environment for variable bindings
#[derive(Clone)]
pub struct Environment {
    innermost: Rc<Scope>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    /// A fresh environment holding a single, empty global scope
    pub fn new() -> Self {
        Environment {
            innermost: Rc::new(Scope {
                kind: ScopeKind::Function,
                bindings: RefCell::new(HashMap::new()),
                parent: None,
            }),
        }
    }

    /// A new environment whose innermost scope is fresh and whose outer
    /// scopes are shared with `self`
    pub fn with_nested_scope(&self, kind: ScopeKind) -> Self {
        Environment {
            innermost: Rc::new(Scope {
                kind,
                bindings: RefCell::new(HashMap::new()),
                parent: Some(Rc::clone(&self.innermost)),
            }),
        }
    }

    /// A view of the global scope alone
    pub fn global_only(&self) -> Self {
        let global = self.innermost.ancestors().last().unwrap_or(&self.innermost);
        Environment {
            innermost: Rc::clone(global),
        }
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.innermost
            .ancestors()
            .find_map(|scope| scope.bindings.borrow().get(name).cloned())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.innermost
            .ancestors()
            .any(|scope| scope.bindings.borrow().contains_key(name))
    }

    /// Bind `name` in the innermost scope, shadowing any outer binding
    pub fn define(&self, name: impl Into<String>, value: Value) {
        self.innermost
            .bindings
            .borrow_mut()
            .insert(name.into(), value);
    }

    /// Assign `name`: update the nearest scope that already binds it, or
    /// else create it in the nearest function scope
    pub fn set(&self, name: &str, value: Value) {
        let target = self
            .innermost
            .ancestors()
            .find(|scope| scope.bindings.borrow().contains_key(name))
            .or_else(|| {
                self.innermost
                    .ancestors()
                    .find(|scope| scope.kind == ScopeKind::Function)
            })
            .unwrap_or(&self.innermost);
        target.bindings.borrow_mut().insert(name.to_owned(), value);
    }

    /// Get all bindings in this environment and its parents
    /// Returns a Vec of (name, value) pairs sorted by name
    pub fn get_all_bindings(&self) -> Vec<(String, Value)> {
        let mut bindings = HashMap::new();

        // Outermost first, so inner scopes override
        let scopes: Vec<&Rc<Scope>> = self.innermost.ancestors().collect();
        for scope in scopes.into_iter().rev() {
            for (name, value) in scope.bindings.borrow().iter() {
                bindings.insert(name.clone(), value.clone());
            }
        }

        let mut result: Vec<_> = bindings.into_iter().collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }

    /// Number of scopes between this environment and the global scope,
    /// inclusive
    pub fn depth(&self) -> usize {
        self.innermost.ancestors().count()
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Environment({:?} scope, depth {})",
            self.innermost.kind,
            self.depth()
        )
    }
}
