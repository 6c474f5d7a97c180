//! The debugging-entry tree: a compile unit owning functions, scopes and
//! variables, plus the id-keyed type table.

use std::collections::HashMap;

use crate::source::location::LocOp;
use crate::source::types::{Type, TypeId};

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub type_id: Option<TypeId>,
    /// Stack program whose interpretation yields the live location. Empty
    /// means the compiler recorded no location.
    pub location: Vec<LocOp>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scope {
    pub begin: u64,
    pub end: u64,
    pub variables: Vec<Variable>,
    pub scopes: Vec<Scope>,
}

impl Scope {
    fn contains(&self, address: u64) -> bool {
        self.begin <= address && address < self.end
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub begin: u64,
    pub end: u64,
    pub scope: Option<Scope>,
}

impl Function {
    pub fn contains(&self, address: u64) -> bool {
        self.begin <= address && address < self.end
    }
}

/// The compile unit: everything the debug-info parser produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DebugInfo {
    pub functions: Vec<Function>,
    pub types: HashMap<TypeId, Type>,
}

impl DebugInfo {
    pub fn function_at(&self, address: u64) -> Option<&Function> {
        self.functions.iter().find(|f| f.contains(address))
    }

    pub fn type_of(&self, id: TypeId) -> Option<&Type> {
        self.types.get(&id)
    }

    /// All variables visible at `address`, outer scopes first. A variable
    /// in an inner scope shadows an outer one of the same name (the outer
    /// entry is dropped and the inner takes its place at the end).
    pub fn scoped_variables(&self, address: u64) -> Vec<&Variable> {
        let mut visible = Vec::new();
        if let Some(function) = self.function_at(address) {
            if let Some(scope) = &function.scope {
                collect_visible(scope, address, &mut visible);
            }
        }
        visible
    }

    /// The innermost variable named `name` visible at `address`.
    pub fn variable_at(&self, address: u64, name: &str) -> Option<&Variable> {
        self.scoped_variables(address)
            .into_iter()
            .rev()
            .find(|v| v.name == name)
    }
}

fn collect_visible<'a>(scope: &'a Scope, address: u64, out: &mut Vec<&'a Variable>) {
    if !scope.contains(address) {
        return;
    }
    for var in &scope.variables {
        if let Some(pos) = out.iter().position(|v| v.name == var.name) {
            out.remove(pos);
        }
        out.push(var);
    }
    for inner in &scope.scopes {
        collect_visible(inner, address, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Variable {
        Variable {
            name: name.to_string(),
            type_id: Some(0),
            location: Vec::new(),
        }
    }

    fn info_with_nested_scope() -> DebugInfo {
        DebugInfo {
            functions: vec![Function {
                name: "main".to_string(),
                begin: 0,
                end: 10,
                scope: Some(Scope {
                    begin: 0,
                    end: 10,
                    variables: vec![var("a"), var("b")],
                    scopes: vec![Scope {
                        begin: 3,
                        end: 7,
                        variables: vec![var("a"), var("c")],
                        scopes: Vec::new(),
                    }],
                }),
            }],
            types: HashMap::new(),
        }
    }

    #[test]
    fn inner_scope_shadows_outer() {
        let info = info_with_nested_scope();
        let names: Vec<&str> = info
            .scoped_variables(5)
            .iter()
            .map(|v| v.name.as_str())
            .collect();
        assert_eq!(names, ["b", "a", "c"]);
    }

    #[test]
    fn outer_scope_only_outside_the_inner_range() {
        let info = info_with_nested_scope();
        let names: Vec<&str> = info
            .scoped_variables(1)
            .iter()
            .map(|v| v.name.as_str())
            .collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn function_extent_is_half_open() {
        let info = info_with_nested_scope();
        assert!(info.function_at(0).is_some());
        assert!(info.function_at(9).is_some());
        assert!(info.function_at(10).is_none());
    }
}
