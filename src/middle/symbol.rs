use std::cmp::Ordering;

use hashbrown::HashMap;
use itertools::Itertools;

use crate::{
    frontend::lexer::Location,
    index::{IndexVec, simple_index},
    middle::{
        constant::Constant,
        intrinsics::{self, Intrinsic},
        ir::{BuiltIn, Id, StorageClass},
        ty::Type,
    },
};

simple_index! {
    /// Index into the module's function table
    pub struct FunctionIndex;
}

/// A struct member, function parameter or function return value together
/// with its semantic binding
#[derive(Debug, Clone, Default)]
pub struct StructMember {
    pub name: String,
    pub ty: Type,
    pub semantic: String,
    pub builtin: Option<BuiltIn>,
    pub semantic_index: u32,
    pub location: Location,
}

#[derive(Debug, Clone)]
pub struct StructInfo {
    pub definition: Id,
    pub members: Vec<StructMember>,
}

impl StructInfo {
    pub fn member(&self, name: &str) -> Option<(usize, &StructMember)> {
        self.members.iter().find_position(|m| m.name == name)
    }
}

#[derive(Debug, Clone)]
pub struct FunctionInfo {
    pub name: String,
    pub definition: Id,
    pub return_type: Type,
    pub return_semantic: String,
    pub return_builtin: Option<BuiltIn>,
    pub return_semantic_index: u32,
    pub parameters: Vec<StructMember>,
    /// Generated stage wrappers, created on first use in a pass
    pub vertex_entry_point: Option<Id>,
    pub fragment_entry_point: Option<Id>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SymbolKind {
    /// Pointer to storage of the given class
    Variable(StorageClass),
    /// Member of the global uniform block, the symbol id is the block variable
    UniformMember(u32),
    Constant(Constant),
    /// `None` for placeholders of functions which failed to parse
    Function(Option<FunctionIndex>),
    Struct,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub kind: SymbolKind,
    pub id: Id,
    pub ty: Type,
}

impl Symbol {
    pub fn is_function(&self) -> bool {
        matches!(self.kind, SymbolKind::Function(_))
    }
}

/// Position in the scope stack. `name` is the namespace path with leading and
/// trailing separators (`::`, `::A::`, `::A::B::`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub name: String,
    pub level: u32,
    pub namespace_level: u32,
}

impl Scope {
    pub fn root() -> Self {
        Self {
            name: "::".to_owned(),
            level: 0,
            namespace_level: 0,
        }
    }

    fn is_namespace_scope(&self) -> bool {
        self.level == self.namespace_level
    }

    fn can_see(&self, other: &Scope) -> bool {
        other.level <= self.level
            && other.namespace_level <= self.namespace_level
            && self.name.starts_with(&other.name)
    }
}

#[derive(Debug, Clone)]
struct ScopedSymbol {
    scope: Scope,
    symbol: Symbol,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Callee {
    Function(FunctionIndex),
    Intrinsic(&'static Intrinsic),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallError {
    Undeclared,
    Ambiguous,
    NoMatch,
    /// Only a placeholder of a failed declaration was found
    Placeholder,
}

#[derive(Debug)]
pub struct SymbolTable {
    current: Scope,
    symbols: HashMap<String, Vec<ScopedSymbol>>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            current: Scope::root(),
            symbols: HashMap::new(),
        }
    }

    pub fn current_scope(&self) -> &Scope {
        &self.current
    }

    pub fn enter_scope(&mut self) {
        self.current.level += 1;
    }

    /// Leaves a block scope, dropping every symbol declared inside of it
    pub fn leave_scope(&mut self) {
        let level = self.current.level;

        for scoped in self.symbols.values_mut() {
            scoped.retain(|s| s.scope.is_namespace_scope() || s.scope.level < level);
        }

        self.current.level -= 1;
    }

    pub fn enter_namespace(&mut self, name: &str) {
        self.current.name.push_str(name);
        self.current.name.push_str("::");
        self.current.level += 1;
        self.current.namespace_level += 1;
    }

    pub fn leave_namespace(&mut self) {
        let trimmed = &self.current.name[..self.current.name.len() - 2];
        let parent_end = trimmed.rfind("::").map_or(2, |i| i + 2);

        self.current.name.truncate(parent_end);
        self.current.level -= 1;
        self.current.namespace_level -= 1;
    }

    /// Binds a name in the current scope, or in the enclosing namespace scope
    /// when `global` is set. Returns `false` if a non-function symbol with the
    /// same name already exists there.
    pub fn insert(&mut self, name: &str, symbol: Symbol, global: bool) -> bool {
        if !symbol.is_function() && self.find_in(name, &self.current, true).is_some() {
            return false;
        }

        let scope = if global {
            Scope {
                name: self.current.name.clone(),
                level: self.current.namespace_level,
                namespace_level: self.current.namespace_level,
            }
        } else {
            self.current.clone()
        };

        if global {
            // Make the symbol reachable through qualified names from every
            // enclosing namespace
            let segments = scope
                .name
                .split("::")
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>();

            for depth in 0..segments.len() {
                let qualified = format!("{}::{name}", segments[depth..].join("::"));
                let outer_name = match depth {
                    0 => "::".to_owned(),
                    _ => format!("::{}::", segments[..depth].join("::")),
                };

                self.push(
                    qualified,
                    Scope {
                        name: outer_name,
                        level: depth as u32,
                        namespace_level: depth as u32,
                    },
                    symbol.clone(),
                );
            }
        }

        self.push(name.to_owned(), scope, symbol);

        true
    }

    fn push(&mut self, name: String, scope: Scope, symbol: Symbol) {
        self.symbols
            .entry(name)
            .or_default()
            .push(ScopedSymbol { scope, symbol });
    }

    pub fn find(&self, name: &str) -> Option<&Symbol> {
        self.find_in(name, &self.current, false)
    }

    /// Looks a name up as seen from `scope`. An exclusive lookup only considers
    /// symbols declared at exactly that scope level.
    pub fn find_in(&self, name: &str, scope: &Scope, exclusive: bool) -> Option<&Symbol> {
        let mut result = None;

        for scoped in self.symbols.get(name)?.iter().rev() {
            if !scope.can_see(&scoped.scope) {
                continue;
            }

            if exclusive && scoped.scope.level < scope.level {
                continue;
            }

            // Variables and types hide functions of the same name
            if !scoped.symbol.is_function() {
                return Some(&scoped.symbol);
            }

            result.get_or_insert(&scoped.symbol);
        }

        result
    }

    /// Every function overload of a name visible from `scope`
    fn find_functions(&self, name: &str, scope: &Scope, exclusive: bool) -> Vec<&Symbol> {
        let Some(scoped) = self.symbols.get(name) else {
            return Vec::new();
        };

        scoped
            .iter()
            .filter(|s| scope.can_see(&s.scope))
            .filter(|s| !exclusive || s.scope.level >= scope.level)
            .filter(|s| s.symbol.is_function())
            .map(|s| &s.symbol)
            .collect()
    }

    /// Finds an overload of a function in the current scope with exactly the
    /// given parameter types
    pub fn find_exact_overload(
        &self,
        name: &str,
        parameters: &[Type],
        functions: &IndexVec<FunctionIndex, FunctionInfo>,
    ) -> Option<FunctionIndex> {
        self.find_functions(name, &self.current, true)
            .into_iter()
            .filter_map(|s| match s.kind {
                SymbolKind::Function(index) => index,
                _ => None,
            })
            .find(|index| {
                let existing = &functions[*index].parameters;

                existing.len() == parameters.len()
                    && existing.iter().zip(parameters).all(|(a, b)| {
                        let (a, b) = (a.ty.unqualified(), b.unqualified());
                        a == b
                    })
            })
    }

    /// Resolves a call to the best matching overload among the declared
    /// functions and intrinsics of that name.
    pub fn resolve_function_call(
        &self,
        name: &str,
        arguments: &[Type],
        scope: &Scope,
        exclusive: bool,
        functions: &IndexVec<FunctionIndex, FunctionInfo>,
    ) -> Result<Callee, CallError> {
        let mut found_any = false;
        let mut found_placeholder = false;
        let mut best: Option<(Callee, Vec<u32>)> = None;
        let mut ambiguous = false;

        let mut consider = |callee: Callee, parameters: Vec<Type>| {
            if parameters.len() != arguments.len() {
                return;
            }

            let mut ranks = Vec::with_capacity(arguments.len());

            for (argument, parameter) in arguments.iter().zip(&parameters) {
                match Type::rank(argument, &parameter.unqualified()) {
                    0 => return,
                    rank => ranks.push(rank),
                }
            }

            ranks.sort_unstable_by(|a, b| b.cmp(a));

            let ordering = best.as_ref().map(|(_, best_ranks)| ranks.cmp(best_ranks));

            match ordering {
                Some(Ordering::Equal) => ambiguous = true,
                Some(Ordering::Less) => {}
                _ => {
                    best = Some((callee, ranks));
                    ambiguous = false;
                }
            }
        };

        for symbol in self.find_functions(name, scope, exclusive) {
            found_any = true;

            match symbol.kind {
                SymbolKind::Function(Some(index)) => {
                    let parameters = functions[index]
                        .parameters
                        .iter()
                        .map(|p| p.ty)
                        .collect();
                    consider(Callee::Function(index), parameters);
                }
                _ => found_placeholder = true,
            }
        }

        if !name.contains("::") {
            for intrinsic in intrinsics::lookup(name) {
                found_any = true;
                consider(Callee::Intrinsic(intrinsic), intrinsic.parameters.clone());
            }
        }

        match best {
            _ if !found_any => Err(CallError::Undeclared),
            Some(_) if ambiguous => Err(CallError::Ambiguous),
            Some((callee, _)) => Ok(callee),
            None if found_placeholder => Err(CallError::Placeholder),
            None => Err(CallError::NoMatch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middle::ty::BaseKind;

    fn variable(id: u32) -> Symbol {
        Symbol {
            kind: SymbolKind::Variable(StorageClass::Private),
            id: Id(id),
            ty: Type::FLOAT,
        }
    }

    #[test]
    fn inner_scopes_shadow_and_unwind() {
        let mut table = SymbolTable::new();
        assert!(table.insert("x", variable(1), true));

        table.enter_scope();
        assert!(table.insert("x", variable(2), false));
        assert_eq!(table.find("x").map(|s| s.id), Some(Id(2)));
        table.leave_scope();

        assert_eq!(table.find("x").map(|s| s.id), Some(Id(1)));
    }

    #[test]
    fn redefinition_in_same_scope_is_rejected() {
        let mut table = SymbolTable::new();
        assert!(table.insert("x", variable(1), true));
        assert!(!table.insert("x", variable(2), true));
        assert_eq!(table.find("x").map(|s| s.id), Some(Id(1)));
    }

    #[test]
    fn namespaces_expose_qualified_names() {
        let mut table = SymbolTable::new();

        table.enter_namespace("A");
        table.enter_namespace("B");
        assert!(table.insert("x", variable(7), true));
        assert_eq!(table.find("x").map(|s| s.id), Some(Id(7)));
        table.leave_namespace();

        assert_eq!(table.current_scope().name, "::A::");
        assert!(table.find("x").is_none());
        assert_eq!(table.find("B::x").map(|s| s.id), Some(Id(7)));
        table.leave_namespace();

        assert_eq!(table.current_scope(), &Scope::root());
        assert_eq!(table.find("A::B::x").map(|s| s.id), Some(Id(7)));
    }

    #[test]
    fn namespace_symbols_survive_function_scopes() {
        let mut table = SymbolTable::new();

        table.enter_namespace("A");
        assert!(table.insert("x", variable(3), true));
        table.leave_namespace();

        table.enter_scope();
        table.leave_scope();

        assert_eq!(table.find("A::x").map(|s| s.id), Some(Id(3)));
    }

    #[test]
    fn exclusive_lookup_ignores_outer_scopes() {
        let mut table = SymbolTable::new();
        assert!(table.insert("x", variable(1), true));

        table.enter_scope();
        let scope = table.current_scope().clone();
        assert!(table.find_in("x", &scope, true).is_none());
        assert!(table.find_in("x", &Scope::root(), true).is_some());
    }

    #[test]
    fn intrinsics_resolve_by_argument_types() {
        let table = SymbolTable::new();
        let functions = IndexVec::new();
        let float3 = Type::vector(BaseKind::Float, 3);

        let callee = table
            .resolve_function_call("normalize", &[float3], &Scope::root(), false, &functions)
            .unwrap();
        let Callee::Intrinsic(intrinsic) = callee else {
            panic!("expected an intrinsic");
        };
        assert_eq!(intrinsic.return_type, float3);

        assert_eq!(
            table.resolve_function_call("nothing", &[], &Scope::root(), false, &functions),
            Err(CallError::Undeclared)
        );
        assert_eq!(
            table.resolve_function_call("normalize", &[], &Scope::root(), false, &functions),
            Err(CallError::NoMatch)
        );
    }
}
