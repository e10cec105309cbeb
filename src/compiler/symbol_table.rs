use std::{cell::RefCell, collections::HashMap, rc::Rc};

use crate::object::builtins::BuiltIn;

#[derive(PartialEq, Clone, Debug)]
pub enum SymbolScope {
    Global,
    Local,
    Free,
    BuiltIn,
    /// The name a function was bound to, resolvable inside its own body
    /// without being captured as a free variable.
    Function,
}

#[derive(PartialEq, Clone, Debug)]
pub struct Symbol {
    pub name: String,
    pub scope: SymbolScope,
    pub index: usize,
}

/// SymbolTable is a https://en.wikipedia.org/wiki/Symbol_table
///
/// Tables nest, one per compilation scope. Resolving a name defined as a
/// local of an enclosing function interns it here as a free variable; the
/// order of `free_symbols` fixes the indices the compiler emits for
/// `OpGetFree` and for the closure's captured values.
#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
    store: HashMap<String, Symbol>,
    outer: Option<Rc<RefCell<SymbolTable>>>,
    pub free_symbols: Vec<Symbol>,
    num_definitions: usize,
}

impl SymbolTable {
    pub fn new() -> Self {
        Default::default()
    }

    /// A top-level table with every built-in function pre-registered, in VM
    /// lookup order.
    pub fn new_with_builtins() -> Self {
        let mut res = Self::new();

        for (index, builtin) in BuiltIn::iterator().enumerate() {
            res.define_builtin(index, builtin.name());
        }

        res
    }

    pub fn new_enclosed(outer: SymbolTable) -> Self {
        let mut res = Self::new();

        res.outer = Some(Rc::new(RefCell::new(outer)));

        res
    }

    /// Dissolves this table and hands back the enclosing one, if any.
    pub fn pop(mut self) -> Option<SymbolTable> {
        self.outer.take().map(|outer| match Rc::try_unwrap(outer) {
            Ok(cell) => cell.into_inner(),
            Err(shared) => shared.borrow().clone(),
        })
    }

    pub fn num_definitions(&self) -> usize {
        self.num_definitions
    }

    pub fn define(&mut self, name: &str) -> Symbol {
        let s = Symbol {
            name: name.to_owned(),
            scope: match self.outer {
                Some(_) => SymbolScope::Local,
                None => SymbolScope::Global,
            },
            index: self.num_definitions,
        };

        self.store.insert(name.to_string(), s.clone());
        self.num_definitions += 1;

        s
    }

    /// Built-ins get fixed indices handed in by the caller and never consume
    /// a local or global slot.
    pub fn define_builtin(&mut self, index: usize, name: &str) -> Symbol {
        let s = Symbol {
            name: name.to_owned(),
            scope: SymbolScope::BuiltIn,
            index,
        };

        self.store.insert(name.to_string(), s.clone());

        s
    }

    /// Registers the name of the function currently being compiled so that
    /// its body can refer to itself. Does not consume a slot; loads of this
    /// symbol compile to `OpCurrentClosure`.
    pub fn define_function_name(&mut self, name: &str) -> Symbol {
        let s = Symbol {
            name: name.to_owned(),
            scope: SymbolScope::Function,
            index: 0,
        };

        self.store.insert(name.to_string(), s.clone());

        s
    }

    pub fn resolve(&mut self, name: &str) -> Option<Symbol> {
        if let Some(symbol) = self.store.get(name) {
            return Some(symbol.clone());
        }

        let outer = self.outer.clone()?;
        let resolved = outer.borrow_mut().resolve(name)?;

        match resolved.scope {
            SymbolScope::Global | SymbolScope::BuiltIn | SymbolScope::Function => Some(resolved),
            // A local of some enclosing function: capture it.
            SymbolScope::Local | SymbolScope::Free => Some(self.define_free(resolved)),
        }
    }

    fn define_free(&mut self, original: Symbol) -> Symbol {
        self.free_symbols.push(original.clone());

        let symbol = Symbol {
            name: original.name,
            scope: SymbolScope::Free,
            index: self.free_symbols.len() - 1,
        };

        self.store.insert(symbol.name.clone(), symbol.clone());

        symbol
    }
}

#[cfg(test)]
mod tests {

    use super::{Symbol, SymbolScope, SymbolTable};

    fn global_symbol(name: &str, index: usize) -> Symbol {
        Symbol {
            name: name.to_owned(),
            scope: SymbolScope::Global,
            index,
        }
    }

    fn local_symbol(name: &str, index: usize) -> Symbol {
        Symbol {
            name: name.to_owned(),
            scope: SymbolScope::Local,
            index,
        }
    }

    fn free_symbol(name: &str, index: usize) -> Symbol {
        Symbol {
            name: name.to_owned(),
            scope: SymbolScope::Free,
            index,
        }
    }

    fn assert_symbol_is_resolvable(symbol_table: &mut SymbolTable, expected: Symbol) {
        match symbol_table.resolve(&expected.name) {
            Some(actual) => assert_eq!(expected, actual),
            None => panic!("name {} is not resolvable", expected.name),
        }
    }

    #[test]
    fn define() {
        let mut global = SymbolTable::new();

        assert_eq!(global_symbol("a", 0), global.define("a"));
        assert_eq!(global_symbol("b", 1), global.define("b"));

        let mut first_local = SymbolTable::new_enclosed(global);

        assert_eq!(local_symbol("c", 0), first_local.define("c"));
        assert_eq!(local_symbol("d", 1), first_local.define("d"));

        let mut second_local = SymbolTable::new_enclosed(first_local);

        assert_eq!(local_symbol("e", 0), second_local.define("e"));
        assert_eq!(local_symbol("f", 1), second_local.define("f"));
    }

    #[test]
    fn resolve() {
        let mut global = SymbolTable::new();
        global.define("a");
        global.define("b");

        for expected in vec![global_symbol("a", 0), global_symbol("b", 1)] {
            assert_symbol_is_resolvable(&mut global, expected);
        }
    }

    #[test]
    fn resolve_local() {
        let mut global = SymbolTable::new();
        global.define("a");
        global.define("b");

        let mut local = SymbolTable::new_enclosed(global);
        local.define("c");
        local.define("d");

        for expected in vec![
            global_symbol("a", 0),
            global_symbol("b", 1),
            local_symbol("c", 0),
            local_symbol("d", 1),
        ] {
            assert_symbol_is_resolvable(&mut local, expected);
        }
    }

    #[test]
    fn resolve_nested_local() {
        let mut global = SymbolTable::new();
        global.define("a");
        global.define("b");

        let mut first_local = SymbolTable::new_enclosed(global);
        first_local.define("c");
        first_local.define("d");

        for expected in vec![
            global_symbol("a", 0),
            global_symbol("b", 1),
            local_symbol("c", 0),
            local_symbol("d", 1),
        ] {
            assert_symbol_is_resolvable(&mut first_local, expected);
        }

        let mut second_local = SymbolTable::new_enclosed(first_local);
        second_local.define("e");
        second_local.define("f");

        // c and d live in the enclosing function, so they surface here as
        // free variables.
        for expected in vec![
            global_symbol("a", 0),
            global_symbol("b", 1),
            free_symbol("c", 0),
            free_symbol("d", 1),
            local_symbol("e", 0),
            local_symbol("f", 1),
        ] {
            assert_symbol_is_resolvable(&mut second_local, expected);
        }
    }

    #[test]
    fn resolve_builtins() {
        let mut global = SymbolTable::new();
        global.define_builtin(0, "len");
        global.define_builtin(1, "puts");

        let expected = vec![
            Symbol {
                name: "len".to_owned(),
                scope: SymbolScope::BuiltIn,
                index: 0,
            },
            Symbol {
                name: "puts".to_owned(),
                scope: SymbolScope::BuiltIn,
                index: 1,
            },
        ];

        for symbol in expected.clone() {
            assert_symbol_is_resolvable(&mut global, symbol);
        }

        // Built-ins resolve as built-ins from any depth, never as free
        // variables.
        let first_local = SymbolTable::new_enclosed(global);
        let mut second_local = SymbolTable::new_enclosed(first_local);

        for symbol in expected {
            assert_symbol_is_resolvable(&mut second_local, symbol);
        }
        assert!(second_local.free_symbols.is_empty());
    }

    #[test]
    fn resolve_free() {
        let mut global = SymbolTable::new();
        global.define("a");
        global.define("b");

        let mut first_local = SymbolTable::new_enclosed(global);
        first_local.define("c");
        first_local.define("d");

        let mut second_local = SymbolTable::new_enclosed(first_local);
        second_local.define("e");
        second_local.define("f");

        for expected in vec![
            global_symbol("a", 0),
            global_symbol("b", 1),
            free_symbol("c", 0),
            free_symbol("d", 1),
            local_symbol("e", 0),
            local_symbol("f", 1),
        ] {
            assert_symbol_is_resolvable(&mut second_local, expected);
        }

        // The originals are recorded in capture order, with their original
        // scopes intact.
        assert_eq!(
            vec![local_symbol("c", 0), local_symbol("d", 1)],
            second_local.free_symbols
        );
    }

    #[test]
    fn unresolvable_names_stay_unresolved() {
        let mut global = SymbolTable::new();
        global.define("a");

        let mut first_local = SymbolTable::new_enclosed(global);
        first_local.define("c");

        let mut second_local = SymbolTable::new_enclosed(first_local);
        second_local.define("e");
        second_local.define("f");

        for expected in vec![
            global_symbol("a", 0),
            free_symbol("c", 0),
            local_symbol("e", 0),
            local_symbol("f", 1),
        ] {
            assert_symbol_is_resolvable(&mut second_local, expected);
        }

        for unresolvable in ["b", "d"] {
            assert_eq!(None, second_local.resolve(unresolvable));
        }
    }

    #[test]
    fn define_and_resolve_function_name() {
        let mut global = SymbolTable::new();
        global.define_function_name("a");

        assert_symbol_is_resolvable(
            &mut global,
            Symbol {
                name: "a".to_owned(),
                scope: SymbolScope::Function,
                index: 0,
            },
        );
    }

    #[test]
    fn shadowing_function_name() {
        let mut global = SymbolTable::new();
        global.define_function_name("a");
        global.define("a");

        assert_symbol_is_resolvable(&mut global, global_symbol("a", 0));
    }

    #[test]
    fn pop_returns_the_enclosing_table() {
        let mut global = SymbolTable::new();
        global.define("a");

        let mut local = SymbolTable::new_enclosed(global);
        local.define("c");

        let mut global = local.pop().expect("expected an enclosing table");
        assert_symbol_is_resolvable(&mut global, global_symbol("a", 0));
        assert_eq!(None, global.resolve("c"));
        assert!(global.pop().is_none());
    }
}
