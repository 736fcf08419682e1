// This module holds the two symbol tables the backend reads. SymbolTable is per unit: a tree
// of scopes mirroring the function, block and for-loop nesting of the source, where each scope
// lists its variables with their frame offsets in declaration order. A scope is addressed by
// its path of child indices from the unit root; ScopeCursor produces those paths during a
// traversal, and every pass that walks statements (layout, rewriter, statement compiler) opens
// scopes at exactly the same statements so the paths agree. Declarations is shared by all units
// compiled together: struct layouts, function signatures of every unit and of imported standard
// library modules. Struct field offsets are the sum of the lengths of the preceding fields.

//! Scope tree, struct layouts and function signatures.

pub mod layout;
pub mod library;

use hashbrown::{HashMap, HashSet};

use crate::ast::{ImportTarget, Param, SourcePos, Stmt, StructDef, Type, Unit};
use crate::core::{DiagnosticKind, DiagnosticSink};

pub use layout::{layout_unit, REGISTER_PARAMS};

/// A variable with its frame offset.
///
/// Positive offsets are below the frame base (`[rbp - offset]`), negative
/// offsets address stack arguments in the caller's frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarSymbol {
    pub name: String,
    pub ty: Type,
    pub offset: i64,
    pub size: u32,
}

#[derive(Debug, Clone, Default)]
pub struct Scope {
    pub vars: Vec<VarSymbol>,
    pub children: Vec<Scope>,
}

impl Scope {
    fn total_size(&self) -> i64 {
        let own: i64 = self.vars.iter().map(|var| var.size as i64).sum();
        own + self.children.iter().map(Scope::total_size).sum::<i64>()
    }
}

/// Per-unit scope tree.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    root: Scope,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scope(&self, path: &[usize]) -> Option<&Scope> {
        let mut scope = &self.root;
        for &index in path {
            scope = scope.children.get(index)?;
        }
        Some(scope)
    }

    fn scope_mut(&mut self, path: &[usize]) -> Option<&mut Scope> {
        let mut scope = &mut self.root;
        for &index in path {
            scope = scope.children.get_mut(index)?;
        }
        Some(scope)
    }

    /// Append an empty child scope and return its index.
    pub fn add_scope_at(&mut self, path: &[usize]) -> Option<usize> {
        let scope = self.scope_mut(path)?;
        scope.children.push(Scope::default());
        Some(scope.children.len() - 1)
    }

    pub fn define_variable(&mut self, path: &[usize], var: VarSymbol) -> bool {
        match self.scope_mut(path) {
            Some(scope) => {
                scope.vars.push(var);
                true
            }
            None => false,
        }
    }

    /// Every variable visible at `path`, outermost scope first.
    pub fn variables_in_scope(&self, path: &[usize]) -> Vec<&VarSymbol> {
        let mut visible: Vec<&VarSymbol> = self.root.vars.iter().collect();
        let mut scope = &self.root;
        for &index in path {
            match scope.children.get(index) {
                Some(child) => scope = child,
                None => break,
            }
            visible.extend(scope.vars.iter());
        }
        visible
    }

    /// Resolve a name, innermost scope first.
    pub fn lookup(&self, path: &[usize], name: &str) -> Option<&VarSymbol> {
        self.variables_in_scope(path)
            .into_iter()
            .rev()
            .find(|var| var.name == name)
    }

    /// Summed length of every variable in the scope subtree at `path`.
    pub fn offset_total_for_scope(&self, path: &[usize]) -> i64 {
        self.scope(path).map_or(0, Scope::total_size)
    }
}

/// Scope path of an ongoing traversal.
#[derive(Debug, Clone)]
pub struct ScopeCursor {
    path: Vec<usize>,
    next: Vec<usize>,
}

impl Default for ScopeCursor {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeCursor {
    pub fn new() -> Self {
        Self {
            path: Vec::new(),
            next: vec![0],
        }
    }

    pub fn path(&self) -> &[usize] {
        &self.path
    }

    pub fn depth(&self) -> usize {
        self.path.len()
    }

    /// Descend into the next child scope of the current scope.
    pub fn enter(&mut self) {
        let depth = self.path.len();
        let index = self.next[depth];
        self.next[depth] += 1;
        self.path.push(index);
        self.next.push(0);
    }

    pub fn exit(&mut self) {
        if self.path.pop().is_some() {
            self.next.pop();
        }
    }
}

/// A callable signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSig {
    pub name: String,
    pub params: Vec<Type>,
    pub return_type: Option<Type>,
}

/// Offset and type of a struct field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLayout {
    pub offset: u32,
    pub ty: Type,
}

/// Structs and functions visible to every unit of a compilation.
#[derive(Debug, Clone, Default)]
pub struct Declarations {
    structs: HashMap<String, Vec<Param>>,
    functions: HashMap<String, FunctionSig>,
    libraries: HashSet<String>,
}

impl Declarations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the structs, functions, externs and imports of a unit.
    pub fn collect_unit(&mut self, unit: &Unit, sink: &mut DiagnosticSink) {
        for stmt in &unit.statements {
            match stmt {
                Stmt::Struct(def) => self.define_struct(def, sink),
                Stmt::Function(def) => self.define_function(
                    FunctionSig {
                        name: def.name.clone(),
                        params: def.params.iter().map(|param| param.ty.clone()).collect(),
                        return_type: def.return_type.clone(),
                    },
                    def.pos,
                    sink,
                ),
                Stmt::ExternFunction {
                    name,
                    params,
                    return_type,
                } => self.define_function(
                    FunctionSig {
                        name: name.clone(),
                        params: params.iter().map(|param| param.ty.clone()).collect(),
                        return_type: return_type.clone(),
                    },
                    None,
                    sink,
                ),
                Stmt::Import {
                    target: ImportTarget::Library(name),
                    pos,
                } => self.import_library(name, *pos, sink),
                _ => {}
            }
        }
    }

    pub fn define_struct(&mut self, def: &StructDef, sink: &mut DiagnosticSink) {
        if self.structs.contains_key(&def.name) {
            sink.error(
                def.pos,
                DiagnosticKind::DuplicateStruct {
                    name: def.name.clone(),
                },
            );
            return;
        }
        self.structs.insert(def.name.clone(), def.fields.clone());
    }

    pub fn define_function(
        &mut self,
        sig: FunctionSig,
        pos: Option<SourcePos>,
        sink: &mut DiagnosticSink,
    ) {
        if self.functions.contains_key(&sig.name) {
            sink.error(pos, DiagnosticKind::DuplicateFunction { name: sig.name });
            return;
        }
        self.functions.insert(sig.name.clone(), sig);
    }

    /// Make a standard library module's functions callable. Importing a
    /// module twice is a no-op.
    pub fn import_library(&mut self, name: &str, pos: Option<SourcePos>, sink: &mut DiagnosticSink) {
        if self.libraries.contains(name) {
            return;
        }
        match library::library_functions(name) {
            Some(functions) => {
                self.libraries.insert(name.to_string());
                for sig in functions {
                    self.define_function(sig, pos, sink);
                }
            }
            None => sink.error(
                pos,
                DiagnosticKind::UnknownLibrary {
                    name: name.to_string(),
                },
            ),
        }
    }

    pub fn function(&self, name: &str) -> Option<&FunctionSig> {
        self.functions.get(name)
    }

    pub fn struct_fields(&self, name: &str) -> Option<&[Param]> {
        self.structs.get(name).map(Vec::as_slice)
    }

    /// Byte length of a type. Unknown structs have length 0.
    pub fn size_of(&self, ty: &Type) -> u32 {
        match ty {
            Type::Array(element, count) => self.size_of(element) * count,
            Type::Struct(name) => self
                .struct_fields(name)
                .map_or(0, |fields| fields.iter().map(|field| self.size_of(&field.ty)).sum()),
            Type::None => 0,
            scalar => scalar.scalar_width().map_or(0, u32::from),
        }
    }

    /// Locate a field: its offset is the summed length of the fields before it.
    pub fn field(&self, struct_name: &str, field: &str) -> Option<FieldLayout> {
        let fields = self.struct_fields(struct_name)?;
        let mut offset = 0;
        for candidate in fields {
            if candidate.name == field {
                return Some(FieldLayout {
                    offset,
                    ty: candidate.ty.clone(),
                });
            }
            offset += self.size_of(&candidate.ty);
        }
        None
    }
}
