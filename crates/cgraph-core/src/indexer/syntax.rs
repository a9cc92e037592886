//! Compact syntax model lowered from the concrete tree.
//!
//! Only what resolution needs survives lowering: declarations with their
//! members, and statement/expression shapes that carry values or calls.
//! Type names are kept as written; binding happens later.

use std::path::PathBuf;

use crate::models::DeclarationKind;

/// A type as written in source (`Map<K, List<V>>[]`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeRef {
    /// Dotted name as written, or a primitive keyword. `var` marks an
    /// inferred local type.
    pub name: String,
    pub args: Vec<TypeRef>,
    pub dims: usize,
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        TypeRef {
            name: name.into(),
            args: Vec::new(),
            dims: 0,
        }
    }

    pub fn is_inferred(&self) -> bool {
        self.name == "var" && self.dims == 0 && self.args.is_empty()
    }

    pub fn with_extra_dims(mut self, dims: usize) -> Self {
        self.dims += dims;
        self
    }
}

#[derive(Clone, Debug, Default)]
pub struct Modifiers {
    pub is_static: bool,
    pub is_abstract: bool,
    pub is_private: bool,
    pub is_default: bool,
    pub is_public: bool,
}

#[derive(Clone, Debug)]
pub struct Import {
    pub path: String,
    pub is_static: bool,
    pub is_wildcard: bool,
}

/// One source file after lowering.
#[derive(Clone, Debug)]
pub struct CompilationUnit {
    pub path: PathBuf,
    pub package: Option<String>,
    pub imports: Vec<Import>,
    /// Every declared type, nested, local and anonymous ones included.
    pub types: Vec<TypeDecl>,
    /// Set when the parser reported syntax errors anywhere in the file.
    pub has_errors: bool,
}

#[derive(Clone, Debug)]
pub struct TypeParamDecl {
    pub name: String,
    pub bound: Option<TypeRef>,
}

#[derive(Clone, Debug)]
pub struct TypeDecl {
    /// Binary name: `pkg.Outer$Inner`, `pkg.Outer$1` for anonymous classes.
    pub name: String,
    pub simple_name: String,
    pub kind: DeclarationKind,
    pub modifiers: Modifiers,
    pub type_params: Vec<TypeParamDecl>,
    pub superclass: Option<TypeRef>,
    pub interfaces: Vec<TypeRef>,
    pub fields: Vec<FieldDecl>,
    pub methods: Vec<MethodDecl>,
    pub initializers: Vec<Initializer>,
    /// Lexically enclosing type, by binary name.
    pub enclosing: Option<String>,
    pub line: usize,
}

#[derive(Clone, Debug)]
pub struct FieldDecl {
    pub name: String,
    pub ty: TypeRef,
    pub is_static: bool,
    pub init: Option<Expr>,
    pub line: usize,
}

#[derive(Clone, Debug)]
pub struct Param {
    pub name: String,
    pub ty: TypeRef,
    pub is_varargs: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MethodDeclKind {
    Method,
    Constructor,
}

#[derive(Clone, Debug)]
pub struct MethodDecl {
    pub name: String,
    pub kind: MethodDeclKind,
    pub modifiers: Modifiers,
    pub type_params: Vec<TypeParamDecl>,
    pub params: Vec<Param>,
    /// `None` for constructors.
    pub ret: Option<TypeRef>,
    /// `None` for abstract and native declarations.
    pub body: Option<Vec<Stmt>>,
    pub line: usize,
}

impl MethodDecl {
    pub fn is_varargs(&self) -> bool {
        self.params.last().is_some_and(|p| p.is_varargs)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CtorTarget {
    This,
    Super,
}

#[derive(Clone, Debug)]
pub struct CtorCall {
    pub target: CtorTarget,
    pub args: Vec<Expr>,
    pub line: usize,
}

#[derive(Clone, Debug)]
pub struct Initializer {
    pub is_static: bool,
    pub body: Vec<Stmt>,
}

/// Statements are flattened: control flow is irrelevant to a
/// flow-insensitive analysis, so loops and branches contribute their
/// contents directly.
#[derive(Clone, Debug)]
pub enum Stmt {
    Local {
        name: String,
        ty: TypeRef,
        init: Option<Expr>,
    },
    /// `for (T name : iterable)`.
    ForEach {
        name: String,
        ty: TypeRef,
        iterable: Expr,
    },
    Expr(Expr),
    Return(Option<Expr>),
    CtorCall(CtorCall),
}

#[derive(Clone, Debug)]
pub enum Receiver {
    /// `foo()`: enclosing instance or static context.
    Implicit,
    /// `super.foo()`.
    Super,
    /// `Iface.super.foo()`.
    QualifiedSuper(TypeRef),
    Expr(Box<Expr>),
}

#[derive(Clone, Debug)]
pub enum Expr {
    New {
        ty: TypeRef,
        args: Vec<Expr>,
        /// Binary name of the anonymous class body, if any.
        body_type: Option<String>,
        line: usize,
    },
    Call {
        receiver: Receiver,
        name: String,
        args: Vec<Expr>,
        line: usize,
    },
    FieldAccess {
        receiver: Box<Expr>,
        name: String,
    },
    /// A bare or dotted identifier; binding decides whether it names a
    /// local, a field, a type, or a package.
    Name(String),
    This(Option<TypeRef>),
    /// `super` used as a field-access qualifier.
    Super,
    Literal(Literal),
    Binary {
        op: String,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    InstanceOf {
        value: Box<Expr>,
        ty: TypeRef,
        /// Pattern variable, `x instanceof Foo f`.
        binding: Option<String>,
    },
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Cast {
        ty: TypeRef,
        value: Box<Expr>,
    },
    Conditional {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    ArrayAccess {
        array: Box<Expr>,
        index: Box<Expr>,
    },
    ArrayNew {
        ty: TypeRef,
        elements: Vec<Expr>,
    },
    Lambda {
        /// Inferred parameter types are written as `var`.
        params: Vec<Param>,
        body: Vec<Stmt>,
    },
    /// Switch statement or expression. `values` holds arrow-arm results and
    /// `yield` operands.
    Switch {
        selector: Box<Expr>,
        body: Vec<Stmt>,
        values: Vec<Expr>,
    },
    MethodRef {
        receiver: Box<Expr>,
        name: String,
    },
    /// Anything else; sub-expressions are kept so nested calls still count.
    Other(Vec<Expr>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Literal {
    String,
    Int,
    Long,
    Float,
    Double,
    Char,
    Boolean,
    Null,
    Class,
}
