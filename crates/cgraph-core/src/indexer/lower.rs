//! Lowering from the tree-sitter concrete tree to the syntax model.

use std::collections::HashMap;
use std::path::Path;

use tree_sitter::{Node, Tree};

use crate::indexer::syntax::{
    CompilationUnit, CtorCall, CtorTarget, Expr, FieldDecl, Import, Initializer, Literal,
    MethodDecl, MethodDeclKind, Modifiers, Param, Receiver, Stmt, TypeDecl, TypeParamDecl,
    TypeRef,
};
use crate::models::{DeclarationKind, ENUM, OBJECT, RECORD};

const TYPE_DECLARATIONS: &[&str] = &[
    "class_declaration",
    "interface_declaration",
    "enum_declaration",
    "record_declaration",
    "annotation_type_declaration",
];

const EXPRESSIONS: &[&str] = &[
    "assignment_expression",
    "binary_expression",
    "instanceof_expression",
    "lambda_expression",
    "ternary_expression",
    "update_expression",
    "unary_expression",
    "cast_expression",
    "switch_expression",
    "parenthesized_expression",
    "object_creation_expression",
    "field_access",
    "array_access",
    "method_invocation",
    "method_reference",
    "array_creation_expression",
    "array_initializer",
    "class_literal",
    "this",
    "super",
    "identifier",
    "string_literal",
    "text_block",
    "character_literal",
    "decimal_integer_literal",
    "hex_integer_literal",
    "octal_integer_literal",
    "binary_integer_literal",
    "decimal_floating_point_literal",
    "hex_floating_point_literal",
    "true",
    "false",
    "null_literal",
    "template_expression",
];

fn is_expression(kind: &str) -> bool {
    EXPRESSIONS.contains(&kind)
}

fn is_type_declaration(kind: &str) -> bool {
    TYPE_DECLARATIONS.contains(&kind)
}

fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

fn all_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).collect()
}

fn field_children<'t>(node: Node<'t>, field: &str) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.children_by_field_name(field, &mut cursor).collect()
}

fn line_of(node: Node<'_>) -> usize {
    node.start_position().row + 1
}

/// Dotted name with generic arguments and whitespace removed.
fn clean_name(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut depth = 0usize;
    for c in text.chars() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            c if depth == 0 && !c.is_whitespace() => out.push(c),
            _ => {}
        }
    }
    out
}

fn count_dims(text: &str) -> usize {
    text.matches('[').count()
}

/// Lower a parsed file into a [`CompilationUnit`].
pub fn lower_unit(path: &Path, source: &str, tree: &Tree) -> CompilationUnit {
    let root = tree.root_node();
    let mut lowerer = Lowerer {
        source: source.as_bytes(),
        path,
        package: None,
        types: Vec::new(),
        owners: Vec::new(),
        anonymous: HashMap::new(),
        yields: Vec::new(),
    };
    let mut imports = Vec::new();
    for child in named_children(root) {
        match child.kind() {
            "package_declaration" => lowerer.package = lowerer.package_name(child),
            "import_declaration" => imports.push(lowerer.import(child)),
            kind if is_type_declaration(kind) => lowerer.type_decl(child, None),
            _ => {}
        }
    }
    CompilationUnit {
        path: path.to_path_buf(),
        package: lowerer.package,
        imports,
        types: lowerer.types,
        has_errors: root.has_error(),
    }
}

struct Lowerer<'s> {
    source: &'s [u8],
    path: &'s Path,
    package: Option<String>,
    types: Vec<TypeDecl>,
    /// Binary names of the types whose bodies are being lowered.
    owners: Vec<String>,
    anonymous: HashMap<String, usize>,
    /// Result expressions collected for each enclosing switch expression.
    yields: Vec<Vec<Expr>>,
}

impl<'s> Lowerer<'s> {
    fn text(&self, node: Node<'_>) -> &'s str {
        node.utf8_text(self.source).unwrap_or_default()
    }

    fn package_name(&self, node: Node<'_>) -> Option<String> {
        named_children(node)
            .into_iter()
            .find(|c| matches!(c.kind(), "identifier" | "scoped_identifier"))
            .map(|c| clean_name(self.text(c)))
    }

    fn import(&self, node: Node<'_>) -> Import {
        let children = all_children(node);
        let path = children
            .iter()
            .find(|c| matches!(c.kind(), "identifier" | "scoped_identifier"))
            .map(|c| clean_name(self.text(*c)))
            .unwrap_or_default();
        Import {
            path,
            is_static: children.iter().any(|c| c.kind() == "static"),
            is_wildcard: children.iter().any(|c| c.kind() == "asterisk"),
        }
    }

    fn modifiers(&self, node: Node<'_>) -> Modifiers {
        let mut modifiers = Modifiers::default();
        let Some(list) = named_children(node).into_iter().find(|c| c.kind() == "modifiers") else {
            return modifiers;
        };
        for token in all_children(list) {
            match token.kind() {
                "static" => modifiers.is_static = true,
                "abstract" => modifiers.is_abstract = true,
                "private" => modifiers.is_private = true,
                "default" => modifiers.is_default = true,
                "public" => modifiers.is_public = true,
                _ => {}
            }
        }
        modifiers
    }

    // -----------------------------------------------------------------------
    // Types as written
    // -----------------------------------------------------------------------

    fn type_ref(&self, node: Node<'_>) -> TypeRef {
        match node.kind() {
            "array_type" => {
                let dims = node
                    .child_by_field_name("dimensions")
                    .map(|d| count_dims(self.text(d)))
                    .unwrap_or(1);
                match node.child_by_field_name("element") {
                    Some(element) => self.type_ref(element).with_extra_dims(dims),
                    None => TypeRef::named(OBJECT).with_extra_dims(dims),
                }
            }
            "generic_type" => {
                let mut name = String::new();
                let mut args = Vec::new();
                for child in named_children(node) {
                    if child.kind() == "type_arguments" {
                        args = named_children(child)
                            .into_iter()
                            .filter(|a| !a.kind().ends_with("annotation"))
                            .map(|a| self.type_ref(a))
                            .collect();
                    } else if name.is_empty() {
                        name = clean_name(self.text(child));
                    }
                }
                TypeRef {
                    name,
                    args,
                    dims: 0,
                }
            }
            "annotated_type" => named_children(node)
                .into_iter()
                .rfind(|c| !c.kind().ends_with("annotation"))
                .map(|c| self.type_ref(c))
                .unwrap_or_else(|| TypeRef::named(OBJECT)),
            "wildcard" => {
                let is_super = all_children(node).iter().any(|c| c.kind() == "super");
                let bound = named_children(node)
                    .into_iter()
                    .rfind(|c| !c.kind().ends_with("annotation"));
                match bound {
                    Some(b) if !is_super => self.type_ref(b),
                    _ => TypeRef::named(OBJECT),
                }
            }
            _ => TypeRef::named(clean_name(self.text(node))),
        }
    }

    fn type_params(&self, node: Node<'_>) -> Vec<TypeParamDecl> {
        let Some(list) = node.child_by_field_name("type_parameters") else {
            return Vec::new();
        };
        named_children(list)
            .into_iter()
            .filter(|p| p.kind() == "type_parameter")
            .map(|p| {
                let children = named_children(p);
                let name = children
                    .iter()
                    .find(|c| matches!(c.kind(), "type_identifier" | "identifier"))
                    .map(|c| self.text(*c).to_string())
                    .unwrap_or_default();
                let bound = children
                    .iter()
                    .find(|c| c.kind() == "type_bound")
                    .and_then(|b| named_children(*b).into_iter().next())
                    .map(|b| self.type_ref(b));
                TypeParamDecl { name, bound }
            })
            .collect()
    }

    fn params(&self, node: Option<Node<'_>>) -> Vec<Param> {
        let Some(list) = node else {
            return Vec::new();
        };
        let mut params = Vec::new();
        for p in named_children(list) {
            match p.kind() {
                "formal_parameter" => {
                    let extra = p
                        .child_by_field_name("dimensions")
                        .map(|d| count_dims(self.text(d)))
                        .unwrap_or(0);
                    let ty = p
                        .child_by_field_name("type")
                        .map(|t| self.type_ref(t))
                        .unwrap_or_else(|| TypeRef::named("var"));
                    params.push(Param {
                        name: p
                            .child_by_field_name("name")
                            .map(|n| self.text(n).to_string())
                            .unwrap_or_default(),
                        ty: ty.with_extra_dims(extra),
                        is_varargs: false,
                    });
                }
                "spread_parameter" => {
                    let children = named_children(p);
                    let ty = children
                        .iter()
                        .find(|c| !matches!(c.kind(), "modifiers" | "variable_declarator" | "identifier"))
                        .map(|t| self.type_ref(*t))
                        .unwrap_or_else(|| TypeRef::named(OBJECT));
                    let name = children
                        .iter()
                        .find(|c| c.kind() == "variable_declarator")
                        .and_then(|d| d.child_by_field_name("name"))
                        .or_else(|| children.iter().rfind(|c| c.kind() == "identifier").copied())
                        .map(|n| self.text(n).to_string())
                        .unwrap_or_default();
                    params.push(Param {
                        name,
                        ty: ty.with_extra_dims(1),
                        is_varargs: true,
                    });
                }
                "identifier" => params.push(Param {
                    name: self.text(p).to_string(),
                    ty: TypeRef::named("var"),
                    is_varargs: false,
                }),
                _ => {}
            }
        }
        params
    }

    // -----------------------------------------------------------------------
    // Declarations
    // -----------------------------------------------------------------------

    fn binary_name(&self, simple: &str, enclosing: Option<&str>) -> String {
        match (enclosing, &self.package) {
            (Some(outer), _) => format!("{outer}${simple}"),
            (None, Some(package)) => format!("{package}.{simple}"),
            (None, None) => simple.to_string(),
        }
    }

    fn type_decl(&mut self, node: Node<'_>, enclosing: Option<&str>) {
        let simple = node
            .child_by_field_name("name")
            .map(|n| self.text(n).to_string())
            .unwrap_or_default();
        let name = self.binary_name(&simple, enclosing);
        let modifiers = self.modifiers(node);
        let kind = match node.kind() {
            "interface_declaration" | "annotation_type_declaration" => DeclarationKind::Interface,
            "enum_declaration" => DeclarationKind::Enum,
            _ => DeclarationKind::Class,
        };

        let mut superclass = node
            .child_by_field_name("superclass")
            .and_then(|s| named_children(s).into_iter().next())
            .map(|t| self.type_ref(t));
        let mut interfaces = Vec::new();
        for child in named_children(node) {
            if matches!(child.kind(), "super_interfaces" | "extends_interfaces") {
                for list in named_children(child) {
                    if list.kind() == "type_list" {
                        interfaces.extend(named_children(list).into_iter().map(|t| self.type_ref(t)));
                    }
                }
            }
        }
        match node.kind() {
            "enum_declaration" => {
                superclass = Some(TypeRef {
                    name: ENUM.to_string(),
                    args: vec![TypeRef::named(simple.clone())],
                    dims: 0,
                })
            }
            "record_declaration" => superclass = Some(TypeRef::named(RECORD)),
            _ => {}
        }

        let mut decl = TypeDecl {
            name: name.clone(),
            simple_name: simple,
            kind,
            modifiers,
            type_params: self.type_params(node),
            superclass,
            interfaces,
            fields: Vec::new(),
            methods: Vec::new(),
            initializers: Vec::new(),
            enclosing: enclosing.map(str::to_string),
            line: line_of(node),
        };
        decl.modifiers.is_abstract |= kind == DeclarationKind::Interface;

        self.owners.push(name);
        if node.kind() == "record_declaration" {
            let components = self.params(node.child_by_field_name("parameters"));
            self.record_components(&mut decl, components, node.child_by_field_name("body"));
        } else if let Some(body) = node.child_by_field_name("body") {
            self.members(body, &mut decl);
        }
        self.owners.pop();
        self.types.push(decl);
    }

    fn members(&mut self, body: Node<'_>, decl: &mut TypeDecl) {
        let is_interface = decl.kind == DeclarationKind::Interface;
        for member in named_children(body) {
            match member.kind() {
                "field_declaration" | "constant_declaration" => {
                    let modifiers = self.modifiers(member);
                    let ty = member
                        .child_by_field_name("type")
                        .map(|t| self.type_ref(t))
                        .unwrap_or_else(|| TypeRef::named(OBJECT));
                    for declarator in field_children(member, "declarator") {
                        let extra = declarator
                            .child_by_field_name("dimensions")
                            .map(|d| count_dims(self.text(d)))
                            .unwrap_or(0);
                        decl.fields.push(FieldDecl {
                            name: declarator
                                .child_by_field_name("name")
                                .map(|n| self.text(n).to_string())
                                .unwrap_or_default(),
                            ty: ty.clone().with_extra_dims(extra),
                            is_static: modifiers.is_static || is_interface,
                            init: declarator.child_by_field_name("value").map(|v| self.expr(v)),
                            line: line_of(declarator),
                        });
                    }
                }
                "method_declaration" => {
                    let method = self.method(member, is_interface);
                    decl.methods.push(method);
                }
                "constructor_declaration" => {
                    let method = self.constructor(member, &decl.simple_name);
                    decl.methods.push(method);
                }
                "block" => {
                    let body = self.block(member);
                    decl.initializers.push(Initializer {
                        is_static: false,
                        body,
                    });
                }
                "static_initializer" => {
                    let body = named_children(member)
                        .into_iter()
                        .find(|c| c.kind() == "block")
                        .map(|b| self.block(b))
                        .unwrap_or_default();
                    decl.initializers.push(Initializer {
                        is_static: true,
                        body,
                    });
                }
                "enum_constant" => self.enum_constant(member, decl),
                "enum_body_declarations" => self.members(member, decl),
                kind if is_type_declaration(kind) => {
                    let owner = decl.name.clone();
                    self.type_decl(member, Some(&owner));
                }
                _ => {}
            }
        }
    }

    fn enum_constant(&mut self, node: Node<'_>, decl: &mut TypeDecl) {
        let name = node
            .child_by_field_name("name")
            .map(|n| self.text(n).to_string())
            .unwrap_or_default();
        if node.child_by_field_name("body").is_some() {
            tracing::debug!(
                file = %self.path.display(),
                constant = %name,
                "skipping enum constant body"
            );
        }
        let args = self.arguments(node.child_by_field_name("arguments"));
        decl.fields.push(FieldDecl {
            name,
            ty: TypeRef::named(decl.simple_name.clone()),
            is_static: true,
            init: Some(Expr::New {
                ty: TypeRef::named(decl.simple_name.clone()),
                args,
                body_type: None,
                line: line_of(node),
            }),
            line: line_of(node),
        });
    }

    /// Records get private fields, accessors, and a canonical constructor
    /// unless the body declares them.
    fn record_components(&mut self, decl: &mut TypeDecl, components: Vec<Param>, body: Option<Node<'_>>) {
        let mut compact_body = Vec::new();
        if let Some(body) = body {
            for member in named_children(body) {
                if member.kind() == "compact_constructor_declaration" {
                    if let Some(b) = member.child_by_field_name("body") {
                        compact_body = self.block(b);
                    }
                }
            }
            self.members(body, decl);
        }
        for component in &components {
            decl.fields.push(FieldDecl {
                name: component.name.clone(),
                ty: component.ty.clone(),
                is_static: false,
                init: None,
                line: decl.line,
            });
            let declared = decl
                .methods
                .iter()
                .any(|m| m.name == component.name && m.params.is_empty());
            if !declared {
                decl.methods.push(MethodDecl {
                    name: component.name.clone(),
                    kind: MethodDeclKind::Method,
                    modifiers: Modifiers {
                        is_public: true,
                        ..Modifiers::default()
                    },
                    type_params: Vec::new(),
                    params: Vec::new(),
                    ret: Some(component.ty.clone()),
                    body: Some(vec![Stmt::Return(Some(Expr::FieldAccess {
                        receiver: Box::new(Expr::This(None)),
                        name: component.name.clone(),
                    }))]),
                    line: decl.line,
                });
            }
        }
        let has_canonical = decl.methods.iter().any(|m| {
            m.kind == MethodDeclKind::Constructor
                && m.params.len() == components.len()
                && m.params.iter().zip(&components).all(|(a, b)| a.ty == b.ty)
        });
        if !has_canonical {
            let mut body = compact_body;
            body.extend(components.iter().map(|c| {
                Stmt::Expr(Expr::Assign {
                    target: Box::new(Expr::FieldAccess {
                        receiver: Box::new(Expr::This(None)),
                        name: c.name.clone(),
                    }),
                    value: Box::new(Expr::Name(c.name.clone())),
                })
            }));
            decl.methods.push(MethodDecl {
                name: decl.simple_name.clone(),
                kind: MethodDeclKind::Constructor,
                modifiers: Modifiers {
                    is_public: true,
                    ..Modifiers::default()
                },
                type_params: Vec::new(),
                params: components,
                ret: None,
                body: Some(body),
                line: decl.line,
            });
        }
    }

    fn method(&mut self, node: Node<'_>, in_interface: bool) -> MethodDecl {
        let mut modifiers = self.modifiers(node);
        let body = node.child_by_field_name("body").map(|b| self.block(b));
        if in_interface && body.is_none() && !modifiers.is_static {
            modifiers.is_abstract = true;
        }
        let extra = node
            .child_by_field_name("dimensions")
            .map(|d| count_dims(self.text(d)))
            .unwrap_or(0);
        MethodDecl {
            name: node
                .child_by_field_name("name")
                .map(|n| self.text(n).to_string())
                .unwrap_or_default(),
            kind: MethodDeclKind::Method,
            modifiers,
            type_params: self.type_params(node),
            params: self.params(node.child_by_field_name("parameters")),
            ret: node
                .child_by_field_name("type")
                .map(|t| self.type_ref(t).with_extra_dims(extra)),
            body,
            line: line_of(node),
        }
    }

    fn constructor(&mut self, node: Node<'_>, simple_name: &str) -> MethodDecl {
        MethodDecl {
            name: simple_name.to_string(),
            kind: MethodDeclKind::Constructor,
            modifiers: self.modifiers(node),
            type_params: self.type_params(node),
            params: self.params(node.child_by_field_name("parameters")),
            ret: None,
            body: Some(
                node.child_by_field_name("body")
                    .map(|b| self.block(b))
                    .unwrap_or_default(),
            ),
            line: line_of(node),
        }
    }

    fn anonymous_class(&mut self, super_ty: &TypeRef, body: Node<'_>) -> String {
        let owner = self.owners.last().cloned().unwrap_or_default();
        let counter = self.anonymous.entry(owner.clone()).or_insert(0);
        *counter += 1;
        let index = counter.to_string();
        let name = format!("{owner}${index}");
        let mut decl = TypeDecl {
            name: name.clone(),
            simple_name: index,
            kind: DeclarationKind::Anonymous,
            modifiers: Modifiers::default(),
            type_params: Vec::new(),
            superclass: Some(super_ty.clone()),
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            initializers: Vec::new(),
            enclosing: Some(owner),
            line: line_of(body),
        };
        self.owners.push(name.clone());
        self.members(body, &mut decl);
        self.owners.pop();
        self.types.push(decl);
        name
    }

    // -----------------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------------

    fn block(&mut self, node: Node<'_>) -> Vec<Stmt> {
        let mut out = Vec::new();
        if is_expression(node.kind()) {
            out.push(Stmt::Expr(self.expr(node)));
        } else {
            for child in named_children(node) {
                self.stmt(child, &mut out);
            }
        }
        out
    }

    fn stmt(&mut self, node: Node<'_>, out: &mut Vec<Stmt>) {
        match node.kind() {
            "local_variable_declaration" => {
                let ty = node
                    .child_by_field_name("type")
                    .map(|t| self.type_ref(t))
                    .unwrap_or_else(|| TypeRef::named("var"));
                for declarator in field_children(node, "declarator") {
                    let extra = declarator
                        .child_by_field_name("dimensions")
                        .map(|d| count_dims(self.text(d)))
                        .unwrap_or(0);
                    out.push(Stmt::Local {
                        name: declarator
                            .child_by_field_name("name")
                            .map(|n| self.text(n).to_string())
                            .unwrap_or_default(),
                        ty: ty.clone().with_extra_dims(extra),
                        init: declarator.child_by_field_name("value").map(|v| self.expr(v)),
                    });
                }
            }
            "expression_statement" => {
                for child in named_children(node) {
                    out.push(Stmt::Expr(self.expr(child)));
                }
            }
            "return_statement" => {
                let value = named_children(node).into_iter().next().map(|e| self.expr(e));
                out.push(Stmt::Return(value));
            }
            "yield_statement" => {
                if let Some(value) = named_children(node).into_iter().next().map(|e| self.expr(e)) {
                    match self.yields.last_mut() {
                        Some(frame) => frame.push(value),
                        None => out.push(Stmt::Expr(value)),
                    }
                }
            }
            "explicit_constructor_invocation" => {
                let target = match node.child_by_field_name("constructor").map(|c| c.kind()) {
                    Some("this") => CtorTarget::This,
                    _ => CtorTarget::Super,
                };
                let args = self.arguments(node.child_by_field_name("arguments"));
                out.push(Stmt::CtorCall(CtorCall {
                    target,
                    args,
                    line: line_of(node),
                }));
            }
            "enhanced_for_statement" => {
                let extra = node
                    .child_by_field_name("dimensions")
                    .map(|d| count_dims(self.text(d)))
                    .unwrap_or(0);
                let ty = node
                    .child_by_field_name("type")
                    .map(|t| self.type_ref(t).with_extra_dims(extra))
                    .unwrap_or_else(|| TypeRef::named("var"));
                let name = node
                    .child_by_field_name("name")
                    .map(|n| self.text(n).to_string())
                    .unwrap_or_default();
                let iterable = node
                    .child_by_field_name("value")
                    .map(|v| self.expr(v))
                    .unwrap_or(Expr::Other(Vec::new()));
                out.push(Stmt::ForEach { name, ty, iterable });
                if let Some(body) = node.child_by_field_name("body") {
                    self.stmt(body, out);
                }
            }
            "catch_formal_parameter" => {
                let children = named_children(node);
                let ty = children
                    .iter()
                    .find(|c| c.kind() == "catch_type")
                    .and_then(|c| named_children(*c).into_iter().next())
                    .map(|t| self.type_ref(t))
                    .unwrap_or_else(|| TypeRef::named("java.lang.Throwable"));
                let name = node
                    .child_by_field_name("name")
                    .map(|n| self.text(n).to_string())
                    .unwrap_or_default();
                out.push(Stmt::Local {
                    name,
                    ty,
                    init: None,
                });
            }
            "resource" => match node.child_by_field_name("name") {
                Some(name) => out.push(Stmt::Local {
                    name: self.text(name).to_string(),
                    ty: node
                        .child_by_field_name("type")
                        .map(|t| self.type_ref(t))
                        .unwrap_or_else(|| TypeRef::named("var")),
                    init: node.child_by_field_name("value").map(|v| self.expr(v)),
                }),
                None => {
                    for child in named_children(node) {
                        out.push(Stmt::Expr(self.expr(child)));
                    }
                }
            },
            "break_statement" | "continue_statement" | "line_comment" | "block_comment" => {}
            "labeled_statement" => {
                for child in named_children(node) {
                    if child.kind() != "identifier" {
                        self.stmt(child, out);
                    }
                }
            }
            kind if is_type_declaration(kind) => {
                let owner = self.owners.last().cloned();
                self.type_decl(node, owner.as_deref());
            }
            kind if is_expression(kind) => out.push(Stmt::Expr(self.expr(node))),
            _ => {
                for child in named_children(node) {
                    self.stmt(child, out);
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------------

    fn arguments(&mut self, node: Option<Node<'_>>) -> Vec<Expr> {
        match node {
            Some(list) => named_children(list)
                .into_iter()
                .filter(|a| !a.kind().ends_with("comment"))
                .map(|a| self.expr(a))
                .collect(),
            None => Vec::new(),
        }
    }

    fn boxed(&mut self, node: Option<Node<'_>>) -> Box<Expr> {
        Box::new(match node {
            Some(n) => self.expr(n),
            None => Expr::Other(Vec::new()),
        })
    }

    fn other(&mut self, node: Node<'_>) -> Expr {
        let parts = named_children(node)
            .into_iter()
            .filter(|c| is_expression(c.kind()))
            .map(|c| self.expr(c))
            .collect();
        Expr::Other(parts)
    }

    fn expr(&mut self, node: Node<'_>) -> Expr {
        match node.kind() {
            "parenthesized_expression" => match named_children(node).into_iter().next() {
                Some(inner) => self.expr(inner),
                None => Expr::Other(Vec::new()),
            },
            "identifier" => Expr::Name(self.text(node).to_string()),
            "this" => Expr::This(None),
            "super" => Expr::Super,
            "string_literal" | "text_block" => Expr::Literal(Literal::String),
            "character_literal" => Expr::Literal(Literal::Char),
            "true" | "false" => Expr::Literal(Literal::Boolean),
            "null_literal" => Expr::Literal(Literal::Null),
            "class_literal" => Expr::Literal(Literal::Class),
            "decimal_integer_literal" | "hex_integer_literal" | "octal_integer_literal"
            | "binary_integer_literal" => {
                if self.text(node).ends_with(|c| c == 'l' || c == 'L') {
                    Expr::Literal(Literal::Long)
                } else {
                    Expr::Literal(Literal::Int)
                }
            }
            "decimal_floating_point_literal" | "hex_floating_point_literal" => {
                if self.text(node).ends_with(|c| c == 'f' || c == 'F') {
                    Expr::Literal(Literal::Float)
                } else {
                    Expr::Literal(Literal::Double)
                }
            }
            "method_invocation" => {
                let object = node.child_by_field_name("object");
                let qualified_super = object.is_some_and(|o| {
                    all_children(node)
                        .iter()
                        .any(|c| c.kind() == "super" && c.id() != o.id())
                });
                let receiver = match object {
                    None => Receiver::Implicit,
                    Some(o) if o.kind() == "super" => Receiver::Super,
                    Some(o) if qualified_super => {
                        Receiver::QualifiedSuper(TypeRef::named(clean_name(self.text(o))))
                    }
                    Some(o) => Receiver::Expr(Box::new(self.expr(o))),
                };
                Expr::Call {
                    receiver,
                    name: node
                        .child_by_field_name("name")
                        .map(|n| self.text(n).to_string())
                        .unwrap_or_default(),
                    args: self.arguments(node.child_by_field_name("arguments")),
                    line: line_of(node),
                }
            }
            "object_creation_expression" => {
                let ty = node
                    .child_by_field_name("type")
                    .map(|t| self.type_ref(t))
                    .unwrap_or_else(|| TypeRef::named(OBJECT));
                let args = self.arguments(node.child_by_field_name("arguments"));
                let body_type = named_children(node)
                    .into_iter()
                    .find(|c| c.kind() == "class_body")
                    .map(|body| self.anonymous_class(&ty, body));
                Expr::New {
                    ty,
                    args,
                    body_type,
                    line: line_of(node),
                }
            }
            "field_access" => {
                let object = node.child_by_field_name("object");
                let field = node.child_by_field_name("field");
                match (object, field) {
                    (Some(o), Some(f)) if f.kind() == "this" => {
                        Expr::This(Some(TypeRef::named(clean_name(self.text(o)))))
                    }
                    (Some(o), Some(f)) => {
                        let receiver = if o.kind() == "super" {
                            Expr::Super
                        } else {
                            self.expr(o)
                        };
                        Expr::FieldAccess {
                            receiver: Box::new(receiver),
                            name: self.text(f).to_string(),
                        }
                    }
                    _ => self.other(node),
                }
            }
            "assignment_expression" => {
                let op = node
                    .child_by_field_name("operator")
                    .map(|o| self.text(o))
                    .unwrap_or("=");
                let target = self.boxed(node.child_by_field_name("left"));
                let value = self.boxed(node.child_by_field_name("right"));
                if op == "=" {
                    Expr::Assign { target, value }
                } else {
                    Expr::Other(vec![*target, *value])
                }
            }
            "binary_expression" => Expr::Binary {
                op: node
                    .child_by_field_name("operator")
                    .map(|o| self.text(o).to_string())
                    .unwrap_or_default(),
                left: self.boxed(node.child_by_field_name("left")),
                right: self.boxed(node.child_by_field_name("right")),
            },
            "instanceof_expression" => Expr::InstanceOf {
                value: self.boxed(node.child_by_field_name("left")),
                ty: node
                    .child_by_field_name("right")
                    .map(|t| self.type_ref(t))
                    .unwrap_or_else(|| TypeRef::named(OBJECT)),
                binding: node
                    .child_by_field_name("name")
                    .map(|n| self.text(n).to_string()),
            },
            "cast_expression" => Expr::Cast {
                ty: node
                    .child_by_field_name("type")
                    .map(|t| self.type_ref(t))
                    .unwrap_or_else(|| TypeRef::named(OBJECT)),
                value: self.boxed(node.child_by_field_name("value")),
            },
            "ternary_expression" => Expr::Conditional {
                cond: self.boxed(node.child_by_field_name("condition")),
                then: self.boxed(node.child_by_field_name("consequence")),
                otherwise: self.boxed(node.child_by_field_name("alternative")),
            },
            "array_access" => Expr::ArrayAccess {
                array: self.boxed(node.child_by_field_name("array")),
                index: self.boxed(node.child_by_field_name("index")),
            },
            "array_creation_expression" => {
                let base = node
                    .child_by_field_name("type")
                    .map(|t| self.type_ref(t))
                    .unwrap_or_else(|| TypeRef::named(OBJECT));
                let mut dims = 0;
                let mut elements = Vec::new();
                for child in named_children(node) {
                    match child.kind() {
                        "dimensions_expr" => {
                            dims += 1;
                            elements.push(self.other(child));
                        }
                        "dimensions" => dims += count_dims(self.text(child)),
                        "array_initializer" => elements.extend(self.initializer_elements(child)),
                        _ => {}
                    }
                }
                Expr::ArrayNew {
                    ty: base.with_extra_dims(dims.max(1)),
                    elements,
                }
            }
            "array_initializer" => Expr::Other(self.initializer_elements(node)),
            "lambda_expression" => {
                let params = match node.child_by_field_name("parameters") {
                    Some(p) if p.kind() == "identifier" => vec![Param {
                        name: self.text(p).to_string(),
                        ty: TypeRef::named("var"),
                        is_varargs: false,
                    }],
                    Some(p) => self.params(Some(p)),
                    None => Vec::new(),
                };
                let body = match node.child_by_field_name("body") {
                    Some(b) => {
                        self.yields.push(Vec::new());
                        let stmts = self.block(b);
                        self.yields.pop();
                        stmts
                    }
                    None => Vec::new(),
                };
                Expr::Lambda { params, body }
            }
            "method_reference" => {
                let children = named_children(node);
                let receiver = match children.first() {
                    Some(r) if is_expression(r.kind()) => self.expr(*r),
                    Some(r) => Expr::Name(clean_name(self.text(*r))),
                    None => Expr::Other(Vec::new()),
                };
                let name = if all_children(node).iter().any(|c| c.kind() == "new") {
                    "new".to_string()
                } else {
                    children
                        .iter()
                        .skip(1)
                        .rfind(|c| c.kind() == "identifier")
                        .map(|c| self.text(*c).to_string())
                        .unwrap_or_default()
                };
                Expr::MethodRef {
                    receiver: Box::new(receiver),
                    name,
                }
            }
            "switch_expression" => {
                let selector = self.boxed(node.child_by_field_name("condition"));
                self.yields.push(Vec::new());
                let mut body = Vec::new();
                let mut values = Vec::new();
                if let Some(block) = node.child_by_field_name("body") {
                    for arm in named_children(block) {
                        match arm.kind() {
                            "switch_rule" => {
                                for part in named_children(arm) {
                                    match part.kind() {
                                        "switch_label" => {}
                                        "expression_statement" => {
                                            values.extend(
                                                named_children(part).into_iter().map(|e| self.expr(e)),
                                            );
                                        }
                                        _ => self.stmt(part, &mut body),
                                    }
                                }
                            }
                            _ => {
                                for part in named_children(arm) {
                                    if part.kind() != "switch_label" {
                                        self.stmt(part, &mut body);
                                    }
                                }
                            }
                        }
                    }
                }
                values.extend(self.yields.pop().unwrap_or_default());
                Expr::Switch {
                    selector,
                    body,
                    values,
                }
            }
            _ => self.other(node),
        }
    }

    fn initializer_elements(&mut self, node: Node<'_>) -> Vec<Expr> {
        named_children(node)
            .into_iter()
            .filter(|c| is_expression(c.kind()))
            .map(|c| self.expr(c))
            .collect()
    }
}
