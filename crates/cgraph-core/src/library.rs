//! Preloaded library hierarchy and framework callback table.
//!
//! Library types are described in JSON with Java-like member text, e.g.
//! `"static <T> java.util.List<T> of(T...)"` or `"ArrayList(int)"` for a
//! constructor. The crate embeds a small JDK/framework subset; a user file can
//! extend or replace entries.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::errors::{CallGraphError, CgResult};
use crate::models::{
    simple_name, DeclarationKind, FieldInfo, JType, MethodInfo, MethodKind, Origin, Primitive,
    Signature, TypeDesc, TypeNode, TypeParam, ENUM, OBJECT,
};

const BUILTIN_LIBRARY: &str = include_str!("../data/library.json");

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LibraryKind {
    #[default]
    Class,
    Interface,
    Enum,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryType {
    pub kind: LibraryKind,
    pub superclass: Option<String>,
    pub interfaces: Vec<String>,
    pub type_params: Vec<String>,
    pub methods: Vec<String>,
    pub fields: Vec<String>,
    pub is_abstract: bool,
}

/// Library hierarchy plus the `{type -> callback names}` root table.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LibrarySpec {
    pub types: BTreeMap<String, LibraryType>,
    pub callbacks: BTreeMap<String, BTreeSet<String>>,
}

impl LibrarySpec {
    /// The embedded JDK/framework subset.
    pub fn builtin() -> CgResult<Self> {
        serde_json::from_str(BUILTIN_LIBRARY)
            .map_err(|e| CallGraphError::Library(format!("embedded library: {e}")))
    }

    pub fn from_path(path: &Path) -> CgResult<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| CallGraphError::Library(format!("{}: {e}", path.display())))
    }

    /// Entries of `other` replace same-named types; callback names are unioned.
    pub fn merge(&mut self, other: LibrarySpec) {
        self.types.extend(other.types);
        for (ty, names) in other.callbacks {
            self.callbacks.entry(ty).or_default().extend(names);
        }
    }

    /// Synthesize immutable type nodes for every library entry.
    pub fn type_nodes(&self) -> CgResult<Vec<TypeNode>> {
        self.types
            .iter()
            .map(|(name, entry)| build_type_node(name, entry))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Type node synthesis
// ---------------------------------------------------------------------------

fn build_type_node(name: &str, entry: &LibraryType) -> CgResult<TypeNode> {
    let kind = match entry.kind {
        LibraryKind::Class => DeclarationKind::Class,
        LibraryKind::Interface => DeclarationKind::Interface,
        LibraryKind::Enum => DeclarationKind::Enum,
    };
    let mut node = TypeNode::new(name, kind, Origin::Library);
    node.is_abstract = entry.is_abstract || kind == DeclarationKind::Interface;

    let class_scope: Vec<String> = entry
        .type_params
        .iter()
        .map(|p| type_param_name(p).to_string())
        .collect();
    node.type_params = entry
        .type_params
        .iter()
        .map(|p| parse_type_param(p, &class_scope))
        .collect::<CgResult<_>>()
        .map_err(|e| context(name, e))?;

    let superclass = match (&entry.superclass, kind) {
        (Some(text), _) => Some(parse_type_text(text, &class_scope).map_err(|e| context(name, e))?),
        (None, DeclarationKind::Enum) => Some(JType::reference(ENUM)),
        (None, DeclarationKind::Class) if name != OBJECT => Some(JType::object()),
        _ => None,
    };
    if let Some(sup) = superclass {
        if let Some(sup_name) = sup.reference_name() {
            node.superclass = Some(sup_name.to_string());
            if !sup.args.is_empty() {
                node.super_args.insert(sup_name.to_string(), sup.args.clone());
            }
        }
    }
    for text in &entry.interfaces {
        let iface = parse_type_text(text, &class_scope).map_err(|e| context(name, e))?;
        if let Some(iface_name) = iface.reference_name() {
            node.interfaces.push(iface_name.to_string());
            if !iface.args.is_empty() {
                node.super_args.insert(iface_name.to_string(), iface.args.clone());
            }
        }
    }

    for text in &entry.methods {
        let method = parse_method_text(name, kind, &class_scope, text).map_err(|e| context(name, e))?;
        node.methods.push(method);
    }

    let mut fields = IndexMap::new();
    for text in &entry.fields {
        let field = parse_field_text(name, &class_scope, text).map_err(|e| context(name, e))?;
        fields.insert(field.name.clone(), field);
    }
    node.fields = fields;
    Ok(node)
}

fn context(owner: &str, err: CallGraphError) -> CallGraphError {
    match err {
        CallGraphError::Library(reason) => CallGraphError::Library(format!("{owner}: {reason}")),
        other => other,
    }
}

fn type_param_name(text: &str) -> &str {
    text.split_whitespace().next().unwrap_or(text)
}

fn parse_type_param(text: &str, scope: &[String]) -> CgResult<TypeParam> {
    let trimmed = text.trim();
    let name = type_param_name(trimmed).to_string();
    let bound = match trimmed[name.len()..].trim().strip_prefix("extends") {
        Some(rest) => Some(parse_type_text(rest.split('&').next().unwrap_or(rest), scope)?),
        None => None,
    };
    Ok(TypeParam { name, bound })
}

/// Parse `[static |default |abstract ][<T, U>] [RetType ]name(Param, ...)`.
pub fn parse_method_text(
    owner: &str,
    owner_kind: DeclarationKind,
    class_scope: &[String],
    text: &str,
) -> CgResult<MethodInfo> {
    let mut rest = text.trim();
    let mut is_static = false;
    let mut is_default = false;
    let mut is_abstract = false;
    loop {
        if let Some(r) = rest.strip_prefix("static ") {
            is_static = true;
            rest = r.trim_start();
        } else if let Some(r) = rest.strip_prefix("default ") {
            is_default = true;
            rest = r.trim_start();
        } else if let Some(r) = rest.strip_prefix("abstract ") {
            is_abstract = true;
            rest = r.trim_start();
        } else {
            break;
        }
    }

    let mut scope = class_scope.to_vec();
    let mut method_params_text = Vec::new();
    if rest.starts_with('<') {
        let close = matching_angle(rest)
            .ok_or_else(|| CallGraphError::Library(format!("unbalanced '<' in '{text}'")))?;
        method_params_text = split_top_level(&rest[1..close]);
        scope.extend(method_params_text.iter().map(|p| type_param_name(p).to_string()));
        rest = rest[close + 1..].trim_start();
    }
    let type_params = method_params_text
        .iter()
        .map(|p| parse_type_param(p, &scope))
        .collect::<CgResult<Vec<_>>>()?;

    let open = rest
        .find('(')
        .ok_or_else(|| CallGraphError::Library(format!("missing '(' in '{text}'")))?;
    let close = rest
        .rfind(')')
        .ok_or_else(|| CallGraphError::Library(format!("missing ')' in '{text}'")))?;
    let head = rest[..open].trim_end();
    let name_start = head
        .rfind(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$'))
        .map(|i| i + 1)
        .unwrap_or(0);
    let name = &head[name_start..];
    if name.is_empty() {
        return Err(CallGraphError::Library(format!("missing method name in '{text}'")));
    }
    let ret_text = head[..name_start].trim();

    let mut generic_params = Vec::new();
    let mut is_varargs = false;
    for param in split_top_level(&rest[open + 1..close]) {
        let (param, varargs) = match param.strip_suffix("...") {
            Some(p) => (p, true),
            None => (param.as_str(), false),
        };
        is_varargs = varargs;
        let mut ty = parse_type_text(param, &scope)?;
        if varargs {
            ty = array_of(ty);
        }
        generic_params.push(ty);
    }
    let params: Vec<TypeDesc> = generic_params.iter().map(|p| p.desc.clone()).collect();

    let is_constructor = ret_text.is_empty();
    if is_constructor && name != simple_name(owner) {
        return Err(CallGraphError::Library(format!(
            "constructor '{name}' does not match its type"
        )));
    }
    let generic_return = if is_constructor {
        JType::new(TypeDesc::void())
    } else {
        parse_type_text(ret_text, &scope)?
    };
    let signature = if is_constructor {
        Signature::constructor(owner, params)
    } else {
        Signature::new(owner, name, params, generic_return.desc.clone())
    };
    let kind = if is_constructor {
        MethodKind::Constructor
    } else if is_static {
        MethodKind::Static
    } else if is_default {
        MethodKind::Default
    } else {
        MethodKind::Virtual
    };
    let interface_abstract =
        owner_kind == DeclarationKind::Interface && kind == MethodKind::Virtual;
    Ok(MethodInfo {
        signature,
        kind,
        is_abstract: is_abstract || interface_abstract,
        is_private: false,
        is_varargs,
        is_synthetic: false,
        type_params,
        generic_params,
        generic_return,
    })
}

fn parse_field_text(owner: &str, scope: &[String], text: &str) -> CgResult<FieldInfo> {
    let trimmed = text.trim();
    let (is_static, rest) = match trimmed.strip_prefix("static ") {
        Some(r) => (true, r.trim_start()),
        None => (false, trimmed),
    };
    let (ty_text, name) = rest
        .rsplit_once(char::is_whitespace)
        .ok_or_else(|| CallGraphError::Library(format!("malformed field '{text}'")))?;
    Ok(FieldInfo {
        name: name.to_string(),
        declaring: owner.to_string(),
        ty: parse_type_text(ty_text, scope)?,
        is_static,
    })
}

fn array_of(ty: JType) -> JType {
    JType::with_args(TypeDesc::Array(Box::new(ty.desc)), ty.args)
}

fn matching_angle(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn split_top_level(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for c in text.chars() {
        match c {
            '<' => depth += 1,
            '>' => depth -= 1,
            ',' if depth == 0 => {
                let part = current.trim().to_string();
                if !part.is_empty() {
                    parts.push(part);
                }
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    let part = current.trim().to_string();
    if !part.is_empty() {
        parts.push(part);
    }
    parts
}

// ---------------------------------------------------------------------------
// Type text parsing
// ---------------------------------------------------------------------------

/// Parse Java-like type text (`java.util.Map<K, java.util.List<V>>[]`).
///
/// Names listed in `scope` are type variables; wildcards collapse to their
/// upper bound (`? super X` and bare `?` become `Object`).
pub fn parse_type_text(text: &str, scope: &[String]) -> CgResult<JType> {
    let mut parser = TypeTextParser { text, pos: 0, scope };
    let ty = parser.parse_type()?;
    parser.skip_ws();
    if parser.pos != text.len() {
        return Err(CallGraphError::Library(format!("unexpected input in type '{text}'")));
    }
    Ok(ty)
}

struct TypeTextParser<'a> {
    text: &'a str,
    pos: usize,
    scope: &'a [String],
}

impl TypeTextParser<'_> {
    fn rest(&self) -> &str {
        &self.text[self.pos..]
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.text.len() - trimmed.len();
    }

    fn eat(&mut self, token: &str) -> bool {
        self.skip_ws();
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn ident(&mut self) -> Option<String> {
        self.skip_ws();
        let len = self
            .rest()
            .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$' || c == '.'))
            .unwrap_or(self.rest().len());
        if len == 0 {
            return None;
        }
        let word = self.rest()[..len].to_string();
        self.pos += len;
        Some(word)
    }

    fn error(&self, reason: &str) -> CallGraphError {
        CallGraphError::Library(format!("{reason} in type '{}'", self.text))
    }

    fn parse_type(&mut self) -> CgResult<JType> {
        if self.eat("?") {
            if self.eat("extends") {
                return self.parse_type();
            }
            if self.eat("super") {
                self.parse_type()?;
            }
            return Ok(JType::object());
        }
        let name = self.ident().ok_or_else(|| self.error("expected type name"))?;
        let mut ty = if let Some(p) = Primitive::from_keyword(&name) {
            JType::new(TypeDesc::Primitive(p))
        } else if self.scope.iter().any(|s| *s == name) {
            JType::new(TypeDesc::TypeVar(name))
        } else {
            JType::reference(name)
        };
        if self.eat("<") {
            let mut args = Vec::new();
            loop {
                args.push(self.parse_type()?);
                if self.eat(">") {
                    break;
                }
                if !self.eat(",") {
                    return Err(self.error("expected ',' or '>'"));
                }
            }
            ty.args = args;
        }
        while self.eat("[]") {
            ty = array_of(ty);
        }
        Ok(ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_library_loads() {
        let spec = LibrarySpec::builtin().unwrap();
        let nodes = spec.type_nodes().unwrap();
        assert!(nodes.iter().any(|n| n.name == OBJECT));
        assert!(spec.callbacks["java.lang.Runnable"].contains("run"));
    }

    #[test]
    fn test_generic_supertypes_record_arguments() {
        let spec = LibrarySpec::builtin().unwrap();
        let nodes = spec.type_nodes().unwrap();
        let list = nodes.iter().find(|n| n.name == "java.util.ArrayList").unwrap();
        assert_eq!(list.superclass.as_deref(), Some(OBJECT));
        assert_eq!(list.interfaces, vec!["java.util.List".to_string()]);
        let args = &list.super_args["java.util.List"];
        assert_eq!(args[0].desc, TypeDesc::TypeVar("E".into()));
    }

    #[test]
    fn test_parse_method_text_static_generic_varargs() {
        let scope = vec!["E".to_string()];
        let method = parse_method_text(
            "java.util.List",
            DeclarationKind::Interface,
            &scope,
            "static <T> java.util.List<T> of(T...)",
        )
        .unwrap();
        assert_eq!(method.kind, MethodKind::Static);
        assert!(method.is_varargs);
        assert!(!method.is_abstract);
        assert_eq!(method.signature.encode(), "java.util.List:of([TT;)Qjava.util.List;");
    }

    #[test]
    fn test_parse_method_text_constructor_and_abstract() {
        let ctor =
            parse_method_text("java.util.ArrayList", DeclarationKind::Class, &[], "ArrayList(int)")
                .unwrap();
        assert_eq!(ctor.kind, MethodKind::Constructor);
        assert_eq!(ctor.signature.encode(), "java.util.ArrayList:ArrayList(I)V");

        let run =
            parse_method_text("java.lang.Runnable", DeclarationKind::Interface, &[], "void run()")
                .unwrap();
        assert!(run.is_abstract);
        assert_eq!(run.kind, MethodKind::Virtual);
    }

    #[test]
    fn test_parse_type_text_wildcards_and_arrays() {
        let scope = vec!["T".to_string()];
        let ty = parse_type_text("java.util.function.Consumer<? super T>", &scope).unwrap();
        assert_eq!(ty.args[0], JType::object());
        let arr = parse_type_text("java.lang.String[][]", &[]).unwrap();
        assert_eq!(arr.desc.encode(), "[[Qjava.lang.String;");
        assert!(parse_type_text("java.util.List<", &[]).is_err());
    }

    #[test]
    fn test_merge_unions_callbacks() {
        let mut base = LibrarySpec::builtin().unwrap();
        let extra: LibrarySpec = serde_json::from_str(
            r#"{"callbacks": {"java.lang.Runnable": ["start"], "a.Plugin": ["load"]}}"#,
        )
        .unwrap();
        base.merge(extra);
        assert!(base.callbacks["java.lang.Runnable"].contains("run"));
        assert!(base.callbacks["java.lang.Runnable"].contains("start"));
        assert!(base.callbacks.contains_key("a.Plugin"));
    }

    #[test]
    fn test_mismatched_constructor_name_is_rejected() {
        let result = parse_method_text("a.Foo", DeclarationKind::Class, &[], "Bar()");
        assert!(matches!(result, Err(CallGraphError::Library(_))));
    }
}

