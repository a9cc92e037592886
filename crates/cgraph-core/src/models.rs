//! Shared typed models used across indexing, analysis, and graph layers.
//!
//! Signatures are the nodes of the call graph and travel as text in the
//! persisted artifact, so their encoding lives here next to the types.

use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::{CallGraphError, CgResult};

pub const OBJECT: &str = "java.lang.Object";
pub const STRING: &str = "java.lang.String";
pub const ENUM: &str = "java.lang.Enum";
pub const RECORD: &str = "java.lang.Record";
pub const CLASS: &str = "java.lang.Class";

/// Declaring type of the synthetic framework root.
pub const ROOT_TYPE: &str = "<framework>";
/// Method name used for static initializer bodies.
pub const STATIC_INIT: &str = "<clinit>";

// ---------------------------------------------------------------------------
// Type descriptors
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Primitive {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Void,
}

impl Primitive {
    pub fn code(self) -> char {
        match self {
            Primitive::Boolean => 'Z',
            Primitive::Byte => 'B',
            Primitive::Char => 'C',
            Primitive::Short => 'S',
            Primitive::Int => 'I',
            Primitive::Long => 'J',
            Primitive::Float => 'F',
            Primitive::Double => 'D',
            Primitive::Void => 'V',
        }
    }

    pub fn from_code(code: char) -> Option<Self> {
        Some(match code {
            'Z' => Primitive::Boolean,
            'B' => Primitive::Byte,
            'C' => Primitive::Char,
            'S' => Primitive::Short,
            'I' => Primitive::Int,
            'J' => Primitive::Long,
            'F' => Primitive::Float,
            'D' => Primitive::Double,
            'V' => Primitive::Void,
            _ => return None,
        })
    }

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Some(match keyword {
            "boolean" => Primitive::Boolean,
            "byte" => Primitive::Byte,
            "char" => Primitive::Char,
            "short" => Primitive::Short,
            "int" => Primitive::Int,
            "long" => Primitive::Long,
            "float" => Primitive::Float,
            "double" => Primitive::Double,
            "void" => Primitive::Void,
            _ => return None,
        })
    }

    /// Wrapper class used by boxing conversions.
    pub fn boxed(self) -> Option<&'static str> {
        Some(match self {
            Primitive::Boolean => "java.lang.Boolean",
            Primitive::Byte => "java.lang.Byte",
            Primitive::Char => "java.lang.Character",
            Primitive::Short => "java.lang.Short",
            Primitive::Int => "java.lang.Integer",
            Primitive::Long => "java.lang.Long",
            Primitive::Float => "java.lang.Float",
            Primitive::Double => "java.lang.Double",
            Primitive::Void => return None,
        })
    }

    /// Inverse of [`Primitive::boxed`].
    pub fn unboxed(name: &str) -> Option<Self> {
        [
            Primitive::Boolean,
            Primitive::Byte,
            Primitive::Char,
            Primitive::Short,
            Primitive::Int,
            Primitive::Long,
            Primitive::Float,
            Primitive::Double,
        ]
        .into_iter()
        .find(|p| p.boxed() == Some(name))
    }

    /// Identity or widening primitive conversion.
    pub fn widens_to(self, target: Primitive) -> bool {
        use Primitive::*;
        if self == target {
            return true;
        }
        match self {
            Byte => matches!(target, Short | Int | Long | Float | Double),
            Short | Char => matches!(target, Int | Long | Float | Double),
            Int => matches!(target, Long | Float | Double),
            Long => matches!(target, Float | Double),
            Float => target == Double,
            _ => false,
        }
    }
}

/// Erased type descriptor as it appears in a [`Signature`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeDesc {
    Primitive(Primitive),
    Reference(String),
    Array(Box<TypeDesc>),
    TypeVar(String),
}

impl TypeDesc {
    pub fn object() -> Self {
        TypeDesc::Reference(OBJECT.to_string())
    }

    pub fn reference(name: impl Into<String>) -> Self {
        TypeDesc::Reference(name.into())
    }

    pub fn void() -> Self {
        TypeDesc::Primitive(Primitive::Void)
    }

    pub fn reference_name(&self) -> Option<&str> {
        match self {
            TypeDesc::Reference(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, TypeDesc::Primitive(_))
    }

    pub fn is_void(&self) -> bool {
        matches!(self, TypeDesc::Primitive(Primitive::Void))
    }

    pub fn encode_into(&self, out: &mut String) {
        match self {
            TypeDesc::Primitive(p) => out.push(p.code()),
            TypeDesc::Reference(name) => {
                out.push('Q');
                out.push_str(name);
                out.push(';');
            }
            TypeDesc::Array(element) => {
                out.push('[');
                element.encode_into(out);
            }
            TypeDesc::TypeVar(name) => {
                out.push('T');
                out.push_str(name);
                out.push(';');
            }
        }
    }

    pub fn encode(&self) -> String {
        let mut out = String::new();
        self.encode_into(&mut out);
        out
    }

    /// Decode a single descriptor; the whole input must be consumed.
    pub fn decode(text: &str) -> CgResult<Self> {
        let (desc, rest) = Self::decode_prefix(text, text)?;
        if !rest.is_empty() {
            return Err(CallGraphError::signature(text, "trailing characters after descriptor"));
        }
        Ok(desc)
    }

    fn decode_prefix<'a>(input: &'a str, whole: &str) -> CgResult<(TypeDesc, &'a str)> {
        let mut chars = input.chars();
        let head = chars
            .next()
            .ok_or_else(|| CallGraphError::signature(whole, "unexpected end of descriptor"))?;
        let rest = &input[head.len_utf8()..];
        match head {
            'Q' | 'T' => {
                let end = rest
                    .find(';')
                    .ok_or_else(|| CallGraphError::signature(whole, "unterminated type name"))?;
                let name = &rest[..end];
                if name.is_empty() {
                    return Err(CallGraphError::signature(whole, "empty type name"));
                }
                let desc = if head == 'Q' {
                    TypeDesc::Reference(name.to_string())
                } else {
                    TypeDesc::TypeVar(name.to_string())
                };
                Ok((desc, &rest[end + 1..]))
            }
            '[' => {
                let (element, rest) = Self::decode_prefix(rest, whole)?;
                Ok((TypeDesc::Array(Box::new(element)), rest))
            }
            other => match Primitive::from_code(other) {
                Some(p) => Ok((TypeDesc::Primitive(p), rest)),
                None => Err(CallGraphError::signature(
                    whole,
                    format!("unknown descriptor code '{other}'"),
                )),
            },
        }
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Erased parameter lists match when every position is equal or either side
/// is a type variable (a generic parameter erases to its bound).
pub fn params_match_erased(a: &[TypeDesc], b: &[TypeDesc]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| desc_matches_erased(x, y))
}

fn desc_matches_erased(a: &TypeDesc, b: &TypeDesc) -> bool {
    match (a, b) {
        (TypeDesc::TypeVar(_), TypeDesc::Primitive(_)) | (TypeDesc::Primitive(_), TypeDesc::TypeVar(_)) => {
            false
        }
        (TypeDesc::TypeVar(_), _) | (_, TypeDesc::TypeVar(_)) => true,
        (TypeDesc::Array(x), TypeDesc::Array(y)) => desc_matches_erased(x, y),
        _ => a == b,
    }
}

/// Binary simple name: the part after the last `.` and the last `$`.
pub fn simple_name(qualified: &str) -> &str {
    let tail = qualified.rsplit('.').next().unwrap_or(qualified);
    tail.rsplit('$').next().unwrap_or(tail)
}

// ---------------------------------------------------------------------------
// Generic static types
// ---------------------------------------------------------------------------

/// A static type with its generic arguments, used for substitution.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct JType {
    pub desc: TypeDesc,
    pub args: Vec<JType>,
}

impl JType {
    pub fn new(desc: TypeDesc) -> Self {
        JType { desc, args: Vec::new() }
    }

    pub fn reference(name: impl Into<String>) -> Self {
        JType::new(TypeDesc::reference(name))
    }

    pub fn object() -> Self {
        JType::new(TypeDesc::object())
    }

    pub fn with_args(desc: TypeDesc, args: Vec<JType>) -> Self {
        JType { desc, args }
    }

    pub fn reference_name(&self) -> Option<&str> {
        self.desc.reference_name()
    }

    pub fn element(&self) -> Option<JType> {
        match &self.desc {
            TypeDesc::Array(inner) => Some(JType::with_args((**inner).clone(), self.args.clone())),
            _ => None,
        }
    }

    /// Replace type variables bound in `bindings`, recursively.
    pub fn substitute(&self, bindings: &HashMap<String, JType>) -> JType {
        if bindings.is_empty() {
            return self.clone();
        }
        match &self.desc {
            TypeDesc::TypeVar(name) => match bindings.get(name) {
                Some(bound) => bound.clone(),
                None => self.clone(),
            },
            TypeDesc::Array(_) => {
                let element = self
                    .element()
                    .map(|e| e.substitute(bindings))
                    .unwrap_or_else(JType::object);
                JType::with_args(TypeDesc::Array(Box::new(element.desc)), element.args)
            }
            _ => JType::with_args(
                self.desc.clone(),
                self.args.iter().map(|a| a.substitute(bindings)).collect(),
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Signature
// ---------------------------------------------------------------------------

/// Unique, immutable identity of a method; the node type of the call graph.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Signature {
    declaring: String,
    name: String,
    params: Vec<TypeDesc>,
    ret: TypeDesc,
}

impl Signature {
    pub fn new(
        declaring: impl Into<String>,
        name: impl Into<String>,
        params: Vec<TypeDesc>,
        ret: TypeDesc,
    ) -> Self {
        Signature {
            declaring: declaring.into(),
            name: name.into(),
            params,
            ret,
        }
    }

    pub fn constructor(declaring: &str, params: Vec<TypeDesc>) -> Self {
        Signature::new(declaring, simple_name(declaring), params, TypeDesc::void())
    }

    pub fn static_init(declaring: &str) -> Self {
        Signature::new(declaring, STATIC_INIT, Vec::new(), TypeDesc::void())
    }

    /// The synthetic caller of every classified root method.
    pub fn framework_root() -> Self {
        Signature::new(ROOT_TYPE, "root", Vec::new(), TypeDesc::void())
    }

    pub fn declaring(&self) -> &str {
        &self.declaring
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[TypeDesc] {
        &self.params
    }

    pub fn ret(&self) -> &TypeDesc {
        &self.ret
    }

    pub fn is_framework_root(&self) -> bool {
        self.declaring == ROOT_TYPE
    }

    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(self.declaring.len() + self.name.len() + 16);
        out.push_str(&self.declaring);
        out.push(':');
        out.push_str(&self.name);
        out.push('(');
        for param in &self.params {
            param.encode_into(&mut out);
        }
        out.push(')');
        self.ret.encode_into(&mut out);
        out
    }

    /// Parse `<DeclaringType>:<name>(<params>)<ret>`.
    pub fn decode(text: &str) -> CgResult<Self> {
        let (declaring, rest) = text
            .split_once(':')
            .ok_or_else(|| CallGraphError::signature(text, "missing ':'"))?;
        if declaring.is_empty() {
            return Err(CallGraphError::signature(text, "empty declaring type"));
        }
        let open = rest
            .find('(')
            .ok_or_else(|| CallGraphError::signature(text, "missing '('"))?;
        let name = &rest[..open];
        if name.is_empty() {
            return Err(CallGraphError::signature(text, "empty method name"));
        }
        let mut cursor = &rest[open + 1..];
        let mut params = Vec::new();
        loop {
            if let Some(after) = cursor.strip_prefix(')') {
                cursor = after;
                break;
            }
            if cursor.is_empty() {
                return Err(CallGraphError::signature(text, "missing ')'"));
            }
            let (param, after) = TypeDesc::decode_prefix(cursor, text)?;
            params.push(param);
            cursor = after;
        }
        let (ret, trailing) = TypeDesc::decode_prefix(cursor, text)?;
        if !trailing.is_empty() {
            return Err(CallGraphError::signature(text, "trailing characters after return type"));
        }
        Ok(Signature::new(declaring, name, params, ret))
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Signature::decode(&text).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Type nodes
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeclarationKind {
    Class,
    Interface,
    Enum,
    Anonymous,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Origin {
    Source,
    Library,
    /// Referenced as a supertype but declared nowhere.
    Dangling,
}

/// How a call to a method is dispatched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MethodKind {
    Static,
    Constructor,
    Virtual,
    Default,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TypeParam {
    pub name: String,
    pub bound: Option<JType>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MethodInfo {
    pub signature: Signature,
    pub kind: MethodKind,
    pub is_abstract: bool,
    pub is_private: bool,
    pub is_varargs: bool,
    /// Set on constructors the catalog synthesized for classes without one.
    pub is_synthetic: bool,
    pub type_params: Vec<TypeParam>,
    pub generic_params: Vec<JType>,
    pub generic_return: JType,
}

impl MethodInfo {
    pub fn name(&self) -> &str {
        self.signature.name()
    }

    pub fn declaring(&self) -> &str {
        self.signature.declaring()
    }

    pub fn arity(&self) -> usize {
        self.signature.params().len()
    }

    /// True for calls that go through virtual dispatch.
    pub fn is_dispatched(&self) -> bool {
        matches!(self.kind, MethodKind::Virtual | MethodKind::Default) && !self.is_private
    }

    /// Same name and erased parameter list: `self` can override `other`.
    pub fn same_shape(&self, other: &MethodInfo) -> bool {
        self.name() == other.name()
            && params_match_erased(self.signature.params(), other.signature.params())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldInfo {
    pub name: String,
    pub declaring: String,
    pub ty: JType,
    pub is_static: bool,
}

/// A declared reference type. Immutable once indexing completes.
#[derive(Clone, Debug, PartialEq)]
pub struct TypeNode {
    pub name: String,
    pub kind: DeclarationKind,
    pub origin: Origin,
    pub superclass: Option<String>,
    pub interfaces: Vec<String>,
    /// Type arguments each direct supertype is instantiated with.
    pub super_args: HashMap<String, Vec<JType>>,
    pub type_params: Vec<TypeParam>,
    pub methods: Vec<MethodInfo>,
    pub fields: IndexMap<String, FieldInfo>,
    pub is_abstract: bool,
    pub enclosing: Option<String>,
}

impl TypeNode {
    pub fn new(name: impl Into<String>, kind: DeclarationKind, origin: Origin) -> Self {
        TypeNode {
            name: name.into(),
            kind,
            origin,
            superclass: None,
            interfaces: Vec::new(),
            super_args: HashMap::new(),
            type_params: Vec::new(),
            methods: Vec::new(),
            fields: IndexMap::new(),
            is_abstract: false,
            enclosing: None,
        }
    }

    /// A reference type known only by name.
    pub fn dangling(name: impl Into<String>) -> Self {
        TypeNode::new(name, DeclarationKind::Class, Origin::Dangling)
    }

    pub fn is_interface(&self) -> bool {
        self.kind == DeclarationKind::Interface
    }

    /// Superclass first, then superinterfaces in declaration order.
    pub fn direct_supertypes(&self) -> impl Iterator<Item = &str> {
        self.superclass
            .as_deref()
            .into_iter()
            .chain(self.interfaces.iter().map(String::as_str))
    }

    /// Whether instances of exactly this type can exist at runtime.
    pub fn is_instantiable(&self) -> bool {
        !self.is_abstract && self.kind != DeclarationKind::Interface
    }
}

// ---------------------------------------------------------------------------
// Edges
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallGraphEdge {
    pub caller: Signature,
    pub callee: Signature,
}

impl CallGraphEdge {
    pub fn new(caller: Signature, callee: Signature) -> Self {
        CallGraphEdge { caller, callee }
    }
}
