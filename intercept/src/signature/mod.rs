//! Type-encoding parser.
//!
//! Methods and replacements describe their calling convention with an
//! Objective-C style type encoding: the return type followed by every
//! argument, each optionally followed by a frame offset (`q32@0:8q16q24`).
//! Parsing turns that string into a [`Signature`] of [`TypeDescriptor`]s with
//! C layout (size and alignment) already computed, or fails closed on any
//! token the call-shape builder cannot represent.

use core::fmt;
use core::mem::{align_of, size_of};
use core::str::FromStr;

use swizzle_runtime::Method;

use crate::types::{HookError, Result};

/// Largest struct passed by value; its elements are described to libffi one by one.
pub const MAX_AGGREGATE_SIZE: usize = 64 * 1024;

pub(crate) mod layout;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    Void,
    Char,
    UnsignedChar,
    Short,
    UnsignedShort,
    Int,
    UnsignedInt,
    /// `l` is 32 bits wide in type encodings regardless of the platform `long`.
    Long,
    UnsignedLong,
    LongLong,
    UnsignedLongLong,
    Float,
    Double,
    Bool,
    CString,
    Object,
    Class,
    Selector,
    Block,
    FunctionPointer,
    Pointer,
    Struct(Vec<TypeDescriptor>),
    Array(usize, Box<TypeDescriptor>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    kind: TypeKind,
    name: Option<String>,
    size: usize,
    align: usize,
}

impl TypeDescriptor {
    fn scalar(kind: TypeKind) -> Self {
        let (size, align) = match kind {
            TypeKind::Void => (0, 1),
            TypeKind::Char | TypeKind::UnsignedChar | TypeKind::Bool => (1, 1),
            TypeKind::Short | TypeKind::UnsignedShort => (size_of::<i16>(), align_of::<i16>()),
            TypeKind::Int | TypeKind::UnsignedInt | TypeKind::Long | TypeKind::UnsignedLong => {
                (size_of::<i32>(), align_of::<i32>())
            }
            TypeKind::LongLong | TypeKind::UnsignedLongLong => (size_of::<i64>(), align_of::<i64>()),
            TypeKind::Float => (size_of::<f32>(), align_of::<f32>()),
            TypeKind::Double => (size_of::<f64>(), align_of::<f64>()),
            _ => (size_of::<usize>(), align_of::<usize>()),
        };
        Self { kind, name: None, size, align }
    }

    fn named(kind: TypeKind, name: Option<String>) -> Self {
        Self { name, ..Self::scalar(kind) }
    }

    /// Lays out a struct with C rules; `None` when the size is not representable.
    fn structure(name: Option<String>, fields: Vec<TypeDescriptor>) -> Option<Self> {
        let mut size: usize = 0;
        let mut align: usize = 1;
        for field in &fields {
            size = size.checked_next_multiple_of(field.align)?.checked_add(field.size)?;
            align = align.max(field.align);
        }
        let size = size.checked_next_multiple_of(align)?;
        (size <= MAX_AGGREGATE_SIZE).then(|| Self {
            size,
            align,
            kind: TypeKind::Struct(fields),
            name,
        })
    }

    fn array(len: usize, element: TypeDescriptor) -> Option<Self> {
        let size = element.size.checked_mul(len).filter(|&size| size <= isize::MAX as usize)?;
        Some(Self {
            size,
            align: element.align,
            kind: TypeKind::Array(len, Box::new(element)),
            name: None,
        })
    }

    pub fn kind(&self) -> &TypeKind {
        &self.kind
    }

    /// Struct tag or object class name, when the encoding carried one.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn align(&self) -> usize {
        self.align
    }

    pub fn is_void(&self) -> bool {
        self.kind == TypeKind::Void
    }

    /// Structural equality that ignores struct tags and class names.
    pub fn same_kind(&self, other: &TypeDescriptor) -> bool {
        match (&self.kind, &other.kind) {
            (TypeKind::Struct(a), TypeKind::Struct(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_kind(y))
            }
            (TypeKind::Array(n, a), TypeKind::Array(m, b)) => n == m && a.same_kind(b),
            (a, b) => core::mem::discriminant(a) == core::mem::discriminant(b),
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match &self.kind {
            TypeKind::Void => "v",
            TypeKind::Char => "c",
            TypeKind::UnsignedChar => "C",
            TypeKind::Short => "s",
            TypeKind::UnsignedShort => "S",
            TypeKind::Int => "i",
            TypeKind::UnsignedInt => "I",
            TypeKind::Long => "l",
            TypeKind::UnsignedLong => "L",
            TypeKind::LongLong => "q",
            TypeKind::UnsignedLongLong => "Q",
            TypeKind::Float => "f",
            TypeKind::Double => "d",
            TypeKind::Bool => "B",
            TypeKind::CString => "*",
            TypeKind::Object => "@",
            TypeKind::Class => "#",
            TypeKind::Selector => ":",
            TypeKind::Block => "@?",
            TypeKind::FunctionPointer => "^?",
            TypeKind::Pointer => "^",
            TypeKind::Struct(fields) => {
                write!(f, "{{{}=", self.name.as_deref().unwrap_or("?"))?;
                for field in fields {
                    write!(f, "{field}")?;
                }
                return f.write_str("}");
            }
            TypeKind::Array(len, element) => return write!(f, "[{len}{element}]"),
        };
        f.write_str(code)
    }
}

/// Return type plus ordered argument types of one callable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    return_type: TypeDescriptor,
    arguments: Vec<TypeDescriptor>,
}

impl Signature {
    pub fn new(return_type: TypeDescriptor, arguments: Vec<TypeDescriptor>) -> Self {
        Self { return_type, arguments }
    }

    pub fn parse(encoding: &str) -> Result<Signature> {
        let mut parser = Parser::new(encoding);
        parser.skip_qualifiers();
        if parser.at_end() {
            return Err(HookError::MissingSignature(format!("empty type encoding '{encoding}'")));
        }
        let return_type = parser.parse_type()?;
        if matches!(return_type.kind, TypeKind::Array(..)) {
            return Err(parser.unsupported("array return"));
        }
        parser.skip_offset();

        let mut arguments = Vec::new();
        loop {
            parser.skip_qualifiers();
            if parser.at_end() {
                break;
            }
            let argument = parser.parse_type()?;
            if argument.is_void() {
                return Err(parser.unsupported("void argument"));
            }
            arguments.push(argument);
            parser.skip_offset();
        }
        Ok(Signature { return_type, arguments })
    }

    /// Signature of a method implementation: receiver and selector included.
    pub fn for_method(class: &str, method: &Method) -> Result<Signature> {
        let description = || format!("-[{} {}]", class, method.name());
        let encoding = method
            .type_encoding()
            .filter(|e| !e.is_empty())
            .ok_or_else(|| HookError::MissingSignature(description()))?;
        let signature = Signature::parse(encoding)?;
        match signature.arguments.as_slice() {
            [receiver, selector, ..]
                if receiver.kind == TypeKind::Object && selector.kind == TypeKind::Selector =>
            {
                Ok(signature)
            }
            _ => Err(HookError::UnsupportedType(format!(
                "{} encoding '{encoding}' does not start with receiver and selector",
                description()
            ))),
        }
    }

    pub fn return_type(&self) -> &TypeDescriptor {
        &self.return_type
    }

    pub fn arguments(&self) -> &[TypeDescriptor] {
        &self.arguments
    }

    pub fn is_compatible(&self, other: &Signature) -> bool {
        self.return_type.same_kind(&other.return_type)
            && self.arguments.len() == other.arguments.len()
            && self.arguments.iter().zip(&other.arguments).all(|(a, b)| a.same_kind(b))
    }
}

impl FromStr for Signature {
    type Err = HookError;

    fn from_str(s: &str) -> Result<Self> {
        Signature::parse(s)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.return_type)?;
        for (i, argument) in self.arguments.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{argument}")?;
        }
        f.write_str(")")
    }
}

struct Parser<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self { source, bytes: source.as_bytes(), pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn eat(&mut self, b: u8) -> bool {
        if self.peek() == Some(b) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn unsupported(&self, what: &str) -> HookError {
        HookError::UnsupportedType(format!("{what} at offset {} in '{}'", self.pos, self.source))
    }

    fn skip_qualifiers(&mut self) {
        while matches!(self.peek(), Some(b'r' | b'n' | b'N' | b'o' | b'O' | b'R' | b'V' | b'A')) {
            self.pos += 1;
        }
    }

    fn skip_offset(&mut self) {
        self.eat(b'-');
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
    }

    fn number(&mut self) -> Option<usize> {
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        self.source[start..self.pos].parse().ok()
    }

    /// Consumes a `"..."` name if one starts here.
    fn quoted(&mut self) -> Result<Option<&'a str>> {
        if !self.eat(b'"') {
            return Ok(None);
        }
        let start = self.pos;
        while let Some(b) = self.next() {
            if b == b'"' {
                return Ok(Some(&self.source[start..self.pos - 1]));
            }
        }
        Err(self.unsupported("unterminated quoted name"))
    }

    fn parse_type(&mut self) -> Result<TypeDescriptor> {
        self.skip_qualifiers();
        let token = self.next().ok_or_else(|| self.unsupported("truncated encoding"))?;
        let kind = match token {
            b'v' => TypeKind::Void,
            b'c' => TypeKind::Char,
            b'C' => TypeKind::UnsignedChar,
            b's' => TypeKind::Short,
            b'S' => TypeKind::UnsignedShort,
            b'i' => TypeKind::Int,
            b'I' => TypeKind::UnsignedInt,
            b'l' => TypeKind::Long,
            b'L' => TypeKind::UnsignedLong,
            b'q' => TypeKind::LongLong,
            b'Q' => TypeKind::UnsignedLongLong,
            b'f' => TypeKind::Float,
            b'd' => TypeKind::Double,
            b'B' => TypeKind::Bool,
            b'*' => TypeKind::CString,
            b'#' => TypeKind::Class,
            b':' => TypeKind::Selector,
            b'@' => {
                if self.eat(b'?') {
                    TypeKind::Block
                } else {
                    let class = self.quoted()?.map(str::to_owned);
                    return Ok(TypeDescriptor::named(TypeKind::Object, class));
                }
            }
            b'^' => {
                if self.eat(b'?') {
                    TypeKind::FunctionPointer
                } else {
                    self.skip_type()?;
                    TypeKind::Pointer
                }
            }
            b'[' => {
                let len = self.number().ok_or_else(|| self.unsupported("array without length"))?;
                let element = self.parse_type()?;
                if !self.eat(b']') {
                    return Err(self.unsupported("unterminated array"));
                }
                if len == 0 || element.is_void() {
                    return Err(self.unsupported("empty array"));
                }
                return TypeDescriptor::array(len, element)
                    .ok_or_else(|| self.unsupported("array too large"));
            }
            b'{' => return self.parse_struct(),
            b'(' => return Err(self.unsupported("union")),
            b'b' => return Err(self.unsupported("bitfield")),
            b'D' => return Err(self.unsupported("long double")),
            b'!' => return Err(self.unsupported("vector")),
            other => {
                return Err(self.unsupported(&format!("unknown type token '{}'", other as char)));
            }
        };
        Ok(TypeDescriptor::scalar(kind))
    }

    fn parse_struct(&mut self) -> Result<TypeDescriptor> {
        let start = self.pos;
        while !matches!(self.peek(), Some(b'=' | b'}') | None) {
            self.pos += 1;
        }
        let name = match &self.source[start..self.pos] {
            "" | "?" => None,
            name => Some(name.to_owned()),
        };
        if !self.eat(b'=') {
            return Err(self.unsupported("struct without field layout"));
        }
        let mut fields = Vec::new();
        loop {
            if self.eat(b'}') {
                break;
            }
            if self.at_end() {
                return Err(self.unsupported("unterminated struct"));
            }
            self.quoted()?;
            let field = self.parse_type()?;
            if field.is_void() {
                return Err(self.unsupported("void struct field"));
            }
            fields.push(field);
        }
        if fields.is_empty() {
            return Err(self.unsupported("empty struct"));
        }
        TypeDescriptor::structure(name, fields).ok_or_else(|| self.unsupported("struct too large"))
    }

    /// Steps over a pointee type without interpreting it; pointers are passed
    /// as addresses, so what they point at never needs to be representable.
    fn skip_type(&mut self) -> Result<()> {
        self.skip_qualifiers();
        match self.next() {
            Some(b'{' | b'(' | b'[') => {
                let mut depth = 1usize;
                while depth > 0 {
                    match self.peek() {
                        Some(b'"') => {
                            self.quoted()?;
                        }
                        Some(b'{' | b'(' | b'[') => {
                            depth += 1;
                            self.pos += 1;
                        }
                        Some(b'}' | b')' | b']') => {
                            depth -= 1;
                            self.pos += 1;
                        }
                        Some(_) => self.pos += 1,
                        None => return Err(self.unsupported("unterminated pointee")),
                    }
                }
                Ok(())
            }
            Some(b'^') => self.skip_type(),
            Some(b'@') => {
                if !self.eat(b'?') {
                    self.quoted()?;
                }
                Ok(())
            }
            Some(b'b') => {
                self.number();
                Ok(())
            }
            Some(_) => Ok(()),
            None => Err(self.unsupported("pointer without pointee")),
        }
    }
}
