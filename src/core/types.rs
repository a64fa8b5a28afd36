// This module defines the front-end level type vocabulary of soawrap. SemanticType tags
// either a leaf kind (boolean, integer of a given width and signedness, float, complex,
// or an opaque front-end type with no native data model) or a tuple, homogeneous
// (UniTuple) or heterogeneous (Tuple). The types carry no runtime representation; they
// only classify how many leaf values a return produces and which native shapes those
// leaves lower to. Signature pairs a return type with argument types and can be parsed
// from the compact `ret(args...)` text form used by the driver, e.g.
// `UniTuple(int32 x 2)(int32, int32)`. Types also provide the short codes used to mangle
// internal entry symbols.

//! Semantic types and function signatures.

use crate::core::error::{CompileError, CompileResult};
use std::fmt;
use std::str::FromStr;

/// Front-end type of an argument or return value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SemanticType {
    Boolean,
    Integer { bits: u32, signed: bool },
    Float { bits: u32 },
    /// Pair of floats, `bits` is the width of the whole number.
    Complex { bits: u32 },
    /// Homogeneous tuple.
    UniTuple {
        element: Box<SemanticType>,
        count: usize,
    },
    /// Heterogeneous tuple.
    Tuple(Vec<SemanticType>),
    /// Front-end type without a native data model.
    Opaque(String),
}

impl SemanticType {
    pub fn int(bits: u32) -> Self {
        Self::Integer { bits, signed: true }
    }

    pub fn uint(bits: u32) -> Self {
        Self::Integer { bits, signed: false }
    }

    pub fn float(bits: u32) -> Self {
        Self::Float { bits }
    }

    pub fn int32() -> Self {
        Self::int(32)
    }

    pub fn float32() -> Self {
        Self::float(32)
    }

    pub fn float64() -> Self {
        Self::float(64)
    }

    pub fn uni_tuple(element: SemanticType, count: usize) -> Self {
        Self::UniTuple {
            element: Box::new(element),
            count,
        }
    }

    pub fn is_tuple(&self) -> bool {
        matches!(self, Self::UniTuple { .. } | Self::Tuple(_))
    }

    /// Elements of a tuple in left-to-right order, `None` for leaf types.
    pub fn tuple_elements(&self) -> Option<Vec<&SemanticType>> {
        match self {
            Self::UniTuple { element, count } => Some(vec![element.as_ref(); *count]),
            Self::Tuple(elements) => Some(elements.iter().collect()),
            _ => None,
        }
    }

    /// Number of logical values a return of this type produces.
    pub fn return_arity(&self) -> usize {
        match self {
            Self::UniTuple { count, .. } => *count,
            Self::Tuple(elements) => elements.len(),
            _ => 1,
        }
    }

    /// Short code used when mangling internal entry symbols.
    pub fn mangle(&self) -> String {
        match self {
            Self::Boolean => "b1".to_string(),
            Self::Integer { bits, signed: true } => format!("i{bits}"),
            Self::Integer { bits, signed: false } => format!("u{bits}"),
            Self::Float { bits } => format!("f{bits}"),
            Self::Complex { bits } => format!("c{bits}"),
            Self::UniTuple { element, count } => format!("a{count}{}", element.mangle()),
            Self::Tuple(elements) => {
                let inner: String = elements.iter().map(SemanticType::mangle).collect();
                format!("t{}{inner}", elements.len())
            }
            Self::Opaque(name) => format!("o{}{name}", name.len()),
        }
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean => write!(f, "boolean"),
            Self::Integer { bits, signed: true } => write!(f, "int{bits}"),
            Self::Integer { bits, signed: false } => write!(f, "uint{bits}"),
            Self::Float { bits } => write!(f, "float{bits}"),
            Self::Complex { bits } => write!(f, "complex{bits}"),
            Self::UniTuple { element, count } => write!(f, "UniTuple({element} x {count})"),
            Self::Tuple(elements) => {
                write!(f, "Tuple(")?;
                write_list(f, elements)?;
                write!(f, ")")
            }
            Self::Opaque(name) => write!(f, "{name}"),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, types: &[SemanticType]) -> fmt::Result {
    for (i, ty) in types.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{ty}")?;
    }
    Ok(())
}

/// Return type plus argument types of a front-end function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub restype: SemanticType,
    pub argtypes: Vec<SemanticType>,
}

impl Signature {
    pub fn new(restype: SemanticType, argtypes: Vec<SemanticType>) -> Self {
        Self { restype, argtypes }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.restype)?;
        write_list(f, &self.argtypes)?;
        write!(f, ")")
    }
}

impl FromStr for Signature {
    type Err = CompileError;

    fn from_str(s: &str) -> CompileResult<Self> {
        let mut parser = SignatureParser::new(s)?;
        let restype = parser.parse_type()?;
        parser.expect(&Token::LParen)?;
        let argtypes = if parser.eat(&Token::RParen) {
            Vec::new()
        } else {
            let args = parser.parse_type_list()?;
            parser.expect(&Token::RParen)?;
            args
        };
        parser.finish()?;
        Ok(Self { restype, argtypes })
    }
}

impl FromStr for SemanticType {
    type Err = CompileError;

    fn from_str(s: &str) -> CompileResult<Self> {
        let mut parser = SignatureParser::new(s)?;
        let ty = parser.parse_type()?;
        parser.finish()?;
        Ok(ty)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    LParen,
    RParen,
    Comma,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(name) => write!(f, "'{name}'"),
            Token::LParen => write!(f, "'('"),
            Token::RParen => write!(f, "')'"),
            Token::Comma => write!(f, "','"),
        }
    }
}

/// Recursive descent parser over the signature text form.
struct SignatureParser<'a> {
    input: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> SignatureParser<'a> {
    fn new(input: &'a str) -> CompileResult<Self> {
        let mut tokens = Vec::new();
        let mut chars = input.char_indices().peekable();
        while let Some(&(start, c)) = chars.peek() {
            match c {
                '(' => tokens.push(Token::LParen),
                ')' => tokens.push(Token::RParen),
                ',' => tokens.push(Token::Comma),
                c if c.is_whitespace() => {}
                c if c.is_ascii_alphanumeric() || c == '_' => {
                    let mut end = start;
                    while let Some(&(i, c)) = chars.peek() {
                        if !(c.is_ascii_alphanumeric() || c == '_') {
                            break;
                        }
                        end = i + c.len_utf8();
                        chars.next();
                    }
                    tokens.push(Token::Ident(input[start..end].to_string()));
                    continue;
                }
                other => {
                    return Err(CompileError::InvalidSignature {
                        input: input.to_string(),
                        reason: format!("unexpected character '{other}'"),
                    })
                }
            }
            chars.next();
        }
        Ok(Self {
            input,
            tokens,
            pos: 0,
        })
    }

    fn error(&self, reason: impl Into<String>) -> CompileError {
        CompileError::InvalidSignature {
            input: self.input.to_string(),
            reason: reason.into(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> CompileResult<()> {
        if self.eat(token) {
            return Ok(());
        }
        match self.peek() {
            Some(t) => Err(self.error(format!("expected {token}, found {t}"))),
            None => Err(self.error(format!("expected {token}, found end of input"))),
        }
    }

    fn ident(&mut self) -> CompileResult<String> {
        match self.tokens.get(self.pos) {
            Some(Token::Ident(name)) => {
                self.pos += 1;
                Ok(name.clone())
            }
            Some(t) => Err(self.error(format!("expected a type name, found {t}"))),
            None => Err(self.error("expected a type name, found end of input")),
        }
    }

    fn finish(&self) -> CompileResult<()> {
        match self.peek() {
            None => Ok(()),
            Some(t) => Err(self.error(format!("trailing input at {t}"))),
        }
    }

    fn parse_type_list(&mut self) -> CompileResult<Vec<SemanticType>> {
        let mut types = vec![self.parse_type()?];
        while self.eat(&Token::Comma) {
            types.push(self.parse_type()?);
        }
        Ok(types)
    }

    fn parse_type(&mut self) -> CompileResult<SemanticType> {
        let name = self.ident()?;
        match name.as_str() {
            "Tuple" => {
                self.expect(&Token::LParen)?;
                if self.peek() == Some(&Token::RParen) {
                    return Err(self.error("empty tuples are not supported"));
                }
                let elements = self.parse_type_list()?;
                self.expect(&Token::RParen)?;
                Ok(SemanticType::Tuple(elements))
            }
            "UniTuple" => {
                self.expect(&Token::LParen)?;
                let element = self.parse_type()?;
                if !self.eat(&Token::Comma) && !self.eat(&Token::Ident("x".to_string())) {
                    return Err(self.error("expected ',' or 'x' before the tuple length"));
                }
                let count_text = self.ident()?;
                let count: usize = count_text
                    .parse()
                    .map_err(|_| self.error(format!("invalid tuple length '{count_text}'")))?;
                if count == 0 {
                    return Err(self.error("empty tuples are not supported"));
                }
                self.expect(&Token::RParen)?;
                Ok(SemanticType::uni_tuple(element, count))
            }
            leaf => leaf_from_name(leaf).ok_or_else(|| self.error(format!("unknown type '{leaf}'"))),
        }
    }
}

fn leaf_from_name(name: &str) -> Option<SemanticType> {
    if name == "boolean" || name == "bool" {
        return Some(SemanticType::Boolean);
    }
    let width = |prefix: &str| name.strip_prefix(prefix)?.parse::<u32>().ok();
    if let Some(bits) = width("uint") {
        return Some(SemanticType::uint(bits));
    }
    if let Some(bits) = width("int") {
        return Some(SemanticType::int(bits));
    }
    if let Some(bits) = width("float") {
        return Some(SemanticType::float(bits));
    }
    width("complex").map(|bits| SemanticType::Complex { bits })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uni_tuple_signature() {
        let sig: Signature = "UniTuple(int32 x 2)(int32, int32)".parse().unwrap();
        assert_eq!(sig.restype, SemanticType::uni_tuple(SemanticType::int32(), 2));
        assert_eq!(sig.argtypes, vec![SemanticType::int32(), SemanticType::int32()]);

        let comma: Signature = "UniTuple(int32, 2)(int32, int32)".parse().unwrap();
        assert_eq!(sig, comma);
    }

    #[test]
    fn test_parse_heterogeneous_tuple() {
        let sig: Signature = "Tuple(int32, float32)(int32, int32)".parse().unwrap();
        assert_eq!(
            sig.restype,
            SemanticType::Tuple(vec![SemanticType::int32(), SemanticType::float32()])
        );
    }

    #[test]
    fn test_parse_scalar_and_empty_arguments() {
        let sig: Signature = "float64()".parse().unwrap();
        assert_eq!(sig.restype, SemanticType::float64());
        assert!(sig.argtypes.is_empty());

        let sig: Signature = "boolean(uint8, complex64)".parse().unwrap();
        assert_eq!(sig.restype, SemanticType::Boolean);
        assert_eq!(
            sig.argtypes,
            vec![SemanticType::uint(8), SemanticType::Complex { bits: 64 }]
        );
    }

    #[test]
    fn test_display_round_trips() {
        let text = "Tuple(int32, UniTuple(float64 x 3), boolean)(uint16)";
        let sig: Signature = text.parse().unwrap();
        assert_eq!(sig.to_string(), text);
    }

    #[test]
    fn test_invalid_signatures() {
        for bad in [
            "",
            "int32",
            "int32(",
            "int32(int32,)",
            "Tuple()(int32)",
            "UniTuple(int32 x 0)()",
            "UniTuple(int32 y 2)()",
            "str(int32)",
            "int32(int32) extra",
            "int32[](int32)",
        ] {
            let err = bad.parse::<Signature>().unwrap_err();
            assert!(
                matches!(err, CompileError::InvalidSignature { .. }),
                "{bad}: {err}"
            );
        }
    }

    #[test]
    fn test_return_arity() {
        assert_eq!(SemanticType::int32().return_arity(), 1);
        assert_eq!(SemanticType::Complex { bits: 128 }.return_arity(), 1);
        assert_eq!(
            SemanticType::uni_tuple(SemanticType::float32(), 4).return_arity(),
            4
        );
        let tuple = SemanticType::Tuple(vec![SemanticType::Boolean, SemanticType::int(64)]);
        assert_eq!(tuple.return_arity(), 2);
        assert_eq!(
            tuple.tuple_elements().unwrap(),
            vec![&SemanticType::Boolean, &SemanticType::int(64)]
        );
        assert!(SemanticType::int32().tuple_elements().is_none());
    }

    #[test]
    fn test_mangle_codes() {
        assert_eq!(SemanticType::int32().mangle(), "i32");
        assert_eq!(SemanticType::uint(8).mangle(), "u8");
        assert_eq!(
            SemanticType::uni_tuple(SemanticType::int32(), 2).mangle(),
            "a2i32"
        );
        assert_eq!(
            SemanticType::Tuple(vec![SemanticType::int32(), SemanticType::float32()]).mangle(),
            "t2i32f32"
        );
    }
}
