//! Parser for the textual debug-info format: the `.debug_line` address→line
//! pairs, the `.debug_info` DIE tree and the `.debug_source` original
//! source. All three sections are optional; whatever is present is parsed
//! once, at attach time.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use log::warn;
use logos::Logos;

use tau_core::parse::section;

use crate::source::die::{DebugInfo, Function, Scope, Variable};
use crate::source::line_map::LineMap;
use crate::source::location::{LocOp, Location};
use crate::source::source_file::SourceFile;
use crate::source::types::{PrimitiveKind, StructMember, Type, TypeId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugInfoParseError {
    pub message: String,
}

impl fmt::Display for DebugInfoParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "debug info: {}", self.message)
    }
}

type Result<T> = std::result::Result<T, DebugInfoParseError>;

fn err<T>(message: impl Into<String>) -> Result<T> {
    Err(DebugInfoParseError {
        message: message.into(),
    })
}

/// Everything the debug-info sections of a listing contained.
#[derive(Debug, Default)]
pub struct DebuggingInfo {
    pub line_map: Option<LineMap>,
    pub info: Option<DebugInfo>,
    pub source: Option<SourceFile>,
}

/// Parses the debug-info sections of a program listing. Sections that are
/// absent simply stay `None`.
pub fn parse_debug_info(src: &str) -> Result<DebuggingInfo> {
    let mut out = DebuggingInfo::default();
    if let Some(body) = section(src, ".debug_line") {
        out.line_map = Some(parse_line_section(body)?);
    }
    if let Some(body) = section(src, ".debug_info") {
        out.info = Some(parse_info_section(body)?);
    }
    if let Some(body) = section(src, ".debug_source") {
        out.source = Some(SourceFile::new(body));
    }
    Ok(out)
}

/// `.debug_line` is a stream of `addr: line` pairs. Newlines are not
/// significant, which also accepts the layout with the line numbers in a
/// separate block from the addresses.
fn parse_line_section(body: &str) -> Result<LineMap> {
    let mut numbers = Vec::new();
    let mut colons = 0usize;
    for token in body.split_whitespace() {
        for piece in token.split_inclusive(':') {
            let (digits, colon) = match piece.strip_suffix(':') {
                Some(d) => (d, true),
                None => (piece, false),
            };
            if !digits.is_empty() {
                let n: u64 = match digits.parse() {
                    Ok(n) => n,
                    Err(_) => return err(format!("expected a number in .debug_line, got '{}'", digits)),
                };
                numbers.push(n);
            }
            if colon {
                colons += 1;
            }
        }
    }
    if numbers.len() % 2 != 0 || colons != numbers.len() / 2 {
        return err("malformed .debug_line, expected 'addr: line' pairs");
    }
    Ok(LineMap::new(
        numbers.chunks_exact(2).map(|pair| (pair[0], pair[1])),
    ))
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
enum DTok {
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_owned())]
    Ident(String),

    #[regex(r"-?[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),

    #[regex(r#""[^"]*""#, |lex| { let s = lex.slice(); s[1..s.len() - 1].to_owned() })]
    Str(String),

    #[regex(r"`[^`]*`", |lex| { let s = lex.slice(); s[1..s.len() - 1].to_owned() })]
    LocStr(String),

    #[token("{")]
    LBrace,

    #[token("}")]
    RBrace,

    #[token("[")]
    LBracket,

    #[token("]")]
    RBracket,

    #[token(":")]
    Colon,

    #[token(",")]
    Comma,

    #[token(";")]
    Semi,
}

/// Attribute values before lowering into the typed model.
#[derive(Debug, Clone, PartialEq)]
enum Value {
    Int(i64),
    Str(String),
    Members(Vec<StructMember>),
    Loc(Vec<LocOp>),
}

#[derive(Debug, Default)]
struct RawDie {
    tag: String,
    attrs: Vec<(String, Value)>,
    children: Vec<RawDie>,
}

impl RawDie {
    fn attr(&self, name: &str) -> Option<&Value> {
        self.attrs.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    fn int_attr(&self, name: &str) -> Result<i64> {
        match self.attr(name) {
            Some(Value::Int(v)) => Ok(*v),
            _ => err(format!("DIE_{} is missing ATTR_{}", self.tag, name)),
        }
    }

    fn unsigned_attr(&self, name: &str) -> Result<u64> {
        let v = self.int_attr(name)?;
        u64::try_from(v)
            .map_err(|_| DebugInfoParseError {
                message: format!("ATTR_{} of DIE_{} must not be negative", name, self.tag),
            })
    }

    fn str_attr(&self, name: &str) -> Result<&str> {
        match self.attr(name) {
            Some(Value::Str(v)) => Ok(v),
            _ => err(format!("DIE_{} is missing ATTR_{}", self.tag, name)),
        }
    }
}

struct InfoParser {
    tokens: std::iter::Peekable<std::vec::IntoIter<DTok>>,
}

fn parse_info_section(body: &str) -> Result<DebugInfo> {
    let mut tokens = Vec::new();
    let mut lexer = DTok::lexer(body);
    while let Some(tok) = lexer.next() {
        match tok {
            Ok(t) => tokens.push(t),
            Err(()) => return err(format!("unexpected character near '{}'", lexer.slice())),
        }
    }
    let mut parser = InfoParser {
        tokens: tokens.into_iter().peekable(),
    };
    let top = parser.die()?;
    if parser.tokens.next().is_some() {
        return err("trailing input after the top-level DIE");
    }
    if top.tag != "compilation_unit" {
        return err(format!("expected DIE_compilation_unit, got DIE_{}", top.tag));
    }
    lower_compilation_unit(&top)
}

impl InfoParser {
    fn next(&mut self) -> Result<DTok> {
        match self.tokens.next() {
            Some(t) => Ok(t),
            None => err("unexpected end of .debug_info"),
        }
    }

    fn expect(&mut self, tok: &DTok) -> Result<()> {
        let got = self.next()?;
        if got == *tok {
            Ok(())
        } else {
            err(format!("expected {:?}, got {:?}", tok, got))
        }
    }

    /// `DIE_<tag>: { entries }` where entries are attributes and child DIEs
    /// separated by (optional, trailing allowed) commas.
    fn die(&mut self) -> Result<RawDie> {
        let tag = match self.next()? {
            DTok::Ident(name) => match name.strip_prefix("DIE_") {
                Some(tag) => tag.to_string(),
                None => return err(format!("expected a DIE_ tag, got '{}'", name)),
            },
            t => return err(format!("expected a DIE_ tag, got {:?}", t)),
        };
        self.expect(&DTok::Colon)?;
        self.expect(&DTok::LBrace)?;
        let mut die = RawDie {
            tag,
            ..RawDie::default()
        };
        loop {
            match self.tokens.peek() {
                Some(DTok::RBrace) => {
                    self.tokens.next();
                    break;
                }
                Some(DTok::Comma) => {
                    self.tokens.next();
                }
                Some(DTok::Ident(name)) if name.starts_with("DIE_") => {
                    die.children.push(self.die()?);
                }
                Some(DTok::Ident(name)) if name.starts_with("ATTR_") => {
                    let attr = name["ATTR_".len()..].to_string();
                    self.tokens.next();
                    self.expect(&DTok::Colon)?;
                    let value = self.value()?;
                    die.attrs.push((attr, value));
                }
                Some(t) => return err(format!("unexpected {:?} inside DIE_{}", t, die.tag)),
                None => return err(format!("unterminated DIE_{}", die.tag)),
            }
        }
        Ok(die)
    }

    fn value(&mut self) -> Result<Value> {
        match self.next()? {
            DTok::Int(v) => Ok(Value::Int(v)),
            DTok::Str(s) | DTok::Ident(s) => Ok(Value::Str(s)),
            DTok::LocStr(s) => Ok(Value::Loc(parse_loc_text(&s)?)),
            DTok::LBracket => self.loc_list(),
            DTok::LBrace => self.members(),
            t => err(format!("unexpected {:?} as an attribute value", t)),
        }
    }

    /// `{ offset: { type_id: name }, ... }`
    fn members(&mut self) -> Result<Value> {
        let mut members = Vec::new();
        loop {
            match self.next()? {
                DTok::RBrace => break,
                DTok::Comma => {}
                DTok::Int(offset) => {
                    self.expect(&DTok::Colon)?;
                    self.expect(&DTok::LBrace)?;
                    let type_id = match self.next()? {
                        DTok::Int(id) if id >= 0 => id as TypeId,
                        t => return err(format!("expected a member type id, got {:?}", t)),
                    };
                    self.expect(&DTok::Colon)?;
                    let name = match self.next()? {
                        DTok::Ident(n) | DTok::Str(n) => n,
                        t => return err(format!("expected a member name, got {:?}", t)),
                    };
                    self.expect(&DTok::RBrace)?;
                    members.push(StructMember {
                        name,
                        type_id,
                        offset,
                    });
                }
                t => return err(format!("unexpected {:?} in ATTR_members", t)),
            }
        }
        Ok(Value::Members(members))
    }

    /// `[PUSH SP; PUSH -2; ADD]`
    fn loc_list(&mut self) -> Result<Value> {
        let mut words: Vec<String> = Vec::new();
        let mut ops = Vec::new();
        loop {
            match self.next()? {
                DTok::RBracket => {
                    if !words.is_empty() {
                        ops.push(loc_op_from_words(&words)?);
                    }
                    break;
                }
                DTok::Semi => {
                    if !words.is_empty() {
                        ops.push(loc_op_from_words(&words)?);
                        words.clear();
                    }
                }
                DTok::Ident(w) => words.push(w),
                DTok::Int(v) => words.push(v.to_string()),
                t => return err(format!("unexpected {:?} in a location program", t)),
            }
        }
        Ok(Value::Loc(ops))
    }
}

/// Backtick form: one or more opcodes separated by semicolons, possibly
/// empty (a variable the compiler gave no location).
fn parse_loc_text(text: &str) -> Result<Vec<LocOp>> {
    let mut ops = Vec::new();
    for chunk in text.split(';') {
        let words: Vec<String> = chunk.split_whitespace().map(str::to_owned).collect();
        if words.is_empty() {
            continue;
        }
        ops.push(loc_op_from_words(&words)?);
    }
    Ok(ops)
}

fn loc_op_from_words(words: &[String]) -> Result<LocOp> {
    match words[0].as_str() {
        "PUSH" => {
            let Some(operand) = words.get(1) else {
                return err("PUSH needs an operand");
            };
            let loc = match operand.parse::<i64>() {
                Ok(v) => Location::Offset(v),
                Err(_) => Location::Register(operand.clone()),
            };
            Ok(LocOp::Push(loc))
        }
        "ADD" => Ok(LocOp::Add),
        "BASE_REG_OFFSET" => {
            let Some(k) = words.get(1).and_then(|w| w.parse::<i64>().ok()) else {
                return err("BASE_REG_OFFSET needs an integer operand");
            };
            Ok(LocOp::FrameBaseRegisterOffset(k))
        }
        "DEREF" => Ok(LocOp::Dereference),
        other => err(format!("unknown location opcode '{}'", other)),
    }
}

fn lower_compilation_unit(top: &RawDie) -> Result<DebugInfo> {
    let mut info = DebugInfo {
        functions: Vec::new(),
        types: HashMap::new(),
    };
    for child in &top.children {
        match child.tag.as_str() {
            "primitive_type" => {
                let kind = PrimitiveKind::from_str(child.str_attr("name")?).map_err(|_| {
                    DebugInfoParseError {
                        message: format!(
                            "'{}' is not a primitive type name",
                            child.str_attr("name").unwrap_or_default()
                        ),
                    }
                })?;
                let id = child.unsigned_attr("id")? as TypeId;
                info.types.insert(
                    id,
                    Type::Primitive {
                        kind,
                        size: child.unsigned_attr("size")?,
                    },
                );
            }
            "pointer_type" => {
                let id = child.unsigned_attr("id")? as TypeId;
                info.types.insert(
                    id,
                    Type::Pointer {
                        pointee: child.unsigned_attr("type")? as TypeId,
                        size: child.unsigned_attr("size")?,
                    },
                );
            }
            "array_type" => {
                let id = child.unsigned_attr("id")? as TypeId;
                info.types.insert(
                    id,
                    Type::Array {
                        element: child.unsigned_attr("type")? as TypeId,
                        count: child.unsigned_attr("count")?,
                    },
                );
            }
            "structured_type" => {
                let id = child.unsigned_attr("id")? as TypeId;
                let members = match child.attr("members") {
                    Some(Value::Members(m)) => m.clone(),
                    _ => Vec::new(),
                };
                info.types.insert(
                    id,
                    Type::Structured {
                        name: child.str_attr("name")?.to_string(),
                        size: child.unsigned_attr("size")?,
                        members,
                    },
                );
            }
            "function" => info.functions.push(lower_function(child)?),
            other => warn!("skipping unknown DIE_{}", other),
        }
    }
    Ok(info)
}

fn lower_function(die: &RawDie) -> Result<Function> {
    let scope = die
        .children
        .iter()
        .find(|c| c.tag == "scope")
        .map(lower_scope)
        .transpose()?;
    Ok(Function {
        name: die.str_attr("name")?.to_string(),
        begin: die.unsigned_attr("begin_addr")?,
        end: die.unsigned_attr("end_addr")?,
        scope,
    })
}

fn lower_scope(die: &RawDie) -> Result<Scope> {
    let mut variables = Vec::new();
    let mut scopes = Vec::new();
    for child in &die.children {
        match child.tag.as_str() {
            "variable" => variables.push(lower_variable(child)?),
            "scope" => scopes.push(lower_scope(child)?),
            other => warn!("skipping unknown DIE_{} inside a scope", other),
        }
    }
    Ok(Scope {
        begin: die.unsigned_attr("begin_addr")?,
        end: die.unsigned_attr("end_addr")?,
        variables,
        scopes,
    })
}

fn lower_variable(die: &RawDie) -> Result<Variable> {
    let type_id = match die.attr("type") {
        Some(Value::Int(v)) if *v >= 0 => Some(*v as TypeId),
        _ => None,
    };
    let location = match die.attr("location") {
        Some(Value::Loc(ops)) => ops.clone(),
        _ => Vec::new(),
    };
    Ok(Variable {
        name: die.str_attr("name")?.to_string(),
        type_id,
        location,
    })
}
