//! `.proto` text to `FileDescriptorProto`
//!
//! A small tokenizer and recursive-descent parser covering the subset of
//! the language that registry schemas use: `syntax`, `package`, `import`,
//! messages and enums (nested to any depth), `optional`/`required`/`repeated`
//! labels, `map<K, V>` fields, `oneof` groups and field options. Services,
//! extensions, `reserved` statements and file/message options are accepted
//! and skipped.
//!
//! Parsing happens in two steps. The text is first read into a syntax tree
//! with type references kept as written; references are then resolved to
//! fully-qualified names using protobuf scoping, against the types declared
//! in the file and those already present in the target pool.

use std::collections::HashMap;

use prost_reflect::DescriptorPool;
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, EnumDescriptorProto, EnumOptions, EnumValueDescriptorProto,
    FieldDescriptorProto, FileDescriptorProto, MessageOptions, OneofDescriptorProto,
};

use super::{ProtobufError, ProtobufResult};

/// Name given to the parsed file inside its pool.
pub const FILE_NAME: &str = "schema.proto";

/// Parse `.proto` text, resolving type references against `pool`.
///
/// The pool is only read; the caller adds the returned file to it.
pub fn parse(source: &str, pool: &DescriptorPool) -> ProtobufResult<FileDescriptorProto> {
    let tokens = Lexer::new(source).tokenize()?;
    let file = Parser::new(tokens).file()?;

    for import in &file.imports {
        if pool.get_file_by_name(&import.path).is_none() {
            return Err(ProtobufError::UnresolvedImport(import.path.clone()));
        }
    }

    file.into_descriptor(pool)
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Number(String),
    Str(String),
    Sym(char),
}

impl std::fmt::Display for Tok {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tok::Ident(s) | Tok::Number(s) => write!(f, "'{}'", s),
            Tok::Str(s) => write!(f, "\"{}\"", s),
            Tok::Sym(c) => write!(f, "'{}'", c),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    line: usize,
    column: usize,
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn error(&self, line: usize, column: usize, message: impl Into<String>) -> ProtobufError {
        ProtobufError::Parse {
            line,
            column,
            message: message.into(),
        }
    }

    fn tokenize(mut self) -> ProtobufResult<Vec<Token>> {
        let mut tokens = Vec::new();

        while let Some(c) = self.peek() {
            let (line, column) = (self.line, self.column);

            if c.is_whitespace() {
                self.bump();
                continue;
            }

            if c == '/' && self.peek_at(1) == Some('/') {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.bump();
                }
                continue;
            }

            if c == '/' && self.peek_at(1) == Some('*') {
                self.bump();
                self.bump();
                loop {
                    match self.bump() {
                        Some('*') if self.peek() == Some('/') => {
                            self.bump();
                            break;
                        }
                        Some(_) => {}
                        None => return Err(self.error(line, column, "unterminated comment")),
                    }
                }
                continue;
            }

            let tok = if c.is_ascii_alphabetic() || c == '_' {
                let mut ident = String::new();
                while let Some(c) = self.peek().filter(|c| c.is_ascii_alphanumeric() || *c == '_') {
                    ident.push(c);
                    self.bump();
                }
                Tok::Ident(ident)
            } else if c.is_ascii_digit()
                || (c == '.' && self.peek_at(1).is_some_and(|n| n.is_ascii_digit()))
            {
                Tok::Number(self.number())
            } else if c == '"' || c == '\'' {
                Tok::Str(self.string(line, column)?)
            } else {
                self.bump();
                Tok::Sym(c)
            };

            tokens.push(Token { tok, line, column });
        }

        Ok(tokens)
    }

    fn number(&mut self) -> String {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            let exponent_sign = (c == '+' || c == '-')
                && matches!(text.chars().last(), Some('e' | 'E'))
                && !text.starts_with("0x")
                && !text.starts_with("0X");
            if c.is_ascii_alphanumeric() || c == '.' || exponent_sign {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }
        text
    }

    fn string(&mut self, line: usize, column: usize) -> ProtobufResult<String> {
        let quote = self.bump();
        let mut value = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => return Err(self.error(line, column, "unterminated string")),
                Some(c) if Some(c) == quote => return Ok(value),
                Some('\\') => match self.bump() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('r') => value.push('\r'),
                    Some('0') => value.push('\0'),
                    Some(c) => value.push(c),
                    None => return Err(self.error(line, column, "unterminated string")),
                },
                Some(c) => value.push(c),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Syntax tree
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Syntax {
    Proto2,
    Proto3,
}

impl Syntax {
    fn as_str(&self) -> &'static str {
        match self {
            Syntax::Proto2 => "proto2",
            Syntax::Proto3 => "proto3",
        }
    }
}

#[derive(Debug)]
struct Import {
    path: String,
}

#[derive(Debug)]
struct ProtoFile {
    syntax: Syntax,
    package: Option<String>,
    imports: Vec<Import>,
    messages: Vec<MessageDef>,
    enums: Vec<EnumDef>,
}

#[derive(Debug, Default)]
struct MessageDef {
    name: String,
    fields: Vec<FieldDef>,
    messages: Vec<MessageDef>,
    enums: Vec<EnumDef>,
    oneofs: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldLabel {
    None,
    Optional,
    Required,
    Repeated,
}

#[derive(Debug)]
struct FieldDef {
    name: String,
    number: i32,
    label: FieldLabel,
    type_name: String,
    /// Key and value type for `map<K, V>` fields
    map: Option<(String, String)>,
    oneof_index: Option<i32>,
    json_name: Option<String>,
    default_value: Option<String>,
    line: usize,
    column: usize,
}

#[derive(Debug, Default)]
struct EnumDef {
    name: String,
    values: Vec<(String, i32)>,
    allow_alias: bool,
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|t| &t.tok)
    }

    fn peek_at(&self, offset: usize) -> Option<&Tok> {
        self.tokens.get(self.pos + offset).map(|t| &t.tok)
    }

    fn position(&self) -> (usize, usize) {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| (t.line, t.column))
            .unwrap_or((1, 1))
    }

    fn error(&self, message: impl Into<String>) -> ProtobufError {
        let (line, column) = self.position();
        ProtobufError::Parse {
            line,
            column,
            message: message.into(),
        }
    }

    fn next(&mut self) -> ProtobufResult<Tok> {
        let tok = self
            .tokens
            .get(self.pos)
            .map(|t| t.tok.clone())
            .ok_or_else(|| self.error("unexpected end of input"))?;
        self.pos += 1;
        Ok(tok)
    }

    fn is_ident(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Tok::Ident(s)) if s == keyword)
    }

    fn is_sym(&self, c: char) -> bool {
        self.peek() == Some(&Tok::Sym(c))
    }

    fn eat_sym(&mut self, c: char) -> bool {
        if self.is_sym(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_sym(&mut self, c: char) -> ProtobufResult<()> {
        match self.peek() {
            Some(Tok::Sym(s)) if *s == c => {
                self.pos += 1;
                Ok(())
            }
            Some(other) => Err(self.error(format!("expected '{}', found {}", c, other))),
            None => Err(self.error(format!("expected '{}', found end of input", c))),
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> ProtobufResult<()> {
        if self.is_ident(keyword) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", keyword)))
        }
    }

    fn ident(&mut self) -> ProtobufResult<String> {
        match self.peek() {
            Some(Tok::Ident(s)) => {
                let s = s.clone();
                self.pos += 1;
                Ok(s)
            }
            Some(other) => Err(self.error(format!("expected identifier, found {}", other))),
            None => Err(self.error("expected identifier, found end of input")),
        }
    }

    /// `.a.b.C`, `a.b.C` or `C`
    fn full_ident(&mut self) -> ProtobufResult<String> {
        let mut name = String::new();
        if self.eat_sym('.') {
            name.push('.');
        }
        name.push_str(&self.ident()?);
        while self.is_sym('.') {
            self.pos += 1;
            name.push('.');
            name.push_str(&self.ident()?);
        }
        Ok(name)
    }

    /// One or more adjacent string literals, concatenated.
    fn string(&mut self) -> ProtobufResult<String> {
        let mut value = match self.next()? {
            Tok::Str(s) => s,
            other => {
                self.pos -= 1;
                return Err(self.error(format!("expected string, found {}", other)));
            }
        };
        while let Some(Tok::Str(s)) = self.peek() {
            value.push_str(s);
            self.pos += 1;
        }
        Ok(value)
    }

    fn int(&mut self) -> ProtobufResult<i64> {
        let negative = self.eat_sym('-');
        let text = match self.next()? {
            Tok::Number(n) => n,
            other => {
                self.pos -= 1;
                return Err(self.error(format!("expected integer, found {}", other)));
            }
        };
        let magnitude = parse_int_literal(&text).ok_or_else(|| {
            self.pos -= 1;
            self.error(format!("invalid integer '{}'", text))
        })?;
        Ok(if negative { -magnitude } else { magnitude })
    }

    fn int32(&mut self) -> ProtobufResult<i32> {
        let value = self.int()?;
        i32::try_from(value).map_err(|_| self.error(format!("{} is out of range", value)))
    }

    /// Tokens up to the terminating `;`, with brace/bracket nesting respected.
    fn statement_tokens(&mut self) -> ProtobufResult<Vec<Tok>> {
        let mut depth = 0usize;
        let mut tokens = Vec::new();
        loop {
            let tok = self.next()?;
            match tok {
                Tok::Sym('{') | Tok::Sym('(') | Tok::Sym('[') | Tok::Sym('<') => depth += 1,
                Tok::Sym('}') | Tok::Sym(')') | Tok::Sym(']') | Tok::Sym('>') => {
                    depth = depth.saturating_sub(1)
                }
                Tok::Sym(';') if depth == 0 => return Ok(tokens),
                _ => {}
            }
            tokens.push(tok);
        }
    }

    /// Skip tokens up to and including the block that closes a statement
    /// such as `service X { ... }`.
    fn skip_block_statement(&mut self) -> ProtobufResult<()> {
        while !self.is_sym('{') {
            self.next()?;
        }
        let mut depth = 0usize;
        loop {
            match self.next()? {
                Tok::Sym('{') => depth += 1,
                Tok::Sym('}') => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                _ => {}
            }
        }
    }

    fn file(&mut self) -> ProtobufResult<ProtoFile> {
        let mut file = ProtoFile {
            syntax: Syntax::Proto2,
            package: None,
            imports: Vec::new(),
            messages: Vec::new(),
            enums: Vec::new(),
        };
        let mut saw_syntax = false;

        while let Some(tok) = self.peek() {
            match tok {
                Tok::Sym(';') => self.pos += 1,
                Tok::Ident(kw) => match kw.as_str() {
                    "syntax" => {
                        self.pos += 1;
                        self.expect_sym('=')?;
                        file.syntax = match self.string()?.as_str() {
                            "proto2" => Syntax::Proto2,
                            "proto3" => Syntax::Proto3,
                            other => {
                                return Err(self.error(format!("unsupported syntax '{}'", other)))
                            }
                        };
                        self.expect_sym(';')?;
                        saw_syntax = true;
                    }
                    "edition" => return Err(self.error("protobuf editions are not supported")),
                    "package" => {
                        self.pos += 1;
                        file.package = Some(self.full_ident()?);
                        self.expect_sym(';')?;
                    }
                    "import" => {
                        self.pos += 1;
                        if self.is_ident("public") || self.is_ident("weak") {
                            self.pos += 1;
                        }
                        let path = self.string()?;
                        self.expect_sym(';')?;
                        file.imports.push(Import { path });
                    }
                    "option" => {
                        self.pos += 1;
                        self.statement_tokens()?;
                    }
                    "message" => file.messages.push(self.message()?),
                    "enum" => file.enums.push(self.enumeration()?),
                    "service" | "extend" => self.skip_block_statement()?,
                    other => {
                        return Err(self.error(format!("unexpected '{}' at top level", other)))
                    }
                },
                other => return Err(self.error(format!("unexpected {} at top level", other))),
            }
        }

        if !saw_syntax {
            tracing::debug!("No syntax statement, assuming proto2");
        }
        Ok(file)
    }

    fn message(&mut self) -> ProtobufResult<MessageDef> {
        self.expect_keyword("message")?;
        let mut message = MessageDef {
            name: self.ident()?,
            ..Default::default()
        };
        self.expect_sym('{')?;

        loop {
            match self.peek() {
                None => return Err(self.error("unterminated message")),
                Some(Tok::Sym('}')) => {
                    self.pos += 1;
                    break;
                }
                Some(Tok::Sym(';')) => self.pos += 1,
                Some(Tok::Ident(kw)) => match kw.as_str() {
                    "message" => {
                        let nested = self.message()?;
                        message.messages.push(nested);
                    }
                    "enum" => {
                        let nested = self.enumeration()?;
                        message.enums.push(nested);
                    }
                    "option" | "reserved" | "extensions" => {
                        self.pos += 1;
                        self.statement_tokens()?;
                    }
                    "extend" => self.skip_block_statement()?,
                    "oneof" => {
                        self.pos += 1;
                        let name = self.ident()?;
                        let index = i32::try_from(message.oneofs.len())
                            .map_err(|_| self.error("too many oneofs"))?;
                        message.oneofs.push(name);
                        self.expect_sym('{')?;
                        while !self.eat_sym('}') {
                            if self.eat_sym(';') {
                                continue;
                            }
                            if self.is_ident("option") {
                                self.pos += 1;
                                self.statement_tokens()?;
                                continue;
                            }
                            let field = self.field(Some(index))?;
                            message.fields.push(field);
                        }
                    }
                    _ => {
                        let field = self.field(None)?;
                        message.fields.push(field);
                    }
                },
                // fully-qualified type, e.g. `.pkg.Row after = 2;`
                Some(Tok::Sym('.')) => {
                    let field = self.field(None)?;
                    message.fields.push(field);
                }
                Some(other) => {
                    return Err(self.error(format!("unexpected {} in message body", other)))
                }
            }
        }

        Ok(message)
    }

    fn field(&mut self, oneof_index: Option<i32>) -> ProtobufResult<FieldDef> {
        let (line, column) = self.position();

        let label = match self.peek() {
            Some(Tok::Ident(kw)) if kw == "optional" => FieldLabel::Optional,
            Some(Tok::Ident(kw)) if kw == "required" => FieldLabel::Required,
            Some(Tok::Ident(kw)) if kw == "repeated" => FieldLabel::Repeated,
            _ => FieldLabel::None,
        };
        if label != FieldLabel::None {
            if oneof_index.is_some() {
                return Err(self.error("oneof fields cannot have a label"));
            }
            self.pos += 1;
        }

        if self.is_ident("group") {
            return Err(self.error("groups are not supported"));
        }

        let map = if self.is_ident("map") && self.peek_at(1) == Some(&Tok::Sym('<')) {
            if label != FieldLabel::None || oneof_index.is_some() {
                return Err(self.error("map fields cannot have a label or be in a oneof"));
            }
            self.pos += 2;
            let key = self.full_ident()?;
            self.expect_sym(',')?;
            let value = self.full_ident()?;
            self.expect_sym('>')?;
            Some((key, value))
        } else {
            None
        };

        let type_name = match &map {
            Some(_) => String::new(),
            None => self.full_ident()?,
        };
        let name = self.ident()?;
        self.expect_sym('=')?;
        let number = self.int32()?;

        let mut field = FieldDef {
            name,
            number,
            label,
            type_name,
            map,
            oneof_index,
            json_name: None,
            default_value: None,
            line,
            column,
        };

        if self.eat_sym('[') {
            self.field_options(&mut field)?;
        }
        self.expect_sym(';')?;
        Ok(field)
    }

    /// `[name = value, ...]`; only `json_name` and `default` are kept.
    fn field_options(&mut self, field: &mut FieldDef) -> ProtobufResult<()> {
        loop {
            let mut name = String::new();
            while !self.is_sym('=') {
                match self.next()? {
                    Tok::Ident(s) => name.push_str(&s),
                    Tok::Sym(c) => name.push(c),
                    other => return Err(self.error(format!("unexpected {} in option name", other))),
                }
            }
            self.expect_sym('=')?;

            let mut value = Vec::new();
            let mut depth = 0usize;
            loop {
                match self.peek() {
                    Some(Tok::Sym(',')) | Some(Tok::Sym(']')) if depth == 0 => break,
                    Some(Tok::Sym('{')) => depth += 1,
                    Some(Tok::Sym('}')) => depth = depth.saturating_sub(1),
                    None => return Err(self.error("unterminated field options")),
                    _ => {}
                }
                value.push(self.next()?);
            }

            match (name.as_str(), value.as_slice()) {
                ("json_name", [Tok::Str(s)]) => field.json_name = Some(s.clone()),
                ("default", [Tok::Str(s)]) => field.default_value = Some(s.clone()),
                ("default", [Tok::Ident(s)]) | ("default", [Tok::Number(s)]) => {
                    field.default_value = Some(s.clone())
                }
                ("default", [Tok::Sym('-'), Tok::Number(s)])
                | ("default", [Tok::Sym('-'), Tok::Ident(s)]) => {
                    field.default_value = Some(format!("-{}", s))
                }
                _ => {}
            }

            if self.eat_sym(']') {
                return Ok(());
            }
            self.expect_sym(',')?;
        }
    }

    fn enumeration(&mut self) -> ProtobufResult<EnumDef> {
        self.expect_keyword("enum")?;
        let mut def = EnumDef {
            name: self.ident()?,
            ..Default::default()
        };
        self.expect_sym('{')?;

        loop {
            match self.peek() {
                None => return Err(self.error("unterminated enum")),
                Some(Tok::Sym('}')) => {
                    self.pos += 1;
                    break;
                }
                Some(Tok::Sym(';')) => self.pos += 1,
                Some(Tok::Ident(kw)) if kw == "option" => {
                    self.pos += 1;
                    let tokens = self.statement_tokens()?;
                    if let [Tok::Ident(name), Tok::Sym('='), Tok::Ident(value)] = tokens.as_slice() {
                        if name == "allow_alias" {
                            def.allow_alias = value == "true";
                        }
                    }
                }
                Some(Tok::Ident(kw)) if kw == "reserved" => {
                    self.pos += 1;
                    self.statement_tokens()?;
                }
                Some(Tok::Ident(_)) => {
                    let name = self.ident()?;
                    self.expect_sym('=')?;
                    let number = self.int32()?;
                    if self.is_sym('[') {
                        self.statement_tokens()?;
                    } else {
                        self.expect_sym(';')?;
                    }
                    def.values.push((name, number));
                }
                Some(other) => return Err(self.error(format!("unexpected {} in enum body", other))),
            }
        }

        Ok(def)
    }
}

/// Decimal, `0x` hexadecimal or leading-zero octal.
fn parse_int_literal(text: &str) -> Option<i64> {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()
    } else if text.len() > 1 && text.starts_with('0') {
        i64::from_str_radix(&text[1..], 8).ok()
    } else {
        text.parse().ok()
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SymbolKind {
    Message,
    Enum,
}

struct Symbols<'a> {
    local: HashMap<String, SymbolKind>,
    pool: &'a DescriptorPool,
}

impl<'a> Symbols<'a> {
    fn collect(file: &ProtoFile, pool: &'a DescriptorPool) -> Self {
        fn walk(messages: &[MessageDef], enums: &[EnumDef], scope: &str, out: &mut HashMap<String, SymbolKind>) {
            for e in enums {
                out.insert(qualify(scope, &e.name), SymbolKind::Enum);
            }
            for m in messages {
                let name = qualify(scope, &m.name);
                walk(&m.messages, &m.enums, &name, out);
                out.insert(name, SymbolKind::Message);
            }
        }

        let mut local = HashMap::new();
        walk(
            &file.messages,
            &file.enums,
            file.package.as_deref().unwrap_or(""),
            &mut local,
        );
        Self { local, pool }
    }

    fn lookup(&self, full_name: &str) -> Option<SymbolKind> {
        if let Some(kind) = self.local.get(full_name) {
            return Some(*kind);
        }
        if self.pool.get_message_by_name(full_name).is_some() {
            Some(SymbolKind::Message)
        } else if self.pool.get_enum_by_name(full_name).is_some() {
            Some(SymbolKind::Enum)
        } else {
            None
        }
    }

    /// Resolve `name` as written inside `scope`, innermost scope first.
    fn resolve(&self, name: &str, scope: &str) -> Option<(String, SymbolKind)> {
        if let Some(absolute) = name.strip_prefix('.') {
            return self.lookup(absolute).map(|k| (absolute.to_string(), k));
        }
        let mut scope = scope;
        loop {
            let candidate = qualify(scope, name);
            if let Some(kind) = self.lookup(&candidate) {
                return Some((candidate, kind));
            }
            if scope.is_empty() {
                return None;
            }
            scope = scope.rfind('.').map(|i| &scope[..i]).unwrap_or("");
        }
    }
}

fn qualify(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", scope, name)
    }
}

fn scalar_type(name: &str) -> Option<Type> {
    Some(match name {
        "double" => Type::Double,
        "float" => Type::Float,
        "int32" => Type::Int32,
        "int64" => Type::Int64,
        "uint32" => Type::Uint32,
        "uint64" => Type::Uint64,
        "sint32" => Type::Sint32,
        "sint64" => Type::Sint64,
        "fixed32" => Type::Fixed32,
        "fixed64" => Type::Fixed64,
        "sfixed32" => Type::Sfixed32,
        "sfixed64" => Type::Sfixed64,
        "bool" => Type::Bool,
        "string" => Type::String,
        "bytes" => Type::Bytes,
        _ => return None,
    })
}

/// Default JSON name: underscores dropped, the following letter upper-cased.
pub fn json_name(field_name: &str) -> String {
    let mut result = String::with_capacity(field_name.len());
    let mut capitalize_next = false;
    for c in field_name.chars() {
        if c == '_' {
            capitalize_next = true;
        } else if capitalize_next {
            result.extend(c.to_uppercase());
            capitalize_next = false;
        } else {
            result.push(c);
        }
    }
    result
}

/// `foo_bar` becomes `FooBarEntry`.
fn map_entry_name(field_name: &str) -> String {
    let mut result = String::with_capacity(field_name.len() + 5);
    let mut capitalize_next = true;
    for c in field_name.chars() {
        if c == '_' {
            capitalize_next = true;
        } else if capitalize_next {
            result.extend(c.to_uppercase());
            capitalize_next = false;
        } else {
            result.push(c);
        }
    }
    result.push_str("Entry");
    result
}

impl ProtoFile {
    fn into_descriptor(self, pool: &DescriptorPool) -> ProtobufResult<FileDescriptorProto> {
        let symbols = Symbols::collect(&self, pool);
        let scope = self.package.clone().unwrap_or_default();

        let message_type = self
            .messages
            .iter()
            .map(|m| m.to_descriptor(&qualify(&scope, &m.name), self.syntax, &symbols))
            .collect::<ProtobufResult<Vec<_>>>()?;

        Ok(FileDescriptorProto {
            name: Some(FILE_NAME.to_string()),
            package: self.package,
            dependency: self.imports.into_iter().map(|i| i.path).collect(),
            message_type,
            enum_type: self.enums.iter().map(EnumDef::to_descriptor).collect(),
            syntax: Some(self.syntax.as_str().to_string()),
            ..Default::default()
        })
    }
}

impl EnumDef {
    fn to_descriptor(&self) -> EnumDescriptorProto {
        EnumDescriptorProto {
            name: Some(self.name.clone()),
            value: self
                .values
                .iter()
                .map(|(name, number)| EnumValueDescriptorProto {
                    name: Some(name.clone()),
                    number: Some(*number),
                    ..Default::default()
                })
                .collect(),
            options: self.allow_alias.then(|| EnumOptions {
                allow_alias: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

impl MessageDef {
    fn to_descriptor(
        &self,
        full_name: &str,
        syntax: Syntax,
        symbols: &Symbols<'_>,
    ) -> ProtobufResult<DescriptorProto> {
        let mut nested_type = self
            .messages
            .iter()
            .map(|m| m.to_descriptor(&qualify(full_name, &m.name), syntax, symbols))
            .collect::<ProtobufResult<Vec<_>>>()?;

        let mut oneof_decl: Vec<OneofDescriptorProto> = self
            .oneofs
            .iter()
            .map(|name| OneofDescriptorProto {
                name: Some(name.clone()),
                ..Default::default()
            })
            .collect();
        let mut synthetic_oneofs = Vec::new();

        let mut fields = Vec::with_capacity(self.fields.len());
        for def in &self.fields {
            let error = |message: String| ProtobufError::Parse {
                line: def.line,
                column: def.column,
                message,
            };

            let mut field = FieldDescriptorProto {
                name: Some(def.name.clone()),
                number: Some(def.number),
                json_name: Some(def.json_name.clone().unwrap_or_else(|| json_name(&def.name))),
                oneof_index: def.oneof_index,
                default_value: def.default_value.clone(),
                ..Default::default()
            };

            if let Some((key, value)) = &def.map {
                let entry_name = map_entry_name(&def.name);
                let entry_full_name = qualify(full_name, &entry_name);
                let key_field = self.typed_field("key", 1, key, full_name, symbols, &error)?;
                let value_field = self.typed_field("value", 2, value, full_name, symbols, &error)?;
                nested_type.push(DescriptorProto {
                    name: Some(entry_name),
                    field: vec![key_field, value_field],
                    options: Some(MessageOptions {
                        map_entry: Some(true),
                        ..Default::default()
                    }),
                    ..Default::default()
                });
                field.label = Some(Label::Repeated as i32);
                field.r#type = Some(Type::Message as i32);
                field.type_name = Some(format!(".{}", entry_full_name));
                fields.push(field);
                continue;
            }

            let label = match (def.label, syntax) {
                (FieldLabel::Repeated, _) => Label::Repeated,
                (FieldLabel::Required, Syntax::Proto3) => {
                    return Err(error("required fields are not allowed in proto3".into()))
                }
                (FieldLabel::Required, Syntax::Proto2) => Label::Required,
                _ => Label::Optional,
            };
            field.label = Some(label as i32);
            self.set_type(&mut field, &def.type_name, full_name, symbols, &error)?;

            if def.label == FieldLabel::Optional && syntax == Syntax::Proto3 {
                field.proto3_optional = Some(true);
                synthetic_oneofs.push((fields.len(), format!("_{}", def.name)));
            }
            fields.push(field);
        }

        // synthetic oneofs for proto3 `optional` follow all declared oneofs
        for (field_index, name) in synthetic_oneofs {
            let index = i32::try_from(oneof_decl.len()).map_err(|_| ProtobufError::Parse {
                line: self.fields[field_index].line,
                column: self.fields[field_index].column,
                message: "too many oneofs".into(),
            })?;
            oneof_decl.push(OneofDescriptorProto {
                name: Some(name),
                ..Default::default()
            });
            fields[field_index].oneof_index = Some(index);
        }

        Ok(DescriptorProto {
            name: Some(self.name.clone()),
            field: fields,
            nested_type,
            enum_type: self.enums.iter().map(EnumDef::to_descriptor).collect(),
            oneof_decl,
            ..Default::default()
        })
    }

    fn typed_field(
        &self,
        name: &str,
        number: i32,
        type_name: &str,
        scope: &str,
        symbols: &Symbols<'_>,
        error: &dyn Fn(String) -> ProtobufError,
    ) -> ProtobufResult<FieldDescriptorProto> {
        let mut field = FieldDescriptorProto {
            name: Some(name.to_string()),
            number: Some(number),
            label: Some(Label::Optional as i32),
            json_name: Some(name.to_string()),
            ..Default::default()
        };
        self.set_type(&mut field, type_name, scope, symbols, error)?;
        Ok(field)
    }

    fn set_type(
        &self,
        field: &mut FieldDescriptorProto,
        type_name: &str,
        scope: &str,
        symbols: &Symbols<'_>,
        error: &dyn Fn(String) -> ProtobufError,
    ) -> ProtobufResult<()> {
        if let Some(scalar) = scalar_type(type_name) {
            field.r#type = Some(scalar as i32);
            return Ok(());
        }
        let (resolved, kind) = symbols
            .resolve(type_name, scope)
            .ok_or_else(|| error(format!("unknown type '{}'", type_name)))?;
        field.r#type = Some(match kind {
            SymbolKind::Message => Type::Message,
            SymbolKind::Enum => Type::Enum,
        } as i32);
        field.type_name = Some(format!(".{}", resolved));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_str(source: &str) -> ProtobufResult<FileDescriptorProto> {
        parse(source, &DescriptorPool::global())
    }

    #[test]
    fn test_tokenizer_skips_comments() {
        let tokens = Lexer::new("// line\nmessage /* block\n */ A {}").tokenize().unwrap();
        let toks: Vec<_> = tokens.iter().map(|t| t.tok.clone()).collect();
        assert_eq!(
            toks,
            vec![
                Tok::Ident("message".into()),
                Tok::Ident("A".into()),
                Tok::Sym('{'),
                Tok::Sym('}'),
            ]
        );
        assert_eq!(tokens[1].line, 3);
    }

    #[test]
    fn test_simple_message() {
        let file = parse_str(
            r#"
            syntax = "proto3";
            package com.example;
            option java_package = "com.example.proto";

            message User {
                int64 id = 1;
                string first_name = 2;
                repeated string tags = 3 [packed = true];
            }
            "#,
        )
        .unwrap();

        assert_eq!(file.package.as_deref(), Some("com.example"));
        assert_eq!(file.syntax.as_deref(), Some("proto3"));
        let user = &file.message_type[0];
        assert_eq!(user.name.as_deref(), Some("User"));
        assert_eq!(user.field.len(), 3);
        assert_eq!(user.field[1].json_name.as_deref(), Some("firstName"));
        assert_eq!(user.field[2].label, Some(Label::Repeated as i32));
    }

    #[test]
    fn test_type_resolution_scoping() {
        let file = parse_str(
            r#"
            syntax = "proto3";
            package cdc;
            import "google/protobuf/timestamp.proto";

            enum Op { OP_UNSPECIFIED = 0; CREATE = 1; }

            message Envelope {
                message Row { int64 id = 1; }
                Row before = 1;
                .cdc.Envelope.Row after = 2;
                Op op = 3;
                google.protobuf.Timestamp ts = 4;
            }
            "#,
        )
        .unwrap();

        let fields = &file.message_type[0].field;
        assert_eq!(fields[0].type_name.as_deref(), Some(".cdc.Envelope.Row"));
        assert_eq!(fields[1].type_name.as_deref(), Some(".cdc.Envelope.Row"));
        assert_eq!(fields[2].type_name.as_deref(), Some(".cdc.Op"));
        assert_eq!(fields[2].r#type, Some(Type::Enum as i32));
        assert_eq!(fields[3].type_name.as_deref(), Some(".google.protobuf.Timestamp"));
        assert_eq!(file.dependency, vec!["google/protobuf/timestamp.proto"]);
    }

    #[test]
    fn test_map_and_oneof() {
        let file = parse_str(
            r#"
            syntax = "proto3";
            message Doc {
                map<string, int32> counts_by_name = 1;
                oneof payload {
                    string text = 2;
                    bytes blob = 3;
                }
                optional string note = 4;
            }
            "#,
        )
        .unwrap();

        let doc = &file.message_type[0];
        let entry = &doc.nested_type[0];
        assert_eq!(entry.name.as_deref(), Some("CountsByNameEntry"));
        assert_eq!(entry.options.as_ref().and_then(|o| o.map_entry), Some(true));
        assert_eq!(doc.field[0].type_name.as_deref(), Some(".Doc.CountsByNameEntry"));

        assert_eq!(doc.oneof_decl.len(), 2);
        assert_eq!(doc.oneof_decl[1].name.as_deref(), Some("_note"));
        assert_eq!(doc.field[1].oneof_index, Some(0));
        assert_eq!(doc.field[3].oneof_index, Some(1));
        assert_eq!(doc.field[3].proto3_optional, Some(true));
    }

    #[test]
    fn test_skipped_constructs() {
        let file = parse_str(
            r#"
            syntax = "proto2";
            message A {
                reserved 2, 15, 9 to 11;
                reserved "foo", "bar";
                extensions 100 to max;
                option deprecated = true;
                required int32 id = 1 [default = -5, json_name = "ident"];
                enum Kind { option allow_alias = true; X = 0; Y = 0; }
            }
            service Svc { rpc Get (A) returns (A) { option idempotency_level = NO_SIDE_EFFECTS; } }
            "#,
        )
        .unwrap();

        let a = &file.message_type[0];
        assert_eq!(a.field[0].label, Some(Label::Required as i32));
        assert_eq!(a.field[0].default_value.as_deref(), Some("-5"));
        assert_eq!(a.field[0].json_name.as_deref(), Some("ident"));
        assert_eq!(
            a.enum_type[0].options.as_ref().and_then(|o| o.allow_alias),
            Some(true)
        );
    }

    #[test]
    fn test_errors() {
        let err = parse_str("syntax = \"proto3\";\nmessage A {\n  Missing m = 1;\n}").unwrap_err();
        assert!(matches!(err, ProtobufError::Parse { line: 3, .. }), "{err}");

        let err = parse_str("syntax = \"proto3\"; import \"other/thing.proto\";").unwrap_err();
        assert!(matches!(err, ProtobufError::UnresolvedImport(_)));

        assert!(parse_str("message A { int32 id = ; }").is_err());
        assert!(parse_str("message A { int32 id = 1; ").is_err());
        assert!(parse_str("syntax = \"proto3\"; message A { required int32 id = 1; }").is_err());
    }

    #[test]
    fn test_name_helpers() {
        assert_eq!(json_name("first_name"), "firstName");
        assert_eq!(json_name("FOO_bar"), "FOOBar");
        assert_eq!(map_entry_name("counts_by_name"), "CountsByNameEntry");
        assert_eq!(parse_int_literal("0x1F"), Some(31));
        assert_eq!(parse_int_literal("017"), Some(15));
        assert_eq!(parse_int_literal("0"), Some(0));
    }
}
