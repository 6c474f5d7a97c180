use logos::Logos;

/// Tokens of the assembly surface syntax. `#` starts a comment running to the
/// end of the line; newlines are significant because a listing is
/// line-oriented.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r]+")]
#[logos(skip r"#[^\n]*")]
pub enum Token {
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_owned())]
    Ident(String),

    #[regex(r"-?[0-9]+\.[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),

    #[regex(r"-?[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),

    #[token(",")]
    Comma,

    #[token("[")]
    LBracket,

    #[token("]")]
    RBracket,

    #[token("+")]
    Plus,

    #[token("-")]
    Minus,

    #[token(":")]
    Colon,

    #[token(";")]
    Semi,

    #[token("\n")]
    Newline,
}

/// Lexes `src` fully, turning any unrecognized character into an error with
/// its byte offset.
pub fn lex(src: &str) -> Result<Vec<Token>, usize> {
    let mut toks = Vec::new();
    let mut lexer = Token::lexer(src);
    while let Some(tok) = lexer.next() {
        match tok {
            Ok(t) => toks.push(t),
            Err(()) => return Err(lexer.span().start),
        }
    }
    Ok(toks)
}
